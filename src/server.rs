use footway_lookup::observability::init_logging;
use footway_lookup::{run_service, DataSource, ReloadCoordinator, ServiceConfig};
use std::net::TcpListener;
use std::num::{NonZeroU32, NonZeroU64};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use structopt::StructOpt;
use tracing::{error, info};

#[derive(Debug, StructOpt)]
#[structopt(name = "footway-lookup", about = "serve footways by bounding box")]
pub struct Opt {
    /// footway pbf path
    #[structopt(long = "pbf", env = "PBF_PATH", default_value = "footways.pbf")]
    pub pbf_path: PathBuf,
    /// freshness marker written next to the pbf
    #[structopt(long = "state", env = "STATE_PATH", default_value = "state.txt")]
    pub state_path: PathBuf,
    /// http port
    #[structopt(short, long, env = "PORT", default_value = "8082")]
    pub port: u16,
    /// http bind address
    #[structopt(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,
    /// seconds between checks for new data
    #[structopt(long, env = "RELOAD_SECS", default_value = "900")]
    pub reload_secs: NonZeroU64,
    /// grid cell size in 1e-7 degrees
    #[structopt(long, env = "CELL_SIZE", default_value = "10000")]
    pub cell_size: NonZeroU32,
}

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opt = Opt::from_args();
    init_logging();

    let coordinator = Arc::new(ReloadCoordinator::new(DataSource {
        data_path: opt.pbf_path,
        state_path: opt.state_path,
        cell_size: opt.cell_size,
    }));
    let dataset = coordinator.load_initial()?;
    info!(
        ways = dataset.grid().way_count(),
        nodes = dataset.nodes().len(),
        "initial dataset loaded"
    );
    drop(dataset);

    let listener = TcpListener::bind((opt.host.as_str(), opt.port))?;
    info!(address = %listener.local_addr()?, "listening");
    let server = run_service(ServiceConfig {
        coordinator: coordinator.clone(),
        listener,
    })?;
    let handle = server.handle();
    let reload = tokio::spawn(
        coordinator
            .clone()
            .run_periodic(Duration::from_secs(opt.reload_secs.get())),
    );

    tokio::select! {
        result = server => result?,
        result = reload => {
            handle.stop(true).await;
            match result {
                Ok(Err(e)) => {
                    error!(error = %e, "stopping after fatal reload error");
                    return Err(e.into());
                }
                Ok(Ok(())) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(())
}
