use footway_lookup::extract::write_extract;
use footway_lookup::geojson::write_geojson;
use footway_lookup::grid::Bbox;
use footway_lookup::model::Feature;
use footway_lookup::state::StateMarker;
use footway_lookup::{load_dataset, DataSource};
use std::error::Error;
use std::num::NonZeroU32;
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "select", about = "select footways in a bounding box")]
struct Opt {
    /// west bound in 1e-7 degrees
    #[structopt(allow_hyphen_values = true)]
    west: i64,
    /// south bound in 1e-7 degrees
    #[structopt(allow_hyphen_values = true)]
    south: i64,
    /// east bound in 1e-7 degrees
    #[structopt(allow_hyphen_values = true)]
    east: i64,
    /// north bound in 1e-7 degrees
    #[structopt(allow_hyphen_values = true)]
    north: i64,
    /// footway pbf path
    #[structopt(short = "p", long = "pbf")]
    pbf_path: PathBuf,
    /// state file of the pbf, if any
    #[structopt(short = "s", long = "state")]
    state_path: Option<PathBuf>,
    #[structopt(long, default_value = "10000")]
    cell_size: NonZeroU32,
    /// list the nodes of every way
    #[structopt(short, long)]
    full: bool,
    /// create a geojson file with the selected ways
    #[structopt(short, long)]
    geojson: Option<PathBuf>,
    /// create a pbf extract with the selected ways
    #[structopt(short, long)]
    extract: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn Error>> {
    let opt = Opt::from_args();
    let bbox = Bbox::new(opt.west, opt.south, opt.east, opt.north);
    if !bbox.is_valid() {
        return Err(format!("{} is inverted", bbox).into());
    }

    let marker = match &opt.state_path {
        Some(path) => StateMarker::read(path)?,
        None => StateMarker::unversioned(),
    };
    let source = DataSource {
        data_path: opt.pbf_path.clone(),
        state_path: opt.state_path.clone().unwrap_or_default(),
        cell_size: opt.cell_size,
    };
    let dataset = load_dataset(&source, marker)?;
    let ways = dataset.select_by_bboxes(&[bbox]);

    for way in &ways {
        let display = dataset.display(Feature::Way(way));
        if opt.full {
            println!("{:#}", display);
        } else {
            println!("{}", display);
        }
    }
    if let Some(path) = opt.geojson {
        write_geojson(path, &dataset, &ways)?;
    }
    if let Some(path) = opt.extract {
        write_extract(path, &dataset, &ways)?;
    }
    Ok(())
}
