pub mod dataset;
pub mod error;
pub mod extract;
pub mod geojson;
pub mod grid;
pub mod model;
pub mod observability;
pub mod pbf;
pub mod query;
pub mod reload;
pub mod service;
pub mod state;

pub use dataset::{build_dataset, load_dataset, DataSource, Dataset};
pub use error::{Error, Result};
pub use reload::ReloadCoordinator;
pub use service::{run_service, ServiceConfig};
