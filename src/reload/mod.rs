//! Ownership of the active dataset and its periodic replacement.
//!
//! The active dataset sits in an `ArcSwapOption`. The reload task is the only
//! writer; request handlers take a snapshot `Arc` and keep using it until they
//! are done, so a swap never disturbs a query in flight and the retired
//! dataset is freed when its last reader drops it.

use crate::dataset::{load_dataset, DataSource, Dataset};
use crate::error::{Error, Result};
use crate::observability::{track_dataset, track_reload};
use crate::state::StateMarker;
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Unchanged { state: i64 },
    Reloaded { from: Option<i64>, to: i64 },
}

pub struct ReloadCoordinator {
    source: DataSource,
    active: ArcSwapOption<Dataset>,
}

impl ReloadCoordinator {
    /// A coordinator with no active dataset yet.
    pub fn new(source: DataSource) -> Self {
        ReloadCoordinator {
            source,
            active: ArcSwapOption::empty(),
        }
    }

    pub fn source(&self) -> &DataSource {
        &self.source
    }

    /// Snapshot of the active dataset, `None` until the first load.
    pub fn current(&self) -> Option<Arc<Dataset>> {
        self.active.load_full()
    }

    /// Makes `dataset` the active one, returning the retired dataset.
    pub fn install(&self, dataset: Dataset) -> Option<Arc<Dataset>> {
        let dataset = Arc::new(dataset);
        track_dataset(&dataset.stats());
        info!(state = dataset.state(), "using dataset");
        self.active.swap(Some(dataset))
    }

    pub fn load_initial(&self) -> Result<Arc<Dataset>> {
        let marker = StateMarker::read(&self.source.state_path)?;
        let dataset = Arc::new(load_dataset(&self.source, marker)?);
        track_dataset(&dataset.stats());
        info!(state = dataset.state(), "using dataset");
        self.active.store(Some(dataset.clone()));
        Ok(dataset)
    }

    /// Loads and activates a new dataset if the state file announces a newer
    /// sequence number than the active one. On error the active dataset is
    /// left in place.
    pub fn reload_if_newer(&self) -> Result<ReloadOutcome> {
        let marker = StateMarker::read(&self.source.state_path)?;
        let current = self.current().map(|dataset| dataset.state());
        if let Some(state) = current {
            if marker.sequence <= state {
                return Ok(ReloadOutcome::Unchanged { state });
            }
        }
        info!(from = ?current, to = marker.sequence, "new state found, loading");
        let dataset = load_dataset(&self.source, marker)?;
        let to = dataset.state();
        self.install(dataset);
        Ok(ReloadOutcome::Reloaded { from: current, to })
    }

    /// Checks for new data every `period`. Returns only on a fatal error;
    /// other failures are logged and retried on the next tick. A zero period
    /// is a fatal configuration error.
    pub async fn run_periodic(self: Arc<Self>, period: Duration) -> Result<()> {
        if period.is_zero() {
            return Err(Error::Config("reload period must be positive".into()));
        }
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            let coordinator = self.clone();
            let result = match task::spawn_blocking(move || coordinator.reload_if_newer()).await {
                Ok(result) => result,
                Err(e) => {
                    error!(error = %e, "reload task did not complete");
                    track_reload("failed");
                    continue;
                }
            };
            match result {
                Ok(ReloadOutcome::Unchanged { state }) => {
                    debug!(state, "no new state");
                    track_reload("unchanged");
                }
                Ok(ReloadOutcome::Reloaded { from, to }) => {
                    info!(from = ?from, to, "dataset reloaded");
                    track_reload("reloaded");
                }
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "reload failed fatally");
                    track_reload("failed");
                    return Err(e);
                }
                Err(e) => {
                    error!(error = %e, "reload failed, keeping active dataset");
                    track_reload("failed");
                }
            }
        }
    }
}
