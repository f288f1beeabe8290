//! Rate-limited scheduling of historical bar requests.
//!
//! [`RequestScheduler::start`] spawns a coordinator task that expands sessions into
//! deduplicated [`BarRequest`](crate::models::BarRequest)s, submits them while
//! respecting every pacing window and the in-flight ceiling, keeps at most one request
//! per instrument in flight, and folds the returned bars into candle series.

mod coordinator;
mod handle;
pub mod plan;
pub mod summary;

use std::sync::Arc;

use candle_engine::CandleSeries;
use indexmap::IndexMap;
use tokio::{sync::mpsc, task::JoinHandle};

pub use handle::{SchedulerError, SchedulerHandle};
pub use summary::{ProgressSnapshot, RunSummary};

use crate::{
    config::FetcherConfig, models::SeriesKey, models::Session, progress::ProgressListener,
    providers::DataProvider, store::CandleStore,
};
use coordinator::Coordinator;

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunReport {
    pub summary: RunSummary,
    /// Candle series built during the run, in the order they were first touched.
    pub series: IndexMap<SeriesKey, CandleSeries>,
}

/// Collaborators and settings for one scheduling run.
pub struct RequestScheduler {
    config: FetcherConfig,
    provider: Arc<dyn DataProvider>,
    store: Arc<dyn CandleStore>,
    listener: Arc<dyn ProgressListener>,
}

impl RequestScheduler {
    pub fn new(
        config: FetcherConfig,
        provider: Arc<dyn DataProvider>,
        store: Arc<dyn CandleStore>,
        listener: Arc<dyn ProgressListener>,
    ) -> Self {
        Self {
            config,
            provider,
            store,
            listener,
        }
    }

    /// Spawn the coordinator. The run ends once every known request has completed,
    /// failed, or been abandoned by [`SchedulerHandle::cancel`]; sessions added through
    /// the handle before that point join the run.
    pub fn start(self, sessions: Vec<Session>) -> (SchedulerHandle, JoinHandle<RunReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let coordinator =
            Coordinator::new(self.config, self.provider, self.store, self.listener, rx);
        let task = tokio::spawn(coordinator.run(sessions));
        (SchedulerHandle::new(tx), task)
    }

    /// Run to completion without keeping a handle.
    pub async fn run(self, sessions: Vec<Session>) -> Result<RunReport, SchedulerError> {
        let (_handle, task) = self.start(sessions);
        Ok(task.await?)
    }
}
