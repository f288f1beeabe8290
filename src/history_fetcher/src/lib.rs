//! Paced historical bar fetching for trading sessions.
//!
//! Sessions of trade strategies are expanded into historical data requests, submitted
//! under the provider's pacing rules, and aggregated into candle series with
//! indicators attached. See [`scheduler::RequestScheduler`].

pub mod config;
pub mod models;
pub mod pacing;
pub mod progress;
pub mod providers;
pub mod scheduler;
pub mod store;
pub mod validation;

pub use scheduler::{RequestScheduler, RunReport, RunSummary, SchedulerHandle};
