//! Provider abstraction for historical bar sources.
//!
//! This module defines the [`DataProvider`] trait, the single seam between the
//! scheduler and whatever serves historical bars (a broker gateway, a vendor API,
//! or the file-backed [`ReplayProvider`]).
//!
//! The trait is async and object safe, so the scheduler holds an
//! `Arc<dyn DataProvider>` and spawns one task per request.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use history_fetcher::models::{Bar, HistoricalRequest};
//! use history_fetcher::providers::{DataProvider, ProviderError};
//!
//! struct MyProvider;
//!
//! #[async_trait]
//! impl DataProvider for MyProvider {
//!     async fn fetch_history(
//!         &self,
//!         _request: &HistoricalRequest,
//!     ) -> Result<Vec<Bar>, ProviderError> {
//!         Ok(vec![])
//!     }
//! }
//! ```

pub mod replay;

use std::path::PathBuf;

use async_trait::async_trait;
use shared_utils::env::MissingEnvVarError;
use snafu::{Backtrace, Snafu};

use crate::models::{Bar, HistoricalRequest};

pub use replay::ReplayProvider;

/// Error code the historical data endpoint uses for "no data" and pacing violations.
pub const CODE_HISTORICAL_DATA: i32 = 162;
/// Historical market data service query message.
pub const CODE_NO_DATA_PERMISSIONS: i32 = 165;
/// No historical data query found for the ticker id.
pub const CODE_NO_QUERY: i32 = 366;

/// Trait for fetching historical bars from a market data source.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Fetch the bars described by `request`, oldest first.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<Bar>)` - The bars in the requested window, possibly empty.
    /// * `Err(ProviderError)` - The request failed; see [`ProviderError::class`].
    async fn fetch_history(&self, request: &HistoricalRequest) -> Result<Vec<Bar>, ProviderError>;
}

/// Errors that can occur during the creation of a provider instance.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderInitError {
    /// missed environment variable.
    #[snafu(display("Missing environment variable: {source}"))]
    MissingEnvVar {
        source: MissingEnvVarError,
        backtrace: Backtrace,
    },

    /// The replay directory does not exist.
    #[snafu(display("Replay directory not found: {}", path.display()))]
    ReplayDir { path: PathBuf, backtrace: Backtrace },
}

/// Errors that can occur within a `DataProvider` implementation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderError {
    /// The provider answered the request with an error code.
    #[snafu(display("API error {code}: {message}"))]
    Api {
        code: i32,
        message: String,
        backtrace: Backtrace,
    },

    /// The connection to the provider dropped while the request was outstanding.
    #[snafu(display("Provider disconnected: {message}"))]
    Disconnected {
        message: String,
        backtrace: Backtrace,
    },

    /// A replay file could not be read.
    #[snafu(display("Failed to read {}: {source}", path.display()))]
    ReplayRead {
        path: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// A replay file is not a JSON array of bars.
    #[snafu(display("Failed to decode {}: {source}", path.display()))]
    ReplayDecode {
        path: PathBuf,
        source: serde_json::Error,
        backtrace: Backtrace,
    },
}

/// How the scheduler treats a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The provider throttled us. Counted as completed.
    PacingViolation,
    /// Nothing to return for the window. Counted as completed.
    NoData,
    /// Counted as failed and not retried.
    Fatal,
}

impl ProviderError {
    /// Provider error code, or `-1` for errors raised locally.
    pub fn code(&self) -> i32 {
        match self {
            ProviderError::Api { code, .. } => *code,
            _ => -1,
        }
    }

    /// Map the error onto the scheduler's recovery classes.
    pub fn class(&self) -> ErrorClass {
        match self {
            ProviderError::Api { code, message, .. } => match *code {
                CODE_HISTORICAL_DATA
                    if message.to_ascii_lowercase().contains("pacing violation") =>
                {
                    ErrorClass::PacingViolation
                }
                CODE_HISTORICAL_DATA | CODE_NO_DATA_PERMISSIONS | CODE_NO_QUERY => {
                    ErrorClass::NoData
                }
                _ => ErrorClass::Fatal,
            },
            _ => ErrorClass::Fatal,
        }
    }

    /// Message without the code prefix, for progress listeners.
    pub fn message(&self) -> String {
        match self {
            ProviderError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
