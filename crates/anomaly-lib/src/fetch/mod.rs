//! Series retrieval from the monitoring backend
//!
//! `PrometheusFetcher` runs a range query over HTTP; `FileFetcher` replays a
//! saved `query_range` response from disk. Both decode through the same
//! payload parser and return typed errors; nothing is retried.

mod file;
mod payload;
mod prometheus_http;


pub use file::FileFetcher;
pub use payload::{QueryRangeData, QueryRangeResponse, RangeSeries};
pub use prometheus_http::PrometheusFetcher;

use std::time::Duration;

use crate::error::FetchError;
use crate::models::Series;

pub use async_trait::async_trait;

/// Query window; `start` and `end` are both inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Unix seconds
    pub start: i64,
    /// Unix seconds
    pub end: i64,
    /// Resolution step
    pub step: Duration,
}

impl TimeRange {
    /// Step as a seconds value for the `step` query parameter
    pub fn step_param(&self) -> String {
        self.step.as_secs_f64().to_string()
    }
}

/// Trait for series retrieval implementations
#[async_trait]
pub trait SeriesFetcher: Send + Sync {
    /// Fetch one series for `query` over `range`
    ///
    /// Zero result series is an empty `Series`, not an error.
    async fn fetch(&self, query: &str, range: &TimeRange) -> Result<Series, FetchError>;
}
