//! Replay of a saved `query_range` response

use std::path::{Path, PathBuf};

use super::payload::QueryRangeResponse;
use super::{async_trait, SeriesFetcher, TimeRange};
use crate::error::FetchError;
use crate::models::Series;

/// Reads a `query_range` response captured earlier, e.g. with
/// `curl "$PROM_URL/api/v1/query_range?..." > response.json`
///
/// The requested range is ignored: the file holds whatever window it was
/// captured with.
pub struct FileFetcher {
    path: PathBuf,
}

impl FileFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SeriesFetcher for FileFetcher {
    async fn fetch(&self, _query: &str, _range: &TimeRange) -> Result<Series, FetchError> {
        let body = tokio::fs::read(&self.path).await?;
        QueryRangeResponse::from_slice(&body)?.into_series()
    }
}
