//! Read-side operations served over HTTP.
//!
//! [`QueryEngine`] borrows the shared state and answers the six client
//! operations. It never writes: empty results are plain `None`/empty
//! values, and only malformed archive parameters are errors.

use serde::Deserialize;

use airgradient_store::ArchiveQuery;
use airgradient_types::{AveragedRecord, Measurement};

use crate::state::AppState;

/// Protocol version reported by `/get-version`.
pub const PROTOCOL_VERSION: &str = "1";

/// Query errors.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The request parameters are missing or malformed.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The archive could not be read.
    #[error(transparent)]
    Store(#[from] airgradient_store::Error),
}

/// Raw `/fetch-archive-records` parameters as they arrive on the query string.
#[derive(Debug, Default, Deserialize)]
pub struct ArchiveParams {
    pub since_ts: Option<String>,
    pub max_ts: Option<String>,
    pub limit: Option<String>,
}

impl ArchiveParams {
    /// Parse into an [`ArchiveQuery`].
    ///
    /// `since_ts` is required. All values must be integers and `limit` must
    /// be positive.
    pub fn parse(&self) -> Result<ArchiveQuery, QueryError> {
        let since = self
            .since_ts
            .as_deref()
            .ok_or_else(|| QueryError::InvalidQuery("since_ts is required".to_string()))?;
        let mut query = ArchiveQuery::since(parse_int("since_ts", since)?);

        if let Some(max) = self.max_ts.as_deref() {
            query = query.max(parse_int("max_ts", max)?);
        }

        if let Some(limit) = self.limit.as_deref() {
            let limit = parse_int("limit", limit)?;
            if limit <= 0 {
                return Err(QueryError::InvalidQuery(format!(
                    "limit must be positive, got {}",
                    limit
                )));
            }
            let limit = u32::try_from(limit).unwrap_or(u32::MAX);
            query = query.limit(limit);
        }

        Ok(query)
    }
}

fn parse_int(name: &str, value: &str) -> Result<i64, QueryError> {
    value.trim().parse().map_err(|_| {
        QueryError::InvalidQuery(format!("{} must be an integer, got '{}'", name, value))
    })
}

/// Answers client queries against the shared state.
pub struct QueryEngine<'a> {
    state: &'a AppState,
}

impl<'a> QueryEngine<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Latest snapshot, or `None` before the first successful poll.
    pub fn current(&self) -> Option<Measurement> {
        self.state.latest.read()
    }

    /// Protocol version.
    pub fn version(&self) -> &'static str {
        PROTOCOL_VERSION
    }

    /// Timestamp of the oldest archived record, or `None` if the archive is empty.
    pub async fn earliest_timestamp(&self) -> Result<Option<i64>, QueryError> {
        Ok(self.state.store.lock().await.earliest_timestamp()?)
    }

    /// Running two-minute average, falling back to the last closed window.
    pub async fn two_minute_record(&self) -> Option<AveragedRecord> {
        self.state.two_minute.read().await.current()
    }

    /// Archived records selected by `params`, oldest first.
    pub async fn archive_records(
        &self,
        params: &ArchiveParams,
    ) -> Result<Vec<AveragedRecord>, QueryError> {
        let query = params.parse()?;
        Ok(self.state.store.lock().await.query(&query)?)
    }
}
