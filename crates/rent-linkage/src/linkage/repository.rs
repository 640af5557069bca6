use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use super::domain::{IndexSample, IndexType, LinkageError, PeriodKey};
use crate::telemetry::INDEX_LOOKUPS_TOTAL;

/// Read-only backend holding published index figures. Implementations report I/O
/// faults as [`StoreError`]; absence of a figure is `Ok(None)`.
#[async_trait]
pub trait IndexStore: Send + Sync {
    async fn sample(
        &self,
        index_type: IndexType,
        period: &PeriodKey,
    ) -> Result<Option<IndexSample>, StoreError>;

    async fn latest(&self, index_type: IndexType) -> Result<Option<IndexSample>, StoreError>;

    /// Inclusive on both ends, ascending by date.
    async fn range(
        &self,
        index_type: IndexType,
        start: &PeriodKey,
        end: &PeriodKey,
    ) -> Result<Vec<IndexSample>, StoreError>;

    /// Earliest and latest keys present for the series.
    async fn span(&self, index_type: IndexType)
        -> Result<Option<(PeriodKey, PeriodKey)>, StoreError>;
}

/// Error enumeration for backend failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("index store unavailable: {0}")]
    Unavailable(String),
    #[error("index query failed: {0}")]
    Query(String),
}

/// Dates for which a series has published figures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AvailableSpan {
    pub min: Option<PeriodKey>,
    pub max: Option<PeriodKey>,
}

#[derive(Debug, Clone, Copy)]
enum LookupOutcome {
    Hit,
    Missing,
    FetchFailed,
}

impl LookupOutcome {
    fn label(self) -> &'static str {
        match self {
            LookupOutcome::Hit => "hit",
            LookupOutcome::Missing => "missing",
            LookupOutcome::FetchFailed => "fetch_failed",
        }
    }
}

fn record(index_type: IndexType, operation: &'static str, outcome: LookupOutcome) {
    counter!(
        INDEX_LOOKUPS_TOTAL,
        "index_type" => index_type.label(),
        "operation" => operation,
        "outcome" => outcome.label()
    )
    .increment(1);
}

/// Accessor the calculator and aggregator go through. Backend failures are logged,
/// counted, and turned into "no data"; only malformed input is returned as an error.
pub struct IndexRepositoryClient<S> {
    store: Arc<S>,
}

impl<S> Clone for IndexRepositoryClient<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> IndexRepositoryClient<S>
where
    S: IndexStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Value published for `date`. Monthly series truncate full dates to the month.
    pub async fn get_value(
        &self,
        index_type: IndexType,
        date: &str,
    ) -> Result<Option<Decimal>, LinkageError> {
        let period = index_type.period_key(date)?;
        Ok(self.value_at(index_type, &period).await)
    }

    pub async fn value_at(&self, index_type: IndexType, period: &PeriodKey) -> Option<Decimal> {
        self.sample_at(index_type, period)
            .await
            .map(|sample| sample.value)
    }

    pub async fn sample_at(&self, index_type: IndexType, period: &PeriodKey) -> Option<IndexSample> {
        match self.store.sample(index_type, period).await {
            Ok(Some(sample)) => {
                record(index_type, "value", LookupOutcome::Hit);
                Some(sample)
            }
            Ok(None) => {
                record(index_type, "value", LookupOutcome::Missing);
                debug!(%index_type, %period, outcome = "missing", "no index figure published");
                None
            }
            Err(error) => {
                record(index_type, "value", LookupOutcome::FetchFailed);
                warn!(%index_type, %period, outcome = "fetch_failed", %error, "index lookup failed");
                None
            }
        }
    }

    pub async fn get_latest(&self, index_type: IndexType) -> Option<IndexSample> {
        match self.store.latest(index_type).await {
            Ok(Some(sample)) => {
                record(index_type, "latest", LookupOutcome::Hit);
                Some(sample)
            }
            Ok(None) => {
                record(index_type, "latest", LookupOutcome::Missing);
                debug!(%index_type, outcome = "missing", "index series is empty");
                None
            }
            Err(error) => {
                record(index_type, "latest", LookupOutcome::FetchFailed);
                warn!(%index_type, outcome = "fetch_failed", %error, "latest index lookup failed");
                None
            }
        }
    }

    pub async fn get_range(
        &self,
        index_type: IndexType,
        start: &str,
        end: &str,
    ) -> Result<Vec<IndexSample>, LinkageError> {
        let start = index_type.period_key(start)?;
        let end = index_type.period_key(end)?;
        Ok(self.range_between(index_type, &start, &end).await)
    }

    pub async fn range_between(
        &self,
        index_type: IndexType,
        start: &PeriodKey,
        end: &PeriodKey,
    ) -> Vec<IndexSample> {
        if start > end {
            return Vec::new();
        }

        match self.store.range(index_type, start, end).await {
            Ok(samples) => {
                let outcome = if samples.is_empty() {
                    LookupOutcome::Missing
                } else {
                    LookupOutcome::Hit
                };
                record(index_type, "range", outcome);
                samples
            }
            Err(error) => {
                record(index_type, "range", LookupOutcome::FetchFailed);
                warn!(%index_type, %start, %end, outcome = "fetch_failed", %error, "index range lookup failed");
                Vec::new()
            }
        }
    }

    /// Never fails: an empty or unreachable series reports `{ min: None, max: None }`.
    pub async fn get_available_span(&self, index_type: IndexType) -> AvailableSpan {
        match self.store.span(index_type).await {
            Ok(Some((min, max))) => {
                record(index_type, "span", LookupOutcome::Hit);
                AvailableSpan {
                    min: Some(min),
                    max: Some(max),
                }
            }
            Ok(None) => {
                record(index_type, "span", LookupOutcome::Missing);
                AvailableSpan::default()
            }
            Err(error) => {
                record(index_type, "span", LookupOutcome::FetchFailed);
                warn!(%index_type, outcome = "fetch_failed", %error, "index span lookup failed");
                AvailableSpan::default()
            }
        }
    }
}
