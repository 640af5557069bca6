use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::linkage::domain::{IndexSample, IndexType, PeriodKey};
use crate::linkage::memory::InMemoryIndexStore;
use crate::linkage::projection::ProjectionAggregator;
use crate::linkage::repository::{IndexStore, StoreError};

pub(super) fn date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("valid date")
}

pub(super) fn month(raw: &str) -> PeriodKey {
    IndexType::Cpi.period_key(raw).expect("valid month")
}

/// CPI from 2023-01 to 2024-02 plus a few housing and USD figures.
pub(super) fn seeded_store() -> InMemoryIndexStore {
    let store = InMemoryIndexStore::new();
    let cpi: [(&str, Decimal); 8] = [
        ("2022-12", dec!(99.6)),
        ("2023-01", dec!(100.0)),
        ("2023-06", dec!(101.8)),
        ("2023-10", dec!(102.6)),
        ("2023-11", dec!(102.9)),
        ("2023-12", dec!(103.1)),
        ("2024-01", dec!(103.5)),
        ("2024-02", dec!(103.9)),
    ];
    for (month, value) in cpi {
        store
            .insert_value(IndexType::Cpi, month, value)
            .expect("seed cpi");
    }
    store
        .insert_value(IndexType::Housing, "2023-01", dec!(200))
        .expect("seed housing");
    store
        .insert_value(IndexType::Housing, "2024-01", dec!(190))
        .expect("seed housing");
    store
        .insert_value(IndexType::Usd, "2024-03-09", dec!(3.60))
        .expect("seed usd");
    store
        .insert_value(IndexType::Usd, "2024-01-02", dec!(3.75))
        .expect("seed usd");
    store
}

pub(super) fn aggregator() -> ProjectionAggregator<InMemoryIndexStore> {
    ProjectionAggregator::new(Arc::new(seeded_store()))
}

/// Wraps the seeded store, failing every call for the listed series and optionally
/// stalling before answering.
pub(super) struct FaultyStore {
    inner: InMemoryIndexStore,
    failing: HashSet<IndexType>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FaultyStore {
    pub(super) fn failing(types: &[IndexType]) -> Self {
        Self {
            inner: seeded_store(),
            failing: types.iter().copied().collect(),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn slow(delay: Duration) -> Self {
        Self {
            inner: seeded_store(),
            failing: HashSet::new(),
            delay: Some(delay),
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn gate(&self, index_type: IndexType) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&index_type) {
            return Err(StoreError::Unavailable(format!("{index_type} shard offline")));
        }
        Ok(())
    }
}

#[async_trait]
impl IndexStore for FaultyStore {
    async fn sample(
        &self,
        index_type: IndexType,
        period: &PeriodKey,
    ) -> Result<Option<IndexSample>, StoreError> {
        self.gate(index_type).await?;
        self.inner.sample(index_type, period).await
    }

    async fn latest(&self, index_type: IndexType) -> Result<Option<IndexSample>, StoreError> {
        self.gate(index_type).await?;
        self.inner.latest(index_type).await
    }

    async fn range(
        &self,
        index_type: IndexType,
        start: &PeriodKey,
        end: &PeriodKey,
    ) -> Result<Vec<IndexSample>, StoreError> {
        self.gate(index_type).await?;
        self.inner.range(index_type, start, end).await
    }

    async fn span(
        &self,
        index_type: IndexType,
    ) -> Result<Option<(PeriodKey, PeriodKey)>, StoreError> {
        self.gate(index_type).await?;
        self.inner.span(index_type).await
    }
}
