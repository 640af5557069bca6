//! Index linkage: reading published index figures, linking contract rent to them, and
//! projecting the result for one contract or a whole portfolio.
//!
//! Data flows one way. The [`ProjectionAggregator`] validates linkage clauses, resolves
//! which published period each one reads, fetches figures through the
//! [`IndexRepositoryClient`], and hands them to the pure [`calculator`]. Nothing in this
//! module writes to the index store.

pub mod calculator;
pub mod chaining;
pub mod domain;
pub mod memory;
pub mod projection;
pub mod reconciliation;
pub mod repository;
pub mod router;

#[cfg(test)]
mod tests;

pub use calculator::{LinkageFigures, LinkageInputs};
pub use chaining::{ChainingTable, RebaseEvent};
pub use domain::{
    CalculationResult, CalculationStatus, CeilingBasis, IndexSample, IndexType, LinkageConfig,
    LinkageError, LinkageSubType, LinkageTerms, PeriodKey, Resolution, SampleSource,
};
pub use memory::{InMemoryIndexStore, IndexDataError};
pub use projection::{
    resolve_target_period, IndexPulse, ProjectionAggregator, ProjectionOutcome,
    ProjectionSettings, DEFAULT_PUBLICATION_DAY,
};
pub use reconciliation::{
    MonthlyReconciliation, ReconciliationReport, ReconciliationRequest, UpdateFrequency,
    MAX_RECONCILIATION_MONTHS,
};
pub use repository::{AvailableSpan, IndexRepositoryClient, IndexStore, StoreError};
pub use router::linkage_router;
