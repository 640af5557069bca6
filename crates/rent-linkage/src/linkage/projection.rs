use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use futures::future::join_all;
use metrics::counter;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::calculator::{self, LinkageInputs};
use super::chaining::ChainingTable;
use super::domain::{
    CalculationResult, CeilingBasis, IndexSample, IndexType, LinkageConfig, LinkageError,
    LinkageSubType, LinkageTerms, PeriodKey, Resolution,
};
use super::repository::{AvailableSpan, IndexRepositoryClient, IndexStore};
use crate::config::EngineConfig;
use crate::telemetry::{BATCH_ITEMS_TOTAL, LOOKUP_TIMEOUTS_TOTAL};

/// Day of month on or before which last month's figure is still unpublished.
pub const DEFAULT_PUBLICATION_DAY: u32 = 15;

/// Pick the period whose figure a contract reads on `today`.
///
/// Monthly series: `Current` is this month. `Known` is last month once the figure is
/// out, which happens after `publication_day`; before that it is the month before.
/// Daily series: `Current` is today and `Known` is yesterday's closing rate.
pub fn resolve_target_period(
    index_type: IndexType,
    sub_type: LinkageSubType,
    today: NaiveDate,
    publication_day: u32,
) -> Result<PeriodKey, LinkageError> {
    let current = index_type.period_for(today);
    match (index_type.resolution(), sub_type) {
        (_, LinkageSubType::Current) => Ok(current),
        (Resolution::Monthly, LinkageSubType::Known) => {
            let lag = if today.day() <= publication_day { 2 } else { 1 };
            current.offset_months(-lag)
        }
        (Resolution::Daily, LinkageSubType::Known) => today
            .pred_opt()
            .map(|yesterday| index_type.period_for(yesterday))
            .ok_or_else(|| LinkageError::DateOutOfRange(today.to_string())),
    }
}

/// Tuning for the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectionSettings {
    pub publication_day: u32,
    /// Per-lookup deadline; an expired lookup counts as missing data.
    pub lookup_timeout: Option<Duration>,
}

impl Default for ProjectionSettings {
    fn default() -> Self {
        Self {
            publication_day: DEFAULT_PUBLICATION_DAY,
            lookup_timeout: None,
        }
    }
}

impl From<&EngineConfig> for ProjectionSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            publication_day: config.publication_day,
            lookup_timeout: config.lookup_timeout,
        }
    }
}

/// One entry of a batch response, in the same position as its config.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProjectionOutcome {
    Computed(CalculationResult),
    Rejected {
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        error: String,
    },
}

impl ProjectionOutcome {
    pub fn result(&self) -> Option<&CalculationResult> {
        match self {
            ProjectionOutcome::Computed(result) => Some(result),
            ProjectionOutcome::Rejected { .. } => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, ProjectionOutcome::Rejected { .. })
    }
}

/// Latest figure of a series and its movement since an optional base date.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexPulse {
    pub index_type: IndexType,
    pub latest: IndexSample,
    pub base_value: Option<Decimal>,
    pub change_percent: Option<Decimal>,
}

/// Resolves target periods, fetches figures concurrently, and runs the calculator for
/// one or many linkage clauses.
pub struct ProjectionAggregator<S> {
    client: IndexRepositoryClient<S>,
    chaining: ChainingTable,
    settings: ProjectionSettings,
}

impl<S> ProjectionAggregator<S>
where
    S: IndexStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            client: IndexRepositoryClient::new(store),
            chaining: ChainingTable::default(),
            settings: ProjectionSettings::default(),
        }
    }

    pub fn with_chaining(mut self, chaining: ChainingTable) -> Self {
        self.chaining = chaining;
        self
    }

    pub fn with_settings(mut self, settings: ProjectionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn client(&self) -> &IndexRepositoryClient<S> {
        &self.client
    }

    pub fn chaining(&self) -> &ChainingTable {
        &self.chaining
    }

    pub fn settings(&self) -> ProjectionSettings {
        self.settings
    }

    /// Target period for validated terms: the explicit override, else the
    /// publication-lag rule.
    pub fn target_period(&self, terms: &LinkageTerms, today: NaiveDate) -> Result<PeriodKey, LinkageError> {
        match &terms.target_override {
            Some(period) => Ok(period.clone()),
            None => resolve_target_period(
                terms.index_type,
                terms.sub_type,
                today,
                self.settings.publication_day,
            ),
        }
    }

    /// Link a single clause. Invalid configuration is an error; missing figures degrade
    /// the result instead.
    pub async fn calculate(
        &self,
        config: &LinkageConfig,
        today: NaiveDate,
    ) -> Result<CalculationResult, LinkageError> {
        let terms = config.validate()?;
        self.project(&terms, today).await
    }

    pub async fn project(
        &self,
        terms: &LinkageTerms,
        today: NaiveDate,
    ) -> Result<CalculationResult, LinkageError> {
        let index_type = terms.index_type;
        let target_period = self.target_period(terms, today)?;

        let (base_value, target_value) = futures::join!(
            self.figure(terms.manual_base_value, index_type, &terms.base_period),
            self.figure(terms.manual_target_value, index_type, &target_period),
        );

        let chain_factor = self
            .chaining
            .factor_between(index_type, &terms.base_period, &target_period);
        let inputs = LinkageInputs::new(base_value, target_value, terms.base_rent)
            .with_ceiling(ceiling_allowance(terms, &target_period))
            .with_floor(terms.floor_enabled)
            .with_partial_linkage(terms.partial_linkage)
            .with_chain_factor(chain_factor);
        let figures = calculator::calculate(&inputs);

        debug!(
            label = terms.label.as_deref().unwrap_or("-"),
            %index_type,
            base = %terms.base_period,
            target = %target_period,
            status = ?figures.status,
            new_rent = %figures.new_rent,
            clamped = figures.clamped,
            "linkage calculated"
        );

        Ok(CalculationResult {
            label: terms.label.clone(),
            index_type,
            base_date_used: terms.base_period.clone(),
            target_date_used: target_period,
            base_value,
            target_value,
            chain_factor,
            percentage_change: figures.percentage_change,
            rent_change_percent: figures.rent_change_percent,
            base_rent: terms.base_rent,
            new_rent: figures.new_rent,
            clamped: figures.clamped,
            status: figures.status,
        })
    }

    /// Link every clause concurrently. Each entry stands alone: a rejected clause never
    /// affects its siblings, and the output order matches `configs`.
    pub async fn calculate_batch(
        &self,
        configs: &[LinkageConfig],
        today: NaiveDate,
    ) -> Vec<ProjectionOutcome> {
        let pending = configs.iter().map(|config| async move {
            match self.calculate(config, today).await {
                Ok(result) => ProjectionOutcome::Computed(result),
                Err(error) => {
                    warn!(
                        label = config.label.as_deref().unwrap_or("-"),
                        index_type = %config.index_type,
                        %error,
                        "linkage config rejected"
                    );
                    ProjectionOutcome::Rejected {
                        label: config.label.clone(),
                        error: error.to_string(),
                    }
                }
            }
        });
        let outcomes = join_all(pending).await;

        let mut computed = 0usize;
        let mut degraded = 0usize;
        let mut rejected = 0usize;
        for outcome in &outcomes {
            match outcome {
                ProjectionOutcome::Computed(result) if result.is_degraded() => degraded += 1,
                ProjectionOutcome::Computed(_) => computed += 1,
                ProjectionOutcome::Rejected { .. } => rejected += 1,
            }
        }
        counter!(BATCH_ITEMS_TOTAL, "outcome" => "computed").increment(computed as u64);
        counter!(BATCH_ITEMS_TOTAL, "outcome" => "degraded").increment(degraded as u64);
        counter!(BATCH_ITEMS_TOTAL, "outcome" => "rejected").increment(rejected as u64);
        info!(
            items = outcomes.len(),
            computed, degraded, rejected, %today, "linkage batch projected"
        );

        outcomes
    }

    /// Latest figure per series and, when `base_date` is given and published, the change
    /// since then. Empty series are left out.
    pub async fn pulse(&self, index_types: &[IndexType], base_date: Option<NaiveDate>) -> Vec<IndexPulse> {
        let pending = index_types.iter().map(|&index_type| async move {
            let latest = self.client.get_latest(index_type).await?;
            let base_value = match base_date {
                Some(date) => {
                    self.client
                        .value_at(index_type, &index_type.period_for(date))
                        .await
                }
                None => None,
            };
            let change_percent = base_value
                .filter(|base| *base > Decimal::ZERO)
                .and_then(|base| calculator::percent_change(base, latest.value))
                .map(calculator::two_places);
            Some(IndexPulse {
                index_type,
                latest,
                base_value,
                change_percent,
            })
        });

        join_all(pending).await.into_iter().flatten().collect()
    }

    pub async fn history(
        &self,
        index_type: IndexType,
        start: &str,
        end: &str,
    ) -> Result<Vec<IndexSample>, LinkageError> {
        self.client.get_range(index_type, start, end).await
    }

    pub async fn span(&self, index_type: IndexType) -> AvailableSpan {
        self.client.get_available_span(index_type).await
    }

    async fn figure(
        &self,
        manual: Option<Decimal>,
        index_type: IndexType,
        period: &PeriodKey,
    ) -> Option<Decimal> {
        if manual.is_some() {
            return manual;
        }

        let lookup = self.client.value_at(index_type, period);
        match self.settings.lookup_timeout {
            Some(limit) => match tokio::time::timeout(limit, lookup).await {
                Ok(value) => value,
                Err(_) => {
                    counter!(LOOKUP_TIMEOUTS_TOTAL, "index_type" => index_type.label()).increment(1);
                    warn!(%index_type, %period, timeout_ms = limit.as_millis() as u64, "index lookup timed out");
                    None
                }
            },
            None => lookup.await,
        }
    }
}

/// Ceiling in percent for the target period, prorated when the clause is annual.
pub(crate) fn ceiling_allowance(terms: &LinkageTerms, target: &PeriodKey) -> Option<Decimal> {
    terms.ceiling_percent.map(|percent| match terms.ceiling_basis {
        CeilingBasis::Total => percent,
        CeilingBasis::Annual => calculator::prorated_ceiling(percent, &terms.base_period, target),
    })
}
