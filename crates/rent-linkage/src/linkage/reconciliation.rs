//! Back-pay reconciliation: replay an index-linked lease month by month and compare
//! what the tenant should have paid with what was actually paid.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::calculator::{self, money, LinkageInputs};
use super::domain::{IndexSample, LinkageConfig, LinkageError, LinkageSubType, PeriodKey, Resolution};
use super::projection::{ceiling_allowance, ProjectionAggregator};
use super::repository::IndexStore;

/// Longest period a single reconciliation replays (fifty years).
pub const MAX_RECONCILIATION_MONTHS: i64 = 600;

/// How often the lease re-links its rent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateFrequency {
    #[default]
    Monthly,
    Quarterly,
    Semiannually,
    Annually,
}

impl UpdateFrequency {
    pub fn months(self) -> usize {
        match self {
            UpdateFrequency::Monthly => 1,
            UpdateFrequency::Quarterly => 3,
            UpdateFrequency::Semiannually => 6,
            UpdateFrequency::Annually => 12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationRequest {
    pub config: LinkageConfig,
    /// First billing month, `YYYY-MM`.
    pub period_start: String,
    /// Last billing month, inclusive.
    pub period_end: String,
    #[serde(default)]
    pub update_frequency: UpdateFrequency,
    /// Flat amount paid every month, used when `monthly_actuals` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_paid_per_month: Option<Decimal>,
    /// Amount paid per billing month; months not listed count as unpaid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_actuals: Option<BTreeMap<String, Decimal>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyReconciliation {
    pub month: PeriodKey,
    pub index_period: PeriodKey,
    pub index_value: Decimal,
    /// The figure for `index_period` was not published; an earlier one was used.
    pub estimated: bool,
    pub should_have_paid: Decimal,
    pub actually_paid: Decimal,
    pub difference: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub base_period: PeriodKey,
    pub base_value: Decimal,
    pub total_months: usize,
    pub total_back_pay_owed: Decimal,
    pub average_underpayment: Decimal,
    pub percentage_owed: Decimal,
    pub months: Vec<MonthlyReconciliation>,
}

impl<S> ProjectionAggregator<S>
where
    S: IndexStore + 'static,
{
    pub async fn reconcile(
        &self,
        request: &ReconciliationRequest,
    ) -> Result<ReconciliationReport, LinkageError> {
        let terms = request.config.validate()?;
        let index_type = terms.index_type;
        if index_type.resolution() == Resolution::Daily {
            return Err(LinkageError::UnsupportedResolution(index_type));
        }

        let start = index_type.period_key(&request.period_start)?;
        let end = index_type.period_key(&request.period_end)?;
        if start > end {
            return Err(LinkageError::InvalidPeriod {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        let month_count = start.month_count(&end);
        if month_count > MAX_RECONCILIATION_MONTHS {
            return Err(LinkageError::PeriodTooLong {
                months: month_count,
                limit: MAX_RECONCILIATION_MONTHS,
            });
        }

        let actuals = request
            .monthly_actuals
            .as_ref()
            .map(|paid| {
                paid.iter()
                    .map(|(month, amount)| Ok((index_type.period_key(month)?, *amount)))
                    .collect::<Result<BTreeMap<PeriodKey, Decimal>, LinkageError>>()
            })
            .transpose()?;

        let months = start.months_through(&end)?;
        let history = match self.client().get_available_span(index_type).await.min {
            Some(first) => self.client().range_between(index_type, &first, &end).await,
            None => Vec::new(),
        };

        let (base_period, base_value) = match terms.manual_base_value {
            Some(value) => (terms.base_period.clone(), value),
            None => figure_on_or_before(&history, &terms.base_period)
                .map(|sample| (sample.date.clone(), sample.value))
                .ok_or_else(|| LinkageError::NoBaseIndex {
                    index_type,
                    period: terms.base_period.to_string(),
                })?,
        };

        let frequency = request.update_frequency.months();
        let mut current_rent = money(terms.base_rent);
        let mut rows = Vec::with_capacity(months.len());

        for (position, month) in months.into_iter().enumerate() {
            let index_period = match terms.sub_type {
                LinkageSubType::Known => month.offset_months(-1)?,
                LinkageSubType::Current => month.clone(),
            };

            let (index_value, estimated) = match history.iter().find(|s| s.date == index_period) {
                Some(sample) => (sample.value, false),
                None => match figure_on_or_before(&history, &index_period) {
                    Some(sample) => (sample.value, true),
                    None => (base_value, true),
                },
            };

            if position % frequency == 0 {
                let inputs = LinkageInputs::new(Some(base_value), Some(index_value), terms.base_rent)
                    .with_ceiling(ceiling_allowance(&terms, &index_period))
                    .with_floor(terms.floor_enabled)
                    .with_partial_linkage(terms.partial_linkage)
                    .with_chain_factor(self.chaining().factor_between(index_type, &base_period, &index_period));
                current_rent = calculator::calculate(&inputs).new_rent;
            }

            let actually_paid = match &actuals {
                Some(paid) => paid.get(&month).copied().unwrap_or(Decimal::ZERO),
                None => request.actual_paid_per_month.unwrap_or(Decimal::ZERO),
            };

            rows.push(MonthlyReconciliation {
                month,
                index_period,
                index_value,
                estimated,
                should_have_paid: current_rent,
                actually_paid,
                difference: money(current_rent - actually_paid),
            });
        }

        let total_months = rows.len();
        let total_back_pay_owed: Decimal = rows.iter().map(|row| row.difference).sum();
        let total_paid: Decimal = rows.iter().map(|row| row.actually_paid).sum();
        let average_underpayment = money(total_back_pay_owed / Decimal::from(total_months as u64));
        let percentage_owed = if total_paid > Decimal::ZERO {
            money(total_back_pay_owed / total_paid * Decimal::ONE_HUNDRED)
        } else {
            Decimal::ZERO
        };

        info!(
            %index_type,
            base = %base_period,
            months = total_months,
            owed = %total_back_pay_owed,
            "reconciliation computed"
        );

        Ok(ReconciliationReport {
            base_period,
            base_value,
            total_months,
            total_back_pay_owed: money(total_back_pay_owed),
            average_underpayment,
            percentage_owed,
            months: rows,
        })
    }
}

/// Most recent figure dated on or before `period`. `history` is ascending.
fn figure_on_or_before<'a>(history: &'a [IndexSample], period: &PeriodKey) -> Option<&'a IndexSample> {
    history.iter().take_while(|sample| sample.date <= *period).last()
}
