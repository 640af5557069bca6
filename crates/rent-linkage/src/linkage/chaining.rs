use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::domain::{IndexType, PeriodKey};

/// Publication of a series on a new base period. Figures published from
/// `effective_from` onward must be multiplied by `factor` to compare with older ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebaseEvent {
    pub index_type: IndexType,
    pub effective_from: NaiveDate,
    pub factor: Decimal,
}

/// Rebasing history for every series the engine links against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainingTable {
    events: Vec<RebaseEvent>,
}

impl ChainingTable {
    pub fn new(mut events: Vec<RebaseEvent>) -> Self {
        events.sort_by(|left, right| {
            (left.index_type, left.effective_from).cmp(&(right.index_type, right.effective_from))
        });
        Self { events }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[RebaseEvent] {
        &self.events
    }

    /// Product of every rebasing factor that took effect after `base` and no later than
    /// `target`. Non-positive factors are ignored. A product past the decimal range
    /// yields zero, which the calculator reports as an invalid index value.
    pub fn factor_between(&self, index_type: IndexType, base: &PeriodKey, target: &PeriodKey) -> Decimal {
        let product = self
            .events
            .iter()
            .filter(|event| event.index_type == index_type && event.factor > Decimal::ZERO)
            .filter(|event| event.effective_from > base.start() && event.effective_from <= target.start())
            .try_fold(Decimal::ONE, |acc, event| acc.checked_mul(event.factor));

        let Some(factor) = product else {
            warn!(%index_type, %base, %target, "chain factor overflowed");
            return Decimal::ZERO;
        };

        if factor != Decimal::ONE {
            debug!(%index_type, %base, %target, %factor, "chaining across rebased index periods");
        }
        factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn month(raw: &str) -> PeriodKey {
        IndexType::Cpi.period_key(raw).expect("valid month")
    }

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("valid date")
    }

    fn table() -> ChainingTable {
        ChainingTable::new(vec![
            RebaseEvent {
                index_type: IndexType::Cpi,
                effective_from: date("2025-01-01"),
                factor: dec!(1.1),
            },
            RebaseEvent {
                index_type: IndexType::Cpi,
                effective_from: date("2021-01-01"),
                factor: dec!(1.05),
            },
            RebaseEvent {
                index_type: IndexType::Housing,
                effective_from: date("2021-01-01"),
                factor: dec!(3),
            },
            RebaseEvent {
                index_type: IndexType::Cpi,
                effective_from: date("2023-01-01"),
                factor: dec!(0),
            },
        ])
    }

    #[test]
    fn same_base_needs_no_chaining() {
        assert_eq!(table().factor_between(IndexType::Cpi, &month("2021-02"), &month("2024-12")), dec!(1));
    }

    #[test]
    fn multiplies_every_rebase_in_window() {
        let factor = table().factor_between(IndexType::Cpi, &month("2020-06"), &month("2025-03"));
        assert_eq!(factor, dec!(1.155));
    }

    #[test]
    fn rebase_month_counts_for_target_not_base() {
        let table = table();
        assert_eq!(table.factor_between(IndexType::Cpi, &month("2020-12"), &month("2021-01")), dec!(1.05));
        assert_eq!(table.factor_between(IndexType::Cpi, &month("2021-01"), &month("2021-06")), dec!(1));
    }

    #[test]
    fn empty_table_is_identity() {
        let table = ChainingTable::default();
        assert!(table.is_empty());
        assert_eq!(table.factor_between(IndexType::Cpi, &month("2010-01"), &month("2025-01")), dec!(1));
    }

    #[test]
    fn overflowing_product_yields_zero() {
        let huge = Decimal::MAX / dec!(10);
        let table = ChainingTable::new(vec![
            RebaseEvent {
                index_type: IndexType::Cpi,
                effective_from: date("2021-01-01"),
                factor: huge,
            },
            RebaseEvent {
                index_type: IndexType::Cpi,
                effective_from: date("2022-01-01"),
                factor: huge,
            },
        ]);
        assert_eq!(table.factor_between(IndexType::Cpi, &month("2020-01"), &month("2023-01")), dec!(0));
    }
}
