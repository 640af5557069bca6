//! Pure rent arithmetic. Nothing here performs I/O; callers resolve figures first.

use rust_decimal::{Decimal, RoundingStrategy};

use super::domain::{CalculationStatus, PeriodKey};

/// Figures and contract terms feeding one calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkageInputs {
    pub base_value: Option<Decimal>,
    pub target_value: Option<Decimal>,
    pub base_rent: Decimal,
    /// Maximum increase in percent, already prorated when the clause is annual.
    pub ceiling_percent: Option<Decimal>,
    pub floor_enabled: bool,
    /// Share of the index movement passed through to rent, in percent.
    pub partial_linkage: Decimal,
    /// Product of rebasing factors between the base and target periods.
    pub chain_factor: Decimal,
}

impl LinkageInputs {
    pub fn new(base_value: Option<Decimal>, target_value: Option<Decimal>, base_rent: Decimal) -> Self {
        Self {
            base_value,
            target_value,
            base_rent,
            ceiling_percent: None,
            floor_enabled: false,
            partial_linkage: Decimal::ONE_HUNDRED,
            chain_factor: Decimal::ONE,
        }
    }

    pub fn with_ceiling(mut self, percent: Option<Decimal>) -> Self {
        self.ceiling_percent = percent;
        self
    }

    pub fn with_floor(mut self, enabled: bool) -> Self {
        self.floor_enabled = enabled;
        self
    }

    pub fn with_partial_linkage(mut self, percent: Decimal) -> Self {
        self.partial_linkage = percent;
        self
    }

    pub fn with_chain_factor(mut self, factor: Decimal) -> Self {
        self.chain_factor = factor;
        self
    }
}

/// Numeric part of a calculation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkageFigures {
    pub percentage_change: Decimal,
    pub rent_change_percent: Decimal,
    pub new_rent: Decimal,
    pub clamped: bool,
    pub status: CalculationStatus,
}

impl LinkageFigures {
    fn degraded(base_rent: Decimal, status: CalculationStatus) -> Self {
        Self {
            percentage_change: Decimal::ZERO,
            rent_change_percent: Decimal::ZERO,
            new_rent: money(base_rent),
            clamped: false,
            status,
        }
    }
}

/// Link `base_rent` to the movement between the base and target figures.
///
/// The ceiling is applied before the floor, so when both trigger the floor decides.
/// Clamp comparisons run at full precision; only the reported values are rounded.
/// Figures whose arithmetic leaves the decimal range degrade like non-positive ones.
pub fn calculate(inputs: &LinkageInputs) -> LinkageFigures {
    let (base_value, target_value) = match (inputs.base_value, inputs.target_value) {
        (Some(base), Some(target)) => (base, target),
        _ => return LinkageFigures::degraded(inputs.base_rent, CalculationStatus::MissingData),
    };

    if base_value <= Decimal::ZERO || target_value <= Decimal::ZERO {
        return LinkageFigures::degraded(inputs.base_rent, CalculationStatus::InvalidIndexValue);
    }

    linked(inputs, base_value, target_value).unwrap_or_else(|| {
        LinkageFigures::degraded(inputs.base_rent, CalculationStatus::InvalidIndexValue)
    })
}

fn linked(inputs: &LinkageInputs, base_value: Decimal, target_value: Decimal) -> Option<LinkageFigures> {
    let base_rent = inputs.base_rent;
    let adjusted_target = target_value.checked_mul(inputs.chain_factor)?;
    if adjusted_target <= Decimal::ZERO {
        return None;
    }

    let percentage_change = percent_change(base_value, adjusted_target)?;
    let effective_change = percentage_change
        .checked_mul(inputs.partial_linkage)?
        .checked_div(Decimal::ONE_HUNDRED)?;

    let mut new_rent = if inputs.partial_linkage == Decimal::ONE_HUNDRED {
        base_rent.checked_mul(adjusted_target)?.checked_div(base_value)?
    } else {
        grow(base_rent, effective_change)?
    };
    let mut clamped = false;

    if let Some(ceiling) = inputs.ceiling_percent {
        // Only upward movement is capped.
        if effective_change > Decimal::ZERO && effective_change > ceiling {
            new_rent = grow(base_rent, ceiling)?;
            clamped = true;
        }
    }

    if inputs.floor_enabled && new_rent < base_rent {
        new_rent = base_rent;
        clamped = true;
    }

    let rent_change_percent = percent_change(base_rent, new_rent).unwrap_or(Decimal::ZERO);

    Some(LinkageFigures {
        percentage_change: two_places(percentage_change),
        rent_change_percent: two_places(rent_change_percent),
        new_rent: money(new_rent),
        clamped,
        status: CalculationStatus::Computed,
    })
}

/// `(to - from) / from * 100`, or `None` when `from` is zero or the result overflows.
pub(crate) fn percent_change(from: Decimal, to: Decimal) -> Option<Decimal> {
    to.checked_sub(from)?
        .checked_div(from)?
        .checked_mul(Decimal::ONE_HUNDRED)
}

/// `amount * (1 + percent / 100)`.
fn grow(amount: Decimal, percent: Decimal) -> Option<Decimal> {
    let factor = Decimal::ONE.checked_add(percent.checked_div(Decimal::ONE_HUNDRED)?)?;
    amount.checked_mul(factor)
}

/// Prorate an annual ceiling over the time between two periods (365.25-day years).
pub fn prorated_ceiling(annual_percent: Decimal, base: &PeriodKey, target: &PeriodKey) -> Decimal {
    let days = (target.start() - base.start()).num_days().max(0);
    let years = Decimal::from(days) / Decimal::new(36525, 2);
    // An allowance past the decimal range caps nothing.
    annual_percent.checked_mul(years).unwrap_or(Decimal::MAX)
}

/// Round half-up to the currency's minor unit and pin the scale to two places.
pub fn money(value: Decimal) -> Decimal {
    two_places(value)
}

pub(crate) fn two_places(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}
