use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};

/// Published series a contract can be linked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexType {
    Cpi,
    Housing,
    Construction,
    Usd,
    Eur,
}

/// Granularity at which a series is published and keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resolution {
    Monthly,
    Daily,
}

impl Resolution {
    fn expected_format(self) -> &'static str {
        match self {
            Resolution::Monthly => "YYYY-MM",
            Resolution::Daily => "YYYY-MM-DD",
        }
    }
}

impl IndexType {
    pub const ALL: [IndexType; 5] = [
        IndexType::Cpi,
        IndexType::Housing,
        IndexType::Construction,
        IndexType::Usd,
        IndexType::Eur,
    ];

    pub fn label(self) -> &'static str {
        match self {
            IndexType::Cpi => "cpi",
            IndexType::Housing => "housing",
            IndexType::Construction => "construction",
            IndexType::Usd => "usd",
            IndexType::Eur => "eur",
        }
    }

    /// Currency rates are published daily; the statistical indices monthly.
    pub fn resolution(self) -> Resolution {
        match self {
            IndexType::Usd | IndexType::Eur => Resolution::Daily,
            IndexType::Cpi | IndexType::Housing | IndexType::Construction => Resolution::Monthly,
        }
    }

    /// Normalize a caller-supplied date into this series' lookup key.
    ///
    /// Monthly series accept `YYYY-MM` as well as full dates or timestamps, which are
    /// truncated to the month. Daily series require at least `YYYY-MM-DD`.
    pub fn period_key(self, raw: &str) -> Result<PeriodKey, LinkageError> {
        let resolution = self.resolution();
        let invalid = || LinkageError::InvalidDate {
            index_type: self,
            value: raw.to_string(),
            expected: resolution.expected_format(),
        };

        let trimmed = raw.trim();
        let start = match resolution {
            Resolution::Monthly if trimmed.len() == 7 => {
                let head = trimmed.get(..7).ok_or_else(invalid)?;
                NaiveDate::parse_from_str(&format!("{head}-01"), "%Y-%m-%d")
                    .map_err(|_| invalid())?
            }
            Resolution::Monthly | Resolution::Daily => {
                let head = trimmed.get(..10).ok_or_else(invalid)?;
                if let Some(rest) = trimmed.get(10..) {
                    if !(rest.is_empty() || rest.starts_with('T') || rest.starts_with(' ')) {
                        return Err(invalid());
                    }
                }
                NaiveDate::parse_from_str(head, "%Y-%m-%d").map_err(|_| invalid())?
            }
        };

        Ok(self.period_for(start))
    }

    /// Key covering `date` in this series.
    pub fn period_for(self, date: NaiveDate) -> PeriodKey {
        match self.resolution() {
            Resolution::Monthly => PeriodKey {
                start: date.with_day(1).unwrap_or(date),
                resolution: Resolution::Monthly,
            },
            Resolution::Daily => PeriodKey {
                start: date,
                resolution: Resolution::Daily,
            },
        }
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for IndexType {
    type Err = LinkageError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cpi" => Ok(IndexType::Cpi),
            "housing" => Ok(IndexType::Housing),
            "construction" => Ok(IndexType::Construction),
            "usd" => Ok(IndexType::Usd),
            "eur" => Ok(IndexType::Eur),
            _ => Err(LinkageError::UnknownIndexType(value.to_string())),
        }
    }
}

/// Normalized lookup key for one observation: a month for monthly series, a day for
/// daily ones. Ordering follows the calendar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeriodKey {
    start: NaiveDate,
    resolution: Resolution,
}

impl PeriodKey {
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Shift a monthly key by `delta` months. Daily keys shift by the same number of
    /// calendar months, keeping the day where it exists.
    pub fn offset_months(&self, delta: i32) -> Result<PeriodKey, LinkageError> {
        let total = self.start.year() * 12 + self.start.month0() as i32 + delta;
        let year = total.div_euclid(12);
        let month = total.rem_euclid(12) as u32 + 1;
        let day = match self.resolution {
            Resolution::Monthly => 1,
            Resolution::Daily => self.start.day(),
        };

        let start = NaiveDate::from_ymd_opt(year, month, day)
            .or_else(|| {
                NaiveDate::from_ymd_opt(year, month, 1)
                    .and_then(|first| first.checked_add_months(chrono::Months::new(1)))
                    .and_then(|next| next.pred_opt())
            })
            .ok_or_else(|| LinkageError::DateOutOfRange(self.to_string()))?;

        Ok(PeriodKey {
            start,
            resolution: self.resolution,
        })
    }

    /// Number of months from `self` through `end`, inclusive. Zero or negative when
    /// `end` comes first.
    pub fn month_count(&self, end: &PeriodKey) -> i64 {
        let ordinal = |date: NaiveDate| i64::from(date.year()) * 12 + i64::from(date.month0());
        ordinal(end.start) - ordinal(self.start) + 1
    }

    /// Every monthly key from `self` through `end`, inclusive.
    pub fn months_through(&self, end: &PeriodKey) -> Result<Vec<PeriodKey>, LinkageError> {
        let mut months = Vec::new();
        let mut current = self.clone();
        while current <= *end {
            let next = current.offset_months(1)?;
            months.push(current);
            current = next;
        }
        Ok(months)
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.resolution {
            Resolution::Monthly => write!(f, "{}", self.start.format("%Y-%m")),
            Resolution::Daily => write!(f, "{}", self.start.format("%Y-%m-%d")),
        }
    }
}

impl Serialize for PeriodKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Provenance of a published figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleSource {
    Manual,
    #[default]
    Official,
}

/// One published observation of a series.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSample {
    pub index_type: IndexType,
    pub date: PeriodKey,
    pub value: Decimal,
    pub source: SampleSource,
}

/// Which published figure a contract reads as its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkageSubType {
    /// Last figure officially published as of the calculation date.
    #[default]
    Known,
    /// Figure for the calculation month itself ("in respect of").
    #[serde(alias = "respect_of")]
    Current,
}

/// How the contractual ceiling is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CeilingBasis {
    /// The ceiling caps the total increase since the base date.
    #[default]
    Total,
    /// The ceiling is an annual rate, prorated over the elapsed time.
    Annual,
}

/// Linkage clause as read from the contract store, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub index_type: String,
    pub base_date: String,
    pub base_rent: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ceiling_percent: Option<Decimal>,
    #[serde(default)]
    pub floor_enabled: bool,
    #[serde(default)]
    pub sub_type: LinkageSubType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_linkage: Option<Decimal>,
    #[serde(default)]
    pub ceiling_basis: CeilingBasis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_base_value: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_target_value: Option<Decimal>,
}

impl LinkageConfig {
    pub fn new(
        index_type: impl Into<String>,
        base_date: impl Into<String>,
        base_rent: Decimal,
    ) -> Self {
        Self {
            label: None,
            index_type: index_type.into(),
            base_date: base_date.into(),
            base_rent,
            ceiling_percent: None,
            floor_enabled: false,
            sub_type: LinkageSubType::Known,
            target_date: None,
            partial_linkage: None,
            ceiling_basis: CeilingBasis::Total,
            manual_base_value: None,
            manual_target_value: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_ceiling(mut self, percent: Decimal) -> Self {
        self.ceiling_percent = Some(percent);
        self
    }

    pub fn with_floor(mut self) -> Self {
        self.floor_enabled = true;
        self
    }

    pub fn with_sub_type(mut self, sub_type: LinkageSubType) -> Self {
        self.sub_type = sub_type;
        self
    }

    pub fn with_target_date(mut self, target_date: impl Into<String>) -> Self {
        self.target_date = Some(target_date.into());
        self
    }

    pub fn with_partial_linkage(mut self, percent: Decimal) -> Self {
        self.partial_linkage = Some(percent);
        self
    }

    pub fn with_ceiling_basis(mut self, basis: CeilingBasis) -> Self {
        self.ceiling_basis = basis;
        self
    }

    pub fn with_manual_values(mut self, base: Option<Decimal>, target: Option<Decimal>) -> Self {
        self.manual_base_value = base;
        self.manual_target_value = target;
        self
    }

    /// Check the clause and convert it into typed terms. No lookups happen before this
    /// succeeds.
    pub fn validate(&self) -> Result<LinkageTerms, LinkageError> {
        let index_type: IndexType = self.index_type.parse()?;

        if self.base_rent <= Decimal::ZERO {
            return Err(LinkageError::NonPositiveBaseRent(self.base_rent));
        }

        let partial_linkage = self.partial_linkage.unwrap_or(Decimal::ONE_HUNDRED);
        if partial_linkage <= Decimal::ZERO || partial_linkage > Decimal::ONE_HUNDRED {
            return Err(LinkageError::InvalidPartialLinkage(partial_linkage));
        }

        if let (CeilingBasis::Annual, Some(ceiling)) = (self.ceiling_basis, self.ceiling_percent)
        {
            if ceiling < Decimal::ZERO {
                return Err(LinkageError::NegativeAnnualCeiling(ceiling));
            }
        }

        let base_period = index_type.period_key(&self.base_date)?;
        let target_override = self
            .target_date
            .as_deref()
            .map(|raw| index_type.period_key(raw))
            .transpose()?;

        Ok(LinkageTerms {
            label: self.label.clone(),
            index_type,
            base_period,
            base_rent: self.base_rent,
            ceiling_percent: self.ceiling_percent,
            floor_enabled: self.floor_enabled,
            sub_type: self.sub_type,
            target_override,
            partial_linkage,
            ceiling_basis: self.ceiling_basis,
            manual_base_value: self.manual_base_value,
            manual_target_value: self.manual_target_value,
        })
    }
}

/// Validated linkage clause.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkageTerms {
    pub label: Option<String>,
    pub index_type: IndexType,
    pub base_period: PeriodKey,
    pub base_rent: Decimal,
    pub ceiling_percent: Option<Decimal>,
    pub floor_enabled: bool,
    pub sub_type: LinkageSubType,
    pub target_override: Option<PeriodKey>,
    pub partial_linkage: Decimal,
    pub ceiling_basis: CeilingBasis,
    pub manual_base_value: Option<Decimal>,
    pub manual_target_value: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationStatus {
    Computed,
    /// Base or target figure has not been published (or could not be fetched).
    MissingData,
    /// A figure is zero or negative, which only happens with bad ingested data.
    InvalidIndexValue,
}

/// Outcome of linking one contract's rent to its index.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub index_type: IndexType,
    pub base_date_used: PeriodKey,
    pub target_date_used: PeriodKey,
    pub base_value: Option<Decimal>,
    pub target_value: Option<Decimal>,
    pub chain_factor: Decimal,
    pub percentage_change: Decimal,
    pub rent_change_percent: Decimal,
    pub base_rent: Decimal,
    pub new_rent: Decimal,
    pub clamped: bool,
    pub status: CalculationStatus,
}

impl CalculationResult {
    pub fn is_degraded(&self) -> bool {
        self.status != CalculationStatus::Computed
    }
}

/// Errors raised for caller mistakes. Missing index data is never one of these.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LinkageError {
    #[error("unrecognized index type '{0}'")]
    UnknownIndexType(String),
    #[error("'{value}' is not a valid {expected} date for index type {index_type}")]
    InvalidDate {
        index_type: IndexType,
        value: String,
        expected: &'static str,
    },
    #[error("date arithmetic on {0} left the supported calendar range")]
    DateOutOfRange(String),
    #[error("base rent must be greater than zero (got {0})")]
    NonPositiveBaseRent(Decimal),
    #[error("partial linkage must be within (0, 100] percent (got {0})")]
    InvalidPartialLinkage(Decimal),
    #[error("an annual ceiling cannot be negative (got {0})")]
    NegativeAnnualCeiling(Decimal),
    #[error("period start {start} is after period end {end}")]
    InvalidPeriod { start: String, end: String },
    #[error("a {months}-month period exceeds the {limit}-month reconciliation limit")]
    PeriodTooLong { months: i64, limit: i64 },
    #[error("index type {0} is published daily and cannot be reconciled month by month")]
    UnsupportedResolution(IndexType),
    #[error("no {index_type} figure is available on or before base period {period}")]
    NoBaseIndex { index_type: IndexType, period: String },
}
