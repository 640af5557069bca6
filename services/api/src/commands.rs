use crate::infra::load_store;
use chrono::{Local, NaiveDate};
use clap::{Args, ValueEnum};
use rent_linkage::config::AppConfig;
use rent_linkage::error::AppError;
use rent_linkage::linkage::{
    CalculationResult, CeilingBasis, InMemoryIndexStore, IndexPulse, IndexType, LinkageConfig,
    LinkageSubType, ProjectionAggregator, ProjectionSettings,
};
use rent_linkage::telemetry;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub(crate) enum SubTypeArg {
    #[default]
    Known,
    Current,
}

impl From<SubTypeArg> for LinkageSubType {
    fn from(value: SubTypeArg) -> Self {
        match value {
            SubTypeArg::Known => LinkageSubType::Known,
            SubTypeArg::Current => LinkageSubType::Current,
        }
    }
}

#[derive(Args, Debug)]
pub(crate) struct CalculateArgs {
    /// Index the rent is linked to (cpi, housing, construction, usd, eur)
    #[arg(long)]
    pub(crate) index_type: String,
    /// Base date: YYYY-MM for monthly indices, YYYY-MM-DD for currencies
    #[arg(long)]
    pub(crate) base_date: String,
    /// Rent at the base date
    #[arg(long)]
    pub(crate) base_rent: Decimal,
    /// Maximum increase in percent
    #[arg(long)]
    pub(crate) ceiling: Option<Decimal>,
    /// Treat the ceiling as a yearly rate prorated over the linkage period
    #[arg(long)]
    pub(crate) annual_ceiling: bool,
    /// Never let the rent drop below the base rent
    #[arg(long)]
    pub(crate) floor: bool,
    /// Which published figure the contract reads
    #[arg(long, value_enum, default_value_t = SubTypeArg::Known)]
    pub(crate) sub_type: SubTypeArg,
    /// Link to this period instead of the one implied by --today
    #[arg(long)]
    pub(crate) target_date: Option<String>,
    /// Share of the index movement passed through, in percent
    #[arg(long)]
    pub(crate) partial: Option<Decimal>,
    /// Evaluation date (defaults to today)
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// CSV of index figures (overrides INDEX_DATA_CSV)
    #[arg(long)]
    pub(crate) data: Option<PathBuf>,
    /// Print the result as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct PulseArgs {
    /// Measure movement since this date (YYYY-MM-DD)
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) since: Option<NaiveDate>,
    /// CSV of index figures (overrides INDEX_DATA_CSV)
    #[arg(long)]
    pub(crate) data: Option<PathBuf>,
}

fn aggregator_for(data: Option<PathBuf>) -> Result<ProjectionAggregator<InMemoryIndexStore>, AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let path = data.or_else(|| config.engine.index_data_path.clone());
    let store = load_store(path.as_deref())?;
    Ok(ProjectionAggregator::new(Arc::new(store))
        .with_settings(ProjectionSettings::from(&config.engine)))
}

pub(crate) async fn run_calculate(args: CalculateArgs) -> Result<(), AppError> {
    let CalculateArgs {
        index_type,
        base_date,
        base_rent,
        ceiling,
        annual_ceiling,
        floor,
        sub_type,
        target_date,
        partial,
        today,
        data,
        json,
    } = args;

    let mut config = LinkageConfig::new(index_type, base_date, base_rent).with_sub_type(sub_type.into());
    if let Some(ceiling) = ceiling {
        config = config.with_ceiling(ceiling);
    }
    if annual_ceiling {
        config = config.with_ceiling_basis(CeilingBasis::Annual);
    }
    if floor {
        config = config.with_floor();
    }
    if let Some(target_date) = target_date {
        config = config.with_target_date(target_date);
    }
    if let Some(partial) = partial {
        config = config.with_partial_linkage(partial);
    }

    let today = today.unwrap_or_else(|| Local::now().date_naive());
    let aggregator = aggregator_for(data)?;
    let result = aggregator.calculate(&config, today).await?;

    if json {
        let payload = serde_json::to_string_pretty(&result).map_err(std::io::Error::other)?;
        println!("{payload}");
    } else {
        render_result(&result, today);
    }
    Ok(())
}

pub(crate) async fn run_pulse(args: PulseArgs) -> Result<(), AppError> {
    let aggregator = aggregator_for(args.data)?;
    let pulses = aggregator.pulse(&IndexType::ALL, args.since).await;
    render_pulse(&pulses, args.since);
    Ok(())
}

fn render_result(result: &CalculationResult, today: NaiveDate) {
    println!("Rent linkage ({} as of {})", result.index_type, today);
    println!(
        "  Base:   {} = {}",
        result.base_date_used,
        display_figure(result.base_value)
    );
    println!(
        "  Target: {} = {}",
        result.target_date_used,
        display_figure(result.target_value)
    );
    if result.chain_factor != Decimal::ONE {
        println!("  Chain factor: {}", result.chain_factor);
    }
    println!("  Index change: {}%", result.percentage_change);
    println!(
        "  Rent: {} -> {} ({}%{})",
        result.base_rent,
        result.new_rent,
        result.rent_change_percent,
        if result.clamped { ", clamped" } else { "" }
    );
    if result.is_degraded() {
        println!("  Status: {:?}, base rent kept", result.status);
    }
}

fn render_pulse(pulses: &[IndexPulse], since: Option<NaiveDate>) {
    if pulses.is_empty() {
        println!("No index data loaded");
        return;
    }

    println!("Index pulse");
    for pulse in pulses {
        let change = match (since, pulse.change_percent) {
            (Some(date), Some(change)) => format!(" ({change}% since {date})"),
            (Some(date), None) => format!(" (no figure for {date})"),
            (None, _) => String::new(),
        };
        println!(
            "  {:<12} {} = {}{}",
            pulse.index_type.to_string(),
            pulse.latest.date,
            pulse.latest.value,
            change
        );
    }
}

fn display_figure(value: Option<Decimal>) -> String {
    value
        .map(|value| value.to_string())
        .unwrap_or_else(|| "unpublished".to_string())
}
