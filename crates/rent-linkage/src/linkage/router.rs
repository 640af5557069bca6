use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;

use super::domain::{IndexType, LinkageConfig};
use super::projection::ProjectionAggregator;
use super::reconciliation::ReconciliationRequest;
use super::repository::IndexStore;

#[derive(Debug, Deserialize)]
pub struct CalculateRequest {
    pub config: LinkageConfig,
    #[serde(default)]
    pub today: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub configs: Vec<LinkageConfig>,
    #[serde(default)]
    pub today: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Deserialize)]
pub struct PulseQuery {
    /// Comma separated index types; all series when absent.
    #[serde(default)]
    pub types: Option<String>,
    /// `YYYY-MM` or `YYYY-MM-DD`.
    #[serde(default)]
    pub base_date: Option<String>,
}

/// Router exposing the linkage engine and read-only index views.
pub fn linkage_router<S>(aggregator: Arc<ProjectionAggregator<S>>) -> Router
where
    S: IndexStore + 'static,
{
    Router::new()
        .route("/api/v1/linkage/calculate", post(calculate_handler::<S>))
        .route("/api/v1/linkage/batch", post(batch_handler::<S>))
        .route("/api/v1/linkage/reconcile", post(reconcile_handler::<S>))
        .route("/api/v1/indices/pulse", get(pulse_handler::<S>))
        .route("/api/v1/indices/:index_type/latest", get(latest_handler::<S>))
        .route("/api/v1/indices/:index_type/span", get(span_handler::<S>))
        .route("/api/v1/indices/:index_type/range", get(range_handler::<S>))
        .with_state(aggregator)
}

fn today_or_local(today: Option<NaiveDate>) -> NaiveDate {
    today.unwrap_or_else(|| Local::now().date_naive())
}

pub(crate) async fn calculate_handler<S>(
    State(aggregator): State<Arc<ProjectionAggregator<S>>>,
    Json(request): Json<CalculateRequest>,
) -> Result<Response, AppError>
where
    S: IndexStore + 'static,
{
    let today = today_or_local(request.today);
    let result = aggregator.calculate(&request.config, today).await?;
    Ok((StatusCode::OK, Json(result)).into_response())
}

pub(crate) async fn batch_handler<S>(
    State(aggregator): State<Arc<ProjectionAggregator<S>>>,
    Json(request): Json<BatchRequest>,
) -> Response
where
    S: IndexStore + 'static,
{
    let today = today_or_local(request.today);
    let results = aggregator.calculate_batch(&request.configs, today).await;
    (StatusCode::OK, Json(json!({ "today": today, "results": results }))).into_response()
}

pub(crate) async fn reconcile_handler<S>(
    State(aggregator): State<Arc<ProjectionAggregator<S>>>,
    Json(request): Json<ReconciliationRequest>,
) -> Result<Response, AppError>
where
    S: IndexStore + 'static,
{
    let report = aggregator.reconcile(&request).await?;
    Ok((StatusCode::OK, Json(report)).into_response())
}

pub(crate) async fn latest_handler<S>(
    State(aggregator): State<Arc<ProjectionAggregator<S>>>,
    Path(index_type): Path<String>,
) -> Result<Response, AppError>
where
    S: IndexStore + 'static,
{
    let index_type: IndexType = index_type.parse()?;

    let response = match aggregator.client().get_latest(index_type).await {
        Some(sample) => (StatusCode::OK, Json(sample)).into_response(),
        None => {
            let payload = json!({ "index_type": index_type, "latest": serde_json::Value::Null });
            (StatusCode::OK, Json(payload)).into_response()
        }
    };
    Ok(response)
}

pub(crate) async fn span_handler<S>(
    State(aggregator): State<Arc<ProjectionAggregator<S>>>,
    Path(index_type): Path<String>,
) -> Result<Response, AppError>
where
    S: IndexStore + 'static,
{
    let index_type: IndexType = index_type.parse()?;
    Ok((StatusCode::OK, Json(aggregator.span(index_type).await)).into_response())
}

pub(crate) async fn range_handler<S>(
    State(aggregator): State<Arc<ProjectionAggregator<S>>>,
    Path(index_type): Path<String>,
    Query(query): Query<RangeQuery>,
) -> Result<Response, AppError>
where
    S: IndexStore + 'static,
{
    let index_type: IndexType = index_type.parse()?;
    let samples = aggregator.history(index_type, &query.start, &query.end).await?;
    Ok((StatusCode::OK, Json(samples)).into_response())
}

pub(crate) async fn pulse_handler<S>(
    State(aggregator): State<Arc<ProjectionAggregator<S>>>,
    Query(query): Query<PulseQuery>,
) -> Result<Response, AppError>
where
    S: IndexStore + 'static,
{
    let index_types = match query.types.as_deref() {
        Some(raw) => raw
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(str::parse::<IndexType>)
            .collect::<Result<Vec<_>, _>>()?,
        None => IndexType::ALL.to_vec(),
    };

    // Full dates keep their day for currency series; a bare month means its first day.
    let base_date = query
        .base_date
        .as_deref()
        .map(|raw| {
            IndexType::Usd
                .period_key(raw)
                .or_else(|_| IndexType::Cpi.period_key(raw))
        })
        .transpose()?
        .map(|period| period.start());

    let pulses = aggregator.pulse(&index_types, base_date).await;
    Ok((StatusCode::OK, Json(pulses)).into_response())
}
