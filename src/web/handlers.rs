//! HTTP request handlers.

use super::AppState;
use crate::service::{ApiError, PageQuery};

use axum::{
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Json},
};

// ============================================================================
// API: Categories & summaries
// ============================================================================

pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.health())
}

pub async fn handle_categories(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.categories())
}

pub async fn handle_summary(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.summaries().await)
}

pub async fn handle_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.stats().await)
}

// ============================================================================
// API: Reports
// ============================================================================

pub async fn handle_recent_reports(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.recent(&query).await?))
}

pub async fn handle_category_reports(
    State(state): State<AppState>,
    Path(category): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let category = state.service.category(&category)?;
    Ok(Json(state.service.list(category, &query).await?))
}

pub async fn handle_report(
    State(state): State<AppState>,
    Path((category, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let category = state.service.category(&category)?;
    Ok(Json(state.service.report(category, &id).await?))
}

pub async fn handle_report_html(
    State(state): State<AppState>,
    Path((category, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let category = state.service.category(&category)?;
    Ok(Html(state.service.html(category, &id).await?))
}

// ============================================================================
// API: History
// ============================================================================

pub async fn handle_history(
    State(state): State<AppState>,
    Path(category): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let category = state.service.category(&category)?;
    Ok(Json(state.service.history(category, &query).await?))
}
