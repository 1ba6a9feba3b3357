//! Query service: validation, pagination and error mapping over the store.

use crate::aggregate;
use crate::config::ServerConfig;
use crate::reports::{
    Category, CategorySnapshot, CategorySummary, GlobalStats, HistoryPoint, Report, ReportStore,
    StoreError, StoreStats,
};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Errors visible to API clients.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("{0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UnknownCategory(_) | StoreError::NotFound { .. } => {
                ApiError::NotFound(e.to_string())
            }
            StoreError::Io { .. } | StoreError::RefreshAborted(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Raw `limit`/`offset` query parameters, validated by the service.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub limit: Option<String>,
    #[serde(default)]
    pub offset: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReportListing {
    pub reports: Vec<Report>,
    /// Files that failed to parse and were left out.
    pub skipped: usize,
}

#[derive(Debug, Serialize)]
pub struct ReportPage {
    pub reports: Vec<Report>,
    pub skipped: usize,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<HistoryPoint>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub overall_summary: GlobalStats,
}

#[derive(Debug, Serialize)]
pub struct CategoriesResponse {
    pub categories: Vec<Category>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub reports_root: String,
    pub store: StoreStats,
}

/// Answers dashboard queries from freshly refreshed snapshots.
#[derive(Clone)]
pub struct QueryService {
    store: ReportStore,
    refresh_timeout: Duration,
    default_limit: usize,
    max_limit: usize,
    history_limit: usize,
}

impl QueryService {
    pub fn new(store: ReportStore, cfg: &ServerConfig) -> Self {
        Self {
            store,
            refresh_timeout: cfg.refresh_timeout,
            default_limit: cfg.default_limit,
            max_limit: cfg.max_limit,
            history_limit: cfg.history_limit,
        }
    }

    pub fn categories(&self) -> CategoriesResponse {
        CategoriesResponse {
            categories: self.store.list_categories(),
        }
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "ok",
            reports_root: self.store.root().display().to_string(),
            store: self.store.stats(),
        }
    }

    /// Resolve a path segment to a configured category.
    pub fn category(&self, raw: &str) -> Result<Category, ApiError> {
        let category: Category = raw
            .parse()
            .map_err(|e: crate::reports::UnknownCategory| ApiError::NotFound(e.to_string()))?;
        if !self.store.list_categories().contains(&category) {
            return Err(ApiError::NotFound(format!("category {} is not configured", category)));
        }
        Ok(category)
    }

    fn limit(&self, raw: Option<&str>, default: usize) -> Result<usize, ApiError> {
        Ok(parse_non_negative("limit", raw)?
            .unwrap_or(default)
            .min(self.max_limit))
    }

    fn offset(raw: Option<&str>) -> Result<usize, ApiError> {
        Ok(parse_non_negative("offset", raw)?.unwrap_or(0))
    }

    /// Refresh one category, bounded by the refresh timeout.
    ///
    /// On timeout or scan failure the last published snapshot is served; the
    /// refresh itself keeps running.
    async fn fresh_snapshot(&self, category: Category) -> Result<Arc<CategorySnapshot>, ApiError> {
        match tokio::time::timeout(self.refresh_timeout, self.store.refresh(category)).await {
            Ok(Ok(snapshot)) => Ok(snapshot),
            Ok(Err(StoreError::UnknownCategory(c))) => Err(StoreError::UnknownCategory(c).into()),
            Ok(Err(e)) => {
                tracing::warn!("Refresh of {} failed, serving last snapshot: {}", category, e);
                Ok(self.store.snapshot(category)?)
            }
            Err(_) => {
                tracing::warn!(
                    "Refresh of {} exceeded {:?}, serving last snapshot",
                    category,
                    self.refresh_timeout
                );
                Ok(self.store.snapshot(category)?)
            }
        }
    }

    /// Refresh every category in parallel. Categories never fail each other.
    async fn fresh_snapshots(&self) -> Vec<Arc<CategorySnapshot>> {
        let handles: Vec<_> = self
            .store
            .list_categories()
            .into_iter()
            .map(|category| {
                let svc = self.clone();
                (category, tokio::spawn(async move { svc.fresh_snapshot(category).await }))
            })
            .collect();

        let mut snapshots = Vec::with_capacity(handles.len());
        for (category, handle) in handles {
            match handle.await {
                Ok(Ok(snapshot)) => snapshots.push(snapshot),
                Ok(Err(e)) => tracing::warn!("Skipping {} in aggregate view: {}", category, e),
                Err(e) => {
                    tracing::error!("Refresh task for {} panicked: {}", category, e);
                    if let Ok(snapshot) = self.store.snapshot(category) {
                        snapshots.push(snapshot);
                    }
                }
            }
        }
        snapshots
    }

    pub async fn summaries(&self) -> BTreeMap<Category, CategorySummary> {
        self.fresh_snapshots()
            .await
            .iter()
            .map(|s| (s.category(), aggregate::category_summary(s)))
            .collect()
    }

    pub async fn recent(&self, query: &PageQuery) -> Result<ReportListing, ApiError> {
        let limit = self.limit(query.limit.as_deref(), self.default_limit)?;
        let snapshots = self.fresh_snapshots().await;

        Ok(ReportListing {
            reports: aggregate::recent_across(&snapshots, limit),
            skipped: snapshots.iter().map(|s| s.skipped().len()).sum(),
        })
    }

    pub async fn list(&self, category: Category, query: &PageQuery) -> Result<ReportPage, ApiError> {
        let limit = self.limit(query.limit.as_deref(), self.default_limit)?;
        let offset = Self::offset(query.offset.as_deref())?;
        let snapshot = self.fresh_snapshot(category).await?;

        Ok(ReportPage {
            reports: snapshot.page(limit, offset),
            skipped: snapshot.skipped().len(),
            total: snapshot.len(),
            limit,
            offset,
        })
    }

    pub async fn report(&self, category: Category, id: &str) -> Result<Report, ApiError> {
        let snapshot = self.fresh_snapshot(category).await?;
        snapshot.get(id).cloned().ok_or_else(|| {
            ApiError::NotFound(format!("report {} not found in {}", id, category))
        })
    }

    /// Bytes of the rendered HTML report for `id`.
    pub async fn html(&self, category: Category, id: &str) -> Result<Vec<u8>, ApiError> {
        self.fresh_snapshot(category).await?;
        let path = self.store.html_path(category, id).await?;

        tokio::fs::read(&path).await.map_err(|e| {
            tracing::debug!("HTML report {} unreadable: {}", path.display(), e);
            ApiError::NotFound(format!("html report {} not available", id))
        })
    }

    pub async fn history(&self, category: Category, query: &PageQuery) -> Result<HistoryResponse, ApiError> {
        let limit = self.limit(query.limit.as_deref(), self.history_limit)?;
        let snapshot = self.fresh_snapshot(category).await?;

        Ok(HistoryResponse {
            history: aggregate::history(&snapshot, limit),
        })
    }

    pub async fn stats(&self) -> StatsResponse {
        let snapshots = self.fresh_snapshots().await;
        StatsResponse {
            overall_summary: aggregate::global_stats(&snapshots),
        }
    }
}

fn parse_non_negative(name: &str, raw: Option<&str>) -> Result<Option<usize>, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s
            .parse::<usize>()
            .map(Some)
            .map_err(|_| ApiError::InvalidParameter(format!("{} must be a non-negative integer, got {:?}", name, s))),
    }
}
