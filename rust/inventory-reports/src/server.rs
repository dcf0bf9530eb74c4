use crate::{
    compose::ComposedQuery,
    config::AppConfig,
    db,
    error::{Result, ServiceError},
    executor::{PgExecutor, QueryExecutor},
    listing::{AssetQuery, InventoryListing, LicenseQuery, Listing},
    models::{AssetRecord, LicenseRecord},
    reports::{
        AssetSummary, CategoryCount, MonthlySeries, ReportEngine, ReportShape, WarrantyBreakdown,
        YearlySeries,
    },
    state::AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::{future::Future, sync::Arc};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// `?AgileReleaseTrain=` accepted by every report route.
#[derive(Debug, Default, Deserialize)]
pub struct DimensionQuery {
    #[serde(rename = "AgileReleaseTrain")]
    pub agile_release_train: Option<String>,
}

pub struct Server {
    config: Arc<AppConfig>,
    state: AppState,
}

impl Server {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let pool = db::connect_pool(&config).await?;
        Ok(Self::with_executor(config, Arc::new(PgExecutor::new(pool))))
    }

    /// Builds the service around any executor, e.g. an in-memory one.
    pub fn with_executor(config: AppConfig, executor: Arc<dyn QueryExecutor>) -> Self {
        let config = Arc::new(config);
        let reports = ReportEngine::new(Arc::clone(&executor), config.taxonomy.clone());
        let listing = InventoryListing::new(executor, config.default_limit, config.max_limit);
        let state = AppState::new(Arc::clone(&config), reports, listing);
        Self { config, state }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/healthz", get(Self::health))
            .route("/api/assets", get(Self::assets))
            .route("/api/assets/summary", get(Self::summary))
            .route("/api/assets/by-month", get(Self::by_month))
            .route("/api/assets/by-year", get(Self::by_year))
            .route("/api/assets/by-condition", get(Self::by_condition))
            .route("/api/assets/warranty-status", get(Self::warranty_status))
            .route("/api/licenses", get(Self::licenses))
            .route("/api/reports/:shape/sql", get(Self::preview))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.config.listen_addr;
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "inventory reports listening");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    async fn health() -> Json<serde_json::Value> {
        Json(json!({ "status": "ok" }))
    }

    async fn summary(
        State(state): State<AppState>,
        headers: HeaderMap,
        Query(query): Query<DimensionQuery>,
    ) -> Result<Json<AssetSummary>> {
        enforce_api_key(&headers, &state.config)?;
        let dimension = query.agile_release_train.as_deref();
        with_timeout(&state, state.reports.summary(dimension))
            .await
            .map(Json)
    }

    async fn by_month(
        State(state): State<AppState>,
        headers: HeaderMap,
        Query(query): Query<DimensionQuery>,
    ) -> Result<Json<MonthlySeries>> {
        enforce_api_key(&headers, &state.config)?;
        let dimension = query.agile_release_train.as_deref();
        with_timeout(&state, state.reports.monthly_series(dimension))
            .await
            .map(Json)
    }

    async fn by_year(
        State(state): State<AppState>,
        headers: HeaderMap,
        Query(query): Query<DimensionQuery>,
    ) -> Result<Json<YearlySeries>> {
        enforce_api_key(&headers, &state.config)?;
        let dimension = query.agile_release_train.as_deref();
        with_timeout(&state, state.reports.yearly_series(dimension))
            .await
            .map(Json)
    }

    async fn by_condition(
        State(state): State<AppState>,
        headers: HeaderMap,
        Query(query): Query<DimensionQuery>,
    ) -> Result<Json<Vec<CategoryCount>>> {
        enforce_api_key(&headers, &state.config)?;
        let dimension = query.agile_release_train.as_deref();
        with_timeout(&state, state.reports.category_breakdown(dimension))
            .await
            .map(Json)
    }

    async fn warranty_status(
        State(state): State<AppState>,
        headers: HeaderMap,
        Query(query): Query<DimensionQuery>,
    ) -> Result<Json<WarrantyBreakdown>> {
        enforce_api_key(&headers, &state.config)?;
        let dimension = query.agile_release_train.as_deref();
        with_timeout(&state, state.reports.warranty_breakdown(dimension))
            .await
            .map(Json)
    }

    async fn assets(
        State(state): State<AppState>,
        headers: HeaderMap,
        Query(query): Query<AssetQuery>,
    ) -> Result<Json<Listing<AssetRecord>>> {
        enforce_api_key(&headers, &state.config)?;
        with_timeout(&state, state.listing.assets(&query))
            .await
            .map(Json)
    }

    async fn licenses(
        State(state): State<AppState>,
        headers: HeaderMap,
        Query(query): Query<LicenseQuery>,
    ) -> Result<Json<Vec<LicenseRecord>>> {
        enforce_api_key(&headers, &state.config)?;
        with_timeout(&state, state.listing.licenses(&query))
            .await
            .map(Json)
    }

    async fn preview(
        State(state): State<AppState>,
        headers: HeaderMap,
        Path(shape): Path<String>,
        Query(query): Query<DimensionQuery>,
    ) -> Result<Json<ComposedQuery>> {
        enforce_api_key(&headers, &state.config)?;
        let shape: ReportShape = shape.parse()?;
        state
            .reports
            .preview(shape, query.agile_release_train.as_deref())
            .map(Json)
    }
}

async fn with_timeout<T>(state: &AppState, work: impl Future<Output = Result<T>>) -> Result<T> {
    let limit = state.config.request_timeout;
    tokio::time::timeout(limit, work)
        .await
        .map_err(|_| ServiceError::Timeout(limit))?
}

fn enforce_api_key(headers: &HeaderMap, config: &AppConfig) -> Result<()> {
    if let Some(expected) = &config.api_key {
        let provided = headers
            .get("x-api-key")
            .and_then(|value| value.to_str().ok());

        if provided != Some(expected.as_str()) {
            return Err(ServiceError::Auth);
        }
    }

    Ok(())
}
