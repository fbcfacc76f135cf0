// Barangay Planner - Web Server
// REST API with Axum over the ranking and budgeting pipelines

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use barangay_planner::{telemetry, HouseholdRecord, Planner, PlannerConfig, PlannerError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
struct AppState {
    planner: Arc<Planner>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

#[derive(Deserialize)]
struct RecommendRequest {
    #[serde(default)]
    households: Vec<HouseholdRecord>,
}

#[derive(Deserialize)]
struct LedgerUpload {
    /// Original file name; selects the ledger collection
    filename: String,
}

#[derive(Deserialize)]
struct BudgetRequest {
    year: i32,
}

#[derive(Deserialize)]
struct TotalBudgetRequest {
    year: i32,
    /// Number or string such as "1,250,000"
    amount: serde_json::Value,
}

/// `missing` is the status for NoData; other caller errors are 400
fn error_response(e: PlannerError, missing: StatusCode) -> Response {
    let status = match &e {
        PlannerError::NoData(_) => missing,
        _ if e.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %e, "request failed");
    } else {
        tracing::warn!(error = %e, "request rejected");
    }

    (status, Json(ApiResponse::<()>::err(e.to_string()))).into_response()
}

/// Run a planner call on the blocking pool and wrap its result
async fn run_blocking<T, F>(state: AppState, f: F) -> Response
where
    T: Serialize + Send + 'static,
    F: FnOnce(&Planner) -> barangay_planner::Result<T> + Send + 'static,
{
    run_blocking_with(state, StatusCode::BAD_REQUEST, f).await
}

async fn run_blocking_with<T, F>(state: AppState, missing: StatusCode, f: F) -> Response
where
    T: Serialize + Send + 'static,
    F: FnOnce(&Planner) -> barangay_planner::Result<T> + Send + 'static,
{
    let planner = state.planner.clone();

    match tokio::task::spawn_blocking(move || f(&planner)).await {
        Ok(Ok(data)) => (StatusCode::OK, Json(ApiResponse::ok(data))).into_response(),
        Ok(Err(e)) => error_response(e, missing),
        Err(e) => {
            tracing::error!(error = %e, "blocking task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<()>::err("internal error".to_string())),
            )
                .into_response()
        }
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/recommendations - Rank households and store the result
async fn create_recommendations(
    State(state): State<AppState>,
    Json(request): Json<RecommendRequest>,
) -> Response {
    run_blocking(state, move |planner| {
        planner.generate_recommendations(&request.households)
    })
    .await
}

/// POST /api/recommendations/generate - Rank the stored households (404 when none)
async fn generate_from_stored(State(state): State<AppState>) -> Response {
    run_blocking_with(state, StatusCode::NOT_FOUND, |planner| {
        planner.generate_from_stored()
    })
    .await
}

/// GET /api/households - All stored households
async fn get_households(State(state): State<AppState>) -> Response {
    run_blocking(state, |planner| planner.households()).await
}

/// POST /api/households - Add one household
async fn add_household(
    State(state): State<AppState>,
    Json(household): Json<HouseholdRecord>,
) -> Response {
    run_blocking(state, move |planner| planner.add_household(household)).await
}

/// POST /api/households/upload - Store every row of a survey CSV body
async fn upload_households(State(state): State<AppState>, body: String) -> Response {
    run_blocking(state, move |planner| planner.import_households_csv(&body)).await
}

/// GET /api/recommendations - Latest stored recommendations
async fn get_recommendations(State(state): State<AppState>) -> Response {
    run_blocking(state, |planner| planner.latest_record()).await
}

/// POST /api/budget - Predict and reconcile budgets for a year
async fn create_budget(
    State(state): State<AppState>,
    Json(request): Json<BudgetRequest>,
) -> Response {
    run_blocking(state, move |planner| planner.predict_budget(request.year)).await
}

/// GET /api/budget/categories - Budget totals per program category
async fn get_budget_categories(State(state): State<AppState>) -> Response {
    run_blocking(state, |planner| planner.category_breakdown()).await
}

/// GET /api/total-budget - All official totals, newest year first
async fn get_total_budgets(State(state): State<AppState>) -> Response {
    run_blocking(state, |planner| planner.total_budgets()).await
}

/// POST /api/total-budget - Set the official total for a year
async fn set_total_budget(
    State(state): State<AppState>,
    Json(request): Json<TotalBudgetRequest>,
) -> Response {
    let amount = match &request.amount {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    run_blocking(state, move |planner| {
        planner.set_total_budget(request.year, &amount)?;
        planner.official_total(request.year)
    })
    .await
}

/// GET /api/ledger - Row counts and PS/MOOE/CO sums per collection
async fn get_ledger(State(state): State<AppState>) -> Response {
    run_blocking(state, |planner| planner.ledger_summary()).await
}

/// POST /api/ledger?filename=... - Import a CSV body into the collection its name selects
async fn upload_ledger(
    State(state): State<AppState>,
    Query(upload): Query<LedgerUpload>,
    body: String,
) -> Response {
    run_blocking(state, move |planner| {
        planner.import_ledger_csv(&upload.filename, &body)
    })
    .await
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();

    println!("🌐 Barangay Planner - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = PlannerConfig::from_env().context("Invalid configuration")?;

    // Artifacts are loaded before binding; a missing one stops startup
    let planner = Planner::from_config(&config).context("Failed to load planner")?;
    println!("✓ Database opened: {:?}", config.database_path);
    println!("✓ Catalog loaded: {} programs", planner.catalog().len());

    let state = AppState {
        planner: Arc::new(planner),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route(
            "/recommendations",
            get(get_recommendations).post(create_recommendations),
        )
        .route("/recommendations/generate", post(generate_from_stored))
        .route("/households", get(get_households).post(add_household))
        .route("/households/upload", post(upload_households))
        .route("/budget", post(create_budget))
        .route("/budget/categories", get(get_budget_categories))
        .route("/total-budget", get(get_total_budgets).post(set_total_budget))
        .route("/ledger", get(get_ledger).post(upload_ledger))
        .with_state(state);

    let app = Router::new().nest("/api", api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr.as_str())
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    println!("\n🚀 Server running on http://{}", config.bind_addr);
    println!("   API: http://{}/api/recommendations", config.bind_addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
