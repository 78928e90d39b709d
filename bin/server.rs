// Rank Ledger - Web Server
// REST API with Axum over the SQLite-backed rank service

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use rank_ledger::{
    BeltCatalog, BeltInfo, LedgerConfig, PersistenceStore, PromotionOutcome, PromotionRequest,
    RankError, RankHistoryEntry, RankService, RankState, SqliteStore,
};

#[derive(Parser)]
#[command(name = "rank-server", about = "REST API over the rank ledger", version)]
struct Args {
    /// JSON config file
    #[arg(long, env = "RANK_LEDGER_CONFIG")]
    config: Option<PathBuf>,

    /// Database file (overrides config)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Listen address (overrides config)
    #[arg(long)]
    bind: Option<String>,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    service: Arc<RankService<SqliteStore>>,
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

/// Map library errors onto HTTP status codes
fn error_response(e: RankError) -> Response {
    let status = match &e {
        RankError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        RankError::MemberNotFound(_) => StatusCode::NOT_FOUND,
        RankError::MemberExists(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %e, "request failed");
    }

    (status, Json(ApiResponse::<()>::err(e.to_string()))).into_response()
}

/// Member response
#[derive(Serialize)]
struct MemberResponse {
    member_id: String,
    display_name: String,
    belt_label: &'static str,
    belt_color: &'static str,
    rank: RankState,
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/belts - Belt catalog
async fn list_belts() -> impl IntoResponse {
    Json(ApiResponse::<&'static [BeltInfo]>::ok(BeltCatalog::all()))
}

/// GET /api/members/:id - Current rank
async fn get_member(State(state): State<AppState>, Path(member_id): Path<String>) -> Response {
    match state.service.store().read_member(&member_id) {
        Ok(member) => {
            let rank = member.rank_state();
            let response = MemberResponse {
                member_id: member.member_id,
                display_name: member.display_name,
                belt_label: BeltCatalog::label(&rank.belt),
                belt_color: BeltCatalog::display_color(&rank.belt),
                rank,
            };
            (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// POST /api/members/:id/promotions - Apply a promotion
async fn promote_member(
    State(state): State<AppState>,
    Path(member_id): Path<String>,
    Json(request): Json<PromotionRequest>,
) -> Response {
    // An unnamed actor is filled in by the service from config
    match state.service.promote_member(&member_id, &request) {
        Ok(outcome) => (StatusCode::CREATED, Json(ApiResponse::<PromotionOutcome>::ok(outcome))).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/members/:id/history?limit=N - Newest-first promotions
async fn get_history(
    State(state): State<AppState>,
    Path(member_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    match state.service.get_rank_history(&member_id, query.limit) {
        Ok(entries) => {
            let entries: Vec<RankHistoryEntry> = entries.collect();
            (StatusCode::OK, Json(ApiResponse::ok(entries))).into_response()
        }
        Err(e) => error_response(e),
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = LedgerConfig::load(args.config.as_deref())?;
    if let Some(db) = args.db {
        config.database_path = db;
    }
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    tracing_subscriber::fmt()
        .with_env_filter(config.log_filter())
        .init();

    let store = SqliteStore::open(&config.database_path)?;
    let service = RankService::new(store)
        .with_history_limit(config.history_limit)
        .with_default_actor(config.default_actor.clone());

    let state = AppState {
        service: Arc::new(service),
    };

    let app = Router::new()
        .route("/api/health", get(health_check))
        .route("/api/belts", get(list_belts))
        .route("/api/members/:id", get(get_member))
        .route("/api/members/:id/promotions", axum::routing::post(promote_member))
        .route("/api/members/:id/history", get(get_history))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Rank ledger server listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
