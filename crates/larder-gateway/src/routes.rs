use axum::{
    Json, Router,
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use larder_types::protocol::HealthResponse;
use larder_types::store_id::is_valid_store_id;

use crate::authority::Authority;
use crate::connection;
use crate::registry::Authorities;

#[derive(Clone)]
pub struct AppState {
    pub authorities: Authorities,
}

pub fn router(authorities: Authorities) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/{store_id}", get(ws_upgrade))
        .route("/{store_id}/index-data", get(index_data))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { authorities })
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        loaded_stores: state.authorities.loaded_count().await,
    })
}

async fn ws_upgrade(
    State(state): State<AppState>,
    Path(store_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let authority = authority_for(&state, &store_id).await?;
    Ok(ws.on_upgrade(move |socket| connection::handle_connection(socket, authority)))
}

/// Live tables and values of a store, for readers that don't sync.
async fn index_data(
    State(state): State<AppState>,
    Path(store_id): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let authority = authority_for(&state, &store_id).await?;
    Ok(Json(authority.snapshot()))
}

async fn authority_for(
    state: &AppState,
    store_id: &str,
) -> Result<std::sync::Arc<Authority>, StatusCode> {
    if !is_valid_store_id(store_id) {
        warn!("Rejected store id {:?}", store_id);
        return Err(StatusCode::BAD_REQUEST);
    }
    state.authorities.get_or_load(store_id).await.map_err(|e| {
        error!("Failed to load authority {}: {}", store_id, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
