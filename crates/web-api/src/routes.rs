use axum::{
    extract::{State, WebSocketUpgrade},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::{auth::VerifiedUser, state::AppState, ws_connection::WebSocketConnection};

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    connections: usize,
}

/// 构建路由
///
/// 身份由外层中间件以 [`VerifiedUser`] 扩展的形式提供，例如 [`crate::trusted_identity_header`]；
/// 缺少身份的升级请求返回 401。
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/chat", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new().route("/ws", get(websocket_upgrade))
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            connections: state.dispatcher.len(),
        }),
    )
}

async fn websocket_upgrade(
    VerifiedUser(username): VerifiedUser,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    tracing::debug!(username = %username, "WebSocket upgrade");
    ws.on_upgrade(move |socket| WebSocketConnection::new(socket, state, username).run())
}
