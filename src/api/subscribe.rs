use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::Extension;

use crate::services::auth::AccessToken;

use super::AppState;

/// Upgrade to a WebSocket subscription for the authenticated wallet.
pub async fn subscribe(
    State(state): State<AppState>,
    Extension(token): Extension<AccessToken>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        state.notifier.subscribe(token.wallet, socket).await;
    })
}
