use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::{AppError, Result};
use crate::notifier::Notifier;
use crate::services::{AuthService, TransferService, WalletService};

pub mod subscribe;
pub mod transaction;
pub mod transfer;
pub mod wallet;

pub const SIGNATURE_HEADER: &str = "x-signature";

#[derive(Clone)]
pub struct AppState {
    pub wallet_service: Arc<WalletService>,
    pub transfer_service: Arc<TransferService>,
    pub auth: Arc<AuthService>,
    pub notifier: Notifier,
}

impl AppState {
    pub fn new(
        wallet_service: Arc<WalletService>,
        transfer_service: Arc<TransferService>,
        auth: Arc<AuthService>,
        notifier: Notifier,
    ) -> Self {
        Self {
            wallet_service,
            transfer_service,
            auth,
            notifier,
        }
    }
}

/// Bearer-token guard for the private route group; verified claims are made
/// available to handlers through request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let token = authorization
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".into()))?;

    let claims = state.auth.verify(token)?;
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}
