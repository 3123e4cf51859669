use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::{Extension, Json};

use crate::error::{ApiResult, Result};
use crate::services::auth::AccessToken;
use crate::services::wallet::{AuthorizedWallet, Balance, RegisterWallet};

use super::{AppState, SIGNATURE_HEADER};

fn signature(headers: &HeaderMap) -> &str {
    headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

pub async fn create_wallet(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RegisterWallet>,
) -> Result<ApiResult<AuthorizedWallet>> {
    let wallet = state
        .wallet_service
        .create_wallet(request, signature(&headers))
        .await?;
    Ok(ApiResult(wallet))
}

pub async fn get_wallet(
    State(state): State<AppState>,
    Path(address): Path<String>,
    headers: HeaderMap,
) -> Result<ApiResult<AuthorizedWallet>> {
    let wallet = state
        .wallet_service
        .get_wallet(&address, signature(&headers))
        .await?;
    Ok(ApiResult(wallet))
}

pub async fn get_balance(
    State(state): State<AppState>,
    Extension(token): Extension<AccessToken>,
) -> Result<ApiResult<Balance>> {
    let balance = state.wallet_service.balance(&token.wallet).await?;
    Ok(ApiResult(balance))
}
