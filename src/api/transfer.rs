use axum::extract::State;
use axum::{Extension, Json};

use crate::error::{ApiResult, Result};
use crate::services::auth::AccessToken;
use crate::services::transfer::{
    NewTransferRequest, QueuedTransfer, SignedTransfer, TaxEstimation, UnsignedTransfer,
};

use super::AppState;

pub async fn estimate_tax(
    State(state): State<AppState>,
    Extension(token): Extension<AccessToken>,
    Json(request): Json<NewTransferRequest>,
) -> Result<ApiResult<TaxEstimation>> {
    let estimation = state
        .transfer_service
        .estimate_tax(&token.wallet, &request)
        .await?;
    Ok(ApiResult(estimation))
}

pub async fn create_transfer(
    State(state): State<AppState>,
    Extension(token): Extension<AccessToken>,
    Json(request): Json<NewTransferRequest>,
) -> Result<ApiResult<Vec<UnsignedTransfer>>> {
    let unsigned = state
        .transfer_service
        .create_transfer(&token.wallet, &request)
        .await?;
    Ok(ApiResult(unsigned))
}

pub async fn confirm_transfer(
    State(state): State<AppState>,
    Extension(token): Extension<AccessToken>,
    Json(request): Json<SignedTransfer>,
) -> Result<ApiResult<QueuedTransfer>> {
    let queued = state
        .transfer_service
        .confirm_transfer(&token.wallet, &request)
        .await?;
    Ok(ApiResult(queued))
}
