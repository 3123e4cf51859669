use axum::extract::{Path, Query, State};
use axum::Extension;
use serde::Deserialize;

use crate::error::{ApiResult, Result};
use crate::services::auth::AccessToken;
use crate::services::transfer::{HistoryFilter, HistoryItem, TransactionHistory};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default)]
    pub after: u64,
    #[serde(default)]
    pub skip: u64,
    pub limit: Option<u64>,
}

pub async fn transaction_history(
    State(state): State<AppState>,
    Extension(token): Extension<AccessToken>,
    Query(params): Query<HistoryParams>,
) -> Result<ApiResult<TransactionHistory>> {
    let history = state
        .transfer_service
        .transaction_history(
            &token.wallet,
            HistoryFilter {
                after: params.after,
                skip: params.skip,
                limit: params.limit,
            },
        )
        .await?;
    Ok(ApiResult(history))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Extension(token): Extension<AccessToken>,
    Path(hash): Path<String>,
) -> Result<ApiResult<HistoryItem>> {
    let transaction = state
        .transfer_service
        .get_transaction(&token.wallet, &hash)
        .await?;
    Ok(ApiResult(transaction))
}
