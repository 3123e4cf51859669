use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::db::entity::wallet;
use crate::db::WalletRepository;
use crate::error::{AppError, Result};
use crate::eth::{utils, Token};
use crate::services::AuthService;
use crate::watcher::WalletCache;

#[derive(Debug, Deserialize)]
pub struct RegisterWallet {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub generated_at: i64,
}

#[derive(Debug, Serialize)]
pub struct WalletView {
    pub id: String,
    pub address: String,
    pub generated_at: i64,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl From<wallet::Model> for WalletView {
    fn from(model: wallet::Model) -> Self {
        Self {
            id: model.id.to_string(),
            address: model.address,
            generated_at: model.generated_at.timestamp(),
            created_at: model.created_at.timestamp(),
            updated_at: model.updated_at.map(|t| t.timestamp()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthorizedWallet {
    pub wallet: WalletView,
    pub access_token: String,
}

#[derive(Debug, Serialize)]
pub struct Balance {
    pub sdr: f64,
}

pub struct WalletService {
    repository: Arc<WalletRepository>,
    auth: Arc<AuthService>,
    token: Arc<Token>,
    wallet_cache: Arc<WalletCache>,
    api_secret: String,
}

impl WalletService {
    pub fn new(
        repository: Arc<WalletRepository>,
        auth: Arc<AuthService>,
        token: Arc<Token>,
        wallet_cache: Arc<WalletCache>,
        api_secret: String,
    ) -> Self {
        Self {
            repository,
            auth,
            token,
            wallet_cache,
            api_secret,
        }
    }

    /// Register a wallet address signed with the shared API secret and hand
    /// back an access token.
    pub async fn create_wallet(
        &self,
        request: RegisterWallet,
        signature: &str,
    ) -> Result<AuthorizedWallet> {
        if request.address.is_empty() {
            return Err(AppError::validation("empty wallet address provided"));
        }
        if request.generated_at == 0 {
            return Err(AppError::validation("empty wallet creation date provided"));
        }
        self.check_signature(&request.address, signature)?;

        let generated_at: DateTime<Utc> = Utc
            .timestamp_opt(request.generated_at, 0)
            .single()
            .ok_or_else(|| AppError::validation("invalid wallet creation date provided"))?;

        let wallet = self
            .repository
            .create(request.address.clone(), generated_at)
            .await?;

        // the next in-flight chain event should see the wallet without a
        // database round-trip
        self.wallet_cache.mark_known(&wallet.address).await;

        let access_token = self.auth.issue(&wallet.address)?;
        Ok(AuthorizedWallet {
            wallet: wallet.into(),
            access_token,
        })
    }

    /// Fetch a registered wallet and reissue its access token.
    pub async fn get_wallet(&self, address: &str, signature: &str) -> Result<AuthorizedWallet> {
        if address.is_empty() {
            return Err(AppError::validation("empty wallet address provided"));
        }
        self.check_signature(address, signature)?;

        let wallet = self.repository.get(address).await?;
        let access_token = self.auth.issue(&wallet.address)?;
        Ok(AuthorizedWallet {
            wallet: wallet.into(),
            access_token,
        })
    }

    /// Token balance of the authenticated wallet, in display units.
    pub async fn balance(&self, address: &str) -> Result<Balance> {
        let owner = utils::parse_address(address)?;
        let balance = self.token.balance_of(owner).await?;
        let decimals = self.token.decimals().await?;

        let sdr = utils::to_eth(&balance, decimals).to_f64().unwrap_or_default();
        Ok(Balance { sdr })
    }

    fn check_signature(&self, address: &str, signature: &str) -> Result<()> {
        if signature.is_empty() {
            return Err(AppError::validation("empty signature provided"));
        }
        if !crypto::verify_signature(address, signature, &self.api_secret) {
            return Err(AppError::validation("invalid signature provided"));
        }
        Ok(())
    }
}
