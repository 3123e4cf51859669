use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use uuid::Uuid;

use crate::db::entity::{transaction, transfer};
use crate::db::{NewTransaction, TransactionRepository, TransferRepository, WalletRepository};
use crate::error::{AppError, Result};
use crate::eth::{utils, Token};
use crate::notifier::{Notification, Notifier, TransactionCompleted};
use crate::services::TransferService;

pub mod cache;
pub mod events;
pub mod headers;
pub mod supervisor;

pub use cache::WalletCache;
pub use events::EventWatcher;
pub use headers::HeaderWatcher;

/// Shared core of the chain watchers: records observed transactions,
/// screens events against known wallets and drives transfer completion.
pub struct Watcher {
    wallets: Arc<WalletRepository>,
    transactions: Arc<TransactionRepository>,
    transfers: Arc<TransferRepository>,
    transfer_service: Arc<TransferService>,
    notifier: Notifier,
    token: Arc<Token>,
    cache: Arc<WalletCache>,
}

impl Watcher {
    pub fn new(
        wallets: Arc<WalletRepository>,
        transactions: Arc<TransactionRepository>,
        transfers: Arc<TransferRepository>,
        transfer_service: Arc<TransferService>,
        notifier: Notifier,
        token: Arc<Token>,
        cache: Arc<WalletCache>,
    ) -> Self {
        Self {
            wallets,
            transactions,
            transfers,
            transfer_service,
            notifier,
            token,
            cache,
        }
    }

    pub async fn record_transaction(&self, tx: NewTransaction) -> Result<transaction::Model> {
        if tx.hash.is_empty() {
            return Err(AppError::validation("empty transaction hash provided"));
        }
        self.transactions.create(tx).await
    }

    /// Tell both parties that their transfer landed, amounts in display
    /// units.
    pub async fn notify_parties(&self, tx: &NewTransaction) {
        let decimals = self.token.decimals().await.unwrap_or(18);
        let amount = utils::str_to_eth(&tx.value, decimals).to_f64().unwrap_or_default();

        let message = TransactionCompleted {
            hash: tx.hash.clone(),
            tx_type: tx.tx_type.clone(),
            from: tx.from.clone(),
            to: tx.to.clone(),
            amount,
        };

        self.notifier
            .notify(Notification {
                client_id: tx.to.clone(),
                message: message.clone(),
            })
            .await;
        self.notifier
            .notify(Notification {
                client_id: tx.from.clone(),
                message,
            })
            .await;
    }

    /// Whether either party of an event is a registered wallet, answered
    /// from the TTL cache when possible.
    pub async fn is_wallet_known(&self, from: &str, to: &str) -> bool {
        if let (Some(cached_from), Some(cached_to)) =
            (self.cache.get(from).await, self.cache.get(to).await)
        {
            return cached_from || cached_to;
        }

        let existing = match self.wallets.existing_wallet(from, to).await {
            Ok(existing) => existing,
            Err(e) => {
                tracing::error!("wallet existence probe failed: {}", e);
                return false;
            }
        };

        match existing {
            None => {
                self.cache.set(from, false).await;
                self.cache.set(to, false).await;
                false
            }
            Some(address) => {
                if address.eq_ignore_ascii_case(from) {
                    self.cache.set(to, false).await;
                } else {
                    self.cache.set(from, false).await;
                }
                self.cache.set(&address, true).await;
                true
            }
        }
    }

    /// The pending eth top-up matching a mined transaction hash, if any.
    pub async fn pending_topup_id(&self, tx_hash: &str) -> Option<Uuid> {
        match self.transfers.pending_topup_by_hash(tx_hash).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!("failed to find an eth transfer by hash: {}", e);
                None
            }
        }
    }

    /// Idempotent completion of the transfer that produced this hash; safe
    /// to call from both the live subscription and the reconciliation pass.
    pub async fn complete_transfer_by_hash(&self, tx_hash: &str) {
        if let Err(e) = self.transfers.complete_by_hash(tx_hash).await {
            tracing::error!("failed to complete transfer {}: {}", tx_hash, e);
        }
    }

    pub async fn complete_transfers(&self, eth_transfer_id: Uuid) {
        if let Err(e) = self.transfer_service.complete_transfers(eth_transfer_id).await {
            tracing::error!(
                "failed to complete the transfers associated with eth transfer {}: {}",
                eth_transfer_id,
                e
            );
        }
    }

    pub async fn fail_eth_transfer(&self, id: Uuid, message: &str) {
        tracing::error!("eth transfer {} failed: {}", id, message);
        if let Err(e) = self.transfers.fail_eth_transfer(id, message).await {
            tracing::error!("failed to write the transfer error message: {}", e);
        }
    }

    pub async fn pending_topups(&self) -> Result<Vec<transfer::Model>> {
        self.transfers.pending_topups().await
    }

    pub async fn pending_transfers(&self) -> Result<Vec<transfer::Model>> {
        self.transfers.pending_transfers().await
    }
}
