use std::sync::Arc;
use std::time::Duration;

use ethers::providers::{Middleware, Provider, StreamExt, Ws};
use ethers::types::H256;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant};

use crate::db::entity::transfer;
use crate::db::NewTransaction;
use crate::enums::{TxStatus, TxType};
use crate::error::{AppError, Result};
use crate::eth::token::{parse_transfer_log, TransferEvent};
use crate::eth::{EthClient, Token};
use crate::watcher::Watcher;

const MONITOR_INTERVAL: Duration = Duration::from_secs(60);

/// Observes the token's `Transfer` logs: a backward historical backfill, a
/// live subscription, and a periodic reconciliation of pending transfers the
/// subscription may have missed.
pub struct EventWatcher {
    eth: Arc<EthClient>,
    token: Arc<Token>,
    core: Arc<Watcher>,
    packet_size: u64,
}

impl EventWatcher {
    pub fn new(eth: Arc<EthClient>, token: Arc<Token>, core: Arc<Watcher>, packet_size: u64) -> Self {
        Self {
            eth,
            token,
            core,
            packet_size,
        }
    }

    /// Read the chain head and launch the background backfill and the
    /// reconciliation loop.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        tracing::info!("starting event watcher");

        let head = self.eth.block_number().await?;
        tracing::debug!("fetched the last block: {}", head);

        let this = self.clone();
        tokio::spawn(async move { this.backfill(head).await });

        let this = self.clone();
        tokio::spawn(async move { this.monitor_pending_transfers().await });

        Ok(())
    }

    /// Page backward from the head in packet-size windows, persisting every
    /// historical transfer that touches a known wallet.
    async fn backfill(&self, head: u64) {
        tracing::info!("extracting old events");

        let mut end = head;
        while end > 0 {
            let start = end.saturating_sub(self.packet_size);
            let filter = self.token.transfer_filter(start, end);

            match self.eth.logs(&filter).await {
                Ok(logs) => {
                    for log in &logs {
                        if let Some(event) = parse_transfer_log(log) {
                            tracing::debug!(
                                hash = ?event.tx_hash, from = ?event.from, to = ?event.to,
                                value = %event.value, "historical transfer",
                            );
                            // only the backfill resolves block timestamps
                            if let Some(tx) = self.transaction_from_event(&event, true).await {
                                if let Err(e) = self.core.record_transaction(tx).await {
                                    tracing::error!("failed to record a transaction: {}", e);
                                }
                            }
                        }
                    }
                }
                Err(e) => tracing::error!("failed to extract old events: {}", e),
            }

            end = start;
        }

        tracing::info!("extracting old events done");
    }

    /// Fallback for the live subscription: poll pending token transfers and
    /// complete the ones that have been mined.
    async fn monitor_pending_transfers(self: Arc<Self>) {
        let mut tick = interval_at(Instant::now() + MONITOR_INTERVAL, MONITOR_INTERVAL);
        loop {
            tick.tick().await;

            let pending = match self.core.pending_transfers().await {
                Ok(pending) => pending,
                Err(e) => {
                    tracing::error!("failed to get pending transfers: {}", e);
                    continue;
                }
            };
            if pending.is_empty() {
                continue;
            }

            let mut probes = JoinSet::new();
            for row in pending {
                let this = self.clone();
                probes.spawn(async move { this.probe_pending_transfer(row).await });
            }
            while probes.join_next().await.is_some() {}
        }
    }

    async fn probe_pending_transfer(&self, row: transfer::Model) {
        let Some(hash) = row.tx_hash.clone() else { return };
        let Ok(tx_hash) = hash.parse::<H256>() else { return };

        let tx = match self.eth.transaction(tx_hash).await {
            Ok(tx) => tx,
            Err(e) => {
                tracing::debug!("failed to get tx by hash: {}", e);
                return;
            }
        };
        // still in the mempool (or unknown), try again on the next tick
        let Some(tx) = tx else { return };
        if tx.block_number.is_none() {
            return;
        }

        let record = NewTransaction {
            hash: hash.clone(),
            block_number: 0,
            tx_type: TxType::TransferToken.as_str().to_string(),
            status: TxStatus::Completed.as_str().to_string(),
            from: row.from_address,
            to: row.to_address,
            value: row.amount,
            time: 0,
        };

        tracing::info!("transfer {} completed", hash);
        if let Err(e) = self.core.record_transaction(record.clone()).await {
            tracing::error!("failed to record a transaction: {}", e);
        }
        self.core.complete_transfer_by_hash(&hash).await;
        self.core.notify_parties(&record).await;
    }

    /// Consume the live `Transfer` subscription until the stream closes or a
    /// stop signal arrives.
    pub async fn listen(&self, ws: &Provider<Ws>, stop: &mut mpsc::Receiver<()>) -> Result<()> {
        tracing::info!("listening for transfer events");

        let filter = self.token.transfer_subscription_filter();
        let mut stream = ws
            .subscribe_logs(&filter)
            .await
            .map_err(|e| AppError::Rpc(format!("failed to subscribe to transfer events: {}", e)))?;

        loop {
            tokio::select! {
                maybe_log = stream.next() => {
                    let Some(log) = maybe_log else {
                        return Err(AppError::Rpc("events subscription closed".into()));
                    };
                    let Some(event) = parse_transfer_log(&log) else { continue };
                    tracing::debug!(
                        hash = ?event.tx_hash, from = ?event.from, to = ?event.to,
                        value = %event.value, "live transfer",
                    );

                    if let Some(tx) = self.transaction_from_event(&event, false).await {
                        tracing::info!("transfer {} completed", tx.hash);
                        if let Err(e) = self.core.record_transaction(tx.clone()).await {
                            tracing::error!("failed to record a transaction: {}", e);
                        }
                        self.core.complete_transfer_by_hash(&tx.hash).await;
                        self.core.notify_parties(&tx).await;
                    }
                }
                _ = stop.recv() => return Ok(()),
            }
        }
    }

    /// Screen an event against known wallets; block time is fetched only
    /// when requested (backfill path).
    async fn transaction_from_event(
        &self,
        event: &TransferEvent,
        fetch_time: bool,
    ) -> Option<NewTransaction> {
        let from = format!("{:?}", event.from);
        let to = format!("{:?}", event.to);

        if !self.core.is_wallet_known(&from, &to).await {
            return None;
        }

        let mut time = 0;
        if fetch_time {
            match self.eth.block(event.block_number).await {
                Ok(Some(block)) => time = block.timestamp.as_u64(),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("failed to get block {}: {}", event.block_number, e);
                }
            }
        }

        Some(NewTransaction {
            hash: format!("{:?}", event.tx_hash),
            block_number: event.block_number,
            tx_type: TxType::TransferToken.as_str().to_string(),
            status: TxStatus::Completed.as_str().to_string(),
            from,
            to,
            value: event.value.to_string(),
            time,
        })
    }
}
