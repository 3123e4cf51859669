use std::sync::Arc;
use std::time::Duration;

use ethers::providers::{Middleware, Provider, StreamExt, Ws};
use ethers::types::{Address, Block, Transaction, H256};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant};

use crate::db::entity::transfer;
use crate::db::NewTransaction;
use crate::enums::{TxStatus, TxType};
use crate::error::{AppError, Result};
use crate::eth::token::parse_transfer_log;
use crate::eth::EthClient;
use crate::watcher::Watcher;

const MONITOR_TOPUP_INTERVAL: Duration = Duration::from_secs(60);

const TOPUP_FAILED_MESSAGE: &str = "ETH top-up transaction failed";

/// Observes whole blocks: persists native transactions of known wallets,
/// resolves eth top-ups via their receipts, and rewrites zero-value calls
/// into the token contract as token transfers.
pub struct HeaderWatcher {
    eth: Arc<EthClient>,
    core: Arc<Watcher>,
    token_address: Address,
}

impl HeaderWatcher {
    pub fn new(eth: Arc<EthClient>, core: Arc<Watcher>, token_address: Address) -> Self {
        Self {
            eth,
            core,
            token_address,
        }
    }

    /// Read the chain head and launch the block backfill plus the top-up
    /// reconciliation loop.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        tracing::info!("starting header watcher");

        let head = self.eth.block_number().await?;
        tracing::debug!("fetched the last block: {}", head);

        let this = self.clone();
        tokio::spawn(async move { this.backfill(head).await });

        let this = self.clone();
        tokio::spawn(async move { this.monitor_topups().await });

        Ok(())
    }

    async fn backfill(&self, head: u64) {
        tracing::info!("extracting old transactions");

        for number in (0..=head).rev() {
            match self.eth.block_with_txs(number).await {
                Ok(Some(block)) => self.process_block(&block).await,
                Ok(None) => tracing::debug!("block {} not found", number),
                Err(e) => tracing::error!("failed to get block by number {}: {}", number, e),
            }
        }

        tracing::info!("extracting old transactions done");
    }

    async fn process_block(&self, block: &Block<Transaction>) {
        tracing::debug!(
            "processing block: height={:?} txs={}",
            block.number,
            block.transactions.len()
        );

        let block_number = block.number.map(|n| n.as_u64()).unwrap_or_default();
        let block_time = block.timestamp.as_u64();
        for tx in &block.transactions {
            self.handle_transaction(block_number, block_time, tx).await;
        }
    }

    async fn handle_transaction(&self, block_number: u64, block_time: u64, tx: &Transaction) {
        // sender is derived from the signature; the RPC-provided field is
        // only a fallback
        let from = tx.recover_from().unwrap_or(tx.from);
        let from = format!("{:?}", from);
        let to = tx.to.map(|a| format!("{:?}", a)).unwrap_or_default();

        if !self.core.is_wallet_known(&from, &to).await {
            return;
        }

        let hash = format!("{:?}", tx.hash);
        let mut record = NewTransaction {
            hash: hash.clone(),
            block_number,
            tx_type: TxType::EthereumTx.as_str().to_string(),
            status: TxStatus::Completed.as_str().to_string(),
            from,
            to,
            value: tx.value.to_string(),
            time: block_time,
        };

        if let Some(transfer_id) = self.core.pending_topup_id(&hash).await {
            // resolve the top-up off the hot path; the reconciliation loop
            // retries if this probe is lost
            let eth = self.eth.clone();
            let core = self.core.clone();
            let tx_hash = tx.hash;
            tokio::spawn(async move {
                match eth.receipt(tx_hash).await {
                    Ok(Some(receipt)) if receipt.status == Some(0u64.into()) => {
                        core.fail_eth_transfer(transfer_id, TOPUP_FAILED_MESSAGE).await;
                    }
                    _ => {
                        tracing::info!("eth transfer {} confirmed", transfer_id);
                        core.complete_transfers(transfer_id).await;
                    }
                }
            });
        } else {
            record = self.rewrite_token_transfer(record, tx).await;
        }

        if let Err(e) = self.core.record_transaction(record).await {
            tracing::error!("failed to record a transaction: {}", e);
        }
    }

    /// A zero-value transaction into the token contract is a token call;
    /// pull the real parties and amount from its first `Transfer` log.
    async fn rewrite_token_transfer(
        &self,
        mut record: NewTransaction,
        tx: &Transaction,
    ) -> NewTransaction {
        let token = format!("{:?}", self.token_address);
        let touches_token =
            record.from.eq_ignore_ascii_case(&token) || record.to.eq_ignore_ascii_case(&token);
        if !touches_token || !tx.value.is_zero() {
            return record;
        }

        let receipt = match self.eth.receipt(tx.hash).await {
            Ok(Some(receipt)) => receipt,
            Ok(None) => return record,
            Err(e) => {
                tracing::debug!("error getting transaction receipt: {}", e);
                return record;
            }
        };
        let Some(log) = receipt.logs.first() else { return record };
        let Some(event) = parse_transfer_log(log) else { return record };

        record.value = event.value.to_string();
        record.from = format!("{:?}", event.from);
        record.to = format!("{:?}", event.to);
        record.tx_type = TxType::TransferToken.as_str().to_string();
        record
    }

    /// Fallback for the live block subscription: poll pending eth top-ups
    /// and complete or fail them once their receipts exist.
    async fn monitor_topups(self: Arc<Self>) {
        let mut tick = interval_at(
            Instant::now() + MONITOR_TOPUP_INTERVAL,
            MONITOR_TOPUP_INTERVAL,
        );
        loop {
            tick.tick().await;

            let pending = match self.core.pending_topups().await {
                Ok(pending) => pending,
                Err(e) => {
                    tracing::error!("failed to get pending top ups: {}", e);
                    continue;
                }
            };
            if pending.is_empty() {
                continue;
            }

            let mut probes = JoinSet::new();
            for row in pending {
                let this = self.clone();
                probes.spawn(async move { this.probe_topup(row).await });
            }
            while probes.join_next().await.is_some() {}
        }
    }

    async fn probe_topup(&self, row: transfer::Model) {
        let Some(hash) = row.tx_hash.clone() else { return };
        let Ok(tx_hash) = hash.parse::<H256>() else { return };

        let tx = match self.eth.transaction(tx_hash).await {
            Ok(tx) => tx,
            Err(e) => {
                tracing::debug!("failed to get tx by hash: {}", e);
                return;
            }
        };
        // still in the mempool, do not fail the transfer, just retry later
        let Some(tx) = tx else { return };
        if tx.block_number.is_none() {
            return;
        }

        let receipt = match self.eth.receipt(tx_hash).await {
            Ok(Some(receipt)) => receipt,
            Ok(None) => return,
            Err(e) => {
                tracing::error!("error getting transaction receipt: {}", e);
                return;
            }
        };

        if receipt.status == Some(1u64.into()) {
            tracing::info!("eth transfer {} confirmed", row.id);
            self.core.complete_transfers(row.id).await;
        } else {
            self.core.fail_eth_transfer(row.id, TOPUP_FAILED_MESSAGE).await;
        }

        let record = NewTransaction {
            hash,
            block_number: 0,
            tx_type: TxType::EthereumTx.as_str().to_string(),
            status: TxStatus::Completed.as_str().to_string(),
            from: row.from_address,
            to: row.to_address,
            value: row.amount,
            time: 0,
        };
        if let Err(e) = self.core.record_transaction(record).await {
            tracing::error!("failed to record a transaction: {}", e);
        }
    }

    /// Consume the new-heads subscription until the stream closes or a stop
    /// signal arrives.
    pub async fn listen(&self, ws: &Provider<Ws>, stop: &mut mpsc::Receiver<()>) -> Result<()> {
        tracing::info!("listening for new blocks");

        let mut stream = ws
            .subscribe_blocks()
            .await
            .map_err(|e| AppError::Rpc(format!("failed to subscribe to new heads: {}", e)))?;

        loop {
            tokio::select! {
                maybe_header = stream.next() => {
                    let Some(header) = maybe_header else {
                        return Err(AppError::Rpc("headers subscription closed".into()));
                    };
                    let Some(hash) = header.hash else { continue };

                    match self.eth.block_with_txs_by_hash(hash).await {
                        Ok(Some(block)) => self.process_block(&block).await,
                        Ok(None) => tracing::debug!("block {:?} not found", hash),
                        Err(e) => tracing::debug!("failed to get block by hash {:?}: {}", hash, e),
                    }
                }
                _ = stop.recv() => return Ok(()),
            }
        }
    }
}
