use std::sync::Arc;

use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Bytes, TransactionRequest, H256, U256};
use ethers::utils::rlp::Rlp;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config;
use crate::db::{NewTransfer, TransactionRepository, TransferRepository};
use crate::db::entity::transfer;
use crate::enums::{TransferStatus, TransferType};
use crate::error::{AppError, Result};
use crate::eth::token::transfer_calldata;
use crate::eth::{utils, EthClient, Token};
use crate::services::RateOracle;

/// Fixed cost of a plain value transfer, defined by the network.
const ETH_TX_GAS_LIMIT: u64 = 21_000;

const RECEIPT_CONFIRMED: &str = "confirmed";
const RECEIPT_FAILED: &str = "failed";

// ─── API payloads ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct NewTransferRequest {
    #[serde(default)]
    pub to_address: String,
    #[serde(default)]
    pub amount: f64,
}

#[derive(Debug, Serialize)]
pub struct TaxEstimation {
    pub tax: f64,
}

/// The unsigned transaction fields the client signs locally, 0x-hex on the
/// wire (chain id stays decimal).
#[derive(Debug, Serialize)]
pub struct UnsignedTransaction {
    pub nonce: String,
    pub gas_price: String,
    pub gas_limit: String,
    pub to: String,
    pub value: String,
    pub chain_id: String,
    pub data: String,
}

#[derive(Debug, Serialize)]
pub struct UnsignedTransfer {
    pub id: String,
    pub transfer_type: String,
    pub tx_data: UnsignedTransaction,
}

#[derive(Debug, Deserialize)]
pub struct SignedTransaction {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub raw_tx: String,
}

#[derive(Debug, Deserialize)]
pub struct SignedTransfer {
    #[serde(default)]
    pub transactions: Vec<SignedTransaction>,
}

#[derive(Debug, Serialize)]
pub struct QueuedTransaction {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct QueuedTransfer {
    pub transactions: Vec<QueuedTransaction>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryFilter {
    pub after: u64,
    pub skip: u64,
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct HistoryItem {
    pub tx_hash: String,
    pub status: String,
    pub amount: f64,
    pub from_address: String,
    pub to_address: String,
    pub time: f64,
    pub direction: String,
    #[serde(rename = "type")]
    pub tx_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eth_fee: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdr_fee: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ListMeta {
    pub total: u64,
}

#[derive(Debug, Serialize)]
pub struct TransactionHistory {
    pub transactions: Vec<HistoryItem>,
    pub meta: ListMeta,
}

// ─── Service ─────────────────────────────────────────────────────────

/// The transfer pipeline: turns a transfer intent into two confirmed
/// on-chain token transactions, funding the user's gas from the bank along
/// the way.
pub struct TransferService {
    transfers: Arc<TransferRepository>,
    transactions: Arc<TransactionRepository>,
    eth: Arc<EthClient>,
    token: Arc<Token>,
    rate: Arc<dyn RateOracle>,
    tx_config: config::Transaction,
    eth_config: config::Ethereum,
}

impl TransferService {
    pub fn new(
        transfers: Arc<TransferRepository>,
        transactions: Arc<TransactionRepository>,
        eth: Arc<EthClient>,
        token: Arc<Token>,
        rate: Arc<dyn RateOracle>,
        tx_config: config::Transaction,
        eth_config: config::Ethereum,
    ) -> Self {
        Self {
            transfers,
            transactions,
            eth,
            token,
            rate,
            tx_config,
            eth_config,
        }
    }

    /// Tax sized to cover the gas of all three transactions plus the
    /// configured surcharge, quoted in SDR.
    pub async fn estimate_tax(&self, from: &str, tx: &NewTransferRequest) -> Result<TaxEstimation> {
        self.validate_new_transfer(from, tx)?;
        let (tax, _) = self.compute_tax().await?;
        Ok(TaxEstimation { tax })
    }

    /// Produce the unsigned token-transfer pair: the transfer itself at
    /// nonce N and the tax payment to the bank at N+1.
    pub async fn create_transfer(
        &self,
        from: &str,
        tx: &NewTransferRequest,
    ) -> Result<Vec<UnsignedTransfer>> {
        self.validate_new_transfer(from, tx)?;

        // abandon any pair the client fetched but never signed
        self.transfers.clear_unsigned(from).await?;

        let (tax, gas_price) = self.compute_tax().await?;

        // ensure the user can cover amount + tax before issuing anything
        let from_addr = utils::parse_address(from)?;
        let balance = self.token.balance_of(from_addr).await?;
        let decimals = self.token.decimals().await?;

        let amount = Decimal::from_f64(tx.amount)
            .ok_or_else(|| AppError::validation("invalid amount provided"))?;
        let tax_dec = Decimal::from_f64(tax)
            .ok_or_else(|| AppError::Internal("tax is not representable".into()))?;
        let expenses = utils::to_wei(amount + tax_dec, decimals);
        if balance < expenses {
            return Err(AppError::validation(
                "you have no enough tokens to complete the transfer",
            ));
        }

        let chain_id = self.eth.chain_id().await?;
        let nonce = self.eth.pending_nonce(from_addr).await?;

        let token_amount = utils::to_wei(amount, decimals);
        let tax_amount = utils::to_wei(tax_dec, decimals);

        let to_addr = utils::parse_address(&tx.to_address)?;
        let bank_addr = utils::parse_address(&self.eth_config.bank_address)?;

        let transfer_tx = self.build_unsigned(
            to_addr,
            token_amount,
            nonce,
            gas_price,
            self.tx_config.transfer_gas,
            chain_id,
        );
        let tax_tx = self.build_unsigned(
            bank_addr,
            tax_amount,
            nonce + 1,
            gas_price,
            self.tx_config.tax_gas,
            chain_id,
        );

        // the transfer row carries the tax amount so the fee can be shown
        // alongside the transfer later
        let rows = self
            .transfers
            .create_transfers(vec![
                NewTransfer {
                    transfer_type: TransferType::TransferToken,
                    from_address: from.to_string(),
                    to_address: tx.to_address.clone(),
                    nonce,
                    gas_price: gas_price.to_string(),
                    gas_limit: self.tx_config.transfer_gas,
                    amount: token_amount.to_string(),
                    tax_amount: tax_amount.to_string(),
                },
                NewTransfer {
                    transfer_type: TransferType::Tax,
                    from_address: from.to_string(),
                    to_address: self.eth_config.bank_address.clone(),
                    nonce: nonce + 1,
                    gas_price: gas_price.to_string(),
                    gas_limit: self.tx_config.tax_gas,
                    amount: tax_amount.to_string(),
                    tax_amount: String::new(),
                },
            ])
            .await?;

        Ok(rows
            .into_iter()
            .zip([transfer_tx, tax_tx])
            .map(|(row, tx_data)| UnsignedTransfer {
                id: row.id.to_string(),
                transfer_type: row.transfer_type,
                tx_data,
            })
            .collect())
    }

    /// Accept the client-signed pair, validate nonces, fund the user's gas
    /// from the bank and queue both transactions for broadcast.
    pub async fn confirm_transfer(
        &self,
        from: &str,
        signed: &SignedTransfer,
    ) -> Result<QueuedTransfer> {
        if signed.transactions.len() != 2 {
            return Err(AppError::validation("exactly two transactions are expected"));
        }

        let ids = signed
            .transactions
            .iter()
            .map(|t| {
                if t.id.is_empty() {
                    return Err(AppError::validation("empty id provided"));
                }
                Uuid::parse_str(&t.id).map_err(|_| AppError::validation("malformed id provided"))
            })
            .collect::<Result<Vec<_>>>()?;

        let from_addr = utils::parse_address(from)?;
        let acc_nonce = match self.eth.pending_nonce(from_addr).await {
            Ok(nonce) => nonce,
            Err(e) => {
                self.fail_all(&ids, &e.to_string()).await;
                return Err(e);
            }
        };

        if let Err(e) = self.validate_signed(signed, from, acc_nonce).await {
            self.fail_all(&ids, &e.to_string()).await;
            return Err(e);
        }

        // move both rows to confirming and compute the gas the user's
        // address must hold before broadcast
        let mut rows = Vec::with_capacity(2);
        let mut gas_fee = U256::zero();
        for (id, signed_tx) in ids.iter().zip(&signed.transactions) {
            let mut row = self.transfers.get_and_confirm(*id, from).await?;
            if row.is_processing() {
                return Err(AppError::validation("you have already confirmed this transfer"));
            }

            row.raw_tx = Some(signed_tx.raw_tx.clone());
            row.status = TransferStatus::Queued.as_str().to_string();

            let gas_price = U256::from_dec_str(&row.gas_price).unwrap_or_default();
            gas_fee += utils::calc_gas_cost(row.gas_limit as u64, gas_price);
            rows.push(row);
        }

        let top_up = match self.top_up_eth_balance(from, gas_fee).await {
            Ok(top_up) => top_up,
            Err(e) => {
                let msg = "failed to send an eth transaction to top up the wallet balance";
                self.fail_all(&ids, msg).await;
                return Err(AppError::Rpc(format!("{}: {}", msg, e)));
            }
        };

        for row in &mut rows {
            row.eth_transfer_id = Some(top_up.id);
        }
        let rows = self.transfers.update_transfers(rows).await?;

        Ok(QueuedTransfer {
            transactions: rows
                .into_iter()
                .map(|row| QueuedTransaction {
                    id: row.id.to_string(),
                    status: row.status,
                })
                .collect(),
        })
    }

    /// Broadcast the queued pair once the eth top-up has landed. Invoked by
    /// the watcher (live path and reconciliation fallback); completing an
    /// already-drained batch is a no-op error, never a double broadcast.
    pub async fn complete_transfers(&self, eth_transfer_id: Uuid) -> Result<()> {
        let mut rows = self.transfers.queued_for(eth_transfer_id).await?;
        if rows.is_empty() {
            return Err(AppError::Internal(
                "empty transfers array received from the db".into(),
            ));
        }

        if let Err(e) = self.transfers.start_processing(eth_transfer_id).await {
            tracing::warn!("failed to start eth transfer processing: {}", e);
        }

        let from_address = rows[0].from_address.clone();
        let mut gas_fee = U256::zero();
        for row in &rows {
            let gas_price = U256::from_dec_str(&row.gas_price).unwrap_or_default();
            gas_fee += utils::calc_gas_cost(row.gas_limit as u64, gas_price);
        }

        let from_addr = utils::parse_address(&from_address)?;
        let balance = match self.eth.balance(from_addr).await {
            Ok(balance) => balance,
            Err(e) => {
                for row in &rows {
                    let _ = self.transfers.write_error(row.id, &e.to_string()).await;
                }
                return Err(e);
            }
        };

        if balance < gas_fee {
            let msg = format!(
                "there are no enough ETH on the wallet {} to pay the gas fee",
                from_address
            );
            for row in &rows {
                let _ = self.transfers.write_error(row.id, &msg).await;
            }
            return Err(AppError::validation(msg));
        }

        // strict nonce order; a failed broadcast stamps its row and aborts
        // the batch, leaving the remainder queued
        for row in &mut rows {
            let raw = row
                .raw_tx
                .clone()
                .ok_or_else(|| AppError::Internal("queued transfer without a raw tx".into()))?;
            let raw: Bytes = raw
                .parse()
                .map_err(|_| AppError::validation("failed to decode raw tx into bytes"))?;

            let hash = match self.eth.send_raw_transaction(raw).await {
                Ok(hash) => hash,
                Err(e) => {
                    let _ = self.transfers.write_error(row.id, &e.to_string()).await;
                    return Err(e);
                }
            };

            row.status = TransferStatus::Pending.as_str().to_string();
            row.tx_hash = Some(format!("{:?}", hash));
        }

        if let Err(e) = self.transfers.complete_by_id(eth_transfer_id).await {
            tracing::warn!("failed to complete eth transfer: {}", e);
        }

        self.transfers.update_transfers(rows).await?;
        Ok(())
    }

    /// Paginated unified history for the authenticated address.
    pub async fn transaction_history(
        &self,
        address: &str,
        filter: HistoryFilter,
    ) -> Result<TransactionHistory> {
        if address.is_empty() {
            return Err(AppError::validation(
                "empty address; it must be set on server during the processing, contact the support",
            ));
        }

        let (rows, total) = self
            .transactions
            .history(
                address,
                filter.after,
                &self.eth_config.bank_address,
                filter.skip,
                filter.limit,
            )
            .await?;

        let decimals = self.token.decimals().await?;
        let transactions = rows
            .into_iter()
            .map(|row| history_item(row, decimals))
            .collect();

        Ok(TransactionHistory {
            transactions,
            meta: ListMeta { total },
        })
    }

    /// Single merged record; on-chain records are enriched with the receipt
    /// status and the actual fees.
    pub async fn get_transaction(&self, address: &str, hash: &str) -> Result<HistoryItem> {
        if address.is_empty() {
            return Err(AppError::validation(
                "empty address; it must be set on server during the processing, contact the support",
            ));
        }
        if hash.is_empty() {
            return Err(AppError::validation("empty tx hash is provided"));
        }

        let row = self
            .transactions
            .get_transaction_or_transfer(address, hash)
            .await?
            .ok_or_else(|| AppError::NotFound("transaction not found".to_string()))?;

        let decimals = self.token.decimals().await?;
        let mut item = history_item(row, decimals);

        if item.tx_hash.starts_with("0x") {
            let tx_hash: H256 = item
                .tx_hash
                .parse()
                .map_err(|_| AppError::validation("malformed transaction hash"))?;

            let receipt = self
                .eth
                .receipt(tx_hash)
                .await?
                .ok_or_else(|| AppError::Rpc("failed to retrieve tx receipt".into()))?;
            item.status = if receipt.status == Some(1u64.into()) {
                RECEIPT_CONFIRMED.to_string()
            } else {
                RECEIPT_FAILED.to_string()
            };

            let transaction = self
                .eth
                .transaction(tx_hash)
                .await?
                .ok_or_else(|| AppError::Rpc("failed to fetch tx by hash".into()))?;
            let fee = receipt.gas_used.unwrap_or_default()
                * transaction.gas_price.unwrap_or_default();
            item.eth_fee = utils::to_eth(&fee, 18).to_f64();
        }

        match self.transfers.get_by_id_or_hash(hash, &item.tx_hash).await {
            Ok(transfer) => {
                let sdr_fee = utils::str_to_eth(&transfer.tax_amount, decimals);
                if !sdr_fee.is_zero() {
                    item.sdr_fee = sdr_fee.to_f64();
                }
            }
            Err(e) => tracing::debug!("no originating transfer for {}: {}", item.tx_hash, e),
        }

        Ok(item)
    }

    // ─── internals ───────────────────────────────────────────────────

    fn validate_new_transfer(&self, from: &str, tx: &NewTransferRequest) -> Result<()> {
        if from.is_empty() {
            return Err(AppError::validation(
                "empty from address; it must be set on server during the processing, contact the support",
            ));
        }
        if tx.to_address.is_empty() {
            return Err(AppError::validation("empty destination address provided"));
        }
        utils::parse_address(&tx.to_address)?;
        Ok(())
    }

    async fn compute_tax(&self) -> Result<(f64, U256)> {
        let gas_price = self.eth.suggest_gas_price().await?;
        let total_gas = self.tx_config.transfer_gas + self.tx_config.tax_gas + ETH_TX_GAS_LIMIT;
        let gas_fee_eth = utils::to_eth(&utils::calc_gas_cost(total_gas, gas_price), 18);

        let rate = self.rate.eth_to_sdr().await?;
        let tax = tax_amount(gas_fee_eth, rate, self.tx_config.surcharge)
            .to_f64()
            .ok_or_else(|| AppError::Internal("tax is not representable".into()))?;

        Ok((tax, gas_price))
    }

    fn build_unsigned(
        &self,
        to: ethers::types::Address,
        amount: U256,
        nonce: u64,
        gas_price: U256,
        gas_limit: u64,
        chain_id: u64,
    ) -> UnsignedTransaction {
        let data = transfer_calldata(to, amount);
        UnsignedTransaction {
            nonce: format!("{:#x}", nonce),
            gas_price: format!("{:#x}", gas_price),
            gas_limit: format!("{:#x}", gas_limit),
            to: format!("{:?}", self.token.address()),
            value: "0x0".to_string(),
            chain_id: chain_id.to_string(),
            data: format!("0x{}", hex::encode(data)),
        }
    }

    async fn validate_signed(
        &self,
        signed: &SignedTransfer,
        from: &str,
        acc_nonce: u64,
    ) -> Result<()> {
        for tx in &signed.transactions {
            if tx.raw_tx.is_empty() {
                return Err(AppError::validation("empty raw transaction is provided"));
            }

            let bytes = hex::decode(tx.raw_tx.trim_start_matches("0x"))
                .map_err(|_| AppError::validation("failed to decode raw tx into bytes"))?;
            let (decoded, _signature) = TypedTransaction::decode_signed(&Rlp::new(&bytes))
                .map_err(|_| {
                    AppError::validation("failed to decode raw tx into a transaction")
                })?;
            let nonce = decoded.nonce().map(|n| n.as_u64()).unwrap_or_default();

            if acc_nonce > nonce {
                return Err(AppError::validation(
                    "account nonce is already greater than nonce for the current transfer, you need to create a new transfer",
                ));
            }
            if self.transfers.is_nonce_pending(nonce, from).await? {
                return Err(AppError::validation(
                    "nonce is already used by queued or pending transfer, you need to create a new transfer",
                ));
            }
        }
        Ok(())
    }

    async fn fail_all(&self, ids: &[Uuid], message: &str) {
        for id in ids {
            if let Err(e) = self.transfers.write_error(*id, message).await {
                tracing::error!("failed to write the error message to transfer {}: {}", id, e);
            }
        }
    }

    /// Broadcast a bank-signed value transfer covering the pair's gas fee
    /// and persist it as an `ethtopup` transfer.
    async fn top_up_eth_balance(&self, to_address: &str, amount: U256) -> Result<transfer::Model> {
        let wallet: LocalWallet = self
            .eth_config
            .bank_private_key
            .trim_start_matches("0x")
            .parse()
            .map_err(|_| AppError::Config("failed to parse the bank private key".into()))?;
        let bank_address = wallet.address();

        let nonce = self.eth.pending_nonce(bank_address).await?;
        let gas_price = self.eth.suggest_gas_price().await?;
        let gas_fee = utils::calc_gas_cost(ETH_TX_GAS_LIMIT, gas_price);

        let balance = self.eth.balance(bank_address).await?;
        if balance < amount + gas_fee {
            return Err(AppError::validation(
                "service wallet balance is not enough to complete the ETH transaction, contact the support",
            ));
        }

        let chain_id = self.eth.chain_id().await?;
        let to_addr = utils::parse_address(to_address)?;

        let request = TransactionRequest::new()
            .from(bank_address)
            .to(to_addr)
            .value(amount)
            .gas(ETH_TX_GAS_LIMIT)
            .gas_price(gas_price)
            .nonce(nonce)
            .chain_id(chain_id);
        let typed: TypedTransaction = request.into();

        let wallet = wallet.with_chain_id(chain_id);
        let signature = wallet
            .sign_transaction(&typed)
            .await
            .map_err(|e| AppError::Internal(format!("failed to sign an ETH transaction: {}", e)))?;
        let raw = typed.rlp_signed(&signature);

        let tx_hash = self.eth.send_raw_transaction(raw).await?;
        tracing::info!(hash = ?tx_hash, to = %to_address, "eth top-up broadcast");

        self.transfers
            .create_eth_transfer(
                NewTransfer {
                    transfer_type: TransferType::EthTopUp,
                    from_address: format!("{:?}", bank_address),
                    to_address: to_address.to_string(),
                    nonce,
                    gas_price: gas_price.to_string(),
                    gas_limit: ETH_TX_GAS_LIMIT,
                    amount: amount.to_string(),
                    tax_amount: String::new(),
                },
                format!("{:?}", tx_hash),
            )
            .await
    }
}

/// tax = gas_fee_eth · rate · (1 + surcharge)
fn tax_amount(gas_fee_eth: Decimal, rate: f64, surcharge: f64) -> Decimal {
    let rate = Decimal::from_f64(rate).unwrap_or_default();
    let surcharge = Decimal::from_f64(surcharge).unwrap_or_default();
    gas_fee_eth * rate * (Decimal::ONE + surcharge)
}

fn history_item(row: crate::db::HistoryRow, decimals: u8) -> HistoryItem {
    HistoryItem {
        tx_hash: row.tx_hash.clone(),
        status: row.status.clone(),
        amount: utils::str_to_eth(&row.amount, decimals).to_f64().unwrap_or_default(),
        from_address: row.from_address.clone(),
        to_address: row.to_address.clone(),
        time: row.time.unwrap_or_default() as f64,
        direction: row.direction.clone(),
        tx_type: row.tx_type,
        eth_fee: None,
        sdr_fee: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn tax_formula_matches_expected_quote() {
        // 50 gwei · (80000 + 80000 + 21000) gas = 0.00905 ETH
        let gas_fee = utils::to_eth(
            &utils::calc_gas_cost(181_000, U256::from(50_000_000_000u64)),
            18,
        );
        let tax = tax_amount(gas_fee, 0.1, 0.2);
        assert_eq!(tax, Decimal::from_str("0.001086").unwrap());
    }

    #[test]
    fn tax_is_zero_without_rate() {
        assert_eq!(tax_amount(Decimal::ONE, 0.0, 0.2), Decimal::ZERO);
    }

    #[tokio::test]
    async fn signed_raw_tx_round_trips_nonce() {
        let wallet = LocalWallet::from_str(
            "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318",
        )
        .unwrap()
        .with_chain_id(1u64);

        let request = TransactionRequest::new()
            .to("0x2222222222222222222222222222222222222222"
                .parse::<ethers::types::Address>()
                .unwrap())
            .value(U256::zero())
            .gas(80_000u64)
            .gas_price(U256::from(50_000_000_000u64))
            .nonce(7u64)
            .chain_id(1u64);
        let typed: TypedTransaction = request.into();

        let signature = wallet.sign_transaction(&typed).await.unwrap();
        let raw = typed.rlp_signed(&signature);

        let (decoded, _) = TypedTransaction::decode_signed(&Rlp::new(&raw)).unwrap();
        assert_eq!(decoded.nonce().map(|n| n.as_u64()), Some(7));
    }
}
