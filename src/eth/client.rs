use std::sync::Arc;

use ethers::providers::{Http, Middleware, Provider, Ws};
use ethers::types::{
    Address, Block, BlockNumber, Bytes, Filter, Log, Transaction, TransactionReceipt, H256, U256,
};

use crate::error::{AppError, Result};

/// JSON-RPC view of the ledger over HTTP. The streaming (WebSocket)
/// provider for subscriptions is dialed separately by the watcher
/// supervisor, see [`dial_ws`].
#[derive(Clone)]
pub struct EthClient {
    provider: Arc<Provider<Http>>,
}

impl EthClient {
    pub fn new(rpc_url: &str) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| AppError::Rpc(format!("failed to create provider: {}", e)))?;
        Ok(Self { provider: Arc::new(provider) })
    }

    /// Raw provider handle, used to bind contract calls.
    pub fn provider(&self) -> Arc<Provider<Http>> {
        self.provider.clone()
    }

    pub async fn block_number(&self) -> Result<u64> {
        let number = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| AppError::Rpc(format!("failed to get block number: {}", e)))?;
        Ok(number.as_u64())
    }

    /// Header-only block, enough for the timestamp lookup during backfill.
    pub async fn block(&self, number: u64) -> Result<Option<Block<H256>>> {
        self.provider
            .get_block(number)
            .await
            .map_err(|e| AppError::Rpc(format!("failed to get block {}: {}", number, e)))
    }

    pub async fn block_with_txs(&self, number: u64) -> Result<Option<Block<Transaction>>> {
        self.provider
            .get_block_with_txs(number)
            .await
            .map_err(|e| AppError::Rpc(format!("failed to get block {}: {}", number, e)))
    }

    pub async fn block_with_txs_by_hash(&self, hash: H256) -> Result<Option<Block<Transaction>>> {
        self.provider
            .get_block_with_txs(hash)
            .await
            .map_err(|e| AppError::Rpc(format!("failed to get block {:?}: {}", hash, e)))
    }

    pub async fn transaction(&self, hash: H256) -> Result<Option<Transaction>> {
        self.provider
            .get_transaction(hash)
            .await
            .map_err(|e| AppError::Rpc(format!("failed to get tx {:?}: {}", hash, e)))
    }

    pub async fn receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>> {
        self.provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| AppError::Rpc(format!("failed to get receipt {:?}: {}", hash, e)))
    }

    pub async fn pending_nonce(&self, address: Address) -> Result<u64> {
        let nonce = self
            .provider
            .get_transaction_count(address, Some(BlockNumber::Pending.into()))
            .await
            .map_err(|e| AppError::Rpc(format!("failed to retrieve account nonce: {}", e)))?;
        Ok(nonce.as_u64())
    }

    pub async fn balance(&self, address: Address) -> Result<U256> {
        self.provider
            .get_balance(address, None)
            .await
            .map_err(|e| AppError::Rpc(format!("failed to retrieve account balance: {}", e)))
    }

    pub async fn suggest_gas_price(&self) -> Result<U256> {
        self.provider
            .get_gas_price()
            .await
            .map_err(|e| AppError::Rpc(format!("failed to suggest gas price: {}", e)))
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let id = self
            .provider
            .get_chainid()
            .await
            .map_err(|e| AppError::Rpc(format!("failed to retrieve chain id: {}", e)))?;
        Ok(id.as_u64())
    }

    pub async fn logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        self.provider
            .get_logs(filter)
            .await
            .map_err(|e| AppError::Rpc(format!("failed to fetch logs: {}", e)))
    }

    pub async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(|e| AppError::Rpc(format!("failed to send a raw transaction: {}", e)))?;
        Ok(pending.tx_hash())
    }
}

/// Dial the streaming endpoint used by the live watchers. Re-dialed by the
/// supervisor on every reconnect.
pub async fn dial_ws(ws_url: &str) -> Result<Provider<Ws>> {
    Provider::<Ws>::connect(ws_url)
        .await
        .map_err(|e| AppError::Rpc(format!("failed to connect to node by ws: {}", e)))
}
