use ethers::abi::Abi;
use ethers::contract::Contract;
use ethers::providers::{Http, Provider};
use ethers::types::{Address, Filter, Log, H256, U256};
use tokio::sync::RwLock;

use crate::error::{AppError, Result};
use crate::eth::EthClient;

const TRANSFER_EVENT: &str = "Transfer(address,address,uint256)";

/// Typed view of the SDR token contract.
pub struct Token {
    address: Address,
    contract: Contract<Provider<Http>>,
    decimals: RwLock<Option<u8>>,
}

/// A decoded ERC-20 `Transfer` log.
#[derive(Debug, Clone)]
pub struct TransferEvent {
    pub tx_hash: H256,
    pub block_number: u64,
    pub from: Address,
    pub to: Address,
    pub value: U256,
}

impl Token {
    pub fn new(address: Address, client: &EthClient) -> Result<Self> {
        let abi = token_abi()?;
        let contract = Contract::new(address, abi, client.provider());
        Ok(Self {
            address,
            contract,
            decimals: RwLock::new(None),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Token decimals, cached after the first successful fetch.
    pub async fn decimals(&self) -> Result<u8> {
        if let Some(decimals) = *self.decimals.read().await {
            return Ok(decimals);
        }

        let decimals = self
            .contract
            .method::<_, u8>("decimals", ())
            .map_err(|e| AppError::Rpc(format!("failed to prepare decimals call: {}", e)))?
            .call()
            .await
            .map_err(|e| AppError::Rpc(format!("failed to get token's decimals: {}", e)))?;

        *self.decimals.write().await = Some(decimals);
        Ok(decimals)
    }

    pub async fn balance_of(&self, owner: Address) -> Result<U256> {
        self.contract
            .method::<_, U256>("balanceOf", owner)
            .map_err(|e| AppError::Rpc(format!("failed to prepare balanceOf call: {}", e)))?
            .call()
            .await
            .map_err(|e| AppError::Rpc(format!("failed to check token balance: {}", e)))
    }

    /// Filter matching the token's `Transfer` logs over a block range.
    pub fn transfer_filter(&self, from_block: u64, to_block: u64) -> Filter {
        Filter::new()
            .address(self.address)
            .event(TRANSFER_EVENT)
            .from_block(from_block)
            .to_block(to_block)
    }

    /// Filter for the live `Transfer` subscription.
    pub fn transfer_subscription_filter(&self) -> Filter {
        Filter::new().address(self.address).event(TRANSFER_EVENT)
    }
}

/// Calldata for `transfer(address,uint256)`: 4-byte selector followed by the
/// 32-byte-padded recipient and amount.
pub fn transfer_calldata(to: Address, amount: U256) -> Vec<u8> {
    let mut data = ethers::utils::id("transfer(address,uint256)").to_vec();

    let mut padded_to = [0u8; 32];
    padded_to[12..].copy_from_slice(to.as_bytes());
    data.extend_from_slice(&padded_to);

    let mut padded_amount = [0u8; 32];
    amount.to_big_endian(&mut padded_amount);
    data.extend_from_slice(&padded_amount);

    data
}

/// Decode a raw log as an ERC-20 `Transfer`. Returns `None` for logs that do
/// not carry the two indexed address topics.
pub fn parse_transfer_log(log: &Log) -> Option<TransferEvent> {
    if log.topics.len() < 3 {
        return None;
    }

    Some(TransferEvent {
        tx_hash: log.transaction_hash?,
        block_number: log.block_number.map(|n| n.as_u64()).unwrap_or_default(),
        from: Address::from_slice(&log.topics[1].as_bytes()[12..]),
        to: Address::from_slice(&log.topics[2].as_bytes()[12..]),
        value: U256::from_big_endian(&log.data),
    })
}

fn token_abi() -> Result<Abi> {
    ethers::abi::parse_abi(&[
        "function balanceOf(address) external view returns (uint256)",
        "function decimals() external view returns (uint8)",
        "event Transfer(address indexed from, address indexed to, uint256 value)",
    ])
    .map_err(|e| AppError::Internal(format!("failed to parse token ABI: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Bytes;

    #[test]
    fn transfer_calldata_layout() {
        let to: Address = "0x00000000000000000000000000000000000000aa".parse().unwrap();
        let data = transfer_calldata(to, U256::from(256u64));

        assert_eq!(data.len(), 4 + 32 + 32);
        // canonical ERC-20 transfer selector
        assert_eq!(&data[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(data[4 + 31], 0xaa);
        assert_eq!(data[4 + 32 + 30], 0x01);
        assert_eq!(data[4 + 32 + 31], 0x00);
    }

    fn address_topic(address: Address) -> H256 {
        let mut topic = [0u8; 32];
        topic[12..].copy_from_slice(address.as_bytes());
        H256::from(topic)
    }

    #[test]
    fn parses_transfer_log_topics() {
        let from: Address = "0x1111111111111111111111111111111111111111".parse().unwrap();
        let to: Address = "0x2222222222222222222222222222222222222222".parse().unwrap();

        let mut value = [0u8; 32];
        U256::from(42u64).to_big_endian(&mut value);

        let log = Log {
            address: Address::zero(),
            topics: vec![H256::zero(), address_topic(from), address_topic(to)],
            data: Bytes::from(value.to_vec()),
            block_number: Some(7u64.into()),
            transaction_hash: Some(H256::repeat_byte(3)),
            ..Default::default()
        };

        let event = parse_transfer_log(&log).unwrap();
        assert_eq!(event.from, from);
        assert_eq!(event.to, to);
        assert_eq!(event.value, U256::from(42u64));
        assert_eq!(event.block_number, 7);
    }

    #[test]
    fn short_logs_are_skipped() {
        let log = Log {
            topics: vec![H256::zero()],
            ..Default::default()
        };
        assert!(parse_transfer_log(&log).is_none());
    }
}
