use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

// ─── TransferType ────────────────────────────────────────────────────

/// Kind of a transfer row created by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferType {
    TransferToken,
    Tax,
    EthTopUp,
}

impl TransferType {
    /// Canonical string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferType::TransferToken => "transfer_token",
            TransferType::Tax => "tax",
            TransferType::EthTopUp => "ethtopup",
        }
    }
}

impl fmt::Display for TransferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transfer_token" => Ok(TransferType::TransferToken),
            "tax" => Ok(TransferType::Tax),
            "ethtopup" => Ok(TransferType::EthTopUp),
            _ => Err(AppError::Internal(format!("unknown transfer type: {}", s))),
        }
    }
}

// ─── TransferStatus ──────────────────────────────────────────────────

/// Lifecycle of a transfer row.
///
/// Transitions move forward only:
/// new → confirming → queued → pending → completed, with failed reachable
/// from confirming, queued and pending. Processing is an internal marker on
/// the eth top-up row while its queued transfers are being broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    New,
    Confirming,
    Queued,
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::New => "new",
            TransferStatus::Confirming => "confirming",
            TransferStatus::Queued => "queued",
            TransferStatus::Pending => "pending",
            TransferStatus::Processing => "processing",
            TransferStatus::Completed => "completed",
            TransferStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(TransferStatus::New),
            "confirming" => Ok(TransferStatus::Confirming),
            "queued" => Ok(TransferStatus::Queued),
            "pending" => Ok(TransferStatus::Pending),
            "processing" => Ok(TransferStatus::Processing),
            "completed" => Ok(TransferStatus::Completed),
            "failed" => Ok(TransferStatus::Failed),
            _ => Err(AppError::Internal(format!("unknown transfer status: {}", s))),
        }
    }
}

// ─── TxType / TxStatus ───────────────────────────────────────────────

/// Kind of a chain-observed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxType {
    TransferToken,
    EthereumTx,
}

impl TxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxType::TransferToken => "transfer_token",
            TxType::EthereumTx => "ethereum_tx",
        }
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a chain-observed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Completed,
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Completed => "completed",
            TxStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_status_round_trips() {
        for status in [
            TransferStatus::New,
            TransferStatus::Confirming,
            TransferStatus::Queued,
            TransferStatus::Pending,
            TransferStatus::Processing,
            TransferStatus::Completed,
            TransferStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<TransferStatus>().unwrap(), status);
        }
    }

    #[test]
    fn transfer_type_round_trips() {
        for ty in [TransferType::TransferToken, TransferType::Tax, TransferType::EthTopUp] {
            assert_eq!(ty.as_str().parse::<TransferType>().unwrap(), ty);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!("inflight".parse::<TransferStatus>().is_err());
    }
}
