use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::enums::TransferStatus;

/// A brokered transfer: the user-signed token pair, its tax sibling, or the
/// bank's eth top-up.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transfers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub transfer_type: String,
    pub from_address: String,
    pub to_address: String,
    pub nonce: i64,
    /// Gas price in native base units, as a decimal string.
    pub gas_price: String,
    pub gas_limit: i64,
    /// Amount in base units, as a decimal string.
    pub amount: String,
    pub tax_amount: String,
    pub eth_transfer_id: Option<Uuid>,
    pub tx_hash: Option<String>,
    pub raw_tx: Option<String>,
    pub status: String,
    pub message: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: Option<DateTimeWithTimeZone>,
    pub deleted_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// A transfer that moved past `confirming` must not be confirmed again.
    pub fn is_processing(&self) -> bool {
        self.status != TransferStatus::New.as_str()
            && self.status != TransferStatus::Confirming.as_str()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
