use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A chain-observed transaction involving a known wallet.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub hash: String,
    pub block_number: i64,
    #[sea_orm(column_name = "type")]
    pub tx_type: String,
    pub status: String,
    pub from_address: String,
    pub to_address: String,
    /// Amount in base units, as a decimal string.
    pub value: String,
    /// Block timestamp in unix seconds; zero when observed live.
    pub time: i64,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: Option<DateTimeWithTimeZone>,
    pub deleted_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
