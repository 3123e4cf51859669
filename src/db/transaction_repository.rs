use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait, FromQueryResult, Set, Statement,
};
use uuid::Uuid;

use crate::db::entity::{transaction, Transaction};
use crate::error::Result;

/// Input for the observed-transaction upsert.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub hash: String,
    pub block_number: u64,
    pub tx_type: String,
    pub status: String,
    pub from: String,
    pub to: String,
    pub value: String,
    pub time: u64,
}

/// One row of the unified history view (transfers joined with observed
/// transactions).
#[derive(Debug, Clone, FromQueryResult, serde::Serialize)]
pub struct HistoryRow {
    pub tx_hash: String,
    pub status: String,
    pub amount: String,
    pub from_address: String,
    pub to_address: String,
    pub time: Option<i64>,
    pub direction: String,
    pub tx_type: String,
}

impl HistoryRow {
    /// An on-chain record carries a real transaction hash; everything else
    /// still holds the transfer row id.
    pub fn is_on_chain(&self) -> bool {
        self.tx_hash.starts_with("0x")
    }

    pub fn detect_direction(&mut self, address: &str) {
        if self.to_address.eq_ignore_ascii_case(address) {
            self.direction = "in".to_string();
        } else {
            self.direction = "out".to_string();
        }
    }
}

const HISTORY_BASE: &str = r#"
SELECT LOWER(COALESCE(tr.tx_hash, tr.id::text)) AS tx_hash,
       COALESCE(txout.status, tr.status) AS status,
       tr.amount AS amount,
       LOWER(tr.from_address) AS from_address,
       LOWER(tr.to_address) AS to_address,
       COALESCE(NULLIF(txout.time, 0), EXTRACT(epoch FROM txout.created_at)::bigint, EXTRACT(epoch FROM tr.created_at)::bigint) AS time,
       'out' AS direction,
       COALESCE(txout.type, tr.transfer_type) AS tx_type
FROM transfers tr
       LEFT JOIN transactions txout ON tr.tx_hash = txout.hash
WHERE tr.transfer_type = 'transfer_token'
  AND LOWER(tr.from_address) = LOWER($1)
  AND tr.deleted_at IS NULL

UNION

SELECT LOWER(txin.hash),
       txin.status,
       txin.value,
       LOWER(txin.from_address),
       LOWER(txin.to_address),
       COALESCE(NULLIF(txin.time, 0), EXTRACT(epoch FROM txin.created_at)::bigint),
       'in',
       txin.type
FROM transactions txin
WHERE LOWER(txin.to_address) = LOWER($1)
  AND txin.time >= $2
  AND LOWER(txin.from_address) <> LOWER($3)
  AND txin.type = 'transfer_token'
  AND txin.deleted_at IS NULL

UNION

SELECT LOWER(txout.hash),
       txout.status,
       txout.value,
       LOWER(txout.from_address),
       LOWER(txout.to_address),
       COALESCE(NULLIF(txout.time, 0), EXTRACT(epoch FROM txout.created_at)::bigint),
       'out',
       txout.type
FROM transactions txout
WHERE LOWER(txout.from_address) = LOWER($1)
  AND txout.time >= $2
  AND LOWER(txout.to_address) <> LOWER($3)
  AND txout.type = 'transfer_token'
  AND txout.deleted_at IS NULL

ORDER BY time DESC, tx_hash DESC
"#;

pub struct TransactionRepository {
    db: DatabaseConnection,
}

impl TransactionRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Upsert by hash. A non-zero `time` overwrites the stored timestamp
    /// (the backfill learns it from the block); otherwise a conflicting
    /// insert is a no-op.
    pub async fn create(&self, tx: NewTransaction) -> Result<transaction::Model> {
        let model = transaction::Model {
            id: Uuid::new_v4(),
            hash: tx.hash,
            block_number: tx.block_number as i64,
            tx_type: tx.tx_type,
            status: tx.status,
            from_address: tx.from,
            to_address: tx.to,
            value: tx.value,
            time: tx.time as i64,
            created_at: Utc::now().into(),
            updated_at: None,
            deleted_at: None,
        };

        let on_conflict = if model.time != 0 {
            OnConflict::column(transaction::Column::Hash)
                .update_columns([transaction::Column::Time])
                .value(transaction::Column::UpdatedAt, Expr::current_timestamp())
                .to_owned()
        } else {
            OnConflict::column(transaction::Column::Hash).do_nothing().to_owned()
        };

        let active = transaction::ActiveModel {
            id: Set(model.id),
            hash: Set(model.hash.clone()),
            block_number: Set(model.block_number),
            tx_type: Set(model.tx_type.clone()),
            status: Set(model.status.clone()),
            from_address: Set(model.from_address.clone()),
            to_address: Set(model.to_address.clone()),
            value: Set(model.value.clone()),
            time: Set(model.time),
            created_at: Set(model.created_at),
            updated_at: Set(None),
            deleted_at: Set(None),
        };

        Transaction::insert(active)
            .on_conflict(on_conflict)
            .exec_without_returning(&self.db)
            .await?;

        Ok(model)
    }

    /// Unified paginated history for an address: outgoing transfers merged
    /// with their observed transactions, plus incoming and outgoing token
    /// transactions not already represented.
    pub async fn history(
        &self,
        address: &str,
        after: u64,
        bank_address: &str,
        skip: u64,
        limit: Option<u64>,
    ) -> Result<(Vec<HistoryRow>, u64)> {
        let paginated = format!("{} OFFSET $4 LIMIT $5", HISTORY_BASE);
        let rows = HistoryRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            paginated,
            [
                address.into(),
                (after as i64).into(),
                bank_address.into(),
                (skip as i64).into(),
                limit.map(|l| l as i64).into(),
            ],
        ))
        .all(&self.db)
        .await?;

        let count_sql = format!("SELECT COUNT(*) AS total FROM ({}) txes", HISTORY_BASE);
        let total = self
            .db
            .query_one(Statement::from_sql_and_values(
                DbBackend::Postgres,
                count_sql,
                [address.into(), (after as i64).into(), bank_address.into()],
            ))
            .await?
            .map(|row| row.try_get::<i64>("", "total"))
            .transpose()?
            .unwrap_or_default();

        Ok((rows, total as u64))
    }

    /// Merged single-record lookup: the observed transaction when one
    /// exists, otherwise the transfer row itself.
    pub async fn get_transaction_or_transfer(
        &self,
        address: &str,
        hash: &str,
    ) -> Result<Option<HistoryRow>> {
        let from_transactions = HistoryRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
SELECT hash AS tx_hash,
       status,
       value AS amount,
       from_address,
       to_address,
       COALESCE(NULLIF(time, 0), EXTRACT(epoch FROM created_at)::bigint) AS time,
       '' AS direction,
       type AS tx_type
FROM transactions
WHERE (LOWER(hash) = LOWER($1) OR id::text = LOWER($1))
  AND (LOWER(from_address) = LOWER($2) OR LOWER(to_address) = LOWER($2))
  AND deleted_at IS NULL
LIMIT 1
"#,
            [hash.into(), address.into()],
        ))
        .one(&self.db)
        .await?;

        if let Some(mut row) = from_transactions {
            row.detect_direction(address);
            return Ok(Some(row));
        }

        let from_transfers = HistoryRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
SELECT id::text AS tx_hash,
       status,
       amount,
       from_address,
       to_address,
       EXTRACT(epoch FROM created_at)::bigint AS time,
       'out' AS direction,
       transfer_type AS tx_type
FROM transfers
WHERE (id::text = LOWER($1) OR LOWER(tx_hash) = LOWER($1))
  AND LOWER(from_address) = LOWER($2)
  AND deleted_at IS NULL
LIMIT 1
"#,
            [hash.into(), address.into()],
        ))
        .one(&self.db)
        .await?;

        Ok(from_transfers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_direction_case_insensitively() {
        let mut row = HistoryRow {
            tx_hash: "0xabc".into(),
            status: "completed".into(),
            amount: "1".into(),
            from_address: "0xaaaa".into(),
            to_address: "0xBBBB".into(),
            time: Some(0),
            direction: String::new(),
            tx_type: "transfer_token".into(),
        };

        row.detect_direction("0xbbbb");
        assert_eq!(row.direction, "in");
        row.detect_direction("0xAAAA");
        assert_eq!(row.direction, "out");
    }

    #[test]
    fn on_chain_means_real_hash() {
        let mut row = HistoryRow {
            tx_hash: "7a9b2a56-3a0f-4f1e-9f93-0e5c9a1a6b31".into(),
            status: "new".into(),
            amount: "1".into(),
            from_address: String::new(),
            to_address: String::new(),
            time: None,
            direction: String::new(),
            tx_type: "transfer_token".into(),
        };
        assert!(!row.is_on_chain());

        row.tx_hash = "0xdeadbeef".into();
        assert!(row.is_on_chain());
    }
}
