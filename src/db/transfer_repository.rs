use chrono::Utc;
use sea_orm::sea_query::{Expr, Func, IntoCondition};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::db::entity::{transfer, Transfer};
use crate::enums::{TransferStatus, TransferType};
use crate::error::{AppError, Result};

/// Input for a transfer row created by the pipeline.
#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub transfer_type: TransferType,
    pub from_address: String,
    pub to_address: String,
    pub nonce: u64,
    pub gas_price: String,
    pub gas_limit: u64,
    pub amount: String,
    pub tax_amount: String,
}

pub struct TransferRepository {
    db: DatabaseConnection,
}

impl TransferRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert the user-signed pair in one database transaction; both rows
    /// start in status `new`.
    pub async fn create_transfers(&self, transfers: Vec<NewTransfer>) -> Result<Vec<transfer::Model>> {
        let now = Utc::now();
        let models: Vec<transfer::Model> = transfers
            .into_iter()
            .map(|t| transfer::Model {
                id: Uuid::new_v4(),
                transfer_type: t.transfer_type.as_str().to_string(),
                from_address: t.from_address,
                to_address: t.to_address,
                nonce: t.nonce as i64,
                gas_price: t.gas_price,
                gas_limit: t.gas_limit as i64,
                amount: t.amount,
                tax_amount: t.tax_amount,
                eth_transfer_id: None,
                tx_hash: None,
                raw_tx: None,
                status: TransferStatus::New.as_str().to_string(),
                message: String::new(),
                created_at: now.into(),
                updated_at: None,
                deleted_at: None,
            })
            .collect();

        let txn = self.db.begin().await?;
        for model in &models {
            let active = transfer::ActiveModel {
                id: Set(model.id),
                transfer_type: Set(model.transfer_type.clone()),
                from_address: Set(model.from_address.clone()),
                to_address: Set(model.to_address.clone()),
                nonce: Set(model.nonce),
                gas_price: Set(model.gas_price.clone()),
                gas_limit: Set(model.gas_limit),
                amount: Set(model.amount.clone()),
                tax_amount: Set(model.tax_amount.clone()),
                eth_transfer_id: Set(None),
                tx_hash: Set(None),
                raw_tx: Set(None),
                status: Set(model.status.clone()),
                message: Set(String::new()),
                created_at: Set(model.created_at),
                updated_at: Set(None),
                deleted_at: Set(None),
            };
            Transfer::insert(active).exec(&txn).await?;
        }
        txn.commit().await?;

        Ok(models)
    }

    /// Persist the bank's eth top-up; the hash is known because the bank
    /// broadcasts before the row is written.
    pub async fn create_eth_transfer(
        &self,
        new: NewTransfer,
        tx_hash: String,
    ) -> Result<transfer::Model> {
        let model = transfer::ActiveModel {
            id: Set(Uuid::new_v4()),
            transfer_type: Set(new.transfer_type.as_str().to_string()),
            from_address: Set(new.from_address),
            to_address: Set(new.to_address),
            nonce: Set(new.nonce as i64),
            gas_price: Set(new.gas_price),
            gas_limit: Set(new.gas_limit as i64),
            amount: Set(new.amount),
            tax_amount: Set(new.tax_amount),
            eth_transfer_id: Set(None),
            tx_hash: Set(Some(tx_hash)),
            raw_tx: Set(None),
            status: Set(TransferStatus::Pending.as_str().to_string()),
            message: Set(String::new()),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
            deleted_at: Set(None),
        };

        let transfer = model.insert(&self.db).await?;
        Ok(transfer)
    }

    /// Move a transfer to `confirming` and re-read it. The update only
    /// touches rows still in `new` or `confirming`, so a transfer that has
    /// already advanced keeps its status and the re-read exposes it to the
    /// caller's double-confirmation guard.
    pub async fn get_and_confirm(&self, id: Uuid, from: &str) -> Result<transfer::Model> {
        Transfer::update_many()
            .col_expr(
                transfer::Column::Status,
                Expr::value(TransferStatus::Confirming.as_str()),
            )
            .filter(transfer::Column::Id.eq(id))
            .filter(
                Expr::expr(Func::lower(Expr::col(transfer::Column::FromAddress)))
                    .eq(from.to_lowercase()),
            )
            .filter(transfer::Column::Status.is_in([
                TransferStatus::New.as_str(),
                TransferStatus::Confirming.as_str(),
            ]))
            .filter(transfer::Column::DeletedAt.is_null())
            .exec(&self.db)
            .await?;

        Transfer::find()
            .filter(transfer::Column::Id.eq(id))
            .filter(
                Expr::expr(Func::lower(Expr::col(transfer::Column::FromAddress)))
                    .eq(from.to_lowercase()),
            )
            .filter(transfer::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("transfer not found".to_string()))
    }

    /// Apply the mutable transfer fields (hash, raw tx, status, back
    /// reference) for the whole batch in one database transaction.
    pub async fn update_transfers(
        &self,
        transfers: Vec<transfer::Model>,
    ) -> Result<Vec<transfer::Model>> {
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let mut updated = Vec::with_capacity(transfers.len());
        for mut model in transfers {
            model.updated_at = Some(now.into());

            let mut active: transfer::ActiveModel = model.clone().into();
            active.tx_hash = Set(model.tx_hash.clone());
            active.raw_tx = Set(model.raw_tx.clone());
            active.status = Set(model.status.clone());
            active.eth_transfer_id = Set(model.eth_transfer_id);
            active.updated_at = Set(model.updated_at);

            Transfer::update(active)
                .filter(transfer::Column::DeletedAt.is_null())
                .exec(&txn)
                .await?;
            updated.push(model);
        }

        txn.commit().await?;
        Ok(updated)
    }

    /// Fail a single transfer and record the user-visible reason.
    pub async fn write_error(&self, id: Uuid, message: &str) -> Result<()> {
        Transfer::update_many()
            .col_expr(transfer::Column::Message, Expr::value(message))
            .col_expr(
                transfer::Column::Status,
                Expr::value(TransferStatus::Failed.as_str()),
            )
            .col_expr(transfer::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(transfer::Column::Id.eq(id))
            .filter(transfer::Column::DeletedAt.is_null())
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Fail an eth top-up and every transfer linked to it.
    pub async fn fail_eth_transfer(&self, id: Uuid, message: &str) -> Result<()> {
        self.write_error(id, message).await?;

        Transfer::update_many()
            .col_expr(transfer::Column::Message, Expr::value(message))
            .col_expr(
                transfer::Column::Status,
                Expr::value(TransferStatus::Failed.as_str()),
            )
            .col_expr(transfer::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(transfer::Column::EthTransferId.eq(id))
            .filter(transfer::Column::DeletedAt.is_null())
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn complete_by_id(&self, id: Uuid) -> Result<()> {
        self.complete(transfer::Column::Id.eq(id).into_condition()).await
    }

    pub async fn complete_by_hash(&self, tx_hash: &str) -> Result<()> {
        self.complete(
            Expr::expr(Func::lower(Expr::col(transfer::Column::TxHash)))
                .eq(tx_hash.to_lowercase())
                .into_condition(),
        )
        .await
    }

    async fn complete(&self, condition: Condition) -> Result<()> {
        Transfer::update_many()
            .col_expr(
                transfer::Column::Status,
                Expr::value(TransferStatus::Completed.as_str()),
            )
            .col_expr(transfer::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(condition)
            .filter(transfer::Column::DeletedAt.is_null())
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Reconciliation-exclusion guard on the eth top-up while its queued
    /// transfers are being broadcast.
    pub async fn start_processing(&self, id: Uuid) -> Result<()> {
        Transfer::update_many()
            .col_expr(
                transfer::Column::Status,
                Expr::value(TransferStatus::Processing.as_str()),
            )
            .col_expr(transfer::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(transfer::Column::Id.eq(id))
            .filter(transfer::Column::DeletedAt.is_null())
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Queued transfers waiting on an eth top-up, in broadcast order.
    pub async fn queued_for(&self, eth_transfer_id: Uuid) -> Result<Vec<transfer::Model>> {
        let transfers = Transfer::find()
            .filter(transfer::Column::EthTransferId.eq(eth_transfer_id))
            .filter(transfer::Column::Status.eq(TransferStatus::Queued.as_str()))
            .filter(transfer::Column::DeletedAt.is_null())
            .order_by_asc(transfer::Column::Nonce)
            .all(&self.db)
            .await?;
        Ok(transfers)
    }

    /// True when another live transfer of this address already holds the
    /// nonce.
    pub async fn is_nonce_pending(&self, nonce: u64, address: &str) -> Result<bool> {
        let count = Transfer::find()
            .filter(transfer::Column::Nonce.eq(nonce as i64))
            .filter(
                Expr::expr(Func::lower(Expr::col(transfer::Column::FromAddress)))
                    .eq(address.to_lowercase()),
            )
            .filter(
                transfer::Column::Status.is_in([
                    TransferStatus::Queued.as_str(),
                    TransferStatus::Pending.as_str(),
                ]),
            )
            .filter(transfer::Column::DeletedAt.is_null())
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    /// The pending eth top-up broadcast with this hash, if any.
    pub async fn pending_topup_by_hash(&self, tx_hash: &str) -> Result<Option<Uuid>> {
        let found = Transfer::find()
            .filter(
                Expr::expr(Func::lower(Expr::col(transfer::Column::TxHash)))
                    .eq(tx_hash.to_lowercase()),
            )
            .filter(transfer::Column::TransferType.eq(TransferType::EthTopUp.as_str()))
            .filter(transfer::Column::Status.eq(TransferStatus::Pending.as_str()))
            .filter(transfer::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?;
        Ok(found.map(|t| t.id))
    }

    pub async fn pending_topups(&self) -> Result<Vec<transfer::Model>> {
        let transfers = Transfer::find()
            .filter(transfer::Column::TransferType.eq(TransferType::EthTopUp.as_str()))
            .filter(transfer::Column::Status.eq(TransferStatus::Pending.as_str()))
            .filter(transfer::Column::DeletedAt.is_null())
            .all(&self.db)
            .await?;
        Ok(transfers)
    }

    pub async fn pending_transfers(&self) -> Result<Vec<transfer::Model>> {
        let transfers = Transfer::find()
            .filter(transfer::Column::TransferType.ne(TransferType::EthTopUp.as_str()))
            .filter(transfer::Column::Status.eq(TransferStatus::Pending.as_str()))
            .filter(transfer::Column::DeletedAt.is_null())
            .all(&self.db)
            .await?;
        Ok(transfers)
    }

    /// Abandon the address's unsigned transfers before issuing a new pair.
    pub async fn clear_unsigned(&self, address: &str) -> Result<()> {
        Transfer::update_many()
            .col_expr(transfer::Column::DeletedAt, Expr::value(Utc::now()))
            .filter(
                Expr::expr(Func::lower(Expr::col(transfer::Column::FromAddress)))
                    .eq(address.to_lowercase()),
            )
            .filter(transfer::Column::Status.eq(TransferStatus::New.as_str()))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Lookup by row id or transaction hash; soft-deleted rows are hidden
    /// from both arms.
    pub async fn get_by_id_or_hash(&self, id: &str, tx_hash: &str) -> Result<transfer::Model> {
        let mut by_either = Condition::any().add(
            Expr::expr(Func::lower(Expr::col(transfer::Column::TxHash)))
                .eq(tx_hash.to_lowercase()),
        );
        if let Ok(uuid) = Uuid::parse_str(id) {
            by_either = by_either.add(transfer::Column::Id.eq(uuid));
        }

        Transfer::find()
            .filter(by_either)
            .filter(transfer::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("transfer not found".to_string()))
    }
}
