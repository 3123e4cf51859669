use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::db::entity::{wallet, Wallet};
use crate::error::{AppError, Result};

pub struct WalletRepository {
    db: DatabaseConnection,
}

impl WalletRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        address: String,
        generated_at: DateTime<Utc>,
    ) -> Result<wallet::Model> {
        let model = wallet::ActiveModel {
            id: Set(Uuid::new_v4()),
            address: Set(address),
            generated_at: Set(generated_at.into()),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
            deleted_at: Set(None),
        };

        let wallet = model.insert(&self.db).await?;
        Ok(wallet)
    }

    /// Case-insensitive lookup among non-deleted wallets.
    pub async fn get(&self, address: &str) -> Result<wallet::Model> {
        Wallet::find()
            .filter(
                Expr::expr(Func::lower(Expr::col(wallet::Column::Address)))
                    .eq(address.to_lowercase()),
            )
            .filter(wallet::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("wallet not found".to_string()))
    }

    /// Single probe testing both event parties; returns the address that is
    /// a known wallet, if either.
    pub async fn existing_wallet(&self, from: &str, to: &str) -> Result<Option<String>> {
        let found = Wallet::find()
            .filter(
                sea_orm::Condition::any()
                    .add(
                        Expr::expr(Func::lower(Expr::col(wallet::Column::Address)))
                            .eq(from.to_lowercase()),
                    )
                    .add(
                        Expr::expr(Func::lower(Expr::col(wallet::Column::Address)))
                            .eq(to.to_lowercase()),
                    ),
            )
            .filter(wallet::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?;

        Ok(found.map(|w| w.address))
    }
}
