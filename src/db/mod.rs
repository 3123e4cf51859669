use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};

use crate::config;
use crate::error::{AppError, Result};

pub mod entity;
pub use entity::*;

mod transaction_repository;
pub use transaction_repository::{HistoryRow, NewTransaction, TransactionRepository};

mod transfer_repository;
pub use transfer_repository::{NewTransfer, TransferRepository};

mod wallet_repository;
pub use wallet_repository::WalletRepository;

/// Connect to Postgres and bring the schema up to date.
pub async fn connect(cfg: &config::Database) -> Result<DatabaseConnection> {
    let db = Database::connect(cfg.connection_url())
        .await
        .map_err(AppError::Database)?;

    Migrator::up(&db, None).await.map_err(AppError::Database)?;

    Ok(db)
}
