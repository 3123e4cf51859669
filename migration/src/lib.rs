pub use sea_orm_migration::prelude::*;

mod m20240110_000001_create_wallets_table;
mod m20240110_000002_create_transactions_table;
mod m20240110_000003_create_transfers_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migration_table_name() -> sea_orm_migration::sea_orm::DynIden {
        Alias::new("wallet_schema_migrations").into_iden()
    }

    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240110_000001_create_wallets_table::Migration),
            Box::new(m20240110_000002_create_transactions_table::Migration),
            Box::new(m20240110_000003_create_transfers_table::Migration),
        ]
    }
}
