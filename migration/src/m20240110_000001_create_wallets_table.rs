use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Wallet::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Wallet::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()".to_string()),
                    )
                    .col(ColumnDef::new(Wallet::Address).string().not_null())
                    .col(ColumnDef::new(Wallet::GeneratedAt).timestamp_with_time_zone().not_null())
                    .col(
                        ColumnDef::new(Wallet::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .extra("DEFAULT NOW()".to_string()),
                    )
                    .col(ColumnDef::new(Wallet::UpdatedAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Wallet::DeletedAt).timestamp_with_time_zone().null())
                    .to_owned(),
            )
            .await?;

        // unique among non-deleted rows, case-insensitive
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX idx_wallets_address ON wallets (LOWER(address)) WHERE deleted_at IS NULL;",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Wallet::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Wallet {
    #[sea_orm(iden = "wallets")]
    Table,
    Id,
    Address,
    GeneratedAt,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
}
