use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Transaction::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transaction::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()".to_string()),
                    )
                    .col(ColumnDef::new(Transaction::Hash).string().not_null())
                    .col(ColumnDef::new(Transaction::BlockNumber).big_integer().not_null().default(0))
                    .col(ColumnDef::new(Transaction::Type).string_len(20).not_null())
                    .col(ColumnDef::new(Transaction::Status).string_len(20).not_null())
                    .col(ColumnDef::new(Transaction::FromAddress).string().not_null().default(""))
                    .col(ColumnDef::new(Transaction::ToAddress).string().not_null().default(""))
                    .col(ColumnDef::new(Transaction::Value).string_len(80).not_null().default("0"))
                    .col(ColumnDef::new(Transaction::Time).big_integer().not_null().default(0))
                    .col(
                        ColumnDef::new(Transaction::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .extra("DEFAULT NOW()".to_string()),
                    )
                    .col(ColumnDef::new(Transaction::UpdatedAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Transaction::DeletedAt).timestamp_with_time_zone().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_transactions_hash")
                    .table(Transaction::Table)
                    .col(Transaction::Hash)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_transactions_from_address")
                    .table(Transaction::Table)
                    .col(Transaction::FromAddress)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_transactions_to_address")
                    .table(Transaction::Table)
                    .col(Transaction::ToAddress)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Transaction::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Transaction {
    #[sea_orm(iden = "transactions")]
    Table,
    Id,
    Hash,
    BlockNumber,
    Type,
    Status,
    FromAddress,
    ToAddress,
    Value,
    Time,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
}
