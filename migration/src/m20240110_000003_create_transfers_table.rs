use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Transfer::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transfer::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()".to_string()),
                    )
                    .col(ColumnDef::new(Transfer::TransferType).string_len(20).not_null())
                    .col(ColumnDef::new(Transfer::FromAddress).string().not_null())
                    .col(ColumnDef::new(Transfer::ToAddress).string().not_null().default(""))
                    .col(ColumnDef::new(Transfer::Nonce).big_integer().not_null())
                    .col(ColumnDef::new(Transfer::GasPrice).string_len(80).not_null())
                    .col(ColumnDef::new(Transfer::GasLimit).big_integer().not_null())
                    .col(ColumnDef::new(Transfer::Amount).string_len(80).not_null().default("0"))
                    .col(ColumnDef::new(Transfer::TaxAmount).string_len(80).not_null().default(""))
                    .col(ColumnDef::new(Transfer::EthTransferId).uuid().null())
                    .col(ColumnDef::new(Transfer::TxHash).string().null())
                    .col(ColumnDef::new(Transfer::RawTx).text().null())
                    .col(ColumnDef::new(Transfer::Status).string_len(20).not_null())
                    .col(ColumnDef::new(Transfer::Message).text().not_null().default(""))
                    .col(
                        ColumnDef::new(Transfer::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .extra("DEFAULT NOW()".to_string()),
                    )
                    .col(ColumnDef::new(Transfer::UpdatedAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Transfer::DeletedAt).timestamp_with_time_zone().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_transfers_from_address")
                    .table(Transfer::Table)
                    .col(Transfer::FromAddress)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_transfers_eth_transfer_id")
                    .table(Transfer::Table)
                    .col(Transfer::EthTransferId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_transfers_tx_hash")
                    .table(Transfer::Table)
                    .col(Transfer::TxHash)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Transfer::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Transfer {
    #[sea_orm(iden = "transfers")]
    Table,
    Id,
    TransferType,
    FromAddress,
    ToAddress,
    Nonce,
    GasPrice,
    GasLimit,
    Amount,
    TaxAmount,
    EthTransferId,
    TxHash,
    RawTx,
    Status,
    Message,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
}
