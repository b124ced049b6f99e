//! 天级统计汇总表迁移
//!
//! link_stats_daily 按 (link_id, day_bucket) 唯一，聚合任务覆盖式 upsert。

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(LinkStatsDaily::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LinkStatsDaily::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(LinkStatsDaily::LinkId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(LinkStatsDaily::DayBucket).date().not_null())
                    .col(
                        ColumnDef::new(LinkStatsDaily::Clicks)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(LinkStatsDaily::UniqueVisitors)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        // (link_id, day_bucket) 唯一：upsert 的冲突目标
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_link_stats_daily_link_day")
                    .table(LinkStatsDaily::Table)
                    .col(LinkStatsDaily::LinkId)
                    .col(LinkStatsDaily::DayBucket)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_link_stats_daily_day")
                    .table(LinkStatsDaily::Table)
                    .col(LinkStatsDaily::DayBucket)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(LinkStatsDaily::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum LinkStatsDaily {
    Table,
    Id,
    LinkId,
    DayBucket,
    Clicks,
    UniqueVisitors,
}
