//! 点击事件表迁移
//!
//! click_events 表存储原始点击记录，一行一次点击：
//! - event_id 唯一索引用于幂等去重（批量写入可重复投递）
//! - 外键级联删除：链接删除时清理其事件

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ClickEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ClickEvents::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ClickEvents::EventId)
                            .string_len(36)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ClickEvents::Code).string_len(32).not_null())
                    .col(ColumnDef::new(ClickEvents::LinkId).big_integer().not_null())
                    .col(
                        ColumnDef::new(ClickEvents::ClickedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ClickEvents::IpHash).string_len(16).null())
                    .col(ColumnDef::new(ClickEvents::UserAgent).text().null())
                    .col(ColumnDef::new(ClickEvents::Referrer).text().null())
                    .col(ColumnDef::new(ClickEvents::Country).string_len(2).null())
                    .col(ColumnDef::new(ClickEvents::Region).string_len(64).null())
                    .col(
                        ColumnDef::new(ClickEvents::IsBot)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_click_events_link")
                            .from(ClickEvents::Table, ClickEvents::LinkId)
                            .to(Links::Table, Links::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // event_id 唯一索引：幂等写入的关键
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_click_events_event_id")
                    .table(ClickEvents::Table)
                    .col(ClickEvents::EventId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 聚合查询走 (link_id, clicked_at)
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_click_events_link_time")
                    .table(ClickEvents::Table)
                    .col(ClickEvents::LinkId)
                    .col(ClickEvents::ClickedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_click_events_clicked_at")
                    .table(ClickEvents::Table)
                    .col(ClickEvents::ClickedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ClickEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ClickEvents {
    Table,
    Id,
    EventId,
    Code,
    LinkId,
    ClickedAt,
    IpHash,
    UserAgent,
    Referrer,
    Country,
    Region,
    IsBot,
}

#[derive(DeriveIden)]
enum Links {
    Table,
    Id,
}
