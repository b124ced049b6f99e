//! 点击事件落库
//!
//! 批量插入以 `event_id` 唯一索引去重：同一事件重复投递时冲突行
//! 被跳过，实现“实际上恰好一次”的消费语义。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QuerySelect};
use tracing::debug;

use super::SeaOrmStorage;
use super::retry;
use crate::analytics::{ClickEvent, ClickEventSink};

use migration::entities::click_event;

#[async_trait]
impl ClickEventSink for SeaOrmStorage {
    async fn persist_events(&self, events: Vec<ClickEvent>) -> anyhow::Result<u64> {
        if events.is_empty() {
            return Ok(0);
        }

        let total = events.len();
        let models: Vec<click_event::ActiveModel> = events
            .iter()
            .map(|event| click_event::ActiveModel {
                event_id: Set(event.event_id.clone()),
                code: Set(event.code.clone()),
                link_id: Set(event.link_id),
                clicked_at: Set(event.clicked_at()),
                ip_hash: Set(event.ip_hash.clone()),
                user_agent: Set(event.user_agent.clone()),
                referrer: Set(event.referrer.clone()),
                country: Set(event.country.clone()),
                region: Set(event.region.clone()),
                is_bot: Set(event.is_bot),
                ..Default::default()
            })
            .collect();

        let db = self.get_db();
        let inserted = retry::with_retry("persist_events", self.retry_config(), || async {
            match click_event::Entity::insert_many(models.clone())
                .on_conflict(
                    OnConflict::column(click_event::Column::EventId)
                        .do_nothing()
                        .to_owned(),
                )
                .exec_without_returning(db)
                .await
            {
                Ok(rows) => Ok(rows),
                // 整批都是重复 event_id：幂等跳过，不算错误
                Err(sea_orm::DbErr::RecordNotInserted) => Ok(0),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(|e| anyhow::anyhow!("Failed to batch insert click events: {}", e))?;

        debug!(
            "Click events written to {} database ({}/{} rows, rest deduplicated)",
            self.backend_name().to_uppercase(),
            inserted,
            total
        );

        Ok(inserted)
    }

    async fn bump_click_counts(&self, updates: Vec<(i64, usize)>) -> anyhow::Result<()> {
        self.flush_click_counts(updates).await
    }
}

impl SeaOrmStorage {
    /// 读取窗口内的原始事件行 (link_id, clicked_at, ip_hash)
    ///
    /// 聚合任务只需要这三列，避免搬运自由文本字段。
    pub async fn load_event_rows(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        link_ids: Option<&[i64]>,
    ) -> Result<Vec<(i64, DateTime<Utc>, Option<String>)>, sea_orm::DbErr> {
        let mut query = click_event::Entity::find()
            .select_only()
            .column(click_event::Column::LinkId)
            .column(click_event::Column::ClickedAt)
            .column(click_event::Column::IpHash)
            .filter(click_event::Column::ClickedAt.gte(start))
            .filter(click_event::Column::ClickedAt.lt(end));

        if let Some(ids) = link_ids {
            query = query.filter(click_event::Column::LinkId.is_in(ids.iter().copied()));
        }

        query.into_tuple().all(self.get_db()).await
    }
}
