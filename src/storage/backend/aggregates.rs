//! 天级汇总行的覆盖式 upsert 与保留期清理

use chrono::{NaiveDate, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};
use tracing::{debug, info};

use super::SeaOrmStorage;
use super::retry;

use migration::entities::link_stats_daily;

/// 聚合产出的一行天级统计
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyStat {
    pub link_id: i64,
    pub day_bucket: NaiveDate,
    pub clicks: i64,
    pub unique_visitors: i64,
}

impl SeaOrmStorage {
    /// 覆盖式 upsert：冲突目标 (link_id, day_bucket)，两个统计列整体覆盖
    ///
    /// 同窗口重跑产生完全相同的行，这是聚合幂等性的落点。
    pub async fn upsert_daily_stats(&self, stats: Vec<DailyStat>) -> anyhow::Result<u64> {
        if stats.is_empty() {
            return Ok(0);
        }

        let total = stats.len() as u64;
        let models: Vec<link_stats_daily::ActiveModel> = stats
            .iter()
            .map(|stat| link_stats_daily::ActiveModel {
                link_id: Set(stat.link_id),
                day_bucket: Set(stat.day_bucket),
                clicks: Set(stat.clicks),
                unique_visitors: Set(stat.unique_visitors),
                ..Default::default()
            })
            .collect();

        let db = self.get_db();
        retry::with_retry("upsert_daily_stats", self.retry_config(), || async {
            link_stats_daily::Entity::insert_many(models.clone())
                .on_conflict(
                    OnConflict::columns([
                        link_stats_daily::Column::LinkId,
                        link_stats_daily::Column::DayBucket,
                    ])
                    .update_columns([
                        link_stats_daily::Column::Clicks,
                        link_stats_daily::Column::UniqueVisitors,
                    ])
                    .to_owned(),
                )
                .exec_without_returning(db)
                .await
        })
        .await
        .map_err(|e| anyhow::anyhow!("Failed to upsert daily stats: {}", e))?;

        debug!("Upserted {} daily stat rows", total);
        Ok(total)
    }

    /// 读取某天的全部汇总行（按 link_id 排序，测试与巡检用）
    pub async fn load_daily_stats(
        &self,
        day: NaiveDate,
    ) -> Result<Vec<link_stats_daily::Model>, sea_orm::DbErr> {
        use sea_orm::QueryOrder;

        link_stats_daily::Entity::find()
            .filter(link_stats_daily::Column::DayBucket.eq(day))
            .order_by_asc(link_stats_daily::Column::LinkId)
            .all(self.get_db())
            .await
    }

    /// 清理超过保留期的汇总行；retention_days = 0 表示关闭清理
    pub async fn cleanup_expired_stats(&self, retention_days: u64) -> anyhow::Result<u64> {
        if retention_days == 0 {
            return Ok(0);
        }

        let cutoff = (Utc::now() - chrono::Duration::days(retention_days as i64)).date_naive();
        let deleted = link_stats_daily::Entity::delete_many()
            .filter(link_stats_daily::Column::DayBucket.lt(cutoff))
            .exec(self.get_db())
            .await?
            .rows_affected;

        if deleted > 0 {
            info!(
                "Stats retention cleanup removed {} rows older than {}",
                deleted, cutoff
            );
        }
        Ok(deleted)
    }
}
