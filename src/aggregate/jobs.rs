//! 汇总任务执行
//!
//! 读取窗口内的原始事件，按 (link_id, 自然日) 分组，统计点击数和
//! 去重访客数，然后覆盖式 upsert 进天级统计表。分组用 BTreeMap，
//! 同一份输入总是产出同一顺序的同一批行，保证重跑幂等。

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use crate::aggregate::AggregationJob;
use crate::storage::SeaOrmStorage;
use crate::storage::backend::DailyStat;

pub struct AggregationRunner {
    storage: Arc<SeaOrmStorage>,
}

impl AggregationRunner {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        Self { storage }
    }

    /// 执行一次任务，返回 upsert 的行数
    pub async fn run(&self, job: &AggregationJob) -> anyhow::Result<u64> {
        let rows = self
            .storage
            .load_event_rows(job.start_date, job.end_date, job.link_ids.as_deref())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to load events for aggregation: {}", e))?;

        if rows.is_empty() {
            info!(
                "Aggregation {} [{} .. {}) found no events",
                job.job_type.as_str(),
                job.start_date,
                job.end_date
            );
            return Ok(0);
        }

        let event_count = rows.len();
        let stats = Self::group_rows(rows);
        let upserted = self.storage.upsert_daily_stats(stats).await?;

        info!(
            "Aggregation {} [{} .. {}) rolled {} events into {} daily rows",
            job.job_type.as_str(),
            job.start_date,
            job.end_date,
            event_count,
            upserted
        );

        Ok(upserted)
    }

    /// (link_id, clicked_at, ip_hash) → 每 (link_id, 日) 一行
    fn group_rows(
        rows: Vec<(i64, chrono::DateTime<chrono::Utc>, Option<String>)>,
    ) -> Vec<DailyStat> {
        let mut grouped: BTreeMap<(i64, NaiveDate), (i64, HashSet<String>)> = BTreeMap::new();

        for (link_id, clicked_at, ip_hash) in rows {
            let key = (link_id, clicked_at.date_naive());
            let entry = grouped.entry(key).or_insert_with(|| (0, HashSet::new()));
            entry.0 += 1;
            if let Some(hash) = ip_hash {
                entry.1.insert(hash);
            }
        }

        grouped
            .into_iter()
            .map(|((link_id, day_bucket), (clicks, visitors))| DailyStat {
                link_id,
                day_bucket,
                clicks,
                unique_visitors: visitors.len() as i64,
            })
            .collect()
    }
}
