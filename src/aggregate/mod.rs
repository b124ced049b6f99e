//! 点击统计汇总
//!
//! 把原始点击事件滚成 (link_id, day_bucket) 维度的天级统计。
//! 任务携带显式的 `[start, end)` 窗口，覆盖式 upsert 保证同窗口
//! 重跑幂等。

pub mod jobs;
pub mod scheduler;

pub use jobs::AggregationRunner;
pub use scheduler::{AggregationScheduler, FailedJob};

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Backfill,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Hourly => "hourly",
            JobType::Daily => "daily",
            JobType::Weekly => "weekly",
            JobType::Monthly => "monthly",
            JobType::Backfill => "backfill",
        }
    }
}

/// 一次汇总任务
///
/// 队列 JSON 形态：`{"type":"hourly","start_date":…,"end_date":…,"link_ids":…}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationJob {
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_ids: Option<Vec<i64>>,
}

/// 截断到整点
pub fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive()
        .and_hms_opt(ts.hour(), 0, 0)
        .expect("valid hour")
        .and_utc()
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0).expect("valid midnight").and_utc()
}

impl AggregationJob {
    /// 小时任务：窗口从所在天零点铺到 hour_end（day-to-date）。
    ///
    /// 覆盖式 upsert 以天为粒度，只重算单个小时会把当天此前的
    /// 统计冲掉，所以窗口总是从当天零点开始。
    pub fn hourly_ending(hour_end: DateTime<Utc>) -> Self {
        let hour_end = truncate_to_hour(hour_end);
        let hour_start = hour_end - Duration::hours(1);
        Self {
            job_type: JobType::Hourly,
            start_date: day_start(hour_start.date_naive()),
            end_date: hour_end,
            link_ids: None,
        }
    }

    /// 天任务：覆盖 date 当天 `[00:00, 次日 00:00)`
    pub fn daily_for(date: NaiveDate) -> Self {
        Self {
            job_type: JobType::Daily,
            start_date: day_start(date),
            end_date: day_start(date + Duration::days(1)),
            link_ids: None,
        }
    }

    /// 周任务：覆盖以 end_date（不含）为界的前 7 天
    pub fn weekly_ending(end_date: NaiveDate) -> Self {
        Self {
            job_type: JobType::Weekly,
            start_date: day_start(end_date - Duration::days(7)),
            end_date: day_start(end_date),
            link_ids: None,
        }
    }

    /// 月任务：覆盖指定月份整月
    pub fn monthly_for(year: i32, month: u32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)?;
        let end = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        Some(Self {
            job_type: JobType::Monthly,
            start_date: day_start(start),
            end_date: day_start(end),
            link_ids: None,
        })
    }

    /// 手动回填：任意日期区间 `[from, to]`（含两端），可选限定链接
    pub fn backfill(from: NaiveDate, to: NaiveDate, link_ids: Option<Vec<i64>>) -> Self {
        Self {
            job_type: JobType::Backfill,
            start_date: day_start(from),
            end_date: day_start(to + Duration::days(1)),
            link_ids,
        }
    }

    /// 窗口覆盖的天数（日志用）
    pub fn span_days(&self) -> i64 {
        (self.end_date.date_naive() - self.start_date.date_naive())
            .num_days()
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hourly_window_is_day_to_date() {
        let hour_end = "2026-07-15T14:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let job = AggregationJob::hourly_ending(hour_end);

        assert_eq!(job.job_type, JobType::Hourly);
        assert_eq!(
            job.start_date,
            "2026-07-15T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert_eq!(job.end_date, hour_end);
    }

    #[test]
    fn test_hourly_at_midnight_covers_prior_day() {
        // 整点 00:00 的小时任务应覆盖前一天全天
        let hour_end = "2026-07-15T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let job = AggregationJob::hourly_ending(hour_end);

        assert_eq!(
            job.start_date,
            "2026-07-14T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert_eq!(job.end_date, hour_end);
    }

    #[test]
    fn test_daily_window_half_open() {
        let date = NaiveDate::from_ymd_opt(2026, 7, 14).unwrap();
        let job = AggregationJob::daily_for(date);

        assert_eq!(
            job.start_date,
            "2026-07-14T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert_eq!(
            job.end_date,
            "2026-07-15T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert_eq!(job.span_days(), 1);
    }

    #[test]
    fn test_monthly_window() {
        let job = AggregationJob::monthly_for(2026, 12).unwrap();
        assert_eq!(
            job.start_date,
            "2026-12-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert_eq!(
            job.end_date,
            "2027-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[test]
    fn test_job_wire_format() {
        let job = AggregationJob::backfill(
            NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 7, 3).unwrap(),
            Some(vec![1, 2]),
        );
        let json = serde_json::to_string(&job).unwrap();
        assert!(json.contains("\"type\":\"backfill\""));
        assert!(json.contains("link_ids"));

        let parsed: AggregationJob = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.job_type, JobType::Backfill);
        assert_eq!(parsed.span_days(), 3);
    }
}
