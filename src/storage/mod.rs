use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::Result;

pub mod backend;

pub use backend::{SeaOrmStorage, connect_database, run_migrations};

/// 链接领域模型（从 links 表读出，本服务只读）
#[derive(Debug, Clone)]
pub struct Link {
    pub id: i64,
    pub code: String,
    pub target_url: String,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_clicks: Option<i64>,
    pub click_count: i64,
    pub created_at: DateTime<Utc>,
}

impl Link {
    /// 链接当前是否可供跳转：启用、未过期、未耗尽点击上限
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        if let Some(expires_at) = self.expires_at
            && expires_at <= now
        {
            return false;
        }
        if let Some(max_clicks) = self.max_clicks
            && self.click_count >= max_clicks
        {
            return false;
        }
        true
    }

    /// 无过期且无点击上限的链接目标恒定，可用 301
    pub fn is_permanent(&self) -> bool {
        self.expires_at.is_none() && self.max_clicks.is_none()
    }
}

/// 只读链接查询端（热路径回源）
#[async_trait]
pub trait LinkReader: Send + Sync {
    /// 按短码查询，受严格超时约束；超时按错误处理
    async fn find_by_code(&self, code: &str) -> Result<Option<Link>>;

    /// 就绪探测
    async fn ping(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn base_link() -> Link {
        Link {
            id: 1,
            code: "abc123".to_string(),
            target_url: "https://example.com".to_string(),
            is_active: true,
            expires_at: None,
            max_clicks: None,
            click_count: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_eligibility() {
        let now = Utc::now();
        assert!(base_link().is_eligible(now));

        let mut disabled = base_link();
        disabled.is_active = false;
        assert!(!disabled.is_eligible(now));

        let mut expired = base_link();
        expired.expires_at = Some(now - Duration::hours(1));
        assert!(!expired.is_eligible(now));

        let mut exhausted = base_link();
        exhausted.max_clicks = Some(10);
        exhausted.click_count = 10;
        assert!(!exhausted.is_eligible(now));

        let mut under_cap = base_link();
        under_cap.max_clicks = Some(10);
        under_cap.click_count = 9;
        assert!(under_cap.is_eligible(now));
    }

    #[test]
    fn test_permanence() {
        assert!(base_link().is_permanent());

        let mut capped = base_link();
        capped.max_clicks = Some(100);
        assert!(!capped.is_permanent());

        let mut expiring = base_link();
        expiring.expires_at = Some(Utc::now() + Duration::days(1));
        assert!(!expiring.is_permanent());
    }
}
