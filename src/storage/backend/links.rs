//! 链接读取与点击计数维护
//!
//! `find_by_code` 是热路径唯一的数据库操作，受单次严格超时约束，
//! 不重试：超时对控制流而言等同于数据库错误，由解析器走降级路径。

use std::time::Duration;

use async_trait::async_trait;
use sea_orm::sea_query::{CaseStatement, Expr, Query};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, ExprTrait, QueryFilter};
use tokio::time::timeout;
use tracing::debug;

use super::SeaOrmStorage;
use super::retry;
use crate::errors::{LinkjetError, Result};
use crate::storage::{Link, LinkReader};

use migration::entities::link;

fn model_to_link(model: link::Model) -> Link {
    Link {
        id: model.id,
        code: model.code,
        target_url: model.target_url,
        is_active: model.is_active,
        expires_at: model.expires_at,
        max_clicks: model.max_clicks,
        click_count: model.click_count,
        created_at: model.created_at,
    }
}

#[async_trait]
impl LinkReader for SeaOrmStorage {
    async fn find_by_code(&self, code: &str) -> Result<Option<Link>> {
        let read_timeout = Duration::from_millis(self.read_timeout_ms());
        let fut = link::Entity::find()
            .filter(link::Column::Code.eq(code))
            .one(self.get_db());

        match timeout(read_timeout, fut).await {
            Ok(Ok(model)) => Ok(model.map(model_to_link)),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(LinkjetError::database_operation(format!(
                "find_by_code('{}') timed out after {}ms",
                code,
                self.read_timeout_ms()
            ))),
        }
    }

    async fn ping(&self) -> Result<()> {
        self.get_db().ping().await.map_err(Into::into)
    }
}

impl SeaOrmStorage {
    /// 按 link_id 批量累加点击计数
    ///
    /// 单条 UPDATE + CASE WHEN，跨 SQLite/MySQL/PostgreSQL 兼容。
    /// 已删除的 link_id 自然不匹配任何行，静默跳过。
    pub async fn flush_click_counts(&self, updates: Vec<(i64, usize)>) -> anyhow::Result<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let total = updates.len();
        let mut case_stmt = CaseStatement::new();
        let mut ids: Vec<i64> = Vec::with_capacity(total);

        for (link_id, count) in &updates {
            case_stmt = case_stmt.case(
                Expr::col(link::Column::Id).eq(Expr::val(*link_id)),
                Expr::col(link::Column::ClickCount).add(Expr::val(*count as i64)),
            );
            ids.push(*link_id);
        }
        // 不匹配的保持原值
        case_stmt = case_stmt.finally(Expr::col(link::Column::ClickCount));

        let stmt = Query::update()
            .table(link::Entity)
            .value(link::Column::ClickCount, case_stmt)
            .and_where(Expr::col(link::Column::Id).is_in(ids))
            .to_owned();

        let db = self.get_db();
        let stmt_ref = &stmt;
        retry::with_retry("flush_click_counts", self.retry_config(), || async {
            db.execute(stmt_ref).await
        })
        .await
        .map_err(|e| anyhow::anyhow!("Failed to batch update click counts: {}", e))?;

        debug!(
            "Click counts flushed to {} database ({} links)",
            self.backend_name().to_uppercase(),
            total
        );

        Ok(())
    }
}
