//! 点击事件实体：一行一次点击，插入后不再更新

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "click_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// 幂等键，批量写入时用于去重
    #[sea_orm(unique)]
    pub event_id: String,
    pub code: String,
    pub link_id: i64,
    pub clicked_at: DateTimeUtc,
    /// xxh64 哈希后的客户端标识（十六进制），从不存原始 IP
    pub ip_hash: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub user_agent: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub referrer: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub is_bot: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
