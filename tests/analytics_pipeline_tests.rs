//! 点击分析管道集成测试
//!
//! Producer → 队列 → BatchWorker → Accumulator → SQLite 全链路，
//! 以及 event_id 幂等去重和点击计数补充通道。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait, PaginatorTrait};
use tempfile::TempDir;
use tokio::sync::watch;

use linkjet::analytics::{
    BatchWorker, ClickAccumulator, ClickEvent, ClickEventProducer, ClickEventSink, ClickInput,
    ClickQueue, MemoryClickQueue,
};
use linkjet::bot::{BotDetector, FrequencyTracker, IpReputationFilter};
use linkjet::config::{AnalyticsConfig, BotConfig, DatabaseConfig};
use linkjet::metrics_core::NoopMetrics;
use linkjet::storage::{SeaOrmStorage, run_migrations};

use migration::entities::{click_event, link};

const BROWSER_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

async fn setup_storage() -> (Arc<SeaOrmStorage>, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("analytics_test.db");
    let config = DatabaseConfig {
        database_url: format!("sqlite://{}?mode=rwc", db_path.display()),
        read_timeout_ms: 5000,
        ..DatabaseConfig::default()
    };

    let storage = Arc::new(
        SeaOrmStorage::new(&config)
            .await
            .expect("Failed to create storage"),
    );
    run_migrations(storage.get_db())
        .await
        .expect("Failed to run migrations");

    (storage, temp_dir)
}

async fn insert_link(storage: &SeaOrmStorage, code: &str) -> i64 {
    let model = link::ActiveModel {
        code: Set(code.to_string()),
        target_url: Set(format!("https://example.com/{code}")),
        is_active: Set(true),
        click_count: Set(0),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    model
        .insert(storage.get_db())
        .await
        .expect("Failed to insert link")
        .id
}

fn sample_event(id: &str, link_id: i64, ip_hash: Option<&str>) -> ClickEvent {
    ClickEvent {
        event_id: id.to_string(),
        code: "abc123".to_string(),
        link_id,
        timestamp_ms: Utc::now().timestamp_millis(),
        ip_hash: ip_hash.map(String::from),
        user_agent: Some(BROWSER_UA.to_string()),
        referrer: None,
        country: None,
        region: None,
        is_bot: false,
    }
}

#[tokio::test]
async fn test_persist_events_deduplicates_by_event_id() {
    let (storage, _dir) = setup_storage().await;
    let link_id = insert_link(&storage, "abc123").await;

    let batch = vec![
        sample_event("evt-1", link_id, Some("aaaa")),
        sample_event("evt-2", link_id, Some("bbbb")),
    ];

    let inserted = storage.persist_events(batch.clone()).await.unwrap();
    assert_eq!(inserted, 2);

    // 同一批次重复投递：全部按 event_id 去重
    let inserted = storage.persist_events(batch).await.unwrap();
    assert_eq!(inserted, 0);

    // 部分重复：只写入新行
    let mixed = vec![
        sample_event("evt-2", link_id, Some("bbbb")),
        sample_event("evt-3", link_id, Some("cccc")),
    ];
    let inserted = storage.persist_events(mixed).await.unwrap();
    assert_eq!(inserted, 1);

    let total = click_event::Entity::find()
        .count(storage.get_db())
        .await
        .unwrap();
    assert_eq!(total, 3);
}

#[tokio::test]
async fn test_counter_pass_updates_link_click_count() {
    let (storage, _dir) = setup_storage().await;
    let link_id = insert_link(&storage, "abc123").await;

    storage
        .bump_click_counts(vec![(link_id, 5)])
        .await
        .unwrap();
    storage
        .bump_click_counts(vec![(link_id, 2)])
        .await
        .unwrap();

    let model = link::Entity::find_by_id(link_id)
        .one(storage.get_db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(model.click_count, 7);
}

#[tokio::test]
async fn test_counter_pass_tolerates_deleted_links() {
    let (storage, _dir) = setup_storage().await;
    let link_id = insert_link(&storage, "abc123").await;

    // 含有一个不存在的 link_id，整体仍然成功
    storage
        .bump_click_counts(vec![(link_id, 1), (999_999, 3)])
        .await
        .unwrap();

    let model = link::Entity::find_by_id(link_id)
        .one(storage.get_db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(model.click_count, 1);
}

#[tokio::test]
async fn test_full_pipeline_producer_to_storage() {
    let (storage, _dir) = setup_storage().await;
    let link_id = insert_link(&storage, "pipe123").await;

    let queue = Arc::new(MemoryClickQueue::new());
    let bot_config = BotConfig::default();
    let producer = Arc::new(ClickEventProducer::new(
        queue.clone(),
        Arc::new(BotDetector::new(
            Arc::new(FrequencyTracker::new(None, &bot_config)),
            Arc::new(IpReputationFilter::new(1000, 0.01, None)),
        )),
        NoopMetrics::arc(),
        &AnalyticsConfig::default(),
    ));

    // 12 条点击进队列
    for i in 0..12 {
        producer
            .emit(ClickInput {
                code: "pipe123".to_string(),
                link_id,
                ip: Some(format!("203.0.113.{i}")),
                user_agent: Some(BROWSER_UA.to_string()),
                ..Default::default()
            })
            .await;
    }
    assert_eq!(queue.len(), 12);

    let sink: Arc<dyn ClickEventSink> = storage.clone();
    let accumulator = Arc::new(ClickAccumulator::new(
        sink,
        NoopMetrics::arc(),
        &AnalyticsConfig {
            batch_size: 5,
            batch_timeout_ms: 60_000,
            ..AnalyticsConfig::default()
        },
    ));

    let worker = Arc::new(BatchWorker::new(
        queue.clone() as Arc<dyn ClickQueue>,
        accumulator.clone(),
        5,
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(worker.run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    // 全部 12 条落库
    let total = click_event::Entity::find()
        .count(storage.get_db())
        .await
        .unwrap();
    assert_eq!(total, 12);

    // 补充通道把链接计数推到 12
    let model = link::Entity::find_by_id(link_id)
        .one(storage.get_db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(model.click_count, 12);

    // 事件字段脱敏：有哈希、无原始 IP 形态
    let rows = click_event::Entity::find()
        .all(storage.get_db())
        .await
        .unwrap();
    for row in rows {
        let hash = row.ip_hash.expect("ip hash present");
        assert_eq!(hash.len(), 16);
        assert!(!hash.contains('.'));
        assert!(!row.is_bot);
    }
}
