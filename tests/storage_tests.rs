//! 存储后端集成测试（SQLite）

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use sea_orm::{ActiveModelTrait, ActiveValue::Set};
use tempfile::TempDir;

use linkjet::config::DatabaseConfig;
use linkjet::storage::backend::DailyStat;
use linkjet::storage::{LinkReader, SeaOrmStorage, run_migrations};

use migration::entities::link;

async fn setup_storage() -> (Arc<SeaOrmStorage>, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("storage_test.db");
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

#[tokio::test]
async fn test_find_by_code_roundtrip() {
    let (storage, _dir) = setup_storage().await;

    let expires = Utc::now() + Duration::days(7);
    link::ActiveModel {
        code: Set("abc123".to_string()),
        target_url: Set("https://example.com/target".to_string()),
        is_active: Set(true),
        expires_at: Set(Some(expires)),
        max_clicks: Set(Some(500)),
        click_count: Set(42),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(storage.get_db())
    .await
    .unwrap();

    let found = storage.find_by_code("abc123").await.unwrap().unwrap();
    assert_eq!(found.code, "abc123");
    assert_eq!(found.target_url, "https://example.com/target");
    assert!(found.is_active);
    assert_eq!(found.max_clicks, Some(500));
    assert_eq!(found.click_count, 42);
    assert!(!found.is_permanent());
    assert!(found.is_eligible(Utc::now()));

    assert!(storage.find_by_code("missing1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_ping() {
    let (storage, _dir) = setup_storage().await;
    storage.ping().await.unwrap();
}

#[tokio::test]
async fn test_upsert_daily_stats_overwrites() {
    let (storage, _dir) = setup_storage().await;
    let day = NaiveDate::from_ymd_opt(2026, 7, 14).unwrap();

    storage
        .upsert_daily_stats(vec![DailyStat {
            link_id: 1,
            day_bucket: day,
            clicks: 10,
            unique_visitors: 3,
        }])
        .await
        .unwrap();

    // 同键再写：整体覆盖而不是累加
    storage
        .upsert_daily_stats(vec![DailyStat {
            link_id: 1,
            day_bucket: day,
            clicks: 7,
            unique_visitors: 2,
        }])
        .await
        .unwrap();

    let stats = storage.load_daily_stats(day).await.unwrap();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].clicks, 7);
    assert_eq!(stats[0].unique_visitors, 2);
}

#[tokio::test]
async fn test_cleanup_expired_stats() {
    let (storage, _dir) = setup_storage().await;

    let old_day = (Utc::now() - Duration::days(120)).date_naive();
    let recent_day = (Utc::now() - Duration::days(3)).date_naive();

    storage
        .upsert_daily_stats(vec![
            DailyStat {
                link_id: 1,
                day_bucket: old_day,
                clicks: 5,
                unique_visitors: 5,
            },
            DailyStat {
                link_id: 1,
                day_bucket: recent_day,
                clicks: 9,
                unique_visitors: 4,
            },
        ])
        .await
        .unwrap();

    let deleted = storage.cleanup_expired_stats(90).await.unwrap();
    assert_eq!(deleted, 1);

    assert!(storage.load_daily_stats(old_day).await.unwrap().is_empty());
    assert_eq!(storage.load_daily_stats(recent_day).await.unwrap().len(), 1);

    // retention_days = 0 关闭清理
    let deleted = storage.cleanup_expired_stats(0).await.unwrap();
    assert_eq!(deleted, 0);
}
