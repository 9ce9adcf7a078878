#![allow(dead_code)]

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use sqlx::SqlitePool;
use tempfile::TempDir;

use recall_backend::config::ReviewConfig;
use recall_backend::db;
use recall_backend::services::ReviewService;

/// Temporary on-disk store. Keep it alive for the duration of the test.
pub struct TestStore {
    pub dir: TempDir,
    pub pool: SqlitePool,
}

pub async fn create_test_store() -> TestStore {
    let dir = TempDir::new().expect("failed to create temp dir");
    let db_path = dir.path().join("data").join("recall.db");
    let pool = db::init_sqlite_pool(&db_path, Duration::from_secs(30))
        .await
        .expect("failed to open test store");
    TestStore { dir, pool }
}

pub async fn create_test_service(config: ReviewConfig) -> (TestStore, ReviewService) {
    let store = create_test_store().await;
    let service = ReviewService::new(store.pool.clone(), &config);
    (store, service)
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 8, 0, 0).unwrap()
}
