pub mod config;
pub mod db;
pub mod logging;
pub mod services;

use crate::config::Config;
use crate::db::DbInitError;
use crate::services::review::ReviewService;

/// Opens the configured store and wires up the review service.
pub async fn create_review_service(config: &Config) -> Result<ReviewService, DbInitError> {
    let pool = db::init_sqlite_pool(&config.db_path, config.sqlite_busy_timeout).await?;
    Ok(ReviewService::new(pool, &config.review))
}
