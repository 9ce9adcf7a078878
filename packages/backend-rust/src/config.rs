use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use recall_algo::{DuePolicy, NewItemOrder, DEFAULT_COOLDOWN_MINUTES};
use thiserror::Error;

use crate::db::operations::memory_states::MAX_BATCH_SIZE;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub log_level: String,
    pub sqlite_busy_timeout: Duration,
    pub review: ReviewConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewConfig {
    pub cooldown_minutes: i64,
    pub batch_size: usize,
    pub new_item_order: NewItemOrder,
    pub max_write_retries: u32,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            cooldown_minutes: DEFAULT_COOLDOWN_MINUTES,
            batch_size: 10,
            new_item_order: NewItemOrder::Insertion,
            max_write_retries: 3,
        }
    }
}

impl ReviewConfig {
    pub fn due_policy(&self) -> DuePolicy {
        DuePolicy::with_cooldown_minutes(self.cooldown_minutes)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = lookup("RECALL_DB_PATH")
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_db_path);

        let log_level = lookup("RUST_LOG").unwrap_or_else(|| "info".to_string());

        let busy_timeout_ms: u64 = parse_or(&lookup, "SQLITE_BUSY_TIMEOUT_MS", 5000)?;

        let defaults = ReviewConfig::default();
        let cooldown_minutes: i64 =
            parse_or(&lookup, "REVIEW_COOLDOWN_MINUTES", defaults.cooldown_minutes)?;
        if cooldown_minutes < 0 {
            return Err(ConfigError::Invalid {
                key: "REVIEW_COOLDOWN_MINUTES",
                value: cooldown_minutes.to_string(),
            });
        }

        let batch_size: usize = parse_or(&lookup, "REVIEW_BATCH_SIZE", defaults.batch_size)?;
        if batch_size == 0 || batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::Invalid {
                key: "REVIEW_BATCH_SIZE",
                value: batch_size.to_string(),
            });
        }

        let new_item_order = match lookup("REVIEW_NEW_ITEM_ORDER") {
            Some(raw) => NewItemOrder::parse(&raw).ok_or(ConfigError::Invalid {
                key: "REVIEW_NEW_ITEM_ORDER",
                value: raw,
            })?,
            None => defaults.new_item_order,
        };

        let max_write_retries: u32 =
            parse_or(&lookup, "REVIEW_MAX_WRITE_RETRIES", defaults.max_write_retries)?;

        Ok(Self {
            db_path,
            log_level,
            sqlite_busy_timeout: Duration::from_millis(busy_timeout_ms),
            review: ReviewConfig {
                cooldown_minutes,
                batch_size,
                new_item_order,
                max_write_retries,
            },
        })
    }
}

pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("recall")
        .join("recall.db")
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}
