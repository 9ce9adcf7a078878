use chrono::{DateTime, Utc};
use recall_algo::{fsrs_review, DuePolicy, NewItemOrder, Rating, ReviewOutcome, Selection, StateAnomaly};
use sqlx::SqlitePool;

use crate::config::ReviewConfig;
use crate::db::operations::memory_states::{self, ReviewRecord, ReviewStats, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("concurrent update on {user_id}/{item_id} not resolved after {attempts} attempts")]
    Conflict {
        user_id: String,
        item_id: String,
        attempts: u32,
    },
}

/// Grading-workflow entry point: applies review events to persisted memory
/// state and answers "what next" queries.
#[derive(Clone)]
pub struct ReviewService {
    pool: SqlitePool,
    policy: DuePolicy,
    new_item_order: NewItemOrder,
    batch_size: usize,
    max_write_retries: u32,
}

impl ReviewService {
    pub fn new(pool: SqlitePool, config: &ReviewConfig) -> Self {
        Self {
            pool,
            policy: config.due_policy(),
            new_item_order: config.new_item_order,
            batch_size: config.batch_size,
            max_write_retries: config.max_write_retries,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn policy(&self) -> &DuePolicy {
        &self.policy
    }

    /// Records one review. The rating is clamped into 1..=4.
    ///
    /// The read-modify-write is version checked; a concurrent review of the
    /// same pair forces a reload and a fresh computation.
    pub async fn record_review(
        &self,
        user_id: &str,
        item_id: &str,
        rating: impl Into<Rating>,
        now: DateTime<Utc>,
    ) -> Result<ReviewOutcome, ReviewError> {
        let rating = rating.into();
        let attempts = self.max_write_retries.saturating_add(1);

        for attempt in 1..=attempts {
            let record = memory_states::get_or_create_record(&self.pool, user_id, item_id, now).await?;
            let outcome = fsrs_review(&record.memory, rating, now);
            log_anomalies(&record, &outcome.anomalies);

            let saved = memory_states::save_memory_state(
                &self.pool,
                &record,
                &outcome.state,
                !rating.is_lapse(),
                now,
            )
            .await?;

            if saved {
                tracing::debug!(
                    user_id,
                    item_id,
                    rating = rating.value(),
                    repetitions = outcome.state.repetitions,
                    stability = outcome.state.stability,
                    difficulty = outcome.state.difficulty,
                    retrievability = outcome.retrievability,
                    interval_days = outcome.interval_days,
                    "review recorded"
                );
                return Ok(outcome);
            }

            tracing::warn!(user_id, item_id, attempt, "memory state changed underneath review, retrying");
        }

        Err(ReviewError::Conflict {
            user_id: user_id.to_string(),
            item_id: item_id.to_string(),
            attempts,
        })
    }

    /// Records a review from a normalized grade in `[0, 1]`.
    pub async fn record_graded_review(
        &self,
        user_id: &str,
        item_id: &str,
        normalized_score: f64,
        now: DateTime<Utc>,
    ) -> Result<ReviewOutcome, ReviewError> {
        let rating = Rating::from_normalized_score(normalized_score);
        self.record_review(user_id, item_id, rating, now).await
    }

    /// Records a review from a right/wrong answer and its response time.
    pub async fn record_timed_review(
        &self,
        user_id: &str,
        item_id: &str,
        is_correct: bool,
        response_time_ms: i64,
        now: DateTime<Utc>,
    ) -> Result<ReviewOutcome, ReviewError> {
        let rating = Rating::from_correct(is_correct, response_time_ms);
        self.record_review(user_id, item_id, rating, now).await
    }

    /// Next items to present, using the configured batch size when `limit`
    /// is `None`.
    pub async fn next_batch(
        &self,
        user_id: &str,
        limit: Option<usize>,
        now: DateTime<Utc>,
    ) -> Result<Selection<String>, ReviewError> {
        let limit = limit.unwrap_or(self.batch_size);
        let selection = memory_states::select_review_batch(
            &self.pool,
            user_id,
            &self.policy,
            self.new_item_order,
            limit,
            now,
        )
        .await?;
        tracing::debug!(
            user_id,
            due = selection.due.len(),
            fresh = selection.fresh.len(),
            "review batch selected"
        );
        Ok(selection)
    }

    pub async fn stats(&self, user_id: &str, now: DateTime<Utc>) -> Result<ReviewStats, ReviewError> {
        Ok(memory_states::review_stats(&self.pool, user_id, &self.policy, now).await?)
    }

    pub async fn state(
        &self,
        user_id: &str,
        item_id: &str,
    ) -> Result<Option<ReviewRecord>, ReviewError> {
        Ok(memory_states::get_record(&self.pool, user_id, item_id).await?)
    }
}

fn log_anomalies(record: &ReviewRecord, anomalies: &[StateAnomaly]) {
    for anomaly in anomalies {
        match anomaly {
            StateAnomaly::MissingLastReview => tracing::warn!(
                record_id = %record.id,
                user_id = %record.user_id,
                item_id = %record.item_id,
                repetitions = record.memory.repetitions,
                "repeated item has no last review time; treating elapsed as zero"
            ),
            StateAnomaly::StabilityFloored { original } => tracing::warn!(
                record_id = %record.id,
                original,
                "stability out of range; floored"
            ),
            StateAnomaly::DifficultyClamped { original } => tracing::warn!(
                record_id = %record.id,
                original,
                "difficulty out of range; clamped"
            ),
        }
    }
}
