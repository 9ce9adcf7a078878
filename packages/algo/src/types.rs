//! Common Types and Constants
//!
//! Shared data structures used by the scheduler and the selection policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==================== Constants ====================

/// FSRS v4.5 weight table.
///
/// - `w[0..4]`: initial stability for ratings 1-4
/// - `w[4..8]`: initial difficulty, difficulty step, mean reversion
/// - `w[8..11]`: stability growth on recall
/// - `w[11..15]`: post-lapse stability
/// - `w[15..17]`: hard penalty / easy bonus (unused by the two-branch update)
pub const FSRS_WEIGHTS: [f64; 17] = [
    0.4, 0.6, 2.4, 5.8, // w0-w3: initial stability
    4.93, 0.94, 0.86, 0.01, // w4-w7: difficulty
    1.49, 0.14, 0.94, // w8-w10: recall stability
    2.18, 0.05, 0.34, 1.26, // w11-w14: forget stability
    0.29, 2.61, // w15-w16
];

/// Power-law decay exponent of the forgetting curve
pub const DECAY: f64 = -0.5;

/// `19/81`, chosen so that retrievability is 0.9 when elapsed == stability
pub const FACTOR: f64 = 19.0 / 81.0;

/// Target retention implied by [`FACTOR`]
pub const TARGET_RETENTION: f64 = 0.9;

/// Floor applied to stability before any power or division
pub const MIN_STABILITY: f64 = 0.01;

pub const MIN_DIFFICULTY: f64 = 1.0;
pub const MAX_DIFFICULTY: f64 = 10.0;

/// Shortest interval ever scheduled, in days
pub const MIN_INTERVAL_DAYS: i64 = 1;

/// Default presentation cooldown, in minutes
pub const DEFAULT_COOLDOWN_MINUTES: i64 = 30;

// ==================== Rating ====================

/// Recall quality reported by the grader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", from = "i32")]
pub enum Rating {
    Again = 1,
    Hard = 2,
    Good = 3,
    Easy = 4,
}

impl Rating {
    /// Clamps any integer into 1..=4.
    pub fn clamped(raw: i64) -> Self {
        match raw {
            i64::MIN..=1 => Self::Again,
            2 => Self::Hard,
            3 => Self::Good,
            _ => Self::Easy,
        }
    }

    pub fn value(self) -> i32 {
        self as i32
    }

    /// Zero-based index into the initial-stability weights.
    pub fn index(self) -> usize {
        (self as usize) - 1
    }

    pub fn is_lapse(self) -> bool {
        self == Self::Again
    }

    /// Maps a normalized grade in `[0, 1]` to a rating. Anything below 60%
    /// counts as forgotten.
    pub fn from_normalized_score(score: f64) -> Self {
        if score.is_nan() || score < 0.6 {
            Self::Again
        } else {
            Self::Good
        }
    }

    pub fn from_correct(is_correct: bool, response_time_ms: i64) -> Self {
        if !is_correct {
            return Self::Again;
        }
        if response_time_ms < 2000 {
            Self::Easy
        } else if response_time_ms < 5000 {
            Self::Good
        } else {
            Self::Hard
        }
    }
}

impl From<i32> for Rating {
    fn from(raw: i32) -> Self {
        Self::clamped(raw as i64)
    }
}

impl From<i64> for Rating {
    fn from(raw: i64) -> Self {
        Self::clamped(raw)
    }
}

impl From<Rating> for i32 {
    fn from(rating: Rating) -> Self {
        rating.value()
    }
}

// ==================== Memory State ====================

/// Per user-item memory model.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryState {
    /// Days until recall probability decays to ~90%
    pub stability: f64,
    /// Intrinsic hardness, 1-10
    pub difficulty: f64,
    /// Completed reviews, including the first
    pub repetitions: u32,
    /// Reviews rated "forgot"
    pub lapses: u32,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub next_due_at: Option<DateTime<Utc>>,
}

impl MemoryState {
    /// An item that has never been reviewed.
    pub fn is_unseen(&self) -> bool {
        self.repetitions == 0
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.is_unseen() && self.next_due_at.map_or(false, |due| due <= now)
    }
}

// ==================== Review Outcome ====================

/// Upstream corruption corrected while scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StateAnomaly {
    /// Repeated item with no last review time; elapsed treated as zero
    MissingLastReview,
    /// Stability was zero, negative or not finite
    StabilityFloored { original: f64 },
    /// Difficulty was outside [1, 10] or not finite
    DifficultyClamped { original: f64 },
}

/// Everything computed for one review event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    pub state: MemoryState,
    pub rating: Rating,
    /// Recall probability at review time (1.0 on first exposure)
    pub retrievability: f64,
    pub elapsed_days: i64,
    pub interval_days: i64,
    pub anomalies: Vec<StateAnomaly>,
}
