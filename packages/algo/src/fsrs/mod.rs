//! FSRS Memory Scheduler
//!
//! Free Spaced Repetition Scheduler, v4.5 family, in its two-branch form:
//! a review is either a lapse (rating 1) or a recall (ratings 2-4).
//!
//! The scheduler is a pure function of `(state, rating, now)`. It never
//! fails: out-of-range ratings are clamped and corrupt persisted values are
//! sanitized before use, with each correction reported in
//! [`ReviewOutcome::anomalies`].

use chrono::{DateTime, Duration, Utc};

use crate::sanitize::{sanitize_difficulty, sanitize_stability, floor_stability};
use crate::types::{
    MemoryState, Rating, ReviewOutcome, StateAnomaly, DECAY, FACTOR, FSRS_WEIGHTS,
    MAX_DIFFICULTY, MIN_DIFFICULTY, MIN_INTERVAL_DAYS,
};

/// Largest interval that still fits in a `chrono::Duration` (about 292
/// million years).
pub const MAX_INTERVAL_DAYS: i64 = i64::MAX / 86_400_000;

/// Recall probability after `elapsed_days` for a memory of the given stability.
pub fn fsrs_retrievability(stability: f64, elapsed_days: f64) -> f64 {
    let s = floor_stability(stability);
    let t = elapsed_days.max(0.0);
    (1.0 + FACTOR * t / s).powf(DECAY)
}

/// Current recall probability of a tracked item. Unseen items have none.
pub fn retrievability_at(state: &MemoryState, now: DateTime<Utc>) -> f64 {
    if state.is_unseen() {
        return 0.0;
    }
    let elapsed = elapsed_days(state.last_reviewed_at, now).unwrap_or(0);
    fsrs_retrievability(state.stability, elapsed as f64)
}

/// Interval in whole days for a given stability.
///
/// At 90% target retention the optimal interval equals the stability, so
/// this is `max(1, round(stability))` with round-half-to-even.
pub fn next_interval_days(stability: f64) -> i64 {
    if stability.is_nan() {
        return MIN_INTERVAL_DAYS;
    }
    let rounded = stability.round_ties_even();
    (rounded.clamp(MIN_INTERVAL_DAYS as f64, MAX_INTERVAL_DAYS as f64)) as i64
}

/// Due date `interval_days` after `reviewed_at`, saturating at the end of
/// the representable calendar.
pub fn due_after(reviewed_at: DateTime<Utc>, interval_days: i64) -> DateTime<Utc> {
    let days = interval_days.clamp(MIN_INTERVAL_DAYS, MAX_INTERVAL_DAYS);
    reviewed_at
        .checked_add_signed(Duration::days(days))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Applies one review and returns only the new state.
pub fn fsrs_update(
    state: &MemoryState,
    rating: impl Into<Rating>,
    now: DateTime<Utc>,
) -> MemoryState {
    fsrs_review(state, rating, now).state
}

/// Applies one review and reports everything computed along the way.
pub fn fsrs_review(
    state: &MemoryState,
    rating: impl Into<Rating>,
    now: DateTime<Utc>,
) -> ReviewOutcome {
    let rating = rating.into();

    if state.is_unseen() {
        let stability = initial_stability(rating);
        let difficulty = initial_difficulty(rating);
        let interval = next_interval_days(stability);

        return ReviewOutcome {
            state: MemoryState {
                stability,
                difficulty,
                repetitions: 1,
                lapses: state.lapses,
                last_reviewed_at: Some(now),
                next_due_at: Some(due_after(now, interval)),
            },
            rating,
            retrievability: 1.0,
            elapsed_days: 0,
            interval_days: interval,
            anomalies: Vec::new(),
        };
    }

    let mut anomalies = Vec::new();

    let elapsed = match elapsed_days(state.last_reviewed_at, now) {
        Some(days) => days,
        None => {
            anomalies.push(StateAnomaly::MissingLastReview);
            0
        }
    };

    let (stability, anomaly) = sanitize_stability(state.stability);
    anomalies.extend(anomaly);
    let (difficulty, anomaly) = sanitize_difficulty(state.difficulty);
    anomalies.extend(anomaly);

    let retrievability = fsrs_retrievability(stability, elapsed as f64);
    let new_difficulty = next_difficulty(difficulty, rating);

    let (new_stability, new_lapses) = if rating.is_lapse() {
        (
            next_forget_stability(new_difficulty, stability, retrievability),
            state.lapses.saturating_add(1),
        )
    } else {
        (
            next_recall_stability(new_difficulty, stability, retrievability),
            state.lapses,
        )
    };

    let interval = next_interval_days(new_stability);

    ReviewOutcome {
        state: MemoryState {
            stability: new_stability,
            difficulty: new_difficulty,
            repetitions: state.repetitions.saturating_add(1),
            lapses: new_lapses,
            last_reviewed_at: Some(now),
            next_due_at: Some(due_after(now, interval)),
        },
        rating,
        retrievability,
        elapsed_days: elapsed,
        interval_days: interval,
        anomalies,
    }
}

/// Whole days since the last review, never negative. `None` when the last
/// review time is missing.
fn elapsed_days(last_reviewed_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<i64> {
    last_reviewed_at.map(|last| (now - last).num_days().max(0))
}

fn initial_stability(rating: Rating) -> f64 {
    FSRS_WEIGHTS[rating.index()]
}

fn initial_difficulty(rating: Rating) -> f64 {
    let w = &FSRS_WEIGHTS;
    let d = w[4] - (rating.value() - 3) as f64 * w[5];
    d.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

fn next_difficulty(d: f64, rating: Rating) -> f64 {
    let w = &FSRS_WEIGHTS;
    let d1 = d - w[6] * (rating.value() - 3) as f64;
    // mean reversion toward the initial difficulty of a "good" first review
    let reverted = w[7] * w[4] + (1.0 - w[7]) * d1;
    reverted.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

fn next_recall_stability(d: f64, s: f64, r: f64) -> f64 {
    let w = &FSRS_WEIGHTS;
    s * (1.0 + w[8].exp() * (11.0 - d) * s.powf(-w[9]) * (w[10] * (1.0 - r)).exp_m1())
}

fn next_forget_stability(d: f64, s: f64, r: f64) -> f64 {
    let w = &FSRS_WEIGHTS;
    let new_s =
        w[11] * d.powf(-w[12]) * ((s + 1.0).powf(w[13]) - 1.0) * (w[14] * (1.0 - r)).exp();
    floor_stability(new_s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TARGET_RETENTION;
    use chrono::TimeZone;

    fn at(day: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap() + Duration::days(day)
    }

    fn reviewed(stability: f64, difficulty: f64, reviewed_on: i64) -> MemoryState {
        MemoryState {
            stability,
            difficulty,
            repetitions: 3,
            lapses: 1,
            last_reviewed_at: Some(at(reviewed_on)),
            next_due_at: Some(at(reviewed_on + next_interval_days(stability))),
        }
    }

    #[test]
    fn test_new_item_good_rating() {
        let now = at(0);
        let result = fsrs_review(&MemoryState::default(), Rating::Good, now);

        assert_eq!(result.state.stability, 2.4);
        assert!((result.state.difficulty - 4.93).abs() < 1e-12);
        assert_eq!(result.state.repetitions, 1);
        assert_eq!(result.state.lapses, 0);
        assert_eq!(result.state.last_reviewed_at, Some(now));
        assert_eq!(result.state.next_due_at, Some(now + Duration::days(2)));
        assert_eq!(result.interval_days, 2);
        assert_eq!(result.retrievability, 1.0);
    }

    #[test]
    fn test_first_review_uses_initial_weights() {
        for (raw, expected) in [(1, 0.4), (2, 0.6), (3, 2.4), (4, 5.8)] {
            let state = fsrs_update(&MemoryState::default(), raw, at(0));
            assert_eq!(state.stability, expected);
            assert_eq!(state.repetitions, 1);
        }
    }

    #[test]
    fn test_first_review_independent_of_now() {
        let a = fsrs_update(&MemoryState::default(), Rating::Hard, at(0));
        let b = fsrs_update(&MemoryState::default(), Rating::Hard, at(400));
        assert_eq!(a.stability, b.stability);
        assert_eq!(a.difficulty, b.difficulty);
        assert_eq!(a.repetitions, b.repetitions);
    }

    #[test]
    fn test_first_review_forgot_does_not_count_lapse() {
        let state = fsrs_update(&MemoryState::default(), Rating::Again, at(0));
        assert_eq!(state.lapses, 0);
        assert!((state.difficulty - 6.81).abs() < 1e-9);
        // round(0.4) = 0, floored to one day
        assert_eq!(state.next_due_at, Some(at(1)));
    }

    #[test]
    fn test_out_of_range_rating_is_clamped() {
        let high = fsrs_review(&MemoryState::default(), 7, at(0));
        assert_eq!(high.rating, Rating::Easy);
        assert_eq!(high.state.stability, 5.8);
        assert!((high.state.difficulty - 3.99).abs() < 1e-9);
        assert_eq!(high.interval_days, 6);

        let low = fsrs_review(&MemoryState::default(), -3, at(0));
        assert_eq!(low.rating, Rating::Again);
        assert_eq!(low.state.stability, 0.4);
    }

    #[test]
    fn test_lapse_on_reviewed_item() {
        let state = reviewed(5.0, 5.0, 0);
        let result = fsrs_review(&state, Rating::Again, at(5));

        assert_eq!(result.elapsed_days, 5);
        assert!((result.retrievability - 0.9).abs() < 1e-12);
        assert_eq!(result.state.lapses, state.lapses + 1);
        assert_eq!(result.state.repetitions, state.repetitions + 1);
        assert!(result.state.stability < 5.0);
        assert!((result.state.stability - 1.886).abs() < 0.01);
        assert!((result.state.difficulty - 6.7021).abs() < 1e-4);
        assert_eq!(result.interval_days, 2);
    }

    #[test]
    fn test_recall_grows_stability() {
        let state = reviewed(5.0, 5.0, 0);
        let result = fsrs_review(&state, Rating::Good, at(5));

        assert_eq!(result.state.lapses, state.lapses);
        assert!(result.state.stability > 5.0);
        assert!((result.state.stability - 15.47).abs() < 0.05);
        assert_eq!(result.interval_days, 15);
    }

    #[test]
    fn test_hard_shares_recall_branch() {
        let state = reviewed(8.0, 4.0, 0);
        let hard = fsrs_review(&state, Rating::Hard, at(8));
        let good = fsrs_review(&state, Rating::Good, at(8));

        assert_eq!(hard.state.lapses, state.lapses);
        assert!(hard.state.stability >= state.stability);
        // only the difficulty differs between hard and good
        assert!(hard.state.difficulty > good.state.difficulty);
        assert!(hard.state.stability < good.state.stability);
    }

    #[test]
    fn test_review_on_same_day_keeps_stability() {
        let state = reviewed(6.0, 5.0, 0);
        let result = fsrs_review(&state, Rating::Easy, at(0) + Duration::hours(3));

        assert_eq!(result.elapsed_days, 0);
        assert_eq!(result.retrievability, 1.0);
        assert!((result.state.stability - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_clock_skew_counts_as_zero_elapsed() {
        let state = reviewed(6.0, 5.0, 10);
        let result = fsrs_review(&state, Rating::Good, at(7));
        assert_eq!(result.elapsed_days, 0);
        assert!(result.anomalies.is_empty());
    }

    #[test]
    fn test_missing_last_review_is_reported() {
        let state = MemoryState {
            last_reviewed_at: None,
            ..reviewed(4.0, 5.0, 0)
        };
        let result = fsrs_review(&state, Rating::Good, at(30));

        assert_eq!(result.elapsed_days, 0);
        assert_eq!(result.anomalies, vec![StateAnomaly::MissingLastReview]);
        assert_eq!(result.state.last_reviewed_at, Some(at(30)));
    }

    #[test]
    fn test_corrupt_state_is_sanitized() {
        let state = MemoryState {
            stability: 0.0,
            difficulty: 42.0,
            ..reviewed(1.0, 5.0, 0)
        };
        let result = fsrs_review(&state, Rating::Good, at(3));

        assert!(result.state.stability.is_finite());
        assert!(result.state.stability > 0.0);
        assert!(result.state.difficulty <= MAX_DIFFICULTY);
        assert_eq!(result.anomalies.len(), 2);

        let negative = MemoryState {
            stability: -2.0,
            difficulty: f64::NAN,
            ..reviewed(1.0, 5.0, 0)
        };
        let result = fsrs_review(&negative, Rating::Again, at(3));
        assert!(result.state.stability > 0.0);
        assert!(result.state.difficulty >= MIN_DIFFICULTY);
        assert!(result.state.difficulty <= MAX_DIFFICULTY);
    }

    #[test]
    fn test_due_date_follows_interval() {
        let mut state = MemoryState::default();
        let mut now = at(0);
        for rating in [3, 3, 1, 4, 2, 3] {
            state = fsrs_update(&state, rating, now);
            let last = state.last_reviewed_at.unwrap();
            let due = state.next_due_at.unwrap();
            assert_eq!((due - last).num_days(), next_interval_days(state.stability));
            now = due;
        }
        assert_eq!(state.repetitions, 6);
        assert_eq!(state.lapses, 1);
    }

    #[test]
    fn test_very_stable_item_keeps_exact_interval() {
        let state = MemoryState {
            stability: 40_000.0,
            difficulty: 5.0,
            repetitions: 9,
            lapses: 0,
            last_reviewed_at: Some(at(0)),
            next_due_at: Some(at(40_000)),
        };
        let result = fsrs_review(&state, Rating::Good, at(0));

        assert_eq!(result.state.stability, 40_000.0);
        assert_eq!(result.interval_days, 40_000);
        assert_eq!(result.state.next_due_at, Some(at(40_000)));
    }

    #[test]
    fn test_due_after_saturates_at_calendar_end() {
        assert_eq!(due_after(at(0), 3), at(3));
        assert_eq!(due_after(at(0), MAX_INTERVAL_DAYS), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_retrievability_at_target_retention() {
        for s in [0.5, 3.0, 42.0, 40_000.0] {
            assert!((fsrs_retrievability(s, s) - TARGET_RETENTION).abs() < 1e-12);
        }
    }

    #[test]
    fn test_retrievability_decay() {
        let r_0 = fsrs_retrievability(10.0, 0.0);
        let r_5 = fsrs_retrievability(10.0, 5.0);
        let r_10 = fsrs_retrievability(10.0, 10.0);
        assert!(r_0 > r_5);
        assert!(r_5 > r_10);
        assert!((r_0 - 1.0).abs() < 0.001);
        assert!((r_10 - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_retrievability_at() {
        assert_eq!(retrievability_at(&MemoryState::default(), at(0)), 0.0);
        let state = reviewed(10.0, 5.0, 0);
        assert!((retrievability_at(&state, at(10)) - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_next_interval_rounding() {
        assert_eq!(next_interval_days(0.4), 1);
        assert_eq!(next_interval_days(2.4), 2);
        assert_eq!(next_interval_days(2.5), 2);
        assert_eq!(next_interval_days(3.5), 4);
        assert_eq!(next_interval_days(5.8), 6);
        assert_eq!(next_interval_days(40_000.0), 40_000);
        assert_eq!(next_interval_days(1e9), 1_000_000_000);
        assert_eq!(next_interval_days(1e15), MAX_INTERVAL_DAYS);
        assert_eq!(next_interval_days(f64::NAN), 1);
    }
}
