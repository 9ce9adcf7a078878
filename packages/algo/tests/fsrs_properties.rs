//! Property-Based Tests for the FSRS scheduler
//!
//! Tests the following invariants:
//! - Difficulty stays within [1, 10] for any rating
//! - A lapse lowers stability when reviewed on time or early, or when stability is large
//! - A successful recall never lowers stability
//! - First review depends only on the rating
//! - The due date is always `max(1, round(stability))` days after the review

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use recall_algo::{due_after, fsrs_review, fsrs_update, next_interval_days, MemoryState, Rating, FSRS_WEIGHTS};

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

fn arb_rating() -> impl Strategy<Value = i32> {
    -5i32..=12
}

fn arb_difficulty() -> impl Strategy<Value = f64> {
    (100u32..=1000u32).prop_map(|v| v as f64 / 100.0)
}

fn arb_reviewed_state(
    stability: impl Strategy<Value = f64>,
) -> impl Strategy<Value = MemoryState> {
    (stability, arb_difficulty(), 1u32..50, 0u32..10).prop_map(
        |(stability, difficulty, repetitions, lapses)| MemoryState {
            stability,
            difficulty,
            repetitions,
            lapses,
            last_reviewed_at: Some(base_time()),
            next_due_at: Some(due_after(base_time(), next_interval_days(stability))),
        },
    )
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_difficulty_stays_in_range(
        state in arb_reviewed_state(0.1f64..500.0),
        rating in arb_rating(),
        elapsed in 0i64..2000,
    ) {
        let next = fsrs_update(&state, rating, base_time() + Duration::days(elapsed));
        prop_assert!(next.difficulty >= 1.0);
        prop_assert!(next.difficulty <= 10.0);
    }

    #[test]
    fn prop_first_review_difficulty_in_range(rating in arb_rating()) {
        let next = fsrs_update(&MemoryState::default(), rating, base_time());
        prop_assert!((1.0..=10.0).contains(&next.difficulty));
    }

    #[test]
    fn prop_lapse_on_time_lowers_stability(
        state in arb_reviewed_state(0.1f64..500.0),
        fraction in 0.0f64..=1.0,
    ) {
        let elapsed = (state.stability * fraction).floor() as i64;
        let result = fsrs_review(&state, Rating::Again, base_time() + Duration::days(elapsed));
        prop_assert!(result.state.stability < state.stability);
        prop_assert_eq!(result.state.lapses, state.lapses + 1);
        prop_assert_eq!(result.state.repetitions, state.repetitions + 1);
    }

    #[test]
    fn prop_lapse_lowers_large_stability(
        state in arb_reviewed_state(10.0f64..1000.0),
        elapsed in 0i64..10_000,
    ) {
        let next = fsrs_update(&state, Rating::Again, base_time() + Duration::days(elapsed));
        prop_assert!(next.stability < state.stability);
    }

    #[test]
    fn prop_recall_never_lowers_stability(
        state in arb_reviewed_state(0.1f64..500.0),
        rating in 2i32..=4,
        elapsed in 0i64..1000,
    ) {
        let next = fsrs_update(&state, rating, base_time() + Duration::days(elapsed));
        prop_assert!(next.stability >= state.stability);
        prop_assert_eq!(next.lapses, state.lapses);
    }

    #[test]
    fn prop_first_review_is_deterministic(rating in arb_rating(), offset in 0i64..100_000) {
        let now = base_time() + Duration::minutes(offset);
        let next = fsrs_update(&MemoryState::default(), rating, now);
        let index = Rating::from(rating).index();
        prop_assert_eq!(next.stability, FSRS_WEIGHTS[index]);
        prop_assert_eq!(next.repetitions, 1);
        prop_assert_eq!(next.last_reviewed_at, Some(now));
    }

    #[test]
    fn prop_due_date_matches_interval(
        state in arb_reviewed_state(0.1f64..1_000_000.0),
        rating in arb_rating(),
        elapsed_hours in 0i64..20_000,
    ) {
        let now = base_time() + Duration::hours(elapsed_hours);
        let next = fsrs_update(&state, rating, now);
        let last = next.last_reviewed_at.expect("last review is always set");
        let due = next.next_due_at.expect("due date is always set");
        prop_assert_eq!(last, now);
        let expected = next.stability.round_ties_even().max(1.0);
        prop_assert_eq!((due - last).num_days() as f64, expected);
    }

    #[test]
    fn prop_stability_positive_after_review(
        stability in -10.0f64..500.0,
        rating in arb_rating(),
        elapsed in 0i64..1000,
    ) {
        let state = MemoryState {
            stability,
            difficulty: 5.0,
            repetitions: 4,
            lapses: 0,
            last_reviewed_at: Some(base_time()),
            next_due_at: None,
        };
        let next = fsrs_update(&state, rating, base_time() + Duration::days(elapsed));
        prop_assert!(next.stability > 0.0);
        prop_assert!(next.stability.is_finite());
    }
}
