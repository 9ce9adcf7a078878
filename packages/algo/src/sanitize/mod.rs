//! 数值清洗
//!
//! Defensive corrections applied to persisted memory state before it is fed
//! into the FSRS formulas. None of these functions fail; each returns the
//! usable value plus the anomaly it corrected, if any.

use crate::types::{StateAnomaly, FSRS_WEIGHTS, MAX_DIFFICULTY, MIN_DIFFICULTY, MIN_STABILITY};

/// 检查数值是否无效 (NaN 或 Inf)
pub fn is_invalid(x: f64) -> bool {
    x.is_nan() || x.is_infinite()
}

/// 将难度限制在 [1, 10]，NaN 回落到 "good" 的初始难度
pub fn clamp_difficulty(d: f64) -> f64 {
    if d.is_nan() {
        return FSRS_WEIGHTS[4];
    }
    d.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

/// 稳定性下限保护，避免除零和负数的分数次幂
pub fn floor_stability(s: f64) -> f64 {
    if is_invalid(s) || s < MIN_STABILITY {
        // +Inf is not recoverable either; treat it like any other corruption
        MIN_STABILITY
    } else {
        s
    }
}

pub fn sanitize_stability(s: f64) -> (f64, Option<StateAnomaly>) {
    let floored = floor_stability(s);
    if floored == s {
        (s, None)
    } else {
        (floored, Some(StateAnomaly::StabilityFloored { original: s }))
    }
}

pub fn sanitize_difficulty(d: f64) -> (f64, Option<StateAnomaly>) {
    let clamped = clamp_difficulty(d);
    if clamped == d {
        (d, None)
    } else {
        (clamped, Some(StateAnomaly::DifficultyClamped { original: d }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_difficulty() {
        assert_eq!(clamp_difficulty(0.2), 1.0);
        assert_eq!(clamp_difficulty(11.5), 10.0);
        assert_eq!(clamp_difficulty(5.5), 5.5);
        assert_eq!(clamp_difficulty(f64::NAN), 4.93);
        assert_eq!(clamp_difficulty(f64::NEG_INFINITY), 1.0);
    }

    #[test]
    fn test_floor_stability() {
        assert_eq!(floor_stability(0.0), MIN_STABILITY);
        assert_eq!(floor_stability(-3.0), MIN_STABILITY);
        assert_eq!(floor_stability(f64::NAN), MIN_STABILITY);
        assert_eq!(floor_stability(f64::INFINITY), MIN_STABILITY);
        assert_eq!(floor_stability(2.4), 2.4);
    }

    #[test]
    fn test_sanitize_reports_anomaly() {
        let (s, anomaly) = sanitize_stability(-1.0);
        assert_eq!(s, MIN_STABILITY);
        assert_eq!(anomaly, Some(StateAnomaly::StabilityFloored { original: -1.0 }));

        let (d, anomaly) = sanitize_difficulty(7.0);
        assert_eq!(d, 7.0);
        assert!(anomaly.is_none());
    }
}
