//! Trend direction, magnitude and confidence for a period series

use serde::Serialize;
use tracing::warn;

use super::regression::fit_line;

/// Substituted for a zero first value when computing relative change
const ZERO_BASE_EPSILON: f64 = 1e-10;

/// Trend direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Neutral,
    /// The fit could not be computed; see `TrendResult::error`
    Error,
}

/// Trend summary of a series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendResult {
    pub direction: TrendDirection,
    /// Relative change from first to last value, clamped to -1.0..=1.0
    pub magnitude: f64,
    /// R² of the fitted line (0.0-1.0)
    pub confidence: f64,
    /// Raw regression coefficient per period
    pub slope: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TrendResult {
    fn neutral(confidence: f64) -> Self {
        Self {
            direction: TrendDirection::Neutral,
            magnitude: 0.0,
            confidence,
            slope: 0.0,
            error: None,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(error = %message, "Trend computation failed");
        Self {
            direction: TrendDirection::Error,
            magnitude: 0.0,
            confidence: 0.0,
            slope: 0.0,
            error: Some(message),
        }
    }

    pub fn is_error(&self) -> bool {
        self.direction == TrendDirection::Error
    }
}

/// Fit a trend to `values` (oldest first, one per period)
///
/// - Fewer than 2 values: neutral, confidence 0
/// - Constant series: neutral, confidence 1 (a flat line fits exactly)
/// - Otherwise: OLS over period indices; direction from the slope sign,
///   confidence is R², magnitude is `(last - first) / |first|` clamped
///
/// Never panics: numeric faults come back as `TrendDirection::Error`.
pub fn calculate_trend(values: &[f64]) -> TrendResult {
    if values.len() < 2 {
        return TrendResult::neutral(0.0);
    }

    if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
        return TrendResult::failed(format!("non-finite value at period {}", idx));
    }

    let first = values[0];
    let last = values[values.len() - 1];

    if values.iter().all(|&v| v == first) {
        return TrendResult::neutral(1.0);
    }

    let Some(fit) = fit_line(values) else {
        return TrendResult::failed("regression needs at least 2 points");
    };
    if !fit.slope.is_finite() || !fit.r_squared.is_finite() {
        return TrendResult::failed(format!(
            "regression did not converge (slope {}, r² {})",
            fit.slope, fit.r_squared
        ));
    }

    let denom = if first == 0.0 {
        ZERO_BASE_EPSILON
    } else {
        first.abs()
    };
    let change = (last - first) / denom;
    if change.is_nan() {
        return TrendResult::failed("relative change is undefined");
    }

    let direction = if fit.slope > 0.0 {
        TrendDirection::Up
    } else if fit.slope < 0.0 {
        TrendDirection::Down
    } else {
        TrendDirection::Neutral
    };

    TrendResult {
        direction,
        magnitude: change.clamp(-1.0, 1.0),
        confidence: fit.r_squared,
        slope: fit.slope,
        error: None,
    }
}
