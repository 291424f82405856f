//! Next-period forecasting by linear extrapolation
//!
//! Extends the same OLS line the trend calculation fits. Allocated days and
//! billed amounts cannot go negative, so forecasts are floored at zero.

use serde::Serialize;
use tracing::warn;

use super::regression::fit_line;
use super::trends::{calculate_trend, TrendResult};

/// Default forecast horizon (next period)
pub const DEFAULT_PERIODS: usize = 1;

/// Predict the value `periods` steps after the last observation
///
/// - Empty series: 0
/// - Single value: that value (no regression attempted)
/// - Otherwise: the fitted line evaluated at `x = n + periods - 1`
///
/// The result is never negative.
pub fn forecast(values: &[f64], periods: usize) -> f64 {
    let last_known = values.last().copied().filter(|v| v.is_finite()).unwrap_or(0.0);

    let Some(fit) = fit_line(values) else {
        return last_known.max(0.0);
    };

    let x = values.len() as f64 + periods as f64 - 1.0;
    let predicted = fit.predict(x);
    if !predicted.is_finite() {
        warn!(periods, "Forecast not finite, falling back to last known value");
        return last_known.max(0.0);
    }

    predicted.max(0.0)
}

/// Trend and next-period forecast for one series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesAnalysis {
    pub trend: TrendResult,
    pub forecast: f64,
}

impl SeriesAnalysis {
    /// Analyze a chronological series
    pub fn of(values: &[f64]) -> Self {
        Self {
            trend: calculate_trend(values),
            forecast: forecast(values, DEFAULT_PERIODS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::TrendDirection;

    #[test]
    fn test_two_points_extrapolate_linearly() {
        assert!((forecast(&[100.0, 200.0], 1) - 300.0).abs() < 1e-9);
        assert!((forecast(&[100.0, 200.0], 3) - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_huge_horizon_does_not_overflow() {
        let rising = forecast(&[1.0, 2.0], usize::MAX);
        assert!(rising.is_finite());
        assert!(rising > 1e18);

        assert_eq!(forecast(&[2.0, 1.0], usize::MAX), 0.0);
    }

    #[test]
    fn test_short_series_returns_last_value() {
        assert_eq!(forecast(&[5.0], 1), 5.0);
        assert_eq!(forecast(&[5.0], 12), 5.0);
        assert_eq!(forecast(&[], 1), 0.0);
    }

    #[test]
    fn test_forecast_is_never_negative() {
        assert_eq!(forecast(&[100.0, 10.0], 3), 0.0);
        assert_eq!(forecast(&[50.0, 40.0, 5.0], 1), 0.0);
    }

    #[test]
    fn test_zero_periods_returns_fitted_last_point() {
        assert!((forecast(&[2.0, 4.0, 6.0], 0) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_series_falls_back() {
        assert_eq!(forecast(&[1.0, f64::NAN], 1), 0.0);
        assert_eq!(forecast(&[f64::NAN, 7.0], 1), 7.0);
    }

    #[test]
    fn test_series_analysis_pairs_trend_and_forecast() {
        let analysis = SeriesAnalysis::of(&[10.0, 20.0, 30.0]);
        assert_eq!(analysis.trend.direction, TrendDirection::Up);
        assert!((analysis.forecast - 40.0).abs() < 1e-9);
    }
}
