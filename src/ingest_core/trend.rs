//! Linear trend and period-over-period change for one entity/metric series

use serde::Serialize;

/// Default comparison windows between census snapshots
pub const DEFAULT_PERIOD_BOUNDARIES: [(i32, i32); 2] = [(2007, 2012), (2012, 2021)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegenerateReason {
    ZeroMean,
    NoPeriodVariance,
    NonFiniteRate,
}

impl DegenerateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DegenerateReason::ZeroMean => "mean is zero",
            DegenerateReason::NoPeriodVariance => "fewer than 2 distinct periods",
            DegenerateReason::NonFiniteRate => "change rate is not finite",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrendError {
    InsufficientPoints {
        entity_id: String,
        metric_name: String,
        points: usize,
    },
    DivisionByZero {
        entity_id: String,
        metric_name: String,
        reason: DegenerateReason,
    },
}

impl std::fmt::Display for TrendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendError::InsufficientPoints {
                entity_id,
                metric_name,
                points,
            } => write!(
                f,
                "Trend for {}/{} needs at least 2 points, got {}",
                entity_id, metric_name, points
            ),
            TrendError::DivisionByZero {
                entity_id,
                metric_name,
                reason,
            } => write!(
                f,
                "Trend for {}/{} undefined: {}",
                entity_id,
                metric_name,
                reason.as_str()
            ),
        }
    }
}

impl std::error::Error for TrendError {}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSummary {
    pub entity_id: String,
    pub metric_name: String,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// OLS slope in value units per period unit
    pub slope: f64,
    /// `slope / mean × 100`, percent per period unit
    pub annual_change_rate: f64,
    pub r_squared: f64,
    /// Compound growth in percent per period unit; `None` if an endpoint is ≤ 0
    pub cagr: Option<f64>,
    pub first_period: i32,
    pub last_period: i32,
    pub points: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodChange {
    pub entity_id: String,
    pub metric_name: String,
    pub start_period: i32,
    pub end_period: i32,
    pub start: f64,
    pub end: f64,
    pub change_abs: f64,
    /// `None` when the start value is zero
    pub change_pct: Option<f64>,
}

/// Compute a trend summary over `(period, value)` pairs
///
/// Points are sorted by period first; input order does not matter.
///
/// # Errors
/// - `InsufficientPoints` for fewer than 2 points
/// - `DivisionByZero` when all points share one period, the mean is zero
///   or subnormal, or the change rate overflows
pub fn compute_trend(
    entity_id: &str,
    metric_name: &str,
    series: &[(i32, f64)],
) -> Result<TrendSummary, TrendError> {
    if series.len() < 2 {
        return Err(TrendError::InsufficientPoints {
            entity_id: entity_id.to_string(),
            metric_name: metric_name.to_string(),
            points: series.len(),
        });
    }

    let degenerate = |reason| TrendError::DivisionByZero {
        entity_id: entity_id.to_string(),
        metric_name: metric_name.to_string(),
        reason,
    };

    let mut points = series.to_vec();
    points.sort_by_key(|(p, _)| *p);

    let n = points.len() as f64;
    let mean_x = points.iter().map(|(p, _)| *p as f64).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, v)| *v).sum::<f64>() / n;

    let sxx: f64 = points.iter().map(|(p, _)| (*p as f64 - mean_x).powi(2)).sum();
    if sxx == 0.0 {
        return Err(degenerate(DegenerateReason::NoPeriodVariance));
    }
    if mean_y == 0.0 || mean_y.is_subnormal() {
        return Err(degenerate(DegenerateReason::ZeroMean));
    }

    let sxy: f64 = points
        .iter()
        .map(|(p, v)| (*p as f64 - mean_x) * (v - mean_y))
        .sum();
    let slope = sxy / sxx;
    let annual_change_rate = slope / mean_y * 100.0;
    if !annual_change_rate.is_finite() {
        return Err(degenerate(DegenerateReason::NonFiniteRate));
    }
    let intercept = mean_y - slope * mean_x;

    let ss_tot: f64 = points.iter().map(|(_, v)| (v - mean_y).powi(2)).sum();
    let ss_res: f64 = points
        .iter()
        .map(|(p, v)| (v - (intercept + slope * *p as f64)).powi(2))
        .sum();
    // a flat series is fitted exactly by a flat line
    let r_squared = if ss_tot == 0.0 { 1.0 } else { 1.0 - ss_res / ss_tot };

    let (first_period, first) = points[0];
    let (last_period, last) = points[points.len() - 1];
    let span = (last_period - first_period) as f64;
    let cagr = if first > 0.0 && last > 0.0 && span > 0.0 {
        Some(((last / first).powf(1.0 / span) - 1.0) * 100.0)
    } else {
        None
    };

    let min = points.iter().map(|(_, v)| *v).fold(f64::INFINITY, f64::min);
    let max = points.iter().map(|(_, v)| *v).fold(f64::NEG_INFINITY, f64::max);

    Ok(TrendSummary {
        entity_id: entity_id.to_string(),
        metric_name: metric_name.to_string(),
        mean: mean_y,
        min,
        max,
        slope,
        annual_change_rate,
        r_squared,
        cagr,
        first_period,
        last_period,
        points: points.len(),
    })
}

/// Change between each (start, end) boundary pair present in the series
pub fn compare_periods(
    entity_id: &str,
    metric_name: &str,
    series: &[(i32, f64)],
    boundaries: &[(i32, i32)],
) -> Vec<PeriodChange> {
    let value_at = |period: i32| {
        series
            .iter()
            .find(|(p, _)| *p == period)
            .map(|(_, v)| *v)
    };

    boundaries
        .iter()
        .filter_map(|&(start_period, end_period)| {
            let start = value_at(start_period)?;
            let end = value_at(end_period)?;
            let change_abs = end - start;
            Some(PeriodChange {
                entity_id: entity_id.to_string(),
                metric_name: metric_name.to_string(),
                start_period,
                end_period,
                start,
                end,
                change_abs,
                change_pct: (start != 0.0).then(|| change_abs / start * 100.0),
            })
        })
        .collect()
}
