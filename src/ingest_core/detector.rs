//! Suspect-value detection against neighbouring periods

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnomalyKind {
    #[serde(rename = "high")]
    High,
    #[serde(rename = "low")]
    Low,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::High => "high",
            AnomalyKind::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnomalyFlag {
    pub kind: AnomalyKind,
    pub ratio: f64,
    pub neighbour_average: f64,
}

pub struct AnomalyDetector {
    high_ratio: f64,
    low_ratio: f64,
}

impl AnomalyDetector {
    pub fn new(high_ratio: f64, low_ratio: f64) -> Self {
        Self {
            high_ratio,
            low_ratio,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(3.0, 0.3)
    }

    /// Flag a value whose ratio to its neighbours' average leaves [low, high]
    ///
    /// # Returns
    /// - **High**: ratio > high threshold
    /// - **Low**: ratio < low threshold
    /// - `None` when within bounds or when there is no usable neighbour average
    pub fn detect(&self, value: f64, neighbour_average: Option<f64>) -> Option<AnomalyFlag> {
        let avg = neighbour_average?;
        if avg == 0.0 || !avg.is_finite() {
            return None;
        }

        let ratio = value / avg;
        let kind = if ratio > self.high_ratio {
            AnomalyKind::High
        } else if ratio < self.low_ratio {
            AnomalyKind::Low
        } else {
            return None;
        };

        Some(AnomalyFlag {
            kind,
            ratio,
            neighbour_average: avg,
        })
    }
}

/// Average of the values at the two periods nearest to `period` (excluding it)
///
/// Ties in distance go to the earlier period. With a single neighbour its
/// value is returned as-is.
pub fn nearest_neighbour_average(period: i32, series: &[(i32, f64)]) -> Option<f64> {
    let mut others: Vec<(i32, f64)> = series
        .iter()
        .copied()
        .filter(|(p, _)| *p != period)
        .collect();

    if others.is_empty() {
        return None;
    }

    others.sort_by_key(|(p, _)| ((p - period).abs(), *p));
    let nearest = &others[..others.len().min(2)];
    Some(nearest.iter().map(|(_, v)| v).sum::<f64>() / nearest.len() as f64)
}
