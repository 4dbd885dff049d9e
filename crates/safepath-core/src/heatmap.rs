//! Community rating heatmap aggregation.
//!
//! Low-confidence cells are dropped and each remaining cell's average
//! safety score is inverted into a 0-1 intensity (less safe = hotter).
//! Spatial smoothing is left to the map layer.

use crate::error::SafetyError;
use crate::models::{Coordinate, HeatPoint, HeatmapField, RatingCell};
use crate::outcome::Outcome;
use crate::rules::SafetyRules;
use crate::sources::RatingSource;

/// Intensity for an average safety score on the 1-5 scale.
pub fn intensity_for_score(average_safety_score: f64) -> f64 {
    ((6.0 - average_safety_score) / 5.0).clamp(0.0, 1.0)
}

#[derive(Debug, Clone)]
pub struct HeatmapAggregator {
    rules: SafetyRules,
}

impl Default for HeatmapAggregator {
    fn default() -> Self {
        Self::new(SafetyRules::default())
    }
}

impl HeatmapAggregator {
    pub fn new(rules: SafetyRules) -> Self {
        Self { rules }
    }

    /// Build an intensity field from rating cells, preserving input order.
    pub fn build(&self, cells: &[RatingCell]) -> HeatmapField {
        let points = cells
            .iter()
            .filter(|cell| cell.sample_count >= self.rules.min_rating_samples)
            .filter(|cell| cell.coordinate.is_valid() && cell.average_safety_score.is_finite())
            .map(|cell| HeatPoint {
                coordinate: cell.coordinate,
                intensity: intensity_for_score(cell.average_safety_score),
            })
            .collect();
        HeatmapField { points }
    }

    /// Fetch ratings around a viewport center and build the field.
    ///
    /// A failed or slow rating source yields an empty, degraded field.
    pub async fn fetch<R: RatingSource>(&self, source: &R, center: Coordinate) -> Outcome<HeatmapField> {
        let query = source.nearby(center, self.rules.rating_radius_deg);
        match tokio::time::timeout(self.rules.rating_timeout(), query).await {
            Ok(Ok(cells)) => {
                let field = self.build(&cells);
                tracing::debug!(
                    "Heatmap around {}: {} of {} cells kept",
                    center,
                    field.len(),
                    cells.len()
                );
                Outcome::Ok(field)
            }
            Ok(Err(err)) => {
                tracing::warn!("Rating query around {} failed: {}", center, err);
                Outcome::degraded(HeatmapField::default(), err)
            }
            Err(_) => {
                tracing::warn!("Rating query around {} timed out", center);
                Outcome::degraded(
                    HeatmapField::default(),
                    SafetyError::RatingQueryFailed("timed out".to_string()),
                )
            }
        }
    }
}
