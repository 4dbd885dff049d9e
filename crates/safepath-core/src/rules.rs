//! Tunable thresholds for tracking, geofencing and route scoring.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters for a one-shot or continuous location request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRequest {
    pub high_accuracy: bool,
    pub timeout_ms: u64,
    /// Oldest cached fix the device may return (0 = always fresh)
    pub max_cache_age_ms: u64,
}

impl LocationRequest {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Configuration for the safety engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyRules {
    /// Minimum movement before a new fix replaces the current position
    pub significant_move_m: f64,
    /// Number of accepted positions kept in history
    pub history_capacity: usize,
    /// Upper accuracy bound of the High tier
    pub high_accuracy_m: f64,
    /// Upper accuracy bound of the Good tier
    pub good_accuracy_m: f64,
    /// A quick fix worse than this triggers the patient second attempt
    pub resolve_accuracy_threshold_m: f64,
    /// First, fast attempt of a one-shot resolution
    pub quick_request: LocationRequest,
    /// Second, slower attempt of a one-shot resolution
    pub patient_request: LocationRequest,
    /// Continuous watch subscription parameters
    pub watch_request: LocationRequest,
    /// Target sample count for the safety assessment pass
    pub safety_sample_target: usize,
    /// Target sample count for the incident listing pass
    pub listing_sample_target: usize,
    /// Search radius around each sample point, in degrees
    pub incident_radius_deg: f64,
    pub incident_timeout_ms: u64,
    pub routing_timeout_ms: u64,
    /// Search radius for community ratings around a viewport center
    pub rating_radius_deg: f64,
    pub rating_timeout_ms: u64,
    /// Rating cells with fewer samples are dropped from the heatmap
    pub min_rating_samples: u32,
    /// Distance from the active route that counts as a deviation
    pub off_route_threshold_m: f64,
    /// Local hour at which night mode begins (inclusive)
    pub night_start_hour: u32,
    /// Local hour at which night mode ends (exclusive)
    pub night_end_hour: u32,
}

impl Default for SafetyRules {
    fn default() -> Self {
        Self {
            significant_move_m: 5.0,
            history_capacity: 100,
            high_accuracy_m: 10.0,
            good_accuracy_m: 50.0,
            resolve_accuracy_threshold_m: 50.0,
            quick_request: LocationRequest {
                high_accuracy: true,
                timeout_ms: 10_000,
                max_cache_age_ms: 0,
            },
            patient_request: LocationRequest {
                high_accuracy: true,
                timeout_ms: 20_000,
                max_cache_age_ms: 5_000,
            },
            watch_request: LocationRequest {
                high_accuracy: true,
                timeout_ms: 15_000,
                max_cache_age_ms: 1_000,
            },
            safety_sample_target: 10,
            listing_sample_target: 5,
            incident_radius_deg: 0.005, // approx 500m
            incident_timeout_ms: 8_000,
            routing_timeout_ms: 15_000,
            rating_radius_deg: 0.05,
            rating_timeout_ms: 8_000,
            min_rating_samples: 2,
            off_route_threshold_m: 50.0,
            night_start_hour: 20,
            night_end_hour: 6,
        }
    }
}

impl SafetyRules {
    pub fn incident_timeout(&self) -> Duration {
        Duration::from_millis(self.incident_timeout_ms)
    }

    pub fn routing_timeout(&self) -> Duration {
        Duration::from_millis(self.routing_timeout_ms)
    }

    pub fn rating_timeout(&self) -> Duration {
        Duration::from_millis(self.rating_timeout_ms)
    }

    /// Whether a local hour (0-23) falls inside the night window.
    pub fn is_night_hour(&self, hour: u32) -> bool {
        if self.night_start_hour <= self.night_end_hour {
            (self.night_start_hour..self.night_end_hour).contains(&hour)
        } else {
            hour >= self.night_start_hour || hour < self.night_end_hour
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn night_window_wraps_midnight() {
        let rules = SafetyRules::default();
        assert!(rules.is_night_hour(23));
        assert!(rules.is_night_hour(0));
        assert!(rules.is_night_hour(5));
        assert!(!rules.is_night_hour(6));
        assert!(!rules.is_night_hour(12));
        assert!(rules.is_night_hour(20));
    }

    #[test]
    fn non_wrapping_night_window() {
        let rules = SafetyRules {
            night_start_hour: 1,
            night_end_hour: 4,
            ..SafetyRules::default()
        };
        assert!(rules.is_night_hour(2));
        assert!(!rules.is_night_hour(4));
        assert!(!rules.is_night_hour(23));
    }
}
