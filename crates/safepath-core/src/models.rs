//! Core data models for the safepath engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// True when both components are finite and inside the lat/lng ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lng)
    }
}

// ========== POSITION TRACKING ==========

/// Raw fix reported by the device location source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub coordinate: Coordinate,
    #[serde(default)]
    pub accuracy_m: Option<f64>,
    #[serde(default)]
    pub speed_mps: Option<f64>,
    #[serde(default)]
    pub heading_deg: Option<f64>,
    pub captured_at_ms: i64,
}

impl PositionSample {
    pub fn new(coordinate: Coordinate, captured_at_ms: i64) -> Self {
        Self {
            coordinate,
            accuracy_m: None,
            speed_mps: None,
            heading_deg: None,
            captured_at_ms,
        }
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = Some(accuracy_m);
        self
    }
}

/// The current authoritative position held by the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedPosition {
    pub coordinate: Coordinate,
    pub accuracy_m: Option<f64>,
    pub speed_mps: Option<f64>,
    pub heading_deg: Option<f64>,
    pub captured_at_ms: i64,
}

impl TrackedPosition {
    pub fn from_sample(sample: &PositionSample) -> Self {
        Self {
            coordinate: sample.coordinate,
            accuracy_m: sample.accuracy_m,
            speed_mps: sample.speed_mps,
            heading_deg: sample.heading_deg,
            captured_at_ms: sample.captured_at_ms,
        }
    }
}

/// Coarse bucket of a reported GPS accuracy radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccuracyTier {
    /// Accuracy radius of 10m or better
    High,
    /// Accuracy radius of 50m or better
    Good,
    /// Worse than 50m, or not reported
    Low,
}

impl fmt::Display for AccuracyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AccuracyTier::High => "high",
            AccuracyTier::Good => "good",
            AccuracyTier::Low => "low",
        };
        f.write_str(label)
    }
}

// ========== ZONE MODELS ==========

/// Which of the two disjoint zone sets a zone belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKind {
    Safe,
    Danger,
}

/// A named circular geofence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
    pub center: Coordinate,
    pub radius_m: f64,
    pub kind: ZoneKind,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Zone {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        center: Coordinate,
        radius_m: f64,
        kind: ZoneKind,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            center,
            radius_m,
            kind,
            created_at: Utc::now(),
        }
    }

    /// Validate zone configuration.
    /// Returns list of validation errors (empty = valid).
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.id.trim().is_empty() {
            errors.push("Zone id must not be empty".to_string());
        }
        if !self.center.is_valid() {
            errors.push(format!("Zone center {} is out of range", self.center));
        }
        if !self.radius_m.is_finite() || self.radius_m < 0.0 {
            errors.push(format!(
                "Zone radius ({}) must be a finite, non-negative number of meters",
                self.radius_m
            ));
        }

        errors
    }
}

// ========== ROUTES & INCIDENTS ==========

/// Travel mode passed through to the routing provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteProfile {
    #[default]
    Walking,
    Cycling,
    Driving,
}

impl RouteProfile {
    /// Nominal travel speed used for straight-line duration estimates.
    pub fn nominal_speed_mps(&self) -> f64 {
        match self {
            RouteProfile::Walking => 1.4,
            RouteProfile::Cycling => 4.2,
            RouteProfile::Driving => 11.1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteProfile::Walking => "walking",
            RouteProfile::Cycling => "cycling",
            RouteProfile::Driving => "driving",
        }
    }
}

/// One turn-by-turn instruction reported by the routing provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStep {
    pub instruction: String,
    pub distance_m: f64,
    pub duration_s: f64,
}

/// Routed path between two points, as reported by the routing provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePolyline {
    pub points: Vec<Coordinate>,
    pub distance_m: f64,
    pub duration_s: f64,
    #[serde(default)]
    pub steps: Vec<RouteStep>,
}

impl RoutePolyline {
    pub fn new(points: Vec<Coordinate>, distance_m: f64, duration_s: f64) -> Self {
        Self {
            points,
            distance_m,
            duration_s,
            steps: Vec::new(),
        }
    }

    pub fn start(&self) -> Option<Coordinate> {
        self.points.first().copied()
    }

    pub fn end(&self) -> Option<Coordinate> {
        self.points.last().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl IncidentSeverity {
    /// High and Critical incidents mark a sample point as high risk.
    pub fn is_high_risk(&self) -> bool {
        matches!(self, IncidentSeverity::High | IncidentSeverity::Critical)
    }
}

/// A crowd-sourced or historical incident near a queried point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub id: String,
    pub coordinate: Coordinate,
    pub category: String,
    pub severity: IncidentSeverity,
    pub occurred_at: DateTime<Utc>,
    pub reported_at: DateTime<Utc>,
}

/// Bounded, explainable safety summary of one route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSafetyAssessment {
    /// 1.0 (least safe) to 5.0 (safest), one decimal place
    pub score: f64,
    pub total_incidents: usize,
    pub high_risk_sample_count: usize,
    pub recommendation: String,
    pub sampled_point_count: usize,
}

// ========== HEATMAP ==========

/// Community rating aggregate for one map cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingCell {
    pub coordinate: Coordinate,
    pub average_safety_score: f64,
    pub sample_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatPoint {
    pub coordinate: Coordinate,
    /// 0.0 (safe) to 1.0 (unsafe)
    pub intensity: f64,
}

/// Rendering-ready intensity field, in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeatmapField {
    pub points: Vec<HeatPoint>,
}

impl HeatmapField {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }
}
