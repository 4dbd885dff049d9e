pub mod engine;
pub mod error;
pub mod geofence;
pub mod heatmap;
pub mod models;
pub mod outcome;
pub mod route_risk;
pub mod routing;
pub mod rules;
pub mod sources;
pub mod spatial;
pub mod tracker;

pub use engine::{FollowSummary, SafetyEngine, SafetyEvent};
pub use error::{SafetyError, SafetyResult};
pub use geofence::{GeofenceMonitor, ZoneRef, ZoneTransition};
pub use heatmap::{intensity_for_score, HeatmapAggregator};
pub use models::{
    AccuracyTier, Coordinate, HeatPoint, HeatmapField, IncidentRecord, IncidentSeverity,
    PositionSample, RatingCell, RoutePolyline, RouteProfile, RouteSafetyAssessment, RouteStep,
    TrackedPosition, Zone, ZoneKind,
};
pub use outcome::Outcome;
pub use route_risk::{
    dedup_incidents, recommendation, sample_points, score_route, RouteContext, RouteRiskReport,
    RouteRiskSampler, SafetyBand,
};
pub use routing::{straight_line_route, RoutePlanner};
pub use rules::{LocationRequest, SafetyRules};
pub use sources::{IncidentSource, KeyValueStore, LocationSource, RatingSource, RoutingProvider};
pub use spatial::{distance_meters, haversine_distance};
pub use tracker::{AcceptOutcome, PositionTracker, DEFAULT_LOCATION, LAST_POSITION_KEY};
