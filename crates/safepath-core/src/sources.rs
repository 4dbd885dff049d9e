//! Collaborator interfaces the engine consumes.
//!
//! Implementations live outside this crate (HTTP clients, device bridges,
//! on-disk stores). Every async call is wrapped in a timeout by the caller.

use std::future::Future;

use futures::stream::BoxStream;

use crate::error::SafetyError;
use crate::models::{
    Coordinate, IncidentRecord, PositionSample, RatingCell, RoutePolyline, RouteProfile,
};
use crate::rules::LocationRequest;

/// Turns two coordinates into a routed polyline.
pub trait RoutingProvider {
    fn route(
        &self,
        start: Coordinate,
        end: Coordinate,
        profile: RouteProfile,
    ) -> impl Future<Output = Result<RoutePolyline, SafetyError>> + Send;
}

/// Incident records near a point.
pub trait IncidentSource {
    fn query(
        &self,
        center: Coordinate,
        radius_deg: f64,
    ) -> impl Future<Output = Result<Vec<IncidentRecord>, SafetyError>> + Send;
}

/// Community safety ratings near a point.
pub trait RatingSource {
    fn nearby(
        &self,
        center: Coordinate,
        radius_deg: f64,
    ) -> impl Future<Output = Result<Vec<RatingCell>, SafetyError>> + Send;
}

/// Device-scoped key-value persistence.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SafetyError>;
    fn set(&self, key: &str, value: &[u8]) -> Result<(), SafetyError>;
}

/// Push-based device location source.
pub trait LocationSource {
    /// One-shot current position request.
    fn current_position(
        &self,
        request: &LocationRequest,
    ) -> impl Future<Output = Result<PositionSample, SafetyError>> + Send;

    /// Continuous subscription; the stream ends when the subscription is dropped.
    fn watch(
        &self,
        request: &LocationRequest,
    ) -> BoxStream<'static, Result<PositionSample, SafetyError>>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SafetyError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), SafetyError> {
        (**self).set(key, value)
    }
}
