//! Route planning with a straight-line fallback.

use crate::error::SafetyError;
use crate::models::{Coordinate, RoutePolyline, RouteProfile, RouteStep};
use crate::outcome::Outcome;
use crate::rules::SafetyRules;
use crate::sources::RoutingProvider;
use crate::spatial::distance_meters;

/// Direct two-point route used when no routing provider answers.
pub fn straight_line_route(start: Coordinate, end: Coordinate, profile: RouteProfile) -> RoutePolyline {
    let distance_m = distance_meters(start, end);
    let duration_s = distance_m / profile.nominal_speed_mps();
    let mut route = RoutePolyline::new(vec![start, end], distance_m, duration_s);
    route.steps = vec![RouteStep {
        instruction: format!("Head directly to {}", end),
        distance_m,
        duration_s,
    }];
    route
}

pub struct RoutePlanner<R> {
    provider: R,
    rules: SafetyRules,
}

impl<R: RoutingProvider> RoutePlanner<R> {
    pub fn new(provider: R, rules: SafetyRules) -> Self {
        Self { provider, rules }
    }

    pub fn provider(&self) -> &R {
        &self.provider
    }

    /// Plan a route between two points.
    ///
    /// Provider errors, timeouts and empty polylines degrade to the
    /// straight-line route.
    pub async fn plan(
        &self,
        start: Coordinate,
        end: Coordinate,
        profile: RouteProfile,
    ) -> Outcome<RoutePolyline> {
        if !start.is_valid() || !end.is_valid() {
            return Outcome::Failed(SafetyError::InvalidRoute(format!(
                "endpoints out of range: {} -> {}",
                start, end
            )));
        }

        let request = self.provider.route(start, end, profile);
        let reason = match tokio::time::timeout(self.rules.routing_timeout(), request).await {
            Ok(Ok(route)) if route.points.len() >= 2 => {
                tracing::debug!(
                    "Routed {} -> {} ({}): {:.0}m, {} points",
                    start,
                    end,
                    profile.as_str(),
                    route.distance_m,
                    route.points.len()
                );
                return Outcome::Ok(route);
            }
            Ok(Ok(route)) => SafetyError::RoutingUnavailable(format!(
                "provider returned {} point(s)",
                route.points.len()
            )),
            Ok(Err(err)) => err,
            Err(_) => SafetyError::RoutingUnavailable("timed out".to_string()),
        };

        tracing::warn!(
            "Routing {} -> {} failed, using straight line: {}",
            start,
            end,
            reason
        );
        Outcome::degraded(straight_line_route(start, end, profile), reason)
    }
}
