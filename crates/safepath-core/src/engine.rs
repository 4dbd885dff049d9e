//! Safety engine composing the tracker, geofence monitor and active route.
//!
//! Every accepted live fix flows tracker -> monitor -> route deviation
//! check, and the resulting events are broadcast to subscribers.

use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::SafetyError;
use crate::geofence::{GeofenceMonitor, ZoneTransition};
use crate::models::{Coordinate, PositionSample, RoutePolyline, TrackedPosition, Zone, ZoneKind};
use crate::outcome::Outcome;
use crate::route_risk::RouteContext;
use crate::rules::SafetyRules;
use crate::sources::{KeyValueStore, LocationSource};
use crate::spatial::distance_to_polyline_m;
use crate::tracker::{AcceptOutcome, PositionTracker};

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SafetyEvent {
    PositionAccepted(TrackedPosition),
    ZoneChanged(ZoneTransition),
    RouteDeviated { position: Coordinate, distance_m: f64 },
    RouteRejoined { position: Coordinate },
    LocationBlocked { reason: String },
}

/// Counters from one `follow` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FollowSummary {
    pub accepted: usize,
    pub rejected: usize,
    pub errors: usize,
    /// Ended because of a blocking location error
    pub blocked: bool,
}

struct ActiveRoute {
    route: RoutePolyline,
    off_route: bool,
}

pub struct SafetyEngine<S> {
    tracker: PositionTracker<S>,
    monitor: GeofenceMonitor,
    active_route: Option<ActiveRoute>,
    events: broadcast::Sender<SafetyEvent>,
}

impl<S: KeyValueStore> SafetyEngine<S> {
    pub fn new(store: S, rules: SafetyRules) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            tracker: PositionTracker::new(store, rules),
            monitor: GeofenceMonitor::new(),
            active_route: None,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SafetyEvent> {
        self.events.subscribe()
    }

    pub fn rules(&self) -> &SafetyRules {
        self.tracker.rules()
    }

    pub fn store(&self) -> &S {
        self.tracker.store()
    }

    pub fn tracker(&self) -> &PositionTracker<S> {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut PositionTracker<S> {
        &mut self.tracker
    }

    pub fn monitor(&self) -> &GeofenceMonitor {
        &self.monitor
    }

    pub fn add_zone(&mut self, kind: ZoneKind, zone: Zone) -> Result<(), SafetyError> {
        self.monitor.add_zone(kind, zone)
    }

    pub fn remove_zone(&mut self, id: &str) -> Option<Zone> {
        self.monitor.remove_zone(id)
    }

    /// Seed the tracker from the device store.
    pub fn activate(&mut self) -> Option<TrackedPosition> {
        self.tracker.activate().cloned()
    }

    pub fn set_active_route(&mut self, route: RoutePolyline) {
        tracing::info!("Following route with {} points", route.points.len());
        self.active_route = Some(ActiveRoute {
            route,
            off_route: false,
        });
    }

    pub fn clear_active_route(&mut self) -> Option<RoutePolyline> {
        self.active_route.take().map(|active| active.route)
    }

    pub fn active_route(&self) -> Option<&RoutePolyline> {
        self.active_route.as_ref().map(|active| &active.route)
    }

    /// Recommendation context for a route at a local hour, flagging
    /// endpoints that fall inside a danger zone.
    pub fn route_context(&self, route: &RoutePolyline, hour: u32) -> RouteContext {
        let mut context = RouteContext::at_hour(hour, self.rules());
        context.start_flagged = route
            .start()
            .is_some_and(|start| self.monitor.is_in_danger(start));
        context.end_flagged = route
            .end()
            .is_some_and(|end| self.monitor.is_in_danger(end));
        context
    }

    /// Feed one raw fix through the pipeline.
    pub fn on_sample(&mut self, sample: PositionSample) -> AcceptOutcome {
        let outcome = self.tracker.accept(sample);
        if let AcceptOutcome::Accepted(accepted) = &outcome {
            self.publish_position(accepted.position.clone());
        }
        outcome
    }

    /// One-shot resolution; a fresh fix is pushed through the pipeline.
    pub async fn resolve_now<L: LocationSource>(&mut self, source: &L) -> Outcome<TrackedPosition> {
        let was_blocked = self.tracker.blocked_reason().is_some();
        let (outcome, accepted) = self.tracker.resolve(source).await;

        if let Some(accepted) = accepted {
            self.publish_position(accepted.position);
        }
        if !was_blocked {
            if let Some(reason) = outcome.reason().filter(|reason| reason.blocks_location()) {
                self.emit(SafetyEvent::LocationBlocked {
                    reason: reason.to_string(),
                });
            }
        }
        outcome
    }

    /// Consume a stream of fixes until it ends or a blocking error arrives.
    ///
    /// Transient errors are logged and skipped.
    pub async fn follow<St>(&mut self, mut stream: St) -> FollowSummary
    where
        St: Stream<Item = Result<PositionSample, SafetyError>> + Unpin,
    {
        let mut summary = FollowSummary::default();

        while let Some(item) = stream.next().await {
            match item {
                Ok(sample) => {
                    if self.on_sample(sample).is_accepted() {
                        summary.accepted += 1;
                    } else {
                        summary.rejected += 1;
                    }
                }
                Err(err) if err.blocks_location() => {
                    summary.errors += 1;
                    summary.blocked = true;
                    self.tracker.block(err.clone());
                    self.emit(SafetyEvent::LocationBlocked {
                        reason: err.to_string(),
                    });
                    break;
                }
                Err(err) => {
                    summary.errors += 1;
                    tracing::warn!("Location watch error: {}", err);
                }
            }
        }

        tracing::info!(
            "Location watch ended: {} accepted, {} rejected, {} errors",
            summary.accepted,
            summary.rejected,
            summary.errors
        );
        summary
    }

    /// Subscribe to a location source with the watch request and follow it.
    pub async fn watch<L: LocationSource>(&mut self, source: &L) -> FollowSummary {
        if let Some(reason) = self.tracker.blocked_reason() {
            tracing::warn!("Not watching location while blocked: {}", reason);
            return FollowSummary {
                blocked: true,
                ..FollowSummary::default()
            };
        }
        let request = self.rules().watch_request;
        let stream = source.watch(&request);
        self.follow(stream).await
    }

    fn publish_position(&mut self, position: TrackedPosition) {
        let coordinate = position.coordinate;
        self.emit(SafetyEvent::PositionAccepted(position));

        if let Some(transition) = self.monitor.evaluate(coordinate) {
            self.emit(SafetyEvent::ZoneChanged(transition));
        }

        if let Some(event) = self.check_route(coordinate) {
            self.emit(event);
        }
    }

    fn check_route(&mut self, position: Coordinate) -> Option<SafetyEvent> {
        let threshold = self.tracker.rules().off_route_threshold_m;
        let active = self.active_route.as_mut()?;
        let distance_m = distance_to_polyline_m(position, &active.route.points)?;

        match (active.off_route, distance_m > threshold) {
            (false, true) => {
                active.off_route = true;
                tracing::info!("Off route by {:.0}m at {}", distance_m, position);
                Some(SafetyEvent::RouteDeviated {
                    position,
                    distance_m,
                })
            }
            (true, false) => {
                active.off_route = false;
                tracing::info!("Back on route at {}", position);
                Some(SafetyEvent::RouteRejoined { position })
            }
            _ => None,
        }
    }

    fn emit(&self, event: SafetyEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}
