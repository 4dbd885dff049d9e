//! Noise-tolerant live position tracking.
//!
//! The tracker owns the single authoritative position. Raw fixes that move
//! less than the significant-move threshold are rejected so that redundant
//! device output does not churn geofence or UI state.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::SafetyError;
use crate::models::{AccuracyTier, Coordinate, PositionSample, TrackedPosition};
use crate::outcome::Outcome;
use crate::rules::{LocationRequest, SafetyRules};
use crate::sources::{KeyValueStore, LocationSource};
use crate::spatial::{bearing_degrees, distance_meters};

/// Store key holding the last accepted position.
pub const LAST_POSITION_KEY: &str = "safepath.last_position";

/// Location used when nothing better is known. A persisted position equal
/// to this is treated as "never resolved".
pub const DEFAULT_LOCATION: Coordinate = Coordinate::new(40.7128, -74.0060);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PersistedPosition {
    coordinate: Coordinate,
    accuracy_m: Option<f64>,
}

/// Why a sample did not replace the current position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RejectReason {
    /// Moved no more than the significant-move threshold
    InsignificantChange { distance_m: f64 },
    /// Coordinate outside lat/lng bounds or not finite
    InvalidCoordinate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedPosition {
    pub position: TrackedPosition,
    pub tier: AccuracyTier,
    /// Distance from the previously accepted live position
    pub moved_m: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AcceptOutcome {
    Accepted(AcceptedPosition),
    Rejected(RejectReason),
}

impl AcceptOutcome {
    pub fn accepted(&self) -> Option<&AcceptedPosition> {
        match self {
            AcceptOutcome::Accepted(accepted) => Some(accepted),
            AcceptOutcome::Rejected(_) => None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, AcceptOutcome::Accepted(_))
    }
}

/// Bucket a reported accuracy radius. Missing accuracy is treated as Low.
pub fn classify_accuracy(accuracy_m: Option<f64>, rules: &SafetyRules) -> AccuracyTier {
    match accuracy_m {
        Some(acc) if acc <= rules.high_accuracy_m => AccuracyTier::High,
        Some(acc) if acc <= rules.good_accuracy_m => AccuracyTier::Good,
        _ => AccuracyTier::Low,
    }
}

pub struct PositionTracker<S> {
    rules: SafetyRules,
    store: S,
    current: Option<TrackedPosition>,
    history: VecDeque<TrackedPosition>,
    activated: bool,
    blocked: Option<SafetyError>,
}

impl<S: KeyValueStore> PositionTracker<S> {
    pub fn new(store: S, rules: SafetyRules) -> Self {
        let capacity = rules.history_capacity;
        Self {
            rules,
            store,
            current: None,
            history: VecDeque::with_capacity(capacity),
            activated: false,
            blocked: None,
        }
    }

    pub fn rules(&self) -> &SafetyRules {
        &self.rules
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn current(&self) -> Option<&TrackedPosition> {
        self.current.as_ref()
    }

    /// Accepted live positions, oldest first, in arrival order.
    pub fn history(&self) -> &VecDeque<TrackedPosition> {
        &self.history
    }

    /// Error that stopped automatic resolution, if any.
    pub fn blocked_reason(&self) -> Option<&SafetyError> {
        self.blocked.as_ref()
    }

    /// Re-enable automatic resolution after the user fixed permissions.
    pub fn unblock(&mut self) {
        self.blocked = None;
    }

    /// Seed the current position from the device store on first activation.
    ///
    /// Only runs once per tracker and never overrides a live position.
    pub fn activate(&mut self) -> Option<&TrackedPosition> {
        if self.activated {
            return self.current.as_ref();
        }
        self.activated = true;

        if self.current.is_some() {
            return self.current.as_ref();
        }

        let persisted = match self.store.get(LAST_POSITION_KEY) {
            Ok(Some(bytes)) => match serde_json::from_slice::<PersistedPosition>(&bytes) {
                Ok(persisted) => persisted,
                Err(err) => {
                    tracing::warn!("Ignoring unreadable persisted position: {}", err);
                    return None;
                }
            },
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!("Persisted position load failed: {}", err);
                return None;
            }
        };

        if persisted.coordinate == DEFAULT_LOCATION || !persisted.coordinate.is_valid() {
            return None;
        }

        tracing::debug!("Bootstrapped position from store: {}", persisted.coordinate);
        self.current = Some(TrackedPosition {
            coordinate: persisted.coordinate,
            accuracy_m: persisted.accuracy_m,
            speed_mps: None,
            heading_deg: None,
            captured_at_ms: chrono::Utc::now().timestamp_millis(),
        });
        self.current.as_ref()
    }

    /// Accept or reject a raw fix.
    ///
    /// The first live fix is always accepted; afterwards a fix must move
    /// strictly more than the significant-move threshold.
    pub fn accept(&mut self, sample: PositionSample) -> AcceptOutcome {
        if !sample.coordinate.is_valid() {
            tracing::debug!("Rejected fix with invalid coordinate {}", sample.coordinate);
            return AcceptOutcome::Rejected(RejectReason::InvalidCoordinate);
        }

        let previous = self.history.back();
        let moved_m = previous.map(|prev| distance_meters(prev.coordinate, sample.coordinate));

        if let Some(distance_m) = moved_m {
            if distance_m <= self.rules.significant_move_m {
                tracing::trace!("Rejected fix {:.2}m from current", distance_m);
                return AcceptOutcome::Rejected(RejectReason::InsignificantChange { distance_m });
            }
        }

        let mut position = TrackedPosition::from_sample(&sample);
        if let Some(prev) = previous {
            if position.heading_deg.is_none() {
                position.heading_deg = Some(bearing_degrees(prev.coordinate, position.coordinate));
            }
            if position.speed_mps.is_none() {
                let elapsed_ms = position.captured_at_ms.checked_sub(prev.captured_at_ms);
                if let (Some(elapsed_ms), Some(distance_m)) = (elapsed_ms, moved_m) {
                    if elapsed_ms > 0 {
                        position.speed_mps = Some(distance_m / (elapsed_ms as f64 / 1000.0));
                    }
                }
            }
        }

        let tier = classify_accuracy(position.accuracy_m, &self.rules);
        tracing::debug!(
            "Accepted fix {} (accuracy tier {})",
            position.coordinate,
            tier
        );

        while self.history.len() >= self.rules.history_capacity.max(1) {
            self.history.pop_front();
        }
        self.history.push_back(position.clone());
        self.current = Some(position.clone());
        self.persist(&position);

        AcceptOutcome::Accepted(AcceptedPosition {
            position,
            tier,
            moved_m,
        })
    }

    /// Resolve the position right now with up to two attempts.
    ///
    /// A quick high-accuracy request runs first; when it fails or reports
    /// accuracy worse than the resolve threshold, a patient request with a
    /// longer timeout follows and the more accurate fix wins. A blocking
    /// error on the patient attempt still stops later resolution, and the
    /// quick fix comes back degraded with that reason.
    pub async fn resolve_now<L: LocationSource>(&mut self, source: &L) -> Outcome<TrackedPosition> {
        self.resolve(source).await.0
    }

    /// `resolve_now` plus the acceptance result of the resolved fix.
    pub(crate) async fn resolve<L: LocationSource>(
        &mut self,
        source: &L,
    ) -> (Outcome<TrackedPosition>, Option<AcceptedPosition>) {
        if let Some(reason) = &self.blocked {
            return (Outcome::Failed(reason.clone()), None);
        }

        let quick_request = self.rules.quick_request;
        let patient_request = self.rules.patient_request;
        let threshold = self.rules.resolve_accuracy_threshold_m;

        let mut best: Option<PositionSample> = None;
        let mut last_error: Option<SafetyError> = None;
        let mut late_block: Option<SafetyError> = None;

        match request_fix(source, &quick_request).await {
            Ok(sample) => best = Some(sample),
            Err(err) if err.blocks_location() => return (self.block(err), None),
            Err(err) => {
                tracing::warn!("Quick location attempt failed: {}", err);
                last_error = Some(err);
            }
        }

        let needs_second_attempt = best
            .as_ref()
            .map(|sample| accuracy_or_worst(sample) > threshold)
            .unwrap_or(true);

        if needs_second_attempt {
            match request_fix(source, &patient_request).await {
                Ok(sample) => {
                    best = Some(match best {
                        Some(quick) if accuracy_or_worst(&quick) <= accuracy_or_worst(&sample) => {
                            quick
                        }
                        _ => sample,
                    });
                }
                Err(err) if err.blocks_location() => {
                    if best.is_none() {
                        return (self.block(err), None);
                    }
                    late_block = Some(err);
                }
                Err(err) => {
                    tracing::warn!("Patient location attempt failed: {}", err);
                    if best.is_none() {
                        last_error = Some(err);
                    }
                }
            }
        }

        let Some(sample) = best else {
            let outcome = Outcome::degraded(
                self.fallback_position(),
                last_error.unwrap_or(SafetyError::GeolocationTimeout),
            );
            return (outcome, None);
        };

        let resolved = TrackedPosition::from_sample(&sample);
        let accepted = self.accept(sample).accepted().cloned();
        let position = self.current.clone().unwrap_or(resolved);
        tracing::info!("Resolved position {}", position.coordinate);

        let outcome = match late_block {
            Some(reason) => {
                tracing::warn!("Location resolution stopped: {}", reason);
                self.blocked = Some(reason.clone());
                Outcome::degraded(position, reason)
            }
            None => Outcome::Ok(position),
        };
        (outcome, accepted)
    }

    /// Current position, or the default location when nothing is known.
    pub fn fallback_position(&self) -> TrackedPosition {
        self.current.clone().unwrap_or_else(|| TrackedPosition {
            coordinate: DEFAULT_LOCATION,
            accuracy_m: None,
            speed_mps: None,
            heading_deg: None,
            captured_at_ms: chrono::Utc::now().timestamp_millis(),
        })
    }

    /// Stop automatic resolution and hand back the best-effort position.
    pub(crate) fn block(&mut self, reason: SafetyError) -> Outcome<TrackedPosition> {
        tracing::warn!("Location resolution stopped: {}", reason);
        self.blocked = Some(reason.clone());
        Outcome::degraded(self.fallback_position(), reason)
    }

    fn persist(&self, position: &TrackedPosition) {
        let payload = PersistedPosition {
            coordinate: position.coordinate,
            accuracy_m: position.accuracy_m,
        };
        let bytes = match serde_json::to_vec(&payload) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!("Failed to encode position for store: {}", err);
                return;
            }
        };
        if let Err(err) = self.store.set(LAST_POSITION_KEY, &bytes) {
            tracing::warn!("Failed to persist position: {}", err);
        }
    }
}

async fn request_fix<L: LocationSource>(
    source: &L,
    request: &LocationRequest,
) -> Result<PositionSample, SafetyError> {
    match tokio::time::timeout(request.timeout(), source.current_position(request)).await {
        Ok(result) => result,
        Err(_) => Err(SafetyError::GeolocationTimeout),
    }
}

fn accuracy_or_worst(sample: &PositionSample) -> f64 {
    sample.accuracy_m.unwrap_or(f64::INFINITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::offset_by_bearing;
    use futures::stream::BoxStream;
    use futures::StreamExt;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        values: Mutex<HashMap<String, Vec<u8>>>,
        fail_writes: bool,
    }

    impl KeyValueStore for MemoryStore {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SafetyError> {
            Ok(self.values.lock().unwrap().get(key).cloned())
        }

        fn set(&self, key: &str, value: &[u8]) -> Result<(), SafetyError> {
            if self.fail_writes {
                return Err(SafetyError::Store("disk full".to_string()));
            }
            self.values
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_vec());
            Ok(())
        }
    }

    enum Scripted {
        Fix(PositionSample),
        Fail(SafetyError),
        Hang,
    }

    struct ScriptedSource {
        script: Mutex<VecDeque<Scripted>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(script: Vec<Scripted>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl LocationSource for ScriptedSource {
        async fn current_position(
            &self,
            _request: &LocationRequest,
        ) -> Result<PositionSample, SafetyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Scripted::Fix(sample)) => Ok(sample),
                Some(Scripted::Fail(err)) => Err(err),
                Some(Scripted::Hang) | None => futures::future::pending().await,
            }
        }

        fn watch(
            &self,
            _request: &LocationRequest,
        ) -> BoxStream<'static, Result<PositionSample, SafetyError>> {
            futures::stream::empty().boxed()
        }
    }

    fn origin() -> Coordinate {
        Coordinate::new(33.6846, -117.8265)
    }

    fn fix(coordinate: Coordinate, accuracy_m: f64, at_ms: i64) -> PositionSample {
        PositionSample::new(coordinate, at_ms).with_accuracy(accuracy_m)
    }

    fn tracker() -> PositionTracker<MemoryStore> {
        PositionTracker::new(MemoryStore::default(), SafetyRules::default())
    }

    #[test]
    fn near_duplicate_fix_is_rejected_then_real_move_accepted() {
        let mut tracker = tracker();
        let first = origin();
        let jitter = offset_by_bearing(first, 3.0, 45.0);
        let moved = offset_by_bearing(first, 6.0, 45.0);

        assert!(tracker.accept(fix(first, 5.0, 1_000)).is_accepted());
        match tracker.accept(fix(jitter, 5.0, 2_000)) {
            AcceptOutcome::Rejected(RejectReason::InsignificantChange { distance_m }) => {
                assert!((distance_m - 3.0).abs() < 0.01)
            }
            other => panic!("expected insignificant change, got {other:?}"),
        }
        assert!(tracker.accept(fix(moved, 5.0, 3_000)).is_accepted());

        assert_eq!(tracker.history().len(), 2);
        assert_eq!(tracker.current().unwrap().coordinate, moved);
    }

    #[test]
    fn move_within_threshold_is_rejected() {
        let mut tracker = tracker();
        tracker.accept(fix(origin(), 5.0, 0));
        let boundary = offset_by_bearing(origin(), 4.999, 0.0);
        assert!(!tracker.accept(fix(boundary, 5.0, 1)).is_accepted());
    }

    #[test]
    fn history_is_capped_and_evicts_oldest() {
        let mut tracker = tracker();
        let mut first_kept = None;
        for i in 0..130 {
            let coordinate = offset_by_bearing(origin(), 10.0 * i as f64, 90.0);
            tracker.accept(fix(coordinate, 5.0, i));
            if i == 30 {
                first_kept = Some(coordinate);
            }
        }
        assert_eq!(tracker.history().len(), 100);
        assert_eq!(tracker.history().front().unwrap().coordinate, first_kept.unwrap());
    }

    #[test]
    fn history_follows_arrival_order_not_capture_time() {
        let mut tracker = tracker();
        let a = origin();
        let b = offset_by_bearing(a, 20.0, 0.0);
        let c = offset_by_bearing(a, 40.0, 0.0);
        tracker.accept(fix(a, 5.0, 3_000));
        tracker.accept(fix(b, 5.0, 1_000));
        tracker.accept(fix(c, 5.0, 2_000));

        let order: Vec<Coordinate> = tracker.history().iter().map(|p| p.coordinate).collect();
        assert_eq!(order, vec![a, b, c]);
        // Out-of-order timestamps never produce a derived speed
        assert!(tracker.history()[1].speed_mps.is_none());
    }

    #[test]
    fn accepted_fix_reports_accuracy_tier() {
        let mut tracker = tracker();
        let tiers: Vec<AccuracyTier> = [8.0, 10.0, 35.0, 50.0, 51.0]
            .iter()
            .enumerate()
            .map(|(i, acc)| {
                let coordinate = offset_by_bearing(origin(), 20.0 * i as f64, 90.0);
                tracker.accept(fix(coordinate, *acc, i as i64)).accepted().unwrap().tier
            })
            .collect();
        assert_eq!(
            tiers,
            vec![
                AccuracyTier::High,
                AccuracyTier::High,
                AccuracyTier::Good,
                AccuracyTier::Good,
                AccuracyTier::Low
            ]
        );
        assert_eq!(classify_accuracy(None, tracker.rules()), AccuracyTier::Low);
    }

    #[test]
    fn derives_heading_and_speed_when_missing() {
        let mut tracker = tracker();
        tracker.accept(fix(origin(), 5.0, 0));
        let east = offset_by_bearing(origin(), 20.0, 90.0);
        let accepted = tracker.accept(fix(east, 5.0, 10_000));
        let position = &accepted.accepted().unwrap().position;
        assert!((position.heading_deg.unwrap() - 90.0).abs() < 0.1);
        assert!((position.speed_mps.unwrap() - 2.0).abs() < 0.01);
    }

    #[test]
    fn invalid_coordinate_is_rejected() {
        let mut tracker = tracker();
        let outcome = tracker.accept(fix(Coordinate::new(120.0, 0.0), 5.0, 0));
        assert_eq!(
            outcome,
            AcceptOutcome::Rejected(RejectReason::InvalidCoordinate)
        );
        assert!(tracker.current().is_none());
    }

    #[test]
    fn accepted_fix_is_persisted_and_bootstraps_next_tracker() {
        let store = std::sync::Arc::new(MemoryStore::default());
        let mut tracker = PositionTracker::new(store.clone(), SafetyRules::default());
        tracker.accept(fix(origin(), 12.0, 0));

        let mut next = PositionTracker::new(store, SafetyRules::default());
        let seeded = next.activate().cloned().unwrap();
        assert_eq!(seeded.coordinate, origin());
        assert_eq!(seeded.accuracy_m, Some(12.0));
        assert!(next.history().is_empty());
    }

    #[test]
    fn first_live_fix_is_accepted_even_near_bootstrapped_position() {
        let store = std::sync::Arc::new(MemoryStore::default());
        PositionTracker::new(store.clone(), SafetyRules::default()).accept(fix(origin(), 5.0, 0));

        let mut tracker = PositionTracker::new(store, SafetyRules::default());
        tracker.activate();
        let nearby = offset_by_bearing(origin(), 1.0, 0.0);
        assert!(tracker.accept(fix(nearby, 5.0, 1)).is_accepted());
    }

    #[test]
    fn default_location_is_not_used_for_bootstrap() {
        let store = MemoryStore::default();
        let payload = serde_json::to_vec(&PersistedPosition {
            coordinate: DEFAULT_LOCATION,
            accuracy_m: None,
        })
        .unwrap();
        store.set(LAST_POSITION_KEY, &payload).unwrap();

        let mut tracker = PositionTracker::new(store, SafetyRules::default());
        assert!(tracker.activate().is_none());
    }

    #[test]
    fn store_failure_never_blocks_acceptance() {
        let store = MemoryStore {
            fail_writes: true,
            ..MemoryStore::default()
        };
        let mut tracker = PositionTracker::new(store, SafetyRules::default());
        assert!(tracker.accept(fix(origin(), 5.0, 0)).is_accepted());
        assert!(tracker.current().is_some());
    }

    #[tokio::test]
    async fn accurate_quick_fix_skips_second_attempt() {
        let source = ScriptedSource::new(vec![Scripted::Fix(fix(origin(), 8.0, 0))]);
        let mut tracker = tracker();

        let outcome = tracker.resolve_now(&source).await;
        assert!(outcome.is_ok());
        assert_eq!(outcome.value().unwrap().coordinate, origin());
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn inaccurate_quick_fix_triggers_patient_attempt_and_keeps_better() {
        let better = offset_by_bearing(origin(), 30.0, 0.0);
        let source = ScriptedSource::new(vec![
            Scripted::Fix(fix(origin(), 120.0, 0)),
            Scripted::Fix(fix(better, 15.0, 1)),
        ]);
        let mut tracker = tracker();

        let outcome = tracker.resolve_now(&source).await;
        assert_eq!(source.calls(), 2);
        assert_eq!(outcome.value().unwrap().coordinate, better);
        assert_eq!(outcome.value().unwrap().accuracy_m, Some(15.0));
    }

    #[tokio::test]
    async fn worse_patient_fix_keeps_quick_fix() {
        let worse = offset_by_bearing(origin(), 30.0, 0.0);
        let source = ScriptedSource::new(vec![
            Scripted::Fix(fix(origin(), 80.0, 0)),
            Scripted::Fix(fix(worse, 200.0, 1)),
        ]);
        let mut tracker = tracker();

        let outcome = tracker.resolve_now(&source).await;
        assert_eq!(outcome.value().unwrap().coordinate, origin());
    }

    #[tokio::test(start_paused = true)]
    async fn two_timeouts_degrade_to_default_location() {
        let source = ScriptedSource::new(vec![Scripted::Hang, Scripted::Hang]);
        let mut tracker = tracker();

        let outcome = tracker.resolve_now(&source).await;
        assert!(outcome.is_degraded());
        assert_eq!(outcome.reason(), Some(&SafetyError::GeolocationTimeout));
        assert_eq!(outcome.value().unwrap().coordinate, DEFAULT_LOCATION);
        // Timeouts are transient and do not stop further resolution
        assert!(tracker.blocked_reason().is_none());
    }

    #[tokio::test]
    async fn denial_after_inaccurate_fix_degrades_and_blocks() {
        let source = ScriptedSource::new(vec![
            Scripted::Fix(fix(origin(), 120.0, 0)),
            Scripted::Fail(SafetyError::GeolocationDenied),
        ]);
        let mut tracker = tracker();

        let first = tracker.resolve_now(&source).await;
        assert!(first.is_degraded());
        assert_eq!(first.reason(), Some(&SafetyError::GeolocationDenied));
        assert_eq!(first.value().unwrap().coordinate, origin());
        assert_eq!(tracker.history().len(), 1);

        let second = tracker.resolve_now(&source).await;
        assert_eq!(second, Outcome::Failed(SafetyError::GeolocationDenied));
        assert_eq!(source.calls(), 2);
    }

    #[test]
    fn extreme_timestamps_do_not_overflow() {
        let mut tracker = tracker();
        tracker.accept(fix(origin(), 5.0, 1_000));
        let moved = offset_by_bearing(origin(), 20.0, 0.0);
        let accepted = tracker.accept(fix(moved, 5.0, i64::MIN));
        let position = &accepted.accepted().unwrap().position;
        assert!(position.speed_mps.is_none());

        let further = offset_by_bearing(moved, 20.0, 0.0);
        assert!(tracker.accept(fix(further, 5.0, i64::MAX)).is_accepted());
        assert!(tracker.current().unwrap().speed_mps.is_none());
    }

    #[tokio::test]
    async fn denied_permission_blocks_later_attempts() {
        let source = ScriptedSource::new(vec![Scripted::Fail(SafetyError::GeolocationDenied)]);
        let mut tracker = tracker();

        let first = tracker.resolve_now(&source).await;
        assert!(first.is_degraded());
        assert_eq!(first.reason(), Some(&SafetyError::GeolocationDenied));

        let second = tracker.resolve_now(&source).await;
        assert_eq!(second, Outcome::Failed(SafetyError::GeolocationDenied));
        assert_eq!(source.calls(), 1);

        tracker.unblock();
        assert!(tracker.blocked_reason().is_none());
    }
}
