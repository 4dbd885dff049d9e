//! Circular safe/danger zone monitoring.
//!
//! Membership is resolved per position with danger taking priority over
//! safe. A transition is reported only when the resolved zone identity
//! changes, so churn inside one zone produces a single entry event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SafetyError;
use crate::models::{Coordinate, Zone, ZoneKind};
use crate::spatial::is_within_zone;

/// Identity of a resolved zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRef {
    pub kind: ZoneKind,
    pub id: String,
    pub name: String,
}

impl ZoneRef {
    fn from_zone(zone: &Zone) -> Self {
        Self {
            kind: zone.kind,
            id: zone.id.clone(),
            name: zone.name.clone(),
        }
    }

    fn same_identity(&self, other: &ZoneRef) -> bool {
        self.kind == other.kind && self.id == other.id
    }
}

/// Change of the resolved zone between two evaluations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneTransition {
    pub previous: Option<ZoneRef>,
    pub current: Option<ZoneRef>,
    pub position: Coordinate,
    pub at: DateTime<Utc>,
}

impl ZoneTransition {
    /// Zone that was entered, if any.
    pub fn entered(&self) -> Option<&ZoneRef> {
        self.current.as_ref()
    }

    /// Zone that was left, if any.
    pub fn exited(&self) -> Option<&ZoneRef> {
        self.previous.as_ref()
    }

    pub fn entered_danger(&self) -> bool {
        matches!(&self.current, Some(zone) if zone.kind == ZoneKind::Danger)
    }
}

/// Geofence monitor holding two disjoint zone sets.
#[derive(Debug, Default)]
pub struct GeofenceMonitor {
    safe: Vec<Zone>,
    danger: Vec<Zone>,
    resolved: Option<ZoneRef>,
}

impl GeofenceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a zone in the set for `kind`.
    ///
    /// A zone with the same id is replaced, even if it was registered under
    /// the other kind, so the two sets stay disjoint.
    pub fn add_zone(&mut self, kind: ZoneKind, mut zone: Zone) -> Result<(), SafetyError> {
        let errors = zone.validate();
        if !errors.is_empty() {
            return Err(SafetyError::InvalidZone(errors));
        }

        zone.kind = kind;
        self.remove_zone(&zone.id);
        tracing::debug!("Added {:?} zone {} ({})", kind, zone.id, zone.name);
        self.zones_mut(kind).push(zone);
        Ok(())
    }

    /// Remove a zone by id. The change is reported on the next evaluation.
    pub fn remove_zone(&mut self, id: &str) -> Option<Zone> {
        for kind in [ZoneKind::Safe, ZoneKind::Danger] {
            let zones = self.zones_mut(kind);
            if let Some(index) = zones.iter().position(|zone| zone.id == id) {
                return Some(zones.remove(index));
            }
        }
        None
    }

    pub fn zones(&self, kind: ZoneKind) -> &[Zone] {
        match kind {
            ZoneKind::Safe => &self.safe,
            ZoneKind::Danger => &self.danger,
        }
    }

    pub fn zone_count(&self) -> usize {
        self.safe.len() + self.danger.len()
    }

    /// Currently resolved zone.
    pub fn current_zone(&self) -> Option<&ZoneRef> {
        self.resolved.as_ref()
    }

    /// Zone a point resolves to without changing monitor state.
    ///
    /// Danger wins over safe; within a set the earliest registered zone wins.
    pub fn resolve(&self, position: Coordinate) -> Option<&Zone> {
        self.danger
            .iter()
            .find(|zone| is_within_zone(position, zone))
            .or_else(|| self.safe.iter().find(|zone| is_within_zone(position, zone)))
    }

    /// Whether a point lies inside any danger zone.
    pub fn is_in_danger(&self, position: Coordinate) -> bool {
        self.danger.iter().any(|zone| is_within_zone(position, zone))
    }

    /// Evaluate a tracked position, returning a transition when the
    /// resolved zone identity changed.
    pub fn evaluate(&mut self, position: Coordinate) -> Option<ZoneTransition> {
        let next = self.resolve(position).map(ZoneRef::from_zone);

        let unchanged = match (&self.resolved, &next) {
            (None, None) => true,
            (Some(previous), Some(current)) => previous.same_identity(current),
            _ => false,
        };
        if unchanged {
            return None;
        }

        let previous = std::mem::replace(&mut self.resolved, next.clone());
        let transition = ZoneTransition {
            previous,
            current: next,
            position,
            at: Utc::now(),
        };

        match (&transition.previous, &transition.current) {
            (_, Some(zone)) => tracing::info!("Entered {:?} zone {} ({})", zone.kind, zone.id, zone.name),
            (Some(zone), None) => tracing::info!("Left {:?} zone {} ({})", zone.kind, zone.id, zone.name),
            (None, None) => {}
        }

        Some(transition)
    }

    fn zones_mut(&mut self, kind: ZoneKind) -> &mut Vec<Zone> {
        match kind {
            ZoneKind::Safe => &mut self.safe,
            ZoneKind::Danger => &mut self.danger,
        }
    }
}
