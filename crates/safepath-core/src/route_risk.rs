//! Route risk sampling and score fusion.
//!
//! A routed polyline is reduced to a bounded set of sample points, each
//! sample point is looked up against the incident source concurrently, and
//! the per-point results are fused into a 1-5 score with a recommendation.
//! A failed or timed-out lookup counts as zero incidents for that point.

use std::collections::HashSet;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::error::SafetyError;
use crate::models::{Coordinate, IncidentRecord, RoutePolyline, RouteSafetyAssessment};
use crate::rules::SafetyRules;
use crate::sources::IncidentSource;

const MAX_SCORE: f64 = 5.0;
const MIN_SCORE: f64 = 1.0;
const INCIDENTS_PER_SAMPLE_CEILING: f64 = 2.0;
const CRIME_WEIGHT: f64 = 2.0;
const HIGH_RISK_WEIGHT: f64 = 3.0;

const NIGHT_NOTE: &str =
    "It is night-time: prefer well-lit, busy streets and share your trip with someone you trust.";
const START_FLAGGED_NOTE: &str = "Your starting point is in an area flagged as unsafe.";
const END_FLAGGED_NOTE: &str = "Your destination is in an area flagged as unsafe.";

/// Score band used to pick the headline recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyBand {
    VerySafe,
    Safe,
    Moderate,
    Unsafe,
}

impl SafetyBand {
    pub fn from_score(score: f64) -> Self {
        if score >= 4.5 {
            SafetyBand::VerySafe
        } else if score >= 3.5 {
            SafetyBand::Safe
        } else if score >= 2.5 {
            SafetyBand::Moderate
        } else {
            SafetyBand::Unsafe
        }
    }

    fn headline(&self) -> &'static str {
        match self {
            SafetyBand::VerySafe => "This route is very safe with few reported incidents.",
            SafetyBand::Safe => "This route is generally safe. Stay aware of your surroundings.",
            SafetyBand::Moderate => {
                "This route has moderate risk. Stick to busy, well-lit streets where possible."
            }
            SafetyBand::Unsafe => {
                "This route has a high level of reported incidents. Strongly consider an alternative route."
            }
        }
    }
}

/// Situational inputs that add notes to the recommendation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteContext {
    pub night: bool,
    pub start_flagged: bool,
    pub end_flagged: bool,
}

impl RouteContext {
    /// Context for a local hour of day (0-23).
    pub fn at_hour(hour: u32, rules: &SafetyRules) -> Self {
        Self {
            night: rules.is_night_hour(hour),
            ..Self::default()
        }
    }
}

/// A polyline coordinate chosen for an incident lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePoint {
    /// Index into the source polyline
    pub index: usize,
    pub coordinate: Coordinate,
}

/// Pick sample points at a fixed stride of `max(1, n / target)`.
///
/// The first and last polyline points are always included.
pub fn sample_points(points: &[Coordinate], target: usize) -> Vec<SamplePoint> {
    let Some(last_index) = points.len().checked_sub(1) else {
        return Vec::new();
    };
    let stride = (points.len() / target.max(1)).max(1);

    let mut samples: Vec<SamplePoint> = points
        .iter()
        .enumerate()
        .step_by(stride)
        .map(|(index, coordinate)| SamplePoint {
            index,
            coordinate: *coordinate,
        })
        .collect();

    if samples.last().map(|sample| sample.index) != Some(last_index) {
        samples.push(SamplePoint {
            index: last_index,
            coordinate: points[last_index],
        });
    }

    samples
}

/// Fuse aggregate counts into a 1-5 score rounded to one decimal.
pub fn score_route(total_incidents: usize, high_risk_samples: usize, sampled_points: usize) -> f64 {
    if sampled_points == 0 {
        return MAX_SCORE;
    }
    let sampled = sampled_points as f64;
    let crime_ratio = (total_incidents as f64 / (sampled * INCIDENTS_PER_SAMPLE_CEILING)).min(1.0);
    let high_risk_ratio = high_risk_samples as f64 / sampled;
    let score =
        (MAX_SCORE - (crime_ratio * CRIME_WEIGHT + high_risk_ratio * HIGH_RISK_WEIGHT)).max(MIN_SCORE);
    (score * 10.0).round() / 10.0
}

/// Headline for the score band plus any contextual notes.
pub fn recommendation(score: f64, context: &RouteContext) -> String {
    let mut parts = vec![SafetyBand::from_score(score).headline()];
    if context.night {
        parts.push(NIGHT_NOTE);
    }
    if context.start_flagged {
        parts.push(START_FLAGGED_NOTE);
    }
    if context.end_flagged {
        parts.push(END_FLAGGED_NOTE);
    }
    parts.join(" ")
}

/// Drop repeated incident ids (first occurrence wins) and order by
/// severity descending, most recent first within a severity.
pub fn dedup_incidents<I>(incidents: I) -> Vec<IncidentRecord>
where
    I: IntoIterator<Item = IncidentRecord>,
{
    let mut seen = HashSet::new();
    let mut unique: Vec<IncidentRecord> = incidents
        .into_iter()
        .filter(|incident| seen.insert(incident.id.clone()))
        .collect();
    unique.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| b.occurred_at.cmp(&a.occurred_at))
    });
    unique
}

/// Per-point lookup result.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleOutcome {
    pub point: SamplePoint,
    pub incidents: Vec<IncidentRecord>,
    /// Lookup failed or timed out; counted as zero incidents
    pub failed: bool,
}

impl SampleOutcome {
    pub fn is_high_risk(&self) -> bool {
        self.incidents
            .iter()
            .any(|incident| incident.severity.is_high_risk())
    }
}

/// Full result of an assessment pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRiskReport {
    pub assessment: RouteSafetyAssessment,
    pub band: SafetyBand,
    /// Context after merging endpoint flags derived from the samples
    pub context: RouteContext,
    /// Deduplicated incidents, most severe first
    pub incidents: Vec<IncidentRecord>,
    pub samples: Vec<SampleOutcome>,
}

impl RouteRiskReport {
    pub fn failed_samples(&self) -> usize {
        self.samples.iter().filter(|sample| sample.failed).count()
    }
}

pub struct RouteRiskSampler<S> {
    source: S,
    rules: SafetyRules,
}

impl<S: IncidentSource> RouteRiskSampler<S> {
    pub fn new(source: S, rules: SafetyRules) -> Self {
        Self { source, rules }
    }

    pub fn rules(&self) -> &SafetyRules {
        &self.rules
    }

    /// Assess a route at the safety sampling density.
    pub async fn assess(
        &self,
        route: &RoutePolyline,
        context: &RouteContext,
    ) -> Result<RouteRiskReport, SafetyError> {
        let samples = self
            .sample_route(route, self.rules.safety_sample_target)
            .await?;

        let sampled_point_count = samples.len();
        let total_incidents: usize = samples.iter().map(|sample| sample.incidents.len()).sum();
        let high_risk_sample_count = samples.iter().filter(|sample| sample.is_high_risk()).count();

        let mut context = *context;
        if samples.first().is_some_and(SampleOutcome::is_high_risk) {
            context.start_flagged = true;
        }
        if samples.last().is_some_and(SampleOutcome::is_high_risk) {
            context.end_flagged = true;
        }

        let score = score_route(total_incidents, high_risk_sample_count, sampled_point_count);
        let assessment = RouteSafetyAssessment {
            score,
            total_incidents,
            high_risk_sample_count,
            recommendation: recommendation(score, &context),
            sampled_point_count,
        };

        let failed = samples.iter().filter(|sample| sample.failed).count();
        tracing::info!(
            "Assessed route: score {} from {} samples ({} failed), {} incidents",
            score,
            sampled_point_count,
            failed,
            total_incidents
        );

        let incidents = dedup_incidents(
            samples
                .iter()
                .flat_map(|sample| sample.incidents.iter().cloned()),
        );

        Ok(RouteRiskReport {
            assessment,
            band: SafetyBand::from_score(score),
            context,
            incidents,
            samples,
        })
    }

    /// Lighter pass listing the distinct incidents along a route.
    pub async fn incidents_along(
        &self,
        route: &RoutePolyline,
    ) -> Result<Vec<IncidentRecord>, SafetyError> {
        let samples = self
            .sample_route(route, self.rules.listing_sample_target)
            .await?;
        Ok(dedup_incidents(
            samples.into_iter().flat_map(|sample| sample.incidents),
        ))
    }

    async fn sample_route(
        &self,
        route: &RoutePolyline,
        target: usize,
    ) -> Result<Vec<SampleOutcome>, SafetyError> {
        if route.points.len() < 2 {
            return Err(SafetyError::InvalidRoute(format!(
                "route polyline needs at least two points, got {}",
                route.points.len()
            )));
        }

        let points = sample_points(&route.points, target);
        let lookups = points.iter().map(|point| self.lookup(*point));
        Ok(join_all(lookups).await)
    }

    async fn lookup(&self, point: SamplePoint) -> SampleOutcome {
        let query = self
            .source
            .query(point.coordinate, self.rules.incident_radius_deg);

        match tokio::time::timeout(self.rules.incident_timeout(), query).await {
            Ok(Ok(incidents)) => SampleOutcome {
                point,
                incidents,
                failed: false,
            },
            Ok(Err(err)) => {
                tracing::warn!("Incident lookup at {} failed: {}", point.coordinate, err);
                SampleOutcome {
                    point,
                    incidents: Vec::new(),
                    failed: true,
                }
            }
            Err(_) => {
                tracing::warn!("Incident lookup at {} timed out", point.coordinate);
                SampleOutcome {
                    point,
                    incidents: Vec::new(),
                    failed: true,
                }
            }
        }
    }
}
