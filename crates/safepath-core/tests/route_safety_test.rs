//! Route planning and risk scoring against in-memory collaborators.

use chrono::{TimeZone, Utc};
use safepath_core::{
    Coordinate, IncidentRecord, IncidentSeverity, IncidentSource, RouteContext, RoutePlanner,
    RoutePolyline, RouteProfile, RouteRiskSampler, RoutingProvider, SafetyBand, SafetyError,
    SafetyRules,
};

/// Incident feed answering with every record inside the query box.
struct IncidentFeed(Vec<IncidentRecord>);

impl IncidentSource for IncidentFeed {
    async fn query(
        &self,
        center: Coordinate,
        radius_deg: f64,
    ) -> Result<Vec<IncidentRecord>, SafetyError> {
        Ok(self
            .0
            .iter()
            .filter(|incident| {
                (incident.coordinate.lat - center.lat).abs() <= radius_deg
                    && (incident.coordinate.lng - center.lng).abs() <= radius_deg
            })
            .cloned()
            .collect())
    }
}

struct DownRouter;

impl RoutingProvider for DownRouter {
    async fn route(
        &self,
        _start: Coordinate,
        _end: Coordinate,
        _profile: RouteProfile,
    ) -> Result<RoutePolyline, SafetyError> {
        Err(SafetyError::RoutingUnavailable("connection refused".to_string()))
    }
}

fn critical_at(id: &str, coordinate: Coordinate) -> IncidentRecord {
    let at = Utc.with_ymd_and_hms(2024, 3, 9, 22, 15, 0).unwrap();
    IncidentRecord {
        id: id.to_string(),
        coordinate,
        category: "assault".to_string(),
        severity: IncidentSeverity::Critical,
        occurred_at: at,
        reported_at: at,
    }
}

#[tokio::test]
async fn test_single_critical_incident_mid_route() {
    let route = RoutePolyline::new(
        vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 0.01),
            Coordinate::new(0.0, 0.02),
        ],
        2_224.0,
        1_590.0,
    );
    let feed = IncidentFeed(vec![critical_at("inc-1", Coordinate::new(0.0, 0.01))]);
    let sampler = RouteRiskSampler::new(feed, SafetyRules::default());

    let report = sampler
        .assess(&route, &RouteContext::default())
        .await
        .expect("assessment");

    assert_eq!(report.assessment.sampled_point_count, 3);
    assert_eq!(report.assessment.total_incidents, 1);
    assert_eq!(report.assessment.high_risk_sample_count, 1);
    assert_eq!(report.assessment.score, 3.7);
    assert_eq!(report.band, SafetyBand::Safe);
    assert!(!report.context.start_flagged);
    assert!(!report.context.end_flagged);
    assert_eq!(report.incidents.len(), 1);
    assert_eq!(report.failed_samples(), 0);
}

#[tokio::test]
async fn test_fallback_route_is_still_assessed() {
    let rules = SafetyRules::default();
    let start = Coordinate::new(40.7580, -73.9855);
    let end = Coordinate::new(40.7614, -73.9776);

    let planner = RoutePlanner::new(DownRouter, rules.clone());
    let planned = planner.plan(start, end, RouteProfile::Walking).await;
    assert!(planned.is_degraded());
    let route = planned.into_value().expect("fallback route");
    assert_eq!(route.points, vec![start, end]);

    let feed = IncidentFeed(vec![critical_at("near-end", end)]);
    let sampler = RouteRiskSampler::new(feed, rules.clone());
    let report = sampler
        .assess(&route, &RouteContext::at_hour(23, &rules))
        .await
        .expect("assessment");

    assert_eq!(report.assessment.sampled_point_count, 2);
    assert!(report.context.night);
    assert!(report.context.end_flagged);
    assert!(report.assessment.recommendation.to_lowercase().contains("night"));
}

#[tokio::test]
async fn test_incident_listing_dedups_across_samples() {
    let points: Vec<Coordinate> = (0..20)
        .map(|i| Coordinate::new(0.0, 0.0005 * i as f64))
        .collect();
    let route = RoutePolyline::new(points, 1_056.0, 754.0);
    let feed = IncidentFeed(vec![
        critical_at("a", Coordinate::new(0.0, 0.002)),
        critical_at("b", Coordinate::new(0.0, 0.008)),
    ]);
    let sampler = RouteRiskSampler::new(feed, SafetyRules::default());

    let incidents = sampler.incidents_along(&route).await.expect("listing");
    let mut ids: Vec<&str> = incidents.iter().map(|i| i.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["a", "b"]);
}
