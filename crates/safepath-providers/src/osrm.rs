//! OSRM-compatible routing provider.

use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::Deserialize;

use safepath_core::{Coordinate, RoutePolyline, RouteProfile, RouteStep, RoutingProvider, SafetyError};

use crate::backoff::{send_with_retry, RetryPolicy};
use crate::client::{normalize_base_url, HttpSettings};

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    geometry: OsrmGeometry,
    #[serde(default)]
    legs: Vec<OsrmLeg>,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    /// GeoJSON order: [lng, lat]
    coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
struct OsrmLeg {
    #[serde(default)]
    steps: Vec<OsrmStep>,
}

#[derive(Debug, Deserialize)]
struct OsrmStep {
    distance: f64,
    duration: f64,
    #[serde(default)]
    name: String,
    maneuver: OsrmManeuver,
}

#[derive(Debug, Deserialize)]
struct OsrmManeuver {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    modifier: Option<String>,
}

impl OsrmStep {
    fn instruction(&self) -> String {
        let action = match (self.maneuver.kind.as_str(), self.maneuver.modifier.as_deref()) {
            ("depart", _) => "Head out".to_string(),
            ("arrive", _) => "Arrive at destination".to_string(),
            (kind, Some(modifier)) => format!("{} {}", capitalize(kind), modifier),
            (kind, None) => capitalize(kind),
        };
        if self.name.is_empty() || self.maneuver.kind == "arrive" {
            action
        } else {
            format!("{} onto {}", action, self.name)
        }
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// OSRM profile segment for a travel mode.
pub fn osrm_profile(profile: RouteProfile) -> &'static str {
    match profile {
        RouteProfile::Walking => "foot",
        RouteProfile::Cycling => "bike",
        RouteProfile::Driving => "car",
    }
}

/// Decode an OSRM `route` response body into the first route.
pub fn decode_route(body: serde_json::Value) -> Result<RoutePolyline> {
    let response: OsrmResponse =
        serde_json::from_value(body).context("Unexpected OSRM response shape")?;

    if response.code != "Ok" {
        bail!(
            "OSRM returned {}: {}",
            response.code,
            response.message.unwrap_or_default()
        );
    }

    let route = response
        .routes
        .into_iter()
        .next()
        .context("OSRM response contained no routes")?;

    let points: Vec<Coordinate> = route
        .geometry
        .coordinates
        .iter()
        .map(|[lng, lat]| Coordinate::new(*lat, *lng))
        .collect();
    if points.len() < 2 {
        bail!("OSRM route geometry has {} point(s)", points.len());
    }

    let steps = route
        .legs
        .iter()
        .flat_map(|leg| leg.steps.iter())
        .map(|step| RouteStep {
            instruction: step.instruction(),
            distance_m: step.distance,
            duration_s: step.duration,
        })
        .collect();

    let mut polyline = RoutePolyline::new(points, route.distance, route.duration);
    polyline.steps = steps;
    Ok(polyline)
}

pub struct OsrmRouter {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl OsrmRouter {
    pub fn new(base_url: impl Into<String>, settings: &HttpSettings) -> Result<Self> {
        Ok(Self {
            client: settings.build_client()?,
            base_url: normalize_base_url(base_url),
            retry: settings.retry,
        })
    }

    fn route_url(&self, start: Coordinate, end: Coordinate, profile: RouteProfile) -> String {
        format!(
            "{}/route/v1/{}/{},{};{},{}",
            self.base_url,
            osrm_profile(profile),
            start.lng,
            start.lat,
            end.lng,
            end.lat
        )
    }

    async fn fetch_route(
        &self,
        start: Coordinate,
        end: Coordinate,
        profile: RouteProfile,
    ) -> Result<RoutePolyline> {
        let url = self.route_url(start, end, profile);
        let response = send_with_retry(&self.retry, || {
            self.client.get(&url).query(&[
                ("overview", "full"),
                ("geometries", "geojson"),
                ("steps", "true"),
            ])
        })
        .await
        .with_context(|| format!("OSRM request to {} failed", url))?;

        let body: serde_json::Value = response
            .json()
            .await
            .context("Failed to read OSRM response body")?;
        decode_route(body)
    }
}

impl RoutingProvider for OsrmRouter {
    async fn route(
        &self,
        start: Coordinate,
        end: Coordinate,
        profile: RouteProfile,
    ) -> Result<RoutePolyline, SafetyError> {
        self.fetch_route(start, end, profile)
            .await
            .map_err(|err| SafetyError::RoutingUnavailable(format!("{:#}", err)))
    }
}
