//! Subcommand handlers.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{Local, Timelike};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use safepath_core::{
    Coordinate, FollowSummary, HeatmapAggregator, HeatmapField, IncidentRecord, Outcome,
    RoutePlanner, RoutePolyline, RouteProfile, RouteRiskSampler, RouteSafetyAssessment,
    SafetyBand, SafetyEngine, SafetyRules, Zone,
};
use safepath_providers::{
    CachedIncidentSource, FileStore, HttpIncidentSource, HttpRatingSource, MemoryStore,
    OsrmRouter, ReplayLocationSource,
};

use crate::config::Config;

const INCIDENT_CACHE_TTL: Duration = Duration::from_secs(300);
const INCIDENT_CACHE_MAX_ENTRIES: usize = 512;

/// Parse `lat,lng`.
pub fn parse_coordinate(value: &str) -> Result<Coordinate, String> {
    let (lat, lng) = value
        .split_once(',')
        .ok_or_else(|| format!("expected lat,lng but got '{}'", value))?;
    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|_| format!("invalid latitude '{}'", lat.trim()))?;
    let lng: f64 = lng
        .trim()
        .parse()
        .map_err(|_| format!("invalid longitude '{}'", lng.trim()))?;
    let coordinate = Coordinate::new(lat, lng);
    if !coordinate.is_valid() {
        return Err(format!("coordinate {} is out of range", value));
    }
    Ok(coordinate)
}

pub fn parse_profile(value: &str) -> Result<RouteProfile, String> {
    match value.to_ascii_lowercase().as_str() {
        "walking" | "walk" | "foot" => Ok(RouteProfile::Walking),
        "cycling" | "bike" => Ok(RouteProfile::Cycling),
        "driving" | "car" => Ok(RouteProfile::Driving),
        other => Err(format!("unknown profile '{}'", other)),
    }
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("Failed to parse {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn add_zones<S: safepath_core::KeyValueStore>(engine: &mut SafetyEngine<S>, path: &Path) -> Result<()> {
    let zones: Vec<Zone> = load_json(path)?;
    let count = zones.len();
    for zone in zones {
        let id = zone.id.clone();
        engine
            .add_zone(zone.kind, zone)
            .with_context(|| format!("Zone '{}' in {}", id, path.display()))?;
    }
    tracing::info!("Loaded {} zone(s) from {}", count, path.display());
    Ok(())
}

#[derive(Debug, Serialize)]
struct RouteReport {
    profile: RouteProfile,
    distance_m: f64,
    duration_s: f64,
    /// Set when the straight-line fallback was used
    routing_fallback: Option<String>,
    assessment: RouteSafetyAssessment,
    band: SafetyBand,
    incidents: Vec<IncidentRecord>,
    route: RoutePolyline,
}

pub struct RouteArgs<'a> {
    pub from: Coordinate,
    pub to: Coordinate,
    pub profile: RouteProfile,
    pub night: bool,
    pub zones: Option<&'a Path>,
}

pub async fn route(config: &Config, args: RouteArgs<'_>) -> Result<()> {
    let rules = SafetyRules::default();
    let settings = config.http_settings();

    let planner = RoutePlanner::new(OsrmRouter::new(&config.routing_url, &settings)?, rules.clone());
    let (route, routing_fallback) = match planner.plan(args.from, args.to, args.profile).await {
        Outcome::Ok(route) => (route, None),
        Outcome::Degraded { value, reason } => (value, Some(reason.to_string())),
        Outcome::Failed(reason) => bail!("Cannot plan route: {}", reason),
    };

    let mut engine = SafetyEngine::new(MemoryStore::new(), rules.clone());
    if let Some(path) = args.zones {
        add_zones(&mut engine, path)?;
    }
    let mut context = engine.route_context(&route, Local::now().hour());
    context.night |= args.night;

    let incidents = CachedIncidentSource::new(
        HttpIncidentSource::new(&config.incident_url, &settings)?,
        INCIDENT_CACHE_TTL,
        INCIDENT_CACHE_MAX_ENTRIES,
    );
    let sampler = RouteRiskSampler::new(incidents, rules);
    let report = sampler.assess(&route, &context).await?;

    print_json(&RouteReport {
        profile: args.profile,
        distance_m: route.distance_m,
        duration_s: route.duration_s,
        routing_fallback,
        assessment: report.assessment,
        band: report.band,
        incidents: report.incidents,
        route,
    })
}

pub async fn heatmap(config: &Config, center: Coordinate) -> Result<()> {
    let source = HttpRatingSource::new(&config.rating_url, &config.http_settings())?;
    let aggregator = HeatmapAggregator::default();

    let field: HeatmapField = match aggregator.fetch(&source, center).await {
        Outcome::Ok(field) => field,
        Outcome::Degraded { value, reason } => {
            tracing::warn!("Heatmap unavailable: {}", reason);
            value
        }
        Outcome::Failed(reason) => bail!("Heatmap failed: {}", reason),
    };
    print_json(&field)
}

pub struct TrackArgs<'a> {
    pub samples: &'a Path,
    pub zones: Option<&'a Path>,
    pub route: Option<&'a Path>,
}

pub async fn track(config: &Config, args: TrackArgs<'_>) -> Result<FollowSummary> {
    let source = ReplayLocationSource::from_file(args.samples)?;
    if source.is_empty() {
        bail!("{} contains no samples", args.samples.display());
    }

    let store = FileStore::open(&config.store_path).await?;
    let mut engine = SafetyEngine::new(store, SafetyRules::default());
    if let Some(seeded) = engine.activate() {
        tracing::info!("Last known position {}", seeded.coordinate);
    }
    if let Some(path) = args.zones {
        add_zones(&mut engine, path)?;
    }
    if let Some(path) = args.route {
        let route: RoutePolyline = load_json(path)?;
        if route.points.len() < 2 {
            bail!("{} needs at least two route points", path.display());
        }
        engine.set_active_route(route);
    }

    let mut events = engine.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(err) => tracing::warn!("Failed to encode event: {}", err),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event printer lagged, skipped {} event(s)", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let summary = engine.watch(&source).await;
    engine.store().flush().await?;
    drop(engine);
    printer.await.context("Event printer task failed")?;

    print_json(&summary)?;
    Ok(summary)
}
