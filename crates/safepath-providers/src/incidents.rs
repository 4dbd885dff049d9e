//! HTTP incident source.
//!
//! Queries `GET {base}/incidents?lat=..&lng=..&radius_deg=..` and expects
//! `{"incidents": [{"id", "lat", "lng", "category", "severity",
//! "occurred_at", "reported_at"?}]}`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use safepath_core::{Coordinate, IncidentRecord, IncidentSeverity, IncidentSource, SafetyError};

use crate::backoff::{send_with_retry, RetryPolicy};
use crate::client::{normalize_base_url, HttpSettings};

#[derive(Debug, Deserialize)]
struct IncidentsResponse {
    #[serde(default)]
    incidents: Vec<WireIncident>,
}

#[derive(Debug, Deserialize)]
struct WireIncident {
    id: String,
    lat: f64,
    lng: f64,
    #[serde(default)]
    category: String,
    #[serde(default)]
    severity: String,
    occurred_at: DateTime<Utc>,
    #[serde(default)]
    reported_at: Option<DateTime<Utc>>,
}

/// Map a feed severity label. Unknown labels count as low.
pub fn parse_severity(label: &str) -> IncidentSeverity {
    match label.trim().to_ascii_lowercase().as_str() {
        "critical" | "violent" => IncidentSeverity::Critical,
        "high" | "severe" => IncidentSeverity::High,
        "medium" | "moderate" => IncidentSeverity::Medium,
        _ => IncidentSeverity::Low,
    }
}

/// Decode an incident feed body, dropping records with bad coordinates.
pub fn decode_incidents(body: serde_json::Value) -> Result<Vec<IncidentRecord>> {
    let response: IncidentsResponse =
        serde_json::from_value(body).context("Unexpected incident feed shape")?;

    let total = response.incidents.len();
    let records: Vec<IncidentRecord> = response
        .incidents
        .into_iter()
        .filter_map(|wire| {
            let coordinate = Coordinate::new(wire.lat, wire.lng);
            if !coordinate.is_valid() {
                return None;
            }
            Some(IncidentRecord {
                severity: parse_severity(&wire.severity),
                reported_at: wire.reported_at.unwrap_or(wire.occurred_at),
                id: wire.id,
                coordinate,
                category: wire.category,
                occurred_at: wire.occurred_at,
            })
        })
        .collect();

    if records.len() < total {
        tracing::debug!("Dropped {} incident(s) with invalid coordinates", total - records.len());
    }
    Ok(records)
}

pub struct HttpIncidentSource {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl HttpIncidentSource {
    pub fn new(base_url: impl Into<String>, settings: &HttpSettings) -> Result<Self> {
        Ok(Self {
            client: settings.build_client()?,
            base_url: normalize_base_url(base_url),
            retry: settings.retry,
        })
    }

    async fn fetch(&self, center: Coordinate, radius_deg: f64) -> Result<Vec<IncidentRecord>> {
        let url = format!("{}/incidents", self.base_url);
        let response = send_with_retry(&self.retry, || {
            self.client.get(&url).query(&[
                ("lat", center.lat),
                ("lng", center.lng),
                ("radius_deg", radius_deg),
            ])
        })
        .await
        .with_context(|| format!("Incident query at {} failed", center))?;

        let body: serde_json::Value = response
            .json()
            .await
            .context("Failed to read incident feed body")?;
        decode_incidents(body)
    }
}

impl IncidentSource for HttpIncidentSource {
    async fn query(
        &self,
        center: Coordinate,
        radius_deg: f64,
    ) -> Result<Vec<IncidentRecord>, SafetyError> {
        self.fetch(center, radius_deg)
            .await
            .map_err(|err| SafetyError::IncidentQueryFailed(format!("{:#}", err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_feed_records() {
        let body = json!({
            "incidents": [
                {"id": "a1", "lat": 41.8781, "lng": -87.6298, "category": "robbery",
                 "severity": "HIGH", "occurred_at": "2024-05-02T03:10:00Z",
                 "reported_at": "2024-05-02T04:00:00Z"},
                {"id": "a2", "lat": 41.8790, "lng": -87.6301, "category": "vandalism",
                 "severity": "low", "occurred_at": "2024-05-01T13:00:00Z"}
            ]
        });

        let records = decode_incidents(body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].severity, IncidentSeverity::High);
        assert_eq!(records[0].coordinate, Coordinate::new(41.8781, -87.6298));
        assert_eq!(records[1].reported_at, records[1].occurred_at);
    }

    #[test]
    fn invalid_coordinates_are_dropped() {
        let body = json!({
            "incidents": [
                {"id": "bad", "lat": 123.0, "lng": 0.0, "severity": "critical",
                 "occurred_at": "2024-05-02T03:10:00Z"}
            ]
        });
        assert!(decode_incidents(body).unwrap().is_empty());
    }

    #[test]
    fn missing_list_is_empty() {
        assert!(decode_incidents(json!({})).unwrap().is_empty());
    }

    #[test]
    fn severity_labels() {
        assert_eq!(parse_severity("Critical"), IncidentSeverity::Critical);
        assert_eq!(parse_severity("moderate"), IncidentSeverity::Medium);
        assert_eq!(parse_severity(""), IncidentSeverity::Low);
        assert_eq!(parse_severity("unknown"), IncidentSeverity::Low);
    }
}
