//! HTTP community rating source.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;

use safepath_core::{Coordinate, RatingCell, RatingSource, SafetyError};

use crate::backoff::{send_with_retry, RetryPolicy};
use crate::client::{normalize_base_url, HttpSettings};

#[derive(Debug, Deserialize)]
struct RatingsResponse {
    #[serde(default)]
    cells: Vec<WireCell>,
}

#[derive(Debug, Deserialize)]
struct WireCell {
    lat: f64,
    lng: f64,
    average_safety_score: f64,
    sample_count: u32,
}

pub fn decode_ratings(body: serde_json::Value) -> Result<Vec<RatingCell>> {
    let response: RatingsResponse =
        serde_json::from_value(body).context("Unexpected rating response shape")?;
    Ok(response
        .cells
        .into_iter()
        .map(|cell| RatingCell {
            coordinate: Coordinate::new(cell.lat, cell.lng),
            average_safety_score: cell.average_safety_score,
            sample_count: cell.sample_count,
        })
        .collect())
}

/// Client for `GET {base}/ratings/nearby`.
pub struct HttpRatingSource {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl HttpRatingSource {
    pub fn new(base_url: impl Into<String>, settings: &HttpSettings) -> Result<Self> {
        Ok(Self {
            client: settings.build_client()?,
            base_url: normalize_base_url(base_url),
            retry: settings.retry,
        })
    }

    async fn fetch(&self, center: Coordinate, radius_deg: f64) -> Result<Vec<RatingCell>> {
        let url = format!("{}/ratings/nearby", self.base_url);
        let response = send_with_retry(&self.retry, || {
            self.client.get(&url).query(&[
                ("lat", center.lat),
                ("lng", center.lng),
                ("radius_deg", radius_deg),
            ])
        })
        .await
        .with_context(|| format!("Rating query at {} failed", center))?;

        let body: serde_json::Value = response
            .json()
            .await
            .context("Failed to read rating response body")?;
        decode_ratings(body)
    }
}

impl RatingSource for HttpRatingSource {
    async fn nearby(
        &self,
        center: Coordinate,
        radius_deg: f64,
    ) -> Result<Vec<RatingCell>, SafetyError> {
        self.fetch(center, radius_deg)
            .await
            .map_err(|err| SafetyError::RatingQueryFailed(format!("{:#}", err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_cells() {
        let cells = decode_ratings(json!({
            "cells": [
                {"lat": 47.6062, "lng": -122.3321, "average_safety_score": 4.2, "sample_count": 12},
                {"lat": 47.6070, "lng": -122.3300, "average_safety_score": 1.5, "sample_count": 1}
            ]
        }))
        .unwrap();

        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].coordinate, Coordinate::new(47.6062, -122.3321));
        assert_eq!(cells[1].sample_count, 1);
    }

    #[test]
    fn negative_sample_count_is_rejected() {
        let result = decode_ratings(json!({
            "cells": [{"lat": 0.0, "lng": 0.0, "average_safety_score": 3.0, "sample_count": -1}]
        }));
        assert!(result.is_err());
    }
}
