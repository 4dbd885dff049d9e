//! Location source replaying recorded fixes.

use std::path::Path;

use anyhow::{Context, Result};
use futures::stream::{self, BoxStream, StreamExt};

use safepath_core::{LocationRequest, LocationSource, PositionSample, SafetyError};

/// Replays a fixed list of samples in order. `current_position` returns
/// the latest recorded fix.
#[derive(Debug, Clone)]
pub struct ReplayLocationSource {
    samples: Vec<PositionSample>,
}

impl ReplayLocationSource {
    pub fn new(samples: Vec<PositionSample>) -> Self {
        Self { samples }
    }

    /// Load a JSON array of samples.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let samples: Vec<PositionSample> = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse samples in {}", path.display()))?;
        Ok(Self::new(samples))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl LocationSource for ReplayLocationSource {
    async fn current_position(
        &self,
        _request: &LocationRequest,
    ) -> Result<PositionSample, SafetyError> {
        self.samples.last().cloned().ok_or_else(|| {
            SafetyError::GeolocationUnavailable("no recorded samples".to_string())
        })
    }

    fn watch(&self, _request: &LocationRequest) -> BoxStream<'static, Result<PositionSample, SafetyError>> {
        stream::iter(self.samples.clone().into_iter().map(Ok)).boxed()
    }
}
