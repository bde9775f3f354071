use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::time::timeout;

use crate::geo::GeoPoint;
use crate::models::order::LocationSample;

/// Failure modes of the device positioning capability. None of them ends
/// the sampling sequence; the sampler keeps attempting.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PositionError {
    #[error("position permission denied")]
    PermissionDenied,
    #[error("positioning unavailable")]
    Unavailable,
    #[error("position fix timed out")]
    Timeout,
}

/// Device positioning capability: a one-shot read plus a movement
/// subscription. Implemented by the platform layer; tests use a scripted
/// source.
pub trait PositionSource {
    fn current_position(
        &mut self,
    ) -> impl Future<Output = Result<GeoPoint, PositionError>> + Send;

    /// Resolves with the new position once the device reports movement.
    fn position_changed(
        &mut self,
    ) -> impl Future<Output = Result<GeoPoint, PositionError>> + Send;
}

#[derive(Debug, Clone, Copy)]
pub struct SamplerConfig {
    /// Longest wait between samples when the device is stationary.
    pub refresh_ceiling: Duration,
    /// A cached fix younger than this is reused instead of forcing a read.
    pub max_fix_age: Duration,
    /// Upper bound on a single positioning attempt.
    pub attempt_timeout: Duration,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            refresh_ceiling: Duration::from_secs(15),
            max_fix_age: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

/// Lazy, infinite sequence of position samples. The first call emits
/// immediately; later calls wait for movement or the refresh ceiling,
/// whichever comes first. Capability failures are yielded as errors and the
/// next call attempts again.
pub struct LocationSampler<S> {
    source: S,
    config: SamplerConfig,
    last_fix: Option<LocationSample>,
    started: bool,
}

impl<S: PositionSource> LocationSampler<S> {
    pub fn new(source: S, config: SamplerConfig) -> Self {
        Self {
            source,
            config,
            last_fix: None,
            started: false,
        }
    }

    pub async fn next_sample(&mut self) -> Result<LocationSample, PositionError> {
        if !self.started {
            self.started = true;
            return self.fresh_fix().await;
        }

        let ceiling = self.config.refresh_ceiling;
        let moved = tokio::select! {
            moved = self.source.position_changed() => Some(moved),
            _ = tokio::time::sleep(ceiling) => None,
        };

        match moved {
            Some(Ok(point)) => Ok(self.store(point)),
            Some(Err(err)) => Err(err),
            None => self.fresh_fix().await,
        }
    }

    async fn fresh_fix(&mut self) -> Result<LocationSample, PositionError> {
        if let Some(fix) = self.cached_fix() {
            return Ok(fix);
        }

        match timeout(self.config.attempt_timeout, self.source.current_position()).await {
            Ok(Ok(point)) => Ok(self.store(point)),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(PositionError::Timeout),
        }
    }

    fn cached_fix(&self) -> Option<LocationSample> {
        let fix = self.last_fix?;
        let tolerance = chrono::Duration::from_std(self.config.max_fix_age)
            .unwrap_or(chrono::Duration::MAX);
        let age = Utc::now().signed_duration_since(fix.sampled_at);
        (age <= tolerance).then_some(fix)
    }

    fn store(&mut self, point: GeoPoint) -> LocationSample {
        let sample = LocationSample {
            latitude: point.lat,
            longitude: point.lng,
            sampled_at: Utc::now(),
        };
        self.last_fix = Some(sample);
        sample
    }
}
