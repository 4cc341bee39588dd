//! Network bandwidth estimation
//!
//! A probe downloads the first chunk of a sample stream with a byte-range
//! request and infers throughput from the wall-clock time it took. The
//! estimate is best effort: every failure is logged and reported as `None`.

use crate::{types::SessionConfig, Error, Result};
use async_trait::async_trait;
use reqwest::{header, Client};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Bytes read by a single probe
pub const DEFAULT_PROBE_BYTES: u64 = 512 * 1024;

/// Source of bandwidth estimates
#[async_trait]
pub trait BandwidthProbe: Send + Sync {
    /// Estimated throughput in bits per second, `None` when unknown
    async fn estimate(&self, sample_uri: &str) -> Option<u64>;
}

/// Throughput in bits per second for `bytes` received over `elapsed`.
///
/// Millisecond resolution; returns `None` when no time elapsed.
pub fn throughput_bps(bytes: u64, elapsed: Duration) -> Option<u64> {
    let elapsed_ms = elapsed.as_millis() as u64;
    if elapsed_ms == 0 {
        return None;
    }
    Some(bytes.saturating_mul(8).saturating_mul(1000) / elapsed_ms)
}

/// Range-request probe over HTTP
pub struct HttpBandwidthProbe {
    client: Client,
    max_bytes: u64,
    timeout: Duration,
}

impl HttpBandwidthProbe {
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.probe_timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self::with_client(client, config.probe_bytes, config.probe_timeout()))
    }

    pub fn with_client(client: Client, max_bytes: u64, timeout: Duration) -> Self {
        Self {
            client,
            max_bytes: max_bytes.max(1),
            timeout,
        }
    }

    /// Single timed read of at most `max_bytes`
    async fn measure(&self, sample_uri: &str) -> Result<(u64, Duration)> {
        let range = format!("bytes=0-{}", self.max_bytes - 1);
        let start = Instant::now();

        let mut response = self
            .client
            .get(sample_uri)
            .header(header::RANGE, range)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::BandwidthProbe(format!("HTTP {}", status)));
        }

        let mut received = 0u64;
        // Servers that ignore Range send the whole body; bytes past the
        // budget are not counted
        while let Some(chunk) = response.chunk().await? {
            received = (received + chunk.len() as u64).min(self.max_bytes);
            if received >= self.max_bytes {
                break;
            }
        }

        Ok((received, start.elapsed()))
    }
}

#[async_trait]
impl BandwidthProbe for HttpBandwidthProbe {
    #[instrument(skip(self))]
    async fn estimate(&self, sample_uri: &str) -> Option<u64> {
        let measured = match tokio::time::timeout(self.timeout, self.measure(sample_uri)).await {
            Ok(result) => result,
            Err(_) => Err(Error::BandwidthProbe(format!(
                "timed out after {}ms",
                self.timeout.as_millis()
            ))),
        };

        match measured {
            Ok((bytes, elapsed)) => {
                let estimate = throughput_bps(bytes, elapsed);
                debug!(
                    bytes,
                    elapsed_ms = elapsed.as_millis() as u64,
                    estimate_bps = ?estimate,
                    "Bandwidth probe finished"
                );
                estimate
            }
            Err(e) => {
                warn!(error = %e, code = e.error_code(), "Bandwidth probe failed");
                None
            }
        }
    }
}

/// Probe that always reports the same value
///
/// ```
/// use ladder_core::{BandwidthProbe, FixedBandwidth};
/// # tokio_test::block_on(async {
/// assert_eq!(FixedBandwidth(Some(1_000)).estimate("any").await, Some(1_000));
/// # });
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedBandwidth(pub Option<u64>);

#[async_trait]
impl BandwidthProbe for FixedBandwidth {
    async fn estimate(&self, _sample_uri: &str) -> Option<u64> {
        self.0
    }
}
