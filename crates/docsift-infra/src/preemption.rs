//! Spot preemption notices from the EC2 instance metadata service.
//!
//! The platform publishes `spot/instance-action` roughly two minutes before
//! reclaiming the instance. The watcher polls it and cancels a token on the
//! first notice; it never runs shutdown work itself.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const TOKEN_PATH: &str = "/latest/api/token";
const INSTANCE_ACTION_PATH: &str = "/latest/meta-data/spot/instance-action";
const TOKEN_TTL_HEADER: &str = "X-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_HEADER: &str = "X-aws-ec2-metadata-token";
const TOKEN_TTL_SECS: &str = "21600";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// A pending interruption, e.g. `{"action": "terminate", "time": "2026-10-19T08:22:00Z"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreemptionNotice {
    pub action: String,
    pub time: String,
}

/// Out-of-band channel announcing an imminent termination.
#[async_trait]
pub trait PreemptionSource: Send + Sync {
    /// `Some` once a termination has been scheduled. Errors read as "no notice".
    async fn poll(&self) -> Option<PreemptionNotice>;
}

/// IMDSv2 client for the spot instance-action document
pub struct InstanceMetadataClient {
    client: Client,
    base_url: String,
}

impl InstanceMetadataClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn session_token(&self) -> Option<String> {
        let response = self
            .client
            .put(format!("{}{}", self.base_url, TOKEN_PATH))
            .header(TOKEN_TTL_HEADER, TOKEN_TTL_SECS)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.text().await.ok()
    }
}

#[async_trait]
impl PreemptionSource for InstanceMetadataClient {
    async fn poll(&self) -> Option<PreemptionNotice> {
        // Fall back to an unauthenticated request when IMDSv2 tokens are unavailable.
        let token = self.session_token().await;
        let mut request = self
            .client
            .get(format!("{}{}", self.base_url, INSTANCE_ACTION_PATH));
        if let Some(ref token) = token {
            request = request.header(TOKEN_HEADER, token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::trace!(error = %e, "Instance metadata request failed");
                return None;
            }
        };

        match response.status() {
            StatusCode::OK => match response.json::<PreemptionNotice>().await {
                Ok(notice) => Some(notice),
                Err(e) => {
                    tracing::warn!(error = %e, "Unparseable spot instance-action document");
                    None
                }
            },
            StatusCode::NOT_FOUND => None,
            status => {
                tracing::debug!(status = status.as_u16(), "Unexpected instance metadata status");
                None
            }
        }
    }
}

/// Poll `source` every `interval` until a notice arrives or `stop` is cancelled.
///
/// On the first notice `trigger` is cancelled and the notice returned.
pub async fn watch_for_preemption(
    source: Arc<dyn PreemptionSource>,
    interval: Duration,
    stop: CancellationToken,
    trigger: CancellationToken,
) -> Option<PreemptionNotice> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    tracing::info!(interval_secs = interval.as_secs_f64(), "Preemption watcher started");

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => {
                tracing::debug!("Preemption watcher stopped");
                return None;
            }
            _ = ticker.tick() => {
                if let Some(notice) = source.poll().await {
                    tracing::warn!(
                        action = %notice.action,
                        time = %notice.time,
                        "Spot interruption notice received"
                    );
                    trigger.cancel();
                    return Some(notice);
                }
            }
        }
    }
}
