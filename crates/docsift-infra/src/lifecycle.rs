//! Orchestration lifecycle acknowledgment.
//!
//! Sent as the last step of the interruption protocol so the orchestrator can
//! terminate the instance without waiting out its own timeout.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

#[async_trait]
pub trait LifecycleHook: Send + Sync {
    /// Signal that `instance_id` has finished vacating.
    async fn complete(&self, instance_id: &str) -> anyhow::Result<()>;
}

/// Hook used when no orchestrator endpoint is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLifecycleHook;

#[async_trait]
impl LifecycleHook for NoopLifecycleHook {
    async fn complete(&self, instance_id: &str) -> anyhow::Result<()> {
        tracing::debug!(instance_id = %instance_id, "No lifecycle hook configured");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct LifecycleAction<'a> {
    instance_id: &'a str,
    action: &'a str,
}

/// POSTs `{"instance_id": ..., "action": "CONTINUE"}` to a fixed URL.
pub struct HttpLifecycleHook {
    client: Client,
    url: String,
}

impl HttpLifecycleHook {
    pub fn new(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl LifecycleHook for HttpLifecycleHook {
    async fn complete(&self, instance_id: &str) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&LifecycleAction {
                instance_id,
                action: "CONTINUE",
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("lifecycle hook returned HTTP {}", status);
        }
        tracing::info!(instance_id = %instance_id, url = %self.url, "Lifecycle action completed");
        Ok(())
    }
}
