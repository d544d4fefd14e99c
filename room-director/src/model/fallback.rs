//! Local-first fallback with per-call timeouts and timeout retries.

use super::{LocalModel, ModelBackend, RemoteModel};
use crate::config::DirectorConfig;
use crate::error::ModelError;
use crate::prompt::{Generation, GenerationRequest};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Retry schedule applied to each variant, on timeouts only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry; doubles each time.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Backoff before retry number `retry` (zero-based).
    pub fn delay(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(retry))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(200))
    }
}

struct Tier {
    backend: Arc<dyn ModelBackend>,
    timeout: Duration,
}

/// Wraps a local model and an optional remote one.
///
/// The local model is always tried first. Only `Unavailable` and `Timeout`
/// hand over to the remote model, which is attempted once.
pub struct FallbackModel {
    local: Tier,
    remote: Option<Tier>,
    retry: RetryPolicy,
}

impl FallbackModel {
    pub fn new(local: Arc<dyn ModelBackend>, timeout: Duration) -> Self {
        Self {
            local: Tier {
                backend: local,
                timeout,
            },
            remote: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn ModelBackend>, timeout: Duration) -> Self {
        self.remote = Some(Tier {
            backend: remote,
            timeout,
        });
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build the HTTP variants described by `config`.
    pub fn from_config(config: &DirectorConfig) -> Result<Self, ModelError> {
        let local = LocalModel::from_config(config)?;
        let mut model = Self::new(Arc::new(local), config.timeout_local)
            .with_retry(RetryPolicy::new(config.retry_attempts, config.retry_base));

        if let Some(remote) = RemoteModel::from_config(config)? {
            model = model.with_remote(Arc::new(remote), config.timeout_remote);
        }
        Ok(model)
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    async fn call_with_retry(
        &self,
        tier: &Tier,
        request: &GenerationRequest,
    ) -> Result<Generation, ModelError> {
        let label = tier.backend.label();
        let mut retry = 0;

        loop {
            let result = match tokio::time::timeout(tier.timeout, tier.backend.generate(request)).await
            {
                Ok(result) => result,
                Err(_) => Err(ModelError::Timeout(tier.timeout)),
            };

            match result {
                Err(ModelError::Timeout(_)) if retry < self.retry.max_retries => {
                    let delay = self.retry.delay(retry);
                    retry += 1;
                    warn!(model = label, attempt = retry, ?delay, "model call timed out, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(model = label, error = %e, "model call failed");
                    return Err(e);
                }
                Ok(generation) => {
                    debug!(model = label, chars = generation.text.len(), "model call succeeded");
                    return Ok(generation);
                }
            }
        }
    }
}

#[async_trait]
impl ModelBackend for FallbackModel {
    fn label(&self) -> &str {
        self.local.backend.label()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, ModelError> {
        let err = match self.call_with_retry(&self.local, request).await {
            Ok(generation) => return Ok(generation),
            Err(e) => e,
        };

        match &self.remote {
            Some(remote) if err.allows_fallback() => {
                info!(
                    entity = %request.entity_id,
                    model = remote.backend.label(),
                    "local model failed, falling back to remote"
                );
                self.call_with_retry(remote, request).await
            }
            _ => Err(err),
        }
    }
}
