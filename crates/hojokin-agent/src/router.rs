use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError};
use crate::retry::RetryPolicy;

/// One entry in the failover list.
pub struct ProviderSlot {
    pub provider: Arc<dyn LlmProvider>,
    /// Overrides `ChatRequest::model` for this slot (e.g. a cheaper fallback
    /// model on the same provider). `None` keeps the request's model.
    pub model: Option<String>,
}

impl ProviderSlot {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            model: None,
        }
    }

    pub fn with_model(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: Some(model.into()),
        }
    }
}

/// Routes requests across provider slots with retry and failover.
///
/// Each slot is attempted up to `policy.max_attempts` times, sleeping per
/// the policy between retryable failures. A non-retryable error, or running
/// out of attempts, moves on to the next slot. The last error is returned
/// when every slot fails.
pub struct ProviderRouter {
    slots: Vec<ProviderSlot>,
    policy: RetryPolicy,
}

impl ProviderRouter {
    /// At least one slot is required.
    pub fn new(slots: Vec<ProviderSlot>, policy: RetryPolicy) -> Self {
        assert!(!slots.is_empty(), "ProviderRouter requires at least one provider slot");
        Self { slots, policy }
    }
}

#[async_trait]
impl LlmProvider for ProviderRouter {
    fn name(&self) -> &str {
        "router"
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let mut last_err: Option<ProviderError> = None;

        for slot in &self.slots {
            let provider_name = slot.provider.name();
            let slot_req;
            let req = match &slot.model {
                Some(model) if *model != req.model => {
                    slot_req = ChatRequest {
                        model: model.clone(),
                        ..req.clone()
                    };
                    &slot_req
                }
                _ => req,
            };

            for attempt in 0..self.policy.max_attempts {
                match slot.provider.send(req).await {
                    Ok(resp) => {
                        if attempt > 0 {
                            info!(
                                provider = %provider_name,
                                model = %req.model,
                                attempt,
                                "request succeeded after retry"
                            );
                        }
                        return Ok(resp);
                    }
                    Err(e) => {
                        warn!(
                            provider = %provider_name,
                            model = %req.model,
                            attempt,
                            err = %e,
                            "provider send failed"
                        );
                        let retry = e.is_retryable() && attempt + 1 < self.policy.max_attempts;
                        let delay = self.policy.delay_for(attempt, &e);
                        last_err = Some(e);
                        if !retry {
                            break;
                        }
                        tokio::time::sleep(delay).await;
                    }
                }
            }

            info!(
                provider = %provider_name,
                model = %req.model,
                "provider exhausted, trying next provider"
            );
        }

        Err(last_err.unwrap_or_else(|| {
            ProviderError::Unavailable("all providers failed".to_string())
        }))
    }
}
