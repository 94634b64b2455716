//! Routes the engine's model traffic between an on-device client and a cloud
//! client under a user-controlled policy. Implements the engine's ModelClient
//! seam, so the orchestrator never learns which backend answered.

use std::sync::Arc;

use agent_engine::{ModelClient, ModelClientError, ModelReply, TurnContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    OnDevice,
    Cloud,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingPolicy {
    #[serde(default = "RoutingPolicy::default_prefer_local")]
    pub prefer_local: bool,
    /// When set, requests never leave the machine even if the local model is
    /// unavailable.
    #[serde(default)]
    pub no_egress: bool,
    #[serde(default)]
    pub force_provider: Option<Provider>,
}

impl RoutingPolicy {
    fn default_prefer_local() -> bool {
        true
    }
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            prefer_local: true,
            no_egress: false,
            force_provider: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("requested provider is unavailable: {0:?}")]
    ProviderUnavailable(Provider),
}

/// Holds whichever backends the host managed to construct and picks one per
/// request according to the policy.
#[derive(Clone)]
pub struct ModelRouter {
    policy: RoutingPolicy,
    local: Option<Arc<dyn ModelClient>>,
    cloud: Option<Arc<dyn ModelClient>>,
}

impl ModelRouter {
    pub fn new(policy: RoutingPolicy) -> Self {
        Self {
            policy,
            local: None,
            cloud: None,
        }
    }

    pub fn with_local(mut self, client: Arc<dyn ModelClient>) -> Self {
        self.local = Some(client);
        self
    }

    pub fn with_cloud(mut self, client: Arc<dyn ModelClient>) -> Self {
        self.cloud = Some(client);
        self
    }

    pub fn local_available(&self) -> bool {
        self.local.is_some()
    }

    pub fn route(&self) -> Result<Arc<dyn ModelClient>, RouterError> {
        match self.policy.force_provider {
            Some(Provider::OnDevice) => {
                return self
                    .local
                    .clone()
                    .ok_or(RouterError::ProviderUnavailable(Provider::OnDevice));
            }
            Some(Provider::Cloud) => {
                if self.policy.no_egress {
                    return Err(RouterError::ProviderUnavailable(Provider::Cloud));
                }
                return self
                    .cloud
                    .clone()
                    .ok_or(RouterError::ProviderUnavailable(Provider::Cloud));
            }
            None => {}
        }

        if self.policy.prefer_local {
            if let Some(local) = self.local.clone() {
                return Ok(local);
            }
        }
        if self.policy.no_egress {
            return self
                .local
                .clone()
                .ok_or(RouterError::ProviderUnavailable(Provider::OnDevice));
        }
        self.cloud
            .clone()
            .or_else(|| self.local.clone())
            .ok_or(RouterError::ProviderUnavailable(Provider::Cloud))
    }
}

#[async_trait]
impl ModelClient for ModelRouter {
    async fn send(&self, context: &TurnContext) -> Result<ModelReply, ModelClientError> {
        let client = self
            .route()
            .map_err(|err| ModelClientError::Unavailable(err.to_string()))?;
        client.send(context).await
    }
}
