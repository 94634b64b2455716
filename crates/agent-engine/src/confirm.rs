use agent_policy::{ProposedAction, RiskTier};
use async_trait::async_trait;

/// Trait implemented by the host shell to put a pending action in front of
/// the user. Returns whether the user approved.
#[async_trait]
pub trait ConfirmationUi: Send + Sync {
    async fn request(
        &self,
        action: &ProposedAction,
        reason: &str,
        risk: RiskTier,
    ) -> anyhow::Result<bool>;
}
