use tokio_util::sync::CancellationToken;

/// The user's instant abort path. Triggering is idempotent and process-wide:
/// every suspension point in the engine observes the same token, and once it
/// trips no further proposed action may execute.
#[derive(Debug, Clone, Default)]
pub struct KillSwitch {
    token: CancellationToken,
}

impl KillSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_is_idempotent_and_visible_to_clones() {
        let kill = KillSwitch::new();
        let observer = kill.clone();
        assert!(!observer.is_triggered());
        kill.trigger();
        kill.trigger();
        assert!(observer.is_triggered());
        assert!(observer.token().is_cancelled());
    }
}
