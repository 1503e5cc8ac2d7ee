//! Lifecycle signal handed to the orchestrator.
//!
//! A context is either cancellable, in which case the orchestrator shuts both
//! listeners down once the token fires, or already terminating. The second
//! form is used when the orchestrator runs from inside a shutdown path (or when
//! no external cancellation exists at all) and suppresses the shutdown watcher
//! so the servers never receive a second shutdown request.

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub enum LifecycleContext {
    /// Shut both listeners down when the token is cancelled.
    Cancellable(CancellationToken),
    /// Someone else owns shutdown; never issue one from this run.
    Terminating,
}

impl LifecycleContext {
    /// Create a cancellable context together with the token that cancels it.
    pub fn cancellable() -> (Self, CancellationToken) {
        let token = CancellationToken::new();
        (Self::Cancellable(token.clone()), token)
    }

    pub fn is_terminating(&self) -> bool {
        matches!(self, Self::Terminating)
    }
}

impl From<CancellationToken> for LifecycleContext {
    fn from(token: CancellationToken) -> Self {
        Self::Cancellable(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellable_context_shares_token() {
        let (ctx, token) = LifecycleContext::cancellable();
        token.cancel();
        match ctx {
            LifecycleContext::Cancellable(inner) => assert!(inner.is_cancelled()),
            LifecycleContext::Terminating => panic!("expected cancellable context"),
        }
    }

    #[test]
    fn terminating_marker() {
        assert!(LifecycleContext::Terminating.is_terminating());
        assert!(!LifecycleContext::from(CancellationToken::new()).is_terminating());
    }
}
