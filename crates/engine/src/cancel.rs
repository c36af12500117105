//! Cooperative cancellation shared by every task of a performance.
//!
//! A [`CancelScope`] wraps a [`CancellationToken`] and remembers the first
//! [`CancelCause`] recorded against it, so waiters can tell an explicit cancel
//! from an elapsed deadline. Child scopes are cancelled with their parent and
//! report the parent's cause.

use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

use crate::errors::CancelCause;

#[derive(Debug, Clone, Default)]
pub struct CancelScope {
    token: CancellationToken,
    cause: Arc<OnceLock<CancelCause>>,
    parent: Option<Arc<CancelScope>>,
}

impl CancelScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives a scope cancelled together with `self`. Cancelling the child
    /// leaves the parent untouched.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            cause: Arc::new(OnceLock::new()),
            parent: Some(Arc::new(self.clone())),
        }
    }

    /// Cancels the scope. Only the first cause is kept, including a cause
    /// inherited from an already cancelled parent.
    pub fn cancel(&self, cause: CancelCause) {
        if self.token.is_cancelled() {
            return;
        }
        let _ = self.cause.set(cause);
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cause of the cancellation, if cancelled.
    pub fn cause(&self) -> Option<CancelCause> {
        if !self.token.is_cancelled() {
            return None;
        }
        if let Some(cause) = self.cause.get() {
            return Some(*cause);
        }
        self.parent
            .as_ref()
            .and_then(|parent| parent.cause())
            .or(Some(CancelCause::Requested))
    }

    /// Resolves once the scope is cancelled, yielding the cause.
    pub async fn cancelled(&self) -> CancelCause {
        self.token.cancelled().await;
        self.cause().unwrap_or(CancelCause::Requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_cause_wins() {
        let scope = CancelScope::new();
        assert_eq!(scope.cause(), None);

        scope.cancel(CancelCause::DeadlineExceeded);
        scope.cancel(CancelCause::Requested);

        assert!(scope.is_cancelled());
        assert_eq!(scope.cause(), Some(CancelCause::DeadlineExceeded));
    }

    #[tokio::test]
    async fn child_inherits_parent_cancellation_and_cause() {
        let parent = CancelScope::new();
        let child = parent.child();

        parent.cancel(CancelCause::Requested);

        assert_eq!(child.cancelled().await, CancelCause::Requested);
        assert_eq!(child.cause(), Some(CancelCause::Requested));
    }

    #[test]
    fn child_cancellation_does_not_reach_parent() {
        let parent = CancelScope::new();
        let child = parent.child();

        child.cancel(CancelCause::DeadlineExceeded);

        assert!(!parent.is_cancelled());
        assert_eq!(child.cause(), Some(CancelCause::DeadlineExceeded));
    }
}
