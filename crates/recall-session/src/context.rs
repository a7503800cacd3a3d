use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why an operation stopped before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    /// The context's token was cancelled.
    Cancelled,
    /// The context's deadline passed.
    DeadlineExceeded,
}

/// Cancellation and deadline carried into every store operation.
///
/// Cloning shares the underlying token, so cancelling any clone cancels them
/// all. When a context fires mid-operation the store interrupts the running
/// statement and rolls the transaction back.
#[derive(Debug, Clone)]
pub struct OpContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl OpContext {
    /// A context that never cancels and has no deadline.
    pub fn background() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// A context driven by an existing cancellation token.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Adds a deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Adds an absolute deadline. The earlier of two deadlines wins.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        });
        self
    }

    /// A child context: cancelled when this one is, cancellable on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// The underlying cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancels this context and every clone and child of it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns the interruption if the context has already fired.
    pub fn interruption(&self) -> Option<Interruption> {
        if self.token.is_cancelled() {
            return Some(Interruption::Cancelled);
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Some(Interruption::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn interrupted(&self) -> Interruption {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => Interruption::Cancelled,
                _ = tokio::time::sleep_until(deadline) => Interruption::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                Interruption::Cancelled
            }
        }
    }
}

impl Default for OpContext {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_background_is_live() {
        let ctx = OpContext::background();
        assert_eq!(ctx.interruption(), None);
        assert!(ctx.deadline().is_none());
    }

    #[test]
    fn test_cancel_propagates_to_clones_and_children() {
        let ctx = OpContext::background();
        let clone = ctx.clone();
        let child = ctx.child();
        ctx.cancel();
        assert_eq!(clone.interruption(), Some(Interruption::Cancelled));
        assert_eq!(child.interruption(), Some(Interruption::Cancelled));
    }

    #[test]
    fn test_child_cancel_does_not_reach_parent() {
        let ctx = OpContext::background();
        let child = ctx.child();
        child.cancel();
        assert_eq!(ctx.interruption(), None);
    }

    #[test]
    fn test_earliest_deadline_wins() {
        let now = Instant::now();
        let ctx = OpContext::background()
            .with_deadline(now + Duration::from_secs(10))
            .with_deadline(now + Duration::from_secs(60));
        assert_eq!(ctx.deadline(), Some(now + Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn test_expired_deadline_reports_exceeded() {
        let ctx = OpContext::background().with_timeout(Duration::ZERO);
        assert_eq!(ctx.interruption(), Some(Interruption::DeadlineExceeded));
        assert_eq!(ctx.interrupted().await, Interruption::DeadlineExceeded);
    }

    #[tokio::test]
    async fn test_interrupted_resolves_on_cancel() {
        let ctx = OpContext::background();
        let waiter = ctx.clone();
        let handle = tokio::spawn(async move { waiter.interrupted().await });
        ctx.cancel();
        assert_eq!(handle.await.unwrap(), Interruption::Cancelled);
    }
}
