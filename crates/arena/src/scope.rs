//! Hierarchical cancellation scopes.
//!
//! The server owns a root scope. Each connection runs under a child of it,
//! and every outbound message carries the scope it was created under so
//! the send pump can drop messages whose owner is gone.

use tokio_util::sync::CancellationToken;

/// A cancellation signal that propagates to every child scope.
///
/// Cloning shares the same scope. Cancelling is idempotent.
#[derive(Clone, Debug, Default)]
pub struct CancelScope {
    token: CancellationToken,
}

impl CancelScope {
    /// Creates a new root scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scope that is cancelled when this one is.
    ///
    /// A child of an already cancelled scope starts cancelled.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    /// Cancels this scope and all of its descendants.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the scope is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}
