//! Security context and cancellation.
//!
//! The teacher's `UserAuthorization` treats "who is allowed to do this" as
//! ambient, process-wide state threaded through a `RefCell`/global. Per the
//! design note in spec.md §9, this crate instead passes the context
//! explicitly as a parameter to every call that needs it, so concurrent
//! queries never share state.

use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Clone, Default)]
pub struct SecurityContext {
    pub user_id: String,
    pub roles: HashSet<String>,
    pub permissions: HashSet<String>,
    pub territory_ids: Vec<String>,
    pub custom: HashMap<String, JsonValue>,
}

impl SecurityContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), ..Default::default() }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn with_territories(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.territory_ids.extend(ids);
        self
    }

    pub fn is_system_administrator(&self) -> bool {
        self.roles.contains("SystemAdministrator")
    }
}

/// Consumed capability: current security context for a call.
///
/// Unlike the teacher's ambient provider, `current` takes no implicit
/// process state; implementations are expected to be simple closures over
/// whatever ambient mechanism the host application already has (request
/// scope, task-local, etc) and to return a *new* owned context per call so
/// concurrent queries never alias.
pub trait SecurityProvider: Send + Sync {
    fn current(&self) -> SecurityContext;
}

/// A provider that always returns the same fixed context. Used by the demo
/// CLI and by tests.
pub struct FixedSecurityProvider(pub SecurityContext);

impl SecurityProvider for FixedSecurityProvider {
    fn current(&self) -> SecurityContext {
        self.0.clone()
    }
}

/// Cooperative cancellation token, propagated to the driver call and to
/// parallel relationship fan-out (spec.md §5). Built from a `Notify` plus
/// an atomic flag rather than pulling in `tokio-util`, matching the
/// teacher's habit of hand-rolling small concurrency primitives (e.g.
/// `cli::events`'s signal channel) instead of reaching for an extra crate
/// for a few lines of logic.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: std::sync::atomic::AtomicBool,
    notify: Notify,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: std::sync::atomic::AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, std::sync::atomic::Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Resolves once `cancel()` has been called (or immediately, if it
    /// already has been). Intended for `tokio::select!` against driver I/O.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.inner.notify.notified().await;
    }

    /// A token that derives a deadline-based cancellation: spawns nothing,
    /// just cancels itself after `dur` elapses.
    pub fn with_deadline(dur: std::time::Duration) -> Self {
        let token = Self::new();
        let cloned = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(dur).await;
            cloned.cancel();
        });
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_role_bypasses_rls() {
        let ctx = SecurityContext::new("u1").with_role("SystemAdministrator");
        assert!(ctx.is_system_administrator());
    }

    #[tokio::test]
    async fn cancellation_token_wakes_waiters() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        token.cancel();
        handle.await.unwrap();
        assert!(token.is_cancelled());
    }
}
