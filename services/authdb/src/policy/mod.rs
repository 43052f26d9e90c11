//! Policy cache and the reload capability repositories depend on.
//!
//! # Purpose
//! Repositories and the sync client only need to say "the policy inputs
//! changed". [`PolicyStore`] is that capability; the enforcer decides how and
//! when the cached policy is rebuilt.
//!
//! # Notes
//! Reloads are fire-and-forget. A failed reload is logged and counted, and the
//! previous policy stays in place until the next trigger succeeds.
mod enforcer;

pub use enforcer::PolicyEnforcer;

use crate::error::{AuthDbError, AuthDbResult};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::warn;

/// Something that can be told to rebuild its materialized policy.
pub trait PolicyStore: Send + Sync {
    fn reload(&self);
}

/// Ignores reload requests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReload;

impl PolicyStore for NoopReload {
    fn reload(&self) {}
}

/// Rebuilds synchronously on the calling thread; failures are logged.
#[derive(Clone)]
pub struct InlineReload {
    enforcer: Arc<PolicyEnforcer>,
}

impl InlineReload {
    pub fn new(enforcer: Arc<PolicyEnforcer>) -> Self {
        Self { enforcer }
    }
}

impl PolicyStore for InlineReload {
    fn reload(&self) {
        if let Err(err) = self.enforcer.reload_now() {
            warn!(error = %err, "policy reload failed");
        }
    }
}

/// Rebuilds on the tokio blocking pool, detached from the caller.
#[derive(Clone)]
pub struct BackgroundReload {
    enforcer: Arc<PolicyEnforcer>,
    handle: Handle,
}

impl BackgroundReload {
    pub fn new(enforcer: Arc<PolicyEnforcer>, handle: Handle) -> Self {
        Self { enforcer, handle }
    }

    /// Binds to the runtime the caller is running on.
    pub fn current(enforcer: Arc<PolicyEnforcer>) -> AuthDbResult<Self> {
        let handle = Handle::try_current().map_err(|err| {
            AuthDbError::Internal(anyhow::Error::new(err).context("background reload needs a tokio runtime"))
        })?;
        Ok(Self::new(enforcer, handle))
    }
}

impl PolicyStore for BackgroundReload {
    fn reload(&self) {
        let enforcer = Arc::clone(&self.enforcer);
        drop(self.handle.spawn_blocking(move || {
            if let Err(err) = enforcer.reload_now() {
                warn!(error = %err, "background policy reload failed");
            }
        }));
    }
}
