use super::shim::{ApiGeneration, RuntimeMethod, RuntimeShim};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Errors answering a bridged runtime call.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RuntimeCallError {
    #[error("no runtime is installed")]
    NotInstalled,
    #[error("unknown runtime API generation: {0}")]
    UnknownGeneration(String),
    #[error("unknown runtime method: {0}")]
    UnknownMethod(String),
}

struct Installed {
    token: u64,
    shim: Arc<RuntimeShim>,
}

/// Holds the shim that answers the bridge while an item plays.
///
/// At most one shim is installed. Installing returns a [`ShimGuard`]; the
/// shim stays reachable until the guard is dropped or another shim is
/// installed.
#[derive(Default)]
pub struct ShimRegistry {
    current: RwLock<Option<Installed>>,
    next_token: AtomicU64,
}

impl ShimRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Install `shim`, replacing any installed one.
    pub fn install(self: &Arc<Self>, shim: Arc<RuntimeShim>) -> ShimGuard {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed) + 1;
        let item_index = shim.item_index();
        *self.current.write() = Some(Installed { token, shim });
        tracing::debug!("Runtime installed for item {}", item_index);
        ShimGuard {
            registry: Arc::clone(self),
            token,
        }
    }

    pub fn current(&self) -> Option<Arc<RuntimeShim>> {
        self.current.read().as_ref().map(|i| Arc::clone(&i.shim))
    }

    pub fn is_installed(&self) -> bool {
        self.current.read().is_some()
    }

    /// Route a bridged call to the installed shim.
    pub fn call(
        &self,
        generation: &str,
        method: &str,
        args: &[String],
    ) -> Result<String, RuntimeCallError> {
        let generation = ApiGeneration::from_segment(generation)
            .ok_or_else(|| RuntimeCallError::UnknownGeneration(generation.to_string()))?;
        let parsed = RuntimeMethod::parse(generation, method)
            .ok_or_else(|| RuntimeCallError::UnknownMethod(method.to_string()))?;
        let shim = self.current().ok_or(RuntimeCallError::NotInstalled)?;
        Ok(shim.call(generation, parsed, args))
    }

    fn uninstall(&self, token: u64) {
        let mut current = self.current.write();
        if current.as_ref().is_some_and(|i| i.token == token) {
            *current = None;
            tracing::debug!("Runtime uninstalled");
        }
    }
}

/// Keeps a shim installed; uninstalls it on drop.
#[must_use = "the runtime is uninstalled when the guard is dropped"]
pub struct ShimGuard {
    registry: Arc<ShimRegistry>,
    token: u64,
}

impl Drop for ShimGuard {
    fn drop(&mut self) {
        self.registry.uninstall(self.token);
    }
}
