//! Hooks for server-pushed signals.
//!
//! The registry can piggyback two signals on a heartbeat response:
//!
//! - `config_update` → [`ConfigUpdateHook::on_config_update`]
//! - `drain_requested` → [`DrainHook::on_drain`]
//!
//! Hooks run on the task that sent the heartbeat (the loop task for periodic
//! heartbeats). No agent lock is held while they run, so a drain hook may stop
//! the heartbeat loop or call `shutdown` itself. Errors and panics from hooks
//! are logged and swallowed.
//!
//! Plain closures work for both hooks:
//!
//! ```rust,ignore
//! client.set_config_update_hook(Arc::new(|update: &ConfigUpdate| {
//!     tracing::info!("new config: {:?}", update);
//!     Ok(())
//! }));
//! client.set_drain_hook(Arc::new(|client: &RegistryClient| {
//!     client.request_heartbeat_stop();
//!     Ok(())
//! }));
//! ```

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use super::types::ConfigUpdate;
use super::RegistryClient;
use crate::error::Result;

/// Called when a heartbeat response carries a non-empty `config_update`.
#[async_trait]
pub trait ConfigUpdateHook: Send + Sync {
    async fn on_config_update(&self, update: &ConfigUpdate) -> Result<()>;
}

/// Called when a heartbeat response carries `drain_requested: true`.
///
/// Replaces the default behavior (stopping the heartbeat loop); the hook
/// decides what a graceful drain means.
#[async_trait]
pub trait DrainHook: Send + Sync {
    async fn on_drain(&self, client: &RegistryClient) -> Result<()>;
}

#[async_trait]
impl<F> ConfigUpdateHook for F
where
    F: Fn(&ConfigUpdate) -> Result<()> + Send + Sync,
{
    async fn on_config_update(&self, update: &ConfigUpdate) -> Result<()> {
        self(update)
    }
}

#[async_trait]
impl<F> DrainHook for F
where
    F: Fn(&RegistryClient) -> Result<()> + Send + Sync,
{
    async fn on_drain(&self, client: &RegistryClient) -> Result<()> {
        self(client)
    }
}

/// Replaceable hook slots. Readers clone the `Arc` out so the lock is never
/// held while a hook runs.
#[derive(Default)]
pub(crate) struct HookSlots {
    config_update: RwLock<Option<Arc<dyn ConfigUpdateHook>>>,
    drain: RwLock<Option<Arc<dyn DrainHook>>>,
}

impl HookSlots {
    pub(crate) fn config_update(&self) -> Option<Arc<dyn ConfigUpdateHook>> {
        self.config_update
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn drain(&self) -> Option<Arc<dyn DrainHook>> {
        self.drain
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_config_update(&self, hook: Option<Arc<dyn ConfigUpdateHook>>) {
        *self
            .config_update
            .write()
            .unwrap_or_else(PoisonError::into_inner) = hook;
    }

    pub(crate) fn set_drain(&self, hook: Option<Arc<dyn DrainHook>>) {
        *self.drain.write().unwrap_or_else(PoisonError::into_inner) = hook;
    }
}
