//! Scoped heartbeat lifetime.

use tracing::debug;

use crate::registry::RegistryClient;

/// Stops the heartbeat loop when the scope ends.
///
/// Prefer [`HeartbeatGuard::stop`], which waits (bounded) for the task.
/// Dropping the guard without calling it only signals the task, since `Drop`
/// cannot wait. Either way the loop is stopped exactly once by the guard.
///
/// A guard taken while the loop was already running does not own it and
/// leaves it alone.
#[must_use = "dropping the guard immediately stops the heartbeat loop"]
pub struct HeartbeatGuard {
    client: RegistryClient,
    armed: bool,
}

impl HeartbeatGuard {
    pub(crate) fn new(client: RegistryClient, armed: bool) -> Self {
        Self { client, armed }
    }

    pub fn client(&self) -> &RegistryClient {
        &self.client
    }

    /// Whether this guard started the loop and will stop it.
    pub fn owns_loop(&self) -> bool {
        self.armed
    }

    /// Stop the loop and wait for the task to exit. Returns `false` without
    /// touching the loop if this guard does not own it.
    pub async fn stop(mut self) -> bool {
        if !std::mem::replace(&mut self.armed, false) {
            return false;
        }
        self.client.stop_heartbeat_loop().await
    }
}

impl Drop for HeartbeatGuard {
    fn drop(&mut self) {
        if self.armed {
            self.armed = false;
            debug!("Heartbeat guard dropped, signalling loop to stop");
            self.client.request_heartbeat_stop();
        }
    }
}
