//! Host Lifecycle Signals

use serde::{Deserialize, Serialize};

/// Lifecycle state reported by the host application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostLifecycleState {
    Foregrounded,
    Backgrounded,
    /// Visible but not focused; the engine enters battery saver
    Inactive,
    Terminated,
}

impl HostLifecycleState {
    /// Whether frames should be delivered in this state
    pub fn delivers_frames(&self) -> bool {
        matches!(
            self,
            HostLifecycleState::Foregrounded | HostLifecycleState::Inactive
        )
    }
}

/// Listener identifier returned on subscription
pub type ListenerId = u64;

/// Capability notified of host lifecycle changes
pub trait LifecycleListener: Send + Sync {
    fn on_lifecycle_changed(&self, state: HostLifecycleState);
}
