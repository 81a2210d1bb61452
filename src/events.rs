//! Core signal emission.
//!
//! The core announces state changes as named events for an external
//! notification/transport layer (GUI, RPC bridge, log sink). Emission is
//! fire-and-forget: events ride a `tokio::sync::broadcast` channel, a send
//! with no subscribers is dropped silently, and a receiver that falls behind
//! loses the oldest events rather than blocking the emitting operation.
//! Delivery failures to a remote listener are the transport's concern; they
//! never propagate back as core-operation failures.
//!
//! Payloads are plain serde-serializable data so the transport can forward
//! them across a process boundary without knowing the core's types.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default capacity of the event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A named signal emitted by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CoreEvent {
    /// A device was loaded into the directory.
    DeviceLoaded {
        /// Directory label.
        device: String,
    },
    /// A device was unloaded.
    DeviceUnloaded {
        /// Directory label.
        device: String,
    },
    /// A device completed initialization.
    DeviceInitialized {
        /// Directory label.
        device: String,
    },
    /// A property changed through the core's set path.
    PropertyChanged {
        /// Directory label.
        device: String,
        /// Property name.
        property: String,
        /// New value, as a wire string.
        value: String,
    },
    /// A config was applied.
    ConfigApplied {
        /// Group name.
        group: String,
        /// Config name.
        config: String,
    },
    /// A config group was defined or renamed into existence.
    ConfigGroupDefined {
        /// Group name.
        group: String,
    },
    /// A config group was deleted (or renamed away).
    ConfigGroupDeleted {
        /// Group name.
        group: String,
    },
    /// A config was defined or extended.
    ConfigDefined {
        /// Group name.
        group: String,
        /// Config name.
        config: String,
    },
    /// A config was deleted.
    ConfigDeleted {
        /// Group name.
        group: String,
        /// Config name.
        config: String,
    },
    /// A camera's ROI changed (or was cleared).
    RoiChanged {
        /// Directory label.
        device: String,
    },
    /// The system state cache was re-captured.
    SystemStateCacheUpdated,
}

/// Fan-out point for [`CoreEvent`]s.
pub struct EventHub {
    tx: broadcast::Sender<CoreEvent>,
}

impl EventHub {
    /// Create a hub with the default channel capacity.
    pub fn new() -> Self {
        Self::with_capacity(EVENT_CHANNEL_CAPACITY)
    }

    /// Create a hub with an explicit channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to core events. Each receiver gets every event emitted
    /// after subscription; a lagging receiver drops its oldest events.
    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.tx.subscribe()
    }

    /// Emit an event. Never fails the emitting operation.
    pub fn emit(&self, event: CoreEvent) {
        if self.tx.send(event.clone()).is_err() {
            // No subscribers; the event is simply dropped.
            tracing::trace!(?event, "core event dropped (no subscribers)");
        }
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}
