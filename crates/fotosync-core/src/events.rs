//! Lifecycle events
//!
//! The core emits typed signals at every phase transition; status UIs,
//! metrics exporters and crash reporters subscribe to them without being
//! part of the sync path. Emission never blocks and never fails the flow:
//! if nobody is listening the event is simply dropped.

use tokio::sync::broadcast;

use crate::domain::ZoneArea;

/// Buffered events per subscriber before lagging kicks in
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Signals emitted by the auth machine and the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    AuthenticationStarted,
    Authenticated,
    MfaRequired,
    MfaResent,
    MfaReceived,
    Trusted,
    AccountReady,
    IndexingInProgress { zone: ZoneArea },
    SyncStarted,
    FetchCompleted {
        remote_assets: usize,
        remote_albums: usize,
        local_assets: usize,
        local_albums: usize,
    },
    DiffCompleted,
    WriteAssetCompleted { identity: String },
    WriteAlbumCompleted { identity: String },
    WriteCompleted,
    SyncRetry { attempt: u32 },
    SyncDone,
}

/// Broadcast fan-out for lifecycle events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Emits an event to all current subscribers. A send error only means
    /// nobody is subscribed, which is fine.
    pub fn emit(&self, event: LifecycleEvent) {
        let _ = self.tx.send(event);
    }

    /// Creates a new subscription receiving all events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
