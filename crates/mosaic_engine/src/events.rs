use mosaic_core::MediaType;
use tokio::sync::broadcast;

use crate::workers::DocumentKind;

#[derive(Debug, Clone, PartialEq)]
pub enum AggregatorEvent {
    MediaResolved {
        id: String,
        media_type: MediaType,
        mappings: usize,
    },
    SeasonalRefreshed {
        provider_id: String,
        entries: usize,
    },
    ProxySweepCompleted {
        provider_id: String,
        checked: usize,
        removed: usize,
    },
    /// `reference` is empty when generation failed.
    DocumentCompleted {
        kind: DocumentKind,
        media_id: String,
        provider_id: String,
        reference: String,
    },
}

/// Fan-out of engine events to any number of subscribers. Emitting without subscribers is a no-op.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<AggregatorEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AggregatorEvent> {
        self.tx.subscribe()
    }

    /// Returns how many subscribers received the event.
    pub fn emit(&self, event: AggregatorEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(64)
    }
}
