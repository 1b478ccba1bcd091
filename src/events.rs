//! Player events broadcast to the CLI and SSE subscribers.

use crate::runtime::CompletionStatus;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

/// Event emitted by the player while a package plays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum PlayerEvent {
    /// A package was loaded and its archive is being served.
    PackageLoaded {
        title: String,
        spec_version: String,
        item_count: usize,
    },
    /// An item became the active item.
    ItemStarted {
        index: usize,
        item_id: String,
        title: String,
        /// URL of the entry document under the content prefix.
        src: String,
    },
    /// An item could not be played.
    ItemFailed {
        index: usize,
        item_id: String,
        error: String,
    },
    /// The content reported completion for an item.
    ItemCompleted {
        index: usize,
        item_id: String,
        status: CompletionStatus,
    },
    /// Overall progress changed.
    Progress {
        active_item_index: usize,
        progress_percent: u8,
    },
    RecordingStarted,
    RecordingStopped {
        elapsed_seconds: u64,
        frames: u64,
    },
    /// The transcoded artifact is waiting to be saved.
    PreviewReady { with_audio: bool, trimmed: bool },
    /// Transcoding was unavailable; the raw clip is offered instead.
    RawFallback { reason: String },
    RecordingSaved { path: PathBuf },
    /// Every item has been played.
    PlaybackCompleted { status: CompletionStatus },
    Error { message: String },
}

impl PlayerEvent {
    /// Event name as it appears in the `event_type` field.
    pub fn name(&self) -> &'static str {
        match self {
            PlayerEvent::PackageLoaded { .. } => "package_loaded",
            PlayerEvent::ItemStarted { .. } => "item_started",
            PlayerEvent::ItemFailed { .. } => "item_failed",
            PlayerEvent::ItemCompleted { .. } => "item_completed",
            PlayerEvent::Progress { .. } => "progress",
            PlayerEvent::RecordingStarted => "recording_started",
            PlayerEvent::RecordingStopped { .. } => "recording_stopped",
            PlayerEvent::PreviewReady { .. } => "preview_ready",
            PlayerEvent::RawFallback { .. } => "raw_fallback",
            PlayerEvent::RecordingSaved { .. } => "recording_saved",
            PlayerEvent::PlaybackCompleted { .. } => "playback_completed",
            PlayerEvent::Error { .. } => "error",
        }
    }
}

/// Broadcast channel for [`PlayerEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    /// Broadcast an event to all subscribers.
    pub fn broadcast(&self, event: PlayerEvent) {
        tracing::trace!("Event: {}", event.name());
        if self.tx.send(event).is_err() {
            tracing::debug!("No subscribers for player event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = PlayerEvent::ItemCompleted {
            index: 1,
            item_id: "ITEM-2".to_string(),
            status: CompletionStatus::Passed,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "item_completed");
        assert_eq!(json["status"], "passed");
        assert_eq!(json["index"], 1);

        let json = serde_json::to_value(PlayerEvent::RecordingStarted).unwrap();
        assert_eq!(json["event_type"], "recording_started");
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers() {
        let bus = EventBus::new();
        bus.broadcast(PlayerEvent::RecordingStarted);

        let mut rx = bus.subscribe();
        bus.broadcast(PlayerEvent::Progress {
            active_item_index: 0,
            progress_percent: 50,
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "progress");
    }
}
