use crate::runtime::CompletionStatus;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

/// What the player is doing, as shown on the player page and `/player/state`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlaybackState {
    pub title: Option<String>,
    pub item_count: usize,
    pub active_item_index: Option<usize>,
    pub active_item_title: Option<String>,
    /// URL of the active item's entry document.
    pub current_entry: Option<String>,
    /// Share of items completed so far.
    pub progress_percent: u8,
    /// Status reported for the active item, or for the package once finished.
    pub completion_status: CompletionStatus,
    pub recording_active: bool,
    pub finished: bool,
}

impl PlaybackState {
    pub fn percent(completed: usize, total: usize) -> u8 {
        if total == 0 {
            return 0;
        }
        ((completed.min(total) * 100) / total) as u8
    }
}

/// Playback state shared with the HTTP server.
pub type SharedPlayback = Arc<RwLock<PlaybackState>>;
