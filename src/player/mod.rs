//! Playback orchestration.
//!
//! The [`Player`] owns the loaded package, keeps the file server and the
//! runtime shim pointed at the active item, and advances through the items
//! as the content reports completion. [`session`] drives a whole recorded
//! or interactive run on top of it.

pub mod session;
mod state;

pub use session::{run_interactive, run_recording, RecordOptions, SessionReport};
pub use state::{PlaybackState, SharedPlayback};

use crate::config::Config;
use crate::events::{EventBus, PlayerEvent};
use crate::runtime::{CompletionSignal, CompletionStatus, RuntimeShim, ShimGuard, ShimRegistry};
use crate::vfs::{VfsHandle, CONTENT_PREFIX};
use anyhow::{Context, Result};
use scormcast_package::ContentPackage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// An item that became active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemActivation {
    pub index: usize,
    /// Entry document URL under the content prefix.
    pub src: String,
}

/// Result of handling a completion signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// The signal was stale or repeated; nothing changed.
    Ignored,
    /// The next playable item is now active.
    Next(ItemActivation),
    /// The last item completed.
    Finished(CompletionStatus),
}

/// Sequences the items of one package at a time.
pub struct Player {
    config: Arc<Config>,
    vfs: VfsHandle,
    shims: Arc<ShimRegistry>,
    events: EventBus,
    state: SharedPlayback,
    package: Option<Arc<ContentPackage>>,
    guard: Option<ShimGuard>,
    completed: Vec<bool>,
    completion_tx: mpsc::UnboundedSender<CompletionSignal>,
    completion_rx: mpsc::UnboundedReceiver<CompletionSignal>,
}

impl Player {
    pub fn new(
        config: Arc<Config>,
        vfs: VfsHandle,
        shims: Arc<ShimRegistry>,
        events: EventBus,
        state: SharedPlayback,
    ) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        Self {
            config,
            vfs,
            shims,
            events,
            state,
            package: None,
            guard: None,
            completed: Vec::new(),
            completion_tx,
            completion_rx,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn package(&self) -> Option<&Arc<ContentPackage>> {
        self.package.as_ref()
    }

    pub fn state(&self) -> PlaybackState {
        self.state.read().clone()
    }

    pub fn shared_state(&self) -> SharedPlayback {
        Arc::clone(&self.state)
    }

    /// Serve `package` and start its first playable item.
    ///
    /// Any previously loaded package is torn down first. Returns `None` if no
    /// item could be resolved.
    pub async fn load(&mut self, package: ContentPackage) -> Result<Option<ItemActivation>> {
        self.unload().await;

        let base_dir = package.base_dir();
        self.vfs
            .initialize(package.archive.clone(), base_dir.clone())
            .await
            .context("Virtual file server is not running")?;
        tokio::time::sleep(Duration::from_millis(self.config.vfs.grace_delay_ms)).await;

        tracing::info!(
            "Loaded '{}' ({}, {} items, base '{}')",
            package.title,
            package.spec_version,
            package.items.len(),
            base_dir
        );

        {
            let mut state = self.state.write();
            *state = PlaybackState {
                title: Some(package.title.clone()),
                item_count: package.items.len(),
                ..Default::default()
            };
        }
        self.events.broadcast(PlayerEvent::PackageLoaded {
            title: package.title.clone(),
            spec_version: package.spec_version.to_string(),
            item_count: package.items.len(),
        });

        self.completed = vec![false; package.items.len()];
        self.package = Some(Arc::new(package));
        Ok(self.activate_from(0))
    }

    /// Release the package, the runtime and the served archive.
    pub async fn unload(&mut self) {
        self.guard = None;
        if self.package.take().is_some() {
            tracing::debug!("Unloading package");
        }
        self.completed.clear();
        if let Err(e) = self.vfs.clear().await {
            tracing::warn!("Could not clear file server: {}", e);
        }
        while self.completion_rx.try_recv().is_ok() {}
        *self.state.write() = PlaybackState::default();
    }

    /// Make the item at `index` active.
    pub fn activate(&mut self, index: usize) -> scormcast_package::Result<ItemActivation> {
        let package = self
            .package
            .clone()
            .ok_or_else(|| scormcast_package::Error::resolution(format!("#{index}"), "<no package>"))?;
        let entry = package.resolve_item(index)?;
        let item = &package.items[index];
        let query = launch_query(
            package.resource_for(item).and_then(|r| r.launch_query.as_deref()),
            item.parameters.as_deref(),
        );
        let src = content_url(&entry.path, query.as_deref());

        let shim = Arc::new(RuntimeShim::new(index, self.completion_tx.clone()));
        self.guard = Some(self.shims.install(shim));

        {
            let mut state = self.state.write();
            state.active_item_index = Some(index);
            state.active_item_title = Some(item.title.clone());
            state.current_entry = Some(src.clone());
            state.completion_status = CompletionStatus::Incomplete;
        }

        if entry.substituted {
            tracing::info!(
                "Item {} '{}': launcher '{}' replaced by '{}'",
                index,
                item.title,
                entry.declared,
                entry.path
            );
        } else {
            tracing::info!("Item {} '{}': {}", index, item.title, entry.path);
        }

        self.events.broadcast(PlayerEvent::ItemStarted {
            index,
            item_id: item.id.clone(),
            title: item.title.clone(),
            src: src.clone(),
        });
        self.broadcast_progress();

        Ok(ItemActivation { index, src })
    }

    /// Activate the first item at or after `index` that resolves.
    ///
    /// Items that fail to resolve are reported and skipped.
    pub fn activate_from(&mut self, index: usize) -> Option<ItemActivation> {
        let count = self.package.as_ref().map_or(0, |p| p.items.len());
        for i in index..count {
            match self.activate(i) {
                Ok(activation) => return Some(activation),
                Err(e) => {
                    tracing::error!("Item {} cannot be played: {}", i, e);
                    let item_id = self
                        .package
                        .as_ref()
                        .map(|p| p.items[i].id.clone())
                        .unwrap_or_default();
                    self.events.broadcast(PlayerEvent::ItemFailed {
                        index: i,
                        item_id,
                        error: e.to_string(),
                    });
                }
            }
        }
        None
    }

    /// Wait for the next completion signal from the installed runtime.
    pub async fn next_completion(&mut self) -> Option<CompletionSignal> {
        self.completion_rx.recv().await
    }

    /// Apply a completion signal: advance, or finish on the last item.
    pub fn handle_completion(&mut self, signal: CompletionSignal) -> Advance {
        let Some(package) = self.package.clone() else {
            return Advance::Ignored;
        };
        let active = self.state.read().active_item_index;
        if active != Some(signal.item_index) {
            tracing::debug!(
                "Ignoring completion for item {} (active: {:?})",
                signal.item_index,
                active
            );
            return Advance::Ignored;
        }
        let index = signal.item_index;
        if self.completed.get(index).copied().unwrap_or(true) {
            return Advance::Ignored;
        }
        self.completed[index] = true;

        let item = &package.items[index];
        tracing::info!(
            "Item {} '{}' reported {} via {}",
            index,
            item.title,
            signal.status,
            signal.element
        );
        self.state.write().completion_status = signal.status;
        self.events.broadcast(PlayerEvent::ItemCompleted {
            index,
            item_id: item.id.clone(),
            status: signal.status,
        });

        let next = if index + 1 < package.items.len() {
            self.activate_from(index + 1)
        } else {
            None
        };

        match next {
            Some(activation) => Advance::Next(activation),
            None => {
                self.finish(signal.status);
                Advance::Finished(signal.status)
            }
        }
    }

    fn finish(&mut self, status: CompletionStatus) {
        self.guard = None;
        let active = {
            let mut state = self.state.write();
            state.finished = true;
            state.completion_status = status;
            state.progress_percent = 100;
            state.active_item_index
        };
        self.events.broadcast(PlayerEvent::Progress {
            active_item_index: active.unwrap_or(0),
            progress_percent: 100,
        });
        tracing::info!("Playback completed ({})", status);
        self.events
            .broadcast(PlayerEvent::PlaybackCompleted { status });
    }

    /// Number of items that reported completion.
    pub fn completed_count(&self) -> usize {
        self.completed.iter().filter(|c| **c).count()
    }

    pub fn set_recording(&self, active: bool) {
        self.state.write().recording_active = active;
    }

    fn broadcast_progress(&self) {
        let percent = PlaybackState::percent(self.completed_count(), self.completed.len());
        let active = {
            let mut state = self.state.write();
            state.progress_percent = percent;
            state.active_item_index
        };
        self.events.broadcast(PlayerEvent::Progress {
            active_item_index: active.unwrap_or(0),
            progress_percent: percent,
        });
    }
}

/// Join the resource's launch query and the item's parameters.
fn launch_query(resource: Option<&str>, parameters: Option<&str>) -> Option<String> {
    let parts: Vec<&str> = [resource, parameters.map(|p| p.trim_start_matches(['?', '&']))]
        .into_iter()
        .flatten()
        .filter(|p| !p.is_empty())
        .collect();
    (!parts.is_empty()).then(|| parts.join("&"))
}

/// URL of an archive path under the content prefix.
pub fn content_url(path: &str, query: Option<&str>) -> String {
    let encoded: Vec<String> = path
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    let mut url = format!("{}{}", CONTENT_PREFIX, encoded.join("/"));
    if let Some(query) = query {
        url.push('?');
        url.push_str(query);
    }
    url
}

/// URL of the player page for `base`, loading `src` or following the
/// active item.
pub fn player_page_url(base: &str, src: Option<&str>) -> String {
    let base = base.trim_end_matches('/');
    match src {
        Some(src) => format!("{base}/player/?src={}", urlencoding::encode(src)),
        None => format!("{base}/player/?follow=1"),
    }
}
