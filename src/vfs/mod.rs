//! Virtual file server.
//!
//! Serves the active package's archive to the rendering context under
//! [`CONTENT_PREFIX`]. The archive is owned by a single actor task; callers
//! talk to it through a FIFO channel via [`VfsHandle`]. `initialize` and
//! `clear` are fire-and-forget, so callers that need them applied before the
//! next request wait [`VfsConfig::grace_delay_ms`](crate::config::VfsConfig).

pub mod mime;

use bytes::Bytes;
use scormcast_package::ArchiveIndex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

/// URL prefix under which archive files are served.
pub const CONTENT_PREFIX: &str = "/scorm-content/";

const CHANNEL_CAPACITY: usize = 256;

/// Errors talking to the file server actor.
#[derive(Debug, thiserror::Error)]
pub enum VfsError {
    #[error("virtual file server is not running")]
    Unavailable,
}

/// A file found in the active archive.
#[derive(Debug, Clone)]
pub struct ResolvedFile {
    /// Archive path that matched.
    pub path: String,
    pub bytes: Bytes,
    pub content_type: &'static str,
}

/// Snapshot of the actor's state, for diagnostics.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct VfsStats {
    pub loaded: bool,
    pub file_count: usize,
    pub total_bytes: usize,
    pub base_dir: String,
    pub requests: u64,
    pub misses: u64,
}

/// Messages accepted by the actor, processed in arrival order.
#[derive(Debug)]
pub enum VfsMessage {
    Initialize {
        archive: ArchiveIndex,
        base_dir: String,
    },
    Clear,
    Resolve {
        path: String,
        reply: oneshot::Sender<Option<ResolvedFile>>,
    },
    Stats {
        reply: oneshot::Sender<VfsStats>,
    },
}

/// Cloneable handle to the file server actor.
#[derive(Debug, Clone)]
pub struct VfsHandle {
    tx: mpsc::Sender<VfsMessage>,
}

impl VfsHandle {
    /// Spawn the actor on the current runtime.
    ///
    /// The actor stops once every handle has been dropped.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(VirtualFileServer::default().run(rx));
        Self { tx }
    }

    /// Replace the served archive. Not acknowledged.
    pub async fn initialize(
        &self,
        archive: ArchiveIndex,
        base_dir: impl Into<String>,
    ) -> Result<(), VfsError> {
        self.send(VfsMessage::Initialize {
            archive,
            base_dir: base_dir.into(),
        })
        .await
    }

    /// Drop the served archive. Not acknowledged.
    pub async fn clear(&self) -> Result<(), VfsError> {
        self.send(VfsMessage::Clear).await
    }

    /// Look up a request path in the active archive.
    pub async fn resolve(&self, path: &str) -> Result<Option<ResolvedFile>, VfsError> {
        let (reply, rx) = oneshot::channel();
        self.send(VfsMessage::Resolve {
            path: path.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| VfsError::Unavailable)
    }

    pub async fn stats(&self) -> Result<VfsStats, VfsError> {
        let (reply, rx) = oneshot::channel();
        self.send(VfsMessage::Stats { reply }).await?;
        rx.await.map_err(|_| VfsError::Unavailable)
    }

    async fn send(&self, msg: VfsMessage) -> Result<(), VfsError> {
        self.tx.send(msg).await.map_err(|_| VfsError::Unavailable)
    }
}

#[derive(Default)]
struct VirtualFileServer {
    archive: Option<ArchiveIndex>,
    base_dir: String,
    requests: u64,
    misses: u64,
}

impl VirtualFileServer {
    async fn run(mut self, mut rx: mpsc::Receiver<VfsMessage>) {
        tracing::debug!("Virtual file server started");
        while let Some(msg) = rx.recv().await {
            self.handle(msg);
        }
        tracing::debug!("Virtual file server stopped");
    }

    fn handle(&mut self, msg: VfsMessage) {
        match msg {
            VfsMessage::Initialize { archive, base_dir } => {
                tracing::info!(
                    "Serving {} files ({} bytes), base dir '{}'",
                    archive.len(),
                    archive.total_bytes(),
                    base_dir
                );
                self.archive = Some(archive);
                self.base_dir = base_dir.trim_matches('/').to_string();
                self.requests = 0;
                self.misses = 0;
            }
            VfsMessage::Clear => {
                if self.archive.take().is_some() {
                    tracing::debug!("Archive released");
                }
                self.base_dir.clear();
            }
            VfsMessage::Resolve { path, reply } => {
                self.requests += 1;
                let found = self.resolve(&path);
                if found.is_none() {
                    self.misses += 1;
                }
                // The requester may have gone away.
                let _ = reply.send(found);
            }
            VfsMessage::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }

    fn resolve(&self, requested: &str) -> Option<ResolvedFile> {
        let archive = self.archive.as_ref()?;
        let cleaned = clean_request_path(requested);

        candidate_paths(&cleaned, &self.base_dir)
            .into_iter()
            .find_map(|candidate| {
                archive.get(&candidate).map(|bytes| ResolvedFile {
                    content_type: mime::content_type(&candidate),
                    bytes: bytes.clone(),
                    path: candidate,
                })
            })
    }

    fn stats(&self) -> VfsStats {
        VfsStats {
            loaded: self.archive.is_some(),
            file_count: self.archive.as_ref().map_or(0, ArchiveIndex::len),
            total_bytes: self.archive.as_ref().map_or(0, ArchiveIndex::total_bytes),
            base_dir: self.base_dir.clone(),
            requests: self.requests,
            misses: self.misses,
        }
    }
}

/// Strip query and fragment and percent-decode a request path.
pub fn clean_request_path(raw: &str) -> String {
    let end = raw.find(['?', '#']).unwrap_or(raw.len());
    let path = &raw[..end];
    let decoded = match urlencoding::decode(path) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => path.to_string(),
    };
    decoded.replace('\\', "/")
}

/// Lookup candidates for `path`, in order: as given, without leading
/// slashes, under `base_dir`, and under `base_dir` without leading slashes.
pub fn candidate_paths(path: &str, base_dir: &str) -> Vec<String> {
    let stripped = path.trim_start_matches('/');
    let mut candidates = vec![path.to_string(), stripped.to_string()];

    if !base_dir.is_empty() {
        candidates.push(format!("{}/{}", base_dir, path));
        candidates.push(format!("{}/{}", base_dir, stripped));
    }

    let mut seen = std::collections::HashSet::new();
    candidates.retain(|c| !c.is_empty() && seen.insert(c.clone()));
    candidates
}
