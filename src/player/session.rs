//! Whole playback runs: recorded (headless) and interactive (served).

use super::{player_page_url, Advance, ItemActivation, Player};
use crate::capture::{Recorder, RecorderState};
use crate::events::PlayerEvent;
use crate::navigation::{spawn_navigation, NavigationEngine, NavigationStats, NavigationTimings};
use crate::runtime::CompletionStatus;
use crate::surface::{RenderSurface, SurfaceEvent};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

/// Bound on waiting for the player page's first load.
const FIRST_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Options of a recorded run.
#[derive(Debug, Clone)]
pub struct RecordOptions {
    /// Origin of the local server, e.g. `http://127.0.0.1:8787`.
    pub base_url: String,
    pub output_dir: PathBuf,
    pub trim_start: Option<f64>,
    pub trim_end: Option<f64>,
    /// Skip transcoding and save the raw MJPEG clip.
    pub raw_only: bool,
}

/// Outcome of a recorded run.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub title: String,
    pub item_count: usize,
    pub items_completed: usize,
    pub finished: bool,
    pub completion_status: CompletionStatus,
    pub elapsed_seconds: u64,
    pub frames: u64,
    pub navigation: NavigationStats,
    pub artifact: PathBuf,
    /// Whether `artifact` is the raw clip rather than an MP4.
    pub raw: bool,
}

async fn wait_for_first_load(events: &mut broadcast::Receiver<SurfaceEvent>) -> bool {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(SurfaceEvent::Loaded { .. }) => return true,
                Ok(SurfaceEvent::Closed) | Err(RecvError::Closed) => return false,
                Ok(SurfaceEvent::Mutated) | Err(RecvError::Lagged(_)) => {}
            }
        }
    };
    tokio::time::timeout(FIRST_LOAD_TIMEOUT, wait)
        .await
        .unwrap_or(false)
}

/// Play the loaded package on `surface` while recording it.
///
/// Navigation starts after the player page first loads. The run ends when
/// the last item completes, `max_duration_secs` passes, `cancel` fires or
/// the surface closes. The recording is then converted and saved.
pub async fn run_recording(
    player: &mut Player,
    first: ItemActivation,
    surface: Arc<dyn RenderSurface>,
    recorder: &mut Recorder,
    options: &RecordOptions,
    cancel: CancellationToken,
) -> Result<SessionReport> {
    let navigation_config = player.config().navigation.clone();
    let max_duration = Duration::from_secs(player.config().player.max_duration_secs);
    let events = player.events().clone();

    let mut surface_events = surface.subscribe();
    surface
        .navigate(&player_page_url(&options.base_url, Some(&first.src)))
        .await
        .context("Failed to open the player page")?;

    if !wait_for_first_load(&mut surface_events).await {
        let message = "Player page did not finish loading".to_string();
        events.broadcast(PlayerEvent::Error {
            message: message.clone(),
        });
        anyhow::bail!(message);
    }

    if let Err(e) = recorder.start(Arc::clone(&surface)).await {
        events.broadcast(PlayerEvent::Error {
            message: e.to_string(),
        });
        return Err(e).context("Recording did not start");
    }
    let recording = Arc::new(AtomicBool::new(true));
    player.set_recording(true);
    events.broadcast(PlayerEvent::RecordingStarted);

    let navigation_cancel = cancel.child_token();
    let navigation = spawn_navigation(
        Arc::clone(&surface),
        NavigationEngine::new(&navigation_config),
        NavigationTimings::from(&navigation_config),
        true,
        Arc::clone(&recording),
        navigation_cancel.clone(),
    );

    let deadline = tokio::time::sleep(max_duration);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Recording interrupted");
                break;
            }
            _ = &mut deadline => {
                tracing::warn!("Maximum duration of {:?} reached", max_duration);
                break;
            }
            signal = player.next_completion() => {
                let Some(signal) = signal else { break };
                match player.handle_completion(signal) {
                    Advance::Next(activation) => {
                        let url = player_page_url(&options.base_url, Some(&activation.src));
                        if let Err(e) = surface.navigate(&url).await {
                            tracing::error!("Failed to open item {}: {}", activation.index, e);
                            events.broadcast(PlayerEvent::Error { message: e.to_string() });
                        }
                    }
                    Advance::Finished(_) => break,
                    Advance::Ignored => {}
                }
            }
            event = surface_events.recv() => {
                if matches!(event, Ok(SurfaceEvent::Closed) | Err(RecvError::Closed)) {
                    tracing::warn!("Rendering surface closed during recording");
                    break;
                }
            }
        }
    }

    recording.store(false, Ordering::Release);
    navigation_cancel.cancel();
    let full = recorder.stop().context("Failed to stop recording")?;
    player.set_recording(false);

    let navigation = match navigation.await {
        Ok(stats) => stats,
        Err(e) => {
            tracing::warn!("Navigation task ended abnormally: {}", e);
            NavigationStats::default()
        }
    };

    let elapsed_seconds = recorder.elapsed_seconds();
    let frames = recorder.frame_count();
    events.broadcast(PlayerEvent::RecordingStopped {
        elapsed_seconds,
        frames,
    });

    if options.trim_start.is_some() || options.trim_end.is_some() {
        let start = options.trim_start.unwrap_or(full.start);
        let end = options.trim_end.unwrap_or(full.end);
        match recorder.set_trim(start, end) {
            Ok(trim) => tracing::info!("Trim window {:.2}-{:.2}s", trim.start, trim.end),
            Err(e) => tracing::warn!("Ignoring trim window: {}", e),
        }
    }

    let (artifact, raw) = if options.raw_only {
        (recorder.save_raw(&options.output_dir).await?, true)
    } else {
        match recorder.convert().await? {
            RecorderState::PreviewReady => {
                if let Some(preview) = recorder.preview() {
                    events.broadcast(PlayerEvent::PreviewReady {
                        with_audio: preview.with_audio,
                        trimmed: preview.trimmed,
                    });
                }
                (recorder.save(&options.output_dir)?, false)
            }
            _ => {
                let reason = recorder
                    .fallback_reason()
                    .unwrap_or("transcoding unavailable")
                    .to_string();
                events.broadcast(PlayerEvent::RawFallback { reason });
                (recorder.save_raw(&options.output_dir).await?, true)
            }
        }
    };
    events.broadcast(PlayerEvent::RecordingSaved {
        path: artifact.clone(),
    });

    let state = player.state();
    Ok(SessionReport {
        title: state.title.unwrap_or_default(),
        item_count: state.item_count,
        items_completed: player.completed_count(),
        finished: state.finished,
        completion_status: state.completion_status,
        elapsed_seconds,
        frames,
        navigation,
        artifact,
        raw,
    })
}

/// Advance through the loaded package as completions arrive, until
/// `cancel` fires. The browser follows along on the player page.
pub async fn run_interactive(player: &mut Player, cancel: CancellationToken) -> Result<()> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            signal = player.next_completion() => {
                let Some(signal) = signal else { break };
                match player.handle_completion(signal) {
                    Advance::Next(activation) => {
                        tracing::info!("Now playing item {}", activation.index);
                    }
                    Advance::Finished(status) => {
                        tracing::info!("All items played ({}), still serving", status);
                    }
                    Advance::Ignored => {}
                }
            }
        }
    }
    Ok(())
}
