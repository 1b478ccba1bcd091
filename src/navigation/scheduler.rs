//! Timing of navigation passes.

use super::engine::{NavigationEngine, NavigationStats};
use crate::config::NavigationConfig;
use crate::surface::{RenderSurface, SurfaceEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Intervals driving the navigation loop.
#[derive(Debug, Clone, Copy)]
pub struct NavigationTimings {
    pub interval: Duration,
    pub load_delay: Duration,
    pub mutation_debounce: Duration,
}

impl From<&NavigationConfig> for NavigationTimings {
    fn from(config: &NavigationConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms),
            load_delay: Duration::from_millis(config.load_delay_ms),
            mutation_debounce: Duration::from_millis(config.mutation_debounce_ms),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Trigger {
    Interval,
    Load,
    Mutation,
}

/// Spawn the navigation loop.
///
/// Passes run on a fixed interval, shortly after every document load and
/// (debounced) after DOM mutations. Set `page_loaded` when the current
/// document finished loading before the loop subscribed to surface events; its
/// load pass is then scheduled right away. Every pass first checks
/// `recording`; the loop ends when `cancel` fires or the surface closes,
/// returning the stats.
pub fn spawn_navigation(
    surface: Arc<dyn RenderSurface>,
    engine: NavigationEngine,
    timings: NavigationTimings,
    page_loaded: bool,
    recording: Arc<AtomicBool>,
    cancel: CancellationToken,
) -> JoinHandle<NavigationStats> {
    tokio::spawn(run_navigation(
        surface,
        engine,
        timings,
        page_loaded,
        recording,
        cancel,
    ))
}

async fn run_navigation(
    surface: Arc<dyn RenderSurface>,
    mut engine: NavigationEngine,
    timings: NavigationTimings,
    page_loaded: bool,
    recording: Arc<AtomicBool>,
    cancel: CancellationToken,
) -> NavigationStats {
    let mut events = surface.subscribe();
    let mut ticker = tokio::time::interval_at(Instant::now() + timings.interval, timings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut load_at = page_loaded.then(|| Instant::now() + timings.load_delay);
    let mut mutation_at: Option<Instant> = None;

    tracing::debug!("Navigation loop started ({:?})", timings);

    loop {
        let next_deadline = match (load_at, mutation_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let sleep_target = next_deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

        let trigger = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => Some(Trigger::Interval),
            _ = tokio::time::sleep_until(sleep_target), if next_deadline.is_some() => {
                let now = Instant::now();
                if load_at.is_some_and(|at| at <= now) {
                    load_at = None;
                    Some(Trigger::Load)
                } else if mutation_at.is_some_and(|at| at <= now) {
                    mutation_at = None;
                    Some(Trigger::Mutation)
                } else {
                    None
                }
            }
            event = events.recv() => match event {
                Ok(SurfaceEvent::Loaded { .. }) => {
                    load_at = Some(Instant::now() + timings.load_delay);
                    None
                }
                Ok(SurfaceEvent::Mutated) => {
                    mutation_at = Some(Instant::now() + timings.mutation_debounce);
                    None
                }
                Ok(SurfaceEvent::Closed) | Err(RecvError::Closed) => {
                    tracing::debug!("Surface closed, navigation loop ends");
                    break;
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::debug!("Navigation loop lagged {} surface events", n);
                    mutation_at = Some(Instant::now() + timings.mutation_debounce);
                    None
                }
            },
        };

        let Some(trigger) = trigger else {
            continue;
        };

        if !recording.load(Ordering::Acquire) {
            tracing::trace!("Skipping {:?} pass, not recording", trigger);
            continue;
        }

        tracing::trace!("Navigation pass ({:?})", trigger);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = engine.attempt(surface.as_ref()) => {}
        }
    }

    let stats = engine.into_stats();
    tracing::info!(
        "Navigation stopped: {} passes, {} clicks, {} menu, {} keyboard, {} suppressed, {} misses",
        stats.attempts,
        stats.activated,
        stats.menu_advances,
        stats.keyboard,
        stats.suppressed,
        stats.misses
    );
    stats
}
