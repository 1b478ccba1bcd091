use super::cooldown::{signature, Cooldown};
use super::menu::next_menu_target;
use super::model::{DocumentSnapshot, ElementRef, Key};
use super::scoring::Scorer;
use crate::config::NavigationConfig;
use crate::surface::RenderSurface;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Result of one navigation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NavigationOutcome {
    /// A scored control was clicked.
    Activated {
        target: ElementRef,
        score: i32,
        text: String,
    },
    /// A menu entry was opened.
    MenuAdvance { target: ElementRef, text: String },
    /// The keyboard fallback was sent.
    Keyboard,
    /// The chosen element was activated too recently.
    Suppressed { signature: String },
    /// Nothing happened.
    Miss { reason: String },
}

/// Counters over all passes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NavigationStats {
    pub attempts: u64,
    pub activated: u64,
    pub menu_advances: u64,
    pub keyboard: u64,
    pub suppressed: u64,
    pub misses: u64,
    pub media_started: u64,
}

impl NavigationStats {
    fn record(&mut self, outcome: &NavigationOutcome) {
        self.attempts += 1;
        match outcome {
            NavigationOutcome::Activated { .. } => self.activated += 1,
            NavigationOutcome::MenuAdvance { .. } => self.menu_advances += 1,
            NavigationOutcome::Keyboard => self.keyboard += 1,
            NavigationOutcome::Suppressed { .. } => self.suppressed += 1,
            NavigationOutcome::Miss { .. } => self.misses += 1,
        }
    }
}

/// What a pass intends to do, before touching the surface.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Activate {
        target: ElementRef,
        score: i32,
        text: String,
    },
    Menu {
        target: ElementRef,
        text: String,
    },
    Keyboard,
    Suppressed {
        signature: String,
    },
}

/// Decides and performs one forward step per pass.
#[derive(Debug)]
pub struct NavigationEngine {
    scorer: Scorer,
    cooldown: Cooldown,
    stats: NavigationStats,
    miss_streak: u32,
}

impl NavigationEngine {
    pub fn new(config: &NavigationConfig) -> Self {
        Self::with_scorer(
            Scorer::new(&config.weights, &config.extra_keywords),
            Duration::from_millis(config.cooldown_ms),
        )
    }

    pub fn with_scorer(scorer: Scorer, cooldown: Duration) -> Self {
        Self {
            scorer,
            cooldown: Cooldown::new(cooldown),
            stats: NavigationStats::default(),
            miss_streak: 0,
        }
    }

    pub fn stats(&self) -> &NavigationStats {
        &self.stats
    }

    pub fn into_stats(self) -> NavigationStats {
        self.stats
    }

    /// Choose the step for `documents`, recording it in the cooldown.
    pub fn decide(&mut self, documents: &[DocumentSnapshot], now: Instant) -> Decision {
        if let Some(best) = self.scorer.best(documents) {
            let sig = signature(&best.target.doc_id, best.target.node_id, &best.text);
            if !self.cooldown.try_acquire(&sig, now) {
                return Decision::Suppressed { signature: sig };
            }
            return Decision::Activate {
                target: best.target,
                score: best.score,
                text: best.text,
            };
        }

        if let Some(menu) = next_menu_target(documents) {
            let sig = signature(&menu.target.doc_id, menu.target.node_id, &menu.text);
            if !self.cooldown.try_acquire(&sig, now) {
                return Decision::Suppressed { signature: sig };
            }
            return Decision::Menu {
                target: menu.target,
                text: menu.text,
            };
        }

        Decision::Keyboard
    }

    /// Run one pass against `surface`.
    pub async fn attempt(&mut self, surface: &dyn RenderSurface) -> NavigationOutcome {
        let outcome = self.run_pass(surface).await;
        self.stats.record(&outcome);

        match &outcome {
            NavigationOutcome::Miss { reason } => {
                self.miss_streak += 1;
                if self.miss_streak == 1 {
                    tracing::warn!("Navigation pass missed: {}", reason);
                } else {
                    tracing::debug!("Navigation pass missed ({}x): {}", self.miss_streak, reason);
                }
            }
            other => {
                self.miss_streak = 0;
                tracing::debug!("Navigation: {:?}", other);
            }
        }

        outcome
    }

    async fn run_pass(&mut self, surface: &dyn RenderSurface) -> NavigationOutcome {
        let documents = match surface.documents().await {
            Ok(docs) if docs.is_empty() => {
                return NavigationOutcome::Miss {
                    reason: "no accessible documents".to_string(),
                }
            }
            Ok(docs) => docs,
            Err(e) => {
                return NavigationOutcome::Miss {
                    reason: e.to_string(),
                }
            }
        };

        self.start_paused_media(surface, &documents).await;

        match self.decide(&documents, Instant::now()) {
            Decision::Activate {
                target,
                score,
                text,
            } => match surface.activate(&target).await {
                Ok(true) => NavigationOutcome::Activated {
                    target,
                    score,
                    text,
                },
                Ok(false) => NavigationOutcome::Miss {
                    reason: format!("element {}#{} vanished", target.doc_id, target.node_id),
                },
                Err(e) => NavigationOutcome::Miss {
                    reason: e.to_string(),
                },
            },
            Decision::Menu { target, text } => match surface.activate(&target).await {
                Ok(true) => NavigationOutcome::MenuAdvance { target, text },
                Ok(false) => NavigationOutcome::Miss {
                    reason: format!("menu entry '{}' vanished", text),
                },
                Err(e) => NavigationOutcome::Miss {
                    reason: e.to_string(),
                },
            },
            Decision::Keyboard => match surface.press_keys(&Key::FALLBACK_SEQUENCE).await {
                Ok(()) => NavigationOutcome::Keyboard,
                Err(e) => NavigationOutcome::Miss {
                    reason: e.to_string(),
                },
            },
            Decision::Suppressed { signature } => NavigationOutcome::Suppressed { signature },
        }
    }

    async fn start_paused_media(&mut self, surface: &dyn RenderSurface, documents: &[DocumentSnapshot]) {
        for doc in documents {
            for media in doc.media.iter().filter(|m| m.paused && !m.ended) {
                let target = doc.element_ref(media.node_id);
                match surface.play_media(&target).await {
                    Ok(true) => {
                        self.stats.media_started += 1;
                        tracing::debug!("Started media {}#{}", target.doc_id, target.node_id);
                    }
                    Ok(false) => {}
                    Err(e) => tracing::debug!("Could not start media: {}", e),
                }
            }
        }
    }
}
