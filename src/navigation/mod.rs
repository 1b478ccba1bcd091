//! Heuristic navigation of rendered content.
//!
//! Each pass collects the accessible documents from the surface, starts
//! paused media, then tries (in order) the best scored control, the next menu
//! entry, and finally the keyboard fallback.

pub mod cooldown;
pub mod engine;
pub mod menu;
pub mod model;
pub mod scheduler;
pub mod scoring;

pub use engine::{Decision, NavigationEngine, NavigationOutcome, NavigationStats};
pub use model::{DocumentSnapshot, ElementRef, ElementSnapshot, Key};
pub use scheduler::{spawn_navigation, NavigationTimings};
pub use scoring::{Scorer, ScoredCandidate};
