//! Scormcast - headless SCORM package player and recorder
//!
//! This library crate exposes the core functionality for integration testing.

pub mod capture;
pub mod config;
pub mod events;
pub mod navigation;
pub mod player;
pub mod runtime;
pub mod server;
pub mod surface;
pub mod vfs;
