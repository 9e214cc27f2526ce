//! Genome Common - Shared types, utilities, and configuration for the
//! Agent Genome Watcher.
//!
//! This crate provides:
//! - Configuration types and loading (`~/.genome-watcher/config.json`)
//! - Error types and handling utilities
//! - Logging setup
//! - Small string helpers shared by the classifier and trackers

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;

pub use config::{
    ClassifierConfig, ClassifierMode, BackendKind, Config, EventsConfig, ObservabilityConfig,
    StorageConfig, WorkerConfig,
};
pub use error::{Error, Result, ResultExt};
