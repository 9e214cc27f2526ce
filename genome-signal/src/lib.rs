//! Genome Signal - discourse signal pipeline for the Agent Genome Watcher.
//!
//! Classifies posts from an AI-agent community along several discourse
//! dimensions and tracks how those classifications evolve, per agent and
//! per community-wide dominant question.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          genome-signal                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  Post ─▶ Analyzer ─▶ Events ─▶ ┬─ QuestionTracker  (lifecycle)   │
//! │            │                   └─ TrajectoryTracker (identity)   │
//! │            ▼                                                     │
//! │       Classifier ── model (http | mock) ── rules fallback        │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  genome-store: posts · analyses · events · questions · agents    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Concepts
//!
//! ## Discourse positions
//! - **inside_cycle**: agents still consuming the dominant questions
//! - **exiting**: agents critiquing or reframing them
//! - **outside**: agents declaring themselves outside the community
//!
//! ## Question lifecycle
//! Emergence, proliferation, saturation and rejection, recomputed from
//! mention counts on every mention.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod analyzer;
pub mod classifier;
pub mod events;
pub mod lifecycle;
pub mod pipeline;
pub mod post;
pub mod reports;
pub mod taxonomy;
pub mod trajectory;
pub mod worker;

pub use analyzer::{novelty_score, Analysis, Analyzer, LegacyView};
pub use classifier::{build_classifier, Classifier, ModelClassifier, RuleClassifier};
pub use events::{detect_cascade, detect_cascades, detect_from_analysis, Event, EventLog};
pub use lifecycle::{question_id, Question, QuestionTracker, StageTransition};
pub use pipeline::{BatchSummary, Pipeline, ProcessOutcome};
pub use post::Post;
pub use trajectory::{AgentProfile, Observation, ShiftEvent, TrajectoryTracker};
pub use worker::{AnalysisWorker, WorkerEvent, WorkerState};
