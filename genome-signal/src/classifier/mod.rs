//! Discourse classification.
//!
//! ```text
//! ┌────────────┐   prompt + content   ┌───────────────────┐
//! │ Classifier │ ───────────────────▶ │ CompletionBackend │  (http | mock)
//! └─────┬──────┘                      └───────────────────┘
//!       │ failure / no key
//!       ▼
//! ┌────────────────┐
//! │ RuleClassifier │  ordered keyword tables, no I/O
//! └────────────────┘
//! ```
//!
//! Classification never fails from the caller's point of view: backend
//! errors fall back to rules, unreadable answers fall back to defaults.

pub mod backend;
pub mod json;
pub mod model;
pub mod prompts;
pub mod rules;
pub mod types;

use async_trait::async_trait;
use genome_common::{BackendKind, ClassifierMode, Config};
use std::sync::Arc;
use tracing::{info, warn};

use crate::post::Post;

pub use backend::{CompletionBackend, HttpBackend, MockBackend};
pub use model::ModelClassifier;
pub use rules::{content_signals, ContentSignals, RuleClassifier};
pub use types::{
    ConsumptionResult, DiscourseResult, IdentityResult, JourneyResult, MetaDenialResult,
    PatternEvidence, PersonaAnalysis, PivotPoint, PostProfile, QuestionRef, SentimentAnalysis,
    StyleAnalysis, TopicAnalysis, Transition, TrendAnalysis, TrendSummary,
};

/// The six classification tasks plus batch trend summarization.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Short strategy name for logs.
    fn name(&self) -> &str;

    async fn classify_discourse(&self, content: &str) -> DiscourseResult;

    /// Statements are joined with blank lines before classification.
    async fn classify_identity(&self, agent_id: &str, statements: &[String]) -> IdentityResult;

    async fn analyze_journey(&self, content: &str) -> JourneyResult;

    async fn detect_meta_denial(&self, content: &str) -> MetaDenialResult;

    async fn analyze_consumption(&self, content: &str) -> ConsumptionResult;

    async fn profile_post(&self, content: &str) -> PostProfile;

    /// `None` when this strategy cannot summarize; callers aggregate locally.
    async fn summarize_trends(&self, posts: &[Post]) -> Option<TrendSummary>;
}

/// Build the classifier the configuration asks for.
pub fn build_classifier(config: &Config) -> Arc<dyn Classifier> {
    if config.effective_mode() == ClassifierMode::Rules {
        info!(mock_mode = config.mock_mode, "Using rule-based classifier");
        return Arc::new(RuleClassifier::new());
    }

    let backend: Arc<dyn CompletionBackend> = match config.classifier.backend {
        BackendKind::Mock => Arc::new(MockBackend::new()),
        BackendKind::Http => {
            if config.classifier.api_key.as_deref().map_or(true, str::is_empty) {
                warn!("No classifier API key configured, using rule-based classifier");
                return Arc::new(RuleClassifier::new());
            }
            match HttpBackend::new(&config.classifier) {
                Ok(backend) => Arc::new(backend),
                Err(e) => {
                    warn!(error = %e, "Classifier backend unavailable, using rule-based classifier");
                    return Arc::new(RuleClassifier::new());
                }
            }
        }
    };

    info!(
        backend = backend.name(),
        model = %config.classifier.model,
        "Using model-backed classifier"
    );
    Arc::new(ModelClassifier::new(backend))
}
