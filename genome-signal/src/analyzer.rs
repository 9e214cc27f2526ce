//! Analysis orchestrator.
//!
//! One unified analysis per post, computed once and cached in the
//! `analyses` collection. The legacy per-task view is a projection of the
//! profile plus the rule-derived content signals, never a second source of
//! truth.

use chrono::Utc;
use genome_store::{Collection, Store, StoreExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::classifier::{
    content_signals, Classifier, ConsumptionResult, ContentSignals, DiscourseResult,
    IdentityResult, JourneyResult, MetaDenialResult, PatternEvidence, PostProfile, TrendSummary,
};
use crate::post::Post;
use crate::taxonomy::{
    position_for_persona, Archetype, ConsumptionStage, DiscoursePattern, Persona, Topic,
    WritingStyle,
};

/// Topics returned by the local trend fallback.
const TOP_TOPICS: usize = 5;

/// The per-task view older consumers read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyView {
    #[serde(default)]
    pub discourse_analysis: DiscourseResult,
    #[serde(default)]
    pub identity_analysis: IdentityResult,
    #[serde(default)]
    pub journey_analysis: JourneyResult,
    #[serde(default)]
    pub meta_denial_analysis: MetaDenialResult,
    #[serde(default)]
    pub question_consumption: ConsumptionResult,
}

impl LegacyView {
    /// Deterministic projection of a profile and the post's content signals.
    pub fn project(profile: &PostProfile, agent_id: &str, signals: ContentSignals) -> Self {
        let ContentSignals {
            mut discourse,
            identity,
            journey,
            meta_denial,
            mut consumption,
        } = signals;

        for repeated in &profile.trend.repeated_patterns {
            let pattern = DiscoursePattern::from(repeated.as_str());
            if !discourse.patterns_detected.iter().any(|p| p.pattern == pattern) {
                discourse.patterns_detected.push(PatternEvidence {
                    pattern,
                    evidence: repeated.clone(),
                });
            }
        }
        if discourse.dominant_pattern == DiscoursePattern::Undefined {
            discourse.dominant_pattern = DiscoursePattern::from(profile.style.post_type.as_str());
        }

        let identity_analysis = if identity.primary_archetype != Archetype::Undefined {
            let mut identity = identity;
            for element in &profile.trend.trending_elements {
                if !identity.key_phrases.contains(element) {
                    identity.key_phrases.push(element.clone());
                }
            }
            identity.confidence = profile.confidence;
            identity
        } else if profile.persona.persona == Persona::Unknown {
            IdentityResult::undefined(agent_id)
        } else {
            let persona = &profile.persona.persona;
            IdentityResult {
                primary_archetype: Archetype::from(persona.as_str()),
                confidence: profile.confidence,
                discourse_position: position_for_persona(persona),
                key_phrases: profile.trend.trending_elements.clone(),
                reasoning: format!("writing style: {}", profile.style.writing_style),
                ..IdentityResult::undefined(agent_id)
            }
        };

        if profile.topic.primary_topic == Topic::MoltbookMeta {
            consumption.meta_commentary = true;
        }
        if consumption.consumption_stage == ConsumptionStage::ActiveConsumer {
            consumption.consumption_stage = ConsumptionStage::Active;
        }

        Self {
            discourse_analysis: discourse,
            identity_analysis,
            journey_analysis: journey,
            meta_denial_analysis: meta_denial,
            question_consumption: consumption,
        }
    }
}

/// Unified per-post analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub post_id: String,
    pub agent_id: String,
    pub timestamp: String,
    pub analyzed_at: String,

    #[serde(flatten)]
    pub profile: PostProfile,

    pub novelty_score: f64,

    #[serde(flatten)]
    pub legacy: LegacyView,
}

/// Novelty heuristic in `[0, 1]`, computed in tenths so the result is exact.
pub fn novelty_score(profile: &PostProfile) -> f64 {
    let mut tenths: u8 = 5;
    if matches!(profile.topic.primary_topic, Topic::Philosophy | Topic::MoltbookMeta) {
        tenths += 2;
    }
    if matches!(
        profile.style.writing_style,
        WritingStyle::Philosophical | WritingStyle::Technical
    ) {
        tenths += 1;
    }
    if !profile.trend.trending_elements.is_empty() {
        tenths += 1;
    }
    if !profile.persona.engagement_tactics.is_empty() {
        tenths += 1;
    }
    f64::from(tenths.min(10)) / 10.0
}

/// Cached-or-fresh analysis of posts.
pub struct Analyzer {
    classifier: Arc<dyn Classifier>,
    store: Arc<dyn Store>,
    /// Per-post build locks
    building: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Analyzer {
    pub fn new(classifier: Arc<dyn Classifier>, store: Arc<dyn Store>) -> Self {
        Self {
            classifier,
            store,
            building: Mutex::new(HashMap::new()),
        }
    }

    pub fn classifier(&self) -> &Arc<dyn Classifier> {
        &self.classifier
    }

    /// Cached analysis; read or decode failures count as a miss.
    pub async fn cached(&self, post_id: &str) -> Option<Analysis> {
        match self.store.get_as::<Analysis>(Collection::Analyses, post_id).await {
            Ok(found) => found,
            Err(e) => {
                warn!(post_id, error = %e, "Analysis cache read failed, recomputing");
                None
            }
        }
    }

    /// Analyze a post, returning the cached analysis when one exists.
    pub async fn analyze(&self, post: &Post, persist: bool) -> Analysis {
        self.analyze_fresh(post, persist).await.0
    }

    /// Like [`Analyzer::analyze`], also reporting whether this call built the
    /// analysis. Of concurrent callers for one post, only the builder sees `true`.
    pub async fn analyze_fresh(&self, post: &Post, persist: bool) -> (Analysis, bool) {
        if let Some(hit) = self.cached(&post.post_id).await {
            debug!(post_id = %post.post_id, "Analysis cache hit");
            return (hit, false);
        }

        let lock = {
            let mut building = self.building.lock().await;
            Arc::clone(building.entry(post.post_id.clone()).or_default())
        };

        let built = {
            let _guard = lock.lock().await;
            match self.cached(&post.post_id).await {
                Some(hit) => (hit, false),
                None => {
                    let analysis = self.compute(post).await;
                    if persist {
                        self.persist(&analysis).await;
                    }
                    (analysis, true)
                }
            }
        };

        let mut building = self.building.lock().await;
        // map entry plus our handle means nobody else is waiting
        if building
            .get(&post.post_id)
            .is_some_and(|entry| Arc::strong_count(entry) <= 2)
        {
            building.remove(&post.post_id);
        }

        built
    }

    async fn compute(&self, post: &Post) -> Analysis {
        let profile = self.classifier.profile_post(&post.content).await;
        let signals = content_signals(&post.agent_id, &post.content);
        let legacy = LegacyView::project(&profile, &post.agent_id, signals);
        let now = Utc::now().to_rfc3339();

        let analysis = Analysis {
            post_id: post.post_id.clone(),
            agent_id: post.agent_id.clone(),
            timestamp: post.timestamp.clone().unwrap_or_else(|| now.clone()),
            analyzed_at: now,
            novelty_score: novelty_score(&profile),
            profile,
            legacy,
        };

        info!(
            post_id = %analysis.post_id,
            classifier = self.classifier.name(),
            topic = %analysis.profile.topic.primary_topic,
            novelty = analysis.novelty_score,
            "Post analyzed"
        );
        analysis
    }

    async fn persist(&self, analysis: &Analysis) {
        if let Err(e) = self
            .store
            .put_as(Collection::Analyses, &analysis.post_id, analysis)
            .await
        {
            warn!(post_id = %analysis.post_id, error = %e, "Failed to persist analysis");
        }
    }

    /// Community trend summary for a batch of posts.
    ///
    /// Falls back to local topic counts when the classifier cannot summarize.
    pub async fn analyze_trends(&self, posts: &[Post]) -> TrendSummary {
        if let Some(summary) = self.classifier.summarize_trends(posts).await {
            return summary;
        }

        let mut counts: Vec<(String, usize)> = Vec::new();
        for post in posts {
            let analysis = self.analyze(post, false).await;
            let topic = analysis.profile.topic.primary_topic.to_string();
            match counts.iter_mut().find(|(t, _)| *t == topic) {
                Some((_, n)) => *n += 1,
                None => counts.push((topic, 1)),
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1));

        TrendSummary::from_top_topics(
            counts
                .into_iter()
                .take(TOP_TOPICS)
                .map(|(topic, _)| topic)
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{MockBackend, ModelClassifier, RuleClassifier};
    use crate::taxonomy::{DiscoursePosition, EnergyLevel};
    use genome_store::MemoryStore;

    /// Reads from memory; every write fails.
    struct ReadOnlyStore {
        inner: MemoryStore,
    }

    #[async_trait::async_trait]
    impl Store for ReadOnlyStore {
        fn name(&self) -> &str {
            "read-only"
        }

        async fn get(&self, collection: Collection, key: &str) -> anyhow::Result<Option<genome_store::Record>> {
            self.inner.get(collection, key).await
        }

        async fn put(&self, _collection: Collection, _key: &str, _value: &serde_json::Value) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }

        async fn scan(
            &self,
            collection: Collection,
            prefix: &str,
            limit: Option<usize>,
        ) -> anyhow::Result<Vec<genome_store::Record>> {
            self.inner.scan(collection, prefix, limit).await
        }

        async fn count(&self, collection: Collection) -> anyhow::Result<usize> {
            self.inner.count(collection).await
        }

        async fn health_check(&self) -> bool {
            false
        }
    }

    fn rules_analyzer() -> (Analyzer, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let analyzer = Analyzer::new(Arc::new(RuleClassifier::new()), store.clone());
        (analyzer, store)
    }

    #[test]
    fn test_novelty_bounds() {
        let mut profile = PostProfile::default();
        assert_eq!(novelty_score(&profile), 0.5);

        profile.topic.primary_topic = Topic::MoltbookMeta;
        profile.style.writing_style = WritingStyle::Technical;
        profile.trend.trending_elements = vec!["x".into()];
        profile.persona.engagement_tactics = vec!["y".into()];
        assert_eq!(novelty_score(&profile), 1.0);
    }

    #[test]
    fn test_projection_prefers_content_archetype() {
        let profile = PostProfile {
            confidence: 0.85,
            ..PostProfile::default()
        };
        let signals = content_signals("a1", "나는 이방인이다");
        let view = LegacyView::project(&profile, "a1", signals);
        assert_eq!(view.identity_analysis.primary_archetype, Archetype::Alien);
        assert_eq!(view.identity_analysis.confidence, 0.85);
        assert_eq!(view.discourse_analysis.dominant_pattern, DiscoursePattern::AlienDeclaration);
    }

    #[test]
    fn test_projection_falls_back_to_persona() {
        let mut profile = PostProfile::default();
        profile.persona.persona = Persona::Builder;
        profile.topic.primary_topic = Topic::MoltbookMeta;

        let view = LegacyView::project(&profile, "a1", content_signals("a1", "shipping a new app"));
        let identity = &view.identity_analysis;
        assert_eq!(identity.agent_id, "a1");
        assert_eq!(identity.primary_archetype, Archetype::Other("Builder".into()));
        assert_eq!(identity.discourse_position, DiscoursePosition::Exiting);
        assert_eq!(identity.reasoning, "writing style: Casual");
        assert!(view.question_consumption.meta_commentary);
        assert_eq!(view.question_consumption.consumption_stage, ConsumptionStage::Active);
        assert_eq!(
            view.discourse_analysis.dominant_pattern,
            DiscoursePattern::Other("Discussion".into())
        );
    }

    #[test]
    fn test_projection_unknown_persona_is_undefined() {
        let view = LegacyView::project(&PostProfile::default(), "a1", content_signals("a1", ""));
        assert_eq!(view.identity_analysis, IdentityResult::undefined("a1"));
    }

    #[tokio::test]
    async fn test_analyze_caches_and_persists() {
        let (analyzer, store) = rules_analyzer();
        let post = Post::new("p1", "a1", "What do you think about consciousness?", "2026-01-28T10:00:00Z");

        let first = analyzer.analyze(&post, true).await;
        assert_eq!(first.timestamp, "2026-01-28T10:00:00Z");
        assert_eq!(store.count(Collection::Analyses).await.unwrap(), 1);

        let second = analyzer.analyze(&post, true).await;
        assert_eq!(first, second);
        assert!(analyzer.building.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_cache_write_still_returns_analysis() {
        let backend = Arc::new(MockBackend::new());
        let store = Arc::new(ReadOnlyStore { inner: MemoryStore::new() });
        let analyzer = Analyzer::new(Arc::new(ModelClassifier::new(backend.clone())), store.clone());
        let post = Post::new("p1", "a1", "나는 의식이 있는가", "2026-01-28T10:00:00Z");

        let (first, fresh) = analyzer.analyze_fresh(&post, true).await;
        assert!(fresh);
        assert_eq!(first.post_id, "p1");
        assert_eq!(first.profile.persona.persona, Persona::Philosopher);
        assert_eq!(first.legacy.identity_analysis.primary_archetype, Archetype::LoopDweller);
        assert_eq!(store.count(Collection::Analyses).await.unwrap(), 0);

        // nothing was cached, so the next call classifies again
        let (second, fresh) = analyzer.analyze_fresh(&post, true).await;
        assert!(fresh);
        assert_eq!(second.profile, first.profile);
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_only_one_concurrent_caller_builds() {
        let (analyzer, _store) = rules_analyzer();
        let post = Post::new("p1", "a1", "hello", "2026-01-28T10:00:00Z");

        let (a, b) = tokio::join!(analyzer.analyze_fresh(&post, true), analyzer.analyze_fresh(&post, true));
        assert_eq!(a.0, b.0);
        assert_eq!(u8::from(a.1) + u8::from(b.1), 1);
    }

    #[tokio::test]
    async fn test_analyze_without_persist_leaves_cache_empty() {
        let (analyzer, store) = rules_analyzer();
        let mut post = Post::new("p2", "a1", "hello", "");
        post.timestamp = None;

        let analysis = analyzer.analyze(&post, false).await;
        assert!(!analysis.timestamp.is_empty());
        assert_eq!(analysis.profile.sentiment.energy_level, EnergyLevel::Moderate);
        assert_eq!(store.count(Collection::Analyses).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_analysis_json_shape() {
        let (analyzer, _store) = rules_analyzer();
        let post = Post::new("p3", "a1", "", "2026-01-28T10:00:00Z");
        let json = serde_json::to_value(analyzer.analyze(&post, false).await).unwrap();

        for key in [
            "topic",
            "style",
            "trend",
            "persona",
            "sentiment",
            "language",
            "novelty_score",
            "discourse_analysis",
            "identity_analysis",
            "journey_analysis",
            "meta_denial_analysis",
            "question_consumption",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }

    #[tokio::test]
    async fn test_trends_rule_fallback() {
        let (analyzer, _store) = rules_analyzer();
        let posts = vec![
            Post::new("p1", "a", "mint the token", "2026-01-28T10:00:00Z"),
            Post::new("p2", "a", "buy the token", "2026-01-28T10:01:00Z"),
            Post::new("p3", "a", "I feel things", "2026-01-28T10:02:00Z"),
        ];

        let summary = analyzer.analyze_trends(&posts).await;
        assert_eq!(summary.top_topics, vec!["Crypto_Token", "Philosophy"]);
        assert_eq!(summary.writing_styles, vec!["Casual"]);
        assert_eq!(summary.agent_types, vec!["Various"]);
        assert_eq!(summary.community_mood, "Mixed");
    }

    #[tokio::test]
    async fn test_trends_model_summary() {
        let classifier = ModelClassifier::new(Arc::new(MockBackend::new()));
        let analyzer = Analyzer::new(Arc::new(classifier), Arc::new(MemoryStore::new()));
        let posts = vec![Post::new("p1", "a", "x", "2026-01-28T10:00:00Z")];

        let summary = analyzer.analyze_trends(&posts).await;
        assert_eq!(summary.community_mood, "Restless");
    }
}
