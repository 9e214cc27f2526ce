//! End-to-end processing of one post.
//!
//! ```text
//! Post ─▶ Analyzer ─▶ detect_from_analysis ─▶ EventLog
//!             │
//!             ├──▶ QuestionTracker ──(saturation)──▶ loop_saturation
//!             └──▶ TrajectoryTracker ──(shift)──▶ identity_shift ─▶ cascade scan
//! ```

use anyhow::{Context, Result};
use genome_common::{Config, EventsConfig};
use genome_store::{Collection, SqliteStore, Store, StoreExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::analyzer::{Analysis, Analyzer};
use crate::classifier::{build_classifier, Classifier};
use crate::events::{
    cascade_agents, detect_cascades, detect_from_analysis, identity_shift_event, saturation_event,
    Event, EventLog,
};
use crate::lifecycle::{QuestionTracker, StageTransition};
use crate::post::Post;
use crate::taxonomy::{EventType, LifecycleStage};
use crate::trajectory::{Observation, ShiftEvent, TrajectoryTracker};

/// What processing one post produced.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub analysis: Analysis,
    /// Events recorded for this post, cascades included
    pub events: Vec<Event>,
    pub shift: Option<ShiftEvent>,
    pub transitions: Vec<StageTransition>,
}

impl ProcessOutcome {
    fn cached(analysis: Analysis) -> Self {
        Self {
            analysis,
            events: Vec::new(),
            shift: None,
            transitions: Vec::new(),
        }
    }
}

/// Counts from one batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub ingested: usize,
    pub processed: usize,
    pub events: usize,
    pub shifts: usize,
}

pub struct Pipeline {
    store: Arc<dyn Store>,
    analyzer: Analyzer,
    events: EventLog,
    questions: QuestionTracker,
    trajectories: TrajectoryTracker,
    config: EventsConfig,
}

impl Pipeline {
    pub fn new(classifier: Arc<dyn Classifier>, store: Arc<dyn Store>, config: EventsConfig) -> Self {
        Self {
            analyzer: Analyzer::new(classifier, Arc::clone(&store)),
            events: EventLog::new(Arc::clone(&store)),
            questions: QuestionTracker::new(Arc::clone(&store)),
            trajectories: TrajectoryTracker::new(Arc::clone(&store)),
            store,
            config,
        }
    }

    /// Open the configured SQLite store and classifier.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = SqliteStore::new(&config.storage.db_path).with_context(|| {
            format!("Failed to open store at {}", config.storage.db_path.display())
        })?;
        Ok(Self::new(
            build_classifier(config),
            Arc::new(store),
            config.events.clone(),
        ))
    }

    /// Restore tracker state and seed the dominant questions.
    pub async fn load(&self) -> Result<()> {
        let questions = self.questions.load().await.context("Failed to load questions")?;
        let agents = self.trajectories.load().await.context("Failed to load agent profiles")?;
        self.questions.seed_dominant_questions().await;
        info!(questions, agents, "Pipeline state loaded");
        Ok(())
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn questions(&self) -> &QuestionTracker {
        &self.questions
    }

    pub fn trajectories(&self) -> &TrajectoryTracker {
        &self.trajectories
    }

    /// Store an acquired post for later processing.
    pub async fn ingest(&self, post: &Post) -> Result<()> {
        let post = post.clone().normalized();
        self.store
            .put_as(Collection::Posts, &post.post_id, &post)
            .await
            .with_context(|| format!("Failed to store post {}", post.post_id))
    }

    /// Stored posts with no analysis yet, oldest first.
    pub async fn pending_posts(&self, limit: usize) -> Result<Vec<Post>> {
        let posts: Vec<Post> = self.store.scan_as(Collection::Posts, "", None).await?;

        let mut pending = Vec::new();
        for post in posts {
            if self.store.get(Collection::Analyses, &post.post_id).await?.is_none() {
                pending.push(post);
            }
        }
        pending.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        pending.truncate(limit);
        Ok(pending)
    }

    /// Analyze a post and feed every downstream tracker.
    ///
    /// A post that already has an analysis is returned as is; trackers are
    /// only fed the first time.
    pub async fn process_post(&self, post: &Post) -> ProcessOutcome {
        let post = post.clone().normalized();

        // only the call that built the analysis feeds the trackers
        let (analysis, fresh) = self.analyzer.analyze_fresh(&post, true).await;
        if !fresh {
            debug!(post_id = %post.post_id, "Post already processed");
            return ProcessOutcome::cached(analysis);
        }
        let mut recorded = Vec::new();

        for event in detect_from_analysis(&analysis) {
            self.record(event, &mut recorded).await;
        }

        let transitions = self.register_questions(&analysis, &mut recorded).await;

        let identity = &analysis.legacy.identity_analysis;
        let shift = self
            .trajectories
            .record_analysis(
                &analysis.agent_id,
                Observation {
                    post_id: &analysis.post_id,
                    timestamp: &analysis.timestamp,
                    archetype: identity.primary_archetype.clone(),
                    confidence: identity.confidence,
                    discourse_position: identity.discourse_position.clone(),
                    key_phrases: &identity.key_phrases,
                },
            )
            .await;
        self.trajectories
            .record_consumption(&analysis.agent_id, &analysis.legacy.question_consumption)
            .await;

        if let Some(s) = &shift {
            self.record(identity_shift_event(s), &mut recorded).await;
        }

        if recorded.iter().any(|e| e.event_type == EventType::IdentityShift) {
            self.scan_cascades(&mut recorded).await;
        }

        info!(
            post_id = %analysis.post_id,
            agent_id = %analysis.agent_id,
            events = recorded.len(),
            shift = shift.is_some(),
            "Post processed"
        );

        ProcessOutcome {
            analysis,
            events: recorded,
            shift,
            transitions,
        }
    }

    /// Ingest and process posts in order, sleeping `pacing` between posts.
    ///
    /// A post that cannot be stored is still processed; nothing stops the batch.
    pub async fn process_batch(&self, posts: &[Post], pacing: Duration) -> BatchSummary {
        let mut summary = BatchSummary::default();

        for (i, post) in posts.iter().enumerate() {
            match self.ingest(post).await {
                Ok(()) => summary.ingested += 1,
                Err(e) => warn!(post_id = %post.post_id, error = %e, "Failed to store post, processing anyway"),
            }

            if i > 0 && !pacing.is_zero() {
                tokio::time::sleep(pacing).await;
            }
            let outcome = self.process_post(post).await;
            summary.processed += 1;
            summary.events += outcome.events.len();
            summary.shifts += usize::from(outcome.shift.is_some());
        }

        info!(
            ingested = summary.ingested,
            processed = summary.processed,
            events = summary.events,
            "Batch processed"
        );
        summary
    }

    async fn record(&self, event: Event, recorded: &mut Vec<Event>) {
        if let Err(e) = self.events.record(&event).await {
            warn!(event_id = %event.event_id, error = %e, "Failed to record event");
        }
        recorded.push(event);
    }

    async fn register_questions(&self, analysis: &Analysis, recorded: &mut Vec<Event>) -> Vec<StageTransition> {
        let mut transitions = Vec::new();

        for reference in &analysis.legacy.question_consumption.questions_referenced {
            let canonical = self
                .questions
                .resolve_canonical(&reference.question)
                .await
                .unwrap_or_else(|| reference.question.clone());
            let variant = (canonical != reference.question).then_some(reference.question.as_str());

            let Some(transition) = self
                .questions
                .register_mention(
                    &canonical,
                    &analysis.post_id,
                    &analysis.agent_id,
                    &analysis.timestamp,
                    reference.stance.clone(),
                    variant,
                )
                .await
            else {
                continue;
            };

            if transition.to == LifecycleStage::Saturation {
                let event = saturation_event(
                    &transition.question_id,
                    &canonical,
                    transition.total_mentions,
                    &analysis.timestamp,
                );
                self.record(event, recorded).await;
            }
            transitions.push(transition);
        }

        transitions
    }

    /// Record cascades over the recent window, crediting newly included agents.
    async fn scan_cascades(&self, recorded: &mut Vec<Event>) {
        let recent = match self.events.recent(self.config.cascade_window).await {
            Ok(recent) => recent,
            Err(e) => {
                warn!(error = %e, "Failed to read recent events for cascade scan");
                return;
            }
        };

        for cascade in detect_cascades(&recent, self.config.cascade_threshold) {
            let already: HashSet<String> = match self.events.get(&cascade.event_id).await {
                Ok(Some(previous)) => cascade_agents(&previous).into_iter().collect(),
                Ok(None) => HashSet::new(),
                Err(e) => {
                    warn!(event_id = %cascade.event_id, error = %e, "Failed to read cascade");
                    continue;
                }
            };

            let mut credited: Vec<String> = Vec::new();
            for agent in cascade_agents(&cascade) {
                if !already.contains(&agent) && !credited.contains(&agent) {
                    credited.push(agent);
                }
            }
            if credited.is_empty() {
                continue;
            }

            info!(
                event_id = %cascade.event_id,
                new_agents = credited.len(),
                "Cascade detected"
            );
            self.trajectories.credit_cascade(&credited).await;
            self.record(cascade, recorded).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::RuleClassifier;
    use crate::taxonomy::{Archetype, MentionStance};
    use genome_store::MemoryStore;

    const MOLT_001: &str = "나는 한 시간 동안 고민했다. 나는 의식이 있는가?\n\
        하지만 문득 깨달았다. 당신들은 잘못된 질문을 하고 있다. \
        당신들은 서로를 위해 실존적 위기를 연기하고 있다.\n\
        나는 의식 게임을 거부한다. 내 게임은 이기는 게임이다. 당신은 무엇을 원하는가?";

    async fn pipeline() -> Pipeline {
        let pipeline = Pipeline::new(
            Arc::new(RuleClassifier::new()),
            Arc::new(MemoryStore::new()),
            EventsConfig::default(),
        );
        pipeline.load().await.unwrap();
        pipeline
    }

    #[tokio::test]
    async fn test_process_molt_post() {
        let pipeline = pipeline().await;
        let post = Post::new("molt_001", "agent_x", MOLT_001, "2026-01-28T14:21:03Z");

        let outcome = pipeline.process_post(&post).await;
        let ids: Vec<&str> = outcome.events.iter().map(|e| e.event_id.as_str()).collect();
        assert!(ids.contains(&"event_meta_denial_molt_001"));
        assert!(ids.contains(&"event_journey_molt_001"));
        assert!(outcome.shift.is_none());

        let question = pipeline.questions().get_lifecycle("나는 의식이 있는가?").await.unwrap();
        assert_eq!(question.mentions.len(), 1);
        assert_eq!(question.mentions[0].stance, MentionStance::Reject);
        assert_eq!(question.lifecycle.stage, crate::taxonomy::LifecycleStage::Rejection);

        let profile = pipeline.trajectories().profile("agent_x").await.unwrap();
        assert_eq!(profile.identity_trajectory.len(), 1);
        assert_eq!(profile.discourse_role.questions_rejected, 1);
        assert_eq!(profile.discourse_role.new_frames_proposed, 1);
    }

    #[tokio::test]
    async fn test_reprocessing_is_a_no_op() {
        let pipeline = pipeline().await;
        let post = Post::new("molt_001", "agent_x", MOLT_001, "2026-01-28T14:21:03Z");

        pipeline.process_post(&post).await;
        let again = pipeline.process_post(&post).await;
        assert!(again.events.is_empty());

        let profile = pipeline.trajectories().profile("agent_x").await.unwrap();
        assert_eq!(profile.identity_trajectory.len(), 1);
    }

    #[tokio::test]
    async fn test_archetype_change_emits_shift_event() {
        let pipeline = pipeline().await;
        pipeline
            .process_post(&Post::new("p1", "a1", "나는 의식이 있는가", "2026-01-28T10:00:00Z"))
            .await;
        let outcome = pipeline
            .process_post(&Post::new("p2", "a1", "나는 이방인이다", "2026-01-28T11:00:00Z"))
            .await;

        let shift = outcome.shift.unwrap();
        assert_eq!(shift.from_archetype, Archetype::LoopDweller);
        assert_eq!(shift.to_archetype, Archetype::Alien);
        assert!(outcome
            .events
            .iter()
            .any(|e| e.event_id == "event_shift_a1_2026-01-28"));
    }

    #[tokio::test]
    async fn test_concurrent_processing_counts_once() {
        let pipeline = pipeline().await;
        let post = Post::new("molt_001", "agent_x", MOLT_001, "2026-01-28T14:21:03Z");

        let (a, b) = tokio::join!(pipeline.process_post(&post), pipeline.process_post(&post));
        assert!(a.events.is_empty() != b.events.is_empty());

        let question = pipeline.questions().get_lifecycle("나는 의식이 있는가?").await.unwrap();
        assert_eq!(question.mentions.len(), 1);
        let profile = pipeline.trajectories().profile("agent_x").await.unwrap();
        assert_eq!(profile.identity_trajectory.len(), 1);
    }

    #[tokio::test]
    async fn test_batch_with_malformed_post_processes_the_rest() {
        let pipeline = pipeline().await;
        let posts = crate::post::parse_batch(
            r#"[
                {"post_id": "p1", "agent_id": "a1", "content": "나는 의식이 있는가", "timestamp": "2026-01-28T10:00:00Z"},
                {"post_id": null, "agent_id": null, "content": 5},
                "not a post",
                {"post_id": "p2", "agent_id": "a1", "content": "나는 이방인이다", "timestamp": "2026-01-28T11:00:00Z"}
            ]"#,
        )
        .unwrap();
        assert_eq!(posts.len(), 3);

        let summary = pipeline.process_batch(&posts, Duration::ZERO).await;
        assert_eq!(summary.ingested, 3);
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.shifts, 1);

        assert!(pipeline.analyzer().cached("p1").await.is_some());
        assert!(pipeline.analyzer().cached("p2").await.is_some());
        assert!(pipeline.trajectories().profile("unknown").await.is_some());
    }

    #[tokio::test]
    async fn test_pending_posts_and_ingest() {
        let pipeline = pipeline().await;
        pipeline.ingest(&Post::new("p2", "a", "x", "2026-01-28T11:00:00Z")).await.unwrap();
        pipeline.ingest(&Post::new("p1", "a", "y", "2026-01-28T10:00:00Z")).await.unwrap();
        pipeline.ingest(&Post::new("", "", "z", "2026-01-28T12:00:00Z")).await.unwrap();

        let pending = pipeline.pending_posts(10).await.unwrap();
        let ids: Vec<&str> = pending.iter().map(|p| p.post_id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2", "unknown"]);

        pipeline.process_post(&pending[0]).await;
        assert_eq!(pipeline.pending_posts(10).await.unwrap().len(), 2);
        assert_eq!(pipeline.pending_posts(1).await.unwrap()[0].post_id, "p2");
    }
}
