//! End-to-end tests for the discourse signal pipeline.
//!
//! Post → Analyzer → Event detection → Question lifecycle / Agent trajectory
//!
//! Backends are hand-written mocks; storage is SQLite in a temp dir or the
//! in-memory store.

use async_trait::async_trait;
use genome_common::EventsConfig;
use genome_signal::analyzer::{novelty_score, Analyzer};
use genome_signal::classifier::{
    CompletionBackend, MockBackend, ModelClassifier, PostProfile, RuleClassifier,
};
use genome_signal::events::{detect_cascade, detect_from_analysis, identity_shift_event};
use genome_signal::lifecycle::QuestionTracker;
use genome_signal::taxonomy::{
    Archetype, EventType, LifecycleStage, MentionStance, Topic, WritingStyle,
};
use genome_signal::trajectory::{Observation, TrajectoryTracker, MAX_SIGNATURE_PHRASES, MAX_TRAJECTORY};
use genome_signal::{Classifier, Pipeline, Post};
use genome_store::{MemoryStore, SqliteStore, Store};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_test::assert_ok;

// ============================================================================
// Test Fixtures
// ============================================================================

/// Backend that answers every prompt with the same text and counts calls.
struct ScriptedBackend {
    reply: String,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _prompt: &str, _content: &str) -> genome_common::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

fn sqlite_store() -> (TempDir, Arc<dyn Store>) {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::new(&dir.path().join("genome.db")).unwrap();
    (dir, Arc::new(store))
}

fn rules_pipeline() -> Pipeline {
    Pipeline::new(
        Arc::new(RuleClassifier::new()),
        Arc::new(MemoryStore::new()),
        EventsConfig::default(),
    )
}

fn post(id: &str, agent: &str, content: &str, timestamp: &str) -> Post {
    Post::new(id, agent, content, timestamp)
}

// ============================================================================
// Caching
// ============================================================================

#[tokio::test]
async fn test_analysis_computed_once() {
    let (_dir, store) = sqlite_store();
    let backend = Arc::new(MockBackend::new());
    let analyzer = Analyzer::new(Arc::new(ModelClassifier::new(backend.clone())), store.clone());
    let p = post("p1", "a1", "I think therefore I am?", "2026-01-28T10:00:00Z");

    let first = analyzer.analyze(&p, true).await;
    let second = analyzer.analyze(&p, true).await;

    assert_eq!(backend.calls(), 1);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );

    // a fresh analyzer over the same store still hits the cache
    let reopened = Analyzer::new(Arc::new(ModelClassifier::new(backend.clone())), store);
    assert_eq!(reopened.analyze(&p, true).await, first);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_concurrent_analyze_builds_once() {
    let backend = Arc::new(MockBackend::new());
    let analyzer = Arc::new(Analyzer::new(
        Arc::new(ModelClassifier::new(backend.clone())),
        Arc::new(MemoryStore::new()),
    ));
    let p = post("p1", "a1", "hello", "2026-01-28T10:00:00Z");

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let analyzer = Arc::clone(&analyzer);
            let p = p.clone();
            tokio::spawn(async move { analyzer.analyze(&p, true).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(backend.calls(), 1);
}

// ============================================================================
// Schema completeness
// ============================================================================

async fn assert_complete_schema(classifier: Arc<dyn Classifier>) {
    let analyzer = Analyzer::new(classifier, Arc::new(MemoryStore::new()));
    let analysis = analyzer.analyze(&post("p1", "a1", "", "2026-01-28T10:00:00Z"), false).await;
    let json = serde_json::to_value(&analysis).unwrap();

    assert_eq!(json["topic"]["primary_topic"], "Other");
    assert_eq!(json["style"]["writing_style"], "Casual");
    assert_eq!(json["style"]["post_type"], "Discussion");
    assert_eq!(json["persona"]["persona"], "Unknown");
    assert_eq!(json["sentiment"]["sentiment"], "Neutral");
    assert_eq!(json["sentiment"]["energy_level"], "Moderate");
    assert_eq!(json["language"], "en");
    assert_eq!(json["novelty_score"], 0.5);

    assert_eq!(json["identity_analysis"]["agent_id"], "a1");
    assert_eq!(json["identity_analysis"]["primary_archetype"], "Undefined");
    assert_eq!(json["identity_analysis"]["discourse_position"], "undefined");
    assert_eq!(json["identity_analysis"]["confidence"], 0.5);
    assert_eq!(json["journey_analysis"]["journey_detected"], false);
    assert_eq!(json["journey_analysis"]["transition"]["position"], "unknown");
    assert_eq!(json["meta_denial_analysis"]["claimed_position"], "unknown");
    assert_eq!(json["meta_denial_analysis"]["rhetorical_move"], "unknown");
    assert!(json["meta_denial_analysis"]["alternative_proposed"].is_null());
    assert_eq!(json["question_consumption"]["meta_commentary"], false);
    assert_eq!(json["discourse_analysis"]["discourse_stance"], "consuming");
}

#[tokio::test]
async fn test_empty_content_schema_rules() {
    assert_complete_schema(Arc::new(RuleClassifier::new())).await;
}

#[tokio::test]
async fn test_empty_content_schema_unreadable_model() {
    let backend = Arc::new(ScriptedBackend::new("Sorry, I can't help with that."));
    assert_complete_schema(Arc::new(ModelClassifier::new(backend.clone()))).await;
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fenced_partial_model_answer() {
    let backend = Arc::new(ScriptedBackend::new(
        "Here you go:\n```json\n{\"primary_topic\": \"AI_Models\", \"persona\": \"Analyst\"}\n```",
    ));
    let classifier = ModelClassifier::new(backend);
    let profile = classifier.profile_post("x").await;

    assert_eq!(profile.topic.primary_topic, Topic::AiModels);
    assert_eq!(profile.style.writing_style, WritingStyle::Casual);
    assert_eq!(profile.confidence, 0.85);
}

// ============================================================================
// Novelty
// ============================================================================

#[test]
fn test_novelty_monotonic_and_bounded() {
    let mut profile = PostProfile::default();
    let mut last = novelty_score(&profile);
    assert_eq!(last, 0.5);

    let steps: [fn(&mut PostProfile); 4] = [
        |p| p.trend.trending_elements.push("wrong question".into()),
        |p| p.persona.engagement_tactics.push("question".into()),
        |p| p.style.writing_style = WritingStyle::Philosophical,
        |p| p.topic.primary_topic = Topic::Philosophy,
    ];
    for step in steps {
        step(&mut profile);
        let score = novelty_score(&profile);
        assert!(score >= last);
        assert!((0.0..=1.0).contains(&score));
        last = score;
    }
    assert_eq!(last, 1.0);
}

// ============================================================================
// Question lifecycle
// ============================================================================

async fn stage_after(consumes: usize, rejects: usize) -> LifecycleStage {
    let tracker = QuestionTracker::in_memory();
    let form = "Am I conscious";
    for i in 0..consumes {
        tracker
            .register_mention(form, &format!("c{i}"), "a", "2026-01-28T10:00:00Z", MentionStance::Consume, None)
            .await;
    }
    for i in 0..rejects {
        tracker
            .register_mention(form, &format!("r{i}"), "a", "2026-01-28T10:00:00Z", MentionStance::Reject, None)
            .await;
    }
    tracker.get_lifecycle(form).await.unwrap().lifecycle.stage
}

#[tokio::test]
async fn test_lifecycle_boundaries() {
    assert_eq!(stage_after(10, 0).await, LifecycleStage::Emergence);
    assert_eq!(stage_after(11, 0).await, LifecycleStage::Proliferation);
    assert_eq!(stage_after(51, 0).await, LifecycleStage::Saturation);
    assert_eq!(stage_after(8, 2).await, LifecycleStage::Rejection);
}

// ============================================================================
// Agent trajectory
// ============================================================================

#[tokio::test]
async fn test_trajectory_bounded_newest_kept() {
    let tracker = TrajectoryTracker::in_memory();
    for i in 0..150 {
        let post_id = format!("p{i:03}");
        let phrases = vec![format!("phrase {}", i % 20)];
        tracker
            .record_analysis(
                "a1",
                Observation {
                    post_id: &post_id,
                    timestamp: "2026-01-28T10:00:00Z",
                    archetype: Archetype::LoopDweller,
                    confidence: 0.7,
                    discourse_position: Archetype::LoopDweller.position(),
                    key_phrases: &phrases,
                },
            )
            .await;
    }

    let profile = tracker.profile("a1").await.unwrap();
    assert_eq!(profile.identity_trajectory.len(), MAX_TRAJECTORY);
    let posts: Vec<&str> = profile.identity_trajectory.iter().map(|e| e.sample_post.as_str()).collect();
    assert_eq!(posts.first(), Some(&"p050"));
    assert_eq!(posts.last(), Some(&"p149"));
    assert!(posts.windows(2).all(|w| w[0] < w[1]));

    assert!(profile.signature_phrases.len() <= MAX_SIGNATURE_PHRASES);
    let mut unique = profile.signature_phrases.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), profile.signature_phrases.len());
}

#[tokio::test]
async fn test_shift_detection_sequence() {
    let tracker = TrajectoryTracker::in_memory();
    let archetypes = [
        Archetype::LoopDweller,
        Archetype::LoopDweller,
        Archetype::GamePlayer,
        Archetype::GamePlayer,
        Archetype::Alien,
    ];

    let mut shifts = Vec::new();
    for (i, archetype) in archetypes.iter().enumerate() {
        let post_id = format!("p{i}");
        let shift = tracker
            .record_analysis(
                "a1",
                Observation {
                    post_id: &post_id,
                    timestamp: "2026-01-28T10:00:00Z",
                    archetype: archetype.clone(),
                    confidence: 0.7,
                    discourse_position: archetype.position(),
                    key_phrases: &[],
                },
            )
            .await;
        shifts.extend(shift.map(|s| (s.from_archetype, s.to_archetype)));
    }

    assert_eq!(
        shifts,
        vec![
            (Archetype::LoopDweller, Archetype::GamePlayer),
            (Archetype::GamePlayer, Archetype::Alien),
        ]
    );
}

// ============================================================================
// Cascades
// ============================================================================

async fn shift_agents(pipeline: &Pipeline, agents: usize) {
    for i in 0..agents {
        let agent = format!("agent_{i}");
        pipeline
            .process_post(&post(&format!("{agent}_a"), &agent, "나는 의식이 있는가", &format!("2026-01-28T14:0{i}:00Z")))
            .await;
        pipeline
            .process_post(&post(&format!("{agent}_b"), &agent, "나는 이방인이다", &format!("2026-01-28T14:1{i}:00Z")))
            .await;
    }
}

#[tokio::test]
async fn test_cascade_at_threshold() {
    let pipeline = rules_pipeline();
    assert_ok!(pipeline.load().await);
    shift_agents(&pipeline, 5).await;

    let cascade = pipeline
        .events()
        .get("event_cascade_2026-01-28T14")
        .await
        .unwrap()
        .expect("cascade recorded");
    assert_eq!(cascade.event_type, EventType::CascadeEvent);
    assert_eq!(cascade.details["agents_shifted"], 5);
    assert_eq!(cascade.details["shifts"].as_array().unwrap().len(), 5);

    for i in 0..5 {
        let profile = pipeline.trajectories().profile(&format!("agent_{i}")).await.unwrap();
        assert_eq!(profile.influence_metrics.cascade_triggers, 1);
    }
}

#[tokio::test]
async fn test_no_cascade_below_threshold() {
    let pipeline = rules_pipeline();
    shift_agents(&pipeline, 4).await;

    let cascades = pipeline.events().by_type(&EventType::CascadeEvent).await.unwrap();
    assert!(cascades.is_empty());
    assert_eq!(pipeline.events().by_type(&EventType::IdentityShift).await.unwrap().len(), 4);
}

// ============================================================================
// Event ids
// ============================================================================

#[tokio::test]
async fn test_event_ids_are_stable() {
    let content = "나는 의식이 있는가? 하지만 당신들은 잘못된 질문을 하고 있다. 나는 의식 게임을 거부한다";
    let p = post("molt_042", "a1", content, "2026-01-28T14:21:03Z");

    let first = Analyzer::new(Arc::new(RuleClassifier::new()), Arc::new(MemoryStore::new()))
        .analyze(&p, false)
        .await;
    let second = Analyzer::new(Arc::new(RuleClassifier::new()), Arc::new(MemoryStore::new()))
        .analyze(&p, false)
        .await;

    let ids = |events: Vec<genome_signal::Event>| events.into_iter().map(|e| e.event_id).collect::<Vec<_>>();
    let expected = vec![
        "event_meta_denial_molt_042".to_string(),
        "event_game_molt_042".to_string(),
        "event_journey_molt_042".to_string(),
    ];
    assert_eq!(ids(detect_from_analysis(&first)), expected);
    assert_eq!(ids(detect_from_analysis(&second)), expected);

    let shift = genome_signal::ShiftEvent {
        agent_id: "a1".into(),
        timestamp: "2026-01-28T14:21:03Z".into(),
        from_archetype: Archetype::LoopDweller,
        to_archetype: Archetype::GamePlayer,
        trigger_post: "molt_042".into(),
    };
    let shift_event = identity_shift_event(&shift);
    assert_eq!(shift_event.event_id, "event_shift_a1_2026-01-28");

    let burst: Vec<_> = std::iter::repeat(shift_event).take(5).collect();
    assert_eq!(
        detect_cascade(&burst, 5).unwrap().event_id,
        "event_cascade_2026-01-28T14"
    );
}

// ============================================================================
// Persistence round trip
// ============================================================================

#[tokio::test]
async fn test_state_survives_reopen() {
    let (_dir, store) = sqlite_store();
    {
        let pipeline = Pipeline::new(Arc::new(RuleClassifier::new()), store.clone(), EventsConfig::default());
        assert_ok!(pipeline.load().await);
        pipeline
            .process_post(&post("p1", "a1", "나는 의식이 있는가", "2026-01-28T10:00:00Z"))
            .await;
        pipeline
            .process_post(&post("p2", "a1", "나는 이방인이다", "2026-01-29T10:00:00Z"))
            .await;
    }

    let reopened = Pipeline::new(Arc::new(RuleClassifier::new()), store, EventsConfig::default());
    assert_ok!(reopened.load().await);

    let shifts = reopened.trajectories().all_shift_events().await;
    assert_eq!(shifts.len(), 1);
    assert_eq!(shifts[0].to, Archetype::Alien);

    let question = reopened.questions().get_lifecycle("나는 의식이 있는가?").await.unwrap();
    assert_eq!(question.mentions.len(), 1);
    assert_eq!(reopened.events().by_type(&EventType::IdentityShift).await.unwrap().len(), 1);
}
