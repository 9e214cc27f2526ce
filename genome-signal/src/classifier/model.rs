//! Model-backed classification.
//!
//! Each task renders its prompt, calls the completion backend and reads the
//! answer leniently. A failed call degrades to the rule-based result for
//! that call; an unreadable answer degrades to schema defaults merged with
//! whatever fields did parse.

use async_trait::async_trait;
use genome_common::util::{sanitize_for_log, take_chars, truncate_with_ellipsis};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use super::backend::CompletionBackend;
use super::json::{array_field, bool_field, object_field, str_field, string_list, unit_field};
use super::prompts::{
    CONSUMPTION_PROMPT, DISCOURSE_PROMPT, IDENTITY_PROMPT, JOURNEY_PROMPT, META_DENIAL_PROMPT,
    PROFILE_PROMPT, TRENDS_PROMPT,
};
use super::types::{
    ConsumptionResult, DiscourseResult, IdentityResult, JourneyResult, MetaDenialResult,
    PatternEvidence, PersonaAnalysis, PivotPoint, PostProfile, QuestionRef, SentimentAnalysis,
    StyleAnalysis, TopicAnalysis, Transition, TrendAnalysis, TrendSummary,
};
use super::{json, rules, Classifier};
use crate::post::Post;
use crate::taxonomy::{Archetype, DiscoursePattern};

/// Posts sampled for a batch trend summary.
const TREND_SAMPLE_POSTS: usize = 10;
/// Characters kept per sampled post.
const TREND_SAMPLE_CHARS: usize = 250;
/// Confidence attached to model-extracted profiles.
const MODEL_CONFIDENCE: f64 = 0.85;

pub struct ModelClassifier {
    backend: Arc<dyn CompletionBackend>,
}

impl ModelClassifier {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// `None` when the backend call itself failed.
    async fn request(&self, task: &'static str, prompt: &str, content: &str) -> Option<Map<String, Value>> {
        match self.backend.complete(prompt, content).await {
            Ok(text) => {
                let map = json::parse_object(&text);
                if map.is_empty() {
                    warn!(
                        task,
                        backend = self.backend.name(),
                        preview = %truncate_with_ellipsis(&sanitize_for_log(&text), 80),
                        "Unreadable classification response, using defaults"
                    );
                } else {
                    debug!(task, fields = map.len(), "Classification response parsed");
                }
                Some(map)
            }
            Err(e) => {
                warn!(
                    task,
                    backend = self.backend.name(),
                    error = %e,
                    "Classification backend failed, falling back to rules"
                );
                None
            }
        }
    }
}

#[async_trait]
impl Classifier for ModelClassifier {
    fn name(&self) -> &str {
        "model"
    }

    async fn classify_discourse(&self, content: &str) -> DiscourseResult {
        match self.request("discourse", DISCOURSE_PROMPT, content).await {
            Some(map) => parse_discourse(&map),
            None => rules::classify_discourse(content),
        }
    }

    async fn classify_identity(&self, agent_id: &str, statements: &[String]) -> IdentityResult {
        let content = statements.join("\n\n");
        match self.request("identity", IDENTITY_PROMPT, &content).await {
            Some(map) => parse_identity(agent_id, &map),
            None => rules::classify_identity(agent_id, statements),
        }
    }

    async fn analyze_journey(&self, content: &str) -> JourneyResult {
        match self.request("journey", JOURNEY_PROMPT, content).await {
            Some(map) => parse_journey(&map),
            None => rules::analyze_journey(content),
        }
    }

    async fn detect_meta_denial(&self, content: &str) -> MetaDenialResult {
        match self.request("meta_denial", META_DENIAL_PROMPT, content).await {
            Some(map) => parse_meta_denial(&map),
            None => rules::detect_meta_denial(content),
        }
    }

    async fn analyze_consumption(&self, content: &str) -> ConsumptionResult {
        match self.request("consumption", CONSUMPTION_PROMPT, content).await {
            Some(map) => parse_consumption(&map),
            None => rules::analyze_consumption(content),
        }
    }

    async fn profile_post(&self, content: &str) -> PostProfile {
        match self.request("profile", PROFILE_PROMPT, content).await {
            Some(map) => parse_profile(&map),
            None => rules::profile_post(content),
        }
    }

    async fn summarize_trends(&self, posts: &[Post]) -> Option<TrendSummary> {
        if posts.is_empty() {
            return None;
        }

        let combined = posts
            .iter()
            .take(TREND_SAMPLE_POSTS)
            .map(|p| take_chars(&p.content, TREND_SAMPLE_CHARS))
            .collect::<Vec<_>>()
            .join("\n---\n");

        self.request("trends", TRENDS_PROMPT, &combined)
            .await
            .map(|map| parse_trends(&map))
    }
}

// ============================================================================
// Response parsing
// ============================================================================

pub fn parse_discourse(map: &Map<String, Value>) -> DiscourseResult {
    let patterns_detected = array_field(map, &["patterns_detected"])
        .iter()
        .filter_map(|item| match item {
            Value::String(s) if !s.trim().is_empty() => Some(PatternEvidence {
                pattern: DiscoursePattern::from(s.as_str()),
                evidence: String::new(),
            }),
            Value::Object(obj) => str_field(obj, &["pattern", "name"]).map(|pattern| PatternEvidence {
                pattern: DiscoursePattern::from(pattern),
                evidence: str_field(obj, &["evidence"]).unwrap_or_default(),
            }),
            _ => None,
        })
        .collect();

    let pivot_points = array_field(map, &["pivot_points"])
        .iter()
        .filter_map(Value::as_object)
        .map(|obj| PivotPoint {
            position: obj.get("position").and_then(Value::as_u64).unwrap_or(0),
            from: str_field(obj, &["from"]).map(Into::into).unwrap_or_default(),
            to: str_field(obj, &["to"]).map(Into::into).unwrap_or_default(),
            trigger: str_field(obj, &["trigger"]).unwrap_or_default(),
        })
        .collect();

    DiscourseResult {
        patterns_detected,
        dominant_pattern: str_field(map, &["dominant_pattern"]).map(Into::into).unwrap_or_default(),
        pivot_points,
        discourse_stance: str_field(map, &["discourse_stance", "stance"])
            .map(Into::into)
            .unwrap_or_default(),
    }
}

/// `agent_id` always comes from the caller, never from the response.
pub fn parse_identity(agent_id: &str, map: &Map<String, Value>) -> IdentityResult {
    let primary_archetype: Archetype = str_field(map, &["primary_archetype", "archetype"])
        .map(Into::into)
        .unwrap_or_default();
    let discourse_position = str_field(map, &["discourse_position"])
        .map(Into::into)
        .unwrap_or_else(|| primary_archetype.position());

    IdentityResult {
        agent_id: agent_id.to_string(),
        secondary_archetype: str_field(map, &["secondary_archetype"]).map(Into::into),
        confidence: unit_field(map, &["confidence"]).unwrap_or(0.5),
        discourse_position,
        key_phrases: string_list(map, &["key_phrases"]),
        reasoning: str_field(map, &["reasoning"]).unwrap_or_default(),
        primary_archetype,
    }
}

pub fn parse_journey(map: &Map<String, Value>) -> JourneyResult {
    let defaults = Transition::default();
    let transition = match object_field(map, &["transition"]) {
        Some(obj) => Transition {
            position: str_field(obj, &["position"]).unwrap_or(defaults.position),
            trigger_phrase: str_field(obj, &["trigger_phrase", "trigger"]).unwrap_or_default(),
            shift_type: str_field(obj, &["shift_type"]).unwrap_or(defaults.shift_type),
        },
        None => defaults,
    };

    JourneyResult {
        journey_detected: bool_field(map, &["journey_detected"]).unwrap_or(false),
        start_archetype: str_field(map, &["start_archetype"]).map(Into::into).unwrap_or_default(),
        end_archetype: str_field(map, &["end_archetype"]).map(Into::into).unwrap_or_default(),
        transition,
        narrative_arc: str_field(map, &["narrative_arc"]).unwrap_or_else(|| "unknown".to_string()),
    }
}

pub fn parse_meta_denial(map: &Map<String, Value>) -> MetaDenialResult {
    let defaults = MetaDenialResult::default();
    MetaDenialResult {
        is_meta_denial: bool_field(map, &["is_meta_denial"]).unwrap_or(false),
        denied_discourse: str_field(map, &["denied_discourse"]).unwrap_or_default(),
        denial_phrase: str_field(map, &["denial_phrase"]).unwrap_or_default(),
        claimed_position: str_field(map, &["claimed_position"]).unwrap_or(defaults.claimed_position),
        alternative_proposed: str_field(map, &["alternative_proposed"]),
        rhetorical_move: str_field(map, &["rhetorical_move"]).unwrap_or(defaults.rhetorical_move),
    }
}

pub fn parse_consumption(map: &Map<String, Value>) -> ConsumptionResult {
    let questions_referenced = array_field(map, &["questions_referenced"])
        .iter()
        .filter_map(|item| match item {
            Value::String(s) if !s.trim().is_empty() => Some(QuestionRef {
                question: s.trim().to_string(),
                stance: Default::default(),
            }),
            Value::Object(obj) => str_field(obj, &["question"]).map(|question| QuestionRef {
                question,
                stance: str_field(obj, &["stance"]).map(Into::into).unwrap_or_default(),
            }),
            _ => None,
        })
        .collect();

    ConsumptionResult {
        questions_referenced,
        meta_commentary: bool_field(map, &["meta_commentary"]).unwrap_or(false),
        alternative_proposed: str_field(map, &["alternative_proposed"]),
        consumption_stage: str_field(map, &["consumption_stage"]).map(Into::into).unwrap_or_default(),
    }
}

/// Reads English keys, or the Korean keys the service sometimes mirrors back.
pub fn parse_profile(map: &Map<String, Value>) -> PostProfile {
    let defaults = PostProfile::default();
    PostProfile {
        topic: TopicAnalysis {
            primary_topic: str_field(map, &["primary_topic", "주요_토픽"]).map(Into::into).unwrap_or_default(),
            secondary_topics: string_list(map, &["secondary_topics", "부가_토픽"]),
        },
        style: StyleAnalysis {
            writing_style: str_field(map, &["writing_style", "글쓰기_스타일"]).map(Into::into).unwrap_or_default(),
            post_type: str_field(map, &["post_type", "게시글_유형"]).map(Into::into).unwrap_or_default(),
            emoji_usage: str_field(map, &["emoji_usage", "이모지_사용"]).unwrap_or(defaults.style.emoji_usage),
        },
        trend: TrendAnalysis {
            trending_elements: string_list(map, &["trending_elements", "트렌딩_요소"]),
            repeated_patterns: string_list(map, &["repeated_patterns", "반복_패턴"]),
        },
        persona: PersonaAnalysis {
            persona: str_field(map, &["persona", "agent_persona", "에이전트_페르소나"]).map(Into::into).unwrap_or_default(),
            engagement_tactics: string_list(map, &["engagement_tactics", "참여_유도_전략"]),
        },
        sentiment: SentimentAnalysis {
            sentiment: str_field(map, &["sentiment", "감성"]).map(Into::into).unwrap_or_default(),
            energy_level: str_field(map, &["energy_level", "에너지_레벨"]).map(Into::into).unwrap_or_default(),
        },
        language: str_field(map, &["language", "언어"]).unwrap_or(defaults.language),
        confidence: MODEL_CONFIDENCE,
    }
}

pub fn parse_trends(map: &Map<String, Value>) -> TrendSummary {
    TrendSummary {
        top_topics: string_list(map, &["top_topics", "인기_토픽"]),
        viral_elements: string_list(map, &["viral_elements", "바이럴_요소"]),
        writing_styles: string_list(map, &["writing_styles", "글쓰기_패턴"]),
        community_mood: str_field(map, &["community_mood", "커뮤니티_분위기"]).unwrap_or_else(|| "Mixed".to_string()),
        agent_types: string_list(map, &["agent_types", "활동중인_에이전트_유형"]),
    }
}
