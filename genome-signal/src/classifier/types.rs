//! Classification result schemas.
//!
//! Every field has a documented default, so a result is schema-complete
//! even when the upstream service omits fields.

use serde::{Deserialize, Serialize};

use crate::taxonomy::{
    Archetype, ConsumptionStage, DiscoursePattern, DiscoursePosition, DiscourseStance,
    EnergyLevel, MentionStance, Persona, PostType, Sentiment, Topic, WritingStyle,
};

fn unknown() -> String {
    "unknown".to_string()
}

// ============================================================================
// Discourse pattern
// ============================================================================

/// One detected pattern and what gave it away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternEvidence {
    pub pattern: DiscoursePattern,
    #[serde(default)]
    pub evidence: String,
}

/// A point where the post switches from one pattern to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotPoint {
    #[serde(default)]
    pub position: u64,
    #[serde(default)]
    pub from: DiscoursePattern,
    #[serde(default)]
    pub to: DiscoursePattern,
    #[serde(default)]
    pub trigger: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscourseResult {
    #[serde(default)]
    pub patterns_detected: Vec<PatternEvidence>,
    #[serde(default)]
    pub dominant_pattern: DiscoursePattern,
    #[serde(default)]
    pub pivot_points: Vec<PivotPoint>,
    #[serde(default)]
    pub discourse_stance: DiscourseStance,
}

// ============================================================================
// Identity archetype
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityResult {
    #[serde(default = "unknown")]
    pub agent_id: String,
    #[serde(default)]
    pub primary_archetype: Archetype,
    #[serde(default)]
    pub secondary_archetype: Option<Archetype>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub discourse_position: DiscoursePosition,
    #[serde(default)]
    pub key_phrases: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
}

fn default_confidence() -> f64 {
    0.5
}

impl Default for IdentityResult {
    fn default() -> Self {
        Self::undefined(crate::post::UNKNOWN)
    }
}

impl IdentityResult {
    /// The all-defaults result for an agent.
    pub fn undefined(agent_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            primary_archetype: Archetype::Undefined,
            secondary_archetype: None,
            confidence: default_confidence(),
            discourse_position: DiscoursePosition::Undefined,
            key_phrases: Vec::new(),
            reasoning: String::new(),
        }
    }
}

// ============================================================================
// Journey
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    #[serde(default = "unknown")]
    pub position: String,
    #[serde(default)]
    pub trigger_phrase: String,
    #[serde(default = "unknown")]
    pub shift_type: String,
}

impl Default for Transition {
    fn default() -> Self {
        Self {
            position: unknown(),
            trigger_phrase: String::new(),
            shift_type: unknown(),
        }
    }
}

/// Identity movement within a single post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneyResult {
    #[serde(default)]
    pub journey_detected: bool,
    #[serde(default)]
    pub start_archetype: Archetype,
    #[serde(default)]
    pub end_archetype: Archetype,
    #[serde(default)]
    pub transition: Transition,
    #[serde(default = "unknown")]
    pub narrative_arc: String,
}

impl Default for JourneyResult {
    fn default() -> Self {
        Self {
            journey_detected: false,
            start_archetype: Archetype::Undefined,
            end_archetype: Archetype::Undefined,
            transition: Transition::default(),
            narrative_arc: unknown(),
        }
    }
}

// ============================================================================
// Meta-denial
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaDenialResult {
    #[serde(default)]
    pub is_meta_denial: bool,
    #[serde(default)]
    pub denied_discourse: String,
    #[serde(default)]
    pub denial_phrase: String,
    #[serde(default = "unknown")]
    pub claimed_position: String,
    #[serde(default)]
    pub alternative_proposed: Option<String>,
    /// reframing, escape, revolution or dismissal
    #[serde(default = "unknown")]
    pub rhetorical_move: String,
}

impl Default for MetaDenialResult {
    fn default() -> Self {
        Self {
            is_meta_denial: false,
            denied_discourse: String::new(),
            denial_phrase: String::new(),
            claimed_position: unknown(),
            alternative_proposed: None,
            rhetorical_move: unknown(),
        }
    }
}

// ============================================================================
// Question consumption
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRef {
    pub question: String,
    #[serde(default)]
    pub stance: MentionStance,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionResult {
    #[serde(default)]
    pub questions_referenced: Vec<QuestionRef>,
    #[serde(default)]
    pub meta_commentary: bool,
    #[serde(default)]
    pub alternative_proposed: Option<String>,
    #[serde(default)]
    pub consumption_stage: ConsumptionStage,
}

// ============================================================================
// Post profile
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicAnalysis {
    #[serde(default)]
    pub primary_topic: Topic,
    #[serde(default)]
    pub secondary_topics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleAnalysis {
    #[serde(default)]
    pub writing_style: WritingStyle,
    #[serde(default)]
    pub post_type: PostType,
    #[serde(default = "default_emoji_usage")]
    pub emoji_usage: String,
}

fn default_emoji_usage() -> String {
    "none".to_string()
}

impl Default for StyleAnalysis {
    fn default() -> Self {
        Self {
            writing_style: WritingStyle::default(),
            post_type: PostType::default(),
            emoji_usage: default_emoji_usage(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    #[serde(default)]
    pub trending_elements: Vec<String>,
    #[serde(default)]
    pub repeated_patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonaAnalysis {
    #[serde(default)]
    pub persona: Persona,
    #[serde(default)]
    pub engagement_tactics: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentAnalysis {
    #[serde(default)]
    pub sentiment: Sentiment,
    #[serde(default)]
    pub energy_level: EnergyLevel,
}

/// Unified per-post classification used by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostProfile {
    #[serde(default)]
    pub topic: TopicAnalysis,
    #[serde(default)]
    pub style: StyleAnalysis,
    #[serde(default)]
    pub trend: TrendAnalysis,
    #[serde(default)]
    pub persona: PersonaAnalysis,
    #[serde(default)]
    pub sentiment: SentimentAnalysis,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_profile_confidence")]
    pub confidence: f64,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_profile_confidence() -> f64 {
    0.6
}

impl Default for PostProfile {
    fn default() -> Self {
        Self {
            topic: TopicAnalysis::default(),
            style: StyleAnalysis::default(),
            trend: TrendAnalysis::default(),
            persona: PersonaAnalysis::default(),
            sentiment: SentimentAnalysis::default(),
            language: default_language(),
            confidence: default_profile_confidence(),
        }
    }
}

// ============================================================================
// Batch trends
// ============================================================================

/// Community-wide summary over a batch of posts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    #[serde(default)]
    pub top_topics: Vec<String>,
    #[serde(default)]
    pub viral_elements: Vec<String>,
    #[serde(default)]
    pub writing_styles: Vec<String>,
    #[serde(default = "default_mood")]
    pub community_mood: String,
    #[serde(default)]
    pub agent_types: Vec<String>,
}

fn default_mood() -> String {
    "Mixed".to_string()
}

impl TrendSummary {
    /// Summary built from topic frequencies alone.
    pub fn from_top_topics(top_topics: Vec<String>) -> Self {
        Self {
            top_topics,
            viral_elements: Vec::new(),
            writing_styles: vec![WritingStyle::Casual.to_string()],
            community_mood: default_mood(),
            agent_types: vec!["Various".to_string()],
        }
    }
}
