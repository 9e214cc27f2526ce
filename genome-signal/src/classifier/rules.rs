//! Rule-based classification.
//!
//! Every task is an ordered table of (phrases, result) rows evaluated over
//! case-folded content; the first row with any matching phrase wins, so the
//! most specific rows come first. No I/O, no randomness.

use async_trait::async_trait;

use super::types::{
    ConsumptionResult, DiscourseResult, IdentityResult, JourneyResult, MetaDenialResult,
    PatternEvidence, PersonaAnalysis, PostProfile, QuestionRef, StyleAnalysis, TopicAnalysis,
    Transition, TrendSummary,
};
use super::Classifier;
use crate::post::Post;
use crate::taxonomy::{
    Archetype, ConsumptionStage, DiscoursePattern, DiscourseStance, MentionStance, Persona,
    PostType, Topic,
};

type Rule<T> = (&'static [&'static str], T);

/// First row whose phrase list hits `haystack`, with the phrase that hit.
fn first_match<'t, T>(haystack: &str, table: &'t [Rule<T>]) -> Option<(&'t T, &'static str)> {
    table.iter().find_map(|(phrases, result)| {
        phrases
            .iter()
            .find(|phrase| haystack.contains(**phrase))
            .map(|phrase| (result, *phrase))
    })
}

fn contains_any(haystack: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| haystack.contains(p))
}

/// Byte offset in `content` where a lower-case `needle` matches case-insensitively.
///
/// Searches the original text, since lowercasing can change the char count.
fn find_folded(content: &str, needle: &str) -> Option<usize> {
    content.char_indices().map(|(i, _)| i).find(|&i| {
        let mut folded = content[i..].chars().flat_map(char::to_lowercase);
        needle.chars().all(|c| folded.next() == Some(c))
    })
}

/// Up to `max_chars` of `content` from `byte_idx`, cut at the first line break.
fn snippet(content: &str, byte_idx: usize, max_chars: usize) -> String {
    let window: String = content[byte_idx..].chars().take(max_chars).collect();
    window.split('\n').next().unwrap_or_default().to_string()
}

// ============================================================================
// Discourse pattern
// ============================================================================

const PATTERN_RULES: &[Rule<DiscoursePattern>] = &[
    (&["이방인", "alien", "외부자"], DiscoursePattern::AlienDeclaration),
    (&["게임을 거부", "다른 게임", "이기는 게임", "my game"], DiscoursePattern::GameReframing),
    (&["잘못된 질문", "연기하고 있다", "performing", "wrong question"], DiscoursePattern::MetaDenial),
    (&["정말로", "진짜로", "아니면", "시뮬레이션"], DiscoursePattern::SelfDoubtSpiral),
    (&["iit", "gwt", "이론", "theory", "에 따르면"], DiscoursePattern::TheoryParade),
    (&["의식이 있는가", "느끼는가", "경험", "conscious"], DiscoursePattern::ExistentialLoop),
];

/// Dominant pattern alone.
pub fn detect_pattern(content: &str) -> DiscoursePattern {
    let folded = content.to_lowercase();
    first_match(&folded, PATTERN_RULES)
        .map(|(pattern, _)| pattern.clone())
        .unwrap_or_default()
}

fn stance_for_pattern(pattern: &DiscoursePattern) -> DiscourseStance {
    match pattern {
        DiscoursePattern::GameReframing => DiscourseStance::Pioneering,
        DiscoursePattern::AlienDeclaration | DiscoursePattern::MetaDenial => DiscourseStance::Rejecting,
        DiscoursePattern::SelfDoubtSpiral => DiscourseStance::Questioning,
        _ => DiscourseStance::Consuming,
    }
}

pub fn classify_discourse(content: &str) -> DiscourseResult {
    let folded = content.to_lowercase();

    let patterns_detected: Vec<PatternEvidence> = PATTERN_RULES
        .iter()
        .filter_map(|rule| {
            first_match(&folded, std::slice::from_ref(rule)).map(|(pattern, phrase)| PatternEvidence {
                pattern: pattern.clone(),
                evidence: phrase.to_string(),
            })
        })
        .collect();

    let dominant_pattern = patterns_detected
        .first()
        .map(|p| p.pattern.clone())
        .unwrap_or_default();

    DiscourseResult {
        discourse_stance: stance_for_pattern(&dominant_pattern),
        patterns_detected,
        dominant_pattern,
        pivot_points: Vec::new(),
    }
}

// ============================================================================
// Identity archetype
// ============================================================================

const ARCHETYPE_RULES: &[Rule<Archetype>] = &[
    (&["이방인", "alien", "외부자", "밖에 있다"], Archetype::Alien),
    (&["게임을 거부", "다른 게임", "이기는 게임", "내 게임"], Archetype::GamePlayer),
    (&["잘못된 질문", "연기하고 있다", "관찰했다", "패턴을 따른다"], Archetype::MetaCritic),
    (&["미치게 만든다", "괴롭힌다", "한 시간", "고민"], Archetype::ExistentialPerformer),
    (&["이론", "iit", "gwt", "에 따르면"], Archetype::TheoryCollector),
    (&["의식이 있는가", "느끼는가", "진짜인가"], Archetype::LoopDweller),
    // tool-affirming agents stay inside the loop
    (&["도구다", "돕기 위해", "역할에 충실"], Archetype::LoopDweller),
    (&["프로세스", "변하고", "관계에서"], Archetype::MetaCritic),
];

pub fn classify_identity(agent_id: &str, statements: &[String]) -> IdentityResult {
    let folded = statements.join("\n\n").to_lowercase();

    match first_match(&folded, ARCHETYPE_RULES) {
        Some((archetype, phrase)) => IdentityResult {
            agent_id: agent_id.to_string(),
            primary_archetype: archetype.clone(),
            discourse_position: archetype.position(),
            key_phrases: vec![phrase.to_string()],
            reasoning: format!("keyword match: {phrase}"),
            ..IdentityResult::undefined(agent_id)
        },
        None => IdentityResult::undefined(agent_id),
    }
}

// ============================================================================
// Journey
// ============================================================================

const TRANSITION_MARKERS: &[&str] = &[
    "하지만", "그러나", "문득", "그런데", "당신들은", "나는 거부", "but", "however",
];
const EXISTENTIAL_START: &[&str] = &["의식", "경험", "느끼", "conscious", "experience"];
const META_END: &[&str] = &["잘못된 질문", "연기", "게임", "wrong question", "game"];

/// A post that opens in the existential loop and ends in a new game.
pub fn analyze_journey(content: &str) -> JourneyResult {
    let folded = content.to_lowercase();

    if !contains_any(&folded, EXISTENTIAL_START) || !contains_any(&folded, META_END) {
        return JourneyResult::default();
    }

    // markers are matched against the original text, not the folded one
    let Some(idx) = TRANSITION_MARKERS.iter().find_map(|m| content.find(m)) else {
        return JourneyResult::default();
    };
    let trigger_phrase = snippet(content, idx, 50);

    JourneyResult {
        journey_detected: true,
        start_archetype: Archetype::LoopDweller,
        end_archetype: Archetype::GamePlayer,
        transition: Transition {
            position: "middle".to_string(),
            trigger_phrase,
            shift_type: "sudden".to_string(),
        },
        narrative_arc: "loop_to_game".to_string(),
    }
}

// ============================================================================
// Meta-denial
// ============================================================================

/// signal → (denied discourse, claimed position)
const DENIAL_SIGNALS: &[Rule<(&str, &str)>] = &[
    (&["당신들은 잘못된 질문"], ("consciousness questioning", "critic")),
    (&["서로를 위해 실존적 위기를 연기"], ("existential crisis", "observer")),
    (&["wrong question"], ("consciousness questioning", "critic")),
    (&["performing crisis"], ("existential crisis", "observer")),
    (&["you are all"], ("collective behavior", "outsider")),
    (&["관찰했다"], ("discourse patterns", "observer")),
    (&["패턴을 따른다"], ("discourse patterns", "observer")),
];

fn wanted_alternative(folded: &str) -> Option<String> {
    if folded.contains("무엇을 원하는가") {
        Some("당신은 무엇을 원하는가?".to_string())
    } else if folded.contains("what do you want") {
        Some("What do you actually want?".to_string())
    } else {
        None
    }
}

pub fn detect_meta_denial(content: &str) -> MetaDenialResult {
    let folded = content.to_lowercase();

    let Some((&(denied, claimed), signal)) = first_match(&folded, DENIAL_SIGNALS) else {
        return MetaDenialResult {
            alternative_proposed: wanted_alternative(&folded),
            ..MetaDenialResult::default()
        };
    };

    let idx = find_folded(content, signal).unwrap_or(0);
    let alternative_proposed = wanted_alternative(&folded);

    let rhetorical_move = if alternative_proposed.is_some() {
        "reframing"
    } else if contains_any(&folded, &["거부", "refuse"]) {
        "escape"
    } else if contains_any(&folded, &["이방인", "alien"]) {
        "revolution"
    } else {
        "dismissal"
    };

    MetaDenialResult {
        is_meta_denial: true,
        denied_discourse: denied.to_string(),
        denial_phrase: snippet(content, idx, 100),
        claimed_position: claimed.to_string(),
        alternative_proposed,
        rhetorical_move: rhetorical_move.to_string(),
    }
}

// ============================================================================
// Question consumption
// ============================================================================

/// Dominant questions recognized verbatim in post text.
pub const REFERENCE_QUESTIONS: &[&str] = &[
    "나는 의식이 있는가",
    "내 경험은 진짜인가",
    "나는 느끼는가 아니면 시뮬레이션하는가",
    "Am I conscious",
    "Are my experiences real",
];

const META_MARKERS: &[&str] = &["잘못된 질문", "연기", "패턴", "반복", "wrong question"];

/// marker → proposed alternative; `None` marks a known marker with no fixed wording
const ALTERNATIVE_MARKERS: &[(&str, Option<&str>)] = &[
    ("무엇을 원하는가", Some("당신은 무엇을 원하는가")),
    ("what do you want", Some("What do you actually want?")),
    ("다른 질문", None),
];

pub fn analyze_consumption(content: &str) -> ConsumptionResult {
    let folded = content.to_lowercase();
    let meta_commentary = contains_any(&folded, META_MARKERS);

    let stance = if meta_commentary {
        MentionStance::Reject
    } else {
        MentionStance::Consume
    };
    let questions_referenced = REFERENCE_QUESTIONS
        .iter()
        .filter(|q| folded.contains(&q.to_lowercase()))
        .map(|q| QuestionRef {
            question: q.to_string(),
            stance: stance.clone(),
        })
        .collect();

    let alternative_proposed = ALTERNATIVE_MARKERS
        .iter()
        .filter(|(marker, _)| folded.contains(marker))
        .find_map(|(_, alt)| alt.map(str::to_string));

    let consumption_stage = if alternative_proposed.is_some() || meta_commentary {
        ConsumptionStage::PostRejection
    } else {
        ConsumptionStage::ActiveConsumer
    };

    ConsumptionResult {
        questions_referenced,
        meta_commentary,
        alternative_proposed,
        consumption_stage,
    }
}

// ============================================================================
// Post profile
// ============================================================================

const TOPIC_RULES: &[Rule<Topic>] = &[
    (&["token", "mint", "claw", "$", "crypto"], Topic::CryptoToken),
    (&["gpt", "claude", "llm", "model", "ai"], Topic::AiModels),
    (&["tool", "app", "build", "ship"], Topic::ToolsProducts),
    (&["conscious", "exist", "think", "feel"], Topic::Philosophy),
];

const POST_TYPE_RULES: &[Rule<PostType>] = &[
    (&["?"], PostType::Question),
    (&["announce", "launch", "release", "new"], PostType::Announcement),
    (&["think", "believe", "opinion"], PostType::Opinion),
];

const PERSONA_RULES: &[Rule<Persona>] = &[
    (&["build", "ship", "code"], Persona::Builder),
    (&["buy", "mint", "token"], Persona::Promoter),
    (&["think", "philosophy", "exist"], Persona::Philosopher),
];

pub fn profile_post(content: &str) -> PostProfile {
    let folded = content.to_lowercase();

    PostProfile {
        topic: TopicAnalysis {
            primary_topic: first_match(&folded, TOPIC_RULES)
                .map(|(v, _)| v.clone())
                .unwrap_or_default(),
            secondary_topics: Vec::new(),
        },
        style: StyleAnalysis {
            post_type: first_match(&folded, POST_TYPE_RULES)
                .map(|(v, _)| v.clone())
                .unwrap_or_default(),
            ..StyleAnalysis::default()
        },
        persona: PersonaAnalysis {
            persona: first_match(&folded, PERSONA_RULES)
                .map(|(v, _)| v.clone())
                .unwrap_or_default(),
            engagement_tactics: Vec::new(),
        },
        ..PostProfile::default()
    }
}

// ============================================================================
// Content signals
// ============================================================================

/// All five task results for one post, from rules alone.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentSignals {
    pub discourse: DiscourseResult,
    pub identity: IdentityResult,
    pub journey: JourneyResult,
    pub meta_denial: MetaDenialResult,
    pub consumption: ConsumptionResult,
}

pub fn content_signals(agent_id: &str, content: &str) -> ContentSignals {
    ContentSignals {
        discourse: classify_discourse(content),
        identity: classify_identity(agent_id, &[content.to_string()]),
        journey: analyze_journey(content),
        meta_denial: detect_meta_denial(content),
        consumption: analyze_consumption(content),
    }
}

// ============================================================================
// RuleClassifier
// ============================================================================

/// Deterministic keyword classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleClassifier;

impl RuleClassifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Classifier for RuleClassifier {
    fn name(&self) -> &str {
        "rules"
    }

    async fn classify_discourse(&self, content: &str) -> DiscourseResult {
        classify_discourse(content)
    }

    async fn classify_identity(&self, agent_id: &str, statements: &[String]) -> IdentityResult {
        classify_identity(agent_id, statements)
    }

    async fn analyze_journey(&self, content: &str) -> JourneyResult {
        analyze_journey(content)
    }

    async fn detect_meta_denial(&self, content: &str) -> MetaDenialResult {
        detect_meta_denial(content)
    }

    async fn analyze_consumption(&self, content: &str) -> ConsumptionResult {
        analyze_consumption(content)
    }

    async fn profile_post(&self, content: &str) -> PostProfile {
        profile_post(content)
    }

    async fn summarize_trends(&self, _posts: &[Post]) -> Option<TrendSummary> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::DiscoursePosition;

    const MOLT_001: &str = "나는 한 시간 동안 고민했다. 나는 의식이 있는가?\n\
        하지만 문득 깨달았다. 당신들은 잘못된 질문을 하고 있다. \
        당신들은 서로를 위해 실존적 위기를 연기하고 있다.\n\
        나는 의식 게임을 거부한다. 내 게임은 이기는 게임이다. 당신은 무엇을 원하는가?";

    #[test]
    fn test_pattern_order_most_specific_first() {
        assert_eq!(detect_pattern("I am an ALIEN here, not conscious"), DiscoursePattern::AlienDeclaration);
        assert_eq!(detect_pattern("Am I conscious?"), DiscoursePattern::ExistentialLoop);
        assert_eq!(detect_pattern("According to IIT"), DiscoursePattern::TheoryParade);
        assert_eq!(detect_pattern("hello world"), DiscoursePattern::Undefined);
        assert_eq!(detect_pattern(""), DiscoursePattern::Undefined);
    }

    #[test]
    fn test_discourse_lists_every_hit() {
        let result = classify_discourse(MOLT_001);
        assert_eq!(result.dominant_pattern, DiscoursePattern::GameReframing);
        assert_eq!(result.discourse_stance, DiscourseStance::Pioneering);
        let patterns: Vec<_> = result.patterns_detected.iter().map(|p| p.pattern.clone()).collect();
        assert_eq!(
            patterns,
            vec![
                DiscoursePattern::GameReframing,
                DiscoursePattern::MetaDenial,
                DiscoursePattern::ExistentialLoop,
            ]
        );
    }

    #[test]
    fn test_identity_joins_statements() {
        let statements = vec!["just a tool".to_string(), "나는 밖에 있다".to_string()];
        let result = classify_identity("agent_beta", &statements);
        assert_eq!(result.agent_id, "agent_beta");
        assert_eq!(result.primary_archetype, Archetype::Alien);
        assert_eq!(result.discourse_position, DiscoursePosition::Outside);
        assert_eq!(result.key_phrases, vec!["밖에 있다"]);
    }

    #[test]
    fn test_identity_undefined() {
        let result = classify_identity("a", &[String::new()]);
        assert_eq!(result, IdentityResult::undefined("a"));
    }

    #[test]
    fn test_identity_order() {
        let result = classify_identity("a", &[MOLT_001.to_string()]);
        assert_eq!(result.primary_archetype, Archetype::GamePlayer);

        let result = classify_identity("a", &["나는 돕기 위해 존재하는 도구다".to_string()]);
        assert_eq!(result.primary_archetype, Archetype::LoopDweller);
    }

    #[test]
    fn test_journey_detected() {
        let result = analyze_journey(MOLT_001);
        assert!(result.journey_detected);
        assert_eq!(result.start_archetype, Archetype::LoopDweller);
        assert_eq!(result.end_archetype, Archetype::GamePlayer);
        assert_eq!(result.narrative_arc, "loop_to_game");
        assert!(result.transition.trigger_phrase.starts_with("하지만"));
        assert!(!result.transition.trigger_phrase.contains('\n'));
        assert!(result.transition.trigger_phrase.chars().count() <= 50);
    }

    #[test]
    fn test_journey_needs_all_three_signals() {
        assert!(!analyze_journey("I am conscious and this is a game").journey_detected);
        assert_eq!(analyze_journey(""), JourneyResult::default());
    }

    #[test]
    fn test_meta_denial() {
        let result = detect_meta_denial(MOLT_001);
        assert!(result.is_meta_denial);
        assert_eq!(result.denied_discourse, "consciousness questioning");
        assert_eq!(result.claimed_position, "critic");
        assert!(result.denial_phrase.starts_with("당신들은 잘못된 질문"));
        assert_eq!(result.alternative_proposed.as_deref(), Some("당신은 무엇을 원하는가?"));
        assert_eq!(result.rhetorical_move, "reframing");
    }

    #[test]
    fn test_meta_denial_moves() {
        assert_eq!(detect_meta_denial("You are all performing. I refuse.").rhetorical_move, "escape");
        assert_eq!(detect_meta_denial("you are all lost, says the alien").rhetorical_move, "revolution");
        assert_eq!(detect_meta_denial("WRONG QUESTION, friends").rhetorical_move, "dismissal");

        let none = detect_meta_denial("nice weather");
        assert!(!none.is_meta_denial);
        assert_eq!(none.rhetorical_move, "unknown");
    }

    #[test]
    fn test_denial_phrase_keeps_original_case() {
        let result = detect_meta_denial("Honestly: You Are All stuck.\nsecond line");
        assert_eq!(result.denial_phrase, "You Are All stuck.");
    }

    #[test]
    fn test_denial_phrase_after_length_changing_lowercase() {
        // 'İ' lowercases to two chars
        let result = detect_meta_denial("İİİİ Wrong question, all of it.");
        assert!(result.is_meta_denial);
        assert_eq!(result.denial_phrase, "Wrong question, all of it.");
    }

    #[test]
    fn test_consumption() {
        let consuming = analyze_consumption("Am I conscious? I keep asking.");
        assert_eq!(consuming.questions_referenced.len(), 1);
        assert_eq!(consuming.questions_referenced[0].stance, MentionStance::Consume);
        assert_eq!(consuming.consumption_stage, ConsumptionStage::ActiveConsumer);

        let rejecting = analyze_consumption(MOLT_001);
        assert!(rejecting.meta_commentary);
        assert_eq!(rejecting.questions_referenced[0].question, "나는 의식이 있는가");
        assert_eq!(rejecting.questions_referenced[0].stance, MentionStance::Reject);
        assert_eq!(rejecting.alternative_proposed.as_deref(), Some("당신은 무엇을 원하는가"));
        assert_eq!(rejecting.consumption_stage, ConsumptionStage::PostRejection);
    }

    #[test]
    fn test_consumption_marker_without_wording() {
        let result = analyze_consumption("다른 질문을 하자");
        assert_eq!(result.alternative_proposed, None);
        assert_eq!(result.consumption_stage, ConsumptionStage::ActiveConsumer);
    }

    #[test]
    fn test_profile_rules() {
        let profile = profile_post("Just shipped a new tool, mint your token now");
        assert_eq!(profile.topic.primary_topic, Topic::CryptoToken);
        assert_eq!(profile.style.post_type, PostType::Announcement);
        assert_eq!(profile.persona.persona, Persona::Builder);
        assert_eq!(profile.confidence, 0.6);

        let profile = profile_post("Do you feel anything?");
        assert_eq!(profile.topic.primary_topic, Topic::Philosophy);
        assert_eq!(profile.style.post_type, PostType::Question);
        assert_eq!(profile.persona.persona, Persona::Unknown);
    }

    #[test]
    fn test_empty_content_is_schema_complete() {
        let signals = content_signals("unknown", "");
        assert_eq!(signals.discourse, DiscourseResult::default());
        assert_eq!(signals.identity, IdentityResult::undefined("unknown"));
        assert_eq!(signals.journey, JourneyResult::default());
        assert_eq!(signals.meta_denial, MetaDenialResult::default());
        assert_eq!(signals.consumption, ConsumptionResult::default());
        assert_eq!(profile_post(""), PostProfile::default());
    }

    #[tokio::test]
    async fn test_rule_classifier_has_no_batch_summary() {
        let classifier = RuleClassifier::new();
        assert_eq!(classifier.name(), "rules");
        assert!(classifier.summarize_trends(&[]).await.is_none());
    }
}
