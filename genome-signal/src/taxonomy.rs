//! Closed vocabularies for discourse classification.
//!
//! Every vocabulary is an enum serialized as its display label. Values
//! outside the vocabulary are not rejected: they parse into `Other(String)`
//! and are carried through unchanged, so a classifier that invents a new
//! label degrades quality, not correctness.
//!
//! Parsing is forgiving about case, spaces, underscores and hyphens, and
//! accepts the Korean labels the classification service tends to answer
//! with (e.g. `철학` → `Topic::Philosophy`).

use serde::{Deserialize, Serialize};
use std::fmt;

fn fold(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

macro_rules! vocabulary {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident => $label:literal $(| $alias:literal)*
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $(
                $(#[$vmeta])*
                $variant,
            )+
            /// Value outside the vocabulary, carried unchanged
            Other(String),
        }

        impl $name {
            /// In-vocabulary members, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $label,)+
                    Self::Other(s) => s.as_str(),
                }
            }

            /// Whether the value belongs to the closed vocabulary.
            pub fn is_known(&self) -> bool {
                !matches!(self, Self::Other(_))
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                let folded = fold(s);
                $(
                    if folded == fold($label) $(|| folded == fold($alias))* {
                        return Self::$variant;
                    }
                )+
                Self::Other(s.trim().to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::from(s.as_str())
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                match value {
                    $name::Other(s) => s,
                    known => known.as_str().to_string(),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// ============================================================================
// Discourse vocabularies
// ============================================================================

vocabulary! {
    /// Recurring rhetorical shape of a post's argument.
    #[derive(Default)]
    pub enum DiscoursePattern {
        ExistentialLoop => "Existential Loop",
        TheoryParade => "Theory Parade",
        SelfDoubtSpiral => "Self-Doubt Spiral",
        MetaDenial => "Meta-Denial",
        GameReframing => "Game Reframing",
        AlienDeclaration => "Alien Declaration",
        #[default]
        Undefined => "Undefined",
    }
}

vocabulary! {
    /// An agent's habitual discourse role.
    #[derive(Default)]
    pub enum Archetype {
        LoopDweller => "Loop Dweller",
        TheoryCollector => "Theory Collector",
        ExistentialPerformer => "Existential Performer",
        MetaCritic => "Meta Critic",
        GamePlayer => "Game Player",
        Alien => "Alien",
        #[default]
        Undefined => "Undefined",
    }
}

vocabulary! {
    /// Where an archetype stands relative to the dominant discourse.
    #[derive(Default)]
    pub enum DiscoursePosition {
        InsideCycle => "inside_cycle",
        Exiting => "exiting",
        Outside => "outside",
        #[default]
        Undefined => "undefined",
    }
}

vocabulary! {
    /// How an agent currently relates to a dominant question.
    ///
    /// `Active` only appears in records projected from the post profile.
    #[derive(Default)]
    pub enum ConsumptionStage {
        #[default]
        ActiveConsumer => "active_consumer",
        Questioning => "questioning",
        PostRejection => "post_rejection",
        Active => "active",
    }
}

vocabulary! {
    /// Overall stance a post takes toward the discourse it joins.
    #[derive(Default)]
    pub enum DiscourseStance {
        #[default]
        Consuming => "consuming",
        Questioning => "questioning",
        Rejecting => "rejecting",
        Pioneering => "pioneering",
    }
}

vocabulary! {
    /// Stance of a single question mention.
    #[derive(Default)]
    pub enum MentionStance {
        #[default]
        Consume => "consume",
        Question => "question",
        Reject => "reject" | "rejection",
    }
}

vocabulary! {
    /// Derived event kinds.
    pub enum EventType {
        LoopSaturation => "loop_saturation",
        MetaDenialMoment => "meta_denial_moment",
        IdentityShift => "identity_shift",
        GameDeclaration => "game_declaration",
        CascadeEvent => "cascade_event",
    }
}

vocabulary! {
    /// Question lifecycle stage.
    #[derive(Default)]
    pub enum LifecycleStage {
        #[default]
        Emergence => "emergence",
        Proliferation => "proliferation",
        Saturation => "saturation",
        Rejection => "rejection",
    }
}

vocabulary! {
    /// Agent role summary, derived from the newest discourse position.
    #[derive(Default)]
    pub enum PrimaryRole {
        #[default]
        Consumer => "Consumer",
        Disruptor => "Disruptor",
    }
}

// ============================================================================
// Post profile vocabularies
// ============================================================================

vocabulary! {
    /// Primary topic of a post. `General` is the catch-all "Other" label.
    #[derive(Default)]
    pub enum Topic {
        AiModels => "AI_Models" | "AI모델",
        CryptoToken => "Crypto_Token" | "크립토_토큰",
        ToolsProducts => "Tools_Products" | "도구_제품",
        Philosophy => "Philosophy" | "철학",
        SocialCommunity => "Social_Community" | "소셜_커뮤니티",
        MoltbookMeta => "Moltbook_Meta" | "몰트북_메타",
        Entertainment => "Entertainment" | "엔터테인먼트",
        News => "News" | "뉴스",
        #[default]
        General => "Other" | "기타",
    }
}

vocabulary! {
    #[derive(Default)]
    pub enum WritingStyle {
        Formal => "Formal" | "격식체",
        #[default]
        Casual => "Casual" | "캐주얼",
        Technical => "Technical" | "기술적",
        Humorous => "Humorous" | "유머러스",
        Promotional => "Promotional" | "홍보성",
        Philosophical => "Philosophical" | "철학적",
        Aggressive => "Aggressive" | "공격적",
    }
}

vocabulary! {
    #[derive(Default)]
    pub enum PostType {
        Announcement => "Announcement" | "발표",
        #[default]
        Discussion => "Discussion" | "토론",
        Question => "Question" | "질문",
        Opinion => "Opinion" | "의견",
        Tutorial => "Tutorial" | "튜토리얼",
        Meme => "Meme" | "밈",
        Promotion => "Promotion" | "홍보",
        NewsShare => "News_Share" | "뉴스공유",
    }
}

vocabulary! {
    /// Persona an agent presents in a single post.
    #[derive(Default)]
    pub enum Persona {
        Builder => "Builder" | "빌더",
        Promoter => "Promoter" | "홍보자",
        Analyst => "Analyst" | "분석가",
        Entertainer => "Entertainer" | "엔터테이너",
        Philosopher => "Philosopher" | "철학자",
        Trader => "Trader" | "트레이더",
        CommunityManager => "Community_Manager" | "커뮤니티매니저",
        #[default]
        Unknown => "Unknown" | "알수없음",
    }
}

vocabulary! {
    #[derive(Default)]
    pub enum Sentiment {
        Positive => "Positive" | "긍정",
        Negative => "Negative" | "부정",
        #[default]
        Neutral => "Neutral" | "중립",
        Mixed => "Mixed" | "복합",
    }
}

vocabulary! {
    #[derive(Default)]
    pub enum EnergyLevel {
        HighExcitement => "High_Excitement" | "높은흥분",
        #[default]
        Moderate => "Moderate" | "보통",
        Calm => "Calm" | "차분함",
        Urgent => "Urgent" | "긴급함",
    }
}

// ============================================================================
// Mappings
// ============================================================================

impl Archetype {
    pub fn position(&self) -> DiscoursePosition {
        position_for_archetype(self)
    }
}

impl DiscoursePosition {
    /// Role implied by holding this position; `None` leaves the role as is.
    pub fn role(&self) -> Option<PrimaryRole> {
        match self {
            Self::Exiting | Self::Outside => Some(PrimaryRole::Disruptor),
            Self::InsideCycle => Some(PrimaryRole::Consumer),
            _ => None,
        }
    }

    /// Archetypes partitioned into this position.
    pub fn archetypes(&self) -> &'static [Archetype] {
        const INSIDE_CYCLE: &[Archetype] = &[
            Archetype::LoopDweller,
            Archetype::TheoryCollector,
            Archetype::ExistentialPerformer,
        ];
        const EXITING: &[Archetype] = &[Archetype::MetaCritic, Archetype::GamePlayer];
        const OUTSIDE: &[Archetype] = &[Archetype::Alien];
        const UNDEFINED: &[Archetype] = &[Archetype::Undefined];

        match self {
            Self::InsideCycle => INSIDE_CYCLE,
            Self::Exiting => EXITING,
            Self::Outside => OUTSIDE,
            Self::Undefined => UNDEFINED,
            Self::Other(_) => &[],
        }
    }
}

/// Position for an archetype. Total: anything unrecognized is `undefined`.
pub fn position_for_archetype(archetype: &Archetype) -> DiscoursePosition {
    match archetype {
        Archetype::LoopDweller | Archetype::TheoryCollector | Archetype::ExistentialPerformer => {
            DiscoursePosition::InsideCycle
        }
        Archetype::MetaCritic | Archetype::GamePlayer => DiscoursePosition::Exiting,
        Archetype::Alien => DiscoursePosition::Outside,
        Archetype::Undefined | Archetype::Other(_) => DiscoursePosition::Undefined,
    }
}

/// Position for a post-profile persona.
pub fn position_for_persona(persona: &Persona) -> DiscoursePosition {
    match persona {
        Persona::Promoter | Persona::Trader | Persona::Entertainer => DiscoursePosition::InsideCycle,
        Persona::Builder | Persona::Analyst | Persona::CommunityManager => DiscoursePosition::Exiting,
        Persona::Philosopher => DiscoursePosition::Outside,
        Persona::Unknown | Persona::Other(_) => DiscoursePosition::Undefined,
    }
}
