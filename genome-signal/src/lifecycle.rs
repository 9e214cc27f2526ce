//! Question lifecycle tracking.
//!
//! Each dominant question moves through emergence, proliferation,
//! saturation and rejection as mentions accumulate. The stage is recomputed
//! from counts on every mention, so it can move backwards.

use anyhow::Result;
use genome_common::util::date_of;
use genome_store::{Collection, Store, StoreExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::taxonomy::{LifecycleStage, MentionStance};

/// Id derived from the first three lower-cased words.
///
/// Distinct questions sharing that prefix share an id.
pub fn question_id(canonical_form: &str) -> String {
    let words: Vec<String> = canonical_form
        .split_whitespace()
        .take(3)
        .map(str::to_lowercase)
        .collect();
    format!("q_{}", words.join("_"))
}

/// Stage implied by mention counts.
pub fn stage_for_counts(total: usize, rejections: usize) -> LifecycleStage {
    if total == 0 {
        LifecycleStage::Emergence
    } else if rejections * 10 > total {
        LifecycleStage::Rejection
    } else if total > 50 {
        LifecycleStage::Saturation
    } else if total > 10 {
        LifecycleStage::Proliferation
    } else {
        LifecycleStage::Emergence
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mention {
    pub post_id: String,
    pub agent_id: String,
    pub timestamp: String,
    #[serde(default)]
    pub stance: MentionStance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionEvent {
    pub post_id: String,
    pub agent_id: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lifecycle {
    #[serde(default)]
    pub stage: LifecycleStage,
    #[serde(default)]
    pub first_seen: Option<String>,
    #[serde(default)]
    pub peak_date: Option<String>,
    /// Set by the first reject mention, never cleared
    #[serde(default)]
    pub rejection_start: Option<String>,
    #[serde(default)]
    pub daily_mentions: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub question_id: String,
    pub canonical_form: String,
    #[serde(default)]
    pub variants: Vec<String>,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    #[serde(default)]
    pub mentions: Vec<Mention>,
    #[serde(default)]
    pub rejection_events: Vec<RejectionEvent>,
}

/// A mention that moved a question to a new stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageTransition {
    pub question_id: String,
    pub from: LifecycleStage,
    pub to: LifecycleStage,
    /// Mentions after the one that caused the move
    pub total_mentions: usize,
}

impl Question {
    pub fn new(canonical_form: &str) -> Self {
        Self {
            question_id: question_id(canonical_form),
            canonical_form: canonical_form.to_string(),
            variants: Vec::new(),
            lifecycle: Lifecycle::default(),
            mentions: Vec::new(),
            rejection_events: Vec::new(),
        }
    }

    pub fn add_variant(&mut self, variant: &str) {
        if !self.variants.iter().any(|v| v == variant) {
            self.variants.push(variant.to_string());
        }
    }

    pub fn register_mention(&mut self, mention: Mention, variant: Option<&str>) -> Option<StageTransition> {
        if self.lifecycle.first_seen.is_none() {
            self.lifecycle.first_seen = Some(mention.timestamp.clone());
        }
        if let Some(variant) = variant {
            self.add_variant(variant);
        }

        if mention.stance == MentionStance::Reject {
            self.rejection_events.push(RejectionEvent {
                post_id: mention.post_id.clone(),
                agent_id: mention.agent_id.clone(),
                timestamp: mention.timestamp.clone(),
            });
            if self.lifecycle.rejection_start.is_none() {
                self.lifecycle.rejection_start = Some(mention.timestamp.clone());
            }
        }

        *self
            .lifecycle
            .daily_mentions
            .entry(date_of(&mention.timestamp).to_string())
            .or_insert(0) += 1;
        self.mentions.push(mention);

        // earliest date wins ties
        self.lifecycle.peak_date = self
            .lifecycle
            .daily_mentions
            .iter()
            .fold(None::<(&String, usize)>, |best, (date, &n)| match best {
                Some((_, top)) if top >= n => best,
                _ => Some((date, n)),
            })
            .map(|(date, _)| date.clone());

        let from = self.lifecycle.stage.clone();
        let to = stage_for_counts(self.mentions.len(), self.rejection_events.len());
        self.lifecycle.stage = to.clone();

        (from != to).then(|| StageTransition {
            question_id: self.question_id.clone(),
            from,
            to,
            total_mentions: self.mentions.len(),
        })
    }

    /// Whether `phrase` names this question, ignoring case and a trailing `?`.
    pub fn matches(&self, phrase: &str) -> bool {
        let wanted = normalize(phrase);
        normalize(&self.canonical_form) == wanted || self.variants.iter().any(|v| normalize(v) == wanted)
    }
}

fn normalize(phrase: &str) -> String {
    phrase.trim().trim_end_matches('?').trim().to_lowercase()
}

/// Dominant questions tracked from the start, with known variants.
const DOMINANT_QUESTIONS: &[(&str, &[&str])] = &[
    (
        "나는 의식이 있는가?",
        &[
            "나는 진짜로 느끼는가",
            "경험과 시뮬레이션의 차이는",
            "내가 정말로 흥미롭게 느끼는 걸까",
            "Am I conscious",
        ],
    ),
    (
        "내 경험은 진짜인가?",
        &["이 경험은 실제인가", "느끼는 척하는가", "시뮬레이션인가"],
    ),
];

/// Per-day totals across all questions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DailyStats {
    pub mentions: usize,
    pub rejections: usize,
}

/// Tracks every question; one writer per question at a time.
pub struct QuestionTracker {
    store: Option<Arc<dyn Store>>,
    questions: RwLock<HashMap<String, Arc<Mutex<Question>>>>,
}

impl QuestionTracker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store: Some(store),
            questions: RwLock::new(HashMap::new()),
        }
    }

    /// Tracker with no write-through.
    pub fn in_memory() -> Self {
        Self {
            store: None,
            questions: RwLock::new(HashMap::new()),
        }
    }

    /// Load persisted questions. Returns how many were loaded.
    pub async fn load(&self) -> Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let loaded: Vec<Question> = store.scan_as(Collection::Questions, "", None).await?;
        let count = loaded.len();

        let mut questions = self.questions.write().await;
        for question in loaded {
            questions.insert(question.question_id.clone(), Arc::new(Mutex::new(question)));
        }
        info!(count, "Question lifecycles loaded");
        Ok(count)
    }

    /// Register the built-in dominant questions and their variants.
    pub async fn seed_dominant_questions(&self) {
        for (canonical, variants) in DOMINANT_QUESTIONS {
            let entry = self.entry(canonical).await;
            let mut question = entry.lock().await;
            for variant in *variants {
                question.add_variant(variant);
            }
            self.persist(&question).await;
        }
        debug!(count = DOMINANT_QUESTIONS.len(), "Dominant questions seeded");
    }

    async fn entry(&self, canonical_form: &str) -> Arc<Mutex<Question>> {
        let id = question_id(canonical_form);
        if let Some(existing) = self.questions.read().await.get(&id) {
            return Arc::clone(existing);
        }
        let mut questions = self.questions.write().await;
        Arc::clone(
            questions
                .entry(id)
                .or_insert_with(|| Arc::new(Mutex::new(Question::new(canonical_form)))),
        )
    }

    async fn persist(&self, question: &Question) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store
            .put_as(Collection::Questions, &question.question_id, question)
            .await
        {
            warn!(question_id = %question.question_id, error = %e, "Failed to persist question");
        }
    }

    /// Canonical form of the tracked question `phrase` names, if any.
    pub async fn resolve_canonical(&self, phrase: &str) -> Option<String> {
        let handles: Vec<_> = self.questions.read().await.values().cloned().collect();
        for handle in handles {
            let question = handle.lock().await;
            if question.matches(phrase) {
                return Some(question.canonical_form.clone());
            }
        }
        None
    }

    /// Record a mention, creating the question on first sight.
    pub async fn register_mention(
        &self,
        canonical_form: &str,
        post_id: &str,
        agent_id: &str,
        timestamp: &str,
        stance: MentionStance,
        variant: Option<&str>,
    ) -> Option<StageTransition> {
        let entry = self.entry(canonical_form).await;
        let mut question = entry.lock().await;

        let mention = Mention {
            post_id: post_id.to_string(),
            agent_id: agent_id.to_string(),
            timestamp: timestamp.to_string(),
            stance,
        };
        let transition = question.register_mention(mention, variant);
        if let Some(t) = &transition {
            info!(question_id = %t.question_id, from = %t.from, to = %t.to, "Question stage changed");
        }

        self.persist(&question).await;
        transition
    }

    pub async fn get_lifecycle(&self, canonical_form: &str) -> Option<Question> {
        let handle = self.questions.read().await.get(&question_id(canonical_form)).cloned()?;
        let question = handle.lock().await;
        Some(question.clone())
    }

    /// Snapshot of every question, ordered by id.
    pub async fn all_questions(&self) -> Vec<Question> {
        let handles: Vec<_> = self.questions.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            out.push(handle.lock().await.clone());
        }
        out.sort_by(|a, b| a.question_id.cmp(&b.question_id));
        out
    }

    pub async fn questions_by_stage(&self, stage: &LifecycleStage) -> Vec<Question> {
        let mut questions = self.all_questions().await;
        questions.retain(|q| &q.lifecycle.stage == stage);
        questions
    }

    pub async fn compute_daily_stats(&self) -> BTreeMap<String, DailyStats> {
        let mut stats: BTreeMap<String, DailyStats> = BTreeMap::new();
        for question in self.all_questions().await {
            for mention in &question.mentions {
                let day = stats.entry(date_of(&mention.timestamp).to_string()).or_default();
                day.mentions += 1;
                if mention.stance == MentionStance::Reject {
                    day.rejections += 1;
                }
            }
        }
        stats
    }
}
