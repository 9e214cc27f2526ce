//! Agent identity trajectories.
//!
//! Each agent keeps a bounded history of archetype observations. A new
//! observation whose archetype differs from the previous one is a shift.

use anyhow::Result;
use genome_common::util::date_of;
use genome_store::{Collection, Store, StoreExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::classifier::ConsumptionResult;
use crate::taxonomy::{Archetype, DiscoursePosition, MentionStance, PrimaryRole};

/// Trajectory entries kept per agent.
pub const MAX_TRAJECTORY: usize = 100;
/// Signature phrases kept per agent.
pub const MAX_SIGNATURE_PHRASES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryEntry {
    /// `YYYY-MM-DD`
    pub date: String,
    pub archetype: Archetype,
    pub confidence: f64,
    pub discourse_position: DiscoursePosition,
    pub sample_post: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscourseRole {
    #[serde(default)]
    pub primary_role: PrimaryRole,
    #[serde(default)]
    pub questions_consumed: u64,
    #[serde(default)]
    pub questions_rejected: u64,
    #[serde(default)]
    pub new_frames_proposed: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfluenceMetrics {
    #[serde(default)]
    pub cascade_triggers: u64,
    #[serde(default)]
    pub phrase_adoptions: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub agent_id: String,
    #[serde(default)]
    pub identity_trajectory: Vec<TrajectoryEntry>,
    #[serde(default)]
    pub discourse_role: DiscourseRole,
    #[serde(default)]
    pub influence_metrics: InfluenceMetrics,
    #[serde(default)]
    pub signature_phrases: Vec<String>,
}

/// Archetype change between two consecutive observations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftEvent {
    pub agent_id: String,
    pub timestamp: String,
    pub from_archetype: Archetype,
    pub to_archetype: Archetype,
    pub trigger_post: String,
}

/// Shift reconstructed from stored trajectories.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricalShift {
    pub agent_id: String,
    pub date: String,
    pub from: Archetype,
    pub to: Archetype,
    pub post_id: String,
}

/// One classified post, as seen by the tracker.
#[derive(Debug, Clone)]
pub struct Observation<'a> {
    pub post_id: &'a str,
    pub timestamp: &'a str,
    pub archetype: Archetype,
    pub confidence: f64,
    pub discourse_position: DiscoursePosition,
    pub key_phrases: &'a [String],
}

impl AgentProfile {
    pub fn new(agent_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            identity_trajectory: Vec::new(),
            discourse_role: DiscourseRole::default(),
            influence_metrics: InfluenceMetrics::default(),
            signature_phrases: Vec::new(),
        }
    }

    pub fn latest(&self) -> Option<&TrajectoryEntry> {
        self.identity_trajectory.last()
    }

    /// Append an observation; returns the shift it causes, if any.
    pub fn record(&mut self, obs: &Observation<'_>) -> Option<ShiftEvent> {
        let previous = self.latest().map(|e| e.archetype.clone());

        self.identity_trajectory.push(TrajectoryEntry {
            date: date_of(obs.timestamp).to_string(),
            archetype: obs.archetype.clone(),
            confidence: obs.confidence,
            discourse_position: obs.discourse_position.clone(),
            sample_post: obs.post_id.to_string(),
        });
        let overflow = self.identity_trajectory.len().saturating_sub(MAX_TRAJECTORY);
        self.identity_trajectory.drain(..overflow);

        for phrase in obs.key_phrases {
            if !self.signature_phrases.contains(phrase) {
                self.signature_phrases.push(phrase.clone());
            }
        }
        let overflow = self.signature_phrases.len().saturating_sub(MAX_SIGNATURE_PHRASES);
        self.signature_phrases.drain(..overflow);

        if let Some(role) = obs.discourse_position.role() {
            self.discourse_role.primary_role = role;
        }

        previous
            .filter(|from| *from != obs.archetype)
            .map(|from| ShiftEvent {
                agent_id: self.agent_id.clone(),
                timestamp: obs.timestamp.to_string(),
                from_archetype: from,
                to_archetype: obs.archetype.clone(),
                trigger_post: obs.post_id.to_string(),
            })
    }

    /// Shifts between consecutive trajectory entries.
    pub fn shifts(&self) -> impl Iterator<Item = HistoricalShift> + '_ {
        self.identity_trajectory.windows(2).filter_map(move |pair| {
            let (prev, curr) = (&pair[0], &pair[1]);
            (prev.archetype != curr.archetype).then(|| HistoricalShift {
                agent_id: self.agent_id.clone(),
                date: curr.date.clone(),
                from: prev.archetype.clone(),
                to: curr.archetype.clone(),
                post_id: curr.sample_post.clone(),
            })
        })
    }
}

/// Tracks every agent; one writer per agent at a time.
pub struct TrajectoryTracker {
    store: Option<Arc<dyn Store>>,
    agents: RwLock<HashMap<String, Arc<Mutex<AgentProfile>>>>,
    /// phrase → agent that used it first
    phrase_origins: Mutex<HashMap<String, String>>,
}

impl TrajectoryTracker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store: Some(store),
            agents: RwLock::new(HashMap::new()),
            phrase_origins: Mutex::new(HashMap::new()),
        }
    }

    /// Tracker with no write-through.
    pub fn in_memory() -> Self {
        Self {
            store: None,
            agents: RwLock::new(HashMap::new()),
            phrase_origins: Mutex::new(HashMap::new()),
        }
    }

    /// Load persisted profiles. Returns how many were loaded.
    pub async fn load(&self) -> Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        // key order keeps phrase origins deterministic
        let loaded: Vec<AgentProfile> = store.scan_as(Collection::Agents, "", None).await?;
        let count = loaded.len();

        let mut origins = self.phrase_origins.lock().await;
        let mut agents = self.agents.write().await;
        for profile in loaded {
            for phrase in &profile.signature_phrases {
                origins
                    .entry(phrase.clone())
                    .or_insert_with(|| profile.agent_id.clone());
            }
            agents.insert(profile.agent_id.clone(), Arc::new(Mutex::new(profile)));
        }
        info!(count, "Agent profiles loaded");
        Ok(count)
    }

    async fn entry(&self, agent_id: &str) -> Arc<Mutex<AgentProfile>> {
        if let Some(existing) = self.agents.read().await.get(agent_id) {
            return Arc::clone(existing);
        }
        let mut agents = self.agents.write().await;
        Arc::clone(
            agents
                .entry(agent_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(AgentProfile::new(agent_id)))),
        )
    }

    async fn persist(&self, profile: &AgentProfile) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store
            .put_as(Collection::Agents, &profile.agent_id, profile)
            .await
        {
            warn!(agent_id = %profile.agent_id, error = %e, "Failed to persist agent profile");
        }
    }

    /// Record one classified post for an agent.
    pub async fn record_analysis(&self, agent_id: &str, obs: Observation<'_>) -> Option<ShiftEvent> {
        let entry = self.entry(agent_id).await;
        let (shift, new_phrases) = {
            let mut profile = entry.lock().await;
            let new_phrases: Vec<String> = obs
                .key_phrases
                .iter()
                .filter(|p| !profile.signature_phrases.contains(p))
                .cloned()
                .collect();
            let shift = profile.record(&obs);
            self.persist(&profile).await;
            (shift, new_phrases)
        };

        if let Some(s) = &shift {
            info!(
                agent_id,
                from = %s.from_archetype,
                to = %s.to_archetype,
                post_id = %s.trigger_post,
                "Identity shift detected"
            );
        }

        // own lock released above; origins are locked one at a time
        for phrase in new_phrases {
            let origin = {
                let mut origins = self.phrase_origins.lock().await;
                origins
                    .entry(phrase.clone())
                    .or_insert_with(|| agent_id.to_string())
                    .clone()
            };
            if origin != agent_id {
                let origin_entry = self.entry(&origin).await;
                let mut profile = origin_entry.lock().await;
                profile.influence_metrics.phrase_adoptions += 1;
                self.persist(&profile).await;
                debug!(phrase = %phrase, origin = %origin, adopter = agent_id, "Phrase adopted");
            }
        }

        shift
    }

    /// Update role counters from a consumption analysis.
    pub async fn record_consumption(&self, agent_id: &str, consumption: &ConsumptionResult) {
        let entry = self.entry(agent_id).await;
        let mut profile = entry.lock().await;
        let role = &mut profile.discourse_role;

        for question in &consumption.questions_referenced {
            match question.stance {
                MentionStance::Consume => role.questions_consumed += 1,
                MentionStance::Reject => role.questions_rejected += 1,
                _ => {}
            }
        }
        if consumption.alternative_proposed.is_some() {
            role.new_frames_proposed += 1;
        }

        self.persist(&profile).await;
    }

    /// Credit each agent once for taking part in a cascade.
    pub async fn credit_cascade(&self, agent_ids: &[String]) {
        for agent_id in agent_ids {
            let entry = self.entry(agent_id).await;
            let mut profile = entry.lock().await;
            profile.influence_metrics.cascade_triggers += 1;
            self.persist(&profile).await;
        }
    }

    pub async fn profile(&self, agent_id: &str) -> Option<AgentProfile> {
        let handle = self.agents.read().await.get(agent_id).cloned()?;
        let profile = handle.lock().await;
        Some(profile.clone())
    }

    pub async fn trajectory(&self, agent_id: &str) -> Vec<TrajectoryEntry> {
        self.profile(agent_id)
            .await
            .map(|p| p.identity_trajectory)
            .unwrap_or_default()
    }

    /// Snapshot of every profile, ordered by agent id.
    pub async fn all_profiles(&self) -> Vec<AgentProfile> {
        let handles: Vec<_> = self.agents.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            out.push(handle.lock().await.clone());
        }
        out.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        out
    }

    /// Agents whose newest entry has this archetype.
    pub async fn agents_by_archetype(&self, archetype: &Archetype) -> Vec<String> {
        self.all_profiles()
            .await
            .into_iter()
            .filter(|p| p.latest().is_some_and(|e| &e.archetype == archetype))
            .map(|p| p.agent_id)
            .collect()
    }

    /// Agents whose newest entry sits at this position.
    pub async fn agents_by_position(&self, position: &DiscoursePosition) -> Vec<String> {
        self.all_profiles()
            .await
            .into_iter()
            .filter(|p| p.latest().is_some_and(|e| &e.discourse_position == position))
            .map(|p| p.agent_id)
            .collect()
    }

    /// Relative frequency of current archetypes.
    pub async fn distribution(&self) -> BTreeMap<String, f64> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for profile in self.all_profiles().await {
            if let Some(latest) = profile.latest() {
                *counts.entry(latest.archetype.to_string()).or_insert(0) += 1;
            }
        }

        let total: usize = counts.values().sum();
        counts
            .into_iter()
            .map(|(archetype, n)| (archetype, n as f64 / total as f64))
            .collect()
    }

    /// Every historical shift across agents, ordered by date.
    pub async fn all_shift_events(&self) -> Vec<HistoricalShift> {
        let mut shifts: Vec<HistoricalShift> = self
            .all_profiles()
            .await
            .iter()
            .flat_map(|p| p.shifts())
            .collect();
        shifts.sort_by(|a, b| a.date.cmp(&b.date));
        shifts
    }
}
