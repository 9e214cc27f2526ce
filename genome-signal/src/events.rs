//! Derived discourse events.
//!
//! Per-analysis rules are stateless; cascade detection is a scan over a
//! window of recent events. Event ids are deterministic, so re-recording
//! an event overwrites it instead of duplicating it.

use anyhow::Result;
use genome_common::util::{date_of, hour_of};
use genome_store::{Collection, Store, StoreExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::analyzer::Analysis;
use crate::taxonomy::{DiscoursePattern, EventType};
use crate::trajectory::ShiftEvent;

/// Identity shifts within one clock hour that make a cascade.
pub const DEFAULT_CASCADE_THRESHOLD: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub details: Value,
}

impl Event {
    fn for_analysis(event_id: String, event_type: EventType, analysis: &Analysis, details: Value) -> Self {
        Self {
            event_id,
            event_type,
            timestamp: analysis.timestamp.clone(),
            post_id: Some(analysis.post_id.clone()),
            agent_id: Some(analysis.agent_id.clone()),
            details,
        }
    }
}

/// Events implied by a single analysis. Each rule fires independently.
pub fn detect_from_analysis(analysis: &Analysis) -> Vec<Event> {
    let legacy = &analysis.legacy;
    let mut detected = Vec::new();

    let meta = &legacy.meta_denial_analysis;
    if meta.is_meta_denial {
        detected.push(Event::for_analysis(
            format!("event_meta_denial_{}", analysis.post_id),
            EventType::MetaDenialMoment,
            analysis,
            json!({
                "denied_discourse": meta.denied_discourse,
                "denial_phrase": meta.denial_phrase,
                "alternative_proposed": meta.alternative_proposed,
            }),
        ));
    }

    let discourse = &legacy.discourse_analysis;
    if discourse.dominant_pattern == DiscoursePattern::GameReframing {
        detected.push(Event::for_analysis(
            format!("event_game_{}", analysis.post_id),
            EventType::GameDeclaration,
            analysis,
            json!({ "patterns": discourse.patterns_detected }),
        ));
    }

    let journey = &legacy.journey_analysis;
    if journey.journey_detected {
        detected.push(Event::for_analysis(
            format!("event_journey_{}", analysis.post_id),
            EventType::IdentityShift,
            analysis,
            json!({
                "from": journey.start_archetype,
                "to": journey.end_archetype,
                "trigger": journey.transition.trigger_phrase,
                "arc": journey.narrative_arc,
            }),
        ));
    }

    if !detected.is_empty() {
        debug!(post_id = %analysis.post_id, count = detected.len(), "Events detected");
    }
    detected
}

/// Identity-shift events bucketed by `YYYY-MM-DDTHH`, in first-seen order.
fn hourly_shifts(events: &[Event]) -> Vec<(&str, Vec<&Event>)> {
    let mut buckets: Vec<(&str, Vec<&Event>)> = Vec::new();
    for event in events.iter().filter(|e| e.event_type == EventType::IdentityShift) {
        let hour = hour_of(&event.timestamp);
        match buckets.iter_mut().find(|(h, _)| *h == hour) {
            Some((_, shifts)) => shifts.push(event),
            None => buckets.push((hour, vec![event])),
        }
    }
    buckets
}

fn cascade_event(hour: &str, shifts: &[&Event]) -> Event {
    Event {
        event_id: format!("event_cascade_{hour}"),
        event_type: EventType::CascadeEvent,
        timestamp: format!("{hour}:00:00Z"),
        post_id: None,
        agent_id: None,
        details: json!({
            "agents_shifted": shifts.len(),
            "shifts": shifts,
        }),
    }
}

/// Every hour bucket holding at least `threshold` identity shifts.
pub fn detect_cascades(recent_events: &[Event], threshold: usize) -> Vec<Event> {
    hourly_shifts(recent_events)
        .into_iter()
        .filter(|(_, shifts)| shifts.len() >= threshold)
        .map(|(hour, shifts)| cascade_event(hour, &shifts))
        .collect()
}

/// The first qualifying hour bucket, if any.
pub fn detect_cascade(recent_events: &[Event], threshold: usize) -> Option<Event> {
    hourly_shifts(recent_events)
        .into_iter()
        .find(|(_, shifts)| shifts.len() >= threshold)
        .map(|(hour, shifts)| cascade_event(hour, &shifts))
}

/// Agents referenced by a cascade event's shifts.
pub fn cascade_agents(cascade: &Event) -> Vec<String> {
    cascade
        .details
        .get("shifts")
        .and_then(Value::as_array)
        .map(|shifts| {
            shifts
                .iter()
                .filter_map(|s| s.get("agent_id").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Event for an archetype change seen across an agent's posts.
///
/// Keyed by agent and day: two shifts by one agent on one day share an id.
pub fn identity_shift_event(shift: &ShiftEvent) -> Event {
    Event {
        event_id: format!("event_shift_{}_{}", shift.agent_id, date_of(&shift.timestamp)),
        event_type: EventType::IdentityShift,
        timestamp: shift.timestamp.clone(),
        post_id: None,
        agent_id: Some(shift.agent_id.clone()),
        details: json!({
            "from": shift.from_archetype,
            "to": shift.to_archetype,
            "trigger_post": shift.trigger_post,
        }),
    }
}

/// Event for a question reaching saturation.
pub fn saturation_event(question_id: &str, canonical_form: &str, total_mentions: usize, timestamp: &str) -> Event {
    Event {
        event_id: format!("event_saturation_{question_id}"),
        event_type: EventType::LoopSaturation,
        timestamp: timestamp.to_string(),
        post_id: None,
        agent_id: None,
        details: json!({
            "question_id": question_id,
            "canonical_form": canonical_form,
            "total_mentions": total_mentions,
        }),
    }
}

// ============================================================================
// Event log
// ============================================================================

/// Append-only, store-backed event log.
pub struct EventLog {
    store: Arc<dyn Store>,
}

impl EventLog {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Upsert by id.
    pub async fn record(&self, event: &Event) -> Result<()> {
        self.store
            .put_as(Collection::Events, &event.event_id, event)
            .await?;
        info!(event_id = %event.event_id, event_type = %event.event_type, "Event recorded");
        Ok(())
    }

    pub async fn get(&self, event_id: &str) -> Result<Option<Event>> {
        self.store.get_as(Collection::Events, event_id).await
    }

    /// All events, oldest first.
    pub async fn timeline(&self) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = self.store.scan_as(Collection::Events, "", None).await?;
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(events)
    }

    pub async fn by_type(&self, event_type: &EventType) -> Result<Vec<Event>> {
        let mut events = self.timeline().await?;
        events.retain(|e| &e.event_type == event_type);
        Ok(events)
    }

    /// Events whose timestamp starts with `prefix` (e.g. `2026-01-28`).
    pub async fn by_date(&self, prefix: &str) -> Result<Vec<Event>> {
        let mut events = self.timeline().await?;
        events.retain(|e| e.timestamp.starts_with(prefix));
        Ok(events)
    }

    /// Newest `limit` events, newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<Event>> {
        let mut events = self.timeline().await?;
        events.reverse();
        events.truncate(limit);
        Ok(events)
    }
}
