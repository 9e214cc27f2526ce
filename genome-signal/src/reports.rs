//! Read-only aggregate views for presentation.

use anyhow::Result;
use genome_store::{Collection, Store, StoreExt};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::analyzer::Analysis;
use crate::events::Event;
use crate::lifecycle::DailyStats;
use crate::pipeline::Pipeline;
use crate::taxonomy::{EventType, LifecycleStage};
use crate::trajectory::{AgentProfile, HistoricalShift};

/// A label and how often it occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Count {
    pub label: String,
    pub count: usize,
}

/// Most frequent first; ties keep first-seen order.
fn tally<'a>(labels: impl Iterator<Item = &'a str>) -> Vec<Count> {
    let mut counts: Vec<Count> = Vec::new();
    for label in labels {
        match counts.iter_mut().find(|c| c.label == label) {
            Some(c) => c.count += 1,
            None => counts.push(Count {
                label: label.to_string(),
                count: 1,
            }),
        }
    }
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyReport {
    pub window: usize,
    pub topics: Vec<Count>,
    pub writing_styles: Vec<Count>,
    pub personas: Vec<Count>,
    pub sentiments: Vec<Count>,
}

pub fn frequency_report(analyses: &[Analysis]) -> FrequencyReport {
    FrequencyReport {
        window: analyses.len(),
        topics: tally(analyses.iter().map(|a| a.profile.topic.primary_topic.as_str())),
        writing_styles: tally(analyses.iter().map(|a| a.profile.style.writing_style.as_str())),
        personas: tally(analyses.iter().map(|a| a.profile.persona.persona.as_str())),
        sentiments: tally(analyses.iter().map(|a| a.profile.sentiment.sentiment.as_str())),
    }
}

/// The newest `window` analyses by analysis time.
pub async fn recent_analyses(store: &dyn Store, window: usize) -> Result<Vec<Analysis>> {
    let mut analyses: Vec<Analysis> = store.scan_as(Collection::Analyses, "", None).await?;
    analyses.sort_by(|a, b| b.analyzed_at.cmp(&a.analyzed_at));
    analyses.truncate(window);
    Ok(analyses)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Overview {
    pub posts: usize,
    pub analyses: usize,
    pub events: usize,
    pub questions: usize,
    pub agents: usize,
}

pub async fn overview(store: &dyn Store) -> Result<Overview> {
    Ok(Overview {
        posts: store.count(Collection::Posts).await?,
        analyses: store.count(Collection::Analyses).await?,
        events: store.count(Collection::Events).await?,
        questions: store.count(Collection::Questions).await?,
        agents: store.count(Collection::Agents).await?,
    })
}

/// Optional narrowing of the event timeline.
#[derive(Debug, Clone, Default)]
pub struct TimelineFilter {
    pub event_type: Option<EventType>,
    /// Timestamp prefix, e.g. `2026-01-28`
    pub date: Option<String>,
}

pub async fn timeline(pipeline: &Pipeline, filter: &TimelineFilter) -> Result<Vec<Event>> {
    let mut events = pipeline.events().timeline().await?;
    if let Some(event_type) = &filter.event_type {
        events.retain(|e| &e.event_type == event_type);
    }
    if let Some(date) = &filter.date {
        events.retain(|e| e.timestamp.starts_with(date.as_str()));
    }
    Ok(events)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionSummary {
    pub question_id: String,
    pub canonical_form: String,
    pub mentions: usize,
    pub rejections: usize,
    pub peak_date: Option<String>,
}

/// Every lifecycle stage, including empty ones.
pub async fn questions_by_stage(pipeline: &Pipeline) -> BTreeMap<String, Vec<QuestionSummary>> {
    let mut by_stage: BTreeMap<String, Vec<QuestionSummary>> = LifecycleStage::ALL
        .iter()
        .map(|stage| (stage.to_string(), Vec::new()))
        .collect();

    for question in pipeline.questions().all_questions().await {
        by_stage
            .entry(question.lifecycle.stage.to_string())
            .or_default()
            .push(QuestionSummary {
                mentions: question.mentions.len(),
                rejections: question.rejection_events.len(),
                peak_date: question.lifecycle.peak_date,
                question_id: question.question_id,
                canonical_form: question.canonical_form,
            });
    }
    by_stage
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentReport {
    pub profile: AgentProfile,
    pub shifts: Vec<HistoricalShift>,
}

pub async fn agent_report(pipeline: &Pipeline, agent_id: &str) -> Option<AgentReport> {
    let profile = pipeline.trajectories().profile(agent_id).await?;
    let shifts = profile.shifts().collect();
    Some(AgentReport { profile, shifts })
}

/// Everything the `report` command prints.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub overview: Overview,
    pub frequencies: FrequencyReport,
    pub archetype_distribution: BTreeMap<String, f64>,
    pub questions_by_stage: BTreeMap<String, Vec<QuestionSummary>>,
    pub daily_question_stats: BTreeMap<String, DailyStats>,
    pub recent_events: Vec<Event>,
    pub recent_shifts: Vec<HistoricalShift>,
}

pub async fn build_report(pipeline: &Pipeline, window: usize) -> Result<Report> {
    let store = pipeline.store().as_ref();
    let analyses = recent_analyses(store, window).await?;

    let mut recent_shifts = pipeline.trajectories().all_shift_events().await;
    let keep_from = recent_shifts.len().saturating_sub(window);
    recent_shifts.drain(..keep_from);

    Ok(Report {
        overview: overview(store).await?,
        frequencies: frequency_report(&analyses),
        archetype_distribution: pipeline.trajectories().distribution().await,
        questions_by_stage: questions_by_stage(pipeline).await,
        daily_question_stats: pipeline.questions().compute_daily_stats().await,
        recent_events: pipeline.events().recent(window).await?,
        recent_shifts,
    })
}
