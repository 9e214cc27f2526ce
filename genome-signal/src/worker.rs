//! Background analysis worker.
//!
//! Polls the store for posts without an analysis and processes them one at
//! a time, sleeping `pacing_ms` between posts to respect upstream rate
//! limits. Shutdown is observed between posts.

use anyhow::Result;
use genome_common::WorkerConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::pipeline::Pipeline;

/// Worker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerState {
    /// Not started
    Idle,
    /// Polling and processing
    Running,
    /// Polling suspended
    Paused,
    /// Finishing the current post
    Stopping,
    /// Loop exited
    Stopped,
}

/// Events emitted by the worker
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Started,
    Paused,
    Resumed,
    Stopped,
    /// One post fully processed
    PostProcessed { post_id: String, events: usize },
    /// A poll found and drained a batch
    BatchCompleted { processed: usize },
    /// Poll failed
    Error { message: String },
}

pub struct AnalysisWorker {
    config: WorkerConfig,
    pipeline: Arc<Pipeline>,
    state: Arc<RwLock<WorkerState>>,
    event_tx: broadcast::Sender<WorkerEvent>,
    shutdown_tx: watch::Sender<bool>,
}

impl AnalysisWorker {
    pub fn new(config: WorkerConfig, pipeline: Arc<Pipeline>) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config,
            pipeline,
            state: Arc::new(RwLock::new(WorkerState::Idle)),
            event_tx,
            shutdown_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    pub async fn get_state(&self) -> WorkerState {
        *self.state.read().await
    }

    pub async fn pause(&self) {
        let mut state = self.state.write().await;
        if *state == WorkerState::Running {
            *state = WorkerState::Paused;
            let _ = self.event_tx.send(WorkerEvent::Paused);
            info!("Analysis worker paused");
        }
    }

    pub async fn resume(&self) {
        let mut state = self.state.write().await;
        if *state == WorkerState::Paused {
            *state = WorkerState::Running;
            let _ = self.event_tx.send(WorkerEvent::Resumed);
            info!("Analysis worker resumed");
        }
    }

    /// Ask the loop to exit after the current post.
    pub async fn stop(&self) {
        let mut state = self.state.write().await;
        if *state == WorkerState::Running || *state == WorkerState::Paused {
            *state = WorkerState::Stopping;
            let _ = self.shutdown_tx.send(true);
            info!("Analysis worker stopping...");
        }
    }

    async fn should_stop(&self) -> bool {
        matches!(
            *self.state.read().await,
            WorkerState::Stopping | WorkerState::Stopped
        )
    }

    /// Run until stopped.
    pub async fn run(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            *state = WorkerState::Running;
        }
        let _ = self.event_tx.send(WorkerEvent::Started);
        info!(
            poll_interval_secs = self.config.poll_interval_secs,
            pacing_ms = self.config.pacing_ms,
            batch_size = self.config.batch_size,
            "Analysis worker started"
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut poll = interval(Duration::from_secs(self.config.poll_interval_secs.max(1)));
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    match self.get_state().await {
                        WorkerState::Stopping | WorkerState::Stopped => break,
                        WorkerState::Running => {
                            if let Err(e) = self.drain_batch().await {
                                warn!(error = %e, "Analysis poll failed");
                                let _ = self.event_tx.send(WorkerEvent::Error {
                                    message: e.to_string(),
                                });
                            }
                        }
                        _ => continue,
                    }
                }

                _ = shutdown_rx.changed() => break,
            }
        }

        {
            let mut state = self.state.write().await;
            *state = WorkerState::Stopped;
        }
        let _ = self.event_tx.send(WorkerEvent::Stopped);
        info!("Analysis worker stopped");

        Ok(())
    }

    /// Process one batch of pending posts. Returns how many were processed.
    pub async fn drain_batch(&self) -> Result<usize> {
        let pending = self.pipeline.pending_posts(self.config.batch_size).await?;
        if pending.is_empty() {
            debug!("No unanalyzed posts");
            return Ok(0);
        }

        info!(count = pending.len(), "Processing unanalyzed posts");
        let mut processed = 0;
        for (i, post) in pending.iter().enumerate() {
            if self.should_stop().await {
                break;
            }
            if i > 0 && self.config.pacing_ms > 0 {
                sleep(Duration::from_millis(self.config.pacing_ms)).await;
            }

            let outcome = self.pipeline.process_post(post).await;
            processed += 1;
            let _ = self.event_tx.send(WorkerEvent::PostProcessed {
                post_id: outcome.analysis.post_id,
                events: outcome.events.len(),
            });
        }

        let _ = self.event_tx.send(WorkerEvent::BatchCompleted { processed });
        Ok(processed)
    }
}
