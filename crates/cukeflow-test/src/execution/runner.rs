use crate::Result;
use crate::config::HarnessConfig;
use crate::execution::selector::{ResolvedStep, ScenarioExecution, Selection};
use crate::execution::state::{Attachment, RunRecord, RunTracker, StepFailure, StepOutcome, StepStatus};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Runs the body of one resolved step.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn run_step(&self, step: &ResolvedStep, attachments: &AttachmentSink) -> StepOutcome;
}

/// Handle a step implementation uses to attach data to the step it is running.
#[derive(Clone)]
pub struct AttachmentSink {
    tracker: Arc<RwLock<RunTracker>>,
}

impl AttachmentSink {
    pub async fn attach(&self, attachment: Attachment) {
        self.tracker.write().await.attach(attachment);
    }

    pub async fn attach_text(&self, text: impl Into<String>, media_type: impl Into<String>) {
        self.attach(Attachment::text(text, media_type)).await;
    }

    pub async fn attach_binary(&self, data: Vec<u8>, media_type: impl Into<String>) {
        self.attach(Attachment::binary(data, media_type)).await;
    }
}

/// Drives the scenarios of a selection through a [`StepExecutor`] and records
/// them in a [`RunTracker`].
pub struct FeatureRunner<E> {
    executor: Arc<E>,
    tracker: Arc<RwLock<RunTracker>>,
    step_timeout: Option<Duration>,
}

impl<E: StepExecutor> FeatureRunner<E> {
    pub fn new(executor: E) -> Self {
        Self::with_tracker(executor, RunTracker::new())
    }

    pub fn with_tracker(executor: E, tracker: RunTracker) -> Self {
        Self {
            executor: Arc::new(executor),
            tracker: Arc::new(RwLock::new(tracker)),
            step_timeout: None,
        }
    }

    /// Runner honouring the harness settings, currently `stepTimeoutMs`.
    pub fn from_config(executor: E, config: &HarnessConfig) -> Self {
        let runner = Self::new(executor);
        match config.step_timeout_ms {
            Some(ms) => runner.with_step_timeout(Duration::from_millis(ms)),
            None => runner,
        }
    }

    /// Steps running longer than `timeout` end the scenario with a harness failure.
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    pub async fn run_scenario(&self, execution: &ScenarioExecution) {
        self.tracker.write().await.start_scenario(execution.clone());
        let sink = AttachmentSink {
            tracker: self.tracker.clone(),
        };

        for (index, step) in execution.steps.iter().enumerate() {
            self.tracker.write().await.start_step(index);

            let outcome = match self.step_timeout {
                Some(timeout) => {
                    match tokio::time::timeout(timeout, self.executor.run_step(step, &sink)).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            warn!(step = %step.text, ?timeout, "Step timed out");
                            self.tracker.write().await.on_fatal_failure(StepFailure::harness(
                                format!("Step timed out after {} ms", timeout.as_millis()),
                            ));
                            break;
                        }
                    }
                }
                None => self.executor.run_step(step, &sink).await,
            };

            let stop = outcome.status().is_failure() || outcome.status() == StepStatus::Pending;
            self.tracker.write().await.finish_step(index, outcome);
            if stop {
                break;
            }
        }

        self.tracker.write().await.finish_scenario();
    }

    /// Runs every scenario of the selection in order and freezes the run.
    pub async fn run(&self, selection: &Selection) -> Result<RunRecord> {
        for execution in &selection.scenarios {
            self.run_scenario(execution).await;
        }

        let record = self.tracker.write().await.finish_run()?;
        info!(
            scenarios = record.scenarios.len(),
            failed = record.failed(),
            "Run finished"
        );
        Ok(record)
    }
}
