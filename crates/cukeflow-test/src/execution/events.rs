//! Lifecycle calls as messages.
//!
//! An out-of-process runner records its run as [`EventRecord`]s (one JSON
//! object per line). [`replay`] applies a recorded stream to a tracker;
//! [`spawn_recorder`] applies events arriving on a channel.

use crate::execution::selector::Selection;
use crate::execution::state::{
    Attachment, AttachmentData, FailureKind, ManualClock, RunRecord, RunTracker, StepFailure,
    StepOutcome, StepStatus,
};
use crate::{Result, TestError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    StartScenario {
        name: String,
        line: usize,
    },
    StartStep {
        index: usize,
    },
    FinishStep {
        index: usize,
        status: StepStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Attach {
        data: String,
        media_type: String,
        /// `"base64"` for binary payloads; text otherwise.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        encoding: Option<String>,
    },
    FatalFailure {
        kind: FailureKind,
        message: String,
    },
    FinishScenario,
    FinishRun,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Milliseconds since the run started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_ms: Option<u64>,
    #[serde(flatten)]
    pub event: RunEvent,
}

impl From<RunEvent> for EventRecord {
    fn from(event: RunEvent) -> Self {
        Self { at_ms: None, event }
    }
}

/// Parses a JSON-lines event log; blank lines are skipped.
pub fn parse_event_log(content: &str) -> Result<Vec<EventRecord>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            serde_json::from_str(line).map_err(|e| {
                TestError::Execution(format!("Invalid event on line {}: {}", number + 1, e))
            })
        })
        .collect()
}

/// Applies events to a tracker, resolving scenarios against a selection.
pub struct EventApplier<'a> {
    selection: &'a Selection,
    tracker: RunTracker,
    clock: Option<ManualClock>,
    current_step: Option<(usize, String)>,
    record: Option<RunRecord>,
}

impl<'a> EventApplier<'a> {
    pub fn new(selection: &'a Selection, tracker: RunTracker) -> Self {
        Self {
            selection,
            tracker,
            clock: None,
            current_step: None,
            record: None,
        }
    }

    /// Drives a manual clock from event `at_ms` stamps; unstamped events leave it untouched.
    pub fn with_manual_clock(selection: &'a Selection) -> Self {
        let clock = ManualClock::new();
        let mut applier = Self::new(selection, RunTracker::with_clock(clock.clone()));
        applier.clock = Some(clock);
        applier
    }

    /// Applies one event. Returns the frozen record once `finish_run` is seen.
    pub fn apply(&mut self, record: EventRecord) -> Result<Option<&RunRecord>> {
        if self.record.is_some() {
            return Err(TestError::RunFinished);
        }
        if let (Some(clock), Some(at_ms)) = (&self.clock, record.at_ms) {
            clock.set(Duration::from_millis(at_ms));
        }
        debug!(event = ?record.event, "Applying run event");

        match record.event {
            RunEvent::StartScenario { name, line } => {
                let execution = self.selection.find(&name, line).ok_or_else(|| {
                    TestError::Execution(format!(
                        "Scenario '{}' at line {} is not part of the selection",
                        name, line
                    ))
                })?;
                self.current_step = None;
                self.tracker.start_scenario(execution.clone());
            }
            RunEvent::StartStep { index } => {
                let text = self
                    .tracker
                    .active_scenario()
                    .and_then(|execution| execution.steps.get(index))
                    .map(|step| step.text.clone())
                    .unwrap_or_default();
                self.current_step = Some((index, text));
                self.tracker.start_step(index);
            }
            RunEvent::FinishStep {
                index,
                status,
                error,
            } => {
                let outcome = self.outcome(index, status, error);
                self.tracker.finish_step(index, outcome);
            }
            RunEvent::Attach {
                data,
                media_type,
                encoding,
            } => {
                let attachment = match encoding.as_deref() {
                    Some("base64") => {
                        let bytes = STANDARD.decode(data.as_bytes()).map_err(|e| {
                            TestError::Execution(format!("Invalid base64 attachment: {}", e))
                        })?;
                        Attachment {
                            data: AttachmentData::Binary(bytes),
                            media_type,
                        }
                    }
                    None => Attachment::text(data, media_type),
                    Some(other) => {
                        return Err(TestError::Execution(format!(
                            "Unknown attachment encoding '{}'",
                            other
                        )));
                    }
                };
                self.tracker.attach(attachment);
            }
            RunEvent::FatalFailure { kind, message } => {
                self.tracker.on_fatal_failure(StepFailure::new(kind, message));
            }
            RunEvent::FinishScenario => {
                self.current_step = None;
                self.tracker.finish_scenario();
            }
            RunEvent::FinishRun => {
                self.record = Some(self.tracker.finish_run()?);
            }
        }

        Ok(self.record.as_ref())
    }

    /// Freezes the run, whether or not a `finish_run` event arrived.
    pub fn finish(mut self) -> Result<RunRecord> {
        match self.record.take() {
            Some(record) => Ok(record),
            None => self.tracker.finish_run(),
        }
    }

    fn outcome(&self, index: usize, status: StepStatus, error: Option<String>) -> StepOutcome {
        match status {
            StepStatus::Passed => StepOutcome::Passed,
            StepStatus::Failed => StepOutcome::Failed(error.unwrap_or_default()),
            StepStatus::Undefined => {
                let text = match &self.current_step {
                    Some((current, text)) if *current == index => text.clone(),
                    _ => error.unwrap_or_default(),
                };
                StepOutcome::Undefined(text)
            }
            StepStatus::Ambiguous => StepOutcome::Ambiguous(error.unwrap_or_default()),
            StepStatus::Pending => StepOutcome::Pending,
            StepStatus::Skipped => StepOutcome::Skipped,
        }
    }
}

/// Replays a recorded event stream into a fresh tracker driven by the events'
/// timestamps.
pub fn replay(
    selection: &Selection,
    events: impl IntoIterator<Item = EventRecord>,
) -> Result<RunRecord> {
    let mut applier = EventApplier::with_manual_clock(selection);
    for event in events {
        applier.apply(event)?;
    }
    applier.finish()
}

pub type EventSender = mpsc::UnboundedSender<EventRecord>;

/// Moves a tracker into a task that applies events from a channel until
/// `finish_run` arrives or every sender is dropped.
pub fn spawn_recorder(
    selection: Selection,
    tracker: RunTracker,
) -> (EventSender, JoinHandle<Result<RunRecord>>) {
    let (sender, mut receiver) = mpsc::unbounded_channel::<EventRecord>();

    let handle = tokio::spawn(async move {
        let mut applier = EventApplier::new(&selection, tracker);
        while let Some(event) = receiver.recv().await {
            if applier.apply(event)?.is_some() {
                break;
            }
        }
        applier.finish()
    });

    (sender, handle)
}
