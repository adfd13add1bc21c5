//! Run state tracking.
//!
//! [`RunTracker`] is driven by the runner's lifecycle calls, one scenario and one
//! step at a time, and freezes into a [`RunRecord`] when the run finishes.
//! Recording calls never fail: calls that break the lifecycle order are logged
//! and ignored.

use crate::execution::selector::{ScenarioExecution, ScenarioKey};
use crate::{Result, TestError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Time source for step durations.
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;
}

#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock moved by hand, shared between clones. Used to replay recorded
/// timestamps.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, at: Duration) {
        self.nanos.store(at.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Passed,
    Failed,
    Undefined,
    Ambiguous,
    Skipped,
}

impl StepStatus {
    /// Whether this status fails the scenario.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            StepStatus::Failed | StepStatus::Undefined | StepStatus::Ambiguous
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioStatus {
    Passed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    StepUndefined,
    StepFailed,
    Ambiguous,
    HarnessFailure,
}

impl FailureKind {
    pub fn status(self) -> StepStatus {
        match self {
            FailureKind::StepUndefined => StepStatus::Undefined,
            FailureKind::Ambiguous => StepStatus::Ambiguous,
            FailureKind::StepFailed | FailureKind::HarnessFailure => StepStatus::Failed,
        }
    }
}

/// The error that ended a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl StepFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn undefined(step_text: &str) -> Self {
        Self::new(
            FailureKind::StepUndefined,
            format!("Step implementation missing for: {}", step_text),
        )
    }

    pub fn harness(message: impl Into<String>) -> Self {
        Self::new(FailureKind::HarnessFailure, message)
    }
}

/// What a finished step reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Passed,
    Failed(String),
    /// No step definition matched; carries the step text.
    Undefined(String),
    Ambiguous(String),
    Pending,
    Skipped,
}

impl StepOutcome {
    pub fn status(&self) -> StepStatus {
        match self {
            StepOutcome::Passed => StepStatus::Passed,
            StepOutcome::Failed(_) => StepStatus::Failed,
            StepOutcome::Undefined(_) => StepStatus::Undefined,
            StepOutcome::Ambiguous(_) => StepStatus::Ambiguous,
            StepOutcome::Pending => StepStatus::Pending,
            StepOutcome::Skipped => StepStatus::Skipped,
        }
    }

    pub fn failure(&self) -> Option<StepFailure> {
        match self {
            StepOutcome::Failed(message) => {
                Some(StepFailure::new(FailureKind::StepFailed, message.clone()))
            }
            StepOutcome::Undefined(text) => Some(StepFailure::undefined(text)),
            StepOutcome::Ambiguous(message) => {
                Some(StepFailure::new(FailureKind::Ambiguous, message.clone()))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttachmentData {
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub data: AttachmentData,
    pub media_type: String,
}

impl Attachment {
    pub fn text(data: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            data: AttachmentData::Text(data.into()),
            media_type: media_type.into(),
        }
    }

    pub fn binary(data: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self {
            data: AttachmentData::Binary(data),
            media_type: media_type.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub status: StepStatus,
    pub duration: Option<Duration>,
    pub error: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl StepResult {
    fn skipped() -> Self {
        Self {
            status: StepStatus::Skipped,
            duration: None,
            error: None,
            attachments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRecord {
    pub execution: ScenarioExecution,
    pub steps: Vec<StepResult>,
    pub status: ScenarioStatus,
    pub failure: Option<StepFailure>,
}

/// Frozen results of one run, in the order scenarios ran.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub scenarios: Vec<ScenarioRecord>,
}

impl RunRecord {
    pub fn get(&self, key: &ScenarioKey) -> Option<&ScenarioRecord> {
        self.scenarios
            .iter()
            .find(|record| record.execution.name == key.name && record.execution.line == key.line)
    }

    pub fn failed(&self) -> usize {
        self.scenarios
            .iter()
            .filter(|record| record.status == ScenarioStatus::Failed)
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Idle,
    ScenarioActive,
    StepActive(usize),
    RunFinished,
}

struct ActiveScenario {
    execution: ScenarioExecution,
    steps: Vec<StepResult>,
    /// Most recently started step.
    current: Option<usize>,
    /// Started and not yet finished.
    in_flight: Option<usize>,
    failure: Option<StepFailure>,
    fatal_recorded: bool,
}

impl ActiveScenario {
    fn attachment_target(&self) -> usize {
        self.in_flight.or(self.current).unwrap_or(0)
    }
}

pub struct RunTracker {
    clock: Box<dyn Clock>,
    baseline: Duration,
    active: Option<ActiveScenario>,
    records: Vec<ScenarioRecord>,
    positions: HashMap<ScenarioKey, usize>,
    finished: bool,
}

impl RunTracker {
    pub fn new() -> Self {
        Self::with_clock(MonotonicClock::new())
    }

    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        let clock: Box<dyn Clock> = Box::new(clock);
        let baseline = clock.now();
        Self {
            clock,
            baseline,
            active: None,
            records: Vec::new(),
            positions: HashMap::new(),
            finished: false,
        }
    }

    pub fn state(&self) -> TrackerState {
        if self.finished {
            return TrackerState::RunFinished;
        }
        match &self.active {
            None => TrackerState::Idle,
            Some(active) => match active.in_flight {
                Some(index) => TrackerState::StepActive(index),
                None => TrackerState::ScenarioActive,
            },
        }
    }

    pub fn active_scenario(&self) -> Option<&ScenarioExecution> {
        self.active.as_ref().map(|active| &active.execution)
    }

    pub fn start_scenario(&mut self, execution: ScenarioExecution) {
        if self.finished {
            warn!(scenario = %execution.name, "start_scenario after the run finished; ignored");
            return;
        }
        if let Some(active) = &self.active {
            warn!(
                scenario = %active.execution.name,
                "start_scenario while another scenario is active; finishing it first"
            );
            self.finish_scenario();
        }

        debug!(scenario = %execution.name, line = execution.line, "Scenario started");
        self.baseline = self.clock.now();
        self.active = Some(ActiveScenario {
            steps: vec![StepResult::skipped(); execution.steps.len()],
            execution,
            current: None,
            in_flight: None,
            failure: None,
            fatal_recorded: false,
        });
    }

    pub fn start_step(&mut self, index: usize) {
        let now = self.clock.now();
        let Some(active) = self.active_mut("start_step") else {
            return;
        };
        let Some(step) = active.steps.get_mut(index) else {
            warn!(index, "start_step for a step the scenario does not have; ignored");
            return;
        };

        step.status = StepStatus::Pending;
        step.duration = None;
        step.error = None;
        active.current = Some(index);
        active.in_flight = Some(index);
        self.baseline = now;
        debug!(index, "Step started");
    }

    pub fn finish_step(&mut self, index: usize, outcome: StepOutcome) {
        let duration = self.lap();
        let Some(active) = self.active_mut("finish_step") else {
            return;
        };
        let Some(step) = active.steps.get_mut(index) else {
            warn!(index, "finish_step for a step the scenario does not have; ignored");
            return;
        };

        let failure = outcome.failure();
        step.status = outcome.status();
        step.duration = Some(duration);
        step.error = failure.as_ref().map(|f| f.message.clone());

        if active.in_flight == Some(index) {
            active.in_flight = None;
        }
        if active.failure.is_none() {
            active.failure = failure;
        }
        debug!(index, status = ?step.status, ?duration, "Step finished");
    }

    /// Attaches to the step in flight, else the last started step, else step 0.
    pub fn attach(&mut self, attachment: Attachment) {
        let Some(active) = self.active_mut("attach") else {
            return;
        };
        let target = active.attachment_target();
        match active.steps.get_mut(target) {
            Some(step) => {
                debug!(index = target, media_type = %attachment.media_type, "Attachment recorded");
                step.attachments.push(attachment);
            }
            None => warn!("attachment for a scenario without steps; dropped"),
        }
    }

    /// Records an error raised outside step bookkeeping against the step in
    /// flight (or the last started one) and remembers it as the scenario's
    /// terminal error.
    pub fn on_fatal_failure(&mut self, failure: StepFailure) {
        let duration = self.lap();
        let Some(active) = self.active_mut("on_fatal_failure") else {
            return;
        };
        if active.fatal_recorded {
            warn!(message = %failure.message, "second fatal failure for one scenario; ignored");
            return;
        }
        active.fatal_recorded = true;

        let target = active.attachment_target();
        if let Some(step) = active.steps.get_mut(target) {
            step.status = failure.kind.status();
            step.duration = Some(duration);
            step.error = Some(failure.message.clone());
        }
        active.in_flight = None;
        debug!(index = target, kind = ?failure.kind, "Fatal failure recorded");
        active.failure = Some(failure);
    }

    pub fn finish_scenario(&mut self) {
        if self.finished {
            warn!("finish_scenario after the run finished; ignored");
            return;
        }
        let Some(active) = self.active.take() else {
            warn!("finish_scenario without an active scenario; ignored");
            return;
        };

        let mut steps = active.steps;
        for step in steps.iter_mut().filter(|s| s.status == StepStatus::Pending) {
            step.status = StepStatus::Skipped;
        }

        let status = if steps.iter().any(|s| s.status.is_failure()) {
            ScenarioStatus::Failed
        } else {
            ScenarioStatus::Passed
        };

        let record = ScenarioRecord {
            execution: active.execution,
            steps,
            status,
            failure: active.failure,
        };
        debug!(scenario = %record.execution.name, status = ?status, "Scenario finished");

        let key = record.execution.key();
        match self.positions.get(&key) {
            Some(&position) => self.records[position] = record,
            None => {
                self.positions.insert(key, self.records.len());
                self.records.push(record);
            }
        }
    }

    /// Freezes the run. A scenario still active is finished first, so steps
    /// that never completed are reported as skipped.
    pub fn finish_run(&mut self) -> Result<RunRecord> {
        if self.finished {
            return Err(TestError::RunFinished);
        }
        if self.active.is_some() {
            warn!("run finished while a scenario was active; closing it");
            self.finish_scenario();
        }
        self.finished = true;
        self.positions.clear();

        Ok(RunRecord {
            scenarios: std::mem::take(&mut self.records),
        })
    }

    fn lap(&mut self) -> Duration {
        let now = self.clock.now();
        let elapsed = now.saturating_sub(self.baseline);
        self.baseline = now;
        elapsed
    }

    fn active_mut(&mut self, call: &str) -> Option<&mut ActiveScenario> {
        if self.finished {
            warn!(call, "lifecycle call after the run finished; ignored");
            return None;
        }
        if self.active.is_none() {
            warn!(call, "lifecycle call without an active scenario; ignored");
        }
        self.active.as_mut()
    }
}

impl Default for RunTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::selector::ResolvedStep;

    fn execution(name: &str, line: usize, steps: usize) -> ScenarioExecution {
        ScenarioExecution {
            uri: "features/login.feature".to_string(),
            keyword: "Scenario".to_string(),
            name: name.to_string(),
            description: None,
            line,
            section_line: line,
            example_index: None,
            tags: Vec::new(),
            steps: (0..steps)
                .map(|i| ResolvedStep {
                    keyword: "Given ".to_string(),
                    text: format!("step {}", i + 1),
                    line: line + i + 1,
                    argument: None,
                    from_background: false,
                })
                .collect(),
        }
    }

    fn statuses(record: &ScenarioRecord) -> Vec<StepStatus> {
        record.steps.iter().map(|s| s.status).collect()
    }

    #[test]
    fn test_unstarted_steps_are_skipped() {
        let mut tracker = RunTracker::new();
        tracker.start_scenario(execution("Basic example", 7, 3));
        tracker.finish_scenario();
        let run = tracker.finish_run().unwrap();

        assert_eq!(run.scenarios.len(), 1);
        assert_eq!(
            statuses(&run.scenarios[0]),
            vec![StepStatus::Skipped; 3]
        );
        assert_eq!(run.scenarios[0].status, ScenarioStatus::Passed);
    }

    #[test]
    fn test_passed_steps_with_per_step_durations() {
        let clock = ManualClock::new();
        let mut tracker = RunTracker::with_clock(clock.clone());
        tracker.start_scenario(execution("Login", 3, 3));

        for (index, ms) in [10u64, 20, 5].into_iter().enumerate() {
            tracker.start_step(index);
            clock.advance(Duration::from_millis(ms));
            tracker.finish_step(index, StepOutcome::Passed);
            clock.advance(Duration::from_millis(1));
        }
        tracker.finish_scenario();
        let run = tracker.finish_run().unwrap();

        let durations: Vec<Option<Duration>> =
            run.scenarios[0].steps.iter().map(|s| s.duration).collect();
        assert_eq!(
            durations,
            vec![
                Some(Duration::from_millis(10)),
                Some(Duration::from_millis(20)),
                Some(Duration::from_millis(5))
            ]
        );
        assert!(run.is_success());
    }

    #[test]
    fn test_failed_step_skips_the_rest() {
        let mut tracker = RunTracker::new();
        tracker.start_scenario(execution("Basic example", 7, 3));
        tracker.start_step(0);
        tracker.finish_step(0, StepOutcome::Passed);
        tracker.start_step(1);
        tracker.finish_step(1, StepOutcome::Failed("expected 1 to equal 2".to_string()));
        tracker.finish_scenario();
        let run = tracker.finish_run().unwrap();

        let record = &run.scenarios[0];
        assert_eq!(
            statuses(record),
            vec![StepStatus::Passed, StepStatus::Failed, StepStatus::Skipped]
        );
        assert_eq!(record.status, ScenarioStatus::Failed);
        assert_eq!(record.steps[1].error.as_deref(), Some("expected 1 to equal 2"));
        assert_eq!(
            record.failure.as_ref().map(|f| f.kind),
            Some(FailureKind::StepFailed)
        );
        assert_eq!(run.failed(), 1);
    }

    #[test]
    fn test_undefined_step_fails_the_scenario() {
        let mut tracker = RunTracker::new();
        tracker.start_scenario(execution("Basic example", 7, 3));
        tracker.start_step(0);
        tracker.finish_step(0, StepOutcome::Passed);
        tracker.start_step(1);
        tracker.finish_step(1, StepOutcome::Undefined("step 2".to_string()));
        tracker.finish_scenario();
        let run = tracker.finish_run().unwrap();

        let record = &run.scenarios[0];
        assert_eq!(
            statuses(record),
            vec![StepStatus::Passed, StepStatus::Undefined, StepStatus::Skipped]
        );
        assert_eq!(record.status, ScenarioStatus::Failed);
        let failure = record.failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::StepUndefined);
        assert_eq!(failure.message, "Step implementation missing for: step 2");
    }

    #[test]
    fn test_ambiguous_step_fails_the_scenario() {
        let mut tracker = RunTracker::new();
        tracker.start_scenario(execution("S", 1, 1));
        tracker.start_step(0);
        tracker.finish_step(0, StepOutcome::Ambiguous("two definitions match".to_string()));
        tracker.finish_scenario();
        let run = tracker.finish_run().unwrap();

        assert_eq!(run.scenarios[0].steps[0].status, StepStatus::Ambiguous);
        assert_eq!(run.scenarios[0].status, ScenarioStatus::Failed);
    }

    #[test]
    fn test_fatal_failure_marks_pending_step() {
        let mut tracker = RunTracker::new();
        tracker.start_scenario(execution("S", 1, 3));
        tracker.start_step(0);
        tracker.finish_step(0, StepOutcome::Passed);
        tracker.start_step(1);
        assert_eq!(tracker.state(), TrackerState::StepActive(1));
        tracker.on_fatal_failure(StepFailure::harness("cy.visit() failed"));
        assert_eq!(tracker.state(), TrackerState::ScenarioActive);
        tracker.on_fatal_failure(StepFailure::harness("ignored"));
        tracker.finish_scenario();
        let run = tracker.finish_run().unwrap();

        let record = &run.scenarios[0];
        assert_eq!(
            statuses(record),
            vec![StepStatus::Passed, StepStatus::Failed, StepStatus::Skipped]
        );
        assert_eq!(record.steps[1].error.as_deref(), Some("cy.visit() failed"));
        assert_eq!(
            record.failure,
            Some(StepFailure::harness("cy.visit() failed"))
        );
    }

    #[test]
    fn test_fatal_failure_before_any_step_lands_on_first() {
        let mut tracker = RunTracker::new();
        tracker.start_scenario(execution("S", 1, 2));
        tracker.on_fatal_failure(StepFailure::harness("before hook failed"));
        tracker.finish_scenario();
        let run = tracker.finish_run().unwrap();

        assert_eq!(
            statuses(&run.scenarios[0]),
            vec![StepStatus::Failed, StepStatus::Skipped]
        );
    }

    #[test]
    fn test_attachments_follow_active_step() {
        let mut tracker = RunTracker::new();
        tracker.start_scenario(execution("S", 1, 2));
        tracker.attach(Attachment::text("before hook", "text/plain"));
        tracker.start_step(0);
        tracker.attach(Attachment::text("during 0", "text/plain"));
        tracker.finish_step(0, StepOutcome::Passed);
        tracker.attach(Attachment::binary(vec![1, 2, 3], "image/png"));
        tracker.start_step(1);
        tracker.attach(Attachment::text("during 1", "text/plain"));
        tracker.finish_step(1, StepOutcome::Passed);
        tracker.finish_scenario();
        let run = tracker.finish_run().unwrap();

        let steps = &run.scenarios[0].steps;
        assert_eq!(steps[0].attachments.len(), 3);
        assert_eq!(steps[0].attachments[0], Attachment::text("before hook", "text/plain"));
        assert_eq!(steps[0].attachments[2].media_type, "image/png");
        assert_eq!(steps[1].attachments, vec![Attachment::text("during 1", "text/plain")]);
    }

    #[test]
    fn test_torn_down_scenario_reports_skipped_tail() {
        let mut tracker = RunTracker::new();
        tracker.start_scenario(execution("S", 1, 3));
        tracker.start_step(0);
        tracker.finish_step(0, StepOutcome::Passed);
        tracker.start_step(1);
        let run = tracker.finish_run().unwrap();

        assert_eq!(
            statuses(&run.scenarios[0]),
            vec![StepStatus::Passed, StepStatus::Skipped, StepStatus::Skipped]
        );
    }

    #[test]
    fn test_pending_outcome_is_reported_skipped() {
        let mut tracker = RunTracker::new();
        tracker.start_scenario(execution("S", 1, 1));
        tracker.start_step(0);
        tracker.finish_step(0, StepOutcome::Pending);
        tracker.finish_scenario();
        let run = tracker.finish_run().unwrap();
        assert_eq!(run.scenarios[0].steps[0].status, StepStatus::Skipped);
    }

    #[test]
    fn test_same_name_different_lines_do_not_collide() {
        let mut tracker = RunTracker::new();
        for line in [11, 12] {
            tracker.start_scenario(execution("Add (example #1)", line, 1));
            tracker.finish_scenario();
        }
        let run = tracker.finish_run().unwrap();
        assert_eq!(run.scenarios.len(), 2);
        assert!(run.get(&ScenarioKey { name: "Add (example #1)".to_string(), line: 12 }).is_some());
    }

    #[test]
    fn test_rerun_replaces_previous_record() {
        let mut tracker = RunTracker::new();
        tracker.start_scenario(execution("S", 1, 1));
        tracker.start_step(0);
        tracker.finish_step(0, StepOutcome::Failed("flaky".to_string()));
        tracker.finish_scenario();
        tracker.start_scenario(execution("S", 1, 1));
        tracker.start_step(0);
        tracker.finish_step(0, StepOutcome::Passed);
        tracker.finish_scenario();
        let run = tracker.finish_run().unwrap();

        assert_eq!(run.scenarios.len(), 1);
        assert_eq!(run.scenarios[0].status, ScenarioStatus::Passed);
    }

    #[test]
    fn test_finish_run_twice_is_an_error() {
        let mut tracker = RunTracker::new();
        assert!(tracker.finish_run().unwrap().scenarios.is_empty());
        assert!(matches!(tracker.finish_run(), Err(TestError::RunFinished)));

        tracker.start_scenario(execution("late", 1, 1));
        assert_eq!(tracker.state(), TrackerState::RunFinished);
        assert!(tracker.active_scenario().is_none());
    }

    #[test]
    fn test_out_of_order_calls_are_ignored() {
        let mut tracker = RunTracker::new();
        tracker.start_step(0);
        tracker.finish_step(0, StepOutcome::Passed);
        tracker.attach(Attachment::text("x", "text/plain"));
        tracker.finish_scenario();
        assert_eq!(tracker.state(), TrackerState::Idle);

        tracker.start_scenario(execution("S", 1, 1));
        tracker.start_step(5);
        assert_eq!(tracker.state(), TrackerState::ScenarioActive);
        assert!(tracker.finish_run().unwrap().scenarios.len() == 1);
    }
}
