pub mod events;
pub mod runner;
pub mod selector;
pub mod state;

pub use events::{EventRecord, RunEvent, replay, spawn_recorder};
pub use runner::{AttachmentSink, FeatureRunner, StepExecutor};
pub use selector::{ScenarioExecution, Selection, select_scenarios};
pub use state::{RunRecord, RunTracker, StepStatus};
