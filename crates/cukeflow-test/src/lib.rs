//! Core of the cukeflow harness.
//!
//! A parsed Gherkin feature flows through three stages: the [`execution::selector`]
//! decides which scenarios run, the [`execution::state`] tracker records what the
//! runner reports while they run, and [`reporting::cucumber_json`] compiles the
//! frozen run into cucumber JSON.

pub mod config;
pub mod execution;
pub mod gherkin;
pub mod reporting;

pub use config::HarnessConfig;
pub use execution::runner::{FeatureRunner, StepExecutor};
pub use execution::selector::{ScenarioExecution, Selection, select_scenarios};
pub use execution::state::{RunRecord, RunTracker, StepOutcome, StepStatus};
pub use crate::gherkin::document::FeatureDocument;
pub use crate::gherkin::parser::Parser;
pub use reporting::cucumber_json::{FeatureReport, compile};
pub use reporting::writer::ReportWriter;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Gherkin parse error: {0}")]
    GherkinParse(String),

    #[error("Invalid tag expression: {0}")]
    TagExpression(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Reporting error: {0}")]
    Reporting(String),

    #[error("Report does not match schema: {}", .0.join("; "))]
    SchemaValidation(Vec<String>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Test run already finished")]
    RunFinished,
}

pub type Result<T> = std::result::Result<T, TestError>;
