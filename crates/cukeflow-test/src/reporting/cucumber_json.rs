//! Cucumber JSON compilation.
//!
//! Combines the static feature with a frozen [`RunRecord`]. Step keywords and
//! arguments come from the static step declared at the executed step's line,
//! since outline instances share their static steps.

use crate::execution::selector::ResolvedStep;
use crate::execution::state::{AttachmentData, RunRecord, ScenarioRecord, StepResult, StepStatus};
use crate::gherkin::document::{FeatureDocument, StepArgument, Tag};
use crate::{Result, TestError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureReport {
    pub keyword: String,
    pub name: String,
    pub description: String,
    pub line: usize,
    pub id: String,
    pub tags: Vec<TagReport>,
    pub uri: String,
    pub elements: Vec<ElementReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagReport {
    pub name: String,
    pub line: usize,
}

impl From<&Tag> for TagReport {
    fn from(tag: &Tag) -> Self {
        Self {
            name: tag.name.clone(),
            line: tag.line,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementReport {
    pub keyword: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub name: String,
    pub description: String,
    pub line: usize,
    pub tags: Vec<TagReport>,
    pub steps: Vec<StepReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub keyword: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(default)]
    pub arguments: Vec<ArgumentReport>,
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub step_match: Option<MatchReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embeddings: Vec<EmbeddingReport>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgumentReport {
    DataTable { rows: Vec<RowReport> },
    DocString { content: String, line: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowReport {
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchReport {
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultReport {
    pub status: StepStatus,
    /// Nanoseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingReport {
    pub data: String,
    pub mime_type: String,
}

/// Lowercases and hyphenates a name the way cucumber ids are built.
pub fn name_to_id(name: &str) -> String {
    name.replace(' ', "-").to_lowercase()
}

/// Compiles one report entry per source file present in `run`, in the order
/// their first scenario ran. An empty run compiles to no entries.
pub fn compile(feature: &FeatureDocument, run: &RunRecord) -> Vec<FeatureReport> {
    let mut reports: Vec<FeatureReport> = Vec::new();
    let feature_id = name_to_id(&feature.name);

    for record in &run.scenarios {
        let uri = &record.execution.uri;
        let position = match reports.iter().position(|report| &report.uri == uri) {
            Some(position) => position,
            None => {
                reports.push(feature_report(feature, &feature_id, uri));
                reports.len() - 1
            }
        };
        reports[position]
            .elements
            .push(element_report(feature, &feature_id, record));
    }

    debug!(
        feature = %feature.name,
        entries = reports.len(),
        scenarios = run.scenarios.len(),
        "Compiled cucumber JSON"
    );
    reports
}

/// Serialises compiled entries with two-space indentation.
pub fn render(reports: &[FeatureReport]) -> Result<String> {
    serde_json::to_string_pretty(reports)
        .map_err(|e| TestError::Reporting(format!("Failed to render cucumber JSON: {}", e)))
}

fn feature_report(feature: &FeatureDocument, feature_id: &str, uri: &str) -> FeatureReport {
    FeatureReport {
        keyword: feature.keyword.clone(),
        name: feature.name.clone(),
        description: feature.description.clone().unwrap_or_default(),
        line: feature.line,
        id: feature_id.to_string(),
        tags: feature.tags.iter().map(TagReport::from).collect(),
        uri: uri.to_string(),
        elements: Vec::new(),
    }
}

fn element_report(
    feature: &FeatureDocument,
    feature_id: &str,
    record: &ScenarioRecord,
) -> ElementReport {
    let execution = &record.execution;
    let mut before_first_step = true;

    let steps = execution
        .steps
        .iter()
        .enumerate()
        .map(|(index, step)| {
            let report = step_report(feature, &execution.uri, step, record.steps.get(index));
            if report.hidden {
                if !before_first_step {
                    return StepReport {
                        keyword: "After".to_string(),
                        ..report
                    };
                }
            } else {
                before_first_step = false;
            }
            report
        })
        .collect();

    ElementReport {
        keyword: "Scenario".to_string(),
        kind: "scenario".to_string(),
        id: format!("{};{}", feature_id, name_to_id(&execution.name)),
        name: execution.name.clone(),
        description: execution.description.clone().unwrap_or_default(),
        line: execution.line,
        tags: execution.tags.iter().map(TagReport::from).collect(),
        steps,
    }
}

fn step_report(
    feature: &FeatureDocument,
    uri: &str,
    step: &ResolvedStep,
    result: Option<&StepResult>,
) -> StepReport {
    let static_step = feature.step_at_line(step.line);

    let mut report = match (static_step, result) {
        (Some(static_step), Some(_)) => StepReport {
            keyword: static_step.keyword.clone(),
            name: Some(step.text.clone()),
            line: Some(step.line),
            arguments: static_step.argument.iter().map(argument_report).collect(),
            step_match: Some(MatchReport {
                location: format!("{}:{}", uri, step.line),
            }),
            result: None,
            embeddings: Vec::new(),
            hidden: false,
        },
        _ => StepReport {
            keyword: "Before".to_string(),
            name: None,
            line: None,
            arguments: Vec::new(),
            step_match: None,
            result: None,
            embeddings: Vec::new(),
            hidden: true,
        },
    };

    if let Some(result) = result {
        report.result = Some(ResultReport {
            status: result.status,
            duration: result
                .duration
                .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)),
            error_message: match result.status {
                StepStatus::Failed => result.error.clone(),
                _ => None,
            },
        });
        report.embeddings = result
            .attachments
            .iter()
            .map(|attachment| EmbeddingReport {
                data: match &attachment.data {
                    AttachmentData::Text(text) => text.clone(),
                    AttachmentData::Binary(bytes) => STANDARD.encode(bytes),
                },
                mime_type: attachment.media_type.clone(),
            })
            .collect();
    }

    report
}

fn argument_report(argument: &StepArgument) -> ArgumentReport {
    match argument {
        StepArgument::DataTable(table) => ArgumentReport::DataTable {
            rows: table
                .rows
                .iter()
                .map(|row| RowReport {
                    cells: row.cells.clone(),
                })
                .collect(),
        },
        StepArgument::DocString(doc) => ArgumentReport::DocString {
            content: doc.content.clone(),
            line: doc.line,
        },
    }
}
