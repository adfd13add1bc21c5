//! Picks the scenarios of a feature that must run and expands them into
//! concrete executions.

use crate::Result;
use crate::gherkin::document::{
    ExamplesTable, FeatureDocument, Section, SectionKind, Step, StepArgument, TableRow, Tag,
};
use crate::gherkin::tags::TagExpression;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const FOCUS_TAG: &str = "@focus";

/// Identity of a scenario within one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScenarioKey {
    pub name: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedStep {
    pub keyword: String,
    pub text: String,
    /// Line of the static step this one was resolved from.
    pub line: usize,
    pub argument: Option<StepArgument>,
    pub from_background: bool,
}

impl ResolvedStep {
    fn from_step(step: &Step, text: String, from_background: bool) -> Self {
        Self {
            keyword: step.keyword.clone(),
            text,
            line: step.line,
            argument: step.argument.clone(),
            from_background,
        }
    }
}

/// A fully resolved unit of execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioExecution {
    pub uri: String,
    pub keyword: String,
    pub name: String,
    pub description: Option<String>,
    /// Line the scenario is reported against: the examples row for outline
    /// instances, the section line otherwise.
    pub line: usize,
    pub section_line: usize,
    /// 1-based row index within its examples table.
    pub example_index: Option<usize>,
    /// Feature, section and examples tags, in that order.
    pub tags: Vec<Tag>,
    pub steps: Vec<ResolvedStep>,
}

impl ScenarioExecution {
    pub fn key(&self) -> ScenarioKey {
        ScenarioKey {
            name: self.name.clone(),
            line: self.line,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub background: Option<Section>,
    pub scenarios: Vec<ScenarioExecution>,
}

impl Selection {
    pub fn find(&self, name: &str, line: usize) -> Option<&ScenarioExecution> {
        self.scenarios
            .iter()
            .find(|execution| execution.name == name && execution.line == line)
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectionMode {
    EnvFilter,
    Everything,
    Focus,
}

/// Selects and expands the scenarios of `feature`.
///
/// With a non-empty `env_filter` every section is matched against its own tags
/// plus the feature's. Without one, an `@focus` tag on any section restricts the
/// run to focused sections; otherwise everything runs. Focus mode looks at the
/// section's own tags only.
pub fn select_scenarios(feature: &FeatureDocument, env_filter: Option<&str>) -> Result<Selection> {
    let env_expression = match env_filter.map(str::trim) {
        Some(filter) if !filter.is_empty() => Some(TagExpression::parse(filter)?),
        _ => None,
    };

    let mode = if env_expression.is_some() {
        SelectionMode::EnvFilter
    } else if !feature
        .sections
        .iter()
        .any(|section| !section.tags.is_empty())
    {
        SelectionMode::Everything
    } else if feature.sections.iter().any(|section| section.has_tag(FOCUS_TAG)) {
        SelectionMode::Focus
    } else {
        SelectionMode::Everything
    };

    let feature_tags: Vec<&str> = feature.tags.iter().map(|tag| tag.name.as_str()).collect();
    let background = feature.background();

    let mut scenarios = Vec::new();
    for section in feature.sections.iter().filter(|section| !section.is_background()) {
        let selected = match (&env_expression, mode) {
            (Some(expression), _) => {
                let mut tags: Vec<&str> = section.tags.iter().map(|t| t.name.as_str()).collect();
                tags.extend(feature_tags.iter().copied());
                expression.evaluate(&tags)
            }
            (None, SelectionMode::Focus) => section.has_tag(FOCUS_TAG),
            (None, _) => true,
        };

        debug!(
            scenario = %section.name,
            line = section.line,
            selected,
            "Evaluated section"
        );

        if selected {
            scenarios.extend(expand_section(feature, section, background));
        }
    }

    info!(
        feature = %feature.name,
        mode = ?mode,
        selected = scenarios.len(),
        "Selected scenarios"
    );

    Ok(Selection {
        background: background.cloned(),
        scenarios,
    })
}

fn expand_section(
    feature: &FeatureDocument,
    section: &Section,
    background: Option<&Section>,
) -> Vec<ScenarioExecution> {
    let background_steps: Vec<ResolvedStep> = background
        .map(|bg| bg.steps.as_slice())
        .unwrap_or_default()
        .iter()
        .chain(section.rule_background.iter())
        .map(|step| ResolvedStep::from_step(step, step.text.clone(), true))
        .collect();

    let mut base_tags = feature.tags.clone();
    base_tags.extend(section.tags.iter().cloned());

    match &section.kind {
        SectionKind::ScenarioOutline(examples) => {
            let mut executions = Vec::new();
            for table in examples {
                for (index, row) in table.rows.iter().enumerate() {
                    executions.push(expand_example(
                        feature,
                        section,
                        table,
                        row,
                        index + 1,
                        &background_steps,
                        &base_tags,
                    ));
                }
            }
            executions
        }
        _ => {
            let mut steps = background_steps;
            steps.extend(
                section
                    .steps
                    .iter()
                    .map(|step| ResolvedStep::from_step(step, step.text.clone(), false)),
            );

            vec![ScenarioExecution {
                uri: feature.uri.clone(),
                keyword: section.keyword.clone(),
                name: section.name.clone(),
                description: section.description.clone(),
                line: section.line,
                section_line: section.line,
                example_index: None,
                tags: base_tags,
                steps,
            }]
        }
    }
}

fn expand_example(
    feature: &FeatureDocument,
    section: &Section,
    table: &ExamplesTable,
    row: &TableRow,
    index: usize,
    background_steps: &[ResolvedStep],
    base_tags: &[Tag],
) -> ScenarioExecution {
    let values = table.row_values(row);

    let mut steps = background_steps.to_vec();
    steps.extend(section.steps.iter().map(|step| {
        ResolvedStep::from_step(step, replace_parameters(&values, &step.text), false)
    }));

    let mut tags = base_tags.to_vec();
    tags.extend(table.tags.iter().cloned());

    ScenarioExecution {
        uri: feature.uri.clone(),
        keyword: section.keyword.clone(),
        name: format!(
            "{} (example #{})",
            replace_parameters(&values, &section.name),
            index
        ),
        description: section.description.clone(),
        line: row.line,
        section_line: section.line,
        example_index: Some(index),
        tags,
        steps,
    }
}

/// Replaces the first `<column>` occurrence for each column, in column order.
pub fn replace_parameters(values: &[(String, String)], text: &str) -> String {
    values.iter().fold(text.to_string(), |acc, (column, value)| {
        acc.replacen(&format!("<{}>", column), value, 1)
    })
}
