use serde::{Deserialize, Serialize};

/// A tag as written in the feature source, always with its leading `@`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub line: usize,
}

impl Tag {
    pub fn new(name: impl Into<String>, line: usize) -> Self {
        let name = name.into();
        let name = if name.starts_with('@') {
            name
        } else {
            format!("@{}", name)
        };
        Self { name, line }
    }
}

/// Immutable view of one parsed `.feature` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDocument {
    pub keyword: String,
    pub name: String,
    pub description: Option<String>,
    pub line: usize,
    pub tags: Vec<Tag>,
    pub sections: Vec<Section>,
    pub uri: String,
}

impl FeatureDocument {
    pub fn new(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            keyword: "Feature".to_string(),
            name: name.into(),
            description: None,
            line: 1,
            tags: Vec::new(),
            sections: Vec::new(),
            uri: uri.into(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<Tag>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    pub fn background(&self) -> Option<&Section> {
        self.sections
            .iter()
            .find(|section| matches!(section.kind, SectionKind::Background))
    }

    /// Looks up the static step declared at `line` in any section, including
    /// rule backgrounds.
    pub fn step_at_line(&self, line: usize) -> Option<&Step> {
        self.sections
            .iter()
            .flat_map(|section| section.rule_background.iter().chain(section.steps.iter()))
            .find(|step| step.line == line)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SectionKind {
    Background,
    Scenario,
    ScenarioOutline(Vec<ExamplesTable>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub kind: SectionKind,
    pub keyword: String,
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<Tag>,
    pub steps: Vec<Step>,
    /// Background steps of the enclosing `Rule`, run after the feature background.
    #[serde(default)]
    pub rule_background: Vec<Step>,
    pub line: usize,
}

impl Section {
    pub fn background(line: usize) -> Self {
        Self::with_kind(SectionKind::Background, "Background", "", line)
    }

    pub fn scenario(name: impl Into<String>, line: usize) -> Self {
        Self::with_kind(SectionKind::Scenario, "Scenario", name, line)
    }

    pub fn outline(name: impl Into<String>, line: usize, examples: Vec<ExamplesTable>) -> Self {
        Self::with_kind(
            SectionKind::ScenarioOutline(examples),
            "Scenario Outline",
            name,
            line,
        )
    }

    fn with_kind(kind: SectionKind, keyword: &str, name: impl Into<String>, line: usize) -> Self {
        Self {
            kind,
            keyword: keyword.to_string(),
            name: name.into(),
            description: None,
            tags: Vec::new(),
            steps: Vec::new(),
            rule_background: Vec::new(),
            line,
        }
    }

    pub fn with_tags(mut self, tags: Vec<Tag>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_rule_background(mut self, steps: Vec<Step>) -> Self {
        self.rule_background = steps;
        self
    }

    pub fn is_background(&self) -> bool {
        matches!(self.kind, SectionKind::Background)
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|tag| tag.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Keyword in reference form, including the trailing space (`"Given "`).
    pub keyword: String,
    pub text: String,
    pub line: usize,
    pub argument: Option<StepArgument>,
}

impl Step {
    pub fn new(keyword: &str, text: impl Into<String>, line: usize) -> Self {
        Self {
            keyword: format!("{} ", keyword.trim()),
            text: text.into(),
            line,
            argument: None,
        }
    }

    pub fn with_argument(mut self, argument: StepArgument) -> Self {
        self.argument = Some(argument);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StepArgument {
    DataTable(DataTable),
    DocString(DocString),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub cells: Vec<String>,
    pub line: usize,
}

impl TableRow {
    pub fn new<S: Into<String>>(cells: impl IntoIterator<Item = S>, line: usize) -> Self {
        Self {
            cells: cells.into_iter().map(Into::into).collect(),
            line,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocString {
    pub content: String,
    pub line: usize,
}

/// One `Examples:` block of a scenario outline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamplesTable {
    pub keyword: String,
    pub name: Option<String>,
    pub tags: Vec<Tag>,
    pub line: usize,
    pub header: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl ExamplesTable {
    pub fn new<S: Into<String>>(header: impl IntoIterator<Item = S>, line: usize) -> Self {
        Self {
            keyword: "Examples".to_string(),
            name: None,
            tags: Vec::new(),
            line,
            header: header.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn with_row(mut self, row: TableRow) -> Self {
        self.rows.push(row);
        self
    }

    /// Pairs each header with the row's cell, in column order.
    ///
    /// Missing cells read as empty; a repeated header keeps its first position
    /// and takes the later value.
    pub fn row_values(&self, row: &TableRow) -> Vec<(String, String)> {
        let mut values: Vec<(String, String)> = Vec::with_capacity(self.header.len());
        for (index, column) in self.header.iter().enumerate() {
            let cell = row.cells.get(index).cloned().unwrap_or_default();
            match values.iter_mut().find(|(key, _)| key == column) {
                Some(existing) => existing.1 = cell,
                None => values.push((column.clone(), cell)),
            }
        }
        values
    }
}
