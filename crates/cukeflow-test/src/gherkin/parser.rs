use crate::gherkin::document::{
    DataTable, DocString, ExamplesTable, FeatureDocument, Section, SectionKind, Step,
    StepArgument, TableRow, Tag,
};
use crate::{Result, TestError};
use ::gherkin::{Feature as GherkinFeature, GherkinEnv, ParseFileError};
use std::collections::HashMap;
use std::path::Path;

/// Converts the `gherkin` crate's AST into a [`FeatureDocument`].
///
/// Source lines the AST does not carry (tag lines, table row lines) are
/// recovered from the raw feature text.
pub struct Parser;

impl Parser {
    pub fn parse_feature_file(path: &Path) -> Result<FeatureDocument> {
        let source = std::fs::read_to_string(path)?;
        let env = GherkinEnv::default();
        let gherkin_feature = GherkinFeature::parse_path(path, env).map_err(|e| match e {
            ParseFileError::Reading { path: _, source } => TestError::Io(source),
            ParseFileError::Parsing {
                path,
                error: _,
                source: _,
            } => TestError::GherkinParse(format!("Parse error in file: {:?}", path)),
        })?;

        let uri = path.to_string_lossy().replace('\\', "/");
        Ok(Self::convert_feature(&gherkin_feature, &source, &uri))
    }

    pub fn parse_feature(source: &str, uri: &str) -> Result<FeatureDocument> {
        let env = GherkinEnv::default();
        let gherkin_feature = GherkinFeature::parse(source, env)
            .map_err(|_e| TestError::GherkinParse(format!("Parse error in {}", uri)))?;

        Ok(Self::convert_feature(&gherkin_feature, source, uri))
    }

    fn convert_feature(gherkin_feature: &GherkinFeature, source: &str, uri: &str) -> FeatureDocument {
        let lines = SourceLines::new(source);
        let mut sections = Vec::new();

        if let Some(bg) = &gherkin_feature.background {
            sections.push(Section {
                kind: SectionKind::Background,
                keyword: bg.keyword.trim().to_string(),
                name: bg.name.clone(),
                description: bg.description.clone(),
                tags: Vec::new(),
                steps: Self::convert_steps(&bg.steps, &lines),
                rule_background: Vec::new(),
                line: bg.position.line,
            });
        }

        for scenario in &gherkin_feature.scenarios {
            sections.push(Self::convert_scenario(scenario, &[], &[], &lines));
        }

        for rule in &gherkin_feature.rules {
            let rule_tags = lines.tags_above(rule.position.line, &rule.tags);
            let rule_background = rule
                .background
                .as_ref()
                .map(|bg| Self::convert_steps(&bg.steps, &lines))
                .unwrap_or_default();
            for scenario in &rule.scenarios {
                sections.push(Self::convert_scenario(
                    scenario,
                    &rule_tags,
                    &rule_background,
                    &lines,
                ));
            }
        }

        FeatureDocument {
            keyword: gherkin_feature.keyword.trim().to_string(),
            name: gherkin_feature.name.clone(),
            description: gherkin_feature.description.clone(),
            line: gherkin_feature.position.line,
            tags: lines.tags_above(gherkin_feature.position.line, &gherkin_feature.tags),
            sections,
            uri: uri.to_string(),
        }
    }

    fn convert_scenario(
        scenario: &::gherkin::Scenario,
        inherited_tags: &[Tag],
        rule_background: &[Step],
        lines: &SourceLines,
    ) -> Section {
        let mut tags = inherited_tags.to_vec();
        tags.extend(lines.tags_above(scenario.position.line, &scenario.tags));

        let kind = if scenario.examples.is_empty() {
            SectionKind::Scenario
        } else {
            SectionKind::ScenarioOutline(
                scenario
                    .examples
                    .iter()
                    .map(|examples| Self::convert_examples(examples, lines))
                    .collect(),
            )
        };

        Section {
            kind,
            keyword: scenario.keyword.trim().to_string(),
            name: scenario.name.clone(),
            description: scenario.description.clone(),
            tags,
            steps: Self::convert_steps(&scenario.steps, lines),
            rule_background: rule_background.to_vec(),
            line: scenario.position.line,
        }
    }

    fn convert_examples(examples: &::gherkin::Examples, lines: &SourceLines) -> ExamplesTable {
        let mut table = ExamplesTable {
            keyword: examples.keyword.trim().to_string(),
            name: examples.name.clone().filter(|name| !name.is_empty()),
            tags: lines.tags_above(examples.position.line, &examples.tags),
            line: examples.position.line,
            header: Vec::new(),
            rows: Vec::new(),
        };

        if let Some(gherkin_table) = examples.table.as_ref() {
            let rows = Self::convert_table_rows(gherkin_table, lines);
            let mut rows = rows.into_iter();
            if let Some(header) = rows.next() {
                table.header = header.cells;
            }
            table.rows = rows.collect();
        }

        table
    }

    fn convert_steps(steps: &[::gherkin::Step], lines: &SourceLines) -> Vec<Step> {
        steps
            .iter()
            .map(|step| {
                let argument = if let Some(table) = &step.table {
                    Some(StepArgument::DataTable(DataTable {
                        rows: Self::convert_table_rows(table, lines),
                    }))
                } else {
                    step.docstring.as_ref().map(|content| {
                        StepArgument::DocString(DocString {
                            content: content.clone(),
                            line: lines.docstring_after(step.position.line),
                        })
                    })
                };

                Step {
                    keyword: format!("{} ", step.keyword.trim()),
                    text: step.value.clone(),
                    line: step.position.line,
                    argument,
                }
            })
            .collect()
    }

    fn convert_table_rows(table: &::gherkin::Table, lines: &SourceLines) -> Vec<TableRow> {
        let row_lines = lines.table_rows_from(table.position.line, table.rows.len());
        table
            .rows
            .iter()
            .zip(row_lines)
            .map(|(cells, line)| TableRow {
                cells: cells.clone(),
                line,
            })
            .collect()
    }
}

/// 1-based view over the raw feature text.
struct SourceLines<'a> {
    lines: Vec<&'a str>,
}

impl<'a> SourceLines<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            lines: source.lines().collect(),
        }
    }

    fn get(&self, line: usize) -> Option<&'a str> {
        line.checked_sub(1)
            .and_then(|index| self.lines.get(index))
            .copied()
            .map(str::trim)
    }

    /// Attaches source lines to the tags of the node declared at `node_line`.
    ///
    /// Tag lines sit above the node, possibly separated by blanks or comments;
    /// the nearest occurrence of a name wins. Unlocated tags fall back to the
    /// line just above the node.
    fn tags_above(&self, node_line: usize, names: &[String]) -> Vec<Tag> {
        let mut located: HashMap<String, usize> = HashMap::new();
        let mut line = node_line.saturating_sub(1);

        while line > 0 {
            let Some(text) = self.get(line) else { break };
            if text.starts_with('@') {
                for token in text.split_whitespace() {
                    if token.starts_with('#') {
                        break;
                    }
                    if token.starts_with('@') {
                        located.entry(token.to_string()).or_insert(line);
                    }
                }
            } else if !(text.is_empty() || text.starts_with('#')) {
                break;
            }
            line -= 1;
        }

        names
            .iter()
            .map(|name| {
                let tag = Tag::new(name.as_str(), 0);
                let line = located
                    .get(&tag.name)
                    .copied()
                    .unwrap_or_else(|| node_line.saturating_sub(1).max(1));
                Tag { line, ..tag }
            })
            .collect()
    }

    /// Line numbers of `count` table rows starting at `first_line`, skipping
    /// blank and comment lines in between.
    fn table_rows_from(&self, first_line: usize, count: usize) -> Vec<usize> {
        let mut found = Vec::with_capacity(count);
        let mut line = first_line.max(1);

        while found.len() < count {
            match self.get(line) {
                Some(text) if text.starts_with('|') => found.push(line),
                Some(_) => {}
                None => break,
            }
            line += 1;
        }

        // the AST and the text disagree; number the rest consecutively
        while found.len() < count {
            let next = found.last().map(|l| l + 1).unwrap_or(first_line);
            found.push(next);
        }

        found
    }

    fn docstring_after(&self, step_line: usize) -> usize {
        let mut line = step_line + 1;
        while let Some(text) = self.get(line) {
            if text.starts_with("\"\"\"") || text.starts_with("```") {
                return line;
            }
            if !(text.is_empty() || text.starts_with('#')) {
                break;
            }
            line += 1;
        }
        step_line + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTLINE_FEATURE: &str = r#"@smoke @ui
Feature: Calculator
  Adds numbers

  Background:
    Given a calculator

  @wip
  Scenario: Simple add
    When I add 1 and 2
    Then the sum is 3

  Scenario Outline: Add <a> and <b>
    When I add <a> and <b>
    Then the sum is <sum>

    Examples:
      | a | b | sum |
      | 1 | 2 | 3   |
      # a comment between rows
      | 4 | 5 | 9   |
"#;

    #[test]
    fn test_parse_feature_structure() {
        let feature = Parser::parse_feature(OUTLINE_FEATURE, "features/calc.feature").unwrap();

        assert_eq!(feature.name, "Calculator");
        assert_eq!(feature.line, 2);
        assert_eq!(feature.uri, "features/calc.feature");
        assert_eq!(
            feature.tags,
            vec![Tag::new("@smoke", 1), Tag::new("@ui", 1)]
        );

        assert_eq!(feature.sections.len(), 3);
        assert!(feature.sections[0].is_background());
        assert_eq!(feature.sections[0].steps[0].keyword, "Given ");
        assert_eq!(feature.sections[0].steps[0].line, 6);

        let simple = &feature.sections[1];
        assert_eq!(simple.name, "Simple add");
        assert_eq!(simple.line, 9);
        assert_eq!(simple.tags, vec![Tag::new("@wip", 8)]);
        assert_eq!(simple.steps[1].text, "the sum is 3");
    }

    #[test]
    fn test_parse_outline_examples_with_row_lines() {
        let feature = Parser::parse_feature(OUTLINE_FEATURE, "calc.feature").unwrap();
        let outline = &feature.sections[2];

        let SectionKind::ScenarioOutline(examples) = &outline.kind else {
            panic!("expected an outline, got {:?}", outline.kind);
        };
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].header, vec!["a", "b", "sum"]);
        assert_eq!(examples[0].rows.len(), 2);
        assert_eq!(examples[0].rows[0].line, 19);
        assert_eq!(examples[0].rows[1].line, 21);
        assert_eq!(examples[0].rows[1].cells, vec!["4", "5", "9"]);
    }

    #[test]
    fn test_parse_step_arguments() {
        let source = r#"Feature: Arguments

  Scenario: Tables and docs
    Given the users
      | name  | role  |
      | alice | admin |
    And the payload
      """
      {"ok": true}
      """
"#;
        let feature = Parser::parse_feature(source, "args.feature").unwrap();
        let steps = &feature.sections[0].steps;

        match &steps[0].argument {
            Some(StepArgument::DataTable(table)) => {
                assert_eq!(table.rows.len(), 2);
                assert_eq!(table.rows[0].line, 5);
                assert_eq!(table.rows[1].cells, vec!["alice", "admin"]);
            }
            other => panic!("expected a data table, got {:?}", other),
        }

        match &steps[1].argument {
            Some(StepArgument::DocString(doc)) => {
                assert_eq!(doc.line, 8);
                assert!(doc.content.contains("\"ok\""));
            }
            other => panic!("expected a doc string, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_is_reported() {
        let result = Parser::parse_feature("this is not gherkin\n", "bad.feature");
        assert!(matches!(result, Err(TestError::GherkinParse(_))));
    }

    #[test]
    fn test_rules_are_flattened_with_their_background_and_tags() {
        let source = r#"Feature: Accounts

  Background:
    Given a bank

  @r
  Rule: Withdrawals
    Background:
      Given an account with 10

    Scenario: Withdraw
      When I withdraw 5
      Then the balance is 5
"#;
        let feature = Parser::parse_feature(source, "accounts.feature").unwrap();
        assert_eq!(feature.sections.len(), 2);

        let withdraw = &feature.sections[1];
        assert_eq!(withdraw.name, "Withdraw");
        assert_eq!(withdraw.tags, vec![Tag::new("@r", 6)]);
        assert_eq!(withdraw.rule_background.len(), 1);
        assert_eq!(withdraw.rule_background[0].line, 9);
        assert_eq!(feature.step_at_line(9).map(|s| s.text.as_str()), Some("an account with 10"));

        let selection = crate::execution::selector::select_scenarios(&feature, None).unwrap();
        let steps: Vec<&str> = selection.scenarios[0]
            .steps
            .iter()
            .map(|s| s.text.as_str())
            .collect();
        assert_eq!(
            steps,
            vec!["a bank", "an account with 10", "I withdraw 5", "the balance is 5"]
        );
        assert!(selection.scenarios[0].steps[1].from_background);
    }

    #[test]
    fn test_tags_above_skips_comments_and_blanks() {
        let lines = SourceLines::new("@a\n# note\n\n@b @c # trailing\nScenario: x\n");
        let tags = lines.tags_above(5, &["a".to_string(), "c".to_string(), "z".to_string()]);
        assert_eq!(
            tags,
            vec![Tag::new("@a", 1), Tag::new("@c", 4), Tag::new("@z", 4)]
        );
    }
}
