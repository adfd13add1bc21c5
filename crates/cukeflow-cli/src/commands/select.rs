use super::CommandArgs;
use anyhow::{Context, bail};
use cukeflow_test::execution::selector::Selection;
use cukeflow_test::{Parser, select_scenarios};
use std::fmt::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

pub fn execute(args: &[String]) -> anyhow::Result<()> {
    let args = CommandArgs::parse(args)?;
    let root = args
        .positional
        .first()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("cypress/integration"));
    let config = args.harness_config()?;

    let features = collect_features(&root)?;
    if features.is_empty() {
        bail!("No .feature files found under {}", root.display());
    }

    for path in features {
        let feature = Parser::parse_feature_file(&path)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        let selection = select_scenarios(&feature, config.tag_filter())?;
        print!("{}", describe_selection(&feature.uri, &selection));
    }

    Ok(())
}

/// The feature file itself, or every `*.feature` below a directory in path order.
pub fn collect_features(root: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    if !root.exists() {
        bail!("{} does not exist", root.display());
    }

    let mut features = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|ext| ext.to_str()) == Some("feature")
        {
            features.push(entry.into_path());
        }
    }
    debug!(root = %root.display(), count = features.len(), "Collected feature files");
    Ok(features)
}

pub fn describe_selection(uri: &str, selection: &Selection) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({} selected)", uri, selection.scenarios.len());
    for execution in &selection.scenarios {
        let _ = writeln!(out, "  {}: {} (line {})", execution.keyword, execution.name, execution.line);
        for step in &execution.steps {
            let _ = writeln!(out, "    {}{}", step.keyword, step.text);
        }
    }
    out
}
