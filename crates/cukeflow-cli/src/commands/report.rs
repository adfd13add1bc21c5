use super::CommandArgs;
use anyhow::{Context, bail};
use cukeflow_test::execution::events::{parse_event_log, replay};
use cukeflow_test::{FeatureDocument, Parser, ReportWriter, RunRecord, compile, select_scenarios};
use std::fs;
use std::path::Path;
use tracing::info;

pub fn execute(args: &[String]) -> anyhow::Result<()> {
    let args = CommandArgs::parse(args)?;
    let Some(feature_path) = args.positional.first() else {
        bail!("Usage: cukeflow report <feature> --events <file.jsonl> [--config <file>] [--tags <expr>]");
    };
    let Some(events_path) = &args.events else {
        bail!("Missing --events <file.jsonl>");
    };
    let config = args.harness_config()?;

    let (feature, run) =
        replay_feature(Path::new(feature_path), Path::new(events_path), config.tag_filter())?;

    let reports = compile(&feature, &run);
    match ReportWriter::new(config.cucumber_json.clone()).write(&reports)? {
        Some(path) => println!("Report written to {}", path.display()),
        None => println!("Report generation disabled"),
    }

    let failed = run.failed();
    println!(
        "{} scenario(s), {} passed, {} failed",
        run.scenarios.len(),
        run.scenarios.len() - failed,
        failed
    );
    if failed > 0 {
        bail!("{} scenario(s) failed", failed);
    }
    Ok(())
}

/// Selects the feature's scenarios and replays the recorded events against them.
pub fn replay_feature(
    feature_path: &Path,
    events_path: &Path,
    tags: Option<&str>,
) -> anyhow::Result<(FeatureDocument, RunRecord)> {
    let feature = Parser::parse_feature_file(feature_path)
        .with_context(|| format!("Failed to parse {}", feature_path.display()))?;
    let selection = select_scenarios(&feature, tags)?;

    let log = fs::read_to_string(events_path)
        .with_context(|| format!("Failed to read {}", events_path.display()))?;
    let events = parse_event_log(&log)?;
    info!(events = events.len(), scenarios = selection.scenarios.len(), "Replaying event log");

    let run = replay(&selection, events)?;
    Ok((feature, run))
}
