pub mod report;
pub mod schema;
pub mod select;

use anyhow::{Context, bail};
use cukeflow_test::HarnessConfig;
use std::path::Path;

/// Flags shared by the commands, in `--name value` form.
#[derive(Debug, Default)]
pub struct CommandArgs {
    pub positional: Vec<String>,
    pub tags: Option<String>,
    pub events: Option<String>,
    pub config: Option<String>,
}

impl CommandArgs {
    pub fn parse(args: &[String]) -> anyhow::Result<Self> {
        let mut parsed = Self::default();
        let mut iter = args.iter();

        while let Some(arg) = iter.next() {
            let slot = match arg.as_str() {
                "--tags" => &mut parsed.tags,
                "--events" => &mut parsed.events,
                "--config" => &mut parsed.config,
                flag if flag.starts_with("--") => bail!("Unknown option '{}'", flag),
                _ => {
                    parsed.positional.push(arg.clone());
                    continue;
                }
            };
            let value = iter
                .next()
                .with_context(|| format!("Option '{}' needs a value", arg))?;
            *slot = Some(value.clone());
        }

        Ok(parsed)
    }

    /// Config file (or defaults), then `TAGS`, then `--tags`.
    pub fn harness_config(&self) -> anyhow::Result<HarnessConfig> {
        let config = match &self.config {
            Some(path) => HarnessConfig::load(Path::new(path))
                .with_context(|| format!("Failed to load config {}", path))?,
            None => HarnessConfig::default(),
        };
        let mut config = config.from_env();
        if let Some(tags) = &self.tags {
            config.tags = Some(tags.clone());
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_parse_flags_and_positionals() {
        let parsed =
            CommandArgs::parse(&args(&["login.feature", "--tags", "@smoke", "--events", "run.jsonl"]))
                .unwrap();
        assert_eq!(parsed.positional, vec!["login.feature"]);
        assert_eq!(parsed.tags.as_deref(), Some("@smoke"));
        assert_eq!(parsed.events.as_deref(), Some("run.jsonl"));
        assert_eq!(parsed.config, None);
    }

    #[test]
    fn test_parse_rejects_bad_flags() {
        assert!(CommandArgs::parse(&args(&["--tags"])).is_err());
        assert!(CommandArgs::parse(&args(&["--verbose"])).is_err());
    }

    #[test]
    fn test_tags_flag_wins_over_config() {
        let parsed = CommandArgs::parse(&args(&["--tags", "@cli"])).unwrap();
        let config = parsed.harness_config().unwrap();
        assert_eq!(config.tag_filter(), Some("@cli"));
    }
}
