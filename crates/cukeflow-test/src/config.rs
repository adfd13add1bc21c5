use crate::{Result, TestError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable holding the tag expression for a run.
pub const TAGS_ENV: &str = "TAGS";

/// Settings for cucumber JSON output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CucumberJsonConfig {
    /// Write report files at all
    pub generate: bool,
    pub output_folder: PathBuf,
    pub file_prefix: String,
    pub file_suffix: String,
    /// Check compiled reports against the report schema before writing
    pub validate_schema: bool,
}

impl Default for CucumberJsonConfig {
    fn default() -> Self {
        Self {
            generate: true,
            output_folder: PathBuf::from("cypress/cucumber-json"),
            file_prefix: String::new(),
            file_suffix: String::new(),
            validate_schema: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HarnessConfig {
    pub cucumber_json: CucumberJsonConfig,
    /// Tag expression restricting which scenarios run
    pub tags: Option<String>,
    pub step_timeout_ms: Option<u64>,
}

impl HarnessConfig {
    /// Reads a JSON config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| {
            TestError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: HarnessConfig = serde_json::from_str(&data).map_err(|e| {
            TestError::Config(format!("Invalid config {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), "Loaded harness config");
        Ok(config)
    }

    /// Applies overrides from `lookup`; an empty `TAGS` counts as unset.
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(tags) = lookup(TAGS_ENV).filter(|tags| !tags.trim().is_empty()) {
            debug!(tags = %tags, "Tag expression taken from the environment");
            self.tags = Some(tags);
        }
        self
    }

    pub fn from_env(self) -> Self {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// The tag expression to select with, if any.
    pub fn tag_filter(&self) -> Option<&str> {
        self.tags.as_deref().filter(|tags| !tags.trim().is_empty())
    }
}
