use crate::Result;
use crate::config::CucumberJsonConfig;
use crate::reporting::cucumber_json::{FeatureReport, render};
use crate::reporting::schema::validate_report;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Persists compiled reports as `{prefix}{feature name}{suffix}.json`, where the
/// feature name is the file name up to its first `.`.
pub struct ReportWriter {
    config: CucumberJsonConfig,
}

impl ReportWriter {
    pub fn new(config: CucumberJsonConfig) -> Self {
        Self { config }
    }

    /// Path the given reports would be written to.
    pub fn report_path(&self, reports: &[FeatureReport]) -> PathBuf {
        let stem = reports
            .first()
            .and_then(|report| Path::new(&report.uri).file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .and_then(|name| name.split('.').next().map(str::to_string))
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| "empty".to_string());

        self.config.output_folder.join(format!(
            "{}{}{}.json",
            self.config.file_prefix, stem, self.config.file_suffix
        ))
    }

    /// Writes the reports, returning the file written. Nothing is written when
    /// generation is disabled.
    pub fn write(&self, reports: &[FeatureReport]) -> Result<Option<PathBuf>> {
        if !self.config.generate {
            info!("Cucumber JSON generation disabled; report not written");
            return Ok(None);
        }
        if self.config.validate_schema {
            validate_report(reports)?;
        }

        let path = self.report_path(reports);
        fs::create_dir_all(&self.config.output_folder)?;
        fs::write(&path, render(reports)?)?;

        info!(path = %path.display(), features = reports.len(), "Cucumber JSON written");
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn report(uri: &str) -> FeatureReport {
        FeatureReport {
            keyword: "Feature".to_string(),
            name: "Login".to_string(),
            description: String::new(),
            line: 1,
            id: "login".to_string(),
            tags: Vec::new(),
            uri: uri.to_string(),
            elements: Vec::new(),
        }
    }

    fn config(dir: &TempDir) -> CucumberJsonConfig {
        CucumberJsonConfig {
            output_folder: dir.path().join("nested/out"),
            ..Default::default()
        }
    }

    #[test]
    fn test_writes_pretty_json_named_after_feature() {
        let dir = TempDir::new().unwrap();
        let writer = ReportWriter::new(CucumberJsonConfig {
            file_prefix: "web-".to_string(),
            file_suffix: "-chrome".to_string(),
            ..config(&dir)
        });

        let path = writer.write(&[report("features/auth/login.feature")]).unwrap().unwrap();
        assert_eq!(path, dir.path().join("nested/out/web-login-chrome.json"));

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("[\n  {"));
        let parsed: Vec<FeatureReport> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, vec![report("features/auth/login.feature")]);
    }

    #[test]
    fn test_name_stops_at_first_dot() {
        let dir = TempDir::new().unwrap();
        let writer = ReportWriter::new(config(&dir));
        assert_eq!(
            writer.report_path(&[report("features/login.spec.feature")]),
            dir.path().join("nested/out/login.json")
        );
        assert_eq!(
            writer.report_path(&[report("features/.hidden.feature")]),
            dir.path().join("nested/out/empty.json")
        );
    }

    #[test]
    fn test_empty_reports_use_placeholder_name() {
        let dir = TempDir::new().unwrap();
        let writer = ReportWriter::new(config(&dir));
        let path = writer.write(&[]).unwrap().unwrap();
        assert_eq!(path, dir.path().join("nested/out/empty.json"));
        assert_eq!(fs::read_to_string(path).unwrap(), "[]");
    }

    #[test]
    fn test_generation_disabled() {
        let dir = TempDir::new().unwrap();
        let writer = ReportWriter::new(CucumberJsonConfig {
            generate: false,
            ..config(&dir)
        });
        assert_eq!(writer.write(&[report("a.feature")]).unwrap(), None);
        assert!(!dir.path().join("nested").exists());
    }
}
