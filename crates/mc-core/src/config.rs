//! Run-level configuration supplied by the simulation driver.
//!
//! Recognized JSON options (camelCase, snake_case also accepted):
//! - `threads`: worker count (default 1)
//! - `numberOfHistories`: normalization divisor for processed export
//! - `endTime`: wall-clock divisor for rate tallies (s)
//! - `outputPath`: target tally-store path

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::RunStatistics;
use crate::{Error, Result};

fn default_threads() -> usize {
    1
}

/// Driver configuration consumed by the tally layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RunConfig {
    /// Worker thread count.
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Number of histories to normalize by.
    #[serde(default, alias = "number_of_histories")]
    pub number_of_histories: Option<u64>,
    /// Elapsed wall-clock time of the run.
    #[serde(default, alias = "end_time")]
    pub end_time: Option<f64>,
    /// Where the tally store is written.
    #[serde(default, alias = "output_path")]
    pub output_path: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            number_of_histories: None,
            end_time: None,
            output_path: None,
        }
    }
}

impl RunConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: RunConfig = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Reject values that cannot drive a run.
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(Error::Validation("threads must be >= 1".into()));
        }
        if self.number_of_histories == Some(0) {
            return Err(Error::Validation("numberOfHistories must be > 0".into()));
        }
        if let Some(t) = self.end_time
            && !(t.is_finite() && t > 0.0)
        {
            return Err(Error::Validation(format!("endTime must be finite and > 0 (got {t})")));
        }
        Ok(())
    }

    /// Normalization inputs for export.
    pub fn run_statistics(&self) -> RunStatistics {
        RunStatistics { number_of_histories: self.number_of_histories, end_time: self.end_time }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_camel_case() {
        let json = r#"{
            "threads": 4,
            "numberOfHistories": 1000,
            "endTime": 12.5,
            "outputPath": "out/tally.json"
        }"#;
        let cfg = RunConfig::from_json_str(json).unwrap();
        assert_eq!(cfg.threads, 4);
        assert_eq!(cfg.run_statistics(), RunStatistics::new(1000, 12.5));
        assert_eq!(cfg.output_path.as_deref(), Some(Path::new("out/tally.json")));
    }

    #[test]
    fn test_defaults_and_snake_case_alias() {
        let cfg = RunConfig::from_json_str(r#"{"number_of_histories": 5}"#).unwrap();
        assert_eq!(cfg.threads, 1);
        assert_eq!(cfg.number_of_histories, Some(5));
        assert_eq!(cfg.end_time, None);
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(matches!(RunConfig::from_json_str(r#"{"threads": 0}"#), Err(Error::Validation(_))));
        assert!(matches!(
            RunConfig::from_json_str(r#"{"endTime": -1.0}"#),
            Err(Error::Validation(_))
        ));
        assert!(matches!(RunConfig::from_json_str(r#"{"thread": 2}"#), Err(Error::Json(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"threads": 2, "endTime": 1.0}}"#).unwrap();
        let cfg = RunConfig::load(f.path()).unwrap();
        assert_eq!(cfg.threads, 2);
        assert!(matches!(RunConfig::load("/nonexistent/run.json"), Err(Error::Io(_))));
    }
}
