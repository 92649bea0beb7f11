//! Run configuration, optionally loaded from an INI file.
//!
//! ```ini
//! [file]
//! delimiter = ";"
//! file_extension = ".txt"
//!
//! [analysis]
//! radius_m = 1.5
//! engine = auto
//! max_cells = 25000000
//! ```

use std::path::Path;

use ini::Ini;
use serde::{Deserialize, Serialize};

use crate::grid::Engine;
use crate::CovError;

pub const DEFAULT_DELIMITER: &str = ";";
pub const DEFAULT_FILE_EXTENSION: &str = ".txt";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IngestConfig {
    /// Field separator within a log line.
    pub delimiter: String,
    /// Suffix a file name must end with to be ingested (e.g. `.txt`).
    pub file_extension: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER.to_string(),
            file_extension: DEFAULT_FILE_EXTENSION.to_string(),
        }
    }
}

impl IngestConfig {
    pub fn validate(&self) -> Result<(), CovError> {
        if self.delimiter.is_empty() {
            return Err(CovError::InvalidParameter(
                "field delimiter must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AnalysisConfig {
    /// Default detection radius in meters when the caller supplies none.
    pub radius_m: Option<f64>,
    pub engine: Engine,
    /// Upper bound on `grid_size_lat * grid_size_lon`; unlimited unless set.
    pub max_cells: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            radius_m: None,
            engine: Engine::Auto,
            max_cells: usize::MAX,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub ingest: IngestConfig,
    pub analysis: AnalysisConfig,
}

impl Config {
    /// Load configuration from `path`. The file must exist.
    pub fn load_from(path: &Path) -> Result<Self, CovError> {
        let ini = Ini::load_from_file(path).map_err(|e| CovError::ConfigRead {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        parse_ini(&ini)
    }

    /// Load configuration from `path`, falling back to defaults if it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, CovError> {
        if !path.exists() {
            tracing::debug!("config {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from(path)
    }

    /// Parse configuration from INI text.
    pub fn from_ini_str(text: &str) -> Result<Self, CovError> {
        let ini = Ini::load_from_str(text).map_err(|e| CovError::ConfigRead {
            path: "<string>".into(),
            message: e.to_string(),
        })?;
        parse_ini(&ini)
    }
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> CovError {
    CovError::Config {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Strip one pair of surrounding double quotes, so `";"` and `;` mean the same.
fn clean_value(value: &str) -> &str {
    let trimmed = value.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    }
}

fn parse_ini(ini: &Ini) -> Result<Config, CovError> {
    let mut config = Config::default();

    // [file] section
    if let Some(section) = ini.section(Some("file")) {
        if let Some(v) = section.get("delimiter") {
            let v = clean_value(v);
            if v.is_empty() {
                return Err(invalid("file", "delimiter", v, "must not be empty"));
            }
            config.ingest.delimiter = v.to_string();
        }
        if let Some(v) = section.get("file_extension") {
            config.ingest.file_extension = clean_value(v).to_string();
        }
    }

    // [analysis] section
    if let Some(section) = ini.section(Some("analysis")) {
        if let Some(v) = section.get("radius_m") {
            let v = clean_value(v);
            let radius: f64 = v
                .parse()
                .map_err(|_| invalid("analysis", "radius_m", v, "must be a number"))?;
            if !(radius > 0.0 && radius.is_finite()) {
                return Err(invalid("analysis", "radius_m", v, "must be positive"));
            }
            config.analysis.radius_m = Some(radius);
        }
        if let Some(v) = section.get("engine") {
            let v = clean_value(v);
            config.analysis.engine = v.parse().map_err(|_| {
                invalid(
                    "analysis",
                    "engine",
                    v,
                    "must be one of: auto, brute-force, bucketed",
                )
            })?;
        }
        if let Some(v) = section.get("max_cells") {
            let v = clean_value(v);
            let max_cells: usize = v
                .parse()
                .map_err(|_| invalid("analysis", "max_cells", v, "must be a positive integer"))?;
            if max_cells == 0 {
                return Err(invalid("analysis", "max_cells", v, "must be a positive integer"));
            }
            config.analysis.max_cells = max_cells;
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.ingest.delimiter, ";");
        assert_eq!(config.ingest.file_extension, ".txt");
        assert_eq!(config.analysis.engine, Engine::Auto);
        assert_eq!(config.analysis.radius_m, None);
        assert_eq!(config.analysis.max_cells, usize::MAX);
    }

    #[test]
    fn test_overrides_and_quotes() {
        let config = Config::from_ini_str(
            "[file]\ndelimiter = \",\"\nfile_extension = .log\n\n[analysis]\nradius_m = 2.5\nengine = brute-force\nmax_cells = 1000\n",
        )
        .unwrap();
        assert_eq!(config.ingest.delimiter, ",");
        assert_eq!(config.ingest.file_extension, ".log");
        assert_eq!(config.analysis.radius_m, Some(2.5));
        assert_eq!(config.analysis.engine, Engine::BruteForce);
        assert_eq!(config.analysis.max_cells, 1000);
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = Config::from_ini_str("[analysis]\nradius_m = -1\n").unwrap_err();
        assert!(matches!(err, CovError::Config { ref key, .. } if key == "radius_m"));

        let err = Config::from_ini_str("[analysis]\nengine = fastest\n").unwrap_err();
        assert!(matches!(err, CovError::Config { ref key, .. } if key == "engine"));

        let err = Config::from_ini_str("[file]\ndelimiter = \"\"\n").unwrap_err();
        assert!(matches!(err, CovError::Config { ref key, .. } if key == "delimiter"));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Config::load_or_default(Path::new("/definitely/not/here.ini")).unwrap();
        assert_eq!(config, Config::default());
        assert!(Config::load_from(Path::new("/definitely/not/here.ini")).is_err());
    }
}
