//! Runtime configuration.
//!
//! Defaults are usable as-is. Values can be loaded from JSON or overridden
//! through `DRLGRAPH_*` environment variables.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{DrlError, DrlResult};

fn default_file_pattern() -> String {
    "*.drl".to_string()
}

fn default_true() -> bool {
    true
}

fn default_workers() -> usize {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserConfig {
    #[serde(default = "default_file_pattern")]
    pub file_pattern: String,
    #[serde(default = "default_true")]
    pub recursive: bool,
    /// Sniff file contents when `file_pattern` is not the DRL default.
    #[serde(default = "default_true")]
    pub validate_files: bool,
    #[serde(default = "default_true")]
    pub latin1_fallback: bool,
    /// Directory parses use a Rayon pool when greater than one.
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            file_pattern: default_file_pattern(),
            recursive: true,
            validate_files: true,
            latin1_fallback: true,
            workers: default_workers(),
            exclude_patterns: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub complexity_threshold: usize,
    pub conflict_salience_window: i64,
    pub weak_conflict_salience_window: i64,
    /// Salience difference reported when either rule has no salience.
    pub unset_salience_sentinel: i64,
    pub high_priority_salience: i64,
    pub aggregator_dependency_count: usize,
    pub high_salience_pattern_limit: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            complexity_threshold: 5,
            conflict_salience_window: 20,
            weak_conflict_salience_window: 10,
            unset_salience_sentinel: 999,
            high_priority_salience: 50,
            aggregator_dependency_count: 3,
            high_salience_pattern_limit: 10,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            parser: ParserConfig::default(),
            analysis: AnalysisConfig::default(),
            log_level: default_log_level(),
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(val) => {
            let v = val.trim().to_lowercase();
            !matches!(v.as_str(), "0" | "false" | "no" | "off")
        }
        Err(_) => default,
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> DrlResult<T> {
    match std::env::var(name) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map_err(|_| DrlError::Config(format!("{name} has an invalid value '{val}'"))),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_json_str(text: &str) -> DrlResult<Self> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> DrlResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| DrlError::from_io(path, e))?;
        Self::from_json_str(&text)
    }

    /// Defaults overridden by any `DRLGRAPH_*` variables that are set.
    pub fn from_env() -> DrlResult<Self> {
        let defaults = Config::default();
        let parser = ParserConfig {
            file_pattern: std::env::var("DRLGRAPH_FILE_PATTERN")
                .unwrap_or(defaults.parser.file_pattern),
            recursive: env_flag("DRLGRAPH_RECURSIVE", defaults.parser.recursive),
            validate_files: env_flag("DRLGRAPH_VALIDATE_FILES", defaults.parser.validate_files),
            latin1_fallback: env_flag("DRLGRAPH_LATIN1_FALLBACK", defaults.parser.latin1_fallback),
            workers: env_parse("DRLGRAPH_WORKERS", defaults.parser.workers)?,
            exclude_patterns: match std::env::var("DRLGRAPH_EXCLUDE") {
                Ok(val) => val
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect(),
                Err(_) => defaults.parser.exclude_patterns,
            },
        };
        let analysis = AnalysisConfig {
            complexity_threshold: env_parse(
                "DRLGRAPH_COMPLEXITY_THRESHOLD",
                defaults.analysis.complexity_threshold,
            )?,
            ..defaults.analysis
        };
        let config = Config {
            parser,
            analysis,
            log_level: std::env::var("DRLGRAPH_LOG_LEVEL").unwrap_or(defaults.log_level),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DrlResult<()> {
        if self.parser.file_pattern.trim().is_empty() {
            return Err(DrlError::Config("file_pattern must not be empty".to_string()));
        }
        if self.parser.workers == 0 {
            return Err(DrlError::Config("workers must be at least 1".to_string()));
        }
        let level = self.log_level.to_lowercase();
        if !matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "warning" | "error") {
            return Err(DrlError::Config(format!("unknown log level '{}'", self.log_level)));
        }
        Ok(())
    }
}
