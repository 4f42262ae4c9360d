//! File and directory parsing with Rayon-based parallelism.

use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ParserConfig;
use crate::errors::{DrlError, DrlResult};
use crate::models::RuleFile;
use crate::parser::diagnostics::{Diagnostic, DiagnosticSummary, Diagnostics};
use crate::parser::filesystem::{
    collect_rule_files, content_hash, decode_source, has_drl_extension, is_drools_file,
};
use crate::parser::parse_into;

/// A successfully parsed file and the SHA-256 of its raw bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedFile {
    pub rule_file: RuleFile,
    pub content_hash: String,
}

/// A file that could not be read or decoded during a directory parse.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: String,
    pub kind: String,
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryParse {
    pub files: Vec<ParsedFile>,
    pub failures: Vec<FileFailure>,
}

impl DirectoryParse {
    pub fn rule_files(&self) -> impl Iterator<Item = &RuleFile> {
        self.files.iter().map(|f| &f.rule_file)
    }
}

struct FileOutcome {
    path: PathBuf,
    result: DrlResult<ParsedFile>,
    diagnostics: Diagnostics,
}

fn parse_one(path: &Path, latin1_fallback: bool) -> FileOutcome {
    let mut diagnostics = Diagnostics::new();
    let result = load_and_parse(path, latin1_fallback, &mut diagnostics);
    FileOutcome {
        path: path.to_path_buf(),
        result,
        diagnostics,
    }
}

fn load_and_parse(
    path: &Path,
    latin1_fallback: bool,
    diagnostics: &mut Diagnostics,
) -> DrlResult<ParsedFile> {
    if !path.exists() {
        return Err(DrlError::FileNotFound(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(DrlError::NotAFile(path.to_path_buf()));
    }
    if !has_drl_extension(path) {
        warn!(
            "File {} does not have .drl extension, but attempting to parse anyway",
            path.display()
        );
    }
    let bytes = std::fs::read(path).map_err(|e| DrlError::from_io(path, e))?;
    let hash = content_hash(&bytes);
    let text = decode_source(path, bytes, latin1_fallback)?;
    let path_str = path.to_string_lossy().to_string();
    let rule_file = parse_into(&text, &path_str, diagnostics);
    Ok(ParsedFile {
        rule_file,
        content_hash: hash,
    })
}

/// Stateful parser front end. Each top-level call resets the collected
/// diagnostics.
#[derive(Debug, Default)]
pub struct DrlParser {
    config: ParserConfig,
    diagnostics: Diagnostics,
}

impl DrlParser {
    pub fn new(config: ParserConfig) -> Self {
        Self {
            config,
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parse in-memory text, replacing the collected diagnostics.
    pub fn parse_text(&mut self, text: &str, path: &str) -> RuleFile {
        self.diagnostics.reset();
        let rule_file = parse_into(text, path, &mut self.diagnostics);
        self.diagnostics.log_summary();
        rule_file
    }

    pub fn parse_file(&mut self, path: impl AsRef<Path>) -> DrlResult<ParsedFile> {
        let path = path.as_ref();
        info!("Parsing file: {}", path.display());
        self.diagnostics.reset();
        let result = load_and_parse(path, self.config.latin1_fallback, &mut self.diagnostics);
        match &result {
            Ok(parsed) => {
                if self.diagnostics.is_empty() {
                    info!(
                        "Successfully parsed {}: {} rules, {} imports, {} globals, {} queries, {} functions, {} declared types",
                        path.display(),
                        parsed.rule_file.rules.len(),
                        parsed.rule_file.imports.len(),
                        parsed.rule_file.globals.len(),
                        parsed.rule_file.queries.len(),
                        parsed.rule_file.functions.len(),
                        parsed.rule_file.declared_types.len()
                    );
                } else {
                    self.diagnostics.log_summary();
                }
            }
            Err(err) => {
                self.diagnostics
                    .record(Diagnostic::from_file_error(err, &path.to_string_lossy()));
            }
        }
        result
    }

    /// Parse every matching file under `dir`. A file that cannot be read is
    /// recorded as a failure and the batch continues.
    pub fn parse_directory(&mut self, dir: impl AsRef<Path>) -> DrlResult<DirectoryParse> {
        let dir = dir.as_ref();
        let started = Instant::now();
        info!(
            "Parsing directory: {} (recursive={}, pattern={}, validate={})",
            dir.display(),
            self.config.recursive,
            self.config.file_pattern,
            self.config.validate_files
        );
        self.diagnostics.reset();

        let mut paths = collect_rule_files(
            dir,
            &self.config.file_pattern,
            self.config.recursive,
            &self.config.exclude_patterns,
        )?;
        if paths.is_empty() {
            warn!(
                "No files matching '{}' found in {}",
                self.config.file_pattern,
                dir.display()
            );
            return Ok(DirectoryParse::default());
        }
        info!("Found {} files matching '{}'", paths.len(), self.config.file_pattern);

        if self.config.validate_files && self.config.file_pattern != "*.drl" {
            let before = paths.len();
            paths.retain(|p| {
                let keep = is_drools_file(p);
                if !keep {
                    debug!("Skipping non-Drools file: {}", p.display());
                }
                keep
            });
            if paths.len() < before {
                info!("Filtered out {} non-Drools files", before - paths.len());
            }
        }

        let outcomes = self.run_parallel(&paths);

        let mut parsed = DirectoryParse::default();
        for outcome in outcomes {
            self.diagnostics.merge(outcome.diagnostics);
            match outcome.result {
                Ok(file) => {
                    debug!("Successfully parsed {}", outcome.path.display());
                    parsed.files.push(file);
                }
                Err(err) => {
                    let path = outcome.path.to_string_lossy().to_string();
                    self.diagnostics.record(Diagnostic::from_file_error(&err, &path));
                    parsed.failures.push(FileFailure {
                        path,
                        kind: err.kind_name().to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }

        self.diagnostics.log_summary();
        info!(
            "Parsed {} files ({} failed) in {} ms",
            parsed.files.len(),
            parsed.failures.len(),
            started.elapsed().as_millis()
        );
        Ok(parsed)
    }

    /// Outcomes are returned in the order of `paths`.
    fn run_parallel(&self, paths: &[PathBuf]) -> Vec<FileOutcome> {
        let latin1 = self.config.latin1_fallback;
        if self.config.workers <= 1 || paths.len() < 2 {
            return paths.iter().map(|p| parse_one(p, latin1)).collect();
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build();
        match pool {
            Ok(pool) => pool.install(|| paths.par_iter().map(|p| parse_one(p, latin1)).collect()),
            Err(e) => {
                warn!("Could not build parser thread pool ({}), parsing sequentially", e);
                paths.iter().map(|p| parse_one(p, latin1)).collect()
            }
        }
    }

    pub fn is_drools_file(&self, path: impl AsRef<Path>) -> bool {
        is_drools_file(path.as_ref())
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.diagnostics.entries()
    }

    pub fn summary(&self) -> DiagnosticSummary {
        self.diagnostics.summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::diagnostics::DiagnosticCategory;

    fn write(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_parse_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let mut parser = DrlParser::default();
        let err = parser.parse_file(dir.path().join("missing.drl")).unwrap_err();
        assert!(matches!(err, DrlError::FileNotFound(_)));
        assert_eq!(parser.summary().count(DiagnosticCategory::File), 1);
    }

    #[test]
    fn test_parse_file_resets_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let bad = write(dir.path(), "bad.drl", b"rule \"X\" when end");
        let good = write(dir.path(), "good.drl", b"package p;\nrule \"Y\" when then end\n");
        let mut parser = DrlParser::default();
        parser.parse_file(&bad).unwrap();
        assert!(!parser.diagnostics().is_empty());
        let parsed = parser.parse_file(&good).unwrap();
        assert!(parser.diagnostics().is_empty());
        assert_eq!(parsed.rule_file.rules.len(), 1);
        assert_eq!(parsed.content_hash.len(), 64);
    }

    #[test]
    fn test_parse_directory_parallel_matches_sequential() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..6 {
            let body = format!(
                "package p{i};\nrule \"R{i}\" when $c : Customer(age > {i}) then $c.ok(); end\nrule \"Broken{i}\" when end\n"
            );
            write(dir.path(), &format!("sub/r{i}.drl"), body.as_bytes());
        }

        let mut sequential = DrlParser::new(ParserConfig::default());
        let seq = sequential.parse_directory(dir.path()).unwrap();

        let mut parallel = DrlParser::new(ParserConfig {
            workers: 4,
            ..ParserConfig::default()
        });
        let par = parallel.parse_directory(dir.path()).unwrap();

        assert_eq!(seq, par);
        assert_eq!(seq.files.len(), 6);
        assert_eq!(sequential.diagnostics(), parallel.diagnostics());
        assert_eq!(sequential.summary().count(DiagnosticCategory::Rule), 6);
    }

    #[test]
    fn test_parse_directory_records_undecodable_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "ok.drl", b"package ok;\n");
        write(dir.path(), "bad.drl", b"package caf\xe9;\n");
        let mut parser = DrlParser::new(ParserConfig {
            latin1_fallback: false,
            ..ParserConfig::default()
        });
        let parsed = parser.parse_directory(dir.path()).unwrap();
        assert_eq!(parsed.files.len(), 1);
        assert_eq!(parsed.failures.len(), 1);
        assert_eq!(parsed.failures[0].kind, "DecodeError");
        assert!(!parser.diagnostics()[0].recoverable);
    }

    #[test]
    fn test_parse_directory_validates_custom_pattern() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "rules.txt", b"package p;\nrule \"A\" when then end\n");
        write(dir.path(), "readme.txt", b"nothing to see\n");
        let mut parser = DrlParser::new(ParserConfig {
            file_pattern: "*.txt".to_string(),
            ..ParserConfig::default()
        });
        let parsed = parser.parse_directory(dir.path()).unwrap();
        assert_eq!(parsed.files.len(), 1);
        assert_eq!(parsed.files[0].rule_file.rules[0].name, "A");
    }

    #[test]
    fn test_parse_directory_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "a.drl", b"package a;");
        let mut parser = DrlParser::default();
        assert!(matches!(
            parser.parse_directory(&file),
            Err(DrlError::NotADirectory(_))
        ));
    }
}
