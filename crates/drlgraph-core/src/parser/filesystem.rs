//! Filesystem helpers for rule-file discovery and loading.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::errors::{DrlError, DrlResult};

/// Bytes read by [`is_drools_file`] when sniffing content.
const SNIFF_BYTES: u64 = 4096;

const IMPLICIT_IGNORED_DIRS: &[&str] = &[".git", "target", "node_modules"];

static DROOLS_MARKERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?m)^\s*package\s+[\w.]+",
        r"(?m)^\s*import\s+[\w.]+",
        r"(?m)^\s*global\s+\S+\s+\w+",
        r#"(?m)^\s*rule\s+["'\w]"#,
        r#"(?m)^\s*query\s+["'\w]"#,
        r"(?m)^\s*function\s+\S+\s+\w+\s*\(",
        r"(?m)^\s*declare\s+\w+",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

pub(crate) fn glob_match(text: &str, pattern: &str) -> bool {
    let t_chars: Vec<char> = text.chars().collect();
    let p_chars: Vec<char> = pattern.chars().collect();
    let (tl, pl) = (t_chars.len(), p_chars.len());
    let mut dp = vec![vec![false; pl + 1]; tl + 1];
    dp[0][0] = true;
    for j in 1..=pl {
        if p_chars[j - 1] == '*' {
            dp[0][j] = dp[0][j - 1];
        }
    }
    for i in 1..=tl {
        for j in 1..=pl {
            if p_chars[j - 1] == '*' {
                dp[i][j] = dp[i][j - 1] || dp[i - 1][j];
            } else if p_chars[j - 1] == '?' || t_chars[i - 1] == p_chars[j - 1] {
                dp[i][j] = dp[i - 1][j - 1];
            }
        }
    }
    dp[tl][pl]
}

/// Match against the relative path and against the bare file name.
fn matches_pattern(rel_path: &str, pattern: &str) -> bool {
    let normalized = rel_path.replace('\\', "/");
    let file_name = Path::new(&normalized)
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_default();
    glob_match(&normalized, pattern) || glob_match(&file_name, pattern)
}

fn is_excluded(rel_path: &str, exclude_patterns: &[String]) -> bool {
    exclude_patterns.iter().any(|pattern| {
        let p = pattern.trim().trim_end_matches('/');
        let p = p.strip_prefix("./").unwrap_or(p);
        !p.is_empty() && (matches_pattern(rel_path, p) || rel_path.starts_with(&format!("{p}/")))
    })
}

/// Files under `root` whose name matches `file_pattern`, sorted by path.
pub fn collect_rule_files(
    root: &Path,
    file_pattern: &str,
    recursive: bool,
    exclude_patterns: &[String],
) -> DrlResult<Vec<PathBuf>> {
    if !root.exists() {
        return Err(DrlError::FileNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(DrlError::NotADirectory(root.to_path_buf()));
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let walker = WalkDir::new(root)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !IMPLICIT_IGNORED_DIRS
                    .iter()
                    .any(|d| entry.file_name().to_string_lossy() == *d)
        });

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let rel = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        if is_excluded(&rel, exclude_patterns) {
            debug!("Excluded {}", rel);
            continue;
        }
        if matches_pattern(&rel, file_pattern) {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Read a source file as text. Invalid UTF-8 falls back to a Latin-1
/// decoding when `latin1_fallback` is set.
pub fn read_source(path: &Path, latin1_fallback: bool) -> DrlResult<String> {
    if !path.exists() {
        return Err(DrlError::FileNotFound(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(DrlError::NotAFile(path.to_path_buf()));
    }
    let bytes = std::fs::read(path).map_err(|e| DrlError::from_io(path, e))?;
    decode_source(path, bytes, latin1_fallback)
}

pub(crate) fn decode_source(
    path: &Path,
    bytes: Vec<u8>,
    latin1_fallback: bool,
) -> DrlResult<String> {
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(err) if latin1_fallback => {
            warn!("UTF-8 decoding failed for {}, trying latin-1", path.display());
            Ok(err.into_bytes().iter().map(|&b| b as char).collect())
        }
        Err(_) => Err(DrlError::Decode(path.to_path_buf())),
    }
}

pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Sniff the first 4 KiB for DRL declarations.
pub fn is_drools_file(path: &Path) -> bool {
    let mut buffer = Vec::new();
    let read = std::fs::File::open(path)
        .and_then(|file| file.take(SNIFF_BYTES).read_to_end(&mut buffer));
    if let Err(e) = read {
        warn!("Error checking if {} is a Drools file: {}", path.display(), e);
        return false;
    }
    let head = String::from_utf8_lossy(&buffer);
    DROOLS_MARKERS.iter().any(|marker| marker.is_match(&head))
}

pub fn has_drl_extension(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case("drl"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("rules.drl", "*.drl"));
        assert!(glob_match("a/b/rules.drl", "*.drl"));
        assert!(glob_match("r1.drl", "r?.drl"));
        assert!(!glob_match("rules.txt", "*.drl"));
    }

    #[test]
    fn test_collect_rule_files_recursive_and_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("nested/deeper")).unwrap();
        std::fs::create_dir_all(root.join("legacy")).unwrap();
        std::fs::write(root.join("a.drl"), "package a;").unwrap();
        std::fs::write(root.join("notes.txt"), "x").unwrap();
        std::fs::write(root.join("nested/b.drl"), "package b;").unwrap();
        std::fs::write(root.join("nested/deeper/c.DRL"), "package c;").unwrap();
        std::fs::write(root.join("legacy/old.drl"), "package old;").unwrap();

        let files =
            collect_rule_files(root, "*.drl", true, &["legacy/".to_string()]).unwrap();
        let rel: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(rel, vec!["a.drl", "nested/b.drl"]);

        let flat = collect_rule_files(root, "*.drl", false, &[]).unwrap();
        assert_eq!(flat.len(), 1);
    }

    #[test]
    fn test_collect_rule_files_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            collect_rule_files(&missing, "*.drl", true, &[]),
            Err(DrlError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_read_source_latin1_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin.drl");
        std::fs::write(&path, b"package caf\xe9;").unwrap();
        assert_eq!(read_source(&path, true).unwrap(), "package caf\u{e9};");
        assert!(matches!(read_source(&path, false), Err(DrlError::Decode(_))));
    }

    #[test]
    fn test_is_drools_file() {
        let dir = tempfile::tempdir().unwrap();
        let rules = dir.path().join("rules.txt");
        std::fs::write(&rules, "// header\nrule \"x\" when then end\n").unwrap();
        let other = dir.path().join("other.txt");
        std::fs::write(&other, "just some notes\n").unwrap();
        assert!(is_drools_file(&rules));
        assert!(!is_drools_file(&other));
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash(b"abc"), content_hash(b"abc"));
        assert_ne!(content_hash(b"abc"), content_hash(b"abd"));
        assert_eq!(content_hash(b"").len(), 64);
    }
}
