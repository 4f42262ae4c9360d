//! In-memory repository keyed by file path.

use indexmap::IndexMap;

use crate::errors::DrlResult;
use crate::models::RuleFile;
use crate::store::RuleRepository;

#[derive(Clone, Debug, Default)]
pub struct InMemoryRepository {
    files: IndexMap<String, RuleFile>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_files(files: impl IntoIterator<Item = RuleFile>) -> Self {
        let mut repo = Self::new();
        for file in files {
            repo.upsert_file(file);
        }
        repo
    }

    /// Insert or wholesale-replace the file at `file.path`. A replaced file
    /// moves to the end of the repository order.
    pub fn upsert_file(&mut self, file: RuleFile) -> Option<RuleFile> {
        let previous = self.files.shift_remove(&file.path);
        self.files.insert(file.path.clone(), file);
        previous
    }

    pub fn remove_file(&mut self, path: &str) -> Option<RuleFile> {
        self.files.shift_remove(path)
    }

    pub fn file(&self, path: &str) -> Option<&RuleFile> {
        self.files.get(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl RuleRepository for InMemoryRepository {
    fn rule_files(&self) -> DrlResult<Vec<RuleFile>> {
        Ok(self.files.values().cloned().collect())
    }
}
