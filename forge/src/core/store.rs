//! In-memory project file map, the single source of truth during a run.

use std::collections::BTreeMap;

use crate::core::path::{alternate_src_path, normalize_path};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectFileStore {
    files: BTreeMap<String, String>,
}

impl ProjectFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a file. The path is normalized first; the stored key
    /// is returned. Paths that normalize to nothing are rejected with `None`.
    pub fn commit(&mut self, path: &str, content: impl Into<String>) -> Option<String> {
        let key = normalize_path(path);
        if key.is_empty() {
            return None;
        }
        self.files.insert(key.clone(), content.into());
        Some(key)
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    /// Look up `path`, falling back to its `src/`-toggled alternate.
    /// Returns the key that matched with its content.
    pub fn resolve(&self, path: &str) -> Option<(&str, &str)> {
        let key = normalize_path(path);
        let alternate = alternate_src_path(&key);
        [key, alternate].into_iter().find_map(|candidate| {
            self.files
                .get_key_value(candidate.as_str())
                .map(|(k, v)| (k.as_str(), v.as_str()))
        })
    }

    /// Contents of the given paths that exist (alternate lookup applies).
    pub fn snapshot<'a>(&self, paths: impl IntoIterator<Item = &'a String>) -> BTreeMap<String, String> {
        paths
            .into_iter()
            .filter_map(|path| {
                self.resolve(path)
                    .map(|(key, content)| (key.to_string(), content.to_string()))
            })
            .collect()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
