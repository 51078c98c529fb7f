//! Effective permission sets.
//!
//! A permission is a `(path pattern, method)` pair, optionally tagged with the
//! menu that granted it. Sets are purely additive: there are no deny rules.

use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};

use xadmin_core::MenuId;

/// Wildcard method accepted by permission entries and the whitelist.
pub const ANY_METHOD: &str = "*";

/// One grant as returned by the permission query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionEntry {
    /// Menu that granted this entry; `None` for direct data permissions.
    pub menu_id: Option<MenuId>,
    pub path: String,
    pub method: String,
}

impl PermissionEntry {
    pub fn new(path: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            menu_id: None,
            path: path.into(),
            method: method.into(),
        }
    }

    pub fn with_menu(mut self, menu_id: MenuId) -> Self {
        self.menu_id = Some(menu_id);
        self
    }

    pub fn allows_method(&self, method: &str) -> bool {
        let own = self.method.trim();
        own == ANY_METHOD || own.eq_ignore_ascii_case(method)
    }
}

/// Anchor a stored path as `^/<path>`.
///
/// Stored paths may or may not carry a leading slash; both forms anchor the
/// same way.
pub fn anchored_pattern(path: &str) -> String {
    format!("^/{}", path.trim().trim_start_matches('/'))
}

/// Compile a stored path the way permission checks will.
pub fn compile_path(path: &str) -> Result<Regex, regex::Error> {
    Regex::new(&anchored_pattern(path))
}

#[derive(Debug, Clone)]
struct CompiledEntry {
    entry: PermissionEntry,
    pattern: Regex,
}

/// A principal's effective permissions, with path patterns compiled once.
#[derive(Debug, Clone, Default)]
pub struct PermissionSet {
    entries: Vec<CompiledEntry>,
}

impl PermissionSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a set from raw entries.
    ///
    /// Duplicate `(path, method)` pairs collapse to the first occurrence.
    /// Entries whose path does not compile are skipped with a warning.
    pub fn from_entries(entries: impl IntoIterator<Item = PermissionEntry>) -> Self {
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut compiled = Vec::new();

        for entry in entries {
            let key = (entry.path.clone(), entry.method.trim().to_ascii_uppercase());
            if !seen.insert(key) {
                continue;
            }
            match compile_path(&entry.path) {
                Ok(pattern) => compiled.push(CompiledEntry { entry, pattern }),
                Err(e) => {
                    tracing::warn!(path = %entry.path, method = %entry.method, error = %e, "skipping invalid permission pattern");
                }
            }
        }

        Self { entries: compiled }
    }

    /// First entry matching `(path, method)`, in insertion order.
    pub fn find_match(&self, path: &str, method: &str) -> Option<&PermissionEntry> {
        self.entries
            .iter()
            .find(|c| c.entry.allows_method(method) && c.pattern.is_match(path))
            .map(|c| &c.entry)
    }

    pub fn entries(&self) -> impl Iterator<Item = &PermissionEntry> {
        self.entries.iter().map(|c| &c.entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_slash_is_optional_in_stored_paths() {
        assert_eq!(anchored_pattern("api/system/user"), "^/api/system/user");
        assert_eq!(anchored_pattern("/api/system/user"), "^/api/system/user");
    }

    #[test]
    fn matches_prefix_and_method() {
        let set = PermissionSet::from_entries([PermissionEntry::new("/users/", "GET")]);
        assert!(set.find_match("/users/", "GET").is_some());
        assert!(set.find_match("/users/42", "get").is_some());
        assert!(set.find_match("/users/", "DELETE").is_none());
        assert!(set.find_match("/api/users/", "GET").is_none());
    }

    #[test]
    fn wildcard_method_matches_everything() {
        let set = PermissionSet::from_entries([PermissionEntry::new("api/system/role", "*")]);
        assert!(set.find_match("/api/system/role/1", "PATCH").is_some());
    }

    #[test]
    fn regex_paths_are_honoured() {
        let set = PermissionSet::from_entries([PermissionEntry::new(r"api/system/user/[^/]+/roles$", "PUT")]);
        assert!(set.find_match("/api/system/user/abc/roles", "PUT").is_some());
        assert!(set.find_match("/api/system/user/abc/roles/x", "PUT").is_none());
    }

    #[test]
    fn invalid_patterns_are_skipped() {
        let set = PermissionSet::from_entries([
            PermissionEntry::new("api/(unclosed", "GET"),
            PermissionEntry::new("api/ok", "GET"),
        ]);
        assert_eq!(set.len(), 1);
        assert!(set.find_match("/api/ok", "GET").is_some());
    }

    #[test]
    fn duplicates_collapse() {
        let menu = MenuId::new();
        let set = PermissionSet::from_entries([
            PermissionEntry::new("api/a", "GET").with_menu(menu),
            PermissionEntry::new("api/a", "get"),
            PermissionEntry::new("api/a", "POST"),
        ]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.find_match("/api/a", "GET").and_then(|e| e.menu_id), Some(menu));
    }
}
