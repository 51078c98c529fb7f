//! Request-independent authorization policy: whitelist and path aliases.

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::permissions::ANY_METHOD;

pub const DEFAULT_ALIAS_SUFFIXES: &[&str] = &["/search-columns"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("invalid whitelist pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("whitelist pattern '{0}' lists no methods")]
    NoMethods(String),
}

/// HTTP methods a whitelist entry applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodSet {
    Any,
    Only(Vec<String>),
}

impl MethodSet {
    /// Build from a list of method names; any `*` makes the set unrestricted.
    pub fn from_list<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut only = Vec::new();
        for m in methods {
            let m = m.as_ref().trim();
            if m == ANY_METHOD {
                return Self::Any;
            }
            if !m.is_empty() {
                only.push(m.to_ascii_uppercase());
            }
        }
        Self::Only(only)
    }

    pub fn contains(&self, method: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Only(list) => list.iter().any(|m| m.eq_ignore_ascii_case(method)),
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, Self::Only(list) if list.is_empty())
    }
}

#[derive(Debug, Clone)]
struct WhitelistEntry {
    source: String,
    pattern: Regex,
    methods: MethodSet,
}

/// URL patterns any authenticated principal may reach.
///
/// Patterns are regular expressions anchored at the start of the path.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    entries: Vec<WhitelistEntry>,
}

impl Whitelist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(mut self, pattern: &str, methods: MethodSet) -> Result<Self, PolicyError> {
        if methods.is_empty() {
            return Err(PolicyError::NoMethods(pattern.to_string()));
        }
        let compiled = Regex::new(&format!("^(?:{pattern})")).map_err(|e| PolicyError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        self.entries.push(WhitelistEntry {
            source: pattern.to_string(),
            pattern: compiled,
            methods,
        });
        Ok(self)
    }

    /// The source pattern of the first matching entry.
    pub fn matching(&self, path: &str, method: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.methods.contains(method) && e.pattern.is_match(path))
            .map(|e| e.source.as_str())
    }

    pub fn patterns(&self) -> impl Iterator<Item = (&str, &MethodSet)> {
        self.entries.iter().map(|e| (e.source.as_str(), &e.methods))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything the decision needs besides the principal and the request.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    pub whitelist: Whitelist,
    alias_suffixes: Vec<String>,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::new(Whitelist::default(), DEFAULT_ALIAS_SUFFIXES.iter().copied())
    }
}

impl AccessPolicy {
    pub fn new<I, S>(whitelist: Whitelist, alias_suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let alias_suffixes = alias_suffixes
            .into_iter()
            .map(|s| s.as_ref().trim().trim_start_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .map(|s| format!("/{s}"))
            .collect();
        Self {
            whitelist,
            alias_suffixes,
        }
    }

    pub fn alias_suffixes(&self) -> &[String] {
        &self.alias_suffixes
    }

    /// Rewrite an alias path to the path it shares permissions with.
    ///
    /// `/users/search-columns` becomes `/users/`: the suffix is dropped but
    /// the separating slash is kept so prefix grants like `users/` still match.
    pub fn canonical_path<'a>(&self, path: &'a str) -> std::borrow::Cow<'a, str> {
        for suffix in &self.alias_suffixes {
            if let Some(base) = path.strip_suffix(suffix.as_str()) {
                return std::borrow::Cow::Owned(format!("{base}/"));
            }
        }
        std::borrow::Cow::Borrowed(path)
    }
}
