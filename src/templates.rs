//! Query Templates - Named Shortcuts
//!
//! `photo.jpg@thumb` instead of the full query. Lookup is exact-name only;
//! anything else is taken as a literal query.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use thiserror::Error;

pub type TemplateName = String;

#[derive(Debug, Error)]
pub enum TemplateLoadError {
    #[error("Failed to read templates: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid templates file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Template registry - filled at startup, read-only afterwards
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryTemplateRegistry {
    templates: BTreeMap<TemplateName, String>,
}

impl QueryTemplateRegistry {
    pub fn new() -> Self {
        Self { templates: BTreeMap::new() }
    }

    /// Load a JSON object of `name -> query`.
    pub fn load_from_file(path: &Path) -> Result<Self, TemplateLoadError> {
        let content = fs::read_to_string(path)?;
        let templates: BTreeMap<TemplateName, String> = serde_json::from_str(&content)?;
        Ok(templates.into_iter().collect())
    }

    /// Register a template. Last write wins.
    pub fn define(&mut self, name: impl Into<TemplateName>, query: impl Into<String>) {
        self.templates.insert(name.into(), query.into());
    }

    /// Expand a registered name to its query; pass anything else through.
    pub fn expand<'a>(&'a self, query: &'a str) -> &'a str {
        self.templates.get(query).map_or(query, String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.templates.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl<N: Into<TemplateName>, Q: Into<String>> FromIterator<(N, Q)> for QueryTemplateRegistry {
    fn from_iter<I: IntoIterator<Item = (N, Q)>>(iter: I) -> Self {
        let mut registry = Self::new();
        for (name, query) in iter {
            registry.define(name, query);
        }
        registry
    }
}
