//! Facade Configuration - Validated Once at Startup
//!
//! The file shape is all-optional so that missing required keys surface as a
//! `ConfigurationError` naming the key instead of a serde message.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::policy::ExceptionPolicy;
use crate::templates::QueryTemplateRegistry;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Missing required configuration parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Configuration as written on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFacadeConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub base_path: Option<PathBuf>,
    #[serde(default)]
    pub signing_key: Option<String>,
    #[serde(default)]
    pub fallback_image: Option<String>,
    #[serde(default)]
    pub templates: BTreeMap<String, String>,
    #[serde(default)]
    pub website_url: Option<String>,
    #[serde(default)]
    pub absolute_urls: bool,
    #[serde(default)]
    pub exceptions: ExceptionPolicy,
}

/// Validated, immutable facade configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacadeConfig {
    /// Storage directory for derived files.
    pub path: PathBuf,
    /// URL the storage directory is served from; relative or absolute.
    pub url: String,
    /// Root the source identifiers are resolved against.
    pub base_path: Option<PathBuf>,
    /// Opaque secret forwarded to the generator.
    pub signing_key: String,
    pub fallback_image: Option<String>,
    pub templates: QueryTemplateRegistry,
    pub website_url: Option<String>,
    /// Service-wide default for `resolve_absolute` when the query has no marker.
    pub absolute_urls: bool,
    pub exceptions: ExceptionPolicy,
}

impl FacadeConfig {
    /// Minimal valid configuration.
    pub fn new(
        path: impl Into<PathBuf>,
        url: impl Into<String>,
        signing_key: impl Into<String>,
    ) -> Result<Self, ConfigurationError> {
        RawFacadeConfig {
            path: Some(path.into()),
            url: Some(url.into()),
            signing_key: Some(signing_key.into()),
            ..Default::default()
        }
        .validate()
    }

    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        serde_json::from_str::<RawFacadeConfig>(json)?.validate()
    }

    pub fn with_fallback_image(mut self, image: impl Into<String>) -> Self {
        self.fallback_image = Some(image.into()).filter(|i: &String| !i.is_empty());
        self
    }

    pub fn with_website_url(mut self, url: impl Into<String>) -> Self {
        self.website_url = Some(url.into()).filter(|u: &String| !u.is_empty());
        self
    }

    pub fn with_template(mut self, name: impl Into<String>, query: impl Into<String>) -> Self {
        self.templates.define(name, query);
        self
    }

    pub fn with_exceptions(mut self, policy: ExceptionPolicy) -> Self {
        self.exceptions = policy;
        self
    }

    pub fn with_absolute_urls(mut self, absolute: bool) -> Self {
        self.absolute_urls = absolute;
        self
    }

    /// True when `url` already carries a scheme or is protocol-relative.
    pub fn has_absolute_url(&self) -> bool {
        ["//", "http://", "https://"]
            .iter()
            .any(|prefix| self.url.starts_with(prefix))
    }
}

impl RawFacadeConfig {
    pub fn validate(self) -> Result<FacadeConfig, ConfigurationError> {
        let path = self
            .path
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(ConfigurationError::MissingParameter("path"))?;
        let url = non_empty(self.url).ok_or(ConfigurationError::MissingParameter("url"))?;
        let signing_key =
            non_empty(self.signing_key).ok_or(ConfigurationError::MissingParameter("signingKey"))?;

        Ok(FacadeConfig {
            path,
            url,
            base_path: self.base_path,
            signing_key,
            fallback_image: non_empty(self.fallback_image),
            templates: self.templates.into_iter().collect(),
            website_url: non_empty(self.website_url),
            absolute_urls: self.absolute_urls,
            exceptions: self.exceptions,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
