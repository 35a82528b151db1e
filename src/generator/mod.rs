//! Generator Boundary - Capability Traits
//!
//! The generator decodes, transforms, caches and writes derived images. The
//! facade only decides which spec to ask for and what to do when it fails,
//! so everything behind these traits can be swapped without touching it.

mod local;

pub use local::{LocalGenerator, LocalPicture};

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("Source image not found: {0}")]
    SourceNotFound(String),

    #[error("Invalid image spec: {0}")]
    InvalidSpec(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    /// Signature or other request verification failure.
    #[error("Security check failed: {0}")]
    Security(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GeneratorError {
    pub fn is_security(&self) -> bool {
        matches!(self, Self::Security(_))
    }
}

/// Inbound request for a derived image, as seen by the serving entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRequest {
    /// Raw `image@query` spec from the request path.
    pub spec: String,
    /// Signature presented with the request.
    #[serde(default)]
    pub token: Option<String>,
}

impl ImageRequest {
    pub fn new(spec: impl Into<String>) -> Self {
        Self { spec: spec.into(), token: None }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// A materialized (possibly cached) derived image.
pub trait ResolvedPicture: fmt::Debug + Send + Sync {
    /// Servable URL, if the generator can address this picture.
    fn url(&self) -> Option<String>;

    /// Where the derived file lives (or will live) on disk.
    fn storage_path(&self) -> PathBuf;

    /// Write the derived file to `path`.
    fn save(&self, path: &Path) -> Result<(), GeneratorError>;

    /// Emit the raw bytes.
    fn output(&self, out: &mut dyn Write) -> Result<(), GeneratorError>;
}

/// Image generation backend.
pub trait Generator: Send + Sync {
    fn load(&self, spec: &str) -> Result<Box<dyn ResolvedPicture>, GeneratorError>;

    /// Backend-level fallback image, consulted when the facade has none.
    fn fallback_image(&self) -> Option<&str> {
        None
    }

    /// The raw spec the inbound request asked for.
    fn request_image_query<'a>(&self, request: &'a ImageRequest) -> &'a str {
        &request.spec
    }

    /// Handle a request end to end, writing the body to `out`.
    ///
    /// Must not write to `out` unless it returns `Ok`: on failure the facade
    /// may write a fallback body to the same writer.
    fn serve_response(
        &self,
        request: &ImageRequest,
        out: &mut dyn Write,
    ) -> Result<(), GeneratorError>;
}

impl<G: Generator + ?Sized> Generator for Arc<G> {
    fn load(&self, spec: &str) -> Result<Box<dyn ResolvedPicture>, GeneratorError> {
        (**self).load(spec)
    }

    fn fallback_image(&self) -> Option<&str> {
        (**self).fallback_image()
    }

    fn request_image_query<'a>(&self, request: &'a ImageRequest) -> &'a str {
        (**self).request_image_query(request)
    }

    fn serve_response(
        &self,
        request: &ImageRequest,
        out: &mut dyn Write,
    ) -> Result<(), GeneratorError> {
        (**self).serve_response(request, out)
    }
}
