//! Local filesystem generator.
//!
//! Reference backend for development and tests. It does no pixel work: the
//! derived artifact is the source file stored under a name keyed by the full
//! spec, and URLs are signed so the serving path can reject forged requests.
//!
//! URL shape: `<url>/<digest>.<ext>?p=<base64url spec>&s=<token>`. Tokens
//! always cover the canonical spec (`a.png@` signs as `a.png`).

use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use super::{Generator, GeneratorError, ImageRequest, ResolvedPicture};
use crate::config::FacadeConfig;
use crate::hashing::{
    artifact_digest, decode_spec_param, encode_spec_param, sign_spec, verify_token,
};
use crate::spec::ImageSpec;

#[derive(Debug, Clone)]
pub struct LocalGenerator {
    source_root: PathBuf,
    storage_path: PathBuf,
    storage_url: String,
    signing_key: String,
    fallback_image: Option<String>,
}

impl LocalGenerator {
    pub fn new(
        source_root: impl Into<PathBuf>,
        storage_path: impl Into<PathBuf>,
        storage_url: impl Into<String>,
        signing_key: impl Into<String>,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            storage_path: storage_path.into(),
            storage_url: storage_url.into(),
            signing_key: signing_key.into(),
            fallback_image: None,
        }
    }

    pub fn from_config(config: &FacadeConfig) -> Self {
        let source_root = config.base_path.clone().unwrap_or_else(|| PathBuf::from("."));
        let mut generator = Self::new(
            source_root,
            config.path.clone(),
            config.url.clone(),
            config.signing_key.clone(),
        );
        generator.fallback_image = config.fallback_image.clone();
        generator
    }

    pub fn with_fallback_image(mut self, image: impl Into<String>) -> Self {
        self.fallback_image = Some(image.into());
        self
    }

    /// Signing token a client must present to fetch `spec`.
    pub fn token_for(&self, spec: &str) -> String {
        match ImageSpec::parse(spec) {
            Some(parsed) => sign_spec(&self.signing_key, &parsed.to_string()),
            None => sign_spec(&self.signing_key, spec),
        }
    }

    /// Rebuild the request a URL issued by [`Generator::load`] stands for.
    pub fn request_from_url(&self, url: &str) -> Result<ImageRequest, GeneratorError> {
        let invalid = || GeneratorError::InvalidSpec(url.to_string());
        let (_, query) = url.split_once('?').ok_or_else(invalid)?;

        let mut spec = None;
        let mut token = None;
        for (key, value) in query.split('&').filter_map(|pair| pair.split_once('=')) {
            match key {
                "p" => spec = decode_spec_param(value),
                "s" => token = Some(value.to_string()),
                _ => {}
            }
        }

        let request = ImageRequest::new(spec.ok_or_else(invalid)?);
        Ok(match token {
            Some(token) => request.with_token(token),
            None => request,
        })
    }

    fn source_for(&self, spec: &ImageSpec) -> Result<PathBuf, GeneratorError> {
        let relative = Path::new(spec.image());
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(GeneratorError::InvalidSpec(spec.to_string()));
        }

        let source = self.source_root.join(relative);
        if !source.is_file() {
            return Err(GeneratorError::SourceNotFound(spec.image().to_string()));
        }
        Ok(source)
    }

    fn artifact_name(spec: &ImageSpec) -> String {
        let extension = Path::new(spec.image())
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin");
        format!("{}.{}", artifact_digest(&spec.to_string()), extension)
    }
}

impl Generator for LocalGenerator {
    fn load(&self, spec: &str) -> Result<Box<dyn ResolvedPicture>, GeneratorError> {
        let parsed = ImageSpec::parse(spec)
            .ok_or_else(|| GeneratorError::InvalidSpec(spec.to_string()))?;
        let source = self.source_for(&parsed)?;
        let name = Self::artifact_name(&parsed);
        let canonical = parsed.to_string();

        let url = format!(
            "{}/{}?p={}&s={}",
            self.storage_url.trim_end_matches('/'),
            name,
            encode_spec_param(&canonical),
            sign_spec(&self.signing_key, &canonical),
        );

        Ok(Box::new(LocalPicture {
            source,
            storage: self.storage_path.join(name),
            url,
        }))
    }

    fn fallback_image(&self) -> Option<&str> {
        self.fallback_image.as_deref()
    }

    fn serve_response(
        &self,
        request: &ImageRequest,
        out: &mut dyn Write,
    ) -> Result<(), GeneratorError> {
        let raw = self.request_image_query(request);
        let spec = ImageSpec::parse(raw)
            .ok_or_else(|| GeneratorError::InvalidSpec(raw.to_string()))?
            .to_string();
        let token = request
            .token
            .as_deref()
            .ok_or_else(|| GeneratorError::Security(format!("missing signature for {spec}")))?;
        if !verify_token(&self.signing_key, &spec, token) {
            return Err(GeneratorError::Security(format!("invalid signature for {spec}")));
        }

        let picture = self.load(&spec)?;
        let path = picture.storage_path();
        if !path.exists() {
            picture.save(&path)?;
        }
        picture.output(out)
    }
}

#[derive(Debug, Clone)]
pub struct LocalPicture {
    source: PathBuf,
    storage: PathBuf,
    url: String,
}

impl ResolvedPicture for LocalPicture {
    fn url(&self) -> Option<String> {
        Some(self.url.clone())
    }

    fn storage_path(&self) -> PathBuf {
        self.storage.clone()
    }

    fn save(&self, path: &Path) -> Result<(), GeneratorError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&self.source, path)?;
        Ok(())
    }

    fn output(&self, out: &mut dyn Write) -> Result<(), GeneratorError> {
        let from = if self.storage.exists() { &self.storage } else { &self.source };
        out.write_all(&fs::read(from)?)?;
        Ok(())
    }
}
