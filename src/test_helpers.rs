//! Shared test fixtures: a generator that records every call.
//!
//! Uses Mutex (not RefCell) so it satisfies the `Send + Sync` bounds on
//! [`Generator`].

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::FacadeConfig;
use crate::generator::{Generator, GeneratorError, ImageRequest, ResolvedPicture};

#[derive(Debug, Default)]
pub struct RecordingGenerator {
    pub loaded: Mutex<Vec<String>>,
    /// Images whose load fails with a generation error.
    pub failing: HashSet<String>,
    /// Specs whose picture has no URL.
    pub url_less: HashSet<String>,
    pub storage_dir: PathBuf,
}

impl RecordingGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, image: &str) -> Self {
        self.failing.insert(image.to_string());
        self
    }

    pub fn without_url(mut self, spec: &str) -> Self {
        self.url_less.insert(spec.to_string());
        self
    }

    pub fn storing_in(mut self, dir: &Path) -> Self {
        self.storage_dir = dir.to_path_buf();
        self
    }

    pub fn loaded(&self) -> Vec<String> {
        self.loaded.lock().unwrap().clone()
    }
}

#[derive(Debug)]
pub struct RecordedPicture {
    spec: String,
    url: Option<String>,
    storage: PathBuf,
}

impl ResolvedPicture for RecordedPicture {
    fn url(&self) -> Option<String> {
        self.url.clone()
    }

    fn storage_path(&self) -> PathBuf {
        self.storage.clone()
    }

    fn save(&self, path: &Path) -> Result<(), GeneratorError> {
        std::fs::write(path, self.spec.as_bytes())?;
        Ok(())
    }

    fn output(&self, out: &mut dyn Write) -> Result<(), GeneratorError> {
        out.write_all(self.spec.as_bytes())?;
        Ok(())
    }
}

impl Generator for RecordingGenerator {
    fn load(&self, spec: &str) -> Result<Box<dyn ResolvedPicture>, GeneratorError> {
        self.loaded.lock().unwrap().push(spec.to_string());
        let image = spec.split('@').next().unwrap_or(spec);
        if self.failing.contains(image) {
            return Err(GeneratorError::Generation(format!("cannot decode {image}")));
        }
        let url = (!self.url_less.contains(spec)).then(|| format!("/cache/{spec}"));
        Ok(Box::new(RecordedPicture {
            spec: spec.to_string(),
            url,
            storage: self.storage_dir.join(spec.replace(['/', '@'], "_")),
        }))
    }

    fn serve_response(
        &self,
        request: &ImageRequest,
        out: &mut dyn Write,
    ) -> Result<(), GeneratorError> {
        self.load(&request.spec)?.output(out)
    }
}

pub fn config(url: &str) -> FacadeConfig {
    FacadeConfig::new("/tmp/cache", url, "secret").unwrap()
}
