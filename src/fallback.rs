//! Fallback Substitution
//!
//! When generation fails, the configured fallback image is pushed through the
//! same query so the substitute has the size and crop the page expects.

use std::io::Write;

use crate::config::FacadeConfig;
use crate::generator::{Generator, GeneratorError, ImageRequest};
use crate::spec::ImageSpec;

/// Replace the image part of `<image>@<query>`, keeping the query.
pub fn substitute_spec(raw: &str, fallback: &str) -> String {
    ImageSpec::parse(raw)
        .and_then(|spec| spec.with_image(fallback))
        .map_or_else(|| fallback.to_string(), |spec| spec.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackOutcome {
    /// Substitute bytes were written for this spec.
    Served { spec: String },
    NotConfigured,
}

pub struct FallbackCoordinator<'a> {
    fallback_image: Option<&'a str>,
    generator: &'a dyn Generator,
}

impl<'a> FallbackCoordinator<'a> {
    /// The facade's fallback wins over the generator's own.
    pub fn new(config: &'a FacadeConfig, generator: &'a dyn Generator) -> Self {
        let fallback_image = config
            .fallback_image
            .as_deref()
            .or_else(|| generator.fallback_image());
        Self { fallback_image, generator }
    }

    /// Resolve the fallback for `request`, materialize it if needed and emit
    /// its bytes. Nothing reaches `out` unless the whole body was produced.
    pub fn serve(
        &self,
        request: &ImageRequest,
        out: &mut dyn Write,
    ) -> Result<FallbackOutcome, GeneratorError> {
        let Some(fallback) = self.fallback_image else {
            return Ok(FallbackOutcome::NotConfigured);
        };

        let requested = self.generator.request_image_query(request);
        let spec = substitute_spec(requested, fallback);
        tracing::debug!(requested = %requested, fallback = %spec, "serving fallback image");

        let picture = self.generator.load(&spec)?;
        let path = picture.storage_path();
        if !path.exists() {
            picture.save(&path)?;
        }
        let mut body = Vec::new();
        picture.output(&mut body)?;
        out.write_all(&body)?;

        Ok(FallbackOutcome::Served { spec })
    }
}
