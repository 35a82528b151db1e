//! Image Facade - Single Entry Point
//!
//! Resolution calls go straight to the resolver and report their own errors.
//! The serving path is the only one governed by the exception policy: every
//! recovered failure ends as a generic not-found, with or without a fallback
//! body.

use std::io::Write;
use std::path::Path;

use thiserror::Error;

use crate::config::{ConfigurationError, FacadeConfig};
use crate::fallback::{FallbackCoordinator, FallbackOutcome};
use crate::generator::{Generator, GeneratorError, ImageRequest, LocalGenerator, ResolvedPicture};
use crate::policy::{FailureLogger, FailureRecord, TracingFailureLogger};
use crate::resolver::{PictureUrl, Resolution, ResolutionError, UrlResolver};

#[derive(Debug, Error)]
pub enum ServeError {
    /// Generic outward signal; never carries the underlying failure.
    #[error("Image not found")]
    NotFound { fallback_served: bool },

    /// Only under the `Throw` policy.
    #[error(transparent)]
    Generation(GeneratorError),
}

impl ServeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether a substitute body was written before the not-found.
    pub fn fallback_served(&self) -> bool {
        matches!(self, Self::NotFound { fallback_served: true })
    }
}

/// The facade - single entry point for URL resolution and serving
pub struct ImageFacade {
    config: FacadeConfig,
    generator: Box<dyn Generator>,
    logger: Box<dyn FailureLogger>,
}

impl ImageFacade {
    /// Facade over the bundled [`LocalGenerator`].
    pub fn new(config: FacadeConfig) -> Self {
        let generator = LocalGenerator::from_config(&config);
        Self::with_generator(config, generator)
    }

    /// Facade over a custom generator.
    pub fn with_generator(config: FacadeConfig, generator: impl Generator + 'static) -> Self {
        Self {
            config,
            generator: Box::new(generator),
            logger: Box::new(TracingFailureLogger),
        }
    }

    pub fn from_config_file(path: &Path) -> Result<Self, ConfigurationError> {
        Ok(Self::new(FacadeConfig::load(path)?))
    }

    pub fn with_logger(mut self, logger: impl FailureLogger + 'static) -> Self {
        self.logger = Box::new(logger);
        self
    }

    pub fn config(&self) -> &FacadeConfig {
        &self.config
    }

    pub fn generator(&self) -> &dyn Generator {
        self.generator.as_ref()
    }

    pub fn resolver(&self) -> UrlResolver<'_> {
        UrlResolver::new(&self.config, self.generator.as_ref())
    }

    pub fn fallback(&self) -> FallbackCoordinator<'_> {
        FallbackCoordinator::new(&self.config, self.generator.as_ref())
    }

    pub fn resolve(&self, image: &str, query: Option<&str>) -> Result<Resolution, ResolutionError> {
        self.resolver().resolve(image, query)
    }

    pub fn resolve_absolute(
        &self,
        image: &str,
        query: Option<&str>,
        host: &str,
    ) -> Result<Option<String>, ResolutionError> {
        self.resolver().resolve_absolute(image, query, host)
    }

    pub fn resolve_detailed(
        &self,
        image: &str,
        query: Option<&str>,
    ) -> Result<PictureUrl, ResolutionError> {
        self.resolver().resolve_detailed(image, query)
    }

    pub fn get_picture(&self, spec: &str) -> Result<Box<dyn ResolvedPicture>, ResolutionError> {
        self.resolver().get_picture(spec)
    }

    /// Serve an inbound image request, writing the body to `out`.
    ///
    /// Security failures are logged to the security channel and always
    /// become not-found, whatever the policy.
    pub fn serve_request(
        &self,
        request: &ImageRequest,
        out: &mut dyn Write,
    ) -> Result<(), ServeError> {
        let err = match self.generator.serve_response(request, out) {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        if err.is_security() {
            self.logger.record(&FailureRecord::security(&err));
            return Err(ServeError::NotFound { fallback_served: false });
        }

        if self.config.exceptions.propagates() {
            return Err(ServeError::Generation(err));
        }
        if let Some(record) = self.config.exceptions.record_for(&err) {
            self.logger.record(&record);
        }

        let fallback_served = match self.fallback().serve(request, out) {
            Ok(FallbackOutcome::Served { .. }) => true,
            Ok(FallbackOutcome::NotConfigured) => false,
            Err(fallback_err) => {
                tracing::debug!(
                    spec = %request.spec,
                    error = %fallback_err,
                    "fallback image could not be served"
                );
                false
            }
        };

        Err(ServeError::NotFound { fallback_served })
    }
}
