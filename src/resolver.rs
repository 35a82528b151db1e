//! URL Resolution
//!
//! image + query -> template expansion -> generator -> URL. The URL shape
//! (as the generator reports it, or absolute) is decided per call on top of
//! the service-wide default, since the same image can end up in a page, a
//! static export or an email.

use thiserror::Error;

use crate::config::FacadeConfig;
use crate::generator::{Generator, GeneratorError, ResolvedPicture};
use crate::spec::ImageSpec;

/// Query prefix requesting an absolute URL.
///
/// There is no escape for a literal query starting with `//`; such a query
/// would need a reserved-prefix rule in the query grammar.
pub const ABSOLUTE_MARKER: &str = "//";

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("Image identifier must not be empty")]
    EmptyImage,

    #[error("No URL for resolved picture: {0}")]
    MissingUrl(String),

    #[error(transparent)]
    Generator(#[from] GeneratorError),
}

/// Outcome of [`UrlResolver::resolve`].
#[derive(Debug)]
pub struct Resolution {
    /// Spec handed to the generator.
    pub spec: ImageSpec,
    pub url: Option<String>,
    pub picture: Box<dyn ResolvedPicture>,
}

/// Complete result of a strict resolution.
#[derive(Debug)]
pub struct PictureUrl {
    image: String,
    query: Option<String>,
    picture: Box<dyn ResolvedPicture>,
    url: String,
}

impl PictureUrl {
    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn picture(&self) -> &dyn ResolvedPicture {
        self.picture.as_ref()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn into_picture(self) -> Box<dyn ResolvedPicture> {
        self.picture
    }
}

pub struct UrlResolver<'a> {
    config: &'a FacadeConfig,
    generator: &'a dyn Generator,
}

impl<'a> UrlResolver<'a> {
    pub fn new(config: &'a FacadeConfig, generator: &'a dyn Generator) -> Self {
        Self { config, generator }
    }

    /// Expand the query and join it to the image.
    pub fn spec_for(&self, image: &str, query: Option<&str>) -> Result<ImageSpec, ResolutionError> {
        let expanded = query.map(|q| self.config.templates.expand(q));
        ImageSpec::new(image, expanded).ok_or(ResolutionError::EmptyImage)
    }

    pub fn resolve(&self, image: &str, query: Option<&str>) -> Result<Resolution, ResolutionError> {
        let spec = self.spec_for(image, query)?;
        tracing::debug!(spec = %spec, "resolving image");

        let picture = self.generator.load(&spec.to_string())?;
        let url = picture.url();
        Ok(Resolution { spec, url, picture })
    }

    /// Like [`resolve`](Self::resolve), but a query starting with
    /// [`ABSOLUTE_MARKER`] (or the `absoluteUrls` default) forces an
    /// absolute URL. A relative storage URL is then prefixed with the
    /// website URL if configured, else made protocol-relative on `host`.
    pub fn resolve_absolute(
        &self,
        image: &str,
        query: Option<&str>,
        host: &str,
    ) -> Result<Option<String>, ResolutionError> {
        let (absolute, query) = match query.and_then(|q| q.strip_prefix(ABSOLUTE_MARKER)) {
            Some(rest) => (true, Some(rest)),
            None => (self.config.absolute_urls, query),
        };

        let Some(url) = self.resolve(image, query)?.url else {
            return Ok(None);
        };
        if !absolute || self.config.has_absolute_url() {
            return Ok(Some(url));
        }

        Ok(Some(match &self.config.website_url {
            Some(website) => format!("{website}{url}"),
            None => format!("//{host}{url}"),
        }))
    }

    /// Strict variant: a missing URL is an error.
    pub fn resolve_detailed(
        &self,
        image: &str,
        query: Option<&str>,
    ) -> Result<PictureUrl, ResolutionError> {
        let Resolution { spec, url, picture } = self.resolve(image, query)?;
        let url = url.ok_or_else(|| ResolutionError::MissingUrl(spec.to_string()))?;

        Ok(PictureUrl {
            image: image.to_string(),
            query: query.map(str::to_string),
            picture,
            url,
        })
    }

    /// Hand the spec straight to the generator, no template expansion.
    pub fn get_picture(&self, spec: &str) -> Result<Box<dyn ResolvedPicture>, ResolutionError> {
        if spec.is_empty() {
            return Err(ResolutionError::EmptyImage);
        }
        Ok(self.generator.load(spec)?)
    }
}
