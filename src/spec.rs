//! Image Spec - `image@query` Addressing
//!
//! A spec names a source image and, optionally, the transformation query the
//! generator applies to it. The query grammar belongs to the generator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between the image identifier and the query.
pub const SPEC_SEPARATOR: char = '@';

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSpec {
    image: String,
    query: Option<String>,
}

impl ImageSpec {
    /// Build a spec. Returns `None` for an empty image identifier; an empty
    /// query is treated as no query at all.
    pub fn new(image: impl Into<String>, query: Option<&str>) -> Option<Self> {
        let image = image.into();
        if image.is_empty() {
            return None;
        }
        Some(Self {
            image,
            query: query.filter(|q| !q.is_empty()).map(str::to_string),
        })
    }

    /// Split a raw spec on its last separator.
    ///
    /// Identifiers are paths and may legitimately contain `@` (`me@2x.png`),
    /// queries never do.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.rsplit_once(SPEC_SEPARATOR) {
            Some((image, query)) => Self::new(image, Some(query)),
            None => Self::new(raw, None),
        }
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Same query, different source image.
    pub fn with_image(&self, image: impl Into<String>) -> Option<Self> {
        Self::new(image, self.query())
    }
}

impl fmt::Display for ImageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.query {
            Some(query) => write!(f, "{}{}{}", self.image, SPEC_SEPARATOR, query),
            None => f.write_str(&self.image),
        }
    }
}
