//! ImageFacade Core - Derived Image URLs and Fallback Serving
//!
//! # Guarantees
//! 1. Templates Expand Exactly, Or Not At All
//! 2. The Generator Is A Capability, Not A Dependency
//! 3. Configuration Fails At Startup, Never Per Request
//! 4. Security Failures Are Logged, Never Explained
//! 5. Every Recovered Failure Ends As Not-Found

pub mod templates;
pub mod spec;
pub mod hashing;
pub mod generator;
pub mod config;
pub mod policy;
pub mod resolver;
pub mod fallback;
pub mod pipeline;

#[cfg(test)]
mod test_helpers;

pub use templates::{QueryTemplateRegistry, TemplateName};
pub use spec::ImageSpec;
pub use generator::{Generator, GeneratorError, ImageRequest, LocalGenerator, ResolvedPicture};
pub use config::{ConfigurationError, FacadeConfig};
pub use policy::{ExceptionPolicy, FailureLogger, FailureRecord, TracingFailureLogger};
pub use resolver::{PictureUrl, Resolution, ResolutionError, UrlResolver};
pub use fallback::{FallbackCoordinator, FallbackOutcome};
pub use pipeline::{ImageFacade, ServeError};

pub const FACADE_VERSION: &str = env!("CARGO_PKG_VERSION");
