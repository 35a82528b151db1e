//! Contract Invariant Tests
//!
//! These tests verify the non-negotiable guarantees.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use imagefacade_core::{
    config::ConfigurationError,
    fallback::substitute_spec,
    policy::{MemoryFailureLogger, FACADE_CHANNEL, SECURITY_CHANNEL},
    ExceptionPolicy, FacadeConfig, Generator, GeneratorError, ImageFacade, ImageRequest,
    LocalGenerator, QueryTemplateRegistry, ResolvedPicture, ServeError,
};

/// Records every spec it is asked for. Serving fails with whatever error the
/// test configured.
#[derive(Debug, Default)]
struct ScriptedGenerator {
    loaded: Mutex<Vec<String>>,
    missing: HashSet<String>,
    serve_error: Mutex<Option<GeneratorError>>,
    storage: PathBuf,
}

impl ScriptedGenerator {
    fn new(storage: &Path) -> Self {
        Self { storage: storage.to_path_buf(), ..Default::default() }
    }

    fn missing(mut self, image: &str) -> Self {
        self.missing.insert(image.to_string());
        self
    }

    fn failing_with(self, err: GeneratorError) -> Self {
        *self.serve_error.lock().unwrap() = Some(err);
        self
    }

    fn loaded(&self) -> Vec<String> {
        self.loaded.lock().unwrap().clone()
    }
}

#[derive(Debug)]
struct ScriptedPicture {
    spec: String,
    storage: PathBuf,
}

impl ResolvedPicture for ScriptedPicture {
    fn url(&self) -> Option<String> {
        Some(format!("/media/cache/{}", self.spec))
    }

    fn storage_path(&self) -> PathBuf {
        self.storage.clone()
    }

    fn save(&self, path: &Path) -> Result<(), GeneratorError> {
        fs::write(path, format!("generated {}", self.spec))?;
        Ok(())
    }

    fn output(&self, out: &mut dyn Write) -> Result<(), GeneratorError> {
        out.write_all(&fs::read(&self.storage)?)?;
        Ok(())
    }
}

impl Generator for ScriptedGenerator {
    fn load(&self, spec: &str) -> Result<Box<dyn ResolvedPicture>, GeneratorError> {
        self.loaded.lock().unwrap().push(spec.to_string());
        let image = spec.split('@').next().unwrap_or_default();
        if self.missing.contains(image) {
            return Err(GeneratorError::SourceNotFound(image.to_string()));
        }
        Ok(Box::new(ScriptedPicture {
            spec: spec.to_string(),
            storage: self.storage.join(spec.replace(['/', '@'], "_")),
        }))
    }

    fn serve_response(
        &self,
        request: &ImageRequest,
        out: &mut dyn Write,
    ) -> Result<(), GeneratorError> {
        if let Some(err) = self.serve_error.lock().unwrap().take() {
            return Err(err);
        }
        let picture = self.load(&request.spec)?;
        picture.save(&picture.storage_path())?;
        picture.output(out)
    }
}

fn base_config() -> FacadeConfig {
    FacadeConfig::new("/var/cache/images", "/media/cache", "s3cr3t").unwrap()
}

fn facade_with(
    config: FacadeConfig,
    generator: ScriptedGenerator,
) -> (ImageFacade, Arc<ScriptedGenerator>, Arc<MemoryFailureLogger>) {
    let generator = Arc::new(generator);
    let logger = Arc::new(MemoryFailureLogger::new());
    let facade = ImageFacade::with_generator(config, generator.clone()).with_logger(logger.clone());
    (facade, generator, logger)
}

#[test]
fn invariant_template_expansion_exact_or_verbatim() {
    let registry: QueryTemplateRegistry =
        [("thumb", "100x100,crop"), ("hero", "1600x500")].into_iter().collect();

    for (name, literal) in registry.iter() {
        assert_eq!(registry.expand(name), literal);
    }
    for unknown in ["", "100x100", "Thumb", "thumb ", "hero,thumb"] {
        assert_eq!(registry.expand(unknown), unknown);
    }
}

#[test]
fn invariant_resolve_without_query_delegates_bare_image() {
    let dir = tempfile::tempdir().unwrap();
    let (facade, generator, _) = facade_with(base_config(), ScriptedGenerator::new(dir.path()));

    for image in ["a.jpg", "photos/2024/b.png", "me@2x.png"] {
        facade.resolve(image, None).unwrap();
    }
    assert_eq!(generator.loaded(), vec!["a.jpg", "photos/2024/b.png", "me@2x.png"]);
}

#[test]
fn invariant_resolve_joins_expanded_query() {
    let dir = tempfile::tempdir().unwrap();
    let config = base_config().with_template("thumb", "100x100,crop");
    let (facade, generator, _) = facade_with(config, ScriptedGenerator::new(dir.path()));

    let resolution = facade.resolve("cat.jpg", Some("thumb")).unwrap();
    facade.resolve("cat.jpg", Some("320x0")).unwrap();

    assert_eq!(resolution.spec.to_string(), "cat.jpg@100x100,crop");
    assert_eq!(generator.loaded(), vec!["cat.jpg@100x100,crop", "cat.jpg@320x0"]);
}

#[test]
fn invariant_absolute_url_uses_host_without_website() {
    let dir = tempfile::tempdir().unwrap();
    let (facade, _, _) = facade_with(base_config(), ScriptedGenerator::new(dir.path()));

    let url = facade.resolve_absolute("cat.jpg", Some("//thumb"), "192.0.2.10").unwrap();
    assert_eq!(url.as_deref(), Some("//192.0.2.10/media/cache/cat.jpg@thumb"));
}

#[test]
fn invariant_absolute_url_uses_website_url() {
    let dir = tempfile::tempdir().unwrap();
    let config = base_config().with_website_url("https://www.example.org");
    let (facade, _, _) = facade_with(config, ScriptedGenerator::new(dir.path()));

    let url = facade.resolve_absolute("cat.jpg", Some("//thumb"), "192.0.2.10").unwrap();
    assert_eq!(url.as_deref(), Some("https://www.example.org/media/cache/cat.jpg@thumb"));
}

#[test]
fn invariant_fallback_substitution_preserves_query() {
    assert_eq!(substitute_spec("missing.jpg@thumb", "default.jpg"), "default.jpg@thumb");
}

#[test]
fn invariant_throw_policy_propagates_without_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let config = base_config()
        .with_exceptions(ExceptionPolicy::Throw)
        .with_fallback_image("default.jpg");
    let generator = ScriptedGenerator::new(dir.path()).missing("missing.jpg");
    let (facade, generator, logger) = facade_with(config, generator);

    let mut body = Vec::new();
    let err = facade
        .serve_request(&ImageRequest::new("missing.jpg@thumb"), &mut body)
        .unwrap_err();

    match err {
        ServeError::Generation(GeneratorError::SourceNotFound(image)) => {
            assert_eq!(image, "missing.jpg")
        }
        other => panic!("expected propagated generator error, got {other:?}"),
    }
    assert_eq!(generator.loaded(), vec!["missing.jpg@thumb"]);
    assert!(logger.records().is_empty());
    assert!(body.is_empty());
}

#[test]
fn invariant_logging_policies_log_once_then_fall_back() {
    let policies = [
        (ExceptionPolicy::LogVerbose, FACADE_CHANNEL),
        (ExceptionPolicy::LogToChannel("images".into()), "images"),
    ];

    for (policy, channel) in policies {
        let dir = tempfile::tempdir().unwrap();
        let config = base_config()
            .with_exceptions(policy.clone())
            .with_fallback_image("default.jpg");
        let generator = ScriptedGenerator::new(dir.path()).missing("missing.jpg");
        let (facade, generator, logger) = facade_with(config, generator);

        let mut body = Vec::new();
        let err = facade
            .serve_request(&ImageRequest::new("missing.jpg@thumb"), &mut body)
            .unwrap_err();

        assert!(err.is_not_found(), "{policy}");
        assert!(err.fallback_served(), "{policy}");
        assert_eq!(body, b"generated default.jpg@thumb");
        assert_eq!(generator.loaded(), vec!["missing.jpg@thumb", "default.jpg@thumb"]);

        let records = logger.records();
        assert_eq!(records.len(), 1, "{policy}");
        assert_eq!(records[0].channel, channel);
        assert_eq!(records[0].detail.is_some(), policy == ExceptionPolicy::LogVerbose);
    }
}

#[test]
fn invariant_no_fallback_configured_ends_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let generator = ScriptedGenerator::new(dir.path()).missing("missing.jpg");
    let (facade, generator, logger) = facade_with(base_config(), generator);

    let err = facade
        .serve_request(&ImageRequest::new("missing.jpg@thumb"), &mut Vec::new())
        .unwrap_err();

    assert!(matches!(err, ServeError::NotFound { fallback_served: false }));
    assert_eq!(generator.loaded(), vec!["missing.jpg@thumb"]);
    assert_eq!(logger.records().len(), 1);
}

#[test]
fn invariant_failed_fallback_ends_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let config = base_config().with_fallback_image("default.jpg");
    let generator = ScriptedGenerator::new(dir.path())
        .missing("missing.jpg")
        .missing("default.jpg");
    let (facade, _, logger) = facade_with(config, generator);

    let err = facade
        .serve_request(&ImageRequest::new("missing.jpg@thumb"), &mut Vec::new())
        .unwrap_err();

    assert!(matches!(err, ServeError::NotFound { fallback_served: false }));
    assert_eq!(logger.records().len(), 1);
}

#[test]
fn invariant_security_errors_always_logged_and_hidden() {
    for policy in [
        ExceptionPolicy::Throw,
        ExceptionPolicy::LogVerbose,
        ExceptionPolicy::LogToChannel("images".into()),
    ] {
        let dir = tempfile::tempdir().unwrap();
        let config = base_config()
            .with_exceptions(policy.clone())
            .with_fallback_image("default.jpg");
        let generator = ScriptedGenerator::new(dir.path())
            .failing_with(GeneratorError::Security("token mismatch for cat.jpg".into()));
        let (facade, generator, logger) = facade_with(config, generator);

        let err = facade
            .serve_request(&ImageRequest::new("cat.jpg@thumb"), &mut Vec::new())
            .unwrap_err();

        assert!(matches!(err, ServeError::NotFound { fallback_served: false }), "{policy}");
        assert!(!err.to_string().contains("token"));
        assert!(generator.loaded().is_empty());

        let records = logger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].channel, SECURITY_CHANNEL);
        assert!(records[0].message.contains("token mismatch"));
    }
}

#[test]
fn invariant_configuration_errors_at_startup() {
    let dir = tempfile::tempdir().unwrap();

    for (json, key) in [
        (r#"{"url": "/m", "signingKey": "k"}"#, "path"),
        (r#"{"path": "/c", "signingKey": "k"}"#, "url"),
        (r#"{"path": "/c", "url": "/m"}"#, "signingKey"),
    ] {
        let file = dir.path().join(format!("{key}.json"));
        fs::write(&file, json).unwrap();

        match ImageFacade::from_config_file(&file) {
            Err(ConfigurationError::MissingParameter(missing)) => assert_eq!(missing, key),
            Err(other) => panic!("expected missing {key}, got {other}"),
            Ok(_) => panic!("expected missing {key}"),
        }
    }
}

#[test]
fn invariant_local_generator_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let public = dir.path().join("public");
    fs::create_dir_all(public.join("photos")).unwrap();
    fs::write(public.join("photos/cat.jpg"), b"cat").unwrap();
    fs::write(public.join("default.jpg"), b"placeholder").unwrap();

    let json = serde_json::json!({
        "path": dir.path().join("cache"),
        "url": "/media/cache",
        "basePath": public,
        "signingKey": "s3cr3t",
        "fallbackImage": "default.jpg",
        "templates": {"thumb": "100x100"},
        "exceptions": {"mode": "log_to_channel", "channel": "images"}
    });
    let config = FacadeConfig::from_json(&json.to_string()).unwrap();
    let signer = LocalGenerator::from_config(&config);
    let logger = Arc::new(MemoryFailureLogger::new());
    let facade = ImageFacade::new(config).with_logger(logger.clone());

    let url = facade.resolve_detailed("photos/cat.jpg", Some("thumb")).unwrap();
    let request = signer.request_from_url(url.url()).unwrap();
    assert_eq!(request.spec, "photos/cat.jpg@100x100");
    assert_eq!(request.token, Some(signer.token_for("photos/cat.jpg@100x100")));

    let mut body = Vec::new();
    facade.serve_request(&request, &mut body).unwrap();
    assert_eq!(body, b"cat");

    let missing = "photos/dog.jpg@100x100";
    let request = ImageRequest::new(missing).with_token(signer.token_for(missing));
    let mut body = Vec::new();
    let err = facade.serve_request(&request, &mut body).unwrap_err();
    assert!(err.fallback_served());
    assert_eq!(body, b"placeholder");

    let forged = ImageRequest::new("photos/cat.jpg@100x100").with_token("forged-token-123");
    let err = facade.serve_request(&forged, &mut Vec::new()).unwrap_err();
    assert!(matches!(err, ServeError::NotFound { fallback_served: false }));

    let channels: Vec<_> = logger.records().into_iter().map(|r| r.channel).collect();
    assert_eq!(channels, vec!["images".to_string(), SECURITY_CHANNEL.to_string()]);
}
