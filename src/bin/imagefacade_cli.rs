//! ImageFacade CLI - resolve and serve derived images from the shell
//!
//! Commands: templates, url, sign, serve
//! Outputs JSON to stdout, logs to stderr
//! Returns 2 when a request ends as not-found

use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use imagefacade_core::{
    ExceptionPolicy, FacadeConfig, ImageFacade, ImageRequest, LocalGenerator, ServeError,
};

#[derive(Parser)]
#[command(name = "imagefacade-cli")]
#[command(about = "ImageFacade CLI - derived image URLs and fallback serving")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the facade configuration (JSON)
    #[arg(short, long, default_value = "imagefacade.json")]
    config: PathBuf,

    /// Override the exception policy: throw, verbose or channel:<name>
    #[arg(short, long)]
    exceptions: Option<ExceptionPolicy>,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured query templates
    Templates,

    /// Resolve the URL of a derived image
    Url {
        /// Source image identifier
        #[arg(short, long)]
        image: String,

        /// Query or template name; prefix with // for an absolute URL
        #[arg(short, long)]
        query: Option<String>,

        /// Server address used for protocol-relative URLs
        #[arg(long, default_value = "localhost")]
        host: String,
    },

    /// Print the signing token for a spec
    Sign {
        /// Raw image@query spec
        #[arg(short, long)]
        spec: String,
    },

    /// Serve a request, writing the body to a file
    Serve {
        /// Raw image@query spec
        #[arg(short, long)]
        spec: String,

        /// Signing token presented with the request
        #[arg(short, long)]
        token: Option<String>,

        /// Where to write the response body
        #[arg(short, long)]
        out: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = match FacadeConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            println!("{}", serde_json::json!({ "error": e.to_string() }));
            return ExitCode::FAILURE;
        }
    };
    if let Some(policy) = cli.exceptions {
        config = config.with_exceptions(policy);
    }

    match cli.command {
        Commands::Templates => {
            let templates: Vec<_> = config
                .templates
                .iter()
                .map(|(name, query)| serde_json::json!({ "name": name, "query": query }))
                .collect();

            println!("{}", serde_json::to_string_pretty(&templates).unwrap());
            ExitCode::SUCCESS
        }

        Commands::Sign { spec } => {
            let token = LocalGenerator::from_config(&config).token_for(&spec);
            println!("{}", serde_json::json!({ "spec": spec, "token": token }));
            ExitCode::SUCCESS
        }

        Commands::Url { image, query, host } => {
            let facade = ImageFacade::new(config);
            match facade.resolve_absolute(&image, query.as_deref(), &host) {
                Ok(url) => {
                    println!("{}", serde_json::json!({ "image": image, "query": query, "url": url }));
                    if url.is_some() {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::from(2)
                    }
                }
                Err(e) => {
                    println!("{}", serde_json::json!({ "image": image, "error": e.to_string() }));
                    ExitCode::FAILURE
                }
            }
        }

        Commands::Serve { spec, token, out } => {
            let facade = ImageFacade::new(config);
            let mut request = ImageRequest::new(spec);
            request.token = token;

            let file = match File::create(&out) {
                Ok(f) => f,
                Err(e) => {
                    println!("{}", serde_json::json!({ "error": e.to_string() }));
                    return ExitCode::FAILURE;
                }
            };
            let mut body = BufWriter::new(file);

            let outcome = match serve_into(&facade, &request, &mut body) {
                Ok(outcome) => outcome,
                Err(e) => {
                    println!("{}", serde_json::json!({ "error": e.to_string(), "out": out }));
                    return ExitCode::FAILURE;
                }
            };

            match outcome {
                Ok(()) => {
                    println!("{}", serde_json::json!({ "status": 200, "out": out }));
                    ExitCode::SUCCESS
                }
                Err(ServeError::NotFound { fallback_served }) => {
                    println!(
                        "{}",
                        serde_json::json!({ "status": 404, "fallbackServed": fallback_served })
                    );
                    ExitCode::from(2)
                }
                Err(e) => {
                    println!("{}", serde_json::json!({ "status": 500, "error": e.to_string() }));
                    ExitCode::FAILURE
                }
            }
        }
    }
}

/// Serve into `body` and flush it, so a status is only reported for bytes
/// that reached the writer's destination.
fn serve_into(
    facade: &ImageFacade,
    request: &ImageRequest,
    body: &mut impl Write,
) -> io::Result<Result<(), ServeError>> {
    let outcome = facade.serve_request(request, body);
    body.flush()?;
    Ok(outcome)
}
