//! minio-web: serve an S3-compatible bucket as a static web site.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use minio_web::config::{Config, LoggingConfig};
use minio_web::resolver::Resolver;
use minio_web::storage::{MemoryBackend, ObjectStore, S3Backend};

/// Connection attempts before giving up at startup.
const CONNECT_ATTEMPTS: u32 = 5;

/// Command-line arguments for the minio-web server.
#[derive(Parser, Debug)]
#[command(
    name = "minio-web",
    version,
    about = "Serve objects from an S3-compatible store over HTTP"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, env = "CONFIG_FILE_PATH", default_value = "configs/config.yaml")]
    config: String,

    /// Override the listen port.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_found = Path::new(&cli.config).exists();
    let mut config = if config_found {
        minio_web::config::load_config(&cli.config)?
    } else {
        Config::default()
    };
    minio_web::config::apply_env_overrides(&mut config)?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    init_logging(&config.logging);
    if config_found {
        info!("Loaded configuration from {}", cli.config);
    } else {
        warn!(
            "Configuration file {} not found, using defaults and environment",
            cli.config
        );
    }

    if config.observability.metrics {
        minio_web::metrics::init_metrics()?;
        minio_web::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let store: Arc<dyn ObjectStore> = match config.storage.backend.as_str() {
        "s3" => {
            info!("connecting to {}", config.minio.endpoint);
            Arc::new(S3Backend::new(&config.minio).await?)
        }
        "memory" => {
            let backend = MemoryBackend::new();
            if !config.ext.bucket_name.is_empty() {
                backend.create_bucket(&config.ext.bucket_name).await;
            }
            info!("In-memory storage backend initialized");
            Arc::new(backend)
        }
        other => anyhow::bail!("unknown storage backend '{other}' (expected 's3' or 'memory')"),
    };

    let resolver = Arc::new(Resolver::new(
        store,
        &config.ext.bucket_name,
        &config.ext.prefix,
    ));
    resolver
        .wait_for_backend(CONNECT_ATTEMPTS, Duration::from_secs(1))
        .await?;

    let pipeline = minio_web::app::build_pipeline_with(&config.ext, &resolver)?;
    let state = Arc::new(minio_web::AppState { pipeline });
    let app = minio_web::server::app(state, config.observability.metrics);

    minio_web::server::serve(app, &config.server).await?;

    info!("minio-web shut down");
    Ok(())
}

/// Initialize the tracing subscriber.  `RUST_LOG` takes precedence over
/// the configured level.
fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
