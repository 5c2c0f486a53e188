use anyhow::{Context, Result};
use clap::Parser;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use content_stager::config;
use content_stager::db::{self, SqliteStore};
use content_stager::dispatch::{Receiver, Request, Response};
use content_stager::preflight::HttpProbe;
use content_stager::reconciler::Reconciler;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Handle one incoming batch request (preflight or send) and print the result map"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Request JSON file; reads stdin when omitted
    #[arg(long)]
    request: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;
    let store = Arc::new(SqliteStore::new(pool, cfg.staging.uploads_url.clone()));

    let reconciler = Reconciler::new(store.clone(), Arc::new(cfg.import_launcher()));
    let receiver = Receiver::new(
        cfg.receiver.host.clone(),
        store,
        Arc::new(HttpProbe::new(cfg.probe_timeout())?),
        cfg.receiver.probe_concurrency,
        reconciler,
    );

    let raw = match &args.request {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read request {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read request from stdin")?;
            buf
        }
    };

    let response = match serde_json::from_str::<Request>(&raw) {
        Ok(request) => receiver.handle(&request).await,
        Err(err) => {
            warn!(?err, "unparseable request");
            Response::error(format!("{}: Malformed request: {}", cfg.receiver.host, err))
        }
    };

    info!(
        errors = response.error.len(),
        warnings = response.warning.len(),
        "request handled"
    );
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
