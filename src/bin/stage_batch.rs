use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::info;

use content_stager::assembler::Assembler;
use content_stager::config;
use content_stager::db::{self, SqliteStore};
use content_stager::dispatch::Action;
use content_stager::staging;

#[derive(Debug, Parser)]
#[command(author, version, about = "Manage staged batches and build outgoing requests")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Create a batch holding the given root posts; prints its ID and GUID
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value_t = 0)]
        creator: i64,
        /// Comma-separated root post IDs
        #[arg(long, value_delimiter = ',')]
        posts: Vec<i64>,
    },
    /// Change the title and/or root posts of a batch
    Edit {
        #[arg(long)]
        batch: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, value_delimiter = ',')]
        posts: Option<Vec<i64>>,
    },
    /// Assemble a batch and print the request JSON for the receiver
    Request {
        #[arg(long)]
        batch: i64,
        #[arg(long, value_enum, default_value_t = RequestAction::Preflight)]
        action: RequestAction,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RequestAction {
    Preflight,
    Send,
}

impl From<RequestAction> for Action {
    fn from(a: RequestAction) -> Self {
        match a {
            RequestAction::Preflight => Action::Preflight,
            RequestAction::Send => Action::Send,
        }
    }
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
    let store = SqliteStore::new(pool, cfg.staging.uploads_url.clone());

    match args.command {
        Cmd::Create {
            title,
            creator,
            posts,
        } => {
            let record = staging::create_batch(&store, &title, creator, &posts).await?;
            println!("{}\t{}", record.id, record.guid);
        }
        Cmd::Edit {
            batch,
            title,
            posts,
        } => {
            let record =
                staging::edit_batch(&store, batch, title.as_deref(), posts.as_deref()).await?;
            println!("{}\t{}", record.id, record.guid);
        }
        Cmd::Request { batch, action } => {
            let assembler = Assembler::new(&store, &store, cfg.assembler());
            let loaded = staging::load_batch(&store, &assembler, batch, false)
                .await?
                .ok_or_else(|| anyhow!("batch {} not found", batch))?;
            let action = Action::from(action);
            if action == Action::Send {
                store.touch_batch(batch).await?;
            }
            let request = staging::build_request(action, &loaded)?;
            info!(
                batch_id = batch,
                guid = %loaded.guid,
                action = action.as_str(),
                posts = loaded.posts.len(),
                "request ready"
            );
            println!("{}", serde_json::to_string_pretty(&request)?);
        }
    }
    Ok(())
}
