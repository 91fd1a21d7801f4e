use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lectio::app::AppContext;
use lectio::cli::{commands, Cli, Commands};
use lectio::config::Config;
use lectio::remote::{MemoryClient, RemoteClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = Config::load()?;
    let mut ctx = match &cli.offline {
        Some(path) => {
            tracing::info!("Reading offline dataset {}", path.display());
            let client: Arc<dyn RemoteClient + Send + Sync> =
                Arc::new(MemoryClient::from_json_file(path)?);
            AppContext::with_client(config, client)
        }
        None => AppContext::new(config)?,
    };
    ctx.start_janitor();

    match cli.command {
        Commands::Testaments => {
            commands::list_testaments(&ctx).await?;
        }
        Commands::Genres { testament } => {
            commands::list_genres(&ctx, &testament).await?;
        }
        Commands::Books { genre } => {
            commands::list_books(&ctx, &genre).await?;
        }
        Commands::Versions => {
            commands::list_versions(&ctx).await?;
        }
        Commands::Book { slug, version } => {
            commands::show_book(&ctx, &slug, version.as_deref()).await?;
        }
        Commands::Read {
            book,
            chapter,
            version,
            paragraph,
        } => {
            commands::read_chapter(&ctx, &book, chapter, version.as_deref(), paragraph).await?;
        }
        Commands::Open { path } => {
            commands::open_path(&ctx, &path).await?;
        }
        Commands::Prefetch { slug } => {
            commands::prefetch_book(&ctx, &slug).await?;
        }
    }

    Ok(())
}
