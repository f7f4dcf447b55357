use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keyword_news::collector::Collector;
use keyword_news::config::Config;
use keyword_news::fetcher::HttpFeedSource;
use keyword_news::site::build_site;

/// Collect keyword news into a JSON archive and render it as a static site.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Path to the TOML config file; defaults apply if it does not exist
    #[arg(short, long, default_value = "archive.toml")]
    config: PathBuf,

    /// Base directory for keywords, data and site output
    #[arg(short, long)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch feeds for every keyword and merge new items into the store
    Collect,
    /// Render the static site from the stored items
    Build,
    /// Collect, then build
    Run,
}

async fn collect(config: &Config) -> anyhow::Result<()> {
    let keywords = config.load_keywords()?;
    info!("Loaded {} keywords", keywords.len());

    let source = HttpFeedSource::new(config)?;
    let report = Collector::new(config, &source).run(&keywords).await?;
    if report.failed_sources > 0 {
        warn!("{} feed fetches failed and were skipped", report.failed_sources);
    }
    println!("{}", report);
    Ok(())
}

async fn build(config: &Config) -> anyhow::Result<()> {
    let report = build_site(config).await?;
    println!("{}", report);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keyword_news=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load_or_default(&cli.config)?;
    if let Some(root) = cli.root {
        config.root = root;
    }
    info!("Using archive root {}", config.root.display());

    match cli.command {
        Command::Collect => collect(&config).await?,
        Command::Build => build(&config).await?,
        Command::Run => {
            collect(&config).await?;
            build(&config).await?;
        }
    }

    Ok(())
}
