use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use promo_poster::archiver;
use promo_poster::config::Config;
use promo_poster::content::{ContentSource, RowCursor};
use promo_poster::http_extractor;
use promo_poster::job::{self, RunOutcome};
use promo_poster::models::ProductSnapshot;
use promo_poster::pacing::JitterPacer;
use promo_poster::parser;
use promo_poster::publisher::PagePublisher;

#[derive(Parser, Debug)]
#[command(name = "promo_poster")]
#[command(about = "Scrapes affiliate product pages and posts promotions to a social page")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract name, price and image from a product link
    Extract {
        url: String,
        /// Also archive the result as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Override the configured attempt budget
        #[arg(long)]
        retries: Option<u32>,
    },
    /// Extract from a saved HTML page without touching the network
    Parse {
        file: PathBuf,
        /// Page URL that relative image paths resolve against
        #[arg(long)]
        base: Option<String>,
    },
    /// Advance the content cursor and show the selected post
    Next,
    /// Run one scheduled post
    Run {
        /// Build the post but do not publish it
        #[arg(long)]
        dry_run: bool,
    },
}

fn load_content(config: &Config) -> Result<ContentSource> {
    ContentSource::from_csv_path(&config.content.rows_path, config.content.has_headers)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = Config::load_or_default(args.config.as_deref())?;

    let env = env_logger::Env::default().default_filter_or(&config.logging.level);
    env_logger::Builder::from_env(env).init();
    log::info!("Started at {}", job::posted_at_now());

    match args.command {
        Command::Extract {
            url,
            output,
            retries,
        } => {
            if let Some(retries) = retries {
                config.extraction.max_retries = retries;
            }
            let extractor =
                http_extractor(&config.extraction).context("Failed to build HTTP client")?;
            let record = extractor.extract(&url);
            println!("{}", serde_json::to_string_pretty(&record)?);

            if let Some(path) = output {
                archiver::save_to_file(&ProductSnapshot::now(&url, record), &path)?;
                log::info!("Product archived to {}", path.display());
            }
        }
        Command::Parse { file, base } => {
            let html = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read '{}'", file.display()))?;
            let base = base.unwrap_or_else(|| config.extraction.fallback_origin.clone());
            let base =
                url::Url::parse(&base).with_context(|| format!("Invalid base URL {base:?}"))?;
            let record = parser::parse_product(&html, &base);
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Next => {
            let content = load_content(&config)?;
            let cursor = RowCursor::new(&config.content.cursor_path);
            match content.next_post(&cursor)? {
                Some(selected) => println!(
                    "Row {} of {}: {:?}",
                    selected.row + 1,
                    selected.total_rows,
                    selected.post
                ),
                None => println!("No valid content found."),
            }
        }
        Command::Run { dry_run } => {
            let content = load_content(&config)?;
            let cursor = RowCursor::new(&config.content.cursor_path);
            let extractor =
                http_extractor(&config.extraction).context("Failed to build HTTP client")?;

            let publisher = if dry_run {
                None
            } else {
                config.require_publisher_credentials()?;
                Some(PagePublisher::new(&config.publisher, JitterPacer)?)
            };

            match job::run_once(&content, &cursor, &extractor, publisher.as_ref())? {
                RunOutcome::NoContent => log::warn!("Nothing to post"),
                RunOutcome::DryRun(post) => println!("{}", post.message),
                RunOutcome::Published(outcome) => log::info!(
                    "Published {:?} post {}{}",
                    outcome.kind,
                    outcome.post_id,
                    if outcome.fell_back { " (text-only fallback)" } else { "" }
                ),
            }
        }
    }

    log::info!("Completed at {}", job::posted_at_now());
    Ok(())
}
