mod db;
mod dokument;
mod enrich;
mod extract;
mod fetch;
mod index;
mod mapper;
mod sync;
mod vocab;
mod xml;

use std::time::Instant;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use vocab::Vocab;

#[derive(Parser)]
#[command(name = "dip_scraper", about = "Bundestag DIP Ablauf scraper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk the extrakt index pages and sync every Ablauf found
    Run {
        /// Max Abläufe to process (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Re-scrape Abläufe already stored as finished
        #[arg(long)]
        force: bool,
    },
    /// Sync a single Ablauf page by URL
    Sync {
        url: String,
        /// Re-scrape even if stored as finished
        #[arg(long)]
        force: bool,
    },
    /// Show record counts
    Stats,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { limit, force } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let client = fetch::client()?;
            let vocab = Vocab::default();

            let mut urls = index::ablauf_urls(&client, &vocab::WAHLPERIODEN)?;
            if let Some(n) = limit {
                urls.truncate(n);
            }
            if urls.is_empty() {
                println!("Index pages yielded no Ablauf URLs.");
                return Ok(());
            }

            println!("Syncing {} Abläufe...", urls.len());
            let pb = ProgressBar::new(urls.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
                    .progress_chars("=> "),
            );

            let mut synced = 0usize;
            let mut skipped = 0usize;
            let mut failed = 0usize;
            for url in &urls {
                // A failure aborts this address only, never the batch.
                match sync::process_ablauf(&conn, &client, &vocab, url, force) {
                    Ok(Some(_)) => synced += 1,
                    Ok(None) => skipped += 1,
                    Err(e) => {
                        warn!("Failed to process {}: {:#}", url, e);
                        failed += 1;
                    }
                }
                pb.inc(1);
            }
            pb.finish_and_clear();

            println!(
                "Done: {} synced, {} skipped, {} failed.",
                synced, skipped, failed
            );
        }
        Commands::Sync { url, force } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let client = fetch::client()?;
            let vocab = Vocab::default();

            match sync::process_ablauf(&conn, &client, &vocab, &url, force)? {
                Some(ablauf) => println!("Synced: {}", ablauf.titel),
                None => println!("Nothing to ingest for {}", url),
            }
        }
        Commands::Stats => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Abläufe:      {} ({} abgeschlossen)", s.ablaeufe, s.abgeschlossen);
            println!("Positionen:   {}", s.positionen);
            println!("Zuweisungen:  {}", s.zuweisungen);
            println!("Beschlüsse:   {}", s.beschluesse);
            println!("Referenzen:   {}", s.referenzen);
            println!("Beiträge:     {}", s.beitraege);
            println!("Schlagworte:  {}", s.schlagworte);
        }
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {:.1}s", elapsed.as_secs_f64());
    }

    Ok(())
}
