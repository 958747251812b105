use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use client_core::{deck::Deck, verify::verify_deck};
use storage::Storage;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a deck's audio and background assets before presenting.
    VerifySlides {
        #[arg(long, default_value = "slides.toml")]
        deck: PathBuf,
        #[arg(long, default_value = "public")]
        public_dir: PathBuf,
    },
    /// Dump stored reactions of one session database.
    Reactions {
        #[arg(long, default_value = "sqlite://data/sessions/default.db")]
        database_url: String,
        /// List individual records for this slide instead of overall totals.
        #[arg(long)]
        slide: Option<u32>,
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
    let cli = Cli::parse();

    match cli.command {
        Command::VerifySlides { deck, public_dir } => {
            Ok(if verify_slides(&deck, &public_dir)? {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Reactions {
            database_url,
            slide,
            json,
        } => {
            let storage = Storage::new(&database_url).await?;
            info!(%database_url, "reaction store opened");
            match slide {
                Some(slide) => {
                    let records = storage.list_reactions(slide).await?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(&records)?);
                    } else {
                        for record in &records {
                            println!(
                                "{}\t{}\t{}",
                                record.id.0,
                                record.created_at.to_rfc3339(),
                                record.reaction
                            );
                        }
                        println!("{} reactions on slide {slide}", records.len());
                    }
                }
                None => {
                    let totals: BTreeMap<_, _> =
                        storage.reaction_totals().await?.into_iter().collect();
                    if json {
                        println!("{}", serde_json::to_string_pretty(&totals)?);
                    } else {
                        for (reaction, count) in &totals {
                            println!("{reaction}\t{count}");
                        }
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Prints the outcome; `false` when any slide has an issue.
fn verify_slides(deck_path: &Path, public_dir: &Path) -> Result<bool> {
    let deck = Deck::load(deck_path)?;
    info!(slides = deck.len(), public_dir = %public_dir.display(), "verifying deck");
    let issues = verify_deck(&deck, public_dir);
    if issues.is_empty() {
        println!("All {} slides verified successfully.", deck.len());
        return Ok(true);
    }
    warn!(issues = issues.len(), "slide verification failed");
    eprintln!("Slide verification failed:\n");
    for issue in &issues {
        eprintln!("- {issue}");
    }
    eprintln!("\nFix the issues above and re-run verification.");
    Ok(false)
}
