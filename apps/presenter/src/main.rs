use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    audience::ReactionJournal,
    deck::Deck,
    navigator::{NavigationStep, Navigator},
    prop::{
        DisconnectedPropController, LoggingPropController, PropController, WriterPropController,
    },
    ClientEvent, PresentationClient,
};
use futures::StreamExt;
use shared::{
    domain::{Direction, SessionName},
    protocol::StateUpdate,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:8787")]
    server_url: String,
    /// Session to join. `present` starts a fresh one when omitted.
    #[arg(long)]
    session: Option<SessionName>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drive the deck from the terminal: `n` forward, `p` back, `q` quit.
    Present {
        #[arg(long, default_value = "slides.toml")]
        deck: PathBuf,
        /// Device or pipe that receives prop command frames.
        #[arg(long)]
        prop_device: Option<PathBuf>,
    },
    /// Send one reaction and remember it locally.
    React {
        symbol: String,
        #[arg(long, default_value = "audience_reactions.json")]
        journal: PathBuf,
    },
    /// Follow the session and print every snapshot.
    Watch,
    /// Personal top signal plus the room-wide totals.
    Summary {
        #[arg(long, default_value = "audience_reactions.json")]
        journal: PathBuf,
        /// Forget local taps after printing.
        #[arg(long)]
        reset: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();
    let session = match (args.session, &args.command) {
        (Some(session), _) => session,
        (None, Command::Present { .. }) => SessionName::generate(),
        (None, _) => SessionName::default(),
    };
    let client = PresentationClient::new(args.server_url, session)?;

    match args.command {
        Command::Present { deck, prop_device } => present(&client, deck, prop_device).await,
        Command::React { symbol, journal } => react(&client, &symbol, journal).await,
        Command::Watch => watch(&client).await,
        Command::Summary { journal, reset } => summary(&client, journal, reset).await,
    }
}

fn audience_link(client: &PresentationClient) -> Result<Url> {
    let mut url = Url::parse(client.server_url())?.join("audience")?;
    url.query_pairs_mut()
        .append_pair("session", client.session().as_str());
    Ok(url)
}

async fn open_prop(device: Option<PathBuf>) -> Arc<dyn PropController> {
    let Some(device) = device else {
        return Arc::new(LoggingPropController);
    };
    match tokio::fs::OpenOptions::new().write(true).open(&device).await {
        Ok(file) => {
            info!(device = %device.display(), "prop connected");
            Arc::new(WriterPropController::new(file))
        }
        Err(err) => {
            warn!(device = %device.display(), %err, "prop unavailable; continuing without it");
            Arc::new(DisconnectedPropController)
        }
    }
}

async fn present(
    client: &PresentationClient,
    deck_path: PathBuf,
    prop_device: Option<PathBuf>,
) -> Result<()> {
    let deck = Deck::load(&deck_path)?;
    info!(slides = deck.len(), deck = %deck_path.display(), "deck loaded");
    let prop = open_prop(prop_device).await;
    let mut navigator = Navigator::new(deck);

    let live = client.connect().await?;
    let mut updates = Box::pin(live.updates());
    tokio::spawn(async move {
        while let Some(update) = updates.next().await {
            print_update(&update);
        }
    });

    if let Some(request) = navigator.start() {
        client.set_slide(&request).await?;
    }
    println!("audience link: {}", audience_link(client)?);
    println!("n/Enter = next, p = previous, q = quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let direction = match line.trim() {
            "" | "n" | "next" => Direction::Forward,
            "p" | "prev" => Direction::Backward,
            "q" | "quit" => break,
            other => {
                println!("unknown command {other:?}");
                continue;
            }
        };

        match navigator.step(direction) {
            NavigationStep::Ignored => {}
            NavigationStep::PlayClip {
                slide,
                clip,
                source,
                hand_action,
            } => {
                info!(slide, clip, %source, "audio cue");
                if let Some(code) = hand_action {
                    let prop = Arc::clone(&prop);
                    tokio::spawn(async move {
                        if let Err(err) = prop.send_command(code).await {
                            warn!(code, %err, "prop command failed");
                        }
                    });
                }
                // Cues are announced, not played; the clip counts as done.
                navigator.clip_finished();
            }
            NavigationStep::ChangeSlide { index, request } => {
                if let Err(err) = client.set_slide(&request).await {
                    warn!(index, error = %format!("{err:#}"), "failed to announce slide");
                }
            }
        }
    }

    live.close().await?;
    Ok(())
}

async fn react(client: &PresentationClient, symbol: &str, journal_path: PathBuf) -> Result<()> {
    let state = client.state().await?;
    if !state
        .current_slide
        .available_reactions
        .iter()
        .any(|s| s == symbol)
    {
        println!(
            "{symbol} is not offered on this slide; try one of {}",
            state.current_slide.available_reactions.join(" ")
        );
        return Ok(());
    }

    client.submit_reaction(symbol).await?;
    let mut journal = ReactionJournal::load(&journal_path).await?;
    journal.record(state.current_slide_index, symbol);
    journal
        .save(&journal_path)
        .await
        .context("failed to persist reaction journal")?;
    println!("sent {symbol} on slide {}", state.current_slide_index);
    Ok(())
}

async fn watch(client: &PresentationClient) -> Result<()> {
    let live = client.connect().await?;
    let mut events = live.subscribe();
    print_update(&live.latest().await);
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(ClientEvent::State(update)) => print_update(&update),
                Ok(ClientEvent::Error(message)) => warn!(%message, "session error"),
                Ok(ClientEvent::Disconnected) => {
                    println!("session closed by server");
                    break;
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "watch fell behind"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

async fn summary(client: &PresentationClient, journal_path: PathBuf, reset: bool) -> Result<()> {
    let mut journal = ReactionJournal::load(&journal_path).await?;
    match journal.top() {
        Some((symbol, count)) => {
            println!("your top signal: {symbol} ({count} of {} taps)", journal.total())
        }
        None => println!("no reactions sent from this device yet"),
    }
    for (slide, counts) in journal.slides() {
        let line: Vec<_> = counts.iter().map(|(s, c)| format!("{s} {c}")).collect();
        println!("  slide {slide}: {}", line.join(", "));
    }

    match client.reaction_totals().await {
        Ok(totals) => {
            let line: Vec<_> = totals.iter().map(|(s, c)| format!("{s} {c}")).collect();
            println!("room totals: {}", line.join(", "));
        }
        Err(err) => warn!(error = %format!("{err:#}"), "could not fetch room totals"),
    }

    if reset {
        journal.clear();
        journal.save(&journal_path).await?;
    }
    Ok(())
}

fn print_update(update: &StateUpdate) {
    let state = &update.state;
    let title = state.current_slide.title.as_deref().unwrap_or("");
    if state.show_live_reactions {
        let counts: Vec<_> = state
            .reaction_counts
            .iter()
            .map(|(symbol, count)| format!("{symbol} {count}"))
            .collect();
        println!(
            "[{}] slide {} {title} | {}",
            update.revision,
            state.current_slide_index,
            counts.join("  ")
        );
    } else {
        println!(
            "[{}] slide {} {title} | {}",
            update.revision,
            state.current_slide_index,
            state.current_slide.available_reactions.join(" ")
        );
    }
}
