mod bots;
mod commands;
mod config;
mod embeddings;
mod error;
mod inspect;
mod kb;
mod llm;
mod retriever;
mod vector_db;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use bots::Bot;
use clap::{Parser, Subcommand};
use commands::Command;
use embeddings::{Embedder, GeminiEmbedder};
use std::io::{self, Write};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use vector_db::Index;

use crate::config::Settings;

#[derive(Parser)]
#[command(name = "pokedex-chat", version, about = "Terminal Pokémon chat backed by Gemini")]
struct Cli {
    /// Bot to start the chat with (see /bots)
    #[arg(long, global = true)]
    bot: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat (default)
    Chat,

    /// Show the knowledge base entry closest to a query
    Nearest {
        /// Free-text query, e.g. "which mega is fastest"
        query: Vec<String>,
    },

    /// Preview the embedding of every knowledge base entry
    Table,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pokedex_chat=warn")),
        )
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let settings = Settings::load().context("Failed to load configuration")?;
    settings.require_api_key()?;

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => run_chat(&settings, cli.bot.as_deref()).await,
        Commands::Nearest { query } => cmd_nearest(&settings, &query.join(" ")).await,
        Commands::Table => cmd_table(&settings).await,
    }
}

async fn run_chat(settings: &Settings, start_bot: Option<&str>) -> Result<()> {
    let start_id = start_bot.unwrap_or(&settings.default_bot);
    let mut bot = bots::attach(start_id, settings)
        .await
        .with_context(|| format!("Failed to start bot '{start_id}'"))?;

    println!(
        "Terminal ready. Bot: {}  |  Model: {}",
        bot.info().name,
        settings.chat_model
    );
    println!("Type your question or /help\n");

    loop {
        let mut line = String::new();
        print!("> ");
        io::stdout().flush()?;

        if io::stdin().read_line(&mut line)? == 0 {
            break; // EOF (Ctrl+D)
        }

        match commands::parse(&line) {
            Command::Empty => continue,
            Command::Quit => break,
            Command::Help => println!("{}", commands::HELP),
            Command::Bots => println!("{}", commands::bot_list()),
            Command::Use(None) => println!("Usage: /use <id>"),
            Command::Use(Some(id)) => {
                if bots::find(id).is_none() {
                    println!("No bot with id \"{id}\". See /bots.");
                    continue;
                }
                match bots::attach(id, settings).await {
                    Ok(next) => {
                        bot = next;
                        println!("Switched to: {}", bot.info().name);
                    }
                    Err(e) => eprintln!("Error: could not start \"{id}\": {e}"),
                }
            }
            Command::Unknown(_) => println!("Unknown command. Try /help"),
            Command::Ask(question) => ask(bot.as_mut(), question).await,
        }
    }

    Ok(())
}

async fn ask(bot: &mut dyn Bot, question: &str) {
    let mut streamed = false;
    let mut on_token = |token: &str| {
        if !streamed {
            println!();
            streamed = true;
        }
        emit_token(&mut io::stdout(), token);
    };

    let result = bot.answer(question, Some(&mut on_token)).await;
    match result {
        Ok(_) if streamed => println!("\n"),
        Ok(full) => println!("\n{full}\n"),
        Err(e) => eprintln!("\rError: {e}\n"),
    }
}

fn emit_token(out: &mut impl Write, token: &str) {
    if let Err(e) = out.write_all(token.as_bytes()).and_then(|_| out.flush()) {
        warn!("Failed to write streamed output: {e}");
    }
}

async fn build_index(settings: &Settings) -> Result<(Index, GeminiEmbedder)> {
    let documents = kb::load_documents(&settings.kb_path)?;
    let embedder = GeminiEmbedder::new(settings)?;
    let index = Index::build(documents, &embedder)
        .await
        .context("Failed to embed the knowledge base")?;
    Ok((index, embedder))
}

async fn cmd_nearest(settings: &Settings, query: &str) -> Result<()> {
    let query = query.trim();
    if query.is_empty() {
        println!("Usage: pokedex-chat nearest \"your query here\"");
        return Ok(());
    }

    let (index, embedder) = build_index(settings).await?;
    let query_vector = embedder.embed(query).await?;
    let hits = index.search(&query_vector, 1)?;

    println!("{}", inspect::format_nearest(hits.first()));
    Ok(())
}

async fn cmd_table(settings: &Settings) -> Result<()> {
    let (index, _) = build_index(settings).await?;
    if index.is_empty() {
        println!("Knowledge base {} has no entries.", settings.kb_path.display());
        return Ok(());
    }
    println!("{}", inspect::format_table(&index));
    Ok(())
}
