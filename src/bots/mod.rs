//! Chat personas selectable from the terminal.

mod generic;
mod knowledge;

pub use generic::PokedexGeneric;
pub use knowledge::PokedexKb;

use crate::config::Settings;
use crate::error::{ChatError, Result};
use crate::llm::TokenSink;
use async_trait::async_trait;
use tracing::info;

#[derive(Debug, PartialEq, Eq)]
pub struct BotInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

/// A persona answers one user turn at a time, optionally streaming.
#[async_trait]
pub trait Bot: Send {
    fn info(&self) -> &'static BotInfo;

    async fn answer(&mut self, text: &str, on_token: Option<TokenSink<'_>>) -> Result<String>;
}

pub static BOTS: [BotInfo; 2] = [generic::INFO, knowledge::INFO];

pub fn find(id: &str) -> Option<&'static BotInfo> {
    BOTS.iter().find(|b| b.id == id)
}

/// Initialises the persona registered under `id`.
pub async fn attach(id: &str, settings: &Settings) -> Result<Box<dyn Bot>> {
    let bot: Box<dyn Bot> = match id {
        id if id == generic::INFO.id => Box::new(PokedexGeneric::init(settings)?),
        id if id == knowledge::INFO.id => Box::new(PokedexKb::init(settings).await?),
        other => return Err(ChatError::UnknownBot(other.to_string())),
    };

    info!("Attached bot '{}'", bot.info().id);
    Ok(bot)
}
