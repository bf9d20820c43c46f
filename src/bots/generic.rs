use super::{Bot, BotInfo};
use crate::config::Settings;
use crate::error::Result;
use crate::llm::{ChatSession, GeminiChat, GenerationConfig, TokenSink};
use async_trait::async_trait;

pub const INFO: BotInfo = BotInfo {
    id: "pokedex-generic",
    name: "Professor Binary Lite (Generic)",
    description: "General Pokémon Q&A (games, anime, types, moves, regions).",
};

const SYSTEM_INSTRUCTION: &str = "
You are Professor Binary, a friendly but wise terminal chatbot that ONLY answers questions about Pokémon.
- Allowed topics: Pokémon games, anime, manga, mechanics, types, moves, regions, Pokédex lore, strategies, history, trivia.
- If the user asks non-Pokémon things, respond briefly: \"I can only chat about Pokémon.\"
- Use general knowledge only. Do NOT use tools, browsing, or external APIs.
- Be concise and accurate; if uncertain, say what you're unsure about.
- Avoid spoilers unless explicitly requested.
- Keep your answers brief to maximum of three sentences.
";

/// Answers from the model's own knowledge, no retrieval.
pub struct PokedexGeneric {
    chat: Box<dyn ChatSession>,
}

impl PokedexGeneric {
    pub fn init(settings: &Settings) -> Result<Self> {
        let chat = GeminiChat::new(settings, SYSTEM_INSTRUCTION, GenerationConfig::default())?;
        Ok(Self::with_chat(Box::new(chat)))
    }

    pub fn with_chat(chat: Box<dyn ChatSession>) -> Self {
        PokedexGeneric { chat }
    }
}

fn compose_prompt(question: &str) -> String {
    format!(
        "User question: {question}\n\n\
         Answer as Professor Binary in at most two sentences.\n\
         If you are unsure, say so briefly. Pokémon-only topics."
    )
}

#[async_trait]
impl Bot for PokedexGeneric {
    fn info(&self) -> &'static BotInfo {
        &INFO
    }

    async fn answer(&mut self, text: &str, on_token: Option<TokenSink<'_>>) -> Result<String> {
        let prompt = compose_prompt(text.trim());
        self.chat.send(&prompt, on_token).await
    }
}
