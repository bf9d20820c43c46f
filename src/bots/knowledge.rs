use super::{Bot, BotInfo};
use crate::config::Settings;
use crate::embeddings::{Embedder, GeminiEmbedder};
use crate::error::Result;
use crate::kb;
use crate::llm::{ChatSession, GeminiChat, GenerationConfig, TokenSink};
use crate::retriever::{Retrieval, Retriever};
use crate::vector_db::ScoredEntry;
use async_trait::async_trait;
use std::fmt::Write;
use std::sync::Arc;
use tracing::{info, warn};

pub const INFO: BotInfo = BotInfo {
    id: "pokedex-kb",
    name: "Professor Binary Lite (Knowledge-Base)",
    description: "General Pokémon Q&A; uses KB for Mega Victreebel, Mega Hawlucha, Mega Dragonite.",
};

const SYSTEM_INSTRUCTION: &str = "
You are Professor Binary. You ONLY answer questions about Pokémon.
If a KB Entry is provided for a Mega form, use ONLY that info for that answer.
Be concise and accurate. Avoid spoilers unless asked.
";

/// General Pokémon answers, grounded in the Mega knowledge base whenever the
/// question is close enough to one of its entries.
pub struct PokedexKb {
    chat: Box<dyn ChatSession>,
    retriever: Retriever,
    debug: bool,
}

impl PokedexKb {
    pub async fn init(settings: &Settings) -> Result<Self> {
        let documents = kb::load_documents(&settings.kb_path)?;
        if documents.is_empty() {
            warn!("Knowledge base {} has no entries", settings.kb_path.display());
        }

        let embedder: Arc<dyn Embedder> = Arc::new(GeminiEmbedder::new(settings)?);
        let retriever = Retriever::build(
            documents,
            embedder,
            settings.top_k,
            settings.similarity_threshold,
        )
        .await?;
        info!("Indexed {} knowledge base entries", retriever.index().len());

        let generation = GenerationConfig {
            max_output_tokens: 300,
            ..GenerationConfig::default()
        };
        let chat = GeminiChat::new(settings, SYSTEM_INSTRUCTION, generation)?;

        Ok(Self::with_parts(Box::new(chat), retriever, settings.kb_debug))
    }

    pub fn with_parts(chat: Box<dyn ChatSession>, retriever: Retriever, debug: bool) -> Self {
        PokedexKb {
            chat,
            retriever,
            debug,
        }
    }
}

fn kb_context(hit: &ScoredEntry<'_>) -> String {
    format!(
        "KB Entry ({} • {} • score={:.3}):\n{}\n---\n",
        hit.entry.label(),
        hit.entry.id(),
        hit.score,
        hit.entry.text()
    )
}

fn compose_prompt(context: &str, question: &str) -> String {
    format!(
        "{context}User question: {question}\n\n\
         RULES (MUST FOLLOW):\n\
         1) MAX THREE SENTENCES total.\n\
         2) If a KB Entry is shown above, ground the answer ONLY in that KB.\n\
         3) If the KB doesn't cover it, say you're unsure in one sentence.\n\
         4) Pokémon-only; otherwise say: \"I can only chat about Pokémon.\""
    )
}

fn debug_overlay(retrieval: &Retrieval<'_>, threshold: f32) -> String {
    let mut out = format!("[kb] threshold={threshold:.2}\n");
    if retrieval.hits.is_empty() {
        out.push_str("[kb]   (no entries)\n");
    }
    for (rank, hit) in retrieval.hits.iter().enumerate() {
        let mark = if rank == 0 && retrieval.grounding.is_some() {
            "used"
        } else {
            "-"
        };
        let _ = writeln!(
            out,
            "[kb]   {}. {} ({}) score={:.3} {}",
            rank + 1,
            hit.entry.id(),
            hit.entry.label(),
            hit.score,
            mark
        );
    }
    out
}

#[async_trait]
impl Bot for PokedexKb {
    fn info(&self) -> &'static BotInfo {
        &INFO
    }

    async fn answer(&mut self, text: &str, on_token: Option<TokenSink<'_>>) -> Result<String> {
        let question = text.trim();

        let context = {
            let retrieval = self.retriever.retrieve(question).await?;
            if self.debug {
                eprint!("{}", debug_overlay(&retrieval, self.retriever.threshold()));
            }
            retrieval.grounding.as_ref().map(kb_context).unwrap_or_default()
        };

        let prompt = compose_prompt(&context, question);
        self.chat.send(&prompt, on_token).await
    }
}
