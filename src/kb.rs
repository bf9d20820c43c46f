//! Loader for the hand-written Mega form knowledge base.

use crate::error::{ChatError, Result};
use crate::vector_db::Document;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MegaRecord {
    pub id: String,
    pub name: String,
    pub typing: Vec<String>,
    pub abilities: Vec<String>,
    pub base_stats: BaseStats,
    pub signature_moves: Vec<String>,
    pub flavor: String,
    pub competitive_notes: String,
}

#[derive(Debug, Deserialize)]
pub struct BaseStats {
    pub hp: u32,
    pub atk: u32,
    pub def: u32,
    pub spa: u32,
    pub spd: u32,
    pub spe: u32,
}

impl MegaRecord {
    /// Flattens the record into the text blob that gets embedded.
    pub fn to_text(&self) -> String {
        let s = &self.base_stats;
        [
            self.name.clone(),
            format!("Typing: {}", self.typing.join("/")),
            format!("Abilities: {}", self.abilities.join(", ")),
            format!(
                "Base Stats: HP {} Atk {} Def {} SpA {} SpD {} Spe {}",
                s.hp, s.atk, s.def, s.spa, s.spd, s.spe
            ),
            format!("Signature Moves: {}", self.signature_moves.join(", ")),
            format!("Flavor: {}", self.flavor),
            format!("Notes: {}", self.competitive_notes),
        ]
        .join("\n")
    }

    pub fn into_document(self) -> Document {
        let text = self.to_text();
        Document {
            id: self.id,
            label: self.name,
            text,
        }
    }
}

pub fn parse_documents(json: &str) -> Result<Vec<Document>> {
    let records: Vec<MegaRecord> = serde_json::from_str(json)
        .map_err(|e| ChatError::KnowledgeBase(format!("malformed knowledge base: {e}")))?;

    let mut seen = HashSet::new();
    for record in &records {
        if !seen.insert(record.id.as_str()) {
            return Err(ChatError::KnowledgeBase(format!(
                "duplicate entry id '{}'",
                record.id
            )));
        }
    }

    Ok(records.into_iter().map(MegaRecord::into_document).collect())
}

pub fn load_documents(path: impl AsRef<Path>) -> Result<Vec<Document>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        ChatError::KnowledgeBase(format!("cannot read {}: {e}", path.display()))
    })?;
    parse_documents(&content)
}
