//! Plain-text views of the index for the `nearest` and `table` subcommands.

use crate::vector_db::{Index, ScoredEntry};
use std::fmt::Write;

const PREVIEW_DIMS: usize = 8;

pub fn format_nearest(hit: Option<&ScoredEntry<'_>>) -> String {
    let Some(hit) = hit else {
        return "No match found.".to_string();
    };

    format!(
        "\nClosest: {} ({})  score={:.4}\n\n{}\n\n\
         How this was calculated:\n\
         - The query was converted into an embedding (a vector of numbers).\n\
         - Each knowledge base entry has an embedding of the same length.\n\
         - The query is compared to each entry with cosine similarity:\n    \
           similarity = (A · B) / (||A|| * ||B||)\n\
         - The entry with the highest similarity is the \"nearest\" one.\n",
        hit.entry.id(),
        hit.entry.label(),
        hit.score,
        hit.entry.text()
    )
}

/// One row per entry with its dimensionality and the first few components.
pub fn format_table(index: &Index) -> String {
    let mut out = format!("{:<18} {:<20} {:>5}", "id", "name", "dims");
    for i in 0..PREVIEW_DIMS {
        let _ = write!(out, " {:>8}", format!("v{i}"));
    }
    out.push('\n');

    for entry in index.entries() {
        let _ = write!(
            out,
            "{:<18} {:<20} {:>5}",
            entry.id(),
            entry.label(),
            entry.vector.len()
        );
        for value in entry.vector.iter().take(PREVIEW_DIMS) {
            let _ = write!(out, " {:>8.4}", value);
        }
        out.push('\n');
    }

    let dims = index.dimensions().unwrap_or(0);
    let _ = write!(
        out,
        "\nEach row is one knowledge base entry; the numbers are the first {} of {} embedding dimensions.\n",
        dims.min(PREVIEW_DIMS),
        dims
    );
    out
}
