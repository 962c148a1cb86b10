// Text chunking for incremental delivery

use crate::config::ChunkPolicy;

/// Empirical words-to-tokens ratio for English prompts.
const WORDS_PER_TOKEN: f64 = 1.3;

/// A first chunk shorter than this primes the model poorly and is
/// merged into the second chunk.
const MIN_FIRST_CHUNK_WORDS: usize = 10;

/// One text fragment, created once and consumed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub index: usize,
    pub text: String,
    pub first: bool,
}

impl TextChunk {
    /// Serialize for the wire. Chunks after the first are prefixed
    /// with a single space so the server-side tokenizer sees the same
    /// segmentation as unsplit text; `space_every_chunk` prefixes the
    /// first chunk too for the alternate tokenizer alignment.
    pub fn wire_text(&self, space_every_chunk: bool) -> String {
        if self.first && !space_every_chunk {
            self.text.clone()
        } else {
            format!(" {}", self.text)
        }
    }
}

/// Split a prompt into ordered, non-empty chunks covering every word
/// exactly once. Empty input yields no chunks.
pub fn chunk_text(text: &str, policy: &ChunkPolicy) -> Vec<TextChunk> {
    let words_per_chunk = (policy.target_tokens as f64 / WORDS_PER_TOKEN).floor() as usize;
    let words_per_chunk = words_per_chunk.max(1);

    let mut chunks: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for word in text.split_whitespace() {
        current.push(word);
        if current.len() >= words_per_chunk {
            chunks.push(current.join(" "));
            current.clear();
        }
    }
    if !current.is_empty() {
        chunks.push(current.join(" "));
    }

    // An undersized first fragment degrades output onset quality.
    if chunks.len() >= 2 && chunks[0].split_whitespace().count() < MIN_FIRST_CHUNK_WORDS {
        let merged = format!("{} {}", chunks[0], chunks[1]);
        chunks.splice(0..2, [merged]);
    }

    chunks
        .into_iter()
        .enumerate()
        .map(|(index, text)| TextChunk {
            index,
            text,
            first: index == 0,
        })
        .collect()
}
