//! Filing loader and splitter.
//!
//! The filing arrives as a UTF-8 text or markdown export. It is split into
//! chunks of at most `max_tokens` estimated tokens with no overlap, preferring
//! paragraph boundaries, then word boundaries.

use std::path::Path;

use crate::actors::collaborator::CollaboratorError;

pub const DEFAULT_CHUNK_TOKENS: usize = 300;

/// Rough token estimate: one token per four characters.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

pub fn load_filing(path: &Path) -> Result<String, CollaboratorError> {
    std::fs::read_to_string(path).map_err(|e| {
        CollaboratorError::Store(format!("failed to read filing {}: {e}", path.display()))
    })
}

pub fn split_into_chunks(text: &str, max_tokens: usize) -> Vec<String> {
    let max_tokens = max_tokens.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in paragraphs(text) {
        if estimate_tokens(&paragraph) > max_tokens {
            flush(&mut current, &mut chunks);
            split_long_paragraph(&paragraph, max_tokens, &mut chunks);
            continue;
        }

        let joined_len = if current.is_empty() {
            estimate_tokens(&paragraph)
        } else {
            estimate_tokens(&current) + estimate_tokens(&paragraph) + 1
        };
        if joined_len > max_tokens {
            flush(&mut current, &mut chunks);
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(&paragraph);
    }
    flush(&mut current, &mut chunks);

    chunks
}

fn paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                out.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        out.push(current.join(" "));
    }
    out
}

fn split_long_paragraph(paragraph: &str, max_tokens: usize, chunks: &mut Vec<String>) {
    let max_chars = max_tokens * 4;
    let mut current = String::new();

    for word in paragraph.split_whitespace() {
        if word.chars().count() > max_chars {
            flush(&mut current, chunks);
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        let extra = if current.is_empty() { 0 } else { 1 };
        if current.chars().count() + extra + word.chars().count() > max_chars {
            flush(&mut current, chunks);
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    flush(&mut current, chunks);
}

fn flush(current: &mut String, chunks: &mut Vec<String>) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
    current.clear();
}
