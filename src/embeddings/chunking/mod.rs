#[cfg(test)]
mod tests;

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ChunkingConfig, ConfigError};
use crate::document::Page;

/// Separators tried in order, from paragraph breaks down to single characters
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// Where a chunk came from; stored alongside its vector
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkMetadata {
    /// Path of the source document
    pub source: String,
    /// Zero-based page number
    pub page: usize,
    pub total_pages: usize,
    /// Position of the chunk across the whole document
    pub chunk_index: usize,
}

/// A piece of document text ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Recursive character splitter.
///
/// Text is split on the first separator it contains. Pieces shorter than the chunk size
/// are merged back together up to that size, carrying up to `chunk_overlap` characters of
/// the previous chunk forward. Pieces that are still too long are split again with the
/// next separator. Separators stay attached to the start of the piece that follows them.
/// All lengths are counted in characters.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: &'static [&'static str],
}

impl TextSplitter {
    #[inline]
    pub fn new(config: &ChunkingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            separators: DEFAULT_SEPARATORS,
        })
    }

    /// Split text into trimmed, non-empty chunks in document order
    #[inline]
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        self.split_recursive(text, self.separators, &mut chunks);
        chunks
    }

    /// Split every page, numbering chunks across the whole document
    #[inline]
    pub fn split_pages(&self, pages: &[Page]) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for page in pages {
            for text in self.split_text(&page.text) {
                let chunk_index = chunks.len();
                chunks.push(Chunk {
                    text,
                    metadata: ChunkMetadata {
                        source: page.source.clone(),
                        page: page.number,
                        total_pages: page.total,
                        chunk_index,
                    },
                });
            }
        }

        debug!(
            "Split {} pages into {} chunks (size {}, overlap {})",
            pages.len(),
            chunks.len(),
            self.chunk_size,
            self.chunk_overlap
        );

        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[&str], chunks: &mut Vec<String>) {
        let (separator, remaining) = choose_separator(text, separators);
        let mut short_pieces = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(&piece) < self.chunk_size {
                short_pieces.push(piece);
                continue;
            }

            if !short_pieces.is_empty() {
                self.merge_pieces(std::mem::take(&mut short_pieces), chunks);
            }

            if remaining.is_empty() {
                push_trimmed(&piece, chunks);
            } else {
                self.split_recursive(&piece, remaining, chunks);
            }
        }

        if !short_pieces.is_empty() {
            self.merge_pieces(short_pieces, chunks);
        }
    }

    fn merge_pieces(&self, pieces: Vec<String>, chunks: &mut Vec<String>) {
        let mut current: VecDeque<(String, usize)> = VecDeque::new();
        let mut total = 0;

        for piece in pieces {
            let len = char_len(&piece);

            if total + len > self.chunk_size && !current.is_empty() {
                push_trimmed(&join(&current), chunks);

                // Keep only the tail that fits in the overlap window
                while total > self.chunk_overlap || (total > 0 && total + len > self.chunk_size)
                {
                    let Some((_, dropped)) = current.pop_front() else {
                        break;
                    };
                    total -= dropped;
                }
            }

            current.push_back((piece, len));
            total += len;
        }

        push_trimmed(&join(&current), chunks);
    }
}

/// First separator present in the text, and the finer separators after it
fn choose_separator<'a>(text: &str, separators: &'a [&'a str]) -> (&'a str, &'a [&'a str]) {
    for (i, &separator) in separators.iter().enumerate() {
        if separator.is_empty() {
            return (separator, &[]);
        }
        if text.contains(separator) {
            return (separator, &separators[i + 1..]);
        }
    }
    (separators.last().copied().unwrap_or(""), &[])
}

fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }

    let mut parts = text.split(separator);
    let mut pieces: Vec<String> = parts.next().map(str::to_string).into_iter().collect();
    pieces.extend(parts.map(|part| format!("{}{}", separator, part)));
    pieces.retain(|piece| !piece.is_empty());
    pieces
}

fn join(pieces: &VecDeque<(String, usize)>) -> String {
    pieces.iter().map(|(piece, _)| piece.as_str()).collect()
}

fn push_trimmed(text: &str, chunks: &mut Vec<String>) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
