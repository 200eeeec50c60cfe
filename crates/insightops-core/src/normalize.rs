//! Text cleaning and word-window chunking.
//!
//! [`clean_text`] normalizes extracted text before it is split, and
//! [`chunk_text`] cuts the cleaned text into non-overlapping windows of a
//! fixed number of words. Splitting is purely positional: every chunk
//! except the last holds exactly `chunk_size` words, which keeps embedding
//! cost uniform across chunks.
//!
//! # Example
//!
//! ```rust
//! use insightops_core::normalize::{chunk_text, clean_text};
//!
//! let cleaned = clean_text("Hello,   World!! <b>foo</b>");
//! assert_eq!(cleaned, "hello, world!! bfoob");
//!
//! let chunks: Vec<String> = chunk_text(&cleaned, 2).collect();
//! assert_eq!(chunks, vec!["hello, world!!", "bfoob"]);
//! ```

use std::str::SplitWhitespace;
use std::sync::LazyLock;

use regex::Regex;

/// Default number of words per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 300;

static DISALLOWED_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s.,!?]").expect("static regex"));
static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

/// Normalize raw text for chunking and embedding.
///
/// - lowercases
/// - drops every character that is not a word character, whitespace, or
///   one of `. , ! ?`
/// - collapses whitespace runs to a single space and trims both ends
///
/// The function is pure and idempotent: `clean_text(clean_text(s)) == clean_text(s)`.
pub fn clean_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = DISALLOWED_CHARS.replace_all(&lowered, "");
    let collapsed = WHITESPACE_RUN.replace_all(&stripped, " ");
    collapsed.trim().to_string()
}

/// Split text into lazy, non-overlapping windows of `chunk_size` words.
///
/// Words are whitespace-separated tokens and are re-joined with a single
/// space. The last window may be shorter. A `chunk_size` of zero is
/// treated as one word per chunk.
pub fn chunk_text(text: &str, chunk_size: usize) -> WordChunks<'_> {
    WordChunks {
        words: text.split_whitespace(),
        chunk_size: chunk_size.max(1),
    }
}

/// Iterator returned by [`chunk_text`].
#[derive(Debug, Clone)]
pub struct WordChunks<'a> {
    words: SplitWhitespace<'a>,
    chunk_size: usize,
}

impl<'a> Iterator for WordChunks<'a> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let first = self.words.next()?;
        let mut chunk = String::from(first);
        for word in self.words.by_ref().take(self.chunk_size - 1) {
            chunk.push(' ');
            chunk.push_str(word);
        }
        Some(chunk)
    }
}
