//! Query-result presentation: formatting, ranking, and deduplication.
//!
//! The query engine in the app crate embeds the query and asks a
//! [`VectorIndex`](crate::index::VectorIndex) for neighbours; everything
//! that happens to those neighbours afterwards lives here and is pure.
//!
//! # Pipeline
//!
//! 1. Format each hit's text ([`format_display_text`]): slide-boundary
//!    markers become a visual separator, horizontal whitespace runs
//!    collapse, blank-line runs collapse to one blank line.
//! 2. Cut a display snippet ([`make_snippet`]).
//! 3. Sort ascending by distance; hits without a distance go last
//!    ([`rank_results`]).
//! 4. Drop hits whose snippet prefix repeats a better-ranked hit
//!    ([`dedup_results`]).

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::models::{ChunkMetadata, IndexStats, IndexedFile, Neighbor, QueryResult};

/// Visual separator that replaces `SLIDE <n> BREAK` markers.
pub const SLIDE_SEPARATOR: &str = "\n\n──────── Slide Break ────────\n\n";

/// Sort key used for hits that carry no distance.
pub const MISSING_DISTANCE: f32 = 999.0;

static SLIDE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[ \t]*(?:-+[ \t]*)?\bslide\s+\d+\s+break\b(?:[ \t]*-+)?[ \t]*")
        .expect("static regex")
});
static HORIZONTAL_WS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("static regex"));
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n+").expect("static regex"));

/// Presentation limits for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    /// Maximum snippet length in characters before an ellipsis is added.
    pub snippet_chars: usize,
    /// Number of leading snippet characters that identify a duplicate.
    pub dedup_prefix_chars: usize,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            snippet_chars: 400,
            dedup_prefix_chars: 120,
        }
    }
}

/// Render raw chunk text for display.
pub fn format_display_text(raw: &str) -> String {
    let text = SLIDE_MARKER.replace_all(raw, SLIDE_SEPARATOR);
    let text = HORIZONTAL_WS.replace_all(&text, " ");
    let text = BLANK_LINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// The first `max_chars` characters of `formatted`, with `...` appended
/// when anything was cut.
pub fn make_snippet(formatted: &str, max_chars: usize) -> String {
    match formatted.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &formatted[..cut]),
        None => formatted.to_string(),
    }
}

/// Build a [`QueryResult`] from a raw index hit.
pub fn build_result(hit: Neighbor, opts: &FormatOptions) -> QueryResult {
    let full_text = format_display_text(&hit.text);
    let snippet = make_snippet(&full_text, opts.snippet_chars);
    QueryResult {
        file_name: hit.metadata.file_name,
        chunk_id: hit.metadata.chunk_id,
        content_hash: hit.metadata.content_hash,
        snippet,
        full_text,
        distance: hit.distance,
    }
}

/// Sort results closest-first. The sort is stable, so equal distances keep
/// the order the index returned them in. Missing and non-finite distances
/// sort as [`MISSING_DISTANCE`].
pub fn rank_results(mut results: Vec<QueryResult>) -> Vec<QueryResult> {
    results.sort_by(|a, b| sort_key(a.distance).total_cmp(&sort_key(b.distance)));
    results
}

fn sort_key(distance: Option<f32>) -> f32 {
    distance
        .filter(|d| d.is_finite())
        .unwrap_or(MISSING_DISTANCE)
}

/// Drop every result whose first `prefix_chars` snippet characters match
/// an earlier result. Call after [`rank_results`] so the survivor is the
/// closest one.
pub fn dedup_results(results: Vec<QueryResult>, prefix_chars: usize) -> Vec<QueryResult> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|r| {
            let signature: String = r.snippet.chars().take(prefix_chars).collect();
            seen.insert(signature)
        })
        .collect()
}

/// Format, rank, and deduplicate raw hits.
pub fn present(hits: Vec<Neighbor>, opts: &FormatOptions) -> Vec<QueryResult> {
    let results = hits.into_iter().map(|h| build_result(h, opts)).collect();
    dedup_results(rank_results(results), opts.dedup_prefix_chars)
}

/// Count vectors per distinct `(file_name, content_hash)` pair, sorted by
/// file name then hash. Entries without a file name are ignored.
pub fn aggregate_files(metadata: &[ChunkMetadata]) -> Vec<IndexedFile> {
    let mut counts: BTreeMap<(&str, &str), usize> = BTreeMap::new();
    for m in metadata.iter().filter(|m| !m.file_name.is_empty()) {
        *counts
            .entry((m.file_name.as_str(), m.content_hash.as_str()))
            .or_default() += 1;
    }
    counts
        .into_iter()
        .map(|((file_name, content_hash), chunks)| IndexedFile {
            file_name: file_name.to_string(),
            content_hash: content_hash.to_string(),
            chunks,
        })
        .collect()
}

/// Assemble index stats from a vector count and the per-file summary.
pub fn index_stats(total_chunks: usize, files: Vec<IndexedFile>) -> IndexStats {
    IndexStats {
        total_chunks,
        total_files: files.len(),
        files,
    }
}
