//! Overlapping word-window text chunker.
//!
//! Splits an item's text into [`Chunk`]s of at most `window` words, each
//! sharing `overlap` words with its predecessor. Text is normalized first
//! so markup never reaches the embedding model.
//!
//! # Algorithm
//!
//! 1. Normalize: strip HTML tags, Markdown images/links (keeping link text),
//!    fenced code blocks (replaced by a space), inline-code backticks,
//!    heading and emphasis markers; collapse whitespace.
//! 2. Split on whitespace into words.
//! 3. Emit `words[start..start + window]`, advancing `start` by
//!    `window - overlap`, until a window reaches the last word.
//! 4. Back-fill `total_chunks` on every chunk once the count is known.
//!
//! # Example
//!
//! ```rust
//! use groundwork_core::chunk::Chunker;
//! use groundwork_core::models::ChunkOrigin;
//!
//! let chunker = Chunker::new(10, 2).unwrap();
//! let chunks = chunker.chunk("Service X handles payments.", "svc-x", "Service X", ChunkOrigin::Content);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].metadata.total_chunks, 1);
//! ```

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{RagError, Result};
use crate::models::{Chunk, ChunkMetadata, ChunkOrigin};

pub const DEFAULT_WINDOW_WORDS: usize = 256;
pub const DEFAULT_OVERLAP_WORDS: usize = 32;

/// Word-window chunker with a validated `(window, overlap)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    window: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a chunker.
    ///
    /// # Errors
    ///
    /// [`RagError::Configuration`] if `window == 0` or `overlap >= window`;
    /// a non-positive stride would never advance.
    pub fn new(window: usize, overlap: usize) -> Result<Self> {
        if window == 0 {
            return Err(RagError::config("chunking.window_words must be > 0"));
        }
        if overlap >= window {
            return Err(RagError::config(format!(
                "chunking.overlap_words ({}) must be smaller than chunking.window_words ({})",
                overlap, window
            )));
        }
        Ok(Self { window, overlap })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    fn stride(&self) -> usize {
        self.window - self.overlap
    }

    /// Normalize and split `text` into chunks for one source item.
    ///
    /// Returns an empty `Vec` when the normalized text is empty.
    pub fn chunk(
        &self,
        text: &str,
        source_item_id: &str,
        source_item_name: &str,
        origin: ChunkOrigin,
    ) -> Vec<Chunk> {
        let normalized = normalize_text(text);
        if normalized.is_empty() {
            tracing::debug!(source_item_id, %origin, "no text left after normalization");
            return Vec::new();
        }

        let words: Vec<&str> = normalized.split(' ').collect();
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < words.len() {
            let end = (start + self.window).min(words.len());
            let chunk_index = chunks.len();
            chunks.push(Chunk {
                id: Chunk::deterministic_id(source_item_id, origin, chunk_index),
                source_item_id: source_item_id.to_string(),
                source_item_name: source_item_name.to_string(),
                content: words[start..end].join(" "),
                metadata: ChunkMetadata {
                    origin,
                    chunk_index,
                    total_chunks: 0,
                },
            });
            if end == words.len() {
                break;
            }
            start += self.stride();
        }

        let total = chunks.len();
        for chunk in &mut chunks {
            chunk.metadata.total_chunks = total;
        }

        tracing::debug!(source_item_id, %origin, chunks = total, "chunked item");
        chunks
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW_WORDS,
            overlap: DEFAULT_OVERLAP_WORDS,
        }
    }
}

struct Patterns {
    code_fence: Regex,
    html_tag: Regex,
    md_image: Regex,
    md_link: Regex,
    heading: Regex,
    strong: Regex,
    em: Regex,
    inline_code: Regex,
    whitespace: Regex,
}

/// HTML element names recognized as tags. Anything else between `<` and `>`
/// is treated as prose (`x<y and y>z`).
const HTML_TAGS: &str = "a|abbr|article|aside|audio|b|blockquote|body|br|button|caption|center|\
cite|code|col|colgroup|dd|del|details|div|dl|dt|em|figcaption|figure|font|footer|form|\
h[1-6]|head|header|hr|html|i|iframe|img|input|ins|kbd|label|li|link|main|mark|meta|nav|\
ol|option|p|pre|q|s|script|section|select|small|source|span|strike|strong|style|sub|\
summary|sup|table|tbody|td|textarea|tfoot|th|thead|time|title|tr|tt|u|ul|var|video";

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        code_fence: Regex::new(r"(?s)```.*?```|~~~.*?~~~").expect("valid regex"),
        html_tag: Regex::new(&format!(
            r#"(?i)</?(?:{})(?:\s+[a-z_:][-\w:.]*(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'=<>`]+))?)*\s*/?>|<!--(?s:.*?)-->"#,
            HTML_TAGS
        ))
        .expect("valid regex"),
        md_image: Regex::new(r"!\[([^\]]*)\]\([^)]*\)").expect("valid regex"),
        md_link: Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid regex"),
        heading: Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]+").expect("valid regex"),
        strong: Regex::new(r"\B\*\*(\S(?:[^*\n]*?\S)?)\*\*\B").expect("valid regex"),
        em: Regex::new(r"\B\*(\S(?:[^*\n]*?\S)?)\*\B").expect("valid regex"),
        inline_code: Regex::new(r"`([^`\n]+)`").expect("valid regex"),
        whitespace: Regex::new(r"\s+").expect("valid regex"),
    })
}

/// Strip markup from `text` and collapse whitespace.
///
/// Link and image syntax keeps its visible text; fenced code blocks become a
/// single space so the surrounding words stay separated. Emphasis and inline
/// code are only unwrapped when the delimiters pair up around text, so `*`
/// in arithmetic and underscores in identifiers survive.
pub fn normalize_text(text: &str) -> String {
    let p = patterns();
    let text = p.code_fence.replace_all(text, " ");
    let text = p.html_tag.replace_all(&text, " ");
    let text = p.md_image.replace_all(&text, "$1");
    let text = p.md_link.replace_all(&text, "$1");
    let text = p.heading.replace_all(&text, "");
    let text = p.inline_code.replace_all(&text, "$1");
    let text = p.strong.replace_all(&text, "$1");
    let text = p.em.replace_all(&text, "$1");
    p.whitespace.replace_all(&text, " ").trim().to_string()
}
