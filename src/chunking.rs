//! Token-bounded text chunking.
//!
//! Text is split into tokens on whitespace and common punctuation, then
//! tokens are packed greedily into chunks of at most `max_tokens` tokens. The
//! punctuation itself is dropped and each chunk re-joins its tokens with single
//! spaces. The split is a pure function of its inputs, so re-chunking unchanged
//! content always yields the same chunk digests.

/// Punctuation characters that separate tokens in addition to whitespace.
pub const PUNCTUATION_SEPARATORS: &[char] = &[
    ',', '.', ';', ':', '!', '?', '-', '(', ')', '[', ']', '{', '}', '"', '\'',
];

/// One piece of a file's text, ready for embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub tokens: usize,
}

/// Whether `c` separates tokens.
pub fn is_separator(c: char) -> bool {
    c.is_whitespace() || PUNCTUATION_SEPARATORS.contains(&c)
}

/// Iterates over the tokens of `text`.
pub fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(is_separator).filter(|token| !token.is_empty())
}

/// Splits `text` into chunks of at most `max_tokens` tokens.
///
/// A `max_tokens` of zero is treated as one.
pub fn chunk(text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_tokens = max_tokens.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0usize;

    for token in tokens(text) {
        if count == max_tokens {
            chunks.push(Chunk {
                text: std::mem::take(&mut current),
                tokens: count,
            });
            count = 0;
        }
        if count > 0 {
            current.push(' ');
        }
        current.push_str(token);
        count += 1;
    }

    if count > 0 {
        chunks.push(Chunk {
            text: current,
            tokens: count,
        });
    }

    chunks
}
