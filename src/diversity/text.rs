//! Text normalization, tokenization and shingling.
//!
//! Everything that compares spec text (MinHash signatures, TF-IDF vectors,
//! token counts) goes through these functions so the stages agree on what a
//! "word" is.

use std::sync::LazyLock;

use regex::Regex;

/// Literals that carry no content and are removed before comparison.
const NOISE_LITERALS: [&str; 3] = ["replit.toml", "replit.nix", "0.0.0.0"];

/// Label removed before counting tokens.
const ACCESS_CONTROL_LABEL: &str = "### Access Control";

static FRONTMATTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\A---[ \t]*\r?\n.*?\n---[ \t]*\r?\n").expect("valid regex"));

static H2_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^##[ \t]+.*$").expect("valid regex"));

static FENCED_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[^`]*```").expect("valid regex"));

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-z0-9_]+").expect("valid regex"));

/// Replaces the common HTML entities with their characters.
pub fn html_unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Normalizes spec text for comparison.
///
/// Unescapes HTML entities, strips YAML front matter, H2 header lines, noise
/// literals and fenced code blocks.
pub fn normalize_text(text: &str) -> String {
    let text = html_unescape(text);
    let text = FRONTMATTER.replace(&text, "");
    let text = H2_HEADER.replace_all(&text, "");
    let mut text = text.into_owned();
    for literal in NOISE_LITERALS {
        text = text.replace(literal, "");
    }
    FENCED_CODE.replace_all(&text, "").into_owned()
}

/// Splits text into lowercase ASCII word tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    WORD.find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Counts tokens the way length bands are defined: H2 headers and the access
/// control label do not count.
pub fn count_tokens(text: &str) -> u32 {
    let stripped = H2_HEADER.replace_all(text, "");
    let stripped = stripped.replace(ACCESS_CONTROL_LABEL, "");
    tokenize(&stripped).len() as u32
}

/// Stride-1 word n-grams.
///
/// A non-empty token list shorter than `width` yields a single shingle made of
/// all tokens, so short texts still get a comparable signature.
pub fn shingles(tokens: &[String], width: usize) -> Vec<String> {
    let width = width.max(1);
    if tokens.is_empty() {
        return Vec::new();
    }
    if tokens.len() < width {
        return vec![tokens.join(" ")];
    }
    tokens.windows(width).map(|w| w.join(" ")).collect()
}

/// Convenience: normalized text to shingles in one call.
pub fn text_shingles(text: &str, width: usize) -> Vec<String> {
    shingles(&tokenize(&normalize_text(text)), width)
}
