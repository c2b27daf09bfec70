//! HTML-to-text normalization for Canvas description fields.
//!
//! Canvas descriptions arrive as rich-text HTML, frequently mangled by
//! copy/paste (stray control characters, broken URL schemes). Cards want
//! compact plain text, and the fingerprint wants a stable rendering, so the
//! rules here are deliberately conservative and deterministic.

use regex::Regex;
use std::sync::OnceLock;

fn re(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).unwrap_or_else(|e| panic!("bad pattern: {e}")))
}

/// Strip tags and normalize whitespace. Empty input yields an empty string.
#[must_use]
pub fn html_to_text(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    static SCRIPT_STYLE: OnceLock<Regex> = OnceLock::new();
    static BR: OnceLock<Regex> = OnceLock::new();
    static P_CLOSE: OnceLock<Regex> = OnceLock::new();
    static TAG: OnceLock<Regex> = OnceLock::new();
    static SPACES: OnceLock<Regex> = OnceLock::new();
    static LINE_EDGES: OnceLock<Regex> = OnceLock::new();
    static BLANK_LINES: OnceLock<Regex> = OnceLock::new();
    static HTTPS_FIX: OnceLock<Regex> = OnceLock::new();
    static HTTP_FIX: OnceLock<Regex> = OnceLock::new();

    let mut text = re(&SCRIPT_STYLE, r"(?is)<(script|style)[^>]*>.*?</(script|style)>")
        .replace_all(raw, " ")
        .into_owned();
    text = re(&BR, r"(?i)<br\s*/?>").replace_all(&text, "\n").into_owned();
    text = re(&P_CLOSE, r"(?i)</p\s*>").replace_all(&text, "\n").into_owned();
    text = re(&TAG, r"(?s)<[^>]*>").replace_all(&text, " ").into_owned();

    text = unescape_entities(&text);
    text = text.replace('\u{00A0}', " ").replace('\u{200B}', "");
    text = text.replace("\r\n", "\n");

    // Copy/pasted Canvas text sometimes carries control characters where
    // letters should be; map the common ones back.
    text = text
        .replace('\t', "t")
        .replace('\u{000C}', "f")
        .replace('\u{000B}', "d")
        .replace('\r', "r");

    text = re(&SPACES, r"[ ]+").replace_all(&text, " ").into_owned();
    text = re(&LINE_EDGES, r" ?\n ?").replace_all(&text, "\n").into_owned();
    text = re(&BLANK_LINES, r"\n\s*\n+").replace_all(&text, "\n\n").into_owned();
    let mut text = text.trim().to_string();

    // Broken URL schemes from embedded tabs/newlines: "h ps://" and friends.
    text = re(&HTTPS_FIX, r"(?i)\bh\s*ps(://|%3a)")
        .replace_all(&text, "https$1")
        .into_owned();
    text = re(&HTTP_FIX, r"(?i)\bh\s*p(://|%3a)")
        .replace_all(&text, "http$1")
        .into_owned();
    text
}

/// The handful of entities Canvas actually emits.
fn unescape_entities(text: &str) -> String {
    text.replace("&nbsp;", "\u{00A0}")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
