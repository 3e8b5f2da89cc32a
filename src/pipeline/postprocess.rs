//! Post-processing: deterministic cleanup of the extraction model's answer.
//!
//! The prompt asks for bare JSON, but vision models still wrap it in
//! ```` ```json ```` fences, put a sentence before it, or sprinkle zero-width
//! characters through it. These rules undo that without touching content.
//!
//! ## Rule Order
//!
//! Invisible characters go first (a BOM in front of the fence defeats fence
//! detection), then line endings, then the fence itself.

use once_cell::sync::Lazy;
use regex::Regex;

/// Normalise a raw model answer into a candidate JSON document.
///
/// Rules (applied in order):
/// 1. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, etc.)
/// 2. Normalise line endings (CRLF → LF)
/// 3. Strip one outer markdown fence, with or without a `json` tag
/// 4. Trim surrounding whitespace
pub fn clean_response(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let s = normalise_line_endings(&s);
    let s = strip_code_fences(&s);
    s.trim().to_string()
}

/// The outermost `{ … }` span: first `{` to last `}`, across newlines.
///
/// Used as a fallback when the cleaned answer is not JSON on its own, e.g.
/// "Here is the menu: {…} Let me know if…".
pub fn outermost_object(input: &str) -> Option<&str> {
    RE_OBJECT_SPAN.find(input).map(|m| m.as_str())
}

/// The first `max_chars` characters of `input`, for error messages.
pub fn preview(input: &str, max_chars: usize) -> String {
    let mut out: String = input.chars().take(max_chars).collect();
    if input.chars().count() > max_chars {
        out.push('…');
    }
    out
}

// ── Rule 1: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\n(.*?)\n?```\s*$").unwrap());

static RE_OBJECT_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

fn strip_code_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
