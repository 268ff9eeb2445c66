//! Markdown-aware word counting.
//!
//! A "word" is one visible character: Latin letters, digits, CJK ideographs,
//! symbols and emoji each count once, while whitespace, punctuation and
//! markdown markup do not.

use std::sync::OnceLock;

use regex::Regex;

fn fenced_code() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[^`]*```").expect("valid regex"))
}

fn link() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"!?\[([^\]]*)\]\([^)]+\)").expect("valid regex"))
}

fn ordered_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*(?:>[ \t]*)*\d+\.[ \t]+").expect("valid regex"))
}

/// Neither whitespace, Unicode punctuation (P*) nor ASCII punctuation.
fn visible() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\s\p{P}[:punct:]]").expect("valid regex"))
}

/// Count the characters of `markdown` that survive markup stripping and are
/// neither whitespace nor punctuation.
pub fn word_count(markdown: &str) -> usize {
    count_visible(&strip_markup(markdown))
}

/// Fenced blocks go entirely; link targets and ordered list numbers go
/// because they are not punctuation. Other markup is punctuation already.
fn strip_markup(markdown: &str) -> String {
    let text = fenced_code().replace_all(markdown, "");
    let text = link().replace_all(&text, "$1");
    ordered_marker().replace_all(&text, "").into_owned()
}

fn count_visible(text: &str) -> usize {
    visible().find_iter(text).count()
}
