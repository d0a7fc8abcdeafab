//! Text predicates and transforms used by the join passes.

use regex::Regex;
use std::sync::LazyLock;

use crate::config::KeyTag;

/// Every recognized karaoke tag, with an optional duration
static KEY_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\\(?:k|ko|kf)\d*\}").expect("key tag pattern"));

const TERMINAL_PUNCTUATION: &[char] = &[
    '.', '!', '?', '…', '"', '\'', '。', '！', '？', '」', '』', ')', '）',
];

/// Left text ends with `tag` (e.g. `{\kf}` or `{\kf45}`)
pub fn ends_with_key_tag(text: &str, tag: KeyTag) -> bool {
    let trimmed = text.trim_end();
    let Some(open) = trimmed.rfind('{') else {
        return false;
    };
    let token = &trimmed[open..];
    let Some(body) = token
        .strip_prefix('{')
        .and_then(|t| t.strip_suffix('}'))
        .and_then(|t| t.strip_prefix(tag.as_str()))
    else {
        return false;
    };
    body.chars().all(|c| c.is_ascii_digit())
}

pub fn strip_key_tags(text: &str) -> String {
    KEY_TAGS.replace_all(text, "").trim().to_string()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric()
}

/// `text` ends with `word` on a word boundary, ignoring case
pub fn ends_with_word(text: &str, word: &str) -> bool {
    let text = text.trim_end().to_lowercase();
    let word = word.trim().to_lowercase();
    if word.is_empty() {
        return false;
    }
    match text.strip_suffix(&word) {
        Some(prefix) => prefix.chars().next_back().is_none_or(|c| !is_word_char(c)),
        None => false,
    }
}

/// `text` starts with `word` on a word boundary, ignoring case
pub fn starts_with_word(text: &str, word: &str) -> bool {
    let text = text.trim_start().to_lowercase();
    let word = word.trim().to_lowercase();
    if word.is_empty() {
        return false;
    }
    match text.strip_prefix(&word) {
        Some(rest) => rest.chars().next().is_none_or(|c| !is_word_char(c)),
        None => false,
    }
}

/// A delimiter sits at the boundary between `left` and `right`
pub fn delimiter_at_boundary(left: &str, right: &str, delimiters: &str) -> bool {
    let last = left.trim_end().chars().next_back();
    let first = right.trim_start().chars().next();
    last.is_some_and(|c| delimiters.contains(c)) || first.is_some_and(|c| delimiters.contains(c))
}

pub fn char_len(text: &str) -> usize {
    text.trim().chars().count()
}

pub fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x30FF   // kana
        | 0x3400..=0x4DBF
        | 0x4E00..=0x9FFF
        | 0xAC00..=0xD7AF // hangul
        | 0xF900..=0xFAFF
        | 0x3000..=0x303F // CJK punctuation
        | 0xFF00..=0xFFEF)
}

/// Join two pieces of text; CJK text joins without a space
pub fn join_text(left: &str, right: &str) -> String {
    let left = left.trim();
    let right = right.trim();
    if left.is_empty() {
        return right.to_string();
    }
    if right.is_empty() {
        return left.to_string();
    }
    let cjk_seam = left.chars().next_back().is_some_and(is_cjk)
        || right.chars().next().is_some_and(is_cjk);
    if cjk_seam {
        format!("{}{}", left, right)
    } else {
        format!("{} {}", left, right)
    }
}

/// Break `text` after each delimiter that is followed by whitespace, so
/// runs like "?!" stay whole. Returns a single element when there is
/// nothing to split.
pub fn split_sentences(text: &str, delimiters: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = text.trim().chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let at_break = delimiters.contains(c)
            && chars.peek().is_some_and(|next| next.is_whitespace());
        if at_break {
            let piece = current.trim().to_string();
            if !piece.is_empty() {
                parts.push(piece);
            }
            current.clear();
        }
    }
    let tail = current.trim().to_string();
    if !tail.is_empty() {
        parts.push(tail);
    }
    if parts.is_empty() {
        parts.push(String::new());
    }
    parts
}

/// Uppercase the first letter and make sure the text ends a sentence.
pub fn capitalize_sentence(text: &str) -> String {
    let trimmed = text.trim();
    let mut chars = trimmed.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    let mut result: String = first.to_uppercase().chain(chars).collect();

    if let Some(last) = result.chars().next_back() {
        if !TERMINAL_PUNCTUATION.contains(&last) {
            result.push(if is_cjk(last) { '。' } else { '.' });
        }
    }
    result
}
