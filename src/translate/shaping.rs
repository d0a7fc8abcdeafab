use regex::Regex;
use std::sync::LazyLock;

/// ASS override blocks such as `{\an8}` or `{\k20}`
static OVERRIDE_CODES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\\[^}]*\}").expect("override code pattern"));

pub fn strip_override_codes(text: &str) -> String {
    OVERRIDE_CODES.replace_all(text, "").into_owned()
}

/// Replace each of `chars` with a space, then strip trailing whitespace
/// from every sentence line.
pub fn apply_delete_chars(text: &str, chars: &str) -> String {
    let replaced: String = text
        .chars()
        .map(|c| if chars.contains(c) { ' ' } else { c })
        .collect();
    replaced
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}
