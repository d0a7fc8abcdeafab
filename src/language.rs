//! Language-code resolution.
//!
//! A requested code that is not exactly supported is resolved to the closest
//! supported code with a 0-100 score. Codes naming the same ISO 639 language
//! score 90-100 depending on how their subtags agree; anything else gets a
//! fuzzy string score capped at 80.

use isolang::Language;
use tracing::{info, warn};

use crate::config::{LanguageConfig, UnresolvedLanguage};
use crate::error::{Result, SubflowError};

/// Languages accepted by the whisper transcription backends.
pub const SPEECH_LANGUAGES: &[&str] = &[
    "af", "am", "ar", "as", "az", "ba", "be", "bg", "bn", "bo", "br", "bs", "ca", "cs", "cy", "da",
    "de", "el", "en", "es", "et", "eu", "fa", "fi", "fo", "fr", "gl", "gu", "ha", "haw", "he", "hi",
    "hr", "ht", "hu", "hy", "id", "is", "it", "ja", "jw", "ka", "kk", "km", "kn", "ko", "la", "lb",
    "ln", "lo", "lt", "lv", "mg", "mi", "mk", "ml", "mn", "mr", "ms", "mt", "my", "ne", "nl", "nn",
    "no", "oc", "pa", "pl", "ps", "pt", "ro", "ru", "sa", "sd", "si", "sk", "sl", "sn", "so", "sq",
    "sr", "su", "sv", "sw", "ta", "te", "tg", "th", "tk", "tl", "tr", "tt", "uk", "ur", "uz", "vi",
    "yi", "yo", "zh",
];

/// Languages accepted by the translation backends.
pub const TRANSLATION_LANGUAGES: &[&str] = &[
    "ar", "bg", "bn", "ca", "cs", "da", "de", "el", "en", "en-GB", "en-US", "es", "et", "fa", "fi",
    "fr", "gu", "he", "hi", "hr", "hu", "id", "is", "it", "ja", "kn", "ko", "lt", "lv", "ml", "mr",
    "ms", "nl", "no", "pa", "pl", "pt", "pt-BR", "ro", "ru", "sk", "sl", "sq", "sr", "sv", "sw",
    "ta", "te", "th", "tr", "uk", "ur", "vi", "zh", "zh-CN", "zh-TW",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageMatch {
    pub code: String,
    pub score: u8,
}

fn normalize(code: &str) -> String {
    code.trim().replace('_', "-").to_lowercase()
}

fn split_tag(normalized: &str) -> (&str, &str) {
    match normalized.split_once('-') {
        Some((primary, rest)) => (primary, rest),
        None => (normalized, ""),
    }
}

/// ISO 639-2/B codes that differ from their 639-2/T form
fn part2b_to_part2t(code: &str) -> Option<&'static str> {
    Some(match code {
        "alb" => "sqi",
        "arm" => "hye",
        "baq" => "eus",
        "bur" => "mya",
        "chi" => "zho",
        "cze" => "ces",
        "dut" => "nld",
        "fre" => "fra",
        "geo" => "kat",
        "ger" => "deu",
        "gre" => "ell",
        "ice" => "isl",
        "mac" => "mkd",
        "may" => "msa",
        "per" => "fas",
        "rum" => "ron",
        "slo" => "slk",
        "wel" => "cym",
        _ => return None,
    })
}

fn iso_language(primary: &str) -> Option<Language> {
    match primary.len() {
        2 => Language::from_639_1(primary),
        3 => Language::from_639_3(primary)
            .or_else(|| part2b_to_part2t(primary).and_then(Language::from_639_3)),
        _ => {
            let mut chars = primary.chars();
            let first = chars.next()?;
            let name: String = first.to_uppercase().chain(chars).collect();
            Language::from_name(&name)
        }
    }
}

/// Similarity of two language codes on a 0-100 scale.
pub fn match_score(requested: &str, candidate: &str) -> u8 {
    let requested = normalize(requested);
    let candidate = normalize(candidate);
    if requested.is_empty() || candidate.is_empty() {
        return 0;
    }
    if requested == candidate {
        return 100;
    }

    let (req_primary, req_rest) = split_tag(&requested);
    let (cand_primary, cand_rest) = split_tag(&candidate);
    let same_language = match (iso_language(req_primary), iso_language(cand_primary)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    };

    if same_language {
        if req_rest == cand_rest {
            100
        } else if req_rest.is_empty() || cand_rest.is_empty() {
            95
        } else {
            90
        }
    } else {
        (strsim::jaro_winkler(&requested, &candidate) * 80.0).round() as u8
    }
}

/// Closest supported code; ties keep the earlier candidate.
pub fn best_match(requested: &str, supported: &[&str]) -> Option<LanguageMatch> {
    let mut best: Option<LanguageMatch> = None;
    for candidate in supported {
        let score = match_score(requested, candidate);
        if best.as_ref().is_none_or(|b| score > b.score) {
            best = Some(LanguageMatch {
                code: candidate.to_string(),
                score,
            });
        }
    }
    best
}

/// Resolve `requested` against `supported`, applying the configured
/// minimum score and the policy for unresolvable codes.
pub fn resolve(requested: &str, supported: &[&str], config: &LanguageConfig) -> Result<String> {
    let normalized = normalize(requested);
    if let Some(exact) = supported.iter().find(|c| normalize(c) == normalized) {
        return Ok(exact.to_string());
    }

    let best = best_match(requested, supported);
    match best {
        Some(found) if found.score >= config.min_score => {
            info!(
                "Resolved language '{}' to '{}' (score {})",
                requested, found.code, found.score
            );
            Ok(found.code)
        }
        other => {
            let detail = other
                .map(|m| format!("closest '{}' scored {}", m.code, m.score))
                .unwrap_or_else(|| "no candidates".to_string());
            match config.on_unresolved {
                UnresolvedLanguage::Fail => Err(SubflowError::Config(format!(
                    "Language '{}' has no supported match above score {} ({})",
                    requested, config.min_score, detail
                ))),
                UnresolvedLanguage::Passthrough => {
                    warn!(
                        "Language '{}' has no supported match ({}); using it unchanged",
                        requested, detail
                    );
                    Ok(requested.trim().to_string())
                }
            }
        }
    }
}

/// English name of a language code, if known.
pub fn language_name(code: &str) -> Option<&'static str> {
    let normalized = normalize(code);
    let (primary, _) = split_tag(&normalized);
    iso_language(primary).map(|lang| lang.to_name())
}
