//! Cache key derivation.
//!
//! Raw text is normalized (case-fold, punctuation strip, article removal,
//! singularization) and the normalized text is hashed with SHA-256,
//! truncated to [`CacheConfig::KEY_HEX_LEN`] hex characters. Different
//! phrasings of one concept ("a horse", "Horses") share a key.

use crate::config::CacheConfig;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::sync::LazyLock;

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());

const ARTICLES: &[&str] = &["a", "an", "the"];

const IRREGULAR_PLURALS: &[(&str, &str)] = &[
    ("men", "man"),
    ("women", "woman"),
    ("children", "child"),
    ("people", "person"),
    ("mice", "mouse"),
    ("geese", "goose"),
    ("feet", "foot"),
    ("teeth", "tooth"),
    ("oxen", "ox"),
    ("wolves", "wolf"),
    ("knives", "knife"),
    ("leaves", "leaf"),
    ("wives", "wife"),
    ("lives", "life"),
    ("halves", "half"),
    ("calves", "calf"),
    ("elves", "elf"),
    ("shelves", "shelf"),
    ("thieves", "thief"),
    ("loaves", "loaf"),
    ("hooves", "hoof"),
    ("scarves", "scarf"),
    ("cacti", "cactus"),
    ("fungi", "fungus"),
    ("octopi", "octopus"),
    ("indices", "index"),
    ("matrices", "matrix"),
    ("vertices", "vertex"),
    ("phenomena", "phenomenon"),
    ("criteria", "criterion"),
];

const UNINFLECTED: &[&str] = &[
    "sheep", "fish", "deer", "moose", "series", "species", "news", "aircraft",
];

/// Plurals in `-uses` whose singular ends in `-us`.
const US_PLURALS: &[&str] = &[
    "buses", "viruses", "bonuses", "campuses", "circuses", "cactuses", "octopuses",
    "walruses", "platypuses", "hippopotamuses",
];

/// Plurals in `-oes` whose singular ends in `-o`.
const O_PLURALS: &[&str] = &[
    "potatoes", "tomatoes", "heroes", "echoes", "torpedoes", "vetoes", "volcanoes",
    "mosquitoes", "dominoes",
];

/// Reduce a lowercase token to its singular form.
///
/// Rule-based; tokens that are not purely alphabetic are returned as-is.
pub fn lemmatize(token: &str) -> Cow<'_, str> {
    if !token.chars().all(|c| c.is_alphabetic()) || UNINFLECTED.contains(&token) {
        return Cow::Borrowed(token);
    }
    if let Some((_, singular)) = IRREGULAR_PLURALS.iter().find(|(plural, _)| *plural == token) {
        return Cow::Borrowed(*singular);
    }

    let strip = |n: usize| Cow::Borrowed(&token[..token.len() - n]);

    if token.ends_with("sses") {
        return strip(2);
    }
    if token.ends_with("uses") {
        return if US_PLURALS.contains(&token) {
            strip(2)
        } else {
            strip(1)
        };
    }
    if token.ends_with("xes") || token.ends_with("zzes") {
        return strip(2);
    }
    if token.ends_with("ches") || token.ends_with("shes") {
        return strip(2);
    }
    if token.ends_with("ies") && token.len() > 4 {
        return Cow::Owned(format!("{}y", &token[..token.len() - 3]));
    }
    if token.ends_with("oes") && O_PLURALS.contains(&token) {
        return strip(2);
    }
    if token.ends_with('s')
        && token.len() > 3
        && !token.ends_with("ss")
        && !token.ends_with("us")
        && !token.ends_with("is")
    {
        return strip(1);
    }
    Cow::Borrowed(token)
}

/// Normalize raw text for keying.
///
/// If nothing survives normalization the original trimmed text is
/// returned, so the key is never derived from an empty string.
pub fn normalize_key(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = NON_WORD.replace_all(&lowered, "");
    let normalized = stripped
        .split_whitespace()
        .filter(|token| !ARTICLES.contains(token))
        .map(lemmatize)
        .collect::<Vec<_>>()
        .join(" ");

    if normalized.is_empty() {
        text.trim().to_string()
    } else {
        normalized
    }
}

/// Truncated SHA-256 hex digest of already-normalized text.
pub fn hash_key(normalized: &str) -> String {
    let digest = hex::encode(Sha256::digest(normalized.as_bytes()));
    digest[..CacheConfig::KEY_HEX_LEN].to_string()
}

/// Durable-tier object path for a key.
pub fn blob_path(key: &str) -> String {
    format!("{}{}{}", CacheConfig::BLOB_PREFIX, key, CacheConfig::BLOB_SUFFIX)
}

/// Inverse of [`blob_path`]; `None` for objects outside the shape namespace.
pub fn key_from_blob_path(path: &str) -> Option<&str> {
    path.strip_prefix(CacheConfig::BLOB_PREFIX)?
        .strip_suffix(CacheConfig::BLOB_SUFFIX)
}
