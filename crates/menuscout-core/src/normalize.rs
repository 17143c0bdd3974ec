//! Text, slug, and number normalization for scraped marketplace values.
//!
//! The marketplace renders prices and ratings for humans (`"R$ 1.234,90"`,
//! `"4,7"`, `"Novo"`, `"Grátis"`). Everything here converts those strings into
//! values that compare stably across scrapes, which is what the upsert layer
//! relies on to detect "unchanged" rows.

use std::str::FromStr;

use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// A scraped string that should have been a number but is not.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("not a valid number: {0:?}")]
pub struct InvalidNumber(pub String);

const PLACEHOLDERS: &[&str] = &["", "-", "n/a", "não informado", "nao informado"];
const FREE_MARKERS: &[&str] = &["grátis", "gratis", "free"];

/// Lowercases, trims, and collapses internal whitespace runs to one space.
#[must_use]
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    }
}

/// Generate a URL-safe slug: accents folded, non-alphanumerics collapsed to `-`.
#[must_use]
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(fold_accent)
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Last non-empty path segment of a category URL, slugified.
///
/// `"https://site/delivery/birigui-sp/pizza"` → `Some("pizza")`. Query strings
/// and fragments are ignored.
#[must_use]
pub fn slug_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let without_scheme = path.split_once("://").map_or(path, |(_, rest)| rest);
    // The first segment after the scheme is the host, never a slug.
    let mut segments = without_scheme.split('/');
    if path.contains("://") {
        segments.next();
    }
    segments
        .filter(|s| !s.trim().is_empty())
        .last()
        .map(slugify)
        .filter(|s| !s.is_empty())
}

/// Parse a displayed price into a 2-dp decimal.
///
/// Returns `Ok(None)` for empty or placeholder values and `Ok(Some(0))` for
/// "free" markers. A comma is taken as the decimal separator, in which case
/// dots are thousands separators.
///
/// # Errors
///
/// Returns [`InvalidNumber`] when the value has no digits, does not parse, or
/// is negative.
pub fn parse_price(raw: &str) -> Result<Option<Decimal>, InvalidNumber> {
    let trimmed = raw.trim();
    let lowered = trimmed.to_lowercase();
    if PLACEHOLDERS.contains(&lowered.as_str()) {
        return Ok(None);
    }
    if FREE_MARKERS.contains(&lowered.as_str()) {
        return Ok(Some(Decimal::ZERO));
    }

    let value = parse_decimal(trimmed)?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(InvalidNumber(raw.to_string()));
    }
    Ok(Some(value.round_dp(2)))
}

/// Parse a displayed rating (`"4,7"`, `"4.7"`) into a 1-dp decimal in `0..=5`.
///
/// Unrated restaurants (`"Novo"`, empty) yield `Ok(None)`.
///
/// # Errors
///
/// Returns [`InvalidNumber`] for unparseable values or values outside `0..=5`.
pub fn parse_rating(raw: &str) -> Result<Option<Decimal>, InvalidNumber> {
    let lowered = raw.trim().to_lowercase();
    if PLACEHOLDERS.contains(&lowered.as_str()) || lowered == "novo" || lowered == "new" {
        return Ok(None);
    }
    let value = parse_decimal(raw.trim())?;
    if value < Decimal::ZERO || value > Decimal::from(5) {
        return Err(InvalidNumber(raw.to_string()));
    }
    Ok(Some(value.round_dp(1)))
}

fn parse_decimal(raw: &str) -> Result<Decimal, InvalidNumber> {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();
    if !kept.chars().any(|c| c.is_ascii_digit()) {
        return Err(InvalidNumber(raw.to_string()));
    }

    let canonical = if kept.contains(',') {
        kept.replace('.', "").replace(',', ".")
    } else if kept.matches('.').count() > 1 {
        kept.replace('.', "")
    } else {
        kept
    };

    Decimal::from_str(&canonical).map_err(|_| InvalidNumber(raw.to_string()))
}

/// Hex SHA-256 of the given parts joined with `|`.
///
/// Used for natural keys that have no single business identifier, so callers
/// must pass already-normalized parts.
#[must_use]
pub fn content_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parts.join("|").as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
