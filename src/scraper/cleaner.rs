use crate::models::{NOT_AVAILABLE, UNAVAILABLE_PRICE};
use uuid::Uuid;

// ── Text ──────────────────────────────────────────────────────────────────────

/// Collapse runs of whitespace (non-breaking spaces included) to one space.
pub fn normalise_text(s: &str) -> String {
    s.split(char::is_whitespace)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalised text, or `None` when nothing but whitespace is left.
pub fn non_empty(s: &str) -> Option<String> {
    let s = normalise_text(s);
    if s.is_empty() || s == NOT_AVAILABLE { None } else { Some(s) }
}

// ── Prices ────────────────────────────────────────────────────────────────────

const CURRENCY_SYMBOLS: &[char] = &['£', '$', '€'];

/// Parse a displayed price: strip a leading currency symbol and thousands
/// separators, read the leading number.
/// "£329.99" → 329.99 | "£1,299.00 inc VAT" → 1299.0 | "Coming soon" → None
///
/// Values at or above [`UNAVAILABLE_PRICE`] are the sites' own "hidden"
/// markers and count as unparseable.
pub fn parse_price(s: &str) -> Option<f64> {
    let s = s.trim().trim_start_matches(CURRENCY_SYMBOLS).trim();
    if s.is_empty() || s == NOT_AVAILABLE || s == "-" || s == "—" {
        return None;
    }

    let numeric: String = s
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .filter(|c| *c != ',')
        .collect();

    let value: f64 = numeric.parse().ok()?;
    if !value.is_finite() || value < 0.0 || value >= UNAVAILABLE_PRICE {
        return None;
    }
    Some(value)
}

// ── Identifiers ───────────────────────────────────────────────────────────────

const SHORT_ID_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const SHORT_ID_LEN: usize = 22;

/// 22-character base57 id derived from the product link (UUID v5 in the URL
/// namespace), avoiding look-alike characters. Used as the SKU when a site
/// does not publish one; the same link always yields the same id.
pub fn short_id_for(link: &str) -> String {
    encode_short_id(Uuid::new_v5(&Uuid::NAMESPACE_URL, link.as_bytes()).as_u128())
}

fn encode_short_id(mut n: u128) -> String {
    let base = SHORT_ID_ALPHABET.len() as u128;
    let mut out = Vec::with_capacity(SHORT_ID_LEN);
    while n > 0 {
        out.push(SHORT_ID_ALPHABET[(n % base) as usize]);
        n /= base;
    }
    while out.len() < SHORT_ID_LEN {
        out.push(SHORT_ID_ALPHABET[0]);
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Extensions reserved for files written next to the per-record folders.
const RESERVED_SUFFIXES: &[&str] = &[".json", ".csv", ".jpg"];

/// A SKU made safe to use as a single path segment and object key: anything
/// outside `[A-Za-z0-9._-]` becomes `_`, leading/trailing `.`, `_`, `-` are
/// trimmed. Falls back to [`short_id_for`] when nothing usable is left or the
/// result looks like a batch file name.
pub fn storage_key(sku: &str, link: &str) -> String {
    let mapped: String = sku
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    let key = mapped.trim_matches(|c| matches!(c, '.' | '_' | '-'));

    let lower = key.to_ascii_lowercase();
    if key.is_empty() || RESERVED_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
        return short_id_for(link);
    }
    key.to_string()
}

pub fn generate_unique_id() -> String {
    Uuid::new_v4().to_string()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
