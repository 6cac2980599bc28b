use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Fields pulled out of one matched listing element, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    pub name: Option<String>,
    pub price: Option<String>,
    pub link: Option<String>,
}

impl RawRecord {
    pub fn new(name: Option<String>, price: Option<String>, link: Option<String>) -> Self {
        Self { name, price, link }
    }
}

/// A product record extracted from a result page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedItem {
    pub name: String,
    /// Price text exactly as the site rendered it.
    pub raw_price: Option<String>,
    pub normalized_price: Option<f64>,
    pub link: Option<String>,
    /// Display name of the source site.
    pub site: String,
    /// 1-based result page the item came from.
    pub page: u32,
}

impl ExtractedItem {
    /// Build an item from a raw record, or `None` if it has no usable name.
    pub fn from_raw(raw: RawRecord, site: &str, page: u32) -> Option<Self> {
        let name = raw.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())?;
        let raw_price = raw
            .price
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        let normalized_price = normalize_price(raw_price.as_deref());

        Some(Self {
            name,
            raw_price,
            normalized_price,
            link: raw.link.filter(|l| !l.trim().is_empty()),
            site: site.to_string(),
            page,
        })
    }
}

/// Parse site-native price text into a number.
///
/// Handles Brazilian (`1.234,56`) and English (`1,234.56`) grouping: when both
/// separators appear the last one is the decimal mark; a lone separator followed
/// by exactly three digits is a thousands separator. Only the first numeric run
/// is read, so ranges like `R$ 10,00 a R$ 20,00` yield the lower bound.
///
/// The result is rounded to cents so that its own `to_string` form parses back
/// to the same value.
pub fn normalize_price(text: Option<&str>) -> Option<f64> {
    let text = text?;

    let token: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    let token = token.trim_end_matches(['.', ',']);
    if token.is_empty() {
        return None;
    }

    let last_dot = token.rfind('.');
    let last_comma = token.rfind(',');

    let decimal_mark = match (last_dot, last_comma) {
        (Some(d), Some(c)) => Some(if d > c { '.' } else { ',' }),
        (Some(d), None) => lone_separator_as_decimal(token, d, '.'),
        (None, Some(c)) => lone_separator_as_decimal(token, c, ','),
        (None, None) => None,
    };

    let mut normalized = String::with_capacity(token.len());
    for ch in token.chars() {
        match ch {
            '0'..='9' => normalized.push(ch),
            c if Some(c) == decimal_mark => normalized.push('.'),
            _ => {}
        }
    }

    normalized
        .parse::<f64>()
        .ok()
        .map(|value| (value * 100.0).round() / 100.0)
}

/// Decide whether the only kind of separator in `token` marks decimals.
fn lone_separator_as_decimal(token: &str, last_pos: usize, sep: char) -> Option<char> {
    let occurrences = token.matches(sep).count();
    let trailing_digits = token.len() - last_pos - 1;
    if occurrences == 1 && trailing_digits != 3 {
        Some(sep)
    } else {
        None
    }
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
