use std::time::Duration;

// ---------------------------------------------------------------------------
// Jitter based on std, without the `rand` crate.
// Uses a simple xorshift seeded from the current time.
// ---------------------------------------------------------------------------

/// Uniform-ish random duration in `[0, max)`. Zero when `max` is zero.
pub fn jitter(max: Duration) -> Duration {
    Duration::from_millis(rand_jitter_ms(max.as_millis() as u64))
}

fn rand_jitter_ms(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    // Seeded from the clock. Not for crypto.
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    // xorshift64
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x % max_ms
}

/// Pick an index in `[0, len)` using the same clock-seeded generator.
pub fn random_index(len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    rand_jitter_ms(len as u64) as usize
}

/// Form-encode a search term (spaces become `+`), as storefront search boxes do.
pub fn encode_search_term(term: &str) -> String {
    url::form_urlencoded::byte_serialize(term.trim().as_bytes()).collect()
}

/// At most `max_bytes` of `text`, cut back to the nearest char boundary.
pub fn truncate_on_char_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
