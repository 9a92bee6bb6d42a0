use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// File stem for one run's outputs: `{prefix}--{hash8(source)}_{YYYYMMDD_HHMMSS}`.
///
/// `source` is whatever identifies the query (typically the URL template), so
/// runs of different searches never overwrite each other.
pub fn dataset_stem(prefix: &str, source: &str, started_at: DateTime<Utc>) -> String {
    let sanitized = sanitize(prefix);
    let hash = short_hash(source);
    format!("{sanitized}--{hash}_{}", started_at.format("%Y%m%d_%H%M%S"))
}

fn sanitize(input: &str) -> String {
    let mut compacted = String::with_capacity(input.len());
    let mut prev_underscore = false;
    for c in input.trim().chars() {
        let c = if is_forbidden(c) || c.is_whitespace() {
            '_'
        } else {
            c
        };
        if c == '_' {
            if !prev_underscore {
                compacted.push(c);
            }
            prev_underscore = true;
        } else {
            compacted.push(c);
            prev_underscore = false;
        }
    }
    let mut name = compacted.trim_matches(&['_', '.'][..]).to_string();
    if name.is_empty() {
        name = "dataset".to_string();
    }
    if name.len() > 60 {
        let mut cut = 60;
        while !name.is_char_boundary(cut) {
            cut -= 1;
        }
        name.truncate(cut);
    }
    name
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}'
    )
}

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = String::with_capacity(8);
    for byte in digest.iter().take(4) {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}
