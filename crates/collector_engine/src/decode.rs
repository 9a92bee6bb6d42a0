//! Response bodies to UTF-8 text.
//!
//! JSON travels as UTF-8 unless the response says otherwise, so charset
//! detection only runs for bodies that are neither declared nor valid UTF-8.

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("body is not valid {encoding}")]
    Malformed { encoding: &'static str },
}

/// Decodes `bytes` using, in order: a byte-order mark, the content-type
/// charset, the UTF-16 null-byte pattern of a JSON text, then plain UTF-8
/// with chardetng as the last resort.
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> Result<String, DecodeError> {
    let known = Encoding::for_bom(bytes)
        .map(|(encoding, _)| encoding)
        .or_else(|| content_type.and_then(declared_charset))
        .or_else(|| utf16_without_bom(bytes));
    if let Some(encoding) = known {
        return strict_decode(bytes, encoding);
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(text.to_owned()),
        Err(_) => {
            let mut detector = EncodingDetector::new();
            detector.feed(bytes, true);
            strict_decode(bytes, detector.guess(None, true))
        }
    }
}

fn declared_charset(content_type: &str) -> Option<&'static Encoding> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        Encoding::for_label(value.trim().trim_matches(['"', '\'']).as_bytes())
    })
}

/// A JSON text starts with two ASCII characters, so UTF-16 shows up as
/// alternating zero bytes.
fn utf16_without_bom(bytes: &[u8]) -> Option<&'static Encoding> {
    match bytes {
        [0, a, 0, b, ..] if *a != 0 && *b != 0 => Some(UTF_16BE),
        [a, 0, b, 0, ..] if *a != 0 && *b != 0 => Some(UTF_16LE),
        _ => None,
    }
}

fn strict_decode(bytes: &[u8], encoding: &'static Encoding) -> Result<String, DecodeError> {
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(DecodeError::Malformed {
            encoding: used.name(),
        });
    }
    Ok(text.into_owned())
}
