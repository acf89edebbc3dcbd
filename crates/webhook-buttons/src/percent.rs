//! Form-encoding helpers: `+`/`%XX` decoding and query-string splitting.
//!
//! Decoding is lenient. A `%` with fewer than two characters after it ends
//! the decode and whatever was produced so far is returned; a `%` followed by
//! two non-hex characters is copied through unchanged.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

/// Raw (still encoded) form arguments keyed by field name.
pub type FormArgs = BTreeMap<String, String>;

/// Decode a form-encoded string into raw bytes.
pub fn decode(src: &str) -> Vec<u8> {
    let bytes = src.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                if i + 2 >= bytes.len() {
                    break;
                }
                let hi = hex_value(bytes[i + 1]);
                let lo = hex_value(bytes[i + 2]);
                if let (Some(hi), Some(lo)) = (hi, lo) {
                    out.push((hi << 4) | lo);
                    i += 3;
                    continue;
                }
                out.push(b'%');
            }
            b => out.push(b),
        }
        i += 1;
    }
    out
}

/// Decode into a `String`, replacing invalid UTF-8 sequences.
pub fn decode_to_string(src: &str) -> String {
    String::from_utf8_lossy(&decode(src)).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Split `a=1&b=2` (or the query part of a URI) into raw arguments.
///
/// Names are decoded, values are left encoded for the consumer to decode.
/// Later duplicates overwrite earlier ones.
pub fn parse_form_args(input: &str) -> FormArgs {
    let query = match input.split_once('?') {
        Some((_, query)) => query,
        None => input,
    };
    let mut args = FormArgs::new();
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        args.insert(decode_to_string(name), String::from(value));
    }
    args
}
