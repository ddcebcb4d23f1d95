//! Text normalization applied before comparing desired and observed fields.
//!
//! Slack hands back topics, purposes and names with `&`, `<` and `>` escaped,
//! and some clients store numeric references too. Comparing raw strings would
//! report drift forever.

use std::borrow::Cow;

/// Longest entity body we try to decode (`#x10FFFF` is 8 bytes).
const MAX_ENTITY_LEN: usize = 10;

/// Decode the HTML entities Slack emits. Unknown or malformed references are
/// left as-is.
pub fn decode_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        let decoded = tail
            .find(';')
            .filter(|&end| end <= MAX_ENTITY_LEN)
            .and_then(|end| decode_one(&tail[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn decode_one(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let num = entity.strip_prefix('#')?;
            let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                Some(hex) if !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()) => u32::from_str_radix(hex, 16).ok()?,
                Some(_) => return None,
                None if !num.is_empty() && num.chars().all(|c| c.is_ascii_digit()) => num.parse::<u32>().ok()?,
                None => return None,
            };
            char::from_u32(code)
        }
    }
}

/// Comparable form of an email address.
pub fn normalize_email(s: &str) -> String {
    s.trim().to_ascii_lowercase()
}

/// Whether a value read back from Slack matches the declared plain text.
/// Only the observed side is decoded: a declared `&lt;` is literal text.
pub fn observed_matches(observed: &str, desired: &str) -> bool {
    decode_entities(observed).trim() == desired.trim()
}
