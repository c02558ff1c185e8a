//! Text normalization applied to every free-text field before indexing.
//!
//! The pipeline is idempotent: running it over already-normalized text
//! returns the same string.

use itertools::Itertools;
use unicode_normalization::UnicodeNormalization;

/// Unbroken tokens longer than this break index tokenization; they are
/// replaced with [`OVERLONG_TOKEN`] instead of being indexed verbatim.
pub const MAX_TOKEN_CHARS: usize = 220;

/// Sentinel standing in for a pathological single-token payload.
pub const OVERLONG_TOKEN: &str = "[overlong]";

/// Decode raw bytes as UTF-8, dropping invalid sequences.
pub fn clean_bytes(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .chars()
        .filter(|c| *c != '\u{FFFD}')
        .collect()
}

/// Normalize free text for indexing: NFC composition, replacement-character
/// removal, CJK character spacing, overlong-token capping, and whitespace
/// collapsing.
pub fn normalize(text: &str) -> String {
    let composed: String = text.nfc().filter(|c| *c != '\u{FFFD}').collect();
    let spaced = space_cjk(&composed);

    spaced
        .split_whitespace()
        .map(|tok| {
            if tok.chars().count() > MAX_TOKEN_CHARS {
                OVERLONG_TOKEN
            } else {
                tok
            }
        })
        .join(" ")
}

/// Insert spaces around CJK ideographs and kana so each character becomes
/// its own token.
fn space_cjk(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    let mut prev_cjk = false;

    for c in text.chars() {
        let cjk = is_cjk(c);
        if (cjk || prev_cjk) && !c.is_whitespace() {
            if let Some(last) = out.chars().last() {
                if !last.is_whitespace() {
                    out.push(' ');
                }
            }
        }
        out.push(c);
        prev_cjk = cjk;
    }

    out
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{3400}'..='\u{4DBF}'   // CJK Extension A
        | '\u{4E00}'..='\u{9FFF}' // CJK Unified Ideographs
        | '\u{F900}'..='\u{FAFF}' // CJK Compatibility Ideographs
        | '\u{3040}'..='\u{309F}' // Hiragana
        | '\u{30A0}'..='\u{30FF}' // Katakana
    )
}
