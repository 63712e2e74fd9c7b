//! Textual armor for key material.
//!
//! Stored ciphertexts travel in compact binary form; keys are exchanged as
//! armored text so they survive copy and paste.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::{CryptoError, Result};

/// Armor label for public keys.
pub const PUBLIC_KEY_LABEL: &str = "PASSVAULT PUBLIC KEY";

/// Armor label for sealed private keys.
pub const PRIVATE_KEY_LABEL: &str = "PASSVAULT PRIVATE KEY";

const LINE_WIDTH: usize = 64;

/// Wrap `body` in a labelled base64 block.
pub fn armor(label: &str, body: &[u8]) -> String {
    let encoded = STANDARD.encode(body);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / LINE_WIDTH + 2 * label.len() + 40);

    out.push_str("-----BEGIN ");
    out.push_str(label);
    out.push_str("-----\n");
    for (i, c) in encoded.chars().enumerate() {
        if i > 0 && i % LINE_WIDTH == 0 {
            out.push('\n');
        }
        out.push(c);
    }
    out.push_str("\n-----END ");
    out.push_str(label);
    out.push_str("-----\n");

    out
}

/// Extract the body of a labelled block.
///
/// Text around the block is ignored.
pub fn dearmor(label: &str, text: &str) -> Result<Vec<u8>> {
    let begin = format!("-----BEGIN {}-----", label);
    let end = format!("-----END {}-----", label);

    let start = text
        .find(&begin)
        .ok_or_else(|| CryptoError::Armor(format!("missing {}", begin)))?
        + begin.len();
    let stop = text[start..]
        .find(&end)
        .ok_or_else(|| CryptoError::Armor(format!("missing {}", end)))?
        + start;

    let encoded: String = text[start..stop].chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(encoded)
        .map_err(|e| CryptoError::Armor(e.to_string()))
}
