//! Remember-me token codec.
//!
//! A token is `prefix ++ id ++ suffix` where prefix and suffix are the first
//! and last [`TOKEN_AFFIX_LEN`] hex characters of `blake3(login ++ hash)`.
//! The token is a pure function of the current credentials, so changing the
//! password invalidates every token issued before.

use crate::types::ContactId;

/// Length of the digest prefix and of the digest suffix.
pub const TOKEN_AFFIX_LEN: usize = 15;

pub fn derive_token(login: &str, password_hash: &str, id: ContactId) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(login.as_bytes());
    hasher.update(password_hash.as_bytes());
    let digest = hasher.finalize().to_hex();
    let hex = digest.as_str();

    format!(
        "{}{}{}",
        &hex[..TOKEN_AFFIX_LEN],
        id,
        &hex[hex.len() - TOKEN_AFFIX_LEN..]
    )
}

/// The contact id embedded in a token, if the token is well-formed.
pub fn token_contact_id(token: &str) -> Option<ContactId> {
    let end = token.len().checked_sub(TOKEN_AFFIX_LEN)?;
    let middle = token.get(TOKEN_AFFIX_LEN..end)?;
    if middle.is_empty() || !middle.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    middle.parse().ok()
}
