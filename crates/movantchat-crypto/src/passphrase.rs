//! Passphrase to key projection.
//!
//! Turns a human passphrase into the fixed-length symmetric key the
//! envelope codec needs. The projection is total: defined for every string
//! input, including the empty string.
//!
//! # Compatibility
//!
//! `KEY_LEN` and `PAD_BYTE` are wire-compatibility constants. Every peer
//! sharing a passphrase must produce the bit-identical key, so neither
//! value is a tuning knob. Truncation operates on the passphrase's UTF-8
//! BYTES; a truncated multi-byte character is fine because the key is raw
//! bytes, never re-interpreted as text.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Symmetric key length in bytes, as required by XChaCha20-Poly1305.
pub const KEY_LEN: usize = 32;

/// Filler byte for passphrases shorter than [`KEY_LEN`].
pub const PAD_BYTE: u8 = b'0';

/// Fixed-length symmetric chat key.
///
/// Derived once per session and shared read-only across the send and
/// delivery paths. Zeroized on drop; the `Debug` impl never reveals key
/// material.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ChatKey([u8; KEY_LEN]);

impl ChatKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes, for loading into the AEAD primitive.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for ChatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChatKey(..)")
    }
}

/// Derive the session key from a passphrase.
///
/// Pure and deterministic: the passphrase's UTF-8 bytes are right-padded
/// with [`PAD_BYTE`] up to [`KEY_LEN`], or truncated to the first
/// [`KEY_LEN`] bytes. No salt, no iteration, no randomness - same
/// passphrase, same key, on every call and every implementation.
pub fn derive(passphrase: &str) -> ChatKey {
    let mut key = [PAD_BYTE; KEY_LEN];
    let bytes = passphrase.as_bytes();
    let len = bytes.len().min(KEY_LEN);
    key[..len].copy_from_slice(&bytes[..len]);
    ChatKey(key)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        assert_eq!(derive("secret"), derive("secret"));
        assert_eq!(derive(""), derive(""));
    }

    #[test]
    fn short_passphrase_is_padded_with_filler() {
        let key = derive("secret");

        assert_eq!(&key.as_bytes()[..6], b"secret");
        assert!(key.as_bytes()[6..].iter().all(|&b| b == PAD_BYTE));
    }

    #[test]
    fn empty_passphrase_is_all_filler() {
        let key = derive("");
        assert_eq!(key.as_bytes(), &[PAD_BYTE; KEY_LEN]);
    }

    #[test]
    fn long_passphrase_is_truncated_to_first_key_len_bytes() {
        let long = "abcdefghijklmnopqrstuvwxyz0123456789";
        let key = derive(long);

        assert_eq!(key.as_bytes(), &long.as_bytes()[..KEY_LEN]);
    }

    #[test]
    fn exact_length_passphrase_is_used_verbatim() {
        let exact = "A".repeat(KEY_LEN);
        let key = derive(&exact);

        assert_eq!(key.as_bytes(), exact.as_bytes());
    }

    #[test]
    fn truncation_operates_on_bytes_not_characters() {
        // 16 two-byte characters: 32 bytes of UTF-8, one more would split
        let passphrase = "é".repeat(17);
        let key = derive(&passphrase);

        assert_eq!(key.as_bytes(), &passphrase.as_bytes()[..KEY_LEN]);
    }

    #[test]
    fn debug_output_is_redacted() {
        let key = derive("secret");
        assert_eq!(format!("{key:?}"), "ChatKey(..)");
    }

    proptest! {
        #[test]
        fn derived_key_always_has_fixed_length(passphrase in ".{0,200}") {
            let key = derive(&passphrase);
            prop_assert_eq!(key.as_bytes().len(), KEY_LEN);
        }

        #[test]
        fn same_passphrase_same_key(passphrase in ".{0,200}") {
            prop_assert_eq!(derive(&passphrase), derive(&passphrase));
        }
    }
}
