//! Authentication: MD5 challenge/response over a shared secret.
//!
//! `digest = MD5(challenge XOR secret_padded)`, where `secret_padded` is the
//! shared secret repeated/truncated to the challenge length. No HMAC is
//! involved; TTP's control channel is authenticated, not encrypted.

use md5::{Digest, Md5};

use crate::handshake::AUTH_CHALLENGE_LEN;

/// # Test
///
/// ```
/// use ttp_codec::crypto::auth_digest;
///
/// let challenge = [0x42u8; 64];
/// let digest_a = auth_digest(b"kitten", &challenge);
/// let digest_b = auth_digest(b"kitten", &challenge);
/// let digest_c = auth_digest(b"other", &challenge);
///
/// assert_eq!(digest_a, digest_b);
/// assert_ne!(digest_a, digest_c);
/// ```
pub fn auth_digest(secret: &[u8], challenge: &[u8; AUTH_CHALLENGE_LEN]) -> [u8; 16] {
    let mut xored = [0u8; AUTH_CHALLENGE_LEN];

    if secret.is_empty() {
        xored.copy_from_slice(challenge);
    } else {
        for (i, byte) in xored.iter_mut().enumerate() {
            *byte = challenge[i] ^ secret[i % secret.len()];
        }
    }

    let mut hasher = Md5::new();
    hasher.update(xored);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_secret_digests_the_raw_challenge() {
        let challenge = [7u8; AUTH_CHALLENGE_LEN];

        let mut hasher = Md5::new();
        hasher.update(challenge);
        let expected: [u8; 16] = hasher.finalize().into();

        assert_eq!(auth_digest(b"", &challenge), expected);
    }
}
