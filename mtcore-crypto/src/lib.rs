//! Cryptographic primitives for the MTProto transport core.
//!
//! Provides:
//! - AES-256 in IGE, CTR and CBC modes
//! - SHA-1 / SHA-256 hash macros
//! - `pq` factorization for the key exchange
//! - RSA public keys, fingerprints and the built-in key store
//! - Diffie-Hellman prime and range checks
//! - `AuthKey` with both message-key derivation schemes
//! - message payload encryption / decryption

#![deny(unsafe_code)]

pub mod aes;
mod auth_key;
mod factorize;
pub mod prime;
pub mod rsa;
mod sha;

pub use auth_key::{AuthKey, AuthKeyKind, Direction, Scheme};
pub use factorize::factorize;

#[doc(hidden)]
pub mod __private {
    pub use ::sha1;
    pub use ::sha2;
}

/// Fill `buf` from the operating system's random source.
///
/// # Panics
/// If the OS cannot provide randomness; nothing sensible can continue then.
pub fn random_fill(buf: &mut [u8]) {
    getrandom::getrandom(buf).expect("getrandom failed");
}

// ─── Payload encrypt / decrypt ───────────────────────────────────────────────

/// Errors from [`decrypt_data`].
#[derive(Clone, Debug, PartialEq)]
pub enum DecryptError {
    /// Ciphertext too short or not block-aligned.
    InvalidBuffer,
    /// The `auth_key_id` in the ciphertext does not match our key.
    AuthKeyMismatch,
    /// The `msg_key` in the ciphertext does not match our computed value.
    MessageKeyMismatch,
}

impl std::fmt::Display for DecryptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidBuffer => write!(f, "invalid ciphertext buffer length"),
            Self::AuthKeyMismatch => write!(f, "auth_key_id mismatch"),
            Self::MessageKeyMismatch => write!(f, "msg_key mismatch"),
        }
    }
}
impl std::error::Error for DecryptError {}

/// Offset of the `length` field inside a decrypted payload
/// (`salt ‖ session_id ‖ msg_id ‖ seq_no ‖ length`).
const LENGTH_OFFSET: usize = 28;

/// How many padding bytes `len` bytes of payload get.
///
/// V2 pads with 12..=1024 bytes up to a 16-byte boundary (we use 17..=32);
/// V1 pads with 0..=15.
pub fn padding_len(len: usize, scheme: Scheme) -> usize {
    match scheme {
        Scheme::V2 => 16 + (16 - (len % 16)),
        Scheme::V1 => (16 - (len % 16)) % 16,
    }
}

/// Encrypt a client payload, returning `key_id ‖ msg_key ‖ ciphertext`.
pub fn encrypt_data(payload: &[u8], auth_key: &AuthKey, scheme: Scheme) -> Vec<u8> {
    let mut rnd = [0u8; 32];
    random_fill(&mut rnd);
    encrypt_data_as(payload, auth_key, scheme, Direction::ClientToServer, &rnd)
}

/// Encrypt `payload` as `direction` with explicit padding bytes.
///
/// `padding` must hold at least [`padding_len`] bytes.
pub fn encrypt_data_as(
    payload: &[u8],
    auth_key: &AuthKey,
    scheme: Scheme,
    direction: Direction,
    padding: &[u8; 32],
) -> Vec<u8> {
    let pad = padding_len(payload.len(), scheme);
    let mut plain = Vec::with_capacity(payload.len() + pad);
    plain.extend_from_slice(payload);

    let msg_key = match scheme {
        Scheme::V2 => {
            plain.extend_from_slice(&padding[..pad]);
            auth_key.msg_key(&plain, direction, scheme)
        }
        Scheme::V1 => {
            let key = auth_key.msg_key(&plain, direction, scheme);
            plain.extend_from_slice(&padding[..pad]);
            key
        }
    };

    let (key, iv) = auth_key.derive_message_keys(&msg_key, direction, scheme);
    aes::ige_encrypt(&mut plain, &key, &iv);

    let mut out = Vec::with_capacity(24 + plain.len());
    out.extend_from_slice(&auth_key.key_id_bytes());
    out.extend_from_slice(&msg_key);
    out.extend_from_slice(&plain);
    out
}

/// Decrypt a server frame (`key_id ‖ msg_key ‖ ciphertext`) in place.
///
/// On success returns the decrypted payload, padding included.
pub fn decrypt_data<'a>(
    buffer: &'a mut [u8],
    auth_key: &AuthKey,
    scheme: Scheme,
) -> Result<&'a mut [u8], DecryptError> {
    decrypt_data_as(buffer, auth_key, scheme, Direction::ServerToClient)
}

/// Decrypt a frame produced by `direction`.
pub fn decrypt_data_as<'a>(
    buffer: &'a mut [u8],
    auth_key: &AuthKey,
    scheme: Scheme,
    direction: Direction,
) -> Result<&'a mut [u8], DecryptError> {
    if buffer.len() < 24 + 16 || (buffer.len() - 24) % 16 != 0 {
        return Err(DecryptError::InvalidBuffer);
    }
    if auth_key.key_id_bytes() != buffer[..8] {
        return Err(DecryptError::AuthKeyMismatch);
    }
    let mut msg_key = [0u8; 16];
    msg_key.copy_from_slice(&buffer[8..24]);

    let (key, iv) = auth_key.derive_message_keys(&msg_key, direction, scheme);
    let plain = &mut buffer[24..];
    aes::ige_decrypt(plain, &key, &iv);

    let ours = match scheme {
        Scheme::V2 => auth_key.msg_key(plain, direction, scheme),
        Scheme::V1 => {
            // V1 hashes the payload without padding, so read its length first
            if plain.len() < LENGTH_OFFSET + 4 {
                return Err(DecryptError::InvalidBuffer);
            }
            let mut len = [0u8; 4];
            len.copy_from_slice(&plain[LENGTH_OFFSET..LENGTH_OFFSET + 4]);
            let end = (LENGTH_OFFSET + 4).saturating_add(u32::from_le_bytes(len) as usize);
            if end > plain.len() {
                return Err(DecryptError::MessageKeyMismatch);
            }
            auth_key.msg_key(&plain[..end], direction, scheme)
        }
    };
    if msg_key != ours {
        return Err(DecryptError::MessageKeyMismatch);
    }
    Ok(plain)
}

/// Derive `(key, iv)` from nonces for the `server_DH_params_ok` answer and
/// the `set_client_DH_params` payload.
pub fn generate_key_data_from_nonce(server_nonce: &[u8; 16], new_nonce: &[u8; 32]) -> ([u8; 32], [u8; 32]) {
    let h1 = sha1!(new_nonce, server_nonce);
    let h2 = sha1!(server_nonce, new_nonce);
    let h3 = sha1!(new_nonce, new_nonce);

    let mut key = [0u8; 32];
    key[..20].copy_from_slice(&h1);
    key[20..].copy_from_slice(&h2[..12]);

    let mut iv = [0u8; 32];
    iv[..8].copy_from_slice(&h2[12..]);
    iv[8..28].copy_from_slice(&h3);
    iv[28..].copy_from_slice(&new_nonce[..4]);

    (key, iv)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> AuthKey {
        AuthKey::from_bytes(std::array::from_fn(|i| (i * 13 + 1) as u8))
    }

    fn payload(len: u32) -> Vec<u8> {
        // salt, session, msg_id, seq_no, length, body
        let mut p = vec![0xabu8; LENGTH_OFFSET];
        p.extend(len.to_le_bytes());
        p.extend((0..len).map(|i| i as u8));
        p
    }

    #[test]
    fn padding_bounds() {
        for len in 32..96 {
            let v2 = padding_len(len, Scheme::V2);
            assert!((12..=1024).contains(&v2));
            assert_eq!((len + v2) % 16, 0);
            let v1 = padding_len(len, Scheme::V1);
            assert!(v1 <= 15);
            assert_eq!((len + v1) % 16, 0);
        }
    }

    #[test]
    fn server_frames_open_with_either_scheme() {
        for scheme in [Scheme::V1, Scheme::V2] {
            let plain = payload(20);
            let mut frame =
                encrypt_data_as(&plain, &key(), scheme, Direction::ServerToClient, &[7; 32]);
            let opened = decrypt_data(&mut frame, &key(), scheme).unwrap();
            assert_eq!(&opened[..plain.len()], &plain[..]);
        }
    }

    #[test]
    fn direction_matters() {
        let mut frame = encrypt_data(&payload(8), &key(), Scheme::V2);
        assert_eq!(
            decrypt_data(&mut frame, &key(), Scheme::V2),
            Err(DecryptError::MessageKeyMismatch)
        );
    }

    #[test]
    fn foreign_key_id_rejected() {
        let mut frame = encrypt_data(&payload(8), &key(), Scheme::V2);
        frame[0] ^= 1;
        assert_eq!(
            decrypt_data_as(&mut frame, &key(), Scheme::V2, Direction::ClientToServer),
            Err(DecryptError::AuthKeyMismatch)
        );
    }

    #[test]
    fn tampered_ciphertext_rejected() {
        let mut frame = encrypt_data(&payload(8), &key(), Scheme::V2);
        let last = frame.len() - 1;
        frame[last] ^= 0x80;
        assert_eq!(
            decrypt_data_as(&mut frame, &key(), Scheme::V2, Direction::ClientToServer),
            Err(DecryptError::MessageKeyMismatch)
        );
    }

    #[test]
    fn short_buffer_rejected() {
        let mut frame = [0u8; 30];
        assert_eq!(decrypt_data(&mut frame, &key(), Scheme::V2), Err(DecryptError::InvalidBuffer));
    }
}
