//! AES-256 in the three modes MTProto uses.
//!
//! * IGE for message payloads and the key exchange.
//! * CTR for the obfuscated transport, keeping its keystream across calls.
//! * CBC for the signed simple-config blob.

use aes::Aes256;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit, KeyIvInit, StreamCipher};

fn xor16(dst: &mut [u8], other: &[u8]) {
    for (a, b) in dst.iter_mut().zip(other) {
        *a ^= b;
    }
}

/// Encrypt `buffer` in place with AES-256-IGE.
///
/// The 32-byte `iv` holds the initial previous-ciphertext block in its first
/// half and the initial previous-plaintext block in its second half.
///
/// # Panics
/// If `buffer.len()` is not a multiple of 16. Callers pad first.
pub fn ige_encrypt(buffer: &mut [u8], key: &[u8; 32], iv: &[u8; 32]) {
    assert_eq!(buffer.len() % 16, 0, "IGE input must be block aligned");
    let cipher = Aes256::new(GenericArray::from_slice(key));

    let mut prev_cipher = [0u8; 16];
    let mut prev_plain = [0u8; 16];
    prev_cipher.copy_from_slice(&iv[..16]);
    prev_plain.copy_from_slice(&iv[16..]);

    for block in buffer.chunks_exact_mut(16) {
        let mut plain = [0u8; 16];
        plain.copy_from_slice(block);

        xor16(block, &prev_cipher);
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
        xor16(block, &prev_plain);

        prev_cipher.copy_from_slice(block);
        prev_plain = plain;
    }
}

/// Decrypt `buffer` in place with AES-256-IGE. Inverse of [`ige_encrypt`].
///
/// # Panics
/// If `buffer.len()` is not a multiple of 16.
pub fn ige_decrypt(buffer: &mut [u8], key: &[u8; 32], iv: &[u8; 32]) {
    assert_eq!(buffer.len() % 16, 0, "IGE input must be block aligned");
    let cipher = Aes256::new(GenericArray::from_slice(key));

    let mut prev_cipher = [0u8; 16];
    let mut prev_plain = [0u8; 16];
    prev_cipher.copy_from_slice(&iv[..16]);
    prev_plain.copy_from_slice(&iv[16..]);

    for block in buffer.chunks_exact_mut(16) {
        let mut encrypted = [0u8; 16];
        encrypted.copy_from_slice(block);

        xor16(block, &prev_plain);
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
        xor16(block, &prev_cipher);

        prev_plain.copy_from_slice(block);
        prev_cipher = encrypted;
    }
}

/// Encrypt `buffer` in place with AES-256-CBC (no padding).
///
/// # Panics
/// If `buffer.len()` is not a multiple of 16.
pub fn cbc_encrypt(buffer: &mut [u8], key: &[u8; 32], iv: &[u8; 16]) {
    assert_eq!(buffer.len() % 16, 0, "CBC input must be block aligned");
    let cipher = Aes256::new(GenericArray::from_slice(key));
    let mut prev = *iv;
    for block in buffer.chunks_exact_mut(16) {
        xor16(block, &prev);
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
        prev.copy_from_slice(block);
    }
}

/// Decrypt `buffer` in place with AES-256-CBC (no padding).
///
/// # Panics
/// If `buffer.len()` is not a multiple of 16.
pub fn cbc_decrypt(buffer: &mut [u8], key: &[u8; 32], iv: &[u8; 16]) {
    assert_eq!(buffer.len() % 16, 0, "CBC input must be block aligned");
    let cipher = Aes256::new(GenericArray::from_slice(key));
    let mut prev = *iv;
    for block in buffer.chunks_exact_mut(16) {
        let mut encrypted = [0u8; 16];
        encrypted.copy_from_slice(block);
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
        xor16(block, &prev);
        prev = encrypted;
    }
}

/// AES-256-CTR keystream whose position persists between calls.
///
/// Feeding a message in several chunks yields the same output as feeding it
/// at once, which is what a stream transport needs.
pub struct CtrState {
    cipher: ctr::Ctr128BE<Aes256>,
}

impl CtrState {
    /// Start a keystream at counter block `iv`.
    pub fn new(key: &[u8; 32], iv: &[u8; 16]) -> Self {
        Self {
            cipher: ctr::Ctr128BE::<Aes256>::new(
                GenericArray::from_slice(key),
                GenericArray::from_slice(iv),
            ),
        }
    }

    /// XOR the next `data.len()` keystream bytes into `data`.
    pub fn apply(&mut self, data: &mut [u8]) {
        self.cipher.apply_keystream(data);
    }
}

impl std::fmt::Debug for CtrState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CtrState(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> [u8; 32] { std::array::from_fn(|i| i as u8) }
    fn iv() -> [u8; 32] { std::array::from_fn(|i| 0xa0 ^ i as u8) }

    #[test]
    fn ige_reverses() {
        let plain: Vec<u8> = (0..64u8).collect();
        let mut data = plain.clone();
        ige_encrypt(&mut data, &key(), &iv());
        assert_ne!(data, plain);
        ige_decrypt(&mut data, &key(), &iv());
        assert_eq!(data, plain);
    }

    #[test]
    fn ige_chains_blocks() {
        // identical plaintext blocks must not produce identical ciphertext
        let mut data = [0x42u8; 32];
        ige_encrypt(&mut data, &key(), &iv());
        assert_ne!(data[..16], data[16..]);
    }

    #[test]
    fn cbc_reverses() {
        let plain = [7u8; 48];
        let mut data = plain;
        let iv: [u8; 16] = [3; 16];
        cbc_encrypt(&mut data, &key(), &iv);
        cbc_decrypt(&mut data, &key(), &iv);
        assert_eq!(data, plain);
    }

    #[test]
    fn ctr_is_stateful_across_chunks() {
        let iv: [u8; 16] = [9; 16];
        let mut whole = [0u8; 40];
        CtrState::new(&key(), &iv).apply(&mut whole);

        let mut split = [0u8; 40];
        let mut state = CtrState::new(&key(), &iv);
        state.apply(&mut split[..7]);
        state.apply(&mut split[7..23]);
        state.apply(&mut split[23..]);
        assert_eq!(whole, split);
    }
}
