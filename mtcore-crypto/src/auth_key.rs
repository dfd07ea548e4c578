//! `AuthKey`: the 256-byte secret negotiated with a data-center.

use std::fmt;

use crate::sha::le_u64;
use crate::{sha1, sha256};

/// Where a key came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthKeyKind {
    /// Produced by a handshake in this process.
    Generated,
    /// Loaded from a key store.
    ReadFromFile,
    /// Created locally for purposes other than talking to a DC (tests, local storage).
    Local,
}

/// Which side produced the message a key pair is derived for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Client to server (`x = 0`).
    ClientToServer,
    /// Server to client (`x = 8`).
    ServerToClient,
}

impl Direction {
    pub(crate) fn x(self) -> usize {
        match self {
            Self::ClientToServer => 0,
            Self::ServerToClient => 8,
        }
    }
}

/// Message encryption scheme.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Scheme {
    /// SHA-1 based key derivation, `msg_key` over the unpadded payload.
    V1,
    /// SHA-256 based key derivation, `msg_key` over the padded payload.
    #[default]
    V2,
}

/// A data-center authorization key plus its pre-computed identifiers.
///
/// The key bytes are zeroed when the value is dropped or [`destroy`]ed.
///
/// [`destroy`]: AuthKey::destroy
#[derive(Clone)]
pub struct AuthKey {
    pub(crate) data: [u8; 256],
    aux_hash: [u8; 8],
    key_id: [u8; 8],
    kind: AuthKeyKind,
    dc_id: i32,
}

impl AuthKey {
    /// Wrap raw key bytes.
    pub fn new(data: [u8; 256], kind: AuthKeyKind, dc_id: i32) -> Self {
        let sha = sha1!(&data);
        let mut aux_hash = [0u8; 8];
        aux_hash.copy_from_slice(&sha[..8]);
        let mut key_id = [0u8; 8];
        key_id.copy_from_slice(&sha[12..20]);
        Self { data, aux_hash, key_id, kind, dc_id }
    }

    /// Wrap the output of a handshake that has not been bound to a DC yet.
    pub fn from_bytes(data: [u8; 256]) -> Self {
        Self::new(data, AuthKeyKind::Generated, 0)
    }

    /// Return the raw 256-byte representation.
    pub fn to_bytes(&self) -> [u8; 256] { self.data }

    /// Borrow the raw key bytes.
    pub fn data(&self) -> &[u8; 256] { &self.data }

    /// `SHA1(key)[12..20]` as it appears on the wire.
    pub fn key_id_bytes(&self) -> [u8; 8] { self.key_id }

    /// `SHA1(key)[12..20]` read little-endian.
    pub fn key_id(&self) -> u64 { le_u64(&self.key_id) }

    /// `SHA1(key)[0..8]` read little-endian; the `retry_id` of a repeated handshake.
    pub fn aux_hash(&self) -> i64 { le_u64(&self.aux_hash) as i64 }

    pub fn kind(&self) -> AuthKeyKind { self.kind }

    pub fn dc_id(&self) -> i32 { self.dc_id }

    /// Same key, bound to `dc_id`.
    pub fn with_dc(mut self, dc_id: i32) -> Self {
        self.dc_id = dc_id;
        self
    }

    /// True once [`destroy`](Self::destroy) has wiped the key.
    pub fn is_destroyed(&self) -> bool {
        self.data.iter().all(|&b| b == 0)
    }

    /// Zero the key material. Identifiers are zeroed too so a destroyed key
    /// never matches an incoming `auth_key_id`.
    pub fn destroy(&mut self) {
        self.data.fill(0);
        self.aux_hash = [0; 8];
        self.key_id = [0; 8];
        std::hint::black_box(&self.data);
    }

    /// `SHA1(new_nonce ‖ number ‖ aux_hash)[4..20]`, checked against
    /// `dh_gen_ok` (1), `dh_gen_retry` (2) and `dh_gen_fail` (3).
    pub fn calc_new_nonce_hash(&self, new_nonce: &[u8; 32], number: u8) -> [u8; 16] {
        let sha = sha1!(new_nonce, [number], &self.aux_hash);
        let mut out = [0u8; 16];
        out.copy_from_slice(&sha[4..]);
        out
    }

    /// Compute `msg_key` for `payload`.
    ///
    /// For [`Scheme::V2`] `payload` includes the padding; for [`Scheme::V1`]
    /// it must not.
    pub fn msg_key(&self, payload: &[u8], direction: Direction, scheme: Scheme) -> [u8; 16] {
        let mut out = [0u8; 16];
        match scheme {
            Scheme::V2 => {
                let x = direction.x();
                let large = sha256!(&self.data[88 + x..120 + x], payload);
                out.copy_from_slice(&large[8..24]);
            }
            Scheme::V1 => {
                let large = sha1!(payload);
                out.copy_from_slice(&large[4..20]);
            }
        }
        out
    }

    /// Derive the AES-256-IGE `(key, iv)` pair for `msg_key`.
    pub fn derive_message_keys(
        &self,
        msg_key: &[u8; 16],
        direction: Direction,
        scheme: Scheme,
    ) -> ([u8; 32], [u8; 32]) {
        let x = direction.x();
        let ak = &self.data;
        let mut aes_key = [0u8; 32];
        let mut aes_iv = [0u8; 32];

        match scheme {
            Scheme::V2 => {
                let a = sha256!(msg_key, &ak[x..x + 36]);
                let b = sha256!(&ak[40 + x..76 + x], msg_key);

                aes_key[..8].copy_from_slice(&a[..8]);
                aes_key[8..24].copy_from_slice(&b[8..24]);
                aes_key[24..].copy_from_slice(&a[24..]);

                aes_iv[..8].copy_from_slice(&b[..8]);
                aes_iv[8..24].copy_from_slice(&a[8..24]);
                aes_iv[24..].copy_from_slice(&b[24..]);
            }
            Scheme::V1 => {
                let a = sha1!(msg_key, &ak[x..x + 32]);
                let b = sha1!(&ak[32 + x..48 + x], msg_key, &ak[48 + x..64 + x]);
                let c = sha1!(&ak[64 + x..96 + x], msg_key);
                let d = sha1!(msg_key, &ak[96 + x..128 + x]);

                aes_key[..8].copy_from_slice(&a[..8]);
                aes_key[8..20].copy_from_slice(&b[8..20]);
                aes_key[20..].copy_from_slice(&c[4..16]);

                aes_iv[..12].copy_from_slice(&a[8..20]);
                aes_iv[12..20].copy_from_slice(&b[..8]);
                aes_iv[20..24].copy_from_slice(&c[16..20]);
                aes_iv[24..].copy_from_slice(&d[..8]);
            }
        }

        (aes_key, aes_iv)
    }
}

impl Drop for AuthKey {
    fn drop(&mut self) {
        self.data.fill(0);
        std::hint::black_box(&self.data);
    }
}

impl fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthKey(id={:#018x}, dc={}, {:?})", self.key_id(), self.dc_id, self.kind)
    }
}

/// Keys compare by their bytes; kind and DC binding are metadata.
impl PartialEq for AuthKey {
    fn eq(&self, other: &Self) -> bool { self.data == other.data }
}

impl Eq for AuthKey {}

#[cfg(test)]
mod tests {
    use super::*;

    fn unhex(s: &str) -> Vec<u8> {
        (0..s.len()).step_by(2).map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap()).collect()
    }

    fn sample_key() -> AuthKey {
        AuthKey::from_bytes(std::array::from_fn(|i| (i * 7 + 3) as u8))
    }

    fn msg_key() -> [u8; 16] { std::array::from_fn(|i| 0x10 + i as u8) }

    fn check(direction: Direction, scheme: Scheme, key: &str, iv: &str) {
        let (k, v) = sample_key().derive_message_keys(&msg_key(), direction, scheme);
        assert_eq!(k.to_vec(), unhex(key), "{scheme:?} {direction:?} key");
        assert_eq!(v.to_vec(), unhex(iv), "{scheme:?} {direction:?} iv");
    }

    #[test]
    fn identifiers() {
        let key = sample_key();
        assert_eq!(key.key_id(), 3587517436832175774);
        assert_eq!(key.aux_hash(), 3376701171449634922);
    }

    #[test]
    fn v2_derivation() {
        check(
            Direction::ClientToServer, Scheme::V2,
            "ba3e6c943f16b5e42b95a8debbc6f01fc8012b7c35d1f6f5f00cc4ba11bd61b8",
            "7afb3022f36568b29315601211a494f6600db01b227e29262826a4e3a31b6e5b",
        );
        check(
            Direction::ServerToClient, Scheme::V2,
            "a645acf6da4b7f614735d6407d9a38b4f8de574ba7c972c6eec248e893b0239f",
            "ccfe1500b8bde7524312b68d0f857df473153ce732b03eaeab7f577325fb0df7",
        );
    }

    #[test]
    fn v1_derivation() {
        check(
            Direction::ClientToServer, Scheme::V1,
            "31f277638d893388e48651e85f270597d9d07707e0d97131adab910753551e9f",
            "b88a3fc8a82fdb8afff61a067a8a86e806e37a1abc098242ec02f555db4a5527",
        );
        check(
            Direction::ServerToClient, Scheme::V1,
            "82742244ee221f9d0f1cc6ff53957c568b081877d48bf273dcdd6175c44785a1",
            "a09a09b3f00dc0b2c9fe1100fafa2df727ef8c604339cf3642b3e928225684e5",
        );
    }

    #[test]
    fn msg_keys() {
        let key = sample_key();
        let payload: Vec<u8> = (0..48).collect();
        assert_eq!(
            key.msg_key(&payload, Direction::ClientToServer, Scheme::V2).to_vec(),
            unhex("713c50c7d8ce0e2e727d1840d0cbe8f3"),
        );
        assert_eq!(
            key.msg_key(&payload, Direction::ClientToServer, Scheme::V1).to_vec(),
            unhex("60e75b9bae5ea1e62b43a5a34a260127"),
        );
    }

    #[test]
    fn new_nonce_hash() {
        let new_nonce: [u8; 32] = std::array::from_fn(|i| i as u8);
        assert_eq!(
            sample_key().calc_new_nonce_hash(&new_nonce, 1).to_vec(),
            unhex("12811471ddb38ecd4f79c28eaa588522"),
        );
    }

    #[test]
    fn equality_ignores_metadata() {
        let a = sample_key();
        let b = AuthKey::new(a.to_bytes(), AuthKeyKind::ReadFromFile, 4);
        assert_eq!(a, b);
    }

    #[test]
    fn destroy_wipes() {
        let mut key = sample_key();
        key.destroy();
        assert!(key.is_destroyed());
        assert_eq!(key.key_id(), 0);
    }
}
