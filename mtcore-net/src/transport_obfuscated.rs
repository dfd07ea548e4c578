//! The [MTProto Obfuscated2] layer.
//!
//! A random 64-byte header carries the keys for two AES-256-CTR streams,
//! one per direction; after it every byte on the wire is encrypted, so the
//! traffic looks like noise to deep-packet inspection.
//!
//! [MTProto Obfuscated2]: https://core.telegram.org/mtproto/mtproto-transports#transport-obfuscation

use mtcore_crypto::aes::CtrState;
use sha2::{Digest, Sha256};

/// First words a header must not start with; they would look like another
/// protocol (HTTP verbs, the intermediate or padded transports).
const FORBIDDEN_FIRST_WORDS: [[u8; 4]; 6] = [
    *b"HEAD",
    *b"POST",
    *b"GET ",
    *b"OPTI",
    [0xdd; 4],
    [0xee; 4],
];

/// Tag of the padded intermediate transport, also reserved.
const PADDED_TAG: [u8; 4] = [0x16, 0x03, 0x01, 0x02];

/// The two keystreams of an obfuscated connection.
pub struct Obfuscation {
    encrypt: CtrState,
    decrypt: CtrState,
}

impl Obfuscation {
    /// Encrypt bytes about to be written.
    pub fn encrypt(&mut self, data: &mut [u8]) {
        self.encrypt.apply(data);
    }

    /// Decrypt bytes just read.
    pub fn decrypt(&mut self, data: &mut [u8]) {
        self.decrypt.apply(data);
    }
}

impl std::fmt::Debug for Obfuscation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Obfuscation(..)")
    }
}

fn acceptable(nonce: &[u8; 64]) -> bool {
    let first = [nonce[0], nonce[1], nonce[2], nonce[3]];
    nonce[0] != 0xef
        && !FORBIDDEN_FIRST_WORDS.contains(&first)
        && first != PADDED_TAG
        && nonce[4..8] != [0, 0, 0, 0]
}

/// Build the header for a connection speaking `tag` to `dc_id`.
///
/// Returns the bytes to write first and the keystreams for everything that
/// follows. With a proxy `secret` both keys are `SHA256(key ‖ secret)`.
pub fn handshake(
    tag: [u8; 4],
    dc_id: i16,
    secret: Option<&[u8; 16]>,
    mut rng: impl FnMut(&mut [u8]),
) -> ([u8; 64], Obfuscation) {
    let mut nonce = [0u8; 64];
    loop {
        rng(&mut nonce);
        if acceptable(&nonce) {
            break;
        }
    }
    nonce[56..60].copy_from_slice(&tag);
    nonce[60..62].copy_from_slice(&dc_id.to_le_bytes());

    let (encrypt, decrypt) = derive(&nonce, secret);
    let mut obfuscation = Obfuscation { encrypt, decrypt };

    let mut encrypted = nonce;
    obfuscation.encrypt(&mut encrypted);

    let mut header = nonce;
    header[56..].copy_from_slice(&encrypted[56..]);
    (header, obfuscation)
}

/// Keystreams for the side that wrote `nonce`: it encrypts with the bytes
/// as they are and decrypts with them reversed.
fn derive(nonce: &[u8; 64], secret: Option<&[u8; 16]>) -> (CtrState, CtrState) {
    let mut reversed = [0u8; 48];
    reversed.copy_from_slice(&nonce[8..56]);
    reversed.reverse();
    (one(&nonce[8..56], secret), one(&reversed, secret))
}

fn one(material: &[u8], secret: Option<&[u8; 16]>) -> CtrState {
    let mut key = [0u8; 32];
    key.copy_from_slice(&material[..32]);
    if let Some(secret) = secret {
        let mut h = Sha256::new();
        h.update(key);
        h.update(secret);
        key.copy_from_slice(&h.finalize());
    }
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&material[32..48]);
    CtrState::new(&key, &iv)
}
