//! RSA public keys: PEM parsing, fingerprints, raw encryption and the
//! built-in key set servers are allowed to pick from.

use std::collections::HashMap;
use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use num_bigint::BigUint;

use crate::sha1;

/// Size of every RSA block exchanged with the servers.
pub const BLOCK_SIZE: usize = 256;

// ─── Error ────────────────────────────────────────────────────────────────────

/// Why a public key could not be read.
#[derive(Clone, Debug, PartialEq)]
pub enum KeyError {
    /// Missing `-----BEGIN` / `-----END` armour.
    NotPem,
    /// The body is not valid base64.
    Base64,
    /// The DER structure is not a PKCS#1 or SPKI RSA public key.
    Der(&'static str),
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotPem => write!(f, "not a PEM public key"),
            Self::Base64 => write!(f, "PEM body is not valid base64"),
            Self::Der(what) => write!(f, "malformed DER: {what}"),
        }
    }
}

impl std::error::Error for KeyError {}

// ─── DER ──────────────────────────────────────────────────────────────────────

struct Der<'a> {
    buf: &'a [u8],
}

impl<'a> Der<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], KeyError> {
        if self.buf.len() < n {
            return Err(KeyError::Der("truncated"));
        }
        let (head, rest) = self.buf.split_at(n);
        self.buf = rest;
        Ok(head)
    }

    /// Read one TLV with the expected tag, returning its contents.
    fn element(&mut self, tag: u8) -> Result<&'a [u8], KeyError> {
        let got = self.take(1)?[0];
        if got != tag {
            return Err(KeyError::Der("unexpected tag"));
        }
        let first = self.take(1)?[0];
        let len = if first & 0x80 == 0 {
            first as usize
        } else {
            let n = (first & 0x7f) as usize;
            if n == 0 || n > 4 {
                return Err(KeyError::Der("bad length"));
            }
            self.take(n)?.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize)
        };
        self.take(len)
    }
}

const TAG_INTEGER: u8 = 0x02;
const TAG_BIT_STRING: u8 = 0x03;
const TAG_SEQUENCE: u8 = 0x30;

/// `RSAPublicKey ::= SEQUENCE { modulus INTEGER, publicExponent INTEGER }`
fn parse_pkcs1(der: &[u8]) -> Result<(BigUint, BigUint), KeyError> {
    let mut outer = Der { buf: der };
    let mut seq = Der { buf: outer.element(TAG_SEQUENCE)? };
    let n = BigUint::from_bytes_be(seq.element(TAG_INTEGER)?);
    let e = BigUint::from_bytes_be(seq.element(TAG_INTEGER)?);
    Ok((n, e))
}

/// `SubjectPublicKeyInfo ::= SEQUENCE { algorithm SEQUENCE, subjectPublicKey BIT STRING }`
fn parse_spki(der: &[u8]) -> Result<(BigUint, BigUint), KeyError> {
    let mut outer = Der { buf: der };
    let mut seq = Der { buf: outer.element(TAG_SEQUENCE)? };
    seq.element(TAG_SEQUENCE)?;
    let bits = seq.element(TAG_BIT_STRING)?;
    match bits.split_first() {
        Some((0, rest)) => parse_pkcs1(rest),
        _ => Err(KeyError::Der("bit string has unused bits")),
    }
}

// ─── Key ──────────────────────────────────────────────────────────────────────

/// An RSA public key (n, e) with its fingerprint.
#[derive(Clone, PartialEq)]
pub struct Key {
    n: BigUint,
    e: BigUint,
    fingerprint: i64,
}

impl Key {
    /// Parse decimal `n` and `e` strings.
    pub fn new(n: &str, e: &str) -> Option<Self> {
        Some(Self::from_components(
            BigUint::parse_bytes(n.as_bytes(), 10)?,
            BigUint::parse_bytes(e.as_bytes(), 10)?,
        ))
    }

    /// Build from the modulus and exponent.
    pub fn from_components(n: BigUint, e: BigUint) -> Self {
        let fingerprint = compute_fingerprint(&n, &e);
        Self { n, e, fingerprint }
    }

    /// Parse a PKCS#1 (`RSA PUBLIC KEY`) or SPKI (`PUBLIC KEY`) PEM block.
    pub fn from_pem(pem: &str) -> Result<Self, KeyError> {
        let pem = pem.trim();
        let header_end = pem.find('\n').ok_or(KeyError::NotPem)?;
        let header = pem[..header_end].trim();
        let footer_start = pem.rfind("-----END").ok_or(KeyError::NotPem)?;
        if !header.starts_with("-----BEGIN") || footer_start <= header_end {
            return Err(KeyError::NotPem);
        }
        let body: String = pem[header_end..footer_start]
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let der = STANDARD.decode(body).map_err(|_| KeyError::Base64)?;

        let (n, e) = if header.contains("RSA PUBLIC KEY") {
            parse_pkcs1(&der)?
        } else if header.contains("PUBLIC KEY") {
            parse_spki(&der)?
        } else {
            return Err(KeyError::NotPem);
        };
        Ok(Self::from_components(n, e))
    }

    /// Low 64 bits of `SHA1(tl_bytes(n) ‖ tl_bytes(e))`, as servers advertise it.
    pub fn fingerprint(&self) -> i64 { self.fingerprint }

    pub fn modulus(&self) -> &BigUint { &self.n }

    pub fn exponent(&self) -> &BigUint { &self.e }

    fn modulus_fits(&self) -> bool {
        let bits = self.n.bits();
        bits > (BLOCK_SIZE as u64 - 1) * 8 && bits <= BLOCK_SIZE as u64 * 8
    }

    /// Raw `m^e mod n` of a big-endian block, left-padded to 256 bytes.
    ///
    /// `None` unless the modulus is 2048 bits wide and `m < n`.
    pub fn encrypt(&self, block: &[u8]) -> Option<Vec<u8>> {
        if !self.modulus_fits() || block.len() > BLOCK_SIZE {
            return None;
        }
        let m = BigUint::from_bytes_be(block);
        if m >= self.n {
            return None;
        }
        to_block(&m.modpow(&self.e, &self.n))
    }

    /// Raw public-key "decryption" (`c^e mod n`) used to open server-signed
    /// blobs. Same constraints as [`encrypt`](Self::encrypt).
    pub fn decrypt_public(&self, block: &[u8]) -> Option<Vec<u8>> {
        self.encrypt(block)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rsa::Key(fingerprint={})", self.fingerprint)
    }
}

fn to_block(value: &BigUint) -> Option<Vec<u8>> {
    let bytes = value.to_bytes_be();
    if bytes.len() > BLOCK_SIZE {
        return None;
    }
    let mut out = vec![0u8; BLOCK_SIZE - bytes.len()];
    out.extend_from_slice(&bytes);
    Some(out)
}

/// TL `bytes` encoding, so the fingerprint matches what servers compute.
fn tl_bytes(out: &mut Vec<u8>, data: &[u8]) {
    let header = if data.len() <= 253 {
        out.push(data.len() as u8);
        1
    } else {
        out.extend([0xfe, data.len() as u8, (data.len() >> 8) as u8, (data.len() >> 16) as u8]);
        4
    };
    out.extend_from_slice(data);
    out.resize(out.len() + (4 - (header + data.len()) % 4) % 4, 0);
}

fn compute_fingerprint(n: &BigUint, e: &BigUint) -> i64 {
    let mut buf = Vec::with_capacity(272);
    tl_bytes(&mut buf, &n.to_bytes_be());
    tl_bytes(&mut buf, &e.to_bytes_be());
    let sha = sha1!(&buf);
    crate::sha::le_u64(&sha[12..20]) as i64
}

/// Encrypt `data` for `req_DH_params`.
///
/// The block is `SHA1(data) ‖ data ‖ random`, 255 bytes long, encrypted
/// with raw RSA. `random` must supply at least `235 - data.len()` bytes.
/// Returns `None` when `data` does not fit or the key is unsuitable.
pub fn encrypt_hashed(data: &[u8], key: &Key, random: &[u8]) -> Option<Vec<u8>> {
    const PLAIN: usize = BLOCK_SIZE - 1;
    let fill = PLAIN.checked_sub(20 + data.len())?;
    if random.len() < fill {
        return None;
    }
    let mut block = Vec::with_capacity(PLAIN);
    block.extend_from_slice(&sha1!(data));
    block.extend_from_slice(data);
    block.extend_from_slice(&random[..fill]);
    let encrypted = key.encrypt(&block)?;
    (encrypted.len() == BLOCK_SIZE).then_some(encrypted)
}

// ─── Built-in keys ────────────────────────────────────────────────────────────

/// Production keys. The first is current; the rest are older keys some
/// data-centers still advertise.
const PRODUCTION_KEYS: &[&str] = &[
    "-----BEGIN RSA PUBLIC KEY-----
MIIBCgKCAQEA6LszBcC1LGzyr992NzE0ieY+BSaOW622Aa9Bd4ZHLl+TuFQ4lo4g
5nKaMBwK/BIb9xUfg0Q29/2mgIR6Zr9krM7HjuIcCzFvDtr+L0GQjae9H0pRB2OO
62cECs5HKhT5DZ98K33vmWiLowc621dQuwKWSQKjWf50XYFw42h21P2KXUGyp2y/
+aEyZ+uVgLLQbRA1dEjSDZ2iGRy12Mk5gpYc397aYp438fsJoHIgJ2lgMv5h7WY9
t6N/byY9Nw9p21Og3AoXSL2q/2IJ1WRUhebgAdGVMlV1fkuOQoEzR7EdpqtQD9Cs
5+bfo3Nhmcyvk5ftB0WkJ9z6bNZ7yxrP8wIDAQAB
-----END RSA PUBLIC KEY-----",
    "-----BEGIN RSA PUBLIC KEY-----
MIIBCgKCAQEAwVACPi9w23mF3tBkdZz+zwrzKOaaQdr01vAbU4E1pvkfj4sqDsm6
lyDONS789sVoD/xCS9Y0hkkC3gtL1tSfTlgCMOOul9lcixlEKzwKENj1Yz/s7daS
an9tqw3bfUV/nqgbhGX81v/+7RFAEd+RwFnK7a+XYl9sluzHRyVVaTTveB2GazTw
Efzk2DWgkBluml8OREmvfraX3bkHZJTKX4EQSjBbbdJ2ZXIsRrYOXfaA+xayEGB+
8hdlLmAjbCVfaigxX0CDqWeR1yFL9kwd9P0NsZRPsmoqVwMbMu7mStFai6aIhc3n
Slv8kg9qv1m6XHVQY3PnEw+QQtqSIXklHwIDAQAB
-----END RSA PUBLIC KEY-----",
    "-----BEGIN PUBLIC KEY-----
MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEAruw2yP/BCcsJliRoW5eB
VBVle9dtjJw+OYED160Wybum9SXtBBLXriwt4rROd9csv0t0OHCaTmRqBcQ0J8fx
hN6/cpR1GWgOZRUAiQxoMnlt0R93LCX/j1dnVa/gVbCjdSxpbrfY2g2L4frzjJvd
l84Kd9ORYjDEAyFnEA7dD556OptgLQQ2e2iVNq8NZLYTzLp5YpOdO1doK+ttrltg
gTCy5SrKeLoCPPbOgGsdxJxyz5KKcZnSLj16yE5HvJQn0CNpRdENvRUXe6tBP78O
39oJ8BTHp9oIjd6XWXAsp2CvK45Ol8wFXGF710w9lwCGNbmNxNYhtIkdqfsEcwR5
JwIDAQAB
-----END PUBLIC KEY-----",
    "-----BEGIN PUBLIC KEY-----
MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEAvfLHfYH2r9R70w8prHbl
Wt/nDkh+XkgpflqQVcnAfSuTtO05lNPspQmL8Y2XjVT4t8cT6xAkdgfmmvnvRPOO
KPi0OfJXoRVylFzAQG/j83u5K3kRLbae7fLccVhKZhY46lvsueI1hQdLgNV9n1cQ
3TDS2pQOCtovG4eDl9wacrXOJTG2990VjgnIKNA0UMoP+KF03qzryqIt3oTvZq03
DyWdGK+AZjgBLaDKSnC6qD2cFY81UryRWOab8zKkWAnhw2kFpcqhI0jdV5QaSCEx
vnsjVaX0Y1N0870931/5Jb9ICe4nweZ9kSDF/gip3kWLG0o8XQpChDfyvsqB9OLV
/wIDAQAB
-----END PUBLIC KEY-----",
    "-----BEGIN PUBLIC KEY-----
MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEAs/ditzm+mPND6xkhzwFI
z6J/968CtkcSE/7Z2qAJiXbmZ3UDJPGrzqTDHkO30R8VeRM/Kz2f4nR05GIFiITl
4bEjvpy7xqRDspJcCFIOcyXm8abVDhF+th6knSU0yLtNKuQVP6voMrnt9MV1X92L
GZQLgdHZbPQz0Z5qIpaKhdyA8DEvWWvSUwwc+yi1/gGaybwlzZwqXYoPOhwMebzK
Uk0xW14htcJrRrq+PXXQbRzTMynseCoPIoke0dtCodbA3qQxQovE16q9zz4Otv2k
4j63cz53J+mhkVWAeWxVGI0lltJmWtEYK6er8VqqWot3nqmWMXogrgRLggv/Nbbo
oQIDAQAB
-----END PUBLIC KEY-----",
    "-----BEGIN PUBLIC KEY-----
MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEAvmpxVY7ld/8DAjz6F6q0
5shjg8/4p6047bn6/m8yPy1RBsvIyvuDuGnP/RzPEhzXQ9UJ5Ynmh2XJZgHoE9xb
nfxL5BXHplJhMtADXKM9bWB11PU1Eioc3+AXBB8QiNFBn2XI5UkO5hPhbb9mJpjA
9Uhw8EdfqJP8QetVsI/xrCEbwEXe0xvifRLJbY08/Gp66KpQvy7g8w7VB8wlgePe
xW3pT13Ap6vuC+mQuJPyiHvSxjEKHgqePji9NP3tJUFQjcECqcm0yV7/2d0t/pbC
m+ZH1sadZspQCEPPrtbkQBlvHb4OLiIWPGHKSMeRFvp3IWcmdJqXahxLCUS1Eh6M
AQIDAQAB
-----END PUBLIC KEY-----",
];

/// Test-environment key.
const TEST_KEYS: &[&str] = &["-----BEGIN RSA PUBLIC KEY-----
MIIBCgKCAQEAyMEdY1aR+sCR3ZSJrtztKTKqigvO/vBfqACJLZtS7QMgCGXJ6XIR
yy7mx66W0/sOFa7/1mAZtEoIokDP3ShoqF4fVNb6XeqgQfaUHd8wJpDWHcR2OFwv
plUUI1PLTktZ9uW2WE23b+ixNwJjJGwBDJPQEQFBE+vfmH0JP503wr5INS1poWg/
j25sIWeYPHYeOrFp/eXaqhISP6G+q2IeTaWTXpwZj4LzXq5YOpk4bYEQ6mvRq7D1
aHWfYmlEGepfaYR8Q0YqvvhYtMte3ITnuSJs171+GDqpdKcSwHnd6FudwGO4pcCO
j4WcDuXc2CTHgH8gFTNhp/Y8/SpDOhvn9QIDAQAB
-----END RSA PUBLIC KEY-----"];

/// Keys indexed by fingerprint.
#[derive(Clone, Debug, Default)]
pub struct KeyStore {
    keys: HashMap<i64, Key>,
}

impl KeyStore {
    /// An empty store.
    pub fn new() -> Self { Self::default() }

    /// The compiled-in keys for production or test data-centers.
    pub fn builtin(test_mode: bool) -> Self {
        let mut store = Self::new();
        let pems = if test_mode { TEST_KEYS } else { PRODUCTION_KEYS };
        for pem in pems {
            match Key::from_pem(pem) {
                Ok(key) => store.insert(key),
                Err(e) => log::error!("[rsa] built-in key rejected: {e}"),
            }
        }
        store
    }

    /// Add a key (test DCs, CDN keys). Replaces a key with the same fingerprint.
    pub fn insert(&mut self, key: Key) {
        self.keys.insert(key.fingerprint(), key);
    }

    pub fn lookup(&self, fingerprint: i64) -> Option<&Key> {
        self.keys.get(&fingerprint)
    }

    /// The first advertised fingerprint we hold a key for.
    pub fn find_any(&self, fingerprints: &[i64]) -> Option<&Key> {
        fingerprints.iter().find_map(|fp| self.keys.get(fp))
    }

    pub fn fingerprints(&self) -> Vec<i64> {
        let mut out: Vec<i64> = self.keys.keys().copied().collect();
        out.sort_unstable();
        out
    }

    pub fn len(&self) -> usize { self.keys.len() }

    pub fn is_empty(&self) -> bool { self.keys.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_fingerprints() {
        let prod = KeyStore::builtin(false);
        assert_eq!(prod.len(), 6);
        for fp in [
            -3414540481677951611,
            -4344800451088585951,
            847625836280919973,
            1562291298945373506,
            -5859577972006586033,
            6491968696586960280,
        ] {
            assert!(prod.lookup(fp).is_some(), "{fp}");
        }

        let test = KeyStore::builtin(true);
        assert_eq!(test.fingerprints(), vec![-5595554452916591101]);
    }

    #[test]
    fn pem_matches_decimal_modulus() {
        let from_pem = Key::from_pem(TEST_KEYS[0]).unwrap();
        let from_dec = Key::new(
            "25342889448840415564971689590713473206898847759084779052582026594546022463853940585885215951168491965708222649399180603818074200620463776135424884632162512403163793083921641631564740959529419359595852941166848940585952337613333022396096584117954892216031229237302943701877588456738335398602461675225081791820393153757504952636234951323237820036543581047826906120927972487366805292115792231423684261262330394324750785450942589751755390156647751460719351439969059949569615302809050721500330239005077889855323917509948255722081644689442127297605422579707142646660768825302832201908302295573257427896031830742328565032949",
            "65537",
        ).unwrap();
        assert_eq!(from_pem, from_dec);
    }

    #[test]
    fn find_any_skips_unknown() {
        let store = KeyStore::builtin(false);
        let key = store.find_any(&[1, 2, -3414540481677951611]).unwrap();
        assert_eq!(key.fingerprint(), -3414540481677951611);
        assert!(store.find_any(&[1, 2, 3]).is_none());
    }

    #[test]
    fn rejects_garbage_pem() {
        assert_eq!(Key::from_pem("hello"), Err(KeyError::NotPem));
        assert_eq!(
            Key::from_pem("-----BEGIN RSA PUBLIC KEY-----\n!!!!\n-----END RSA PUBLIC KEY-----"),
            Err(KeyError::Base64),
        );
    }

    #[test]
    fn hashed_block_is_full_size() {
        let key = Key::from_pem(PRODUCTION_KEYS[0]).unwrap();
        let data = [0x5au8; 96];
        let random = [0x11u8; 255];
        let out = encrypt_hashed(&data, &key, &random).unwrap();
        assert_eq!(out.len(), BLOCK_SIZE);
        assert!(encrypt_hashed(&[0u8; 236], &key, &random).is_none());
    }

    #[test]
    fn raw_rsa_with_unit_exponent_is_identity() {
        let n = (BigUint::from(1u32) << 2048usize) - 1u32;
        let key = Key::from_components(n, BigUint::from(1u32));
        let block = [0x42u8; 256];
        assert_eq!(key.decrypt_public(&block).unwrap(), block.to_vec());
        assert!(key.encrypt(&[0xff; 256]).is_none());
    }
}
