//! Sans-IO MTProto authorization key generation.
//!
//! # Flow
//!
//! ```text
//! let (req, s1) = authentication::step1()?;
//! // send req, receive resp
//! let (req, s2) = authentication::step2(s1, resp, &keys)?;
//! // send req, receive resp
//! let (req, s3) = authentication::step3(s2, resp)?;
//! // send req, receive resp
//! match authentication::finish(s3, resp)? {
//!     DhAnswer::Done(done) => { /* done.auth_key is ready */ }
//!     DhAnswer::Retry(state) => { let (req, s3) = authentication::retry(state)?; /* ... */ }
//! }
//! ```
//!
//! [`Handshake`] drives the same steps over plaintext frames.

use std::fmt;

use mtcore_crypto::rsa::KeyStore;
use mtcore_crypto::{AuthKey, aes, factorize, generate_key_data_from_nonce, prime, rsa, sha1};
use mtcore_tl::{Cursor, Deserializable, Serializable, deserialize, enums, functions, types};
use num_bigint::BigUint;

use crate::consts::MAX_DH_RETRIES;
use crate::message::{FrameError, PlainMessage};
use crate::session::{Session, local_unixtime};

// ─── Error ────────────────────────────────────────────────────────────────────

/// Errors that can occur during auth key generation.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    InvalidFrame(FrameError),
    Deserialize(deserialize::Error),
    InvalidNonce         { got: [u8; 16], expected: [u8; 16] },
    InvalidPqSize        { size: usize },
    Factorization        { pq: u64 },
    UnknownFingerprints  { fingerprints: Vec<i64> },
    RsaEncryption,
    DhParamsFail,
    InvalidServerNonce   { got: [u8; 16], expected: [u8; 16] },
    EncryptedResponseNotPadded { len: usize },
    InvalidDhInnerData   { error: deserialize::Error },
    InvalidAnswerHash    { got: [u8; 20], expected: [u8; 20] },
    InvalidDhPrime,
    /// `g_a` or `g_b` outside `(2^1984, dh_prime - 2^1984)`.
    GParameterOutOfRange { name: &'static str },
    DhGenFail,
    InvalidNewNonceHash  { got: [u8; 16], expected: [u8; 16] },
    TooManyRetries,
    /// A frame arrived while the driver was not waiting for one.
    UnexpectedStage,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFrame(e) => write!(f, "invalid plaintext frame: {e}"),
            Self::Deserialize(e) => write!(f, "cannot decode answer: {e}"),
            Self::InvalidNonce { got, expected }
                => write!(f, "nonce mismatch: got {got:?}, expected {expected:?}"),
            Self::InvalidPqSize { size }
                => write!(f, "pq size {size} invalid (expected 8)"),
            Self::Factorization { pq } => write!(f, "cannot factor pq {pq}"),
            Self::UnknownFingerprints { fingerprints }
                => write!(f, "no known fingerprint in {fingerprints:?}"),
            Self::RsaEncryption => write!(f, "RSA encryption of p_q_inner_data failed"),
            Self::DhParamsFail
                => write!(f, "server returned DH params failure"),
            Self::InvalidServerNonce { got, expected }
                => write!(f, "server_nonce mismatch: got {got:?}, expected {expected:?}"),
            Self::EncryptedResponseNotPadded { len }
                => write!(f, "encrypted answer len {len} is not 16-byte aligned"),
            Self::InvalidDhInnerData { error }
                => write!(f, "DH inner data deserialization error: {error}"),
            Self::InvalidAnswerHash { got, expected }
                => write!(f, "answer hash mismatch: got {got:?}, expected {expected:?}"),
            Self::InvalidDhPrime => write!(f, "server sent an unacceptable dh_prime"),
            Self::GParameterOutOfRange { name } => write!(f, "{name} out of the safe range"),
            Self::DhGenFail   => write!(f, "DH gen failed"),
            Self::InvalidNewNonceHash { got, expected }
                => write!(f, "new nonce hash mismatch: got {got:?}, expected {expected:?}"),
            Self::TooManyRetries => write!(f, "server kept asking for dh_gen_retry"),
            Self::UnexpectedStage => write!(f, "handshake is not waiting for an answer"),
        }
    }
}

impl From<deserialize::Error> for Error {
    fn from(e: deserialize::Error) -> Self { Self::Deserialize(e) }
}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self { Self::InvalidFrame(e) }
}

// ─── Entropy ─────────────────────────────────────────────────────────────────

/// Source of the handshake's random bytes. Tests inject a deterministic one.
pub trait Entropy {
    fn fill(&mut self, buf: &mut [u8]);
}

impl<F: FnMut(&mut [u8])> Entropy for F {
    fn fill(&mut self, buf: &mut [u8]) {
        self(buf)
    }
}

fn os_entropy() -> impl Entropy {
    mtcore_crypto::random_fill
}

// ─── Step state ──────────────────────────────────────────────────────────────

/// State after step 1.
pub struct Step1 { nonce: [u8; 16] }

/// State after step 2.
pub struct Step2 {
    nonce:        [u8; 16],
    server_nonce: [u8; 16],
    new_nonce:    [u8; 32],
}

/// What the server told us in `server_DH_inner_data`; reused by retries.
struct DhParams {
    nonce:        [u8; 16],
    server_nonce: [u8; 16],
    new_nonce:    [u8; 32],
    dh_prime:     BigUint,
    g:            BigUint,
    g_a:          BigUint,
    tmp_key:      [u8; 32],
    tmp_iv:       [u8; 32],
    time_offset:  i32,
    retries:      u32,
}

/// State after step 3.
pub struct Step3 {
    params: DhParams,
    gab:    BigUint,
}

/// A `dh_gen_retry` answer; feed it to [`retry`].
pub struct RetryState {
    params:   DhParams,
    retry_id: i64,
}

impl Drop for Step1 {
    fn drop(&mut self) {
        self.nonce.fill(0);
    }
}

impl Drop for Step2 {
    fn drop(&mut self) {
        self.nonce.fill(0);
        self.server_nonce.fill(0);
        self.new_nonce.fill(0);
    }
}

impl Drop for DhParams {
    fn drop(&mut self) {
        self.new_nonce.fill(0);
        self.tmp_key.fill(0);
        self.tmp_iv.fill(0);
    }
}

impl Drop for Step3 {
    fn drop(&mut self) {
        self.gab = BigUint::default();
    }
}

/// The final output of a successful auth key handshake.
#[derive(Clone, Debug, PartialEq)]
pub struct Finished {
    pub auth_key:    AuthKey,
    /// Clock skew in seconds relative to the server.
    pub time_offset: i32,
    /// Initial server salt.
    pub first_salt:  i64,
}

/// Answer to `set_client_DH_params`.
pub enum DhAnswer {
    Done(Finished),
    Retry(RetryState),
}

// ─── Step 1: req_pq_multi ────────────────────────────────────────────────────

/// Generate a `req_pq_multi` request. Returns the request + opaque state.
pub fn step1() -> Result<(functions::ReqPqMulti, Step1), Error> {
    step1_with(&mut os_entropy())
}

pub fn step1_with(rng: &mut impl Entropy) -> Result<(functions::ReqPqMulti, Step1), Error> {
    let mut nonce = [0u8; 16];
    rng.fill(&mut nonce);
    Ok((functions::ReqPqMulti { nonce }, Step1 { nonce }))
}

// ─── Step 2: req_DH_params ───────────────────────────────────────────────────

/// Process `ResPQ` and generate `req_DH_params`.
pub fn step2(
    data:     Step1,
    response: enums::ResPq,
    keys:     &KeyStore,
) -> Result<(functions::ReqDhParams, Step2), Error> {
    step2_with(data, response, keys, &mut os_entropy())
}

pub fn step2_with(
    data:     Step1,
    response: enums::ResPq,
    keys:     &KeyStore,
    rng:      &mut impl Entropy,
) -> Result<(functions::ReqDhParams, Step2), Error> {
    let nonce = data.nonce;
    let enums::ResPq::ResPq(res_pq) = response;

    check_nonce(&res_pq.nonce, &nonce)?;

    let pq_bytes: [u8; 8] = res_pq.pq.as_slice().try_into()
        .map_err(|_| Error::InvalidPqSize { size: res_pq.pq.len() })?;
    let pq = u64::from_be_bytes(pq_bytes);
    let (p, q) = factorize(pq).ok_or(Error::Factorization { pq })?;
    let (p, q) = (p.min(q), p.max(q));

    let key = keys.find_any(&res_pq.server_public_key_fingerprints)
        .ok_or_else(|| Error::UnknownFingerprints {
            fingerprints: res_pq.server_public_key_fingerprints.clone(),
        })?;

    let mut new_nonce = [0u8; 32];
    rng.fill(&mut new_nonce);

    let p_bytes = trim_be(p);
    let q_bytes = trim_be(q);

    let pq_inner = enums::PQInnerData::PQInnerData(types::PQInnerData {
        pq: pq_bytes.to_vec(),
        p: p_bytes.clone(),
        q: q_bytes.clone(),
        nonce,
        server_nonce: res_pq.server_nonce,
        new_nonce,
    }).to_bytes();

    let mut padding = [0u8; 255];
    rng.fill(&mut padding);
    let encrypted_data = rsa::encrypt_hashed(&pq_inner, key, &padding)
        .ok_or(Error::RsaEncryption)?;

    log::debug!("[auth] pq factored, using RSA key {}", key.fingerprint());

    Ok((
        functions::ReqDhParams {
            nonce,
            server_nonce: res_pq.server_nonce,
            p: p_bytes,
            q: q_bytes,
            public_key_fingerprint: key.fingerprint(),
            encrypted_data,
        },
        Step2 { nonce, server_nonce: res_pq.server_nonce, new_nonce },
    ))
}

fn trim_be(v: u64) -> Vec<u8> {
    let b = v.to_be_bytes();
    let skip = b.iter().position(|&x| x != 0).unwrap_or(7);
    b[skip..].to_vec()
}

// ─── Step 3: set_client_DH_params ────────────────────────────────────────────

/// Process `ServerDhParams` and generate `set_client_DH_params`.
pub fn step3(
    data:     Step2,
    response: enums::ServerDhParams,
) -> Result<(functions::SetClientDhParams, Step3), Error> {
    step3_with(data, response, &mut os_entropy(), local_unixtime())
}

pub fn step3_with(
    data:     Step2,
    response: enums::ServerDhParams,
    rng:      &mut impl Entropy,
    now:      i32,
) -> Result<(functions::SetClientDhParams, Step3), Error> {
    let (nonce, server_nonce, new_nonce) = (data.nonce, data.server_nonce, data.new_nonce);

    let mut server_dh_ok = match response {
        enums::ServerDhParams::Fail(f) => {
            check_nonce(&f.nonce, &nonce)?;
            check_server_nonce(&f.server_nonce, &server_nonce)?;
            let digest = sha1!(&new_nonce);
            let mut expected_hash = [0u8; 16];
            expected_hash.copy_from_slice(&digest[4..]);
            check_new_nonce_hash(&f.new_nonce_hash, &expected_hash)?;
            return Err(Error::DhParamsFail);
        }
        enums::ServerDhParams::Ok(x) => x,
    };

    check_nonce(&server_dh_ok.nonce, &nonce)?;
    check_server_nonce(&server_dh_ok.server_nonce, &server_nonce)?;

    let len = server_dh_ok.encrypted_answer.len();
    if len % 16 != 0 || len < 32 {
        return Err(Error::EncryptedResponseNotPadded { len });
    }

    let (tmp_key, tmp_iv) = generate_key_data_from_nonce(&server_nonce, &new_nonce);
    aes::ige_decrypt(&mut server_dh_ok.encrypted_answer, &tmp_key, &tmp_iv);
    let plain = server_dh_ok.encrypted_answer;

    let mut got_hash = [0u8; 20];
    got_hash.copy_from_slice(&plain[..20]);
    let mut cursor = Cursor::from_slice(&plain[20..]);

    let enums::ServerDhInnerData::ServerDhInnerData(inner) =
        enums::ServerDhInnerData::deserialize(&mut cursor)
            .map_err(|error| Error::InvalidDhInnerData { error })?;

    let expected_hash = sha1!(&plain[20..20 + cursor.pos()]);
    if got_hash != expected_hash {
        return Err(Error::InvalidAnswerHash { got: got_hash, expected: expected_hash });
    }

    check_nonce(&inner.nonce, &nonce)?;
    check_server_nonce(&inner.server_nonce, &server_nonce)?;

    let dh_prime = BigUint::from_bytes_be(&inner.dh_prime);
    if inner.dh_prime.len() != 256 || !prime::is_good_prime(&dh_prime, inner.g) {
        return Err(Error::InvalidDhPrime);
    }
    let g_a = BigUint::from_bytes_be(&inner.g_a);
    if inner.g_a.len() != 256 || !prime::is_good_modexp(&g_a, &dh_prime) {
        return Err(Error::GParameterOutOfRange { name: "g_a" });
    }

    let params = DhParams {
        nonce,
        server_nonce,
        new_nonce,
        dh_prime,
        g: BigUint::from(inner.g as u32),
        g_a,
        tmp_key,
        tmp_iv,
        time_offset: inner.server_time.wrapping_sub(now),
        retries: 0,
    };
    log::debug!("[auth] DH params accepted, time offset {}", params.time_offset);
    client_dh(params, 0, rng)
}

/// Pick `b`, compute `g_b` and the key candidate, and encrypt
/// `client_DH_inner_data` with the temporary key.
fn client_dh(
    params:   DhParams,
    retry_id: i64,
    rng:      &mut impl Entropy,
) -> Result<(functions::SetClientDhParams, Step3), Error> {
    let mut b_bytes = [0u8; 256];
    rng.fill(&mut b_bytes);
    let b = BigUint::from_bytes_be(&b_bytes);
    b_bytes.fill(0);

    let g_b = params.g.modpow(&b, &params.dh_prime);
    if !prime::is_good_modexp(&g_b, &params.dh_prime) {
        return Err(Error::GParameterOutOfRange { name: "g_b" });
    }
    let gab = params.g_a.modpow(&b, &params.dh_prime);

    let client_dh_inner = enums::ClientDhInnerData::ClientDhInnerData(
        types::ClientDhInnerData {
            nonce: params.nonce,
            server_nonce: params.server_nonce,
            retry_id,
            g_b: g_b.to_bytes_be(),
        }
    ).to_bytes();

    let pad_len = (16 - ((20 + client_dh_inner.len()) % 16)) % 16;
    let mut padding = [0u8; 16];
    rng.fill(&mut padding[..pad_len]);

    let mut hashed = Vec::with_capacity(20 + client_dh_inner.len() + pad_len);
    hashed.extend_from_slice(&sha1!(&client_dh_inner));
    hashed.extend_from_slice(&client_dh_inner);
    hashed.extend_from_slice(&padding[..pad_len]);

    aes::ige_encrypt(&mut hashed, &params.tmp_key, &params.tmp_iv);

    Ok((
        functions::SetClientDhParams {
            nonce: params.nonce,
            server_nonce: params.server_nonce,
            encrypted_data: hashed,
        },
        Step3 { params, gab },
    ))
}

// ─── finish: create_key ──────────────────────────────────────────────────────

/// Check the `set_client_DH_params` answer.
pub fn finish(
    mut data: Step3,
    response: enums::SetClientDhParamsAnswer,
) -> Result<DhAnswer, Error> {
    let (answer_nonce, answer_server_nonce, hash, num) = match response {
        enums::SetClientDhParamsAnswer::DhGenOk(x)    => (x.nonce, x.server_nonce, x.new_nonce_hash1, 1),
        enums::SetClientDhParamsAnswer::DhGenRetry(x) => (x.nonce, x.server_nonce, x.new_nonce_hash2, 2),
        enums::SetClientDhParamsAnswer::DhGenFail(x)  => (x.nonce, x.server_nonce, x.new_nonce_hash3, 3),
    };

    check_nonce(&answer_nonce, &data.params.nonce)?;
    check_server_nonce(&answer_server_nonce, &data.params.server_nonce)?;

    let mut key_bytes = [0u8; 256];
    let gab_bytes = data.gab.to_bytes_be();
    let skip = 256usize.saturating_sub(gab_bytes.len());
    key_bytes[skip..].copy_from_slice(&gab_bytes[gab_bytes.len().saturating_sub(256)..]);

    let auth_key = AuthKey::from_bytes(key_bytes);
    key_bytes.fill(0);
    let expected_hash = auth_key.calc_new_nonce_hash(&data.params.new_nonce, num);
    check_new_nonce_hash(&hash, &expected_hash)?;

    match num {
        1 => {
            let first_salt = {
                let mut buf = [0u8; 8];
                for ((dst, a), b) in buf.iter_mut()
                    .zip(&data.params.new_nonce[..8])
                    .zip(&data.params.server_nonce[..8])
                {
                    *dst = a ^ b;
                }
                i64::from_le_bytes(buf)
            };
            log::info!("[auth] auth key created, key id {:#018x}", auth_key.key_id());
            Ok(DhAnswer::Done(Finished {
                auth_key,
                time_offset: data.params.time_offset,
                first_salt,
            }))
        }
        2 => {
            if data.params.retries >= MAX_DH_RETRIES {
                return Err(Error::TooManyRetries);
            }
            log::debug!("[auth] dh_gen_retry #{}", data.params.retries + 1);
            let params = std::mem::replace(&mut data.params, DhParams::empty());
            Ok(DhAnswer::Retry(RetryState { params, retry_id: auth_key.aux_hash() }))
        }
        _ => Err(Error::DhGenFail),
    }
}

/// Build a new `set_client_DH_params` after `dh_gen_retry`.
pub fn retry(state: RetryState) -> Result<(functions::SetClientDhParams, Step3), Error> {
    retry_with(state, &mut os_entropy())
}

pub fn retry_with(
    mut state: RetryState,
    rng:       &mut impl Entropy,
) -> Result<(functions::SetClientDhParams, Step3), Error> {
    let mut params = std::mem::replace(&mut state.params, DhParams::empty());
    params.retries += 1;
    client_dh(params, state.retry_id, rng)
}

impl DhParams {
    fn empty() -> Self {
        Self {
            nonce: [0; 16],
            server_nonce: [0; 16],
            new_nonce: [0; 32],
            dh_prime: BigUint::default(),
            g: BigUint::default(),
            g_a: BigUint::default(),
            tmp_key: [0; 32],
            tmp_iv: [0; 32],
            time_offset: 0,
            retries: 0,
        }
    }
}

// ─── Driver ──────────────────────────────────────────────────────────────────

enum Stage {
    Init,
    PqSent(Step1),
    DhParamsSent(Step2),
    ClientDhSent(Step3),
    Finished,
}

/// What to do after feeding a frame to [`Handshake::handle`].
#[derive(Debug)]
pub enum Progress {
    /// Write this plaintext frame and wait for the next answer.
    Send(Vec<u8>),
    Done(Finished),
}

/// Runs the key exchange over plaintext frames (without transport framing).
pub struct Handshake {
    stage:   Stage,
    session: Session,
    keys:    KeyStore,
    rng:     Box<dyn FnMut(&mut [u8]) + Send>,
}

impl Handshake {
    pub fn new(keys: KeyStore) -> Self {
        Self::with_entropy(keys, mtcore_crypto::random_fill)
    }

    pub fn with_entropy(keys: KeyStore, rng: impl FnMut(&mut [u8]) + Send + 'static) -> Self {
        Self { stage: Stage::Init, session: Session::with_id(0), keys, rng: Box::new(rng) }
    }

    /// The first frame: `req_pq_multi`.
    pub fn start(&mut self) -> Result<Vec<u8>, Error> {
        let (req, s1) = step1_with(&mut self.rng)?;
        self.stage = Stage::PqSent(s1);
        Ok(self.session.pack_plain(&req).to_plaintext_bytes())
    }

    /// Consume one plaintext answer.
    pub fn handle(&mut self, frame: &[u8]) -> Result<Progress, Error> {
        let body = PlainMessage::from_plaintext_bytes(frame)?.body;
        match std::mem::replace(&mut self.stage, Stage::Finished) {
            Stage::PqSent(s1) => {
                let (req, s2) = step2_with(s1, enums::ResPq::from_bytes(&body)?, &self.keys, &mut self.rng)?;
                self.stage = Stage::DhParamsSent(s2);
                Ok(Progress::Send(self.session.pack_plain(&req).to_plaintext_bytes()))
            }
            Stage::DhParamsSent(s2) => {
                let answer = enums::ServerDhParams::from_bytes(&body)?;
                let (req, s3) = step3_with(s2, answer, &mut self.rng, local_unixtime())?;
                self.stage = Stage::ClientDhSent(s3);
                Ok(Progress::Send(self.session.pack_plain(&req).to_plaintext_bytes()))
            }
            Stage::ClientDhSent(s3) => {
                match finish(s3, enums::SetClientDhParamsAnswer::from_bytes(&body)?)? {
                    DhAnswer::Done(done) => Ok(Progress::Done(done)),
                    DhAnswer::Retry(state) => {
                        let (req, s3) = retry_with(state, &mut self.rng)?;
                        self.stage = Stage::ClientDhSent(s3);
                        Ok(Progress::Send(self.session.pack_plain(&req).to_plaintext_bytes()))
                    }
                }
            }
            Stage::Init | Stage::Finished => Err(Error::UnexpectedStage),
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn check_nonce(got: &[u8; 16], expected: &[u8; 16]) -> Result<(), Error> {
    if got == expected { Ok(()) } else {
        Err(Error::InvalidNonce { got: *got, expected: *expected })
    }
}
fn check_server_nonce(got: &[u8; 16], expected: &[u8; 16]) -> Result<(), Error> {
    if got == expected { Ok(()) } else {
        Err(Error::InvalidServerNonce { got: *got, expected: *expected })
    }
}
fn check_new_nonce_hash(got: &[u8; 16], expected: &[u8; 16]) -> Result<(), Error> {
    if got == expected { Ok(()) } else {
        Err(Error::InvalidNewNonceHash { got: *got, expected: *expected })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> impl FnMut(&mut [u8]) {
        let mut n = 0u8;
        move |buf: &mut [u8]| {
            for b in buf {
                n = n.wrapping_add(1);
                *b = n;
            }
        }
    }

    #[test]
    fn step1_uses_injected_entropy() {
        let (req, _) = step1_with(&mut counter()).unwrap();
        assert_eq!(req.nonce[0], 1);
        assert_eq!(req.nonce[15], 16);
    }

    #[test]
    fn step2_rejects_foreign_nonce() {
        let (_, s1) = step1_with(&mut counter()).unwrap();
        let answer = enums::ResPq::ResPq(types::ResPq {
            nonce: [0xff; 16],
            server_nonce: [0; 16],
            pq: 0x17ED48941A08F981u64.to_be_bytes().to_vec(),
            server_public_key_fingerprints: vec![],
        });
        assert!(matches!(
            step2_with(s1, answer, &KeyStore::builtin(false), &mut counter()),
            Err(Error::InvalidNonce { .. })
        ));
    }

    #[test]
    fn step2_rejects_unknown_keys_and_bad_pq() {
        let make = |pq: Vec<u8>| {
            let (_, s1) = step1_with(&mut counter()).unwrap();
            let mut nonce = [0u8; 16];
            counter()(&mut nonce);
            let answer = enums::ResPq::ResPq(types::ResPq {
                nonce,
                server_nonce: [9; 16],
                pq,
                server_public_key_fingerprints: vec![42],
            });
            step2_with(s1, answer, &KeyStore::builtin(false), &mut counter())
        };
        assert!(matches!(make(vec![1, 2, 3]), Err(Error::InvalidPqSize { size: 3 })));
        assert!(matches!(
            make(0x17ED48941A08F981u64.to_be_bytes().to_vec()),
            Err(Error::UnknownFingerprints { .. })
        ));
    }

    #[test]
    fn driver_refuses_frames_before_start() {
        let mut hs = Handshake::with_entropy(KeyStore::new(), counter());
        let frame = PlainMessage::new(crate::MessageId(5), vec![0; 4]).to_plaintext_bytes();
        assert!(matches!(hs.handle(&frame), Err(Error::UnexpectedStage)));
    }
}
