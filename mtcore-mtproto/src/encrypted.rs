//! The encrypted envelope used once an auth key exists.
//!
//! ```text
//! auth_key_id:long  msg_key:int128  AES-IGE(
//!     salt:long  session_id:long  msg_id:long  seq_no:int  length:int  body  padding
//! )
//! ```

use std::fmt;

use mtcore_crypto::{AuthKey, DecryptError, Direction, Scheme, decrypt_data_as, encrypt_data_as};

use crate::consts::{
    MAX_MESSAGE_LENGTH, MAX_PADDING_V1, MAX_PADDING_V2, MIN_ENCRYPTED_FRAME, MIN_PADDING_V2,
};

const HEADER_LEN: usize = 32;

/// Why an inbound frame was rejected. All of these are fatal for the
/// connection; the caller restarts it.
#[derive(Clone, Debug, PartialEq)]
pub enum EnvelopeError {
    /// The crypto layer rejected the frame (key id, msg_key, alignment).
    Crypto(DecryptError),
    /// Outside `MIN_ENCRYPTED_FRAME..=MAX_MESSAGE_LENGTH`.
    BadFrameSize { len: usize },
    /// The declared length is too large, unaligned, or leaves padding out of bounds.
    BadLength { length: usize, padding: usize },
    /// The frame belongs to another session.
    SessionMismatch { got: i64, expected: i64 },
    /// The low bits of the msg_id do not mark a server message.
    BadMsgId { msg_id: i64 },
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crypto(e) => write!(f, "crypto: {e}"),
            Self::BadFrameSize { len } => write!(f, "encrypted frame of {len} bytes"),
            Self::BadLength { length, padding } => {
                write!(f, "bad message length {length} (padding {padding})")
            }
            Self::SessionMismatch { got, expected } => {
                write!(f, "session_id mismatch: got {got}, expected {expected}")
            }
            Self::BadMsgId { msg_id } => write!(f, "bad server msg_id {msg_id}"),
        }
    }
}

impl std::error::Error for EnvelopeError {}

impl From<DecryptError> for EnvelopeError {
    fn from(e: DecryptError) -> Self { Self::Crypto(e) }
}

/// The inner payload of a successfully opened frame.
#[derive(Clone, Debug, PartialEq)]
pub struct DecryptedMessage {
    pub salt: i64,
    pub session_id: i64,
    pub msg_id: i64,
    pub seq_no: i32,
    /// TL-serialized body, padding stripped.
    pub body: Vec<u8>,
}

impl DecryptedMessage {
    /// Odd sequence numbers ask for an acknowledgement.
    pub fn needs_ack(&self) -> bool {
        self.seq_no & 1 != 0
    }
}

/// Fields that go in front of the body.
#[derive(Clone, Copy, Debug)]
pub struct Header {
    pub salt: i64,
    pub session_id: i64,
    pub msg_id: i64,
    pub seq_no: i32,
}

/// Build the unencrypted payload `salt ‖ session_id ‖ msg_id ‖ seq_no ‖ length ‖ body`.
pub fn payload(header: &Header, body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + body.len());
    buf.extend(header.salt.to_le_bytes());
    buf.extend(header.session_id.to_le_bytes());
    buf.extend(header.msg_id.to_le_bytes());
    buf.extend(header.seq_no.to_le_bytes());
    buf.extend((body.len() as u32).to_le_bytes());
    buf.extend_from_slice(body);
    buf
}

/// Encrypt a client message, ready for the transport.
pub fn seal(key: &AuthKey, scheme: Scheme, header: &Header, body: &[u8]) -> Vec<u8> {
    mtcore_crypto::encrypt_data(&payload(header, body), key, scheme)
}

/// Encrypt as `direction` with caller-chosen padding. Mock servers use this.
pub fn seal_as(
    key: &AuthKey,
    scheme: Scheme,
    direction: Direction,
    header: &Header,
    body: &[u8],
    padding: &[u8; 32],
) -> Vec<u8> {
    encrypt_data_as(&payload(header, body), key, scheme, direction, padding)
}

/// Open a server frame and run every envelope-level validation.
pub fn open(
    frame: &mut [u8],
    key: &AuthKey,
    scheme: Scheme,
    session_id: i64,
) -> Result<DecryptedMessage, EnvelopeError> {
    let message = open_as(frame, key, scheme, Direction::ServerToClient)?;
    if message.session_id != session_id {
        return Err(EnvelopeError::SessionMismatch { got: message.session_id, expected: session_id });
    }
    if !matches!(message.msg_id & 3, 1 | 3) {
        return Err(EnvelopeError::BadMsgId { msg_id: message.msg_id });
    }
    Ok(message)
}

/// Decrypt a frame produced by `direction` and check its length fields.
///
/// Does not look at the session id or msg_id bits.
pub fn open_as(
    frame: &mut [u8],
    key: &AuthKey,
    scheme: Scheme,
    direction: Direction,
) -> Result<DecryptedMessage, EnvelopeError> {
    if frame.len() < MIN_ENCRYPTED_FRAME || frame.len() > MAX_MESSAGE_LENGTH {
        return Err(EnvelopeError::BadFrameSize { len: frame.len() });
    }
    let plain = decrypt_data_as(frame, key, scheme, direction)?;

    let length = u32::from_le_bytes(word4(&plain[28..32])) as usize;
    let padding = plain.len().checked_sub(HEADER_LEN + length);
    let padding_ok = |p: usize| match scheme {
        Scheme::V2 => (MIN_PADDING_V2..=MAX_PADDING_V2).contains(&p),
        Scheme::V1 => p <= MAX_PADDING_V1,
    };
    match padding {
        Some(p) if length <= MAX_MESSAGE_LENGTH && length % 4 == 0 && padding_ok(p) => {}
        other => {
            return Err(EnvelopeError::BadLength { length, padding: other.unwrap_or(0) });
        }
    }

    Ok(DecryptedMessage {
        salt: i64::from_le_bytes(word8(&plain[0..8])),
        session_id: i64::from_le_bytes(word8(&plain[8..16])),
        msg_id: i64::from_le_bytes(word8(&plain[16..24])),
        seq_no: i32::from_le_bytes(word4(&plain[24..28])),
        body: plain[HEADER_LEN..HEADER_LEN + length].to_vec(),
    })
}

fn word8(b: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(b);
    out
}

fn word4(b: &[u8]) -> [u8; 4] {
    [b[0], b[1], b[2], b[3]]
}
