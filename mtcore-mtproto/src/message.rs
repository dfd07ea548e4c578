//! MTProto message identifiers and plaintext framing.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A 64-bit MTProto message identifier.
///
/// The upper 32 bits hold the unix time of creation, the lower 32 bits the
/// fraction of that second. The two least significant bits tell who produced
/// the message: `00` for the client, `01` for a server reply and `11` for
/// any other server message.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct MessageId(pub i64);

impl MessageId {
    /// Build a client id for `unix` seconds plus `nanos`.
    ///
    /// The low two bits are always cleared.
    pub fn from_time(unix: i64, nanos: u32) -> Self {
        let fraction = ((u64::from(nanos) << 32) / 1_000_000_000) & !3;
        Self(((unix as u64) << 32 | fraction) as i64)
    }

    /// Client id for the given system time shifted by `offset` seconds.
    pub fn at(now: SystemTime, offset: i32) -> Self {
        let since = now.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        Self::from_time(since.as_secs() as i64 + i64::from(offset), since.subsec_nanos())
    }

    /// Unix time encoded in the id.
    pub fn unixtime(self) -> i32 {
        (self.0 >> 32) as i32
    }

    /// Low bits `00`.
    pub fn is_client(self) -> bool {
        self.0 & 3 == 0
    }

    /// Low bits `01` or `11`.
    pub fn is_server(self) -> bool {
        matches!(self.0 & 3, 1 | 3)
    }

    /// Low bits `01`: an answer to one of our messages.
    pub fn is_reply(self) -> bool {
        self.0 & 3 == 1
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Errors from [`PlainMessage::from_plaintext_bytes`].
#[derive(Clone, Debug, PartialEq)]
pub enum FrameError {
    /// Shorter than the 20-byte header.
    TooShort { len: usize },
    /// `auth_key_id` was not zero.
    EncryptedFrame { key_id: u64 },
    /// The declared body length does not match the frame.
    LengthMismatch { declared: usize, available: usize },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { len } => write!(f, "plaintext frame of {len} bytes is too short"),
            Self::EncryptedFrame { key_id } => {
                write!(f, "expected a plaintext frame, got auth_key_id {key_id:#018x}")
            }
            Self::LengthMismatch { declared, available } => {
                write!(f, "plaintext frame declares {declared} bytes, holds {available}")
            }
        }
    }
}

impl std::error::Error for FrameError {}

/// A message exchanged before any key exists.
#[derive(Clone, Debug, PartialEq)]
pub struct PlainMessage {
    /// Unique identifier for this message.
    pub id: MessageId,
    /// The serialized TL body (constructor ID + fields).
    pub body: Vec<u8>,
}

impl PlainMessage {
    pub fn new(id: MessageId, body: Vec<u8>) -> Self {
        Self { id, body }
    }

    /// Serialize into the plaintext wire format:
    ///
    /// ```text
    /// auth_key_id:long  (0 for plaintext)
    /// message_id:long
    /// message_data_length:int
    /// message_data:bytes
    /// ```
    pub fn to_plaintext_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + 8 + 4 + self.body.len());
        buf.extend(0i64.to_le_bytes());
        buf.extend(self.id.0.to_le_bytes());
        buf.extend((self.body.len() as u32).to_le_bytes());
        buf.extend(&self.body);
        buf
    }

    /// Parse a plaintext frame as received from the transport.
    pub fn from_plaintext_bytes(frame: &[u8]) -> Result<Self, FrameError> {
        if frame.len() < 20 {
            return Err(FrameError::TooShort { len: frame.len() });
        }
        let key_id = u64::from_le_bytes(word(&frame[..8]));
        if key_id != 0 {
            return Err(FrameError::EncryptedFrame { key_id });
        }
        let id = MessageId(i64::from_le_bytes(word(&frame[8..16])));
        let declared = u32::from_le_bytes([frame[16], frame[17], frame[18], frame[19]]) as usize;
        let available = frame.len() - 20;
        if declared > available {
            return Err(FrameError::LengthMismatch { declared, available });
        }
        Ok(Self { id, body: frame[20..20 + declared].to_vec() })
    }
}

fn word(bytes: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_ids_have_clear_low_bits() {
        for nanos in [0, 1, 999_999_999, 123_456_789] {
            let id = MessageId::from_time(1_700_000_000, nanos);
            assert!(id.is_client());
            assert_eq!(id.unixtime(), 1_700_000_000);
        }
    }

    #[test]
    fn fraction_grows_within_second() {
        let a = MessageId::from_time(1_700_000_000, 100_000_000);
        let b = MessageId::from_time(1_700_000_000, 200_000_000);
        assert!(b > a);
    }

    #[test]
    fn server_id_kinds() {
        assert!(MessageId(5).is_server() && MessageId(5).is_reply());
        assert!(MessageId(7).is_server() && !MessageId(7).is_reply());
        assert!(!MessageId(6).is_server());
    }

    #[test]
    fn plaintext_roundtrip_layout() {
        let msg = PlainMessage::new(MessageId(0x1234_5678_0000_0004), vec![0xaa, 0xbb, 0xcc, 0xdd]);
        let wire = msg.to_plaintext_bytes();
        assert_eq!(wire.len(), 24);
        assert_eq!(&wire[..8], &[0u8; 8]);
        assert_eq!(PlainMessage::from_plaintext_bytes(&wire).unwrap(), msg);
    }

    #[test]
    fn rejects_encrypted_and_truncated_frames() {
        let mut wire = PlainMessage::new(MessageId(4), vec![1, 2, 3, 4]).to_plaintext_bytes();
        wire.truncate(22);
        assert_eq!(
            PlainMessage::from_plaintext_bytes(&wire),
            Err(FrameError::LengthMismatch { declared: 4, available: 2 })
        );
        wire[0] = 1;
        assert!(matches!(
            PlainMessage::from_plaintext_bytes(&wire),
            Err(FrameError::EncryptedFrame { .. })
        ));
        assert_eq!(
            PlainMessage::from_plaintext_bytes(&[0; 5]),
            Err(FrameError::TooShort { len: 5 })
        );
    }
}
