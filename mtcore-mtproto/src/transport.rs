//! Sans-IO packet framing for the MTProto TCP transports.
//!
//! A [`Framing`] turns whole MTProto packets into stream bytes and back; the
//! I/O layer owns the socket and the read buffer. All lengths are checked
//! against [`MAX_MESSAGE_LENGTH`](crate::consts::MAX_MESSAGE_LENGTH).
//!
//! | Kind           | Init bytes      | Packet                                     |
//! |----------------|-----------------|--------------------------------------------|
//! | Abridged       | `ef`            | `len/4` (1 or 4 bytes) ‖ payload           |
//! | Intermediate   | `ee ee ee ee`   | `len` (4 bytes LE) ‖ payload               |
//! | Full           | none            | `len` ‖ seq ‖ payload ‖ crc32              |

use std::fmt;

use crate::consts::MAX_MESSAGE_LENGTH;

/// Errors while decoding a framed packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportError {
    /// The announced length is out of range or misaligned.
    BadLength { len: usize },
    /// Full transport checksum mismatch.
    BadCrc { expected: u32, got: u32 },
    /// Full transport packet out of order.
    BadSeq { expected: u32, got: u32 },
    /// The server answered with a bare negative status code (e.g. `-404`).
    Status { code: i32 },
}

impl std::error::Error for TransportError {}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadLength { len } => write!(f, "bad transport packet length {len}"),
            Self::BadCrc { expected, got } =>
                write!(f, "crc mismatch (got {got:#010x}, expected {expected:#010x})"),
            Self::BadSeq { expected, got } =>
                write!(f, "bad transport seq_no {got} (expected {expected})"),
            Self::Status { code } => write!(f, "transport error {code}"),
        }
    }
}

/// The transport variants a connection can use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransportKind {
    #[default]
    Abridged,
    Intermediate,
    Full,
}

impl TransportKind {
    /// A fresh codec of this kind.
    pub fn framing(self) -> Box<dyn Framing> {
        match self {
            Self::Abridged     => Box::new(Abridged),
            Self::Intermediate => Box::new(Intermediate),
            Self::Full         => Box::new(Full::default()),
        }
    }
}

/// A decoded packet and how many bytes of the input it used.
#[derive(Debug, PartialEq)]
pub struct Unpacked {
    pub consumed: usize,
    pub payload: Vec<u8>,
}

/// Packet framing over a byte stream.
pub trait Framing: Send {
    /// Bytes written once when the connection opens.
    fn init_bytes(&self) -> &'static [u8];

    /// The 4-byte protocol tag for the obfuscated header.
    fn obfuscation_tag(&self) -> [u8; 4];

    /// Append one framed packet to `out`.
    fn pack(&mut self, payload: &[u8], out: &mut Vec<u8>);

    /// Decode the packet at the start of `buf`. `Ok(None)` asks for more bytes.
    fn unpack(&mut self, buf: &[u8]) -> Result<Option<Unpacked>, TransportError>;
}

fn check_payload(payload: Vec<u8>) -> Result<Vec<u8>, TransportError> {
    if payload.len() == 4 {
        let code = i32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        if code < 0 {
            return Err(TransportError::Status { code });
        }
    }
    Ok(payload)
}

// ─── Abridged ─────────────────────────────────────────────────────────────────

/// [MTProto Abridged] framing: the length in 4-byte words, one byte when
/// short, `0x7f` plus three bytes otherwise.
///
/// [MTProto Abridged]: https://core.telegram.org/mtproto/mtproto-transports#abridged
#[derive(Clone, Copy, Debug, Default)]
pub struct Abridged;

impl Framing for Abridged {
    fn init_bytes(&self) -> &'static [u8] { &[0xef] }

    fn obfuscation_tag(&self) -> [u8; 4] { [0xef; 4] }

    fn pack(&mut self, payload: &[u8], out: &mut Vec<u8>) {
        let words = payload.len() / 4;
        if words < 0x7f {
            out.push(words as u8);
        } else {
            out.push(0x7f);
            out.extend_from_slice(&(words as u32).to_le_bytes()[..3]);
        }
        out.extend_from_slice(payload);
    }

    fn unpack(&mut self, buf: &[u8]) -> Result<Option<Unpacked>, TransportError> {
        let Some(&first) = buf.first() else { return Ok(None) };
        let (header, words) = if first < 0x7f {
            (1, first as usize)
        } else {
            if buf.len() < 4 {
                return Ok(None);
            }
            (4, u32::from_le_bytes([buf[1], buf[2], buf[3], 0]) as usize)
        };
        let len = words * 4;
        if len > MAX_MESSAGE_LENGTH {
            return Err(TransportError::BadLength { len });
        }
        if buf.len() < header + len {
            return Ok(None);
        }
        let payload = check_payload(buf[header..header + len].to_vec())?;
        Ok(Some(Unpacked { consumed: header + len, payload }))
    }
}

// ─── Intermediate ─────────────────────────────────────────────────────────────

/// [MTProto Intermediate] framing: each packet is prefixed with its 4-byte
/// little-endian byte length.
///
/// [MTProto Intermediate]: https://core.telegram.org/mtproto/mtproto-transports#intermediate
#[derive(Clone, Copy, Debug, Default)]
pub struct Intermediate;

impl Framing for Intermediate {
    fn init_bytes(&self) -> &'static [u8] { &[0xee; 4] }

    fn obfuscation_tag(&self) -> [u8; 4] { [0xee; 4] }

    fn pack(&mut self, payload: &[u8], out: &mut Vec<u8>) {
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
    }

    fn unpack(&mut self, buf: &[u8]) -> Result<Option<Unpacked>, TransportError> {
        if buf.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if len > MAX_MESSAGE_LENGTH {
            return Err(TransportError::BadLength { len });
        }
        if buf.len() < 4 + len {
            return Ok(None);
        }
        let payload = check_payload(buf[4..4 + len].to_vec())?;
        Ok(Some(Unpacked { consumed: 4 + len, payload }))
    }
}

// ─── Full ─────────────────────────────────────────────────────────────────────

/// [MTProto Full] framing: total length, a per-direction sequence number,
/// the payload and a CRC-32 over everything before it.
///
/// [MTProto Full]: https://core.telegram.org/mtproto/mtproto-transports#full
#[derive(Clone, Copy, Debug, Default)]
pub struct Full {
    send_seq: u32,
    recv_seq: u32,
}

impl Framing for Full {
    fn init_bytes(&self) -> &'static [u8] { &[] }

    // Full framing cannot be obfuscated; the tag of intermediate is used
    // by servers that accept it anyway.
    fn obfuscation_tag(&self) -> [u8; 4] { [0xee; 4] }

    fn pack(&mut self, payload: &[u8], out: &mut Vec<u8>) {
        let start = out.len();
        let total = (payload.len() + 12) as u32;
        out.extend_from_slice(&total.to_le_bytes());
        out.extend_from_slice(&self.send_seq.to_le_bytes());
        out.extend_from_slice(payload);
        let crc = crc32(&out[start..]);
        out.extend_from_slice(&crc.to_le_bytes());
        self.send_seq = self.send_seq.wrapping_add(1);
    }

    fn unpack(&mut self, buf: &[u8]) -> Result<Option<Unpacked>, TransportError> {
        if buf.len() < 4 {
            return Ok(None);
        }
        let total = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if total < 12 || total > MAX_MESSAGE_LENGTH + 12 {
            return Err(TransportError::BadLength { len: total });
        }
        if buf.len() < total {
            return Ok(None);
        }
        let crc_at = total - 4;
        let got = u32::from_le_bytes([buf[crc_at], buf[crc_at + 1], buf[crc_at + 2], buf[crc_at + 3]]);
        let expected = crc32(&buf[..crc_at]);
        if got != expected {
            return Err(TransportError::BadCrc { expected, got });
        }
        let seq = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        if seq != self.recv_seq {
            return Err(TransportError::BadSeq { expected: self.recv_seq, got: seq });
        }
        self.recv_seq = self.recv_seq.wrapping_add(1);
        let payload = check_payload(buf[8..crc_at].to_vec())?;
        Ok(Some(Unpacked { consumed: total, payload }))
    }
}

// ─── CRC-32 (IEEE 802.3) ─────────────────────────────────────────────────────

fn crc32(data: &[u8]) -> u32 {
    const POLY: u32 = 0xedb8_8320;
    let mut crc = !0u32;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (POLY & mask);
        }
    }
    !crc
}
