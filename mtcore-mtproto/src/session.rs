//! Per-session message numbering: the msg_id clock and the seq_no counter.

use std::time::{SystemTime, UNIX_EPOCH};

use mtcore_tl::RemoteCall;

use crate::message::{MessageId, PlainMessage};

/// Tracks the identity and numbering of one MTProto session.
///
/// Message ids are built from the local clock corrected by the server time
/// offset; they strictly increase, with a `+4` tie-break when the clock has
/// not moved. Sequence numbers are `2n + 1` for content-related messages
/// (which also bump `n`) and `2n` for everything else.
///
/// # Example
///
/// ```rust
/// use mtcore_mtproto::Session;
///
/// let mut session = Session::new();
/// let a = session.next_msg_id();
/// let b = session.next_msg_id();
/// assert!(b > a);
/// assert_eq!(session.next_seq_no(true), 1);
/// assert_eq!(session.next_seq_no(false), 2);
/// ```
#[derive(Debug)]
pub struct Session {
    id: i64,
    time_offset: i32,
    last_msg_id: i64,
    sequence: i32,
}

impl Session {
    /// A fresh session with a random id.
    pub fn new() -> Self {
        Self::with_id(random_session_id())
    }

    pub fn with_id(id: i64) -> Self {
        Self { id, time_offset: 0, last_msg_id: 0, sequence: 0 }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    /// Seconds to add to the local clock to get server time.
    pub fn time_offset(&self) -> i32 {
        self.time_offset
    }

    pub fn set_time_offset(&mut self, offset: i32) {
        self.time_offset = offset;
    }

    /// Current server time as far as we know.
    pub fn server_now(&self) -> i32 {
        local_unixtime().wrapping_add(self.time_offset)
    }

    /// Re-base the clock on a time reported by the server.
    ///
    /// With `force` the id sequence is allowed to restart below the last
    /// issued id; this is what a "msg_id too high" notification requires.
    pub fn correct_time(&mut self, server_time: i32, force: bool) {
        let offset = server_time.wrapping_sub(local_unixtime());
        if offset != self.time_offset {
            log::debug!("[session] time offset {} -> {offset}", self.time_offset);
        }
        self.time_offset = offset;
        if force {
            self.last_msg_id = 0;
        }
    }

    /// Allocate a new message id.
    pub fn next_msg_id(&mut self) -> MessageId {
        self.msg_id_at(SystemTime::now())
    }

    /// Allocate a message id as if the local clock read `now`.
    pub fn msg_id_at(&mut self, now: SystemTime) -> MessageId {
        let mut id = MessageId::at(now, self.time_offset).0;
        if id <= self.last_msg_id {
            id = self.last_msg_id + 4;
        }
        self.last_msg_id = id;
        MessageId(id)
    }

    /// Sequence number for the next message.
    pub fn next_seq_no(&mut self, content_related: bool) -> i32 {
        if content_related {
            let n = self.sequence * 2 + 1;
            self.sequence += 1;
            n
        } else {
            self.sequence * 2
        }
    }

    /// Start over with a new id; numbering restarts from zero.
    pub fn reset(&mut self) {
        self.id = random_session_id();
        self.sequence = 0;
    }

    /// Serialize an RPC function into a plaintext [`PlainMessage`].
    ///
    /// Used only for the key exchange; the caller applies transport framing
    /// to [`PlainMessage::to_plaintext_bytes`].
    pub fn pack_plain<R: RemoteCall>(&mut self, call: &R) -> PlainMessage {
        let id = self.next_msg_id();
        PlainMessage::new(id, call.to_bytes())
    }
}

impl Default for Session {
    fn default() -> Self { Self::new() }
}

fn random_session_id() -> i64 {
    let mut rnd = [0u8; 8];
    mtcore_crypto::random_fill(&mut rnd);
    i64::from_le_bytes(rnd)
}

pub(crate) fn local_unixtime() -> i32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i32)
        .unwrap_or(0)
}
