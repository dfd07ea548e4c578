//! Protocol limits and timings.

use std::time::Duration;

/// Largest decrypted payload we agree to handle.
pub const MAX_MESSAGE_LENGTH: usize = 16 * 1024 * 1024;

/// Smallest encrypted frame: key id, msg_key and a minimal payload.
pub const MIN_ENCRYPTED_FRAME: usize = 24 + 32;

/// Start a new container once the queued bodies reach this size.
pub const CUT_CONTAINER_ON_SIZE: usize = 16 * 1024;

/// How many received / acknowledged ids are remembered.
pub const IDS_BUFFER_SIZE: usize = 400;

/// `disconnect_delay` announced with every keep-alive ping, in seconds.
pub const PING_DELAY_DISCONNECT: i32 = 75;

/// Ping when nothing was received for this long.
pub const PING_SEND_AFTER: Duration = Duration::from_secs(30);

/// Ping unconditionally after this long.
pub const PING_SEND_AFTER_FORCE: Duration = Duration::from_secs(45);

pub const MIN_RECEIVE_TIMEOUT: Duration = Duration::from_secs(4);
pub const MAX_RECEIVE_TIMEOUT: Duration = Duration::from_secs(64);

/// A connection silent for this long is considered stale.
pub const MARK_CONNECTION_OLD_TIMEOUT: Duration = Duration::from_secs(192);

/// Ask for the state of requests unanswered for this long.
pub const CHECK_SENT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay before flushing a state request, to batch more ids into it.
pub const SEND_STATE_REQUEST_WAITING: Duration = Duration::from_secs(1);

/// Pending acknowledgements are flushed within this delay.
pub const ACK_SEND_WAITING: Duration = Duration::from_secs(10);

/// Sent containers are forgotten after this many seconds.
pub const CONTAINER_LIVES: i32 = 600;

/// Server time may run ahead of ours by this much before it counts as bad.
pub const BAD_TIME_AHEAD: i32 = 60;

/// Server time may lag ours by this much before it counts as bad.
pub const BAD_TIME_BEHIND: i32 = 300;

/// Padding bounds for the SHA-256 scheme.
pub const MIN_PADDING_V2: usize = 12;
pub const MAX_PADDING_V2: usize = 1024;

/// Upper padding bound for the SHA-1 scheme.
pub const MAX_PADDING_V1: usize = 15;

/// `dh_gen_retry` answers tolerated before the handshake gives up.
pub const MAX_DH_RETRIES: u32 = 5;
