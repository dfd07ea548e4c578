//! MTProto session core, without I/O.
//!
//! This crate handles:
//! * The auth key exchange ([`authentication`])
//! * The encrypted envelope in both schemes ([`encrypted`])
//! * Message numbering and received-id bookkeeping
//! * Containers, acks, resends and state queries ([`Protocol`])
//! * Service-message dispatch and rpc results
//! * Packet framing for the TCP transports ([`transport`])
//!
//! Sockets, timers and reconnects belong to the caller; `mtcore-net` is one.

#![deny(unsafe_code)]

pub mod authentication;
pub mod consts;
pub mod encrypted;
pub mod message;
pub mod received_ids;
pub mod service;
pub mod session;
pub mod session_data;
pub mod transport;

mod dispatcher;
mod outbound;
mod protocol;

pub use encrypted::{DecryptedMessage, EnvelopeError};
pub use message::{FrameError, MessageId, PlainMessage};
pub use protocol::{Event, HandleResult, Protocol};
pub use session::Session;
pub use session_data::{Request, RequestId, SessionData};
