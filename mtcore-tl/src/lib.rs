//! TL binary serialization and the MTProto service schema.
//!
//! Only the constructors the transport core itself speaks are defined here:
//! the key exchange, service messages (acks, notifications, state queries,
//! containers), `help.getConfig` and the DC option types it returns. Anything
//! else travels as opaque bytes.
//!
//! | Module        | Contents                                                   |
//! |---------------|------------------------------------------------------------|
//! | [`types`]     | Concrete constructors (bare types) as `struct`s            |
//! | [`functions`] | RPC functions as `struct`s implementing [`RemoteCall`]     |
//! | [`enums`]     | Boxed types as `enum`s implementing [`Deserializable`]     |
//!
//! ```rust
//! use mtcore_tl::{functions, Serializable};
//!
//! let req = functions::ReqPqMulti { nonce: [7; 16] };
//! let bytes = req.to_bytes();
//! assert_eq!(&bytes[..4], &0xbe7e8ef1u32.to_le_bytes());
//! assert_eq!(bytes.len(), 20);
//! ```

#![deny(unsafe_code)]
#![allow(clippy::large_enum_variant)]

pub mod deserialize;
pub mod enums;
pub mod functions;
pub mod serialize;
pub mod types;

pub use deserialize::{Cursor, Deserializable};
pub use serialize::Serializable;

/// API layer announced through `invokeWithLayer`.
pub const LAYER: i32 = 224;

/// Bare vector: `vector` (lowercase) as opposed to the boxed `Vector`.
///
/// A count followed by the items, without the `0x1cb5c415` header.
#[derive(Clone, Debug, PartialEq)]
pub struct RawVec<T>(pub Vec<T>);

/// Opaque bytes passed through without interpretation.
///
/// Serializing writes the bytes verbatim (no length prefix); deserializing
/// consumes everything left in the cursor. Used for generic `X` results and
/// for the payload of `rpc_result`.
#[derive(Clone, Debug, PartialEq)]
pub struct Blob(pub Vec<u8>);

impl From<Vec<u8>> for Blob {
    fn from(v: Vec<u8>) -> Self { Self(v) }
}

/// A bare constructor wrapped with its constructor id.
///
/// `Boxed(types::MsgsAck { .. })` serializes as `msgs_ack#62d6b459 ...` and
/// deserialization rejects any other id.
#[derive(Clone, Debug, PartialEq)]
pub struct Boxed<T>(pub T);

// ─── Core traits ──────────────────────────────────────────────────────────────

/// Every schema type has a unique 32-bit constructor ID.
pub trait Identifiable {
    /// The constructor ID as listed in the TL schema.
    const CONSTRUCTOR_ID: u32;
}

/// Marks a function type that can be sent to the server as an RPC call.
///
/// `Return` is the type the server responds with.
pub trait RemoteCall: Serializable {
    /// The deserialized response type.
    type Return: Deserializable;
}

impl<T: Identifiable + Serializable> Serializable for Boxed<T> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        T::CONSTRUCTOR_ID.serialize(buf);
        self.0.serialize(buf);
    }
}

impl<T: Identifiable + Deserializable> Deserializable for Boxed<T> {
    fn deserialize(buf: deserialize::Buffer) -> deserialize::Result<Self> {
        let id = u32::deserialize(buf)?;
        if id != T::CONSTRUCTOR_ID {
            return Err(deserialize::Error::UnexpectedConstructor { id });
        }
        Ok(Boxed(T::deserialize(buf)?))
    }
}

/// Peek at the constructor id at the start of `body` without consuming it.
pub fn constructor_id(body: &[u8]) -> Option<u32> {
    body.get(..4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Human-readable name of a service constructor, for logging.
#[cfg(feature = "name-for-id")]
pub fn name_for_id(id: u32) -> Option<&'static str> {
    Some(match id {
        0x05162463 => "resPQ",
        0x79cb045d => "server_DH_params_fail",
        0xd0e8075c => "server_DH_params_ok",
        0x3bcbf734 => "dh_gen_ok",
        0x46dc1fb9 => "dh_gen_retry",
        0xa69dae02 => "dh_gen_fail",
        0x62d6b459 => "msgs_ack",
        0xa7eff811 => "bad_msg_notification",
        0xedab447b => "bad_server_salt",
        0xda69fb52 => "msgs_state_req",
        0x04deb57d => "msgs_state_info",
        0x8cc0d131 => "msgs_all_info",
        0x276d3ec6 => "msg_detailed_info",
        0x809db6df => "msg_new_detailed_info",
        0x7d861a08 => "msg_resend_req",
        0xf35c6d01 => "rpc_result",
        0x2144ca19 => "rpc_error",
        0x9ec20908 => "new_session_created",
        0x73f1f8dc => "msg_container",
        0x3072cfa1 => "gzip_packed",
        0x347773c5 => "pong",
        0x7abe77ec => "ping",
        0xf3427b8c => "ping_delay_disconnect",
        0xf660e1d4 => "destroy_auth_key_ok",
        0x0a9f2259 => "destroy_auth_key_none",
        0xea109b13 => "destroy_auth_key_fail",
        0xcc1a241e => "config",
        0x74ae4240 => "updates",
        0x78d4dec1 => "updateShort",
        0x725b04c3 => "updatesCombined",
        0x313bc7f8 => "updateShortMessage",
        0x4d6deea5 => "updateShortChatMessage",
        0xe317af7e => "updatesTooLong",
        _ => return None,
    })
}
