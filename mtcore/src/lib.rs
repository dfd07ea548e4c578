//! # mtcore
//!
//! The transport and session half of an MTProto client, wired together
//! from four sub-crates:
//!
//! | Sub-crate        | Role                                                   |
//! |------------------|--------------------------------------------------------|
//! | `mtcore-tl`      | TL serialization and the service schema                |
//! | `mtcore-crypto`  | AES-IGE, SHA, RSA, factorization, `AuthKey`            |
//! | `mtcore-mtproto` | Sans-IO handshake, envelopes, framing and session state |
//! | `mtcore-net`     | Tokio runtime: sessions, DC table, config loading      |
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mtcore::{AccountContext, ConnectionConfig, DcType, Session};
//! use mtcore::tl::functions;
//!
//! # async fn run() -> Result<(), mtcore::InvocationError> {
//! let config = ConnectionConfig { test_mode: true, api_id: 12345, ..Default::default() };
//! let account = Arc::new(AccountContext::new(config));
//!
//! // The first connect negotiates an auth key for the DC.
//! let session = Session::connect(account.clone(), account.main_dc(), DcType::Regular);
//! let request = account.config().wrap_init(functions::help::GetConfig {});
//! let config = session.invoke(&request).await?;
//! session.shutdown().await;
//! # let _ = config;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Re-export of [`mtcore_tl`]: TL types, functions and enums.
pub use mtcore_tl as tl;

/// Re-export of [`mtcore_mtproto`]: handshake, envelopes, framing, session state.
pub use mtcore_mtproto as mtproto;

/// Re-export of [`mtcore_crypto`]: AES-IGE, SHA, RSA, factorize, AuthKey.
pub use mtcore_crypto as crypto;

/// Re-export of [`mtcore_net`]: the tokio connection runtime.
pub use mtcore_net as net;

// ─── Convenience re-exports ───────────────────────────────────────────────────

pub use mtcore_tl::{Deserializable, Identifiable, LAYER, RemoteCall, Serializable};

pub use mtcore_crypto::{AuthKey, AuthKeyKind, Scheme};
pub use mtcore_mtproto::{Event, HandleResult, Protocol, SessionData};
pub use mtcore_mtproto::authentication::{self, Finished};

pub use mtcore_net::{
    AccountContext, BinaryFileStore, ConfigLoader, ConnectionConfig, ConnectionState, DcOptions, DcType,
    InMemoryStore, InvocationError, KeyStore, PendingCall, RpcError, Session, TransportMode, refresh_config,
};
