//! # mtcore-net
//!
//! The async runtime around the sans-IO MTProto core.
//!
//! ## Features
//! - One tokio worker per connection, with backoff and automatic resend
//! - Key exchange on first connect; keys shared per DC through [`AccountContext`]
//! - Abridged, intermediate, full and obfuscated TCP transports
//! - DC endpoint table with priorities, persistence and an override file
//! - `help.getConfig` loading with DC enumeration and the simple-config fallback
//! - `FLOOD_WAIT` auto-retry with a configurable policy
//! - Pluggable key store

#![deny(unsafe_code)]

mod account;
mod config;
mod config_loader;
mod connection;
pub mod consts;
pub mod dc_options;
mod errors;
mod retry;
mod session;
pub mod special_config;
mod storage;
mod transport;
pub mod transport_obfuscated;

pub use account::{AccountContext, bare_dc_id};
pub use config::{ConnectionConfig, TransportMode};
pub use config_loader::{ConfigLoader, ConfigSource, next_enum_dc};
pub use connection::{ConnectionState, Connector, TcpConnector};
pub use dc_options::{DcOptions, DcOptionsError, DcType, Endpoint};
pub use errors::{InvocationError, RpcError};
pub use retry::{AutoSleep, Backoff, NoRetries, RetryContext, RetryPolicy};
pub use session::{DcConfigSource, PendingCall, Session, refresh_config};
pub use special_config::{SimpleConfigError, SpecialConfigRequest};
pub use storage::{BinaryFileStore, InMemoryStore, KeyStore, StoredKey, StoredState};
pub use transport::Transport;
