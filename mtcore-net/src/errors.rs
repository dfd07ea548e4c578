//! Error types for mtcore-net.

use std::{fmt, io};

use mtcore_mtproto::EnvelopeError;
use mtcore_mtproto::authentication;
use mtcore_mtproto::transport::TransportError;
use mtcore_tl::types;

// ─── RpcError ─────────────────────────────────────────────────────────────────

/// An error returned by the server in response to an RPC call.
///
/// Numeric values are stripped from the name and placed in [`RpcError::value`].
///
/// # Example
/// `FLOOD_WAIT_30` → `RpcError { code: 420, name: "FLOOD_WAIT", value: Some(30) }`
#[derive(Clone, Debug, PartialEq)]
pub struct RpcError {
    /// HTTP-like status code.
    pub code: i32,
    /// Error name in SCREAMING_SNAKE_CASE with the numeric suffix removed.
    pub name: String,
    /// Numeric suffix extracted from the name, if any.
    pub value: Option<u32>,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rpc error {}: {}", self.code, self.name)?;
        if let Some(v) = self.value {
            write!(f, " ({v})")?;
        }
        Ok(())
    }
}

impl std::error::Error for RpcError {}

impl RpcError {
    /// Parse a raw error message like `"FLOOD_WAIT_30"`.
    pub fn from_telegram(code: i32, message: &str) -> Self {
        if let Some((name, suffix)) = message.rsplit_once('_') {
            let numeric = !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit());
            if let (true, Ok(value)) = (numeric, suffix.parse::<u32>()) {
                return Self { code, name: name.to_string(), value: Some(value) };
            }
        }
        Self { code, name: message.to_string(), value: None }
    }

    /// Match on the name, with an optional `'*'` at either end.
    ///
    /// - `err.is("FLOOD_WAIT")` matches exactly
    /// - `err.is("AUTH_KEY_*")` matches by prefix
    /// - `err.is("*_INVALID")` matches by suffix
    pub fn is(&self, pattern: &str) -> bool {
        if let Some(prefix) = pattern.strip_suffix('*') {
            self.name.starts_with(prefix)
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            self.name.ends_with(suffix)
        } else {
            self.name == pattern
        }
    }

    /// Seconds to wait, if this is a `FLOOD_WAIT_X`.
    pub fn flood_wait_seconds(&self) -> Option<u64> {
        if self.code == 420 && self.name == "FLOOD_WAIT" {
            self.value.map(u64::from)
        } else {
            None
        }
    }
}

impl From<types::RpcError> for RpcError {
    fn from(e: types::RpcError) -> Self {
        Self::from_telegram(e.error_code, &e.error_message)
    }
}

// ─── InvocationError ──────────────────────────────────────────────────────────

/// Everything a call through a [`Session`](crate::Session) can fail with.
#[derive(Debug)]
pub enum InvocationError {
    /// The server rejected the request.
    Rpc(RpcError),
    /// Socket failure.
    Io(io::Error),
    /// The response did not deserialize.
    Deserialize(String),
    /// The connection went away before an answer arrived (shutdown).
    Dropped,
    /// No answer within the configured time.
    Timeout,
    /// Bad framing or a transport status code from the server.
    Transport(TransportError),
    /// An encrypted frame failed validation.
    Envelope(EnvelopeError),
    /// Key exchange failed.
    Auth(authentication::Error),
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rpc(e)         => write!(f, "{e}"),
            Self::Io(e)          => write!(f, "I/O error: {e}"),
            Self::Deserialize(s) => write!(f, "deserialize error: {s}"),
            Self::Dropped        => write!(f, "request dropped"),
            Self::Timeout        => write!(f, "request timed out"),
            Self::Transport(e)   => write!(f, "transport: {e}"),
            Self::Envelope(e)    => write!(f, "envelope: {e}"),
            Self::Auth(e)        => write!(f, "key exchange: {e}"),
        }
    }
}

impl std::error::Error for InvocationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Rpc(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Transport(e) => Some(e),
            Self::Envelope(e) => Some(e),
            Self::Auth(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for InvocationError {
    fn from(e: io::Error) -> Self { Self::Io(e) }
}

impl From<mtcore_tl::deserialize::Error> for InvocationError {
    fn from(e: mtcore_tl::deserialize::Error) -> Self { Self::Deserialize(e.to_string()) }
}

impl From<RpcError> for InvocationError {
    fn from(e: RpcError) -> Self { Self::Rpc(e) }
}

impl From<TransportError> for InvocationError {
    fn from(e: TransportError) -> Self { Self::Transport(e) }
}

impl From<EnvelopeError> for InvocationError {
    fn from(e: EnvelopeError) -> Self { Self::Envelope(e) }
}

impl From<authentication::Error> for InvocationError {
    fn from(e: authentication::Error) -> Self { Self::Auth(e) }
}

impl InvocationError {
    /// Returns `true` if this is the named RPC error (supports `'*'` wildcards).
    pub fn is(&self, pattern: &str) -> bool {
        match self {
            Self::Rpc(e) => e.is(pattern),
            _            => false,
        }
    }

    /// If this is a FLOOD_WAIT error, returns how many seconds to wait.
    pub fn flood_wait_seconds(&self) -> Option<u64> {
        match self {
            Self::Rpc(e) => e.flood_wait_seconds(),
            _            => None,
        }
    }

    /// Failures of the link rather than of the request itself.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Timeout | Self::Transport(_) | Self::Envelope(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_suffix_is_split_off() {
        let e = RpcError::from_telegram(420, "FLOOD_WAIT_30");
        assert_eq!(e.name, "FLOOD_WAIT");
        assert_eq!(e.value, Some(30));
        assert_eq!(e.flood_wait_seconds(), Some(30));
    }

    #[test]
    fn names_without_digits_stay_whole() {
        let e = RpcError::from_telegram(500, "PROTOCOL_ERROR");
        assert_eq!(e.name, "PROTOCOL_ERROR");
        assert_eq!(e.value, None);
        assert_eq!(e.flood_wait_seconds(), None);

        let e = RpcError::from_telegram(400, "TRAILING_");
        assert_eq!(e.name, "TRAILING_");
    }

    #[test]
    fn wildcards() {
        let e = RpcError::from_telegram(401, "AUTH_KEY_UNREGISTERED");
        assert!(e.is("AUTH_KEY_*"));
        assert!(e.is("*_UNREGISTERED"));
        assert!(!e.is("AUTH_KEY"));
        assert!(InvocationError::Rpc(e).is("AUTH_KEY_UNREGISTERED"));
    }
}
