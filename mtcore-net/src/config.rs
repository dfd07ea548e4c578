//! Connection settings.

use std::time::Duration;

use mtcore_crypto::Scheme;
use mtcore_mtproto::transport::TransportKind;
use mtcore_tl::{LAYER, RemoteCall, functions};

/// Which TCP transport to speak, optionally wrapped in obfuscation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TransportMode {
    #[default]
    Abridged,
    Intermediate,
    Full,
    /// Obfuscated2 around abridged framing; `secret` is the proxy secret.
    Obfuscated { secret: Option<[u8; 16]> },
}

impl TransportMode {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Abridged | Self::Obfuscated { .. } => TransportKind::Abridged,
            Self::Intermediate => TransportKind::Intermediate,
            Self::Full => TransportKind::Full,
        }
    }
}

/// Everything a session needs to know besides the DC it talks to.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    pub test_mode:        bool,
    /// Also use IPv6 endpoints, ahead of the IPv4 ones.
    pub use_ipv6:         bool,
    /// Connecting through a proxy; only static endpoints are used.
    pub through_proxy:    bool,
    pub transport:        TransportMode,
    pub scheme:           Scheme,
    pub api_id:           i32,
    pub device_model:     String,
    pub system_version:   String,
    pub app_version:      String,
    pub system_lang_code: String,
    pub lang_pack:        String,
    pub lang_code:        String,
    pub connect_timeout:  Duration,
    /// `None` waits for an answer indefinitely.
    pub request_timeout:  Option<Duration>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            test_mode:        false,
            use_ipv6:         false,
            through_proxy:    false,
            transport:        TransportMode::default(),
            scheme:           Scheme::default(),
            api_id:           0,
            device_model:     "mtcore".into(),
            system_version:   std::env::consts::OS.into(),
            app_version:      env!("CARGO_PKG_VERSION").into(),
            system_lang_code: "en".into(),
            lang_pack:        String::new(),
            lang_code:        "en".into(),
            connect_timeout:  crate::consts::CONNECT_TIMEOUT,
            request_timeout:  Some(Duration::from_secs(60)),
        }
    }
}

impl ConnectionConfig {
    /// Wrap the first call of a connection in
    /// `invokeWithLayer(initConnection(...))`.
    pub fn wrap_init<R: RemoteCall>(&self, query: R) -> functions::InvokeWithLayer<functions::InitConnection<R>> {
        functions::InvokeWithLayer {
            layer: LAYER,
            query: functions::InitConnection {
                api_id:           self.api_id,
                device_model:     self.device_model.clone(),
                system_version:   self.system_version.clone(),
                app_version:      self.app_version.clone(),
                system_lang_code: self.system_lang_code.clone(),
                lang_pack:        self.lang_pack.clone(),
                lang_code:        self.lang_code.clone(),
                query,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtcore_tl::Serializable;

    #[test]
    fn init_wrapper_layout() {
        let config = ConnectionConfig { api_id: 7, ..Default::default() };
        let bytes = config.wrap_init(functions::help::GetConfig {}).to_bytes();
        assert_eq!(&bytes[..4], &0xda9b0d0du32.to_le_bytes());
        assert_eq!(&bytes[4..8], &LAYER.to_le_bytes());
        assert_eq!(&bytes[8..12], &0xc1cd5ea9u32.to_le_bytes());
        // flags, then api_id
        assert_eq!(&bytes[12..16], &0u32.to_le_bytes());
        assert_eq!(&bytes[16..20], &7i32.to_le_bytes());
        assert_eq!(&bytes[bytes.len() - 4..], &0xc4f9186bu32.to_le_bytes());
    }
}
