//! Fallback DC discovery through a signed "simple config" blob.
//!
//! When no DC answers `help.getConfig`, two HTTPS lookups fetch the blob: a
//! domain-fronted request and a DNS-over-HTTPS TXT lookup. The blob is
//! RSA-signed with a fixed key and AES-CBC encrypted; it lists a few
//! `ip:port` pairs for one DC.

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use mtcore_crypto::{aes, rsa, sha256};
use mtcore_tl::{Cursor, Deserializable, enums, types};
use serde::Deserialize;
use tokio::task::JoinHandle;

const BLOB_SIZE: usize = 256;
const PLAIN_SIZE: usize = 208;
const HASH_SIZE: usize = 16;
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

const FRONTED_HOST: &str = "dns-telegram.appspot.com";
const DNS_HOST: &str = "dns.google.com";

const SIMPLE_CONFIG_KEY: &str = "-----BEGIN RSA PUBLIC KEY-----
MIIBCgKCAQEAyr+18Rex2ohtVy8sroGPBwXD3DOoKCSpjDqYoXgCqB7ioln4eDCF
fOBUlfXUEvM/fnKCpF46VkAftlb4VuPDeQSS/ZxZYEGqHaywlroVnXHIjgqoxiAd
192xRGreuXIaUKmkwlM9JID9WS2jUsTpzQ91L8MEPLJ/4zrBwZua8W5fECwCCh2c
9G5IzzBm+otMS/YKwmR1olzRCyEkyAEjXWqBI9Ftv5eG8m0VkBzOG655WIYdyV0H
fDK/NWcvGqa0w/nriMD6mDjKOryamw0OP9QuYgMN0C9xMW9y8SmP4h92OAWodTYg
Y1hZCxdv6cs5UnW9+PWvS+WIbkh+GaWYxwIDAQAB
-----END RSA PUBLIC KEY-----";

/// The key simple-config blobs are signed with.
pub fn simple_config_key() -> Result<rsa::Key, rsa::KeyError> {
    rsa::Key::from_pem(SIMPLE_CONFIG_KEY)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SimpleConfigError {
    /// Not 256 bytes of base64 after stripping.
    BadSize { len: usize },
    /// The RSA step did not yield a block.
    Rsa,
    BadHash,
    /// The declared length is out of range or unaligned.
    BadLength { length: i32 },
    /// The payload is not a `help.configSimple`.
    Parse,
    /// `now` is outside `[date, expires]`.
    Expired { date: i32, expires: i32, now: i32 },
}

impl fmt::Display for SimpleConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadSize { len } => write!(f, "simple config of {len} bytes"),
            Self::Rsa => write!(f, "simple config failed RSA decryption"),
            Self::BadHash => write!(f, "simple config hash mismatch"),
            Self::BadLength { length } => write!(f, "simple config length {length}"),
            Self::Parse => write!(f, "simple config did not parse"),
            Self::Expired { date, expires, now } => {
                write!(f, "simple config valid {date}..{expires}, now {now}")
            }
        }
    }
}

impl std::error::Error for SimpleConfigError {}

/// Open a simple-config blob.
///
/// Non-base64 characters are dropped first, so TXT records and HTML
/// wrappers can be passed as they come.
pub fn decrypt_simple_config(
    text: &str,
    key: &rsa::Key,
    now: i32,
) -> Result<types::help::ConfigSimple, SimpleConfigError> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
        .collect();
    let blob = STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|_| SimpleConfigError::BadSize { len: cleaned.len() * 3 / 4 })?;
    if blob.len() != BLOB_SIZE {
        return Err(SimpleConfigError::BadSize { len: blob.len() });
    }

    let decrypted = key.decrypt_public(&blob).ok_or(SimpleConfigError::Rsa)?;
    let mut aes_key = [0u8; 32];
    aes_key.copy_from_slice(&decrypted[..32]);
    let mut aes_iv = [0u8; 16];
    aes_iv.copy_from_slice(&decrypted[16..32]);
    let mut data = decrypted[32..].to_vec();
    aes::cbc_decrypt(&mut data, &aes_key, &aes_iv);

    let hash = sha256!(&data[..PLAIN_SIZE]);
    if hash[..HASH_SIZE] != data[PLAIN_SIZE..PLAIN_SIZE + HASH_SIZE] {
        return Err(SimpleConfigError::BadHash);
    }

    let length = i32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    if length <= 0 || length as usize > PLAIN_SIZE - 4 || length % 4 != 0 {
        return Err(SimpleConfigError::BadLength { length });
    }
    let payload = &data[4..4 + length as usize];
    let mut cursor = Cursor::from_slice(payload);
    let enums::help::ConfigSimple::ConfigSimple(config) =
        enums::help::ConfigSimple::deserialize(&mut cursor).map_err(|_| SimpleConfigError::Parse)?;
    if cursor.pos() != payload.len() {
        return Err(SimpleConfigError::Parse);
    }

    if now < config.date || now > config.expires {
        return Err(SimpleConfigError::Expired { date: config.date, expires: config.expires, now });
    }
    Ok(config)
}

/// `ip_port_list` as dotted addresses.
pub fn endpoints(config: &types::help::ConfigSimple) -> Vec<(i32, String, i32)> {
    config
        .ip_port_list
        .iter()
        .map(|p| (config.dc_id, Ipv4Addr::from(p.ipv4 as u32).to_string(), p.port))
        .collect()
}

#[derive(Deserialize)]
struct DnsResponse {
    #[serde(rename = "Answer", default)]
    answer: Vec<DnsAnswer>,
}

#[derive(Deserialize)]
struct DnsAnswer {
    data: String,
}

/// Join the TXT strings of a DNS-over-HTTPS JSON answer, longest first.
pub fn parse_dns_response(json: &str) -> Result<String, serde_json::Error> {
    let response: DnsResponse = serde_json::from_str(json)?;
    let mut parts: Vec<String> = response
        .answer
        .into_iter()
        .map(|a| a.data.replace('"', ""))
        .collect();
    parts.sort_by(|a, b| b.len().cmp(&a.len()));
    Ok(parts.concat())
}

type Callback = Arc<dyn Fn(i32, &str, i32) + Send + Sync>;

/// The two lookups running in the background. Dropping it stops them.
pub struct SpecialConfigRequest {
    task: JoinHandle<()>,
}

impl SpecialConfigRequest {
    /// Start both lookups. `callback(dc_id, ip, port)` runs for every
    /// endpoint of every blob that checks out.
    pub fn start<F>(test_mode: bool, key: rsa::Key, callback: F) -> Self
    where
        F: Fn(i32, &str, i32) + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(callback);
        let task = tokio::spawn(async move {
            let client = match reqwest::Client::builder().timeout(FETCH_TIMEOUT).build() {
                Ok(client) => client,
                Err(e) => {
                    tracing::warn!("[special_config] no HTTP client: {e}");
                    return;
                }
            };
            let fronted = fetch_config(fronted_request(&client, test_mode), false, &key, &callback);
            let dns = fetch_config(dns_request(&client, test_mode), true, &key, &callback);
            tokio::join!(fronted, dns);
        });
        Self { task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SpecialConfigRequest {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn fronted_request(client: &reqwest::Client, test_mode: bool) -> reqwest::RequestBuilder {
    let url = if test_mode { "https://google.com/test/" } else { "https://google.com/" };
    client.get(url).header(reqwest::header::HOST, FRONTED_HOST)
}

fn dns_request(client: &reqwest::Client, test_mode: bool) -> reqwest::RequestBuilder {
    let name = if test_mode { "tap.stel.com" } else { "ap.stel.com" };
    client
        .get("https://google.com/resolve")
        .query(&[("name", name), ("type", "16")])
        .header(reqwest::header::HOST, DNS_HOST)
}

async fn fetch_config(
    request: reqwest::RequestBuilder,
    is_dns: bool,
    key: &rsa::Key,
    callback: &Callback,
) {
    let body = match request.send().await.and_then(|r| r.error_for_status()) {
        Ok(response) => match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!("[special_config] reading body failed: {e}");
                return;
            }
        },
        Err(e) => {
            tracing::debug!("[special_config] request failed: {e}");
            return;
        }
    };
    let text = if is_dns {
        match parse_dns_response(&body) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!("[special_config] bad DNS answer: {e}");
                return;
            }
        }
    } else {
        body
    };

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i32)
        .unwrap_or_default();
    match decrypt_simple_config(&text, key, now) {
        Ok(config) => {
            for (dc_id, ip, port) in endpoints(&config) {
                tracing::info!("[special_config] DC {dc_id} at {ip}:{port}");
                callback(dc_id, &ip, port);
            }
        }
        Err(e) => tracing::warn!("[special_config] rejected blob: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtcore_tl::Serializable;
    use num_bigint::BigUint;

    /// `e = 1`, so the public "decryption" is the identity.
    fn transparent_key() -> rsa::Key {
        let n = (BigUint::from(1u8) << 2047u32) + BigUint::from(0x1234_5679u32);
        rsa::Key::from_components(n, BigUint::from(1u8))
    }

    fn sample() -> types::help::ConfigSimple {
        types::help::ConfigSimple {
            date: 1_700_000_000,
            expires: 1_700_086_400,
            dc_id: 2,
            ip_port_list: vec![
                types::IpPort { ipv4: 0x0a00_0001, port: 443 },
                types::IpPort { ipv4: 0x7f00_0001u32 as i32, port: 5222 },
            ],
        }
    }

    fn seal(config: &types::help::ConfigSimple, tamper: bool) -> String {
        let body = enums::help::ConfigSimple::ConfigSimple(config.clone()).to_bytes();
        let mut data = vec![0u8; PLAIN_SIZE + HASH_SIZE];
        data[..4].copy_from_slice(&(body.len() as i32).to_le_bytes());
        data[4..4 + body.len()].copy_from_slice(&body);
        let hash = sha256!(&data[..PLAIN_SIZE]);
        data[PLAIN_SIZE..].copy_from_slice(&hash[..HASH_SIZE]);
        if tamper {
            data[10] ^= 1;
        }

        let mut block = vec![0u8; BLOB_SIZE];
        for (i, b) in block[1..32].iter_mut().enumerate() {
            *b = 0x30 + i as u8;
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&block[..32]);
        let mut iv = [0u8; 16];
        iv.copy_from_slice(&block[16..32]);
        aes::cbc_encrypt(&mut data, &key, &iv);
        block[32..].copy_from_slice(&data);
        STANDARD.encode(block)
    }

    #[test]
    fn opens_a_valid_blob() {
        let text = seal(&sample(), false);
        // wrappers around the base64 are ignored
        let wrapped = format!("<html>\n{}\n</html>", &text);
        let config = decrypt_simple_config(&wrapped, &transparent_key(), 1_700_000_100).unwrap();
        assert_eq!(config, sample());
        assert_eq!(
            endpoints(&config),
            vec![(2, "10.0.0.1".to_string(), 443), (2, "127.0.0.1".to_string(), 5222)]
        );
    }

    #[test]
    fn rejects_tampering_and_expiry() {
        let key = transparent_key();
        let tampered = seal(&sample(), true);
        assert_eq!(decrypt_simple_config(&tampered, &key, 1_700_000_100), Err(SimpleConfigError::BadHash));

        let text = seal(&sample(), false);
        assert!(matches!(
            decrypt_simple_config(&text, &key, 1_800_000_000),
            Err(SimpleConfigError::Expired { .. })
        ));
        assert!(matches!(
            decrypt_simple_config(&text[..100], &key, 1_700_000_100),
            Err(SimpleConfigError::BadSize { .. })
        ));
    }

    #[test]
    fn dns_txt_parts_join_longest_first() {
        let json = r#"{"Status":0,"Answer":[
            {"name":"ap.stel.com.","type":16,"data":"\"tail\""},
            {"name":"ap.stel.com.","type":16,"data":"\"headhead\""}
        ]}"#;
        assert_eq!(parse_dns_response(json).unwrap(), "headheadtail");
        assert_eq!(parse_dns_response(r#"{"Status":3}"#).unwrap(), "");
    }

    #[test]
    fn built_in_key_parses() {
        assert!(simple_config_key().is_ok());
    }
}
