//! The table of data-center endpoints.
//!
//! Seeded from the built-in addresses, refreshed from `config` answers and
//! simple-config lookups, persisted with the key store and optionally pinned
//! by a local override file. Every change is announced per DC id on a
//! broadcast channel.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io;
use std::net::IpAddr;
use std::ops::BitOr;
use std::path::Path;

use mtcore_tl::enums;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::consts::{DC_SHIFT, TEMPORARY_MAIN_DC};

const SERIALIZE_VERSION: i32 = 1;
const MAX_IP_SIZE: i32 = 45;
const MAX_SECRET_SIZE: i32 = 32;
const CHANGE_CAPACITY: usize = 64;

// ─── Flags ────────────────────────────────────────────────────────────────────

/// `dcOption` flags, bit for bit as on the wire.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Flags(u32);

impl Flags {
    pub const IPV6: Self = Self(1 << 0);
    pub const MEDIA_ONLY: Self = Self(1 << 1);
    pub const TCPO_ONLY: Self = Self(1 << 2);
    pub const CDN: Self = Self(1 << 3);
    pub const STATIC: Self = Self(1 << 4);
    pub const THIS_PORT_ONLY: Self = Self(1 << 5);
    pub const SECRET: Self = Self(1 << 10);

    pub const fn empty() -> Self { Self(0) }

    pub const fn from_bits(bits: u32) -> Self { Self(bits) }

    pub const fn bits(self) -> u32 { self.0 }

    pub const fn contains(self, other: Self) -> bool { self.0 & other.0 == other.0 }

    pub const fn intersects(self, other: Self) -> bool { self.0 & other.0 != 0 }
}

impl BitOr for Flags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self { Self(self.0 | rhs.0) }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(Flags, &str); 7] = [
            (Flags::IPV6, "ipv6"),
            (Flags::MEDIA_ONLY, "media_only"),
            (Flags::TCPO_ONLY, "tcpo_only"),
            (Flags::CDN, "cdn"),
            (Flags::STATIC, "static"),
            (Flags::THIS_PORT_ONLY, "this_port_only"),
            (Flags::SECRET, "secret"),
        ];
        let set: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "Flags({})", set.join("|"))
    }
}

// ─── Endpoint / DcType / Variants ─────────────────────────────────────────────

/// One address of one DC.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub id: i32,
    pub flags: Flags,
    pub ip: String,
    pub port: i32,
    pub secret: Vec<u8>,
}

impl Endpoint {
    pub fn new(id: i32, flags: Flags, ip: impl Into<String>, port: i32) -> Self {
        Self { id, flags, ip: ip.into(), port, secret: Vec::new() }
    }

    /// `ip:port`, with brackets around IPv6 addresses.
    pub fn socket_addr(&self) -> String {
        if self.flags.contains(Flags::IPV6) {
            format!("[{}]:{}", self.ip, self.port)
        } else {
            format!("{}:{}", self.ip, self.port)
        }
    }

    fn from_tl(option: &enums::DcOption) -> Self {
        let enums::DcOption::DcOption(o) = option;
        let mut flags = Flags::empty();
        for (set, flag) in [
            (o.ipv6, Flags::IPV6),
            (o.media_only, Flags::MEDIA_ONLY),
            (o.tcpo_only, Flags::TCPO_ONLY),
            (o.cdn, Flags::CDN),
            (o.r#static, Flags::STATIC),
            (o.this_port_only, Flags::THIS_PORT_ONLY),
            (o.secret.is_some(), Flags::SECRET),
        ] {
            if set {
                flags = flags | flag;
            }
        }
        Self {
            id: o.id,
            flags,
            ip: o.ip_address.clone(),
            port: o.port,
            secret: o.secret.clone().unwrap_or_default(),
        }
    }
}

/// What a connection to a DC is used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DcType {
    Regular,
    /// Short-lived connections; never persisted or enumerated.
    Temporary,
    /// File downloads; may use media-only endpoints.
    MediaDownload,
    Cdn,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Address {
    IPv4 = 0,
    IPv6 = 1,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    Tcp = 0,
    Http = 1,
}

/// The endpoints [`DcOptions::lookup`] found, by address family and protocol.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Variants {
    pub data: [[Vec<Endpoint>; 2]; 2],
}

impl Variants {
    pub fn get(&self, address: Address, protocol: Protocol) -> &[Endpoint] {
        &self.data[address as usize][protocol as usize]
    }

    pub fn is_empty(&self) -> bool {
        self.data.iter().flatten().all(Vec::is_empty)
    }

    fn filter_if_has(&mut self, flag: Flags) {
        for list in self.data.iter_mut().flatten() {
            if list.iter().any(|e| e.flags.contains(flag)) {
                list.retain(|e| e.flags.contains(flag));
            }
        }
    }
}

// ─── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum DcOptionsError {
    Io(io::Error),
    /// The persisted blob ended early or holds out-of-range sizes.
    BadData,
    /// An override-file line that is not `dcId host port [tcpo_only] [media_only]`.
    BadLine { line: String },
    /// The override file has no endpoints.
    NoEndpoints,
}

impl fmt::Display for DcOptionsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::BadData => write!(f, "bad serialized dc options"),
            Self::BadLine { line } => {
                write!(f, "expected 'dcId host port [tcpo_only] [media_only]', got '{line}'")
            }
            Self::NoEndpoints => write!(f, "no endpoints in the override file"),
        }
    }
}

impl std::error::Error for DcOptionsError {}

impl From<io::Error> for DcOptionsError {
    fn from(e: io::Error) -> Self { Self::Io(e) }
}

// ─── Built-in table ───────────────────────────────────────────────────────────

const BUILT_IN: &[(i32, &str)] = &[
    (1, "149.154.175.50"),
    (2, "149.154.167.51"),
    (3, "149.154.175.100"),
    (4, "149.154.167.91"),
    (5, "149.154.171.5"),
];

const BUILT_IN_V6: &[(i32, &str)] = &[
    (1, "2001:0b28:f23d:f001:0000:0000:0000:000a"),
    (2, "2001:067c:04e8:f002:0000:0000:0000:000a"),
    (3, "2001:0b28:f23d:f003:0000:0000:0000:000a"),
    (4, "2001:067c:04e8:f004:0000:0000:0000:000a"),
    (5, "2001:0b28:f23f:f005:0000:0000:0000:000a"),
];

const BUILT_IN_TEST: &[(i32, &str)] = &[
    (1, "149.154.175.10"),
    (2, "149.154.167.40"),
    (3, "149.154.175.117"),
];

const BUILT_IN_TEST_V6: &[(i32, &str)] = &[
    (1, "2001:0b28:f23d:f001:0000:0000:0000:000e"),
    (2, "2001:067c:04e8:f002:0000:0000:0000:000e"),
    (3, "2001:0b28:f23d:f003:0000:0000:0000:000e"),
];

const BUILT_IN_PORT: i32 = 443;

/// Bare DC ids at or past [`TEMPORARY_MAIN_DC`] are temporary.
pub fn is_temporary_dc_id(dc_id: i32) -> bool {
    dc_id.rem_euclid(DC_SHIFT) >= TEMPORARY_MAIN_DC
}

/// Secrets the obfuscated transports understand.
pub fn validate_secret(secret: &[u8]) -> bool {
    (secret.len() >= 21 && secret[0] == 0xee)
        || (secret.len() == 17 && secret[0] == 0xdd)
        || secret.len() == 16
        || secret.is_empty()
}

// ─── DcOptions ────────────────────────────────────────────────────────────────

type Table = BTreeMap<i32, Vec<Endpoint>>;

#[derive(Default)]
struct Inner {
    data: Table,
    cdn_dc_ids: BTreeSet<i32>,
    immutable: bool,
}

impl Inner {
    /// Apply `endpoints` and return the DC ids whose addresses changed.
    fn merge(&mut self, endpoints: Vec<Endpoint>, overwrite: bool) -> Vec<i32> {
        let mut data = if overwrite { Table::new() } else { self.data.clone() };
        for endpoint in endpoints {
            apply_one(&mut data, endpoint);
        }
        let difference = count_options_difference(&self.data, &data);
        if !difference.is_empty() {
            self.data = data;
            self.compute_cdn_dc_ids();
        }
        difference
    }

    fn compute_cdn_dc_ids(&mut self) {
        self.cdn_dc_ids = self
            .data
            .iter()
            .filter(|(_, list)| list.first().is_some_and(|e| e.flags.contains(Flags::CDN)))
            .map(|(&id, _)| id)
            .collect();
    }
}

/// The endpoint table. Cheap to read concurrently; share it with `Arc`.
pub struct DcOptions {
    test_mode: bool,
    inner: RwLock<Inner>,
    changed: broadcast::Sender<i32>,
}

impl fmt::Debug for DcOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("DcOptions")
            .field("test_mode", &self.test_mode)
            .field("dcs", &inner.data.keys().collect::<Vec<_>>())
            .field("immutable", &inner.immutable)
            .finish()
    }
}

impl DcOptions {
    /// The built-in production or test table.
    pub fn new(test_mode: bool) -> Self {
        let options = Self::empty(test_mode);
        options.construct_from_built_in();
        options
    }

    /// A table with no endpoints at all.
    pub fn empty(test_mode: bool) -> Self {
        let (changed, _) = broadcast::channel(CHANGE_CAPACITY);
        Self { test_mode, inner: RwLock::new(Inner::default()), changed }
    }

    pub fn is_test_mode(&self) -> bool { self.test_mode }

    /// Loaded from an override file; network updates are ignored.
    pub fn is_immutable(&self) -> bool { self.inner.read().immutable }

    /// DC ids whose endpoints changed.
    pub fn changed(&self) -> broadcast::Receiver<i32> {
        self.changed.subscribe()
    }

    fn construct_from_built_in(&self) {
        let (v4, v6) = if self.test_mode {
            (BUILT_IN_TEST, BUILT_IN_TEST_V6)
        } else {
            (BUILT_IN, BUILT_IN_V6)
        };
        let mut inner = self.inner.write();
        inner.data.clear();
        for &(id, ip) in v4 {
            apply_one(&mut inner.data, Endpoint::new(id, Flags::STATIC, ip, BUILT_IN_PORT));
        }
        for &(id, ip) in v6 {
            let flags = Flags::STATIC | Flags::IPV6;
            apply_one(&mut inner.data, Endpoint::new(id, flags, ip, BUILT_IN_PORT));
        }
        inner.compute_cdn_dc_ids();
        tracing::debug!("[dc_options] built-in table with {} DCs", inner.data.len());
    }

    /// Replace the table with the options of a `config`.
    pub fn set_from_list(&self, options: &[enums::DcOption]) {
        self.process(options.iter().map(Endpoint::from_tl).collect(), true);
    }

    /// Merge the options of a `config` into the table.
    pub fn add_from_list(&self, options: &[enums::DcOption]) {
        self.process(options.iter().map(Endpoint::from_tl).collect(), false);
    }

    fn process(&self, endpoints: Vec<Endpoint>, overwrite: bool) {
        if endpoints.is_empty() {
            return;
        }
        let difference = {
            let mut inner = self.inner.write();
            if inner.immutable {
                return;
            }
            inner.merge(endpoints, overwrite)
        };
        self.notify(&difference);
    }

    /// Merge everything another table holds.
    pub fn add_from_other(&self, other: DcOptions) {
        let theirs = std::mem::take(&mut other.inner.write().data);
        let mut changed = Vec::new();
        {
            let mut inner = self.inner.write();
            if inner.immutable {
                return;
            }
            for (id, list) in theirs {
                let mut any = false;
                for endpoint in list {
                    any |= apply_one(&mut inner.data, endpoint);
                }
                if any {
                    changed.push(id);
                }
            }
            inner.compute_cdn_dc_ids();
        }
        self.notify(&changed);
    }

    /// Add a single endpoint without announcing it.
    pub fn construct_add_one(&self, id: i32, flags: Flags, ip: &str, port: i32, secret: &[u8]) {
        let mut inner = self.inner.write();
        let endpoint = Endpoint { id, flags, ip: ip.to_string(), port, secret: secret.to_vec() };
        apply_one(&mut inner.data, endpoint);
        inner.compute_cdn_dc_ids();
    }

    fn notify(&self, ids: &[i32]) {
        for &id in ids {
            tracing::debug!("[dc_options] endpoints of DC {id} changed");
            // nobody listening is fine
            let _ = self.changed.send(id);
        }
    }

    /// Endpoints for `dc_id` usable for `dc_type`, grouped by family and
    /// protocol. TCP lists put `tcpo_only` entries first.
    pub fn lookup(&self, dc_id: i32, dc_type: DcType, through_proxy: bool) -> Variants {
        let mut result = Variants::default();
        let inner = self.inner.read();
        let Some(list) = inner.data.get(&dc_id) else {
            return result;
        };
        for endpoint in list {
            let flags = endpoint.flags;
            if dc_type == DcType::Cdn && !flags.contains(Flags::CDN) {
                continue;
            }
            if dc_type != DcType::MediaDownload && flags.contains(Flags::MEDIA_ONLY) {
                continue;
            }
            if !validate_secret(&endpoint.secret) {
                continue;
            }
            let address = if flags.contains(Flags::IPV6) { Address::IPv6 } else { Address::IPv4 };
            let row = &mut result.data[address as usize];
            row[Protocol::Tcp as usize].push(endpoint.clone());
            if !flags.intersects(Flags::TCPO_ONLY | Flags::SECRET) {
                row[Protocol::Http as usize].push(endpoint.clone());
            }
        }
        drop(inner);

        if dc_type == DcType::MediaDownload {
            result.filter_if_has(Flags::MEDIA_ONLY);
        }
        if through_proxy {
            result.filter_if_has(Flags::STATIC);
        }
        for row in &mut result.data {
            row[Protocol::Tcp as usize].sort_by_key(|e| !e.flags.contains(Flags::TCPO_ONLY));
        }
        result
    }

    pub fn dc_type(&self, dc_id: i32) -> DcType {
        if is_temporary_dc_id(dc_id) {
            DcType::Temporary
        } else if self.inner.read().cdn_dc_ids.contains(&dc_id.rem_euclid(DC_SHIFT)) {
            DcType::Cdn
        } else {
            DcType::Regular
        }
    }

    pub fn has_media_only_options_for(&self, dc_id: i32) -> bool {
        self.inner
            .read()
            .data
            .get(&dc_id)
            .is_some_and(|list| list.iter().any(|e| e.flags.contains(Flags::MEDIA_ONLY)))
    }

    /// Every endpoint known for `dc_id`, in insertion order.
    pub fn endpoints(&self, dc_id: i32) -> Vec<Endpoint> {
        self.inner.read().data.get(&dc_id).cloned().unwrap_or_default()
    }

    /// Sorted ids of the regular DCs, the order config enumeration walks.
    pub fn config_enum_dc_ids(&self) -> Vec<i32> {
        let inner = self.inner.read();
        let mut ids: Vec<i32> = inner
            .data
            .iter()
            .filter(|(id, list)| {
                !is_temporary_dc_id(**id)
                    && list.first().is_some_and(|e| !e.flags.contains(Flags::CDN))
            })
            .map(|(&id, _)| id)
            .collect();
        ids.sort_unstable();
        ids
    }

    // ── persistence ──────────────────────────────────────────────────────

    /// The table in its persisted form: `-version`, count, then per
    /// endpoint `id, flags, port, ip_len, ip, secret_len, secret`, integers
    /// big-endian. Temporary DCs are skipped.
    pub fn serialize(&self) -> Vec<u8> {
        if self.is_immutable() {
            return DcOptions::new(self.test_mode).serialize();
        }
        let inner = self.inner.read();
        let endpoints: Vec<&Endpoint> = inner
            .data
            .iter()
            .filter(|(id, _)| !is_temporary_dc_id(**id))
            .flat_map(|(_, list)| list)
            .collect();

        let mut out = Vec::new();
        out.extend_from_slice(&(-SERIALIZE_VERSION).to_be_bytes());
        out.extend_from_slice(&(endpoints.len() as i32).to_be_bytes());
        for e in endpoints {
            out.extend_from_slice(&e.id.to_be_bytes());
            out.extend_from_slice(&(e.flags.bits() as i32).to_be_bytes());
            out.extend_from_slice(&e.port.to_be_bytes());
            out.extend_from_slice(&(e.ip.len() as i32).to_be_bytes());
            out.extend_from_slice(e.ip.as_bytes());
            out.extend_from_slice(&(e.secret.len() as i32).to_be_bytes());
            out.extend_from_slice(&e.secret);
        }
        out
    }

    /// Replace the table with a [`serialize`](Self::serialize)d one. Blobs
    /// without a version marker (count first, no secrets) are accepted too.
    pub fn construct_from_serialized(&self, serialized: &[u8]) -> Result<(), DcOptionsError> {
        let mut r = Reader { buf: serialized, pos: 0 };
        let first = r.i32()?;
        let (version, count) = if first < 0 { (-first, r.i32()?) } else { (0, first) };
        if count < 0 {
            return Err(DcOptionsError::BadData);
        }

        let mut data = Table::new();
        for _ in 0..count {
            let id = r.i32()?;
            let flags = Flags::from_bits(r.i32()? as u32);
            let port = r.i32()?;
            let ip_size = r.i32()?;
            if ip_size <= 0 || ip_size > MAX_IP_SIZE {
                return Err(DcOptionsError::BadData);
            }
            let ip = String::from_utf8(r.bytes(ip_size as usize)?.to_vec())
                .map_err(|_| DcOptionsError::BadData)?;
            let secret = if version > 0 {
                let size = r.i32()?;
                if !(0..=MAX_SECRET_SIZE).contains(&size) {
                    return Err(DcOptionsError::BadData);
                }
                r.bytes(size as usize)?.to_vec()
            } else {
                Vec::new()
            };
            apply_one(&mut data, Endpoint { id, flags, ip, port, secret });
        }

        let mut inner = self.inner.write();
        inner.data = data;
        inner.compute_cdn_dc_ids();
        Ok(())
    }

    /// Pin the table to an override file of `dcId host port [tcpo_only]
    /// [media_only]` lines. `#` starts a comment. Afterwards the table
    /// ignores network updates.
    pub fn load_from_file(&self, path: impl AsRef<Path>) -> Result<(), DcOptionsError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let endpoints = parse_override(&text)?;
        let difference = {
            let mut inner = self.inner.write();
            let difference = if endpoints.is_empty() { Vec::new() } else { inner.merge(endpoints, true) };
            inner.immutable = true;
            difference
        };
        self.notify(&difference);
        tracing::info!("[dc_options] pinned to {}", path.as_ref().display());
        Ok(())
    }

    /// Write the table in the override-file format.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let mut out = String::new();
        for list in self.inner.read().data.values() {
            for e in list {
                out.push_str(&format!("{} {} {}", e.id, e.ip, e.port));
                if e.flags.contains(Flags::TCPO_ONLY) {
                    out.push_str(" tcpo_only");
                }
                if e.flags.contains(Flags::MEDIA_ONLY) {
                    out.push_str(" media_only");
                }
                out.push('\n');
            }
        }
        std::fs::write(path, out)
    }
}

/// Append `endpoint` unless its DC already has that `ip:port`. Several
/// endpoints may share a DC and flags.
fn apply_one(data: &mut Table, endpoint: Endpoint) -> bool {
    let list = data.entry(endpoint.id).or_default();
    if list.iter().any(|e| e.ip == endpoint.ip && e.port == endpoint.port) {
        return false;
    }
    list.push(endpoint);
    true
}

/// DC ids present in only one table, or with a different set of addresses.
fn count_options_difference(a: &Table, b: &Table) -> Vec<i32> {
    let same = |m: &[Endpoint], n: &[Endpoint]| {
        m.len() == n.len()
            && m.iter().all(|x| n.iter().any(|y| x.ip == y.ip && x.port == y.port))
    };
    let ids: BTreeSet<i32> = a.keys().chain(b.keys()).copied().collect();
    ids.into_iter()
        .filter(|id| match (a.get(id), b.get(id)) {
            (Some(m), Some(n)) => !same(m, n),
            _ => true,
        })
        .collect()
}

fn parse_override(text: &str) -> Result<Vec<Endpoint>, DcOptionsError> {
    let mut endpoints = Vec::new();
    for line in text.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.first().is_none_or(|p| p.starts_with('#')) {
            continue;
        }
        let bad = || DcOptionsError::BadLine { line: line.to_string() };
        if parts.len() < 3 {
            return Err(bad());
        }
        let id: i32 = parts[0].parse().map_err(|_| bad())?;
        let host: IpAddr = parts[1].parse().map_err(|_| bad())?;
        let port: i32 = parts[2].parse().map_err(|_| bad())?;
        if id <= 0 || id >= DC_SHIFT || port <= 0 {
            return Err(bad());
        }
        let mut flags = if host.is_ipv6() { Flags::IPV6 } else { Flags::empty() };
        for option in &parts[3..] {
            match *option {
                o if o.starts_with('#') => break,
                "tcpo_only" => flags = flags | Flags::TCPO_ONLY,
                "media_only" => flags = flags | Flags::MEDIA_ONLY,
                _ => return Err(bad()),
            }
        }
        endpoints.push(Endpoint::new(id, flags, parts[1], port));
    }
    if endpoints.is_empty() {
        return Err(DcOptionsError::NoEndpoints);
    }
    Ok(endpoints)
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn bytes(&mut self, n: usize) -> Result<&'a [u8], DcOptionsError> {
        let end = self.pos.checked_add(n).ok_or(DcOptionsError::BadData)?;
        let out = self.buf.get(self.pos..end).ok_or(DcOptionsError::BadData)?;
        self.pos = end;
        Ok(out)
    }

    fn i32(&mut self) -> Result<i32, DcOptionsError> {
        let b = self.bytes(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}
