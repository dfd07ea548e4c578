//! Where auth keys and the DC table survive restarts.
//!
//! The [`KeyStore`] trait abstracts over persistence so callers can plug in
//! their own storage. Two stores are provided:
//! * [`BinaryFileStore`]: a compact binary file.
//! * [`InMemoryStore`]: nothing touches the disk.

use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

/// One persisted auth key.
#[derive(Clone)]
pub struct StoredKey {
    pub dc_id: i32,
    pub data:  [u8; 256],
}

impl std::fmt::Debug for StoredKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredKey").field("dc_id", &self.dc_id).finish_non_exhaustive()
    }
}

/// Everything the account context writes out.
#[derive(Clone, Debug, Default)]
pub struct StoredState {
    pub main_dc:    i32,
    pub keys:       Vec<StoredKey>,
    /// [`DcOptions::serialize`](crate::DcOptions::serialize) output.
    pub dc_options: Vec<u8>,
}

const FORMAT_VERSION: u8 = 1;

impl StoredState {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut b = Vec::with_capacity(16 + self.keys.len() * 260 + self.dc_options.len());
        b.push(FORMAT_VERSION);
        b.extend_from_slice(&self.main_dc.to_le_bytes());
        b.extend_from_slice(&(self.keys.len() as u32).to_le_bytes());
        for k in &self.keys {
            b.extend_from_slice(&k.dc_id.to_le_bytes());
            b.extend_from_slice(&k.data);
        }
        b.extend_from_slice(&(self.dc_options.len() as u32).to_le_bytes());
        b.extend_from_slice(&self.dc_options);
        b
    }

    pub fn from_bytes(buf: &[u8]) -> io::Result<Self> {
        let mut p = 0usize;
        macro_rules! r {
            ($n:expr) => {{
                let n = $n;
                if buf.len() - p < n {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "truncated key store"));
                }
                let s = &buf[p..p + n];
                p += n;
                s
            }};
        }
        macro_rules! word {
            () => {{
                let s = r!(4);
                [s[0], s[1], s[2], s[3]]
            }};
        }

        let version = r!(1)[0];
        if version != FORMAT_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown key store version {version}"),
            ));
        }
        let main_dc = i32::from_le_bytes(word!());
        let count = u32::from_le_bytes(word!()) as usize;
        let mut keys = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            let dc_id = i32::from_le_bytes(word!());
            let mut data = [0u8; 256];
            data.copy_from_slice(r!(256));
            keys.push(StoredKey { dc_id, data });
        }
        let len = u32::from_le_bytes(word!()) as usize;
        let dc_options = r!(len).to_vec();
        if p != buf.len() {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "trailing bytes in key store"));
        }
        Ok(Self { main_dc, keys, dc_options })
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        std::fs::write(path, self.to_bytes())
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        Self::from_bytes(&std::fs::read(path)?)
    }
}

/// An abstraction over where the account state is persisted.
pub trait KeyStore: Send + Sync {
    fn save(&self, state: &StoredState) -> io::Result<()>;

    /// `None` when nothing was stored yet.
    fn load(&self) -> io::Result<Option<StoredState>>;

    fn delete(&self) -> io::Result<()>;

    /// For log messages.
    fn name(&self) -> &str;
}

/// Stores the state in a single binary file.
pub struct BinaryFileStore {
    path: PathBuf,
}

impl BinaryFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyStore for BinaryFileStore {
    fn save(&self, state: &StoredState) -> io::Result<()> {
        state.save(&self.path)
    }

    fn load(&self) -> io::Result<Option<StoredState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        StoredState::load(&self.path).map(Some)
    }

    fn delete(&self) -> io::Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn name(&self) -> &str { "binary-file" }
}

/// Keeps the state in memory only; handy for tests and throwaway sessions.
#[derive(Default)]
pub struct InMemoryStore {
    data: Mutex<Option<StoredState>>,
}

impl InMemoryStore {
    pub fn new() -> Self { Self::default() }
}

impl KeyStore for InMemoryStore {
    fn save(&self, state: &StoredState) -> io::Result<()> {
        *self.data.lock() = Some(state.clone());
        Ok(())
    }

    fn load(&self) -> io::Result<Option<StoredState>> {
        Ok(self.data.lock().clone())
    }

    fn delete(&self) -> io::Result<()> {
        *self.data.lock() = None;
        Ok(())
    }

    fn name(&self) -> &str { "in-memory" }
}
