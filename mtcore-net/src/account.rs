//! Per-account state shared by every connection: auth keys by DC, the DC
//! table, RSA keys and the connection settings.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use mtcore_crypto::{AuthKey, AuthKeyKind, rsa};
use parking_lot::RwLock;

use crate::config::ConnectionConfig;
use crate::consts::{DC_SHIFT, DEFAULT_MAIN_DC};
use crate::dc_options::{DcOptions, is_temporary_dc_id};
use crate::storage::{KeyStore, StoredKey, StoredState};

/// The DC id without its shift.
pub fn bare_dc_id(dc_id: i32) -> i32 {
    dc_id.rem_euclid(DC_SHIFT)
}

pub struct AccountContext {
    config:     ConnectionConfig,
    dc_options: Arc<DcOptions>,
    rsa_keys:   rsa::KeyStore,
    keys:       RwLock<HashMap<i32, Arc<AuthKey>>>,
    main_dc:    AtomicI32,
    store:      Option<Box<dyn KeyStore>>,
}

impl std::fmt::Debug for AccountContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut dcs: Vec<i32> = self.keys.read().keys().copied().collect();
        dcs.sort_unstable();
        f.debug_struct("AccountContext")
            .field("main_dc", &self.main_dc())
            .field("keys_for", &dcs)
            .field("store", &self.store.as_ref().map(|s| s.name()))
            .finish_non_exhaustive()
    }
}

impl AccountContext {
    /// A fresh account that keeps everything in memory.
    pub fn new(config: ConnectionConfig) -> Self {
        let test_mode = config.test_mode;
        Self {
            config,
            dc_options: Arc::new(DcOptions::new(test_mode)),
            rsa_keys: rsa::KeyStore::builtin(test_mode),
            keys: RwLock::new(HashMap::new()),
            main_dc: AtomicI32::new(DEFAULT_MAIN_DC),
            store: None,
        }
    }

    /// An account backed by `store`, restoring whatever it holds.
    pub fn with_store(config: ConnectionConfig, store: impl KeyStore + 'static) -> io::Result<Self> {
        let mut account = Self::new(config);
        if let Some(state) = store.load()? {
            account.restore(state);
        } else {
            tracing::debug!("[account] nothing stored in {} yet", store.name());
        }
        account.store = Some(Box::new(store));
        Ok(account)
    }

    fn restore(&mut self, state: StoredState) {
        if state.main_dc > 0 {
            self.main_dc.store(state.main_dc, Ordering::Relaxed);
        }
        let keys = self.keys.get_mut();
        for stored in state.keys {
            let key = AuthKey::new(stored.data, AuthKeyKind::ReadFromFile, stored.dc_id);
            tracing::debug!("[account] restored key {:016x} for DC {}", key.key_id(), stored.dc_id);
            keys.insert(stored.dc_id, Arc::new(key));
        }
        if !state.dc_options.is_empty() {
            if let Err(e) = self.dc_options.construct_from_serialized(&state.dc_options) {
                tracing::warn!("[account] stored DC options ignored: {e}");
            }
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn dc_options(&self) -> &Arc<DcOptions> {
        &self.dc_options
    }

    pub fn rsa_keys(&self) -> &rsa::KeyStore {
        &self.rsa_keys
    }

    pub fn main_dc(&self) -> i32 {
        self.main_dc.load(Ordering::Relaxed)
    }

    pub fn set_main_dc(&self, dc_id: i32) {
        if self.main_dc.swap(dc_id, Ordering::Relaxed) != dc_id {
            tracing::info!("[account] main DC is now {dc_id}");
            self.persist_logged();
        }
    }

    pub fn key(&self, dc_id: i32) -> Option<Arc<AuthKey>> {
        self.keys.read().get(&bare_dc_id(dc_id)).cloned()
    }

    /// Remember a freshly negotiated key. Keys of temporary DCs are kept
    /// out of the store.
    pub fn set_key(&self, dc_id: i32, key: Arc<AuthKey>) {
        let dc_id = bare_dc_id(dc_id);
        tracing::info!("[account] key {:016x} for DC {dc_id}", key.key_id());
        self.keys.write().insert(dc_id, key);
        if !is_temporary_dc_id(dc_id) {
            self.persist_logged();
        }
    }

    /// Drop the key of `dc_id` if it still is the one with `key_id`.
    /// Returns whether anything was removed.
    pub fn invalidate_key(&self, dc_id: i32, key_id: u64) -> bool {
        let dc_id = bare_dc_id(dc_id);
        let removed = {
            let mut keys = self.keys.write();
            match keys.get(&dc_id) {
                Some(key) if key.key_id() == key_id => keys.remove(&dc_id).is_some(),
                _ => false,
            }
        };
        if removed {
            tracing::warn!("[account] key {key_id:016x} for DC {dc_id} invalidated");
            if !is_temporary_dc_id(dc_id) {
                self.persist_logged();
            }
        }
        removed
    }

    /// What would be written to the store right now.
    pub fn snapshot(&self) -> StoredState {
        let mut keys: Vec<StoredKey> = self
            .keys
            .read()
            .iter()
            .filter(|(dc_id, _)| !is_temporary_dc_id(**dc_id))
            .map(|(&dc_id, key)| StoredKey { dc_id, data: key.to_bytes() })
            .collect();
        keys.sort_by_key(|k| k.dc_id);
        StoredState {
            main_dc: self.main_dc(),
            keys,
            dc_options: self.dc_options.serialize(),
        }
    }

    /// Write the current state to the store, if there is one.
    pub fn persist(&self) -> io::Result<()> {
        match &self.store {
            Some(store) => store.save(&self.snapshot()),
            None => Ok(()),
        }
    }

    fn persist_logged(&self) {
        if let Err(e) = self.persist() {
            tracing::warn!("[account] saving state failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dc_options::Flags;
    use crate::storage::{BinaryFileStore, InMemoryStore};

    fn test_config() -> ConnectionConfig {
        ConnectionConfig { test_mode: true, ..Default::default() }
    }

    fn key(seed: u8) -> Arc<AuthKey> {
        Arc::new(AuthKey::from_bytes([seed; 256]))
    }

    #[test]
    fn shifted_ids_share_the_bare_key() {
        let account = AccountContext::new(test_config());
        account.set_key(2, key(1));
        assert!(account.key(20_002).is_some());
        assert!(account.key(3).is_none());
        assert_eq!(bare_dc_id(40_004), 4);
    }

    #[test]
    fn invalidation_only_hits_the_named_key() {
        let account = AccountContext::new(test_config());
        let first = key(1);
        account.set_key(2, first.clone());
        assert!(!account.invalidate_key(2, key(2).key_id()));
        assert!(account.key(2).is_some());
        assert!(account.invalidate_key(2, first.key_id()));
        assert!(account.key(2).is_none());
        assert!(!account.invalidate_key(2, first.key_id()));
    }

    #[test]
    fn keys_and_options_survive_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("account.bin");
        {
            let account = AccountContext::with_store(test_config(), BinaryFileStore::new(&path)).unwrap();
            account.dc_options().construct_add_one(2, Flags::empty(), "10.0.0.2", 80, &[]);
            account.set_main_dc(4);
            account.set_key(2, key(7));
            account.set_key(1002, key(8));
        }

        let account = AccountContext::with_store(test_config(), BinaryFileStore::new(&path)).unwrap();
        assert_eq!(account.main_dc(), 4);
        let restored = account.key(2).unwrap();
        assert_eq!(restored.data(), &[7; 256]);
        assert_eq!(restored.kind(), AuthKeyKind::ReadFromFile);
        assert!(account.key(1002).is_none());
        assert!(account.dc_options().endpoints(2).iter().any(|e| e.ip == "10.0.0.2"));
    }

    #[test]
    fn memory_store_sees_invalidation() {
        let account = AccountContext::with_store(test_config(), InMemoryStore::new()).unwrap();
        let k = key(3);
        account.set_key(4, k.clone());
        assert_eq!(account.snapshot().keys.len(), 1);
        account.invalidate_key(4, k.key_id());
        assert!(account.snapshot().keys.is_empty());
    }
}
