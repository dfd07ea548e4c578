//! Fetching the authoritative DC list.
//!
//! `help.getConfig` goes to the main DC first. If nothing answers within
//! [`ENUMERATE_DC_TIMEOUT`], the loader walks the other DCs one at a time,
//! wrapping around, and from the first step on also runs the
//! [`SpecialConfigRequest`] lookups. The first config that arrives wins.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use mtcore_crypto::rsa;
use mtcore_tl::{enums, types};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::consts::ENUMERATE_DC_TIMEOUT;
use crate::dc_options::{DcOptions, Flags};
use crate::errors::InvocationError;
use crate::special_config::SpecialConfigRequest;

/// Something that can ask a given DC for its config.
pub trait ConfigSource: Send + Sync + 'static {
    fn get_config(&self, dc_id: i32) -> impl Future<Output = Result<enums::Config, InvocationError>> + Send;
}

type Pending = Pin<Box<dyn Future<Output = Result<enums::Config, InvocationError>> + Send>>;

/// A running config request. Dropping it stops everything.
pub struct ConfigLoader {
    cancel: CancellationToken,
    task: JoinHandle<Option<types::Config>>,
    _guard: DropGuard,
}

impl ConfigLoader {
    /// Start loading from `main_dc`. With `special_key`, the simple-config
    /// lookups join in once enumeration begins.
    pub fn load<S: ConfigSource>(
        source: Arc<S>,
        options: Arc<DcOptions>,
        main_dc: i32,
        special_key: Option<rsa::Key>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(source, options, main_dc, special_key, cancel.clone()));
        let _guard = cancel.clone().drop_guard();
        Self { cancel, task, _guard }
    }

    /// Stop enumerating and drop whatever request is outstanding.
    pub fn done(&self) {
        self.cancel.cancel();
    }

    /// Wait for the outcome: the applied config, or `None` when stopped.
    pub async fn join(self) -> Option<types::Config> {
        self.task.await.ok().flatten()
    }
}

/// The id after `current` in `ids`, wrapping to the first.
pub fn next_enum_dc(ids: &[i32], current: i32) -> i32 {
    ids.iter()
        .copied()
        .find(|&id| id > current)
        .or_else(|| ids.first().copied())
        .unwrap_or(current)
}

fn request<S: ConfigSource>(source: &Arc<S>, dc_id: i32) -> Pending {
    let source = Arc::clone(source);
    Box::pin(async move { source.get_config(dc_id).await })
}

async fn poll_slot(slot: &mut Option<Pending>) -> Result<enums::Config, InvocationError> {
    match slot {
        Some(pending) => pending.await,
        None => std::future::pending().await,
    }
}

async fn run<S: ConfigSource>(
    source: Arc<S>,
    options: Arc<DcOptions>,
    main_dc: i32,
    special_key: Option<rsa::Key>,
    cancel: CancellationToken,
) -> Option<types::Config> {
    tracing::debug!("[config] requesting config from DC {main_dc}");
    let mut main = Some(request(&source, main_dc));
    let mut enumerated: Option<Pending> = None;
    let mut enum_dc = main_dc;
    let mut special: Option<SpecialConfigRequest> = None;

    let timer = tokio::time::sleep(ENUMERATE_DC_TIMEOUT);
    tokio::pin!(timer);

    loop {
        let (dc_id, result) = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("[config] stopped");
                return None;
            }
            r = poll_slot(&mut main) => {
                main = None;
                (main_dc, r)
            }
            r = poll_slot(&mut enumerated) => {
                enumerated = None;
                (enum_dc, r)
            }
            _ = &mut timer => {
                enum_dc = next_enum_dc(&options.config_enum_dc_ids(), enum_dc);
                tracing::info!("[config] no answer yet, trying DC {enum_dc}");
                enumerated = Some(request(&source, enum_dc));
                if special.is_none() {
                    special = special_key.clone().map(|key| start_special(&options, key));
                }
                timer.as_mut().reset(Instant::now() + ENUMERATE_DC_TIMEOUT);
                continue;
            }
        };

        match result {
            Ok(enums::Config::Config(config)) => {
                tracing::info!(
                    "[config] got config from DC {dc_id}: this_dc={}, {} option(s)",
                    config.this_dc,
                    config.dc_options.len()
                );
                if !config.dc_options.is_empty() {
                    options.set_from_list(&config.dc_options);
                }
                return Some(config);
            }
            Err(e) => tracing::warn!("[config] help.getConfig on DC {dc_id} failed: {e}"),
        }
    }
}

fn start_special(options: &Arc<DcOptions>, key: rsa::Key) -> SpecialConfigRequest {
    tracing::debug!("[config] starting simple config lookups");
    let options = Arc::clone(options);
    SpecialConfigRequest::start(options.is_test_mode(), key, move |dc_id, ip, port| {
        options.construct_add_one(dc_id, Flags::empty(), ip, port, &[]);
    })
}
