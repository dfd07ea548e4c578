//! The handle callers talk to: one [`Session`] per DC connection.

use std::future::Future;
use std::num::NonZeroU32;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use mtcore_mtproto::{Protocol, RequestId, SessionData};
use mtcore_tl::{Deserializable, RemoteCall, enums, functions};
use parking_lot::Mutex;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::account::AccountContext;
use crate::config_loader::{ConfigLoader, ConfigSource};
use crate::connection::{Command, ConnectionState, Connector, Shared, TcpConnector, Waiters, Worker};
use crate::consts::{MAILBOX_CAPACITY, UPDATES_CAPACITY};
use crate::dc_options::DcType;
use crate::errors::InvocationError;
use crate::retry::{AutoSleep, Backoff, RetryContext, RetryPolicy};
use crate::special_config::simple_config_key;

/// A connection to one DC with its own MTProto session.
///
/// Requests are queued immediately and written whenever the link is up;
/// a reconnect resends whatever was not answered.
pub struct Session {
    dc_id:           i32,
    shared:          Arc<Shared>,
    commands:        mpsc::Sender<Command>,
    state:           watch::Receiver<ConnectionState>,
    updates:         broadcast::Sender<Vec<u8>>,
    task:            JoinHandle<()>,
    request_timeout: Option<Duration>,
    retry_policy:    Arc<dyn RetryPolicy>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("dc_id", &self.dc_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Start a session over TCP. Must be called inside a tokio runtime.
    pub fn connect(account: Arc<AccountContext>, dc_id: i32, dc_type: DcType) -> Self {
        Self::connect_with(account, dc_id, dc_type, TcpConnector)
    }

    /// Start a session whose streams come from `connector`.
    pub fn connect_with<C: Connector>(
        account: Arc<AccountContext>,
        dc_id: i32,
        dc_type: DcType,
        connector: C,
    ) -> Self {
        let data = Arc::new(SessionData::new(account.config().scheme));
        let shared = Arc::new(Shared { data: data.clone(), waiters: Mutex::new(Waiters::default()) });
        let (commands, mailbox) = mpsc::channel(MAILBOX_CAPACITY);
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let (updates, _) = broadcast::channel(UPDATES_CAPACITY);
        let request_timeout = account.config().request_timeout;

        let worker = Worker {
            account,
            dc_id,
            dc_type,
            connector,
            shared: shared.clone(),
            protocol: Protocol::new(data),
            commands: mailbox,
            state: state_tx,
            updates: updates.clone(),
            backoff: Backoff::new(),
            receive_timeout: mtcore_mtproto::consts::MIN_RECEIVE_TIMEOUT,
            destroy_requested: false,
        };
        let task = tokio::spawn(worker.run());

        Self {
            dc_id,
            shared,
            commands,
            state,
            updates,
            task,
            request_timeout,
            retry_policy: Arc::new(AutoSleep::default()),
        }
    }

    pub fn dc_id(&self) -> i32 {
        self.dc_id
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Follow state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Server-initiated messages, serialized.
    pub fn updates(&self) -> broadcast::Receiver<Vec<u8>> {
        self.updates.subscribe()
    }

    pub fn set_retry_policy(&mut self, policy: impl RetryPolicy) {
        self.retry_policy = Arc::new(policy);
    }

    /// Queue a request without waiting. With `after`, it is written only
    /// once that request has been.
    pub fn queue<R: RemoteCall>(&self, request: &R, after: Option<RequestId>) -> Result<PendingCall, InvocationError> {
        self.queue_body(request.to_bytes(), after)
    }

    fn queue_body(&self, body: Vec<u8>, after: Option<RequestId>) -> Result<PendingCall, InvocationError> {
        let (reply, answer) = oneshot::channel();
        let id = {
            let mut waiters = self.shared.waiters.lock();
            if waiters.closed {
                return Err(InvocationError::Dropped);
            }
            let id = self.shared.data.push(body, after);
            waiters.map.insert(id, reply);
            id
        };
        let call = PendingCall { id, answer, shared: self.shared.clone(), finished: false };
        match self.commands.try_send(Command::Flush) {
            // a full mailbox already holds a flush
            Ok(()) | Err(TrySendError::Full(_)) => Ok(call),
            Err(TrySendError::Closed(_)) => Err(InvocationError::Dropped),
        }
    }

    /// Send a request and wait for the raw answer.
    pub async fn send<R: RemoteCall>(&self, request: &R) -> Result<Vec<u8>, InvocationError> {
        self.send_body(request.to_bytes()).await
    }

    async fn send_body(&self, body: Vec<u8>) -> Result<Vec<u8>, InvocationError> {
        let call = self.queue_body(body, None)?;
        match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, call.wait())
                .await
                .unwrap_or(Err(InvocationError::Timeout)),
            None => call.wait().await,
        }
    }

    /// Send a request, retry as the policy says, and deserialize the answer.
    pub async fn invoke<R: RemoteCall>(&self, request: &R) -> Result<R::Return, InvocationError> {
        let body = request.to_bytes();
        let mut fail_count = NonZeroU32::MIN;
        let mut slept_so_far = Duration::ZERO;
        loop {
            let error = match self.send_body(body.clone()).await {
                Ok(answer) => return Ok(R::Return::from_bytes(&answer)?),
                Err(error) => error,
            };
            let ctx = RetryContext { fail_count, slept_so_far, error: &error };
            match self.retry_policy.should_retry(&ctx) {
                ControlFlow::Continue(delay) => {
                    tokio::time::sleep(delay).await;
                    slept_so_far += delay;
                    fail_count = fail_count.saturating_add(1);
                }
                ControlFlow::Break(()) => return Err(error),
            }
        }
    }

    /// Ask the server to forget this DC's key. The worker drops the key
    /// once the server confirms and negotiates a new one.
    pub fn destroy_key(&self) {
        if self.commands.try_send(Command::DestroyKey).is_err() {
            tracing::warn!("[session] DC {}: destroy request not delivered", self.dc_id);
        }
    }

    /// Stop the worker; unanswered calls fail with [`InvocationError::Dropped`].
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown).await;
        if let Err(e) = self.task.await {
            tracing::warn!("[session] DC {} worker ended badly: {e}", self.dc_id);
        }
    }
}

/// A queued request. Dropping it before the answer cancels the request.
pub struct PendingCall {
    id:       RequestId,
    answer:   oneshot::Receiver<Result<Vec<u8>, InvocationError>>,
    shared:   Arc<Shared>,
    finished: bool,
}

impl PendingCall {
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub async fn wait(mut self) -> Result<Vec<u8>, InvocationError> {
        let answer = (&mut self.answer).await;
        self.finished = true;
        answer.unwrap_or(Err(InvocationError::Dropped))
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        if !self.finished {
            self.shared.waiters.lock().map.remove(&self.id);
            if self.shared.data.cancel(self.id) {
                tracing::debug!("[session] request {} cancelled", self.id);
            }
        }
    }
}

/// Fetches `help.getConfig` through short-lived sessions of an account.
pub struct DcConfigSource {
    account: Arc<AccountContext>,
}

impl DcConfigSource {
    pub fn new(account: Arc<AccountContext>) -> Self {
        Self { account }
    }
}

impl ConfigSource for DcConfigSource {
    fn get_config(&self, dc_id: i32) -> impl Future<Output = Result<enums::Config, InvocationError>> + Send {
        let account = self.account.clone();
        async move {
            let request = account.config().wrap_init(functions::help::GetConfig {});
            let session = Session::connect(account, dc_id, DcType::Regular);
            let result = session.invoke(&request).await;
            session.shutdown().await;
            result
        }
    }
}

/// Bring the account's DC table up to date and persist it.
pub async fn refresh_config(account: &Arc<AccountContext>) -> Option<mtcore_tl::types::Config> {
    let special_key = match simple_config_key() {
        Ok(key) => Some(key),
        Err(e) => {
            tracing::warn!("[config] simple config key unusable: {e}");
            None
        }
    };
    let source = Arc::new(DcConfigSource::new(account.clone()));
    let loader = ConfigLoader::load(source, account.dc_options().clone(), account.main_dc(), special_key);
    let config = loader.join().await?;
    if let Err(e) = account.persist() {
        tracing::warn!("[config] saving state failed: {e}");
    }
    Some(config)
}

