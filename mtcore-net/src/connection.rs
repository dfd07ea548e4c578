//! The per-connection worker task.
//!
//! One worker owns one socket. It connects, negotiates a key when the DC
//! has none, then loops over three inputs: frames from the server, commands
//! from its [`Session`](crate::Session) and a housekeeping tick. Whatever
//! the sans-IO [`Protocol`] queues is flushed before the next wait. When the
//! link fails the worker backs off and starts over; requests survive in the
//! shared [`SessionData`].

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use mtcore_crypto::rsa;
use mtcore_mtproto::authentication::{Finished, Handshake, Progress};
use mtcore_mtproto::consts::{
    MARK_CONNECTION_OLD_TIMEOUT, MAX_RECEIVE_TIMEOUT, MIN_RECEIVE_TIMEOUT, PING_SEND_AFTER,
    PING_SEND_AFTER_FORCE,
};
use mtcore_mtproto::{Event, HandleResult, Protocol, RequestId, SessionData};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};

use crate::account::{AccountContext, bare_dc_id};
use crate::config::{ConnectionConfig, TransportMode};
use crate::consts::TICK_INTERVAL;
use crate::dc_options::{self, Address, DcType, Endpoint};
use crate::errors::{InvocationError, RpcError};
use crate::retry::Backoff;
use crate::transport::{Transport, is_key_unknown};

/// Where a connection is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting this many milliseconds before the next attempt.
    RetryWait(u64),
}

/// Opens the byte stream to an endpoint.
pub trait Connector: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn connect(&self, endpoint: &Endpoint) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// Plain TCP.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&self, endpoint: &Endpoint) -> impl Future<Output = io::Result<TcpStream>> + Send {
        let addr = endpoint.socket_addr();
        async move {
            let stream = TcpStream::connect(addr).await?;
            stream.set_nodelay(true)?;
            Ok(stream)
        }
    }
}

pub(crate) enum Command {
    /// New requests are queued; write them.
    Flush,
    DestroyKey,
    Shutdown,
}

pub(crate) type Reply = oneshot::Sender<Result<Vec<u8>, InvocationError>>;

/// Callers waiting for answers. Once `closed`, nobody will answer.
#[derive(Default)]
pub(crate) struct Waiters {
    pub map:    HashMap<RequestId, Reply>,
    pub closed: bool,
}

/// State the worker and its session both touch.
pub(crate) struct Shared {
    pub data:    Arc<SessionData>,
    pub waiters: Mutex<Waiters>,
}

pub(crate) struct Worker<C: Connector> {
    pub account:   Arc<AccountContext>,
    pub dc_id:     i32,
    pub dc_type:   DcType,
    pub connector: C,
    pub shared:    Arc<Shared>,
    pub protocol:  Protocol,
    pub commands:  mpsc::Receiver<Command>,
    pub state:     watch::Sender<ConnectionState>,
    pub updates:   broadcast::Sender<Vec<u8>>,
    pub backoff:   Backoff,
    pub receive_timeout: Duration,
    pub destroy_requested: bool,
}

/// Run `fut` while still answering commands. `None` means shut down.
async fn interruptible<T>(
    commands: &mut mpsc::Receiver<Command>,
    destroy_requested: &mut bool,
    fut: impl Future<Output = T>,
) -> Option<T> {
    tokio::pin!(fut);
    loop {
        tokio::select! {
            out = &mut fut => return Some(out),
            cmd = commands.recv() => match cmd {
                None | Some(Command::Shutdown) => return None,
                Some(Command::DestroyKey) => *destroy_requested = true,
                Some(Command::Flush) => {}
            },
        }
    }
}

/// The transport an endpoint asks for: endpoints carrying a 16-byte
/// secret need the obfuscated layer keyed with it.
fn transport_for(config: &ConnectionConfig, endpoint: &Endpoint) -> Option<TransportMode> {
    match endpoint.secret.len() {
        0 => Some(config.transport.clone()),
        16 => {
            let mut secret = [0u8; 16];
            secret.copy_from_slice(&endpoint.secret);
            Some(TransportMode::Obfuscated { secret: Some(secret) })
        }
        _ => None,
    }
}

async fn open_transport<C: Connector>(
    connector: &C,
    config: &ConnectionConfig,
    endpoints: &[Endpoint],
    dc_id: i16,
) -> Result<Transport<C::Stream>, InvocationError> {
    let mut last_error = None;
    for endpoint in endpoints {
        let Some(mode) = transport_for(config, endpoint) else {
            tracing::debug!("[conn] skipping {}: unsupported secret", endpoint.socket_addr());
            continue;
        };
        tracing::debug!("[conn] connecting to {}", endpoint.socket_addr());
        let attempt = async {
            let stream = connector.connect(endpoint).await?;
            Transport::open(stream, &mode, dc_id).await
        };
        match tokio::time::timeout(config.connect_timeout, attempt).await {
            Ok(Ok(transport)) => return Ok(transport),
            Ok(Err(e)) => {
                tracing::debug!("[conn] {} failed: {e}", endpoint.socket_addr());
                last_error = Some(InvocationError::Io(e));
            }
            Err(_) => {
                tracing::debug!("[conn] {} timed out", endpoint.socket_addr());
                last_error = Some(InvocationError::Timeout);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| {
        InvocationError::Io(io::Error::new(io::ErrorKind::NotFound, "no usable endpoint"))
    }))
}

async fn exchange_key<S: AsyncRead + AsyncWrite + Unpin + Send>(
    transport: &mut Transport<S>,
    keys: rsa::KeyStore,
    step_timeout: Duration,
) -> Result<Finished, InvocationError> {
    let mut handshake = Handshake::new(keys);
    let mut frame = handshake.start()?;
    loop {
        transport.send(&frame).await?;
        let answer = tokio::time::timeout(step_timeout, transport.recv())
            .await
            .map_err(|_| InvocationError::Timeout)??;
        match handshake.handle(&answer)? {
            Progress::Send(next) => frame = next,
            Progress::Done(done) => return Ok(done),
        }
    }
}

fn restart(reason: &'static str) -> InvocationError {
    InvocationError::Io(io::Error::new(io::ErrorKind::ConnectionReset, reason))
}

impl<C: Connector> Worker<C> {
    pub(crate) async fn run(mut self) {
        loop {
            match self.connect_and_serve().await {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!("[conn] DC {}: {e}", self.dc_id);
                    if is_key_unknown(&e) {
                        self.forget_key();
                    }
                    let delay = self.backoff.next_delay();
                    self.set_state(ConnectionState::RetryWait(delay.as_millis() as u64));
                    let sleep = tokio::time::sleep(delay);
                    if interruptible(&mut self.commands, &mut self.destroy_requested, sleep).await.is_none() {
                        break;
                    }
                }
            }
        }
        let waiters: Vec<Reply> = {
            let mut waiters = self.shared.waiters.lock();
            waiters.closed = true;
            waiters.map.drain().map(|(_, w)| w).collect()
        };
        for waiter in waiters {
            let _ = waiter.send(Err(InvocationError::Dropped));
        }
        self.set_state(ConnectionState::Disconnected);
        tracing::debug!("[conn] DC {} worker stopped", self.dc_id);
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!("[conn] DC {}: {previous:?} -> {state:?}", self.dc_id);
        }
    }

    fn endpoints(&self, has_key: bool) -> Vec<Endpoint> {
        let config = self.account.config();
        let dc_type = match self.dc_type {
            DcType::MediaDownload if !has_key => DcType::Regular,
            other => other,
        };
        let variants = self.account.dc_options().lookup(bare_dc_id(self.dc_id), dc_type, config.through_proxy);
        let mut out = Vec::new();
        if config.use_ipv6 {
            out.extend_from_slice(variants.get(Address::IPv6, dc_options::Protocol::Tcp));
        }
        out.extend_from_slice(variants.get(Address::IPv4, dc_options::Protocol::Tcp));
        out
    }

    /// The DC id the obfuscated header announces: shifted by 10000 on test
    /// servers, negative for media connections.
    fn header_dc_id(&self) -> i16 {
        let mut id = bare_dc_id(self.dc_id);
        if self.account.config().test_mode {
            id += 10_000;
        }
        if self.dc_type == DcType::MediaDownload {
            id = -id;
        }
        id as i16
    }

    fn forget_key(&mut self) {
        if let Some(key) = self.shared.data.key() {
            self.account.invalidate_key(self.dc_id, key.key_id());
        }
        self.shared.data.set_key(None);
    }

    /// One connection from dial to hang-up. `Ok` means shut down for good.
    async fn connect_and_serve(&mut self) -> Result<(), InvocationError> {
        self.set_state(ConnectionState::Connecting);
        let bare = bare_dc_id(self.dc_id);
        let key = self.account.key(bare);
        let endpoints = self.endpoints(key.is_some());
        if endpoints.is_empty() {
            return Err(InvocationError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no endpoints for DC {bare}"),
            )));
        }

        let config = self.account.config();
        let opening = open_transport(&self.connector, config, &endpoints, self.header_dc_id());
        let Some(transport) = interruptible(&mut self.commands, &mut self.destroy_requested, opening).await else {
            return Ok(());
        };
        let mut transport = transport?;

        let key = match key {
            Some(key) => key,
            None => {
                tracing::info!("[conn] no key for DC {bare}, starting key exchange");
                let exchange = exchange_key(&mut transport, self.account.rsa_keys().clone(), config.connect_timeout);
                let Some(done) = interruptible(&mut self.commands, &mut self.destroy_requested, exchange).await else {
                    return Ok(());
                };
                let done = done?;
                let key = Arc::new(done.auth_key.with_dc(bare));
                self.shared.data.set_time_offset(done.time_offset);
                self.shared.data.set_salt(done.first_salt);
                self.account.set_key(bare, key.clone());
                key
            }
        };
        self.shared.data.set_key(Some(key));
        let requeued = self.shared.data.resend_all();
        if requeued > 0 {
            tracing::debug!("[conn] DC {bare}: {requeued} request(s) queued again");
        }
        if std::mem::take(&mut self.destroy_requested) {
            self.protocol.request_key_destroy();
        }

        self.set_state(ConnectionState::Connected);
        tracing::info!("[conn] connected to DC {}", self.dc_id);
        self.serve(&mut transport).await
    }

    async fn serve(&mut self, transport: &mut Transport<C::Stream>) -> Result<(), InvocationError> {
        let mut tick = tokio::time::interval_at(Instant::now() + TICK_INTERVAL, TICK_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_receive = Instant::now();
        let mut last_ping = Instant::now();
        let mut waiting_since: Option<Instant> = None;

        loop {
            let mut sent = false;
            while let Some(packet) = self.protocol.prepare_send() {
                transport.send(&packet).await?;
                sent = true;
            }
            let expects_answer = self.shared.data.in_flight() > 0 || self.protocol.ping_outstanding();
            if sent && expects_answer && waiting_since.is_none() {
                waiting_since = Some(Instant::now());
            }

            tokio::select! {
                frame = transport.recv() => {
                    let mut frame = frame?;
                    last_receive = Instant::now();
                    waiting_since = None;
                    self.receive_timeout = MIN_RECEIVE_TIMEOUT;
                    self.backoff.reset();

                    let result = self.protocol.handle_frame(&mut frame)?;
                    let key_destroyed = self.deliver_events();
                    match result {
                        HandleResult::Restart => return Err(restart("session asked for a restart")),
                        HandleResult::ResetSession => {
                            tracing::info!("[conn] DC {}: session reset", self.dc_id);
                        }
                        HandleResult::Ok | HandleResult::Ignored => {}
                    }
                    if key_destroyed {
                        return Err(restart("auth key destroyed"));
                    }
                    // something unrelated arrived; the clock restarts for what is still owed
                    if self.shared.data.in_flight() > 0 || self.protocol.ping_outstanding() {
                        waiting_since = Some(Instant::now());
                    }
                }
                cmd = self.commands.recv() => match cmd {
                    None | Some(Command::Shutdown) => {
                        transport.shutdown().await;
                        return Ok(());
                    }
                    Some(Command::DestroyKey) => self.protocol.request_key_destroy(),
                    Some(Command::Flush) => {}
                },
                _ = tick.tick() => {
                    let now = Instant::now();
                    self.protocol.check_sent_requests(now.into_std());
                    let idle = now.duration_since(last_receive);
                    if idle >= MARK_CONNECTION_OLD_TIMEOUT {
                        return Err(InvocationError::Timeout);
                    }
                    if let Some(since) = waiting_since {
                        if now.duration_since(since) >= self.receive_timeout {
                            self.receive_timeout = (self.receive_timeout * 2).min(MAX_RECEIVE_TIMEOUT);
                            return Err(InvocationError::Timeout);
                        }
                    }
                    // a busy link still gets a ping now and then
                    if idle >= PING_SEND_AFTER || now.duration_since(last_ping) >= PING_SEND_AFTER_FORCE {
                        self.protocol.queue_ping();
                        last_ping = now;
                    }
                }
            }
        }
    }

    /// Hand the protocol's events out. Returns whether the key is gone.
    fn deliver_events(&mut self) -> bool {
        let mut key_destroyed = false;
        for event in self.protocol.take_events() {
            match event {
                Event::Response { request_id, result } => {
                    let waiter = self.shared.waiters.lock().map.remove(&request_id);
                    match waiter {
                        Some(waiter) => {
                            let _ = waiter.send(result.map_err(|e| RpcError::from(e).into()));
                        }
                        None => tracing::debug!("[conn] answer for request {request_id} nobody waits for"),
                    }
                }
                Event::Update(body) => {
                    // no subscribers is fine
                    let _ = self.updates.send(body);
                }
                Event::KeyDestroyed(answer) => {
                    tracing::info!("[conn] DC {}: {answer:?}", self.dc_id);
                    self.forget_key();
                    key_destroyed = true;
                }
            }
        }
        key_destroyed
    }
}
