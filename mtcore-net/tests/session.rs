//! A `Session` against a scripted server on an in-memory stream.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use mtcore_crypto::{AuthKey, Direction, Scheme};
use mtcore_mtproto::encrypted::{self, Header};
use mtcore_mtproto::transport::{Abridged, Framing};
use mtcore_net::{
    AccountContext, ConnectionConfig, ConnectionState, Connector, DcType, Endpoint, InvocationError, Session,
};
use mtcore_tl::{Blob, Boxed, Serializable, enums, functions, types};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

const SALT: i64 = 0x1122_3344_5566_7788;

/// Hands out the prepared streams, then refuses.
struct Streams(Mutex<Vec<DuplexStream>>);

impl Streams {
    fn one(stream: DuplexStream) -> Self {
        Self(Mutex::new(vec![stream]))
    }
}

impl Connector for Streams {
    type Stream = DuplexStream;

    fn connect(&self, _: &Endpoint) -> impl Future<Output = io::Result<DuplexStream>> + Send {
        let next = self.0.lock().pop();
        async move { next.ok_or_else(|| io::Error::from(io::ErrorKind::ConnectionRefused)) }
    }
}

fn test_key() -> AuthKey {
    let mut bytes = [0u8; 256];
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = (i * 13 + 5) as u8;
    }
    AuthKey::from_bytes(bytes)
}

struct Server {
    stream: DuplexStream,
    key: AuthKey,
    buf: Vec<u8>,
    counter: i64,
    session_id: i64,
}

struct Received {
    msg_id: i64,
    body: Vec<u8>,
}

impl Server {
    async fn accept(mut stream: DuplexStream) -> Self {
        let mut init = [0u8; 1];
        stream.read_exact(&mut init).await.unwrap();
        assert_eq!(init, [0xef], "abridged preamble");
        Self { stream, key: test_key(), buf: Vec::new(), counter: 1, session_id: 0 }
    }

    async fn read(&mut self) -> Received {
        loop {
            if let Some(unpacked) = Abridged.unpack(&self.buf).unwrap() {
                self.buf.drain(..unpacked.consumed);
                let mut frame = unpacked.payload;
                let msg = encrypted::open_as(&mut frame, &self.key, Scheme::V2, Direction::ClientToServer).unwrap();
                self.session_id = msg.session_id;
                return Received { msg_id: msg.msg_id, body: msg.body };
            }
            let n = self.stream.read_buf(&mut self.buf).await.unwrap();
            assert!(n > 0, "client hung up");
        }
    }

    /// The next message whose body is `expected`, skipping acks and the like.
    async fn read_request(&mut self, expected: &[u8]) -> i64 {
        loop {
            let received = self.read().await;
            if received.body == expected {
                return received.msg_id;
            }
        }
    }

    fn msg_id(&mut self, reply: bool) -> i64 {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64;
        self.counter += 1;
        (now << 32) | (self.counter << 2) | if reply { 1 } else { 3 }
    }

    async fn write(&mut self, body: &[u8], reply: bool) {
        self.write_seq(body, reply, 1).await;
    }

    async fn write_seq(&mut self, body: &[u8], reply: bool, seq_no: i32) {
        let header = Header { salt: SALT, session_id: self.session_id, msg_id: self.msg_id(reply), seq_no };
        let sealed = encrypted::seal_as(&self.key, Scheme::V2, Direction::ServerToClient, &header, body, &[0x33; 32]);
        let mut out = Vec::new();
        Abridged.pack(&sealed, &mut out);
        self.stream.write_all(&out).await.unwrap();
    }

    async fn write_raw(&mut self, payload: &[u8]) {
        let mut out = Vec::new();
        Abridged.pack(payload, &mut out);
        self.stream.write_all(&out).await.unwrap();
    }
}

fn account_with_key() -> Arc<AccountContext> {
    let account = Arc::new(AccountContext::new(ConnectionConfig { test_mode: true, ..Default::default() }));
    account.set_key(2, Arc::new(test_key()));
    account
}

fn sample_config() -> enums::Config {
    enums::Config::Config(types::Config {
        flags: 0,
        date: 1_700_000_000,
        expires: 1_700_003_600,
        test_mode: true,
        this_dc: 2,
        dc_options: Vec::new(),
    })
}

#[tokio::test]
async fn answers_and_updates_reach_the_caller() {
    let account = account_with_key();
    let (client, server_end) = tokio::io::duplex(1 << 16);
    let session = Session::connect_with(account, 2, DcType::Regular, Streams::one(client));
    let mut updates = session.updates();

    let script = tokio::spawn(async move {
        let mut server = Server::accept(server_end).await;
        let msg_id = server.read_request(&functions::help::GetConfig {}.to_bytes()).await;
        let answer = Boxed(types::RpcResult { req_msg_id: msg_id, result: Blob(sample_config().to_bytes()) });
        server.write(&answer.to_bytes(), true).await;
        server.write(&[0x78, 0x56, 0x34, 0x12, 1, 0, 0, 0], false).await;
        server
    });

    let enums::Config::Config(config) = session.invoke(&functions::help::GetConfig {}).await.unwrap();
    assert_eq!(config.this_dc, 2);
    assert_eq!(session.state(), ConnectionState::Connected);

    let update = updates.recv().await.unwrap();
    assert_eq!(update, [0x78, 0x56, 0x34, 0x12, 1, 0, 0, 0]);

    let _server = script.await.unwrap();
    session.shutdown().await;
}

#[tokio::test]
async fn rpc_errors_come_back_typed() {
    let account = account_with_key();
    let (client, server_end) = tokio::io::duplex(1 << 16);
    let session = Session::connect_with(account, 2, DcType::Regular, Streams::one(client));

    let script = tokio::spawn(async move {
        let mut server = Server::accept(server_end).await;
        let msg_id = server.read_request(&functions::help::GetConfig {}.to_bytes()).await;
        let error = Boxed(types::RpcError { error_code: 400, error_message: "CONNECTION_LAYER_INVALID".into() });
        let answer = Boxed(types::RpcResult { req_msg_id: msg_id, result: Blob(error.to_bytes()) });
        server.write(&answer.to_bytes(), true).await;
        server
    });

    let err = session.send(&functions::help::GetConfig {}).await.unwrap_err();
    assert!(err.is("CONNECTION_LAYER_INVALID"), "{err}");
    let _server = script.await.unwrap();
    session.shutdown().await;
}

#[tokio::test]
async fn shutdown_fails_unanswered_calls() {
    let account = account_with_key();
    let (client, server_end) = tokio::io::duplex(1 << 16);
    let session = Session::connect_with(account, 2, DcType::Regular, Streams::one(client));
    let pending = session.queue(&functions::help::GetConfig {}, None).unwrap();

    let mut server = Server::accept(server_end).await;
    server.read_request(&functions::help::GetConfig {}.to_bytes()).await;

    let mut state = session.subscribe_state();
    session.shutdown().await;
    assert!(matches!(pending.wait().await, Err(InvocationError::Dropped)));
    assert_eq!(*state.borrow_and_update(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn unknown_key_is_forgotten() {
    let account = account_with_key();
    let (client, server_end) = tokio::io::duplex(1 << 16);
    let session = Session::connect_with(account.clone(), 2, DcType::Regular, Streams::one(client));
    let mut state = session.subscribe_state();

    let mut server = Server::accept(server_end).await;
    server.write_raw(&(-404i32).to_le_bytes()).await;

    state.wait_for(|s| matches!(s, ConnectionState::RetryWait(_))).await.unwrap();
    assert!(account.key(2).is_none());
    session.shutdown().await;
}

#[tokio::test]
async fn destroyed_key_is_dropped_from_the_account() {
    let account = account_with_key();
    let (client, server_end) = tokio::io::duplex(1 << 16);
    let session = Session::connect_with(account.clone(), 2, DcType::Regular, Streams::one(client));
    let mut state = session.subscribe_state();
    state.wait_for(|s| *s == ConnectionState::Connected).await.unwrap();

    let mut server = Server::accept(server_end).await;
    session.destroy_key();
    server.read_request(&functions::DestroyAuthKey {}.to_bytes()).await;
    server.write(&Boxed(types::DestroyAuthKeyOk {}).to_bytes(), false).await;

    state.wait_for(|s| matches!(s, ConnectionState::RetryWait(_))).await.unwrap();
    assert!(account.key(2).is_none());
    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unrelated_traffic_keeps_the_receive_timeout_running() {
    let account = account_with_key();
    let (client, server_end) = tokio::io::duplex(1 << 16);
    let session = Session::connect_with(account, 2, DcType::Regular, Streams::one(client));
    let mut state = session.subscribe_state();
    let _pending = session.queue(&functions::help::GetConfig {}, None).unwrap();

    let mut server = Server::accept(server_end).await;
    server.read_request(&functions::help::GetConfig {}.to_bytes()).await;
    // an update that needs no ack, so the client has nothing to send back
    server.write_seq(&[0x78, 0x56, 0x34, 0x12, 2, 0, 0, 0], false, 2).await;

    let gave_up = tokio::time::timeout(
        Duration::from_secs(10),
        state.wait_for(|s| matches!(s, ConnectionState::RetryWait(_))),
    )
    .await;
    assert!(gave_up.is_ok(), "the unanswered request never timed out");
    drop(gave_up);
    session.shutdown().await;
}
