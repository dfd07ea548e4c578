use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use mtcore_crypto::{AuthKey, Direction, Scheme};
use mtcore_mtproto::encrypted::{self, Header};
use mtcore_mtproto::service::ServiceMessage;
use mtcore_mtproto::{Event, HandleResult, Protocol, SessionData};
use mtcore_tl::{Blob, Boxed, Serializable, types};

const SALT: i64 = 0x0102_0304_0506_0708;

struct Server {
    key: AuthKey,
    counter: AtomicI64,
}

impl Server {
    fn new() -> Self {
        let mut bytes = [0u8; 256];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = (i * 7 + 3) as u8;
        }
        Self { key: AuthKey::from_bytes(bytes), counter: AtomicI64::new(1) }
    }

    fn client(&self) -> (Arc<SessionData>, Protocol) {
        let data = Arc::new(SessionData::new(Scheme::V2));
        data.set_key(Some(Arc::new(self.key.clone())));
        data.set_salt(SALT);
        let proto = Protocol::new(data.clone());
        (data, proto)
    }

    /// A server msg_id for the current second; `reply` selects the `01` tag.
    fn msg_id(&self, reply: bool) -> i64 {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64;
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        (now << 32) | (n << 2) | if reply { 1 } else { 3 }
    }

    fn frame(&self, session_id: i64, msg_id: i64, seq_no: i32, body: &[u8]) -> Vec<u8> {
        let header = Header { salt: SALT, session_id, msg_id, seq_no };
        encrypted::seal_as(&self.key, Scheme::V2, Direction::ServerToClient, &header, body, &[0x5a; 32])
    }

    /// Decrypt what the client sent.
    fn read(&self, mut frame: Vec<u8>) -> (i64, i32, ServiceMessage, Vec<u8>) {
        let msg = encrypted::open_as(&mut frame, &self.key, Scheme::V2, Direction::ClientToServer).unwrap();
        let parsed = ServiceMessage::parse(&msg.body).unwrap();
        (msg.msg_id, msg.seq_no, parsed, msg.body)
    }
}

fn request_body(tag: u8) -> Vec<u8> {
    vec![0x11, 0x22, 0x33, tag, 0, 0, 0, 0]
}

#[test]
fn lone_request_goes_bare() {
    let server = Server::new();
    let (data, mut proto) = server.client();
    data.push(request_body(1), None);

    let (msg_id, seq_no, _, body) = server.read(proto.prepare_send().unwrap());
    assert_eq!(body, request_body(1));
    assert_eq!(msg_id & 3, 0);
    assert_eq!(seq_no, 1);
    assert!(proto.prepare_send().is_none());
    assert_eq!(data.in_flight(), 1);
}

#[test]
fn several_requests_share_a_container() {
    let server = Server::new();
    let (data, mut proto) = server.client();
    data.push(request_body(1), None);
    data.push(request_body(2), None);

    let (container_id, container_seq, parsed, _) = server.read(proto.prepare_send().unwrap());
    let ServiceMessage::Container(container) = parsed else {
        panic!("expected a container, got {parsed:?}");
    };
    assert_eq!(container.messages.len(), 2);
    let ids: Vec<i64> = container.messages.iter().map(|m| m.msg_id).collect();
    assert!(ids[0] < ids[1] && ids[1] < container_id);
    assert!(ids.iter().all(|id| id & 3 == 0));
    assert_eq!(container.messages[0].seqno, 1);
    assert_eq!(container.messages[1].seqno, 3);
    assert_eq!(container_seq % 2, 0);
    assert_eq!(container.messages[1].body, request_body(2));
    assert_eq!(data.in_flight(), 2);
}

#[test]
fn dependent_request_waits() {
    let server = Server::new();
    let (data, mut proto) = server.client();
    let first = data.push(request_body(1), None);
    data.cancel(first);
    let a = data.push(request_body(2), None);
    // queued after `a`, which is still unsent
    let b = data.push(request_body(3), Some(a));
    assert!(b > a);

    let (_, _, parsed, body) = server.read(proto.prepare_send().unwrap());
    assert!(!matches!(parsed, ServiceMessage::Container(_)));
    assert_eq!(body, request_body(2));

    let (_, _, parsed, body) = server.read(proto.prepare_send().unwrap());
    assert!(!matches!(parsed, ServiceMessage::Container(_)));
    assert_eq!(body, request_body(3));
    assert!(proto.prepare_send().is_none());
}

#[test]
fn dependent_follows_a_dependency_already_sent() {
    let server = Server::new();
    let (data, mut proto) = server.client();
    let a = data.push(request_body(1), None);
    server.read(proto.prepare_send().unwrap());

    data.push(request_body(2), Some(a));
    data.push(request_body(3), None);
    let (_, _, parsed, _) = server.read(proto.prepare_send().unwrap());
    assert!(matches!(parsed, ServiceMessage::Container(ref c) if c.messages.len() == 2));
}

#[test]
fn rpc_result_is_delivered_and_acked() {
    let server = Server::new();
    let (data, mut proto) = server.client();
    let rid = data.push(request_body(1), None);
    let (req_msg_id, _, _, _) = server.read(proto.prepare_send().unwrap());

    let answer = Boxed(types::RpcResult { req_msg_id, result: Blob(vec![9, 8, 7, 6]) }).to_bytes();
    let server_msg = server.msg_id(true);
    let mut frame = server.frame(data.session_id(), server_msg, 1, &answer);
    assert_eq!(proto.handle_frame(&mut frame).unwrap(), HandleResult::Ok);

    assert_eq!(
        proto.take_events(),
        vec![Event::Response { request_id: rid, result: Ok(vec![9, 8, 7, 6]) }]
    );
    assert_eq!(data.in_flight(), 0);

    let (_, seq_no, parsed, _) = server.read(proto.prepare_send().unwrap());
    assert_eq!(seq_no % 2, 0);
    assert_eq!(parsed, ServiceMessage::MsgsAck(types::MsgsAck { msg_ids: vec![server_msg] }));
}

#[test]
fn rpc_error_surfaces() {
    let server = Server::new();
    let (data, mut proto) = server.client();
    let rid = data.push(request_body(1), None);
    let (req_msg_id, _, _, _) = server.read(proto.prepare_send().unwrap());

    let error = Boxed(types::RpcError { error_code: 420, error_message: "FLOOD_WAIT_3".into() });
    let answer = Boxed(types::RpcResult { req_msg_id, result: Blob(error.to_bytes()) }).to_bytes();
    let mut frame = server.frame(data.session_id(), server.msg_id(true), 1, &answer);
    proto.handle_frame(&mut frame).unwrap();

    match proto.take_events().as_slice() {
        [Event::Response { request_id, result: Err(e) }] => {
            assert_eq!(*request_id, rid);
            assert_eq!(e.error_code, 420);
        }
        other => panic!("unexpected events {other:?}"),
    }
}

#[test]
fn replayed_frame_is_dropped() {
    let server = Server::new();
    let (data, mut proto) = server.client();
    data.push(request_body(1), None);
    let (req_msg_id, _, _, _) = server.read(proto.prepare_send().unwrap());

    let answer = Boxed(types::RpcResult { req_msg_id, result: Blob(vec![1, 1, 1, 1]) }).to_bytes();
    let frame = server.frame(data.session_id(), server.msg_id(true), 1, &answer);

    assert_eq!(proto.handle_frame(&mut frame.clone()).unwrap(), HandleResult::Ok);
    assert_eq!(proto.take_events().len(), 1);
    assert_eq!(proto.handle_frame(&mut frame.clone()).unwrap(), HandleResult::Ok);
    assert!(proto.take_events().is_empty());
}

#[test]
fn bad_msg_16_resends_only_that_request() {
    let server = Server::new();
    let (data, mut proto) = server.client();
    let a = data.push(request_body(1), None);
    let (a_msg, _, _, _) = server.read(proto.prepare_send().unwrap());
    let b = data.push(request_body(2), None);
    let (b_msg, _, _, _) = server.read(proto.prepare_send().unwrap());
    let session_id = data.session_id();

    let notify = Boxed(types::BadMsgNotification { bad_msg_id: a_msg, bad_msg_seqno: 1, error_code: 16 });
    let mut frame = server.frame(session_id, server.msg_id(false), 2, &notify.to_bytes());
    assert_eq!(proto.handle_frame(&mut frame).unwrap(), HandleResult::Ok);

    assert_eq!(data.session_id(), session_id);
    assert_eq!(data.pending(), 1);
    assert_eq!(data.was_sent(b_msg), Some(b));
    assert_eq!(data.in_flight(), 1);

    // resent requests always travel in a container
    let (_, _, parsed, _) = server.read(proto.prepare_send().unwrap());
    let ServiceMessage::Container(container) = parsed else { panic!("expected a container") };
    assert_eq!(container.messages.len(), 1);
    assert_ne!(container.messages[0].msg_id, a_msg);
    assert_eq!(data.was_sent(container.messages[0].msg_id), Some(a));
}

#[test]
fn seq_no_notification_for_unknown_message_is_ignored() {
    let server = Server::new();
    let (data, mut proto) = server.client();
    let rid = data.push(request_body(1), None);
    let (msg_id, _, _, _) = server.read(proto.prepare_send().unwrap());
    let session_id = data.session_id();

    let notify = Boxed(types::BadMsgNotification { bad_msg_id: msg_id + 4, bad_msg_seqno: 1, error_code: 32 });
    let mut frame = server.frame(session_id, server.msg_id(false), 2, &notify.to_bytes());
    assert_eq!(proto.handle_frame(&mut frame).unwrap(), HandleResult::Ignored);

    assert_eq!(data.session_id(), session_id);
    assert_eq!(data.was_sent(msg_id), Some(rid));
}

#[test]
fn seq_no_notification_for_our_message_resets() {
    let server = Server::new();
    let (data, mut proto) = server.client();
    data.push(request_body(1), None);
    let (msg_id, _, _, _) = server.read(proto.prepare_send().unwrap());
    let session_id = data.session_id();

    let notify = Boxed(types::BadMsgNotification { bad_msg_id: msg_id, bad_msg_seqno: 1, error_code: 33 });
    let mut frame = server.frame(session_id, server.msg_id(false), 2, &notify.to_bytes());
    assert_eq!(proto.handle_frame(&mut frame).unwrap(), HandleResult::ResetSession);
    assert_ne!(data.session_id(), session_id);
}

#[test]
fn bad_msg_48_resets_the_session() {
    let server = Server::new();
    let (data, mut proto) = server.client();
    let rid = data.push(request_body(1), None);
    let (msg_id, _, _, _) = server.read(proto.prepare_send().unwrap());
    let other = data.push(request_body(2), None);
    server.read(proto.prepare_send().unwrap());
    let session_id = data.session_id();

    let notify = Boxed(types::BadMsgNotification { bad_msg_id: msg_id, bad_msg_seqno: 1, error_code: 48 });
    let mut frame = server.frame(session_id, server.msg_id(false), 2, &notify.to_bytes());
    assert_eq!(proto.handle_frame(&mut frame).unwrap(), HandleResult::ResetSession);

    assert_ne!(data.session_id(), session_id);
    match proto.take_events().as_slice() {
        [Event::Response { request_id, result: Err(e) }] => {
            assert_eq!(*request_id, rid);
            assert_eq!((e.error_code, e.error_message.as_str()), (500, "PROTOCOL_ERROR"));
        }
        other => panic!("unexpected events {other:?}"),
    }
    // the unrelated request is queued again for the new session
    assert_eq!(data.pending(), 1);
    assert!(data.cancel(other));
}

#[test]
fn bad_server_salt_adopts_the_new_salt() {
    let server = Server::new();
    let (data, mut proto) = server.client();
    data.push(request_body(1), None);
    let (msg_id, _, _, _) = server.read(proto.prepare_send().unwrap());

    let notify = Boxed(types::BadServerSalt {
        bad_msg_id: msg_id,
        bad_msg_seqno: 1,
        error_code: 48,
        new_server_salt: 77,
    });
    let mut frame = server.frame(data.session_id(), server.msg_id(false), 2, &notify.to_bytes());
    assert_eq!(proto.handle_frame(&mut frame).unwrap(), HandleResult::Ok);
    assert_eq!(data.salt(), 77);
    assert_eq!(data.pending(), 1);
}

#[test]
fn new_session_created_resends_older_requests() {
    let server = Server::new();
    let (data, mut proto) = server.client();
    let rid = data.push(request_body(1), None);
    let (msg_id, _, _, _) = server.read(proto.prepare_send().unwrap());

    let created = Boxed(types::NewSessionCreated {
        first_msg_id: msg_id + 4,
        unique_id: 1,
        server_salt: 99,
    });
    let mut frame = server.frame(data.session_id(), server.msg_id(false), 1, &created.to_bytes());
    assert_eq!(proto.handle_frame(&mut frame).unwrap(), HandleResult::Ok);

    assert_eq!(data.salt(), 99);
    assert_eq!(data.pending(), 1);
    assert_eq!(data.was_sent(msg_id), Some(rid));
    assert!(matches!(proto.take_events().as_slice(), [Event::Update(_)]));
}

#[test]
fn state_request_gets_state_info() {
    let server = Server::new();
    let (data, mut proto) = server.client();
    let session_id = data.session_id();

    let seen = server.msg_id(false);
    let mut update = server.frame(session_id, seen, 1, &0xdead_beefu32.to_le_bytes());
    proto.handle_frame(&mut update).unwrap();

    let unseen = seen + 8;
    let req_id = server.msg_id(false);
    let req = Boxed(types::MsgsStateReq { msg_ids: vec![seen, unseen] });
    let mut frame = server.frame(session_id, req_id, 3, &req.to_bytes());
    proto.handle_frame(&mut frame).unwrap();

    let (_, _, parsed, _) = server.read(proto.prepare_send().unwrap());
    let ServiceMessage::Container(container) = parsed else { panic!("expected a container") };
    let info = container
        .messages
        .iter()
        .find_map(|m| match ServiceMessage::parse(&m.body) {
            Ok(ServiceMessage::MsgsStateInfo(info)) => Some(info),
            _ => None,
        })
        .unwrap();
    assert_eq!(info.req_msg_id, req_id);
    assert_eq!(info.info[0] & 0x07, 0x04);
    assert_ne!(info.info[1] & 0x07, 0x04);
}

#[test]
fn ping_answers_with_pong() {
    let server = Server::new();
    let (data, mut proto) = server.client();
    let ping_msg = server.msg_id(false);
    let mut body = 0x7abe77ecu32.to_le_bytes().to_vec();
    body.extend_from_slice(&4242i64.to_le_bytes());
    let mut frame = server.frame(data.session_id(), ping_msg, 1, &body);
    proto.handle_frame(&mut frame).unwrap();

    let (_, _, parsed, _) = server.read(proto.prepare_send().unwrap());
    let ServiceMessage::Container(container) = parsed else { panic!("expected a container") };
    let pong = container
        .messages
        .iter()
        .find_map(|m| match ServiceMessage::parse(&m.body) {
            Ok(ServiceMessage::Pong(p)) => Some(p),
            _ => None,
        })
        .unwrap();
    assert_eq!((pong.msg_id, pong.ping_id), (ping_msg, 4242));
}

#[test]
fn pong_clears_the_ping() {
    let server = Server::new();
    let (data, mut proto) = server.client();
    let ping_id = proto.queue_ping();
    let (msg_id, _, _, _) = server.read(proto.prepare_send().unwrap());
    assert!(proto.ping_outstanding());

    let pong = Boxed(types::Pong { msg_id, ping_id });
    let mut frame = server.frame(data.session_id(), server.msg_id(true), 1, &pong.to_bytes());
    assert_eq!(proto.handle_frame(&mut frame).unwrap(), HandleResult::Ok);
    assert!(!proto.ping_outstanding());
}

#[test]
fn frame_for_another_session_is_rejected() {
    let server = Server::new();
    let (data, mut proto) = server.client();
    let mut frame = server.frame(data.session_id() ^ 1, server.msg_id(false), 1, &[0; 4]);
    assert!(proto.handle_frame(&mut frame).is_err());
}

#[test]
fn update_with_bad_time_resets() {
    let server = Server::new();
    let (data, mut proto) = server.client();
    let session_id = data.session_id();
    let stale = (1_000_000_000i64 << 32) | 3;
    let mut frame = server.frame(session_id, stale, 1, &0xdead_beefu32.to_le_bytes());
    assert_eq!(proto.handle_frame(&mut frame).unwrap(), HandleResult::ResetSession);
    assert_ne!(data.session_id(), session_id);
}
