//! State shared between a session owner and the connection serving it.
//!
//! Every request lives in exactly one of `to_send`, `have_sent`, `to_resend`
//! or `were_acked` until it is answered or dropped. Methods that touch more
//! than one map take the locks in field declaration order.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use mtcore_crypto::{AuthKey, Scheme};
use parking_lot::{Mutex, RwLock};

use crate::consts::IDS_BUFFER_SIZE;
use crate::received_ids::{IdState, ReceivedIds};
use crate::session::Session;

/// Caller-visible handle of a queued request.
pub type RequestId = u32;

/// Request id carried by pings and containers; nobody waits on those.
pub const SERVICE_REQUEST: RequestId = 0;

/// One outgoing message and its bookkeeping.
#[derive(Clone, Debug)]
pub struct Request {
    pub request_id: RequestId,
    /// Serialized TL body.
    pub body: Vec<u8>,
    /// Zero until the request is numbered for sending.
    pub msg_id: i64,
    pub seq_no: i32,
    /// Content-related messages get odd sequence numbers and must be acked.
    pub needs_ack: bool,
    /// When the request was last written. `None` in `have_sent` marks a container.
    pub sent_at: Option<Instant>,
    /// Request that has to be sent first.
    pub after: Option<RequestId>,
    /// Ids of the messages a container carried.
    pub inner_ids: Vec<i64>,
    /// Set on resent requests so they never travel bare.
    pub force_container: bool,
}

impl Request {
    pub fn new(request_id: RequestId, body: Vec<u8>, after: Option<RequestId>) -> Self {
        Self {
            request_id,
            body,
            msg_id: 0,
            seq_no: 0,
            needs_ack: true,
            sent_at: None,
            after,
            inner_ids: Vec::new(),
            force_container: false,
        }
    }

    pub(crate) fn container(msg_id: i64, seq_no: i32, inner_ids: Vec<i64>) -> Self {
        Self {
            request_id: SERVICE_REQUEST,
            body: Vec::new(),
            msg_id,
            seq_no,
            needs_ack: false,
            sent_at: None,
            after: None,
            inner_ids,
            force_container: false,
        }
    }

    pub fn is_container(&self) -> bool {
        self.sent_at.is_none()
    }
}

/// Service messages waiting for the next outgoing packet.
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    pub acks: Vec<i64>,
    pub resend_requests: Vec<i64>,
    pub state_requests: Vec<i64>,
    /// Serialized content-related replies: `msgs_state_info`, `pong`.
    pub replies: Vec<Vec<u8>>,
}

impl Outbox {
    pub fn is_empty(&self) -> bool {
        self.acks.is_empty()
            && self.resend_requests.is_empty()
            && self.state_requests.is_empty()
            && self.replies.is_empty()
    }

    fn clear(&mut self) {
        self.acks.clear();
        self.resend_requests.clear();
        self.state_requests.clear();
        self.replies.clear();
    }
}

/// What [`SessionData::resend`] did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Resent {
    /// Requests moved back to `to_send`.
    pub requeued: usize,
    /// Service messages (pings) that were dropped instead.
    pub dropped: Vec<i64>,
}

pub struct SessionData {
    pub(crate) to_send: RwLock<BTreeMap<RequestId, Request>>,
    pub(crate) have_sent: RwLock<BTreeMap<i64, Request>>,
    pub(crate) to_resend: RwLock<BTreeMap<i64, RequestId>>,
    pub(crate) were_acked: RwLock<BTreeMap<i64, RequestId>>,
    pub(crate) state_requests: RwLock<BTreeMap<i64, Vec<i64>>>,
    pub(crate) received_ids: RwLock<ReceivedIds>,
    pub(crate) outbox: Mutex<Outbox>,
    pub(crate) session: Mutex<Session>,
    salt: RwLock<i64>,
    scheme: RwLock<Scheme>,
    key: RwLock<Option<Arc<AuthKey>>>,
    next_request_id: AtomicU32,
}

impl SessionData {
    pub fn new(scheme: Scheme) -> Self {
        Self::with_session(Session::new(), scheme)
    }

    pub fn with_session(session: Session, scheme: Scheme) -> Self {
        Self {
            to_send: RwLock::new(BTreeMap::new()),
            have_sent: RwLock::new(BTreeMap::new()),
            to_resend: RwLock::new(BTreeMap::new()),
            were_acked: RwLock::new(BTreeMap::new()),
            state_requests: RwLock::new(BTreeMap::new()),
            received_ids: RwLock::new(ReceivedIds::new()),
            outbox: Mutex::new(Outbox::default()),
            session: Mutex::new(session),
            salt: RwLock::new(0),
            scheme: RwLock::new(scheme),
            key: RwLock::new(None),
            next_request_id: AtomicU32::new(1),
        }
    }

    // ── key, salt, clock ─────────────────────────────────────────────────

    pub fn key(&self) -> Option<Arc<AuthKey>> {
        self.key.read().clone()
    }

    /// Install (or clear) the auth key. Requests already sent under the old
    /// key are queued again.
    pub fn set_key(&self, key: Option<Arc<AuthKey>>) {
        let changed = {
            let mut slot = self.key.write();
            let changed = slot.as_ref().map(|k| k.key_id()) != key.as_ref().map(|k| k.key_id());
            *slot = key;
            changed
        };
        if changed {
            self.resend_all();
        }
    }

    pub fn salt(&self) -> i64 {
        *self.salt.read()
    }

    pub fn set_salt(&self, salt: i64) {
        let mut current = self.salt.write();
        if *current != salt {
            log::debug!("[session] server salt changed");
            *current = salt;
        }
    }

    pub fn scheme(&self) -> Scheme {
        *self.scheme.read()
    }

    pub fn set_scheme(&self, scheme: Scheme) {
        *self.scheme.write() = scheme;
    }

    pub fn session_id(&self) -> i64 {
        self.session.lock().id()
    }

    pub fn time_offset(&self) -> i32 {
        self.session.lock().time_offset()
    }

    pub fn set_time_offset(&self, offset: i32) {
        self.session.lock().set_time_offset(offset);
    }

    /// Server time as the session currently estimates it.
    pub fn server_now(&self) -> i32 {
        self.session.lock().server_now()
    }

    pub(crate) fn correct_time(&self, server_time: i32, force: bool) {
        self.session.lock().correct_time(server_time, force);
    }

    // ── queueing ─────────────────────────────────────────────────────────

    /// Queue a serialized request. It goes out with the next packet.
    pub fn push(&self, body: Vec<u8>, after: Option<RequestId>) -> RequestId {
        let request_id = self.next_request_id();
        self.to_send.write().insert(request_id, Request::new(request_id, body, after));
        request_id
    }

    fn next_request_id(&self) -> RequestId {
        loop {
            let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
            if id != SERVICE_REQUEST {
                return id;
            }
        }
    }

    /// Forget a request whose caller gave up. Returns whether it was known.
    pub fn cancel(&self, request_id: RequestId) -> bool {
        let mut to_send = self.to_send.write();
        let mut have_sent = self.have_sent.write();
        let mut to_resend = self.to_resend.write();

        let mut found = to_send.remove(&request_id).is_some();
        let before = have_sent.len();
        have_sent.retain(|_, r| r.is_container() || r.request_id != request_id);
        found |= have_sent.len() != before;
        to_resend.retain(|_, rid| *rid != request_id);
        found
    }

    /// Requests not written yet.
    pub fn pending(&self) -> usize {
        self.to_send.read().len()
    }

    /// Requests written and not yet answered.
    pub fn in_flight(&self) -> usize {
        self.have_sent.read().values().filter(|r| !r.is_container()).count()
    }

    pub(crate) fn queue_ack(&self, msg_id: i64) {
        self.outbox.lock().acks.push(msg_id);
    }

    pub(crate) fn queue_resend_request(&self, msg_id: i64) {
        self.outbox.lock().resend_requests.push(msg_id);
    }

    pub(crate) fn queue_reply(&self, body: Vec<u8>) {
        self.outbox.lock().replies.push(body);
    }

    pub(crate) fn queue_state_requests(&self, ids: impl IntoIterator<Item = i64>) {
        self.outbox.lock().state_requests.extend(ids);
    }

    // ── bookkeeping ──────────────────────────────────────────────────────

    /// The request a message id of ours belonged to, if we still know it.
    ///
    /// Containers and pings report [`SERVICE_REQUEST`].
    pub fn was_sent(&self, msg_id: i64) -> Option<RequestId> {
        if let Some(r) = self.have_sent.read().get(&msg_id) {
            return Some(r.request_id);
        }
        if let Some(&rid) = self.to_resend.read().get(&msg_id) {
            return Some(rid);
        }
        self.were_acked.read().get(&msg_id).copied()
    }

    /// Mark messages as received by the server.
    ///
    /// An ack alone does not finish an RPC request, which keeps waiting for
    /// its result; `by_response` does. Acking a container acks its content.
    pub fn requests_acked(&self, ids: &[i64], by_response: bool) {
        let mut to_send = self.to_send.write();
        let mut have_sent = self.have_sent.write();
        let mut to_resend = self.to_resend.write();
        let mut were_acked = self.were_acked.write();
        let mut state_requests = self.state_requests.write();

        let mut work: Vec<i64> = ids.to_vec();
        while let Some(id) = work.pop() {
            if let Some(req) = have_sent.get(&id) {
                if req.is_container() {
                    if let Some(container) = have_sent.remove(&id) {
                        work.extend(container.inner_ids);
                    }
                    continue;
                }
                if !by_response && req.request_id != SERVICE_REQUEST {
                    continue;
                }
                let rid = req.request_id;
                have_sent.remove(&id);
                were_acked.insert(id, rid);
                if by_response && rid != SERVICE_REQUEST {
                    // older ids of a resent request are answered too
                    to_resend.retain(|_, r| *r != rid);
                }
                continue;
            }
            if state_requests.remove(&id).is_some() {
                continue;
            }
            if let Some(&rid) = to_resend.get(&id) {
                if !by_response && rid != SERVICE_REQUEST {
                    continue;
                }
                to_resend.remove(&id);
                to_send.remove(&rid);
                if by_response {
                    have_sent.retain(|_, r| r.request_id != rid);
                }
                were_acked.insert(id, rid);
            }
        }
        while were_acked.len() > IDS_BUFFER_SIZE {
            were_acked.pop_first();
        }
    }

    /// Put a sent message back in the queue. Containers are unpacked;
    /// service messages are dropped.
    pub fn resend(&self, msg_id: i64) -> Resent {
        let mut to_send = self.to_send.write();
        let mut have_sent = self.have_sent.write();
        let mut to_resend = self.to_resend.write();

        let mut outcome = Resent::default();
        let mut work = vec![msg_id];
        while let Some(id) = work.pop() {
            let Some(mut req) = have_sent.remove(&id) else {
                continue;
            };
            if req.is_container() {
                work.extend(req.inner_ids.drain(..));
                continue;
            }
            if req.request_id == SERVICE_REQUEST {
                outcome.dropped.push(id);
                continue;
            }
            log::debug!("[session] resending msg_id {id} as request {}", req.request_id);
            to_resend.insert(id, req.request_id);
            req.msg_id = 0;
            req.sent_at = None;
            req.force_container = true;
            to_send.insert(req.request_id, req);
            outcome.requeued += 1;
        }
        outcome
    }

    /// Queue every in-flight request again, e.g. after a reconnect.
    pub fn resend_all(&self) -> usize {
        let ids: Vec<i64> = self
            .have_sent
            .read()
            .iter()
            .filter(|(_, r)| !r.is_container() && r.request_id != SERVICE_REQUEST)
            .map(|(id, _)| *id)
            .collect();
        let requeued = ids.iter().map(|&id| self.resend(id).requeued).sum();
        self.have_sent.write().retain(|_, r| !r.is_container());
        requeued
    }

    /// Start a new session: fresh id, numbering from zero, in-flight requests
    /// queued again under new ids.
    pub fn reset_session(&self) {
        let mut to_send = self.to_send.write();
        let mut have_sent = self.have_sent.write();
        let mut to_resend = self.to_resend.write();
        let mut were_acked = self.were_acked.write();
        let mut state_requests = self.state_requests.write();
        let mut received_ids = self.received_ids.write();
        let mut outbox = self.outbox.lock();
        let mut session = self.session.lock();

        for (_, mut req) in std::mem::take(&mut *have_sent) {
            if req.is_container() || req.request_id == SERVICE_REQUEST {
                continue;
            }
            req.msg_id = 0;
            req.sent_at = None;
            to_send.entry(req.request_id).or_insert(req);
        }
        to_resend.clear();
        were_acked.clear();
        state_requests.clear();
        received_ids.clear();
        outbox.clear();
        session.reset();
        log::info!("[session] reset, new session id {:#018x}", session.id());
    }

    /// State byte reported in `msgs_state_info` for a server message id.
    pub fn msg_state(&self, msg_id: i64) -> u8 {
        let acked = self.were_acked.read().contains_key(&msg_id);
        let received = self.received_ids.read();
        if msg_id < received.min() {
            return 1;
        }
        if msg_id > received.max() {
            return 3;
        }
        match received.lookup(msg_id) {
            IdState::NotFound => 2,
            found => {
                let mut state = 4;
                if acked {
                    state |= 0x80;
                }
                state | if found == IdState::NeedsAck { 0x08 } else { 0x10 }
            }
        }
    }
}

impl Default for SessionData {
    fn default() -> Self { Self::new(Scheme::default()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sent(data: &SessionData, request_id: RequestId, msg_id: i64) {
        let mut req = data.to_send.write().remove(&request_id).unwrap_or_else(|| {
            Request::new(request_id, vec![0; 4], None)
        });
        req.msg_id = msg_id;
        req.sent_at = Some(Instant::now());
        data.have_sent.write().insert(msg_id, req);
    }

    #[test]
    fn ack_keeps_rpc_waiting_but_finishes_service() {
        let data = SessionData::default();
        let rid = data.push(vec![1, 2, 3, 4], None);
        sent(&data, rid, 100);
        sent(&data, SERVICE_REQUEST, 104);

        data.requests_acked(&[100, 104], false);
        assert_eq!(data.in_flight(), 1);
        assert_eq!(data.was_sent(104), Some(SERVICE_REQUEST));

        data.requests_acked(&[100], true);
        assert_eq!(data.in_flight(), 0);
        assert_eq!(data.was_sent(100), Some(rid));
    }

    #[test]
    fn container_ack_reaches_content() {
        let data = SessionData::default();
        sent(&data, SERVICE_REQUEST, 100);
        data.have_sent.write().insert(108, Request::container(108, 2, vec![100]));
        data.requests_acked(&[108], false);
        assert!(data.have_sent.read().is_empty());
        assert_eq!(data.were_acked.read().get(&100), Some(&SERVICE_REQUEST));
    }

    #[test]
    fn resend_unpacks_containers_and_drops_pings() {
        let data = SessionData::default();
        let a = data.push(vec![0; 4], None);
        let b = data.push(vec![0; 4], None);
        sent(&data, a, 100);
        sent(&data, b, 104);
        sent(&data, SERVICE_REQUEST, 108);
        data.have_sent.write().insert(112, Request::container(112, 6, vec![100, 104, 108]));

        let outcome = data.resend(112);
        assert_eq!(outcome, Resent { requeued: 2, dropped: vec![108] });
        assert_eq!(data.pending(), 2);
        assert!(data.to_send.read().values().all(|r| r.force_container && r.msg_id == 0));
        assert_eq!(data.was_sent(100), Some(a));
    }

    #[test]
    fn answer_to_old_id_cancels_pending_resend() {
        let data = SessionData::default();
        let rid = data.push(vec![0; 4], None);
        sent(&data, rid, 100);
        data.resend(100);
        assert_eq!(data.pending(), 1);

        data.requests_acked(&[100], true);
        assert_eq!(data.pending(), 0);
        assert_eq!(data.was_sent(100), Some(rid));
    }

    #[test]
    fn reset_requeues_in_flight() {
        let data = SessionData::default();
        let old_session = data.session_id();
        let rid = data.push(vec![0; 4], None);
        sent(&data, rid, 100);
        data.received_ids.write().register(201, true);
        data.queue_ack(201);

        data.reset_session();
        assert_ne!(data.session_id(), old_session);
        assert_eq!(data.pending(), 1);
        assert_eq!(data.in_flight(), 0);
        assert!(data.received_ids.read().is_empty());
        assert!(data.outbox.lock().is_empty());
    }

    #[test]
    fn state_bytes() {
        let data = SessionData::default();
        {
            let mut received = data.received_ids.write();
            received.register(101, true);
            received.register(109, false);
        }
        assert_eq!(data.msg_state(97), 1);
        assert_eq!(data.msg_state(105), 2);
        assert_eq!(data.msg_state(113), 3);
        assert_eq!(data.msg_state(101), 0x04 | 0x08);
        assert_eq!(data.msg_state(109), 0x04 | 0x10);
        data.were_acked.write().insert(109, 5);
        assert_eq!(data.msg_state(109), 0x80 | 0x04 | 0x10);
    }

    #[test]
    fn cancel_removes_everywhere() {
        let data = SessionData::default();
        let a = data.push(vec![0; 4], None);
        let b = data.push(vec![0; 4], None);
        sent(&data, b, 100);
        assert!(data.cancel(a));
        assert!(data.cancel(b));
        assert!(!data.cancel(b));
        assert_eq!((data.pending(), data.in_flight()), (0, 0));
    }

    #[test]
    fn new_key_requeues() {
        let data = SessionData::default();
        let rid = data.push(vec![0; 4], None);
        sent(&data, rid, 100);
        data.set_key(Some(Arc::new(AuthKey::from_bytes([3; 256]))));
        assert_eq!(data.pending(), 1);
        assert!(data.key().is_some());
    }
}
