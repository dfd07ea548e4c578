//! The session protocol engine: what to send next and what an incoming
//! frame means. Sans-IO; the connection runtime feeds it frames and timers.
//!
//! Outbound packing lives in `outbound.rs`, inbound dispatch in
//! `dispatcher.rs`; both extend [`Protocol`].

use std::sync::Arc;
use std::time::Instant;

use mtcore_tl::{enums, types};

use crate::consts::{CHECK_SENT_REQUEST_TIMEOUT, CONTAINER_LIVES};
use crate::message::MessageId;
use crate::session_data::{RequestId, SERVICE_REQUEST, SessionData};

/// Something the owner of the session has to act on.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// The answer to a queued request.
    Response { request_id: RequestId, result: Result<Vec<u8>, types::RpcError> },
    /// A server-initiated message, passed on as serialized TL.
    Update(Vec<u8>),
    /// The server answered `destroy_auth_key`.
    KeyDestroyed(enums::DestroyAuthKeyRes),
}

/// Outcome of handling one incoming frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleResult {
    Ok,
    /// Dropped because of a bad server time that could not be fixed.
    Ignored,
    /// The session was restarted with a fresh id; requests were queued again.
    ResetSession,
    /// The stream is unusable; reconnect.
    Restart,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct PingState {
    pub ping_id: i64,
    /// Zero until the ping is sent.
    pub msg_id: i64,
}

pub struct Protocol {
    pub(crate) data: Arc<SessionData>,
    pub(crate) ping: Option<PingState>,
    pub(crate) events: Vec<Event>,
}

impl Protocol {
    pub fn new(data: Arc<SessionData>) -> Self {
        Self { data, ping: None, events: Vec::new() }
    }

    pub fn data(&self) -> &Arc<SessionData> {
        &self.data
    }

    /// Queue a `ping_delay_disconnect`. Returns the ping id; an outstanding
    /// ping is reused.
    pub fn queue_ping(&mut self) -> i64 {
        if let Some(ping) = self.ping {
            return ping.ping_id;
        }
        let mut rnd = [0u8; 8];
        mtcore_crypto::random_fill(&mut rnd);
        let ping_id = i64::from_le_bytes(rnd);
        self.ping = Some(PingState { ping_id, msg_id: 0 });
        ping_id
    }

    /// Whether a ping is waiting for its pong.
    pub fn ping_outstanding(&self) -> bool {
        self.ping.is_some()
    }

    /// Ask the server to forget the current auth key. The answer comes back
    /// as [`Event::KeyDestroyed`].
    pub fn request_key_destroy(&mut self) {
        use mtcore_tl::Serializable;
        self.data.queue_reply(mtcore_tl::functions::DestroyAuthKey {}.to_bytes());
    }

    /// Periodic housekeeping: ask about requests unanswered for too long and
    /// forget containers nobody will mention any more.
    pub fn check_sent_requests(&mut self, now: Instant) {
        let server_now = self.data.server_now();
        let mut stale = Vec::new();
        {
            let mut have_sent = self.data.have_sent.write();
            have_sent.retain(|&id, req| {
                !req.is_container()
                    || server_now.wrapping_sub(MessageId(id).unixtime()) < CONTAINER_LIVES
            });
            for req in have_sent.values_mut() {
                if req.request_id == SERVICE_REQUEST {
                    continue;
                }
                let Some(sent_at) = req.sent_at else { continue };
                if now.saturating_duration_since(sent_at) >= CHECK_SENT_REQUEST_TIMEOUT {
                    stale.push(req.msg_id);
                    req.sent_at = Some(now);
                }
            }
        }
        if !stale.is_empty() {
            log::debug!("[session] asking state of {} stale request(s)", stale.len());
            self.data.queue_state_requests(stale);
        }
    }

    /// Drain the events produced so far.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Resend through the session data, forgetting a ping that got dropped.
    pub(crate) fn resend(&mut self, msg_id: i64) {
        let outcome = self.data.resend(msg_id);
        let dropped_ping = self
            .ping
            .is_some_and(|p| p.msg_id != 0 && outcome.dropped.contains(&p.msg_id));
        if dropped_ping {
            self.ping = None;
        }
    }

    pub(crate) fn reset_session(&mut self) {
        self.data.reset_session();
        self.ping = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_data::Request;
    use std::time::Duration;

    #[test]
    fn ping_is_reused_until_answered() {
        let mut proto = Protocol::new(Arc::new(SessionData::default()));
        let a = proto.queue_ping();
        assert_eq!(proto.queue_ping(), a);
        assert!(proto.ping_outstanding());
    }

    #[test]
    fn stale_requests_get_a_state_query() {
        let data = Arc::new(SessionData::default());
        let mut proto = Protocol::new(data.clone());
        let start = Instant::now();
        let rid = data.push(vec![0; 4], None);
        let mut req = data.to_send.write().remove(&rid).unwrap();
        req.msg_id = 100;
        req.sent_at = Some(start);
        data.have_sent.write().insert(100, req);

        proto.check_sent_requests(start + Duration::from_secs(3));
        assert!(data.outbox.lock().state_requests.is_empty());

        proto.check_sent_requests(start + Duration::from_secs(11));
        assert_eq!(data.outbox.lock().state_requests, vec![100]);

        // the clock restarts for that request
        proto.check_sent_requests(start + Duration::from_secs(12));
        assert_eq!(data.outbox.lock().state_requests.len(), 1);
    }

    #[test]
    fn old_containers_are_forgotten() {
        let data = Arc::new(SessionData::default());
        let mut proto = Protocol::new(data.clone());
        let ancient = MessageId::from_time(1_000_000_000, 0).0;
        data.have_sent.write().insert(ancient, Request::container(ancient, 0, vec![]));
        proto.check_sent_requests(Instant::now());
        assert!(data.have_sent.read().is_empty());
    }
}
