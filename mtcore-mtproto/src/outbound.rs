//! Packing queued requests and service messages into the next packet.

use std::time::Instant;

use mtcore_tl::{Boxed, Serializable, functions, types};

use crate::consts::{CUT_CONTAINER_ON_SIZE, PING_DELAY_DISCONNECT};
use crate::encrypted::{self, Header};
use crate::protocol::Protocol;
use crate::session_data::{Request, SERVICE_REQUEST};

/// How a packed message is remembered once written.
enum Track {
    /// Acks and replies: nobody waits for them.
    None,
    Ping,
    StateRequest(Vec<i64>),
    Request(Request),
}

struct Item {
    body: Vec<u8>,
    content_related: bool,
    force_container: bool,
    track: Track,
}

impl Item {
    fn service(body: Vec<u8>, content_related: bool, track: Track) -> Self {
        Self { body, content_related, force_container: false, track }
    }
}

impl Protocol {
    /// Build the next encrypted packet, or `None` when there is nothing to
    /// send or no key yet.
    ///
    /// A single message goes bare; anything more travels in a
    /// `msg_container` whose id is allocated after its content. Call again
    /// until it returns `None` to flush everything.
    pub fn prepare_send(&mut self) -> Option<Vec<u8>> {
        let key = self.data.key()?;
        let now = Instant::now();

        let (msg_id, seq_no, body) = {
            let mut to_send = self.data.to_send.write();
            let mut have_sent = self.data.have_sent.write();
            let mut state_requests = self.data.state_requests.write();
            let mut outbox = self.data.outbox.lock();
            let mut session = self.data.session.lock();

            let mut items = Vec::new();
            let mut size = 0;

            if let Some(ping) = self.ping.filter(|p| p.msg_id == 0) {
                let call = functions::PingDelayDisconnect {
                    ping_id: ping.ping_id,
                    disconnect_delay: PING_DELAY_DISCONNECT,
                };
                items.push(Item::service(call.to_bytes(), true, Track::Ping));
            }
            if !outbox.acks.is_empty() {
                let msg_ids = std::mem::take(&mut outbox.acks);
                items.push(Item::service(Boxed(types::MsgsAck { msg_ids }).to_bytes(), false, Track::None));
            }
            if !outbox.resend_requests.is_empty() {
                let msg_ids = std::mem::take(&mut outbox.resend_requests);
                items.push(Item::service(Boxed(types::MsgResendReq { msg_ids }).to_bytes(), true, Track::None));
            }
            if !outbox.state_requests.is_empty() {
                let msg_ids = std::mem::take(&mut outbox.state_requests);
                let body = Boxed(types::MsgsStateReq { msg_ids: msg_ids.clone() }).to_bytes();
                items.push(Item::service(body, true, Track::StateRequest(msg_ids)));
            }
            for reply in outbox.replies.drain(..) {
                items.push(Item::service(reply, true, Track::None));
            }
            size += items.iter().map(|i| i.body.len()).sum::<usize>();

            let mut picked = Vec::new();
            for (&rid, req) in to_send.iter() {
                if !picked.is_empty() && size >= CUT_CONTAINER_ON_SIZE {
                    break;
                }
                // a container gives no ordering; the dependent goes in a later packet
                if req.after.is_some_and(|dep| to_send.contains_key(&dep)) {
                    continue;
                }
                size += req.body.len();
                picked.push(rid);
            }
            for rid in picked {
                if let Some(req) = to_send.remove(&rid) {
                    items.push(Item {
                        body: req.body.clone(),
                        content_related: req.needs_ack,
                        force_container: req.force_container,
                        track: Track::Request(req),
                    });
                }
            }

            if items.is_empty() {
                return None;
            }

            let mut numbered = Vec::with_capacity(items.len());
            for item in items {
                let id = session.next_msg_id().0;
                let seq = session.next_seq_no(item.content_related);
                numbered.push((id, seq, item));
            }

            let mut remember = |id: i64, seq: i32, track: Track| match track {
                Track::None => {}
                Track::Ping => {
                    if let Some(ping) = self.ping.as_mut() {
                        ping.msg_id = id;
                    }
                    let mut req = Request::new(SERVICE_REQUEST, Vec::new(), None);
                    req.msg_id = id;
                    req.seq_no = seq;
                    req.sent_at = Some(now);
                    have_sent.insert(id, req);
                }
                Track::StateRequest(ids) => {
                    state_requests.insert(id, ids);
                }
                Track::Request(mut req) => {
                    req.msg_id = id;
                    req.seq_no = seq;
                    req.sent_at = Some(now);
                    have_sent.insert(id, req);
                }
            };

            let bare = numbered.len() == 1 && !numbered[0].2.force_container;
            if bare {
                let Some((id, seq, item)) = numbered.pop() else { return None };
                remember(id, seq, item.track);
                (id, seq, item.body)
            } else {
                let mut container = types::MsgContainer::default();
                let mut inner_ids = Vec::with_capacity(numbered.len());
                for (id, seq, item) in numbered {
                    container.messages.push(types::Message { msg_id: id, seqno: seq, body: item.body });
                    inner_ids.push(id);
                    remember(id, seq, item.track);
                }
                let id = session.next_msg_id().0;
                let seq = session.next_seq_no(false);
                have_sent.insert(id, Request::container(id, seq, inner_ids));
                (id, seq, Boxed(container).to_bytes())
            }
        };

        let header = Header {
            salt: self.data.salt(),
            session_id: self.data.session_id(),
            msg_id,
            seq_no,
        };
        log::trace!("[session] sending msg_id {msg_id} seq_no {seq_no} ({} bytes)", body.len());
        Some(encrypted::seal(&key, self.data.scheme(), &header, &body))
    }

    /// Whether [`prepare_send`](Self::prepare_send) would produce a packet.
    pub fn has_outgoing(&self) -> bool {
        self.ping.is_some_and(|p| p.msg_id == 0)
            || self.data.pending() > 0
            || !self.data.outbox.lock().is_empty()
    }
}
