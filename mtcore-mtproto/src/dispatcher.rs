//! Handling of incoming encrypted frames.

use std::io::Read;

use flate2::read::GzDecoder;
use mtcore_tl::{Boxed, Deserializable, Identifiable, Serializable, types};

use crate::consts::{BAD_TIME_AHEAD, BAD_TIME_BEHIND, MAX_MESSAGE_LENGTH};
use crate::encrypted::{self, EnvelopeError};
use crate::protocol::{Event, HandleResult, Protocol};
use crate::received_ids::{IdState, Registered};
use crate::service::ServiceMessage;
use crate::session_data::SERVICE_REQUEST;

/// Facts about the envelope every nested message inherits.
#[derive(Clone, Copy, Debug)]
struct Outer {
    server_salt: i64,
    server_time: i32,
    bad_time: bool,
}

impl Protocol {
    /// Decrypt, validate and dispatch one frame from the server.
    ///
    /// Envelope failures are returned as errors and mean the connection
    /// must be restarted. [`HandleResult::ResetSession`] has already been
    /// applied when it is returned.
    pub fn handle_frame(&mut self, frame: &mut [u8]) -> Result<HandleResult, EnvelopeError> {
        let Some(key) = self.data.key() else {
            log::warn!("[session] encrypted frame without a key");
            return Ok(HandleResult::Restart);
        };
        let message = encrypted::open(frame, &key, self.data.scheme(), self.data.session_id())?;

        let server_time = (message.msg_id >> 32) as i32;
        let now = self.data.server_now();
        let bad_time = server_time > now.wrapping_add(BAD_TIME_AHEAD)
            || server_time.wrapping_add(BAD_TIME_BEHIND) < now;
        if bad_time {
            log::debug!("[session] bad server time {server_time}, ours {now}");
        } else {
            self.data.set_salt(message.salt);
        }
        let outer = Outer { server_salt: message.salt, server_time, bad_time };

        let result = self.receive(message.msg_id, message.seq_no, &message.body, outer);
        self.data.received_ids.write().shrink();

        if result == HandleResult::ResetSession {
            self.reset_session();
        }
        Ok(result)
    }

    fn receive(&mut self, msg_id: i64, seq_no: i32, body: &[u8], outer: Outer) -> HandleResult {
        let needs_ack = seq_no & 1 != 0;
        let registered = self.data.received_ids.write().register(msg_id, needs_ack);
        match registered {
            Registered::TooOld => {
                log::warn!("[session] msg_id {msg_id} is older than everything remembered");
                return HandleResult::ResetSession;
            }
            Registered::Duplicate => {
                log::debug!("[session] duplicate msg_id {msg_id} dropped");
                if needs_ack {
                    self.data.queue_ack(msg_id);
                }
                return HandleResult::Ok;
            }
            Registered::Fresh => {}
        }
        if needs_ack {
            self.data.queue_ack(msg_id);
        }
        self.handle_one(msg_id, body, outer)
    }

    fn handle_one(&mut self, msg_id: i64, body: &[u8], outer: Outer) -> HandleResult {
        let message = match ServiceMessage::parse(body) {
            Ok(m) => m,
            Err(e) => {
                log::warn!("[session] malformed message {msg_id}: {e}");
                return HandleResult::Restart;
            }
        };

        match message {
            ServiceMessage::Container(container) => {
                for inner in container.messages {
                    if !matches!(inner.msg_id & 3, 1 | 3) || inner.body.len() % 4 != 0 {
                        log::warn!("[session] bad message {} in container", inner.msg_id);
                        return HandleResult::Restart;
                    }
                    match self.receive(inner.msg_id, inner.seqno, &inner.body, outer) {
                        HandleResult::Ok | HandleResult::Ignored => {}
                        other => return other,
                    }
                }
                HandleResult::Ok
            }

            ServiceMessage::GzipPacked(packed) => match gunzip(&packed.packed_data) {
                Ok(unpacked) => self.handle_one(msg_id, &unpacked, outer),
                Err(e) => {
                    log::warn!("[session] gzip_packed {msg_id}: {e}");
                    HandleResult::Restart
                }
            },

            ServiceMessage::MsgsAck(ack) => {
                if outer.bad_time && !self.fix_time_salt(&ack.msg_ids, outer) {
                    return HandleResult::Ignored;
                }
                self.data.requests_acked(&ack.msg_ids, false);
                HandleResult::Ok
            }

            ServiceMessage::BadMsgNotification(n) => self.bad_msg(n, outer),

            ServiceMessage::BadServerSalt(n) => {
                if self.data.was_sent(n.bad_msg_id).is_none() {
                    return ignored_if(outer.bad_time);
                }
                log::debug!("[session] bad_server_salt for {}", n.bad_msg_id);
                self.data.set_salt(n.new_server_salt);
                self.data.correct_time(outer.server_time, false);
                self.resend(n.bad_msg_id);
                HandleResult::Ok
            }

            ServiceMessage::MsgsStateReq(req) => {
                let info: Vec<u8> = req.msg_ids.iter().map(|&id| self.data.msg_state(id)).collect();
                let reply = Boxed(types::MsgsStateInfo { req_msg_id: msg_id, info });
                self.data.queue_reply(reply.to_bytes());
                HandleResult::Ok
            }

            ServiceMessage::MsgsStateInfo(info) => {
                let asked = self.data.state_requests.read().get(&info.req_msg_id).cloned();
                let Some(ids) = asked else {
                    return ignored_if(outer.bad_time);
                };
                if outer.bad_time {
                    self.data.correct_time(outer.server_time, true);
                    self.data.set_salt(outer.server_salt);
                }
                self.data.requests_acked(&[info.req_msg_id], true);
                self.handle_msgs_states(&ids, &info.info);
                HandleResult::Ok
            }

            ServiceMessage::MsgsAllInfo(info) => {
                if outer.bad_time {
                    return HandleResult::Ignored;
                }
                self.handle_msgs_states(&info.msg_ids, &info.info);
                HandleResult::Ok
            }

            ServiceMessage::MsgDetailedInfo(info) => {
                if outer.bad_time && !self.fix_time_salt(&[info.msg_id], outer) {
                    return HandleResult::Ignored;
                }
                self.data.requests_acked(&[info.msg_id], false);
                self.answer_available(info.answer_msg_id);
                HandleResult::Ok
            }

            ServiceMessage::MsgNewDetailedInfo(info) => {
                if outer.bad_time {
                    return HandleResult::Ignored;
                }
                self.answer_available(info.answer_msg_id);
                HandleResult::Ok
            }

            ServiceMessage::MsgResendReq(req) => {
                for id in req.msg_ids {
                    self.resend(id);
                }
                HandleResult::Ok
            }

            ServiceMessage::RpcResult(result) => self.rpc_result(result, outer),

            ServiceMessage::NewSessionCreated(created) => {
                if outer.bad_time && !self.fix_time_salt(&[created.first_msg_id], outer) {
                    return HandleResult::Ignored;
                }
                self.data.set_salt(created.server_salt);
                let earlier: Vec<i64> = self
                    .data
                    .have_sent
                    .read()
                    .iter()
                    .filter(|(id, r)| {
                        **id < created.first_msg_id
                            && !r.is_container()
                            && r.request_id != SERVICE_REQUEST
                    })
                    .map(|(id, _)| *id)
                    .collect();
                log::info!(
                    "[session] new session created, resending {} earlier request(s)",
                    earlier.len()
                );
                for id in earlier {
                    self.resend(id);
                }
                self.events.push(Event::Update(body.to_vec()));
                HandleResult::Ok
            }

            ServiceMessage::Ping { ping_id } => {
                let pong = Boxed(types::Pong { msg_id, ping_id });
                self.data.queue_reply(pong.to_bytes());
                HandleResult::Ok
            }

            ServiceMessage::Pong(pong) => {
                if self.data.was_sent(pong.msg_id).is_none() {
                    return HandleResult::Ignored;
                }
                if self.ping.is_some_and(|p| p.ping_id == pong.ping_id) {
                    self.ping = None;
                }
                if outer.bad_time && !self.fix_time_salt(&[pong.msg_id], outer) {
                    return HandleResult::Ignored;
                }
                self.data.requests_acked(&[pong.msg_id], true);
                HandleResult::Ok
            }

            ServiceMessage::DestroyAuthKey(answer) => {
                log::info!("[session] destroy_auth_key answered: {answer:?}");
                self.events.push(Event::KeyDestroyed(answer));
                HandleResult::Ok
            }

            ServiceMessage::Unknown(body) => {
                if outer.bad_time {
                    log::warn!("[session] update {msg_id} with bad server time");
                    return HandleResult::ResetSession;
                }
                match mtcore_tl::constructor_id(&body) {
                    Some(id) => match mtcore_tl::name_for_id(id) {
                        Some(name) => log::trace!("[session] update {name}"),
                        None => log::debug!("[session] update with unknown constructor {id:#010x}"),
                    },
                    None => log::debug!("[session] empty update body"),
                }
                self.events.push(Event::Update(body));
                HandleResult::Ok
            }
        }
    }

    fn bad_msg(&mut self, n: types::BadMsgNotification, outer: Outer) -> HandleResult {
        match n.error_code {
            // msg_id too low / too high, invalid container
            16 | 17 | 64 => {
                if self.data.was_sent(n.bad_msg_id).is_none() {
                    return ignored_if(outer.bad_time);
                }
                log::debug!("[session] bad_msg_notification {} for {}", n.error_code, n.bad_msg_id);
                self.data.set_salt(outer.server_salt);
                self.data.correct_time(outer.server_time, true);
                self.resend(n.bad_msg_id);
                HandleResult::Ok
            }
            // seq_no too low / too high
            32 | 33 => {
                if self.data.was_sent(n.bad_msg_id).is_none() {
                    log::debug!("[session] seq_no notification for unknown {}", n.bad_msg_id);
                    return HandleResult::Ignored;
                }
                if outer.bad_time {
                    self.data.correct_time(outer.server_time, true);
                }
                log::warn!("[session] seq_no rejected ({}), resetting session", n.error_code);
                HandleResult::ResetSession
            }
            code => {
                log::warn!("[session] fatal bad_msg_notification {code} for {}", n.bad_msg_id);
                if let Some(request_id) = self.data.was_sent(n.bad_msg_id) {
                    if request_id != SERVICE_REQUEST {
                        self.data.requests_acked(&[n.bad_msg_id], true);
                        self.events.push(Event::Response {
                            request_id,
                            result: Err(types::RpcError {
                                error_code: 500,
                                error_message: "PROTOCOL_ERROR".into(),
                            }),
                        });
                    }
                }
                HandleResult::ResetSession
            }
        }
    }

    fn rpc_result(&mut self, result: types::RpcResult, outer: Outer) -> HandleResult {
        let req_msg_id = result.req_msg_id;
        if outer.bad_time && !self.fix_time_salt(&[req_msg_id], outer) {
            return HandleResult::Ignored;
        }

        let mut body = result.result.0;
        if mtcore_tl::constructor_id(&body) == Some(types::GzipPacked::CONSTRUCTOR_ID) {
            let unpacked = types::GzipPacked::from_bytes(&body[4..])
                .map_err(|e| e.to_string())
                .and_then(|p| gunzip(&p.packed_data).map_err(|e| e.to_string()));
            match unpacked {
                Ok(b) => body = b,
                Err(e) => {
                    log::warn!("[session] packed result for {req_msg_id}: {e}");
                    return HandleResult::Restart;
                }
            }
        }

        self.data.requests_acked(&[req_msg_id], true);
        let request_id = match self.data.was_sent(req_msg_id) {
            Some(id) if id != SERVICE_REQUEST => id,
            _ => {
                log::debug!("[session] result for unknown msg_id {req_msg_id}");
                return HandleResult::Ok;
            }
        };

        let result = if mtcore_tl::constructor_id(&body) == Some(types::RpcError::CONSTRUCTOR_ID) {
            match types::RpcError::from_bytes(&body[4..]) {
                Ok(error) => Err(error),
                Err(e) => {
                    log::warn!("[session] malformed rpc_error for {req_msg_id}: {e}");
                    return HandleResult::Restart;
                }
            }
        } else {
            Ok(body)
        };
        self.events.push(Event::Response { request_id, result });
        HandleResult::Ok
    }

    /// Resend what the server did not get, ack what it did.
    fn handle_msgs_states(&mut self, ids: &[i64], states: &[u8]) {
        if ids.len() != states.len() {
            log::warn!("[session] {} ids but {} states", ids.len(), states.len());
            return;
        }
        for (&id, &state) in ids.iter().zip(states) {
            let received = state & 0x07 == 0x04;
            if !self.data.have_sent.read().contains_key(&id) {
                if received && self.data.to_resend.read().contains_key(&id) {
                    self.data.requests_acked(&[id], false);
                }
                continue;
            }
            if received {
                self.data.requests_acked(&[id], false);
            } else {
                self.resend(id);
            }
        }
    }

    /// The server holds an answer: ack it if we have it, ask for it otherwise.
    fn answer_available(&mut self, answer_msg_id: i64) {
        let seen = self.data.received_ids.read().lookup(answer_msg_id) != IdState::NotFound;
        if seen {
            self.data.queue_ack(answer_msg_id);
        } else {
            self.data.queue_resend_request(answer_msg_id);
        }
    }

    /// With a bad server time, trust it anyway if it concerns messages we
    /// really sent.
    fn fix_time_salt(&mut self, ids: &[i64], outer: Outer) -> bool {
        if !ids.iter().any(|&id| self.data.was_sent(id).is_some()) {
            return false;
        }
        self.data.correct_time(outer.server_time, true);
        self.data.set_salt(outer.server_salt);
        true
    }
}

fn ignored_if(bad_time: bool) -> HandleResult {
    if bad_time { HandleResult::Ignored } else { HandleResult::Ok }
}

/// Inflate a `gzip_packed` payload, refusing anything beyond the message limit.
fn gunzip(packed: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(packed).take(MAX_MESSAGE_LENGTH as u64 + 1).read_to_end(&mut out)?;
    if out.len() > MAX_MESSAGE_LENGTH {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "gzip payload too large"));
    }
    Ok(out)
}
