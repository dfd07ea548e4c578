//! Bare constructors of the MTProto service schema.
//!
//! Each struct serializes *without* its constructor id; wrap it in
//! [`crate::Boxed`] or go through [`crate::enums`] for the boxed form.

use crate::deserialize::{Buffer, Result};
use crate::{Blob, Deserializable, RawVec, Serializable};

// ─── Key exchange ────────────────────────────────────────────────────────────

/// [`resPQ`](https://core.telegram.org/constructor/resPQ)
///
/// ```tl
/// resPQ#05162463 nonce:int128 server_nonce:int128 pq:string server_public_key_fingerprints:Vector<long> = ResPQ;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct ResPq {
    pub nonce: [u8; 16],
    pub server_nonce: [u8; 16],
    pub pq: Vec<u8>,
    pub server_public_key_fingerprints: Vec<i64>,
}
impl crate::Identifiable for ResPq {
    const CONSTRUCTOR_ID: u32 = 0x05162463;
}
impl crate::Serializable for ResPq {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.nonce.serialize(buf);
        self.server_nonce.serialize(buf);
        self.pq.serialize(buf);
        self.server_public_key_fingerprints.serialize(buf);
    }
}
impl crate::Deserializable for ResPq {
    fn deserialize(buf: Buffer) -> Result<Self> {
        Ok(Self {
            nonce: <[u8; 16]>::deserialize(buf)?,
            server_nonce: <[u8; 16]>::deserialize(buf)?,
            pq: Vec::<u8>::deserialize(buf)?,
            server_public_key_fingerprints: Vec::<i64>::deserialize(buf)?,
        })
    }
}

/// [`p_q_inner_data`](https://core.telegram.org/constructor/p_q_inner_data)
///
/// ```tl
/// p_q_inner_data#83c95aec pq:string p:string q:string nonce:int128 server_nonce:int128 new_nonce:int256 = P_Q_inner_data;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct PQInnerData {
    pub pq: Vec<u8>,
    pub p: Vec<u8>,
    pub q: Vec<u8>,
    pub nonce: [u8; 16],
    pub server_nonce: [u8; 16],
    pub new_nonce: [u8; 32],
}
impl crate::Identifiable for PQInnerData {
    const CONSTRUCTOR_ID: u32 = 0x83c95aec;
}
impl crate::Serializable for PQInnerData {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.pq.serialize(buf);
        self.p.serialize(buf);
        self.q.serialize(buf);
        self.nonce.serialize(buf);
        self.server_nonce.serialize(buf);
        self.new_nonce.serialize(buf);
    }
}
impl crate::Deserializable for PQInnerData {
    fn deserialize(buf: Buffer) -> Result<Self> {
        Ok(Self {
            pq: Vec::<u8>::deserialize(buf)?,
            p: Vec::<u8>::deserialize(buf)?,
            q: Vec::<u8>::deserialize(buf)?,
            nonce: <[u8; 16]>::deserialize(buf)?,
            server_nonce: <[u8; 16]>::deserialize(buf)?,
            new_nonce: <[u8; 32]>::deserialize(buf)?,
        })
    }
}

/// [`server_DH_params_fail`](https://core.telegram.org/constructor/server_DH_params_fail)
///
/// ```tl
/// server_DH_params_fail#79cb045d nonce:int128 server_nonce:int128 new_nonce_hash:int128 = Server_DH_Params;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct ServerDhParamsFail {
    pub nonce: [u8; 16],
    pub server_nonce: [u8; 16],
    pub new_nonce_hash: [u8; 16],
}
impl crate::Identifiable for ServerDhParamsFail {
    const CONSTRUCTOR_ID: u32 = 0x79cb045d;
}
impl crate::Serializable for ServerDhParamsFail {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.nonce.serialize(buf);
        self.server_nonce.serialize(buf);
        self.new_nonce_hash.serialize(buf);
    }
}
impl crate::Deserializable for ServerDhParamsFail {
    fn deserialize(buf: Buffer) -> Result<Self> {
        Ok(Self {
            nonce: <[u8; 16]>::deserialize(buf)?,
            server_nonce: <[u8; 16]>::deserialize(buf)?,
            new_nonce_hash: <[u8; 16]>::deserialize(buf)?,
        })
    }
}

/// [`server_DH_params_ok`](https://core.telegram.org/constructor/server_DH_params_ok)
///
/// ```tl
/// server_DH_params_ok#d0e8075c nonce:int128 server_nonce:int128 encrypted_answer:string = Server_DH_Params;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct ServerDhParamsOk {
    pub nonce: [u8; 16],
    pub server_nonce: [u8; 16],
    pub encrypted_answer: Vec<u8>,
}
impl crate::Identifiable for ServerDhParamsOk {
    const CONSTRUCTOR_ID: u32 = 0xd0e8075c;
}
impl crate::Serializable for ServerDhParamsOk {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.nonce.serialize(buf);
        self.server_nonce.serialize(buf);
        self.encrypted_answer.serialize(buf);
    }
}
impl crate::Deserializable for ServerDhParamsOk {
    fn deserialize(buf: Buffer) -> Result<Self> {
        Ok(Self {
            nonce: <[u8; 16]>::deserialize(buf)?,
            server_nonce: <[u8; 16]>::deserialize(buf)?,
            encrypted_answer: Vec::<u8>::deserialize(buf)?,
        })
    }
}

/// [`server_DH_inner_data`](https://core.telegram.org/constructor/server_DH_inner_data)
///
/// ```tl
/// server_DH_inner_data#b5890dba nonce:int128 server_nonce:int128 g:int dh_prime:string g_a:string server_time:int = Server_DH_inner_data;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct ServerDhInnerData {
    pub nonce: [u8; 16],
    pub server_nonce: [u8; 16],
    pub g: i32,
    pub dh_prime: Vec<u8>,
    pub g_a: Vec<u8>,
    pub server_time: i32,
}
impl crate::Identifiable for ServerDhInnerData {
    const CONSTRUCTOR_ID: u32 = 0xb5890dba;
}
impl crate::Serializable for ServerDhInnerData {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.nonce.serialize(buf);
        self.server_nonce.serialize(buf);
        self.g.serialize(buf);
        self.dh_prime.serialize(buf);
        self.g_a.serialize(buf);
        self.server_time.serialize(buf);
    }
}
impl crate::Deserializable for ServerDhInnerData {
    fn deserialize(buf: Buffer) -> Result<Self> {
        Ok(Self {
            nonce: <[u8; 16]>::deserialize(buf)?,
            server_nonce: <[u8; 16]>::deserialize(buf)?,
            g: i32::deserialize(buf)?,
            dh_prime: Vec::<u8>::deserialize(buf)?,
            g_a: Vec::<u8>::deserialize(buf)?,
            server_time: i32::deserialize(buf)?,
        })
    }
}

/// [`client_DH_inner_data`](https://core.telegram.org/constructor/client_DH_inner_data)
///
/// ```tl
/// client_DH_inner_data#6643b654 nonce:int128 server_nonce:int128 retry_id:long g_b:string = Client_DH_Inner_Data;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct ClientDhInnerData {
    pub nonce: [u8; 16],
    pub server_nonce: [u8; 16],
    pub retry_id: i64,
    pub g_b: Vec<u8>,
}
impl crate::Identifiable for ClientDhInnerData {
    const CONSTRUCTOR_ID: u32 = 0x6643b654;
}
impl crate::Serializable for ClientDhInnerData {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.nonce.serialize(buf);
        self.server_nonce.serialize(buf);
        self.retry_id.serialize(buf);
        self.g_b.serialize(buf);
    }
}
impl crate::Deserializable for ClientDhInnerData {
    fn deserialize(buf: Buffer) -> Result<Self> {
        Ok(Self {
            nonce: <[u8; 16]>::deserialize(buf)?,
            server_nonce: <[u8; 16]>::deserialize(buf)?,
            retry_id: i64::deserialize(buf)?,
            g_b: Vec::<u8>::deserialize(buf)?,
        })
    }
}

macro_rules! dh_gen_answer {
    ($name:ident, $tl:literal, $id:literal, $hash:ident) => {
        #[doc = concat!("[`", $tl, "`](https://core.telegram.org/constructor/", $tl, ")")]
        #[derive(Debug)]
        #[derive(Clone, PartialEq)]
        pub struct $name {
            pub nonce: [u8; 16],
            pub server_nonce: [u8; 16],
            pub $hash: [u8; 16],
        }
        impl crate::Identifiable for $name {
            const CONSTRUCTOR_ID: u32 = $id;
        }
        impl crate::Serializable for $name {
            fn serialize(&self, buf: &mut impl Extend<u8>) {
                self.nonce.serialize(buf);
                self.server_nonce.serialize(buf);
                self.$hash.serialize(buf);
            }
        }
        impl crate::Deserializable for $name {
            fn deserialize(buf: Buffer) -> Result<Self> {
                Ok(Self {
                    nonce: <[u8; 16]>::deserialize(buf)?,
                    server_nonce: <[u8; 16]>::deserialize(buf)?,
                    $hash: <[u8; 16]>::deserialize(buf)?,
                })
            }
        }
    };
}

dh_gen_answer!(DhGenOk,    "dh_gen_ok",    0x3bcbf734, new_nonce_hash1);
dh_gen_answer!(DhGenRetry, "dh_gen_retry", 0x46dc1fb9, new_nonce_hash2);
dh_gen_answer!(DhGenFail,  "dh_gen_fail",  0xa69dae02, new_nonce_hash3);

// ─── Service messages ────────────────────────────────────────────────────────

macro_rules! id_list {
    ($name:ident, $tl:literal, $id:literal) => {
        #[doc = concat!("[`", $tl, "`](https://core.telegram.org/constructor/", $tl, ")")]
        #[derive(Debug, Default)]
        #[derive(Clone, PartialEq)]
        pub struct $name {
            pub msg_ids: Vec<i64>,
        }
        impl crate::Identifiable for $name {
            const CONSTRUCTOR_ID: u32 = $id;
        }
        impl crate::Serializable for $name {
            fn serialize(&self, buf: &mut impl Extend<u8>) {
                self.msg_ids.serialize(buf);
            }
        }
        impl crate::Deserializable for $name {
            fn deserialize(buf: Buffer) -> Result<Self> {
                Ok(Self { msg_ids: Vec::<i64>::deserialize(buf)? })
            }
        }
    };
}

id_list!(MsgsAck,      "msgs_ack",       0x62d6b459);
id_list!(MsgsStateReq, "msgs_state_req", 0xda69fb52);
id_list!(MsgResendReq, "msg_resend_req", 0x7d861a08);

/// [`bad_msg_notification`](https://core.telegram.org/constructor/bad_msg_notification)
///
/// ```tl
/// bad_msg_notification#a7eff811 bad_msg_id:long bad_msg_seqno:int error_code:int = BadMsgNotification;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct BadMsgNotification {
    pub bad_msg_id: i64,
    pub bad_msg_seqno: i32,
    pub error_code: i32,
}
impl crate::Identifiable for BadMsgNotification {
    const CONSTRUCTOR_ID: u32 = 0xa7eff811;
}
impl crate::Serializable for BadMsgNotification {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.bad_msg_id.serialize(buf);
        self.bad_msg_seqno.serialize(buf);
        self.error_code.serialize(buf);
    }
}
impl crate::Deserializable for BadMsgNotification {
    fn deserialize(buf: Buffer) -> Result<Self> {
        Ok(Self {
            bad_msg_id: i64::deserialize(buf)?,
            bad_msg_seqno: i32::deserialize(buf)?,
            error_code: i32::deserialize(buf)?,
        })
    }
}

/// [`bad_server_salt`](https://core.telegram.org/constructor/bad_server_salt)
///
/// ```tl
/// bad_server_salt#edab447b bad_msg_id:long bad_msg_seqno:int error_code:int new_server_salt:long = BadMsgNotification;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct BadServerSalt {
    pub bad_msg_id: i64,
    pub bad_msg_seqno: i32,
    pub error_code: i32,
    pub new_server_salt: i64,
}
impl crate::Identifiable for BadServerSalt {
    const CONSTRUCTOR_ID: u32 = 0xedab447b;
}
impl crate::Serializable for BadServerSalt {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.bad_msg_id.serialize(buf);
        self.bad_msg_seqno.serialize(buf);
        self.error_code.serialize(buf);
        self.new_server_salt.serialize(buf);
    }
}
impl crate::Deserializable for BadServerSalt {
    fn deserialize(buf: Buffer) -> Result<Self> {
        Ok(Self {
            bad_msg_id: i64::deserialize(buf)?,
            bad_msg_seqno: i32::deserialize(buf)?,
            error_code: i32::deserialize(buf)?,
            new_server_salt: i64::deserialize(buf)?,
        })
    }
}

/// [`msgs_state_info`](https://core.telegram.org/constructor/msgs_state_info)
///
/// ```tl
/// msgs_state_info#04deb57d req_msg_id:long info:string = MsgsStateInfo;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct MsgsStateInfo {
    pub req_msg_id: i64,
    pub info: Vec<u8>,
}
impl crate::Identifiable for MsgsStateInfo {
    const CONSTRUCTOR_ID: u32 = 0x04deb57d;
}
impl crate::Serializable for MsgsStateInfo {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.req_msg_id.serialize(buf);
        self.info.serialize(buf);
    }
}
impl crate::Deserializable for MsgsStateInfo {
    fn deserialize(buf: Buffer) -> Result<Self> {
        Ok(Self {
            req_msg_id: i64::deserialize(buf)?,
            info: Vec::<u8>::deserialize(buf)?,
        })
    }
}

/// [`msgs_all_info`](https://core.telegram.org/constructor/msgs_all_info)
///
/// ```tl
/// msgs_all_info#8cc0d131 msg_ids:Vector<long> info:string = MsgsAllInfo;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct MsgsAllInfo {
    pub msg_ids: Vec<i64>,
    pub info: Vec<u8>,
}
impl crate::Identifiable for MsgsAllInfo {
    const CONSTRUCTOR_ID: u32 = 0x8cc0d131;
}
impl crate::Serializable for MsgsAllInfo {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.msg_ids.serialize(buf);
        self.info.serialize(buf);
    }
}
impl crate::Deserializable for MsgsAllInfo {
    fn deserialize(buf: Buffer) -> Result<Self> {
        Ok(Self {
            msg_ids: Vec::<i64>::deserialize(buf)?,
            info: Vec::<u8>::deserialize(buf)?,
        })
    }
}

/// [`msg_detailed_info`](https://core.telegram.org/constructor/msg_detailed_info)
///
/// ```tl
/// msg_detailed_info#276d3ec6 msg_id:long answer_msg_id:long bytes:int status:int = MsgDetailedInfo;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct MsgDetailedInfo {
    pub msg_id: i64,
    pub answer_msg_id: i64,
    pub bytes: i32,
    pub status: i32,
}
impl crate::Identifiable for MsgDetailedInfo {
    const CONSTRUCTOR_ID: u32 = 0x276d3ec6;
}
impl crate::Serializable for MsgDetailedInfo {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.msg_id.serialize(buf);
        self.answer_msg_id.serialize(buf);
        self.bytes.serialize(buf);
        self.status.serialize(buf);
    }
}
impl crate::Deserializable for MsgDetailedInfo {
    fn deserialize(buf: Buffer) -> Result<Self> {
        Ok(Self {
            msg_id: i64::deserialize(buf)?,
            answer_msg_id: i64::deserialize(buf)?,
            bytes: i32::deserialize(buf)?,
            status: i32::deserialize(buf)?,
        })
    }
}

/// [`msg_new_detailed_info`](https://core.telegram.org/constructor/msg_new_detailed_info)
///
/// ```tl
/// msg_new_detailed_info#809db6df answer_msg_id:long bytes:int status:int = MsgDetailedInfo;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct MsgNewDetailedInfo {
    pub answer_msg_id: i64,
    pub bytes: i32,
    pub status: i32,
}
impl crate::Identifiable for MsgNewDetailedInfo {
    const CONSTRUCTOR_ID: u32 = 0x809db6df;
}
impl crate::Serializable for MsgNewDetailedInfo {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.answer_msg_id.serialize(buf);
        self.bytes.serialize(buf);
        self.status.serialize(buf);
    }
}
impl crate::Deserializable for MsgNewDetailedInfo {
    fn deserialize(buf: Buffer) -> Result<Self> {
        Ok(Self {
            answer_msg_id: i64::deserialize(buf)?,
            bytes: i32::deserialize(buf)?,
            status: i32::deserialize(buf)?,
        })
    }
}

/// [`rpc_result`](https://core.telegram.org/constructor/rpc_result)
///
/// ```tl
/// rpc_result#f35c6d01 req_msg_id:long result:Object = RpcResult;
/// ```
///
/// `result` is the untouched remainder of the message.
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct RpcResult {
    pub req_msg_id: i64,
    pub result: Blob,
}
impl crate::Identifiable for RpcResult {
    const CONSTRUCTOR_ID: u32 = 0xf35c6d01;
}
impl crate::Serializable for RpcResult {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.req_msg_id.serialize(buf);
        self.result.serialize(buf);
    }
}
impl crate::Deserializable for RpcResult {
    fn deserialize(buf: Buffer) -> Result<Self> {
        Ok(Self {
            req_msg_id: i64::deserialize(buf)?,
            result: Blob::deserialize(buf)?,
        })
    }
}

/// [`rpc_error`](https://core.telegram.org/constructor/rpc_error)
///
/// ```tl
/// rpc_error#2144ca19 error_code:int error_message:string = RpcError;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct RpcError {
    pub error_code: i32,
    pub error_message: String,
}
impl crate::Identifiable for RpcError {
    const CONSTRUCTOR_ID: u32 = 0x2144ca19;
}
impl crate::Serializable for RpcError {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.error_code.serialize(buf);
        self.error_message.serialize(buf);
    }
}
impl crate::Deserializable for RpcError {
    fn deserialize(buf: Buffer) -> Result<Self> {
        Ok(Self {
            error_code: i32::deserialize(buf)?,
            error_message: String::deserialize(buf)?,
        })
    }
}

/// [`new_session_created`](https://core.telegram.org/constructor/new_session_created)
///
/// ```tl
/// new_session_created#9ec20908 first_msg_id:long unique_id:long server_salt:long = NewSession;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct NewSessionCreated {
    pub first_msg_id: i64,
    pub unique_id: i64,
    pub server_salt: i64,
}
impl crate::Identifiable for NewSessionCreated {
    const CONSTRUCTOR_ID: u32 = 0x9ec20908;
}
impl crate::Serializable for NewSessionCreated {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.first_msg_id.serialize(buf);
        self.unique_id.serialize(buf);
        self.server_salt.serialize(buf);
    }
}
impl crate::Deserializable for NewSessionCreated {
    fn deserialize(buf: Buffer) -> Result<Self> {
        Ok(Self {
            first_msg_id: i64::deserialize(buf)?,
            unique_id: i64::deserialize(buf)?,
            server_salt: i64::deserialize(buf)?,
        })
    }
}

/// One entry of a [`MsgContainer`].
///
/// ```tl
/// message msg_id:long seqno:int bytes:int body:Object = Message;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct Message {
    pub msg_id: i64,
    pub seqno: i32,
    pub body: Vec<u8>,
}
impl crate::Serializable for Message {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.msg_id.serialize(buf);
        self.seqno.serialize(buf);
        (self.body.len() as i32).serialize(buf);
        buf.extend(self.body.iter().copied());
    }
}
impl crate::Deserializable for Message {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let msg_id = i64::deserialize(buf)?;
        let seqno = i32::deserialize(buf)?;
        let len = i32::deserialize(buf)?;
        if len < 0 {
            return Err(crate::deserialize::Error::NegativeLength(len));
        }
        let body = buf.take(len as usize)?.to_vec();
        Ok(Self { msg_id, seqno, body })
    }
}

/// [`msg_container`](https://core.telegram.org/constructor/msg_container)
///
/// ```tl
/// msg_container#73f1f8dc messages:vector<message> = MessageContainer;
/// ```
#[derive(Debug, Default)]
#[derive(Clone, PartialEq)]
pub struct MsgContainer {
    pub messages: Vec<Message>,
}
impl crate::Identifiable for MsgContainer {
    const CONSTRUCTOR_ID: u32 = 0x73f1f8dc;
}
impl crate::Serializable for MsgContainer {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        (self.messages.len() as i32).serialize(buf);
        for m in &self.messages { m.serialize(buf); }
    }
}
impl crate::Deserializable for MsgContainer {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let RawVec(messages) = RawVec::<Message>::deserialize(buf)?;
        Ok(Self { messages })
    }
}

/// [`gzip_packed`](https://core.telegram.org/constructor/gzip_packed)
///
/// ```tl
/// gzip_packed#3072cfa1 packed_data:string = Object;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct GzipPacked {
    pub packed_data: Vec<u8>,
}
impl crate::Identifiable for GzipPacked {
    const CONSTRUCTOR_ID: u32 = 0x3072cfa1;
}
impl crate::Serializable for GzipPacked {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.packed_data.serialize(buf);
    }
}
impl crate::Deserializable for GzipPacked {
    fn deserialize(buf: Buffer) -> Result<Self> {
        Ok(Self { packed_data: Vec::<u8>::deserialize(buf)? })
    }
}

/// [`pong`](https://core.telegram.org/constructor/pong)
///
/// ```tl
/// pong#347773c5 msg_id:long ping_id:long = Pong;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct Pong {
    pub msg_id: i64,
    pub ping_id: i64,
}
impl crate::Identifiable for Pong {
    const CONSTRUCTOR_ID: u32 = 0x347773c5;
}
impl crate::Serializable for Pong {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.msg_id.serialize(buf);
        self.ping_id.serialize(buf);
    }
}
impl crate::Deserializable for Pong {
    fn deserialize(buf: Buffer) -> Result<Self> {
        Ok(Self {
            msg_id: i64::deserialize(buf)?,
            ping_id: i64::deserialize(buf)?,
        })
    }
}

macro_rules! empty_constructor {
    ($name:ident, $tl:literal, $id:literal) => {
        #[doc = concat!("[`", $tl, "`](https://core.telegram.org/constructor/", $tl, ")")]
        #[derive(Debug)]
        #[derive(Clone, PartialEq)]
        pub struct $name {}
        impl crate::Identifiable for $name {
            const CONSTRUCTOR_ID: u32 = $id;
        }
        impl crate::Serializable for $name {
            fn serialize(&self, _buf: &mut impl Extend<u8>) {}
        }
        impl crate::Deserializable for $name {
            fn deserialize(_buf: Buffer) -> Result<Self> {
                Ok(Self {})
            }
        }
    };
}

empty_constructor!(DestroyAuthKeyOk,   "destroy_auth_key_ok",   0xf660e1d4);
empty_constructor!(DestroyAuthKeyNone, "destroy_auth_key_none", 0x0a9f2259);
empty_constructor!(DestroyAuthKeyFail, "destroy_auth_key_fail", 0xea109b13);

// ─── DC configuration ────────────────────────────────────────────────────────

/// [`dcOption`](https://core.telegram.org/constructor/dcOption)
///
/// ```tl
/// dcOption#18b7a10d flags:# ipv6:flags.0?true media_only:flags.1?true tcpo_only:flags.2?true cdn:flags.3?true static:flags.4?true this_port_only:flags.5?true id:int ip_address:string port:int secret:flags.10?bytes = DcOption;
/// ```
#[derive(Debug, Default)]
#[derive(Clone, PartialEq)]
pub struct DcOption {
    pub ipv6: bool,
    pub media_only: bool,
    pub tcpo_only: bool,
    pub cdn: bool,
    pub r#static: bool,
    pub this_port_only: bool,
    pub id: i32,
    pub ip_address: String,
    pub port: i32,
    pub secret: Option<Vec<u8>>,
}
impl crate::Identifiable for DcOption {
    const CONSTRUCTOR_ID: u32 = 0x18b7a10d;
}
impl crate::Serializable for DcOption {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        let flags: u32 = if self.ipv6 { 1 << 0 } else { 0 }
            | if self.media_only { 1 << 1 } else { 0 }
            | if self.tcpo_only { 1 << 2 } else { 0 }
            | if self.cdn { 1 << 3 } else { 0 }
            | if self.r#static { 1 << 4 } else { 0 }
            | if self.this_port_only { 1 << 5 } else { 0 }
            | if self.secret.is_some() { 1 << 10 } else { 0 };
        flags.serialize(buf);
        self.id.serialize(buf);
        self.ip_address.serialize(buf);
        self.port.serialize(buf);
        self.secret.serialize(buf);
    }
}
impl crate::Deserializable for DcOption {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let _flags = u32::deserialize(buf)?;
        Ok(Self {
            ipv6: _flags & (1 << 0) != 0,
            media_only: _flags & (1 << 1) != 0,
            tcpo_only: _flags & (1 << 2) != 0,
            cdn: _flags & (1 << 3) != 0,
            r#static: _flags & (1 << 4) != 0,
            this_port_only: _flags & (1 << 5) != 0,
            id: i32::deserialize(buf)?,
            ip_address: String::deserialize(buf)?,
            port: i32::deserialize(buf)?,
            secret: if _flags & (1 << 10) != 0 { Some(Vec::<u8>::deserialize(buf)?) } else { None },
        })
    }
}

/// [`config`](https://core.telegram.org/constructor/config), leading fields only.
///
/// ```tl
/// config#cc1a241e flags:# ... date:int expires:int test_mode:Bool this_dc:int dc_options:Vector<DcOption> ... = Config;
/// ```
///
/// The transport core only needs the DC list, so deserialization stops after
/// `dc_options` and skips the rest of the object. Serialization writes the
/// same prefix.
#[derive(Debug, Default)]
#[derive(Clone, PartialEq)]
pub struct Config {
    pub flags: u32,
    pub date: i32,
    pub expires: i32,
    pub test_mode: bool,
    pub this_dc: i32,
    pub dc_options: Vec<crate::enums::DcOption>,
}
impl crate::Identifiable for Config {
    const CONSTRUCTOR_ID: u32 = 0xcc1a241e;
}
impl crate::Serializable for Config {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.flags.serialize(buf);
        self.date.serialize(buf);
        self.expires.serialize(buf);
        self.test_mode.serialize(buf);
        self.this_dc.serialize(buf);
        self.dc_options.serialize(buf);
    }
}
impl crate::Deserializable for Config {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let config = Self {
            flags: u32::deserialize(buf)?,
            date: i32::deserialize(buf)?,
            expires: i32::deserialize(buf)?,
            test_mode: bool::deserialize(buf)?,
            this_dc: i32::deserialize(buf)?,
            dc_options: Vec::<crate::enums::DcOption>::deserialize(buf)?,
        };
        Blob::deserialize(buf)?;
        Ok(config)
    }
}

/// [`ipPort`](https://core.telegram.org/constructor/ipPort)
///
/// ```tl
/// ipPort#d433ad73 ipv4:int port:int = IpPort;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct IpPort {
    pub ipv4: i32,
    pub port: i32,
}
impl crate::Identifiable for IpPort {
    const CONSTRUCTOR_ID: u32 = 0xd433ad73;
}
impl crate::Serializable for IpPort {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.ipv4.serialize(buf);
        self.port.serialize(buf);
    }
}
impl crate::Deserializable for IpPort {
    fn deserialize(buf: Buffer) -> Result<Self> {
        Ok(Self {
            ipv4: i32::deserialize(buf)?,
            port: i32::deserialize(buf)?,
        })
    }
}

pub mod help {
    use crate::deserialize::{Buffer, Result};
    use crate::{Deserializable, Serializable};

    /// [`help.configSimple`](https://core.telegram.org/constructor/help.configSimple)
    ///
    /// ```tl
    /// help.configSimple#d997c3c5 date:int expires:int dc_id:int ip_port_list:Vector<ipPort> = help.ConfigSimple;
    /// ```
    #[derive(Debug)]
    #[derive(Clone, PartialEq)]
    pub struct ConfigSimple {
        pub date: i32,
        pub expires: i32,
        pub dc_id: i32,
        pub ip_port_list: Vec<super::IpPort>,
    }
    impl crate::Identifiable for ConfigSimple {
        const CONSTRUCTOR_ID: u32 = 0xd997c3c5;
    }
    impl crate::Serializable for ConfigSimple {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            self.date.serialize(buf);
            self.expires.serialize(buf);
            self.dc_id.serialize(buf);
            self.ip_port_list.serialize(buf);
        }
    }
    impl crate::Deserializable for ConfigSimple {
        fn deserialize(buf: Buffer) -> Result<Self> {
            Ok(Self {
                date: i32::deserialize(buf)?,
                expires: i32::deserialize(buf)?,
                dc_id: i32::deserialize(buf)?,
                ip_port_list: Vec::<super::IpPort>::deserialize(buf)?,
            })
        }
    }
}
