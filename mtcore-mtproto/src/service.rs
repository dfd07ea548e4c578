//! Decoding of the service messages a server may send inside the envelope.

use mtcore_tl::deserialize::{self, Cursor};
use mtcore_tl::{Deserializable, Identifiable, enums, types};

/// Every body the dispatcher distinguishes. Anything it does not know
/// ends up in [`ServiceMessage::Unknown`] untouched.
#[derive(Clone, Debug, PartialEq)]
pub enum ServiceMessage {
    Container(types::MsgContainer),
    GzipPacked(types::GzipPacked),
    MsgsAck(types::MsgsAck),
    BadMsgNotification(types::BadMsgNotification),
    BadServerSalt(types::BadServerSalt),
    MsgsStateReq(types::MsgsStateReq),
    MsgsStateInfo(types::MsgsStateInfo),
    MsgsAllInfo(types::MsgsAllInfo),
    MsgDetailedInfo(types::MsgDetailedInfo),
    MsgNewDetailedInfo(types::MsgNewDetailedInfo),
    MsgResendReq(types::MsgResendReq),
    RpcResult(types::RpcResult),
    NewSessionCreated(types::NewSessionCreated),
    Ping { ping_id: i64 },
    Pong(types::Pong),
    DestroyAuthKey(enums::DestroyAuthKeyRes),
    Unknown(Vec<u8>),
}

const PING: u32 = 0x7abe77ec;
const PING_DELAY_DISCONNECT: u32 = 0xf3427b8c;

impl ServiceMessage {
    /// Decode `body`. Fails only when a known constructor is malformed.
    pub fn parse(body: &[u8]) -> deserialize::Result<Self> {
        let Some(id) = mtcore_tl::constructor_id(body) else {
            return Err(deserialize::Error::UnexpectedEof);
        };
        let mut cur = Cursor::from_slice(&body[4..]);
        let buf = &mut cur;
        Ok(match id {
            types::MsgContainer::CONSTRUCTOR_ID => Self::Container(Deserializable::deserialize(buf)?),
            types::GzipPacked::CONSTRUCTOR_ID => Self::GzipPacked(Deserializable::deserialize(buf)?),
            types::MsgsAck::CONSTRUCTOR_ID => Self::MsgsAck(Deserializable::deserialize(buf)?),
            types::BadMsgNotification::CONSTRUCTOR_ID => {
                Self::BadMsgNotification(Deserializable::deserialize(buf)?)
            }
            types::BadServerSalt::CONSTRUCTOR_ID => Self::BadServerSalt(Deserializable::deserialize(buf)?),
            types::MsgsStateReq::CONSTRUCTOR_ID => Self::MsgsStateReq(Deserializable::deserialize(buf)?),
            types::MsgsStateInfo::CONSTRUCTOR_ID => Self::MsgsStateInfo(Deserializable::deserialize(buf)?),
            types::MsgsAllInfo::CONSTRUCTOR_ID => Self::MsgsAllInfo(Deserializable::deserialize(buf)?),
            types::MsgDetailedInfo::CONSTRUCTOR_ID => {
                Self::MsgDetailedInfo(Deserializable::deserialize(buf)?)
            }
            types::MsgNewDetailedInfo::CONSTRUCTOR_ID => {
                Self::MsgNewDetailedInfo(Deserializable::deserialize(buf)?)
            }
            types::MsgResendReq::CONSTRUCTOR_ID => Self::MsgResendReq(Deserializable::deserialize(buf)?),
            types::RpcResult::CONSTRUCTOR_ID => Self::RpcResult(Deserializable::deserialize(buf)?),
            types::NewSessionCreated::CONSTRUCTOR_ID => {
                Self::NewSessionCreated(Deserializable::deserialize(buf)?)
            }
            PING | PING_DELAY_DISCONNECT => Self::Ping { ping_id: i64::deserialize(buf)? },
            types::Pong::CONSTRUCTOR_ID => Self::Pong(Deserializable::deserialize(buf)?),
            types::DestroyAuthKeyOk::CONSTRUCTOR_ID
            | types::DestroyAuthKeyNone::CONSTRUCTOR_ID
            | types::DestroyAuthKeyFail::CONSTRUCTOR_ID => {
                Self::DestroyAuthKey(enums::DestroyAuthKeyRes::from_bytes(body)?)
            }
            _ => Self::Unknown(body.to_vec()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtcore_tl::{Boxed, Serializable};

    #[test]
    fn known_service_messages() {
        let ack = Boxed(types::MsgsAck { msg_ids: vec![4, 8] }).to_bytes();
        assert_eq!(
            ServiceMessage::parse(&ack).unwrap(),
            ServiceMessage::MsgsAck(types::MsgsAck { msg_ids: vec![4, 8] })
        );

        let pong = Boxed(types::Pong { msg_id: 12, ping_id: 99 }).to_bytes();
        assert!(matches!(
            ServiceMessage::parse(&pong).unwrap(),
            ServiceMessage::Pong(types::Pong { ping_id: 99, .. })
        ));

        let destroyed = Boxed(types::DestroyAuthKeyNone {}).to_bytes();
        assert!(matches!(
            ServiceMessage::parse(&destroyed).unwrap(),
            ServiceMessage::DestroyAuthKey(enums::DestroyAuthKeyRes::DestroyAuthKeyNone(_))
        ));
    }

    #[test]
    fn ping_variants_share_a_shape() {
        let mut body = PING_DELAY_DISCONNECT.to_le_bytes().to_vec();
        body.extend(77i64.to_le_bytes());
        body.extend(75i32.to_le_bytes());
        assert_eq!(ServiceMessage::parse(&body).unwrap(), ServiceMessage::Ping { ping_id: 77 });
    }

    #[test]
    fn unknown_bodies_pass_through() {
        let body = vec![0xc1, 0x04, 0xde, 0x74, 1, 2, 3, 4];
        assert_eq!(ServiceMessage::parse(&body).unwrap(), ServiceMessage::Unknown(body));
    }

    #[test]
    fn truncated_known_constructor_fails() {
        let mut ack = Boxed(types::MsgsAck { msg_ids: vec![4, 8] }).to_bytes();
        ack.truncate(ack.len() - 3);
        assert!(ServiceMessage::parse(&ack).is_err());
        assert!(ServiceMessage::parse(&[1, 2]).is_err());
    }
}
