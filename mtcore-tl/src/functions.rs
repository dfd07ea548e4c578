//! RPC functions. Each struct writes its constructor id first.

use crate::deserialize::{Buffer, Result};
use crate::{Deserializable, Serializable, enums};

/// [`req_pq_multi`](https://core.telegram.org/method/req_pq_multi)
///
/// ```tl
/// req_pq_multi#be7e8ef1 nonce:int128 = ResPQ;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct ReqPqMulti {
    pub nonce: [u8; 16],
}
impl crate::Identifiable for ReqPqMulti {
    const CONSTRUCTOR_ID: u32 = 0xbe7e8ef1;
}
impl crate::Serializable for ReqPqMulti {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        use crate::Identifiable;
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.nonce.serialize(buf);
    }
}
impl crate::Deserializable for ReqPqMulti {
    fn deserialize(buf: Buffer) -> Result<Self> {
        Ok(Self { nonce: <[u8; 16]>::deserialize(buf)? })
    }
}
impl crate::RemoteCall for ReqPqMulti {
    type Return = enums::ResPq;
}

/// [`req_DH_params`](https://core.telegram.org/method/req_DH_params)
///
/// ```tl
/// req_DH_params#d712e4be nonce:int128 server_nonce:int128 p:string q:string public_key_fingerprint:long encrypted_data:string = Server_DH_Params;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct ReqDhParams {
    pub nonce: [u8; 16],
    pub server_nonce: [u8; 16],
    pub p: Vec<u8>,
    pub q: Vec<u8>,
    pub public_key_fingerprint: i64,
    pub encrypted_data: Vec<u8>,
}
impl crate::Identifiable for ReqDhParams {
    const CONSTRUCTOR_ID: u32 = 0xd712e4be;
}
impl crate::Serializable for ReqDhParams {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        use crate::Identifiable;
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.nonce.serialize(buf);
        self.server_nonce.serialize(buf);
        self.p.serialize(buf);
        self.q.serialize(buf);
        self.public_key_fingerprint.serialize(buf);
        self.encrypted_data.serialize(buf);
    }
}
impl crate::Deserializable for ReqDhParams {
    fn deserialize(buf: Buffer) -> Result<Self> {
        Ok(Self {
            nonce: <[u8; 16]>::deserialize(buf)?,
            server_nonce: <[u8; 16]>::deserialize(buf)?,
            p: Vec::<u8>::deserialize(buf)?,
            q: Vec::<u8>::deserialize(buf)?,
            public_key_fingerprint: i64::deserialize(buf)?,
            encrypted_data: Vec::<u8>::deserialize(buf)?,
        })
    }
}
impl crate::RemoteCall for ReqDhParams {
    type Return = enums::ServerDhParams;
}

/// [`set_client_DH_params`](https://core.telegram.org/method/set_client_DH_params)
///
/// ```tl
/// set_client_DH_params#f5045f1f nonce:int128 server_nonce:int128 encrypted_data:string = Set_client_DH_params_answer;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct SetClientDhParams {
    pub nonce: [u8; 16],
    pub server_nonce: [u8; 16],
    pub encrypted_data: Vec<u8>,
}
impl crate::Identifiable for SetClientDhParams {
    const CONSTRUCTOR_ID: u32 = 0xf5045f1f;
}
impl crate::Serializable for SetClientDhParams {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        use crate::Identifiable;
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.nonce.serialize(buf);
        self.server_nonce.serialize(buf);
        self.encrypted_data.serialize(buf);
    }
}
impl crate::Deserializable for SetClientDhParams {
    fn deserialize(buf: Buffer) -> Result<Self> {
        Ok(Self {
            nonce: <[u8; 16]>::deserialize(buf)?,
            server_nonce: <[u8; 16]>::deserialize(buf)?,
            encrypted_data: Vec::<u8>::deserialize(buf)?,
        })
    }
}
impl crate::RemoteCall for SetClientDhParams {
    type Return = enums::SetClientDhParamsAnswer;
}

/// [`ping`](https://core.telegram.org/method/ping)
///
/// ```tl
/// ping#7abe77ec ping_id:long = Pong;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct Ping {
    pub ping_id: i64,
}
impl crate::Identifiable for Ping {
    const CONSTRUCTOR_ID: u32 = 0x7abe77ec;
}
impl crate::Serializable for Ping {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        use crate::Identifiable;
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.ping_id.serialize(buf);
    }
}
impl crate::Deserializable for Ping {
    fn deserialize(buf: Buffer) -> Result<Self> {
        Ok(Self { ping_id: i64::deserialize(buf)? })
    }
}
impl crate::RemoteCall for Ping {
    type Return = enums::Pong;
}

/// [`ping_delay_disconnect`](https://core.telegram.org/method/ping_delay_disconnect)
///
/// ```tl
/// ping_delay_disconnect#f3427b8c ping_id:long disconnect_delay:int = Pong;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct PingDelayDisconnect {
    pub ping_id: i64,
    pub disconnect_delay: i32,
}
impl crate::Identifiable for PingDelayDisconnect {
    const CONSTRUCTOR_ID: u32 = 0xf3427b8c;
}
impl crate::Serializable for PingDelayDisconnect {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        use crate::Identifiable;
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.ping_id.serialize(buf);
        self.disconnect_delay.serialize(buf);
    }
}
impl crate::Deserializable for PingDelayDisconnect {
    fn deserialize(buf: Buffer) -> Result<Self> {
        Ok(Self {
            ping_id: i64::deserialize(buf)?,
            disconnect_delay: i32::deserialize(buf)?,
        })
    }
}
impl crate::RemoteCall for PingDelayDisconnect {
    type Return = enums::Pong;
}

/// [`destroy_auth_key`](https://core.telegram.org/method/destroy_auth_key)
///
/// ```tl
/// destroy_auth_key#d1435160 = DestroyAuthKeyRes;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct DestroyAuthKey {}
impl crate::Identifiable for DestroyAuthKey {
    const CONSTRUCTOR_ID: u32 = 0xd1435160;
}
impl crate::Serializable for DestroyAuthKey {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        use crate::Identifiable;
        Self::CONSTRUCTOR_ID.serialize(buf);
    }
}
impl crate::Deserializable for DestroyAuthKey {
    fn deserialize(_buf: Buffer) -> Result<Self> {
        Ok(Self {})
    }
}
impl crate::RemoteCall for DestroyAuthKey {
    type Return = enums::DestroyAuthKeyRes;
}

/// [`invokeWithLayer`](https://core.telegram.org/method/invokeWithLayer)
///
/// ```tl
/// invokeWithLayer#da9b0d0d {X:Type} layer:int query:!X = X;
/// ```
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct InvokeWithLayer<X> {
    pub layer: i32,
    pub query: X,
}
impl<X> crate::Identifiable for InvokeWithLayer<X> {
    const CONSTRUCTOR_ID: u32 = 0xda9b0d0d;
}
impl<X: crate::Serializable> crate::Serializable for InvokeWithLayer<X> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        use crate::Identifiable;
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.layer.serialize(buf);
        self.query.serialize(buf);
    }
}
impl<X: crate::RemoteCall> crate::RemoteCall for InvokeWithLayer<X> {
    type Return = X::Return;
}

/// [`initConnection`](https://core.telegram.org/method/initConnection)
///
/// ```tl
/// initConnection#c1cd5ea9 {X:Type} flags:# api_id:int device_model:string system_version:string app_version:string system_lang_code:string lang_pack:string lang_code:string proxy:flags.0?InputClientProxy params:flags.1?JSONValue query:!X = X;
/// ```
///
/// `proxy` and `params` are never sent, so the flags word is always zero.
#[derive(Debug)]
#[derive(Clone, PartialEq)]
pub struct InitConnection<X> {
    pub api_id: i32,
    pub device_model: String,
    pub system_version: String,
    pub app_version: String,
    pub system_lang_code: String,
    pub lang_pack: String,
    pub lang_code: String,
    pub query: X,
}
impl<X> crate::Identifiable for InitConnection<X> {
    const CONSTRUCTOR_ID: u32 = 0xc1cd5ea9;
}
impl<X: crate::Serializable> crate::Serializable for InitConnection<X> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        use crate::Identifiable;
        Self::CONSTRUCTOR_ID.serialize(buf);
        0u32.serialize(buf);
        self.api_id.serialize(buf);
        self.device_model.serialize(buf);
        self.system_version.serialize(buf);
        self.app_version.serialize(buf);
        self.system_lang_code.serialize(buf);
        self.lang_pack.serialize(buf);
        self.lang_code.serialize(buf);
        self.query.serialize(buf);
    }
}
impl<X: crate::RemoteCall> crate::RemoteCall for InitConnection<X> {
    type Return = X::Return;
}

pub mod help {
    use crate::deserialize::{Buffer, Result};
    use crate::{Serializable, enums};

    /// [`help.getConfig`](https://core.telegram.org/method/help.getConfig)
    ///
    /// ```tl
    /// help.getConfig#c4f9186b = Config;
    /// ```
    #[derive(Debug)]
    #[derive(Clone, PartialEq)]
    pub struct GetConfig {}
    impl crate::Identifiable for GetConfig {
        const CONSTRUCTOR_ID: u32 = 0xc4f9186b;
    }
    impl crate::Serializable for GetConfig {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            use crate::Identifiable;
            Self::CONSTRUCTOR_ID.serialize(buf);
        }
    }
    impl crate::Deserializable for GetConfig {
        fn deserialize(_buf: Buffer) -> Result<Self> {
            Ok(Self {})
        }
    }
    impl crate::RemoteCall for GetConfig {
        type Return = enums::Config;
    }
}
