//! Boxed types: each enum reads a constructor id and dispatches to the
//! matching bare constructor in [`crate::types`].

use crate::deserialize::{Buffer, Error, Result};
use crate::{Deserializable, Identifiable, Serializable, types};

macro_rules! boxed_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident($ty:path)),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug)]
        #[derive(Clone, PartialEq)]
        pub enum $name {
            $($variant($ty)),+
        }

        impl Serializable for $name {
            fn serialize(&self, buf: &mut impl Extend<u8>) {
                match self {
                    $(Self::$variant(x) => {
                        <$ty as Identifiable>::CONSTRUCTOR_ID.serialize(buf);
                        x.serialize(buf);
                    })+
                }
            }
        }

        impl Deserializable for $name {
            fn deserialize(buf: Buffer) -> Result<Self> {
                let id = u32::deserialize(buf)?;
                $(
                    if id == <$ty as Identifiable>::CONSTRUCTOR_ID {
                        return Ok(Self::$variant(<$ty>::deserialize(buf)?));
                    }
                )+
                Err(Error::UnexpectedConstructor { id })
            }
        }
    };
}

boxed_enum! {
    /// `ResPQ`
    ResPq { ResPq(types::ResPq) }
}

boxed_enum! {
    /// `P_Q_inner_data`
    PQInnerData { PQInnerData(types::PQInnerData) }
}

boxed_enum! {
    /// `Server_DH_Params`
    ServerDhParams {
        Fail(types::ServerDhParamsFail),
        Ok(types::ServerDhParamsOk),
    }
}

boxed_enum! {
    /// `Server_DH_inner_data`
    ServerDhInnerData { ServerDhInnerData(types::ServerDhInnerData) }
}

boxed_enum! {
    /// `Client_DH_Inner_Data`
    ClientDhInnerData { ClientDhInnerData(types::ClientDhInnerData) }
}

boxed_enum! {
    /// `Set_client_DH_params_answer`
    SetClientDhParamsAnswer {
        DhGenOk(types::DhGenOk),
        DhGenRetry(types::DhGenRetry),
        DhGenFail(types::DhGenFail),
    }
}

boxed_enum! {
    /// `BadMsgNotification`
    BadMsgNotification {
        BadMsgNotification(types::BadMsgNotification),
        BadServerSalt(types::BadServerSalt),
    }
}

boxed_enum! {
    /// `MsgDetailedInfo`
    MsgDetailedInfo {
        MsgDetailedInfo(types::MsgDetailedInfo),
        MsgNewDetailedInfo(types::MsgNewDetailedInfo),
    }
}

boxed_enum! {
    /// `RpcError`
    RpcError { RpcError(types::RpcError) }
}

boxed_enum! {
    /// `Pong`
    Pong { Pong(types::Pong) }
}

boxed_enum! {
    /// `DestroyAuthKeyRes`
    DestroyAuthKeyRes {
        DestroyAuthKeyOk(types::DestroyAuthKeyOk),
        DestroyAuthKeyNone(types::DestroyAuthKeyNone),
        DestroyAuthKeyFail(types::DestroyAuthKeyFail),
    }
}

boxed_enum! {
    /// `DcOption`
    DcOption { DcOption(types::DcOption) }
}

boxed_enum! {
    /// `Config`
    Config { Config(types::Config) }
}

pub mod help {
    use super::*;

    boxed_enum! {
        /// `help.ConfigSimple`
        ConfigSimple { ConfigSimple(types::help::ConfigSimple) }
    }
}
