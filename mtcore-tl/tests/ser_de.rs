use mtcore_tl::deserialize::Error;
use mtcore_tl::{Blob, Boxed, Cursor, Deserializable, Identifiable, Serializable, enums, functions, types};

// ── Primitives ────────────────────────────────────────────────────────────────

#[test]
fn bool_uses_boxed_constructors() {
    assert_eq!(true.to_bytes(), 0x997275b5u32.to_le_bytes());
    assert_eq!(false.to_bytes(), 0xbc799737u32.to_le_bytes());
    assert_eq!(bool::from_bytes(&0xbc799737u32.to_le_bytes()).unwrap(), false);
    assert_eq!(
        bool::from_bytes(&0x12345678u32.to_le_bytes()),
        Err(Error::UnexpectedConstructor { id: 0x12345678 })
    );
}

#[test]
fn short_bytes_are_padded_to_four() {
    let bytes = b"abcde".as_slice().to_bytes();
    assert_eq!(bytes, [5, b'a', b'b', b'c', b'd', b'e', 0, 0]);
    assert_eq!(Vec::<u8>::from_bytes(&bytes).unwrap(), b"abcde");
}

#[test]
fn long_bytes_use_four_byte_header() {
    let data = vec![0xaau8; 300];
    let bytes = data.to_bytes();
    assert_eq!(&bytes[..4], &[0xfe, 0x2c, 0x01, 0x00]);
    assert_eq!(bytes.len() % 4, 0);
    assert_eq!(Vec::<u8>::from_bytes(&bytes).unwrap(), data);
}

#[test]
fn invalid_utf8_is_reported() {
    let bytes = vec![0xffu8, 0xfe].to_bytes();
    assert_eq!(String::from_bytes(&bytes), Err(Error::InvalidUtf8));
}

#[test]
fn vector_rejects_negative_length() {
    let mut bytes = 0x1cb5c415u32.to_bytes();
    bytes.extend((-1i32).to_le_bytes());
    assert_eq!(Vec::<i64>::from_bytes(&bytes), Err(Error::NegativeLength(-1)));
}

#[test]
fn truncated_input_is_eof() {
    assert_eq!(i64::from_bytes(&[1, 2, 3]), Err(Error::UnexpectedEof));
    assert_eq!(<[u8; 16]>::from_bytes(&[0; 15]), Err(Error::UnexpectedEof));
}

#[test]
fn absent_flag_field_writes_nothing() {
    let v: Option<i32> = None;
    assert!(v.to_bytes().is_empty());
    assert_eq!(Some(7i32).to_bytes(), 7i32.to_bytes());
}

// ── Schema ────────────────────────────────────────────────────────────────────

#[test]
fn req_pq_multi_layout() {
    let bytes = functions::ReqPqMulti { nonce: [0x11; 16] }.to_bytes();
    assert_eq!(&bytes[..4], &0xbe7e8ef1u32.to_le_bytes());
    assert_eq!(&bytes[4..], &[0x11; 16]);
}

#[test]
fn boxed_checks_constructor() {
    let ack = types::MsgsAck { msg_ids: vec![1, 2, 3] };
    let bytes = Boxed(ack.clone()).to_bytes();
    assert_eq!(mtcore_tl::constructor_id(&bytes), Some(types::MsgsAck::CONSTRUCTOR_ID));
    assert_eq!(Boxed::<types::MsgsAck>::from_bytes(&bytes).unwrap().0, ack);

    let err = Boxed::<types::MsgResendReq>::from_bytes(&bytes).unwrap_err();
    assert_eq!(err, Error::UnexpectedConstructor { id: 0x62d6b459 });
}

#[test]
fn container_messages_keep_raw_bodies() {
    let container = types::MsgContainer {
        messages: vec![
            types::Message { msg_id: 4, seqno: 1, body: vec![1, 2, 3, 4] },
            types::Message { msg_id: 8, seqno: 2, body: 42i64.to_bytes() },
        ],
    };
    let bytes = Boxed(container.clone()).to_bytes();
    // id + count + 2 * (msg_id + seqno + len) + bodies
    assert_eq!(bytes.len(), 4 + 4 + 2 * 16 + 4 + 8);
    let parsed = Boxed::<types::MsgContainer>::from_bytes(&bytes).unwrap().0;
    assert_eq!(parsed, container);
}

#[test]
fn container_body_longer_than_input_is_eof() {
    let mut bytes = 1i32.to_bytes();
    bytes.extend(4i64.to_le_bytes());
    bytes.extend(1i32.to_le_bytes());
    bytes.extend(64i32.to_le_bytes());
    bytes.extend([0u8; 8]);
    assert_eq!(types::MsgContainer::from_bytes(&bytes), Err(Error::UnexpectedEof));
}

#[test]
fn rpc_result_keeps_the_tail() {
    let mut bytes = 0xf35c6d01u32.to_bytes();
    bytes.extend(99i64.to_le_bytes());
    bytes.extend([9, 8, 7, 6]);
    let parsed = Boxed::<types::RpcResult>::from_bytes(&bytes).unwrap().0;
    assert_eq!(parsed.req_msg_id, 99);
    assert_eq!(parsed.result, Blob(vec![9, 8, 7, 6]));
}

#[test]
fn dc_option_flags() {
    let opt = types::DcOption {
        ipv6: true,
        tcpo_only: true,
        r#static: true,
        id: 2,
        ip_address: "2001:67c:4e8:f002::a".into(),
        port: 443,
        secret: Some(vec![0xdd; 16]),
        ..Default::default()
    };
    let bytes = opt.to_bytes();
    let flags = u32::from_le_bytes(bytes[..4].try_into().unwrap());
    assert_eq!(flags, 1 | 4 | 16 | 1024);
    assert_eq!(types::DcOption::from_bytes(&bytes).unwrap(), opt);
}

#[test]
fn config_skips_unmodelled_tail() {
    let config = types::Config {
        flags: 0,
        date: 1_700_000_000,
        expires: 1_700_003_600,
        test_mode: false,
        this_dc: 2,
        dc_options: vec![enums::DcOption::DcOption(types::DcOption {
            id: 2,
            ip_address: "149.154.167.51".into(),
            port: 443,
            ..Default::default()
        })],
    };
    let mut bytes = enums::Config::Config(config.clone()).to_bytes();
    bytes.extend([0x55; 40]);

    let mut cursor = Cursor::from_slice(&bytes);
    let enums::Config::Config(parsed) = enums::Config::deserialize(&mut cursor).unwrap();
    assert_eq!(parsed, config);
    assert_eq!(cursor.remaining(), 0);
}

#[test]
fn dh_answer_dispatch() {
    let retry = types::DhGenRetry {
        nonce: [1; 16],
        server_nonce: [2; 16],
        new_nonce_hash2: [3; 16],
    };
    let bytes = enums::SetClientDhParamsAnswer::DhGenRetry(retry.clone()).to_bytes();
    assert_eq!(&bytes[..4], &0x46dc1fb9u32.to_le_bytes());
    match enums::SetClientDhParamsAnswer::from_bytes(&bytes).unwrap() {
        enums::SetClientDhParamsAnswer::DhGenRetry(x) => assert_eq!(x, retry),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn wrapped_get_config_layout() {
    let req = functions::InvokeWithLayer {
        layer: mtcore_tl::LAYER,
        query: functions::InitConnection {
            api_id: 17349,
            device_model: "pc".into(),
            system_version: "linux".into(),
            app_version: "1.0".into(),
            system_lang_code: "en".into(),
            lang_pack: String::new(),
            lang_code: "en".into(),
            query: functions::help::GetConfig {},
        },
    };
    let bytes = req.to_bytes();
    assert_eq!(&bytes[..4], &0xda9b0d0du32.to_le_bytes());
    assert_eq!(&bytes[4..8], &mtcore_tl::LAYER.to_le_bytes());
    assert_eq!(&bytes[8..12], &0xc1cd5ea9u32.to_le_bytes());
    assert_eq!(&bytes[12..16], &0u32.to_le_bytes());
    assert_eq!(&bytes[bytes.len() - 4..], &0xc4f9186bu32.to_le_bytes());
}

#[test]
fn config_simple_reads_bare_ip_ports() {
    let mut bytes = 0xd997c3c5u32.to_bytes();
    bytes.extend(10i32.to_le_bytes());
    bytes.extend(20i32.to_le_bytes());
    bytes.extend(2i32.to_le_bytes());
    bytes.extend(0x1cb5c415u32.to_le_bytes());
    bytes.extend(1i32.to_le_bytes());
    bytes.extend(0x0a000001i32.to_le_bytes());
    bytes.extend(443i32.to_le_bytes());

    let enums::help::ConfigSimple::ConfigSimple(cfg) =
        enums::help::ConfigSimple::from_bytes(&bytes).unwrap();
    assert_eq!(cfg.dc_id, 2);
    assert_eq!(cfg.ip_port_list, vec![types::IpPort { ipv4: 0x0a000001, port: 443 }]);
}
