use std::time::{Duration, UNIX_EPOCH};

use mtcore_mtproto::transport::{Framing, TransportKind};
use mtcore_mtproto::{MessageId, PlainMessage, Session};

#[test]
fn seq_no_parity() {
    let mut s = Session::new();
    let a = s.next_seq_no(true);
    let b = s.next_seq_no(true);
    assert_eq!(a & 1, 1, "content-related seq_no must be odd");
    assert_eq!(b & 1, 1);
    assert!(b > a, "seq_no must increase");
    assert_eq!(s.next_seq_no(false), 4, "unrelated seq_no is even and does not advance");
    assert_eq!(s.next_seq_no(true), 5);
}

#[test]
fn msg_ids_strictly_increase_on_a_frozen_clock() {
    let mut s = Session::with_id(1);
    let frozen = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
    let a = s.msg_id_at(frozen);
    let b = s.msg_id_at(frozen);
    let c = s.msg_id_at(frozen);
    assert_eq!(b.0 - a.0, 4);
    assert_eq!(c.0 - b.0, 4);
    assert!([a, b, c].iter().all(|id| id.is_client()));
    assert_eq!(a.unixtime(), 1_700_000_000);
}

#[test]
fn reset_starts_numbering_over() {
    let mut s = Session::new();
    let id = s.id();
    s.next_seq_no(true);
    s.reset();
    assert_ne!(s.id(), id);
    assert_eq!(s.next_seq_no(true), 1);
}

#[test]
fn plaintext_layout() {
    let msg = PlainMessage::new(MessageId(0x1122_3344_5566_7788), vec![0xAA, 0xBB, 0xCC, 0xDD]);
    let wire = msg.to_plaintext_bytes();

    // auth_key_id, msg_id, length, body
    assert_eq!(wire.len(), 8 + 8 + 4 + 4);
    assert_eq!(&wire[..8], &[0u8; 8]);
    assert_eq!(u32::from_le_bytes([wire[16], wire[17], wire[18], wire[19]]), 4);
    assert_eq!(PlainMessage::from_plaintext_bytes(&wire).unwrap(), msg);
}

#[test]
fn plaintext_rejects_a_key_id() {
    let mut wire = PlainMessage::new(MessageId(8), vec![0; 4]).to_plaintext_bytes();
    wire[0] = 1;
    assert!(PlainMessage::from_plaintext_bytes(&wire).is_err());
}

#[test]
fn every_transport_reads_back_what_it_wrote() {
    for kind in [TransportKind::Abridged, TransportKind::Intermediate, TransportKind::Full] {
        let mut tx = kind.framing();
        let mut rx = kind.framing();
        let mut stream = Vec::new();
        tx.pack(&[1; 12], &mut stream);
        tx.pack(&[2; 600], &mut stream);

        let first = rx.unpack(&stream).unwrap().unwrap();
        assert_eq!(first.payload, vec![1; 12], "{kind:?}");
        let second = rx.unpack(&stream[first.consumed..]).unwrap().unwrap();
        assert_eq!(second.payload, vec![2; 600], "{kind:?}");
        assert_eq!(first.consumed + second.consumed, stream.len());
    }
}

#[test]
fn init_bytes_per_transport() {
    assert_eq!(TransportKind::Abridged.framing().init_bytes(), &[0xef]);
    assert_eq!(TransportKind::Intermediate.framing().init_bytes(), &[0xee; 4]);
    assert!(TransportKind::Full.framing().init_bytes().is_empty());
}
