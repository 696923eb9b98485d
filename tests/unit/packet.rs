extern crate mesh_node;

use mesh_node::node::packet::*;
use mesh_node::node::Node;

#[test]
fn decoded_frame_reencodes_to_its_trimmed_form() {
    let raw = " 1f4||CHAT||7||03||00000001ABCD0001||5||1||hello ";
    let pkt = Packet::decode(raw);

    assert!(pkt.valid);
    assert_eq!(pkt.to_wire().expect("Could not encode"), raw.trim());
}

#[test]
fn message_absorbs_extra_delimiters() {
    let pkt = Packet::decode("1||DATA||05||01||id||9||0||01||03||0||a||b");

    assert!(pkt.valid);
    assert_eq!(pkt.kind(), PacketKind::Data);
    assert_eq!(pkt.message, "01||03||0||a||b");
}

#[test]
fn malformed_frames_are_invalid() {
    let frames = [
        "",
        "no delimiters at all",
        "1||DATA||05||01||id||5||0",
        "1||DATA||05||01||id||-3||0||hello",
        "1||DATA||05||01||id||5||yes||hello",
    ];
    for raw in frames.iter() {
        let pkt = Packet::decode(raw);
        assert!(!pkt.valid, "Frame {:?} should be invalid", raw);
        assert_eq!(pkt, Packet::default());
    }
}

#[test]
fn invalid_utf8_is_replaced_not_rejected() {
    let mut data = b"1||CHAT||7||03||id||2||1||".to_vec();
    data.extend_from_slice(&[0xFF, 0x41]);
    let pkt = Packet::from_bytes(&data);

    assert!(pkt.valid);
    assert!(pkt.message.ends_with('A'));
}

#[test]
fn header_fields_cannot_hold_the_delimiter() {
    let pkt = Packet::new("CHAT", "7||8", "03", String::from("hi"), true);
    assert!(pkt.encode().is_err());

    let pkt = Packet::new("CHAT", "7", "03", String::from("h||i"), true);
    assert!(pkt.encode().is_ok());
}

#[test]
fn stamped_packets_get_distinct_ids() {
    let mut rng = Node::rng_from_seed(3);
    let a = Packet::new("CHAT", "7", "03", String::from("x"), true).stamp(1000, &mut rng);
    let b = Packet::new("CHAT", "7", "03", String::from("x"), true).stamp(1000, &mut rng);

    assert_eq!(a.timestamp_hex, "3e8");
    assert_eq!(a.message_id.len(), 16);
    assert!(a.message_id.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(a.message_id, b.message_id);
}

#[test]
fn surrounding_whitespace_is_not_preserved() {
    let pkt = Packet::new("CHAT", "7", "03", String::from("  padded  "), true);
    let decoded = Packet::from_bytes(&pkt.encode().expect("Could not encode"));

    assert!(decoded.valid);
    assert_eq!(decoded.message, "padded");
    assert_eq!(decoded.length, 10);
}
