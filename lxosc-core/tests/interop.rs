//! Wire compatibility with the `rosc` codec.

use lxosc_core::{OscArgument, OscBundle, OscEncode, OscMessage, OscPacket, OscTimeTag};
use rosc::{OscType, decoder, encoder};

#[test]
fn rosc_decodes_our_messages() {
    let msg = OscMessage::new("/lx/mixer/channel/1")
        .arg(42)
        .arg(0.25f32)
        .arg("name")
        .arg(vec![1u8, 2, 3])
        .arg(true)
        .arg(OscArgument::Nil);
    let bytes = msg.to_bytes().unwrap();

    let (rest, packet) = decoder::decode_udp(&bytes).unwrap();
    assert!(rest.is_empty());
    let rosc::OscPacket::Message(decoded) = packet else {
        panic!("expected a message");
    };
    assert_eq!(decoded.addr, "/lx/mixer/channel/1");
    assert_eq!(
        decoded.args,
        vec![
            OscType::Int(42),
            OscType::Float(0.25),
            OscType::String("name".into()),
            OscType::Blob(vec![1, 2, 3]),
            OscType::Bool(true),
            OscType::Nil,
        ]
    );
}

#[test]
fn we_decode_rosc_messages() {
    let packet = rosc::OscPacket::Message(rosc::OscMessage {
        addr: "/lx/tempo/bpm".into(),
        args: vec![
            OscType::Float(128.0),
            OscType::Long(-7),
            OscType::Double(0.5),
            OscType::String("abcd".into()),
            OscType::Inf,
        ],
    });
    let bytes = encoder::encode(&packet).unwrap();

    let msg = match OscPacket::parse(&bytes).unwrap() {
        OscPacket::Message(msg) => msg,
        other => panic!("unexpected {other}"),
    };
    assert_eq!(msg.address(), "/lx/tempo/bpm");
    assert_eq!(msg.type_tag(), ",fhdsI");
    assert_eq!(msg.get_float(0).unwrap(), 128.0);
    assert_eq!(msg.get_long(1).unwrap(), -7);
    assert_eq!(msg.get_double(2).unwrap(), 0.5);
    assert_eq!(msg.get_string(3).unwrap(), "abcd");
    assert_eq!(msg.arg_at(4), Some(&OscArgument::Infinitum));
}

#[test]
fn bundles_cross_both_ways() {
    let ours = OscBundle::new(OscTimeTag::new(3_900_000_000, 1 << 31))
        .with(OscMessage::new("/one").arg(1))
        .with(OscMessage::new("/two").arg("x"));
    let bytes = ours.to_bytes().unwrap();

    let (_, packet) = decoder::decode_udp(&bytes).unwrap();
    let rosc::OscPacket::Bundle(theirs) = packet else {
        panic!("expected a bundle");
    };
    assert_eq!(theirs.timetag.seconds, 3_900_000_000);
    assert_eq!(theirs.timetag.fractional, 1 << 31);
    assert_eq!(theirs.content.len(), 2);

    let back = encoder::encode(&rosc::OscPacket::Bundle(theirs)).unwrap();
    assert_eq!(back, bytes);
    let messages = OscPacket::parse(&back).unwrap().into_messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].get_string(0).unwrap(), "x");
}
