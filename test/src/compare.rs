// Copyright 2024 Oxide Computer Company

use crate::data;
use crate::harness::{discard, execute, parse};
use crate::packet::{ethernet, ipv6_frame, stf_bytes, write_capture};
use pnet::util::MacAddr;
use std::net::Ipv6Addr;
use stf_bmv2::compare::compare_outputs;
use stf_bmv2::error::CompareError;
use stf_bmv2::executor::interfaces;
use stf_bmv2::schema::Program;

fn outcome(text: &str, captures: &[(u32, Vec<Vec<u8>>)]) -> Result<(), CompareError> {
    let program = Program::from_json(data::EXACT).unwrap();
    let scenario = parse(text);
    assert_eq!(scenario.error_count(), 0, "{:?}", scenario.errors);
    let mut run = execute(&program, &scenario).unwrap();
    let dir = tempfile::tempdir().unwrap();
    for (port, packets) in captures {
        write_capture(dir.path(), *port, packets).unwrap();
    }
    compare_outputs(
        dir.path(),
        interfaces(&scenario),
        &mut run.expected,
        None,
        &discard(),
    )
}

#[test]
fn wildcard_compare() {
    let text = "packet 0 00\nexpect 1 11 ** 33\n";
    assert!(outcome(text, &[(1, vec![vec![0x11, 0x22, 0x33]])]).is_ok());

    match outcome(text, &[(1, vec![vec![0x11, 0x22, 0x44]])]) {
        Err(CompareError::Mismatch { port, position, .. }) => {
            assert_eq!(port, 1);
            assert_eq!(position, 4);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn missing_expected_packet() {
    let err = outcome("packet 0 00\nexpect 2 aa bb\n", &[]).unwrap_err();
    assert!(err.to_string().contains("port 2"), "{}", err);
}

#[test]
fn packets_compare_in_order() {
    let text = "packet 0 00\nexpect 1 01\nexpect 1 02\n";
    assert!(outcome(text, &[(1, vec![vec![0x01], vec![0x02]])]).is_ok());
    assert!(matches!(
        outcome(text, &[(1, vec![vec![0x02], vec![0x01]])]),
        Err(CompareError::Mismatch { index: 0, .. })
    ));
    assert!(matches!(
        outcome(text, &[(1, vec![vec![0x01]])]),
        Err(CompareError::CountMismatch {
            port: 1,
            expected: 2,
            observed: 1
        })
    ));
}

#[test]
fn exact_length_patterns() {
    let text = "packet 0 00\nexpect 1 ab $\n";
    assert!(outcome(text, &[(1, vec![vec![0xab]])]).is_ok());
    assert!(matches!(
        outcome(text, &[(1, vec![vec![0xab, 0xcd]])]),
        Err(CompareError::LongPacket { .. })
    ));
    // without the terminator trailing bytes are ignored
    let text = "packet 0 00\nexpect 1 ab\n";
    assert!(outcome(text, &[(1, vec![vec![0xab, 0xcd]])]).is_ok());
}

#[test]
fn any_packet_and_silence() {
    // a bare expect accepts whatever shows up on the port
    let text = "packet 0 00\nexpect 1\n";
    assert!(outcome(text, &[(1, vec![vec![1], vec![2], vec![3]])]).is_ok());
    assert!(outcome(text, &[]).is_ok());

    // ports nobody expects anything on are not checked
    assert!(outcome("packet 0 00\n", &[(0, vec![vec![9]])]).is_ok());
}

#[test]
fn ethernet_frames() {
    let frame = ethernet(
        MacAddr::new(0x11, 0x22, 0x33, 0x44, 0x55, 0x66),
        MacAddr::new(0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc),
        0x86dd,
        &[0xde, 0xad, 0xbe, 0xef],
    );
    // any source address, exact ether type and payload
    let text = format!(
        "packet 0 {}\nexpect 3 112233445566 ************ 86dd deadbeef $\n",
        stf_bytes(&frame)
    );
    assert!(outcome(&text, &[(3, vec![frame.clone()])]).is_ok());

    let mut other = frame.clone();
    other[12] = 0x08;
    other[13] = 0x00;
    match outcome(&text, &[(3, vec![other])]) {
        Err(CompareError::Mismatch { position, .. }) => assert_eq!(position, 24),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn ipv6_source_wildcard() {
    let dst_mac = MacAddr::new(0x02, 0, 0, 0, 0, 0x01);
    let src_mac = MacAddr::new(0x02, 0, 0, 0, 0, 0x02);
    let host: Ipv6Addr = "fd00::10".parse().unwrap();
    let server: Ipv6Addr = "2001:db8::1".parse().unwrap();
    let frame = ipv6_frame(dst_mac, src_mac, host, server, b"hello");

    // the ipv6 source address follows 14 bytes of ethernet and 8 bytes of
    // fixed header
    let mut pattern = stf_bytes(&frame).replace(' ', "");
    pattern.replace_range(44..76, &"*".repeat(32));
    let text = format!(
        "packet 0 {}
expect 1 {} $
",
        stf_bytes(&frame),
        pattern
    );

    let relayed = ipv6_frame(
        dst_mac,
        src_mac,
        "fd00::99".parse().unwrap(),
        server,
        b"hello",
    );
    assert!(outcome(&text, &[(1, vec![relayed])]).is_ok());

    let misrouted = ipv6_frame(
        dst_mac,
        src_mac,
        host,
        "2001:db8::2".parse().unwrap(),
        b"hello",
    );
    match outcome(&text, &[(1, vec![misrouted])]) {
        Err(CompareError::Mismatch { position, .. }) => assert_eq!(position, 107),
        other => panic!("unexpected {:?}", other),
    }
}
