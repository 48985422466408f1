// Copyright 2024 Oxide Computer Company

use crate::data;
use crate::harness::{discard, execute, parse};
use crate::packet::{ipv4_frame, stf_bytes, write_capture};
use pnet::util::MacAddr;
use std::net::Ipv4Addr;
use stf_bmv2::compare::compare_outputs;
use stf_bmv2::error::{EncodeError, Error, SchemaError};
use stf_bmv2::executor::interfaces;
use stf_bmv2::schema::Program;

fn commands(text: &str) -> Vec<String> {
    let program = Program::from_json(data::ROUTER).unwrap();
    let scenario = parse(text);
    assert_eq!(scenario.error_count(), 0, "{:?}", scenario.errors);
    execute(&program, &scenario).unwrap().commands
}

fn failure(text: &str) -> Error {
    let program = Program::from_json(data::ROUTER).unwrap();
    let scenario = parse(text);
    assert_eq!(scenario.error_count(), 0, "{:?}", scenario.errors);
    match execute(&program, &scenario) {
        Err(Error::Statement { source, .. }) => *source,
        Err(e) => panic!("error without line: {}", e),
        Ok(run) => panic!("unexpected success: {:?}", run.commands),
    }
}

#[test]
fn lpm_routes() {
    assert_eq!(
        commands(
            "add routes ipv4.dst:0x0A000000/8 forward(port:1, dmac:0x001122334455)\n\
             add routes dst:0x0A0B**** forward(dmac:0x0000000000AA, port:2)\n\
             add routes dst:3232235777 drop()\n\
             setdefault routes drop()\n"
        ),
        vec![
            "table_add ingress.routes ingress.forward 0x0A000000/8 => 1 0x001122334455",
            "table_add ingress.routes ingress.forward 0x0A0B0000/16 => 2 0x0000000000AA",
            "table_add ingress.routes ingress.drop 3232235777/32 =>",
            "table_set_default ingress.routes ingress.drop",
        ]
    );
}

#[test]
fn ternary_acl() {
    assert_eq!(
        commands(
            "add acl 10 protocol:6 ether_type:0x0800 src:0x0A****** drop()\n\
             add acl protocol:17 NoAction()\n\
             add acl 1 protocol:1 ether_type:0x0800&&&0xFF00 NoAction()\n"
        ),
        vec![
            "table_add ingress.acl ingress.drop 6 0x0800&&&0xFFFF 0x0A000000&&&0xFF000000 => 9990",
            "table_add ingress.acl NoAction 17 0&&&0 0&&&0 => 10000",
            "table_add ingress.acl NoAction 1 0x0800&&&0xFF00 0&&&0 => 9999",
        ]
    );
}

#[test]
fn decimal_ternary_is_rejected() {
    // the field width is known from the header type, the literal is still
    // not maskable
    assert!(matches!(
        failure("add acl protocol:6 ether_type:2048 NoAction()\n"),
        Error::Encode(EncodeError::DecimalTernary { .. })
    ));
    assert_eq!(
        commands("add acl protocol:6 ether_type:2048&&&0xFFFF NoAction()\n"),
        vec!["table_add ingress.acl NoAction 6 2048&&&0xFFFF 0&&&0 => 10000"]
    );
}

#[test]
fn ttl_ranges() {
    assert_eq!(
        commands(
            "add ttl_class ttl:1..63 set_class(class:1)\n\
             add ttl_class 2 ttl:64 set_class(class:2)\n\
             add ttl_class 5 NoAction()\n"
        ),
        vec![
            "table_add ingress.ttl_class ingress.set_class 1->63 => 1 10000",
            "table_add ingress.ttl_class ingress.set_class 64->64 => 2 9998",
            "table_add ingress.ttl_class NoAction 0->0xff => 9995",
        ]
    );
}

#[test]
fn header_stack_names() {
    let expected = vec![
        "table_add ingress.vlans ingress.tag 1 0x00A => 0x00B".to_string(),
    ];
    assert_eq!(
        commands("add vlans vlan[1].valid:1 vlan[0].vid:0x00A tag(vid:0x00B)\n"),
        expected
    );
    assert_eq!(
        commands("add vlans vlan$1.$valid$:1 vlan$0.vid:0x00A tag(vid:0x00B)\n"),
        expected
    );
    // a priority on a table without ordered keys is dropped
    assert_eq!(
        commands("add vlans 3 vid:0x00A vlan[1].valid:1 tag(vid:0x00B)\n"),
        expected
    );
}

#[test]
fn rejected_entries() {
    assert!(matches!(
        failure("add routes dst:0x0A000000/33 drop()\n"),
        Error::Encode(EncodeError::PrefixTooLong { .. })
    ));
    assert!(matches!(
        failure("add ttl_class ttl:0x1* NoAction()\n"),
        Error::Encode(EncodeError::Wildcard { .. })
    ));
    assert!(matches!(
        failure("add vlans vlan[1].valid:2 NoAction()\n"),
        Error::Encode(EncodeError::InvalidValid { .. } | EncodeError::TooWide { .. })
    ));
    assert!(matches!(
        failure("add ttl_class ttl:0x100 NoAction()\n"),
        Error::Encode(EncodeError::TooWide { .. })
    ));
    assert!(matches!(
        failure("add acl 20000 protocol:1 NoAction()\n"),
        Error::Encode(EncodeError::PriorityRange { .. })
    ));
    assert!(matches!(
        failure("add routes dst:1 forward(port:1)\n"),
        Error::Encode(EncodeError::MissingArgument { .. })
    ));
    assert!(matches!(
        failure("add routes dst:1 set_class(class:1)\n"),
        Error::Schema(SchemaError::Unknown { .. })
    ));
}

#[test]
fn routed_frames() -> Result<(), anyhow::Error> {
    let router = MacAddr::new(0x02, 0, 0, 0, 0, 0x01);
    let host = MacAddr::new(0x02, 0, 0, 0, 0, 0x02);
    let next_hop = MacAddr::new(0x00, 0x11, 0x22, 0x33, 0x44, 0x55);
    let src = Ipv4Addr::new(192, 168, 1, 10);
    let dst = Ipv4Addr::new(10, 1, 2, 3);

    let input = ipv4_frame(router, host, src, dst, 64, 17, b"payload");
    let output = ipv4_frame(next_hop, router, src, dst, 63, 17, b"payload");

    // the checksum changes with the ttl, leave it unchecked
    let mut pattern = stf_bytes(&output).replace(' ', "");
    pattern.replace_range(48..52, "****");
    let text = format!(
        "add routes dst:0x0A000000/8 forward(port:4, dmac:0x001122334455)\n\
         packet 1 {}\n\
         expect 4 {} $\n",
        stf_bytes(&input),
        pattern,
    );

    let program = Program::from_json(data::ROUTER)?;
    let scenario = parse(&text);
    assert_eq!(scenario.error_count(), 0, "{:?}", scenario.errors);
    let mut run = execute(&program, &scenario)?;
    assert_eq!(run.injected, vec![(1, input)]);
    assert_eq!(run.report.packets, 1);

    let dir = tempfile::tempdir()?;
    write_capture(dir.path(), 4, &[output])?;
    compare_outputs(
        dir.path(),
        interfaces(&scenario),
        &mut run.expected,
        None,
        &discard(),
    )?;
    assert!(run.expected.is_empty());
    Ok(())
}
