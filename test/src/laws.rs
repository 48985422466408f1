// Copyright 2024 Oxide Computer Company

use crate::data;
use crate::harness::parse;
use rand::seq::SliceRandom;
use stf::ast::Statement;
use stf_bmv2::encode::encode_match_key;
use stf_bmv2::schema::Program;

const SCENARIO: &str = "\
# everything the router understands
add routes ipv4.dst:0x0A000000/8 forward(port:1, dmac:0x001122334455) = r1
add routes dst:0x0A0B**** drop()
add acl 10 protocol:6 ether_type:0x0800&&&0xFF00 src:0x0A****** drop()
add ttl_class ttl:1..63 set_class(class:1)
add vlans vlan[1].valid:1 vlan$0.vid:0x00A tag(vid:11)
setdefault routes drop()
remove all
mc_mgrp_create 1
mirroring_add 5 6
packet 1 0011 2233
expect 4 00** 22 33 $
expect 2
expect
no_packet
wait
check_counter port_hits(0) bytes >= 64
check_counter egress.drops(3)
";

#[test]
fn canonical_form_reparses_identically() {
    let first = parse(SCENARIO);
    assert_eq!(first.error_count(), 0, "{:?}", first.errors);
    let canonical = first.to_string();
    let second = parse(&canonical);
    assert_eq!(second.error_count(), 0, "{:?}", second.errors);

    let a: Vec<&Statement> = first.statements().collect();
    let b: Vec<&Statement> = second.statements().collect();
    assert_eq!(a, b);
    assert_eq!(second.to_string(), canonical);
}

#[test]
fn match_key_ignores_field_order() {
    let program = Program::from_json(data::ROUTER).unwrap();
    let scenario = parse(
        "add acl protocol:6 ether_type:0x08** src:0x0A****** drop()\n\
         add vlans vlan[0].vid:7 vlan[1].valid:0 NoAction()\n",
    );
    assert_eq!(scenario.error_count(), 0, "{:?}", scenario.errors);

    let mut rng = rand::rng();
    for s in scenario.statements() {
        let Statement::Add(add) = s else {
            panic!("expected add");
        };
        let table = program.table(&add.table.normalized()).unwrap();
        let reference = encode_match_key(table, &add.matches).unwrap();
        let mut matches = add.matches.clone();
        for _ in 0..16 {
            matches.shuffle(&mut rng);
            assert_eq!(encode_match_key(table, &matches).unwrap(), reference);
        }
    }
}

#[test]
fn one_key_field_per_schema_entry() {
    let program = Program::from_json(data::ROUTER).unwrap();
    for (text, fields) in [
        ("add acl drop()", 3),
        ("add acl src:0x0A****** drop()", 3),
        ("add routes dst:1 drop()", 1),
        ("add ttl_class NoAction()", 1),
        ("add vlans vid:1 NoAction()", 2),
    ] {
        let scenario = parse(text);
        let Some(Statement::Add(add)) = scenario.statements().next() else {
            panic!("expected add: {}", text);
        };
        let table = program.table(&add.table.normalized()).unwrap();
        let key = encode_match_key(table, &add.matches).unwrap();
        assert_eq!(key.split_whitespace().count(), fields, "{}", text);
    }
}
