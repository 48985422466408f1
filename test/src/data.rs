// Copyright 2024 Oxide Computer Company

//! Compiled program descriptions used by the scenario tests.

/// One exact keyed table `t` with key `k` and a single argument action.
pub const EXACT: &str = r#"{
    "actions": [
        {"id": 0, "name": "a", "runtime_data": [{"name": "p", "bitwidth": 8}]}
    ],
    "pipelines": [{"name": "ingress", "tables": [
        {"name": "t", "match_type": "exact",
         "key": [{"match_type": "exact", "name": "k", "bitwidth": 8}],
         "actions": ["a"], "action_ids": [0]}
    ]}]
}"#;

/// A small router: ipv4 longest prefix forwarding, a ternary acl, a ttl
/// classifier using range keys and a header stack check.
pub const ROUTER: &str = r#"{
    "header_types": [
        {"name": "ethernet_t", "fields": [
            ["dst", 48, false], ["src", 48, false], ["ether_type", 16, false]]},
        {"name": "vlan_t", "fields": [
            ["pcp", 3, false], ["dei", 1, false], ["vid", 12, false],
            ["ether_type", 16, false]]},
        {"name": "ipv4_t", "fields": [
            ["version", 4, false], ["ihl", 4, false], ["diffserv", 8, false],
            ["total_len", 16, false], ["identification", 16, false],
            ["flags", 3, false], ["frag_offset", 13, false], ["ttl", 8, false],
            ["protocol", 8, false], ["hdr_checksum", 16, false],
            ["src", 32, false], ["dst", 32, false]]}
    ],
    "headers": [
        {"name": "ethernet", "header_type": "ethernet_t"},
        {"name": "vlan[0]", "header_type": "vlan_t"},
        {"name": "vlan[1]", "header_type": "vlan_t"},
        {"name": "ipv4", "header_type": "ipv4_t"}
    ],
    "counter_arrays": [
        {"name": "ingress.port_hits", "id": 0, "size": 16},
        {"name": "egress.drops", "id": 1, "size": 16}
    ],
    "actions": [
        {"id": 0, "name": "ingress.forward", "runtime_data": [
            {"name": "port", "bitwidth": 9}, {"name": "dmac", "bitwidth": 48}]},
        {"id": 1, "name": "ingress.drop", "runtime_data": []},
        {"id": 2, "name": "NoAction", "runtime_data": []},
        {"id": 3, "name": "ingress.set_class", "runtime_data": [
            {"name": "class", "bitwidth": 8}]},
        {"id": 4, "name": "ingress.tag", "runtime_data": [
            {"name": "vid", "bitwidth": 12}]}
    ],
    "pipelines": [{"name": "ingress", "tables": [
        {"name": "ingress.routes", "match_type": "lpm",
         "key": [{"match_type": "lpm", "target": ["ipv4", "dst"], "mask": null}],
         "actions": ["ingress.forward", "ingress.drop"], "action_ids": [0, 1]},
        {"name": "ingress.acl", "match_type": "ternary",
         "key": [
            {"match_type": "exact", "target": ["ipv4", "protocol"]},
            {"match_type": "ternary", "target": ["ethernet", "ether_type"]},
            {"match_type": "ternary", "target": ["ipv4", "src"]}
         ],
         "actions": ["ingress.drop", "NoAction"], "action_ids": [1, 2]},
        {"name": "ingress.ttl_class", "match_type": "range",
         "key": [{"match_type": "range", "target": ["ipv4", "ttl"]}],
         "actions": ["ingress.set_class", "NoAction"], "action_ids": [3, 2]},
        {"name": "ingress.vlans", "match_type": "exact",
         "key": [
            {"match_type": "valid", "target": ["vlan[1]", "$valid$"]},
            {"match_type": "exact", "target": ["vlan[0]", "vid"]}
         ],
         "actions": ["ingress.tag", "NoAction"], "action_ids": [4, 2]}
    ]}]
}"#;
