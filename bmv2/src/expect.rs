// Copyright 2024 Oxide Computer Company

use std::collections::BTreeMap;
use stf::ast::PacketData;

/// What a single output port is expected to produce.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortExpectation {
    /// Any number of packets with any content is acceptable.
    pub any: bool,

    /// Expected packets in arrival order. An empty pattern requires a
    /// packet but says nothing about its content.
    pub packets: Vec<PacketData>,
}

/// Expected output per port. Filled in while a scenario executes and
/// consumed port by port during comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedOutput {
    ports: BTreeMap<u32, PortExpectation>,
}

impl ExpectedOutput {
    pub fn expect_any(&mut self, port: u32) {
        self.ports.entry(port).or_default().any = true;
    }

    pub fn expect_packet(&mut self, port: u32, data: PacketData) {
        self.ports.entry(port).or_default().packets.push(data);
    }

    pub fn get(&self, port: u32) -> Option<&PortExpectation> {
        self.ports.get(&port)
    }

    /// Remove and return the expectation for a port.
    pub fn take(&mut self, port: u32) -> Option<PortExpectation> {
        self.ports.remove(&port)
    }

    pub fn ports(&self) -> impl Iterator<Item = u32> + '_ {
        self.ports.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }
}
