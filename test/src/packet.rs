// Copyright 2024 Oxide Computer Company

//! Frame builders and capture helpers.

use pcap_parser::Linktype;
use pnet::packet::ethernet::{EtherType, MutableEthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocol;
use pnet::packet::ipv4::{self, MutableIpv4Packet};
use pnet::packet::ipv6::MutableIpv6Packet;
use pnet::packet::Packet;
use pnet::util::MacAddr;
use std::fs::File;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;
use stf_bmv2::compare::output_pcap;
use stf_bmv2::pcap::PcapWriter;

pub fn v6<'a>(
    src: Ipv6Addr,
    dst: Ipv6Addr,
    payload: &[u8],
    data: &'a mut [u8],
) -> MutableIpv6Packet<'a> {
    data.fill(0);

    let mut pkt = MutableIpv6Packet::new(data).unwrap();
    pkt.set_version(6);
    pkt.set_source(src);
    pkt.set_destination(dst);
    pkt.set_payload_length(payload.len() as u16);
    pkt.set_payload(payload);
    pkt
}

pub fn v4<'a>(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    ttl: u8,
    protocol: u8,
    payload: &[u8],
    data: &'a mut [u8],
) -> MutableIpv4Packet<'a> {
    data.fill(0);

    let mut pkt = MutableIpv4Packet::new(data).unwrap();
    pkt.set_version(4);
    pkt.set_header_length(5);
    pkt.set_ttl(ttl);
    pkt.set_next_level_protocol(IpNextHeaderProtocol(protocol));
    pkt.set_source(src);
    pkt.set_destination(dst);
    pkt.set_total_length(20 + payload.len() as u16);
    pkt.set_payload(payload);
    let csum = ipv4::checksum(&pkt.to_immutable());
    pkt.set_checksum(csum);
    pkt
}

/// An ethernet frame carrying `payload`.
pub fn ethernet(
    dst: MacAddr,
    src: MacAddr,
    ether_type: u16,
    payload: &[u8],
) -> Vec<u8> {
    let mut data =
        vec![0u8; MutableEthernetPacket::minimum_packet_size() + payload.len()];
    let mut pkt = MutableEthernetPacket::new(&mut data).unwrap();
    pkt.set_destination(dst);
    pkt.set_source(src);
    pkt.set_ethertype(EtherType(ether_type));
    pkt.set_payload(payload);
    data
}

/// An ethernet frame carrying an ipv4 packet with `payload`.
pub fn ipv4_frame(
    dst_mac: MacAddr,
    src_mac: MacAddr,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    ttl: u8,
    protocol: u8,
    payload: &[u8],
) -> Vec<u8> {
    let mut buf = vec![0u8; 20 + payload.len()];
    let ip = v4(src, dst, ttl, protocol, payload, &mut buf);
    ethernet(dst_mac, src_mac, 0x0800, ip.packet())
}

/// An ethernet frame carrying an ipv6 packet with `payload`.
pub fn ipv6_frame(
    dst_mac: MacAddr,
    src_mac: MacAddr,
    src: Ipv6Addr,
    dst: Ipv6Addr,
    payload: &[u8],
) -> Vec<u8> {
    let mut buf = vec![0u8; 40 + payload.len()];
    let ip = v6(src, dst, payload, &mut buf);
    ethernet(dst_mac, src_mac, 0x86dd, ip.packet())
}

/// Packet bytes as scenario packet data, one space separated byte pair
/// per octet.
pub fn stf_bytes(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Write the capture a switch would produce for `port`.
pub fn write_capture(
    dir: &Path,
    port: u32,
    packets: &[Vec<u8>],
) -> std::io::Result<()> {
    let file = File::create(output_pcap(dir, port))?;
    let mut w = PcapWriter::new(file, Linktype::ETHERNET)?;
    for p in packets {
        w.write_packet(p)?;
    }
    Ok(())
}
