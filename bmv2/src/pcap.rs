// Copyright 2024 Oxide Computer Company

//! Reading and writing classic pcap files.

use crate::error::CompareError;
use pcap_parser::pcap::{self, LegacyPcapBlock, PcapHeader};
use pcap_parser::{Linktype, ToVec};
use std::io::{self, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Writes packets to a pcap stream. The header is written on creation.
pub struct PcapWriter<W: Write> {
    out: W,
}

impl<W: Write> PcapWriter<W> {
    pub fn new(mut out: W, linktype: Linktype) -> io::Result<Self> {
        let mut hdr = PcapHeader {
            magic_number: 0xa1b2c3d4,
            version_major: 2,
            version_minor: 4,
            thiszone: 0,
            sigfigs: 0,
            snaplen: 65535,
            network: linktype,
        };
        out.write_all(&hdr.to_vec().map_err(gen_error)?)?;
        out.flush()?;
        Ok(Self { out })
    }

    pub fn write_packet(&mut self, data: &[u8]) -> io::Result<()> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let mut block = LegacyPcapBlock {
            ts_sec: now.as_secs() as u32,
            ts_usec: now.subsec_micros(),
            caplen: data.len() as u32,
            origlen: data.len() as u32,
            data,
        };
        self.out.write_all(&block.to_vec().map_err(gen_error)?)?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn gen_error(e: impl std::fmt::Debug) -> io::Error {
    io::Error::other(format!("pcap serialization: {:?}", e))
}

/// Read every packet from a pcap file. A missing or empty file holds no
/// packets.
pub fn read_packets(path: &Path) -> Result<Vec<Vec<u8>>, CompareError> {
    let buf = match std::fs::read(path) {
        Ok(buf) => buf,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    parse_packets(&buf).map_err(|message| CompareError::Pcap {
        path: path.into(),
        message,
    })
}

/// Parse a pcap image held in memory.
pub fn parse_packets(buf: &[u8]) -> Result<Vec<Vec<u8>>, String> {
    if buf.is_empty() {
        return Ok(Vec::new());
    }
    let (mut rest, header) = pcap::parse_pcap_header(buf)
        .map_err(|e| format!("bad header: {:?}", e))?;

    let big_endian = header.is_bigendian();
    let mut packets = Vec::new();
    while !rest.is_empty() {
        let parsed = if big_endian {
            pcap::parse_pcap_frame_be(rest)
        } else {
            pcap::parse_pcap_frame(rest)
        };
        let (next, block) = parsed.map_err(|e| {
            format!("bad frame {} ({} bytes left): {:?}", packets.len(), rest.len(), e)
        })?;
        packets.push(block.data.to_vec());
        rest = next;
    }
    Ok(packets)
}
