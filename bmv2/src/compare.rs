// Copyright 2024 Oxide Computer Company

//! Comparison of captured output against expected packets.

use crate::error::CompareError;
use crate::expect::{ExpectedOutput, PortExpectation};
use crate::pcap::read_packets;
use slog::{debug, info, Logger};
use std::io::Write;
use std::path::{Path, PathBuf};
use stf::ast::PacketData;

/// Name of the capture the switch writes for an output port.
pub fn output_pcap(dir: &Path, port: u32) -> PathBuf {
    dir.join(format!("pcap{}_out.pcap", port))
}

/// Upper case hex rendering of packet bytes.
pub fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02X}", b)).collect()
}

/// How an observed packet differs from an expected pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    /// The observed packet is shorter than the pattern.
    Short { expected: usize, observed: usize },

    /// The observed packet is longer than an exact length pattern.
    Long { expected: usize, observed: usize },

    /// First nibble position that differs.
    At(usize),
}

/// Match an observed packet against an expected pattern. `*` nibbles in the
/// pattern match anything. Unless the pattern is exact length, observed
/// bytes past the end of the pattern are ignored.
pub fn compare_packet(
    expected: &PacketData,
    observed: &[u8],
) -> Result<(), Mismatch> {
    let observed = hex(observed);
    let want = expected.nibbles.as_bytes();
    let got = observed.as_bytes();

    if got.len() < want.len() {
        return Err(Mismatch::Short {
            expected: want.len(),
            observed: got.len(),
        });
    }
    if expected.exact && got.len() > want.len() {
        return Err(Mismatch::Long {
            expected: want.len(),
            observed: got.len(),
        });
    }
    match want
        .iter()
        .zip(got)
        .position(|(w, g)| *w != b'*' && w != g)
    {
        Some(i) => Err(Mismatch::At(i)),
        None => Ok(()),
    }
}

/// Compare the packets observed on one port with what was expected there.
pub fn compare_port(
    port: u32,
    expectation: &PortExpectation,
    observed: &[Vec<u8>],
) -> Result<(), CompareError> {
    if expectation.any {
        if !expectation.packets.is_empty() {
            return Err(CompareError::AnyWithPackets(port));
        }
        return Ok(());
    }

    if observed.len() != expectation.packets.len() {
        return Err(CompareError::CountMismatch {
            port,
            expected: expectation.packets.len(),
            observed: observed.len(),
        });
    }

    for (index, (want, got)) in
        expectation.packets.iter().zip(observed).enumerate()
    {
        match compare_packet(want, got) {
            Ok(()) => {}
            Err(Mismatch::Short { expected, observed }) => {
                return Err(CompareError::ShortPacket {
                    port,
                    index,
                    expected,
                    observed,
                })
            }
            Err(Mismatch::Long { expected, observed }) => {
                return Err(CompareError::LongPacket {
                    port,
                    index,
                    expected,
                    observed,
                })
            }
            Err(Mismatch::At(position)) => {
                return Err(CompareError::Mismatch {
                    port,
                    index,
                    position,
                    expected: want.nibbles.clone(),
                    observed: hex(got),
                })
            }
        }
    }
    Ok(())
}

/// Compare the captures in `dir` for every port in `ports` against the
/// expectations, consuming them. Observed packets are optionally written to
/// `observations` as `<port> <HEX>` lines. Expectations left over for ports
/// that were not examined are failures.
pub fn compare_outputs(
    dir: &Path,
    ports: impl IntoIterator<Item = u32>,
    expected: &mut ExpectedOutput,
    mut observations: Option<&mut dyn Write>,
    log: &Logger,
) -> Result<(), CompareError> {
    for port in ports {
        let expectation = expected.take(port);
        // unexpected output only matters when it is being recorded
        if expectation.is_none() && observations.is_none() {
            debug!(log, "capture not checked"; "port" => port);
            continue;
        }

        let path = output_pcap(dir, port);
        let observed = read_packets(&path)?;
        debug!(log, "read capture";
            "port" => port,
            "packets" => observed.len(),
        );

        if let Some(out) = observations.as_mut() {
            for p in &observed {
                writeln!(out, "{} {}", port, hex(p))?;
            }
        }

        let Some(expectation) = expectation else {
            continue;
        };
        compare_port(port, &expectation, &observed)?;
        info!(log, "port output matches"; "port" => port);
    }

    if let Some(port) = expected.ports().next() {
        return Err(CompareError::NotReceived(port));
    }
    Ok(())
}
