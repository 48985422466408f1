// Copyright 2024 Oxide Computer Company

//! Walks a scenario, driving the control CLI and the packet inputs and
//! recording what output is expected.

use crate::encode::Encoder;
use crate::error::{CounterError, Error};
use crate::expect::ExpectedOutput;
use crate::pcap::PcapWriter;
use regex::Regex;
use slog::{debug, info, warn, Logger};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use std::time::Duration;
use stf::ast::{CounterCondition, Directive, Scenario, Statement};

/// Receives control commands, one per line.
pub trait CommandSink {
    fn send(&mut self, command: &str) -> io::Result<()>;
}

/// Receives packets to inject on a port.
pub trait PacketSink {
    fn inject(&mut self, port: u32, data: &[u8]) -> io::Result<()>;
}

/// A line oriented command channel, typically the CLI's stdin.
pub struct CliChannel<W: Write> {
    out: W,
}

impl<W: Write> CliChannel<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> CommandSink for CliChannel<W> {
    fn send(&mut self, command: &str) -> io::Result<()> {
        writeln!(self.out, "{}", command)?;
        self.out.flush()
    }
}

/// Collects commands in memory.
impl CommandSink for Vec<String> {
    fn send(&mut self, command: &str) -> io::Result<()> {
        self.push(command.into());
        Ok(())
    }
}

/// Per port pcap streams, usually backed by the switch's input FIFOs.
pub struct PortWriters<W: Write> {
    writers: BTreeMap<u32, PcapWriter<W>>,
}

impl<W: Write> PortWriters<W> {
    pub fn new() -> Self {
        Self {
            writers: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, port: u32, writer: PcapWriter<W>) {
        self.writers.insert(port, writer);
    }
}

impl<W: Write> Default for PortWriters<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> PacketSink for PortWriters<W> {
    fn inject(&mut self, port: u32, data: &[u8]) -> io::Result<()> {
        match self.writers.get_mut(&port) {
            Some(w) => w.write_packet(data),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no input for port {}", port),
            )),
        }
    }
}

/// Records injected packets in memory.
impl PacketSink for Vec<(u32, Vec<u8>)> {
    fn inject(&mut self, port: u32, data: &[u8]) -> io::Result<()> {
        self.push((port, data.to_vec()));
        Ok(())
    }
}

/// Delays used while driving a switch.
#[derive(Debug, Clone)]
pub struct Timing {
    /// Pause before the first packet after a control command.
    pub packet_delay: Duration,

    /// Pause for a `wait` statement.
    pub wait: Duration,

    /// Time given to the switch to drain after input ends.
    pub settle: Duration,

    pub ready_timeout: Duration,
    pub ready_poll: Duration,
    pub fifo_timeout: Duration,
    pub exit_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            packet_delay: Duration::from_secs(1),
            wait: Duration::from_millis(500),
            settle: Duration::from_secs(2),
            ready_timeout: Duration::from_secs(60),
            ready_poll: Duration::from_millis(500),
            fifo_timeout: Duration::from_secs(2),
            exit_timeout: Duration::from_secs(10),
        }
    }
}

impl Timing {
    /// No delays at all, for driving in-memory sinks.
    pub fn immediate() -> Self {
        Self {
            packet_delay: Duration::ZERO,
            wait: Duration::ZERO,
            settle: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// A `counter_read` sent to the CLI, with the assertion to evaluate
/// against its response, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterRead {
    pub counter: String,
    pub index: String,
    pub check: Option<CounterCondition>,
}

/// What the executor did.
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub commands: Vec<String>,
    pub packets: usize,

    /// Named entries installed, as `(id, table)`.
    pub entries: Vec<(String, String)>,

    /// Every counter read in the order it was sent.
    pub counter_reads: Vec<CounterRead>,
}

/// Ports a scenario injects on or expects output from.
pub fn interfaces(scenario: &Scenario) -> BTreeSet<u32> {
    scenario
        .statements()
        .filter_map(|s| match s {
            Statement::Packet(port, _) | Statement::Expect(port, _) => {
                Some(*port)
            }
            _ => None,
        })
        .collect()
}

pub struct Executor<'a, C: CommandSink, P: PacketSink> {
    encoder: Encoder<'a>,
    commands: C,
    packets: P,
    timing: Timing,
    expected: ExpectedOutput,
    delay: Duration,
    report: Report,
    log: Logger,
}

impl<'a, C: CommandSink, P: PacketSink> Executor<'a, C, P> {
    pub fn new(
        encoder: Encoder<'a>,
        commands: C,
        packets: P,
        timing: Timing,
        log: Logger,
    ) -> Self {
        Self {
            encoder,
            commands,
            packets,
            timing,
            expected: ExpectedOutput::default(),
            delay: Duration::ZERO,
            report: Report::default(),
            log,
        }
    }

    /// Execute every statement in order. The first failure stops the walk.
    pub fn run(&mut self, scenario: &Scenario) -> Result<(), Error> {
        for s in &scenario.statements {
            self.step(&s.item).map_err(|e| Error::Statement {
                line: s.token.line + 1,
                source: Box::new(e),
            })?;
        }
        Ok(())
    }

    pub fn step(&mut self, statement: &Statement) -> Result<(), Error> {
        match statement {
            Statement::Add(add) => {
                let command = self.encoder.table_add(add)?;
                self.command(command)?;
                if let Some(id) = &add.id {
                    self.report
                        .entries
                        .push((id.clone(), add.table.normalized()));
                }
            }
            Statement::SetDefault(sd) => {
                let command = self.encoder.set_default(sd)?;
                self.command(command)?;
            }
            Statement::RemoveAll => {
                let tables: Vec<String> = self
                    .encoder
                    .program
                    .tables
                    .iter()
                    .map(|t| t.name.clone())
                    .collect();
                for t in tables {
                    self.command(format!("table_clear {}", t))?;
                }
            }
            Statement::Expect(port, None) => self.expected.expect_any(*port),
            Statement::Expect(port, Some(data)) => {
                self.expected.expect_packet(*port, data.clone())
            }
            Statement::NoPacket => {
                debug!(self.log, "no_packet asserts nothing");
            }
            Statement::Packet(port, data) => {
                let bytes = data.to_bytes().map_err(|e| {
                    io::Error::new(io::ErrorKind::InvalidData, e)
                })?;
                if !self.delay.is_zero() {
                    std::thread::sleep(self.delay);
                    self.delay = Duration::ZERO;
                }
                debug!(self.log, "inject";
                    "port" => port,
                    "len" => bytes.len(),
                );
                self.packets.inject(*port, &bytes)?;
                self.report.packets += 1;
            }
            Statement::Wait => {
                debug!(self.log, "wait"; "ms" => self.timing.wait.as_millis() as u64);
                std::thread::sleep(self.timing.wait);
            }
            Statement::CheckCounter(check) => {
                let counter =
                    self.encoder.program.counter(&check.counter.normalized())?;
                let index = check.index.to_string();
                self.command(format!("counter_read {} {}", counter, index))?;
                self.report.counter_reads.push(CounterRead {
                    counter,
                    index,
                    check: Some(check.condition.clone().unwrap_or_default()),
                });
            }
            Statement::Direct(directive, args) => {
                let command = match args.is_empty() {
                    true => directive.verb().to_string(),
                    false => format!("{} {}", directive.verb(), args),
                };
                self.command(command)?;
                if *directive == Directive::CounterRead {
                    let mut parts = args.split_whitespace();
                    self.report.counter_reads.push(CounterRead {
                        counter: parts.next().unwrap_or_default().into(),
                        index: parts.next().unwrap_or_default().into(),
                        check: None,
                    });
                }
            }
        }
        Ok(())
    }

    fn command(&mut self, command: String) -> Result<(), Error> {
        debug!(self.log, "cli"; "command" => &command);
        self.commands.send(&command)?;
        self.report.commands.push(command);
        // give the switch time to apply configuration before more packets
        self.delay = self.timing.packet_delay;
        Ok(())
    }

    pub fn expected(&self) -> &ExpectedOutput {
        &self.expected
    }

    pub fn report(&self) -> &Report {
        &self.report
    }

    /// Tear the executor apart, closing nothing; dropping the sinks is
    /// left to the caller.
    pub fn finish(self) -> (ExpectedOutput, Report, C, P) {
        info!(self.log, "scenario executed";
            "commands" => self.report.commands.len(),
            "packets" => self.report.packets,
        );
        (self.expected, self.report, self.commands, self.packets)
    }
}

/// Evaluate counter assertions against a CLI transcript. Responses are
/// paired with reads in the order the reads were sent.
pub fn check_counters(
    transcript: &str,
    reads: &[CounterRead],
    log: &Logger,
) -> Result<(), CounterError> {
    let re = Regex::new(r"BmCounterValue\(packets=(\d+),\s*bytes=(\d+)\)")?;
    let mut responses = re
        .captures_iter(transcript)
        .map(|c| (c[1].to_string(), c[2].to_string()));

    for read in reads {
        let name = format!("{}({})", read.counter, read.index);
        let response = responses.next();
        let Some(check) = &read.check else {
            continue;
        };
        let Some((packets, bytes)) = response else {
            return Err(CounterError::Missing(name));
        };
        let value = |unit: &'static str, text: String| {
            text.parse::<u64>().map_err(|_| CounterError::Malformed {
                counter: name.clone(),
                unit,
                value: text,
            })
        };
        let packets = value("packets", packets)?;
        let bytes = value("bytes", bytes)?;
        if !check.holds(packets, bytes) {
            return Err(CounterError::Failed {
                counter: name,
                condition: format!(
                    "{} {} {}",
                    check.unit, check.comparison, check.value
                ),
                packets,
                bytes,
            });
        }
        info!(log, "counter check passed";
            "counter" => &name,
            "packets" => packets,
            "bytes" => bytes,
        );
    }
    if responses.next().is_some() {
        warn!(log, "more counter responses than counter reads");
    }
    Ok(())
}
