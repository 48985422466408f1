// Copyright 2024 Oxide Computer Company

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("malformed program description: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown {kind} '{name}'")]
    Unknown { kind: &'static str, name: String },

    #[error("ambiguous {kind} '{name}' matches {}", candidates.join(", "))]
    Ambiguous {
        kind: &'static str,
        name: String,
        candidates: Vec<String>,
    },

    #[error("table {table}: unsupported match type '{match_type}'")]
    UnsupportedMatchType { table: String, match_type: String },

    #[error("table {table}: key entry {index} has neither name nor target")]
    UnnamedKey { table: String, index: usize },

    #[error("table {0}: actions and action_ids differ in length")]
    ActionIds(String),

    #[error("action id {id} used by table {table} is not defined")]
    UndefinedActionId { table: String, id: u32 },
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("{field}: decimal literal {value} cannot be used as a ternary key without a known width")]
    DecimalTernary { field: String, value: String },

    #[error("{field}: wildcard literal {value} is not allowed here")]
    Wildcard { field: String, value: String },

    #[error("{field}: valid match must be 0 or 1, found {value}")]
    InvalidValid { field: String, value: String },

    #[error("{field}: {form} is not accepted for a {kind} key")]
    UnsupportedForm {
        field: String,
        form: &'static str,
        kind: &'static str,
    },

    #[error("{field}: a {kind} key needs a known bit width")]
    UnknownWidth { field: String, kind: &'static str },

    #[error("{field}: {value} does not fit in {width} bits")]
    TooWide {
        field: String,
        value: String,
        width: usize,
    },

    #[error("{field}: prefix length {len} exceeds field width {width}")]
    PrefixTooLong { field: String, len: u32, width: usize },

    #[error("key field {0} given more than once")]
    DuplicateField(String),

    #[error("action {action}: argument {param} given more than once")]
    DuplicateArgument { action: String, param: String },

    #[error("action {action}: missing argument {param}")]
    MissingArgument { action: String, param: String },

    #[error("priority {priority} exceeds priority base {base}")]
    PriorityRange { priority: u32, base: u32 },
}

#[derive(Error, Debug)]
pub enum CompareError {
    #[error("port {port}: expected {expected} packets, received {observed}")]
    CountMismatch {
        port: u32,
        expected: usize,
        observed: usize,
    },

    #[error("port {port} packet {index}: received packet is shorter than expected ({observed} < {expected} nibbles)")]
    ShortPacket {
        port: u32,
        index: usize,
        expected: usize,
        observed: usize,
    },

    #[error("port {port} packet {index}: received packet is longer than expected ({observed} > {expected} nibbles)")]
    LongPacket {
        port: u32,
        index: usize,
        expected: usize,
        observed: usize,
    },

    #[error("port {port} packet {index}: mismatch at nibble {position}\n  expected {expected}\n  received {observed}")]
    Mismatch {
        port: u32,
        index: usize,
        position: usize,
        expected: String,
        observed: String,
    },

    #[error("port {0}: both any packet and explicit packets expected")]
    AnyWithPackets(u32),

    #[error("expected packets on port {0} not received")]
    NotReceived(u32),

    #[error("{}: corrupt pcap: {message}", path.display())]
    Pcap { path: PathBuf, message: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum SwitchError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("switch exited before it was ready ({0})")]
    EarlyExit(String),

    #[error("switch control port {0} not ready after {1:?}")]
    NotReady(u16, std::time::Duration),

    #[error("timed out opening {}", .0.display())]
    FifoTimeout(PathBuf),

    #[error("switch exited with {0}")]
    BadExit(String),

    #[error("no free lease in {}", .0.display())]
    NoLease(PathBuf),

    #[error("system call failed: {0}")]
    Errno(#[from] nix::errno::Errno),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum CounterError {
    #[error("no response for counter read of {0}")]
    Missing(String),

    #[error("counter {counter}: {condition} does not hold (packets={packets}, bytes={bytes})")]
    Failed {
        counter: String,
        condition: String,
        packets: u64,
        bytes: u64,
    },

    #[error("counter {counter}: unreadable {unit} value {value}")]
    Malformed {
        counter: String,
        unit: &'static str,
        value: String,
    },

    #[error("counter response pattern: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("schema: {0}")]
    Schema(#[from] SchemaError),

    #[error("encode: {0}")]
    Encode(#[from] EncodeError),

    #[error("compare: {0}")]
    Compare(#[from] CompareError),

    #[error("switch: {0}")]
    Switch(#[from] SwitchError),

    #[error("counter: {0}")]
    Counter(#[from] CounterError),

    #[error("{0} parse errors")]
    Parse(usize),

    #[error("line {line}: {source}")]
    Statement { line: usize, source: Box<Error> },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
