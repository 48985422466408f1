// Copyright 2024 Oxide Computer Company

use crate::error::Error;
use crate::lexer::Token;
use crate::number::Number;
use std::fmt;

/// The result of parsing a scenario. Parsing does not stop at the first
/// error, so a scenario carries both the statements that parsed cleanly and
/// the errors encountered along the way.
#[derive(Debug, Default)]
pub struct Scenario {
    pub statements: Vec<Located<Statement>>,
    pub errors: Vec<Error>,
}

impl Scenario {
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn statements(&self) -> impl Iterator<Item = &Statement> {
        self.statements.iter().map(|x| &x.item)
    }
}

/// Writes the scenario back out in canonical STF form, one statement per
/// line.
impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for s in self.statements() {
            writeln!(f, "{}", s)?;
        }
        Ok(())
    }
}

/// A language element along with the first token it was parsed from.
#[derive(Debug, Clone)]
pub struct Located<T> {
    pub item: T,
    pub token: Token,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Add(TableAdd),
    SetDefault(SetDefault),
    RemoveAll,
    /// Expect output on a port. `None` accepts any packet on that port.
    Expect(u32, Option<PacketData>),
    NoPacket,
    Packet(u32, PacketData),
    Wait,
    CheckCounter(CounterCheck),
    Direct(Directive, String),
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Add(x) => x.fmt(f),
            Statement::SetDefault(x) => {
                write!(f, "setdefault {} {}", x.table, x.action)
            }
            Statement::RemoveAll => write!(f, "remove all"),
            Statement::Expect(port, None) => write!(f, "expect {}", port),
            Statement::Expect(port, Some(data)) => {
                write!(f, "expect {} {}", port, data)
            }
            Statement::NoPacket => write!(f, "no_packet"),
            Statement::Packet(port, data) => {
                write!(f, "packet {} {}", port, data)
            }
            Statement::Wait => write!(f, "wait"),
            Statement::CheckCounter(x) => x.fmt(f),
            Statement::Direct(d, args) => {
                if args.is_empty() {
                    write!(f, "{}", d)
                } else {
                    write!(f, "{} {}", d, args)
                }
            }
        }
    }
}

/// A dotted name such as `ingress.fwd` or `hdr.vlan[1].vid`.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct QualifiedName {
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct Segment {
    pub name: String,
    pub index: Option<u64>,
}

impl QualifiedName {
    pub fn new(name: &str) -> Self {
        Self {
            segments: vec![Segment {
                name: name.into(),
                index: None,
            }],
        }
    }

    /// Normalized text form, subscripts written as `name[i]`.
    pub fn normalized(&self) -> String {
        self.to_string()
    }

    /// The last component of the name.
    pub fn leaf(&self) -> &str {
        self.segments
            .last()
            .map(|s| s.name.as_str())
            .unwrap_or_default()
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, s) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", s.name)?;
            if let Some(index) = s.index {
                write!(f, "[{}]", index)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableAdd {
    pub table: QualifiedName,
    pub priority: Option<u32>,
    pub matches: Vec<Match>,
    pub action: ActionCall,
    /// Entry id given with `= <id>`.
    pub id: Option<String>,
}

impl fmt::Display for TableAdd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "add {}", self.table)?;
        if let Some(p) = self.priority {
            write!(f, " {}", p)?;
        }
        for m in &self.matches {
            write!(f, " {}", m)?;
        }
        write!(f, " {}", self.action)?;
        if let Some(id) = &self.id {
            write!(f, " = {}", id)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetDefault {
    pub table: QualifiedName,
    pub action: ActionCall,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub field: QualifiedName,
    pub value: MatchValue,
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.field, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchValue {
    /// A plain literal, possibly with wildcard digits.
    Number(Number),

    /// `value/length`
    Prefix(Number, u32),

    /// `value&&&mask`
    Masked(Number, Number),

    /// `start..end`
    Range(Number, Number),
}

impl fmt::Display for MatchValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchValue::Number(n) => write!(f, "{}", n),
            MatchValue::Prefix(n, len) => write!(f, "{}/{}", n, len),
            MatchValue::Masked(v, m) => write!(f, "{}&&&{}", v, m),
            MatchValue::Range(a, z) => write!(f, "{}..{}", a, z),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionCall {
    pub name: QualifiedName,
    pub args: Vec<ActionArg>,
}

impl fmt::Display for ActionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| format!("{}:{}", a.name, a.value))
            .collect();
        write!(f, "{}({})", self.name, args.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionArg {
    pub name: String,
    pub value: Number,
}

/// Packet bytes as a string of upper case hex nibbles. Expected packets may
/// contain `*` nibbles that match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketData {
    pub nibbles: String,

    /// The observed packet must be exactly as long as this pattern. Written
    /// as a trailing `$`.
    pub exact: bool,
}

impl PacketData {
    /// Parse packet data text. Whitespace between nibbles is insignificant.
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut nibbles = String::new();
        let mut exact = false;
        for c in text.chars() {
            if exact && !c.is_whitespace() {
                return Err(format!("unexpected '{}' after '$'", c));
            }
            match c {
                '$' => exact = true,
                '*' => nibbles.push('*'),
                c if c.is_ascii_hexdigit() => {
                    nibbles.push(c.to_ascii_uppercase())
                }
                c if c.is_whitespace() => {}
                c => return Err(format!("invalid packet data character '{}'", c)),
            }
        }
        Ok(Self { nibbles, exact })
    }

    pub fn is_empty(&self) -> bool {
        self.nibbles.is_empty()
    }

    pub fn has_wildcards(&self) -> bool {
        self.nibbles.contains('*')
    }

    /// Convert fully specified data to bytes. Fails on wildcards or an odd
    /// number of nibbles.
    pub fn to_bytes(&self) -> Result<Vec<u8>, String> {
        if self.has_wildcards() {
            return Err("packet data may not contain wildcards".into());
        }
        if self.nibbles.len() % 2 != 0 {
            return Err(format!(
                "packet data has an odd number of nibbles ({})",
                self.nibbles.len()
            ));
        }
        (0..self.nibbles.len())
            .step_by(2)
            .map(|i| {
                u8::from_str_radix(&self.nibbles[i..i + 2], 16)
                    .map_err(|e| e.to_string())
            })
            .collect()
    }
}

impl fmt::Display for PacketData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes: Vec<&str> = self
            .nibbles
            .as_bytes()
            .chunks(2)
            .map(|c| std::str::from_utf8(c).unwrap_or_default())
            .collect();
        write!(f, "{}", bytes.join(" "))?;
        if self.exact {
            write!(f, " $")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterCheck {
    pub counter: QualifiedName,
    pub index: CounterIndex,
    pub condition: Option<CounterCondition>,
}

impl fmt::Display for CounterCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "check_counter {}({})", self.counter, self.index)?;
        if let Some(c) = &self.condition {
            write!(f, " {} {} {}", c.unit, c.comparison, c.value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterIndex {
    Number(u64),
    Name(String),
}

impl fmt::Display for CounterIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterIndex::Number(n) => write!(f, "{}", n),
            CounterIndex::Name(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterCondition {
    pub unit: CounterUnit,
    pub comparison: Comparison,
    pub value: u64,
}

impl CounterCondition {
    pub fn holds(&self, packets: u64, bytes: u64) -> bool {
        let observed = match self.unit {
            CounterUnit::Packets => packets,
            CounterUnit::Bytes => bytes,
        };
        self.comparison.eval(observed, self.value)
    }
}

/// Used when a `check_counter` statement gives no explicit condition: the
/// counter must have seen at least one packet.
impl Default for CounterCondition {
    fn default() -> Self {
        Self {
            unit: CounterUnit::Packets,
            comparison: Comparison::Gt,
            value: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterUnit {
    Packets,
    Bytes,
}

impl fmt::Display for CounterUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterUnit::Packets => write!(f, "packets"),
            CounterUnit::Bytes => write!(f, "bytes"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    pub fn eval(&self, lhs: u64, rhs: u64) -> bool {
        match self {
            Comparison::Eq => lhs == rhs,
            Comparison::Ne => lhs != rhs,
            Comparison::Lt => lhs < rhs,
            Comparison::Le => lhs <= rhs,
            Comparison::Gt => lhs > rhs,
            Comparison::Ge => lhs >= rhs,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparison::Eq => write!(f, "=="),
            Comparison::Ne => write!(f, "!="),
            Comparison::Lt => write!(f, "<"),
            Comparison::Le => write!(f, "<="),
            Comparison::Gt => write!(f, ">"),
            Comparison::Ge => write!(f, ">="),
        }
    }
}

/// Control-plane commands that are handed to the target CLI untouched.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum Directive {
    MirroringAdd,
    MirroringAddMc,
    MirroringDelete,
    MirroringGet,
    McMgrpCreate,
    McNodeCreate,
    McNodeUpdate,
    McNodeAssociate,
    CounterRead,
    CounterWrite,
    RegisterRead,
    RegisterWrite,
    RegisterReset,
    MeterGetRates,
    MeterSetRates,
    MeterArraySetRates,
}

impl Directive {
    pub const ALL: [Directive; 16] = [
        Directive::MirroringAdd,
        Directive::MirroringAddMc,
        Directive::MirroringDelete,
        Directive::MirroringGet,
        Directive::McMgrpCreate,
        Directive::McNodeCreate,
        Directive::McNodeUpdate,
        Directive::McNodeAssociate,
        Directive::CounterRead,
        Directive::CounterWrite,
        Directive::RegisterRead,
        Directive::RegisterWrite,
        Directive::RegisterReset,
        Directive::MeterGetRates,
        Directive::MeterSetRates,
        Directive::MeterArraySetRates,
    ];

    pub fn verb(&self) -> &'static str {
        match self {
            Directive::MirroringAdd => "mirroring_add",
            Directive::MirroringAddMc => "mirroring_add_mc",
            Directive::MirroringDelete => "mirroring_delete",
            Directive::MirroringGet => "mirroring_get",
            Directive::McMgrpCreate => "mc_mgrp_create",
            Directive::McNodeCreate => "mc_node_create",
            Directive::McNodeUpdate => "mc_node_update",
            Directive::McNodeAssociate => "mc_node_associate",
            Directive::CounterRead => "counter_read",
            Directive::CounterWrite => "counter_write",
            Directive::RegisterRead => "register_read",
            Directive::RegisterWrite => "register_write",
            Directive::RegisterReset => "register_reset",
            Directive::MeterGetRates => "meter_get_rates",
            Directive::MeterSetRates => "meter_set_rates",
            Directive::MeterArraySetRates => "meter_array_set_rates",
        }
    }

    pub fn from_verb(verb: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|d| d.verb() == verb)
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.verb())
    }
}
