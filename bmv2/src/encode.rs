// Copyright 2024 Oxide Computer Company

//! Translation of symbolic table entries into simple_switch_CLI commands.

use crate::error::{EncodeError, Error};
use crate::schema::{Action, KeyField, MatchKind, Program, Table};
use num::bigint::BigUint;
use num::One;
use slog::{warn, Logger};
use std::fmt;
use stf::ast::{ActionArg, Match, MatchValue, SetDefault, TableAdd};
use stf::number::Number;

/// How scenario priorities map onto target priorities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityTransform {
    /// `base - p`. Scenarios treat larger numbers as more important, the
    /// target treats smaller ones as more important.
    Inverted { base: u32 },

    /// Pass priorities through unchanged.
    AsIs,
}

impl Default for PriorityTransform {
    fn default() -> Self {
        Self::Inverted { base: 10000 }
    }
}

impl PriorityTransform {
    pub fn apply(&self, priority: u32) -> Result<u32, EncodeError> {
        match self {
            Self::Inverted { base } => base
                .checked_sub(priority)
                .ok_or(EncodeError::PriorityRange {
                    priority,
                    base: *base,
                }),
            Self::AsIs => Ok(priority),
        }
    }
}

/// A single encoded key field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Exact(String),
    Lpm(String, u32),
    Ternary(String, String),
    Range(String, String),
}

impl Key {
    /// The key that matches every value of the field.
    fn identity(field: &KeyField) -> Result<Self, EncodeError> {
        Ok(match field.kind {
            MatchKind::Exact | MatchKind::Valid => Key::Exact("0".into()),
            MatchKind::Lpm => Key::Lpm("0".into(), 0),
            MatchKind::Ternary => Key::Ternary("0".into(), "0".into()),
            MatchKind::Range => {
                let width = field.width.ok_or(EncodeError::UnknownWidth {
                    field: field.name.clone(),
                    kind: "range",
                })?;
                Key::Range("0".into(), format!("0x{:x}", ones(width)))
            }
        })
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Exact(v) => write!(f, "{}", v),
            Key::Lpm(v, len) => write!(f, "{}/{}", v, len),
            Key::Ternary(v, m) => write!(f, "{}&&&{}", v, m),
            Key::Range(a, z) => write!(f, "{}->{}", a, z),
        }
    }
}

fn ones(width: usize) -> BigUint {
    (BigUint::one() << width) - BigUint::one()
}

fn form(value: &MatchValue) -> &'static str {
    match value {
        MatchValue::Number(_) => "a plain number",
        MatchValue::Prefix(..) => "a prefix",
        MatchValue::Masked(..) => "a masked value",
        MatchValue::Range(..) => "a range",
    }
}

pub struct Encoder<'a> {
    pub program: &'a Program,
    pub priority: PriorityTransform,
    log: Logger,
}

impl<'a> Encoder<'a> {
    pub fn new(
        program: &'a Program,
        priority: PriorityTransform,
        log: Logger,
    ) -> Self {
        Self {
            program,
            priority,
            log,
        }
    }

    /// Build the `table_add` command for an entry.
    pub fn table_add(&self, add: &TableAdd) -> Result<String, Error> {
        let table = self.program.table(&add.table.normalized())?;
        let action = self
            .program
            .table_action(table, &add.action.name.normalized())?;
        let key = encode_match_key(table, &add.matches)?;
        let args = encode_action_args(action, &add.action.args)?;

        let priority = match (table.needs_priority(), add.priority) {
            (true, p) => Some(self.priority.apply(p.unwrap_or(0))?),
            (false, Some(p)) => {
                warn!(self.log, "ignoring priority on table without ordered keys";
                    "table" => &table.name,
                    "priority" => p,
                );
                None
            }
            (false, None) => None,
        };

        let mut parts = vec![
            "table_add".to_string(),
            table.name.clone(),
            action.name.clone(),
        ];
        push_nonempty(&mut parts, key);
        parts.push("=>".into());
        push_nonempty(&mut parts, args);
        if let Some(p) = priority {
            parts.push(p.to_string());
        }
        Ok(parts.join(" "))
    }

    /// Build the `table_set_default` command for a default action.
    pub fn set_default(&self, sd: &SetDefault) -> Result<String, Error> {
        let table = self.program.table(&sd.table.normalized())?;
        let action = self
            .program
            .table_action(table, &sd.action.name.normalized())?;
        let args = encode_action_args(action, &sd.action.args)?;

        let mut parts = vec![
            "table_set_default".to_string(),
            table.name.clone(),
            action.name.clone(),
        ];
        push_nonempty(&mut parts, args);
        Ok(parts.join(" "))
    }
}

fn push_nonempty(parts: &mut Vec<String>, s: String) {
    if !s.is_empty() {
        parts.push(s);
    }
}

/// Encode a match key in the table's key order. Fields that are not given
/// get the match-anything value for their type. The result does not depend
/// on the order of `matches`.
pub fn encode_match_key(
    table: &Table,
    matches: &[Match],
) -> Result<String, Error> {
    let mut keys: Vec<Option<Key>> = vec![None; table.key.len()];
    for m in matches {
        let i = table.resolve_field(&m.field.normalized())?;
        if keys[i].is_some() {
            return Err(EncodeError::DuplicateField(table.key[i].name.clone()).into());
        }
        keys[i] = Some(encode_field(&table.key[i], &m.value)?);
    }

    let mut encoded = Vec::new();
    for (field, key) in table.key.iter().zip(keys) {
        let key = match key {
            Some(k) => k,
            None => Key::identity(field)?,
        };
        encoded.push(key.to_string());
    }
    Ok(encoded.join(" "))
}

/// Encode one key field according to its match kind.
pub fn encode_field(
    field: &KeyField,
    value: &MatchValue,
) -> Result<Key, EncodeError> {
    let unsupported = || EncodeError::UnsupportedForm {
        field: field.name.clone(),
        form: form(value),
        kind: field.kind.as_str(),
    };

    match field.kind {
        MatchKind::Exact => match value {
            MatchValue::Number(n) => {
                concrete(field, n)?;
                Ok(Key::Exact(n.to_string()))
            }
            _ => Err(unsupported()),
        },

        MatchKind::Valid => match value {
            MatchValue::Number(n) => {
                concrete(field, n)?;
                if n.value() > BigUint::one() {
                    return Err(EncodeError::InvalidValid {
                        field: field.name.clone(),
                        value: n.to_string(),
                    });
                }
                Ok(Key::Exact(n.to_string()))
            }
            _ => Err(unsupported()),
        },

        MatchKind::Lpm => match value {
            MatchValue::Prefix(n, len) => {
                fits(field, n)?;
                if let Some(width) = field.width {
                    if *len as usize > width {
                        return Err(EncodeError::PrefixTooLong {
                            field: field.name.clone(),
                            len: *len,
                            width,
                        });
                    }
                }
                Ok(Key::Lpm(n.zeroed(), *len))
            }
            MatchValue::Number(n) => {
                fits(field, n)?;
                let len = match n.significant_bits() {
                    Some(bits) => bits,
                    // a decimal literal is a full length match
                    None => field.width.ok_or(EncodeError::UnknownWidth {
                        field: field.name.clone(),
                        kind: "decimal lpm",
                    })?,
                };
                Ok(Key::Lpm(n.zeroed(), len as u32))
            }
            _ => Err(unsupported()),
        },

        MatchKind::Ternary => match value {
            MatchValue::Number(n) => {
                fits(field, n)?;
                // decimal digits have no bit width to derive a mask from
                let mask =
                    n.mask_text().ok_or_else(|| EncodeError::DecimalTernary {
                        field: field.name.clone(),
                        value: n.to_string(),
                    })?;
                Ok(Key::Ternary(n.zeroed(), mask))
            }
            MatchValue::Masked(v, m) => {
                fits(field, v)?;
                concrete(field, m)?;
                Ok(Key::Ternary(v.zeroed(), m.to_string()))
            }
            _ => Err(unsupported()),
        },

        MatchKind::Range => match value {
            MatchValue::Range(a, z) => {
                concrete(field, a)?;
                concrete(field, z)?;
                fits(field, a)?;
                fits(field, z)?;
                Ok(Key::Range(a.to_string(), z.to_string()))
            }
            MatchValue::Number(n) => {
                concrete(field, n)?;
                fits(field, n)?;
                Ok(Key::Range(n.to_string(), n.to_string()))
            }
            _ => Err(unsupported()),
        },
    }
}

fn concrete(field: &KeyField, n: &Number) -> Result<(), EncodeError> {
    if n.has_wildcards() {
        return Err(EncodeError::Wildcard {
            field: field.name.clone(),
            value: n.to_string(),
        });
    }
    fits(field, n)
}

fn fits(field: &KeyField, n: &Number) -> Result<(), EncodeError> {
    match field.width {
        Some(width) if n.value().bits() > width as u64 => {
            Err(EncodeError::TooWide {
                field: field.name.clone(),
                value: n.to_string(),
                width,
            })
        }
        _ => Ok(()),
    }
}

/// Encode action arguments in parameter declaration order. Every parameter
/// must be given exactly once.
pub fn encode_action_args(
    action: &Action,
    args: &[ActionArg],
) -> Result<String, Error> {
    let mut values: Vec<Option<&Number>> = vec![None; action.params.len()];
    for arg in args {
        let i = action.resolve_param(&arg.name)?;
        let param = &action.params[i];
        if values[i].is_some() {
            return Err(EncodeError::DuplicateArgument {
                action: action.name.clone(),
                param: param.name.clone(),
            }
            .into());
        }
        let field = KeyField {
            name: format!("{}.{}", action.name, param.name),
            kind: MatchKind::Exact,
            width: Some(param.width),
        };
        concrete(&field, &arg.value)?;
        values[i] = Some(&arg.value);
    }

    let mut encoded = Vec::new();
    for (param, value) in action.params.iter().zip(values) {
        let value = value.ok_or_else(|| EncodeError::MissingArgument {
            action: action.name.clone(),
            param: param.name.clone(),
        })?;
        encoded.push(value.to_string());
    }
    Ok(encoded.join(" "))
}
