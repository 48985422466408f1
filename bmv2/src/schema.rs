// Copyright 2024 Oxide Computer Company

//! Table and action catalogs loaded from a compiled BMv2 program
//! description.

use crate::error::SchemaError;
use serde::Deserialize;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Lpm,
    Ternary,
    Range,
    Valid,
}

impl MatchKind {
    fn from_json(table: &str, s: &str) -> Result<Self, SchemaError> {
        match s {
            "exact" => Ok(Self::Exact),
            "lpm" => Ok(Self::Lpm),
            "ternary" => Ok(Self::Ternary),
            "range" => Ok(Self::Range),
            "valid" => Ok(Self::Valid),
            _ => Err(SchemaError::UnsupportedMatchType {
                table: table.into(),
                match_type: s.into(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Lpm => "lpm",
            Self::Ternary => "ternary",
            Self::Range => "range",
            Self::Valid => "valid",
        }
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyField {
    pub name: String,
    pub kind: MatchKind,
    pub width: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub match_kind: MatchKind,
    pub key: Vec<KeyField>,

    /// Action name to action id, for the actions this table may invoke.
    pub actions: BTreeMap<String, u32>,
}

impl Table {
    /// Entries in tables with ternary or range matching are ordered by an
    /// explicit priority.
    pub fn needs_priority(&self) -> bool {
        let ordered = |k: MatchKind| matches!(k, MatchKind::Ternary | MatchKind::Range);
        ordered(self.match_kind) || self.key.iter().any(|k| ordered(k.kind))
    }

    /// Resolve a user supplied key field name to its index in the key.
    pub fn resolve_field(&self, name: &str) -> Result<usize, SchemaError> {
        resolve(
            "key field",
            name,
            self.key.iter().map(|k| k.name.as_str()),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub width: usize,
}

#[derive(Debug, Clone)]
pub struct Action {
    pub id: u32,
    pub name: String,
    pub params: Vec<Param>,
}

impl Action {
    pub fn resolve_param(&self, name: &str) -> Result<usize, SchemaError> {
        resolve(
            "action parameter",
            name,
            self.params.iter().map(|p| p.name.as_str()),
        )
    }
}

/// The catalogs for one program. Immutable once loaded apart from the name
/// resolution cache.
#[derive(Debug, Default)]
pub struct Program {
    pub tables: Vec<Table>,
    pub actions: BTreeMap<u32, Action>,
    pub counters: Vec<String>,
    resolved: RefCell<HashMap<String, usize>>,
}

impl Program {
    pub fn from_json(text: &str) -> Result<Self, SchemaError> {
        let json: JsonProgram = serde_json::from_str(text)?;
        Self::from_document(json)
    }

    fn from_document(json: JsonProgram) -> Result<Self, SchemaError> {
        let widths = FieldWidths::new(&json);

        let mut actions = BTreeMap::new();
        for a in json.actions {
            actions.insert(
                a.id,
                Action {
                    id: a.id,
                    name: a.name,
                    params: a
                        .runtime_data
                        .into_iter()
                        .map(|p| Param {
                            name: p.name,
                            width: p.bitwidth,
                        })
                        .collect(),
                },
            );
        }

        let mut tables = Vec::new();
        for pipeline in json.pipelines {
            for t in pipeline.tables {
                let match_kind = MatchKind::from_json(&t.name, &t.match_type)?;
                let mut key = Vec::new();
                for (index, k) in t.key.iter().enumerate() {
                    let name = k.field_name().ok_or_else(|| {
                        SchemaError::UnnamedKey {
                            table: t.name.clone(),
                            index,
                        }
                    })?;
                    let kind = MatchKind::from_json(&t.name, &k.match_type)?;
                    let width = match kind {
                        MatchKind::Valid => Some(1),
                        _ => k.bitwidth.or_else(|| widths.lookup(&k.target)),
                    };
                    key.push(KeyField { name, kind, width });
                }

                if t.actions.len() != t.action_ids.len() {
                    return Err(SchemaError::ActionIds(t.name));
                }
                let mut table_actions = BTreeMap::new();
                for (name, id) in t.actions.into_iter().zip(t.action_ids) {
                    if !actions.contains_key(&id) {
                        return Err(SchemaError::UndefinedActionId {
                            table: t.name,
                            id,
                        });
                    }
                    table_actions.insert(name, id);
                }

                tables.push(Table {
                    name: t.name,
                    match_kind,
                    key,
                    actions: table_actions,
                });
            }
        }

        Ok(Self {
            tables,
            actions,
            counters: json.counter_arrays.into_iter().map(|c| c.name).collect(),
            resolved: RefCell::new(HashMap::new()),
        })
    }

    pub fn table(&self, name: &str) -> Result<&Table, SchemaError> {
        if let Some(&i) = self.resolved.borrow().get(name) {
            return Ok(&self.tables[i]);
        }
        let i = resolve("table", name, self.tables.iter().map(|t| t.name.as_str()))?;
        self.resolved.borrow_mut().insert(name.into(), i);
        Ok(&self.tables[i])
    }

    /// Resolve a counter array name. Programs that declare no counters get
    /// the name passed through as written.
    pub fn counter(&self, name: &str) -> Result<String, SchemaError> {
        if self.counters.is_empty() {
            return Ok(name.into());
        }
        let i = resolve("counter", name, self.counters.iter().map(|c| c.as_str()))?;
        Ok(self.counters[i].clone())
    }

    /// Resolve an action name among the actions a table may invoke.
    pub fn table_action(
        &self,
        table: &Table,
        name: &str,
    ) -> Result<&Action, SchemaError> {
        let names: Vec<&String> = table.actions.keys().collect();
        let i = resolve("action", name, names.iter().map(|s| s.as_str()))?;
        let id = table.actions[names[i]];
        self.actions.get(&id).ok_or_else(|| SchemaError::UndefinedActionId {
            table: table.name.clone(),
            id,
        })
    }
}

/// The spellings a user supplied name may take in the program description.
/// Subscripts may appear as `[i]` or `$i`, validity as `valid` or
/// `$valid$`, and some fields carry a trailing `$`.
pub fn spellings(name: &str) -> Vec<String> {
    let mut result = vec![name.to_string()];
    let mut push = |s: String| {
        if !result.contains(&s) {
            result.push(s);
        }
    };

    let dollar = subscripts_to_dollar(name);
    push(dollar.clone());
    push(dollar_to_subscripts(name));

    for base in [name.to_string(), dollar] {
        if let Some(prefix) = base.strip_suffix(".valid") {
            push(format!("{}.$valid$", prefix));
        } else if base == "valid" {
            push("$valid$".into());
        }
        if !base.ends_with('$') {
            push(format!("{}$", base));
        }
    }
    result
}

fn subscripts_to_dollar(name: &str) -> String {
    name.replace('[', "$").replace(']', "")
}

fn dollar_to_subscripts(name: &str) -> String {
    name.split('.')
        .map(|seg| match seg.rsplit_once('$') {
            Some((head, idx))
                if !head.is_empty()
                    && !idx.is_empty()
                    && idx.chars().all(|c| c.is_ascii_digit()) =>
            {
                format!("{}[{}]", head, idx)
            }
            _ => seg.to_string(),
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Two pass name resolution: an exact match on any spelling wins, otherwise
/// the name must be a unique suffix (on a `.` boundary) of one candidate.
pub fn resolve<'a>(
    kind: &'static str,
    name: &str,
    candidates: impl Iterator<Item = &'a str>,
) -> Result<usize, SchemaError> {
    let candidates: Vec<&str> = candidates.collect();
    let wanted = spellings(name);

    let exact: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| wanted.iter().any(|w| w == *c))
        .map(|(i, _)| i)
        .collect();
    if let Some(&i) = exact.first() {
        if exact.len() == 1 {
            return Ok(i);
        }
    }

    let suffix: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| {
            wanted.iter().any(|w| {
                c.strip_suffix(w.as_str())
                    .map(|head| head.ends_with('.'))
                    .unwrap_or(false)
            })
        })
        .map(|(i, _)| i)
        .collect();

    let found = if exact.is_empty() { suffix } else { exact };
    match found.as_slice() {
        [] => Err(SchemaError::Unknown {
            kind,
            name: name.into(),
        }),
        [i] => Ok(*i),
        many => Err(SchemaError::Ambiguous {
            kind,
            name: name.into(),
            candidates: many.iter().map(|i| candidates[*i].to_string()).collect(),
        }),
    }
}

/// Field widths from `headers` and `header_types`, keyed by header instance
/// and field name.
struct FieldWidths {
    widths: HashMap<(String, String), usize>,
}

impl FieldWidths {
    fn new(json: &JsonProgram) -> Self {
        let mut types: HashMap<&str, &JsonHeaderType> = HashMap::new();
        for t in &json.header_types {
            types.insert(t.name.as_str(), t);
        }
        let mut widths = HashMap::new();
        for h in &json.headers {
            let Some(t) = types.get(h.header_type.as_str()) else {
                continue;
            };
            for f in &t.fields {
                let (Some(name), Some(width)) = (
                    f.first().and_then(|v| v.as_str()),
                    f.get(1).and_then(|v| v.as_u64()),
                ) else {
                    continue;
                };
                widths.insert((h.name.clone(), name.to_string()), width as usize);
            }
        }
        Self { widths }
    }

    fn lookup(&self, target: &Option<serde_json::Value>) -> Option<usize> {
        let t = target.as_ref()?.as_array()?;
        let header = t.first()?.as_str()?;
        let field = t.get(1)?.as_str()?;
        if field == "$valid$" {
            return Some(1);
        }
        self.widths
            .get(&(header.to_string(), field.to_string()))
            .copied()
    }
}

#[derive(Debug, Deserialize)]
struct JsonProgram {
    #[serde(default)]
    header_types: Vec<JsonHeaderType>,
    #[serde(default)]
    headers: Vec<JsonHeader>,
    #[serde(default)]
    actions: Vec<JsonAction>,
    #[serde(default)]
    pipelines: Vec<JsonPipeline>,
    #[serde(default)]
    counter_arrays: Vec<JsonCounter>,
}

#[derive(Debug, Deserialize)]
struct JsonCounter {
    name: String,
}

#[derive(Debug, Deserialize)]
struct JsonHeaderType {
    name: String,
    #[serde(default)]
    fields: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct JsonHeader {
    name: String,
    header_type: String,
}

#[derive(Debug, Deserialize)]
struct JsonAction {
    id: u32,
    name: String,
    #[serde(default)]
    runtime_data: Vec<JsonParam>,
}

#[derive(Debug, Deserialize)]
struct JsonParam {
    name: String,
    bitwidth: usize,
}

#[derive(Debug, Deserialize)]
struct JsonPipeline {
    #[serde(default)]
    tables: Vec<JsonTable>,
}

#[derive(Debug, Deserialize)]
struct JsonTable {
    name: String,
    #[serde(default = "default_match_type")]
    match_type: String,
    #[serde(default)]
    key: Vec<JsonKey>,
    #[serde(default)]
    actions: Vec<String>,
    #[serde(default)]
    action_ids: Vec<u32>,
}

fn default_match_type() -> String {
    "exact".into()
}

#[derive(Debug, Deserialize)]
struct JsonKey {
    match_type: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    target: Option<serde_json::Value>,
    #[serde(default)]
    bitwidth: Option<usize>,
}

impl JsonKey {
    fn field_name(&self) -> Option<String> {
        if let Some(name) = &self.name {
            return Some(name.clone());
        }
        match self.target.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Array(parts) => {
                let parts: Option<Vec<&str>> =
                    parts.iter().map(|p| p.as_str()).collect();
                Some(parts?.join("."))
            }
            _ => None,
        }
    }
}
