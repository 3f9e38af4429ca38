use crate::compute::{Key, Ledger, Value};
use crate::period::Period;
use crate::store::{Registry, VariableId};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write;

/// How a cached value came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Origin {
    Input,
    /// Derived from the same variable at its native period.
    Converted { from: Period },
    Formula { effective_from: Option<NaiveDate> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraceEntry {
    pub origin: Origin,
    /// Keys read while producing the value, in read order.
    pub dependencies: Vec<Key>,
}

/// Records the provenance of every value an evaluation context caches.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    entries: HashMap<Key, TraceEntry>,
}

impl Trace {
    pub fn record(&mut self, key: Key, origin: Origin, dependencies: Vec<Key>) {
        self.entries.insert(key, TraceEntry { origin, dependencies });
    }

    pub fn get(&self, key: &Key) -> Option<&TraceEntry> { self.entries.get(key) }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

/// Renders the audit tree below `target`.
pub fn format_trace(registry: &Registry, ledger: &Ledger, trace: &Trace, target: Key) -> String {
    let mut tracer = Tracer { registry, ledger, trace, visited_at_level: HashMap::new(), output: String::new() };

    let (id, period) = target;
    if let Some(variable) = registry.try_get(id) {
        let _ = writeln!(tracer.output, "AUDIT TRACE for '{}' at {}:", variable.name, period);
        let _ = writeln!(tracer.output, "--------------------------------------------------");
        tracer.trace_key(target, 1, "");
    } else {
        let _ = writeln!(tracer.output, "Error: Invalid variable id {:?}", id);
    }
    tracer.output
}

struct Tracer<'a> {
    registry: &'a Registry,
    ledger: &'a Ledger,
    trace: &'a Trace,
    visited_at_level: HashMap<Key, usize>,
    output: String,
}

impl<'a> Tracer<'a> {
    fn trace_key(&mut self, key: Key, level: usize, prefix: &str) {
        if let Some(&first_seen) = self.visited_at_level.get(&key) {
            let _ = writeln!(self.output, "{}-> (Ref to L{})", prefix, first_seen);
            return;
        }
        self.visited_at_level.insert(key, level);

        let name = variable_name(self.registry, key.0);
        let line_header = format!("[L{}] {}<{}> {}", level, name, key.1, self.format_value(&key));

        let trace = self.trace;
        let Some(entry) = trace.get(&key) else {
            let _ = writeln!(self.output, "{}{}", prefix, line_header);
            return;
        };
        let origin = match entry.origin {
            Origin::Input => "input".to_string(),
            Origin::Converted { from } => format!("converted from {}", from),
            Origin::Formula { effective_from: Some(date) } => format!("formula since {}", date),
            Origin::Formula { effective_from: None } => "formula".to_string(),
        };
        let _ = writeln!(self.output, "{}{} = {}", prefix, line_header, origin);

        let stem = build_child_stem(prefix);
        let children = &entry.dependencies;
        for (i, &child) in children.iter().enumerate() {
            let connector = if i == children.len() - 1 { "`--" } else { "|--" };
            self.trace_key(child, level + 1, &format!("{}{}", stem, connector));
        }
    }

    fn format_value(&self, key: &Key) -> String {
        match self.ledger.get(key) {
            Some(value) => format_value(value),
            None => "[?]".to_string(),
        }
    }
}

fn format_value(value: &Value) -> String {
    const SHOWN: usize = 3;
    let items: Vec<String> = match value {
        Value::Bool(v) => v.iter().take(SHOWN).map(|b| b.to_string()).collect(),
        Value::Number(v) => v.iter().take(SHOWN).map(|n| format!("{:.3}", n)).collect(),
        Value::Date(v) => v.iter().take(SHOWN).map(|d| d.to_string()).collect(),
    };
    let more = if value.len() > SHOWN { ", ..." } else { "" };
    format!("[{}{}]", items.join(", "), more)
}

fn variable_name(registry: &Registry, id: VariableId) -> &str {
    registry.try_get(id).map_or("<unknown>", |variable| variable.name.as_str())
}

fn build_child_stem(current_prefix: &str) -> String {
    current_prefix.replace("`--", "   ").replace("|--", "|  ")
}

#[derive(Serialize)]
struct KeyRecord<'a> {
    variable: &'a str,
    period: Period,
}

#[derive(Serialize)]
struct EntryRecord<'a> {
    variable: &'a str,
    period: Period,
    origin: Origin,
    value: Option<serde_json::Value>,
    dependencies: Vec<KeyRecord<'a>>,
}

/// Flat JSON export of every recorded entry, ordered by variable name then period.
pub fn trace_to_json(registry: &Registry, ledger: &Ledger, trace: &Trace) -> serde_json::Value {
    let key_record = |(id, period): Key| KeyRecord { variable: variable_name(registry, id), period };
    let mut records: Vec<EntryRecord<'_>> = trace
        .entries
        .iter()
        .map(|(&key, entry)| EntryRecord {
            variable: variable_name(registry, key.0),
            period: key.1,
            origin: entry.origin,
            value: ledger.get(&key).map(Value::to_json),
            dependencies: entry.dependencies.iter().copied().map(key_record).collect(),
        })
        .collect();
    records.sort_by(|a, b| (a.variable, a.period.to_string()).cmp(&(b.variable, b.period.to_string())));
    serde_json::json!(records)
}
