//! Legislative constants, versioned by date and addressed by dotted path.
//!
//! A parameter file is a JSON tree whose leaves carry a dated history:
//!
//! ```json
//! { "earnings": { "CERB_minimum": { "values": { "2020-03-15": 5000 } } } }
//! ```
//!
//! The value on a date is the one from the latest entry on or before it. A
//! `null` entry marks the parameter as repealed from that date.
use crate::compute::ComputationError;
use crate::error::LoadError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Read-only source of legislative parameters, shared by every context.
pub trait Parameters: Send + Sync {
    fn lookup(&self, path: &str, date: NaiveDate) -> Result<f64, ComputationError>;
}

/// Parameters as of one date, handed to formula bodies.
#[derive(Clone, Copy)]
pub struct ParameterView<'p> {
    source: &'p dyn Parameters,
    date: NaiveDate,
}

impl<'p> ParameterView<'p> {
    pub fn new(source: &'p dyn Parameters, date: NaiveDate) -> Self {
        Self { source, date }
    }

    pub fn get(&self, path: &str) -> Result<f64, ComputationError> {
        self.source.lookup(path, self.date)
    }

    pub fn at(&self, date: NaiveDate) -> ParameterView<'p> {
        Self { source: self.source, date }
    }

    pub fn date(&self) -> NaiveDate { self.date }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterHistory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub values: BTreeMap<NaiveDate, Option<f64>>,
}

impl ParameterHistory {
    pub fn at(&self, date: NaiveDate) -> Option<f64> {
        self.values.range(..=date).next_back().and_then(|(_, value)| *value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterNode {
    Leaf(ParameterHistory),
    Branch(BTreeMap<String, ParameterNode>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterTree {
    root: BTreeMap<String, ParameterNode>,
}

impl ParameterTree {
    pub fn new() -> Self { Self::default() }

    pub fn from_json_str(json: &str) -> Result<Self, LoadError> {
        let tree: Self = serde_json::from_str(json)?;
        tree.validate()?;
        Ok(tree)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| LoadError::Io { path: path.to_path_buf(), source })?;
        let tree = Self::from_json_str(&json)?;
        debug!(path = %path.display(), leaves = tree.leaf_count(), "parameters loaded");
        Ok(tree)
    }

    /// Sets the value of `path` from `date` onwards, creating branches as needed.
    pub fn set(&mut self, path: &str, date: NaiveDate, value: Option<f64>) -> Result<(), LoadError> {
        let mut segments = path.split('.').peekable();
        let mut level = &mut self.root;
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                let node = level.entry(segment.to_string()).or_insert_with(|| {
                    ParameterNode::Leaf(ParameterHistory { description: None, values: BTreeMap::new() })
                });
                let ParameterNode::Leaf(history) = node else {
                    return Err(LoadError::Invalid(format!("'{}' is a branch, not a parameter", path)));
                };
                history.values.insert(date, value);
                return Ok(());
            }
            let node = level
                .entry(segment.to_string())
                .or_insert_with(|| ParameterNode::Branch(BTreeMap::new()));
            level = match node {
                ParameterNode::Branch(children) => children,
                ParameterNode::Leaf(_) => {
                    return Err(LoadError::Invalid(format!("'{}' passes through parameter '{}'", path, segment)));
                }
            };
        }
        Err(LoadError::Invalid("empty parameter path".into()))
    }

    pub fn with(mut self, path: &str, date: NaiveDate, value: f64) -> Result<Self, LoadError> {
        self.set(path, date, Some(value))?;
        Ok(self)
    }

    pub fn node(&self, path: &str) -> Option<&ParameterNode> {
        let mut segments = path.split('.');
        let mut node = self.root.get(segments.next()?)?;
        for segment in segments {
            node = match node {
                ParameterNode::Branch(children) => children.get(segment)?,
                ParameterNode::Leaf(_) => return None,
            };
        }
        Some(node)
    }

    pub fn leaf_count(&self) -> usize {
        fn count(node: &ParameterNode) -> usize {
            match node {
                ParameterNode::Leaf(_) => 1,
                ParameterNode::Branch(children) => children.values().map(count).sum(),
            }
        }
        self.root.values().map(count).sum()
    }

    fn validate(&self) -> Result<(), LoadError> {
        fn check(path: &str, node: &ParameterNode) -> Result<(), LoadError> {
            match node {
                ParameterNode::Leaf(history) if history.values.is_empty() => {
                    Err(LoadError::Invalid(format!("parameter '{}' has no values", path)))
                }
                ParameterNode::Leaf(_) => Ok(()),
                ParameterNode::Branch(children) => children
                    .iter()
                    .try_for_each(|(name, child)| check(&format!("{}.{}", path, name), child)),
            }
        }
        self.root.iter().try_for_each(|(name, node)| check(name, node))
    }
}

impl Parameters for ParameterTree {
    fn lookup(&self, path: &str, date: NaiveDate) -> Result<f64, ComputationError> {
        match self.node(path) {
            Some(ParameterNode::Leaf(history)) => history.at(date),
            _ => None,
        }
        .ok_or_else(|| ComputationError::MissingParameter { path: path.to_string(), date })
    }
}
