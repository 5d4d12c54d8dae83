//! Hierarchical storage for analyses.
//!
//! A [`Group`] is a named tree of histograms, scalars, strings and nested
//! groups, persisted as a single JSON document. Analyses, systematics and
//! measurements each write into their own sub-group and tag it with a `type`
//! string so loaders can check what they are reading.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, XsecError};
use crate::hist::Histogram;

/// Key holding the type tag of a group.
pub const TYPE_KEY: &str = "type";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", content = "value", rename_all = "lowercase")]
pub enum Node {
    Hist(Histogram),
    Scalar(f64),
    Text(String),
    Matrix(Vec<Vec<f64>>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    groups: BTreeMap<String, Group>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    entries: BTreeMap<String, Node>,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) the sub-group `name` and return it.
    pub fn mkdir(&mut self, name: &str) -> &mut Group {
        self.groups.insert(name.to_string(), Group::new());
        self.groups.entry(name.to_string()).or_default()
    }

    pub fn insert_group(&mut self, name: &str, group: Group) {
        self.groups.insert(name.to_string(), group);
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    pub fn group(&self, name: &str) -> Result<&Group> {
        self.groups
            .get(name)
            .ok_or_else(|| XsecError::Persistence(format!("missing group '{name}'")))
    }

    /// Names of all direct sub-groups, in key order.
    pub fn group_names(&self) -> Vec<&str> {
        self.groups.keys().map(String::as_str).collect()
    }

    pub fn put_hist(&mut self, name: &str, hist: &Histogram) {
        self.entries.insert(name.to_string(), Node::Hist(hist.clone()));
    }

    pub fn hist(&self, name: &str) -> Result<Histogram> {
        match self.entries.get(name) {
            Some(Node::Hist(h)) => Ok(h.clone()),
            Some(_) => Err(XsecError::Persistence(format!("'{name}' is not a histogram"))),
            None => Err(XsecError::Persistence(format!("missing histogram '{name}'"))),
        }
    }

    pub fn put_scalar(&mut self, name: &str, value: f64) {
        self.entries.insert(name.to_string(), Node::Scalar(value));
    }

    pub fn scalar(&self, name: &str) -> Result<f64> {
        match self.entries.get(name) {
            Some(Node::Scalar(v)) => Ok(*v),
            Some(_) => Err(XsecError::Persistence(format!("'{name}' is not a scalar"))),
            None => Err(XsecError::Persistence(format!("missing scalar '{name}'"))),
        }
    }

    pub fn put_text(&mut self, name: &str, value: &str) {
        self.entries.insert(name.to_string(), Node::Text(value.to_string()));
    }

    pub fn text(&self, name: &str) -> Result<&str> {
        match self.entries.get(name) {
            Some(Node::Text(v)) => Ok(v),
            Some(_) => Err(XsecError::Persistence(format!("'{name}' is not text"))),
            None => Err(XsecError::Persistence(format!("missing text '{name}'"))),
        }
    }

    pub fn put_matrix(&mut self, name: &str, rows: Vec<Vec<f64>>) {
        self.entries.insert(name.to_string(), Node::Matrix(rows));
    }

    pub fn matrix(&self, name: &str) -> Result<&[Vec<f64>]> {
        match self.entries.get(name) {
            Some(Node::Matrix(m)) => Ok(m),
            Some(_) => Err(XsecError::Persistence(format!("'{name}' is not a matrix"))),
            None => Err(XsecError::Persistence(format!("missing matrix '{name}'"))),
        }
    }

    /// The group's type tag, if any.
    pub fn type_tag(&self) -> Option<&str> {
        self.text(TYPE_KEY).ok()
    }

    /// Fail unless this group is tagged `expected`.
    pub fn expect_type(&self, expected: &str) -> Result<()> {
        match self.type_tag() {
            Some(tag) if tag == expected => Ok(()),
            Some(tag) => Err(XsecError::Persistence(format!(
                "type does not match: expected '{expected}', found '{tag}'"
            ))),
            None => Err(XsecError::Persistence(format!(
                "untagged group where '{expected}' was expected"
            ))),
        }
    }
}

/// Write a store to a JSON file.
pub fn write_store(path: &Path, root: &Group) -> Result<()> {
    let file = File::create(path).map_err(|e| {
        XsecError::Persistence(format!("failed to create store '{}': {e}", path.display()))
    })?;
    serde_json::to_writer_pretty(BufWriter::new(file), root)?;
    Ok(())
}

/// Read a store from a JSON file.
pub fn read_store(path: &Path) -> Result<Group> {
    let file = File::open(path).map_err(|e| {
        XsecError::Persistence(format!("failed to open store '{}': {e}", path.display()))
    })?;
    let root: Group = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| XsecError::Persistence(format!("invalid store JSON: {e}")))?;
    Ok(root)
}
