//! # Capabilities and Requirements
//!
//! A node advertises [`Capabilities`]: a map from capability name to a
//! [`CapabilityValue`]. Actor creation carries a [`RequirementSet`]; a node can
//! host the actor when every requirement holds against its map.
//!
//! ## Matching Rules
//!
//! - [`Requirement::Equals`]: the key is present with an equal value.
//! - [`Requirement::Present`]: the key is present with a truthy value
//!   (`true`, a non-zero integer, a non-empty string or tuple).
//!
//! The empty requirement set is satisfied by every capability map.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::NodeAddress;

/// Capability under which a node publishes the convention leader address
/// as a `(host, port)` tuple.
pub const CONVENTION_ADDRESS_KEY: &str = "Convention Address.IPv4";

/// Value of a single advertised capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CapabilityValue {
    Bool(bool),
    Int(i64),
    Str(String),
    Tuple(Vec<CapabilityValue>),
}

impl CapabilityValue {
    /// Whether the value counts as set for a [`Requirement::Present`] check.
    pub fn is_truthy(&self) -> bool {
        match self {
            CapabilityValue::Bool(b) => *b,
            CapabilityValue::Int(n) => *n != 0,
            CapabilityValue::Str(s) => !s.is_empty(),
            CapabilityValue::Tuple(items) => !items.is_empty(),
        }
    }

    /// Interprets a `(host, port)` tuple as a node address.
    pub fn as_node_address(&self) -> Option<NodeAddress> {
        match self {
            CapabilityValue::Tuple(items) => match items.as_slice() {
                [CapabilityValue::Str(host), CapabilityValue::Int(port)] => {
                    let port = u16::try_from(*port).ok()?;
                    Some(NodeAddress::from_parts(host, port))
                }
                _ => None,
            },
            CapabilityValue::Str(s) => NodeAddress::parse(s).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for CapabilityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityValue::Bool(b) => write!(f, "{}", b),
            CapabilityValue::Int(n) => write!(f, "{}", n),
            CapabilityValue::Str(s) => write!(f, "{:?}", s),
            CapabilityValue::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl From<bool> for CapabilityValue {
    fn from(value: bool) -> Self {
        CapabilityValue::Bool(value)
    }
}

impl From<i64> for CapabilityValue {
    fn from(value: i64) -> Self {
        CapabilityValue::Int(value)
    }
}

impl From<&str> for CapabilityValue {
    fn from(value: &str) -> Self {
        CapabilityValue::Str(value.to_string())
    }
}

impl From<String> for CapabilityValue {
    fn from(value: String) -> Self {
        CapabilityValue::Str(value)
    }
}

impl<S: Into<String>> From<(S, u16)> for CapabilityValue {
    fn from((host, port): (S, u16)) -> Self {
        CapabilityValue::Tuple(vec![
            CapabilityValue::Str(host.into()),
            CapabilityValue::Int(i64::from(port)),
        ])
    }
}

/// Capability map advertised by one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities {
    entries: BTreeMap<String, CapabilityValue>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<CapabilityValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts or replaces one capability, returning the previous value.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<CapabilityValue>,
    ) -> Option<CapabilityValue> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&CapabilityValue> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CapabilityValue)> {
        self.entries.iter()
    }

    /// Merges `other` into `self`; keys in `other` win.
    pub fn merge(&mut self, other: &Capabilities) {
        for (key, value) in other.iter() {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    /// The convention leader address published under [`CONVENTION_ADDRESS_KEY`].
    pub fn convention_address(&self) -> Option<NodeAddress> {
        self.get(CONVENTION_ADDRESS_KEY)
            .and_then(CapabilityValue::as_node_address)
    }
}

impl<K: Into<String>, V: Into<CapabilityValue>> FromIterator<(K, V)> for Capabilities {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut caps = Capabilities::new();
        for (key, value) in iter {
            caps.insert(key, value);
        }
        caps
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", key, value)?;
        }
        write!(f, "}}")
    }
}

/// A single placement requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Requirement {
    /// The capability must be present with exactly this value.
    Equals(CapabilityValue),
    /// The capability must be present with any truthy value.
    Present,
}

impl Requirement {
    pub fn matches(&self, value: Option<&CapabilityValue>) -> bool {
        match (self, value) {
            (Requirement::Equals(expected), Some(actual)) => expected == actual,
            (Requirement::Present, Some(actual)) => actual.is_truthy(),
            (_, None) => false,
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Equals(value) => write!(f, "{}", value),
            Requirement::Present => write!(f, "<present>"),
        }
    }
}

/// Requirements attached to one actor creation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequirementSet {
    requirements: BTreeMap<String, Requirement>,
}

impl RequirementSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `key` to be advertised with exactly `value`.
    pub fn require(mut self, key: impl Into<String>, value: impl Into<CapabilityValue>) -> Self {
        self.requirements
            .insert(key.into(), Requirement::Equals(value.into()));
        self
    }

    /// Requires `key` to be advertised with a truthy value.
    pub fn require_present(mut self, key: impl Into<String>) -> Self {
        self.requirements.insert(key.into(), Requirement::Present);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.requirements.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Requirement)> {
        self.requirements.iter()
    }

    pub fn is_satisfied_by(&self, capabilities: &Capabilities) -> bool {
        self.requirements
            .iter()
            .all(|(key, requirement)| requirement.matches(capabilities.get(key)))
    }
}

impl fmt::Display for RequirementSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (key, requirement)) in self.requirements.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", key, requirement)?;
        }
        write!(f, "}}")
    }
}
