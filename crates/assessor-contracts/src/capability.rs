//! Capability descriptors exchanged during agent discovery.
//!
//! The orchestrator never probes an agent by trial and error. It reads the
//! agent's declared operations once per task and compares them against a
//! fixed required set before any instruction is sent.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A single named operation, e.g. `"message/send"` or `"input:text"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(pub String);

impl Capability {
    /// Construct a capability from any string-like value.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// An ordered set of operations.
///
/// Ordered so that descriptors and mismatch reports print the same way on
/// every run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet {
    inner: BTreeSet<Capability>,
}

impl CapabilitySet {
    pub fn grant(&mut self, capability: Capability) {
        self.inner.insert(capability);
    }

    pub fn has(&self, capability: &Capability) -> bool {
        self.inner.contains(capability)
    }

    pub fn all(&self) -> impl Iterator<Item = &Capability> {
        self.inner.iter()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Return every capability in `required` that this set lacks.
    pub fn missing(&self, required: &CapabilitySet) -> Vec<Capability> {
        required
            .all()
            .filter(|cap| !self.has(cap))
            .cloned()
            .collect()
    }
}

impl<S: Into<String>> FromIterator<S> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().map(Capability::new).collect(),
        }
    }
}

/// What a remote agent told us about itself during discovery.
///
/// Cached on the task that performed the discovery and dropped with it;
/// agents may change between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCapabilityDescriptor {
    /// The agent's self-reported name.
    pub name: String,
    /// Protocol version string the agent advertises.
    pub protocol_version: String,
    /// The address instructions must be sent to.
    pub endpoint: String,
    /// Operations the agent supports.
    pub operations: CapabilitySet,
}
