use std::collections::HashMap;

use convene_api::{Capabilities, NodeAddress, RequirementSet};

/// Capabilities advertised by every known node, keyed by address.
#[derive(Debug, Default, Clone)]
pub struct CapabilityRegistry {
    nodes: HashMap<NodeAddress, Capabilities>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `capabilities` for `node`; keys already known are overwritten.
    pub fn advertise(&mut self, node: &NodeAddress, capabilities: &Capabilities) {
        self.nodes
            .entry(node.clone())
            .or_default()
            .merge(capabilities);
    }

    /// Replaces everything known about `node` with `capabilities`.
    ///
    /// Used for whole announcements: a node that restarts with fewer
    /// capabilities must not keep the ones it dropped.
    pub fn replace(
        &mut self,
        node: &NodeAddress,
        capabilities: &Capabilities,
    ) -> Option<Capabilities> {
        self.nodes.insert(node.clone(), capabilities.clone())
    }

    /// Whether `node` is known and its capabilities satisfy `requirements`.
    pub fn satisfies(&self, node: &NodeAddress, requirements: &RequirementSet) -> bool {
        self.nodes
            .get(node)
            .is_some_and(|caps| requirements.is_satisfied_by(caps))
    }

    pub fn forget(&mut self, node: &NodeAddress) -> Option<Capabilities> {
        self.nodes.remove(node)
    }

    pub fn capabilities(&self, node: &NodeAddress) -> Option<&Capabilities> {
        self.nodes.get(node)
    }

    pub fn knows(&self, node: &NodeAddress) -> bool {
        self.nodes.contains_key(node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
