//! Placement Property Tests
//!
//! Placement succeeds exactly when some known node satisfies the
//! requirements, and the chosen node always does.

use proptest::prelude::*;

use convene::convene_api::{Capabilities, NodeAddress, RequirementSet};
use convene::directory::select_host;
use convene::registry::CapabilityRegistry;

/// Advertised `(Server, Client)` flags of one node.
fn node_flags() -> impl Strategy<Value = (bool, bool)> {
    (any::<bool>(), any::<bool>())
}

fn caps((server, client): (bool, bool)) -> Capabilities {
    let mut caps = Capabilities::new().with("Server", server);
    if client {
        caps.insert("Client", true);
    }
    caps
}

fn node(index: usize) -> NodeAddress {
    NodeAddress::from_parts(&format!("node-{}", index), 1900)
}

proptest! {
    #[test]
    fn prop_placement_iff_capable_node_exists(
        local in node_flags(),
        members in prop::collection::vec(node_flags(), 0..8),
        want_client in any::<bool>(),
    ) {
        let mut registry = CapabilityRegistry::new();
        let local_address = node(0);
        registry.advertise(&local_address, &caps(local));
        let addresses: Vec<NodeAddress> = (1..=members.len()).map(node).collect();
        for (address, flags) in addresses.iter().zip(&members) {
            registry.advertise(address, &caps(*flags));
        }

        let mut requirements = RequirementSet::new().require("Server", true);
        if want_client {
            requirements = requirements.require_present("Client");
        }
        let fits = |(server, client): (bool, bool)| server && (client || !want_client);

        let result = select_host(&local_address, addresses.iter(), &registry, &requirements);
        let any_fits = fits(local) || members.iter().copied().any(fits);
        prop_assert_eq!(result.is_ok(), any_fits);

        if let Ok(host) = result {
            prop_assert!(registry.satisfies(&host, &requirements));
            if fits(local) {
                prop_assert_eq!(host, local_address);
            }
        }
    }

    #[test]
    fn prop_unknown_nodes_are_never_chosen(
        members in prop::collection::vec(node_flags(), 0..8),
    ) {
        // Nothing is advertised, so no member can be selected.
        let registry = CapabilityRegistry::new();
        let addresses: Vec<NodeAddress> = (1..=members.len()).map(node).collect();
        let result = select_host(&node(0), addresses.iter(), &registry, &RequirementSet::new());
        prop_assert!(result.is_err());
    }

    #[test]
    fn prop_advertise_is_idempotent(flags in prop::collection::vec(node_flags(), 1..5)) {
        let address = node(1);
        let mut once = CapabilityRegistry::new();
        let mut twice = CapabilityRegistry::new();
        for f in &flags {
            once.advertise(&address, &caps(*f));
            twice.advertise(&address, &caps(*f));
            twice.advertise(&address, &caps(*f));
        }
        prop_assert_eq!(once.capabilities(&address), twice.capabilities(&address));

        // Last write wins for every key that was advertised again.
        let last = flags[flags.len() - 1];
        let server = once
            .capabilities(&address)
            .and_then(|c| c.get("Server"))
            .map(|v| v.is_truthy());
        prop_assert_eq!(server, Some(last.0));
    }
}
