use std::fmt;

use parking_lot::Mutex;
use tracing::{info, warn};

use convene_api::{EventSink, NodeAddress, SpaceEvent};

/// Writes node events through `tracing`.
#[derive(Debug, Clone)]
pub struct TracingSink {
    node: NodeAddress,
}

impl TracingSink {
    pub fn new(node: NodeAddress) -> Self {
        Self { node }
    }
}

impl EventSink for TracingSink {
    fn emit(&self, event: SpaceEvent) {
        let name = event.name();
        let node = &self.node;
        match event {
            SpaceEvent::ActorCreated {
                actor,
                actor_type,
                host,
            } => info!(%node, %actor, %actor_type, %host, "{}", name),
            SpaceEvent::MessageDropped { dest, kind, reason } => {
                warn!(%node, %dest, %kind, %reason, "{}", name)
            }
            SpaceEvent::JoinTimeout { leader, attempt } => {
                warn!(%node, %leader, attempt, "{}", name)
            }
            SpaceEvent::MemberJoined { address } | SpaceEvent::MemberLeft { address } => {
                info!(%node, member = %address, "{}", name)
            }
            SpaceEvent::ActorStopped { actor } => info!(%node, %actor, "{}", name),
            SpaceEvent::EchoComplete { actor, elapsed } => {
                info!(%node, %actor, elapsed_ms = elapsed.as_secs_f64() * 1000.0, "{}", name)
            }
        }
    }
}

/// Keeps every event in memory, for assertions in tests.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SpaceEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SpaceEvent> {
        self.events.lock().clone()
    }

    /// Number of recorded events matching `pred`.
    pub fn count(&self, pred: impl Fn(&SpaceEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }

    pub fn named(&self, name: &str) -> usize {
        self.count(|e| e.name() == name)
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl fmt::Debug for RecordingSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingSink")
            .field("events", &self.events.lock().len())
            .finish()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: SpaceEvent) {
        self.events.lock().push(event);
    }
}
