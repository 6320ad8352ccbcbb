use std::time::Duration;

use convene_api::{Capabilities, NodeAddress, CONVENTION_ADDRESS_KEY};

// --- Join Policy ---

/// How a joining node retries its announcement to the convention leader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinPolicy {
    /// Total number of join announcements before giving up.
    pub max_attempts: u32,
    /// How long one announcement waits for the leader's acknowledgment.
    pub ack_timeout: Duration,
    /// Pause after the first failed attempt.
    pub initial_backoff: Duration,
    /// Upper bound for the pause between attempts.
    pub max_backoff: Duration,
}

impl Default for JoinPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            ack_timeout: Duration::from_secs(2),
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl JoinPolicy {
    /// Delays to sleep between consecutive attempts.
    pub fn backoff(&self) -> JoinBackoff {
        JoinBackoff {
            next: self.initial_backoff,
            max: self.max_backoff,
            remaining: self.max_attempts.saturating_sub(1),
        }
    }
}

/// Doubling backoff capped at the policy's maximum.
#[derive(Debug, Clone)]
pub struct JoinBackoff {
    next: Duration,
    max: Duration,
    remaining: u32,
}

impl Iterator for JoinBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let delay = self.next.min(self.max);
        self.next = std::cmp::min(self.next * 2, self.max);
        Some(delay)
    }
}

// --- Node Configuration ---

/// Configuration of one actor-system node.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Address this node listens on and announces.
    pub address: NodeAddress,

    /// Capabilities advertised to the convention; fixed after start.
    pub capabilities: Capabilities,

    /// Convention leader to join. `None` makes this node the leader.
    pub leader: Option<NodeAddress>,

    pub join_policy: JoinPolicy,

    /// Upper bound for a remote spawn request.
    pub spawn_timeout: Duration,

    /// Timeout used by `ask` when the caller does not pass one.
    pub default_ask_timeout: Duration,
}

impl NodeConfig {
    /// Builds a configuration whose leader comes from the
    /// `Convention Address.IPv4` capability.
    ///
    /// A node whose own address equals the convention address leads.
    pub fn new(address: NodeAddress, capabilities: Capabilities) -> Self {
        let leader = capabilities
            .convention_address()
            .filter(|leader| *leader != address);
        Self {
            address,
            capabilities,
            leader,
            join_policy: JoinPolicy::default(),
            spawn_timeout: Duration::from_secs(5),
            default_ask_timeout: Duration::from_secs(10),
        }
    }

    /// A leader node advertising its own address as the convention address.
    pub fn leader(address: NodeAddress, capabilities: Capabilities) -> Self {
        let mut capabilities = capabilities;
        if !capabilities.contains(CONVENTION_ADDRESS_KEY) {
            if let Some(port) = address.port() {
                capabilities.insert(CONVENTION_ADDRESS_KEY, (address.host(), port));
            }
        }
        Self::new(address, capabilities).with_leader(None)
    }

    pub fn with_leader(mut self, leader: Option<NodeAddress>) -> Self {
        self.leader = leader;
        self
    }

    pub fn with_join_policy(mut self, policy: JoinPolicy) -> Self {
        self.join_policy = policy;
        self
    }

    pub fn with_spawn_timeout(mut self, timeout: Duration) -> Self {
        self.spawn_timeout = timeout;
        self
    }

    pub fn with_ask_timeout(mut self, timeout: Duration) -> Self {
        self.default_ask_timeout = timeout;
        self
    }

    pub fn is_leader(&self) -> bool {
        self.leader.is_none()
    }
}
