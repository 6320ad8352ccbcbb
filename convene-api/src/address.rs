use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capability::Capabilities;
use crate::errors::SpaceError;

/// Rendezvous port used when an address omits one.
pub const DEFAULT_CONVENTION_PORT: u16 = 1900;

/// Network address of one actor-system node, always `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeAddress(String);

impl NodeAddress {
    /// Parses `host` or `host:port`. A missing port becomes
    /// [`DEFAULT_CONVENTION_PORT`].
    pub fn parse(input: &str) -> Result<Self, SpaceError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(SpaceError::InvalidAddress(input.to_string()));
        }
        match input.rsplit_once(':') {
            Some((host, port)) => {
                if host.is_empty() {
                    return Err(SpaceError::InvalidAddress(input.to_string()));
                }
                let port: u16 = port
                    .parse()
                    .map_err(|_| SpaceError::InvalidAddress(input.to_string()))?;
                Ok(Self::from_parts(host, port))
            }
            None => Ok(Self::from_parts(input, DEFAULT_CONVENTION_PORT)),
        }
    }

    pub fn from_parts(host: &str, port: u16) -> Self {
        NodeAddress(format!("{}:{}", host, port))
    }

    pub fn host(&self) -> &str {
        self.0.rsplit_once(':').map(|(h, _)| h).unwrap_or(&self.0)
    }

    pub fn port(&self) -> Option<u16> {
        self.0.rsplit_once(':').and_then(|(_, p)| p.parse().ok())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for NodeAddress {
    type Err = SpaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeAddress::parse(s)
    }
}

/// What a node tells the convention about itself when joining.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAnnouncement {
    /// Changes on every process start.
    pub node_id: Uuid,
    pub address: NodeAddress,
    pub capabilities: Capabilities,
}

impl NodeAnnouncement {
    pub fn new(address: NodeAddress, capabilities: Capabilities) -> Self {
        Self {
            node_id: Uuid::new_v4(),
            address,
            capabilities,
        }
    }
}

/// Globally unique handle of one actor instance.
///
/// The reference carries the address of the hosting node so that a reference
/// learned from a message can be routed even if the local directory has never
/// seen it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorRef {
    pub id: Uuid,
    pub host: NodeAddress,
}

impl ActorRef {
    pub fn new(host: NodeAddress) -> Self {
        Self {
            id: Uuid::new_v4(),
            host,
        }
    }
}

impl fmt::Display for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor-{}@{}", self.id, self.host)
    }
}
