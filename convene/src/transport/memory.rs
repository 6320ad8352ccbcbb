use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use flume::Sender;
use parking_lot::RwLock;
use tracing::trace;

use convene_api::NodeAddress;

use super::{Inbound, Transport, TransportError};
use crate::wire::{decode_frame, encode_frame, Frame};

/// In-process network connecting any number of [`MemoryTransport`]s.
///
/// Each hop goes through the wire codec, so what a node receives is exactly
/// what a socket transport would have delivered.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    nodes: Arc<RwLock<HashMap<NodeAddress, Sender<Frame>>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a node at `address`.
    pub fn bind(
        &self,
        address: NodeAddress,
    ) -> Result<(Arc<MemoryTransport>, Inbound), TransportError> {
        let mut nodes = self.nodes.write();
        if nodes.contains_key(&address) {
            return Err(TransportError::AddressInUse(address));
        }
        let (sender, receiver) = flume::unbounded();
        nodes.insert(address.clone(), sender);
        let transport = MemoryTransport {
            address,
            network: self.clone(),
            closed: AtomicBool::new(false),
        };
        Ok((Arc::new(transport), receiver))
    }

    /// Detaches `address`; frames sent to it fail from now on.
    pub fn disconnect(&self, address: &NodeAddress) -> bool {
        self.nodes.write().remove(address).is_some()
    }

    pub fn is_attached(&self, address: &NodeAddress) -> bool {
        self.nodes.read().contains_key(address)
    }

    fn route(&self, to: &NodeAddress) -> Option<Sender<Frame>> {
        self.nodes.read().get(to).cloned()
    }
}

#[derive(Debug)]
pub struct MemoryTransport {
    address: NodeAddress,
    network: MemoryNetwork,
    closed: AtomicBool,
}

#[async_trait]
impl Transport for MemoryTransport {
    fn local_address(&self) -> NodeAddress {
        self.address.clone()
    }

    async fn transmit(&self, to: &NodeAddress, frame: Frame) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let peer = self
            .network
            .route(to)
            .ok_or_else(|| TransportError::Unreachable(to.clone()))?;

        let bytes = encode_frame(&frame)?;
        let frame = decode_frame(&bytes)?;
        trace!(from = %self.address, %to, kind = frame.body.name(), len = bytes.len(), "memory hop");

        peer.send(frame)
            .map_err(|_| TransportError::Unreachable(to.clone()))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.network.disconnect(&self.address);
    }
}
