//! Node-to-node frame delivery.
//!
//! A transport only moves [`Frame`]s. Frames arriving for the local node are
//! pushed into the inbound channel handed out when the transport is bound;
//! the node drains that channel in its frame loop.

use std::fmt::Debug;

use async_trait::async_trait;
use thiserror::Error;

use convene_api::NodeAddress;

use crate::wire::{Frame, WireError};

pub mod memory;
pub mod tcp;

pub use memory::{MemoryNetwork, MemoryTransport};
pub use tcp::TcpTransport;

/// Receiving end of a bound transport.
pub type Inbound = flume::Receiver<Frame>;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Peer unreachable: {0}")]
    Unreachable(NodeAddress),
    #[error("Address already bound: {0}")]
    AddressInUse(NodeAddress),
    #[error(transparent)]
    Codec(#[from] WireError),
    #[error("Transport I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Transport closed")]
    Closed,
}

impl TransportError {
    /// Whether the failure says something about the peer rather than about
    /// the frame or this node.
    pub fn is_peer_failure(&self) -> bool {
        matches!(self, TransportError::Unreachable(_) | TransportError::Io(_))
    }
}

#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Address peers use to reach this node.
    fn local_address(&self) -> NodeAddress;

    /// Sends one frame to `to`. Frames to the same peer arrive in order.
    async fn transmit(&self, to: &NodeAddress, frame: Frame) -> Result<(), TransportError>;

    /// Stops accepting and sending frames.
    async fn close(&self);
}
