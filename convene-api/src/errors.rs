//! # Actor Space Error Types
//!
//! `SpaceError` is the single error type returned by the public operations of
//! an actor space. Start-up and placement failures are surfaced to the caller;
//! delivery failures are absorbed by the router and only show up as
//! `message-dropped` events.
//!
//! ## Usage Example
//!
//! ```rust
//! use convene_api::errors::SpaceError;
//! use convene_api::RequirementSet;
//!
//! fn describe(error: &SpaceError) -> &'static str {
//!     match error {
//!         SpaceError::ConventionUnreachable { .. } => "could not join",
//!         SpaceError::NoCapableHost { .. } => "no host can run it",
//!         SpaceError::Timeout(_) => "no answer in time",
//!         _ => "other failure",
//!     }
//! }
//!
//! let err = SpaceError::NoCapableHost {
//!     requirements: RequirementSet::new().require("Server", true),
//! };
//! assert_eq!(describe(&err), "no host can run it");
//! ```

use std::time::Duration;

use thiserror::Error;

use crate::address::NodeAddress;
use crate::capability::RequirementSet;
use crate::message::MessageKind;

/// Core error type for the actor space.
#[derive(Error, Debug)]
pub enum SpaceError {
    /// The convention leader never acknowledged the join.
    ///
    /// Fatal at start-up.
    #[error("Convention leader {leader} unreachable after {attempts} attempts")]
    ConventionUnreachable { leader: NodeAddress, attempts: u32 },

    /// No known node satisfies the requirements of a creation request.
    #[error("No capable host for requirements {requirements}")]
    NoCapableHost { requirements: RequirementSet },

    /// A bounded wait elapsed.
    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    /// The destination actor registers no handler for this message kind.
    #[error("Actor {actor} has no handler for message type {kind}")]
    UnhandledMessageType { kind: MessageKind, actor: String },

    #[error("Host unreachable: {0}")]
    HostUnreachable(NodeAddress),

    /// The chosen node does not know how to build this actor type.
    #[error("Unknown actor type: {0}")]
    UnknownActorType(String),

    #[error("Spawn rejected by {host}: {reason}")]
    SpawnRejected { host: NodeAddress, reason: String },

    #[error("Invalid node address: {0:?}")]
    InvalidAddress(String),

    /// A handler reported a failure while processing a message.
    #[error("Handler failed: {0}")]
    HandlerFailed(String),

    /// The actor or the node has been stopped.
    #[error("Actor space stopped")]
    Stopped,

    /// An operation that requires membership ran before the join finished.
    #[error("Node has not joined the convention")]
    NotJoined,

    #[error("Transport error: {0}")]
    Transport(String),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SpaceError {
    /// Whether the error came from a bounded wait running out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SpaceError::Timeout(_))
    }
}
