//! # Convene API
//!
//! Data model and contracts shared by every node of a convene actor space.
//!
//! An actor space is a set of cooperating actor-system nodes. Each node
//! advertises a map of capabilities (`Server: true`, `Convention
//! Address.IPv4: ("10.0.0.1", 1900)`, ...). Actors are created with an explicit
//! [`RequirementSet`] and land on a node whose capabilities satisfy it. Actors
//! talk only through typed [`Envelope`]s addressed by [`ActorRef`].
//!
//! ## Module Organization
//!
//! - [`capability`]: capability values, capability maps and requirement sets
//! - [`address`]: node addresses, node announcements and actor references
//! - [`message`]: the tagged payload union and the message envelope
//! - [`actor`]: the `Actor` trait and the per-kind handler table
//! - [`event`]: structured runtime events and the injectable sink
//! - [`errors`]: the error taxonomy of the actor space
//! - [`types`]: common type aliases
//!
//! ## Usage Example
//!
//! ```rust
//! use convene_api::{Capabilities, RequirementSet};
//!
//! let server = Capabilities::new().with("Server", true);
//! let needs_server = RequirementSet::new().require("Server", true);
//! assert!(needs_server.is_satisfied_by(&server));
//! ```

pub mod actor;
pub mod address;
pub mod capability;
pub mod errors;
pub mod event;
pub mod message;
pub mod types;

pub use actor::{Actor, Handler, HandlerTable};
pub use address::{ActorRef, NodeAddress, NodeAnnouncement, DEFAULT_CONVENTION_PORT};
pub use capability::{
    Capabilities, CapabilityValue, Requirement, RequirementSet, CONVENTION_ADDRESS_KEY,
};
pub use errors::SpaceError;
pub use event::{DropReason, EventSink, SpaceEvent};
pub use message::{Envelope, MessageKind, Payload};
pub use types::{ActorResult, BoxedFuture};
