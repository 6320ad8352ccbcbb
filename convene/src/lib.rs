// Convene actor space runtime
//
// Runs the contracts of `convene-api`: capability registry, convention
// membership, actor directory and placement, message routing, per-actor
// dispatch loops, and the in-memory and TCP transports that connect nodes.

pub mod config;
pub mod context;
pub mod directory;
pub mod dispatch;
pub mod echo;
pub mod logging;
pub mod mailbox;
pub mod membership;
pub mod registry;
pub mod router;
pub mod sink;
pub mod system;
pub mod transport;
pub mod wire;

// Re-export commonly used types
pub use config::{JoinPolicy, NodeConfig};
pub use context::ActorContext;
pub use dispatch::ActorCatalog;
pub use membership::ConventionState;
pub use router::{AskOutcome, Inbox};
pub use sink::{RecordingSink, TracingSink};
pub use system::{ActorSpace, SpaceBuilder};
pub use transport::{MemoryNetwork, TcpTransport, Transport};

pub use convene_api;
