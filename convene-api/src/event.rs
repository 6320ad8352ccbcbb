use std::fmt;
use std::time::Duration;

use crate::address::{ActorRef, NodeAddress};
use crate::message::MessageKind;

/// Why the router or a dispatch loop discarded a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    UnhandledMessageType,
    UnknownActor,
    HostUnreachable,
    MailboxClosed,
    /// The message could not be encoded for the wire.
    Unencodable,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            DropReason::UnhandledMessageType => "unhandled-message-type",
            DropReason::UnknownActor => "unknown-actor",
            DropReason::HostUnreachable => "host-unreachable",
            DropReason::MailboxClosed => "mailbox-closed",
            DropReason::Unencodable => "unencodable",
        };
        f.write_str(reason)
    }
}

/// Structured runtime event emitted by a node.
#[derive(Debug, Clone, PartialEq)]
pub enum SpaceEvent {
    ActorCreated {
        actor: ActorRef,
        actor_type: String,
        host: NodeAddress,
    },
    MessageDropped {
        dest: ActorRef,
        kind: MessageKind,
        reason: DropReason,
    },
    JoinTimeout {
        leader: NodeAddress,
        attempt: u32,
    },
    MemberJoined {
        address: NodeAddress,
    },
    MemberLeft {
        address: NodeAddress,
    },
    ActorStopped {
        actor: ActorRef,
    },
    EchoComplete {
        actor: ActorRef,
        elapsed: Duration,
    },
}

impl SpaceEvent {
    /// Stable event name used as the log message.
    pub fn name(&self) -> &'static str {
        match self {
            SpaceEvent::ActorCreated { .. } => "actor-created",
            SpaceEvent::MessageDropped { .. } => "message-dropped",
            SpaceEvent::JoinTimeout { .. } => "join-timeout",
            SpaceEvent::MemberJoined { .. } => "member-joined",
            SpaceEvent::MemberLeft { .. } => "member-left",
            SpaceEvent::ActorStopped { .. } => "actor-stopped",
            SpaceEvent::EchoComplete { .. } => "echo-complete",
        }
    }
}

/// Destination for the structured events of one node.
///
/// Each node owns its sink, so several nodes in one process do not share
/// output.
pub trait EventSink: Send + Sync + fmt::Debug {
    fn emit(&self, event: SpaceEvent);
}
