//! Message routing between local inboxes and remote nodes.
//!
//! Delivery is at-most-once. A message whose destination cannot be resolved
//! or reached is dropped with a `message-dropped` event and never reported to
//! the sender. Only a failure of the peer itself prunes it; a message that
//! cannot be encoded is dropped alone.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use convene_api::{
    ActorRef, ActorResult, DropReason, Envelope, EventSink, MessageKind, NodeAddress, Payload,
    SpaceError, SpaceEvent,
};

use crate::directory::ActorDirectory;
use crate::mailbox::{self, Delivery, Mailbox};
use crate::membership::Convention;
use crate::registry::CapabilityRegistry;
use crate::transport::{Transport, TransportError};
use crate::wire::{Frame, FrameBody};

/// Actor type under which reply inboxes are registered.
pub const INBOX_TYPE: &str = "convene.Inbox";

/// Result of waiting for a reply.
#[derive(Debug)]
pub enum AskOutcome {
    Reply(Envelope),
    /// Nothing arrived within the wait.
    TimedOut(Duration),
    /// The inbox can no longer receive.
    Closed,
}

impl AskOutcome {
    pub fn is_timed_out(&self) -> bool {
        matches!(self, AskOutcome::TimedOut(_))
    }

    pub fn into_result(self) -> ActorResult<Envelope> {
        match self {
            AskOutcome::Reply(envelope) => Ok(envelope),
            AskOutcome::TimedOut(after) => Err(SpaceError::Timeout(after)),
            AskOutcome::Closed => Err(SpaceError::Stopped),
        }
    }
}

/// Ephemeral reply actor.
///
/// Registered in the directory like any local actor, so replies addressed to
/// it route normally. Dropping the inbox deregisters it; replies arriving
/// later are dropped by the router.
#[derive(Debug)]
pub struct Inbox {
    actor: ActorRef,
    mailbox: Mailbox,
    directory: Weak<RwLock<ActorDirectory>>,
}

impl Inbox {
    pub fn actor_ref(&self) -> &ActorRef {
        &self.actor
    }

    /// Waits up to `timeout` for the next message.
    pub async fn recv(&self, timeout: Duration) -> AskOutcome {
        match tokio::time::timeout(timeout, self.mailbox.pop()).await {
            Ok(Some(Delivery::Message(envelope))) => AskOutcome::Reply(envelope),
            Ok(Some(Delivery::Stop)) | Ok(None) => AskOutcome::Closed,
            Err(_) => AskOutcome::TimedOut(timeout),
        }
    }
}

impl Drop for Inbox {
    fn drop(&mut self) {
        if let Some(directory) = self.directory.upgrade() {
            directory.write().remove(&self.actor);
        }
    }
}

/// Resolves destinations and moves envelopes to them.
#[derive(Debug)]
pub struct MessageRouter {
    local: NodeAddress,
    directory: Arc<RwLock<ActorDirectory>>,
    convention: Arc<RwLock<Convention>>,
    registry: Arc<RwLock<CapabilityRegistry>>,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn EventSink>,
}

impl MessageRouter {
    pub fn new(
        local: NodeAddress,
        directory: Arc<RwLock<ActorDirectory>>,
        convention: Arc<RwLock<Convention>>,
        registry: Arc<RwLock<CapabilityRegistry>>,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            local,
            directory,
            convention,
            registry,
            transport,
            sink,
        }
    }

    /// Delivers `envelope` to its destination, wherever it lives.
    ///
    /// Unknown references fall back to the host embedded in the reference.
    pub async fn send(&self, envelope: Envelope) {
        let dest = envelope.dest.clone();
        let kind = envelope.kind();

        let local_mailbox = self.directory.read().local_mailbox(&dest);
        if let Some(mailbox) = local_mailbox {
            if mailbox.deliver(envelope).is_err() {
                self.dropped(dest, kind, DropReason::MailboxClosed);
            }
            return;
        }

        let host = self
            .directory
            .read()
            .lookup(&dest)
            .unwrap_or_else(|| dest.host.clone());
        if host == self.local {
            self.dropped(dest, kind, DropReason::UnknownActor);
            return;
        }

        trace!(%dest, %kind, %host, "forwarding");
        let frame = Frame::new(self.local.clone(), FrameBody::Deliver { envelope });
        match self.transport.transmit(&host, frame).await {
            Ok(()) => {}
            Err(err) if err.is_peer_failure() => {
                debug!(%host, error = %err, "transmit failed");
                self.dropped(dest, kind, DropReason::HostUnreachable);
                self.prune_host(&host);
            }
            Err(TransportError::Codec(err)) => {
                warn!(%dest, %kind, error = %err, "message not encodable");
                self.dropped(dest, kind, DropReason::Unencodable);
            }
            Err(err) => {
                debug!(%host, error = %err, "transmit failed");
                self.dropped(dest, kind, DropReason::HostUnreachable);
            }
        }
    }

    /// Enqueues an envelope that arrived from another node.
    pub fn deliver_inbound(&self, envelope: Envelope) {
        let dest = envelope.dest.clone();
        let kind = envelope.kind();
        let local_mailbox = self.directory.read().local_mailbox(&dest);
        match local_mailbox {
            Some(mailbox) => {
                if mailbox.deliver(envelope).is_err() {
                    self.dropped(dest, kind, DropReason::MailboxClosed);
                }
            }
            None => self.dropped(dest, kind, DropReason::UnknownActor),
        }
    }

    /// Forgets everything about a host that stopped answering.
    pub fn prune_host(&self, host: &NodeAddress) -> bool {
        let was_member = self.convention.write().prune(host);
        self.registry.write().forget(host);
        let orphaned = self.directory.write().remove_host(host);
        if was_member {
            warn!(%host, orphaned = orphaned.len(), "pruned unreachable member");
            self.sink.emit(SpaceEvent::MemberLeft {
                address: host.clone(),
            });
        }
        was_member
    }

    pub fn open_inbox(&self) -> Inbox {
        let actor = ActorRef::new(self.local.clone());
        let (sender, mailbox) = mailbox::channel();
        self.directory
            .write()
            .register_local(actor.clone(), INBOX_TYPE, sender);
        Inbox {
            actor,
            mailbox,
            directory: Arc::downgrade(&self.directory),
        }
    }

    /// Sends `payload` with a fresh inbox as sender and waits for one reply.
    ///
    /// A timeout does not retract the request.
    pub async fn ask(&self, dest: &ActorRef, payload: Payload, timeout: Duration) -> AskOutcome {
        let inbox = self.open_inbox();
        let envelope = Envelope::new(dest.clone(), payload, Some(inbox.actor_ref().clone()));
        self.send(envelope).await;
        inbox.recv(timeout).await
    }

    fn dropped(&self, dest: ActorRef, kind: MessageKind, reason: DropReason) {
        debug!(%dest, %kind, %reason, "dropping message");
        self.sink
            .emit(SpaceEvent::MessageDropped { dest, kind, reason });
    }
}
