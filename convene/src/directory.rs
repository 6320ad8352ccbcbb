use std::collections::HashMap;

use uuid::Uuid;

use convene_api::{ActorRef, NodeAddress, RequirementSet, SpaceError};

use crate::mailbox::MailboxSender;
use crate::registry::CapabilityRegistry;

/// Where a registered actor lives.
#[derive(Debug, Clone)]
pub enum DirectoryEntry {
    Local {
        actor: ActorRef,
        actor_type: String,
        mailbox: MailboxSender,
    },
    Remote {
        actor: ActorRef,
    },
}

impl DirectoryEntry {
    pub fn actor(&self) -> &ActorRef {
        match self {
            DirectoryEntry::Local { actor, .. } | DirectoryEntry::Remote { actor } => actor,
        }
    }

    pub fn host(&self) -> &NodeAddress {
        &self.actor().host
    }
}

/// Actor identity to owning node, plus the inbox of every local actor.
#[derive(Debug, Default)]
pub struct ActorDirectory {
    entries: HashMap<Uuid, DirectoryEntry>,
}

impl ActorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_local(
        &mut self,
        actor: ActorRef,
        actor_type: impl Into<String>,
        mailbox: MailboxSender,
    ) {
        self.entries.insert(
            actor.id,
            DirectoryEntry::Local {
                actor,
                actor_type: actor_type.into(),
                mailbox,
            },
        );
    }

    pub fn register_remote(&mut self, actor: ActorRef) {
        self.entries
            .insert(actor.id, DirectoryEntry::Remote { actor });
    }

    /// Host of a registered actor.
    pub fn lookup(&self, actor: &ActorRef) -> Option<NodeAddress> {
        self.entries.get(&actor.id).map(|e| e.host().clone())
    }

    pub fn local_mailbox(&self, actor: &ActorRef) -> Option<MailboxSender> {
        match self.entries.get(&actor.id) {
            Some(DirectoryEntry::Local { mailbox, .. }) => Some(mailbox.clone()),
            _ => None,
        }
    }

    pub fn actor_type(&self, actor: &ActorRef) -> Option<&str> {
        match self.entries.get(&actor.id) {
            Some(DirectoryEntry::Local { actor_type, .. }) => Some(actor_type),
            _ => None,
        }
    }

    pub fn remove(&mut self, actor: &ActorRef) -> Option<DirectoryEntry> {
        self.entries.remove(&actor.id)
    }

    /// Drops every remote entry hosted on `host`, returning the removed refs.
    pub fn remove_host(&mut self, host: &NodeAddress) -> Vec<ActorRef> {
        let gone: Vec<Uuid> = self
            .entries
            .iter()
            .filter(|(_, e)| matches!(e, DirectoryEntry::Remote { .. }) && e.host() == host)
            .map(|(id, _)| *id)
            .collect();
        gone.into_iter()
            .filter_map(|id| self.entries.remove(&id))
            .map(|e| e.actor().clone())
            .collect()
    }

    /// Inboxes of every local actor.
    pub fn local_mailboxes(&self) -> Vec<(ActorRef, MailboxSender)> {
        self.entries
            .values()
            .filter_map(|e| match e {
                DirectoryEntry::Local { actor, mailbox, .. } => {
                    Some((actor.clone(), mailbox.clone()))
                }
                DirectoryEntry::Remote { .. } => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Chooses the node that should host an actor with `requirements`.
///
/// The local node wins when it qualifies; otherwise the first qualifying
/// member in discovery order.
pub fn select_host<'a>(
    local: &NodeAddress,
    members: impl IntoIterator<Item = &'a NodeAddress>,
    registry: &CapabilityRegistry,
    requirements: &RequirementSet,
) -> Result<NodeAddress, SpaceError> {
    if registry.satisfies(local, requirements) {
        return Ok(local.clone());
    }
    members
        .into_iter()
        .find(|member| registry.satisfies(member, requirements))
        .cloned()
        .ok_or_else(|| SpaceError::NoCapableHost {
            requirements: requirements.clone(),
        })
}
