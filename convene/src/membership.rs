//! Convention membership: which nodes form the actor space.
//!
//! [`Convention`] is a pure state machine. Every input (a received frame or a
//! local decision) returns a [`MembershipUpdate`] listing the members that
//! appeared or vanished and the frames the caller must transmit. The node
//! applies the update to its registry and directory and does the I/O.
//!
//! Protocol:
//!
//! - A joiner sends `Join` to the leader and stays `Joining` until `JoinAck`.
//! - Whoever receives a `Join` answers with `JoinAck` (itself plus the other
//!   members) and broadcasts `MemberJoined` to everybody else.
//! - Leaving broadcasts `MemberLeft`; missed removals are repaired lazily when
//!   a transmit to the stale member fails.

use std::fmt;

use convene_api::{NodeAddress, NodeAnnouncement};

use crate::wire::FrameBody;

/// A frame body addressed to one peer.
pub type Outbound = (NodeAddress, FrameBody);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConventionState {
    Joining,
    Joined,
    Left,
}

impl fmt::Display for ConventionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Joining => write!(f, "Joining"),
            Self::Joined => write!(f, "Joined"),
            Self::Left => write!(f, "Left"),
        }
    }
}

/// Known peers in discovery order. Never contains the local node.
#[derive(Debug, Clone, Default)]
pub struct MembershipView {
    members: Vec<NodeAnnouncement>,
}

impl MembershipView {
    /// Inserts or replaces the member at `announcement.address`.
    ///
    /// Returns `true` when the address was not known before. A replaced
    /// member keeps its discovery position.
    pub fn upsert(&mut self, announcement: NodeAnnouncement) -> bool {
        match self
            .members
            .iter_mut()
            .find(|m| m.address == announcement.address)
        {
            Some(existing) => {
                *existing = announcement;
                false
            }
            None => {
                self.members.push(announcement);
                true
            }
        }
    }

    pub fn remove(&mut self, address: &NodeAddress) -> Option<NodeAnnouncement> {
        let index = self.members.iter().position(|m| &m.address == address)?;
        Some(self.members.remove(index))
    }

    pub fn contains(&self, address: &NodeAddress) -> bool {
        self.members.iter().any(|m| &m.address == address)
    }

    pub fn get(&self, address: &NodeAddress) -> Option<&NodeAnnouncement> {
        self.members.iter().find(|m| &m.address == address)
    }

    pub fn addresses(&self) -> impl Iterator<Item = &NodeAddress> {
        self.members.iter().map(|m| &m.address)
    }

    pub fn members(&self) -> &[NodeAnnouncement] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn clear(&mut self) {
        self.members.clear();
    }
}

/// What changed after one membership input.
#[derive(Debug, Default)]
pub struct MembershipUpdate {
    /// Members seen for the first time.
    pub joined: Vec<NodeAnnouncement>,
    /// Known members that re-announced themselves.
    pub refreshed: Vec<NodeAnnouncement>,
    pub left: Vec<NodeAddress>,
    pub frames: Vec<Outbound>,
}

impl MembershipUpdate {
    fn record(&mut self, announcement: NodeAnnouncement, is_new: bool) {
        if is_new {
            self.joined.push(announcement);
        } else {
            self.refreshed.push(announcement);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.joined.is_empty()
            && self.refreshed.is_empty()
            && self.left.is_empty()
            && self.frames.is_empty()
    }
}

/// Membership state of one node.
#[derive(Debug)]
pub struct Convention {
    local: NodeAnnouncement,
    leader: Option<NodeAddress>,
    state: ConventionState,
    view: MembershipView,
}

impl Convention {
    /// `leader == None` starts this node as the leader, already joined.
    pub fn new(local: NodeAnnouncement, leader: Option<NodeAddress>) -> Self {
        let state = if leader.is_some() {
            ConventionState::Joining
        } else {
            ConventionState::Joined
        };
        Self {
            local,
            leader,
            state,
            view: MembershipView::default(),
        }
    }

    pub fn state(&self) -> ConventionState {
        self.state
    }

    pub fn view(&self) -> &MembershipView {
        &self.view
    }

    pub fn local(&self) -> &NodeAnnouncement {
        &self.local
    }

    pub fn leader(&self) -> Option<&NodeAddress> {
        self.leader.as_ref()
    }

    pub fn is_leader(&self) -> bool {
        self.leader.is_none()
    }

    /// The announcement a joiner sends to its leader.
    pub fn join_request(&self) -> Option<Outbound> {
        let leader = self.leader.clone()?;
        Some((
            leader,
            FrameBody::Join {
                announcement: self.local.clone(),
            },
        ))
    }

    /// Handles a `Join` from `announcement.address`.
    pub fn on_join(&mut self, announcement: NodeAnnouncement) -> MembershipUpdate {
        let mut update = MembershipUpdate::default();
        if announcement.address == self.local.address || self.state == ConventionState::Left {
            return update;
        }

        let joiner = announcement.address.clone();
        let is_new = self.view.upsert(announcement.clone());

        let others: Vec<NodeAnnouncement> = self
            .view
            .members()
            .iter()
            .filter(|m| m.address != joiner)
            .cloned()
            .collect();

        for member in &others {
            update.frames.push((
                member.address.clone(),
                FrameBody::MemberJoined {
                    announcement: announcement.clone(),
                },
            ));
        }
        update.frames.push((
            joiner,
            FrameBody::JoinAck {
                leader: self.local.clone(),
                members: others,
            },
        ));
        update.record(announcement, is_new);
        update
    }

    /// Handles the leader's acknowledgment of our join.
    pub fn on_join_ack(
        &mut self,
        leader: NodeAnnouncement,
        members: Vec<NodeAnnouncement>,
    ) -> MembershipUpdate {
        let mut update = MembershipUpdate::default();
        if self.state == ConventionState::Left {
            return update;
        }
        self.state = ConventionState::Joined;

        for member in std::iter::once(leader).chain(members) {
            if member.address == self.local.address {
                continue;
            }
            let is_new = self.view.upsert(member.clone());
            update.record(member, is_new);
        }
        update
    }

    /// Handles gossip about a peer that joined elsewhere.
    pub fn on_member_joined(&mut self, announcement: NodeAnnouncement) -> MembershipUpdate {
        let mut update = MembershipUpdate::default();
        if announcement.address == self.local.address || self.state == ConventionState::Left {
            return update;
        }
        let is_new = self.view.upsert(announcement.clone());
        update.record(announcement, is_new);
        update
    }

    pub fn on_member_left(&mut self, address: &NodeAddress) -> MembershipUpdate {
        let mut update = MembershipUpdate::default();
        if self.view.remove(address).is_some() {
            update.left.push(address.clone());
        }
        update
    }

    /// Drops a member that could not be reached. Returns whether it was known.
    pub fn prune(&mut self, address: &NodeAddress) -> bool {
        self.view.remove(address).is_some()
    }

    /// Leaves the convention, telling every known member.
    pub fn leave(&mut self) -> MembershipUpdate {
        let mut update = MembershipUpdate::default();
        if self.state == ConventionState::Left {
            return update;
        }
        self.state = ConventionState::Left;
        for member in self.view.members() {
            update.frames.push((
                member.address.clone(),
                FrameBody::MemberLeft {
                    address: self.local.address.clone(),
                },
            ));
            update.left.push(member.address.clone());
        }
        self.view.clear();
        update
    }
}
