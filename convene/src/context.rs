use std::sync::{Arc, Weak};

use tracing::debug;

use convene_api::{
    ActorRef, ActorResult, Envelope, NodeAddress, Payload, RequirementSet, SpaceError, SpaceEvent,
};

use crate::system::SpaceInner;

/// What a handler can do besides mutating its own actor.
///
/// Handlers may send and create but not `ask`: a handler that blocked on a
/// reply would hold up every other message queued for its actor.
#[derive(Debug)]
pub struct ActorContext {
    self_ref: ActorRef,
    actor_type: String,
    space: Weak<SpaceInner>,
    stopping: bool,
}

impl ActorContext {
    pub(crate) fn new(self_ref: ActorRef, actor_type: String, space: Weak<SpaceInner>) -> Self {
        Self {
            self_ref,
            actor_type,
            space,
            stopping: false,
        }
    }

    pub fn self_ref(&self) -> &ActorRef {
        &self.self_ref
    }

    pub fn actor_type(&self) -> &str {
        &self.actor_type
    }

    pub fn node_address(&self) -> &NodeAddress {
        &self.self_ref.host
    }

    fn space(&self) -> ActorResult<Arc<SpaceInner>> {
        self.space.upgrade().ok_or(SpaceError::Stopped)
    }

    /// Fire-and-forget send with this actor as the sender.
    pub async fn send(&self, dest: &ActorRef, payload: Payload) -> ActorResult<()> {
        let space = self.space()?;
        let envelope = Envelope::new(dest.clone(), payload, Some(self.self_ref.clone()));
        space.router().send(envelope).await;
        Ok(())
    }

    /// Sends `payload` back to the sender of `to`. Anonymous messages get no
    /// reply.
    pub async fn reply(&self, to: &Envelope, payload: Payload) -> ActorResult<()> {
        match &to.sender {
            Some(sender) => self.send(sender, payload).await,
            None => {
                debug!(id = %to.id, "no sender to reply to");
                Ok(())
            }
        }
    }

    /// Creates an actor on a node satisfying `requirements`.
    pub async fn create(
        &self,
        actor_type: &str,
        requirements: RequirementSet,
    ) -> ActorResult<ActorRef> {
        self.space()?.create(actor_type, requirements).await
    }

    /// Stops this actor after the current handler returns.
    pub fn stop(&mut self) {
        self.stopping = true;
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping
    }

    pub fn emit(&self, event: SpaceEvent) {
        if let Some(space) = self.space.upgrade() {
            space.sink().emit(event);
        }
    }

    /// Deregisters the actor once its loop has ended.
    pub(crate) fn finish(&self) {
        if let Some(space) = self.space.upgrade() {
            space.deregister(&self.self_ref);
        }
    }
}
