use std::collections::HashMap;
use std::fmt;

use crate::message::{Envelope, MessageKind};
use crate::types::{ActorResult, BoxedFuture};

/// Handler for one message kind.
///
/// Handlers are plain function pointers so that a table can be built once per
/// actor type and consulted without allocation for every delivery.
pub type Handler<A, C> =
    for<'a> fn(&'a mut A, Envelope, &'a mut C) -> BoxedFuture<'a, ActorResult<()>>;

/// Message kind to handler mapping of one actor type.
pub struct HandlerTable<A, C> {
    handlers: HashMap<MessageKind, Handler<A, C>>,
}

impl<A, C> HandlerTable<A, C> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers `handler` for `kind`, replacing any previous one.
    pub fn on(&mut self, kind: MessageKind, handler: Handler<A, C>) -> &mut Self {
        self.handlers.insert(kind, handler);
        self
    }

    pub fn get(&self, kind: MessageKind) -> Option<Handler<A, C>> {
        self.handlers.get(&kind).copied()
    }

    pub fn handles(&self, kind: MessageKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = MessageKind> + '_ {
        self.handlers.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<A, C> Default for HandlerTable<A, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, C> fmt::Debug for HandlerTable<A, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerTable")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Core Actor trait
///
/// An actor declares which message kinds it accepts by filling a
/// [`HandlerTable`]. Deliveries of any other kind are dropped by the dispatch
/// loop without reaching the actor.
pub trait Actor: Send + Sized + 'static {
    /// Context handed to every handler and lifecycle hook.
    type Context: Send;

    /// Name used to request this actor type from a remote node.
    const TYPE_NAME: &'static str;

    fn register_handlers(table: &mut HandlerTable<Self, Self::Context>);

    /// Runs once before the first message is dispatched.
    fn started<'a>(&'a mut self, _ctx: &'a mut Self::Context) -> BoxedFuture<'a, ActorResult<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Runs once after the last message.
    fn stopped<'a>(&'a mut self, _ctx: &'a mut Self::Context) -> BoxedFuture<'a, ActorResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
