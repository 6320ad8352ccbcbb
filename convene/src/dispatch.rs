use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn, Instrument};

use convene_api::{Actor, DropReason, HandlerTable, SpaceEvent};

use crate::actor_span;
use crate::context::ActorContext;
use crate::mailbox::{Delivery, Mailbox};

type Launcher = Arc<dyn Fn(ActorContext, Mailbox) -> JoinHandle<()> + Send + Sync>;

/// Actor types a node can instantiate, by [`Actor::TYPE_NAME`].
///
/// Remote nodes ask for actors by name, so every node that may host an actor
/// type needs it in its catalog.
#[derive(Clone, Default)]
pub struct ActorCatalog {
    launchers: HashMap<String, Launcher>,
}

impl ActorCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds actor type `A`, built by `factory` for every new instance.
    pub fn register<A, F>(&mut self, factory: F) -> &mut Self
    where
        A: Actor<Context = ActorContext>,
        F: Fn() -> A + Send + Sync + 'static,
    {
        let mut table = HandlerTable::new();
        A::register_handlers(&mut table);
        let table = Arc::new(table);

        let launcher: Launcher = Arc::new(move |ctx: ActorContext, mailbox: Mailbox| {
            tokio::spawn(run_cell(factory(), table.clone(), ctx, mailbox))
        });
        self.launchers.insert(A::TYPE_NAME.to_string(), launcher);
        self
    }

    /// Builder form of [`ActorCatalog::register`].
    pub fn with<A, F>(mut self, factory: F) -> Self
    where
        A: Actor<Context = ActorContext>,
        F: Fn() -> A + Send + Sync + 'static,
    {
        self.register::<A, F>(factory);
        self
    }

    pub fn contains(&self, actor_type: &str) -> bool {
        self.launchers.contains_key(actor_type)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.launchers.keys().map(String::as_str)
    }

    /// Starts the dispatch loop of a new `actor_type` instance.
    pub(crate) fn launch(
        &self,
        actor_type: &str,
        ctx: ActorContext,
        mailbox: Mailbox,
    ) -> Option<JoinHandle<()>> {
        self.launchers
            .get(actor_type)
            .map(|launch| launch(ctx, mailbox))
    }
}

impl fmt::Debug for ActorCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorCatalog")
            .field("types", &self.launchers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Dispatch loop of one actor instance.
///
/// Handles one delivery at a time, in arrival order, until the actor stops
/// itself, receives `Stop`, a handler panics, or every sender is gone.
async fn run_cell<A>(
    mut actor: A,
    table: Arc<HandlerTable<A, ActorContext>>,
    mut ctx: ActorContext,
    mailbox: Mailbox,
) where
    A: Actor<Context = ActorContext>,
{
    let span = actor_span!(A::TYPE_NAME, ctx.self_ref());
    async move {
        if let Err(err) = actor.started(&mut ctx).await {
            warn!(error = %err, "started hook failed, stopping");
            ctx.stop();
        }

        while !ctx.is_stopping() {
            let Some(delivery) = mailbox.pop().await else {
                break;
            };
            let envelope = match delivery {
                Delivery::Message(envelope) => envelope,
                Delivery::Stop => break,
            };

            let kind = envelope.kind();
            let Some(handler) = table.get(kind) else {
                warn!(%kind, "no handler, dropping message");
                ctx.emit(SpaceEvent::MessageDropped {
                    dest: envelope.dest,
                    kind,
                    reason: DropReason::UnhandledMessageType,
                });
                continue;
            };

            debug!(%kind, id = %envelope.id, "dispatch");
            match AssertUnwindSafe(handler(&mut actor, envelope, &mut ctx))
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(%kind, error = %err, "handler failed"),
                Err(_) => {
                    // State may be half-updated; stop so the actor is deregistered.
                    error!(%kind, "handler panicked, stopping");
                    break;
                }
            }
        }

        if let Err(err) = actor.stopped(&mut ctx).await {
            warn!(error = %err, "stopped hook failed");
        }
        ctx.finish();
    }
    .instrument(span)
    .await
}
