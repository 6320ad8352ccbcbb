//! Counted ping/pong exchange between a requestor and an on-demand responder.
//!
//! The requestor lives next to the caller (it requires `Client`), creates a
//! responder on a node advertising `Server`, fires a batch of pings at it and
//! tells the caller `Done` once the pongs are (almost) all back.
//!
//! Completion fires when at most [`COMPLETION_THRESHOLD`] pongs are still
//! outstanding, so a batch of N pings completes on the (N-1)th pong. The
//! `Done` token is sent once per requestor.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use convene_api::{
    Actor, ActorRef, ActorResult, BoxedFuture, Envelope, HandlerTable, MessageKind, Payload,
    RequirementSet, SpaceError, SpaceEvent,
};

use crate::context::ActorContext;
use crate::dispatch::ActorCatalog;
use crate::router::AskOutcome;
use crate::system::ActorSpace;

/// Capability a node needs to host an [`EchoResponder`].
pub const SERVER_CAPABILITY: &str = "Server";
/// Capability a node needs to host an [`EchoRequestor`].
pub const CLIENT_CAPABILITY: &str = "Client";

/// Outstanding pong count at which the requestor reports completion.
pub const COMPLETION_THRESHOLD: i64 = 1;

/// Catalog with both echo actors.
pub fn catalog() -> ActorCatalog {
    ActorCatalog::new()
        .with(EchoRequestor::default)
        .with(|| EchoResponder)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EchoPhase {
    #[default]
    Idle,
    Counting,
    Waiting,
    Done,
}

/// Drives one echo run on behalf of a client.
#[derive(Debug, Default)]
pub struct EchoRequestor {
    phase: EchoPhase,
    pings_to_send: i64,
    pongs_to_receive: i64,
    started_at: Option<Instant>,
    client: Option<ActorRef>,
    responder: Option<ActorRef>,
}

impl EchoRequestor {
    pub fn phase(&self) -> EchoPhase {
        self.phase
    }

    pub fn pings_to_send(&self) -> i64 {
        self.pings_to_send
    }

    /// Adds `count` pings to the next batch. Negative counts are refused.
    pub fn queue_pings(&mut self, count: i64) -> bool {
        if count < 0 {
            warn!(count, "ignoring negative ping count");
            return false;
        }
        self.pings_to_send = self.pings_to_send.saturating_add(count);
        if self.phase == EchoPhase::Idle {
            self.phase = EchoPhase::Counting;
        }
        debug!(count, total = self.pings_to_send, "pings queued");
        true
    }

    fn on_count<'a>(
        &'a mut self,
        envelope: Envelope,
        _ctx: &'a mut ActorContext,
    ) -> BoxedFuture<'a, ActorResult<()>> {
        Box::pin(async move {
            if let Payload::Count(count) = envelope.payload {
                self.queue_pings(count);
            }
            Ok(())
        })
    }

    fn on_text<'a>(
        &'a mut self,
        envelope: Envelope,
        ctx: &'a mut ActorContext,
    ) -> BoxedFuture<'a, ActorResult<()>> {
        Box::pin(async move {
            let Payload::Text(payload) = envelope.payload else {
                return Ok(());
            };
            self.client = envelope.sender;

            let responder = ctx
                .create(
                    EchoResponder::TYPE_NAME,
                    RequirementSet::new().require(SERVER_CAPABILITY, true),
                )
                .await?;
            debug!(%responder, count = self.pings_to_send, "sending pings");

            self.started_at = Some(Instant::now());
            for _ in 0..self.pings_to_send {
                ctx.send(&responder, Payload::ping(payload.clone())).await?;
            }
            self.responder = Some(responder);
            self.pongs_to_receive = self.pongs_to_receive.saturating_add(self.pings_to_send);
            self.pings_to_send = 0;
            self.phase = EchoPhase::Waiting;

            if self.pongs_to_receive == 0 {
                self.complete(ctx).await?;
            }
            Ok(())
        })
    }

    fn on_pong<'a>(
        &'a mut self,
        _envelope: Envelope,
        ctx: &'a mut ActorContext,
    ) -> BoxedFuture<'a, ActorResult<()>> {
        Box::pin(async move {
            self.pongs_to_receive = self.pongs_to_receive.saturating_sub(1);
            if self.phase == EchoPhase::Waiting && self.pongs_to_receive <= COMPLETION_THRESHOLD {
                self.complete(ctx).await?;
            }
            Ok(())
        })
    }

    async fn complete(&mut self, ctx: &mut ActorContext) -> ActorResult<()> {
        self.phase = EchoPhase::Done;
        let elapsed = self
            .started_at
            .map(|start| start.elapsed())
            .unwrap_or_default();
        info!(elapsed_ms = elapsed.as_secs_f64() * 1000.0, "got all messages");
        ctx.emit(SpaceEvent::EchoComplete {
            actor: ctx.self_ref().clone(),
            elapsed,
        });

        match &self.client {
            Some(client) => {
                info!(%client, "sending completion");
                ctx.send(client, Payload::Done).await
            }
            None => {
                warn!("echo finished without a client to notify");
                Ok(())
            }
        }
    }
}

impl Actor for EchoRequestor {
    type Context = ActorContext;
    const TYPE_NAME: &'static str = "echo.EchoRequestor";

    fn register_handlers(table: &mut HandlerTable<Self, Self::Context>) {
        table
            .on(MessageKind::Count, EchoRequestor::on_count)
            .on(MessageKind::Text, EchoRequestor::on_text)
            .on(MessageKind::Pong, EchoRequestor::on_pong);
    }
}

/// Answers every ping with a pong carrying the same payload.
#[derive(Debug, Default)]
pub struct EchoResponder;

impl EchoResponder {
    fn on_ping<'a>(
        &'a mut self,
        envelope: Envelope,
        ctx: &'a mut ActorContext,
    ) -> BoxedFuture<'a, ActorResult<()>> {
        Box::pin(async move {
            if let Payload::Ping { payload } = &envelope.payload {
                debug!(sender = ?envelope.sender, "ponging back");
                ctx.reply(&envelope, Payload::pong(payload.clone())).await?;
            }
            Ok(())
        })
    }
}

impl Actor for EchoResponder {
    type Context = ActorContext;
    const TYPE_NAME: &'static str = "echo.EchoResponder";

    fn register_handlers(table: &mut HandlerTable<Self, Self::Context>) {
        table.on(MessageKind::Ping, EchoResponder::on_ping);
    }
}

/// Summary of a finished echo run.
#[derive(Debug, Clone, PartialEq)]
pub struct EchoReport {
    pub elapsed: Duration,
    /// Waits used before `Done` arrived.
    pub attempts: u32,
    /// Replies other than `Done` seen while waiting.
    pub unexpected: u32,
}

/// Runs an echo exchange from the client side with a bounded wait.
#[derive(Debug, Clone)]
pub struct EchoClient {
    space: ActorSpace,
    payload: String,
    wait: Duration,
    max_waits: u32,
}

impl EchoClient {
    pub fn new(space: ActorSpace) -> Self {
        Self {
            space,
            payload: "hello world".to_string(),
            wait: Duration::from_secs(10),
            max_waits: 3,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Each wait lasts `wait`; the run gives up after `max_waits` of them.
    pub fn with_wait(mut self, wait: Duration, max_waits: u32) -> Self {
        self.wait = wait;
        self.max_waits = max_waits.max(1);
        self
    }

    pub async fn run(&self, count: i64) -> ActorResult<EchoReport> {
        let requestor = self
            .space
            .create(
                EchoRequestor::TYPE_NAME,
                RequirementSet::new().require_present(CLIENT_CAPABILITY),
            )
            .await?;
        self.space.tell(&requestor, Payload::Count(count)).await;

        let inbox = self.space.open_inbox();
        let started = Instant::now();
        self.space
            .send(
                &requestor,
                Payload::Text(self.payload.clone()),
                Some(inbox.actor_ref().clone()),
            )
            .await;

        let mut unexpected = 0;
        for attempt in 1..=self.max_waits {
            match inbox.recv(self.wait).await {
                AskOutcome::Reply(envelope) if envelope.payload == Payload::Done => {
                    let elapsed = started.elapsed();
                    info!(elapsed_ms = elapsed.as_secs_f64() * 1000.0, attempt, "echo done");
                    self.space.stop_actor(&requestor);
                    return Ok(EchoReport {
                        elapsed,
                        attempts: attempt,
                        unexpected,
                    });
                }
                AskOutcome::Reply(envelope) => {
                    warn!(kind = %envelope.kind(), "unexpected reply while waiting for Done");
                    unexpected += 1;
                }
                AskOutcome::TimedOut(after) => {
                    debug!(attempt, ?after, "still waiting for Done");
                }
                AskOutcome::Closed => return Err(SpaceError::Stopped),
            }
        }
        Err(SpaceError::Timeout(self.wait * self.max_waits))
    }
}
