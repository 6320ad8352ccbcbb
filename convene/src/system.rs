//! The actor-space node.
//!
//! An [`ActorSpace`] is one node of a convention: it owns the capability
//! registry, the membership view, the actor directory and the router, and it
//! runs one task draining frames from its transport. Several nodes can live
//! in one process; nothing here is global.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future;
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn, Instrument};
use uuid::Uuid;

use convene_api::{
    ActorRef, ActorResult, Capabilities, Envelope, EventSink, NodeAddress, NodeAnnouncement,
    Payload, RequirementSet, SpaceError, SpaceEvent,
};

use crate::config::NodeConfig;
use crate::context::ActorContext;
use crate::directory::{select_host, ActorDirectory};
use crate::dispatch::ActorCatalog;
use crate::mailbox;
use crate::membership::{Convention, ConventionState, MembershipUpdate};
use crate::node_span;
use crate::registry::CapabilityRegistry;
use crate::router::{AskOutcome, Inbox, MessageRouter};
use crate::sink::TracingSink;
use crate::transport::{Inbound, TcpTransport, Transport};
use crate::wire::{Frame, FrameBody, SpawnOutcome};

/// Configures and starts an [`ActorSpace`].
pub struct SpaceBuilder {
    config: NodeConfig,
    catalog: ActorCatalog,
    sink: Option<Arc<dyn EventSink>>,
    transport: Option<(Arc<dyn Transport>, Inbound)>,
}

impl SpaceBuilder {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            catalog: ActorCatalog::new(),
            sink: None,
            transport: None,
        }
    }

    /// Actor types this node can host.
    pub fn catalog(mut self, catalog: ActorCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Replaces the default [`TracingSink`].
    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Uses an already bound transport instead of listening on TCP.
    pub fn transport(mut self, transport: Arc<dyn Transport>, inbound: Inbound) -> Self {
        self.transport = Some((transport, inbound));
        self
    }

    /// Starts the node and, for a joiner, waits until the leader has
    /// acknowledged it.
    pub async fn start(self) -> Result<ActorSpace, SpaceError> {
        let SpaceBuilder {
            config,
            catalog,
            sink,
            transport,
        } = self;

        let (transport, inbound) = match transport {
            Some(bound) => bound,
            None => {
                let (tcp, inbound) = TcpTransport::bind(&config.address)
                    .await
                    .map_err(|err| SpaceError::Transport(err.to_string()))?;
                let tcp: Arc<dyn Transport> = tcp;
                (tcp, inbound)
            }
        };
        let address = transport.local_address();
        let sink = sink.unwrap_or_else(|| Arc::new(TracingSink::new(address.clone())));

        let announcement = NodeAnnouncement::new(address.clone(), config.capabilities.clone());
        let mut registry = CapabilityRegistry::new();
        registry.advertise(&address, &config.capabilities);
        let registry = Arc::new(RwLock::new(registry));
        let convention = Arc::new(RwLock::new(Convention::new(
            announcement,
            config.leader.clone(),
        )));
        let directory = Arc::new(RwLock::new(ActorDirectory::new()));
        let router = MessageRouter::new(
            address.clone(),
            directory.clone(),
            convention.clone(),
            registry.clone(),
            transport.clone(),
            sink.clone(),
        );

        let inner = Arc::new(SpaceInner {
            address: address.clone(),
            config,
            registry,
            convention,
            directory,
            router,
            catalog,
            transport,
            sink,
            pending_spawns: Mutex::new(HashMap::new()),
            join_waiter: Mutex::new(None),
            frame_task: Mutex::new(None),
            stopped: AtomicBool::new(false),
        });

        let task = tokio::spawn(
            frame_loop(Arc::downgrade(&inner), inbound).instrument(node_span!(address)),
        );
        *inner.frame_task.lock() = Some(task);

        if let Some(leader) = inner.config.leader.clone() {
            if let Err(err) = inner.join(&leader).await {
                inner.teardown().await;
                return Err(err);
            }
        }

        info!(node = %address, leader = inner.is_leader(), "actor space started");
        Ok(ActorSpace { inner })
    }
}

/// Handle to a running node. Cheap to clone.
#[derive(Clone)]
pub struct ActorSpace {
    inner: Arc<SpaceInner>,
}

impl ActorSpace {
    pub fn builder(config: NodeConfig) -> SpaceBuilder {
        SpaceBuilder::new(config)
    }

    pub fn address(&self) -> &NodeAddress {
        &self.inner.address
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.inner.config.capabilities
    }

    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    /// Creates an actor of `actor_type` on a node satisfying `requirements`.
    pub async fn create(
        &self,
        actor_type: &str,
        requirements: RequirementSet,
    ) -> ActorResult<ActorRef> {
        self.inner.create(actor_type, requirements).await
    }

    /// Anonymous fire-and-forget send.
    pub async fn tell(&self, dest: &ActorRef, payload: Payload) {
        self.send(dest, payload, None).await;
    }

    pub async fn send(&self, dest: &ActorRef, payload: Payload, sender: Option<ActorRef>) {
        if self.inner.is_stopped() {
            debug!(%dest, "space stopped, dropping send");
            return;
        }
        self.inner
            .router
            .send(Envelope::new(dest.clone(), payload, sender))
            .await;
    }

    /// Sends `payload` and waits for the first reply.
    ///
    /// `timeout` defaults to the configured ask timeout.
    pub async fn ask(
        &self,
        dest: &ActorRef,
        payload: Payload,
        timeout: Option<Duration>,
    ) -> AskOutcome {
        if self.inner.is_stopped() {
            return AskOutcome::Closed;
        }
        let timeout = timeout.unwrap_or(self.inner.config.default_ask_timeout);
        self.inner.router.ask(dest, payload, timeout).await
    }

    /// A reply inbox for callers that wait on several replies.
    pub fn open_inbox(&self) -> Inbox {
        self.inner.router.open_inbox()
    }

    /// Host of a known actor.
    pub fn lookup(&self, actor: &ActorRef) -> Option<NodeAddress> {
        self.inner.directory.read().lookup(actor)
    }

    /// Current peers in discovery order, without this node.
    pub fn members(&self) -> Vec<NodeAnnouncement> {
        self.inner.convention.read().view().members().to_vec()
    }

    pub fn state(&self) -> ConventionState {
        self.inner.convention.read().state()
    }

    pub fn is_leader(&self) -> bool {
        self.inner.is_leader()
    }

    /// Whether `node` is known and satisfies `requirements`.
    pub fn satisfies(&self, node: &NodeAddress, requirements: &RequirementSet) -> bool {
        self.inner.registry.read().satisfies(node, requirements)
    }

    /// Asks a local actor to stop after the messages already queued.
    pub fn stop_actor(&self, actor: &ActorRef) -> bool {
        let mailbox = self.inner.directory.read().local_mailbox(actor);
        mailbox.is_some_and(|m| m.stop().is_ok())
    }

    /// Leaves the convention and stops every local actor.
    pub async fn shutdown(&self) {
        self.inner.shutdown().await;
    }
}

impl fmt::Debug for ActorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorSpace")
            .field("address", &self.inner.address)
            .field("leader", &self.inner.config.leader)
            .finish()
    }
}

pub(crate) struct SpaceInner {
    address: NodeAddress,
    config: NodeConfig,
    registry: Arc<RwLock<CapabilityRegistry>>,
    convention: Arc<RwLock<Convention>>,
    directory: Arc<RwLock<ActorDirectory>>,
    router: MessageRouter,
    catalog: ActorCatalog,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn EventSink>,
    pending_spawns: Mutex<HashMap<Uuid, oneshot::Sender<SpawnOutcome>>>,
    join_waiter: Mutex<Option<oneshot::Sender<()>>>,
    frame_task: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl SpaceInner {
    pub(crate) fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub(crate) fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    fn is_leader(&self) -> bool {
        self.config.leader.is_none()
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    async fn join(&self, leader: &NodeAddress) -> ActorResult<()> {
        let policy = self.config.join_policy.clone();
        let attempts = policy.max_attempts.max(1);
        let mut backoff = policy.backoff();

        for attempt in 1..=attempts {
            let (tx, rx) = oneshot::channel();
            *self.join_waiter.lock() = Some(tx);

            let request = self.convention.read().join_request();
            let Some((to, body)) = request else {
                return Ok(());
            };
            let acked = match self
                .transport
                .transmit(&to, Frame::new(self.address.clone(), body))
                .await
            {
                Ok(()) => matches!(tokio::time::timeout(policy.ack_timeout, rx).await, Ok(Ok(()))),
                Err(err) => {
                    debug!(%leader, attempt, error = %err, "join announcement not delivered");
                    false
                }
            };
            if acked {
                info!(%leader, attempt, "joined convention");
                return Ok(());
            }

            self.sink.emit(SpaceEvent::JoinTimeout {
                leader: leader.clone(),
                attempt,
            });
            if attempt < attempts {
                if let Some(delay) = backoff.next() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        self.join_waiter.lock().take();
        Err(SpaceError::ConventionUnreachable {
            leader: leader.clone(),
            attempts,
        })
    }

    pub(crate) async fn create(
        self: &Arc<Self>,
        actor_type: &str,
        requirements: RequirementSet,
    ) -> ActorResult<ActorRef> {
        if self.is_stopped() {
            return Err(SpaceError::Stopped);
        }
        // Hosts that turned down the spawn because they lack the capabilities.
        let mut refused = HashSet::new();
        loop {
            let host = {
                let convention = self.convention.read();
                let registry = self.registry.read();
                select_host(
                    &self.address,
                    convention
                        .view()
                        .addresses()
                        .filter(|address| !refused.contains(*address)),
                    &registry,
                    &requirements,
                )?
            };
            if host == self.address {
                return self.instantiate(actor_type);
            }
            let result = self.spawn_remote(&host, actor_type, &requirements).await;
            match result {
                Err(SpaceError::HostUnreachable(gone)) => {
                    // Retry placement without the vanished host.
                    self.router.prune_host(&gone);
                }
                Err(SpaceError::SpawnRejected { host, reason })
                    if !self.satisfies(&host, &requirements) =>
                {
                    debug!(%host, %reason, "host no longer capable, trying the next one");
                    refused.insert(host);
                }
                result => return result,
            }
        }
    }

    fn satisfies(&self, node: &NodeAddress, requirements: &RequirementSet) -> bool {
        self.registry.read().satisfies(node, requirements)
    }

    fn instantiate(self: &Arc<Self>, actor_type: &str) -> ActorResult<ActorRef> {
        let actor = ActorRef::new(self.address.clone());
        let (sender, mailbox) = mailbox::channel();
        self.directory
            .write()
            .register_local(actor.clone(), actor_type, sender);

        let ctx = ActorContext::new(actor.clone(), actor_type.to_string(), Arc::downgrade(self));
        if self.catalog.launch(actor_type, ctx, mailbox).is_none() {
            self.directory.write().remove(&actor);
            return Err(SpaceError::UnknownActorType(actor_type.to_string()));
        }

        self.sink.emit(SpaceEvent::ActorCreated {
            actor: actor.clone(),
            actor_type: actor_type.to_string(),
            host: self.address.clone(),
        });
        Ok(actor)
    }

    async fn spawn_remote(
        &self,
        host: &NodeAddress,
        actor_type: &str,
        requirements: &RequirementSet,
    ) -> ActorResult<ActorRef> {
        let request_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.pending_spawns.lock().insert(request_id, tx);

        let frame = Frame::new(
            self.address.clone(),
            FrameBody::Spawn {
                request_id,
                actor_type: actor_type.to_string(),
                requirements: requirements.clone(),
            },
        );
        if let Err(err) = self.transport.transmit(host, frame).await {
            self.pending_spawns.lock().remove(&request_id);
            debug!(%host, error = %err, "spawn request not delivered");
            if err.is_peer_failure() {
                return Err(SpaceError::HostUnreachable(host.clone()));
            }
            return Err(SpaceError::Transport(err.to_string()));
        }

        match tokio::time::timeout(self.config.spawn_timeout, rx).await {
            Ok(Ok(SpawnOutcome::Created(actor))) => {
                self.directory.write().register_remote(actor.clone());
                self.sink.emit(SpaceEvent::ActorCreated {
                    actor: actor.clone(),
                    actor_type: actor_type.to_string(),
                    host: host.clone(),
                });
                Ok(actor)
            }
            Ok(Ok(SpawnOutcome::Unsatisfied(capabilities))) => {
                // Our view of the host was stale; adopt what it reports.
                self.registry.write().replace(host, &capabilities);
                Err(SpaceError::SpawnRejected {
                    host: host.clone(),
                    reason: format!("{} does not satisfy {}", host, requirements),
                })
            }
            Ok(Ok(SpawnOutcome::Rejected(reason))) => Err(SpaceError::SpawnRejected {
                host: host.clone(),
                reason,
            }),
            Ok(Err(_)) => Err(SpaceError::Stopped),
            Err(_) => {
                self.pending_spawns.lock().remove(&request_id);
                Err(SpaceError::Timeout(self.config.spawn_timeout))
            }
        }
    }

    /// Instantiates an actor requested by another node.
    fn serve_spawn(self: &Arc<Self>, actor_type: &str, requirements: &RequirementSet) -> SpawnOutcome {
        if self.is_stopped() {
            return SpawnOutcome::Rejected(SpaceError::Stopped.to_string());
        }
        if !self.satisfies(&self.address, requirements) {
            return SpawnOutcome::Unsatisfied(self.config.capabilities.clone());
        }
        match self.instantiate(actor_type) {
            Ok(actor) => SpawnOutcome::Created(actor),
            Err(err) => SpawnOutcome::Rejected(err.to_string()),
        }
    }

    async fn handle_frame(self: &Arc<Self>, frame: Frame) {
        let from = frame.from;
        match frame.body {
            FrameBody::Join { announcement } => {
                let update = self.convention.write().on_join(announcement);
                self.apply(update).await;
            }
            FrameBody::JoinAck { leader, members } => {
                let update = self.convention.write().on_join_ack(leader, members);
                self.apply(update).await;
                let waiter = self.join_waiter.lock().take();
                if let Some(waiter) = waiter {
                    let _ = waiter.send(());
                }
            }
            FrameBody::MemberJoined { announcement } => {
                let update = self.convention.write().on_member_joined(announcement);
                self.apply(update).await;
            }
            FrameBody::MemberLeft { address } => {
                let update = self.convention.write().on_member_left(&address);
                self.apply(update).await;
            }
            FrameBody::Spawn {
                request_id,
                actor_type,
                requirements,
            } => {
                let outcome = self.serve_spawn(&actor_type, &requirements);
                self.send_frame(&from, FrameBody::Spawned { request_id, outcome })
                    .await;
            }
            FrameBody::Spawned {
                request_id,
                outcome,
            } => {
                let waiter = self.pending_spawns.lock().remove(&request_id);
                let unclaimed = match waiter {
                    Some(waiter) => waiter.send(outcome).err(),
                    None => Some(outcome),
                };
                if let Some(outcome) = unclaimed {
                    debug!(%from, %request_id, "late spawn response");
                    if let SpawnOutcome::Created(actor) = outcome {
                        // Nobody holds a reference to it; stop it on its host.
                        self.send_frame(&from, FrameBody::StopActor { actor }).await;
                    }
                }
            }
            FrameBody::Deliver { envelope } => self.router.deliver_inbound(envelope),
            FrameBody::StopActor { actor } => {
                let mailbox = self.directory.read().local_mailbox(&actor);
                match mailbox {
                    Some(mailbox) => {
                        let _ = mailbox.stop();
                    }
                    None => debug!(%from, %actor, "stop for unknown actor"),
                }
            }
        }
    }

    /// Applies a membership change to the registry and directory, then sends
    /// the frames it produced.
    async fn apply(&self, update: MembershipUpdate) {
        {
            let mut registry = self.registry.write();
            for member in update.joined.iter().chain(update.refreshed.iter()) {
                registry.replace(&member.address, &member.capabilities);
            }
            for address in &update.left {
                registry.forget(address);
            }
        }

        for member in &update.joined {
            self.sink.emit(SpaceEvent::MemberJoined {
                address: member.address.clone(),
            });
        }
        for address in &update.left {
            self.directory.write().remove_host(address);
            self.sink.emit(SpaceEvent::MemberLeft {
                address: address.clone(),
            });
        }

        // Each frame goes to a different peer; one slow peer must not hold
        // up the others.
        let sends = update
            .frames
            .into_iter()
            .map(|(to, body)| async move { self.send_frame(&to, body).await });
        future::join_all(sends).await;
    }

    async fn send_frame(&self, to: &NodeAddress, body: FrameBody) {
        let kind = body.name();
        if let Err(err) = self
            .transport
            .transmit(to, Frame::new(self.address.clone(), body))
            .await
        {
            warn!(%to, kind, error = %err, "frame not delivered");
            if err.is_peer_failure() {
                self.router.prune_host(to);
            }
        }
    }

    /// Removes a stopped actor.
    pub(crate) fn deregister(&self, actor: &ActorRef) {
        let removed = self.directory.write().remove(actor);
        if removed.is_some() {
            self.sink.emit(SpaceEvent::ActorStopped {
                actor: actor.clone(),
            });
        }
    }

    async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let update = self.convention.write().leave();
        let notices = update.frames.into_iter().map(|(to, body)| async move {
            let frame = Frame::new(self.address.clone(), body);
            if let Err(err) = self.transport.transmit(&to, frame).await {
                debug!(%to, error = %err, "leave notice not delivered");
            }
        });
        future::join_all(notices).await;

        let locals = self.directory.read().local_mailboxes();
        for (_, mailbox) in locals {
            let _ = mailbox.stop();
        }
        self.teardown().await;
        info!(node = %self.address, "actor space stopped");
    }

    async fn teardown(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.transport.close().await;
        let task = self.frame_task.lock().take();
        if let Some(task) = task {
            task.abort();
        }
        self.pending_spawns.lock().clear();
    }
}

async fn frame_loop(space: Weak<SpaceInner>, inbound: Inbound) {
    while let Ok(frame) = inbound.recv_async().await {
        let Some(node) = space.upgrade() else {
            break;
        };
        trace!(from = %frame.from, kind = frame.body.name(), "frame");
        node.handle_frame(frame).await;
    }
}
