use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};

use convene::convene_api::{
    Actor, ActorRef, Capabilities, DropReason, NodeAddress, NodeAnnouncement, Payload,
    RequirementSet, SpaceError, SpaceEvent,
};
use convene::echo::{self, EchoResponder, CLIENT_CAPABILITY, SERVER_CAPABILITY};
use convene::transport::{Inbound, MemoryTransport};
use convene::wire::{Frame, FrameBody, SpawnOutcome};
use convene::{ActorCatalog, MemoryNetwork, NodeConfig, Transport};

use test_helpers::{addr, start_joiner, start_leader, start_node, wait_until};

fn server() -> Capabilities {
    Capabilities::new().with(SERVER_CAPABILITY, true)
}

fn client() -> Capabilities {
    Capabilities::new().with(CLIENT_CAPABILITY, true)
}

fn needs_server() -> RequirementSet {
    RequirementSet::new().require(SERVER_CAPABILITY, true)
}

/// A convention member whose frames the test sends and reads itself.
struct ScriptedNode {
    address: NodeAddress,
    transport: Arc<MemoryTransport>,
    inbound: Inbound,
}

impl ScriptedNode {
    async fn join(
        network: &MemoryNetwork,
        host: &str,
        leader: &NodeAddress,
        capabilities: Capabilities,
    ) -> Result<Self> {
        let address = addr(host);
        let (transport, inbound) = network.bind(address.clone())?;
        let node = ScriptedNode {
            address,
            transport,
            inbound,
        };
        let announcement = NodeAnnouncement::new(node.address.clone(), capabilities);
        node.send(leader, FrameBody::Join { announcement }).await?;
        node.expect(|body| matches!(body, FrameBody::JoinAck { .. }))
            .await?;
        Ok(node)
    }

    async fn send(&self, to: &NodeAddress, body: FrameBody) -> Result<()> {
        let frame = Frame::new(self.address.clone(), body);
        self.transport.transmit(to, frame).await?;
        Ok(())
    }

    /// Next frame body matching `pred`, skipping the others.
    async fn expect(&self, pred: impl Fn(&FrameBody) -> bool) -> Result<FrameBody> {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(2), self.inbound.recv_async())
                .await
                .map_err(|_| anyhow!("no matching frame within 2s"))??;
            if pred(&frame.body) {
                return Ok(frame.body);
            }
        }
    }
}

#[tokio::test]
async fn test_create_places_actor_on_capable_leader() -> Result<()> {
    let network = MemoryNetwork::new();
    let a = start_leader(&network, "node-a", server(), echo::catalog()).await?;
    let b = start_joiner(&network, "node-b", a.address(), client(), echo::catalog()).await?;

    let responder = b.space.create(EchoResponder::TYPE_NAME, needs_server()).await?;

    assert_eq!(&responder.host, a.address());
    assert_eq!(b.space.lookup(&responder).as_ref(), Some(a.address()));
    assert!(wait_until(|| a.sink.named("actor-created") == 1).await);
    assert_eq!(
        b.sink.count(|e| matches!(
            e,
            SpaceEvent::ActorCreated { host, .. } if host == a.address()
        )),
        1
    );

    // The placed actor answers through the router.
    let reply = b
        .space
        .ask(&responder, Payload::ping("placed"), None)
        .await
        .into_result()?;
    assert_eq!(reply.payload, Payload::pong("placed"));

    b.space.shutdown().await;
    a.space.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_create_prefers_local_node() -> Result<()> {
    let network = MemoryNetwork::new();
    let a = start_leader(&network, "node-a", server(), echo::catalog()).await?;
    let b = start_joiner(&network, "node-b", a.address(), server(), echo::catalog()).await?;

    let responder = b.space.create(EchoResponder::TYPE_NAME, needs_server()).await?;
    assert_eq!(&responder.host, b.address());
    assert_eq!(a.sink.named("actor-created"), 0);

    b.space.shutdown().await;
    a.space.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_create_without_capable_host_fails() -> Result<()> {
    let network = MemoryNetwork::new();
    let a = start_leader(&network, "node-a", client(), echo::catalog()).await?;
    let b = start_joiner(&network, "node-b", a.address(), client(), echo::catalog()).await?;

    let result = b.space.create(EchoResponder::TYPE_NAME, needs_server()).await;
    match result {
        Err(SpaceError::NoCapableHost { requirements }) => {
            assert_eq!(requirements, needs_server());
        }
        other => panic!("expected NoCapableHost, got {:?}", other),
    }
    assert_eq!(b.sink.named("actor-created"), 0);

    b.space.shutdown().await;
    a.space.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_unknown_actor_type_is_rejected() -> Result<()> {
    let network = MemoryNetwork::new();
    let a = start_leader(&network, "node-a", server(), ActorCatalog::new()).await?;
    let b = start_joiner(&network, "node-b", a.address(), client(), echo::catalog()).await?;

    // Local placement with an empty catalog.
    let local = a.space.create("no.SuchActor", RequirementSet::new()).await;
    assert!(matches!(local, Err(SpaceError::UnknownActorType(name)) if name == "no.SuchActor"));

    // Remote placement on a node that does not know the type.
    let remote = b.space.create(EchoResponder::TYPE_NAME, needs_server()).await;
    match remote {
        Err(SpaceError::SpawnRejected { host, reason }) => {
            assert_eq!(&host, a.address());
            assert!(reason.contains(EchoResponder::TYPE_NAME));
        }
        other => panic!("expected SpawnRejected, got {:?}", other),
    }

    b.space.shutdown().await;
    a.space.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_unreachable_host_is_pruned() -> Result<()> {
    let network = MemoryNetwork::new();
    let a = start_leader(&network, "node-a", client(), echo::catalog()).await?;
    let b = start_joiner(&network, "node-b", a.address(), server(), echo::catalog()).await?;
    assert!(wait_until(|| a.space.satisfies(b.address(), &needs_server())).await);

    let responder = a.space.create(EchoResponder::TYPE_NAME, needs_server()).await?;
    assert_eq!(&responder.host, b.address());

    network.disconnect(b.address());
    a.space.tell(&responder, Payload::ping("lost")).await;

    assert_eq!(
        a.sink.count(|e| matches!(
            e,
            SpaceEvent::MessageDropped { reason: DropReason::HostUnreachable, .. }
        )),
        1
    );
    assert_eq!(
        a.sink.count(|e| matches!(e, SpaceEvent::MemberLeft { address } if address == b.address())),
        1
    );
    assert!(a.space.members().is_empty());
    assert!(a.space.lookup(&responder).is_none());
    assert!(!a.space.satisfies(b.address(), &needs_server()));

    let again = a.space.create(EchoResponder::TYPE_NAME, needs_server()).await;
    assert!(matches!(again, Err(SpaceError::NoCapableHost { .. })));

    a.space.shutdown().await;
    b.space.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_create_after_shutdown_fails() -> Result<()> {
    let network = MemoryNetwork::new();
    let a = start_leader(&network, "node-a", server(), echo::catalog()).await?;
    a.space.shutdown().await;

    let result = a.space.create(EchoResponder::TYPE_NAME, needs_server()).await;
    assert!(matches!(result, Err(SpaceError::Stopped)));
    assert!(!network.is_attached(a.address()));
    Ok(())
}

#[tokio::test]
async fn test_restarted_node_loses_dropped_capabilities() -> Result<()> {
    let network = MemoryNetwork::new();
    let a = start_leader(&network, "node-a", client(), echo::catalog()).await?;
    let b = start_joiner(&network, "node-b", a.address(), server(), echo::catalog()).await?;
    let c = start_joiner(&network, "node-c", a.address(), server(), echo::catalog()).await?;
    assert!(wait_until(|| a.space.satisfies(b.address(), &needs_server())).await);

    // B crashes without leaving and comes back without `Server`.
    network.disconnect(b.address());
    drop(b);
    let b = start_joiner(&network, "node-b", a.address(), client(), echo::catalog()).await?;

    assert!(!a.space.satisfies(b.address(), &needs_server()));
    assert_eq!(
        a.member_addresses(),
        vec![b.address().clone(), c.address().clone()]
    );

    let responder = a.space.create(EchoResponder::TYPE_NAME, needs_server()).await?;
    assert_eq!(&responder.host, c.address());

    c.space.shutdown().await;
    b.space.shutdown().await;
    a.space.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_stale_capabilities_fall_through_to_next_host() -> Result<()> {
    let network = MemoryNetwork::new();
    let a = start_leader(&network, "node-a", client(), echo::catalog()).await?;
    let stale = ScriptedNode::join(&network, "node-s", a.address(), server()).await?;
    let c = start_joiner(&network, "node-c", a.address(), server(), echo::catalog()).await?;

    let requester = a.space.clone();
    let creating = tokio::spawn(async move {
        requester.create(EchoResponder::TYPE_NAME, needs_server()).await
    });

    // The first capable member in view answers that it cannot host.
    let body = stale
        .expect(|body| matches!(body, FrameBody::Spawn { .. }))
        .await?;
    let FrameBody::Spawn { request_id, .. } = body else {
        unreachable!("filtered above");
    };
    stale
        .send(
            a.address(),
            FrameBody::Spawned {
                request_id,
                outcome: SpawnOutcome::Unsatisfied(client()),
            },
        )
        .await?;

    let responder = creating.await??;
    assert_eq!(&responder.host, c.address());
    assert!(!a.space.satisfies(&stale.address, &needs_server()));

    c.space.shutdown().await;
    a.space.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_create_retries_after_unreachable_host() -> Result<()> {
    let network = MemoryNetwork::new();
    let a = start_leader(&network, "node-a", client(), echo::catalog()).await?;
    let b = start_joiner(&network, "node-b", a.address(), server(), echo::catalog()).await?;
    let c = start_joiner(&network, "node-c", a.address(), server(), echo::catalog()).await?;
    assert_eq!(
        a.member_addresses(),
        vec![b.address().clone(), c.address().clone()]
    );

    network.disconnect(b.address());
    let responder = a.space.create(EchoResponder::TYPE_NAME, needs_server()).await?;

    assert_eq!(&responder.host, c.address());
    assert_eq!(a.member_addresses(), vec![c.address().clone()]);
    assert_eq!(
        a.sink.count(|e| matches!(e, SpaceEvent::MemberLeft { address } if address == b.address())),
        1
    );

    c.space.shutdown().await;
    a.space.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_spawn_timeout_and_late_actor_is_stopped() -> Result<()> {
    let network = MemoryNetwork::new();
    let config = NodeConfig::leader(addr("node-a"), client())
        .with_spawn_timeout(Duration::from_millis(200));
    let a = start_node(&network, config, echo::catalog()).await?;
    let slow = ScriptedNode::join(&network, "node-s", a.address(), server()).await?;

    let requester = a.space.clone();
    let creating = tokio::spawn(async move {
        requester.create(EchoResponder::TYPE_NAME, needs_server()).await
    });
    let body = slow
        .expect(|body| matches!(body, FrameBody::Spawn { .. }))
        .await?;
    let FrameBody::Spawn { request_id, .. } = body else {
        unreachable!("filtered above");
    };

    match creating.await? {
        Err(SpaceError::Timeout(after)) => assert_eq!(after, Duration::from_millis(200)),
        other => panic!("expected a spawn timeout, got {:?}", other),
    }
    // A timeout does not make the host a non-member.
    assert_eq!(a.member_addresses(), vec![slow.address.clone()]);

    // The actor created after the requester gave up gets stopped.
    let orphan = ActorRef::new(slow.address.clone());
    slow.send(
        a.address(),
        FrameBody::Spawned {
            request_id,
            outcome: SpawnOutcome::Created(orphan.clone()),
        },
    )
    .await?;
    let body = slow
        .expect(|body| matches!(body, FrameBody::StopActor { .. }))
        .await?;
    assert_eq!(body, FrameBody::StopActor { actor: orphan.clone() });
    assert!(a.space.lookup(&orphan).is_none());

    a.space.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_stop_frame_stops_local_actor() -> Result<()> {
    let network = MemoryNetwork::new();
    let a = start_leader(&network, "node-a", server(), echo::catalog()).await?;
    let peer = ScriptedNode::join(&network, "node-p", a.address(), client()).await?;
    let responder = a.space.create(EchoResponder::TYPE_NAME, needs_server()).await?;

    peer.send(
        a.address(),
        FrameBody::StopActor {
            actor: responder.clone(),
        },
    )
    .await?;

    assert!(wait_until(|| a.sink.named("actor-stopped") == 1).await);
    assert!(a.space.lookup(&responder).is_none());

    a.space.shutdown().await;
    Ok(())
}
