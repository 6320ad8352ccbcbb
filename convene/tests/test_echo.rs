use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use convene::convene_api::{
    Actor, ActorResult, BoxedFuture, Capabilities, Envelope, HandlerTable, MessageKind, NodeAddress,
    Payload, RequirementSet, SpaceEvent,
};
use convene::echo::{
    self, EchoClient, EchoRequestor, EchoResponder, CLIENT_CAPABILITY, SERVER_CAPABILITY,
};
use convene::{ActorCatalog, ActorContext, ActorSpace, AskOutcome, MemoryNetwork, NodeConfig};

use test_helpers::{start_joiner, start_leader, wait_until};

/// Stands in for the echo responder but keeps its pongs to itself, so the
/// test decides when each pong reaches the requestor.
struct SilentResponder {
    pings: Arc<AtomicUsize>,
}

impl SilentResponder {
    fn on_ping<'a>(
        &'a mut self,
        _envelope: Envelope,
        _ctx: &'a mut ActorContext,
    ) -> BoxedFuture<'a, ActorResult<()>> {
        Box::pin(async move {
            self.pings.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

impl Actor for SilentResponder {
    type Context = ActorContext;
    const TYPE_NAME: &'static str = EchoResponder::TYPE_NAME;

    fn register_handlers(table: &mut HandlerTable<Self, Self::Context>) {
        table.on(MessageKind::Ping, SilentResponder::on_ping);
    }
}

fn server() -> Capabilities {
    Capabilities::new().with(SERVER_CAPABILITY, true)
}

fn client() -> Capabilities {
    Capabilities::new().with(CLIENT_CAPABILITY, true)
}

#[tokio::test]
async fn test_completion_token_after_all_but_one_pong() -> Result<()> {
    let network = MemoryNetwork::new();
    let pings = Arc::new(AtomicUsize::new(0));
    let counter = pings.clone();
    let catalog = ActorCatalog::new().with(move || SilentResponder {
        pings: counter.clone(),
    });
    let a = start_leader(&network, "node-a", server(), catalog).await?;
    let b = start_joiner(&network, "node-b", a.address(), client(), echo::catalog()).await?;

    let requestor = b
        .space
        .create(
            EchoRequestor::TYPE_NAME,
            RequirementSet::new().require_present(CLIENT_CAPABILITY),
        )
        .await?;
    assert_eq!(&requestor.host, b.address());

    let inbox = b.space.open_inbox();
    b.space.tell(&requestor, Payload::Count(5)).await;
    b.space
        .send(
            &requestor,
            Payload::Text("hello world".to_string()),
            Some(inbox.actor_ref().clone()),
        )
        .await;

    assert!(wait_until(|| pings.load(Ordering::SeqCst) == 5).await);
    assert_eq!(
        a.sink.count(|e| matches!(
            e,
            SpaceEvent::ActorCreated { actor_type, .. } if actor_type == EchoResponder::TYPE_NAME
        )),
        1
    );

    for _ in 0..3 {
        b.space.tell(&requestor, Payload::pong("hello world")).await;
    }
    assert!(inbox.recv(Duration::from_millis(200)).await.is_timed_out());

    // With five pongs outstanding, the fourth one completes the run.
    b.space.tell(&requestor, Payload::pong("hello world")).await;
    match inbox.recv(Duration::from_secs(2)).await {
        AskOutcome::Reply(envelope) => {
            assert_eq!(envelope.payload, Payload::Done);
            assert_eq!(envelope.sender.as_ref(), Some(&requestor));
        }
        other => panic!("expected Done, got {:?}", other),
    }

    // The last pong does not trigger a second token.
    b.space.tell(&requestor, Payload::pong("hello world")).await;
    assert!(inbox.recv(Duration::from_millis(200)).await.is_timed_out());
    assert_eq!(b.sink.named("echo-complete"), 1);

    b.space.shutdown().await;
    a.space.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_zero_count_completes_immediately() -> Result<()> {
    let network = MemoryNetwork::new();
    let a = start_leader(&network, "node-a", server(), echo::catalog()).await?;
    let b = start_joiner(&network, "node-b", a.address(), client(), echo::catalog()).await?;

    let report = EchoClient::new(b.space.clone())
        .with_wait(Duration::from_secs(2), 1)
        .run(0)
        .await?;
    assert_eq!(report.attempts, 1);
    assert_eq!(b.sink.named("echo-complete"), 1);

    b.space.shutdown().await;
    a.space.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_negative_count_sends_nothing() -> Result<()> {
    let network = MemoryNetwork::new();
    let a = start_leader(&network, "node-a", server(), echo::catalog()).await?;
    let b = start_joiner(&network, "node-b", a.address(), client(), echo::catalog()).await?;

    let report = EchoClient::new(b.space.clone())
        .with_wait(Duration::from_secs(2), 1)
        .run(-5)
        .await?;
    assert_eq!(report.attempts, 1);
    assert_eq!(b.sink.named("echo-complete"), 1);

    b.space.shutdown().await;
    a.space.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_echo_client_round_trip_in_memory() -> Result<()> {
    let network = MemoryNetwork::new();
    let a = start_leader(&network, "node-a", server(), echo::catalog()).await?;
    let b = start_joiner(&network, "node-b", a.address(), client(), echo::catalog()).await?;

    let report = EchoClient::new(b.space.clone())
        .with_payload("round trip")
        .with_wait(Duration::from_secs(2), 3)
        .run(25)
        .await?;

    assert_eq!(report.unexpected, 0);
    assert!(wait_until(|| b.sink.named("actor-stopped") >= 1).await);
    assert_eq!(
        a.sink.count(|e| matches!(
            e,
            SpaceEvent::ActorCreated { actor_type, .. } if actor_type == EchoResponder::TYPE_NAME
        )),
        1
    );
    assert_eq!(
        b.sink.count(|e| matches!(e, SpaceEvent::EchoComplete { .. })),
        1
    );

    b.space.shutdown().await;
    a.space.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_echo_client_round_trip_over_tcp() -> Result<()> {
    let any_port = NodeAddress::parse("127.0.0.1:0")?;
    let leader = ActorSpace::builder(NodeConfig::leader(any_port.clone(), server()))
        .catalog(echo::catalog())
        .start()
        .await?;
    let joiner = ActorSpace::builder(
        NodeConfig::new(any_port, client()).with_leader(Some(leader.address().clone())),
    )
    .catalog(echo::catalog())
    .start()
    .await?;

    assert!(wait_until(|| leader.members().len() == 1).await);
    let report = EchoClient::new(joiner.clone())
        .with_wait(Duration::from_secs(2), 3)
        .run(10)
        .await?;
    assert_eq!(report.unexpected, 0);

    joiner.shutdown().await;
    leader.shutdown().await;
    Ok(())
}
