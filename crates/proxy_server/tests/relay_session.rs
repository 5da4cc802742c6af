//! End-to-end session lifecycle tests over in-memory legs.

use async_trait::async_trait;
use proxy_server::session::SessionEndedEvent;
use proxy_server::transport::{
    memory_leg, AuthError, CredentialFlow, InteractiveChallenge, Leg, LegEvent, LoginOutcome,
    MemoryRemote,
};
use proxy_server::{RelayConfig, ServerError, SessionManager};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use waypoint_event_system::{
    create_event_bus, ChatInput, Direction, EventBus, KeepAlive, Packet, SetCompression,
};

struct StubFlow {
    outcomes: Mutex<VecDeque<LoginOutcome>>,
}

impl StubFlow {
    fn new(outcomes: Vec<LoginOutcome>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
        })
    }
}

#[async_trait]
impl CredentialFlow for StubFlow {
    async fn connect(&self, _username: &str) -> Result<LoginOutcome, AuthError> {
        self.outcomes
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| AuthError::Denied("no outcome scripted".to_string()))
    }
}

fn test_config() -> RelayConfig {
    RelayConfig {
        open_browser: false,
        ..RelayConfig::default()
    }
}

fn manager(bus: Arc<EventBus>, flow: Arc<StubFlow>) -> Arc<SessionManager> {
    Arc::new(SessionManager::new(bus, test_config(), flow))
}

fn drain_until_keep_alive(remote: &mut MemoryRemote) -> Option<KeepAlive> {
    while let Ok(packet) = remote.outbound.try_recv() {
        if let Packet::KeepAlive(keep_alive) = packet {
            return Some(keep_alive);
        }
    }
    None
}

async fn settle() {
    // Lets spawned session tasks run; auto-advance covers the timers.
    tokio::time::sleep(Duration::from_millis(5)).await;
}

#[tokio::test(start_paused = true)]
async fn interactive_auth_then_forwarding() {
    let bus = create_event_bus();
    let (completion_tx, completion_rx) = oneshot::channel();
    let flow = StubFlow::new(vec![LoginOutcome::Interactive(InteractiveChallenge {
        verification_url: "https://verify.example/code".to_string(),
        completion: completion_rx,
    })]);
    let manager = manager(bus.clone(), flow);

    let (client_leg, mut client_remote) = memory_leg();
    manager
        .accept_client("Foo".to_string(), client_leg)
        .await
        .unwrap();
    client_remote.events.send(LegEvent::EnteredPlay).await.unwrap();
    settle().await;

    // Holding pattern: synthetic world and the verification chat.
    assert!(matches!(
        client_remote.outbound.recv().await.unwrap(),
        Packet::JoinGame(_)
    ));
    assert!(matches!(
        client_remote.outbound.recv().await.unwrap(),
        Packet::SpawnPosition(_)
    ));
    assert!(matches!(
        client_remote.outbound.recv().await.unwrap(),
        Packet::PositionLook(_)
    ));
    match client_remote.outbound.recv().await.unwrap() {
        Packet::Chat(chat) => assert!(chat.component.to_plain().contains("verify.example")),
        other => panic!("expected verification chat, got {other:?}"),
    }

    // Keep-alives at the configured interval while pending.
    tokio::time::advance(Duration::from_secs(15)).await;
    settle().await;
    assert!(drain_until_keep_alive(&mut client_remote).is_some());

    // Auth completes with a backend leg; both legs reach play.
    let (backend_leg, mut backend_remote) = memory_leg();
    completion_tx.send(Ok(backend_leg)).unwrap();
    settle().await;
    backend_remote.events.send(LegEvent::EnteredPlay).await.unwrap();
    settle().await;

    // A client chat packet is forwarded verbatim to the backend.
    client_remote
        .events
        .send(LegEvent::Packet(Packet::ChatInput(ChatInput {
            message: "hello there".to_string(),
        })))
        .await
        .unwrap();
    settle().await;

    loop {
        match backend_remote.outbound.recv().await.unwrap() {
            Packet::ChatInput(chat) => {
                assert_eq!(chat.message, "hello there");
                break;
            }
            // The completion chat line goes to the client, not here; any
            // other packet on the backend leg is unexpected.
            other => panic!("unexpected backend packet: {other:?}"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn second_login_is_rejected_not_queued() {
    let bus = create_event_bus();
    let (_tx, rx) = oneshot::channel();
    let flow = StubFlow::new(vec![LoginOutcome::Interactive(InteractiveChallenge {
        verification_url: "https://verify".to_string(),
        completion: rx,
    })]);
    let manager = manager(bus, flow);

    let (first_leg, _first_remote) = memory_leg();
    manager.clone().accept_client("Foo".to_string(), first_leg).await.unwrap();

    let (second_leg, second_remote) = memory_leg();
    let result = manager.clone().accept_client("Bar".to_string(), second_leg).await;
    assert!(matches!(result, Err(ServerError::SessionActive)));
    assert!(second_remote.closed.load(Ordering::SeqCst));
    let reason = second_remote.close_reason.lock().unwrap().clone();
    assert!(reason.unwrap().to_plain().contains("already active"));

    // The first session is untouched.
    assert!(manager.has_session());
}

#[tokio::test(start_paused = true)]
async fn backend_loss_tears_down_and_frees_the_slot() {
    let bus = create_event_bus();
    let ended = Arc::new(AtomicUsize::new(0));
    let counter = ended.clone();
    bus.on_core("session_ended", move |event: SessionEndedEvent| {
        assert_eq!(event.username, "Foo");
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .await
    .unwrap();

    let (backend_leg, backend_remote) = memory_leg();
    let flow = StubFlow::new(vec![LoginOutcome::Ready(backend_leg)]);
    let manager = manager(bus, flow);

    let (client_leg, client_remote) = memory_leg();
    manager.clone().accept_client("Foo".to_string(), client_leg).await.unwrap();
    settle().await;

    backend_remote.events.send(LegEvent::Closed).await.unwrap();
    settle().await;

    assert_eq!(ended.load(Ordering::SeqCst), 1);
    assert!(!manager.has_session());
    // Torn down symmetrically.
    assert!(client_remote.closed.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn compression_threshold_applies_before_forwarding() {
    let bus = create_event_bus();
    let (backend_leg, backend_remote) = memory_leg();
    let flow = StubFlow::new(vec![LoginOutcome::Ready(backend_leg)]);
    let manager = manager(bus, flow);

    let (client_leg, mut client_remote) = memory_leg();
    manager.clone().accept_client("Foo".to_string(), client_leg).await.unwrap();
    settle().await;
    client_remote.events.send(LegEvent::EnteredPlay).await.unwrap();
    backend_remote.events.send(LegEvent::EnteredPlay).await.unwrap();
    settle().await;

    backend_remote
        .events
        .send(LegEvent::Packet(Packet::SetCompression(SetCompression {
            threshold: 256,
        })))
        .await
        .unwrap();
    settle().await;

    // By the time the packet reaches the client leg, the client's outgoing
    // setting already carries the new threshold.
    match client_remote.outbound.recv().await.unwrap() {
        Packet::SetCompression(compression) => {
            assert_eq!(compression.threshold, 256);
            assert_eq!(*client_remote.compression.lock().unwrap(), Some(256));
        }
        other => panic!("unexpected packet: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn backend_switch_swaps_legs_and_resets_state() {
    let bus = create_event_bus();
    let resets = Arc::new(AtomicUsize::new(0));
    let counter = resets.clone();
    bus.on_core("state_reset", move |_: serde_json::Value| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .await
    .unwrap();

    let (first_backend, first_remote) = memory_leg();
    let (second_backend, mut second_remote) = memory_leg();
    let flow = StubFlow::new(vec![
        LoginOutcome::Ready(first_backend),
        LoginOutcome::Ready(second_backend),
    ]);
    let manager = manager(bus, flow);

    let (client_leg, client_remote) = memory_leg();
    manager.clone().accept_client("Foo".to_string(), client_leg).await.unwrap();
    settle().await;
    client_remote.events.send(LegEvent::EnteredPlay).await.unwrap();
    first_remote.events.send(LegEvent::EnteredPlay).await.unwrap();
    settle().await;

    manager.switch_backend().await.unwrap();
    settle().await;

    // The old backend leg is closed and the world view starts over.
    assert!(first_remote.closed.load(Ordering::SeqCst));
    assert_eq!(resets.load(Ordering::SeqCst), 1);

    // Forwarding resumes once the new backend reaches play.
    second_remote.events.send(LegEvent::EnteredPlay).await.unwrap();
    settle().await;
    client_remote
        .events
        .send(LegEvent::Packet(Packet::ChatInput(ChatInput {
            message: "after switch".to_string(),
        })))
        .await
        .unwrap();
    settle().await;
    match second_remote.outbound.recv().await.unwrap() {
        Packet::ChatInput(chat) => assert_eq!(chat.message, "after switch"),
        other => panic!("unexpected packet: {other:?}"),
    }
    // The client stayed connected throughout.
    assert!(!client_remote.closed.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn pre_play_packets_publish_but_do_not_forward() {
    let bus = create_event_bus();
    let published = Arc::new(AtomicUsize::new(0));
    let counter = published.clone();
    bus.on_packet(Direction::Serverbound, "chat_input", move |_: Packet| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .await
    .unwrap();

    let (backend_leg, mut backend_remote) = memory_leg();
    let flow = StubFlow::new(vec![LoginOutcome::Ready(backend_leg)]);
    let manager = manager(bus, flow);

    let (client_leg, client_remote) = memory_leg();
    manager.clone().accept_client("Foo".to_string(), client_leg).await.unwrap();
    settle().await;
    // Client is in play, the backend has not entered play yet.
    client_remote.events.send(LegEvent::EnteredPlay).await.unwrap();
    settle().await;

    client_remote
        .events
        .send(LegEvent::Packet(Packet::ChatInput(ChatInput {
            message: "early".to_string(),
        })))
        .await
        .unwrap();
    settle().await;

    assert_eq!(published.load(Ordering::SeqCst), 1);
    assert!(backend_remote.outbound.try_recv().is_err(), "pre-play packet was forwarded");
}
