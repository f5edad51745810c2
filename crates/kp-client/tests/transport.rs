use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use kp_client::{
    Client, ClientConfig, ConnectionEvent, ConnectionState, Error,
    test_support::{FakeBackend, fake_config, settle},
};
use kp_protocol::{Inbound, InboundKind, Macro, Outbound};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::broadcast::Receiver;

fn client(backend: &FakeBackend) -> Client {
    Client::new(fake_config(), backend.connector()).unwrap()
}

fn drain_events(rx: &mut Receiver<ConnectionEvent>) -> Vec<ConnectionEvent> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn send_while_disconnected_is_written_once_open() {
    let backend = FakeBackend::refusing();
    let client = client(&backend);

    client.send(&Outbound::GetProfiles);
    settle(50).await;
    assert_eq!(backend.connect_count(), 1);
    assert!(backend.sent().is_empty());
    assert_eq!(client.state(), ConnectionState::Backoff);

    backend.set_accept(true);
    assert!(backend.wait_sent(1, 5_000).await);
    settle(100).await;
    assert_eq!(backend.sent_actions(), vec!["getProfiles"]);
    assert_eq!(backend.sent()[0].data, json!({}));
    assert_eq!(client.state(), ConnectionState::Open);
}

#[tokio::test(start_paused = true)]
async fn queued_frames_drain_high_priority_first() {
    let backend = FakeBackend::refusing();
    let client = client(&backend);

    client.send(&Outbound::GetProfiles);
    client.send(&Outbound::TestMacroStop {
        clear_modifiers: true,
    });
    client.send(&Outbound::GetMacros {
        profile: "Global".into(),
    });
    settle(10).await;
    assert!(backend.sent().is_empty());

    backend.set_accept(true);
    client.reconnect();
    assert!(backend.wait_sent(3, 1_000).await);
    assert_eq!(
        backend.sent_actions(),
        vec!["testMacroStop", "getProfiles", "getMacros"]
    );
}

#[tokio::test(start_paused = true)]
async fn frames_are_spaced_by_the_drain_interval() {
    let backend = FakeBackend::new();
    let client = client(&backend);
    client.open();
    assert!(backend.wait_connected(100).await);

    for _ in 0..3 {
        client.send(&Outbound::GetThemes);
    }
    settle(1).await;
    assert_eq!(backend.sent().len(), 1);
    settle(25).await;
    assert_eq!(backend.sent().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn sends_during_a_drain_keep_the_spacing() {
    let backend = FakeBackend::new();
    let client = client(&backend);
    client.open();
    assert!(backend.wait_connected(100).await);

    for _ in 0..3 {
        client.send(&Outbound::GetThemes);
    }
    settle(1).await;
    assert_eq!(backend.sent().len(), 1);

    client.send(&Outbound::GetProfiles);
    settle(1).await;
    client.send(&Outbound::GetProfiles);
    settle(1).await;
    assert_eq!(backend.sent().len(), 1);

    settle(8).await;
    assert_eq!(backend.sent().len(), 2);
    settle(10).await;
    assert_eq!(backend.sent().len(), 3);
    settle(30).await;
    assert_eq!(backend.sent().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn send_right_after_a_write_waits_out_the_interval() {
    let backend = FakeBackend::new();
    let client = client(&backend);
    client.open();
    assert!(backend.wait_connected(100).await);

    client.send(&Outbound::GetThemes);
    settle(1).await;
    assert_eq!(backend.sent().len(), 1);

    client.send(&Outbound::GetProfiles);
    settle(2).await;
    assert_eq!(backend.sent().len(), 1);
    settle(10).await;
    assert_eq!(backend.sent_actions(), vec!["getThemes", "getProfiles"]);
}

#[tokio::test(start_paused = true)]
async fn every_handler_sees_the_same_message() {
    let backend = FakeBackend::new();
    let client = client(&backend);
    let seen: Arc<Mutex<Vec<(usize, Vec<Macro>)>>> = Arc::default();
    for n in 0..2 {
        let seen = seen.clone();
        client.on(InboundKind::Macros, move |msg| {
            if let Inbound::Macros(list) = msg {
                seen.lock().push((n, list.clone()));
            }
        });
    }
    client.open();
    assert!(backend.wait_connected(100).await);
    assert!(backend.push("macros", json!([{ "name": "m1", "activator": "F1" }])));
    settle(10).await;

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].0, 0);
    assert_eq!(seen[1].0, 1);
    assert_eq!(seen[0].1, seen[1].1);
    assert_eq!(seen[0].1[0].name, "m1");
}

#[tokio::test(start_paused = true)]
async fn panicking_handler_does_not_starve_others() {
    let backend = FakeBackend::new();
    let client = client(&backend);
    let hits = Arc::new(AtomicUsize::new(0));
    client.on(InboundKind::Windows, |_| panic!("handler failure"));
    {
        let hits = hits.clone();
        client.on(InboundKind::Windows, move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
    }
    client.open();
    assert!(backend.wait_connected(100).await);
    backend.push("windows", json!(["Notepad"]));
    backend.push("windows", json!(["Notepad", "Game"]));
    settle(10).await;
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(client.state(), ConnectionState::Open);
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_are_dropped() {
    let backend = FakeBackend::new();
    let client = client(&backend);
    let hits = Arc::new(AtomicUsize::new(0));
    {
        let hits = hits.clone();
        client.on(InboundKind::Windows, move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
    }
    client.open();
    assert!(backend.wait_connected(100).await);
    backend.push_raw("not json at all");
    backend.push_raw(r#"{"data": []}"#);
    backend.push("mystery", json!({}));
    backend.push("windows", json!({ "not": "a list" }));
    backend.push("windows", json!(["Notepad"]));
    settle(10).await;

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(backend.is_connected());
    assert_eq!(backend.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn backoff_doubles_then_gives_up() {
    let backend = FakeBackend::refusing();
    let config = ClientConfig {
        max_reconnect_attempts: 3,
        ..fake_config()
    };
    let client = Client::new(config, backend.connector()).unwrap();
    let mut events = client.events();

    client.open();
    settle(20_000).await;
    assert_eq!(backend.connect_count(), 4);
    assert_eq!(client.state(), ConnectionState::GaveUp);
    assert_eq!(
        drain_events(&mut events),
        vec![
            ConnectionEvent::Closed {
                attempt: Some(1),
                reconnect_in: Some(Duration::from_secs(1)),
            },
            ConnectionEvent::Closed {
                attempt: Some(2),
                reconnect_in: Some(Duration::from_secs(2)),
            },
            ConnectionEvent::Closed {
                attempt: Some(3),
                reconnect_in: Some(Duration::from_secs(4)),
            },
            ConnectionEvent::GaveUp { attempts: 3 },
        ]
    );

    // After giving up, sends queue without dialing.
    client.send(&Outbound::GetSettings);
    settle(5_000).await;
    assert_eq!(backend.connect_count(), 4);

    backend.set_accept(true);
    client.open();
    assert!(backend.wait_sent(1, 1_000).await);
    assert_eq!(backend.sent_actions(), vec!["getSettings"]);
    assert_eq!(drain_events(&mut events), vec![ConnectionEvent::Opened]);
}

#[tokio::test(start_paused = true)]
async fn lost_connection_reconnects_and_flushes() {
    let backend = FakeBackend::new();
    let client = client(&backend);
    let mut events = client.events();
    client.open();
    assert!(backend.wait_connected(100).await);

    assert!(backend.drop_connection());
    settle(10).await;
    assert_eq!(client.state(), ConnectionState::Backoff);
    client.send(&Outbound::GetMacros {
        profile: "Game".into(),
    });
    assert!(backend.wait_sent(1, 5_000).await);
    assert_eq!(backend.sent()[0].data, json!({ "profile": "Game" }));
    assert_eq!(backend.connect_count(), 2);

    let evs = drain_events(&mut events);
    assert_eq!(evs.first(), Some(&ConnectionEvent::Opened));
    assert!(matches!(
        evs.get(1),
        Some(ConnectionEvent::Closed {
            attempt: Some(1),
            ..
        })
    ));
    assert_eq!(evs.last(), Some(&ConnectionEvent::Opened));
}

#[tokio::test(start_paused = true)]
async fn socket_error_takes_the_close_path() {
    let backend = FakeBackend::new();
    let client = client(&backend);
    client.open();
    assert!(backend.wait_connected(100).await);
    assert!(backend.fail_connection());
    settle(10).await;
    assert_eq!(client.state(), ConnectionState::Backoff);
    assert!(backend.wait_connected(2_000).await);
    assert_eq!(client.state(), ConnectionState::Open);
}

#[tokio::test(start_paused = true)]
async fn close_stops_reconnecting() {
    let backend = FakeBackend::new();
    let client = client(&backend);
    client.open();
    assert!(backend.wait_connected(100).await);

    client.close();
    settle(10).await;
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(!backend.is_connected());

    client.send(&Outbound::GetTheme);
    settle(10_000).await;
    assert_eq!(backend.connect_count(), 1);
    assert!(backend.sent().is_empty());

    client.open();
    assert!(backend.wait_sent(1, 1_000).await);
    assert_eq!(backend.sent_actions(), vec!["getTheme"]);
}

#[tokio::test(start_paused = true)]
async fn dispose_stops_driver_and_clears_handlers() {
    let backend = FakeBackend::new();
    let client = client(&backend);
    client.on(InboundKind::Theme, |_| {});
    client.open();
    assert!(backend.wait_connected(100).await);

    client.dispose();
    settle(10).await;
    assert_eq!(client.state(), ConnectionState::Disposed);
    assert_eq!(client.registry().handler_count(InboundKind::Theme), 0);
    assert!(!backend.is_connected());
    assert!(matches!(
        client.wait_open(Duration::from_millis(10)).await,
        Err(Error::Disposed)
    ));
}

#[tokio::test(start_paused = true)]
async fn wait_open_times_out() {
    let backend = FakeBackend::refusing();
    let client = client(&backend);
    client.open();
    assert!(matches!(
        client.wait_open(Duration::from_millis(500)).await,
        Err(Error::Timeout { .. })
    ));
    backend.set_accept(true);
    assert!(client.wait_open(Duration::from_secs(2)).await.is_ok());
}
