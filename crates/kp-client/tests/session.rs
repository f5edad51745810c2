use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use kp_client::{
    Client, ConnectionEvent, Error, Session,
    test_support::{FakeBackend, fake_config, settle},
};
use kp_protocol::{Inbound, InboundKind, Outbound, OutboundKind};
use serde_json::{Value, json};

async fn connected() -> (FakeBackend, Client) {
    let backend = FakeBackend::new();
    let client = Client::new(fake_config(), backend.connector()).unwrap();
    client.open();
    assert!(backend.wait_connected(100).await);
    (backend, client)
}

fn preview(x: i32) -> Outbound {
    Outbound::PreviewMouseCursor {
        x,
        y: 0,
        relative: false,
    }
}

fn xs(backend: &FakeBackend) -> Vec<Value> {
    backend
        .sent()
        .into_iter()
        .filter(|e| e.action == OutboundKind::PreviewMouseCursor.as_str())
        .map(|e| e.data["x"].clone())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn debounced_burst_sends_only_the_latest() {
    let (backend, client) = connected().await;
    let session = Session::new(&client);

    session.send(preview(1), true);
    session.send(preview(2), true);
    settle(100).await;
    assert!(xs(&backend).is_empty());

    settle(2_000).await;
    assert_eq!(xs(&backend), vec![json!(2)]);
}

#[tokio::test(start_paused = true)]
async fn debounce_window_runs_from_the_first_call() {
    let (backend, client) = connected().await;
    let session = Session::new(&client);

    session.send(preview(0), true);
    settle(100).await;
    session.send(preview(1), true);
    settle(150).await;
    session.send(preview(2), true);
    settle(40).await;
    assert!(xs(&backend).is_empty());

    settle(20).await;
    assert_eq!(xs(&backend), vec![json!(2)]);
}

#[tokio::test(start_paused = true)]
async fn throttled_sends_in_window_are_dropped() {
    let (backend, client) = connected().await;
    let session = Session::new(&client);

    session.send(preview(1), false);
    session.send(preview(2), false);
    settle(1_000).await;
    assert_eq!(xs(&backend), vec![json!(1)]);

    session.send(preview(3), false);
    settle(10).await;
    assert_eq!(xs(&backend), vec![json!(1), json!(3)]);
}

#[tokio::test(start_paused = true)]
async fn spaced_debounced_sends_each_go_out() {
    let (backend, client) = connected().await;
    let session = Session::new(&client);

    session.send(preview(1), true);
    settle(400).await;
    assert_eq!(xs(&backend), vec![json!(1)]);
    session.send(preview(2), true);
    settle(400).await;
    assert_eq!(xs(&backend), vec![json!(1), json!(2)]);
}

#[tokio::test(start_paused = true)]
async fn spaced_throttled_sends_go_out_immediately() {
    let (backend, client) = connected().await;
    let session = Session::new(&client);

    session.send(preview(1), false);
    settle(400).await;
    session.send(preview(2), false);
    settle(1).await;
    assert_eq!(xs(&backend), vec![json!(1), json!(2)]);
}

#[tokio::test(start_paused = true)]
async fn throttle_drops_while_a_debounced_send_is_held() {
    let (backend, client) = connected().await;
    let session = Session::new(&client);

    session.send(preview(1), true);
    session.send(preview(2), false);
    settle(1_000).await;
    assert_eq!(xs(&backend), vec![json!(1)]);
}

#[tokio::test(start_paused = true)]
async fn cooldown_is_per_action() {
    let (backend, client) = connected().await;
    let session = Session::new(&client);

    session.send(preview(1), false);
    session.send(Outbound::StopPreviewMouseCursor, false);
    settle(50).await;
    assert_eq!(
        backend.sent_actions(),
        vec!["previewMouseCursor", "stopPreviewMouseCursor"]
    );
}

#[tokio::test(start_paused = true)]
async fn legacy_once_stays_registered_until_disposed() {
    let (backend, client) = connected().await;
    let session = Session::new(&client);
    let hits = Arc::new(AtomicUsize::new(0));
    {
        let hits = hits.clone();
        session.once(
            &Outbound::GetFilePath(json!({ "filter": "audio" })),
            InboundKind::GetFilePath,
            move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            },
        );
    }
    assert!(backend.wait_sent(1, 100).await);
    assert_eq!(backend.sent_actions(), vec!["getFilePath"]);

    backend.push("getFilePath", json!({ "filePath": "C:/a.wav" }));
    backend.push("getFilePath", json!({ "filePath": "C:/b.wav" }));
    settle(10).await;
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(client.registry().handler_count(InboundKind::GetFilePath), 1);

    session.dispose();
    assert_eq!(client.registry().handler_count(InboundKind::GetFilePath), 0);
}

#[tokio::test(start_paused = true)]
async fn request_once_resolves_and_unregisters() {
    let (backend, client) = connected().await;
    let session = Session::new(&client);

    let reply = async {
        assert!(backend.wait_sent(1, 100).await);
        backend.push("saveTheme", json!({ "success": "Theme saved" }));
    };
    let msg = Outbound::SaveTheme(json!({ "name": "dark" }));
    let (res, ()) = tokio::join!(
        session.request_once(
            &msg,
            InboundKind::SaveTheme,
            Duration::from_secs(1),
        ),
        reply
    );
    let Inbound::SaveTheme(r) = res.unwrap() else {
        panic!("expected saveTheme reply");
    };
    assert!(r.is_success());
    assert_eq!(client.registry().handler_count(InboundKind::SaveTheme), 0);
}

#[tokio::test(start_paused = true)]
async fn request_once_times_out_and_unregisters() {
    let (_backend, client) = connected().await;
    let session = Session::new(&client);

    let res = session
        .request_once(
            &Outbound::GetAudioDevices,
            InboundKind::GetAudioDevices,
            Duration::from_millis(500),
        )
        .await;
    assert!(matches!(
        res,
        Err(Error::Timeout {
            action: "getAudioDevices"
        })
    ));
    assert_eq!(client.registry().handler_count(InboundKind::GetAudioDevices), 0);
}

#[tokio::test(start_paused = true)]
async fn dispose_cancels_pending_work() {
    let (backend, client) = connected().await;
    let session = Session::new(&client);

    session.send(preview(1), true);
    session.send(preview(2), true);
    let (res, ()) = tokio::join!(
        session.request_once(
            &Outbound::GetWindows,
            InboundKind::Windows,
            Duration::from_secs(5),
        ),
        async {
            settle(10).await;
            session.dispose();
        }
    );
    assert!(matches!(res, Err(Error::Disposed)));

    settle(1_000).await;
    assert!(xs(&backend).is_empty());
    session.send(preview(3), false);
    settle(10).await;
    assert!(xs(&backend).is_empty());
}

#[tokio::test(start_paused = true)]
async fn dropping_a_session_removes_its_handlers() {
    let (_backend, client) = connected().await;
    {
        let session = Session::new(&client);
        session.on(InboundKind::Profiles, |_| {});
        let id = session.on(InboundKind::Themes, |_| {});
        session.off(InboundKind::Themes, id);
        assert_eq!(session.handler_count(), 1);
        assert_eq!(client.registry().handler_count(InboundKind::Profiles), 1);
    }
    assert_eq!(client.registry().handler_count(InboundKind::Profiles), 0);
}

#[tokio::test(start_paused = true)]
async fn sessions_hear_each_close_once() {
    let (backend, client) = connected().await;
    let a = Session::new(&client);
    let b = Session::new(&client);
    let mut ea = a.connection_events();
    let mut eb = b.connection_events();

    backend.drop_connection();
    settle(10).await;
    for rx in [&mut ea, &mut eb] {
        assert!(matches!(
            rx.try_recv(),
            Ok(ConnectionEvent::Closed {
                attempt: Some(1),
                ..
            })
        ));
        assert!(rx.try_recv().is_err());
    }
}
