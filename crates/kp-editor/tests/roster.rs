use std::sync::Arc;

use kp_client::{
    Client, Session,
    test_support::{FakeBackend, fake_config, settle},
};
use kp_editor::{EditError, FLUSH_DELAY, MacroRoster, RosterEvent, test_support::RecordingOutbox};
use kp_protocol::{Inbound, LoopMode, Macro, MacroId, Outbound, OutboundKind, Reply};
use serde_json::json;

fn macros() -> Vec<Macro> {
    ["jump", "run", "heal"]
        .into_iter()
        .map(|name| {
            let mut m = Macro::new(name);
            m.activator = "F1".into();
            m
        })
        .collect()
}

fn loaded() -> (Arc<RecordingOutbox>, MacroRoster, Vec<Macro>) {
    let outbox = Arc::new(RecordingOutbox::default());
    let roster = MacroRoster::new(outbox.clone(), "Global");
    let list = macros();
    roster.handle(&Inbound::Macros(list.clone()));
    (outbox, roster, list)
}

fn flush_ms() -> u64 {
    FLUSH_DELAY.as_millis() as u64
}

#[tokio::test(start_paused = true)]
async fn edits_coalesce_into_one_batch() {
    let (outbox, roster, list) = loaded();
    let id = &list[0].id;

    assert!(!roster.toggle_enabled(id).unwrap());
    settle(5_000).await;
    assert!(roster.toggle_enabled(id).unwrap());
    assert_eq!(roster.pending_count(), 1);

    settle(flush_ms() - 1_000).await;
    assert!(outbox.sent().is_empty());

    settle(2_000).await;
    let sent = outbox.take();
    assert_eq!(sent.len(), 1);
    let Outbound::BatchUpdateMacros { profile, macros } = &sent[0] else {
        panic!("expected batchUpdateMacros");
    };
    assert_eq!(profile, "Global");
    assert_eq!(macros.len(), 1);
    assert_eq!(&macros[0].id, id);
    assert!(macros[0].enabled);
    assert_eq!(roster.pending_count(), 0);
    assert!(!roster.flush_scheduled());
}

#[tokio::test(start_paused = true)]
async fn batch_keeps_latest_snapshot_per_macro() {
    let (outbox, roster, list) = loaded();
    roster.toggle_enabled(&list[1].id).unwrap();
    roster.set_loop_mode(&list[0].id, LoopMode::Toggle).unwrap();
    roster.toggle_enabled(&list[1].id).unwrap();

    assert_eq!(roster.flush(), 2);
    let sent = outbox.take();
    let Outbound::BatchUpdateMacros { macros, .. } = &sent[0] else {
        panic!("expected batchUpdateMacros");
    };
    assert_eq!(macros[0].id, list[1].id);
    assert!(macros[0].enabled);
    assert_eq!(macros[1].loop_mode, LoopMode::Toggle);
    assert_eq!(
        roster.find("jump").map(|m| m.loop_mode),
        Some(LoopMode::Toggle)
    );
}

#[tokio::test(start_paused = true)]
async fn reload_discards_pending_edits() {
    let (outbox, roster, list) = loaded();
    roster.toggle_enabled(&list[0].id).unwrap();
    assert!(roster.flush_scheduled());

    roster.handle(&Inbound::Macros(list.clone()));
    assert_eq!(roster.pending_count(), 0);
    assert!(!roster.flush_scheduled());
    assert!(roster.find("jump").unwrap().enabled);

    settle(flush_ms() * 2).await;
    assert!(outbox.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_batch_is_replayed() {
    let (outbox, roster, list) = loaded();
    let mut events = roster.events();
    roster.toggle_enabled(&list[0].id).unwrap();
    roster.toggle_enabled(&list[2].id).unwrap();
    assert_eq!(roster.flush(), 2);
    outbox.take();

    roster.set_loop_mode(&list[2].id, LoopMode::Toggle).unwrap();
    roster.handle(&Inbound::BatchMacrosUpdated(Reply::failed("write error")));
    assert_eq!(roster.pending_count(), 2);
    assert!(roster.flush_scheduled());

    assert_eq!(events.recv().await.unwrap(), RosterEvent::Flushed { count: 2 });
    assert_eq!(
        events.recv().await.unwrap(),
        RosterEvent::BatchFailed {
            message: "write error".into(),
            replayed: 1
        }
    );

    settle(flush_ms() + 100).await;
    let sent = outbox.take();
    let Outbound::BatchUpdateMacros { macros, .. } = &sent[0] else {
        panic!("expected batchUpdateMacros");
    };
    assert_eq!(macros.len(), 2);
    assert_eq!(macros[0].loop_mode, LoopMode::Toggle);
    assert!(!macros[1].enabled);

    roster.handle(&Inbound::BatchMacrosUpdated(Reply::ok("ok")));
    assert_eq!(events.recv().await.unwrap(), RosterEvent::Flushed { count: 2 });
    assert_eq!(events.recv().await.unwrap(), RosterEvent::BatchSaved);
}

#[tokio::test(start_paused = true)]
async fn reply_to_batch_from_before_reload_is_ignored() {
    let (outbox, roster, list) = loaded();
    let mut events = roster.events();
    roster.toggle_enabled(&list[0].id).unwrap();
    assert_eq!(roster.flush(), 1);

    roster.handle(&Inbound::Macros(list.clone()));
    roster.toggle_enabled(&list[1].id).unwrap();
    assert_eq!(roster.flush(), 1);
    assert_eq!(outbox.take().len(), 2);

    roster.handle(&Inbound::BatchMacrosUpdated(Reply::failed("stale")));
    assert_eq!(roster.pending_count(), 0);
    assert!(!roster.flush_scheduled());

    roster.handle(&Inbound::BatchMacrosUpdated(Reply::failed("write error")));
    assert_eq!(roster.pending_count(), 1);
    assert!(roster.flush_scheduled());

    assert_eq!(events.recv().await.unwrap(), RosterEvent::Flushed { count: 1 });
    assert_eq!(events.recv().await.unwrap(), RosterEvent::Loaded { count: 3 });
    assert_eq!(events.recv().await.unwrap(), RosterEvent::Flushed { count: 1 });
    assert_eq!(
        events.recv().await.unwrap(),
        RosterEvent::BatchFailed {
            message: "write error".into(),
            replayed: 1
        }
    );
}

#[tokio::test(start_paused = true)]
async fn delete_drops_pending_snapshot() {
    let (outbox, roster, list) = loaded();
    roster.toggle_enabled(&list[1].id).unwrap();
    roster.delete_macro(&list[1].id).unwrap();
    assert_eq!(roster.pending_count(), 0);
    assert!(roster.find("run").is_none());
    assert_eq!(
        outbox.take(),
        vec![Outbound::DeleteMacro {
            profile: "Global".into(),
            name: "run".into()
        }]
    );

    let ghost = MacroId::generate();
    assert!(matches!(
        roster.delete_macro(&ghost),
        Err(EditError::UnknownMacro(_))
    ));
    assert!(matches!(
        roster.toggle_enabled(&ghost),
        Err(EditError::UnknownMacro(_))
    ));

    settle(flush_ms() + 100).await;
    assert!(outbox.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn edit_handoff_flushes_first() {
    let (outbox, roster, list) = loaded();
    roster.toggle_enabled(&list[2].id).unwrap();
    let m = roster.flush_before_edit("heal").unwrap();
    assert!(!m.enabled);
    assert_eq!(outbox.kinds(), vec![OutboundKind::BatchUpdateMacros]);
    assert!(!roster.flush_scheduled());
    assert!(roster.flush_before_edit("missing").is_none());
}

#[tokio::test(start_paused = true)]
async fn profile_switch_flushes_then_loads() {
    let (outbox, roster, list) = loaded();
    roster.toggle_enabled(&list[0].id).unwrap();
    roster.set_profile("Game");
    assert_eq!(roster.profile(), "Game");
    assert!(roster.macros().is_empty());
    let sent = outbox.take();
    assert_eq!(sent.len(), 2);
    assert!(matches!(
        &sent[0],
        Outbound::BatchUpdateMacros { profile, .. } if profile == "Global"
    ));
    assert_eq!(
        sent[1],
        Outbound::GetMacros {
            profile: "Game".into()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn dispose_cancels_the_flush() {
    let (outbox, roster, list) = loaded();
    roster.toggle_enabled(&list[0].id).unwrap();
    roster.dispose();
    settle(flush_ms() + 100).await;
    assert!(outbox.sent().is_empty());
    assert_eq!(roster.pending_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn attached_roster_follows_the_backend() {
    let backend = FakeBackend::new();
    let client = Client::new(fake_config(), backend.connector()).unwrap();
    let session = Session::new(&client);
    let roster = MacroRoster::new(Arc::new(client.clone()), "Global");
    roster.attach(&session);
    let mut events = roster.events();

    roster.load();
    assert!(backend.wait_sent(1, 2_000).await);
    assert_eq!(backend.sent()[0].action, "getMacros");
    assert_eq!(backend.sent()[0].data["profile"], json!("Global"));

    backend.push(
        "macros",
        json!([
            { "name": "jump", "enabled": true, "type": "Hotkey", "activator": "F1" },
            { "name": "run", "enabled": false, "type": "Hotkey", "activator": "F2" }
        ]),
    );
    assert_eq!(events.recv().await.unwrap(), RosterEvent::Loaded { count: 2 });

    let run = roster.find("run").unwrap();
    assert!(roster.toggle_enabled(&run.id).unwrap());
    settle(flush_ms() + 100).await;
    assert!(backend.wait_sent(2, 2_000).await);
    let batch = &backend.sent()[1];
    assert_eq!(batch.action, "batchUpdateMacros");
    assert_eq!(batch.data["profile"], json!("Global"));
    assert_eq!(batch.data["macros"][0]["name"], json!("run"));
    assert_eq!(batch.data["macros"][0]["enabled"], json!(true));

    backend.push("batchMacrosUpdated", json!({ "success": true }));
    assert_eq!(events.recv().await.unwrap(), RosterEvent::Flushed { count: 1 });
    assert_eq!(events.recv().await.unwrap(), RosterEvent::BatchSaved);

    session.dispose();
    backend.push("macros", json!([]));
    settle(50).await;
    assert_eq!(roster.macros().len(), 2);
}
