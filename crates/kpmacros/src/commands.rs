use std::{sync::Arc, time::Duration};

use kp_client::{Client, ConnectionEvent, Error, Session};
use kp_editor::{EditError, MacroRoster, Result, RosterEvent};
use kp_protocol::{Inbound, InboundKind, Outbound};
use tokio::{signal, sync::broadcast, time};
use tracing::{info, warn};

/// How long `toggle` waits for each backend step.
const STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// Print the profile list.
pub async fn profiles(client: &Client) -> Result<()> {
    let session = Session::new(client);
    if let Inbound::Profiles(list) = session
        .request(&Outbound::GetProfiles, InboundKind::Profiles)
        .await?
    {
        for p in list {
            if p.windows.is_empty() {
                println!("{}", p.name);
            } else {
                println!("{}\t{}", p.name, p.windows.join(", "));
            }
        }
    }
    Ok(())
}

/// Print the macros of `profile`.
pub async fn macros(client: &Client, profile: &str) -> Result<()> {
    let session = Session::new(client);
    let msg = Outbound::GetMacros {
        profile: profile.to_string(),
    };
    if let Inbound::Macros(list) = session.request(&msg, InboundKind::Macros).await? {
        for m in list {
            println!(
                "{}\t{}\t{:?} {}\t{:?}\t{} actions",
                if m.enabled { "on " } else { "off" },
                m.name,
                m.trigger,
                m.activator,
                m.loop_mode,
                m.action_count()
            );
        }
    }
    Ok(())
}

/// Wait for the next roster event matching `pred`.
async fn next_event(
    events: &mut broadcast::Receiver<RosterEvent>,
    action: &'static str,
    pred: impl Fn(&RosterEvent) -> bool,
) -> Result<RosterEvent> {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(ev) if pred(&ev) => return Ok(ev),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return Err(Error::Disposed),
            }
        }
    };
    match time::timeout(STEP_TIMEOUT, wait).await {
        Ok(res) => Ok(res?),
        Err(_) => Err(Error::Timeout { action }.into()),
    }
}

/// Flip a macro's enabled flag through the batched roster path.
pub async fn toggle(client: &Client, profile: &str, name: &str) -> Result<()> {
    let session = Session::new(client);
    let roster = MacroRoster::new(Arc::new(client.clone()), profile);
    roster.attach(&session);
    let mut events = roster.events();

    roster.load();
    next_event(&mut events, "macros", |ev| {
        matches!(ev, RosterEvent::Loaded { .. })
    })
    .await?;

    let m = roster
        .find(name)
        .ok_or_else(|| EditError::UnknownMacro(name.to_string()))?;
    let enabled = roster.toggle_enabled(&m.id)?;
    roster.flush();

    match next_event(&mut events, "batchMacrosUpdated", |ev| {
        matches!(
            ev,
            RosterEvent::BatchSaved | RosterEvent::BatchFailed { .. }
        )
    })
    .await?
    {
        RosterEvent::BatchFailed { message, .. } => Err(EditError::Rejected(message)),
        _ => {
            println!("{name}: {}", if enabled { "enabled" } else { "disabled" });
            Ok(())
        }
    }
}

/// Print inbound traffic and connection events until Ctrl-C.
pub async fn watch(client: &Client) -> Result<()> {
    let session = Session::new(client);
    for kind in InboundKind::ALL {
        session.on(kind, |msg| println!("<- {}: {msg:?}", msg.kind().as_str()));
    }
    let mut conn = session.connection_events();
    client.open();
    info!(url = client.url(), "watching");

    loop {
        tokio::select! {
            ev = conn.recv() => match ev {
                Ok(ConnectionEvent::Opened) => println!("-- connected"),
                Ok(ConnectionEvent::Closed { attempt, reconnect_in }) => match (attempt, reconnect_in) {
                    (Some(n), Some(d)) => println!("-- closed, retry {n} in {}ms", d.as_millis()),
                    _ => println!("-- closed"),
                },
                Ok(ConnectionEvent::GaveUp { attempts }) => {
                    println!("-- gave up after {attempts} attempts");
                    return Ok(());
                }
                Err(broadcast::error::RecvError::Lagged(n)) => warn!(skipped = n, "event stream lagged"),
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
            res = signal::ctrl_c() => {
                res.map_err(Error::from)?;
                return Ok(());
            }
        }
    }
}
