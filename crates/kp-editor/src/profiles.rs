//! Profile list with local validation of saves and deletes.

use std::sync::Arc;

use kp_client::{Outbox, Session};
use kp_protocol::{Inbound, InboundKind, Outbound, Profile, validate};
use parking_lot::Mutex;
use tracing::warn;

use crate::{EditError, Result};

/// Outcome of an inbound profile message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileEvent {
    /// The list was replaced.
    Loaded(usize),
    /// A save or delete succeeded; the list is being reloaded.
    Changed,
    /// A save or delete failed.
    Failed(String),
}

/// Mutable profile state.
#[derive(Default)]
struct ProfileState {
    /// Known profiles in backend order.
    profiles: Vec<Profile>,
    /// Name of the selected profile.
    selected: Option<String>,
}

/// The backend's profile list plus the current selection.
pub struct ProfileRoster {
    /// Delivery path.
    outbox: Arc<dyn Outbox>,
    /// Shared state.
    state: Arc<Mutex<ProfileState>>,
}

impl ProfileRoster {
    /// Create an empty roster.
    pub fn new(outbox: Arc<dyn Outbox>) -> Self {
        Self {
            outbox,
            state: Arc::default(),
        }
    }

    /// Route `profiles`, `profileSaved` and `profileDeleted` from `session`
    /// into this roster.
    pub fn attach(&self, session: &Session) {
        for kind in [
            InboundKind::Profiles,
            InboundKind::ProfileSaved,
            InboundKind::ProfileDeleted,
        ] {
            let state = self.state.clone();
            let outbox = self.outbox.clone();
            session.on(kind, move |msg| {
                handle(&state, outbox.as_ref(), msg);
            });
        }
    }

    /// Request the profile list.
    pub fn load(&self) {
        self.outbox.post(Outbound::GetProfiles);
    }

    /// Snapshot of the list.
    pub fn profiles(&self) -> Vec<Profile> {
        self.state.lock().profiles.clone()
    }

    /// Selected profile name.
    pub fn selected(&self) -> Option<String> {
        self.state.lock().selected.clone()
    }

    /// Select a profile by name.
    pub fn select(&self, name: &str) -> Result<()> {
        let mut s = self.state.lock();
        if !s.profiles.iter().any(|p| p.name == name) {
            return Err(EditError::UnknownProfile(name.to_string()));
        }
        s.selected = Some(name.to_string());
        Ok(())
    }

    /// Validate and send a profile save. `old_name` is the stored name when
    /// renaming or editing an existing profile.
    pub fn save_profile(&self, mut profile: Profile, old_name: Option<&str>) -> Result<()> {
        profile.name = profile.name.trim().to_string();
        {
            let s = self.state.lock();
            validate::profile_for_save(&profile, old_name, &s.profiles)?;
        }
        profile.old_name = old_name.map(str::to_string);
        self.outbox.post(Outbound::SaveProfile(profile));
        Ok(())
    }

    /// Validate and send a profile delete.
    pub fn delete_profile(&self, name: &str) -> Result<()> {
        validate::profile_for_delete(name)?;
        if !self.state.lock().profiles.iter().any(|p| p.name == name) {
            return Err(EditError::UnknownProfile(name.to_string()));
        }
        self.outbox.post(Outbound::DeleteProfile {
            name: name.to_string(),
        });
        Ok(())
    }

    /// Apply an inbound message.
    pub fn handle(&self, msg: &Inbound) -> Option<ProfileEvent> {
        handle(&self.state, self.outbox.as_ref(), msg)
    }
}

/// Inbound handling shared by [`ProfileRoster::handle`] and session handlers.
fn handle(state: &Mutex<ProfileState>, outbox: &dyn Outbox, msg: &Inbound) -> Option<ProfileEvent> {
    match msg {
        Inbound::Profiles(list) => {
            let mut s = state.lock();
            s.profiles = list.clone();
            let keep = s
                .selected
                .as_ref()
                .is_some_and(|sel| list.iter().any(|p| &p.name == sel));
            if !keep {
                s.selected = list.first().map(|p| p.name.clone());
            }
            Some(ProfileEvent::Loaded(list.len()))
        }
        Inbound::ProfileSaved(reply) | Inbound::ProfileDeleted(reply) => match reply.error_text() {
            None => {
                outbox.post(Outbound::GetProfiles);
                Some(ProfileEvent::Changed)
            }
            Some(text) => {
                warn!(action = msg.kind().as_str(), %text, "profile change failed");
                Some(ProfileEvent::Failed(text))
            }
        },
        _ => None,
    }
}
