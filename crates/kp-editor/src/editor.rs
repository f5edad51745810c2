//! Editing state for a single macro.
//!
//! The editor exclusively owns the macro it edits. Every list operation first
//! stops a running live test, then mutates, then marks the macro dirty.

use std::sync::Arc;

use kp_client::{Outbox, Session};
use kp_protocol::{
    Action, ActionId, ActionPatch, Inbound, InboundKind, ListType, Macro, Outbound, Reply,
    validate,
};
use tracing::{debug, info};

use crate::{EditError, Result};

/// Editor state for one macro.
pub struct MacroEditor {
    /// Delivery path for test start/stop.
    outbox: Arc<dyn Outbox>,
    /// Profile the macro belongs to.
    profile: Option<String>,
    /// The macro being edited.
    current: Macro,
    /// Name the backend stores the macro under; `None` for a new macro.
    stored_name: Option<String>,
    /// Set by every edit, cleared by a successful save.
    unsaved: bool,
    /// Id of the most recently added action.
    last_added: Option<ActionId>,
    /// Whether a live test is running.
    testing: bool,
}

impl MacroEditor {
    /// Start editing a new, empty macro.
    pub fn create(outbox: Arc<dyn Outbox>, profile: Option<&str>) -> Self {
        Self::with_macro(outbox, profile, Macro::new(""), None)
    }

    /// Start editing a macro the backend already stores.
    pub fn open(outbox: Arc<dyn Outbox>, profile: Option<&str>, m: Macro) -> Self {
        let stored = Some(m.name.clone());
        Self::with_macro(outbox, profile, m, stored)
    }

    /// Shared constructor.
    fn with_macro(
        outbox: Arc<dyn Outbox>,
        profile: Option<&str>,
        current: Macro,
        stored_name: Option<String>,
    ) -> Self {
        Self {
            outbox,
            profile: profile.map(str::to_string),
            current,
            stored_name,
            unsaved: false,
            last_added: None,
            testing: false,
        }
    }

    /// The macro as currently edited.
    pub fn current(&self) -> &Macro {
        &self.current
    }

    /// Profile context, if any.
    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    /// Change the profile context.
    pub fn set_profile(&mut self, profile: Option<&str>) {
        self.stop_test();
        self.profile = profile.map(str::to_string);
    }

    /// True after any edit until the next successful save.
    pub fn has_unsaved_changes(&self) -> bool {
        self.unsaved
    }

    /// Id of the most recently added action.
    pub fn last_added_action_id(&self) -> Option<&ActionId> {
        self.last_added.as_ref()
    }

    /// Whether a live test is running.
    pub fn is_testing(&self) -> bool {
        self.testing
    }

    /// Stop any live test and mark the macro dirty.
    fn begin_edit(&mut self) {
        self.stop_test();
        self.unsaved = true;
    }

    /// Append `action` to `list`. Returns its id, which also becomes
    /// [`last_added_action_id`](Self::last_added_action_id).
    pub fn add_action(&mut self, list: ListType, action: Action) -> ActionId {
        self.begin_edit();
        let id = action.id.clone();
        self.current.list_mut(list).push(action);
        self.last_added = Some(id.clone());
        debug!(list = list.as_str(), %id, "action added");
        id
    }

    /// Apply `patch` to the action `id` in `list`.
    ///
    /// # Errors
    /// [`EditError::UnknownAction`] if `id` is not in `list`,
    /// [`EditError::Patch`] if the patch sets an attribute the resulting type
    /// lacks. The macro is unchanged on error.
    pub fn update_action(&mut self, list: ListType, id: &ActionId, patch: ActionPatch) -> Result<()> {
        let pos = self
            .current
            .list(list)
            .iter()
            .position(|a| &a.id == id)
            .ok_or_else(|| EditError::UnknownAction {
                list,
                id: id.clone(),
            })?;
        let mut updated = self.current.list(list)[pos].clone();
        patch.apply(&mut updated)?;
        self.begin_edit();
        self.current.list_mut(list)[pos] = updated;
        Ok(())
    }

    /// Remove the action `id` from `list`. Absent ids are ignored.
    pub fn remove_action(&mut self, list: ListType, id: &ActionId) {
        self.begin_edit();
        self.current.list_mut(list).retain(|a| &a.id != id);
    }

    /// Replace `list` wholesale.
    pub fn reorder_actions(&mut self, list: ListType, order: Vec<Action>) {
        self.begin_edit();
        *self.current.list_mut(list) = order;
    }

    /// Move the action at `src_index` of `src` to `dst_index` of `dst`.
    ///
    /// With `src == dst` this is an element move, not a swap: the action is
    /// removed first and `dst_index` refers to the list without it.
    ///
    /// # Errors
    /// [`EditError::IndexOutOfRange`] if either index is outside its list;
    /// nothing is changed in that case.
    pub fn move_action_between_lists(
        &mut self,
        src: ListType,
        dst: ListType,
        src_index: usize,
        dst_index: usize,
    ) -> Result<()> {
        let src_len = self.current.list(src).len();
        if src_index >= src_len {
            return Err(EditError::IndexOutOfRange {
                list: src,
                index: src_index,
                len: src_len,
            });
        }
        let dst_len = if src == dst {
            src_len - 1
        } else {
            self.current.list(dst).len()
        };
        if dst_index > dst_len {
            return Err(EditError::IndexOutOfRange {
                list: dst,
                index: dst_index,
                len: dst_len,
            });
        }
        self.begin_edit();
        let action = self.current.list_mut(src).remove(src_index);
        self.current.list_mut(dst).insert(dst_index, action);
        Ok(())
    }

    /// Edit macro-level attributes (name, trigger, loop settings, modifiers).
    pub fn update_macro(&mut self, f: impl FnOnce(&mut Macro)) {
        self.begin_edit();
        f(&mut self.current);
    }

    /// Start a live test of the current macro.
    ///
    /// # Errors
    /// [`EditError::NoProfile`] without a profile context.
    pub fn start_test(&mut self) -> Result<()> {
        let profile = self
            .profile
            .clone()
            .filter(|p| !p.is_empty())
            .ok_or(EditError::NoProfile)?;
        self.stop_test();
        self.outbox.post(Outbound::TestMacro {
            profile,
            r#macro: Box::new(self.current.clone()),
        });
        self.testing = true;
        info!(name = %self.current.name, "live test started");
        Ok(())
    }

    /// Stop a running live test, releasing held modifiers. Returns whether a
    /// test was running.
    pub fn stop_test(&mut self) -> bool {
        if !self.testing {
            return false;
        }
        self.outbox.post(Outbound::TestMacroStop {
            clear_modifiers: true,
        });
        self.testing = false;
        info!(name = %self.current.name, "live test stopped");
        true
    }

    /// Stop a running test, or start one. Returns whether a test is running
    /// afterwards.
    pub fn toggle_test(&mut self) -> Result<bool> {
        if self.stop_test() {
            return Ok(false);
        }
        self.start_test()?;
        Ok(true)
    }

    /// Check the macro against its siblings in the profile.
    pub fn validate<'a>(&self, siblings: impl IntoIterator<Item = &'a Macro>) -> Result<()> {
        validate::macro_for_save(&self.current, siblings)?;
        Ok(())
    }

    /// Build the `saveMacro` message after validating locally.
    pub fn save_request<'a>(
        &mut self,
        siblings: impl IntoIterator<Item = &'a Macro>,
    ) -> Result<Outbound> {
        let profile = self.profile.clone().ok_or(EditError::NoProfile)?;
        self.validate(siblings)?;
        self.stop_test();
        Ok(Outbound::SaveMacro {
            profile,
            r#macro: Box::new(self.current.clone()),
            old_name: self.stored_name.clone(),
        })
    }

    /// Apply the backend's reply to a save.
    ///
    /// # Errors
    /// [`EditError::Rejected`] with the reply's text on failure; the macro
    /// stays dirty.
    pub fn on_save_reply(&mut self, reply: &Reply) -> Result<()> {
        if let Some(text) = reply.error_text() {
            return Err(EditError::Rejected(text));
        }
        self.unsaved = false;
        self.stored_name = Some(self.current.name.clone());
        info!(name = %self.current.name, "macro saved");
        Ok(())
    }

    /// Validate, send and await the save.
    pub async fn save<'a>(
        &mut self,
        session: &Session,
        siblings: impl IntoIterator<Item = &'a Macro>,
    ) -> Result<()> {
        let req = self.save_request(siblings)?;
        match session.request(&req, InboundKind::SaveMacro).await? {
            Inbound::SaveMacro(reply) => self.on_save_reply(&reply),
            other => Err(EditError::Rejected(format!(
                "unexpected reply '{}'",
                other.kind().as_str()
            ))),
        }
    }
}

impl Drop for MacroEditor {
    fn drop(&mut self) {
        self.stop_test();
    }
}
