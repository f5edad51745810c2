//! Partial action updates.
//!
//! A patch distinguishes "leave this attribute alone" from "remove this
//! attribute" from "set this attribute". Changing the action type starts from
//! the empty template of the new type, so attributes of the old type never
//! survive a type switch.

use crate::{
    Error, Result,
    model::{Action, ActionBody, ActionType, MouseButton, PressState, ScrollDirection},
};

/// One attribute of a patch.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Field<T> {
    /// Leave the attribute unchanged.
    #[default]
    Keep,
    /// Remove the attribute.
    Clear,
    /// Replace the attribute.
    Set(T),
}

impl<T> Field<T> {
    /// True for [`Field::Set`].
    pub fn is_set(&self) -> bool {
        matches!(self, Self::Set(_))
    }

    /// Apply this field to an optional attribute slot.
    fn apply(self, slot: &mut Option<T>) {
        match self {
            Self::Keep => {}
            Self::Clear => *slot = None,
            Self::Set(v) => *slot = Some(v),
        }
    }
}

/// Partial update for an [`Action`].
#[derive(Debug, Clone, PartialEq, Default)]
#[allow(missing_docs)]
pub struct ActionPatch {
    /// New action type; `None` keeps the current one.
    pub kind: Option<ActionType>,
    pub key: Field<String>,
    pub state: Field<PressState>,
    pub button: Field<MouseButton>,
    pub x: Field<i32>,
    pub y: Field<i32>,
    pub relative: Field<bool>,
    pub scroll: Field<ScrollDirection>,
    pub amount: Field<i32>,
    pub text: Field<String>,
    pub duration: Field<u64>,
    pub file_path: Field<String>,
    pub audio_device: Field<String>,
    pub volume: Field<f64>,
    pub arguments: Field<String>,
    pub hidden: Field<bool>,
}

impl ActionPatch {
    /// A patch that switches the action to `kind`.
    pub fn switch_to(kind: ActionType) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Wire names of every attribute this patch sets.
    fn set_fields(&self) -> Vec<&'static str> {
        let flags = [
            ("key", self.key.is_set()),
            ("state", self.state.is_set()),
            ("button", self.button.is_set()),
            ("x", self.x.is_set()),
            ("y", self.y.is_set()),
            ("relative", self.relative.is_set()),
            ("scroll", self.scroll.is_set()),
            ("amount", self.amount.is_set()),
            ("text", self.text.is_set()),
            ("duration", self.duration.is_set()),
            ("filePath", self.file_path.is_set()),
            ("audioDevice", self.audio_device.is_set()),
            ("volume", self.volume.is_set()),
            ("arguments", self.arguments.is_set()),
            ("hidden", self.hidden.is_set()),
        ];
        flags
            .into_iter()
            .filter_map(|(name, set)| set.then_some(name))
            .collect()
    }

    /// Apply the patch to `action`.
    ///
    /// Clearing an attribute the resulting type does not have is a no-op.
    /// Setting one is rejected and leaves `action` untouched.
    pub fn apply(self, action: &mut Action) -> Result<()> {
        let kind = self.kind.unwrap_or_else(|| action.kind());
        if let Some(field) = self
            .set_fields()
            .into_iter()
            .find(|f| !kind.fields().contains(f))
        {
            return Err(Error::FieldNotApplicable { field, kind });
        }

        let mut body = if kind == action.kind() {
            action.body.clone()
        } else {
            ActionBody::empty(kind)
        };
        match &mut body {
            ActionBody::Keyboard(k) => {
                self.key.apply(&mut k.key);
                self.state.apply(&mut k.state);
            }
            ActionBody::Mouse(m) => {
                self.button.apply(&mut m.button);
                self.state.apply(&mut m.state);
                self.x.apply(&mut m.x);
                self.y.apply(&mut m.y);
                self.relative.apply(&mut m.relative);
                self.scroll.apply(&mut m.scroll);
                self.amount.apply(&mut m.amount);
            }
            ActionBody::Text(t) => self.text.apply(&mut t.text),
            ActionBody::Delay(d) => self.duration.apply(&mut d.duration),
            ActionBody::Sound(s) => {
                self.file_path.apply(&mut s.file_path);
                self.audio_device.apply(&mut s.audio_device);
                self.volume.apply(&mut s.volume);
            }
            ActionBody::Process(p) => {
                self.file_path.apply(&mut p.file_path);
                self.arguments.apply(&mut p.arguments);
                self.hidden.apply(&mut p.hidden);
            }
        }
        action.body = body;
        Ok(())
    }
}
