//! Client-side validation that gates saves before anything is sent.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::{Macro, Profile, TriggerKind};

/// Reasons a local edit cannot be saved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Name is empty or whitespace.
    #[error("name must not be empty")]
    EmptyName,
    /// Activator does not parse for the trigger kind.
    #[error("invalid {trigger:?} activator '{activator}'")]
    InvalidActivator {
        /// Trigger kind the activator was checked against.
        trigger: TriggerKind,
        /// Offending activator.
        activator: String,
    },
    /// Another entry already uses the name.
    #[error("'{0}' already exists")]
    DuplicateName(String),
    /// Built-in profiles cannot be renamed or deleted.
    #[error("'{0}' is a built-in profile")]
    ReservedProfile(String),
}

/// Key names: letters, digits, `F1`-`F24`, and named keys such as `Numpad0` or `Mouse4`.
fn hotkey_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9]*$|^[0-9]$").ok())
        .as_ref()
}

/// Commands: a word of letters, digits, `-` or `_`, optionally prefixed by `/`.
fn command_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/?[A-Za-z0-9_-]+$").ok())
        .as_ref()
}

/// Check an activator against its trigger kind.
pub fn activator(trigger: TriggerKind, activator: &str) -> Result<(), ValidationError> {
    let re = match trigger {
        TriggerKind::Hotkey => hotkey_re(),
        TriggerKind::Command => command_re(),
    };
    let ok = re.is_some_and(|re| re.is_match(activator));
    if ok {
        Ok(())
    } else {
        Err(ValidationError::InvalidActivator {
            trigger,
            activator: activator.to_string(),
        })
    }
}

/// Check a macro before saving. `siblings` are the other macros of the profile.
pub fn macro_for_save<'a>(
    m: &Macro,
    siblings: impl IntoIterator<Item = &'a Macro>,
) -> Result<(), ValidationError> {
    let name = m.name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    activator(m.trigger, &m.activator)?;
    if siblings
        .into_iter()
        .any(|other| other.id != m.id && other.name.trim() == name)
    {
        return Err(ValidationError::DuplicateName(name.to_string()));
    }
    Ok(())
}

/// Check a profile save. `old_name` is the current name when renaming.
pub fn profile_for_save(
    p: &Profile,
    old_name: Option<&str>,
    existing: &[Profile],
) -> Result<(), ValidationError> {
    let name = p.name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if let Some(old) = old_name
        && Profile::is_reserved_name(old)
        && old != name
    {
        return Err(ValidationError::ReservedProfile(old.to_string()));
    }
    let renaming_to_self = old_name == Some(name);
    if !renaming_to_self && existing.iter().any(|e| e.name == name) {
        return Err(ValidationError::DuplicateName(name.to_string()));
    }
    Ok(())
}

/// Check a profile delete.
pub fn profile_for_delete(name: &str) -> Result<(), ValidationError> {
    if Profile::is_reserved_name(name) {
        return Err(ValidationError::ReservedProfile(name.to_string()));
    }
    Ok(())
}
