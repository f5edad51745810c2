//! Typed message definitions for the KPMacros protocol.
//!
//! Wire action names are fixed by the backend and reproduced verbatim by
//! [`OutboundKind::as_str`] and [`InboundKind::as_str`].

use std::result::Result as StdResult;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};

use crate::{Envelope, Error, Macro, Profile, Result};

/// Actions the client sends to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum OutboundKind {
    GetProfiles,
    SaveProfile,
    DeleteProfile,
    GetMacros,
    SaveMacro,
    DeleteMacro,
    BatchUpdateMacros,
    TestMacro,
    TestMacroStop,
    GetSettings,
    SaveSettings,
    GetTheme,
    GetThemes,
    SaveTheme,
    GetWindows,
    GetFilePath,
    GetAudioDevices,
    PreviewMouseCursor,
    StopPreviewMouseCursor,
}

impl OutboundKind {
    /// Every outbound kind.
    pub const ALL: [Self; 19] = [
        Self::GetProfiles,
        Self::SaveProfile,
        Self::DeleteProfile,
        Self::GetMacros,
        Self::SaveMacro,
        Self::DeleteMacro,
        Self::BatchUpdateMacros,
        Self::TestMacro,
        Self::TestMacroStop,
        Self::GetSettings,
        Self::SaveSettings,
        Self::GetTheme,
        Self::GetThemes,
        Self::SaveTheme,
        Self::GetWindows,
        Self::GetFilePath,
        Self::GetAudioDevices,
        Self::PreviewMouseCursor,
        Self::StopPreviewMouseCursor,
    ];

    /// Stable wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetProfiles => "getProfiles",
            Self::SaveProfile => "saveProfile",
            Self::DeleteProfile => "deleteProfile",
            Self::GetMacros => "getMacros",
            Self::SaveMacro => "saveMacro",
            Self::DeleteMacro => "deleteMacro",
            Self::BatchUpdateMacros => "batchUpdateMacros",
            Self::TestMacro => "testMacro",
            Self::TestMacroStop => "testMacroStop",
            Self::GetSettings => "getSettings",
            Self::SaveSettings => "saveSettings",
            Self::GetTheme => "getTheme",
            Self::GetThemes => "getThemes",
            Self::SaveTheme => "saveTheme",
            Self::GetWindows => "getWindows",
            Self::GetFilePath => "getFilePath",
            Self::GetAudioDevices => "getAudioDevices",
            Self::PreviewMouseCursor => "previewMouseCursor",
            Self::StopPreviewMouseCursor => "stopPreviewMouseCursor",
        }
    }

    /// Parse a wire name.
    pub fn try_from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Stop signals jump the send queue so they are not stuck behind bulk writes.
    pub fn is_high_priority(&self) -> bool {
        matches!(self, Self::TestMacroStop | Self::StopPreviewMouseCursor)
    }
}

/// Actions the backend sends to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum InboundKind {
    Profiles,
    ProfileSaved,
    ProfileDeleted,
    Macros,
    BatchMacrosUpdated,
    Settings,
    SettingsSaved,
    Theme,
    Themes,
    Windows,
    PreviewMouseLocationUpdated,
    SaveMacro,
    GetFilePath,
    SaveTheme,
    GetAudioDevices,
}

impl InboundKind {
    /// Every inbound kind.
    pub const ALL: [Self; 15] = [
        Self::Profiles,
        Self::ProfileSaved,
        Self::ProfileDeleted,
        Self::Macros,
        Self::BatchMacrosUpdated,
        Self::Settings,
        Self::SettingsSaved,
        Self::Theme,
        Self::Themes,
        Self::Windows,
        Self::PreviewMouseLocationUpdated,
        Self::SaveMacro,
        Self::GetFilePath,
        Self::SaveTheme,
        Self::GetAudioDevices,
    ];

    /// Stable wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Profiles => "profiles",
            Self::ProfileSaved => "profileSaved",
            Self::ProfileDeleted => "profileDeleted",
            Self::Macros => "macros",
            Self::BatchMacrosUpdated => "batchMacrosUpdated",
            Self::Settings => "settings",
            Self::SettingsSaved => "settingsSaved",
            Self::Theme => "theme",
            Self::Themes => "themes",
            Self::Windows => "windows",
            Self::PreviewMouseLocationUpdated => "previewMouseLocationUpdated",
            Self::SaveMacro => "saveMacro",
            Self::GetFilePath => "getFilePath",
            Self::SaveTheme => "saveTheme",
            Self::GetAudioDevices => "getAudioDevices",
        }
    }

    /// Parse a wire name.
    pub fn try_from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

/// Generic reply payload: `{message?, success?, error?}`.
///
/// `success` and `error` are mutually exclusive by convention only. Any other
/// keys the backend includes are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Reply {
    /// Human-readable detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Present on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<Value>,
    /// Present on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    /// Remaining payload keys.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Reply {
    /// A successful reply.
    pub fn ok(message: &str) -> Self {
        Self {
            message: Some(message.to_string()),
            success: Some(Value::Bool(true)),
            ..Self::default()
        }
    }

    /// A failed reply.
    pub fn failed(message: &str) -> Self {
        Self {
            message: Some(message.to_string()),
            error: Some(Value::Bool(true)),
            ..Self::default()
        }
    }

    /// True when the reply reports a failure.
    pub fn is_error(&self) -> bool {
        let flagged = |v: &Option<Value>| !matches!(v, None | Some(Value::Null | Value::Bool(false)));
        flagged(&self.error) || matches!(self.success, Some(Value::Bool(false)))
    }

    /// True when the reply reports completion.
    pub fn is_success(&self) -> bool {
        !self.is_error() && !matches!(self.success, None | Some(Value::Null))
    }

    /// Human-readable failure text, if the reply is an error.
    pub fn error_text(&self) -> Option<String> {
        if !self.is_error() {
            return None;
        }
        if let Some(m) = &self.message {
            return Some(m.clone());
        }
        match &self.error {
            Some(Value::String(s)) => Some(s.clone()),
            _ => Some("unknown error".to_string()),
        }
    }

    /// Convert into `Ok(self)` or `Err(error_text)`.
    pub fn into_result(self) -> StdResult<Self, String> {
        match self.error_text() {
            Some(text) => Err(text),
            None => Ok(self),
        }
    }
}

/// Cursor position reported while a mouse preview is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct CursorLocation {
    pub x: i32,
    pub y: i32,
}

/// Messages the client sends to the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Request the profile list.
    GetProfiles,
    /// Create or update (rename when `old_name` is set) a profile.
    SaveProfile(Profile),
    /// Delete a profile by name.
    DeleteProfile {
        /// Profile name.
        name: String,
    },
    /// Request the macros of a profile.
    GetMacros {
        /// Profile name.
        profile: String,
    },
    /// Create or update a macro.
    SaveMacro {
        /// Owning profile.
        profile: String,
        /// Full macro snapshot.
        r#macro: Box<Macro>,
        /// Name the backend currently stores the macro under, when updating.
        old_name: Option<String>,
    },
    /// Delete a macro by name.
    DeleteMacro {
        /// Owning profile.
        profile: String,
        /// Macro name.
        name: String,
    },
    /// Persist several list-level macro edits at once.
    BatchUpdateMacros {
        /// Owning profile.
        profile: String,
        /// Full snapshots of every modified macro.
        macros: Vec<Macro>,
    },
    /// Arm a macro for a live test.
    TestMacro {
        /// Profile context the test runs in.
        profile: String,
        /// Full macro snapshot.
        r#macro: Box<Macro>,
    },
    /// Stop a live test.
    TestMacroStop {
        /// Release any modifier keys the test left held down.
        clear_modifiers: bool,
    },
    /// Request application settings.
    GetSettings,
    /// Persist application settings.
    SaveSettings(Value),
    /// Request the active theme.
    GetTheme,
    /// Request all themes.
    GetThemes,
    /// Persist a theme.
    SaveTheme(Value),
    /// Request the list of open windows.
    GetWindows,
    /// Ask the backend to show a file picker.
    GetFilePath(Value),
    /// Request the audio output devices.
    GetAudioDevices,
    /// Show a cursor preview at a location.
    PreviewMouseCursor {
        /// X coordinate or delta.
        x: i32,
        /// Y coordinate or delta.
        y: i32,
        /// Interpret coordinates relative to the current cursor.
        relative: bool,
    },
    /// Hide the cursor preview.
    StopPreviewMouseCursor,
}

impl Outbound {
    /// Discriminant of this message.
    pub fn kind(&self) -> OutboundKind {
        match self {
            Self::GetProfiles => OutboundKind::GetProfiles,
            Self::SaveProfile(_) => OutboundKind::SaveProfile,
            Self::DeleteProfile { .. } => OutboundKind::DeleteProfile,
            Self::GetMacros { .. } => OutboundKind::GetMacros,
            Self::SaveMacro { .. } => OutboundKind::SaveMacro,
            Self::DeleteMacro { .. } => OutboundKind::DeleteMacro,
            Self::BatchUpdateMacros { .. } => OutboundKind::BatchUpdateMacros,
            Self::TestMacro { .. } => OutboundKind::TestMacro,
            Self::TestMacroStop { .. } => OutboundKind::TestMacroStop,
            Self::GetSettings => OutboundKind::GetSettings,
            Self::SaveSettings(_) => OutboundKind::SaveSettings,
            Self::GetTheme => OutboundKind::GetTheme,
            Self::GetThemes => OutboundKind::GetThemes,
            Self::SaveTheme(_) => OutboundKind::SaveTheme,
            Self::GetWindows => OutboundKind::GetWindows,
            Self::GetFilePath(_) => OutboundKind::GetFilePath,
            Self::GetAudioDevices => OutboundKind::GetAudioDevices,
            Self::PreviewMouseCursor { .. } => OutboundKind::PreviewMouseCursor,
            Self::StopPreviewMouseCursor => OutboundKind::StopPreviewMouseCursor,
        }
    }

    /// Payload half of the envelope.
    fn data(&self) -> Result<Value> {
        let v = match self {
            Self::GetProfiles
            | Self::GetSettings
            | Self::GetTheme
            | Self::GetThemes
            | Self::GetWindows
            | Self::GetAudioDevices
            | Self::StopPreviewMouseCursor => json!({}),
            Self::SaveProfile(p) => serde_json::to_value(p)?,
            Self::DeleteProfile { name } => json!({ "name": name }),
            Self::GetMacros { profile } => json!({ "profile": profile }),
            Self::SaveMacro {
                profile,
                r#macro,
                old_name,
            } => {
                let mut v = json!({ "profile": profile, "macro": serde_json::to_value(r#macro)? });
                if let Some(old) = old_name {
                    v["oldName"] = Value::String(old.clone());
                }
                v
            }
            Self::DeleteMacro { profile, name } => json!({ "profile": profile, "name": name }),
            Self::BatchUpdateMacros { profile, macros } => {
                json!({ "profile": profile, "macros": serde_json::to_value(macros)? })
            }
            Self::TestMacro { profile, r#macro } => {
                json!({ "profile": profile, "macro": serde_json::to_value(r#macro)? })
            }
            Self::TestMacroStop { clear_modifiers } => json!({ "clearModifiers": clear_modifiers }),
            Self::SaveSettings(v) | Self::SaveTheme(v) | Self::GetFilePath(v) => v.clone(),
            Self::PreviewMouseCursor { x, y, relative } => {
                json!({ "x": x, "y": y, "relative": relative })
            }
        };
        Ok(v)
    }

    /// Encode into a wire envelope.
    pub fn to_envelope(&self) -> Result<Envelope> {
        Ok(Envelope::new(self.kind().as_str(), self.data()?))
    }
}

/// Messages the backend sends to the client.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum Inbound {
    Profiles(Vec<Profile>),
    ProfileSaved(Reply),
    ProfileDeleted(Reply),
    Macros(Vec<Macro>),
    BatchMacrosUpdated(Reply),
    Settings(Value),
    SettingsSaved(Reply),
    Theme(Value),
    Themes(Value),
    Windows(Vec<String>),
    PreviewMouseLocationUpdated(CursorLocation),
    /// Reply to `saveMacro`.
    SaveMacro(Reply),
    /// Reply to `getFilePath`.
    GetFilePath(Reply),
    /// Reply to `saveTheme`.
    SaveTheme(Reply),
    /// Reply to `getAudioDevices`.
    GetAudioDevices(Value),
}

/// Decode `data` as `T`, tagging failures with the action name.
fn decode<T: DeserializeOwned>(kind: InboundKind, data: Value) -> Result<T> {
    serde_json::from_value(data).map_err(|source| Error::InvalidPayload {
        action: kind.as_str(),
        source,
    })
}

impl Inbound {
    /// Discriminant of this message.
    pub fn kind(&self) -> InboundKind {
        match self {
            Self::Profiles(_) => InboundKind::Profiles,
            Self::ProfileSaved(_) => InboundKind::ProfileSaved,
            Self::ProfileDeleted(_) => InboundKind::ProfileDeleted,
            Self::Macros(_) => InboundKind::Macros,
            Self::BatchMacrosUpdated(_) => InboundKind::BatchMacrosUpdated,
            Self::Settings(_) => InboundKind::Settings,
            Self::SettingsSaved(_) => InboundKind::SettingsSaved,
            Self::Theme(_) => InboundKind::Theme,
            Self::Themes(_) => InboundKind::Themes,
            Self::Windows(_) => InboundKind::Windows,
            Self::PreviewMouseLocationUpdated(_) => InboundKind::PreviewMouseLocationUpdated,
            Self::SaveMacro(_) => InboundKind::SaveMacro,
            Self::GetFilePath(_) => InboundKind::GetFilePath,
            Self::SaveTheme(_) => InboundKind::SaveTheme,
            Self::GetAudioDevices(_) => InboundKind::GetAudioDevices,
        }
    }

    /// Decode an inbound envelope.
    ///
    /// # Errors
    /// [`Error::UnknownAction`] for action names this client does not know,
    /// [`Error::InvalidPayload`] when `data` has the wrong shape.
    pub fn from_envelope(env: Envelope) -> Result<Self> {
        let kind =
            InboundKind::try_from_str(&env.action).ok_or(Error::UnknownAction(env.action))?;
        let data = env.data;
        Ok(match kind {
            InboundKind::Profiles => Self::Profiles(decode(kind, data)?),
            InboundKind::ProfileSaved => Self::ProfileSaved(decode(kind, data)?),
            InboundKind::ProfileDeleted => Self::ProfileDeleted(decode(kind, data)?),
            InboundKind::Macros => Self::Macros(decode(kind, data)?),
            InboundKind::BatchMacrosUpdated => Self::BatchMacrosUpdated(decode(kind, data)?),
            InboundKind::Settings => Self::Settings(data),
            InboundKind::SettingsSaved => Self::SettingsSaved(decode(kind, data)?),
            InboundKind::Theme => Self::Theme(data),
            InboundKind::Themes => Self::Themes(data),
            InboundKind::Windows => Self::Windows(decode(kind, data)?),
            InboundKind::PreviewMouseLocationUpdated => {
                Self::PreviewMouseLocationUpdated(decode(kind, data)?)
            }
            InboundKind::SaveMacro => Self::SaveMacro(decode(kind, data)?),
            InboundKind::GetFilePath => Self::GetFilePath(decode(kind, data)?),
            InboundKind::SaveTheme => Self::SaveTheme(decode(kind, data)?),
            InboundKind::GetAudioDevices => Self::GetAudioDevices(data),
        })
    }

    /// The reply payload, for kinds that carry one.
    pub fn reply(&self) -> Option<&Reply> {
        match self {
            Self::ProfileSaved(r)
            | Self::ProfileDeleted(r)
            | Self::BatchMacrosUpdated(r)
            | Self::SettingsSaved(r)
            | Self::SaveMacro(r)
            | Self::GetFilePath(r)
            | Self::SaveTheme(r) => Some(r),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Action, PressState};

    #[test]
    fn kind_names_round_trip() {
        for k in OutboundKind::ALL {
            assert_eq!(OutboundKind::try_from_str(k.as_str()), Some(k));
        }
        for k in InboundKind::ALL {
            assert_eq!(InboundKind::try_from_str(k.as_str()), Some(k));
        }
        assert_eq!(InboundKind::try_from_str("nope"), None);
    }

    #[test]
    fn save_macro_carries_old_name_and_no_ids() {
        let mut m = Macro::new("renamed");
        m.start.push(Action::keyboard("A", PressState::Press));
        let env = Outbound::SaveMacro {
            profile: "Global".into(),
            r#macro: Box::new(m),
            old_name: Some("orig".into()),
        }
        .to_envelope()
        .unwrap();
        assert_eq!(env.action, "saveMacro");
        assert_eq!(env.data["oldName"], json!("orig"));
        assert_eq!(env.data["macro"]["name"], json!("renamed"));
        assert!(env.data["macro"]["start"][0].get("id").is_none());
    }

    #[test]
    fn test_stop_payload() {
        let env = Outbound::TestMacroStop {
            clear_modifiers: true,
        }
        .to_envelope()
        .unwrap();
        assert_eq!(env.data, json!({"clearModifiers": true}));
        assert!(OutboundKind::TestMacroStop.is_high_priority());
        assert!(!OutboundKind::GetProfiles.is_high_priority());
    }

    #[test]
    fn decodes_macros_list() {
        let env = Envelope::new("macros", json!([{"name": "m1", "activator": "F1"}]));
        let Inbound::Macros(list) = Inbound::from_envelope(env).unwrap() else {
            panic!("expected macros");
        };
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "m1");
    }

    #[test]
    fn unknown_and_invalid_payloads() {
        let err = Inbound::from_envelope(Envelope::new("mystery", Value::Null)).unwrap_err();
        assert!(matches!(err, Error::UnknownAction(a) if a == "mystery"));
        let err = Inbound::from_envelope(Envelope::new("windows", json!(5))).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidPayload {
                action: "windows",
                ..
            }
        ));
    }

    #[test]
    fn reply_convention() {
        let r: Reply = serde_json::from_value(json!({"error": "boom", "message": "disk full"})).unwrap();
        assert!(r.is_error());
        assert_eq!(r.error_text().as_deref(), Some("disk full"));

        let r: Reply = serde_json::from_value(json!({"success": "saved"})).unwrap();
        assert!(r.is_success());
        assert!(r.clone().into_result().is_ok());

        let r: Reply = serde_json::from_value(json!({"success": false})).unwrap();
        assert!(r.is_error());
        assert_eq!(r.error_text().as_deref(), Some("unknown error"));

        let r: Reply = serde_json::from_value(json!({"filePath": "C:/a.wav"})).unwrap();
        assert!(!r.is_error());
        assert_eq!(r.extra["filePath"], json!("C:/a.wav"));
    }
}
