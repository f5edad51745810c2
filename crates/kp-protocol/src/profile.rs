use serde::{Deserialize, Serialize};

/// A window-scoped context that owns a set of macros.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Unique profile name.
    pub name: String,
    /// Window or process names that activate this profile.
    #[serde(default)]
    pub windows: Vec<String>,
    /// Previous name; only present on the message that renames a profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_name: Option<String>,
}

impl Profile {
    /// Profile active in every window.
    pub const GLOBAL: &'static str = "Global";
    /// Profile active in every window, suppressing the key for other apps.
    pub const GLOBAL_EXCLUSIVE: &'static str = "Global Exclusive";

    /// A profile with no windows.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            windows: Vec::new(),
            old_name: None,
        }
    }

    /// True if `name` is one of the two built-in profiles.
    pub fn is_reserved_name(name: &str) -> bool {
        name == Self::GLOBAL || name == Self::GLOBAL_EXCLUSIVE
    }

    /// True if this is a built-in profile.
    pub fn is_reserved(&self) -> bool {
        Self::is_reserved_name(&self.name)
    }
}
