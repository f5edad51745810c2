//! Macro and action data model.
//!
//! Local identifiers ([`MacroId`], [`ActionId`]) exist only on the client.
//! They are skipped by serde in both directions, so every serialized macro
//! is already stripped of ids and every decoded macro receives fresh ones.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque client-side identifier for a macro.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacroId(String);

impl MacroId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MacroId {
    fn default() -> Self {
        Self::generate()
    }
}

impl fmt::Display for MacroId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque client-side identifier for an action, unique within its macro.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(String);

impl ActionId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::generate()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a macro is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TriggerKind {
    /// Triggered by a global hotkey.
    #[default]
    Hotkey,
    /// Triggered by a typed command.
    Command,
}

/// How the loop list repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoopMode {
    /// Loop while the activator is held.
    #[default]
    Held,
    /// First activation starts the loop, the next one stops it.
    Toggle,
}

impl LoopMode {
    /// The other mode.
    pub fn toggled(self) -> Self {
        match self {
            Self::Held => Self::Toggle,
            Self::Toggle => Self::Held,
        }
    }
}

/// How the modifier mask is matched against the live keyboard state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModifierMode {
    /// The listed modifiers must be held; others are ignored.
    #[default]
    Inclusive,
    /// Exactly the listed modifiers must be held.
    Exclusive,
}

bitflags! {
    /// Modifier bitmask, using the Win32 `RegisterHotKey` bit layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(from = "u32", into = "u32")]
    pub struct Modifiers: u32 {
        /// Either Alt key.
        const ALT = 0x1;
        /// Either Control key.
        const CTRL = 0x2;
        /// Either Shift key.
        const SHIFT = 0x4;
        /// Either Windows key.
        const WIN = 0x8;
    }
}

impl Default for Modifiers {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<u32> for Modifiers {
    fn from(bits: u32) -> Self {
        Self::from_bits_retain(bits)
    }
}

impl From<Modifiers> for u32 {
    fn from(m: Modifiers) -> Self {
        m.bits()
    }
}

/// Which of the three ordered lists of a macro.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListType {
    /// Runs once when the macro is activated.
    Start,
    /// Repeats while the macro is active.
    Loop,
    /// Runs once when the macro ends.
    Finish,
}

impl ListType {
    /// All lists, in execution order.
    pub const ALL: [Self; 3] = [Self::Start, Self::Loop, Self::Finish];

    /// Wire name of the list.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Loop => "loop",
            Self::Finish => "finish",
        }
    }
}

impl fmt::Display for ListType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Press/release state used by keyboard and mouse-button actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PressState {
    /// Key or button goes down.
    Press,
    /// Key or button goes up.
    Release,
    /// Down immediately followed by up.
    Click,
}

/// Mouse buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    X1,
    X2,
}

/// Scroll wheel direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

/// Discriminant of [`ActionBody`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum ActionType {
    Keyboard,
    Mouse,
    Text,
    Delay,
    Sound,
    Process,
}

impl ActionType {
    /// Wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keyboard => "keyboard",
            Self::Mouse => "mouse",
            Self::Text => "text",
            Self::Delay => "delay",
            Self::Sound => "sound",
            Self::Process => "process",
        }
    }

    /// Wire names of the attributes an action of this type may carry.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            Self::Keyboard => &["key", "state"],
            Self::Mouse => &["button", "state", "x", "y", "relative", "scroll", "amount"],
            Self::Text => &["text"],
            Self::Delay => &["duration"],
            Self::Sound => &["filePath", "audioDevice", "volume"],
            Self::Process => &["filePath", "arguments", "hidden"],
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyboard key press/release.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyboardAction {
    /// Key name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Press state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<PressState>,
}

/// Mouse button, movement or scroll.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MouseAction {
    /// Button for click actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button: Option<MouseButton>,
    /// Button press state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<PressState>,
    /// Target x coordinate (or delta when `relative`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i32>,
    /// Target y coordinate (or delta when `relative`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<i32>,
    /// Interpret `x`/`y` relative to the current cursor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative: Option<bool>,
    /// Scroll direction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll: Option<ScrollDirection>,
    /// Scroll amount in notches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i32>,
}

/// Type out a string.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TextAction {
    /// Text to type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Wait before the next action.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DelayAction {
    /// Delay in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

/// Play an audio file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoundAction {
    /// Path of the audio file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Output device name; backend default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_device: Option<String>,
    /// Playback volume, 0.0 to 1.0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

/// Launch a process.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessAction {
    /// Executable path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Command-line arguments as a single string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
    /// Start the process without a visible window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
}

/// Type-specific attributes of an action. Exactly one variant's fields exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum ActionBody {
    Keyboard(KeyboardAction),
    Mouse(MouseAction),
    Text(TextAction),
    Delay(DelayAction),
    Sound(SoundAction),
    Process(ProcessAction),
}

impl ActionBody {
    /// The empty template for `kind`: the type tag with no attributes.
    pub fn empty(kind: ActionType) -> Self {
        match kind {
            ActionType::Keyboard => Self::Keyboard(KeyboardAction::default()),
            ActionType::Mouse => Self::Mouse(MouseAction::default()),
            ActionType::Text => Self::Text(TextAction::default()),
            ActionType::Delay => Self::Delay(DelayAction::default()),
            ActionType::Sound => Self::Sound(SoundAction::default()),
            ActionType::Process => Self::Process(ProcessAction::default()),
        }
    }

    /// Discriminant of this body.
    pub fn kind(&self) -> ActionType {
        match self {
            Self::Keyboard(_) => ActionType::Keyboard,
            Self::Mouse(_) => ActionType::Mouse,
            Self::Text(_) => ActionType::Text,
            Self::Delay(_) => ActionType::Delay,
            Self::Sound(_) => ActionType::Sound,
            Self::Process(_) => ActionType::Process,
        }
    }
}

/// One entry in a macro's action list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Local id; never sent to the backend.
    #[serde(skip)]
    pub id: ActionId,
    /// Type tag and attributes.
    #[serde(flatten)]
    pub body: ActionBody,
}

impl Action {
    /// Wrap `body` with a freshly generated id.
    pub fn new(body: ActionBody) -> Self {
        Self {
            id: ActionId::generate(),
            body,
        }
    }

    /// Keyboard action for `key` in `state`.
    pub fn keyboard(key: &str, state: PressState) -> Self {
        Self::new(ActionBody::Keyboard(KeyboardAction {
            key: Some(key.to_string()),
            state: Some(state),
        }))
    }

    /// Delay action of `ms` milliseconds.
    pub fn delay(ms: u64) -> Self {
        Self::new(ActionBody::Delay(DelayAction { duration: Some(ms) }))
    }

    /// Text action typing `text`.
    pub fn text(text: &str) -> Self {
        Self::new(ActionBody::Text(TextAction {
            text: Some(text.to_string()),
        }))
    }

    /// Discriminant of the body.
    pub fn kind(&self) -> ActionType {
        self.body.kind()
    }
}

/// `enabled` defaults to true for macros that omit it.
fn default_enabled() -> bool {
    true
}

/// A macro: trigger settings plus three ordered action lists.
///
/// The backend identifies macros by `name`; `id` is local-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Macro {
    /// Local id; never sent to the backend.
    #[serde(skip)]
    pub id: MacroId,
    /// Persistent identity on the backend.
    pub name: String,
    /// Whether the backend should arm this macro.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Trigger kind.
    #[serde(rename = "type", default)]
    pub trigger: TriggerKind,
    /// Hotkey name or command string, depending on `trigger`.
    #[serde(default)]
    pub activator: String,
    /// Loop behaviour.
    #[serde(default)]
    pub loop_mode: LoopMode,
    /// Whether a new activation interrupts a running instance.
    #[serde(default)]
    pub interrupt: bool,
    /// Delay between loop iterations, in milliseconds.
    #[serde(default)]
    pub repeat_delay: u64,
    /// Required modifier keys.
    #[serde(default)]
    pub modifiers: Modifiers,
    /// How `modifiers` is matched.
    #[serde(default)]
    pub modifier_mode: ModifierMode,
    /// Actions run on activation.
    #[serde(default)]
    pub start: Vec<Action>,
    /// Actions repeated while active.
    #[serde(default)]
    pub r#loop: Vec<Action>,
    /// Actions run on deactivation.
    #[serde(default)]
    pub finish: Vec<Action>,
    /// Minimum time between activations, in milliseconds.
    #[serde(default)]
    pub cooldown: u64,
}

impl Macro {
    /// An enabled hotkey macro with no actions.
    pub fn new(name: &str) -> Self {
        Self {
            id: MacroId::generate(),
            name: name.to_string(),
            enabled: true,
            trigger: TriggerKind::default(),
            activator: String::new(),
            loop_mode: LoopMode::default(),
            interrupt: false,
            repeat_delay: 0,
            modifiers: Modifiers::empty(),
            modifier_mode: ModifierMode::default(),
            start: Vec::new(),
            r#loop: Vec::new(),
            finish: Vec::new(),
            cooldown: 0,
        }
    }

    /// Borrow one of the action lists.
    pub fn list(&self, list: ListType) -> &[Action] {
        match list {
            ListType::Start => &self.start,
            ListType::Loop => &self.r#loop,
            ListType::Finish => &self.finish,
        }
    }

    /// Mutably borrow one of the action lists.
    pub fn list_mut(&mut self, list: ListType) -> &mut Vec<Action> {
        match list {
            ListType::Start => &mut self.start,
            ListType::Loop => &mut self.r#loop,
            ListType::Finish => &mut self.finish,
        }
    }

    /// Locate an action by id across all lists.
    pub fn find_action(&self, id: &ActionId) -> Option<(ListType, usize)> {
        ListType::ALL.into_iter().find_map(|list| {
            self.list(list)
                .iter()
                .position(|a| &a.id == id)
                .map(|idx| (list, idx))
        })
    }

    /// Total number of actions across the three lists.
    pub fn action_count(&self) -> usize {
        self.start.len() + self.r#loop.len() + self.finish.len()
    }
}
