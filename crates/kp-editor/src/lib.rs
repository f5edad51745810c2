//! Editor core for KPMacros: what happens to macros between the user's edit
//! and the backend's copy.
//!
//! - [`MacroEditor`]: one macro's action lists, attribute edits, live test
//!   toggle and save.
//! - [`MacroRoster`]: one profile's macro list; list-level edits (enable,
//!   loop mode) apply locally at once and reach the backend as a debounced
//!   batch through the [`PendingChanges`] ledger.
//! - [`ProfileRoster`]: the profile list with local save/delete validation.
//!
//! All components emit messages through a [`kp_client::Outbox`], so they run
//! unchanged against a live client or a recording fake.

mod editor;
mod error;
pub mod ledger;
mod profiles;
mod roster;
pub mod test_support;

pub use editor::MacroEditor;
pub use error::{EditError, Result};
pub use ledger::{MAX_IN_FLIGHT, PendingChange, PendingChanges};
pub use profiles::{ProfileEvent, ProfileRoster};
pub use roster::{FLUSH_DELAY, MacroRoster, RosterEvent};
