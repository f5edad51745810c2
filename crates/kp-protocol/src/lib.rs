//! Shared protocol types for the KPMacros editor.
//!
//! Every frame exchanged with the backend is a JSON [`Envelope`]
//! `{"action": ..., "data": ...}`. This crate names the actions
//! ([`OutboundKind`], [`InboundKind`]), gives each one a typed payload
//! ([`Outbound`], [`Inbound`]) and defines the macro/profile data model the
//! editor manipulates.

pub mod codec;
mod error;
pub mod model;
pub mod patch;
pub mod profile;
pub mod rpc;
pub mod validate;

pub use codec::Envelope;
pub use error::{Error, Result};
pub use model::{
    Action, ActionBody, ActionId, ActionType, ListType, LoopMode, Macro, MacroId, ModifierMode,
    Modifiers, PressState, TriggerKind,
};
pub use patch::{ActionPatch, Field};
pub use profile::Profile;
pub use rpc::{Inbound, InboundKind, Outbound, OutboundKind, Reply};
