use std::result::Result as StdResult;

use kp_protocol::{ActionId, ListType, validate::ValidationError};
use thiserror::Error;

/// Error type for editor and roster operations
#[derive(Debug, Error)]
pub enum EditError {
    /// No action with this id in the list
    #[error("No action {id} in list '{}'", list.as_str())]
    UnknownAction {
        /// List that was searched.
        list: ListType,
        /// Missing id.
        id: ActionId,
    },

    /// A list index was outside the list
    #[error("Index {index} out of range for list '{}' of length {len}", list.as_str())]
    IndexOutOfRange {
        /// List the index applies to.
        list: ListType,
        /// Offending index.
        index: usize,
        /// Length of the list.
        len: usize,
    },

    /// No macro with this name or id in the roster
    #[error("Unknown macro '{0}'")]
    UnknownMacro(String),

    /// No profile with this name
    #[error("Unknown profile '{0}'")]
    UnknownProfile(String),

    /// The operation needs a selected profile
    #[error("No profile selected")]
    NoProfile,

    /// Local validation blocked the operation
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// An action patch was rejected
    #[error(transparent)]
    Patch(#[from] kp_protocol::Error),

    /// The backend reported a failure
    #[error("Backend rejected request: {0}")]
    Rejected(String),

    /// Transport failure while waiting for a reply
    #[error(transparent)]
    Client(#[from] kp_client::Error),
}

/// Convenience alias for editor results
pub type Result<T> = StdResult<T, EditError>;
