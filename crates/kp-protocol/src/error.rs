use std::result::Result as StdResult;

use thiserror::Error;

use crate::model::ActionType;

/// Convenience alias for protocol results.
pub type Result<T> = StdResult<T, Error>;

/// Errors from encoding, decoding or patching protocol values.
#[derive(Debug, Error)]
pub enum Error {
    /// The frame was not valid JSON or did not have the envelope shape.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The envelope named an action this client does not understand.
    #[error("unknown action '{0}'")]
    UnknownAction(String),

    /// The envelope payload did not match the shape expected for its action.
    #[error("invalid '{action}' payload: {source}")]
    InvalidPayload {
        /// Wire action name.
        action: &'static str,
        /// Underlying decode failure.
        source: serde_json::Error,
    },

    /// A patch tried to set a field that the resulting action type does not carry.
    #[error("field '{field}' does not apply to {kind} actions")]
    FieldNotApplicable {
        /// Field name as it appears on the wire.
        field: &'static str,
        /// Action type after the patch was applied.
        kind: ActionType,
    },
}
