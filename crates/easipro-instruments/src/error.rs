use std::time::Duration;

use easipro_core::error::CoreError;
use easipro_server::error::ServerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error("questionnaire has neither an absolute url nor an id")]
    MissingQuestionnaireUrl,

    #[error("questionnaire item has no linkId")]
    MissingLinkId,

    #[error("item '{link_id}' has no type")]
    MissingItemType { link_id: String },

    #[error("item '{link_id}' has no answer options")]
    MissingAnswerOptions { link_id: String },

    #[error("item '{link_id}' is already answered in this response")]
    DuplicateAnswer { link_id: String },

    #[error("server reply is in progress but names no next item")]
    MissingNextItem,

    #[error("server reply dropped answers already sent: {}", .link_ids.join(", "))]
    AnswersDropped { link_ids: Vec<String> },

    #[error("invalid answer for '{link_id}': {reason}")]
    InvalidAnswer { link_id: String, reason: String },

    #[error("unknown step: {0}")]
    UnknownStep(String),

    #[error("round trip timed out after {0:?}")]
    Timeout(Duration),

    #[error("server error: {0}")]
    Server(#[from] ServerError),

    #[error(transparent)]
    Core(CoreError),
}

impl From<CoreError> for InstrumentError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::DuplicateAnswer { link_id } => InstrumentError::DuplicateAnswer { link_id },
            CoreError::MissingAnswerOptions { link_id } => {
                InstrumentError::MissingAnswerOptions { link_id }
            }
            CoreError::MissingField(field) if field.ends_with("linkId") => {
                InstrumentError::MissingLinkId
            }
            other => InstrumentError::Core(other),
        }
    }
}
