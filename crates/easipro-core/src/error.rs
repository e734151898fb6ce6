use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unexpected resource type: expected {expected}, got {actual}")]
    UnexpectedResourceType { expected: String, actual: String },

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("item '{link_id}' has no answer options")]
    MissingAnswerOptions { link_id: String },

    #[error("item '{link_id}' is already answered in this response")]
    DuplicateAnswer { link_id: String },

    #[error("invalid choice value: {0}")]
    InvalidChoice(String),
}
