use survey_assist_core::GatewayError;
use survey_assist_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed routing rule, unknown queue mode, unknown interaction type.
    /// Logged where detected; navigation never returns it.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Lookup or classification failure. Caught at the call site.
    #[error("external service error: {0}")]
    ExternalService(#[from] GatewayError),

    /// The accumulated result no longer matches the session.
    #[error("session invariant violated: {0}")]
    SessionInvariant(String),

    /// Bad or missing submitted field. Reported to the respondent.
    #[error("invalid input: {0}")]
    InputValidation(String),

    #[error("question {question_id} needs placeholder field '{field}' which has no answer")]
    MissingPlaceholder { question_id: String, field: String },

    #[error("question index {index} out of bounds for catalog of {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("no session for token {0}")]
    UnknownSession(String),

    #[error("session store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Errors caused by the request rather than by the system.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InputValidation(_) | Self::UnknownSession(_))
    }
}
