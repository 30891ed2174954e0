//! Errors shared by the external collaborators (web search, filing retrieval).
//!
//! Collaborator failures are never fatal to a run: the worker harness hands
//! them back to the model as tool output.

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("missing API key env var: {0}")]
    MissingApiKey(String),
    #[error("provider request failed ({0}): {1}")]
    ProviderRequest(String, String),
    #[error("provider response parse failed ({0}): {1}")]
    ProviderParse(String, String),
    #[error("store error: {0}")]
    Store(String),
    #[error("answer synthesis failed: {0}")]
    Synthesis(String),
}
