use thiserror::Error;

use crate::data::repos::RepoError;
use crate::domain::render::RenderError;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("definition not found: {0}")]
    DefinitionNotFound(String),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("no adapter matches route {0}")]
    AdapterNotFound(String),

    #[error("transport failed after attempt {attempt}: {message}")]
    Transport { attempt: u32, message: String },

    #[error("secret resolution failed for {route}: {message}")]
    SecretResolution { route: String, message: String },

    #[error("attachment resolution failed: {0}")]
    Attachments(String),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error("inbox delivery failed: {0}")]
    Inbox(String),

    #[error("dispatch cancelled")]
    Cancelled,

    #[error("{failed} of {total} jobs failed; first: {first}")]
    Aggregate {
        failed: usize,
        total: usize,
        first: String,
    },
}

impl DispatchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
