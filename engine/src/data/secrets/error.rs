use thiserror::Error;

#[derive(Error, Debug)]
pub enum SecretError {
    #[error("secret not found: {0}")]
    NotFound(String),

    #[error("secret access unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid secret reference: {0}")]
    InvalidReference(String),

    #[error("operation {op} unsupported by secret backend {backend}")]
    Unsupported { backend: &'static str, op: &'static str },

    #[error("secret backend error ({backend}): {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },

    #[error("secret cipher error: {0}")]
    Crypto(String),
}

impl SecretError {
    pub fn backend(backend: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            backend,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
