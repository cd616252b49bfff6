use thiserror::Error;

/// Result alias used throughout the kernel.
pub type KernelResult<T> = Result<T, KernelError>;

/// Errors raised by the kernel and by the collaborators it drives.
///
/// The first five variants form the user-facing taxonomy. Everything else is
/// plumbing; of that, only `Config`, `Factory` and `Manifest` are considered
/// kernel-native and may be shown to a caller verbatim.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("the \"{0}\" application does not exist")]
    UnknownApplication(String),

    #[error("invalid login or password")]
    InvalidCredentials,

    #[error("{0} is required")]
    MissingField(String),

    #[error("{0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("factory {name}: {reason}")]
    Factory { name: String, reason: String },

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Unexpected(Box<dyn std::error::Error + Send + Sync>),
}

impl KernelError {
    /// Wrap a foreign error raised by an application collaborator.
    pub fn unexpected(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        KernelError::Unexpected(err.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        KernelError::NotFound(message.into())
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        KernelError::AccessDenied(message.into())
    }

    /// Whether this error belongs to the kernel's own taxonomy.
    pub fn is_native(&self) -> bool {
        !matches!(
            self,
            KernelError::Store(_)
                | KernelError::Io(_)
                | KernelError::Serialization(_)
                | KernelError::Unexpected(_)
        )
    }

    /// HTTP-equivalent status code for rendering.
    pub fn status(&self) -> u16 {
        match self {
            KernelError::InvalidCredentials | KernelError::MissingField(_) => 400,
            KernelError::AccessDenied(_) => 403,
            KernelError::NotFound(_) => 404,
            _ => 500,
        }
    }

    /// Message safe to show to the caller.
    ///
    /// Outside debug mode foreign errors collapse into a generic message so
    /// their internals never reach the response.
    pub fn public_message(&self, debug: bool) -> String {
        if self.is_native() {
            return self.to_string();
        }
        if debug {
            let mut message = self.to_string();
            let mut source = std::error::Error::source(self);
            while let Some(cause) = source {
                message.push_str(": ");
                message.push_str(&cause.to_string());
                source = cause.source();
            }
            message
        } else {
            "internal error".to_string()
        }
    }
}

/// Failures reported by data-access collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("backend failure: {0}")]
    Backend(String),
}
