use thiserror::Error;

/// Error categories the command line front-end treats differently.
///
/// Most fallible code returns `anyhow::Result`; these variants are raised where
/// callers need to tell a user mistake from a network or git failure.
#[derive(Debug, Error)]
pub enum CfbsError {
    /// The user asked for something that cannot be done.
    #[error("{0}")]
    User(String),
    /// A condition which stops the current command.
    #[error("{0}")]
    Exit(String),
    /// Fetching remote data failed.
    #[error("{0}")]
    Network(String),
    /// A git invocation failed.
    #[error("{0}")]
    Git(String),
    /// Downloading or verifying a file failed.
    #[error("{0}")]
    Fetch(String),
    /// The project file is not valid.
    #[error("{0}")]
    Validation(String),
    /// An internal invariant was violated.
    #[error("{0}")]
    Programmer(String),
}

impl CfbsError {
    pub fn user(msg: impl Into<String>) -> Self {
        Self::User(msg.into())
    }

    pub fn exit(msg: impl Into<String>) -> Self {
        Self::Exit(msg.into())
    }

    /// Whether the error indicates a bug rather than bad input.
    pub fn is_bug(&self) -> bool {
        matches!(self, Self::Programmer(_))
    }
}
