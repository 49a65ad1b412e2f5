use parse_display::Display;

#[cfg(test)]
mod tests;

/// Classification of a fetch failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Display)]
#[display(style = "snake_case")]
pub enum ErrorKind {
    /// Network/timeout class failure. Retried with bounded attempts and backoff.
    Transient,
    /// Not-found/invalid-key class failure. Never retried.
    Permanent,
}

/// Error produced by a [`Fetcher`](crate::Fetcher) when a fetch attempt fails.
#[derive(Clone, Debug, Eq, PartialEq, Display)]
#[display("{kind} fetch error: {message}")]
pub struct FetchError {
    kind: ErrorKind,
    message: String,
}

impl FetchError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// A retryable failure (network/timeout class).
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    /// A non-retryable failure (not-found/invalid-key class).
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permanent, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
    pub fn message(&self) -> &str {
        &self.message
    }
    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Transient
    }
}

impl std::error::Error for FetchError {}
