use thiserror::Error;

/// The only failure kind of the directory client. Transport errors, non-2xx
/// statuses and undecodable bodies are deliberately not told apart.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("failed to fetch {what}: {reason}")]
    FetchFailed { what: String, reason: String },
}

impl DirectoryError {
    pub fn fetch_failed(what: impl Into<String>, reason: impl ToString) -> Self {
        DirectoryError::FetchFailed {
            what: what.into(),
            reason: reason.to_string(),
        }
    }
}
