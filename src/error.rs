use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP {status} from {url}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },

    #[error("giving up on {url} after {attempts} attempts: {last}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last: String,
    },

    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("request to {url} was cancelled")]
    Cancelled { url: String },

    #[error("invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("work item {item_id}: missing required field {field}")]
    Validation { item_id: String, field: String },

    #[error("invalid date window: {0}")]
    InvalidDate(String),

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl Error {
    pub fn validation(item_id: impl Into<String>, field: impl Into<String>) -> Self {
        Error::Validation {
            item_id: item_id.into(),
            field: field.into(),
        }
    }

    /// Status code for HTTP-level failures.
    #[cfg(test)]
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
