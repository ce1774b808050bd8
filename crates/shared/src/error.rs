use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    RemoteApi,
    Unknown,
}

/// Failure of a remote catalog request. Only distinguished at generation
/// time; the catalog stores the rendered message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("http error: status {0}")]
    HttpStatus(u16),
    #[error("network error: {0}")]
    Network(String),
    #[error("api error: {status} - {message}")]
    RemoteApi { status: String, message: String },
    #[error("{0}")]
    Unknown(String),
}

impl FetchError {
    pub fn remote_api(status: impl Into<String>, message: Option<String>) -> Self {
        Self::RemoteApi {
            status: status.into(),
            message: message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "Unknown error".to_string()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::HttpStatus(_) | Self::Network(_) => ErrorKind::Transport,
            Self::RemoteApi { .. } => ErrorKind::RemoteApi,
            Self::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Message stored in catalog state. Never empty.
    pub fn user_message(&self) -> String {
        let inner = self.to_string();
        if inner.trim().is_empty() {
            "fetch error: an unknown error occurred".to_string()
        } else {
            format!("fetch error: {inner}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_api_defaults_missing_message() {
        let err = FetchError::remote_api("REQUEST_DENIED", None);
        assert_eq!(err.to_string(), "api error: REQUEST_DENIED - Unknown error");
        assert_eq!(err.kind(), ErrorKind::RemoteApi);
    }

    #[test]
    fn user_message_is_prefixed_and_never_empty() {
        assert_eq!(
            FetchError::HttpStatus(503).user_message(),
            "fetch error: http error: status 503"
        );
        assert_eq!(
            FetchError::Unknown(String::new()).user_message(),
            "fetch error: an unknown error occurred"
        );
    }

    #[test]
    fn transport_kinds_cover_status_and_network() {
        assert_eq!(FetchError::HttpStatus(500).kind(), ErrorKind::Transport);
        assert_eq!(
            FetchError::Network("connection refused".into()).kind(),
            ErrorKind::Transport
        );
    }
}
