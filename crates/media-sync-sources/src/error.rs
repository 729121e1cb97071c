use reqwest::StatusCode;
use thiserror::Error;

/// Failures talking to the Trakt API.
#[derive(Debug, Error)]
pub enum TraktError {
    /// The list slug does not exist on the target. Recoverable: the caller backfills it.
    #[error("list not found: {slug}")]
    ListNotFound { slug: String },

    /// Trakt answered 420; retrying cannot help.
    #[error("account limit exceeded")]
    AccountLimitExceeded,

    #[error("unexpected status code: got {got}, want {}", format_statuses(.want))]
    UnexpectedStatusCode { got: StatusCode, want: Vec<StatusCode> },

    #[error("max retries reached after {attempts} attempts")]
    MaxRetriesReached { attempts: u32 },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl TraktError {
    pub fn is_list_not_found(&self) -> bool {
        matches!(self, TraktError::ListNotFound { .. })
    }
}

fn format_statuses(statuses: &[StatusCode]) -> String {
    statuses
        .iter()
        .map(|s| s.as_u16().to_string())
        .collect::<Vec<_>>()
        .join("|")
}

/// Failures reading from the source provider.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("{0} requires an authenticated session")]
    NotAuthenticated(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_status_message_lists_wanted_codes() {
        let err = TraktError::UnexpectedStatusCode {
            got: StatusCode::FORBIDDEN,
            want: vec![StatusCode::OK, StatusCode::CREATED],
        };
        assert_eq!(
            err.to_string(),
            "unexpected status code: got 403 Forbidden, want 200|201"
        );
    }

    #[test]
    fn test_list_not_found_is_recoverable() {
        let err = TraktError::ListNotFound { slug: "ls2".to_string() };
        assert!(err.is_list_not_found());
        assert!(!TraktError::AccountLimitExceeded.is_list_not_found());
    }
}
