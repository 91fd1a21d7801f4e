use thiserror::Error;

use crate::config::ConfigError;

/// PostgREST code for "single row requested, zero rows returned".
pub const NOT_FOUND_CODE: &str = "PGRST116";

#[derive(Error, Debug, Clone)]
pub enum LectioError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Query failed: {message}")]
    Query {
        code: Option<String>,
        message: String,
    },

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Prefetch step '{step}' failed: {source}")]
    Prefetch {
        step: &'static str,
        source: Box<LectioError>,
    },

    #[error("{0}")]
    Other(String),
}

/// How callers should treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Query,
    PartialPrefetch,
}

impl LectioError {
    pub fn query(message: impl Into<String>) -> Self {
        LectioError::Query {
            code: None,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LectioError::Validation(_) => ErrorKind::Validation,
            LectioError::NotFound(_) => ErrorKind::NotFound,
            LectioError::Prefetch { .. } => ErrorKind::PartialPrefetch,
            LectioError::Query { .. }
            | LectioError::Decode(_)
            | LectioError::Config(_)
            | LectioError::Other(_) => ErrorKind::Query,
        }
    }

    /// Only transport/database failures are worth a retry.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Query
    }
}

impl From<reqwest::Error> for LectioError {
    fn from(e: reqwest::Error) -> Self {
        LectioError::Query {
            code: e.status().map(|s| s.as_u16().to_string()),
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for LectioError {
    fn from(e: serde_json::Error) -> Self {
        LectioError::Decode(e.to_string())
    }
}

impl From<url::ParseError> for LectioError {
    fn from(e: url::ParseError) -> Self {
        LectioError::Config(format!("invalid endpoint URL: {}", e))
    }
}

impl From<ConfigError> for LectioError {
    fn from(e: ConfigError) -> Self {
        LectioError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LectioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            LectioError::Validation("slug".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(LectioError::NotFound("gen".into()).kind(), ErrorKind::NotFound);
        assert_eq!(LectioError::query("timeout").kind(), ErrorKind::Query);
        assert_eq!(LectioError::Decode("bad".into()).kind(), ErrorKind::Query);
    }

    #[test]
    fn test_only_query_errors_retry() {
        assert!(LectioError::query("boom").is_retryable());
        assert!(!LectioError::NotFound("exo".into()).is_retryable());
        assert!(!LectioError::Validation("empty slug".into()).is_retryable());
    }

    #[test]
    fn test_prefetch_error_wraps_source() {
        let err = LectioError::Prefetch {
            step: "catechism_links",
            source: Box::new(LectioError::query("rpc down")),
        };
        assert_eq!(err.kind(), ErrorKind::PartialPrefetch);
        assert_eq!(
            err.to_string(),
            "Prefetch step 'catechism_links' failed: Query failed: rpc down"
        );
    }
}
