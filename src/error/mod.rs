//! Error types for sable.

pub mod recovery;

pub use recovery::{ErrorLog, ErrorLogEntry, RecoveryReport, RecoveryTracker};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Primary error type for all sable operations.
///
/// Kinds are attached structurally at the throw site wherever the producing
/// code already knows them; keyword classification is reserved for errors
/// crossing the opaque transport boundary (see [`classify_message`]).
#[derive(Error, Debug)]
pub enum SableError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Tool execution error: {tool_name} — {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Permission denied for tool '{tool_name}'")]
    PermissionDenied { tool_name: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

/// Broad error kind for routing recovery logic and user messaging.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Api,
    Network,
    Tool,
    Permission,
    Parsing,
    Configuration,
    System,
    Unknown,
}

impl ErrorKind {
    /// Canned user-readable message template for this kind.
    pub fn user_message(&self, detail: &str) -> String {
        match self {
            ErrorKind::Api => format!("The AI service reported an error: {detail}"),
            ErrorKind::Network => {
                format!("A network problem interrupted the request: {detail}")
            }
            ErrorKind::Tool => format!("A tool failed to run: {detail}"),
            ErrorKind::Permission => format!("Permission was not granted: {detail}"),
            ErrorKind::Parsing => format!("The response could not be parsed: {detail}"),
            ErrorKind::Configuration => format!("Configuration problem: {detail}"),
            ErrorKind::System => format!("A system error occurred: {detail}"),
            ErrorKind::Unknown => format!("Something went wrong: {detail}"),
        }
    }

    /// Whether errors of this kind are worth retrying automatically.
    pub fn should_retry(&self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::Parsing)
    }
}

impl SableError {
    /// Classify this error into a kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Api { status, .. } => match status {
                408 | 502 | 503 | 504 => ErrorKind::Network,
                _ => ErrorKind::Api,
            },
            Self::Network(_) | Self::Timeout(_) => ErrorKind::Network,
            Self::Io(_) | Self::ToolExecution { .. } => ErrorKind::Tool,
            Self::PermissionDenied { .. } => ErrorKind::Permission,
            Self::Parse(_) | Self::Serialization(_) => ErrorKind::Parsing,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::InvalidState(_) => ErrorKind::System,
            Self::Stream(message) => classify_message(message),
        }
    }

    /// User-facing message for this error.
    pub fn user_message(&self) -> String {
        self.kind().user_message(&self.to_string())
    }
}

/// Keyword classification for error text from an opaque boundary.
///
/// Order matters: the first matching category wins.
pub fn classify_message(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();

    if lower.contains("authentication")
        || lower.contains("unauthorized")
        || lower.contains("api key")
        || lower.contains("rate limit")
        || lower.contains("quota")
    {
        ErrorKind::Api
    } else if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("econnrefused")
        || lower.contains("econnreset")
        || lower.contains("network")
        || lower.contains("connection")
        || lower.contains("dns")
    {
        ErrorKind::Network
    } else if lower.contains("enoent")
        || lower.contains("file not found")
        || lower.contains("no such file")
        || lower.contains("eacces")
        || lower.contains("command failed")
    {
        ErrorKind::Tool
    } else if lower.contains("permission") || lower.contains("denied") || lower.contains("forbidden")
    {
        ErrorKind::Permission
    } else if lower.contains("parse") || lower.contains("unexpected token") || lower.contains("invalid json")
    {
        ErrorKind::Parsing
    } else if lower.contains("config") || lower.contains("missing setting") {
        ErrorKind::Configuration
    } else if lower.contains("system") || lower.contains("panic") || lower.contains("out of memory")
    {
        ErrorKind::System
    } else {
        ErrorKind::Unknown
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, SableError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_kinds_take_priority() {
        let err = SableError::PermissionDenied {
            tool_name: "write_file".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Permission);

        let err = SableError::Parse("accumulator exceeded".into());
        assert_eq!(err.kind(), ErrorKind::Parsing);

        let err = SableError::Configuration("missing api key".into());
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn gateway_statuses_classify_as_network() {
        let err = SableError::Api {
            status: 503,
            message: "service unavailable".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Network);

        let err = SableError::Api {
            status: 400,
            message: "bad request".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Api);
    }

    #[test]
    fn keyword_classification_first_match_wins() {
        assert_eq!(classify_message("Unauthorized: bad token"), ErrorKind::Api);
        assert_eq!(classify_message("request timed out"), ErrorKind::Network);
        assert_eq!(classify_message("ENOENT: file not found"), ErrorKind::Tool);
        assert_eq!(classify_message("permission denied"), ErrorKind::Permission);
        assert_eq!(classify_message("failed to parse body"), ErrorKind::Parsing);
        assert_eq!(classify_message("totally novel failure"), ErrorKind::Unknown);
    }

    #[test]
    fn only_network_and_parsing_retry() {
        assert!(ErrorKind::Network.should_retry());
        assert!(ErrorKind::Parsing.should_retry());
        assert!(!ErrorKind::Api.should_retry());
        assert!(!ErrorKind::Tool.should_retry());
        assert!(!ErrorKind::Permission.should_retry());
        assert!(!ErrorKind::Unknown.should_retry());
    }

    #[test]
    fn user_messages_are_templated_by_kind() {
        let err = SableError::Stream("connection reset".into());
        let msg = err.user_message();
        assert!(msg.contains("network problem"));
        assert!(msg.contains("connection reset"));
    }
}
