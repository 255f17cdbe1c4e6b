//! Structured error statuses sent over the wire.

use driftlog_core::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Locale of the human-readable message attached to statuses.
pub const DEFAULT_LOCALE: &str = "en-US";

/// Status category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Code {
    /// The requested item does not exist.
    NotFound,
    /// The caller may not perform the action.
    PermissionDenied,
    /// The request was malformed.
    InvalidArgument,
    /// The server is shutting down or cannot serve the request right now.
    Unavailable,
    /// Anything else.
    Internal,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "not found",
            Self::PermissionDenied => "permission denied",
            Self::InvalidArgument => "invalid argument",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Machine-readable detail attached to a status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Detail {
    /// The requested offset has no record.
    OffsetOutOfRange {
        /// The requested offset.
        offset: u64,
    },
    /// A message meant for people.
    LocalizedMessage {
        /// BCP 47 locale tag.
        locale: String,
        /// The message.
        message: String,
    },
}

/// An error as seen by a remote caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Category.
    pub code: Code,
    /// Developer-facing message.
    pub message: String,
    /// Attached details.
    pub details: Vec<Detail>,
}

impl Status {
    /// Creates a status without details.
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: Vec::new(),
        }
    }

    /// Attaches a detail.
    #[must_use]
    pub fn with_detail(mut self, detail: Detail) -> Self {
        self.details.push(detail);
        self
    }

    /// Status for a read past either end of the log.
    #[must_use]
    pub fn out_of_range(offset: u64) -> Self {
        Self::new(Code::NotFound, format!("offset out of range: {offset}"))
            .with_detail(Detail::OffsetOutOfRange { offset })
            .with_detail(Detail::LocalizedMessage {
                locale: DEFAULT_LOCALE.to_string(),
                message: format!("The requested offset is outside the log's range: {offset}"),
            })
    }

    /// Status for a rejected authorization check.
    #[must_use]
    pub fn permission_denied(subject: &str, object: &str, action: &str) -> Self {
        Self::new(
            Code::PermissionDenied,
            format!("{subject:?} not permitted to {action} to {object}"),
        )
    }

    /// Status for an unexpected server-side failure.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    /// Returns the offset if this status reports an out-of-range read.
    #[must_use]
    pub fn out_of_range_offset(&self) -> Option<u64> {
        self.details.iter().find_map(|d| match d {
            Detail::OffsetOutOfRange { offset } => Some(*offset),
            Detail::LocalizedMessage { .. } => None,
        })
    }

    /// Returns true if this status reports an out-of-range read.
    #[must_use]
    pub fn is_out_of_range(&self) -> bool {
        self.code == Code::NotFound && self.out_of_range_offset().is_some()
    }

    /// Returns the localized message for `locale`, if attached.
    #[must_use]
    pub fn localized_message(&self, locale: &str) -> Option<&str> {
        self.details.iter().find_map(|d| match d {
            Detail::LocalizedMessage { locale: l, message } if l == locale => {
                Some(message.as_str())
            }
            _ => None,
        })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for Status {}

impl From<&CoreError> for Status {
    fn from(err: &CoreError) -> Self {
        match err.out_of_range_offset() {
            Some(offset) => Self::out_of_range(offset),
            None => Self::internal(err.to_string()),
        }
    }
}

impl From<CoreError> for Status {
    fn from(err: CoreError) -> Self {
        Self::from(&err)
    }
}
