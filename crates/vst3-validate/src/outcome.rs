use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Failure, FailureKind};

/// Result of one case against one class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum Outcome {
    Passed,
    Skipped { reason: String },
    Warning { message: String },
    Failed { kind: FailureKind, message: String },
}

impl Outcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped { reason: reason.into() }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::Warning {
            message: message.into(),
        }
    }

    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            message: message.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    /// `passed`, `skipped`, `warning` or `failed:<kind>`.
    pub fn label(&self) -> String {
        match self {
            Self::Passed => "passed".into(),
            Self::Skipped { .. } => "skipped".into(),
            Self::Warning { .. } => "warning".into(),
            Self::Failed { kind, .. } => format!("failed:{kind}"),
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Passed => None,
            Self::Skipped { reason } => Some(reason),
            Self::Warning { message } | Self::Failed { message, .. } => Some(message),
        }
    }
}

impl From<Failure> for Outcome {
    fn from(failure: Failure) -> Self {
        Self::Failed {
            kind: failure.kind,
            message: failure.message,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(message) => write!(f, "{}: {message}", self.label()),
            None => f.write_str(&self.label()),
        }
    }
}
