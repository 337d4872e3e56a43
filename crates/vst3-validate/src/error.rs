use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vst3_host::{FactoryError, LifecycleError, LoadError};

/// Process exit status of a validator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitStatus {
    Success,
    Usage,
    LoaderError,
    NoMatchingClasses,
    TestFailures,
    Internal,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Usage => 2,
            Self::LoaderError => 3,
            Self::NoMatchingClasses => 4,
            Self::TestFailures => 5,
            Self::Internal => 6,
        }
    }
}

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("usage-error: {0}")]
    Usage(String),
    #[error("loader-error: {}", .0.kind())]
    Loader(#[from] LoadError),
    #[error("factory-error: {}", .0.kind())]
    Factory(#[from] FactoryError),
    #[error("no-matching-classes")]
    NoMatchingClasses,
    #[error("internal-error: {0}")]
    Internal(String),
}

impl DriverError {
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            Self::Usage(_) => ExitStatus::Usage,
            Self::Loader(_) | Self::Factory(_) => ExitStatus::LoaderError,
            Self::NoMatchingClasses => ExitStatus::NoMatchingClasses,
            Self::Internal(_) => ExitStatus::Internal,
        }
    }

    /// Full description including the underlying cause, for logs.
    pub fn detail(&self) -> String {
        match self {
            Self::Loader(err) => err.to_string(),
            Self::Factory(err) => err.to_string(),
            other => other.to_string(),
        }
    }
}

/// Case-scoped failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    Instance,
    Lifecycle,
    Contract,
    Numeric,
    Timeout,
    Crash,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Instance => "instance",
            Self::Lifecycle => "lifecycle",
            Self::Contract => "contract",
            Self::Numeric => "numeric",
            Self::Timeout => "timeout",
            Self::Crash => "crash",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A MUST rule broken by the plug-in, raised from inside a case body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn instance(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Instance, message)
    }

    pub fn lifecycle(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Lifecycle, message)
    }

    pub fn contract(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Contract, message)
    }

    pub fn numeric(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Numeric, message)
    }

    /// Prefixes the message with where the failure happened.
    pub fn context(mut self, context: impl fmt::Display) -> Self {
        self.message = format!("{context}: {}", self.message);
        self
    }
}

impl From<LifecycleError> for Failure {
    fn from(err: LifecycleError) -> Self {
        Self::lifecycle(err.to_string())
    }
}

impl From<FactoryError> for Failure {
    fn from(err: FactoryError) -> Self {
        Self::instance(err.to_string())
    }
}

/// Returns a contract failure unless `condition` holds.
pub fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<(), Failure> {
    if condition {
        Ok(())
    } else {
        Err(Failure::contract(message()))
    }
}
