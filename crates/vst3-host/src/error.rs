use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ffi;
use crate::uid::ClassId;

/// Errors raised while mapping a plug-in module into the process.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("plug-in module not found at {0}")]
    FileNotFound(PathBuf),
    #[error("{path} is not a loadable VST3 module: {reason}")]
    FormatInvalid { path: PathBuf, reason: String },
    #[error("{path} does not export `{symbol}`")]
    EntryPointMissing { path: PathBuf, symbol: String },
    #[error("module entry of {0} reported failure")]
    InitFailed(PathBuf),
}

impl LoadError {
    /// Stable kebab-case name used in run summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FileNotFound(_) => "file-not-found",
            Self::FormatInvalid { .. } => "format-invalid",
            Self::EntryPointMissing { .. } => "entry-point-missing",
            Self::InitFailed(_) => "init-failed",
        }
    }
}

/// Errors raised by the plug-in factory or by instance creation.
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("factory does not advertise class {0}")]
    UnknownId(ClassId),
    #[error("factory ran out of memory creating {0}")]
    OutOfMemory(ClassId),
    #[error("factory refused to construct {id}: {code}")]
    ConstructionRefused { id: ClassId, code: ResultCode },
    #[error("class index {index} out of range ({count} classes)")]
    InvalidIndex { index: usize, count: usize },
    #[error("factory query failed: {0}")]
    Query(ResultCode),
}

impl FactoryError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownId(_) => "unknown-id",
            Self::OutOfMemory(_) => "out-of-memory",
            Self::ConstructionRefused { .. } => "construction-refused",
            Self::InvalidIndex { .. } => "invalid-index",
            Self::Query(_) => "query-failed",
        }
    }
}

/// A `tresult` returned by the plug-in, carried with the platform's numeric value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultCode(pub i32);

impl ResultCode {
    pub const OK: Self = Self(ffi::RESULT_OK);
    pub const FALSE: Self = Self(ffi::RESULT_FALSE);
    pub const NO_INTERFACE: Self = Self(ffi::NO_INTERFACE);
    pub const INVALID_ARGUMENT: Self = Self(ffi::INVALID_ARGUMENT);
    pub const NOT_IMPLEMENTED: Self = Self(ffi::NOT_IMPLEMENTED);
    pub const INTERNAL_ERROR: Self = Self(ffi::INTERNAL_ERROR);
    pub const NOT_INITIALIZED: Self = Self(ffi::NOT_INITIALIZED);
    pub const OUT_OF_MEMORY: Self = Self(ffi::OUT_OF_MEMORY);

    pub fn is_ok(self) -> bool {
        self == Self::OK
    }

    /// `Ok(())` for `kResultOk`, the code itself otherwise.
    pub fn check(self) -> Result<(), ResultCode> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(self)
        }
    }

    pub fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::OK => "kResultOk",
            Self::FALSE => "kResultFalse",
            Self::NO_INTERFACE => "kNoInterface",
            Self::INVALID_ARGUMENT => "kInvalidArgument",
            Self::NOT_IMPLEMENTED => "kNotImplemented",
            Self::INTERNAL_ERROR => "kInternalError",
            Self::NOT_INITIALIZED => "kNotInitialized",
            Self::OUT_OF_MEMORY => "kOutOfMemory",
            _ => return None,
        })
    }
}

impl From<ffi::tresult> for ResultCode {
    fn from(value: ffi::tresult) -> Self {
        Self(value)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "tresult {:#x}", self.0),
        }
    }
}

impl fmt::Debug for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
