//! Conformance validator for VST3 plug-in modules.
//!
//! [`Driver`] loads a module through a [`vst3_host::ModuleLoader`], runs the
//! cases of a [`Registry`] against each audio module class and reports every
//! step as an [`Event`] to a [`Sink`].

pub mod barrier;
pub mod buffers;
pub mod cancel;
pub mod cases;
pub mod cli;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod event;
pub mod outcome;
pub mod registry;
pub mod report;
pub mod seed;
pub mod sink;
pub mod watchdog;

pub use cancel::CancelFlag;
pub use cli::Args;
pub use config::{ConfigError, ValidatorConfig};
pub use context::{CaseContext, CaseReport, CaseResult};
pub use driver::{Driver, RunOptions, RunOutcome};
pub use error::{DriverError, ExitStatus, Failure, FailureKind};
pub use event::Event;
pub use outcome::Outcome;
pub use registry::{Registry, Stage, Suite, TestCase};
pub use report::{CaseRecord, ClassReport, ClassSummary, Report};
pub use sink::{HumanSink, JsonSink, MemorySink, Sink};
