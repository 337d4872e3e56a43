//! VST3 hosting primitives for the validator.
//!
//! The crate maps plug-in modules into the process, talks to their factories
//! and components over the VST3 binary interface, and tracks every instance it
//! creates through a host-side lifecycle machine and a create/release ledger.
//! Everything above the binary interface is expressed through the traits in
//! [`plugin`], so the validator can run against in-process mocks as well as
//! real bundles.

pub mod com;
pub mod error;
pub mod factory;
pub mod ffi;
pub mod host;
pub mod inspector;
pub mod instance;
pub mod ledger;
pub mod loader;
pub mod plugin;
pub mod uid;
pub mod vst3;

pub use error::{FactoryError, LoadError, ResultCode};
pub use host::{ComponentHandler, MemoryStream, ParamEdit};
pub use inspector::{Enumeration, FactoryInspector};
pub use instance::{ComponentInstance, LifecycleError, LifecycleEvent, LifecycleState};
pub use ledger::{InstanceLedger, LedgerCounts, Ticket};
pub use loader::{Vst3Loader, Vst3Module};
pub use plugin::{
    AudioBus, BusDirection, BusInfo, BusType, Capabilities, Capability, ClassDescriptor, ClassKind,
    Component, Controller, FactoryInfo, HostContext, IoMode, MediaType, ModuleLoader, ParamPoint,
    ParamQueue, ParameterInfo, PluginFactory, PluginModule, ProcessData, ProcessMode, ProcessSetup,
    SampleSize,
};
pub use uid::{ClassId, ParseClassIdError};
