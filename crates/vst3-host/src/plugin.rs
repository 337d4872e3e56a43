//! Format-neutral view of a plug-in module.
//!
//! The validator talks to these traits only. [`crate::loader::Vst3Loader`]
//! implements them over the binary interface; tests implement them with
//! in-process mocks.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{FactoryError, LoadError, ResultCode};
use crate::ffi::{self, ParamID, ParamValue, SpeakerArrangement};
use crate::host::{ComponentHandler, HostApplication};
use crate::uid::ClassId;

/// Maps modules from disk.
pub trait ModuleLoader: Send + Sync {
    /// On success the module entry point has run exactly once.
    fn load(&self, path: &Path) -> Result<Box<dyn PluginModule>, LoadError>;
}

/// A module mapped into the process.
pub trait PluginModule: Send + Sync {
    fn path(&self) -> &Path;

    fn factory(&self) -> Result<Arc<dyn PluginFactory>, LoadError>;

    /// Runs the module exit entry point and unmaps. Calling it again is a no-op.
    fn unload(&mut self);
}

pub trait PluginFactory: Send + Sync {
    fn info(&self) -> Result<FactoryInfo, FactoryError>;
    fn class_count(&self) -> usize;
    fn class_info(&self, index: usize) -> Result<ClassDescriptor, FactoryError>;
    fn create_component(&self, id: &ClassId) -> Result<Box<dyn Component>, FactoryError>;
}

/// The processor side of a plug-in class (`IComponent` + `IAudioProcessor`).
///
/// Methods forward to the plug-in without any state checking; the lifecycle
/// rules live in [`crate::instance::ComponentInstance`].
pub trait Component: Send {
    fn initialize(&mut self, host: &HostContext) -> ResultCode;
    fn terminate(&mut self) -> ResultCode;
    fn controller_class_id(&self) -> Option<ClassId>;
    fn set_io_mode(&mut self, mode: IoMode) -> ResultCode;

    fn bus_count(&self, media: MediaType, direction: BusDirection) -> i32;
    fn bus_info(
        &self,
        media: MediaType,
        direction: BusDirection,
        index: i32,
    ) -> Result<BusInfo, ResultCode>;
    fn activate_bus(
        &mut self,
        media: MediaType,
        direction: BusDirection,
        index: i32,
        active: bool,
    ) -> ResultCode;
    fn set_active(&mut self, active: bool) -> ResultCode;
    fn set_state(&mut self, state: &[u8]) -> ResultCode;
    fn get_state(&mut self) -> Result<Vec<u8>, ResultCode>;

    fn set_bus_arrangements(
        &mut self,
        inputs: &[SpeakerArrangement],
        outputs: &[SpeakerArrangement],
    ) -> ResultCode;
    fn bus_arrangement(
        &self,
        direction: BusDirection,
        index: i32,
    ) -> Result<SpeakerArrangement, ResultCode>;
    fn can_process_sample_size(&self, size: SampleSize) -> ResultCode;
    fn latency_samples(&self) -> u32;
    fn setup_processing(&mut self, setup: &ProcessSetup) -> ResultCode;
    fn set_processing(&mut self, processing: bool) -> ResultCode;
    fn process(&mut self, data: &mut ProcessData<'_>) -> ResultCode;
    fn tail_samples(&self) -> u32;

    /// The edit controller, available once the component is initialized.
    fn controller(&self) -> Option<Arc<dyn Controller>>;
}

/// The edit controller side of a plug-in class (`IEditController`).
///
/// Controllers are driven from a different thread than `process`, so every
/// method takes `&self`.
pub trait Controller: Send + Sync {
    fn parameter_count(&self) -> i32;
    fn parameter_info(&self, index: i32) -> Result<ParameterInfo, ResultCode>;
    fn param_string_by_value(&self, id: ParamID, value: ParamValue) -> Result<String, ResultCode>;
    fn param_value_by_string(&self, id: ParamID, text: &str) -> Result<ParamValue, ResultCode>;
    fn normalized_to_plain(&self, id: ParamID, value: ParamValue) -> ParamValue;
    fn plain_to_normalized(&self, id: ParamID, value: ParamValue) -> ParamValue;
    fn param_normalized(&self, id: ParamID) -> ParamValue;
    fn set_param_normalized(&self, id: ParamID, value: ParamValue) -> ResultCode;
    fn set_component_state(&self, state: &[u8]) -> ResultCode;
    fn get_state(&self) -> Result<Vec<u8>, ResultCode>;
    fn set_state(&self, state: &[u8]) -> ResultCode;
}

/// The host capabilities handed to `initialize`.
#[derive(Clone)]
pub struct HostContext {
    name: String,
    application: HostApplication,
    handler: ComponentHandler,
}

impl HostContext {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            application: HostApplication::new(&name),
            handler: ComponentHandler::new(),
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn application(&self) -> &HostApplication {
        &self.application
    }

    pub fn handler(&self) -> &ComponentHandler {
        &self.handler
    }
}

impl std::fmt::Debug for HostContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostContext").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactoryInfo {
    pub vendor: String,
    pub url: String,
    pub email: String,
    pub flags: i32,
}

/// A class advertised by a factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDescriptor {
    pub id: ClassId,
    pub category: String,
    pub name: String,
    pub vendor: String,
    pub version: String,
    pub sdk_version: String,
    pub sub_categories: Vec<String>,
    pub class_flags: u32,
    pub cardinality: i32,
}

impl ClassDescriptor {
    /// A descriptor with only the `PClassInfo` fields filled in.
    pub fn basic(id: ClassId, category: &str, name: &str) -> Self {
        Self {
            id,
            category: category.to_string(),
            name: name.to_string(),
            vendor: String::new(),
            version: String::new(),
            sdk_version: String::new(),
            sub_categories: Vec::new(),
            class_flags: 0,
            cardinality: 0x7FFF_FFFF,
        }
    }

    pub fn kind(&self) -> ClassKind {
        match self.category.as_str() {
            ffi::CATEGORY_AUDIO_MODULE => {
                ClassKind::AudioModule(Capabilities::from_sub_categories(&self.sub_categories))
            }
            ffi::CATEGORY_COMPONENT_CONTROLLER => ClassKind::ComponentController,
            ffi::CATEGORY_PLUGIN_COMPATIBILITY => ClassKind::PluginCompatibility,
            other => ClassKind::Other(other.to_string()),
        }
    }

    pub fn is_audio_module(&self) -> bool {
        self.category == ffi::CATEGORY_AUDIO_MODULE
    }

    /// Capabilities of an audio module; empty for every other category.
    pub fn capabilities(&self) -> Capabilities {
        match self.kind() {
            ClassKind::AudioModule(caps) => caps,
            _ => Capabilities::default(),
        }
    }

    /// Splits the `|` separated sub-category string of `PClassInfo2`.
    pub fn parse_sub_categories(raw: &str) -> Vec<String> {
        raw.split('|')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Tagged variant per class category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassKind {
    AudioModule(Capabilities),
    ComponentController,
    PluginCompatibility,
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    AudioEffect,
    Instrument,
    Analyzer,
    Generator,
    Spatial,
    NoteExpression,
    OnlyOffline,
    Mono,
    Stereo,
    Surround,
}

impl Capability {
    fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "Fx" => Self::AudioEffect,
            "Instrument" => Self::Instrument,
            "Analyzer" => Self::Analyzer,
            "Generator" => Self::Generator,
            "Spatial" => Self::Spatial,
            "NoteExpression" => Self::NoteExpression,
            "OnlyOfflineProcess" => Self::OnlyOffline,
            "Mono" => Self::Mono,
            "Stereo" => Self::Stereo,
            "Surround" => Self::Surround,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities(BTreeSet<Capability>);

impl Capabilities {
    pub fn from_sub_categories(sub_categories: &[String]) -> Self {
        Self(
            sub_categories
                .iter()
                .filter_map(|token| Capability::from_token(token))
                .collect(),
        )
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn insert(&mut self, capability: Capability) {
        self.0.insert(capability);
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    /// Effects whose output is a pure function of their input.
    pub fn is_pure_effect(&self) -> bool {
        self.contains(Capability::AudioEffect)
            && !self.contains(Capability::Instrument)
            && !self.contains(Capability::Generator)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    Audio,
    Event,
}

impl MediaType {
    pub fn raw(self) -> i32 {
        match self {
            Self::Audio => ffi::MEDIA_AUDIO,
            Self::Event => ffi::MEDIA_EVENT,
        }
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            ffi::MEDIA_AUDIO => Some(Self::Audio),
            ffi::MEDIA_EVENT => Some(Self::Event),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BusDirection {
    Input,
    Output,
}

impl BusDirection {
    pub fn raw(self) -> i32 {
        match self {
            Self::Input => ffi::DIRECTION_INPUT,
            Self::Output => ffi::DIRECTION_OUTPUT,
        }
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            ffi::DIRECTION_INPUT => Some(Self::Input),
            ffi::DIRECTION_OUTPUT => Some(Self::Output),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BusType {
    Main,
    Aux,
    Unknown(i32),
}

impl BusType {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            ffi::BUS_MAIN => Self::Main,
            ffi::BUS_AUX => Self::Aux,
            other => Self::Unknown(other),
        }
    }
}

/// `BusInfo` with decoded fields. `media` and `direction` keep the raw values
/// reported by the plug-in so mismatches can be diagnosed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusInfo {
    pub media: i32,
    pub direction: i32,
    pub channel_count: i32,
    pub name: String,
    pub bus_type: BusType,
    pub flags: u32,
}

impl BusInfo {
    pub fn is_default_active(&self) -> bool {
        self.flags & ffi::BUS_DEFAULT_ACTIVE != 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub id: ParamID,
    pub title: String,
    pub short_title: String,
    pub units: String,
    pub step_count: i32,
    pub default_normalized: ParamValue,
    pub unit_id: i32,
    pub flags: i32,
}

impl ParameterInfo {
    pub fn can_automate(&self) -> bool {
        self.flags & ffi::PARAM_CAN_AUTOMATE != 0
    }

    pub fn is_read_only(&self) -> bool {
        self.flags & ffi::PARAM_IS_READ_ONLY != 0
    }

    pub fn is_list(&self) -> bool {
        self.flags & ffi::PARAM_IS_LIST != 0
    }

    pub fn is_hidden(&self) -> bool {
        self.flags & ffi::PARAM_IS_HIDDEN != 0
    }

    pub fn is_program_change(&self) -> bool {
        self.flags & ffi::PARAM_IS_PROGRAM_CHANGE != 0
    }

    pub fn is_bypass(&self) -> bool {
        self.flags & ffi::PARAM_IS_BYPASS != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessMode {
    Realtime,
    Prefetch,
    Offline,
}

impl ProcessMode {
    pub fn raw(self) -> i32 {
        match self {
            Self::Realtime => ffi::PROCESS_REALTIME,
            Self::Prefetch => ffi::PROCESS_PREFETCH,
            Self::Offline => ffi::PROCESS_OFFLINE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Realtime => "realtime",
            Self::Prefetch => "prefetch",
            Self::Offline => "offline",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleSize {
    F32,
    F64,
}

impl SampleSize {
    pub fn raw(self) -> i32 {
        match self {
            Self::F32 => ffi::SAMPLE_32,
            Self::F64 => ffi::SAMPLE_64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IoMode {
    Simple,
    Advanced,
    OfflineProcessing,
}

impl IoMode {
    pub fn raw(self) -> i32 {
        match self {
            Self::Simple => ffi::IO_SIMPLE,
            Self::Advanced => ffi::IO_ADVANCED,
            Self::OfflineProcessing => ffi::IO_OFFLINE_PROCESSING,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessSetup {
    pub mode: ProcessMode,
    pub sample_size: SampleSize,
    pub max_block: usize,
    pub sample_rate: f64,
}

impl ProcessSetup {
    pub fn new(sample_rate: f64, max_block: usize, mode: ProcessMode) -> Self {
        Self {
            mode,
            sample_size: SampleSize::F32,
            max_block,
            sample_rate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamPoint {
    pub offset: i32,
    pub value: ParamValue,
}

/// Automation for one parameter within one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamQueue {
    pub id: ParamID,
    pub points: Vec<ParamPoint>,
}

/// One bus worth of channel buffers for a single `process` call.
#[derive(Debug)]
pub struct AudioBus<'a> {
    pub channels: Vec<&'a mut [f32]>,
    pub silence_flags: u64,
}

impl<'a> AudioBus<'a> {
    pub fn new(channels: Vec<&'a mut [f32]>) -> Self {
        Self {
            channels,
            silence_flags: 0,
        }
    }
}

#[derive(Debug)]
pub struct ProcessData<'a> {
    pub mode: ProcessMode,
    pub num_samples: usize,
    pub inputs: Vec<AudioBus<'a>>,
    pub outputs: Vec<AudioBus<'a>>,
    pub input_changes: Vec<ParamQueue>,
    /// Filled with whatever the plug-in reported back.
    pub output_changes: Vec<ParamQueue>,
}
