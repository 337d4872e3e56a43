//! In-process stand-in for a VST3 module: a stereo gain effect with a bypass
//! parameter and optional misbehaviours.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use vst3_host::ffi::{self, ParamID, ParamValue, SpeakerArrangement};
use vst3_host::{
    BusDirection, BusInfo, BusType, ClassDescriptor, ClassId, Component, Controller, FactoryError,
    FactoryInfo, HostContext, IoMode, LoadError, MediaType, ModuleLoader, ParameterInfo,
    PluginFactory, PluginModule, ProcessData, ProcessSetup, ResultCode, SampleSize,
};

pub const GAIN: ParamID = 0;
pub const BYPASS: ParamID = 1;
const STATE_BYTES: usize = 16;

/// Misbehaviours a mock class can be built with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Faults {
    /// NaN in the first output sample after `setProcessing(true)` at 96 kHz.
    pub nan_at_96k: bool,
    /// `process` never returns.
    pub hang_in_process: bool,
    /// `setActive(true)` succeeds before `initialize`.
    pub active_before_init: bool,
    /// `process` raises SIGSEGV.
    pub segv_in_process: bool,
    /// `setState` halves the stored gain.
    pub lossy_state: bool,
    /// Once it has seen signal the output carries a constant that never decays.
    pub endless_tail: bool,
    /// Bypassed output is the input at half level.
    pub leaky_bypass: bool,
    /// The last frame of every output channel is left unwritten.
    pub skip_last_frame: bool,
    /// `getState` fails once `setState` has rejected a stream.
    pub state_lost_after_rejection: bool,
}

#[derive(Debug, Clone)]
pub struct MockClass {
    pub descriptor: ClassDescriptor,
    pub faults: Faults,
}

pub fn class_id(byte: u8) -> ClassId {
    ClassId([byte; 16])
}

fn controller_id(byte: u8) -> ClassId {
    ClassId([byte ^ 0xC0; 16])
}

/// A stereo gain effect class.
pub fn gain_class(byte: u8, name: &str, faults: Faults) -> MockClass {
    let mut descriptor = ClassDescriptor::basic(class_id(byte), ffi::CATEGORY_AUDIO_MODULE, name);
    descriptor.vendor = "Mock Audio".into();
    descriptor.version = "1.2.0".into();
    descriptor.sdk_version = "VST 3.7.9".into();
    descriptor.sub_categories = ClassDescriptor::parse_sub_categories("Fx|Stereo");
    MockClass { descriptor, faults }
}

#[derive(Debug, Default)]
pub struct ModuleCounters {
    pub entries: AtomicUsize,
    pub exits: AtomicUsize,
}

impl ModuleCounters {
    pub fn entries(&self) -> usize {
        self.entries.load(Ordering::SeqCst)
    }

    pub fn exits(&self) -> usize {
        self.exits.load(Ordering::SeqCst)
    }
}

/// Serves mock modules from a path → classes table.
#[derive(Default)]
pub struct MockLoader {
    modules: HashMap<PathBuf, Vec<MockClass>>,
    pub counters: Arc<ModuleCounters>,
}

impl MockLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, path: impl Into<PathBuf>, classes: Vec<MockClass>) -> Self {
        self.modules.insert(path.into(), classes);
        self
    }
}

impl ModuleLoader for MockLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn PluginModule>, LoadError> {
        let classes = self
            .modules
            .get(path)
            .ok_or_else(|| LoadError::FileNotFound(path.to_path_buf()))?;
        self.counters.entries.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockModule {
            path: path.to_path_buf(),
            factory: Arc::new(MockFactory::new(classes.clone())),
            counters: Arc::clone(&self.counters),
            loaded: true,
        }))
    }
}

struct MockModule {
    path: PathBuf,
    factory: Arc<MockFactory>,
    counters: Arc<ModuleCounters>,
    loaded: bool,
}

impl PluginModule for MockModule {
    fn path(&self) -> &Path {
        &self.path
    }

    fn factory(&self) -> Result<Arc<dyn PluginFactory>, LoadError> {
        Ok(self.factory.clone())
    }

    fn unload(&mut self) {
        if std::mem::take(&mut self.loaded) {
            self.counters.exits.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct MockFactory {
    classes: Vec<MockClass>,
    /// Audio classes followed by their controller classes.
    advertised: Vec<ClassDescriptor>,
}

impl MockFactory {
    fn new(classes: Vec<MockClass>) -> Self {
        let mut advertised: Vec<ClassDescriptor> =
            classes.iter().map(|class| class.descriptor.clone()).collect();
        for class in &classes {
            let byte = class.descriptor.id.0[0];
            let mut controller = ClassDescriptor::basic(
                controller_id(byte),
                ffi::CATEGORY_COMPONENT_CONTROLLER,
                &format!("{} Controller", class.descriptor.name),
            );
            controller.vendor = class.descriptor.vendor.clone();
            advertised.push(controller);
        }
        Self { classes, advertised }
    }
}

impl PluginFactory for MockFactory {
    fn info(&self) -> Result<FactoryInfo, FactoryError> {
        Ok(FactoryInfo {
            vendor: "Mock Audio".into(),
            url: "https://mock.example".into(),
            email: "dev@mock.example".into(),
            flags: 0,
        })
    }

    fn class_count(&self) -> usize {
        self.advertised.len()
    }

    fn class_info(&self, index: usize) -> Result<ClassDescriptor, FactoryError> {
        self.advertised.get(index).cloned().ok_or(FactoryError::InvalidIndex {
            index,
            count: self.advertised.len(),
        })
    }

    fn create_component(&self, id: &ClassId) -> Result<Box<dyn Component>, FactoryError> {
        let class = self
            .classes
            .iter()
            .find(|class| class.descriptor.id == *id)
            .ok_or(FactoryError::UnknownId(*id))?;
        Ok(Box::new(GainComponent::new(class.descriptor.id.0[0], class.faults)))
    }
}

fn encode_state(gain: f64, bypass: f64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(STATE_BYTES);
    bytes.extend_from_slice(&gain.to_le_bytes());
    bytes.extend_from_slice(&bypass.to_le_bytes());
    bytes
}

fn decode_state(bytes: &[u8]) -> Option<(f64, f64)> {
    if bytes.len() != STATE_BYTES {
        return None;
    }
    let gain = f64::from_le_bytes(bytes[..8].try_into().ok()?);
    let bypass = f64::from_le_bytes(bytes[8..].try_into().ok()?);
    let valid = |value: f64| (0.0..=1.0).contains(&value);
    (valid(gain) && valid(bypass)).then_some((gain, bypass))
}

struct GainComponent {
    byte: u8,
    faults: Faults,
    initialized: bool,
    active: bool,
    processing: bool,
    sample_rate: f64,
    blocks_since_start: u64,
    gain: f64,
    bypass: f64,
    ring: f32,
    state_lost: bool,
    controller: Option<Arc<GainController>>,
}

impl GainComponent {
    fn new(byte: u8, faults: Faults) -> Self {
        Self {
            byte,
            faults,
            initialized: false,
            active: false,
            processing: false,
            sample_rate: 0.0,
            blocks_since_start: 0,
            gain: 0.5,
            bypass: 0.0,
            ring: 0.0,
            state_lost: false,
            controller: None,
        }
    }

    fn valid_bus(media: MediaType, index: i32) -> bool {
        media == MediaType::Audio && index == 0
    }
}

impl Component for GainComponent {
    fn initialize(&mut self, _host: &HostContext) -> ResultCode {
        if self.initialized {
            return ResultCode::FALSE;
        }
        self.initialized = true;
        self.controller = Some(Arc::new(GainController::default()));
        ResultCode::OK
    }

    fn terminate(&mut self) -> ResultCode {
        if !self.initialized {
            return ResultCode::FALSE;
        }
        self.initialized = false;
        self.active = false;
        self.processing = false;
        self.controller = None;
        ResultCode::OK
    }

    fn controller_class_id(&self) -> Option<ClassId> {
        Some(controller_id(self.byte))
    }

    fn set_io_mode(&mut self, _mode: IoMode) -> ResultCode {
        ResultCode::NOT_IMPLEMENTED
    }

    fn bus_count(&self, media: MediaType, _direction: BusDirection) -> i32 {
        i32::from(media == MediaType::Audio)
    }

    fn bus_info(
        &self,
        media: MediaType,
        direction: BusDirection,
        index: i32,
    ) -> Result<BusInfo, ResultCode> {
        if !Self::valid_bus(media, index) {
            return Err(ResultCode::INVALID_ARGUMENT);
        }
        Ok(BusInfo {
            media: media.raw(),
            direction: direction.raw(),
            channel_count: 2,
            name: match direction {
                BusDirection::Input => "Stereo In".into(),
                BusDirection::Output => "Stereo Out".into(),
            },
            bus_type: BusType::Main,
            flags: ffi::BUS_DEFAULT_ACTIVE,
        })
    }

    fn activate_bus(
        &mut self,
        media: MediaType,
        _direction: BusDirection,
        index: i32,
        _active: bool,
    ) -> ResultCode {
        if Self::valid_bus(media, index) {
            ResultCode::OK
        } else {
            ResultCode::INVALID_ARGUMENT
        }
    }

    fn set_active(&mut self, active: bool) -> ResultCode {
        if !self.initialized && !self.faults.active_before_init {
            return ResultCode::NOT_INITIALIZED;
        }
        self.active = active;
        if !active {
            self.processing = false;
        }
        ResultCode::OK
    }

    fn set_state(&mut self, state: &[u8]) -> ResultCode {
        match decode_state(state) {
            Some((gain, bypass)) => {
                self.gain = if self.faults.lossy_state { gain * 0.5 } else { gain };
                self.bypass = bypass;
                ResultCode::OK
            }
            None => {
                self.state_lost = self.faults.state_lost_after_rejection;
                ResultCode::INVALID_ARGUMENT
            }
        }
    }

    fn get_state(&mut self) -> Result<Vec<u8>, ResultCode> {
        if self.state_lost {
            return Err(ResultCode::FALSE);
        }
        Ok(encode_state(self.gain, self.bypass))
    }

    fn set_bus_arrangements(
        &mut self,
        inputs: &[SpeakerArrangement],
        outputs: &[SpeakerArrangement],
    ) -> ResultCode {
        let stereo =
            |arrangements: &[SpeakerArrangement]| arrangements == [ffi::ARRANGEMENT_STEREO];
        if stereo(inputs) && stereo(outputs) {
            ResultCode::OK
        } else {
            ResultCode::FALSE
        }
    }

    fn bus_arrangement(
        &self,
        _direction: BusDirection,
        index: i32,
    ) -> Result<SpeakerArrangement, ResultCode> {
        if index == 0 {
            Ok(ffi::ARRANGEMENT_STEREO)
        } else {
            Err(ResultCode::INVALID_ARGUMENT)
        }
    }

    fn can_process_sample_size(&self, size: SampleSize) -> ResultCode {
        match size {
            SampleSize::F32 => ResultCode::OK,
            SampleSize::F64 => ResultCode::FALSE,
        }
    }

    fn latency_samples(&self) -> u32 {
        0
    }

    fn setup_processing(&mut self, setup: &ProcessSetup) -> ResultCode {
        if !self.initialized || self.active {
            return ResultCode::FALSE;
        }
        self.sample_rate = setup.sample_rate;
        ResultCode::OK
    }

    fn set_processing(&mut self, processing: bool) -> ResultCode {
        if processing && !self.active {
            return ResultCode::FALSE;
        }
        self.processing = processing;
        self.blocks_since_start = 0;
        self.ring = 0.0;
        ResultCode::OK
    }

    fn process(&mut self, data: &mut ProcessData<'_>) -> ResultCode {
        if !self.initialized || !self.active {
            return ResultCode::NOT_INITIALIZED;
        }
        if self.faults.hang_in_process {
            loop {
                thread::sleep(Duration::from_millis(20));
            }
        }
        #[cfg(unix)]
        if self.faults.segv_in_process {
            // SAFETY: raising a signal touches no memory of ours.
            unsafe {
                libc::raise(libc::SIGSEGV);
            }
        }
        for queue in &data.input_changes {
            let Some(last) = queue.points.last() else {
                continue;
            };
            match queue.id {
                GAIN => self.gain = last.value.clamp(0.0, 1.0),
                BYPASS => self.bypass = last.value.clamp(0.0, 1.0),
                _ => {}
            }
        }

        let frames = data.num_samples;
        let (Some(input), Some(output)) = (data.inputs.first(), data.outputs.first_mut()) else {
            return ResultCode::OK;
        };
        let silent = input.silence_flags != 0;
        let factor = (self.gain * 2.0) as f32;
        let bypass_factor = if self.faults.leaky_bypass { 0.5 } else { 1.0 };
        if self.faults.endless_tail
            && !silent
            && input.channels.iter().any(|channel| channel.iter().any(|s| *s != 0.0))
        {
            self.ring = 0.25;
        }
        let ring = if silent { 0.0 } else { self.ring };
        let written = if self.faults.skip_last_frame {
            frames.saturating_sub(1)
        } else {
            frames
        };
        for (source, target) in input.channels.iter().zip(output.channels.iter_mut()) {
            for (frame, sample) in target[..written].iter_mut().enumerate() {
                *sample = if silent {
                    0.0
                } else if self.bypass >= 0.5 {
                    source[frame] * bypass_factor + ring
                } else {
                    source[frame] * factor + ring
                };
            }
        }
        output.silence_flags = if silent { (1 << output.channels.len()) - 1 } else { 0 };

        let first_after_start = self.blocks_since_start == 0;
        self.blocks_since_start += 1;
        if self.faults.nan_at_96k
            && first_after_start
            && self.sample_rate == 96_000.0
            && input
                .channels
                .first()
                .is_some_and(|channel| channel.first().is_some_and(|s| *s != 0.0))
        {
            let first = output.channels.first_mut().and_then(|channel| channel.first_mut());
            if let Some(sample) = first {
                *sample = f32::NAN;
            }
        }
        ResultCode::OK
    }

    fn tail_samples(&self) -> u32 {
        ffi::NO_TAIL
    }

    fn controller(&self) -> Option<Arc<dyn Controller>> {
        self.initialized
            .then(|| self.controller.clone())
            .flatten()
            .map(|controller| controller as Arc<dyn Controller>)
    }
}

/// Normalized values of gain and bypass.
struct GainController {
    values: Mutex<[ParamValue; 2]>,
}

impl Default for GainController {
    fn default() -> Self {
        Self {
            values: Mutex::new([0.5, 0.0]),
        }
    }
}

impl GainController {
    fn slot(id: ParamID) -> Option<usize> {
        match id {
            GAIN => Some(0),
            BYPASS => Some(1),
            _ => None,
        }
    }
}

impl Controller for GainController {
    fn parameter_count(&self) -> i32 {
        2
    }

    fn parameter_info(&self, index: i32) -> Result<ParameterInfo, ResultCode> {
        let info = |id, title: &str, step_count, default_normalized, flags| ParameterInfo {
            id,
            title: title.into(),
            short_title: title.into(),
            units: String::new(),
            step_count,
            default_normalized,
            unit_id: 0,
            flags,
        };
        match index {
            0 => Ok(info(GAIN, "Gain", 0, 0.5, ffi::PARAM_CAN_AUTOMATE)),
            1 => Ok(info(BYPASS, "Bypass", 1, 0.0, ffi::PARAM_CAN_AUTOMATE | ffi::PARAM_IS_BYPASS)),
            _ => Err(ResultCode::INVALID_ARGUMENT),
        }
    }

    fn param_string_by_value(&self, id: ParamID, value: ParamValue) -> Result<String, ResultCode> {
        match id {
            GAIN => Ok(format!("{:.6}", value * 2.0)),
            BYPASS => Ok(if value >= 0.5 { "On" } else { "Off" }.into()),
            _ => Err(ResultCode::INVALID_ARGUMENT),
        }
    }

    fn param_value_by_string(&self, id: ParamID, text: &str) -> Result<ParamValue, ResultCode> {
        match (id, text) {
            (GAIN, text) => text
                .parse::<f64>()
                .map(|plain| (plain / 2.0).clamp(0.0, 1.0))
                .map_err(|_| ResultCode::INVALID_ARGUMENT),
            (BYPASS, "On") => Ok(1.0),
            (BYPASS, "Off") => Ok(0.0),
            _ => Err(ResultCode::INVALID_ARGUMENT),
        }
    }

    fn normalized_to_plain(&self, id: ParamID, value: ParamValue) -> ParamValue {
        match id {
            BYPASS => (value * 2.0).floor().min(1.0),
            _ => value * 2.0,
        }
    }

    fn plain_to_normalized(&self, id: ParamID, plain: ParamValue) -> ParamValue {
        match id {
            BYPASS => plain.clamp(0.0, 1.0),
            _ => (plain / 2.0).clamp(0.0, 1.0),
        }
    }

    fn param_normalized(&self, id: ParamID) -> ParamValue {
        Self::slot(id).map_or(0.0, |slot| self.values.lock()[slot])
    }

    fn set_param_normalized(&self, id: ParamID, value: ParamValue) -> ResultCode {
        match Self::slot(id) {
            Some(slot) => {
                self.values.lock()[slot] = value.clamp(0.0, 1.0);
                ResultCode::OK
            }
            None => ResultCode::INVALID_ARGUMENT,
        }
    }

    fn set_component_state(&self, state: &[u8]) -> ResultCode {
        match decode_state(state) {
            Some((gain, bypass)) => {
                *self.values.lock() = [gain, bypass];
                ResultCode::OK
            }
            None => ResultCode::INVALID_ARGUMENT,
        }
    }

    fn get_state(&self) -> Result<Vec<u8>, ResultCode> {
        let [gain, bypass] = *self.values.lock();
        Ok(encode_state(gain, bypass))
    }

    fn set_state(&self, state: &[u8]) -> ResultCode {
        self.set_component_state(state)
    }
}
