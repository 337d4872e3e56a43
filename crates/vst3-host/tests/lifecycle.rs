use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use vst3_host::ffi::{self, SpeakerArrangement};
use vst3_host::{
    BusDirection, BusInfo, ClassDescriptor, ClassId, Component, Controller, FactoryError,
    FactoryInfo, FactoryInspector, HostContext, IoMode, LifecycleError, LifecycleEvent,
    LifecycleState, MediaType, PluginFactory, ProcessData, ProcessSetup, ResultCode, SampleSize,
};

type CallLog = Arc<Mutex<Vec<&'static str>>>;

struct RecordingComponent {
    calls: CallLog,
    processing_result: ResultCode,
}

impl Component for RecordingComponent {
    fn initialize(&mut self, _host: &HostContext) -> ResultCode {
        self.calls.lock().push("initialize");
        ResultCode::OK
    }
    fn terminate(&mut self) -> ResultCode {
        self.calls.lock().push("terminate");
        ResultCode::OK
    }
    fn controller_class_id(&self) -> Option<ClassId> {
        None
    }
    fn set_io_mode(&mut self, _mode: IoMode) -> ResultCode {
        ResultCode::NOT_IMPLEMENTED
    }
    fn bus_count(&self, _media: MediaType, _direction: BusDirection) -> i32 {
        0
    }
    fn bus_info(
        &self,
        _media: MediaType,
        _direction: BusDirection,
        _index: i32,
    ) -> Result<BusInfo, ResultCode> {
        Err(ResultCode::INVALID_ARGUMENT)
    }
    fn activate_bus(
        &mut self,
        _media: MediaType,
        _direction: BusDirection,
        _index: i32,
        _active: bool,
    ) -> ResultCode {
        ResultCode::INVALID_ARGUMENT
    }
    fn set_active(&mut self, active: bool) -> ResultCode {
        self.calls.lock().push(if active { "activate" } else { "deactivate" });
        ResultCode::OK
    }
    fn set_state(&mut self, _state: &[u8]) -> ResultCode {
        ResultCode::OK
    }
    fn get_state(&mut self) -> Result<Vec<u8>, ResultCode> {
        Ok(Vec::new())
    }
    fn set_bus_arrangements(
        &mut self,
        _inputs: &[SpeakerArrangement],
        _outputs: &[SpeakerArrangement],
    ) -> ResultCode {
        self.calls.lock().push("arrange");
        ResultCode::OK
    }
    fn bus_arrangement(
        &self,
        _direction: BusDirection,
        _index: i32,
    ) -> Result<SpeakerArrangement, ResultCode> {
        Err(ResultCode::INVALID_ARGUMENT)
    }
    fn can_process_sample_size(&self, size: SampleSize) -> ResultCode {
        if size == SampleSize::F32 {
            ResultCode::OK
        } else {
            ResultCode::FALSE
        }
    }
    fn latency_samples(&self) -> u32 {
        0
    }
    fn setup_processing(&mut self, _setup: &ProcessSetup) -> ResultCode {
        self.calls.lock().push("setup");
        ResultCode::OK
    }
    fn set_processing(&mut self, processing: bool) -> ResultCode {
        self.calls.lock().push(if processing { "start" } else { "stop" });
        self.processing_result
    }
    fn process(&mut self, _data: &mut ProcessData<'_>) -> ResultCode {
        self.calls.lock().push("process");
        ResultCode::OK
    }
    fn tail_samples(&self) -> u32 {
        ffi::NO_TAIL
    }
    fn controller(&self) -> Option<Arc<dyn Controller>> {
        None
    }
}

struct RecordingFactory {
    classes: Vec<ClassDescriptor>,
    calls: CallLog,
    created: AtomicUsize,
    processing_result: ResultCode,
}

impl RecordingFactory {
    fn new(classes: Vec<ClassDescriptor>) -> Self {
        Self {
            classes,
            calls: Arc::new(Mutex::new(Vec::new())),
            created: AtomicUsize::new(0),
            processing_result: ResultCode::OK,
        }
    }
}

impl PluginFactory for RecordingFactory {
    fn info(&self) -> Result<FactoryInfo, FactoryError> {
        Ok(FactoryInfo::default())
    }
    fn class_count(&self) -> usize {
        self.classes.len()
    }
    fn class_info(&self, index: usize) -> Result<ClassDescriptor, FactoryError> {
        self.classes.get(index).cloned().ok_or(FactoryError::InvalidIndex {
            index,
            count: self.classes.len(),
        })
    }
    fn create_component(&self, _id: &ClassId) -> Result<Box<dyn Component>, FactoryError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingComponent {
            calls: self.calls.clone(),
            processing_result: self.processing_result,
        }))
    }
}

fn effect(byte: u8, name: &str) -> ClassDescriptor {
    ClassDescriptor::basic(ClassId([byte; 16]), ffi::CATEGORY_AUDIO_MODULE, name)
}

fn inspector(factory: RecordingFactory) -> (FactoryInspector, Arc<RecordingFactory>) {
    let factory = Arc::new(factory);
    let inspector = FactoryInspector::new(factory.clone(), HostContext::new("lifecycle-test"));
    (inspector, factory)
}

#[test]
fn enumeration_drops_duplicates_with_a_diagnostic() {
    let (inspector, _) = inspector(RecordingFactory::new(vec![
        effect(1, "Gain"),
        effect(1, "Gain copy"),
        effect(2, "Delay"),
    ]));
    let enumeration = inspector.enumerate().unwrap();
    let names: Vec<_> = enumeration.classes.iter().map(|class| class.name.as_str()).collect();
    assert_eq!(names, vec!["Gain", "Delay"]);
    assert_eq!(enumeration.diagnostics.len(), 1);
    assert!(enumeration.diagnostics[0].contains("Gain copy"));
}

#[test]
fn unknown_identifier_never_reaches_the_factory() {
    let (inspector, factory) = inspector(RecordingFactory::new(vec![effect(1, "Gain")]));
    let err = inspector.create(&ClassId([9; 16])).unwrap_err();
    assert_eq!(err.kind(), "unknown-id");
    assert_eq!(factory.created.load(Ordering::SeqCst), 0);
}

#[test]
fn dropping_a_processing_instance_unwinds_it() {
    let (inspector, factory) = inspector(RecordingFactory::new(vec![effect(1, "Gain")]));
    let class = ClassId([1; 16]);
    {
        let mut instance = inspector.create(&class).unwrap();
        instance.initialize().unwrap();
        instance.set_bus_arrangements(&[], &[]).unwrap();
        let setup = ProcessSetup::new(48_000.0, 512, vst3_host::ProcessMode::Realtime);
        instance.setup_processing(&setup).unwrap();
        instance.activate().unwrap();
        instance.start_processing().unwrap();
        assert_eq!(instance.state(), LifecycleState::Processing);
    }
    assert_eq!(
        *factory.calls.lock(),
        vec![
            "initialize",
            "arrange",
            "setup",
            "activate",
            "start",
            "stop",
            "deactivate",
            "terminate"
        ]
    );
    let counts = inspector.ledger().counts(&class);
    assert_eq!((counts.created, counts.released, counts.net()), (1, 1, 0));
}

#[test]
fn illegal_transition_is_refused_host_side() {
    let (inspector, factory) = inspector(RecordingFactory::new(vec![effect(1, "Gain")]));
    let mut instance = inspector.create(&ClassId([1; 16])).unwrap();
    let err = instance.activate().unwrap_err();
    assert_eq!(
        err,
        LifecycleError::Illegal {
            state: LifecycleState::Created,
            event: LifecycleEvent::Activate
        }
    );
    assert!(factory.calls.lock().is_empty());
    assert!(!instance.is_tainted());
    instance.raw().set_active(true);
    assert!(instance.is_tainted());
    inspector.release(instance);
}

#[test]
fn not_implemented_set_processing_is_accepted() {
    let mut recording = RecordingFactory::new(vec![effect(1, "Gain")]);
    recording.processing_result = ResultCode::NOT_IMPLEMENTED;
    let (inspector, _) = inspector(recording);
    let mut instance = inspector.create(&ClassId([1; 16])).unwrap();
    instance.initialize().unwrap();
    instance.set_bus_arrangements(&[], &[]).unwrap();
    instance.activate().unwrap();
    instance.start_processing().unwrap();
    instance.stop_processing().unwrap();
    assert_eq!(instance.state(), LifecycleState::Activated);
}

#[test]
fn force_release_settles_an_abandoned_ticket_once() {
    let (inspector, _) = inspector(RecordingFactory::new(vec![effect(1, "Gain")]));
    let class = ClassId([1; 16]);
    let instance = inspector.create(&class).unwrap();
    let ticket = instance.ticket();
    assert!(inspector.force_release(ticket));
    drop(instance);
    let counts = inspector.ledger().counts(&class);
    assert_eq!((counts.released, counts.forced, counts.net()), (0, 1, 0));
}
