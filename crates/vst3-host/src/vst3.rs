//! [`Component`] and [`Controller`] over the VST3 binary interface.

use std::ffi::c_void;
use std::ptr;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::com::ComPtr;
use crate::error::ResultCode;
use crate::factory::create_instance;
use crate::ffi::{
    self, AudioBusBuffers, IAudioProcessorVtbl, IComponentVtbl, IConnectionPointVtbl,
    IEditControllerVtbl, IPluginFactoryVtbl, ParamID, ParamValue, SpeakerArrangement, TChar, TUID,
};
use crate::host::{EmptyEventList, HostParameterChanges, MemoryStream};
use crate::loader::ModuleLibrary;
use crate::plugin::{
    AudioBus, BusDirection, BusInfo, BusType, Component, Controller, HostContext, IoMode, MediaType,
    ParameterInfo, ProcessData, ProcessSetup, SampleSize,
};
use crate::uid::ClassId;

fn tbool(value: bool) -> ffi::TBool {
    if value {
        ffi::TRUE
    } else {
        ffi::FALSE
    }
}

pub struct Vst3Component {
    id: ClassId,
    controller: Option<Arc<Vst3Controller>>,
    processor: Option<ComPtr<IAudioProcessorVtbl>>,
    component: ComPtr<IComponentVtbl>,
    factory: ComPtr<IPluginFactoryVtbl>,
    _library: Arc<ModuleLibrary>,
}

impl Vst3Component {
    pub(crate) fn new(
        id: ClassId,
        component: ComPtr<IComponentVtbl>,
        factory: ComPtr<IPluginFactoryVtbl>,
        library: Arc<ModuleLibrary>,
    ) -> Self {
        let processor = component.cast::<IAudioProcessorVtbl>();
        if processor.is_none() {
            warn!(class = %id, "component does not implement IAudioProcessor");
        }
        Self {
            id,
            controller: None,
            processor,
            component,
            factory,
            _library: library,
        }
    }

    /// Creates, initializes and connects the edit controller of this class.
    fn attach_controller(&mut self, host: &HostContext) -> Option<Arc<Vst3Controller>> {
        if let Some(controller) = self.component.cast::<IEditControllerVtbl>() {
            debug!(class = %self.id, "component is its own edit controller");
            return Some(Arc::new(Vst3Controller::new(controller, false, host)));
        }

        let controller_id = self.controller_class_id()?;
        let created = create_instance::<IEditControllerVtbl>(&self.factory, &controller_id);
        let controller = match created {
            Ok(controller) => controller,
            Err(err) => {
                warn!(class = %self.id, %err, "could not create edit controller");
                return None;
            }
        };
        let base = &controller.vtbl().base;
        let context = host.application().as_raw();
        let result = ResultCode::from(unsafe { (base.initialize)(controller.as_raw(), context) });
        if !result.is_ok() {
            warn!(class = %self.id, %result, "edit controller refused initialize");
            return None;
        }
        let controller = Vst3Controller::new(controller, true, host);
        controller.connect(&self.component);

        if let Ok(state) = self.get_state() {
            let result = controller.set_component_state(&state);
            debug!(class = %self.id, %result, "transferred component state to controller");
        }
        Some(Arc::new(controller))
    }

    fn detach_controller(&mut self) {
        if let Some(controller) = self.controller.take() {
            controller.shutdown();
        }
    }
}

impl Component for Vst3Component {
    fn initialize(&mut self, host: &HostContext) -> ResultCode {
        let base = &self.component.vtbl().base;
        let context = host.application().as_raw();
        let this = self.component.as_raw();
        let result = ResultCode::from(unsafe { (base.initialize)(this, context) });
        if result.is_ok() && self.controller.is_none() {
            self.controller = self.attach_controller(host);
        }
        result
    }

    fn terminate(&mut self) -> ResultCode {
        self.detach_controller();
        let base = &self.component.vtbl().base;
        ResultCode::from(unsafe { (base.terminate)(self.component.as_raw()) })
    }

    fn controller_class_id(&self) -> Option<ClassId> {
        let mut cid: TUID = [0; 16];
        let vtbl = self.component.vtbl();
        let result = unsafe { (vtbl.get_controller_class_id)(self.component.as_raw(), &mut cid) };
        let id = ClassId(cid);
        (result == ffi::RESULT_OK && !id.is_nil()).then_some(id)
    }

    fn set_io_mode(&mut self, mode: IoMode) -> ResultCode {
        let vtbl = self.component.vtbl();
        ResultCode::from(unsafe { (vtbl.set_io_mode)(self.component.as_raw(), mode.raw()) })
    }

    fn bus_count(&self, media: MediaType, direction: BusDirection) -> i32 {
        let vtbl = self.component.vtbl();
        unsafe { (vtbl.get_bus_count)(self.component.as_raw(), media.raw(), direction.raw()) }
    }

    fn bus_info(
        &self,
        media: MediaType,
        direction: BusDirection,
        index: i32,
    ) -> Result<BusInfo, ResultCode> {
        let mut info: ffi::BusInfo = unsafe { std::mem::zeroed() };
        let result = unsafe {
            (self.component.vtbl().get_bus_info)(
                self.component.as_raw(),
                media.raw(),
                direction.raw(),
                index,
                &mut info,
            )
        };
        ResultCode::from(result).check()?;
        Ok(BusInfo {
            media: info.media_type,
            direction: info.direction,
            channel_count: info.channel_count,
            name: ffi::read_tchar(&info.name),
            bus_type: BusType::from_raw(info.bus_type),
            flags: info.flags,
        })
    }

    fn activate_bus(
        &mut self,
        media: MediaType,
        direction: BusDirection,
        index: i32,
        active: bool,
    ) -> ResultCode {
        ResultCode::from(unsafe {
            (self.component.vtbl().activate_bus)(
                self.component.as_raw(),
                media.raw(),
                direction.raw(),
                index,
                tbool(active),
            )
        })
    }

    fn set_active(&mut self, active: bool) -> ResultCode {
        let vtbl = self.component.vtbl();
        ResultCode::from(unsafe { (vtbl.set_active)(self.component.as_raw(), tbool(active)) })
    }

    fn set_state(&mut self, state: &[u8]) -> ResultCode {
        let stream = MemoryStream::from_bytes(state);
        let vtbl = self.component.vtbl();
        ResultCode::from(unsafe { (vtbl.set_state)(self.component.as_raw(), stream.as_raw()) })
    }

    fn get_state(&mut self) -> Result<Vec<u8>, ResultCode> {
        let stream = MemoryStream::new();
        let vtbl = self.component.vtbl();
        let result = unsafe { (vtbl.get_state)(self.component.as_raw(), stream.as_raw()) };
        ResultCode::from(result).check()?;
        Ok(stream.bytes())
    }

    fn set_bus_arrangements(
        &mut self,
        inputs: &[SpeakerArrangement],
        outputs: &[SpeakerArrangement],
    ) -> ResultCode {
        let Some(processor) = &self.processor else {
            return ResultCode::NO_INTERFACE;
        };
        let mut inputs = inputs.to_vec();
        let mut outputs = outputs.to_vec();
        let as_ptr = |list: &mut Vec<SpeakerArrangement>| {
            if list.is_empty() {
                ptr::null_mut()
            } else {
                list.as_mut_ptr()
            }
        };
        let (ins, outs) = (as_ptr(&mut inputs), as_ptr(&mut outputs));
        ResultCode::from(unsafe {
            (processor.vtbl().set_bus_arrangements)(
                processor.as_raw(),
                ins,
                inputs.len() as i32,
                outs,
                outputs.len() as i32,
            )
        })
    }

    fn bus_arrangement(
        &self,
        direction: BusDirection,
        index: i32,
    ) -> Result<SpeakerArrangement, ResultCode> {
        let processor = self.processor.as_ref().ok_or(ResultCode::NO_INTERFACE)?;
        let mut arrangement: SpeakerArrangement = 0;
        let result = unsafe {
            (processor.vtbl().get_bus_arrangement)(
                processor.as_raw(),
                direction.raw(),
                index,
                &mut arrangement,
            )
        };
        ResultCode::from(result).check()?;
        Ok(arrangement)
    }

    fn can_process_sample_size(&self, size: SampleSize) -> ResultCode {
        match &self.processor {
            Some(processor) => {
                let vtbl = processor.vtbl();
                ResultCode::from(unsafe {
                    (vtbl.can_process_sample_size)(processor.as_raw(), size.raw())
                })
            }
            None => ResultCode::NO_INTERFACE,
        }
    }

    fn latency_samples(&self) -> u32 {
        self.processor.as_ref().map_or(0, |processor| unsafe {
            (processor.vtbl().get_latency_samples)(processor.as_raw())
        })
    }

    fn setup_processing(&mut self, setup: &ProcessSetup) -> ResultCode {
        let Some(processor) = &self.processor else {
            return ResultCode::NO_INTERFACE;
        };
        let mut raw = ffi::ProcessSetup {
            process_mode: setup.mode.raw(),
            symbolic_sample_size: setup.sample_size.raw(),
            max_samples_per_block: setup.max_block as i32,
            sample_rate: setup.sample_rate,
        };
        let vtbl = processor.vtbl();
        ResultCode::from(unsafe { (vtbl.setup_processing)(processor.as_raw(), &mut raw) })
    }

    fn set_processing(&mut self, processing: bool) -> ResultCode {
        match &self.processor {
            Some(processor) => {
                let vtbl = processor.vtbl();
                ResultCode::from(unsafe {
                    (vtbl.set_processing)(processor.as_raw(), tbool(processing))
                })
            }
            None => ResultCode::NO_INTERFACE,
        }
    }

    fn process(&mut self, data: &mut ProcessData<'_>) -> ResultCode {
        let Some(processor) = &self.processor else {
            return ResultCode::NO_INTERFACE;
        };

        let mut input_channels = channel_pointers(&mut data.inputs);
        let mut output_channels = channel_pointers(&mut data.outputs);
        let mut inputs = bus_buffers(&data.inputs, &mut input_channels);
        let mut outputs = bus_buffers(&data.outputs, &mut output_channels);

        let input_changes = HostParameterChanges::new(&data.input_changes);
        let output_changes = HostParameterChanges::new(&[]);
        let input_events = EmptyEventList::new();
        let output_events = EmptyEventList::new();

        let mut raw = ffi::ProcessData {
            process_mode: data.mode.raw(),
            symbolic_sample_size: ffi::SAMPLE_32,
            num_samples: data.num_samples as i32,
            num_inputs: inputs.len() as i32,
            num_outputs: outputs.len() as i32,
            inputs: slice_ptr(&mut inputs),
            outputs: slice_ptr(&mut outputs),
            input_parameter_changes: input_changes.as_raw(),
            output_parameter_changes: output_changes.as_raw(),
            input_events: input_events.as_raw(),
            output_events: output_events.as_raw(),
            process_context: ptr::null_mut(),
        };
        let vtbl = processor.vtbl();
        let result = ResultCode::from(unsafe { (vtbl.process)(processor.as_raw(), &mut raw) });

        for (bus, buffers) in data.outputs.iter_mut().zip(&outputs) {
            bus.silence_flags = buffers.silence_flags;
        }
        data.output_changes = output_changes.collect();
        result
    }

    fn tail_samples(&self) -> u32 {
        self.processor.as_ref().map_or(ffi::NO_TAIL, |processor| unsafe {
            (processor.vtbl().get_tail_samples)(processor.as_raw())
        })
    }

    fn controller(&self) -> Option<Arc<dyn Controller>> {
        self.controller.clone().map(|controller| controller as Arc<dyn Controller>)
    }
}

impl Drop for Vst3Component {
    fn drop(&mut self) {
        self.detach_controller();
    }
}

fn channel_pointers(buses: &mut [AudioBus<'_>]) -> Vec<Vec<*mut f32>> {
    buses
        .iter_mut()
        .map(|bus| bus.channels.iter_mut().map(|channel| channel.as_mut_ptr()).collect())
        .collect()
}

fn bus_buffers(buses: &[AudioBus<'_>], channels: &mut [Vec<*mut f32>]) -> Vec<AudioBusBuffers> {
    buses
        .iter()
        .zip(channels.iter_mut())
        .map(|(bus, pointers)| AudioBusBuffers {
            num_channels: pointers.len() as i32,
            silence_flags: bus.silence_flags,
            channel_buffers32: slice_ptr(pointers),
        })
        .collect()
}

fn slice_ptr<T>(items: &mut [T]) -> *mut T {
    if items.is_empty() {
        ptr::null_mut()
    } else {
        items.as_mut_ptr()
    }
}

/// The edit controller of a component, either a separate object or the
/// component itself.
pub struct Vst3Controller {
    controller: ComPtr<IEditControllerVtbl>,
    separate: bool,
    connection: Mutex<Option<(ComPtr<IConnectionPointVtbl>, ComPtr<IConnectionPointVtbl>)>>,
    terminated: Mutex<bool>,
}

impl Vst3Controller {
    fn new(controller: ComPtr<IEditControllerVtbl>, separate: bool, host: &HostContext) -> Self {
        let result = ResultCode::from(unsafe {
            (controller.vtbl().set_component_handler)(controller.as_raw(), host.handler().as_raw())
        });
        debug!(%result, "installed component handler");
        Self {
            controller,
            separate,
            connection: Mutex::new(None),
            terminated: Mutex::new(false),
        }
    }

    fn connect(&self, component: &ComPtr<IComponentVtbl>) {
        let (Some(component_point), Some(controller_point)) = (
            component.cast::<IConnectionPointVtbl>(),
            self.controller.cast::<IConnectionPointVtbl>(),
        ) else {
            debug!("component and controller are not connectable");
            return;
        };
        unsafe {
            (component_point.vtbl().connect)(component_point.as_raw(), controller_point.as_raw());
            (controller_point.vtbl().connect)(controller_point.as_raw(), component_point.as_raw());
        }
        *self.connection.lock() = Some((component_point, controller_point));
    }

    /// Disconnects and terminates a separate controller. Runs once.
    fn shutdown(&self) {
        let mut terminated = self.terminated.lock();
        if *terminated {
            return;
        }
        *terminated = true;
        if let Some((component_point, controller_point)) = self.connection.lock().take() {
            let component_raw = component_point.as_raw();
            let controller_raw = controller_point.as_raw();
            unsafe {
                (component_point.vtbl().disconnect)(component_raw, controller_raw);
                (controller_point.vtbl().disconnect)(controller_raw, component_raw);
            }
        }
        let vtbl = self.controller.vtbl();
        unsafe { (vtbl.set_component_handler)(self.controller.as_raw(), ptr::null_mut()) };
        if self.separate {
            let base = &self.controller.vtbl().base;
            let result = ResultCode::from(unsafe { (base.terminate)(self.controller.as_raw()) });
            debug!(%result, "terminated edit controller");
        }
    }

    fn stream_call(
        &self,
        call: unsafe extern "system" fn(*mut c_void, *mut c_void) -> ffi::tresult,
        state: &[u8],
    ) -> ResultCode {
        let stream = MemoryStream::from_bytes(state);
        ResultCode::from(unsafe { call(self.controller.as_raw(), stream.as_raw()) })
    }
}

impl Controller for Vst3Controller {
    fn parameter_count(&self) -> i32 {
        unsafe { (self.controller.vtbl().get_parameter_count)(self.controller.as_raw()) }
    }

    fn parameter_info(&self, index: i32) -> Result<ParameterInfo, ResultCode> {
        let mut info: ffi::ParameterInfo = unsafe { std::mem::zeroed() };
        let vtbl = self.controller.vtbl();
        let this = self.controller.as_raw();
        let result = unsafe { (vtbl.get_parameter_info)(this, index, &mut info) };
        ResultCode::from(result).check()?;
        Ok(ParameterInfo {
            id: info.id,
            title: ffi::read_tchar(&info.title),
            short_title: ffi::read_tchar(&info.short_title),
            units: ffi::read_tchar(&info.units),
            step_count: info.step_count,
            default_normalized: info.default_normalized_value,
            unit_id: info.unit_id,
            flags: info.flags,
        })
    }

    fn param_string_by_value(&self, id: ParamID, value: ParamValue) -> Result<String, ResultCode> {
        let mut text: ffi::String128 = [0; 128];
        let vtbl = self.controller.vtbl();
        let result = unsafe {
            (vtbl.get_param_string_by_value)(self.controller.as_raw(), id, value, text.as_mut_ptr())
        };
        ResultCode::from(result).check()?;
        Ok(ffi::read_tchar(&text))
    }

    fn param_value_by_string(&self, id: ParamID, text: &str) -> Result<ParamValue, ResultCode> {
        let mut buffer: ffi::String128 = [0; 128];
        ffi::write_tchar(text, &mut buffer);
        let mut value: ParamValue = 0.0;
        let result = unsafe {
            (self.controller.vtbl().get_param_value_by_string)(
                self.controller.as_raw(),
                id,
                buffer.as_mut_ptr() as *mut TChar,
                &mut value,
            )
        };
        ResultCode::from(result).check()?;
        Ok(value)
    }

    fn normalized_to_plain(&self, id: ParamID, value: ParamValue) -> ParamValue {
        let vtbl = self.controller.vtbl();
        unsafe { (vtbl.normalized_param_to_plain)(self.controller.as_raw(), id, value) }
    }

    fn plain_to_normalized(&self, id: ParamID, value: ParamValue) -> ParamValue {
        let vtbl = self.controller.vtbl();
        unsafe { (vtbl.plain_param_to_normalized)(self.controller.as_raw(), id, value) }
    }

    fn param_normalized(&self, id: ParamID) -> ParamValue {
        unsafe { (self.controller.vtbl().get_param_normalized)(self.controller.as_raw(), id) }
    }

    fn set_param_normalized(&self, id: ParamID, value: ParamValue) -> ResultCode {
        let vtbl = self.controller.vtbl();
        let this = self.controller.as_raw();
        ResultCode::from(unsafe { (vtbl.set_param_normalized)(this, id, value) })
    }

    fn set_component_state(&self, state: &[u8]) -> ResultCode {
        self.stream_call(self.controller.vtbl().set_component_state, state)
    }

    fn get_state(&self) -> Result<Vec<u8>, ResultCode> {
        let stream = MemoryStream::new();
        let vtbl = self.controller.vtbl();
        let result = unsafe { (vtbl.get_state)(self.controller.as_raw(), stream.as_raw()) };
        ResultCode::from(result).check()?;
        Ok(stream.bytes())
    }

    fn set_state(&self, state: &[u8]) -> ResultCode {
        self.stream_call(self.controller.vtbl().set_state, state)
    }
}

impl Drop for Vst3Controller {
    fn drop(&mut self) {
        self.shutdown();
    }
}
