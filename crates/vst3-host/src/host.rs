//! Host-side objects handed to plug-ins.
//!
//! Each object is a heap allocation laid out as `[vtable, refcount, iids, state]`
//! and freed when its last reference is released, whichever side drops it.

use std::ffi::c_void;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::com::ComPtr;
use crate::ffi::{
    self, tresult, FUnknownVtbl, IBStreamVtbl, IComponentHandlerVtbl, IEventListVtbl,
    IHostApplicationVtbl, IParamValueQueueVtbl, IParameterChangesVtbl, Interface, ParamID,
    ParamValue, TChar, TUID,
};
use crate::plugin::{ParamPoint, ParamQueue};

#[repr(C)]
struct HostObject<T> {
    vtbl: *const c_void,
    refs: AtomicU32,
    iids: &'static [TUID],
    state: T,
}

impl<T> HostObject<T> {
    fn allocate(vtbl: *const c_void, iids: &'static [TUID], state: T) -> NonNull<c_void> {
        let boxed = Box::new(HostObject {
            vtbl,
            refs: AtomicU32::new(1),
            iids,
            state,
        });
        NonNull::from(Box::leak(boxed)).cast()
    }

    unsafe fn state<'a>(this: *mut c_void) -> &'a T {
        &(*(this as *const HostObject<T>)).state
    }
}

unsafe extern "system" fn query_interface<T>(
    this: *mut c_void,
    iid: *const TUID,
    obj: *mut *mut c_void,
) -> tresult {
    if obj.is_null() || iid.is_null() {
        return ffi::INVALID_ARGUMENT;
    }
    let object = &*(this as *const HostObject<T>);
    let requested = &*iid;
    if *requested == FUnknownVtbl::IID || object.iids.contains(requested) {
        object.refs.fetch_add(1, Ordering::AcqRel);
        *obj = this;
        ffi::RESULT_OK
    } else {
        *obj = ptr::null_mut();
        ffi::NO_INTERFACE
    }
}

unsafe extern "system" fn add_ref<T>(this: *mut c_void) -> u32 {
    let object = &*(this as *const HostObject<T>);
    object.refs.fetch_add(1, Ordering::AcqRel) + 1
}

unsafe extern "system" fn release<T>(this: *mut c_void) -> u32 {
    let object = &*(this as *const HostObject<T>);
    let previous = object.refs.fetch_sub(1, Ordering::AcqRel);
    if previous == 1 {
        drop(Box::from_raw(this as *mut HostObject<T>));
    }
    previous.saturating_sub(1)
}

const fn unknown<T>() -> FUnknownVtbl {
    FUnknownVtbl {
        query_interface: query_interface::<T>,
        add_ref: add_ref::<T>,
        release: release::<T>,
    }
}

// ---------------------------------------------------------------------------
// IHostApplication
// ---------------------------------------------------------------------------

static HOST_APPLICATION_IIDS: [TUID; 1] = [IHostApplicationVtbl::IID];

static HOST_APPLICATION_VTBL: IHostApplicationVtbl = IHostApplicationVtbl {
    unknown: unknown::<String>(),
    get_name: host_get_name,
    create_instance: host_create_instance,
};

unsafe extern "system" fn host_get_name(this: *mut c_void, name: *mut TChar) -> tresult {
    if name.is_null() {
        return ffi::INVALID_ARGUMENT;
    }
    let host_name = HostObject::<String>::state(this);
    let buffer = std::slice::from_raw_parts_mut(name, 128);
    ffi::write_tchar(host_name, buffer);
    ffi::RESULT_OK
}

unsafe extern "system" fn host_create_instance(
    _this: *mut c_void,
    _cid: *mut u8,
    _iid: *mut u8,
    obj: *mut *mut c_void,
) -> tresult {
    if !obj.is_null() {
        *obj = ptr::null_mut();
    }
    ffi::RESULT_FALSE
}

/// The `IHostApplication` context passed to `initialize`.
#[derive(Clone)]
pub struct HostApplication {
    ptr: ComPtr<IHostApplicationVtbl>,
}

impl HostApplication {
    pub fn new(name: &str) -> Self {
        let raw = HostObject::allocate(
            &HOST_APPLICATION_VTBL as *const _ as *const c_void,
            &HOST_APPLICATION_IIDS,
            name.to_string(),
        );
        Self {
            ptr: unsafe { ComPtr::from_non_null(raw) },
        }
    }

    pub fn as_raw(&self) -> *mut c_void {
        self.ptr.as_raw()
    }
}

// ---------------------------------------------------------------------------
// IBStream
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StreamState {
    data: Vec<u8>,
    position: usize,
}

static STREAM_IIDS: [TUID; 1] = [IBStreamVtbl::IID];

static STREAM_VTBL: IBStreamVtbl = IBStreamVtbl {
    unknown: unknown::<Mutex<StreamState>>(),
    read: stream_read,
    write: stream_write,
    seek: stream_seek,
    tell: stream_tell,
};

unsafe extern "system" fn stream_read(
    this: *mut c_void,
    buffer: *mut c_void,
    num_bytes: i32,
    num_read: *mut i32,
) -> tresult {
    if num_bytes < 0 || (buffer.is_null() && num_bytes > 0) {
        return ffi::INVALID_ARGUMENT;
    }
    let mut state = HostObject::<Mutex<StreamState>>::state(this).lock();
    let available = state.data.len().saturating_sub(state.position);
    let count = available.min(num_bytes as usize);
    if count > 0 {
        let start = state.position;
        ptr::copy_nonoverlapping(state.data[start..].as_ptr(), buffer as *mut u8, count);
    }
    state.position += count;
    if !num_read.is_null() {
        *num_read = count as i32;
    }
    ffi::RESULT_OK
}

unsafe extern "system" fn stream_write(
    this: *mut c_void,
    buffer: *mut c_void,
    num_bytes: i32,
    num_written: *mut i32,
) -> tresult {
    if num_bytes < 0 || (buffer.is_null() && num_bytes > 0) {
        return ffi::INVALID_ARGUMENT;
    }
    let mut state = HostObject::<Mutex<StreamState>>::state(this).lock();
    let count = num_bytes as usize;
    let end = state.position + count;
    if state.data.len() < end {
        state.data.resize(end, 0);
    }
    if count > 0 {
        let start = state.position;
        let source = std::slice::from_raw_parts(buffer as *const u8, count);
        state.data[start..end].copy_from_slice(source);
    }
    state.position = end;
    if !num_written.is_null() {
        *num_written = count as i32;
    }
    ffi::RESULT_OK
}

unsafe extern "system" fn stream_seek(
    this: *mut c_void,
    pos: i64,
    mode: i32,
    result: *mut i64,
) -> tresult {
    let mut state = HostObject::<Mutex<StreamState>>::state(this).lock();
    let base = match mode {
        ffi::SEEK_SET => 0,
        ffi::SEEK_CUR => state.position as i64,
        ffi::SEEK_END => state.data.len() as i64,
        _ => return ffi::INVALID_ARGUMENT,
    };
    let target = base + pos;
    if target < 0 {
        return ffi::INVALID_ARGUMENT;
    }
    state.position = target as usize;
    if !result.is_null() {
        *result = target;
    }
    ffi::RESULT_OK
}

unsafe extern "system" fn stream_tell(this: *mut c_void, pos: *mut i64) -> tresult {
    if pos.is_null() {
        return ffi::INVALID_ARGUMENT;
    }
    let state = HostObject::<Mutex<StreamState>>::state(this).lock();
    *pos = state.position as i64;
    ffi::RESULT_OK
}

/// Growable in-memory `IBStream` used for state round trips.
pub struct MemoryStream {
    ptr: ComPtr<IBStreamVtbl>,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::from_bytes(&[])
    }

    /// A stream positioned at the start of `data`.
    pub fn from_bytes(data: &[u8]) -> Self {
        let raw = HostObject::allocate(
            &STREAM_VTBL as *const _ as *const c_void,
            &STREAM_IIDS,
            Mutex::new(StreamState {
                data: data.to_vec(),
                position: 0,
            }),
        );
        Self {
            ptr: unsafe { ComPtr::from_non_null(raw) },
        }
    }

    pub fn as_raw(&self) -> *mut c_void {
        self.ptr.as_raw()
    }

    pub fn bytes(&self) -> Vec<u8> {
        unsafe { HostObject::<Mutex<StreamState>>::state(self.ptr.as_raw()) }
            .lock()
            .data
            .clone()
    }

    pub fn rewind(&self) {
        unsafe { HostObject::<Mutex<StreamState>>::state(self.ptr.as_raw()) }
            .lock()
            .position = 0;
    }
}

impl Default for MemoryStream {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// IComponentHandler
// ---------------------------------------------------------------------------

/// A parameter edit reported by a controller through `performEdit`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamEdit {
    pub id: ParamID,
    pub value: ParamValue,
}

#[derive(Default)]
struct HandlerState {
    edits: Mutex<Vec<ParamEdit>>,
    open_edits: AtomicI32,
    restart_flags: AtomicI32,
}

static HANDLER_IIDS: [TUID; 1] = [IComponentHandlerVtbl::IID];

static HANDLER_VTBL: IComponentHandlerVtbl = IComponentHandlerVtbl {
    unknown: unknown::<HandlerState>(),
    begin_edit: handler_begin_edit,
    perform_edit: handler_perform_edit,
    end_edit: handler_end_edit,
    restart_component: handler_restart_component,
};

unsafe extern "system" fn handler_begin_edit(this: *mut c_void, _id: ParamID) -> tresult {
    HostObject::<HandlerState>::state(this)
        .open_edits
        .fetch_add(1, Ordering::AcqRel);
    ffi::RESULT_OK
}

unsafe extern "system" fn handler_perform_edit(
    this: *mut c_void,
    id: ParamID,
    value: ParamValue,
) -> tresult {
    HostObject::<HandlerState>::state(this)
        .edits
        .lock()
        .push(ParamEdit { id, value });
    ffi::RESULT_OK
}

unsafe extern "system" fn handler_end_edit(this: *mut c_void, _id: ParamID) -> tresult {
    HostObject::<HandlerState>::state(this)
        .open_edits
        .fetch_sub(1, Ordering::AcqRel);
    ffi::RESULT_OK
}

unsafe extern "system" fn handler_restart_component(this: *mut c_void, flags: i32) -> tresult {
    HostObject::<HandlerState>::state(this)
        .restart_flags
        .fetch_or(flags, Ordering::AcqRel);
    ffi::RESULT_OK
}

/// Records controller → host notifications.
#[derive(Clone)]
pub struct ComponentHandler {
    ptr: ComPtr<IComponentHandlerVtbl>,
}

impl ComponentHandler {
    pub fn new() -> Self {
        let raw = HostObject::allocate(
            &HANDLER_VTBL as *const _ as *const c_void,
            &HANDLER_IIDS,
            HandlerState::default(),
        );
        Self {
            ptr: unsafe { ComPtr::from_non_null(raw) },
        }
    }

    pub fn as_raw(&self) -> *mut c_void {
        self.ptr.as_raw()
    }

    fn state(&self) -> &HandlerState {
        unsafe { HostObject::<HandlerState>::state(self.ptr.as_raw()) }
    }

    pub fn edits(&self) -> Vec<ParamEdit> {
        self.state().edits.lock().clone()
    }

    /// Number of `beginEdit` calls not yet closed by `endEdit`.
    pub fn open_edits(&self) -> i32 {
        self.state().open_edits.load(Ordering::Acquire)
    }

    /// Union of every `restartComponent` flag set requested so far.
    pub fn restart_flags(&self) -> i32 {
        self.state().restart_flags.load(Ordering::Acquire)
    }
}

impl Default for ComponentHandler {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// IParamValueQueue / IParameterChanges
// ---------------------------------------------------------------------------

struct QueueState {
    id: ParamID,
    points: Mutex<Vec<ParamPoint>>,
}

static QUEUE_IIDS: [TUID; 1] = [IParamValueQueueVtbl::IID];

static QUEUE_VTBL: IParamValueQueueVtbl = IParamValueQueueVtbl {
    unknown: unknown::<QueueState>(),
    get_parameter_id: queue_parameter_id,
    get_point_count: queue_point_count,
    get_point: queue_get_point,
    add_point: queue_add_point,
};

unsafe extern "system" fn queue_parameter_id(this: *mut c_void) -> ParamID {
    HostObject::<QueueState>::state(this).id
}

unsafe extern "system" fn queue_point_count(this: *mut c_void) -> i32 {
    HostObject::<QueueState>::state(this).points.lock().len() as i32
}

unsafe extern "system" fn queue_get_point(
    this: *mut c_void,
    index: i32,
    sample_offset: *mut i32,
    value: *mut ParamValue,
) -> tresult {
    let points = HostObject::<QueueState>::state(this).points.lock();
    let Some(point) = usize::try_from(index).ok().and_then(|i| points.get(i)) else {
        return ffi::INVALID_ARGUMENT;
    };
    if !sample_offset.is_null() {
        *sample_offset = point.offset;
    }
    if !value.is_null() {
        *value = point.value;
    }
    ffi::RESULT_OK
}

unsafe extern "system" fn queue_add_point(
    this: *mut c_void,
    sample_offset: i32,
    value: ParamValue,
    index: *mut i32,
) -> tresult {
    let mut points = HostObject::<QueueState>::state(this).points.lock();
    let position = match points.iter().position(|p| p.offset >= sample_offset) {
        Some(i) if points[i].offset == sample_offset => {
            points[i].value = value;
            i
        }
        Some(i) => {
            points.insert(i, ParamPoint { offset: sample_offset, value });
            i
        }
        None => {
            points.push(ParamPoint { offset: sample_offset, value });
            points.len() - 1
        }
    };
    if !index.is_null() {
        *index = position as i32;
    }
    ffi::RESULT_OK
}

fn new_queue(id: ParamID, points: Vec<ParamPoint>) -> ComPtr<IParamValueQueueVtbl> {
    let raw = HostObject::allocate(
        &QUEUE_VTBL as *const _ as *const c_void,
        &QUEUE_IIDS,
        QueueState {
            id,
            points: Mutex::new(points),
        },
    );
    unsafe { ComPtr::from_non_null(raw) }
}

struct ChangesState {
    queues: Mutex<Vec<ComPtr<IParamValueQueueVtbl>>>,
}

static CHANGES_IIDS: [TUID; 1] = [IParameterChangesVtbl::IID];

static CHANGES_VTBL: IParameterChangesVtbl = IParameterChangesVtbl {
    unknown: unknown::<ChangesState>(),
    get_parameter_count: changes_count,
    get_parameter_data: changes_data,
    add_parameter_data: changes_add,
};

unsafe extern "system" fn changes_count(this: *mut c_void) -> i32 {
    HostObject::<ChangesState>::state(this).queues.lock().len() as i32
}

unsafe extern "system" fn changes_data(this: *mut c_void, index: i32) -> *mut c_void {
    let queues = HostObject::<ChangesState>::state(this).queues.lock();
    usize::try_from(index)
        .ok()
        .and_then(|i| queues.get(i))
        .map_or(ptr::null_mut(), |queue| queue.as_raw())
}

unsafe extern "system" fn changes_add(
    this: *mut c_void,
    id: *const ParamID,
    index: *mut i32,
) -> *mut c_void {
    if id.is_null() {
        return ptr::null_mut();
    }
    let id = *id;
    let mut queues = HostObject::<ChangesState>::state(this).queues.lock();
    let existing = queues
        .iter()
        .position(|queue| HostObject::<QueueState>::state(queue.as_raw()).id == id);
    let position = match existing {
        Some(position) => position,
        None => {
            queues.push(new_queue(id, Vec::new()));
            queues.len() - 1
        }
    };
    if !index.is_null() {
        *index = position as i32;
    }
    queues[position].as_raw()
}

/// `IParameterChanges` built from, and read back into, [`ParamQueue`] values.
pub struct HostParameterChanges {
    ptr: ComPtr<IParameterChangesVtbl>,
}

impl HostParameterChanges {
    pub fn new(queues: &[ParamQueue]) -> Self {
        let queues = queues
            .iter()
            .map(|queue| new_queue(queue.id, queue.points.clone()))
            .collect();
        let raw = HostObject::allocate(
            &CHANGES_VTBL as *const _ as *const c_void,
            &CHANGES_IIDS,
            ChangesState {
                queues: Mutex::new(queues),
            },
        );
        Self {
            ptr: unsafe { ComPtr::from_non_null(raw) },
        }
    }

    pub fn as_raw(&self) -> *mut c_void {
        self.ptr.as_raw()
    }

    pub fn collect(&self) -> Vec<ParamQueue> {
        let state = unsafe { HostObject::<ChangesState>::state(self.ptr.as_raw()) };
        state
            .queues
            .lock()
            .iter()
            .map(|queue| {
                let queue = unsafe { HostObject::<QueueState>::state(queue.as_raw()) };
                ParamQueue {
                    id: queue.id,
                    points: queue.points.lock().clone(),
                }
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// IEventList
// ---------------------------------------------------------------------------

static EVENTS_IIDS: [TUID; 1] = [IEventListVtbl::IID];

static EVENTS_VTBL: IEventListVtbl = IEventListVtbl {
    unknown: unknown::<AtomicI32>(),
    get_event_count: events_count,
    get_event: events_get,
    add_event: events_add,
};

unsafe extern "system" fn events_count(_this: *mut c_void) -> i32 {
    0
}

unsafe extern "system" fn events_get(
    _this: *mut c_void,
    _index: i32,
    _event: *mut c_void,
) -> tresult {
    ffi::INVALID_ARGUMENT
}

unsafe extern "system" fn events_add(this: *mut c_void, event: *mut c_void) -> tresult {
    if event.is_null() {
        return ffi::INVALID_ARGUMENT;
    }
    HostObject::<AtomicI32>::state(this).fetch_add(1, Ordering::AcqRel);
    ffi::RESULT_OK
}

/// Event list that never delivers events and counts the ones a plug-in emits.
pub struct EmptyEventList {
    ptr: ComPtr<IEventListVtbl>,
}

impl EmptyEventList {
    pub fn new() -> Self {
        let raw = HostObject::allocate(
            &EVENTS_VTBL as *const _ as *const c_void,
            &EVENTS_IIDS,
            AtomicI32::new(0),
        );
        Self {
            ptr: unsafe { ComPtr::from_non_null(raw) },
        }
    }

    pub fn as_raw(&self) -> *mut c_void {
        self.ptr.as_raw()
    }

    pub fn emitted(&self) -> i32 {
        unsafe { HostObject::<AtomicI32>::state(self.ptr.as_raw()) }.load(Ordering::Acquire)
    }
}

impl Default for EmptyEventList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_round_trips_written_bytes() {
        let stream = MemoryStream::new();
        let vtbl = unsafe { &*(*(stream.as_raw() as *const *const IBStreamVtbl)) };
        let payload = *b"state-blob";
        let mut written = 0;
        let result = unsafe {
            (vtbl.write)(
                stream.as_raw(),
                payload.as_ptr() as *mut c_void,
                payload.len() as i32,
                &mut written,
            )
        };
        assert_eq!(result, ffi::RESULT_OK);
        assert_eq!(written, payload.len() as i32);
        assert_eq!(stream.bytes(), payload.to_vec());

        let mut position = -1;
        unsafe { (vtbl.seek)(stream.as_raw(), 6, ffi::SEEK_SET, &mut position) };
        assert_eq!(position, 6);
        let mut buffer = [0u8; 16];
        let mut read = 0;
        unsafe {
            (vtbl.read)(
                stream.as_raw(),
                buffer.as_mut_ptr() as *mut c_void,
                16,
                &mut read,
            )
        };
        assert_eq!(&buffer[..read as usize], b"blob");
    }

    #[test]
    fn stream_refuses_negative_seek() {
        let stream = MemoryStream::from_bytes(b"abc");
        let vtbl = unsafe { &*(*(stream.as_raw() as *const *const IBStreamVtbl)) };
        let result = unsafe { (vtbl.seek)(stream.as_raw(), -1, ffi::SEEK_SET, ptr::null_mut()) };
        assert_eq!(result, ffi::INVALID_ARGUMENT);
    }

    #[test]
    fn parameter_changes_keep_points_sorted() {
        let changes = HostParameterChanges::new(&[]);
        let vtbl = unsafe { &*(*(changes.as_raw() as *const *const IParameterChangesVtbl)) };
        let id: ParamID = 7;
        let mut index = -1;
        let queue = unsafe { (vtbl.add_parameter_data)(changes.as_raw(), &id, &mut index) };
        assert_eq!(index, 0);
        let queue_vtbl = unsafe { &*(*(queue as *const *const IParamValueQueueVtbl)) };
        unsafe {
            (queue_vtbl.add_point)(queue, 32, 0.75, &mut index);
            (queue_vtbl.add_point)(queue, 0, 0.25, &mut index);
            (queue_vtbl.add_point)(queue, 32, 0.5, &mut index);
        }
        let collected = changes.collect();
        assert_eq!(collected.len(), 1);
        assert_eq!(
            collected[0].points,
            vec![
                ParamPoint { offset: 0, value: 0.25 },
                ParamPoint { offset: 32, value: 0.5 }
            ]
        );
    }

    #[test]
    fn query_interface_answers_declared_iids_only() {
        let host = HostApplication::new("validator");
        let unknown = unsafe { &*(*(host.as_raw() as *const *const FUnknownVtbl)) };
        let mut obj = ptr::null_mut();
        let this = host.as_raw();
        let ok = unsafe { (unknown.query_interface)(this, &IHostApplicationVtbl::IID, &mut obj) };
        assert_eq!(ok, ffi::RESULT_OK);
        unsafe { (unknown.release)(obj) };
        let refused = unsafe { (unknown.query_interface)(this, &IBStreamVtbl::IID, &mut obj) };
        assert_eq!(refused, ffi::NO_INTERFACE);
        assert!(obj.is_null());
    }
}
