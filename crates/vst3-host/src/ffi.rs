//! Hand-declared subset of the VST3 binary interface.
//!
//! Only the interfaces the validator consumes from a plug-in, or implements on
//! the host side, are declared. Layouts follow the SDK headers: every interface
//! is a pointer to a table of `PLUGIN_API` functions whose first three entries
//! are the `FUnknown` reference counting methods.

#![allow(non_camel_case_types)]

use std::ffi::{c_char, c_void};

pub type TUID = [u8; 16];
pub type tresult = i32;
pub type TBool = u8;
pub type TChar = u16;
pub type String128 = [TChar; 128];
pub type FIDString = *const c_char;
pub type ParamID = u32;
pub type ParamValue = f64;
pub type SpeakerArrangement = u64;
pub type Sample32 = f32;

/// Builds a `TUID` from the four 32-bit words used by `DECLARE_CLASS_IID`.
///
/// Windows builds of the SDK are COM compatible and store the first two words
/// in GUID byte order; every other platform stores all words big-endian.
pub const fn inline_uid(l1: u32, l2: u32, l3: u32, l4: u32) -> TUID {
    let b3 = l3.to_be_bytes();
    let b4 = l4.to_be_bytes();
    if cfg!(windows) {
        let b1 = l1.to_le_bytes();
        let b2 = l2.to_be_bytes();
        [
            b1[0], b1[1], b1[2], b1[3], b2[1], b2[0], b2[3], b2[2], b3[0], b3[1], b3[2], b3[3],
            b4[0], b4[1], b4[2], b4[3],
        ]
    } else {
        let b1 = l1.to_be_bytes();
        let b2 = l2.to_be_bytes();
        [
            b1[0], b1[1], b1[2], b1[3], b2[0], b2[1], b2[2], b2[3], b3[0], b3[1], b3[2], b3[3],
            b4[0], b4[1], b4[2], b4[3],
        ]
    }
}

// Result codes. Windows builds reuse the HRESULT values.
#[cfg(windows)]
mod codes {
    use super::tresult;
    pub const NO_INTERFACE: tresult = 0x8000_4002_u32 as tresult;
    pub const RESULT_OK: tresult = 0;
    pub const RESULT_FALSE: tresult = 1;
    pub const INVALID_ARGUMENT: tresult = 0x8007_0057_u32 as tresult;
    pub const NOT_IMPLEMENTED: tresult = 0x8000_4001_u32 as tresult;
    pub const INTERNAL_ERROR: tresult = 0x8000_4005_u32 as tresult;
    pub const NOT_INITIALIZED: tresult = 0x8000_FFFF_u32 as tresult;
    pub const OUT_OF_MEMORY: tresult = 0x8007_000E_u32 as tresult;
}

#[cfg(not(windows))]
mod codes {
    use super::tresult;
    pub const NO_INTERFACE: tresult = -1;
    pub const RESULT_OK: tresult = 0;
    pub const RESULT_FALSE: tresult = 1;
    pub const INVALID_ARGUMENT: tresult = 2;
    pub const NOT_IMPLEMENTED: tresult = 3;
    pub const INTERNAL_ERROR: tresult = 4;
    pub const NOT_INITIALIZED: tresult = 5;
    pub const OUT_OF_MEMORY: tresult = 6;
}

pub use codes::*;

pub const TRUE: TBool = 1;
pub const FALSE: TBool = 0;

// Media types and bus directions.
pub const MEDIA_AUDIO: i32 = 0;
pub const MEDIA_EVENT: i32 = 1;
pub const DIRECTION_INPUT: i32 = 0;
pub const DIRECTION_OUTPUT: i32 = 1;

// Bus types and flags.
pub const BUS_MAIN: i32 = 0;
pub const BUS_AUX: i32 = 1;
pub const BUS_DEFAULT_ACTIVE: u32 = 1 << 0;
pub const BUS_IS_CONTROL_VOLTAGE: u32 = 1 << 1;

// I/O modes.
pub const IO_SIMPLE: i32 = 0;
pub const IO_ADVANCED: i32 = 1;
pub const IO_OFFLINE_PROCESSING: i32 = 2;

// Process modes and sample sizes.
pub const PROCESS_REALTIME: i32 = 0;
pub const PROCESS_PREFETCH: i32 = 1;
pub const PROCESS_OFFLINE: i32 = 2;
pub const SAMPLE_32: i32 = 0;
pub const SAMPLE_64: i32 = 1;

pub const NO_TAIL: u32 = 0;
pub const INFINITE_TAIL: u32 = u32::MAX;

// Speaker arrangements.
pub const SPEAKER_L: SpeakerArrangement = 1 << 0;
pub const SPEAKER_R: SpeakerArrangement = 1 << 1;
pub const SPEAKER_C: SpeakerArrangement = 1 << 2;
pub const SPEAKER_LFE: SpeakerArrangement = 1 << 3;
pub const SPEAKER_LS: SpeakerArrangement = 1 << 4;
pub const SPEAKER_RS: SpeakerArrangement = 1 << 5;
pub const SPEAKER_M: SpeakerArrangement = 1 << 19;
pub const ARRANGEMENT_EMPTY: SpeakerArrangement = 0;
pub const ARRANGEMENT_MONO: SpeakerArrangement = SPEAKER_M;
pub const ARRANGEMENT_STEREO: SpeakerArrangement = SPEAKER_L | SPEAKER_R;
pub const ARRANGEMENT_51: SpeakerArrangement =
    SPEAKER_L | SPEAKER_R | SPEAKER_C | SPEAKER_LFE | SPEAKER_LS | SPEAKER_RS;

// Parameter flags.
pub const PARAM_CAN_AUTOMATE: i32 = 1 << 0;
pub const PARAM_IS_READ_ONLY: i32 = 1 << 1;
pub const PARAM_IS_WRAP_AROUND: i32 = 1 << 2;
pub const PARAM_IS_LIST: i32 = 1 << 3;
pub const PARAM_IS_HIDDEN: i32 = 1 << 4;
pub const PARAM_IS_PROGRAM_CHANGE: i32 = 1 << 15;
pub const PARAM_IS_BYPASS: i32 = 1 << 16;

// Class flags and factory flags.
pub const CLASS_DISTRIBUTABLE: u32 = 1 << 0;
pub const CLASS_SIMPLE_MODE_SUPPORTED: u32 = 1 << 1;
pub const FACTORY_CLASSES_DISCARDABLE: i32 = 1 << 0;
pub const FACTORY_LICENSE_CHECK: i32 = 1 << 1;
pub const FACTORY_COMPONENT_NON_DISCARDABLE: i32 = 1 << 3;
pub const FACTORY_UNICODE: i32 = 1 << 4;

// Class categories.
pub const CATEGORY_AUDIO_MODULE: &str = "Audio Module Class";
pub const CATEGORY_COMPONENT_CONTROLLER: &str = "Component Controller Class";
pub const CATEGORY_PLUGIN_COMPATIBILITY: &str = "Plugin Compatibility Class";
pub const CATEGORY_TEST: &str = "Test Class";

// IBStream seek modes.
pub const SEEK_SET: i32 = 0;
pub const SEEK_CUR: i32 = 1;
pub const SEEK_END: i32 = 2;

/// Exported `GetPluginFactory` signature.
pub type GetPluginFactoryFn = unsafe extern "system" fn() -> *mut c_void;
/// `ModuleEntry` (Linux) and `bundleEntry` (macOS) signature.
pub type ModuleEntryFn = unsafe extern "C" fn(*mut c_void) -> bool;
/// `ModuleExit`, `bundleExit`, `InitDll`, `ExitDll`, `InitModule` and `DeinitModule`.
pub type ModuleHookFn = unsafe extern "C" fn() -> bool;

/// Marker for vtable types whose interface identifier is known.
///
/// # Safety
/// Implementors must be `#[repr(C)]` tables that start with [`FUnknownVtbl`].
pub unsafe trait Interface {
    const IID: TUID;
}

/// A COM object as seen through an interface pointer.
#[repr(C)]
pub struct ComObject<V> {
    pub vtbl: *const V,
}

#[repr(C)]
pub struct FUnknownVtbl {
    pub query_interface: unsafe extern "system" fn(
        this: *mut c_void,
        iid: *const TUID,
        obj: *mut *mut c_void,
    ) -> tresult,
    pub add_ref: unsafe extern "system" fn(this: *mut c_void) -> u32,
    pub release: unsafe extern "system" fn(this: *mut c_void) -> u32,
}

#[repr(C)]
pub struct PFactoryInfo {
    pub vendor: [c_char; 64],
    pub url: [c_char; 256],
    pub email: [c_char; 128],
    pub flags: i32,
}

#[repr(C)]
pub struct PClassInfo {
    pub cid: TUID,
    pub cardinality: i32,
    pub category: [c_char; 32],
    pub name: [c_char; 64],
}

#[repr(C)]
pub struct PClassInfo2 {
    pub cid: TUID,
    pub cardinality: i32,
    pub category: [c_char; 32],
    pub name: [c_char; 64],
    pub class_flags: u32,
    pub sub_categories: [c_char; 128],
    pub vendor: [c_char; 64],
    pub version: [c_char; 64],
    pub sdk_version: [c_char; 64],
}

#[repr(C)]
pub struct PClassInfoW {
    pub cid: TUID,
    pub cardinality: i32,
    pub category: [c_char; 32],
    pub name: [TChar; 64],
    pub class_flags: u32,
    pub sub_categories: [c_char; 128],
    pub vendor: [TChar; 64],
    pub version: [TChar; 64],
    pub sdk_version: [TChar; 64],
}

#[repr(C)]
pub struct IPluginFactoryVtbl {
    pub unknown: FUnknownVtbl,
    pub get_factory_info:
        unsafe extern "system" fn(this: *mut c_void, info: *mut PFactoryInfo) -> tresult,
    pub count_classes: unsafe extern "system" fn(this: *mut c_void) -> i32,
    pub get_class_info:
        unsafe extern "system" fn(this: *mut c_void, index: i32, info: *mut PClassInfo) -> tresult,
    pub create_instance: unsafe extern "system" fn(
        this: *mut c_void,
        cid: FIDString,
        iid: FIDString,
        obj: *mut *mut c_void,
    ) -> tresult,
}

#[repr(C)]
pub struct IPluginFactory2Vtbl {
    pub factory: IPluginFactoryVtbl,
    pub get_class_info2:
        unsafe extern "system" fn(this: *mut c_void, index: i32, info: *mut PClassInfo2) -> tresult,
}

#[repr(C)]
pub struct IPluginFactory3Vtbl {
    pub factory2: IPluginFactory2Vtbl,
    pub get_class_info_unicode:
        unsafe extern "system" fn(this: *mut c_void, index: i32, info: *mut PClassInfoW) -> tresult,
    pub set_host_context:
        unsafe extern "system" fn(this: *mut c_void, context: *mut c_void) -> tresult,
}

#[repr(C)]
pub struct IPluginBaseVtbl {
    pub unknown: FUnknownVtbl,
    pub initialize: unsafe extern "system" fn(this: *mut c_void, context: *mut c_void) -> tresult,
    pub terminate: unsafe extern "system" fn(this: *mut c_void) -> tresult,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct BusInfo {
    pub media_type: i32,
    pub direction: i32,
    pub channel_count: i32,
    pub name: String128,
    pub bus_type: i32,
    pub flags: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RoutingInfo {
    pub media_type: i32,
    pub bus_index: i32,
    pub channel: i32,
}

#[repr(C)]
pub struct IComponentVtbl {
    pub base: IPluginBaseVtbl,
    pub get_controller_class_id:
        unsafe extern "system" fn(this: *mut c_void, cid: *mut TUID) -> tresult,
    pub set_io_mode: unsafe extern "system" fn(this: *mut c_void, mode: i32) -> tresult,
    pub get_bus_count: unsafe extern "system" fn(this: *mut c_void, media: i32, dir: i32) -> i32,
    pub get_bus_info: unsafe extern "system" fn(
        this: *mut c_void,
        media: i32,
        dir: i32,
        index: i32,
        info: *mut BusInfo,
    ) -> tresult,
    pub get_routing_info: unsafe extern "system" fn(
        this: *mut c_void,
        input: *mut RoutingInfo,
        output: *mut RoutingInfo,
    ) -> tresult,
    pub activate_bus: unsafe extern "system" fn(
        this: *mut c_void,
        media: i32,
        dir: i32,
        index: i32,
        state: TBool,
    ) -> tresult,
    pub set_active: unsafe extern "system" fn(this: *mut c_void, state: TBool) -> tresult,
    pub set_state: unsafe extern "system" fn(this: *mut c_void, stream: *mut c_void) -> tresult,
    pub get_state: unsafe extern "system" fn(this: *mut c_void, stream: *mut c_void) -> tresult,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ProcessSetup {
    pub process_mode: i32,
    pub symbolic_sample_size: i32,
    pub max_samples_per_block: i32,
    pub sample_rate: f64,
}

/// `AudioBusBuffers`; the 32/64-bit channel pointer union is declared through
/// its 32-bit member because the host only negotiates single precision.
#[repr(C)]
pub struct AudioBusBuffers {
    pub num_channels: i32,
    pub silence_flags: u64,
    pub channel_buffers32: *mut *mut Sample32,
}

#[repr(C)]
pub struct ProcessData {
    pub process_mode: i32,
    pub symbolic_sample_size: i32,
    pub num_samples: i32,
    pub num_inputs: i32,
    pub num_outputs: i32,
    pub inputs: *mut AudioBusBuffers,
    pub outputs: *mut AudioBusBuffers,
    pub input_parameter_changes: *mut c_void,
    pub output_parameter_changes: *mut c_void,
    pub input_events: *mut c_void,
    pub output_events: *mut c_void,
    pub process_context: *mut c_void,
}

#[repr(C)]
pub struct IAudioProcessorVtbl {
    pub unknown: FUnknownVtbl,
    pub set_bus_arrangements: unsafe extern "system" fn(
        this: *mut c_void,
        inputs: *mut SpeakerArrangement,
        num_ins: i32,
        outputs: *mut SpeakerArrangement,
        num_outs: i32,
    ) -> tresult,
    pub get_bus_arrangement: unsafe extern "system" fn(
        this: *mut c_void,
        dir: i32,
        index: i32,
        arrangement: *mut SpeakerArrangement,
    ) -> tresult,
    pub can_process_sample_size: unsafe extern "system" fn(this: *mut c_void, size: i32) -> tresult,
    pub get_latency_samples: unsafe extern "system" fn(this: *mut c_void) -> u32,
    pub setup_processing:
        unsafe extern "system" fn(this: *mut c_void, setup: *mut ProcessSetup) -> tresult,
    pub set_processing: unsafe extern "system" fn(this: *mut c_void, state: TBool) -> tresult,
    pub process: unsafe extern "system" fn(this: *mut c_void, data: *mut ProcessData) -> tresult,
    pub get_tail_samples: unsafe extern "system" fn(this: *mut c_void) -> u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ParameterInfo {
    pub id: ParamID,
    pub title: String128,
    pub short_title: String128,
    pub units: String128,
    pub step_count: i32,
    pub default_normalized_value: ParamValue,
    pub unit_id: i32,
    pub flags: i32,
}

#[repr(C)]
pub struct IEditControllerVtbl {
    pub base: IPluginBaseVtbl,
    pub set_component_state:
        unsafe extern "system" fn(this: *mut c_void, stream: *mut c_void) -> tresult,
    pub set_state: unsafe extern "system" fn(this: *mut c_void, stream: *mut c_void) -> tresult,
    pub get_state: unsafe extern "system" fn(this: *mut c_void, stream: *mut c_void) -> tresult,
    pub get_parameter_count: unsafe extern "system" fn(this: *mut c_void) -> i32,
    pub get_parameter_info: unsafe extern "system" fn(
        this: *mut c_void,
        index: i32,
        info: *mut ParameterInfo,
    ) -> tresult,
    pub get_param_string_by_value: unsafe extern "system" fn(
        this: *mut c_void,
        id: ParamID,
        value: ParamValue,
        string: *mut TChar,
    ) -> tresult,
    pub get_param_value_by_string: unsafe extern "system" fn(
        this: *mut c_void,
        id: ParamID,
        string: *mut TChar,
        value: *mut ParamValue,
    ) -> tresult,
    pub normalized_param_to_plain:
        unsafe extern "system" fn(this: *mut c_void, id: ParamID, value: ParamValue) -> ParamValue,
    pub plain_param_to_normalized:
        unsafe extern "system" fn(this: *mut c_void, id: ParamID, value: ParamValue) -> ParamValue,
    pub get_param_normalized:
        unsafe extern "system" fn(this: *mut c_void, id: ParamID) -> ParamValue,
    pub set_param_normalized:
        unsafe extern "system" fn(this: *mut c_void, id: ParamID, value: ParamValue) -> tresult,
    pub set_component_handler:
        unsafe extern "system" fn(this: *mut c_void, handler: *mut c_void) -> tresult,
    pub create_view: unsafe extern "system" fn(this: *mut c_void, name: FIDString) -> *mut c_void,
}

#[repr(C)]
pub struct IComponentHandlerVtbl {
    pub unknown: FUnknownVtbl,
    pub begin_edit: unsafe extern "system" fn(this: *mut c_void, id: ParamID) -> tresult,
    pub perform_edit:
        unsafe extern "system" fn(this: *mut c_void, id: ParamID, value: ParamValue) -> tresult,
    pub end_edit: unsafe extern "system" fn(this: *mut c_void, id: ParamID) -> tresult,
    pub restart_component: unsafe extern "system" fn(this: *mut c_void, flags: i32) -> tresult,
}

#[repr(C)]
pub struct IConnectionPointVtbl {
    pub unknown: FUnknownVtbl,
    pub connect: unsafe extern "system" fn(this: *mut c_void, other: *mut c_void) -> tresult,
    pub disconnect: unsafe extern "system" fn(this: *mut c_void, other: *mut c_void) -> tresult,
    pub notify: unsafe extern "system" fn(this: *mut c_void, message: *mut c_void) -> tresult,
}

#[repr(C)]
pub struct IHostApplicationVtbl {
    pub unknown: FUnknownVtbl,
    pub get_name: unsafe extern "system" fn(this: *mut c_void, name: *mut TChar) -> tresult,
    pub create_instance: unsafe extern "system" fn(
        this: *mut c_void,
        cid: *mut u8,
        iid: *mut u8,
        obj: *mut *mut c_void,
    ) -> tresult,
}

#[repr(C)]
pub struct IBStreamVtbl {
    pub unknown: FUnknownVtbl,
    pub read: unsafe extern "system" fn(
        this: *mut c_void,
        buffer: *mut c_void,
        num_bytes: i32,
        num_read: *mut i32,
    ) -> tresult,
    pub write: unsafe extern "system" fn(
        this: *mut c_void,
        buffer: *mut c_void,
        num_bytes: i32,
        num_written: *mut i32,
    ) -> tresult,
    pub seek: unsafe extern "system" fn(
        this: *mut c_void,
        pos: i64,
        mode: i32,
        result: *mut i64,
    ) -> tresult,
    pub tell: unsafe extern "system" fn(this: *mut c_void, pos: *mut i64) -> tresult,
}

#[repr(C)]
pub struct IParamValueQueueVtbl {
    pub unknown: FUnknownVtbl,
    pub get_parameter_id: unsafe extern "system" fn(this: *mut c_void) -> ParamID,
    pub get_point_count: unsafe extern "system" fn(this: *mut c_void) -> i32,
    pub get_point: unsafe extern "system" fn(
        this: *mut c_void,
        index: i32,
        sample_offset: *mut i32,
        value: *mut ParamValue,
    ) -> tresult,
    pub add_point: unsafe extern "system" fn(
        this: *mut c_void,
        sample_offset: i32,
        value: ParamValue,
        index: *mut i32,
    ) -> tresult,
}

#[repr(C)]
pub struct IParameterChangesVtbl {
    pub unknown: FUnknownVtbl,
    pub get_parameter_count: unsafe extern "system" fn(this: *mut c_void) -> i32,
    pub get_parameter_data: unsafe extern "system" fn(this: *mut c_void, index: i32) -> *mut c_void,
    pub add_parameter_data: unsafe extern "system" fn(
        this: *mut c_void,
        id: *const ParamID,
        index: *mut i32,
    ) -> *mut c_void,
}

#[repr(C)]
pub struct IEventListVtbl {
    pub unknown: FUnknownVtbl,
    pub get_event_count: unsafe extern "system" fn(this: *mut c_void) -> i32,
    pub get_event:
        unsafe extern "system" fn(this: *mut c_void, index: i32, event: *mut c_void) -> tresult,
    pub add_event: unsafe extern "system" fn(this: *mut c_void, event: *mut c_void) -> tresult,
}

unsafe impl Interface for FUnknownVtbl {
    const IID: TUID = inline_uid(0x0000_0000, 0x0000_0000, 0xC000_0000, 0x0000_0046);
}
unsafe impl Interface for IPluginFactoryVtbl {
    const IID: TUID = inline_uid(0x7A4D_811C, 0x5211_4A1F, 0xAED9_D2EE, 0x0B43_BF9F);
}
unsafe impl Interface for IPluginFactory2Vtbl {
    const IID: TUID = inline_uid(0x0007_B650, 0xF24B_4C0B, 0xA464_EDB9, 0xF00B_2ABB);
}
unsafe impl Interface for IPluginFactory3Vtbl {
    const IID: TUID = inline_uid(0x4555_A2AB, 0xC123_4E57, 0x9B12_2910, 0x3687_8931);
}
unsafe impl Interface for IPluginBaseVtbl {
    const IID: TUID = inline_uid(0x2288_8DDB, 0x156E_45AE, 0x8358_B348, 0x0819_0625);
}
unsafe impl Interface for IComponentVtbl {
    const IID: TUID = inline_uid(0xE831_FF31, 0xF2D5_4301, 0x928E_BBEE, 0x2569_7802);
}
unsafe impl Interface for IAudioProcessorVtbl {
    const IID: TUID = inline_uid(0x4204_3F99, 0xB7DA_453C, 0xA569_E79D, 0x9AAE_C33D);
}
unsafe impl Interface for IEditControllerVtbl {
    const IID: TUID = inline_uid(0xDCD7_BBE3, 0x7742_448D, 0xA874_AACC, 0x979C_759E);
}
unsafe impl Interface for IComponentHandlerVtbl {
    const IID: TUID = inline_uid(0x93A0_BEA3, 0x0BD0_45DB, 0x8E89_0B0C, 0xC1E4_6AC6);
}
unsafe impl Interface for IConnectionPointVtbl {
    const IID: TUID = inline_uid(0x70A4_156F, 0x6E6E_4026, 0x9891_48BF, 0xAA60_D8D1);
}
unsafe impl Interface for IHostApplicationVtbl {
    const IID: TUID = inline_uid(0x58E5_95CC, 0xDB2D_4969, 0x8B6A_AF8C, 0x36A6_64E5);
}
unsafe impl Interface for IBStreamVtbl {
    const IID: TUID = inline_uid(0xC3BF_6EA2, 0x3099_4752, 0x9B6B_F990, 0x1EE3_3E9B);
}
unsafe impl Interface for IParamValueQueueVtbl {
    const IID: TUID = inline_uid(0x0126_3A18, 0xED07_4F6F, 0x98C9_D356, 0x4686_F9BA);
}
unsafe impl Interface for IParameterChangesVtbl {
    const IID: TUID = inline_uid(0xA477_9663, 0x0BB6_4A4B, 0xA0D5_79C7, 0xB6A4_2A5E);
}
unsafe impl Interface for IEventListVtbl {
    const IID: TUID = inline_uid(0x3A2C_4214, 0x3463_49FE, 0xB2C4_F397, 0xB969_5A44);
}

/// Reads a NUL-terminated 8-bit string out of a fixed-size ABI buffer.
pub fn read_cstr(buffer: &[c_char]) -> String {
    let bytes: Vec<u8> = buffer
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Reads a NUL-terminated UTF-16 string out of a fixed-size ABI buffer.
pub fn read_tchar(buffer: &[TChar]) -> String {
    let len = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
    String::from_utf16_lossy(&buffer[..len])
}

/// Writes `text` into a fixed-size UTF-16 buffer, truncating and terminating it.
pub fn write_tchar(text: &str, buffer: &mut [TChar]) {
    if buffer.is_empty() {
        return;
    }
    let limit = buffer.len() - 1;
    let mut written = 0;
    for unit in text.encode_utf16().take(limit) {
        buffer[written] = unit;
        written += 1;
    }
    buffer[written] = 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn funknown_iid_matches_com_layout() {
        let iid = <FUnknownVtbl as Interface>::IID;
        if cfg!(windows) {
            assert_eq!(iid[..4], [0, 0, 0, 0]);
            assert_eq!(iid[8], 0xC0);
        } else {
            assert_eq!(iid[8], 0xC0);
            assert_eq!(iid[15], 0x46);
        }
    }

    #[test]
    fn tchar_round_trip_truncates() {
        let mut buffer = [0u16; 8];
        write_tchar("validator host", &mut buffer);
        assert_eq!(read_tchar(&buffer), "validat");
    }

    #[test]
    fn cstr_stops_at_nul() {
        let mut buffer = [0 as c_char; 16];
        for (slot, byte) in buffer.iter_mut().zip(b"Fx|Delay\0junk") {
            *slot = *byte as c_char;
        }
        assert_eq!(read_cstr(&buffer), "Fx|Delay");
    }
}
