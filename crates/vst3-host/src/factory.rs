use std::ffi::c_char;
use std::ptr;
use std::sync::Arc;

use tracing::debug;

use crate::com::ComPtr;
use crate::error::{FactoryError, ResultCode};
use crate::ffi::{
    self, IComponentVtbl, IPluginFactory2Vtbl, IPluginFactory3Vtbl, IPluginFactoryVtbl, Interface,
    PClassInfo, PClassInfo2, PClassInfoW, PFactoryInfo,
};
use crate::host::HostApplication;
use crate::loader::ModuleLibrary;
use crate::plugin::{ClassDescriptor, Component, FactoryInfo, PluginFactory};
use crate::uid::ClassId;
use crate::vst3::Vst3Component;

/// `IPluginFactory` of a loaded module, upgraded to versions 2 and 3 when the
/// plug-in provides them.
pub struct Vst3Factory {
    factory3: Option<ComPtr<IPluginFactory3Vtbl>>,
    factory2: Option<ComPtr<IPluginFactory2Vtbl>>,
    factory: ComPtr<IPluginFactoryVtbl>,
    _host: HostApplication,
    library: Arc<ModuleLibrary>,
}

impl Vst3Factory {
    pub(crate) fn new(factory: ComPtr<IPluginFactoryVtbl>, library: Arc<ModuleLibrary>) -> Self {
        let factory2 = factory.cast::<IPluginFactory2Vtbl>();
        let factory3 = factory.cast::<IPluginFactory3Vtbl>();
        let host = HostApplication::new("vst3-validate");
        if let Some(factory3) = &factory3 {
            let vtbl = factory3.vtbl();
            let context = host.as_raw();
            let code = unsafe { (vtbl.set_host_context)(factory3.as_raw(), context) };
            let result = ResultCode::from(code);
            debug!(%result, "factory accepted host context");
        }
        Self {
            factory3,
            factory2,
            factory,
            _host: host,
            library,
        }
    }

    fn raw_info(&self) -> Result<PFactoryInfo, FactoryError> {
        let mut info: PFactoryInfo = unsafe { std::mem::zeroed() };
        let vtbl = self.factory.vtbl();
        let result = unsafe { (vtbl.get_factory_info)(self.factory.as_raw(), &mut info) };
        ResultCode::from(result).check().map_err(FactoryError::Query)?;
        Ok(info)
    }

    fn unicode_info(&self, index: i32) -> Option<ClassDescriptor> {
        let factory3 = self.factory3.as_ref()?;
        let mut info: PClassInfoW = unsafe { std::mem::zeroed() };
        let vtbl = factory3.vtbl();
        let result =
            unsafe { (vtbl.get_class_info_unicode)(factory3.as_raw(), index, &mut info) };
        if result != ffi::RESULT_OK {
            return None;
        }
        Some(ClassDescriptor {
            id: ClassId(info.cid),
            category: ffi::read_cstr(&info.category),
            name: ffi::read_tchar(&info.name),
            vendor: ffi::read_tchar(&info.vendor),
            version: ffi::read_tchar(&info.version),
            sdk_version: ffi::read_tchar(&info.sdk_version),
            sub_categories: ClassDescriptor::parse_sub_categories(&ffi::read_cstr(
                &info.sub_categories,
            )),
            class_flags: info.class_flags,
            cardinality: info.cardinality,
        })
    }

    fn extended_info(&self, index: i32) -> Option<ClassDescriptor> {
        let factory2 = self.factory2.as_ref()?;
        let mut info: PClassInfo2 = unsafe { std::mem::zeroed() };
        let vtbl = factory2.vtbl();
        let result = unsafe { (vtbl.get_class_info2)(factory2.as_raw(), index, &mut info) };
        if result != ffi::RESULT_OK {
            return None;
        }
        Some(ClassDescriptor {
            id: ClassId(info.cid),
            category: ffi::read_cstr(&info.category),
            name: ffi::read_cstr(&info.name),
            vendor: ffi::read_cstr(&info.vendor),
            version: ffi::read_cstr(&info.version),
            sdk_version: ffi::read_cstr(&info.sdk_version),
            sub_categories: ClassDescriptor::parse_sub_categories(&ffi::read_cstr(
                &info.sub_categories,
            )),
            class_flags: info.class_flags,
            cardinality: info.cardinality,
        })
    }

    fn basic_info(&self, index: i32) -> Result<ClassDescriptor, FactoryError> {
        let mut info: PClassInfo = unsafe { std::mem::zeroed() };
        let vtbl = self.factory.vtbl();
        let result = unsafe { (vtbl.get_class_info)(self.factory.as_raw(), index, &mut info) };
        ResultCode::from(result).check().map_err(FactoryError::Query)?;
        let mut descriptor = ClassDescriptor::basic(
            ClassId(info.cid),
            &ffi::read_cstr(&info.category),
            &ffi::read_cstr(&info.name),
        );
        descriptor.cardinality = info.cardinality;
        Ok(descriptor)
    }
}

/// Creates an instance of `id` answering `V`, adopting the returned reference.
pub(crate) fn create_instance<V: Interface>(
    factory: &ComPtr<IPluginFactoryVtbl>,
    id: &ClassId,
) -> Result<ComPtr<V>, FactoryError> {
    let mut obj = ptr::null_mut();
    let result = unsafe {
        (factory.vtbl().create_instance)(
            factory.as_raw(),
            id.as_bytes().as_ptr() as *const c_char,
            V::IID.as_ptr() as *const c_char,
            &mut obj,
        )
    };
    let code = ResultCode::from(result);
    match unsafe { ComPtr::<V>::from_raw(obj) } {
        Some(instance) if code.is_ok() => Ok(instance),
        _ if code == ResultCode::OUT_OF_MEMORY => Err(FactoryError::OutOfMemory(*id)),
        _ => Err(FactoryError::ConstructionRefused { id: *id, code }),
    }
}

impl PluginFactory for Vst3Factory {
    fn info(&self) -> Result<FactoryInfo, FactoryError> {
        let info = self.raw_info()?;
        Ok(FactoryInfo {
            vendor: ffi::read_cstr(&info.vendor),
            url: ffi::read_cstr(&info.url),
            email: ffi::read_cstr(&info.email),
            flags: info.flags,
        })
    }

    fn class_count(&self) -> usize {
        let count = unsafe { (self.factory.vtbl().count_classes)(self.factory.as_raw()) };
        usize::try_from(count).unwrap_or(0)
    }

    fn class_info(&self, index: usize) -> Result<ClassDescriptor, FactoryError> {
        let count = self.class_count();
        if index >= count {
            return Err(FactoryError::InvalidIndex { index, count });
        }
        let raw_index = index as i32;
        let richest = self
            .unicode_info(raw_index)
            .or_else(|| self.extended_info(raw_index));
        let mut descriptor = match richest {
            Some(descriptor) => descriptor,
            None => self.basic_info(raw_index)?,
        };
        if descriptor.vendor.is_empty() {
            if let Ok(info) = self.info() {
                descriptor.vendor = info.vendor;
            }
        }
        Ok(descriptor)
    }

    fn create_component(&self, id: &ClassId) -> Result<Box<dyn Component>, FactoryError> {
        let component = create_instance::<IComponentVtbl>(&self.factory, id)?;
        Ok(Box::new(Vst3Component::new(
            *id,
            component,
            self.factory.clone(),
            self.library.clone(),
        )))
    }
}

impl std::fmt::Debug for Vst3Factory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vst3Factory")
            .field("factory2", &self.factory2.is_some())
            .field("factory3", &self.factory3.is_some())
            .finish()
    }
}
