use std::ffi::c_void;
use std::fmt;
use std::ptr::{self, NonNull};

use crate::ffi::{ComObject, FUnknownVtbl, Interface, RESULT_OK};

/// Owning reference to a COM interface.
///
/// Every `ComPtr` holds exactly one reference: cloning adds one, dropping
/// releases one, so a plug-in object is released on every exit path including
/// unwinding.
pub struct ComPtr<V: Interface> {
    ptr: NonNull<ComObject<V>>,
}

// Plug-in objects are free-threaded as far as reference counting goes; callers
// uphold the per-interface threading rules.
unsafe impl<V: Interface> Send for ComPtr<V> {}
unsafe impl<V: Interface> Sync for ComPtr<V> {}

impl<V: Interface> ComPtr<V> {
    /// Adopts a reference that the caller already owns.
    ///
    /// # Safety
    /// `raw` must be null or a live interface pointer of type `V` carrying a
    /// reference that is transferred to the returned value.
    pub unsafe fn from_raw(raw: *mut c_void) -> Option<Self> {
        NonNull::new(raw as *mut ComObject<V>).map(|ptr| Self { ptr })
    }

    /// Adopts the initial reference of an object allocated by this crate.
    pub(crate) unsafe fn from_non_null(raw: NonNull<c_void>) -> Self {
        Self { ptr: raw.cast() }
    }

    /// Takes an additional reference on a borrowed interface pointer.
    ///
    /// # Safety
    /// `raw` must be null or a live interface pointer of type `V`.
    pub unsafe fn from_borrowed(raw: *mut c_void) -> Option<Self> {
        let this = Self::from_raw(raw)?;
        (this.unknown().add_ref)(this.as_raw());
        Some(this)
    }

    pub fn as_raw(&self) -> *mut c_void {
        self.ptr.as_ptr() as *mut c_void
    }

    pub fn vtbl(&self) -> &V {
        unsafe { &*(*self.ptr.as_ptr()).vtbl }
    }

    fn unknown(&self) -> &FUnknownVtbl {
        unsafe { &*((*self.ptr.as_ptr()).vtbl as *const FUnknownVtbl) }
    }

    /// Queries another interface of the same object.
    pub fn cast<W: Interface>(&self) -> Option<ComPtr<W>> {
        let mut obj: *mut c_void = ptr::null_mut();
        let result = unsafe { (self.unknown().query_interface)(self.as_raw(), &W::IID, &mut obj) };
        if result != RESULT_OK {
            return None;
        }
        unsafe { ComPtr::from_raw(obj) }
    }

    /// Whether two pointers denote the same object identity.
    pub fn same_object<W: Interface>(&self, other: &ComPtr<W>) -> bool {
        match (self.cast::<FUnknownVtbl>(), other.cast::<FUnknownVtbl>()) {
            (Some(a), Some(b)) => a.as_raw() == b.as_raw(),
            _ => self.as_raw() == other.as_raw(),
        }
    }
}

impl<V: Interface> Clone for ComPtr<V> {
    fn clone(&self) -> Self {
        unsafe { (self.unknown().add_ref)(self.as_raw()) };
        Self { ptr: self.ptr }
    }
}

impl<V: Interface> Drop for ComPtr<V> {
    fn drop(&mut self) {
        unsafe { (self.unknown().release)(self.as_raw()) };
    }
}

impl<V: Interface> fmt::Debug for ComPtr<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ComPtr").field(&self.ptr).finish()
    }
}
