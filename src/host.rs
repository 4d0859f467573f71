//! The managed-runtime side of the bridge.
//!
//! Everything the mirroring subsystem needs from the runtime that owns the
//! vectors goes through [`ManagedHost`]. The JNI implementation lives in
//! [`crate::jvm::host`]; tests drive the bridge with an in-memory host.

use std::fmt;
use std::ptr::NonNull;

use crate::errors::Result;
use crate::kind::ElementKind;

/// Stable-address view of a managed array handed out by [`ManagedHost::pin`].
///
/// The memory stays valid until the matching [`ManagedHost::unpin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pinned {
    ptr: NonNull<u8>,
    len: usize,
}

impl Pinned {
    /// # Safety
    ///
    /// `ptr` must address `len` elements of the kind it was pinned as, aligned
    /// for that kind, and stay valid until it is unpinned.
    pub unsafe fn new(ptr: NonNull<u8>, len: usize) -> Self {
        Self { ptr, len }
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// How pinned storage is handed back to the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseMode {
    /// Copy native edits back (if the pin was a copy) and free the pin.
    CopyBack,
    /// Free the pin without copying anything back.
    Abort,
}

/// Source region for a bulk native → managed copy.
#[derive(Debug, Clone, Copy)]
pub enum Region<'a> {
    Int(&'a [i32]),
    Real(&'a [f64]),
    Raw(&'a [u8]),
}

impl Region<'_> {
    pub fn len(&self) -> usize {
        match self {
            Region::Int(s) => s.len(),
            Region::Real(s) => s.len(),
            Region::Raw(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Destination region for a bulk managed → native copy.
#[derive(Debug)]
pub enum RegionMut<'a> {
    Int(&'a mut [i32]),
    Real(&'a mut [f64]),
    Raw(&'a mut [u8]),
}

impl RegionMut<'_> {
    pub fn len(&self) -> usize {
        match self {
            RegionMut::Int(s) => s.len(),
            RegionMut::Real(s) => s.len(),
            RegionMut::Raw(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Operations the bridge consumes from the managed runtime.
///
/// Handles are opaque and compared only through [`ManagedHost::same_object`]
/// and [`ManagedHost::same_array`], never by value.
pub trait ManagedHost {
    type Object: Copy + fmt::Debug;
    type Array: Copy + fmt::Debug;

    fn same_object(&self, a: Self::Object, b: Self::Object) -> bool;

    fn same_array(&self, a: Self::Array, b: Self::Array) -> bool;

    /// Only consulted when reference validation is enabled.
    fn is_valid_ref(&self, _obj: Self::Object) -> bool {
        true
    }

    /// Current backing array of `obj` for `kind`.
    fn backing_array(&mut self, obj: Self::Object, kind: ElementKind) -> Result<Self::Array>;

    /// Drop a transient handle obtained from [`ManagedHost::backing_array`]
    /// that the bridge does not keep.
    fn release_array(&mut self, _array: Self::Array) -> Result<()> {
        Ok(())
    }

    fn array_length(&mut self, array: Self::Array) -> Result<usize>;

    fn pin(&mut self, array: Self::Array, kind: ElementKind) -> Result<Pinned>;

    /// # Safety
    ///
    /// `pinned` must come from `pin(array, kind)` on this host and must not be
    /// used after this call.
    unsafe fn unpin(
        &mut self,
        array: Self::Array,
        kind: ElementKind,
        pinned: Pinned,
        mode: ReleaseMode,
    ) -> Result<()>;

    fn read_region(&mut self, array: Self::Array, dst: RegionMut<'_>) -> Result<()>;

    fn write_region(&mut self, array: Self::Array, src: Region<'_>) -> Result<()>;

    /// Immutable text of a string-kind object, without a terminator.
    fn text(&mut self, obj: Self::Object) -> Result<Vec<u8>>;

    /// Tell the managed object whether its last native round-trip was lossless.
    fn mark_conversion(&mut self, obj: Self::Object, complete: bool) -> Result<()>;

    fn new_global_ref(&mut self, obj: Self::Object) -> Result<Self::Object>;

    fn delete_global_ref(&mut self, obj: Self::Object) -> Result<()>;

    /// Human-readable class of `obj`, for trace output only.
    fn describe(&mut self, _obj: Self::Object) -> Option<String> {
        None
    }

    fn fatal_error(&mut self, msg: &str) -> !;
}
