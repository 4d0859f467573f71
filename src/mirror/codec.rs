//! Per-kind rules for moving vector data across the boundary.
//!
//! Integer, real and raw vectors are pinned through the runtime and handed
//! out as-is. Logical vectors are widened into a bridge-owned `i32` scratch
//! buffer because the managed side packs them one byte per element. Text is
//! copied once into a NUL-terminated buffer and never synchronised again.

use std::ffi::{c_void, CString};
use std::slice;

use crate::errors::{MirrorError, Result};
use crate::host::{ManagedHost, Pinned, Region, RegionMut, ReleaseMode};
use crate::kind::{narrow_logicals, widen_logicals, ElementKind};
use crate::mirror::table::MirrorEntry;

/// Native storage lent out for one mirror entry.
#[derive(Debug)]
pub enum NativeBuffer {
    /// Runtime-owned storage, valid until unpinned.
    Pinned(Pinned),
    /// Bridge-owned widened copy of a packed logical vector.
    Logical(Box<[i32]>),
    /// Bridge-owned NUL-terminated copy of a text value.
    Text(CString),
}

impl NativeBuffer {
    /// Address handed to native code. Stable for the life of the buffer.
    pub fn as_mut_ptr(&mut self) -> *mut c_void {
        match self {
            NativeBuffer::Pinned(pinned) => pinned.as_ptr().cast(),
            NativeBuffer::Logical(data) => data.as_mut_ptr().cast(),
            NativeBuffer::Text(text) => text.as_ptr() as *mut c_void,
        }
    }

    /// Number of elements, excluding the text terminator.
    pub fn len(&self) -> usize {
        match self {
            NativeBuffer::Pinned(pinned) => pinned.len(),
            NativeBuffer::Logical(data) => data.len(),
            NativeBuffer::Text(text) => text.as_bytes().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_bridge_owned(&self) -> bool {
        !matches!(self, NativeBuffer::Pinned(_))
    }
}

/// Obtain a native buffer reflecting the current contents of `object`.
pub fn extract<H: ManagedHost>(
    host: &mut H,
    object: H::Object,
    kind: ElementKind,
) -> Result<(Option<H::Array>, NativeBuffer)> {
    match kind {
        ElementKind::Integer | ElementKind::Real | ElementKind::Raw => {
            let array = host.backing_array(object, kind)?;
            let pinned = host.pin(array, kind)?;
            Ok((Some(array), NativeBuffer::Pinned(pinned)))
        }
        ElementKind::Logical => {
            let array = host.backing_array(object, kind)?;
            let len = host.array_length(array)?;
            let mut packed = vec![0u8; len];
            host.read_region(array, RegionMut::Raw(&mut packed))?;
            let mut wide = vec![0i32; len].into_boxed_slice();
            widen_logicals(&packed, &mut wide);
            Ok((Some(array), NativeBuffer::Logical(wide)))
        }
        ElementKind::Char => {
            let text = host.text(object)?;
            let text = CString::new(text).map_err(|e| MirrorError::InteriorNul(e.nul_position()))?;
            Ok((None, NativeBuffer::Text(text)))
        }
    }
}

/// Copy native contents into the managed array without releasing anything,
/// and report whether the copy was lossless.
pub fn push_back<H: ManagedHost>(
    host: &mut H,
    kind: ElementKind,
    object: H::Object,
    array: Option<H::Array>,
    buffer: &NativeBuffer,
) -> Result<()> {
    let complete = match (buffer, array) {
        (NativeBuffer::Text(_), _) => return Ok(()),
        (NativeBuffer::Pinned(pinned), Some(array)) => {
            // SAFETY: the pin is still held; only release/invalidate consume it.
            let region = unsafe { pinned_region(kind, pinned)? };
            host.write_region(array, region)?;
            true
        }
        (NativeBuffer::Logical(data), Some(array)) => {
            let mut packed = vec![0u8; data.len()];
            let complete = narrow_logicals(data, &mut packed);
            host.write_region(array, Region::Raw(&packed))?;
            complete
        }
        (_, None) => {
            return Err(MirrorError::UnexpectedKind(format!(
                "{} without backing array",
                kind
            )))
        }
    };
    host.mark_conversion(object, complete)
}

/// Copy managed contents into the native buffer, the inverse of [`push_back`].
pub fn refresh<H: ManagedHost>(
    host: &mut H,
    kind: ElementKind,
    array: H::Array,
    buffer: &mut NativeBuffer,
) -> Result<()> {
    match buffer {
        NativeBuffer::Text(_) => Ok(()),
        NativeBuffer::Pinned(pinned) => {
            // SAFETY: as in `push_back`; no other view of the pin is alive here.
            let region = unsafe { pinned_region_mut(kind, pinned)? };
            host.read_region(array, region)
        }
        NativeBuffer::Logical(data) => {
            let mut packed = vec![0u8; data.len()];
            host.read_region(array, RegionMut::Raw(&mut packed))?;
            widen_logicals(&packed, data);
            Ok(())
        }
    }
}

/// Finalize an entry: hand pinned storage back, narrow and store logical
/// scratch data, and report whether the round-trip was lossless.
///
/// With [`ReleaseMode::Abort`] nothing is copied back and no outcome is
/// reported; bridge-owned buffers are freed either way.
pub fn release<H: ManagedHost>(
    host: &mut H,
    entry: MirrorEntry<H::Object, H::Array>,
    mode: ReleaseMode,
) -> Result<()> {
    let MirrorEntry {
        kind,
        object,
        array,
        buffer,
    } = entry;

    let complete = match (buffer, array) {
        (NativeBuffer::Text(_), _) => return Ok(()),
        (NativeBuffer::Pinned(pinned), Some(array)) => {
            // SAFETY: the pin came from `extract` for this array and kind and
            // the entry owning it has been removed from the table.
            unsafe { host.unpin(array, kind, pinned, mode)? };
            true
        }
        (NativeBuffer::Logical(data), Some(array)) => {
            if mode == ReleaseMode::Abort {
                return Ok(());
            }
            let mut packed = vec![0u8; data.len()];
            let complete = narrow_logicals(&data, &mut packed);
            host.write_region(array, Region::Raw(&packed))?;
            complete
        }
        (_, None) => {
            return Err(MirrorError::UnexpectedKind(format!(
                "{} without backing array",
                kind
            )))
        }
    };

    if mode == ReleaseMode::CopyBack {
        host.mark_conversion(object, complete)?;
    }
    Ok(())
}

unsafe fn pinned_region(kind: ElementKind, pinned: &Pinned) -> Result<Region<'_>> {
    let len = pinned.len();
    let ptr = pinned.as_ptr();
    match kind {
        ElementKind::Integer => Ok(Region::Int(slice::from_raw_parts(ptr.cast(), len))),
        ElementKind::Real => Ok(Region::Real(slice::from_raw_parts(ptr.cast(), len))),
        ElementKind::Raw => Ok(Region::Raw(slice::from_raw_parts(ptr, len))),
        other => Err(MirrorError::UnexpectedKind(format!("pinned {}", other))),
    }
}

unsafe fn pinned_region_mut(kind: ElementKind, pinned: &mut Pinned) -> Result<RegionMut<'_>> {
    let len = pinned.len();
    let ptr = pinned.as_ptr();
    match kind {
        ElementKind::Integer => Ok(RegionMut::Int(slice::from_raw_parts_mut(ptr.cast(), len))),
        ElementKind::Real => Ok(RegionMut::Real(slice::from_raw_parts_mut(ptr.cast(), len))),
        ElementKind::Raw => Ok(RegionMut::Raw(slice::from_raw_parts_mut(ptr, len))),
        other => Err(MirrorError::UnexpectedKind(format!("pinned {}", other))),
    }
}
