#![allow(dead_code)]

use std::collections::HashSet;
use std::ptr::NonNull;

use rffi_bridge::{
    BridgeConfig, ElementKind, ManagedHost, MirrorError, NativeBridge, Pinned, RecoveryPoint,
    Region, RegionMut, ReleaseMode, Result,
};

/// A managed object reference. Several handles (`alias`) may name the same
/// object, the way distinct JNI references can.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handle {
    pub object: usize,
    pub alias: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayId(pub usize);

enum Storage {
    Int(Box<[i32]>),
    Real(Box<[f64]>),
    Raw(Box<[u8]>),
}

impl Storage {
    fn len(&self) -> usize {
        match self {
            Storage::Int(s) => s.len(),
            Storage::Real(s) => s.len(),
            Storage::Raw(s) => s.len(),
        }
    }

    fn duplicate(&self) -> Storage {
        match self {
            Storage::Int(s) => Storage::Int(s.clone()),
            Storage::Real(s) => Storage::Real(s.clone()),
            Storage::Raw(s) => Storage::Raw(s.clone()),
        }
    }
}

enum Contents {
    Array(usize),
    Text(Vec<u8>),
}

/// In-memory managed runtime. Arrays live in boxed slices so pins are
/// in-place and addresses stay stable.
pub struct FakeHost {
    objects: Vec<Contents>,
    arrays: Vec<Storage>,
    next_alias: u32,
    invalid: HashSet<usize>,
    pub pinned: usize,
    pub unpins: Vec<(ArrayId, ReleaseMode)>,
    pub marks: Vec<(usize, bool)>,
    pub backing_lookups: usize,
    pub released_arrays: Vec<ArrayId>,
    pub created_refs: Vec<Handle>,
    pub deleted_refs: Vec<Handle>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
            arrays: Vec::new(),
            next_alias: 1,
            invalid: HashSet::new(),
            pinned: 0,
            unpins: Vec::new(),
            marks: Vec::new(),
            backing_lookups: 0,
            released_arrays: Vec::new(),
            created_refs: Vec::new(),
            deleted_refs: Vec::new(),
        }
    }

    fn add(&mut self, storage: Storage) -> Handle {
        self.arrays.push(storage);
        self.objects.push(Contents::Array(self.arrays.len() - 1));
        Handle {
            object: self.objects.len() - 1,
            alias: 0,
        }
    }

    pub fn new_ints(&mut self, values: &[i32]) -> Handle {
        self.add(Storage::Int(values.into()))
    }

    pub fn new_reals(&mut self, values: &[f64]) -> Handle {
        self.add(Storage::Real(values.into()))
    }

    pub fn new_raw(&mut self, values: &[u8]) -> Handle {
        self.add(Storage::Raw(values.into()))
    }

    /// Logical vectors are packed one byte per element.
    pub fn new_logicals(&mut self, values: &[u8]) -> Handle {
        self.new_raw(values)
    }

    pub fn new_text(&mut self, text: &[u8]) -> Handle {
        self.objects.push(Contents::Text(text.to_vec()));
        Handle {
            object: self.objects.len() - 1,
            alias: 0,
        }
    }

    /// Another reference to the same object.
    pub fn alias(&mut self, handle: Handle) -> Handle {
        self.next_alias += 1;
        Handle {
            object: handle.object,
            alias: self.next_alias,
        }
    }

    pub fn invalidate_handle(&mut self, handle: Handle) {
        self.invalid.insert(handle.object);
    }

    pub fn array_of(&self, handle: Handle) -> ArrayId {
        match &self.objects[handle.object] {
            Contents::Array(index) => ArrayId(*index),
            Contents::Text(_) => panic!("text object has no array"),
        }
    }

    /// Give the object a fresh backing array with the same contents, as the
    /// managed side does when it reallocates a vector.
    pub fn reallocate(&mut self, handle: Handle) -> ArrayId {
        let old = self.array_of(handle).0;
        let copy = self.arrays[old].duplicate();
        self.arrays.push(copy);
        let new = self.arrays.len() - 1;
        self.objects[handle.object] = Contents::Array(new);
        ArrayId(new)
    }

    pub fn ints(&self, handle: Handle) -> Vec<i32> {
        match &self.arrays[self.array_of(handle).0] {
            Storage::Int(s) => s.to_vec(),
            _ => panic!("not an integer vector"),
        }
    }

    pub fn reals(&self, handle: Handle) -> Vec<f64> {
        match &self.arrays[self.array_of(handle).0] {
            Storage::Real(s) => s.to_vec(),
            _ => panic!("not a real vector"),
        }
    }

    pub fn bytes(&self, handle: Handle) -> Vec<u8> {
        self.bytes_of(self.array_of(handle))
    }

    pub fn bytes_of(&self, array: ArrayId) -> Vec<u8> {
        match &self.arrays[array.0] {
            Storage::Raw(s) => s.to_vec(),
            _ => panic!("not a byte vector"),
        }
    }

    pub fn set_ints(&mut self, handle: Handle, values: &[i32]) {
        let index = self.array_of(handle).0;
        match &mut self.arrays[index] {
            Storage::Int(s) => s.copy_from_slice(values),
            _ => panic!("not an integer vector"),
        }
    }

    pub fn set_bytes(&mut self, handle: Handle, values: &[u8]) {
        let index = self.array_of(handle).0;
        match &mut self.arrays[index] {
            Storage::Raw(s) => s.copy_from_slice(values),
            _ => panic!("not a byte vector"),
        }
    }

    pub fn marks_for(&self, handle: Handle) -> Vec<bool> {
        self.marks
            .iter()
            .filter(|(object, _)| *object == handle.object)
            .map(|(_, complete)| *complete)
            .collect()
    }
}

/// Pins are in-place, so a region copy may be from an array onto itself.
fn copy<T: Copy>(dst: &mut [T], src: &[T]) {
    if dst.as_ptr() != src.as_ptr() {
        dst.copy_from_slice(src);
    }
}

fn kind_error(kind: ElementKind) -> MirrorError {
    MirrorError::host("fake", format!("storage does not hold {}", kind))
}

impl ManagedHost for FakeHost {
    type Object = Handle;
    type Array = ArrayId;

    fn same_object(&self, a: Handle, b: Handle) -> bool {
        a.object == b.object
    }

    fn same_array(&self, a: ArrayId, b: ArrayId) -> bool {
        a == b
    }

    fn is_valid_ref(&self, obj: Handle) -> bool {
        obj.object < self.objects.len() && !self.invalid.contains(&obj.object)
    }

    fn backing_array(&mut self, obj: Handle, kind: ElementKind) -> Result<ArrayId> {
        self.backing_lookups += 1;
        let array = match &self.objects[obj.object] {
            Contents::Array(index) => *index,
            Contents::Text(_) => return Err(kind_error(kind)),
        };
        let matches = matches!(
            (&self.arrays[array], kind),
            (Storage::Int(_), ElementKind::Integer)
                | (Storage::Real(_), ElementKind::Real)
                | (Storage::Raw(_), ElementKind::Raw)
                | (Storage::Raw(_), ElementKind::Logical)
        );
        if !matches {
            return Err(kind_error(kind));
        }
        Ok(ArrayId(array))
    }

    fn array_length(&mut self, array: ArrayId) -> Result<usize> {
        Ok(self.arrays[array.0].len())
    }

    fn pin(&mut self, array: ArrayId, kind: ElementKind) -> Result<Pinned> {
        let storage = &mut self.arrays[array.0];
        let len = storage.len();
        let data: *mut u8 = match (storage, kind) {
            (Storage::Int(s), ElementKind::Integer) => s.as_mut_ptr().cast(),
            (Storage::Real(s), ElementKind::Real) => s.as_mut_ptr().cast(),
            (Storage::Raw(s), ElementKind::Raw) => s.as_mut_ptr(),
            _ => return Err(kind_error(kind)),
        };
        let data = NonNull::new(data).ok_or(MirrorError::PinFailed { kind })?;
        self.pinned += 1;
        Ok(unsafe { Pinned::new(data, len) })
    }

    unsafe fn unpin(
        &mut self,
        array: ArrayId,
        _kind: ElementKind,
        _pinned: Pinned,
        mode: ReleaseMode,
    ) -> Result<()> {
        self.pinned -= 1;
        self.unpins.push((array, mode));
        Ok(())
    }

    fn read_region(&mut self, array: ArrayId, dst: RegionMut<'_>) -> Result<()> {
        match (&self.arrays[array.0], dst) {
            (Storage::Int(s), RegionMut::Int(d)) => copy(d, s),
            (Storage::Real(s), RegionMut::Real(d)) => copy(d, s),
            (Storage::Raw(s), RegionMut::Raw(d)) => copy(d, s),
            _ => return Err(MirrorError::host("read_region", "region type mismatch")),
        }
        Ok(())
    }

    fn write_region(&mut self, array: ArrayId, src: Region<'_>) -> Result<()> {
        match (&mut self.arrays[array.0], src) {
            (Storage::Int(d), Region::Int(s)) => copy(d, s),
            (Storage::Real(d), Region::Real(s)) => copy(d, s),
            (Storage::Raw(d), Region::Raw(s)) => copy(d, s),
            _ => return Err(MirrorError::host("write_region", "region type mismatch")),
        }
        Ok(())
    }

    fn text(&mut self, obj: Handle) -> Result<Vec<u8>> {
        match &self.objects[obj.object] {
            Contents::Text(text) => Ok(text.clone()),
            Contents::Array(_) => Err(kind_error(ElementKind::Char)),
        }
    }

    fn mark_conversion(&mut self, obj: Handle, complete: bool) -> Result<()> {
        self.marks.push((obj.object, complete));
        Ok(())
    }

    fn new_global_ref(&mut self, obj: Handle) -> Result<Handle> {
        let gref = self.alias(obj);
        self.created_refs.push(gref);
        Ok(gref)
    }

    fn release_array(&mut self, array: ArrayId) -> Result<()> {
        self.released_arrays.push(array);
        Ok(())
    }

    fn delete_global_ref(&mut self, obj: Handle) -> Result<()> {
        self.deleted_refs.push(obj);
        Ok(())
    }

    fn describe(&mut self, obj: Handle) -> Option<String> {
        Some(format!("FakeObject#{}", obj.object))
    }

    fn fatal_error(&mut self, msg: &str) -> ! {
        panic!("fatal error: {}", msg)
    }
}

pub fn bridge() -> NativeBridge<FakeHost> {
    bridge_with(BridgeConfig::default())
}

pub fn bridge_with(config: BridgeConfig) -> NativeBridge<FakeHost> {
    NativeBridge::new(FakeHost::new(), config).unwrap()
}

pub fn recovery(token: usize) -> RecoveryPoint {
    RecoveryPoint::new(token)
}

/// View a lent-out pointer as a mutable slice of `len` elements.
///
/// # Safety
///
/// `ptr` must have come from the bridge for a live entry of `len` `T`s.
pub unsafe fn native<'a, T>(ptr: *mut std::ffi::c_void, len: usize) -> &'a mut [T] {
    std::slice::from_raw_parts_mut(ptr.cast(), len)
}
