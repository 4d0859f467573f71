use std::ffi::c_void;

use log::Level;

use crate::bridge::NativeBridge;
use crate::errors::{messages, MirrorError, Result};
use crate::host::{ManagedHost, ReleaseMode};
use crate::kind::ElementKind;
use crate::logging::TARGET_MIRROR;
use crate::mirror::codec;
use crate::mirror::table::MirrorEntry;

impl<H: ManagedHost> NativeBridge<H> {
    /// Native pointer for `obj`, mirroring it on first request.
    ///
    /// Repeated requests for the same object return the same pointer until
    /// the entry is released, refreshed away or invalidated.
    pub fn acquire(&mut self, obj: H::Object, kind: ElementKind) -> Result<*mut c_void> {
        if self.calls.depth() == 0 {
            return Err(MirrorError::NoActiveCall("acquire"));
        }
        self.validate(obj, "acquire")?;

        let host = &self.host;
        if let Some(index) = self.table.find(obj, |a, b| host.same_object(a, b)) {
            if let Some(entry) = self.table.get_mut(index) {
                if entry.kind != kind {
                    // Element widths must agree for the cached buffer to be usable.
                    if entry.kind.native_width() != kind.native_width() {
                        return Err(MirrorError::UnexpectedKind(format!(
                            "{}: {:?} cached as {}, requested as {}",
                            messages::KIND_MISMATCH,
                            obj,
                            entry.kind,
                            kind
                        )));
                    }
                    log::warn!(
                        target: TARGET_MIRROR,
                        "{}: {:?} cached as {}, requested as {}",
                        messages::KIND_MISMATCH,
                        obj,
                        entry.kind,
                        kind
                    );
                }
                let data = entry.buffer.as_mut_ptr();
                log::trace!(target: TARGET_MIRROR, "findNativeArray({:?}): found {:?} at {}", obj, data, index);
                return Ok(data);
            }
        }

        self.table.reserve()?;
        let (array, mut buffer) = codec::extract(&mut self.host, obj, kind)?;
        let data = buffer.as_mut_ptr();
        let index = self.table.push(MirrorEntry {
            kind,
            object: obj,
            array,
            buffer,
        })?;
        if log::log_enabled!(target: TARGET_MIRROR, Level::Trace) {
            let class = self.host.describe(obj);
            log::trace!(
                target: TARGET_MIRROR,
                "addNativeArray(x={:?}, class={}, ix={}, kind={})",
                obj,
                class.as_deref().unwrap_or("?"),
                index,
                kind
            );
        }
        Ok(data)
    }

    /// Tombstone every mirror of `obj` anywhere in the table, pushing its
    /// native contents back first. Returns how many entries were released.
    pub fn invalidate(&mut self, obj: H::Object) -> Result<usize> {
        self.validate(obj, "invalidate")?;
        let host = &self.host;
        let matches = self.table.matching(obj, |a, b| host.same_object(a, b));
        if matches.is_empty() {
            log::trace!(target: TARGET_MIRROR, "invalidateNativeArray({:?}): not found", obj);
            return Ok(0);
        }
        for &index in &matches {
            log::trace!(target: TARGET_MIRROR, "invalidateNativeArray({:?}): found at {}", obj, index);
            self.release_entry(index, ReleaseMode::CopyBack)?;
        }
        Ok(matches.len())
    }

    /// Finalize the entry at `index` and tombstone its slot.
    ///
    /// Returns `false` when the slot was already a tombstone.
    pub fn release_entry(&mut self, index: usize, mode: ReleaseMode) -> Result<bool> {
        match self.table.take(index) {
            Some(entry) => {
                log::trace!(
                    target: TARGET_MIRROR,
                    "releaseNativeArray(x={:?}, ix={}, kind={}, mode={:?})",
                    entry.object,
                    index,
                    entry.kind,
                    mode
                );
                codec::release(&mut self.host, entry, mode)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Copy managed contents into the mirror of `obj`.
    ///
    /// Only mirrors created in the current frame may be refreshed. Returns
    /// `false` when `obj` has no live mirror.
    pub fn refresh(&mut self, obj: H::Object) -> Result<bool> {
        let frame_hwm = self
            .calls
            .current()
            .map(|frame| frame.hwm)
            .ok_or(MirrorError::NoActiveCall("refresh"))?;
        let host = &self.host;
        let index = match self.table.find(obj, |a, b| host.same_object(a, b)) {
            Some(index) => index,
            None => return Ok(false),
        };
        if index < frame_hwm {
            return Err(MirrorError::CrossFrameRefresh { index, frame_hwm });
        }
        self.refresh_entry(index)?;
        Ok(true)
    }

    /// Refresh every mirror created in the current frame.
    pub fn refresh_all_in_current_frame(&mut self) -> Result<()> {
        let frame_hwm = self
            .calls
            .current()
            .map(|frame| frame.hwm)
            .ok_or(MirrorError::NoActiveCall("refresh-all"))?;
        for index in frame_hwm..self.table.hwm() {
            self.refresh_entry(index)?;
        }
        Ok(())
    }

    /// Refresh one entry from its managed source, or tombstone it when the
    /// managed side has replaced the backing array since it was mirrored.
    ///
    /// After a tombstone, any pointer native code still holds is dangling.
    fn refresh_entry(&mut self, index: usize) -> Result<()> {
        let (object, kind, recorded) = match self.table.get(index) {
            Some(entry) => match entry.array {
                Some(array) => (entry.object, entry.kind, array),
                None => return Ok(()),
            },
            None => return Ok(()),
        };

        let current = self.host.backing_array(object, kind)?;
        let unchanged = self.host.same_array(current, recorded);
        self.host.release_array(current)?;
        if unchanged {
            log::trace!(
                target: TARGET_MIRROR,
                "updateNativeArray(x={:?}, ix={}, kind={}): copying data from managed side",
                object,
                index,
                kind
            );
            if let Some(entry) = self.table.get_mut(index) {
                codec::refresh(&mut self.host, kind, recorded, &mut entry.buffer)?;
            }
            return Ok(());
        }

        log::warn!(
            target: TARGET_MIRROR,
            "updateNativeArray(x={:?}, ix={}, kind={}): {}",
            object,
            index,
            kind,
            messages::STALE_MIRROR
        );
        if let Some(entry) = self.table.take(index) {
            codec::release(&mut self.host, entry, ReleaseMode::Abort)?;
        }
        Ok(())
    }

    /// Checkpoint: copy the native contents of `obj`'s mirror back to the
    /// managed object without releasing it. Returns `false` when `obj` has
    /// no live mirror.
    pub fn push_to_managed(&mut self, obj: H::Object) -> Result<bool> {
        let host = &self.host;
        let index = match self.table.find(obj, |a, b| host.same_object(a, b)) {
            Some(index) => index,
            None => return Ok(false),
        };
        self.push_entry(index)?;
        Ok(true)
    }

    /// Push back every mirror created in the current frame.
    pub fn push_back_all_in_current_frame(&mut self) -> Result<()> {
        let frame_hwm = self
            .calls
            .current()
            .map(|frame| frame.hwm)
            .ok_or(MirrorError::NoActiveCall("push-back-all"))?;
        for index in frame_hwm..self.table.hwm() {
            self.push_entry(index)?;
        }
        Ok(())
    }

    fn push_entry(&mut self, index: usize) -> Result<()> {
        if let Some(entry) = self.table.get(index) {
            log::trace!(target: TARGET_MIRROR, "updateJObject({:?}): updating", entry.object);
            codec::push_back(
                &mut self.host,
                entry.kind,
                entry.object,
                entry.array,
                &entry.buffer,
            )?;
        }
        Ok(())
    }
}
