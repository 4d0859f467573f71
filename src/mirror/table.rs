use crate::errors::{messages, MirrorError, Result};
use crate::kind::ElementKind;
use crate::mirror::codec::NativeBuffer;

/// One mirrored vector: the managed source and the native buffer lent out for it.
#[derive(Debug)]
pub struct MirrorEntry<O, A> {
    pub kind: ElementKind,
    pub object: O,
    /// `None` for text mirrors, which have no managed array behind them.
    pub array: Option<A>,
    pub buffer: NativeBuffer,
}

/// State of a table slot as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Live,
    Tombstoned,
    /// At or beyond the high-water-mark.
    Absent,
}

/// Append-only table of mirror entries.
///
/// Slots below the high-water-mark are either live or tombstoned (`None`);
/// they are only removed when a call frame truncates the table back to its
/// entry mark. Growth doubles the slot capacity.
#[derive(Debug)]
pub struct MirrorTable<O, A> {
    slots: Vec<Option<MirrorEntry<O, A>>>,
    last_hit: usize,
}

impl<O: Copy, A> MirrorTable<O, A> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity.max(1)),
            last_hit: 0,
        }
    }

    /// Index of the next free slot.
    pub fn hwm(&self) -> usize {
        self.slots.len()
    }

    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn slot_state(&self, index: usize) -> SlotState {
        match self.slots.get(index) {
            Some(Some(_)) => SlotState::Live,
            Some(None) => SlotState::Tombstoned,
            None => SlotState::Absent,
        }
    }

    pub fn get(&self, index: usize) -> Option<&MirrorEntry<O, A>> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut MirrorEntry<O, A>> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    /// Find the live entry for `object`, checking the last hit before scanning.
    pub fn find<F>(&mut self, object: O, same: F) -> Option<usize>
    where
        F: Fn(O, O) -> bool,
    {
        if let Some(entry) = self.get(self.last_hit) {
            if same(entry.object, object) {
                return Some(self.last_hit);
            }
        }
        let index = self
            .slots
            .iter()
            .position(|slot| matches!(slot, Some(entry) if same(entry.object, object)))?;
        self.last_hit = index;
        Some(index)
    }

    /// Indices of every live entry for `object`, across the whole table.
    pub fn matching<F>(&self, object: O, same: F) -> Vec<usize>
    where
        F: Fn(O, O) -> bool,
    {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Some(entry) if same(entry.object, object) => Some(index),
                _ => None,
            })
            .collect()
    }

    /// Make room for one more entry, doubling capacity when full.
    pub fn reserve(&mut self) -> Result<()> {
        if self.slots.len() == self.slots.capacity() {
            let capacity = self.slots.capacity();
            self.slots
                .try_reserve_exact(capacity.max(1))
                .map_err(|_| MirrorError::TableGrowth {
                    table: messages::MIRROR_TABLE,
                    capacity,
                })?;
            log::trace!(
                target: crate::logging::TARGET_MIRROR,
                "extending mirror table from {} to {}",
                capacity,
                self.slots.capacity()
            );
        }
        Ok(())
    }

    /// Append an entry at the high-water-mark.
    pub fn push(&mut self, entry: MirrorEntry<O, A>) -> Result<usize> {
        self.reserve()?;
        self.slots.push(Some(entry));
        let index = self.slots.len() - 1;
        self.last_hit = index;
        Ok(index)
    }

    /// Tombstone a slot, handing back the entry that lived there.
    pub fn take(&mut self, index: usize) -> Option<MirrorEntry<O, A>> {
        self.slots.get_mut(index).and_then(Option::take)
    }

    /// Drop every slot at or above `hwm`. The slots must already be tombstoned.
    pub fn truncate(&mut self, hwm: usize) {
        debug_assert!(self.slots[hwm.min(self.slots.len())..]
            .iter()
            .all(Option::is_none));
        self.slots.truncate(hwm);
        if self.last_hit >= hwm {
            self.last_hit = 0;
        }
    }
}
