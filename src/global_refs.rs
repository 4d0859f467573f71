//! Cache of pinned references that outlive individual native calls.
//!
//! Lookups are by identity. Permanent entries (class handles and the like)
//! are never released; transient ones are released by an explicit
//! [`GlobalRefCache::release`].

use crate::errors::{messages, MirrorError, Result};
use crate::host::ManagedHost;
use crate::logging::TARGET_REFS;

#[derive(Debug, Clone, Copy)]
struct GlobalRefEntry<O> {
    permanent: bool,
    gref: O,
}

#[derive(Debug)]
pub struct GlobalRefCache<O> {
    slots: Vec<Option<GlobalRefEntry<O>>>,
}

impl<O: Copy + std::fmt::Debug> GlobalRefCache<O> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity.max(1)),
        }
    }

    /// Slots used so far, including released ones.
    pub fn hwm(&self) -> usize {
        self.slots.len()
    }

    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Number of references currently pinned.
    pub fn live(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn find<H>(&self, host: &H, obj: O) -> Option<O>
    where
        H: ManagedHost<Object = O>,
    {
        self.slots.iter().enumerate().find_map(|(index, slot)| match slot {
            Some(entry) if host.same_object(entry.gref, obj) => {
                log::trace!(target: TARGET_REFS, "gref: cache hit: {}", index);
                Some(entry.gref)
            }
            _ => None,
        })
    }

    /// The cached pinned reference for `obj`, or `obj` itself.
    pub fn check_ref<H>(&self, host: &H, obj: O) -> O
    where
        H: ManagedHost<Object = O>,
    {
        self.find(host, obj).unwrap_or(obj)
    }

    pub fn create_or_find<H>(&mut self, host: &mut H, obj: O, permanent: bool) -> Result<O>
    where
        H: ManagedHost<Object = O>,
    {
        if let Some(gref) = self.find(host, obj) {
            return Ok(gref);
        }
        self.add(host, obj, permanent)
    }

    fn add<H>(&mut self, host: &mut H, obj: O, permanent: bool) -> Result<O>
    where
        H: ManagedHost<Object = O>,
    {
        if self.slots.len() == self.slots.capacity() {
            let capacity = self.slots.capacity();
            self.slots
                .try_reserve_exact(capacity.max(1))
                .map_err(|_| MirrorError::TableGrowth {
                    table: messages::GLOBAL_REF_TABLE,
                    capacity,
                })?;
            log::trace!(target: TARGET_REFS, "gref: extending table to {}", self.slots.capacity());
        }
        let gref = host.new_global_ref(obj)?;
        self.slots.push(Some(GlobalRefEntry { permanent, gref }));
        log::trace!(
            target: TARGET_REFS,
            "gref: add: index {}, ref {:?}, permanent {}",
            self.slots.len() - 1,
            gref,
            permanent
        );
        Ok(gref)
    }

    /// Release every transient reference matching `obj`. Returns how many were released.
    pub fn release<H>(&mut self, host: &mut H, obj: O) -> Result<usize>
    where
        H: ManagedHost<Object = O>,
    {
        let mut released = 0;
        for index in 0..self.slots.len() {
            let gref = match self.slots[index] {
                Some(entry) if !entry.permanent && host.same_object(entry.gref, obj) => entry.gref,
                _ => continue,
            };
            log::trace!(target: TARGET_REFS, "gref: release: index {}, gref: {:?}", index, gref);
            self.slots[index] = None;
            host.delete_global_ref(gref)?;
            released += 1;
        }
        Ok(released)
    }
}
