use std::ffi::c_void;

use crate::errors::{MirrorError, Result};

/// Opaque token the call-marshalling layer unwinds to when a native call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecoveryPoint(usize);

impl RecoveryPoint {
    pub const fn new(token: usize) -> Self {
        Self(token)
    }

    pub fn from_ptr(ptr: *mut c_void) -> Self {
        Self(ptr as usize)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0 as *mut c_void
    }

    pub fn token(self) -> usize {
        self.0
    }
}

/// Bookkeeping for one native call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallFrame {
    /// Mirror table high-water-mark when the call was entered.
    pub hwm: usize,
    pub recovery: RecoveryPoint,
}

/// Bounded stack of active native calls.
///
/// Marks are non-decreasing from the bottom of the stack up, since nested
/// calls only ever add mirror entries.
#[derive(Debug)]
pub struct CallStack {
    frames: Vec<CallFrame>,
    max_depth: usize,
}

impl CallStack {
    pub fn new(max_depth: usize) -> Self {
        Self {
            frames: Vec::with_capacity(max_depth),
            max_depth,
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Push a frame. Overflow leaves the stack untouched.
    pub fn push(&mut self, hwm: usize, recovery: RecoveryPoint) -> Result<usize> {
        if self.frames.len() >= self.max_depth {
            return Err(MirrorError::CallDepthOverflow {
                depth: self.frames.len() + 1,
                max: self.max_depth,
            });
        }
        debug_assert!(self.frames.last().map_or(true, |top| top.hwm <= hwm));
        self.frames.push(CallFrame { hwm, recovery });
        Ok(self.frames.len())
    }

    pub fn pop(&mut self) -> Option<CallFrame> {
        self.frames.pop()
    }

    pub fn current(&self) -> Option<&CallFrame> {
        self.frames.last()
    }

    pub fn frames(&self) -> &[CallFrame] {
        &self.frames
    }
}
