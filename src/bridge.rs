//! The bridge context: every table the mirroring subsystem owns, plus the
//! managed host it talks to.
//!
//! # Threading
//!
//! A `NativeBridge` assumes exactly one logical call sequence in flight. It
//! has no internal locking; callers that can be entered from several threads
//! must serialise access around the whole call boundary, as
//! [`crate::jvm::exports`] does with a single mutex.

use std::ops::{Deref, DerefMut};

use crate::config::BridgeConfig;
use crate::errors::{MirrorError, Result};
use crate::global_refs::GlobalRefCache;
use crate::host::{ManagedHost, ReleaseMode};
use crate::logging::{LogEntry, TARGET_CALLS};
use crate::mirror::frames::{CallStack, RecoveryPoint};
use crate::mirror::table::{MirrorTable, SlotState};

pub struct NativeBridge<H: ManagedHost> {
    pub(crate) host: H,
    pub(crate) config: BridgeConfig,
    pub(crate) table: MirrorTable<H::Object, H::Array>,
    pub(crate) calls: CallStack,
    pub(crate) refs: GlobalRefCache<H::Object>,
}

impl<H: ManagedHost> NativeBridge<H> {
    pub fn new(host: H, config: BridgeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            table: MirrorTable::with_capacity(config.initial_table_capacity),
            calls: CallStack::new(config.max_call_depth),
            refs: GlobalRefCache::with_capacity(config.initial_ref_capacity),
            host,
            config,
        })
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn call_depth(&self) -> usize {
        self.calls.depth()
    }

    /// Mirror table high-water-mark.
    pub fn hwm(&self) -> usize {
        self.table.hwm()
    }

    pub fn table_capacity(&self) -> usize {
        self.table.capacity()
    }

    pub fn live_entries(&self) -> usize {
        self.table.live_count()
    }

    pub fn slot_state(&self, index: usize) -> SlotState {
        self.table.slot_state(index)
    }

    pub fn global_refs(&self) -> &GlobalRefCache<H::Object> {
        &self.refs
    }

    /// Push a call frame recording the current high-water-mark.
    pub fn enter_call(&mut self, recovery: RecoveryPoint) -> Result<usize> {
        let hwm = self.table.hwm();
        let depth = self.calls.push(hwm, recovery)?;
        log::debug!(target: TARGET_CALLS, "callEnter: depth {}, hwm {}", depth, hwm);
        Ok(depth)
    }

    /// Pop the current frame, releasing every entry created during it.
    ///
    /// All entries of the frame are released even if one release fails; the
    /// first failure is reported after the frame is gone.
    pub fn exit_call(&mut self) -> Result<()> {
        let frame = *self
            .calls
            .current()
            .ok_or(MirrorError::NoActiveCall("exit-call"))?;
        let top = self.table.hwm();
        let mut first_error = None;
        for index in frame.hwm..top {
            if let Err(e) = self.release_entry(index, ReleaseMode::CopyBack) {
                log::error!(target: TARGET_CALLS, "callExit: release of entry {} failed: {}", index, e);
                first_error.get_or_insert(e);
            }
        }
        self.table.truncate(frame.hwm);
        self.calls.pop();
        log::debug!(
            target: TARGET_CALLS,
            "callExit: depth {}, released {} slots",
            self.calls.depth(),
            top - frame.hwm
        );
        first_error.map_or(Ok(()), Err)
    }

    /// Exit frames until the call depth drops below `depth`, so the frame
    /// entered at `depth` and every frame nested inside it are released.
    ///
    /// Every frame is exited even if one fails; the first failure is returned.
    pub fn exit_to_depth(&mut self, depth: usize) -> Result<()> {
        let mut first_error = None;
        while depth > 0 && self.calls.depth() >= depth {
            if let Err(e) = self.exit_call() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn current_recovery_point(&self) -> Result<RecoveryPoint> {
        self.calls
            .current()
            .map(|frame| frame.recovery)
            .ok_or(MirrorError::NoActiveCall("error recovery"))
    }

    /// Enter a call whose frame is exited when the returned scope is dropped,
    /// including during unwinding.
    pub fn call_scope(&mut self, recovery: RecoveryPoint) -> Result<CallScope<'_, H>> {
        let depth = self.enter_call(recovery)?;
        Ok(CallScope {
            bridge: self,
            depth,
            exited: false,
        })
    }

    /// Run `f` inside a call frame. The frame is released whether `f`
    /// succeeds, fails or panics.
    pub fn with_call<T, F>(&mut self, recovery: RecoveryPoint, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let mut scope = self.call_scope(recovery)?;
        let result = f(&mut *scope);
        let exited = scope.exit();
        let value = result?;
        exited?;
        Ok(value)
    }

    pub(crate) fn validate(&self, obj: H::Object, operation: &'static str) -> Result<()> {
        if self.config.validate_references && !self.host.is_valid_ref(obj) {
            return Err(MirrorError::InvalidReference(operation));
        }
        Ok(())
    }

    pub fn create_global_ref(&mut self, obj: H::Object, permanent: bool) -> Result<H::Object> {
        self.validate(obj, "create-global-ref")?;
        self.refs.create_or_find(&mut self.host, obj, permanent)
    }

    pub fn find_global_ref(&self, obj: H::Object) -> Option<H::Object> {
        self.refs.find(&self.host, obj)
    }

    pub fn check_ref(&self, obj: H::Object) -> H::Object {
        self.refs.check_ref(&self.host, obj)
    }

    pub fn release_global_ref(&mut self, obj: H::Object) -> Result<usize> {
        self.refs.release(&mut self.host, obj)
    }

    /// Report `error` and terminate through the host.
    pub fn fatal(&mut self, error: &MirrorError) -> ! {
        let entry = LogEntry::new("ERROR", "rffi_bridge", &error.to_string())
            .with_error_code(error.error_code())
            .with_context("call_depth", serde_json::json!(self.calls.depth()))
            .with_context("hwm", serde_json::json!(self.table.hwm()));
        log::error!("{}", entry.to_json());
        self.host.fatal_error(&error.to_string())
    }
}

/// A native call frame tied to a lexical scope.
///
/// Dereferences to the bridge so mirror operations can be issued inside the
/// call. Dropping the scope exits the frame.
pub struct CallScope<'a, H: ManagedHost> {
    bridge: &'a mut NativeBridge<H>,
    depth: usize,
    exited: bool,
}

impl<H: ManagedHost> CallScope<'_, H> {
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Exit the frame, and any frame still open inside it, and report the
    /// outcome.
    pub fn exit(mut self) -> Result<()> {
        self.exited = true;
        self.bridge.exit_to_depth(self.depth)
    }
}

impl<H: ManagedHost> Deref for CallScope<'_, H> {
    type Target = NativeBridge<H>;

    fn deref(&self) -> &Self::Target {
        self.bridge
    }
}

impl<H: ManagedHost> DerefMut for CallScope<'_, H> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.bridge
    }
}

impl<H: ManagedHost> Drop for CallScope<'_, H> {
    fn drop(&mut self) {
        if self.exited {
            return;
        }
        if self.bridge.call_depth() > self.depth {
            log::warn!(
                target: TARGET_CALLS,
                "call scope at depth {} dropped with bridge at depth {}",
                self.depth,
                self.bridge.call_depth()
            );
        }
        if let Err(e) = self.bridge.exit_to_depth(self.depth) {
            if std::thread::panicking() {
                log::error!(target: TARGET_CALLS, "callExit during unwind failed: {}", e);
            } else {
                self.bridge.fatal(&e);
            }
        }
    }
}
