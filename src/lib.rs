//! Native-memory mirroring for managed vectors handed to native code.
//!
//! Native code asks for a raw pointer to a managed vector's contents; the
//! bridge pins or copies the data, remembers the mirror for the duration of
//! the native call, and writes changes back when the call returns.

pub mod bridge;
pub mod config;
pub mod errors;
pub mod global_refs;
pub mod host;
pub mod jvm;
pub mod kind;
pub mod logging;
pub mod mirror;

pub use crate::bridge::{CallScope, NativeBridge};
pub use crate::config::{BridgeConfig, TraceOutput};
pub use crate::errors::{MirrorError, Result};
pub use crate::global_refs::GlobalRefCache;
pub use crate::host::{ManagedHost, Pinned, Region, RegionMut, ReleaseMode};
pub use crate::kind::ElementKind;
pub use crate::mirror::{NativeBuffer, RecoveryPoint, SlotState};
