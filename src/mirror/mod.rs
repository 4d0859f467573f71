//! Native array mirroring: the table of lent-out buffers, the per-kind
//! codec, the call-depth stack and the lifecycle operations tying them
//! together on [`crate::bridge::NativeBridge`].

pub mod codec;
pub mod frames;
pub mod lifecycle;
pub mod table;

pub use codec::NativeBuffer;
pub use frames::{CallFrame, CallStack, RecoveryPoint};
pub use table::{MirrorEntry, MirrorTable, SlotState};
