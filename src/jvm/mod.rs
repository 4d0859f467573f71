//! The JVM side of the bridge: up-call bindings, the JNI-backed host and the
//! exported C entry points.

pub mod binding;
pub mod exports;
pub mod host;

pub use binding::{BindingNames, Member, UpCallBindings};
pub use host::JniHost;
