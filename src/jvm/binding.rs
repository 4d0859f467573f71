use jni::objects::{GlobalRef, JClass, JFieldID, JMethodID, JObject, JStaticMethodID};
use jni::JNIEnv;

use crate::errors::{MirrorError, Result};

/// A method or field looked up by name and JNI signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Member {
    pub name: &'static str,
    pub signature: &'static str,
}

impl Member {
    pub const fn new(name: &'static str, signature: &'static str) -> Self {
        Self { name, signature }
    }
}

/// Names of everything the bridge calls on the managed side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingNames {
    /// Instance methods on the up-call object returning the backing array.
    pub integer: Member,
    pub real: Member,
    pub raw: Member,
    pub logical: Member,
    /// Class holding the static conversion-outcome callback.
    pub upcalls_impl_class: &'static str,
    pub set_complete: Member,
    /// Wrapper class of string-kind objects and its text field.
    pub char_wrapper_class: &'static str,
    pub char_contents: Member,
    /// Embedded mode: where the managed side keeps its trace descriptor.
    pub trace_utils_class: &'static str,
    pub trace_descriptor: Member,
    pub file_descriptor_fd: Member,
}

impl Default for BindingNames {
    fn default() -> Self {
        Self {
            integer: Member::new("INTEGER", "(Ljava/lang/Object;)[I"),
            real: Member::new("REAL", "(Ljava/lang/Object;)[D"),
            raw: Member::new("RAW", "(Ljava/lang/Object;)[B"),
            logical: Member::new("LOGICAL", "(Ljava/lang/Object;)[B"),
            upcalls_impl_class: "com/oracle/truffle/r/ffi/impl/jni/JNIUpCallsRFFIImpl",
            set_complete: Member::new("setComplete", "(Ljava/lang/Object;Z)V"),
            char_wrapper_class: "com/oracle/truffle/r/runtime/ffi/CharSXPWrapper",
            char_contents: Member::new("contents", "Ljava/lang/String;"),
            trace_utils_class: "com/oracle/truffle/r/runtime/ffi/RFFIUtils",
            trace_descriptor: Member::new("getTraceFileDescriptor", "()Ljava/io/FileDescriptor;"),
            file_descriptor_fd: Member::new("fd", "I"),
        }
    }
}

/// Class, method and field ids resolved once at startup.
pub struct UpCallBindings {
    pub names: BindingNames,
    pub upcalls: GlobalRef,
    pub upcalls_impl_class: GlobalRef,
    pub char_wrapper_class: GlobalRef,
    pub integer: JMethodID,
    pub real: JMethodID,
    pub raw: JMethodID,
    pub logical: JMethodID,
    pub set_complete: JStaticMethodID,
    pub char_contents: JFieldID,
}

impl UpCallBindings {
    /// Resolve every up-call. Any missing class, method or field is a
    /// [`MirrorError::Binding`], which callers treat as fatal.
    pub fn bind(env: &mut JNIEnv, upcalls: &JObject, names: BindingNames) -> Result<Self> {
        let upcalls_class = env
            .get_object_class(upcalls)
            .map_err(|e| binding("class", "<up-calls instance>", e))?;
        let integer = method(env, &upcalls_class, names.integer)?;
        let real = method(env, &upcalls_class, names.real)?;
        let raw = method(env, &upcalls_class, names.raw)?;
        let logical = method(env, &upcalls_class, names.logical)?;

        let impl_class = find_class(env, names.upcalls_impl_class)?;
        let set_complete = env
            .get_static_method_id(&impl_class, names.set_complete.name, names.set_complete.signature)
            .map_err(|e| binding("static method", names.set_complete.name, e))?;

        let wrapper_class = find_class(env, names.char_wrapper_class)?;
        let char_contents = env
            .get_field_id(&wrapper_class, names.char_contents.name, names.char_contents.signature)
            .map_err(|e| binding("field", names.char_contents.name, e))?;

        log::debug!("bound managed up-calls");
        Ok(Self {
            upcalls: global(env, upcalls, "<up-calls instance>")?,
            upcalls_impl_class: global(env, &impl_class, names.upcalls_impl_class)?,
            char_wrapper_class: global(env, &wrapper_class, names.char_wrapper_class)?,
            names,
            integer,
            real,
            raw,
            logical,
            set_complete,
            char_contents,
        })
    }
}

fn binding(what: &'static str, name: &str, e: jni::errors::Error) -> MirrorError {
    MirrorError::Binding {
        what,
        name: name.to_string(),
        reason: e.to_string(),
    }
}

fn find_class<'local>(env: &mut JNIEnv<'local>, name: &'static str) -> Result<JClass<'local>> {
    env.find_class(name).map_err(|e| binding("class", name, e))
}

fn method(env: &mut JNIEnv, class: &JClass, member: Member) -> Result<JMethodID> {
    env.get_method_id(class, member.name, member.signature)
        .map_err(|e| binding("instance method", member.name, e))
}

fn global(env: &JNIEnv, obj: &JObject, name: &str) -> Result<GlobalRef> {
    env.new_global_ref(obj).map_err(|e| binding("global ref", name, e))
}
