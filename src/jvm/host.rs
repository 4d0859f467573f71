use std::ffi::CString;
use std::ptr::{self, NonNull};
use std::slice;

use jni::objects::{JObject, JString};
use jni::sys;
use jni::JNIEnv;

use crate::errors::{MirrorError, Result};
use crate::host::{ManagedHost, Pinned, Region, RegionMut, ReleaseMode};
use crate::jvm::binding::UpCallBindings;
use crate::kind::ElementKind;

/// Look up a function in the raw JNI function table.
macro_rules! jni_fn {
    ($env:expr, $name:ident) => {
        (**$env).$name.ok_or(MirrorError::host(
            "jni",
            concat!("missing JNI function ", stringify!($name)),
        ))?
    };
}

/// [`ManagedHost`] backed by a live JVM.
///
/// Holds the `JNIEnv` of the call sequence in flight; the C ABI layer
/// re-attaches it on every call entry.
pub struct JniHost {
    env: *mut sys::JNIEnv,
    bindings: UpCallBindings,
}

// SAFETY: the bridge runs one call sequence at a time behind a mutex, and
// `env` is replaced with the caller's env before each sequence starts.
unsafe impl Send for JniHost {}

impl JniHost {
    pub fn new(env: *mut sys::JNIEnv, bindings: UpCallBindings) -> Self {
        Self { env, bindings }
    }

    pub fn set_env(&mut self, env: *mut sys::JNIEnv) {
        self.env = env;
    }

    pub fn bindings(&self) -> &UpCallBindings {
        &self.bindings
    }

    fn env(&self) -> Result<*mut sys::JNIEnv> {
        if self.env.is_null() {
            return Err(MirrorError::host("jni", "no JNIEnv attached"));
        }
        Ok(self.env)
    }

    /// Ask the managed side for its trace file descriptor (embedded mode).
    pub fn trace_descriptor(&self) -> Result<i32> {
        let names = &self.bindings.names;
        // SAFETY: `env` is the live env of the current thread.
        let mut env = unsafe { JNIEnv::from_raw(self.env()?) }?;
        let descriptor = env
            .call_static_method(
                names.trace_utils_class,
                names.trace_descriptor.name,
                names.trace_descriptor.signature,
                &[],
            )?
            .l()?;
        let fd = env
            .get_field(
                &descriptor,
                names.file_descriptor_fd.name,
                names.file_descriptor_fd.signature,
            )?
            .i()?;
        Ok(fd)
    }

    /// Terminate through the JVM when there is an env, otherwise abort.
    pub fn fatal_with_env(env: *mut sys::JNIEnv, msg: &str) -> ! {
        log::error!("fatal: {}", msg);
        let message = CString::new(msg.replace('\0', " ")).unwrap_or_default();
        if !env.is_null() {
            // SAFETY: a non-null env comes from the JVM for the current thread.
            unsafe {
                if let Some(fatal) = (**env).FatalError {
                    fatal(env, message.as_ptr());
                }
            }
        }
        eprintln!("[rffi_bridge] fatal: {}", msg);
        std::process::abort()
    }

    unsafe fn check_exception(env: *mut sys::JNIEnv, operation: &'static str) -> Result<()> {
        let check = jni_fn!(env, ExceptionCheck);
        if check(env) == sys::JNI_TRUE {
            let describe = jni_fn!(env, ExceptionDescribe);
            describe(env);
            return Err(MirrorError::PendingException(operation));
        }
        Ok(())
    }
}

impl ManagedHost for JniHost {
    type Object = sys::jobject;
    type Array = sys::jarray;

    fn same_object(&self, a: sys::jobject, b: sys::jobject) -> bool {
        if a == b {
            return true;
        }
        if a.is_null() || b.is_null() || self.env.is_null() {
            return false;
        }
        // SAFETY: both handles are live references owned by the current call.
        unsafe {
            match (**self.env).IsSameObject {
                Some(same) => same(self.env, a, b) == sys::JNI_TRUE,
                None => false,
            }
        }
    }

    fn same_array(&self, a: sys::jarray, b: sys::jarray) -> bool {
        self.same_object(a, b)
    }

    fn is_valid_ref(&self, obj: sys::jobject) -> bool {
        if obj.is_null() || self.env.is_null() {
            return false;
        }
        // SAFETY: GetObjectRefType accepts any handle value.
        unsafe {
            match (**self.env).GetObjectRefType {
                Some(ref_type) => !matches!(
                    ref_type(self.env, obj),
                    sys::jobjectRefType::JNIInvalidRefType
                ),
                None => true,
            }
        }
    }

    fn backing_array(&mut self, obj: sys::jobject, kind: ElementKind) -> Result<sys::jarray> {
        let method = match kind {
            ElementKind::Integer => self.bindings.integer,
            ElementKind::Real => self.bindings.real,
            ElementKind::Raw => self.bindings.raw,
            ElementKind::Logical => self.bindings.logical,
            ElementKind::Char => {
                return Err(MirrorError::UnexpectedKind("char has no backing array".to_string()))
            }
        };
        let env = self.env()?;
        let args = [sys::jvalue { l: obj }];
        // SAFETY: the method id was resolved against the up-call object's class.
        let array = unsafe {
            let call = jni_fn!(env, CallObjectMethodA);
            let array = call(
                env,
                self.bindings.upcalls.as_obj().as_raw(),
                method.into_raw(),
                args.as_ptr(),
            );
            Self::check_exception(env, "backing array up-call")?;
            array
        };
        if array.is_null() {
            return Err(MirrorError::host("backing_array", format!("null {} array", kind)));
        }
        Ok(array)
    }

    fn release_array(&mut self, array: sys::jarray) -> Result<()> {
        let env = self.env()?;
        // SAFETY: `array` is a local reference returned by `backing_array`
        // and is not used again.
        unsafe { jni_fn!(env, DeleteLocalRef)(env, array) };
        Ok(())
    }

    fn array_length(&mut self, array: sys::jarray) -> Result<usize> {
        let env = self.env()?;
        // SAFETY: `array` is a live array reference.
        let len = unsafe { jni_fn!(env, GetArrayLength)(env, array) };
        Ok(len.max(0) as usize)
    }

    fn pin(&mut self, array: sys::jarray, kind: ElementKind) -> Result<Pinned> {
        let env = self.env()?;
        let len = self.array_length(array)?;
        // SAFETY: the array was obtained for `kind`, so its element type matches.
        let data: *mut u8 = unsafe {
            match kind {
                ElementKind::Integer => {
                    jni_fn!(env, GetIntArrayElements)(env, array, ptr::null_mut()).cast()
                }
                ElementKind::Real => {
                    jni_fn!(env, GetDoubleArrayElements)(env, array, ptr::null_mut()).cast()
                }
                ElementKind::Raw => {
                    jni_fn!(env, GetByteArrayElements)(env, array, ptr::null_mut()).cast()
                }
                other => return Err(MirrorError::UnexpectedKind(format!("pin {}", other))),
            }
        };
        let data = NonNull::new(data).ok_or(MirrorError::PinFailed { kind })?;
        // SAFETY: the JVM keeps the elements valid until the matching release.
        Ok(unsafe { Pinned::new(data, len) })
    }

    unsafe fn unpin(
        &mut self,
        array: sys::jarray,
        kind: ElementKind,
        pinned: Pinned,
        mode: ReleaseMode,
    ) -> Result<()> {
        let env = self.env()?;
        let mode = match mode {
            ReleaseMode::CopyBack => 0,
            ReleaseMode::Abort => sys::JNI_ABORT,
        };
        let data = pinned.as_ptr();
        match kind {
            ElementKind::Integer => jni_fn!(env, ReleaseIntArrayElements)(env, array, data.cast(), mode),
            ElementKind::Real => jni_fn!(env, ReleaseDoubleArrayElements)(env, array, data.cast(), mode),
            ElementKind::Raw => jni_fn!(env, ReleaseByteArrayElements)(env, array, data.cast(), mode),
            other => return Err(MirrorError::UnexpectedKind(format!("unpin {}", other))),
        }
        Ok(())
    }

    fn read_region(&mut self, array: sys::jarray, dst: RegionMut<'_>) -> Result<()> {
        let env = self.env()?;
        let len = dst.len() as sys::jsize;
        // SAFETY: `dst` holds exactly `len` elements of the array's type.
        unsafe {
            match dst {
                RegionMut::Int(s) => jni_fn!(env, GetIntArrayRegion)(env, array, 0, len, s.as_mut_ptr()),
                RegionMut::Real(s) => {
                    jni_fn!(env, GetDoubleArrayRegion)(env, array, 0, len, s.as_mut_ptr())
                }
                RegionMut::Raw(s) => {
                    jni_fn!(env, GetByteArrayRegion)(env, array, 0, len, s.as_mut_ptr().cast())
                }
            }
            Self::check_exception(env, "array region read")
        }
    }

    fn write_region(&mut self, array: sys::jarray, src: Region<'_>) -> Result<()> {
        let env = self.env()?;
        let len = src.len() as sys::jsize;
        // SAFETY: `src` holds exactly `len` elements of the array's type.
        unsafe {
            match src {
                Region::Int(s) => jni_fn!(env, SetIntArrayRegion)(env, array, 0, len, s.as_ptr()),
                Region::Real(s) => jni_fn!(env, SetDoubleArrayRegion)(env, array, 0, len, s.as_ptr()),
                Region::Raw(s) => {
                    jni_fn!(env, SetByteArrayRegion)(env, array, 0, len, s.as_ptr().cast())
                }
            }
            Self::check_exception(env, "array region write")
        }
    }

    fn text(&mut self, obj: sys::jobject) -> Result<Vec<u8>> {
        let env = self.env()?;
        // SAFETY: `obj` is a string wrapper; the field id belongs to its class.
        unsafe {
            let string = jni_fn!(env, GetObjectField)(
                env,
                obj,
                self.bindings.char_contents.into_raw(),
            );
            Self::check_exception(env, "text field read")?;
            if string.is_null() {
                return Err(MirrorError::host("text", "null string contents"));
            }
            let len = jni_fn!(env, GetStringUTFLength)(env, string).max(0) as usize;
            let chars = jni_fn!(env, GetStringUTFChars)(env, string, ptr::null_mut());
            if chars.is_null() {
                return Err(MirrorError::host("text", "GetStringUTFChars returned null"));
            }
            let bytes = slice::from_raw_parts(chars.cast::<u8>(), len).to_vec();
            jni_fn!(env, ReleaseStringUTFChars)(env, string, chars);
            Ok(bytes)
        }
    }

    fn mark_conversion(&mut self, obj: sys::jobject, complete: bool) -> Result<()> {
        let env = self.env()?;
        let args = [
            sys::jvalue { l: obj },
            sys::jvalue {
                z: u8::from(complete),
            },
        ];
        // SAFETY: the static method id was resolved against this class.
        unsafe {
            jni_fn!(env, CallStaticVoidMethodA)(
                env,
                self.bindings.upcalls_impl_class.as_obj().as_raw(),
                self.bindings.set_complete.into_raw(),
                args.as_ptr(),
            );
            Self::check_exception(env, "conversion outcome up-call")
        }
    }

    fn new_global_ref(&mut self, obj: sys::jobject) -> Result<sys::jobject> {
        let env = self.env()?;
        // SAFETY: `obj` is a live reference.
        let gref = unsafe { jni_fn!(env, NewGlobalRef)(env, obj) };
        if gref.is_null() {
            return Err(MirrorError::host("new_global_ref", "NewGlobalRef returned null"));
        }
        Ok(gref)
    }

    fn delete_global_ref(&mut self, obj: sys::jobject) -> Result<()> {
        let env = self.env()?;
        // SAFETY: only references created by `new_global_ref` reach here.
        unsafe { jni_fn!(env, DeleteGlobalRef)(env, obj) };
        Ok(())
    }

    fn describe(&mut self, obj: sys::jobject) -> Option<String> {
        let raw = self.env().ok()?;
        // SAFETY: `raw` is the live env; `obj` is borrowed, not deleted.
        let mut env = unsafe { JNIEnv::from_raw(raw) }.ok()?;
        let obj = unsafe { JObject::from_raw(obj) };
        let class = env.get_object_class(&obj).ok()?;
        let name = env
            .call_method(&class, "getName", "()Ljava/lang/String;", &[])
            .ok()?
            .l()
            .ok()?;
        let name = JString::from(name);
        let name: String = env.get_string(&name).ok()?.into();
        Some(name)
    }

    fn fatal_error(&mut self, msg: &str) -> ! {
        Self::fatal_with_env(self.env, msg)
    }
}
