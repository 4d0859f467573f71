//! C ABI surface consumed by the native runtime, plus the JNI entry that
//! installs the process-wide bridge.
//!
//! Every entry point takes the bridge lock for its own duration only, so
//! nested down-calls from the managed side never contend with an outer one.
//! Errors never cross the boundary: they terminate through the JVM.

use std::ffi::c_void;
use std::os::raw::c_int;
use std::sync::atomic::{AtomicBool, Ordering};

use jni::objects::{JClass, JObject};
use jni::sys::{jint, jobject, JNIEnv as RawEnv, JavaVM, JNI_VERSION_1_6};
use jni::JNIEnv;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::bridge::NativeBridge;
use crate::config::{BridgeConfig, TraceOutput};
use crate::errors::{messages, MirrorError, Result};
use crate::jvm::binding::{BindingNames, UpCallBindings};
use crate::jvm::host::JniHost;
use crate::kind::ElementKind;
use crate::logging::init_logging;
use crate::mirror::RecoveryPoint;

struct Installed(NativeBridge<JniHost>);

// SAFETY: the tables hold JNI references that are only dereferenced through
// the env attached by the entry point currently holding the lock.
unsafe impl Send for Installed {}

static BRIDGE: Lazy<Mutex<Option<Installed>>> = Lazy::new(|| Mutex::new(None));

static EMBEDDED: AtomicBool = AtomicBool::new(false);

/// Run `f` against the installed bridge, terminating on any error.
fn with_bridge<T, F>(env: *mut RawEnv, f: F) -> T
where
    F: FnOnce(&mut NativeBridge<JniHost>) -> Result<T>,
{
    let mut guard = BRIDGE.lock();
    let bridge = match guard.as_mut() {
        Some(installed) => &mut installed.0,
        None => JniHost::fatal_with_env(env, messages::NOT_INITIALIZED),
    };
    if !env.is_null() {
        bridge.host_mut().set_env(env);
    }
    match f(&mut *bridge) {
        Ok(value) => value,
        Err(e) => bridge.fatal(&e),
    }
}

fn install(env: &mut JNIEnv, upcalls: &JObject) -> Result<()> {
    let mut config = BridgeConfig::from_env()?;
    if EMBEDDED.load(Ordering::Acquire) {
        config.embedded = true;
    }

    let bindings = UpCallBindings::bind(env, upcalls, BindingNames::default())?;
    let host = JniHost::new(env.get_raw(), bindings);
    if config.embedded && config.trace_output == TraceOutput::Console {
        config.trace_output = TraceOutput::Descriptor(host.trace_descriptor()?);
    }
    let level = init_logging(&config)?;

    let bridge = NativeBridge::new(host, config)?;
    log::info!("rffi bridge initialized, log level {}", level);
    *BRIDGE.lock() = Some(Installed(bridge));
    Ok(())
}

#[no_mangle]
pub extern "system" fn JNI_OnLoad(_vm: *mut JavaVM, _reserved: *mut c_void) -> jint {
    JNI_VERSION_1_6
}

/// Bind the managed up-calls and install the bridge. Replaces any bridge
/// installed earlier.
#[no_mangle]
pub extern "system" fn Java_com_oracle_truffle_r_ffi_impl_jni_JNIUpCallsRFFIImpl_initialize(
    mut env: JNIEnv,
    _class: JClass,
    upcalls: JObject,
) {
    if let Err(e) = install(&mut env, &upcalls) {
        JniHost::fatal_with_env(env.get_raw(), &e.to_string());
    }
}

/// Mark the process as embedded so trace output goes to the managed side's
/// descriptor. Must be called before initialization.
#[no_mangle]
pub extern "C" fn rffi_set_embedded() {
    EMBEDDED.store(true, Ordering::Release);
}

#[no_mangle]
pub extern "C" fn rffi_call_enter(env: *mut RawEnv, recovery: *mut c_void) {
    with_bridge(env, |bridge| bridge.enter_call(RecoveryPoint::from_ptr(recovery)).map(drop))
}

#[no_mangle]
pub extern "C" fn rffi_call_exit(env: *mut RawEnv) {
    with_bridge(env, |bridge| bridge.exit_call())
}

#[no_mangle]
pub extern "C" fn rffi_error_recovery_point() -> *mut c_void {
    with_bridge(std::ptr::null_mut(), |bridge| {
        bridge.current_recovery_point().map(RecoveryPoint::as_ptr)
    })
}

#[no_mangle]
pub extern "C" fn rffi_get_native_array(env: *mut RawEnv, x: jobject, kind: c_int) -> *mut c_void {
    with_bridge(env, |bridge| {
        let kind = ElementKind::from_code(kind)?;
        bridge.acquire(x, kind)
    })
}

#[no_mangle]
pub extern "C" fn rffi_invalidate_native_array(env: *mut RawEnv, x: jobject) {
    with_bridge(env, |bridge| bridge.invalidate(x).map(drop))
}

#[no_mangle]
pub extern "C" fn rffi_update_native_arrays(env: *mut RawEnv) {
    with_bridge(env, |bridge| bridge.refresh_all_in_current_frame())
}

#[no_mangle]
pub extern "C" fn rffi_update_jobjects(env: *mut RawEnv) {
    with_bridge(env, |bridge| bridge.push_back_all_in_current_frame())
}

#[no_mangle]
pub extern "C" fn rffi_update_jobject(env: *mut RawEnv, x: jobject) {
    with_bridge(env, |bridge| bridge.push_to_managed(x).map(drop))
}

#[no_mangle]
pub extern "C" fn rffi_create_global_ref(env: *mut RawEnv, obj: jobject, permanent: c_int) -> jobject {
    with_bridge(env, |bridge| bridge.create_global_ref(obj, permanent != 0))
}

#[no_mangle]
pub extern "C" fn rffi_release_global_ref(env: *mut RawEnv, obj: jobject) {
    with_bridge(env, |bridge| bridge.release_global_ref(obj).map(drop))
}

#[no_mangle]
pub extern "C" fn rffi_check_ref(env: *mut RawEnv, obj: jobject) -> jobject {
    with_bridge(env, |bridge| Ok(bridge.check_ref(obj)))
}

/// Element width in bytes for a vector kind code. Text has no fixed width.
#[no_mangle]
pub extern "C" fn rffi_type_size(kind: c_int) -> c_int {
    with_bridge(std::ptr::null_mut(), |_| {
        match ElementKind::from_code(kind)? {
            ElementKind::Char => Err(MirrorError::UnexpectedKind(
                "char has no element width".to_string(),
            )),
            other => Ok(other.native_width() as c_int),
        }
    })
}
