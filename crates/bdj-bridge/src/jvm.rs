//! JNI backend: loads a JVM shared library and talks to it through the
//! invocation API.

use std::ffi::{CString, c_char, c_void};
use std::ptr;

use jni::objects::{GlobalRef, JClass, JStaticMethodID, JString, JThrowable, JValue};
use jni::signature::{Primitive, ReturnType};
use jni::{JNIEnv, JavaVM, sys};
use libloading::Library;
use parking_lot::Mutex;

use crate::entry::EntryPoint;
use crate::error::{BridgeError, Fault};
use crate::locator::CREATE_SYMBOL;
use crate::natives::NativeMethod;
use crate::runtime::{
    Arg, Environment, LibraryCandidate, LibraryLoader, MethodId, ReturnKind, RuntimeLibrary, Value,
    VirtualMachine, VmOptions,
};

/// Local references a single bridge call may create before its frame is
/// popped.
const LOCAL_FRAME_CAPACITY: i32 = 16;

type CreateJavaVm =
    unsafe extern "system" fn(*mut *mut sys::JavaVM, *mut *mut c_void, *mut c_void) -> sys::jint;

/// Loads JVM shared libraries with the platform dynamic loader.
pub struct JniLoader;

impl LibraryLoader for JniLoader {
    fn load(&self, candidate: &LibraryCandidate) -> Result<Box<dyn RuntimeLibrary>, BridgeError> {
        // SAFETY: loading a JVM runs its initializers, which have no
        // preconditions on our side.
        let library = unsafe {
            match candidate {
                LibraryCandidate::Name(name) => Library::new(name),
                LibraryCandidate::Path(path) => Library::new(path),
            }
        }
        .map_err(|e| BridgeError::ResourceNotFound(format!("{candidate}: {e}")))?;

        // SAFETY: JNI_CreateJavaVM has this signature in every JNI version.
        let create = unsafe { library.get::<CreateJavaVm>(b"JNI_CreateJavaVM\0") }
            .map(|symbol| *symbol)
            .map_err(|e| {
                BridgeError::ResourceNotFound(format!("{CREATE_SYMBOL} not found in {candidate}: {e}"))
            })?;

        Ok(Box::new(JniLibrary {
            create,
            _library: library,
            origin: candidate.clone(),
        }))
    }
}

struct JniLibrary {
    // Only valid while `_library` stays loaded.
    create: CreateJavaVm,
    _library: Library,
    origin: LibraryCandidate,
}

impl RuntimeLibrary for JniLibrary {
    fn origin(&self) -> &LibraryCandidate {
        &self.origin
    }

    fn create_vm(&self, options: &VmOptions) -> Result<Box<dyn VirtualMachine>, BridgeError> {
        let strings = options
            .options
            .iter()
            .map(|o| {
                CString::new(o.as_str()).map_err(|_| {
                    BridgeError::InitializationFailure(format!("option contains NUL: {o:?}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut raw_options: Vec<sys::JavaVMOption> = strings
            .iter()
            .map(|s| sys::JavaVMOption {
                optionString: s.as_ptr() as *mut c_char,
                extraInfo: ptr::null_mut(),
            })
            .collect();

        let mut args = sys::JavaVMInitArgs {
            version: sys::JNI_VERSION_1_4,
            nOptions: raw_options.len() as sys::jint,
            options: raw_options.as_mut_ptr(),
            ignoreUnrecognized: if options.ignore_unrecognized {
                sys::JNI_TRUE
            } else {
                sys::JNI_FALSE
            },
        };

        let mut vm: *mut sys::JavaVM = ptr::null_mut();
        let mut env: *mut c_void = ptr::null_mut();

        // SAFETY: `args`, `raw_options` and `strings` outlive the call, and
        // the library holding `create` is still loaded.
        let status = unsafe {
            (self.create)(
                &mut vm,
                &mut env,
                &mut args as *mut sys::JavaVMInitArgs as *mut c_void,
            )
        };

        if status != sys::JNI_OK || vm.is_null() || env.is_null() {
            return Err(BridgeError::InitializationFailure(format!(
                "{CREATE_SYMBOL} returned {status}"
            )));
        }

        // SAFETY: `vm` was just produced by a successful JNI_CreateJavaVM.
        let vm = unsafe { JavaVM::from_raw(vm) }?;
        tracing::debug!(library = %self.origin, "Java VM created");

        Ok(Box::new(JniVm {
            vm,
            methods: Mutex::new(Vec::new()),
        }))
    }
}

struct ResolvedMethod {
    class: GlobalRef,
    id: JStaticMethodID,
    returns: ReturnKind,
}

struct JniVm {
    vm: JavaVM,
    methods: Mutex<Vec<ResolvedMethod>>,
}

impl JniVm {
    fn raw(&self) -> *mut sys::JavaVM {
        self.vm.get_java_vm_pointer()
    }
}

impl VirtualMachine for JniVm {
    fn current_env(&self) -> Option<Box<dyn Environment + '_>> {
        let env = self.vm.get_env().ok()?;
        Some(Box::new(JniEnvironment { vm: self, env }))
    }

    fn attach_current_thread(&self) -> Result<Box<dyn Environment + '_>, BridgeError> {
        let raw = self.raw();
        let mut env: *mut c_void = ptr::null_mut();

        // SAFETY: `raw` points at a live VM whose invoke table is immutable.
        let status = unsafe {
            match (**raw).AttachCurrentThread {
                Some(attach) => attach(raw, &mut env, ptr::null_mut()),
                None => sys::JNI_ERR,
            }
        };
        if status != sys::JNI_OK || env.is_null() {
            return Err(BridgeError::BridgeFailure(format!(
                "AttachCurrentThread returned {status}"
            )));
        }

        // SAFETY: `env` was produced for the current thread just above.
        let env = unsafe { JNIEnv::from_raw(env as *mut sys::JNIEnv) }?;
        Ok(Box::new(JniEnvironment { vm: self, env }))
    }

    fn detach_current_thread(&self) {
        let raw = self.raw();
        // SAFETY: as in `attach_current_thread`; the caller attached this thread.
        let status = unsafe {
            match (**raw).DetachCurrentThread {
                Some(detach) => detach(raw),
                None => sys::JNI_ERR,
            }
        };
        if status != sys::JNI_OK {
            tracing::warn!(status, "DetachCurrentThread failed");
        }
    }

    fn destroy(self: Box<Self>) -> Result<(), BridgeError> {
        // Global references must be released while the VM still exists.
        self.methods.lock().clear();

        let raw = self.raw();
        // SAFETY: the VM is live and nothing uses it after this call.
        let status = unsafe {
            match (**raw).DestroyJavaVM {
                Some(destroy) => destroy(raw),
                None => sys::JNI_ERR,
            }
        };
        if status != sys::JNI_OK {
            return Err(BridgeError::BridgeFailure(format!(
                "DestroyJavaVM returned {status}"
            )));
        }
        Ok(())
    }
}

struct JniEnvironment<'vm> {
    vm: &'vm JniVm,
    env: JNIEnv<'vm>,
}

impl Environment for JniEnvironment<'_> {
    fn register_natives(&mut self, class: &str, methods: &[NativeMethod]) -> Result<(), BridgeError> {
        let natives: Vec<jni::NativeMethod> = methods
            .iter()
            .map(|m| jni::NativeMethod {
                name: m.name.as_str().into(),
                sig: m.signature.as_str().into(),
                fn_ptr: m.fn_ptr.0,
            })
            .collect();

        self.env
            .with_local_frame(LOCAL_FRAME_CAPACITY, |env| -> Result<(), BridgeError> {
                let class = env.find_class(class)?;
                env.register_native_methods(&class, &natives)?;
                Ok(())
            })
    }

    fn resolve_static(&mut self, entry: &EntryPoint) -> Result<MethodId, BridgeError> {
        let (class, id) = self
            .env
            .with_local_frame(LOCAL_FRAME_CAPACITY, |env| -> Result<_, BridgeError> {
                let class = env.find_class(entry.class)?;
                let id = env.get_static_method_id(&class, entry.name, entry.signature)?;
                let global = env.new_global_ref(&class)?;
                Ok((global, id))
            })?;

        let mut methods = self.vm.methods.lock();
        methods.push(ResolvedMethod {
            class,
            id,
            returns: entry.returns,
        });
        Ok(MethodId(methods.len() - 1))
    }

    fn call_static(&mut self, method: MethodId, args: &[Arg]) -> Result<Value, BridgeError> {
        let (class, id, returns) = {
            let methods = self.vm.methods.lock();
            let resolved = methods.get(method.0).ok_or_else(|| {
                BridgeError::BridgeFailure(format!("unknown method id {}", method.0))
            })?;
            (resolved.class.clone(), resolved.id, resolved.returns)
        };

        self.env
            .with_local_frame(LOCAL_FRAME_CAPACITY, |env| -> Result<Value, BridgeError> {
                let mut strings: Vec<JString> = Vec::new();
                let mut raw = Vec::with_capacity(args.len());
                for arg in args {
                    raw.push(match arg {
                        Arg::Int(v) => JValue::Int(*v).as_jni(),
                        Arg::Long(v) => JValue::Long(*v).as_jni(),
                        Arg::Str(s) => {
                            let string = env.new_string(s)?;
                            let value = JValue::Object(&string).as_jni();
                            strings.push(string);
                            value
                        }
                    });
                }

                let ret = match returns {
                    ReturnKind::Void => ReturnType::Primitive(Primitive::Void),
                    ReturnKind::Boolean => ReturnType::Primitive(Primitive::Boolean),
                };
                let jclass: &JClass = class.as_obj().into();

                // SAFETY: `id` was resolved on `jclass` with the signature that
                // `raw` and `ret` were built from.
                let result = unsafe { env.call_static_method_unchecked(jclass, id, ret, &raw) }?;

                Ok(match returns {
                    ReturnKind::Void => Value::Void,
                    ReturnKind::Boolean => Value::Bool(result.z()?),
                })
            })
    }

    fn take_fault(&mut self) -> Option<Fault> {
        if !self.env.exception_check().unwrap_or(false) {
            return None;
        }
        let throwable = self.env.exception_occurred().ok();
        if let Err(e) = self.env.exception_clear() {
            tracing::warn!("ExceptionClear failed: {e}");
        }

        let description = throwable
            .and_then(|t| describe(&mut self.env, t))
            .unwrap_or_else(|| "unknown exception".to_string());
        Some(Fault::new(description))
    }
}

/// `Throwable.toString()`, with every local reference released.
fn describe(env: &mut JNIEnv, throwable: JThrowable) -> Option<String> {
    let text = env
        .call_method(&throwable, "toString", "()Ljava/lang/String;", &[])
        .and_then(|v| v.l());
    let _ = env.delete_local_ref(throwable);

    let text = JString::from(text.ok()?);
    let description = env.get_string(&text).ok().map(String::from);
    let _ = env.delete_local_ref(text);

    // toString itself may have thrown.
    if env.exception_check().unwrap_or(false) {
        let _ = env.exception_clear();
    }
    description
}
