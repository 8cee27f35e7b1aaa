//! The seam between the bridge and a concrete managed runtime.
//!
//! The bridge itself only speaks to these traits. [`crate::jvm`] implements
//! them over JNI; [`crate::stub`] implements them in-process for tests and
//! dry runs.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::entry::EntryPoint;
use crate::error::{BridgeError, Fault};
use crate::natives::NativeMethod;

/// One place the locator will try to load the runtime library from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryCandidate {
    /// Bare library file name, resolved by the platform's search path.
    Name(String),
    /// Fully qualified path below an install root.
    Path(PathBuf),
}

impl fmt::Display for LibraryCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryCandidate::Name(name) => write!(f, "{name}"),
            LibraryCandidate::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Options passed to the runtime's creation entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmOptions {
    pub options: Vec<String>,
    /// Always false for sessions: an option the runtime does not know is a
    /// hard failure.
    pub ignore_unrecognized: bool,
}

impl VmOptions {
    pub fn for_session(boot_archive: &Path, disc_root: &Path, extra: &[String]) -> Self {
        let mut options = vec![
            format!("-Xbootclasspath/a:{}", boot_archive.display()),
            format!("-Dbluray.vfs.root={}", disc_root.display()),
        ];
        options.extend(extra.iter().cloned());
        Self {
            options,
            ignore_unrecognized: false,
        }
    }
}

/// Argument to an entry point call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Int(i32),
    Long(i64),
    Str(String),
}

/// Declared return type of an entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    Void,
    Boolean,
}

/// Value returned by an entry point call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    Void,
    Bool(bool),
}

impl Value {
    /// `false` for anything that is not a boolean `true`.
    pub fn as_bool(self) -> bool {
        matches!(self, Value::Bool(true))
    }
}

/// Opaque reference to a static method resolved by a [`VirtualMachine`].
///
/// Only meaningful for the machine that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodId(pub usize);

/// Finds and opens runtime libraries.
pub trait LibraryLoader: Send + Sync {
    /// Open the library at `candidate` and resolve its creation entry point.
    ///
    /// A library that opens but lacks the entry symbol must be released
    /// before this returns an error.
    fn load(&self, candidate: &LibraryCandidate) -> Result<Box<dyn RuntimeLibrary>, BridgeError>;
}

/// A loaded runtime library. Dropping it unloads the library.
pub trait RuntimeLibrary: Send + Sync {
    /// Where the library was loaded from.
    fn origin(&self) -> &LibraryCandidate;

    /// Create a runtime instance. The calling thread is attached to the new
    /// instance on success.
    fn create_vm(&self, options: &VmOptions) -> Result<Box<dyn VirtualMachine>, BridgeError>;
}

/// A created runtime instance.
///
/// Every instance must be torn down with [`VirtualMachine::destroy`] while
/// the library that created it is still loaded.
pub trait VirtualMachine: Send + Sync {
    /// Environment of the calling thread, if it is already attached.
    fn current_env(&self) -> Option<Box<dyn Environment + '_>>;

    /// Attach the calling thread. It stays attached until
    /// [`VirtualMachine::detach_current_thread`].
    fn attach_current_thread(&self) -> Result<Box<dyn Environment + '_>, BridgeError>;

    fn detach_current_thread(&self);

    fn destroy(self: Box<Self>) -> Result<(), BridgeError>;
}

/// A thread-local view of a runtime instance.
pub trait Environment {
    fn register_natives(&mut self, class: &str, methods: &[NativeMethod]) -> Result<(), BridgeError>;

    fn resolve_static(&mut self, entry: &EntryPoint) -> Result<MethodId, BridgeError>;

    /// Call a resolved static method inside its own local reference frame.
    ///
    /// A fault raised by the callee is left pending; collect it with
    /// [`Environment::take_fault`].
    fn call_static(&mut self, method: MethodId, args: &[Arg]) -> Result<Value, BridgeError>;

    /// Describe and clear the pending fault, if any.
    fn take_fault(&mut self) -> Option<Fault>;
}
