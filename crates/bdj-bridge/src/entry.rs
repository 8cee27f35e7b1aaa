//! Entry points the bridge calls inside the hosted program.
//!
//! Class names, method names, and signatures must match the hosted code
//! exactly.

use std::fmt;

use crate::runtime::ReturnKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPoint {
    /// Slash-separated binary class name.
    pub class: &'static str,
    pub name: &'static str,
    pub signature: &'static str,
    pub returns: ReturnKind,
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.class, self.name, self.signature)
    }
}

pub const LIBBLURAY_CLASS: &str = "org/videolan/Libbluray";
pub const LOADER_CLASS: &str = "org/videolan/BDJLoader";

/// `init(long handle, String discId)`
pub const INIT: EntryPoint = EntryPoint {
    class: LIBBLURAY_CLASS,
    name: "init",
    signature: "(JLjava/lang/String;)V",
    returns: ReturnKind::Void,
};

/// `load(int title) -> boolean`
pub const LOAD: EntryPoint = EntryPoint {
    class: LOADER_CLASS,
    name: "load",
    signature: "(I)Z",
    returns: ReturnKind::Boolean,
};

/// `unload() -> boolean`
pub const UNLOAD: EntryPoint = EntryPoint {
    class: LOADER_CLASS,
    name: "unload",
    signature: "()Z",
    returns: ReturnKind::Boolean,
};

pub const SHUTDOWN: EntryPoint = EntryPoint {
    class: LIBBLURAY_CLASS,
    name: "shutdown",
    signature: "()V",
    returns: ReturnKind::Void,
};

/// `processEvent(int code, int param)`
pub const PROCESS_EVENT: EntryPoint = EntryPoint {
    class: LIBBLURAY_CLASS,
    name: "processEvent",
    signature: "(II)V",
    returns: ReturnKind::Void,
};
