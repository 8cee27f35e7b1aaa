//! Native methods the hosted program calls back into.
//!
//! The bridge does not define the callbacks itself; callers assemble a
//! [`NativeTable`] and the session registers it during initialization.

use std::ffi::c_void;

use crate::runtime::Environment;

/// Raw function pointer implementing a native method.
///
/// It must follow the runtime's native calling convention for the declared
/// signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeFn(pub *mut c_void);

// SAFETY: a function pointer is immutable code; it carries no thread-bound
// state of its own.
unsafe impl Send for NativeFn {}
unsafe impl Sync for NativeFn {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeMethod {
    pub name: String,
    pub signature: String,
    pub fn_ptr: NativeFn,
}

#[derive(Debug, Clone, Default)]
pub struct NativeTable {
    classes: Vec<(String, Vec<NativeMethod>)>,
}

impl NativeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a method to `class`, keeping insertion order per class.
    pub fn with_method(
        mut self,
        class: impl Into<String>,
        name: impl Into<String>,
        signature: impl Into<String>,
        fn_ptr: NativeFn,
    ) -> Self {
        let class = class.into();
        let method = NativeMethod {
            name: name.into(),
            signature: signature.into(),
            fn_ptr,
        };
        match self.classes.iter_mut().find(|(c, _)| *c == class) {
            Some((_, methods)) => methods.push(method),
            None => self.classes.push((class, vec![method])),
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn classes(&self) -> impl Iterator<Item = (&str, &[NativeMethod])> {
        self.classes.iter().map(|(c, m)| (c.as_str(), m.as_slice()))
    }

    /// Register every class in the table. Failures are logged and skipped;
    /// returns whether all classes registered.
    pub fn register(&self, env: &mut dyn Environment) -> bool {
        let mut all = true;
        for (class, methods) in self.classes() {
            match env.register_natives(class, methods) {
                Ok(()) => {
                    tracing::debug!(class, count = methods.len(), "Registered native methods");
                }
                Err(e) => {
                    all = false;
                    let detail = env.take_fault().map(|f| f.description);
                    tracing::warn!(class, ?detail, "Couldn't register native methods: {e}");
                }
            }
        }
        all
    }
}
