use crate::entry::{self, EntryPoint};
use crate::error::BridgeError;
use crate::runtime::{Arg, Environment, MethodId, Value};

/// An entry point paired with the method reference its runtime resolved.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedEntry {
    pub entry: EntryPoint,
    pub method: MethodId,
}

/// The fixed set of entry points, resolved once per session.
#[derive(Debug, Clone, Copy)]
pub struct EntryPoints {
    pub init: ResolvedEntry,
    pub load: ResolvedEntry,
    pub unload: ResolvedEntry,
    pub shutdown: ResolvedEntry,
    pub process_event: ResolvedEntry,
}

impl EntryPoints {
    /// Resolve every entry point, failing on the first one that is missing.
    pub fn resolve(env: &mut dyn Environment) -> Result<Self, BridgeError> {
        Ok(Self {
            init: resolve(env, &entry::INIT)?,
            load: resolve(env, &entry::LOAD)?,
            unload: resolve(env, &entry::UNLOAD)?,
            shutdown: resolve(env, &entry::SHUTDOWN)?,
            process_event: resolve(env, &entry::PROCESS_EVENT)?,
        })
    }
}

/// Look up a static entry point.
///
/// A failed lookup never leaves a fault pending in the runtime.
pub fn resolve(env: &mut dyn Environment, entry: &EntryPoint) -> Result<ResolvedEntry, BridgeError> {
    match env.resolve_static(entry) {
        Ok(method) => {
            tracing::trace!(entry = %entry, "Resolved entry point");
            Ok(ResolvedEntry {
                entry: *entry,
                method,
            })
        }
        Err(e) => {
            let detail = match env.take_fault() {
                Some(fault) => format!("{entry}: {fault}"),
                None => format!("{entry}: {e}"),
            };
            tracing::warn!(entry = %entry, "Entry point not found: {detail}");
            Err(BridgeError::BridgeFailure(detail))
        }
    }
}

/// Call a resolved entry point.
///
/// Any fault the callee raises is described, cleared, and reported as
/// [`BridgeError::RuntimeFault`]; it never stays pending for a later call.
pub fn invoke(
    env: &mut dyn Environment,
    resolved: &ResolvedEntry,
    args: &[Arg],
) -> Result<Value, BridgeError> {
    tracing::trace!(entry = %resolved.entry, ?args, "Invoking entry point");

    let result = env.call_static(resolved.method, args);

    if let Some(fault) = env.take_fault() {
        tracing::warn!(entry = %resolved.entry, fault = %fault, "Hosted program raised during call");
        return Err(BridgeError::RuntimeFault {
            entry: resolved.entry.to_string(),
            fault,
        });
    }

    result
}
