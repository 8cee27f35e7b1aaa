//! In-process stand-in for a managed runtime.
//!
//! [`StubLoader`] behaves like a runtime library loader whose hosted program
//! answers every entry point deterministically. It records what the bridge
//! does to it (loads, attaches, calls, teardown order) so tests can assert
//! on the lifecycle without a real VM, and it backs `--stub` dry runs.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::ThreadId;
use std::time::Duration;

use parking_lot::Mutex;

use crate::entry::EntryPoint;
use crate::error::{BridgeError, Fault};
use crate::locator::CREATE_SYMBOL;
use crate::natives::NativeMethod;
use crate::runtime::{
    Arg, Environment, LibraryCandidate, LibraryLoader, MethodId, RuntimeLibrary, Value,
    VirtualMachine, VmOptions,
};

/// One call the hosted program received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubCall {
    pub class: String,
    pub name: String,
    pub args: Vec<Arg>,
    pub thread: ThreadId,
}

#[derive(Debug)]
struct Behavior {
    library_present: bool,
    create_symbol_present: bool,
    accept_only: Option<LibraryCandidate>,
    creation_fails: bool,
    natives_fail: bool,
    missing_entries: HashSet<String>,
    faults: Vec<(String, String)>,
    load_result: bool,
    unload_result: bool,
    call_delay: Option<Duration>,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            library_present: true,
            create_symbol_present: true,
            accept_only: None,
            creation_fails: false,
            natives_fail: false,
            missing_entries: HashSet::new(),
            faults: Vec::new(),
            load_result: true,
            unload_result: true,
            call_delay: None,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    behavior: Mutex<Behavior>,
    load_attempts: Mutex<Vec<LibraryCandidate>>,
    created_with: Mutex<Option<VmOptions>>,
    registered: Mutex<Vec<(String, String)>>,
    resolved: Mutex<Vec<EntryPoint>>,
    calls: Mutex<Vec<StubCall>>,
    log: Mutex<Vec<String>>,
    attached: Mutex<HashSet<ThreadId>>,
    pending_fault: Mutex<Option<Fault>>,
    live_libraries: AtomicUsize,
    live_vms: AtomicUsize,
    attaches: AtomicUsize,
    detaches: AtomicUsize,
    in_flight: AtomicUsize,
    destroyed: AtomicBool,
    violations: Mutex<Vec<String>>,
}

impl State {
    fn record(&self, event: impl Into<String>) {
        self.log.lock().push(event.into());
    }

    fn violation(&self, what: impl Into<String>) {
        let what = what.into();
        tracing::error!(violation = %what, "Stub runtime contract violated");
        self.violations.lock().push(what);
    }

    fn current_thread_attached(&self) -> bool {
        self.attached.lock().contains(&std::thread::current().id())
    }
}

/// Shared handle to a stub hosted program: configure it before opening a
/// session, inspect it afterwards.
#[derive(Debug, Clone, Default)]
pub struct StubProgram {
    state: Arc<State>,
}

impl StubProgram {
    pub fn set_library_present(&self, present: bool) {
        self.state.behavior.lock().library_present = present;
    }

    pub fn set_create_symbol_present(&self, present: bool) {
        self.state.behavior.lock().create_symbol_present = present;
    }

    /// Only `candidate` will load; every other location fails.
    pub fn accept_only(&self, candidate: LibraryCandidate) {
        self.state.behavior.lock().accept_only = Some(candidate);
    }

    /// Make runtime creation reject its options.
    pub fn set_creation_fails(&self, fails: bool) {
        self.state.behavior.lock().creation_fails = fails;
    }

    pub fn set_natives_fail(&self, fails: bool) {
        self.state.behavior.lock().natives_fail = fails;
    }

    /// Make the entry point with this method name unresolvable.
    pub fn remove_entry(&self, name: &str) {
        self.state.behavior.lock().missing_entries.insert(name.to_string());
    }

    /// Raise `description` every time the method `name` is called.
    pub fn fault_on(&self, name: &str, description: &str) {
        self.state
            .behavior
            .lock()
            .faults
            .push((name.to_string(), description.to_string()));
    }

    pub fn set_load_result(&self, result: bool) {
        self.state.behavior.lock().load_result = result;
    }

    pub fn set_unload_result(&self, result: bool) {
        self.state.behavior.lock().unload_result = result;
    }

    /// Make every hosted call block for `delay`.
    pub fn set_call_delay(&self, delay: Duration) {
        self.state.behavior.lock().call_delay = Some(delay);
    }

    pub fn load_attempts(&self) -> Vec<LibraryCandidate> {
        self.state.load_attempts.lock().clone()
    }

    pub fn created_with(&self) -> Option<VmOptions> {
        self.state.created_with.lock().clone()
    }

    /// `(class, method)` pairs registered as natives.
    pub fn registered_natives(&self) -> Vec<(String, String)> {
        self.state.registered.lock().clone()
    }

    pub fn calls(&self) -> Vec<StubCall> {
        self.state.calls.lock().clone()
    }

    /// Arguments of every call to the method `name`, in order.
    pub fn calls_to(&self, name: &str) -> Vec<Vec<Arg>> {
        self.state
            .calls
            .lock()
            .iter()
            .filter(|c| c.name == name)
            .map(|c| c.args.clone())
            .collect()
    }

    /// Lifecycle events in the order they happened, e.g.
    /// `["load-library", "create-vm", "call:init", ...]`.
    pub fn log(&self) -> Vec<String> {
        self.state.log.lock().clone()
    }

    pub fn live_libraries(&self) -> usize {
        self.state.live_libraries.load(Ordering::SeqCst)
    }

    pub fn live_vms(&self) -> usize {
        self.state.live_vms.load(Ordering::SeqCst)
    }

    pub fn attach_count(&self) -> usize {
        self.state.attaches.load(Ordering::SeqCst)
    }

    pub fn detach_count(&self) -> usize {
        self.state.detaches.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> bool {
        self.state.destroyed.load(Ordering::SeqCst)
    }

    pub fn fault_pending(&self) -> bool {
        self.state.pending_fault.lock().is_some()
    }

    /// Contract breaches observed so far: calls on a destroyed instance,
    /// destruction during a call, unloading before destruction, calls from
    /// unattached threads.
    pub fn violations(&self) -> Vec<String> {
        self.state.violations.lock().clone()
    }
}

pub struct StubLoader {
    program: StubProgram,
}

impl StubLoader {
    pub fn new(program: StubProgram) -> Self {
        Self { program }
    }
}

impl LibraryLoader for StubLoader {
    fn load(&self, candidate: &LibraryCandidate) -> Result<Box<dyn RuntimeLibrary>, BridgeError> {
        let state = &self.program.state;
        state.load_attempts.lock().push(candidate.clone());

        let (present, symbol, accepted) = {
            let behavior = state.behavior.lock();
            let accepted = behavior
                .accept_only
                .as_ref()
                .is_none_or(|only| only == candidate);
            (behavior.library_present, behavior.create_symbol_present, accepted)
        };
        if !present || !accepted {
            return Err(BridgeError::ResourceNotFound(format!(
                "{candidate}: cannot open shared object file"
            )));
        }

        state.live_libraries.fetch_add(1, Ordering::SeqCst);
        state.record("load-library");
        let library = StubLibrary {
            state: Arc::clone(state),
            origin: candidate.clone(),
        };

        if !symbol {
            drop(library);
            return Err(BridgeError::ResourceNotFound(format!(
                "{CREATE_SYMBOL} not found in {candidate}"
            )));
        }
        Ok(Box::new(library))
    }
}

struct StubLibrary {
    state: Arc<State>,
    origin: LibraryCandidate,
}

impl RuntimeLibrary for StubLibrary {
    fn origin(&self) -> &LibraryCandidate {
        &self.origin
    }

    fn create_vm(&self, options: &VmOptions) -> Result<Box<dyn VirtualMachine>, BridgeError> {
        *self.state.created_with.lock() = Some(options.clone());

        if self.state.behavior.lock().creation_fails {
            return Err(BridgeError::InitializationFailure(
                "JNI_CreateJavaVM returned -6".into(),
            ));
        }
        if !options.ignore_unrecognized {
            if let Some(bad) = options
                .options
                .iter()
                .find(|o| !(o.starts_with("-X") || o.starts_with("-D")))
            {
                return Err(BridgeError::InitializationFailure(format!(
                    "unrecognized option: {bad}"
                )));
            }
        }

        self.state.live_vms.fetch_add(1, Ordering::SeqCst);
        self.state
            .attached
            .lock()
            .insert(std::thread::current().id());
        self.state.record("create-vm");
        Ok(Box::new(StubVm {
            state: Arc::clone(&self.state),
        }))
    }
}

impl Drop for StubLibrary {
    fn drop(&mut self) {
        if self.state.live_vms.load(Ordering::SeqCst) > 0 {
            self.state.violation("library unloaded while an instance is alive");
        }
        self.state.live_libraries.fetch_sub(1, Ordering::SeqCst);
        self.state.record("unload-library");
    }
}

struct StubVm {
    state: Arc<State>,
}

impl VirtualMachine for StubVm {
    fn current_env(&self) -> Option<Box<dyn Environment + '_>> {
        if self.state.current_thread_attached() {
            Some(Box::new(StubEnv { vm: self }))
        } else {
            None
        }
    }

    fn attach_current_thread(&self) -> Result<Box<dyn Environment + '_>, BridgeError> {
        self.state
            .attached
            .lock()
            .insert(std::thread::current().id());
        self.state.attaches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubEnv { vm: self }))
    }

    fn detach_current_thread(&self) {
        self.state
            .attached
            .lock()
            .remove(&std::thread::current().id());
        self.state.detaches.fetch_add(1, Ordering::SeqCst);
    }

    fn destroy(self: Box<Self>) -> Result<(), BridgeError> {
        if self.state.in_flight.load(Ordering::SeqCst) > 0 {
            self.state.violation("instance destroyed during a call");
        }
        if self.state.live_libraries.load(Ordering::SeqCst) == 0 {
            self.state.violation("instance destroyed after its library was unloaded");
        }
        self.state.destroyed.store(true, Ordering::SeqCst);
        self.state.live_vms.fetch_sub(1, Ordering::SeqCst);
        self.state.attached.lock().clear();
        self.state.record("destroy-vm");
        Ok(())
    }
}

struct StubEnv<'vm> {
    vm: &'vm StubVm,
}

impl StubEnv<'_> {
    fn raise(&self, description: String) {
        *self.vm.state.pending_fault.lock() = Some(Fault::new(description));
    }
}

impl Environment for StubEnv<'_> {
    fn register_natives(&mut self, class: &str, methods: &[NativeMethod]) -> Result<(), BridgeError> {
        if self.vm.state.behavior.lock().natives_fail {
            self.raise(format!("java.lang.NoClassDefFoundError: {class}"));
            return Err(BridgeError::BridgeFailure(format!("RegisterNatives failed for {class}")));
        }
        let mut registered = self.vm.state.registered.lock();
        for method in methods {
            registered.push((class.to_string(), method.name.clone()));
        }
        Ok(())
    }

    fn resolve_static(&mut self, entry: &EntryPoint) -> Result<MethodId, BridgeError> {
        if self.vm.state.behavior.lock().missing_entries.contains(entry.name) {
            self.raise(format!("java.lang.NoSuchMethodError: {}", entry.name));
            return Err(BridgeError::BridgeFailure(format!("{entry} not found")));
        }
        let mut resolved = self.vm.state.resolved.lock();
        resolved.push(*entry);
        Ok(MethodId(resolved.len() - 1))
    }

    fn call_static(&mut self, method: MethodId, args: &[Arg]) -> Result<Value, BridgeError> {
        let state = &self.vm.state;
        let entry = state
            .resolved
            .lock()
            .get(method.0)
            .copied()
            .ok_or_else(|| BridgeError::BridgeFailure(format!("unknown method id {}", method.0)))?;

        if state.destroyed.load(Ordering::SeqCst) {
            state.violation(format!("{entry} called on a destroyed instance"));
        }
        if !state.current_thread_attached() {
            state.violation(format!("{entry} called from an unattached thread"));
        }

        state.in_flight.fetch_add(1, Ordering::SeqCst);
        let (delay, fault, value) = {
            let behavior = state.behavior.lock();
            let fault = behavior
                .faults
                .iter()
                .find(|(name, _)| name == entry.name)
                .map(|(_, description)| description.clone());
            let value = match entry.name {
                "load" => Value::Bool(behavior.load_result),
                "unload" => Value::Bool(behavior.unload_result),
                _ => Value::Void,
            };
            (behavior.call_delay, fault, value)
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        tracing::debug!(entry = %entry, ?args, "Stub program called");
        state.calls.lock().push(StubCall {
            class: entry.class.to_string(),
            name: entry.name.to_string(),
            args: args.to_vec(),
            thread: std::thread::current().id(),
        });
        state.record(format!("call:{}", entry.name));
        state.in_flight.fetch_sub(1, Ordering::SeqCst);

        match fault {
            Some(description) => {
                self.raise(description);
                Err(BridgeError::BridgeFailure("exception thrown by callee".into()))
            }
            None => Ok(value),
        }
    }

    fn take_fault(&mut self) -> Option<Fault> {
        self.vm.state.pending_fault.lock().take()
    }
}
