use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::bridge::with_environment;
use crate::config::BridgeConfig;
use crate::disc_id::DiscIdentity;
use crate::entry;
use crate::error::BridgeError;
use crate::event::{self, EventCode};
use crate::invoker::{self, EntryPoints, ResolvedEntry};
use crate::locator;
use crate::natives::NativeTable;
use crate::resources;
use crate::runtime::{Arg, LibraryLoader, RuntimeLibrary, VirtualMachine, VmOptions};

/// Sink for graphics the hosted program draws.
pub trait OverlaySink: Send + Sync {
    /// `argb` holds the pixels of the dirty rectangle `(x0, y0)..=(x1, y1)`.
    fn draw(&self, argb: &[u32], x0: i32, y0: i32, x1: i32, y1: i32);
}

/// Caller-owned collaborators reachable from native callbacks.
///
/// The session only borrows these; `'h` keeps it from outliving them.
#[derive(Clone, Copy)]
pub struct Host<'h> {
    pub player: &'h (dyn Any + Send + Sync),
    pub registers: &'h (dyn Any + Send + Sync),
    pub navigation: &'h (dyn Any + Send + Sync),
    pub overlay: Option<&'h dyn OverlaySink>,
    pub frame_buffer: Option<&'h (dyn Any + Send + Sync)>,
}

impl Host<'static> {
    /// A host with no collaborators attached.
    pub fn detached() -> Self {
        Self {
            player: &(),
            registers: &(),
            navigation: &(),
            overlay: None,
            frame_buffer: None,
        }
    }
}

impl fmt::Debug for Host<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("overlay", &self.overlay.is_some())
            .field("frame_buffer", &self.frame_buffer.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Loading,
    Ready,
    Running,
    Stopped,
    ShuttingDown,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Loading => "loading",
            SessionState::Ready => "ready",
            SessionState::Running => "running",
            SessionState::Stopped => "stopped",
            SessionState::ShuttingDown => "shutting down",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

struct Inner {
    state: SessionState,
    // Dropped strictly before `library`; see `Session::close`.
    vm: Option<Box<dyn VirtualMachine>>,
    library: Option<Box<dyn RuntimeLibrary>>,
    entries: Option<EntryPoints>,
}

impl Inner {
    fn live(&self) -> Result<(&dyn VirtualMachine, &EntryPoints), BridgeError> {
        match (self.state, self.vm.as_deref(), self.entries.as_ref()) {
            (
                SessionState::Ready | SessionState::Running | SessionState::Stopped,
                Some(vm),
                Some(entries),
            ) => Ok((vm, entries)),
            (state, ..) => Err(BridgeError::BridgeFailure(format!("session is {state}"))),
        }
    }

    fn call_boolean(
        &self,
        pick: impl FnOnce(&EntryPoints) -> ResolvedEntry,
        args: &[Arg],
    ) -> Result<(), BridgeError> {
        let (vm, entries) = self.live()?;
        let resolved = pick(entries);
        let value = with_environment(vm, |env| invoker::invoke(env, &resolved, args))?;
        if value.as_bool() {
            Ok(())
        } else {
            Err(BridgeError::Rejected {
                entry: resolved.entry.to_string(),
            })
        }
    }
}

/// One runtime instance bound to one disc.
///
/// # Threading
///
/// `Session` is `Send + Sync`. [`start`](Self::start), [`stop`](Self::stop),
/// [`process_event`](Self::process_event), [`process_raw_event`](Self::process_raw_event),
/// [`close`](Self::close) and [`state`](Self::state) take a session-wide
/// lock, so teardown never overlaps a call in flight and nothing is
/// dispatched once teardown has begun. The lock is not re-entrant: native
/// callbacks must not call any of these methods, including `state`; they
/// reach the caller's collaborators through [`host`](Self::host), which
/// does not lock.
pub struct Session<'h> {
    disc_root: &'h Path,
    host: Host<'h>,
    boot_archive: PathBuf,
    inner: Mutex<Inner>,
}

impl<'h> Session<'h> {
    /// Open a session using the backend selected by `config`.
    pub fn open(
        disc_root: &'h Path,
        host: Host<'h>,
        config: &BridgeConfig,
    ) -> Result<Box<Self>, BridgeError> {
        let loader = config.build_loader();
        Self::open_with(disc_root, host, config, loader.as_ref(), &NativeTable::new())
    }

    /// Load the runtime, create an instance, and initialize the hosted
    /// program.
    ///
    /// The session is boxed so that its address, handed to the hosted
    /// program as a correlation handle, stays fixed. On failure everything
    /// acquired so far has been released.
    pub fn open_with(
        disc_root: &'h Path,
        host: Host<'h>,
        config: &BridgeConfig,
        loader: &dyn LibraryLoader,
        natives: &NativeTable,
    ) -> Result<Box<Self>, BridgeError> {
        tracing::debug!(disc_root = %disc_root.display(), "Opening BD-J session");

        let library = locator::load_runtime_library(&config.runtime, loader)?;
        let boot_archive = resources::find_boot_archive(&config.boot);

        let session = Box::new(Self {
            disc_root,
            host,
            boot_archive,
            inner: Mutex::new(Inner {
                state: SessionState::Loading,
                vm: None,
                library: Some(library),
                entries: None,
            }),
        });

        if let Err(e) = session.create_and_initialize(config, natives) {
            tracing::error!("Failed to open BD-J session: {e}");
            session.close();
            return Err(e);
        }

        tracing::info!(
            disc_root = %disc_root.display(),
            boot_archive = %session.boot_archive.display(),
            "BD-J session ready"
        );
        Ok(session)
    }

    fn create_and_initialize(
        &self,
        config: &BridgeConfig,
        natives: &NativeTable,
    ) -> Result<(), BridgeError> {
        let mut inner = self.inner.lock();

        let options =
            VmOptions::for_session(&self.boot_archive, self.disc_root, &config.vm.extra_options);
        let vm = match &inner.library {
            Some(library) => library.create_vm(&options)?,
            None => return Err(BridgeError::ResourceNotFound("runtime library released".into())),
        };
        tracing::debug!(options = ?options.options, "Runtime instance created");
        inner.vm = Some(vm);

        let entries = self.initialize(&inner, natives)?;
        inner.entries = Some(entries);
        inner.state = SessionState::Ready;
        Ok(())
    }

    fn initialize(&self, inner: &Inner, natives: &NativeTable) -> Result<EntryPoints, BridgeError> {
        let vm = inner
            .vm
            .as_deref()
            .ok_or_else(|| BridgeError::BridgeFailure("no runtime instance".into()))?;
        let handle = self.handle();

        with_environment(vm, |env| {
            if natives.is_empty() {
                tracing::debug!("No native methods to register");
            } else if !natives.register(env) {
                tracing::warn!("Some native methods were not registered");
            }

            let entries = EntryPoints::resolve(env)?;

            let disc_id = DiscIdentity::disc_id_or_zero(self.disc_root);
            tracing::debug!(disc_id = %disc_id, "Initializing hosted program");

            match invoker::invoke(env, &entries.init, &[Arg::Long(handle), Arg::Str(disc_id)]) {
                // A fault inside init is already logged; the program is up.
                Ok(_) => {}
                Err(e) if e.is_fault() => {}
                Err(e) => return Err(e),
            }
            Ok(entries)
        })
    }

    /// Load and start `title` in the hosted program.
    ///
    /// The hosted loader takes a Java `int`; titles above `i32::MAX` are
    /// rejected with [`BridgeError::InvalidTitle`] before anything is
    /// dispatched.
    pub fn start(&self, title: u32) -> Result<(), BridgeError> {
        tracing::debug!(title, "Starting title");
        let java_title = i32::try_from(title).map_err(|_| {
            tracing::warn!(title, "Rejecting out-of-range title");
            BridgeError::InvalidTitle(title)
        })?;
        let mut inner = self.inner.lock();

        let result = inner.call_boolean(|e| e.load, &[Arg::Int(java_title)]);
        match &result {
            Ok(()) => {
                inner.state = SessionState::Running;
                tracing::info!(title, "Title started");
            }
            Err(e) => tracing::warn!(title, "Title did not start: {e}"),
        }
        result
    }

    /// Unload whatever the hosted program is running.
    pub fn stop(&self) -> Result<(), BridgeError> {
        tracing::debug!("Stopping title");
        let mut inner = self.inner.lock();

        let result = inner.call_boolean(|e| e.unload, &[]);
        match &result {
            Ok(()) => {
                inner.state = SessionState::Stopped;
                tracing::info!("Title stopped");
            }
            Err(e) => tracing::warn!("Title did not stop: {e}"),
        }
        result
    }

    /// Relay a playback event. Never fails; undeliverable events are logged.
    pub fn process_event(&self, event: EventCode, param: u32) {
        let inner = self.inner.lock();
        match inner.live() {
            Ok((vm, entries)) => event::relay(vm, &entries.process_event, event, param),
            Err(e) => tracing::debug!(event = %event, param, "Dropping event: {e}"),
        }
    }

    /// Relay an event given as a raw code.
    ///
    /// A code outside [`EventCode`] is a contract violation: nothing is
    /// dispatched and [`BridgeError::InvalidEvent`] is returned.
    pub fn process_raw_event(&self, code: u32, param: u32) -> Result<(), BridgeError> {
        let event = EventCode::try_from(code).inspect_err(|_| {
            tracing::warn!(code, param, "Rejecting unknown event code");
        })?;
        self.process_event(event, param);
        Ok(())
    }

    /// Tear the session down. Safe to call more than once.
    ///
    /// Waits for any call in flight, notifies the hosted program, destroys
    /// the runtime instance, and only then unloads the library.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Closed {
            return;
        }

        tracing::debug!(state = %inner.state, "Closing BD-J session");
        inner.state = SessionState::ShuttingDown;

        let shutdown = inner.entries.take().map(|e| e.shutdown);
        if let Some(vm) = inner.vm.take() {
            let notified = with_environment(vm.as_ref(), |env| {
                let resolved = match shutdown {
                    Some(resolved) => resolved,
                    None => invoker::resolve(env, &entry::SHUTDOWN)?,
                };
                invoker::invoke(env, &resolved, &[])
            });
            if let Err(e) = notified {
                tracing::debug!("Shutdown notification failed: {e}");
            }

            match vm.destroy() {
                Ok(()) => tracing::debug!("Runtime instance destroyed"),
                Err(e) => tracing::warn!("Failed to destroy runtime instance: {e}"),
            }
        }

        if let Some(library) = inner.library.take() {
            let origin = library.origin().to_string();
            drop(library);
            tracing::debug!(library = %origin, "Runtime library unloaded");
        }

        inner.state = SessionState::Closed;
        tracing::info!("BD-J session closed");
    }

    /// Current lifecycle state. Blocks while another call holds the session,
    /// so it must not be called from a native callback.
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn host(&self) -> &Host<'h> {
        &self.host
    }

    pub fn disc_root(&self) -> &'h Path {
        self.disc_root
    }

    pub fn boot_archive(&self) -> &Path {
        &self.boot_archive
    }

    /// Opaque handle passed to the hosted program's `init`.
    pub fn handle(&self) -> i64 {
        self as *const Self as usize as i64
    }
}

impl fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("disc_root", &self.disc_root)
            .field("boot_archive", &self.boot_archive)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Map a handle from [`Session::handle`] back to its session.
///
/// # Safety
///
/// `handle` must come from a session that is still alive for `'a`, which
/// holds for callbacks made by that session's hosted program before
/// [`Session::close`] returns.
pub unsafe fn session_from_handle<'a>(handle: i64) -> Option<&'a Session<'a>> {
    let ptr = handle as usize as *const Session<'a>;
    // SAFETY: upheld by the caller.
    unsafe { ptr.as_ref() }
}
