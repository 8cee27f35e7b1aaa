use std::ops::{Deref, DerefMut};

use crate::error::BridgeError;
use crate::runtime::{Environment, VirtualMachine};

/// A thread environment held for the duration of one bridge call.
///
/// If the calling thread had to be attached to obtain the environment, it is
/// detached again when the guard drops, whichever way the call exits.
pub struct EnvGuard<'vm> {
    vm: &'vm dyn VirtualMachine,
    env: Option<Box<dyn Environment + 'vm>>,
    attached: bool,
}

impl<'vm> EnvGuard<'vm> {
    pub fn acquire(vm: &'vm dyn VirtualMachine) -> Result<Self, BridgeError> {
        if let Some(env) = vm.current_env() {
            return Ok(Self {
                vm,
                env: Some(env),
                attached: false,
            });
        }

        let env = vm.attach_current_thread()?;
        tracing::trace!("Attached thread to runtime");
        Ok(Self {
            vm,
            env: Some(env),
            attached: true,
        })
    }
}

impl<'vm> Deref for EnvGuard<'vm> {
    type Target = dyn Environment + 'vm;

    fn deref(&self) -> &Self::Target {
        // `env` is only taken in `drop`.
        match &self.env {
            Some(env) => env.as_ref(),
            None => unreachable!("environment used after release"),
        }
    }
}

impl<'vm> DerefMut for EnvGuard<'vm> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.env {
            Some(env) => env.as_mut(),
            None => unreachable!("environment used after release"),
        }
    }
}

impl Drop for EnvGuard<'_> {
    fn drop(&mut self) {
        // The environment must not outlive the attachment it came from.
        drop(self.env.take());
        if self.attached {
            self.vm.detach_current_thread();
            tracing::trace!("Detached thread from runtime");
        }
    }
}

/// Run `f` with the calling thread's environment, attaching if needed.
pub fn with_environment<T>(
    vm: &dyn VirtualMachine,
    f: impl FnOnce(&mut dyn Environment) -> Result<T, BridgeError>,
) -> Result<T, BridgeError> {
    let mut guard = EnvGuard::acquire(vm)?;
    f(&mut *guard)
}
