//! Locates and loads the runtime shared library.

use std::path::{Path, PathBuf};

use crate::config::RuntimeConfig;
use crate::error::BridgeError;
use crate::runtime::{LibraryCandidate, LibraryLoader, RuntimeLibrary};

/// Creation symbol every runtime library must export.
pub const CREATE_SYMBOL: &str = "JNI_CreateJavaVM";

/// Platform file name of the runtime library (`libjvm.so`, `jvm.dll`, ...).
pub fn library_file_name() -> String {
    libloading::library_filename("jvm").to_string_lossy().into_owned()
}

/// Architecture directory name used inside a JRE's `lib/` tree.
pub fn jre_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "i386",
        other => other,
    }
}

/// Candidate library paths below an install root, most specific first.
pub fn paths_under(root: &Path) -> Vec<PathBuf> {
    let lib = library_file_name();
    if cfg!(windows) {
        vec![
            root.join("jre").join("bin").join("server").join(&lib),
            root.join("bin").join("server").join(&lib),
        ]
    } else {
        vec![
            root.join("jre")
                .join("lib")
                .join(jre_arch())
                .join("server")
                .join(&lib),
            root.join("lib").join("server").join(&lib),
        ]
    }
}

/// Ordered list of places to try.
///
/// An explicit install root is used exclusively. Without one, the bare
/// library name is tried first, then the default install root.
pub fn library_candidates(config: &RuntimeConfig) -> Vec<LibraryCandidate> {
    match &config.java_home {
        Some(root) => paths_under(root)
            .into_iter()
            .map(LibraryCandidate::Path)
            .collect(),
        None => {
            let mut candidates = vec![LibraryCandidate::Name(library_file_name())];
            candidates.extend(
                paths_under(&config.default_java_home)
                    .into_iter()
                    .map(LibraryCandidate::Path),
            );
            candidates
        }
    }
}

/// Load the runtime library from the first candidate that works.
pub fn load_runtime_library(
    config: &RuntimeConfig,
    loader: &dyn LibraryLoader,
) -> Result<Box<dyn RuntimeLibrary>, BridgeError> {
    if config.java_home.is_none() {
        tracing::debug!("JAVA_HOME not set, trying default locations");
    }

    let candidates = library_candidates(config);
    let mut failures = Vec::with_capacity(candidates.len());

    for candidate in &candidates {
        match loader.load(candidate) {
            Ok(library) => {
                tracing::info!(library = %candidate, "Runtime library loaded");
                return Ok(library);
            }
            Err(e) => {
                tracing::debug!(library = %candidate, "Runtime library not usable: {e}");
                failures.push(format!("{candidate}: {e}"));
            }
        }
    }

    tracing::error!(tried = candidates.len(), "Wasn't able to load runtime library");
    Err(BridgeError::ResourceNotFound(failures.join("; ")))
}
