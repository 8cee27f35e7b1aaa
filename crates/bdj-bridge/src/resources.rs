use std::path::PathBuf;

use crate::config::BootConfig;

/// Resolve the boot archive for a new session.
///
/// Never fails: an explicit override is trusted verbatim, then the search
/// paths are checked in order, and if none exists the configured fallback
/// is returned anyway.
pub fn find_boot_archive(config: &BootConfig) -> PathBuf {
    if let Some(classpath) = &config.classpath {
        tracing::debug!(boot_archive = %classpath.display(), "Using boot archive override");
        return classpath.clone();
    }

    tracing::debug!("Boot archive override not set, searching");

    for candidate in &config.search_paths {
        tracing::debug!(candidate = %candidate.display(), "Checking boot archive candidate");
        if candidate.exists() {
            tracing::debug!(boot_archive = %candidate.display(), "Using boot archive");
            return candidate.clone();
        }
    }

    tracing::warn!(
        fallback = %config.fallback.display(),
        "Boot archive not found, falling back to built-in path"
    );
    config.fallback.clone()
}
