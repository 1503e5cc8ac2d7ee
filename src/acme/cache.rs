//! On-disk cache directory for ACME account keys and certificates.

use std::io;
use std::path::{Path, PathBuf};

use crate::config::CACHE_NAMESPACE;

/// Platform cache location for this application, e.g. `~/.cache/autotls`.
///
/// Falls back to the system temp directory when the user cache directory
/// cannot be determined (no `$HOME`, service accounts).
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(CACHE_NAMESPACE)
}

/// Create the cache directory (and parents) readable by the owner only.
pub fn create_cache_dir(path: &Path) -> io::Result<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(path)
}

/// Resolve a usable cache directory, or `None` when it cannot be created.
///
/// Failure is not fatal: certificates are then issued again after every
/// restart.
pub fn prepare_cache_dir(path: PathBuf) -> Option<PathBuf> {
    match create_cache_dir(&path) {
        Ok(()) => {
            tracing::debug!(cache = %path.display(), "Using ACME cache directory");
            Some(path)
        }
        Err(e) => {
            tracing::warn!(
                cache = %path.display(),
                error = %e,
                "Cannot create ACME cache directory; certificates will not be cached"
            );
            None
        }
    }
}
