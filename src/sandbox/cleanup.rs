//! Process-wide tracking of ephemeral directories.
//!
//! Every temporary directory the sandbox creates (repository clones, image
//! build contexts) is registered here so it can be force-removed even when
//! the process is interrupted before the owning sandbox tears down.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

/// Registry of directories to remove on shutdown.
///
/// Additive during the run; drained only by [`TempDirRegistry::cleanup`].
/// Tests construct their own instance; production code shares the one
/// returned by [`temp_registry`].
#[derive(Debug, Default)]
pub struct TempDirRegistry {
    dirs: Mutex<Vec<PathBuf>>,
}

impl TempDirRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a directory for removal at shutdown.
    pub fn register(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        tracing::debug!(dir = %path.display(), "tracking temp directory");
        self.dirs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(path);
    }

    /// Number of directories currently tracked.
    pub fn tracked(&self) -> usize {
        self.dirs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Remove one tracked directory immediately and stop tracking it.
    /// Removal failures are swallowed.
    pub fn remove_now(&self, path: &Path) {
        let mut dirs = self.dirs.lock().unwrap_or_else(|e| e.into_inner());
        dirs.retain(|p| p != path);
        drop(dirs);
        if let Err(err) = std::fs::remove_dir_all(path) {
            tracing::debug!(dir = %path.display(), error = %err, "failed to remove temp directory");
        }
    }

    /// Drain the registry and remove every tracked directory.
    ///
    /// Best-effort and synchronous so it is safe to call from signal and
    /// panic handlers; removal failures are swallowed, never retried.
    pub fn cleanup(&self) {
        let drained: Vec<PathBuf> = self
            .dirs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();

        for dir in drained {
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => tracing::debug!(dir = %dir.display(), "removed temp directory"),
                Err(err) => {
                    tracing::debug!(dir = %dir.display(), error = %err, "failed to remove temp directory");
                }
            }
        }
    }
}

/// The shared registry used by all sandbox instances in this process.
pub fn temp_registry() -> Arc<TempDirRegistry> {
    static GLOBAL: OnceLock<Arc<TempDirRegistry>> = OnceLock::new();
    GLOBAL.get_or_init(|| Arc::new(TempDirRegistry::new())).clone()
}

/// Install shutdown hooks that drain the shared registry.
///
/// Covers panics and SIGINT/SIGTERM. Normal exits call
/// `temp_registry().cleanup()` directly from `main`. Must be called from
/// within a tokio runtime.
pub fn install_cleanup_hooks() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        temp_registry().cleanup();
        previous(info);
    }));

    tokio::spawn(async {
        wait_for_termination().await;
        tracing::info!("termination signal received, cleaning up temp directories");
        temp_registry().cleanup();
        std::process::exit(130);
    });
}

async fn wait_for_termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_removes_and_drains() {
        let registry = TempDirRegistry::new();
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.keep();
        std::fs::write(path.join("marker.txt"), "x").expect("write marker");

        registry.register(&path);
        assert_eq!(registry.tracked(), 1);

        registry.cleanup();
        assert_eq!(registry.tracked(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn cleanup_tolerates_already_removed_dirs() {
        let registry = TempDirRegistry::new();
        registry.register("/nonexistent/flake-forge-test-dir");
        registry.cleanup();
        assert_eq!(registry.tracked(), 0);
    }

    #[test]
    fn remove_now_untracks_single_dir() {
        let registry = TempDirRegistry::new();
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.keep();
        let other = PathBuf::from("/nonexistent/other");

        registry.register(&path);
        registry.register(&other);
        registry.remove_now(&path);

        assert_eq!(registry.tracked(), 1);
        assert!(!path.exists());
    }
}
