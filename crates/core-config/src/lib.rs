//! Session options and per-user persistent state.
//!
//! The state directory is resolved once per process from `SLIT_DIR`, falling
//! back to `$HOME/.slit` (and the temp dir when no home can be determined).
//! It currently holds a single artifact: the prompt history file.

mod history;

pub use history::{HISTORY_LIMIT, History};

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

/// Options assembled by the CLI and threaded through the session. Fixed for
/// the lifetime of the process except `keep_chars`, which the viewer owns a
/// live copy of.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Explicit stdin cache location; when set the cache file is preserved
    /// on exit.
    pub out_path: Option<PathBuf>,
    /// Tail the input, pinning the viewport to the end as it grows.
    pub follow: bool,
    /// Number of leading characters kept visible during horizontal scroll.
    pub keep_chars: usize,
    /// Always open the terminal UI, even for input that fits the screen.
    pub always_term: bool,
    /// How long to wait for a short stdin before giving up on direct output.
    pub short_stdin_timeout: Duration,
    /// Write debug logs to the log file.
    pub debug: bool,
}

/// Resolves the per-user state directory from explicit inputs. Pure so it
/// can be exercised without mutating the process environment.
pub fn resolve_state_dir(env_override: Option<PathBuf>, home: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = env_override {
        return dir;
    }
    home.unwrap_or_else(std::env::temp_dir).join(".slit")
}

/// The process-lifetime state directory (`$SLIT_DIR` or `$HOME/.slit`).
pub fn state_dir() -> &'static Path {
    static DIR: OnceLock<PathBuf> = OnceLock::new();
    DIR.get_or_init(|| {
        let dir = resolve_state_dir(std::env::var_os("SLIT_DIR").map(PathBuf::from), dirs::home_dir());
        tracing::debug!(target: "config", dir = %dir.display(), "state directory resolved");
        dir
    })
}

/// Path of the prompt history file.
pub fn history_path() -> PathBuf {
    state_dir().join("history")
}
