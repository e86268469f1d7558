use std::{io, path::PathBuf};

/// Failures reported by [`DynamicLibrary`](crate::DynamicLibrary) and
/// [`LibraryRegistry`](crate::LibraryRegistry) operations.
///
/// Platform loader diagnostics (`dlerror`, `GetLastError`) are captured
/// verbatim in the [`libloading::Error`] sources rather than flattened away.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("library path cannot be empty")]
    InvalidPath,

    #[error("library file does not exist or is not accessible: `{}`", .path.display())]
    FileNotAccessible {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to load library `{}`: {source}", .path.display())]
    LoadFailed {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    /// The platform refused to unmap the module. The handle no longer tracks
    /// it as loaded regardless (best-effort forget).
    #[error("failed to unload library `{}`: {source}", .path.display())]
    UnloadFailed {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("symbol `{name}` not found in library `{}`: {source}", .path.display())]
    SymbolNotFound {
        name: String,
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("no library is currently loaded")]
    NotLoaded,

    /// The non-destructive probe judged the module unlikely to survive an
    /// unload/reload cycle. Advisory only.
    #[error("library `{}` cannot be safely reloaded", .path.display())]
    ReloadUnsupported { path: PathBuf },
}
