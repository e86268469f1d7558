use std::path::Path;

use libloading::{Library, os::unix};

/// Open the module at `path` with immediate binding and without leaking its
/// symbols into the global namespace (`RTLD_NOW | RTLD_LOCAL`).
pub fn open(path: &Path) -> Result<Library, libloading::Error> {
    // SAFETY: loading runs the module's initializers; the module is native
    // code the caller chose to load, no soundness beyond `dlopen` is claimed.
    unsafe {
        unix::Library::open(Some(path), libc::RTLD_NOW | libc::RTLD_LOCAL).map(Library::from)
    }
}

/// Reopen the module at `path` only if it is already mapped, yielding `None`
/// when it is not resident.
pub fn open_resident(path: &Path) -> Option<Library> {
    // SAFETY: `RTLD_NOLOAD` never runs initializers; the extra reference it
    // hands out is owned by the returned `Library`.
    unsafe {
        unix::Library::open(Some(path), libc::RTLD_NOW | libc::RTLD_NOLOAD)
            .map(Library::from)
            .ok()
    }
}
