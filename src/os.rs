use std::ffi::c_void;

use libloading::Library;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use unix::{open, open_resident};
#[cfg(windows)]
pub use windows::{open, open_resident};

/// Release a native module handle, surfacing the platform diagnostic when the
/// loader refuses to unmap it.
pub fn close(lib: Library) -> Result<(), libloading::Error> {
    lib.close()
}

/// Resolve `name` to a raw address in `lib`.
pub fn resolve(lib: &Library, name: &str) -> Result<*mut c_void, libloading::Error> {
    // SAFETY: only the address is extracted; interpreting it is the caller's
    // responsibility.
    unsafe { lib.get::<*mut c_void>(name.as_bytes()).map(|sym| *sym) }
}
