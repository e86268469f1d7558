use std::{os::windows::ffi::OsStrExt, path::Path, ptr};

use libloading::{Library, os::windows};
use windows_sys::Win32::{Foundation::HMODULE, System::LibraryLoader::GetModuleHandleExW};

/// Open the module at `path`. `LoadLibraryExW` binds eagerly and DLL symbols
/// are never visible to other modules, so no extra flags are needed to match
/// the unix `RTLD_NOW | RTLD_LOCAL` policy.
pub fn open(path: &Path) -> Result<Library, libloading::Error> {
    // SAFETY: loading runs `DllMain`; the module is native code the caller
    // chose to load, no soundness beyond `LoadLibrary` is claimed.
    unsafe { windows::Library::new(path).map(Library::from) }
}

/// Reopen the module at `path` only if it is already mapped, yielding `None`
/// when it is not resident. The returned handle owns a real loader reference,
/// so closing it exercises the refcounting the same way `FreeLibrary` would.
pub fn open_resident(path: &Path) -> Option<Library> {
    let wide: Vec<u16> = path.as_os_str().encode_wide().chain(Some(0)).collect();
    let mut module: HMODULE = ptr::null_mut();

    // SAFETY: without UNCHANGED_REFCOUNT the call takes a reference that the
    // returned `Library` owns and releases exactly once.
    let res = unsafe { GetModuleHandleExW(0, wide.as_ptr(), &mut module) };
    if res == 0 {
        return None;
    }

    // SAFETY: `module` is a valid handle whose reference was taken above.
    Some(Library::from(unsafe {
        windows::Library::from_raw(module as isize)
    }))
}
