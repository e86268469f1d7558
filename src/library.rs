use std::{
    collections::HashMap,
    ffi::c_void,
    fs::{self, File},
    mem,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
    thread,
    time::{Duration, SystemTime},
};

use libloading::Library;

use crate::{Error, os};

/// Whether symbol resolution implicitly checks for an on-disk update and
/// reloads the module before resolving.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AutoReload {
    #[default]
    Disabled,
    Enabled,
}

/// Resolved symbol address. Addresses are opaque integers to this crate;
/// dereferencing one is the caller's unsafe business.
#[derive(Clone, Copy)]
struct SymbolAddr(*mut c_void);

unsafe impl Send for SymbolAddr {}
unsafe impl Sync for SymbolAddr {}

struct Inner {
    lib: Option<Library>,
    path: PathBuf,
    last_modified: SystemTime,
    symbol_cache: HashMap<String, SymbolAddr>,
    reload_tested: bool,
    can_reload: bool,
    auto_reload: AutoReload,
    last_error: Option<String>,
    resolutions: u64,
}

/// A handle owning at most one loaded native module.
///
/// The handle tracks the path it was loaded from and the file's modification
/// timestamp at load time, caches resolved symbol addresses, and can unload
/// and reload the module when the file changes on disk.
///
/// Every public operation takes one exclusive lock over the handle's whole
/// state for its full duration, so individual operations are atomic with
/// respect to other threads. Compound sequences such as
/// "[`check_for_updates`](Self::check_for_updates) then
/// [`reload`](Self::reload)" are not; use [`AutoReload::Enabled`] to get the
/// check-and-reload as a single locked step.
///
/// Addresses returned by [`symbol`](Self::symbol) and
/// [`symbol_addr`](Self::symbol_addr) are only valid until the next
/// successful [`unload`](Self::unload) or [`reload`](Self::reload); callers
/// must re-resolve afterwards. The handle does not track copies it handed
/// out.
pub struct DynamicLibrary {
    inner: Mutex<Inner>,
}

impl DynamicLibrary {
    /// Pause between unloading and reloading a module, letting platform-level
    /// teardown (static destructors, loader bookkeeping) settle.
    const RELOAD_GRACE: Duration = Duration::from_millis(10);

    /// Creates an empty, unloaded handle.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                lib: None,
                path: PathBuf::new(),
                last_modified: SystemTime::UNIX_EPOCH,
                symbol_cache: HashMap::new(),
                reload_tested: false,
                can_reload: true,
                auto_reload: AutoReload::Disabled,
                last_error: None,
                resolutions: 0,
            }),
        }
    }

    /// Creates a handle and loads the module at `path`, failing if the load
    /// does.
    pub fn open(path: impl AsRef<Path>, auto_reload: AutoReload) -> Result<Self, Error> {
        let library = Self::new();
        library.load(path, auto_reload)?;
        Ok(library)
    }

    /// Loads the module at `path`, unloading any currently loaded module
    /// first. A failure of that preliminary unload does not fail the load.
    pub fn load(&self, path: impl AsRef<Path>, auto_reload: AutoReload) -> Result<(), Error> {
        let path = path.as_ref();
        let mut inner = self.lock();

        if inner.lib.is_some()
            && let Err(e) = inner.unload_inner()
        {
            log::warn!("unload before load failed: {e}");
        }

        inner.validate_path(path)?;

        inner.path = path.to_owned();
        inner.last_modified = file_mtime(path);
        inner.auto_reload = auto_reload;

        inner.load_inner()
    }

    /// Unloads the current module. Succeeds without doing anything when no
    /// module is loaded.
    ///
    /// On [`Error::UnloadFailed`] the OS may keep the module mapped, but the
    /// handle no longer tracks it as loaded; a stale handle is strictly worse
    /// than losing that bit of tracking accuracy.
    pub fn unload(&self) -> Result<(), Error> {
        self.lock().unload_inner()
    }

    pub fn is_loaded(&self) -> bool {
        self.lock().lib.is_some()
    }

    /// Path of the last successful load, if any.
    pub fn path(&self) -> Option<PathBuf> {
        let inner = self.lock();
        (!inner.path.as_os_str().is_empty()).then(|| inner.path.clone())
    }

    /// Resolves `name` to a raw address, consulting the symbol cache first.
    ///
    /// With [`AutoReload::Enabled`], a pending on-disk update triggers a
    /// reload before resolving; a failed reload fails the resolution and the
    /// stale cache is never consulted.
    pub fn symbol_addr(&self, name: &str) -> Result<*mut c_void, Error> {
        self.lock().symbol_inner(name)
    }

    /// Typed variant of [`symbol_addr`](Self::symbol_addr), reinterpreting
    /// the resolved address as `T`.
    ///
    /// # Safety
    ///
    /// `T` must be a pointer-sized type (typically an `extern "C"` function
    /// pointer) matching the actual signature of the exported symbol.
    pub unsafe fn symbol<T: Copy>(&self, name: &str) -> Result<T, Error> {
        const {
            assert!(mem::size_of::<T>() == mem::size_of::<*mut c_void>());
        }
        let addr = self.symbol_addr(name)?;
        // SAFETY: sizes match per the assertion above; the caller vouches for
        // the symbol's actual type.
        Ok(unsafe { mem::transmute_copy::<*mut c_void, T>(&addr) })
    }

    /// Whether the backing file has been modified since the last load.
    ///
    /// Pure query: never mutates the handle and never reloads. A transiently
    /// inaccessible file reads as "now", which compares as not-newer.
    pub fn check_for_updates(&self) -> bool {
        self.lock().needs_reload()
    }

    /// Unloads the current module and loads it again from the same path.
    ///
    /// Fails with [`Error::NotLoaded`] when nothing is loaded and with
    /// [`Error::ReloadUnsupported`] when the capability probe rejects the
    /// module. An unload failure in the middle is tolerated: a fresh mapping
    /// beats a handle stuck half-way.
    ///
    /// All previously resolved addresses are invalid after success.
    pub fn reload(&self) -> Result<(), Error> {
        let mut inner = self.lock();
        if inner.lib.is_none() {
            return Err(inner.record(Error::NotLoaded));
        }
        inner.reload_inner()
    }

    /// Whether an unload-then-reload of the current module would most likely
    /// succeed.
    ///
    /// Probed at most once per load by opening and cleanly closing a second
    /// handle to the same path. This is a heuristic: a module can probe clean
    /// and still leak threads or descriptors the loader cannot see.
    pub fn can_reload(&self) -> bool {
        self.lock().probe_reload_capability()
    }

    pub fn set_auto_reload(&self, auto_reload: AutoReload) {
        self.lock().auto_reload = auto_reload;
    }

    pub fn auto_reload(&self) -> AutoReload {
        self.lock().auto_reload
    }

    /// Forces the update-detection baseline to "now", simulating an external
    /// modification. With [`AutoReload::Enabled`] and a loaded module this
    /// immediately triggers a reload.
    pub fn touch(&self) -> Result<(), Error> {
        let mut inner = self.lock();
        inner.last_modified = SystemTime::now();
        if inner.auto_reload == AutoReload::Enabled && inner.lib.is_some() {
            inner.reload_inner()
        } else {
            Ok(())
        }
    }

    /// Message of the most recent failed operation on this handle, if any.
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// Number of platform symbol lookups performed since construction. Cache
    /// hits do not count.
    #[doc(hidden)]
    pub fn resolution_count(&self) -> u64 {
        self.lock().resolutions
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Each operation leaves the state consistent even on early return, so
        // poisoning carries no information worth propagating.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for DynamicLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DynamicLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("DynamicLibrary")
            .field("path", &inner.path)
            .field("loaded", &inner.lib.is_some())
            .field("auto_reload", &inner.auto_reload)
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn record(&mut self, err: Error) -> Error {
        self.last_error = Some(err.to_string());
        err
    }

    fn validate_path(&mut self, path: &Path) -> Result<(), Error> {
        if path.as_os_str().is_empty() {
            return Err(self.record(Error::InvalidPath));
        }
        if let Err(source) = File::open(path) {
            return Err(self.record(Error::FileNotAccessible {
                path: path.to_owned(),
                source,
            }));
        }
        Ok(())
    }

    fn load_inner(&mut self) -> Result<(), Error> {
        log::debug!("loading library {:?}", self.path);

        match os::open(&self.path) {
            Ok(lib) => {
                self.lib = Some(lib);
                self.reload_tested = false;
                self.can_reload = true;
                Ok(())
            }
            Err(source) => Err(self.record(Error::LoadFailed {
                path: self.path.clone(),
                source,
            })),
        }
    }

    fn unload_inner(&mut self) -> Result<(), Error> {
        let Some(lib) = self.lib.take() else {
            return Ok(());
        };

        // Cached addresses die with the mapping whether or not the platform
        // manages to unmap it.
        self.symbol_cache.clear();

        log::debug!("unloading library {:?}", self.path);

        os::close(lib).map_err(|source| {
            self.record(Error::UnloadFailed {
                path: self.path.clone(),
                source,
            })
        })
    }

    fn symbol_inner(&mut self, name: &str) -> Result<*mut c_void, Error> {
        if self.lib.is_none() {
            return Err(self.record(Error::NotLoaded));
        }

        if self.auto_reload == AutoReload::Enabled && self.needs_reload() {
            log::debug!(
                "library {:?} changed on disk, reloading before resolving `{name}`",
                self.path
            );
            self.reload_inner()?;
        }

        if let Some(&SymbolAddr(addr)) = self.symbol_cache.get(name) {
            return Ok(addr);
        }

        let Some(lib) = self.lib.as_ref() else {
            return Err(self.record(Error::NotLoaded));
        };
        let resolved = os::resolve(lib, name);
        self.resolutions += 1;

        match resolved {
            Ok(addr) => {
                self.symbol_cache.insert(name.to_owned(), SymbolAddr(addr));
                Ok(addr)
            }
            Err(source) => Err(self.record(Error::SymbolNotFound {
                name: name.to_owned(),
                path: self.path.clone(),
                source,
            })),
        }
    }

    fn needs_reload(&self) -> bool {
        file_mtime(&self.path) > self.last_modified
    }

    fn probe_reload_capability(&mut self) -> bool {
        if self.lib.is_none() || self.reload_tested {
            return self.can_reload;
        }
        self.reload_tested = true;

        log::trace!("probing reload capability of {:?}", self.path);

        // A resident module hands out an extra reference without re-running
        // its initializers; otherwise a fresh open stands in. Either handle
        // closing cleanly is taken as evidence that the module's
        // constructors, destructors and loader refcounting are well-behaved.
        let probe = match os::open_resident(&self.path) {
            Some(probe) => Ok(probe),
            None => os::open(&self.path),
        };

        self.can_reload = match probe {
            Ok(probe) => match os::close(probe) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("probe close of {:?} failed: {e}", self.path);
                    false
                }
            },
            Err(e) => {
                log::warn!("probe open of {:?} failed: {e}", self.path);
                false
            }
        };

        self.can_reload
    }

    fn reload_inner(&mut self) -> Result<(), Error> {
        if !self.probe_reload_capability() {
            let path = self.path.clone();
            return Err(self.record(Error::ReloadUnsupported { path }));
        }

        if let Err(e) = self.unload_inner() {
            log::warn!("unload during reload failed, reloading anyway: {e}");
        }

        thread::sleep(DynamicLibrary::RELOAD_GRACE);

        self.last_modified = file_mtime(&self.path);
        self.load_inner()
    }
}

/// Last-modification timestamp of `path`, falling back to "now" when the file
/// is transiently inaccessible so a stat failure never reads as an update.
fn file_mtime(path: &Path) -> SystemTime {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .unwrap_or_else(|_| SystemTime::now())
}
