use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{AutoReload, DynamicLibrary, Error};

/// A name-keyed collection of shared [`DynamicLibrary`] handles.
///
/// The registry's own lock guards only the name map and is never held while
/// a handle executes one of its locked operations, so handle and registry
/// locks never nest.
#[derive(Debug, Default)]
pub struct LibraryRegistry {
    libraries: Mutex<HashMap<String, Arc<DynamicLibrary>>>,
}

impl LibraryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handle registered under `name`, loading `path` into a
    /// fresh handle when the name is unknown.
    ///
    /// The first registration of a name wins: on a hit, `path` and
    /// `auto_reload` are ignored and the existing handle is returned
    /// unchanged. A load failure propagates and registers nothing.
    pub fn load_library(
        &self,
        name: &str,
        path: impl AsRef<Path>,
        auto_reload: AutoReload,
    ) -> Result<Arc<DynamicLibrary>, Error> {
        if let Some(existing) = self.get_library(name) {
            return Ok(existing);
        }

        // Loaded outside the map lock; if another thread registered the same
        // name meanwhile, its handle wins and this one unloads on drop.
        let library = Arc::new(DynamicLibrary::open(path, auto_reload)?);

        log::debug!("registering library `{name}`");

        let mut libraries = self.lock();
        Ok(Arc::clone(
            libraries.entry(name.to_owned()).or_insert(library),
        ))
    }

    /// Removes the handle registered under `name` and unloads its module;
    /// no-op when absent. Outstanding [`Arc`] views stay usable but observe
    /// the handle as unloaded from then on.
    pub fn unload_library(&self, name: &str) {
        // Taken out of the map before unloading so the registry lock is not
        // held across the handle's locked operation.
        let removed = self.lock().remove(name);
        let Some(library) = removed else {
            return;
        };

        log::debug!("removed library `{name}` from registry");

        if let Err(e) = library.unload() {
            log::warn!("unload of removed library `{name}` failed: {e}");
        }
    }

    /// Returns the handle registered under `name`, if any.
    pub fn get_library(&self, name: &str) -> Option<Arc<DynamicLibrary>> {
        self.lock().get(name).cloned()
    }

    /// Whether any registered handle reports a pending on-disk update.
    /// Short-circuits on the first hit and performs no reloads.
    pub fn check_all_for_updates(&self) -> bool {
        let libraries: Vec<_> = self.lock().values().cloned().collect();
        libraries
            .iter()
            .any(|library| library.check_for_updates())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<DynamicLibrary>>> {
        self.libraries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
