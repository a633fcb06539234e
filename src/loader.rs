//! Isolated loading of compiled artifacts.
//!
//! Each load opens its own [`libloading::Library`], so redefining a class
//! produces a fresh handle over a fresh library while earlier handles keep
//! working against theirs. The loader is consumed by a single load; the
//! handler creates one per compilation.

use std::ffi::CStr;
use std::path::PathBuf;

use libloading::{Library, Symbol};
use log::debug;

use crate::error::{DynError, DynResult};
use crate::handle::{ManifestFn, TypeHandle, TypeManifest};

#[derive(Debug)]
pub struct IsolatedLoader {
    artifact: PathBuf,
}

impl IsolatedLoader {
    /// Loader for the artifact at `artifact`.
    pub fn new(artifact: PathBuf) -> Self {
        Self { artifact }
    }

    /// Open the artifact, read its member manifest and wrap both in a handle.
    /// The library stays mapped for as long as the handle lives.
    pub fn load(self, name: &str, qualified_name: &str) -> DynResult<TypeHandle> {
        if !self.artifact.exists() {
            return Err(self.not_found(name));
        }

        debug!("loading {} from {}", name, self.artifact.display());
        let library = unsafe { Library::new(&self.artifact) }.map_err(|e| {
            debug!("dlopen failed for {}: {}", self.artifact.display(), e);
            self.not_found(name)
        })?;

        let manifest = self.read_manifest(&library, name)?;
        Ok(TypeHandle::new(
            name.to_string(),
            qualified_name.to_string(),
            self.artifact,
            manifest,
            library,
        ))
    }

    fn read_manifest(&self, library: &Library, name: &str) -> DynResult<TypeManifest> {
        let manifest_fn: Symbol<'_, ManifestFn> = unsafe { library.get(b"dc_manifest") }
            .map_err(|e| {
                debug!("artifact exports no manifest: {e}");
                self.not_found(name)
            })?;
        let raw = unsafe { manifest_fn() };
        if raw.is_null() {
            return Err(self.not_found(name));
        }
        let json = unsafe { CStr::from_ptr(raw) }.to_string_lossy();
        serde_json::from_str(&json).map_err(|e| {
            debug!("unparsable manifest for {name}: {e}");
            self.not_found(name)
        })
    }

    fn not_found(&self, name: &str) -> DynError {
        DynError::TypeNotFound {
            name: name.to_string(),
            path: self.artifact.clone(),
        }
    }
}
