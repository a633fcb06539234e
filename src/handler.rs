//! The compile-load-cache-invoke facade.
//!
//! A handler owns one backend, one staging area and one handle cache.
//! Submissions run analyze -> rewrite -> parse -> compile -> load, with the
//! compile-through-load stretch serialized under a lock so two submissions of
//! the same name cannot interleave their cache updates. Invocations run
//! against already-loaded handles and take no lock.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info};

use crate::analyzer;
use crate::backend::{CompilerBackend, LibraryConfig};
use crate::cache::TypeCache;
use crate::codegen;
use crate::decl::parse_class;
use crate::error::{DynError, DynResult};
use crate::handle::TypeHandle;
use crate::invoker;
use crate::loader::IsolatedLoader;
use crate::staging::ArtifactStore;
use crate::value::Value;

/// Construction-time settings for a [`DynamicClassHandler`].
#[derive(Debug, Default)]
pub struct HandlerConfig {
    pub backend: CompilerBackend,
    /// Staging directory; a fresh temp directory when absent.
    pub staging_root: Option<PathBuf>,
    pub cache_disabled: bool,
}

#[derive(Debug)]
pub struct DynamicClassHandler {
    backend: CompilerBackend,
    store: ArtifactStore,
    cache: TypeCache,
    compile_lock: Mutex<()>,
}

impl DynamicClassHandler {
    /// Handler with the default toolchain backend and an enabled cache.
    pub fn new() -> DynResult<Self> {
        Self::with_config(HandlerConfig::default())
    }

    pub fn with_config(config: HandlerConfig) -> DynResult<Self> {
        let store = match config.staging_root {
            Some(root) => ArtifactStore::with_root(root)?,
            None => ArtifactStore::new()?,
        };
        Ok(Self {
            backend: config.backend,
            store,
            cache: TypeCache::new(!config.cache_disabled),
            compile_lock: Mutex::new(()),
        })
    }

    /// Compile `source` and cache the result under its declared name.
    pub fn load_class(&self, source: &str) -> DynResult<Arc<TypeHandle>> {
        self.submit(None, source, None)
    }

    /// Compile `source` under `name`, rewriting the declared name first.
    /// The rewrite renames the declaration token only; constructor bodies
    /// that spell out the old type name will fail to compile.
    pub fn load_class_named(&self, name: &str, source: &str) -> DynResult<Arc<TypeHandle>> {
        self.submit(Some(name), source, None)
    }

    /// Compile `source` with a one-off library configuration. Only the
    /// toolchain backend accepts the override.
    pub fn load_class_with_libraries(
        &self,
        source: &str,
        libraries: &LibraryConfig,
    ) -> DynResult<Arc<TypeHandle>> {
        self.submit(None, source, Some(libraries))
    }

    fn submit(
        &self,
        name_override: Option<&str>,
        source: &str,
        override_libs: Option<&LibraryConfig>,
    ) -> DynResult<Arc<TypeHandle>> {
        let declared = analyzer::declared_name(source)?;
        let rewritten;
        let (name, source) = match name_override {
            Some(name) if name != declared => {
                rewritten = analyzer::rewrite_declared_name(name, source);
                (name.to_string(), rewritten.as_str())
            }
            Some(name) => (name.to_string(), source),
            None => (declared, source),
        };

        // Reject unparsable submissions before anything touches the disk.
        let decl = parse_class(source)?;
        let namespace = decl.namespace.clone();
        let qualified = decl.qualified_name();

        let _guard = self.lock_compiles();
        self.cache.remove(&name);

        self.store.stage(&namespace, &name, ".dc", source)?;
        let plugin_source = codegen::generate_plugin_source(&decl);
        let staged = self.store.stage(&namespace, &name, ".rs", &plugin_source)?;
        let artifact = self.store.artifact_path(&namespace, &name)?;

        self.backend
            .compile(&name, &staged, &artifact, override_libs)?;

        let handle = IsolatedLoader::new(artifact).load(&name, &qualified)?;
        let handle = Arc::new(handle);
        self.cache.put(&name, Arc::clone(&handle));
        info!("loaded '{}' ({} members)", name, handle.manifest().methods.len());
        Ok(handle)
    }

    fn lock_compiles(&self) -> MutexGuard<'_, ()> {
        // A poisoned lock only means a previous compile panicked.
        self.compile_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cached handle for `name`, if the cache holds one.
    pub fn get_class(&self, name: &str) -> Option<Arc<TypeHandle>> {
        self.cache.get(name)
    }

    pub fn class_exists(&self, name: &str) -> bool {
        self.cache.contains(name)
    }

    /// Drop the cached handle; the library unmaps once every outstanding
    /// reference is gone. Returns whether an entry existed.
    pub fn remove_class(&self, name: &str) -> bool {
        self.cache.remove(name).is_some()
    }

    pub fn set_cache_enabled(&self, enabled: bool) {
        self.cache.set_enabled(enabled);
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache.is_enabled()
    }

    /// Staging directory this handler writes sources and artifacts under.
    pub fn staging_root(&self) -> &std::path::Path {
        self.store.root()
    }

    fn cached(&self, name: &str) -> DynResult<Arc<TypeHandle>> {
        self.cache.get(name).ok_or_else(|| DynError::TypeNotFound {
            name: name.to_string(),
            path: self.store.root().to_path_buf(),
        })
    }

    /// No-argument convenience invocation. An uncached name, a missing
    /// member, or an instance member with no no-arg construction path is
    /// `Ok(None)`, not an error; only real failures propagate.
    pub fn invoke(&self, name: &str, member: &str) -> DynResult<Option<Value>> {
        let Some(handle) = self.cache.get(name) else {
            debug!("probe of '{name}::{member}' found no cached class");
            return Ok(None);
        };
        invoker::invoke_no_arg(&handle, member)
    }

    /// Exact-signature invocation; instance members are constructed with the
    /// constructor matching `ctor_args`.
    pub fn invoke_with(
        &self,
        name: &str,
        member: &str,
        args: &[Value],
        ctor_args: &[Value],
    ) -> DynResult<Value> {
        let handle = self.cached(name)?;
        invoker::invoke_typed(&handle, member, args, ctor_args)
    }

    /// Arity-matched invocation; first declared candidate wins.
    pub fn invoke_auto(&self, name: &str, member: &str, args: &[Value]) -> DynResult<Value> {
        let handle = self.cached(name)?;
        invoker::invoke_auto(&handle, member, args)
    }

    /// Handle-direct variants, for callers holding a handle across cache
    /// invalidation.
    pub fn invoke_handle(&self, handle: &TypeHandle, member: &str) -> DynResult<Option<Value>> {
        invoker::invoke_no_arg(handle, member)
    }

    pub fn invoke_handle_with(
        &self,
        handle: &TypeHandle,
        member: &str,
        args: &[Value],
        ctor_args: &[Value],
    ) -> DynResult<Value> {
        invoker::invoke_typed(handle, member, args, ctor_args)
    }

    pub fn invoke_handle_auto(
        &self,
        handle: &TypeHandle,
        member: &str,
        args: &[Value],
    ) -> DynResult<Value> {
        invoker::invoke_auto(handle, member, args)
    }
}
