//! The invocable handle over a loaded artifact.
//!
//! A [`TypeHandle`] owns the mapped library and the parsed member manifest the
//! generated code exports. Member calls go through a fixed symbol scheme:
//! `dc_manifest`, `dc_new_<arity>`, `dc_m_<name>_<arity>`, `dc_drop` and
//! `dc_free`. Results come back as owned C strings in the wire record format
//! and are released through the artifact's own allocator via `dc_free`.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{DynError, DynResult};
use crate::value::{decode_result, encode_args, ParamType, RetType, Value};

pub(crate) type ManifestFn = unsafe extern "C" fn() -> *const c_char;
type CtorFn = unsafe extern "C" fn(*const c_char) -> *mut c_void;
type MethodFn = unsafe extern "C" fn(*mut c_void, *const c_char) -> *mut c_char;
type DropFn = unsafe extern "C" fn(*mut c_void);
type FreeFn = unsafe extern "C" fn(*mut c_char);

/// Member table of a compiled class, exported by the artifact as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeManifest {
    pub type_name: String,
    pub namespace: String,
    pub constructors: Vec<CtorSpec>,
    pub methods: Vec<MethodSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CtorSpec {
    pub params: Vec<ParamType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodSpec {
    pub name: String,
    pub is_static: bool,
    pub is_public: bool,
    pub params: Vec<ParamType>,
    pub ret: RetType,
}

impl MethodSpec {
    pub(crate) fn symbol(&self) -> String {
        format!("dc_m_{}_{}", self.name, self.params.len())
    }
}

/// An opaque, invocable representation of a loaded class.
#[derive(Debug)]
pub struct TypeHandle {
    name: String,
    qualified_name: String,
    artifact: PathBuf,
    manifest: TypeManifest,
    library: Library,
}

impl TypeHandle {
    pub(crate) fn new(
        name: String,
        qualified_name: String,
        artifact: PathBuf,
        manifest: TypeManifest,
        library: Library,
    ) -> Self {
        Self {
            name,
            qualified_name,
            artifact,
            manifest,
            library,
        }
    }

    /// Logical name this handle was loaded under.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    /// Path of the compiled artifact backing this handle.
    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    pub fn manifest(&self) -> &TypeManifest {
        &self.manifest
    }

    /// Construct an instance through the given constructor.
    pub fn construct(&self, ctor: &CtorSpec, args: &[Value]) -> DynResult<Instance<'_>> {
        let symbol = format!("dc_new_{}", ctor.params.len());
        let func: Symbol<CtorFn> =
            unsafe { self.library.get(symbol.as_bytes()) }.map_err(|e| {
                DynError::InstantiationFailed {
                    type_name: self.name.clone(),
                    detail: format!("constructor symbol '{}' missing: {}", symbol, e),
                }
            })?;
        let record = args_record(args)?;
        let ptr = unsafe { func(record.as_ptr()) };
        if ptr.is_null() {
            return Err(DynError::InstantiationFailed {
                type_name: self.name.clone(),
                detail: "constructor panicked or rejected its arguments".to_string(),
            });
        }
        Ok(Instance { ptr, handle: self })
    }

    /// Call a member. `instance` must be `Some` exactly when the member is
    /// non-static; the invoker upholds that pairing.
    pub fn call(
        &self,
        instance: Option<&Instance<'_>>,
        method: &MethodSpec,
        args: &[Value],
    ) -> DynResult<Value> {
        let symbol = method.symbol();
        let func: Symbol<MethodFn> =
            unsafe { self.library.get(symbol.as_bytes()) }.map_err(|_| {
                DynError::MemberNotFound {
                    type_name: self.name.clone(),
                    member: method.name.clone(),
                }
            })?;
        let record = args_record(args)?;
        let inst_ptr = instance.map_or(std::ptr::null_mut(), |i| i.ptr);

        let out = unsafe { func(inst_ptr, record.as_ptr()) };
        if out.is_null() {
            return Err(DynError::TargetRaised {
                type_name: self.name.clone(),
                member: method.name.clone(),
                message: "member produced no result record".to_string(),
            });
        }
        let raw = unsafe { CStr::from_ptr(out) }.to_string_lossy().into_owned();
        self.release(out);

        match decode_result(&raw) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(DynError::TargetRaised {
                type_name: self.name.clone(),
                member: method.name.clone(),
                message,
            }),
            Err(detail) => Err(DynError::TargetRaised {
                type_name: self.name.clone(),
                member: method.name.clone(),
                message: format!("malformed result record: {}", detail),
            }),
        }
    }

    fn release(&self, ptr: *mut c_char) {
        match unsafe { self.library.get::<FreeFn>(b"dc_free") } {
            Ok(free) => unsafe { free(ptr) },
            // Leaking one result string beats freeing across allocators.
            Err(e) => warn!("dc_free missing in '{}', leaking result: {}", self.name, e),
        }
    }

    fn drop_instance(&self, ptr: *mut c_void) {
        match unsafe { self.library.get::<DropFn>(b"dc_drop") } {
            Ok(drop_fn) => unsafe { drop_fn(ptr) },
            Err(e) => warn!("dc_drop missing in '{}', leaking instance: {}", self.name, e),
        }
    }
}

fn args_record(args: &[Value]) -> DynResult<CString> {
    // Encoding escapes NUL, so the conversion cannot fail in practice.
    CString::new(encode_args(args))
        .map_err(|_| DynError::malformed("argument encoding produced an interior NUL"))
}

/// A constructed plugin-side object, released through the artifact's
/// `dc_drop` when the guard drops.
#[derive(Debug)]
pub struct Instance<'a> {
    ptr: *mut c_void,
    handle: &'a TypeHandle,
}

impl Drop for Instance<'_> {
    fn drop(&mut self) {
        self.handle.drop_instance(self.ptr);
    }
}
