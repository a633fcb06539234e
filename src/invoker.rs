//! Member resolution and invocation against a loaded type handle.
//!
//! Two resolution modes exist. Typed resolution demands an exact match on
//! name, arity and every argument type. Auto resolution matches on name and
//! arity alone and takes the first candidate in declaration order, which can
//! pick a surprising overload when two members share both; callers that care
//! use the typed path.

use log::debug;

use crate::error::{DynError, DynResult};
use crate::handle::{CtorSpec, MethodSpec, TypeHandle, TypeManifest};
use crate::value::{ParamType, Value};

fn args_match(params: &[ParamType], args: &[Value]) -> bool {
    params.len() == args.len()
        && params
            .iter()
            .zip(args)
            .all(|(p, a)| a.param_type() == Some(*p))
}

/// Exact-signature method lookup. Finds private members too, so the caller
/// can distinguish "absent" from "not public".
fn resolve_typed<'m>(
    type_name: &str,
    manifest: &'m TypeManifest,
    member: &str,
    args: &[Value],
) -> DynResult<&'m MethodSpec> {
    let spec = manifest
        .methods
        .iter()
        .find(|m| m.name == member && args_match(&m.params, args))
        .ok_or_else(|| DynError::MemberNotFound {
            type_name: type_name.to_string(),
            member: member.to_string(),
        })?;
    check_access(type_name, spec)?;
    Ok(spec)
}

/// Arity-only lookup; first declared candidate wins.
fn resolve_by_arity<'m>(
    type_name: &str,
    manifest: &'m TypeManifest,
    member: &str,
    arity: usize,
) -> DynResult<&'m MethodSpec> {
    let spec = manifest
        .methods
        .iter()
        .find(|m| m.name == member && m.params.len() == arity)
        .ok_or_else(|| DynError::MemberNotFound {
            type_name: type_name.to_string(),
            member: member.to_string(),
        })?;
    check_access(type_name, spec)?;
    Ok(spec)
}

fn check_access(type_name: &str, spec: &MethodSpec) -> DynResult<()> {
    if spec.is_public {
        Ok(())
    } else {
        Err(DynError::AccessDenied {
            type_name: type_name.to_string(),
            member: spec.name.clone(),
        })
    }
}

/// Constructor matching `ctor_args` exactly.
fn resolve_ctor<'m>(
    type_name: &str,
    manifest: &'m TypeManifest,
    ctor_args: &[Value],
) -> DynResult<&'m CtorSpec> {
    manifest
        .constructors
        .iter()
        .find(|c| args_match(&c.params, ctor_args))
        .ok_or_else(|| DynError::InstantiationFailed {
            type_name: type_name.to_string(),
            detail: format!("no constructor taking {} argument(s)", ctor_args.len()),
        })
}

fn dispatch(
    handle: &TypeHandle,
    spec: &MethodSpec,
    args: &[Value],
    ctor_args: &[Value],
) -> DynResult<Value> {
    debug!(
        "invoking {}::{}/{} ({})",
        handle.name(),
        spec.name,
        spec.params.len(),
        if spec.is_static { "static" } else { "instance" }
    );
    if spec.is_static {
        handle.call(None, spec, args)
    } else {
        let ctor = resolve_ctor(handle.name(), handle.manifest(), ctor_args)?;
        let instance = handle.construct(ctor, ctor_args)?;
        handle.call(Some(&instance), spec, args)
    }
}

/// Invoke with exact signature matching; instance members get a fresh
/// instance from the constructor matching `ctor_args`.
pub fn invoke_typed(
    handle: &TypeHandle,
    member: &str,
    args: &[Value],
    ctor_args: &[Value],
) -> DynResult<Value> {
    let spec = resolve_typed(handle.name(), handle.manifest(), member, args)?;
    dispatch(handle, spec, args, ctor_args)
}

/// Invoke with arity-only matching; first declared candidate wins. Instance
/// members are constructed with the no-arg constructor.
pub fn invoke_auto(handle: &TypeHandle, member: &str, args: &[Value]) -> DynResult<Value> {
    let spec = resolve_by_arity(handle.name(), handle.manifest(), member, args.len())?;
    dispatch(handle, spec, args, &[])
}

/// No-argument convenience call: when no no-arg entry point exists, either
/// because the member is missing or because an instance member has no no-arg
/// construction path, the result is `Ok(None)`, not an error. Every other
/// failure propagates, including a constructor that actually runs and fails.
pub fn invoke_no_arg(handle: &TypeHandle, member: &str) -> DynResult<Option<Value>> {
    let spec = match resolve_by_arity(handle.name(), handle.manifest(), member, 0) {
        Ok(spec) => spec,
        Err(DynError::MemberNotFound { .. }) => return Ok(None),
        Err(other) => return Err(other),
    };
    if !spec.is_static && resolve_ctor(handle.name(), handle.manifest(), &[]).is_err() {
        debug!(
            "probe of {}::{} found no no-arg constructor",
            handle.name(),
            member
        );
        return Ok(None);
    }
    dispatch(handle, spec, &[], &[]).map(Some)
}
