//! Expansion of a parsed class declaration into a self-contained Rust source
//! file suitable for a bare `rustc --crate-type cdylib` compile.
//!
//! The emitted file contains the struct, the member impl with every body
//! pasted verbatim, a `std`-only copy of the wire codec (the one-shot backend
//! compiles with no library configuration, so nothing here may depend on a
//! crate), one C-ABI shim per public member, and the JSON member manifest
//! behind `dc_manifest`. Member panics are caught at the shim boundary and
//! travel back as error records.

use std::fmt::Write as _;

use crate::decl::{ClassDecl, CtorDecl, MethodDecl, Param};
use crate::handle::{CtorSpec, MethodSpec, TypeManifest};
use crate::value::{ParamType, RetType};

/// Wire codec embedded in every generated artifact. Must agree byte for byte
/// with the host-side encoding in `value` (tags, separator, escapes).
const WIRE_MODULE: &str = r#"mod dc_wire {
    use std::ffi::{CStr, CString};
    use std::os::raw::{c_char, c_void};

    pub const SEP: char = '\u{1f}';

    pub fn esc(s: &str) -> String {
        let mut out = String::with_capacity(s.len());
        for c in s.chars() {
            match c {
                '\\' => out.push_str("\\\\"),
                SEP => out.push_str("\\s"),
                '\0' => out.push_str("\\z"),
                other => out.push(other),
            }
        }
        out
    }

    pub fn unesc(s: &str) -> Option<String> {
        let mut out = String::with_capacity(s.len());
        let mut chars = s.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('\\') => out.push('\\'),
                Some('s') => out.push(SEP),
                Some('z') => out.push('\0'),
                _ => return None,
            }
        }
        Some(out)
    }

    pub fn read_args(argv: *const c_char) -> String {
        if argv.is_null() {
            String::new()
        } else {
            unsafe { CStr::from_ptr(argv) }.to_string_lossy().into_owned()
        }
    }

    pub fn split_args(raw: &str) -> Vec<&str> {
        if raw.is_empty() {
            Vec::new()
        } else {
            raw.split(SEP).collect()
        }
    }

    pub fn dec_i64(s: &str) -> Option<i64> {
        s.strip_prefix('i')?.parse().ok()
    }

    pub fn dec_f64(s: &str) -> Option<f64> {
        s.strip_prefix('f')?.parse().ok()
    }

    pub fn dec_bool(s: &str) -> Option<bool> {
        match s {
            "b1" => Some(true),
            "b0" => Some(false),
            _ => None,
        }
    }

    pub fn dec_str(s: &str) -> Option<String> {
        unesc(s.strip_prefix('s')?)
    }

    pub fn enc_i64(v: i64) -> String {
        format!("i{}", v)
    }

    pub fn enc_f64(v: f64) -> String {
        format!("f{:?}", v)
    }

    pub fn enc_bool(v: bool) -> String {
        if v { "b1".to_string() } else { "b0".to_string() }
    }

    pub fn enc_str(v: &str) -> String {
        format!("s{}", esc(v))
    }

    pub fn enc_unit() -> String {
        "u".to_string()
    }

    pub fn out(record: String) -> *mut c_char {
        match CString::new(record) {
            Ok(c) => c.into_raw(),
            Err(_) => CString::new("eresult contained an interior NUL")
                .unwrap()
                .into_raw(),
        }
    }

    pub fn ok_out(value: String) -> *mut c_char {
        out(format!("v{}", value))
    }

    pub fn err_out(msg: &str) -> *mut c_char {
        out(format!("e{}", esc(msg)))
    }

    pub fn panic_message(p: Box<dyn std::any::Any + Send>) -> String {
        if let Some(s) = p.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = p.downcast_ref::<String>() {
            s.clone()
        } else {
            "panic in dynamic member".to_string()
        }
    }

    pub fn boxed<T>(v: T) -> *mut c_void {
        Box::into_raw(Box::new(v)) as *mut c_void
    }
}
"#;

/// Build the member manifest the generated artifact will export.
pub fn manifest_for(decl: &ClassDecl) -> TypeManifest {
    let mut constructors: Vec<CtorSpec> = decl
        .ctors
        .iter()
        .map(|c| CtorSpec {
            params: c.params.iter().map(|p| p.ty).collect(),
        })
        .collect();
    if decl.ctors.is_empty() && decl.fields.is_empty() {
        // Fieldless classes get an implicit no-arg constructor.
        constructors.push(CtorSpec { params: Vec::new() });
    }

    TypeManifest {
        type_name: decl.name.clone(),
        namespace: decl.namespace.clone(),
        constructors,
        methods: decl
            .methods
            .iter()
            .map(|m| MethodSpec {
                name: m.name.clone(),
                is_static: m.is_static,
                is_public: m.is_public,
                params: m.params.iter().map(|p| p.ty).collect(),
                ret: m.ret,
            })
            .collect(),
    }
}

/// Expand a class declaration into the complete plugin source.
pub fn generate_plugin_source(decl: &ClassDecl) -> String {
    let manifest = manifest_for(decl);
    let manifest_json =
        serde_json::to_string(&manifest).unwrap_or_else(|_| "{}".to_string());

    let mut out = String::with_capacity(4096);
    let _ = writeln!(
        out,
        "// Generated by dynclass {} from class '{}'; do not edit.",
        env!("CARGO_PKG_VERSION"),
        decl.qualified_name()
    );
    out.push_str("#![allow(dead_code, unused_variables, unused_imports)]\n\n");

    emit_struct(&mut out, decl);
    emit_impl(&mut out, decl);
    out.push_str(WIRE_MODULE);
    out.push('\n');

    let _ = writeln!(out, "const DC_MANIFEST_JSON: &str = {:?};", manifest_json);
    out.push_str(
        "\n#[no_mangle]\n\
         pub extern \"C\" fn dc_manifest() -> *const std::os::raw::c_char {\n\
         \x20   static CACHED: std::sync::OnceLock<std::ffi::CString> = std::sync::OnceLock::new();\n\
         \x20   CACHED\n\
         \x20       .get_or_init(|| std::ffi::CString::new(DC_MANIFEST_JSON).unwrap())\n\
         \x20       .as_ptr()\n\
         }\n\n",
    );

    for (idx, ctor) in decl.ctors.iter().enumerate() {
        emit_ctor_shim(&mut out, decl, Some((idx, ctor)));
    }
    if decl.ctors.is_empty() && decl.fields.is_empty() {
        emit_ctor_shim(&mut out, decl, None);
    }

    for method in decl.methods.iter().filter(|m| m.is_public) {
        emit_method_shim(&mut out, decl, method);
    }

    emit_drop_and_free(&mut out, decl);
    out
}

fn emit_struct(out: &mut String, decl: &ClassDecl) {
    if decl.fields.is_empty() {
        let _ = writeln!(out, "struct {};\n", decl.name);
    } else {
        let _ = writeln!(out, "struct {} {{", decl.name);
        for field in &decl.fields {
            let _ = writeln!(out, "    {}: {},", field.name, field.ty);
        }
        out.push_str("}\n\n");
    }
}

fn emit_impl(out: &mut String, decl: &ClassDecl) {
    let _ = writeln!(out, "impl {} {{", decl.name);

    for (idx, ctor) in decl.ctors.iter().enumerate() {
        let _ = writeln!(
            out,
            "    fn dc_ctor_{}({}) -> {} {}",
            idx,
            param_list(&ctor.params),
            decl.name,
            ctor.body
        );
    }
    if decl.ctors.is_empty() && decl.fields.is_empty() {
        let _ = writeln!(out, "    fn dc_ctor_0() -> {0} {{ {0} }}", decl.name);
    }

    for method in &decl.methods {
        let mut sig = String::new();
        if !method.self_text.is_empty() {
            sig.push_str(&method.self_text);
            if !method.params.is_empty() {
                sig.push_str(", ");
            }
        }
        sig.push_str(&param_list(&method.params));
        let _ = writeln!(
            out,
            "    fn {}({}){} {}",
            method.name,
            sig,
            ret_annotation(method.ret),
            method.body
        );
    }
    out.push_str("}\n\n");
}

fn param_list(params: &[Param]) -> String {
    params
        .iter()
        .map(|p| {
            let ty = if p.by_ref { "&str" } else { p.ty.rust_name() };
            format!("{}: {}", p.name, ty)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn ret_annotation(ret: RetType) -> &'static str {
    match ret {
        RetType::Unit => "",
        RetType::Int => " -> i64",
        RetType::Float => " -> f64",
        RetType::Bool => " -> bool",
        RetType::Str => " -> String",
    }
}

/// Decode statements for one argument record into typed local bindings.
fn emit_arg_decode(out: &mut String, label: &str, params: &[Param], failure: &str) {
    let _ = writeln!(out, "    let raw = dc_wire::read_args(argv);");
    let _ = writeln!(out, "    let parts = dc_wire::split_args(&raw);");
    let _ = writeln!(out, "    if parts.len() != {} {{", params.len());
    let _ = writeln!(
        out,
        "        return {};",
        failure.replace(
            "{msg}",
            &format!("\"{}: expected {} argument(s)\"", label, params.len())
        )
    );
    out.push_str("    }\n");
    for (i, p) in params.iter().enumerate() {
        let (dec, ty) = match p.ty {
            ParamType::Int => ("dec_i64", "i64"),
            ParamType::Float => ("dec_f64", "f64"),
            ParamType::Bool => ("dec_bool", "bool"),
            ParamType::Str => ("dec_str", "String"),
        };
        let _ = writeln!(
            out,
            "    let a{i}: {ty} = match dc_wire::{dec}(parts[{i}]) {{",
            i = i,
            ty = ty,
            dec = dec
        );
        out.push_str("        Some(v) => v,\n");
        let _ = writeln!(
            out,
            "        None => return {},",
            failure.replace(
                "{msg}",
                &format!("\"{}: argument {} must be {:?}\"", label, i + 1, p.ty)
            )
        );
        out.push_str("    };\n");
    }
}

fn call_args(params: &[Param]) -> String {
    params
        .iter()
        .enumerate()
        .map(|(i, p)| {
            if p.by_ref {
                format!("a{}.as_str()", i)
            } else {
                format!("a{}", i)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn emit_ctor_shim(out: &mut String, decl: &ClassDecl, ctor: Option<(usize, &CtorDecl)>) {
    let (idx, params): (usize, &[Param]) = match ctor {
        Some((idx, c)) => (idx, &c.params),
        None => (0, &[]),
    };
    let arity = params.len();
    let _ = writeln!(out, "#[no_mangle]");
    let _ = writeln!(
        out,
        "pub extern \"C\" fn dc_new_{}(argv: *const std::os::raw::c_char) -> *mut std::os::raw::c_void {{",
        arity
    );
    emit_arg_decode(out, "new", params, "std::ptr::null_mut()");
    let _ = writeln!(
        out,
        "    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {}::dc_ctor_{}({}))) {{",
        decl.name,
        idx,
        call_args(params)
    );
    out.push_str("        Ok(v) => dc_wire::boxed(v),\n");
    out.push_str("        Err(_) => std::ptr::null_mut(),\n");
    out.push_str("    }\n}\n\n");
}

fn emit_method_shim(out: &mut String, decl: &ClassDecl, method: &MethodDecl) {
    let arity = method.params.len();
    let inst_name = if method.is_static { "_inst" } else { "inst" };
    let _ = writeln!(out, "#[no_mangle]");
    let _ = writeln!(
        out,
        "pub extern \"C\" fn dc_m_{}_{}({}: *mut std::os::raw::c_void, argv: *const std::os::raw::c_char) -> *mut std::os::raw::c_char {{",
        method.name, arity, inst_name
    );
    emit_arg_decode(out, &method.name, &method.params, "dc_wire::err_out({msg})");

    let call = if method.is_static {
        format!("{}::{}({})", decl.name, method.name, call_args(&method.params))
    } else {
        format!("this.{}({})", method.name, call_args(&method.params))
    };
    out.push_str(
        "    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {\n",
    );
    if !method.is_static {
        let _ = writeln!(
            out,
            "        let this = unsafe {{ &mut *(inst as *mut {}) }};",
            decl.name
        );
    }
    let _ = writeln!(out, "        {}", call);
    out.push_str("    }));\n");
    out.push_str("    match result {\n");
    let ok_arm = match method.ret {
        RetType::Unit => "Ok(_) => dc_wire::ok_out(dc_wire::enc_unit()),".to_string(),
        RetType::Int => "Ok(v) => dc_wire::ok_out(dc_wire::enc_i64(v)),".to_string(),
        RetType::Float => "Ok(v) => dc_wire::ok_out(dc_wire::enc_f64(v)),".to_string(),
        RetType::Bool => "Ok(v) => dc_wire::ok_out(dc_wire::enc_bool(v)),".to_string(),
        RetType::Str => "Ok(v) => dc_wire::ok_out(dc_wire::enc_str(&v)),".to_string(),
    };
    let _ = writeln!(out, "        {}", ok_arm);
    out.push_str("        Err(p) => dc_wire::err_out(&dc_wire::panic_message(p)),\n");
    out.push_str("    }\n}\n\n");
}

fn emit_drop_and_free(out: &mut String, decl: &ClassDecl) {
    let _ = writeln!(
        out,
        "#[no_mangle]\n\
         pub extern \"C\" fn dc_drop(inst: *mut std::os::raw::c_void) {{\n\
         \x20   if !inst.is_null() {{\n\
         \x20       unsafe {{ drop(Box::from_raw(inst as *mut {})); }}\n\
         \x20   }}\n\
         }}\n",
        decl.name
    );
    out.push_str(
        "#[no_mangle]\n\
         pub extern \"C\" fn dc_free(s: *mut std::os::raw::c_char) {\n\
         \x20   if !s.is_null() {\n\
         \x20       unsafe { drop(std::ffi::CString::from_raw(s)); }\n\
         \x20   }\n\
         }\n",
    );
}
