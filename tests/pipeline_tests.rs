//! End-to-end tests for the compile-load-cache-invoke pipeline.
//!
//! These tests shell out to a real `rustc` (resolved like the library does,
//! `$RUSTC` or `rustc` on PATH) and exercise the full path from submitted
//! source to invoked member.

use dynclass::{
    CompilerBackend, DynError, DynamicClassHandler, HandlerConfig, LibraryConfig, Value,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn handler() -> DynamicClassHandler {
    init_logging();
    DynamicClassHandler::new().expect("handler construction")
}

fn handler_with(config: HandlerConfig) -> DynamicClassHandler {
    init_logging();
    DynamicClassHandler::with_config(config).expect("handler construction")
}

fn cleanup(h: &DynamicClassHandler) {
    std::fs::remove_dir_all(h.staging_root()).ok();
}

const GREETER: &str = r#"
namespace demo.util;

class Greeter {
    prefix: String,

    new(prefix: String) { Greeter { prefix } }

    fn greet(&self, who: String) -> String { format!("{} {}", self.prefix, who) }

    static fn answer() -> i64 { 42 }
}
"#;

#[test]
fn test_static_member_end_to_end() {
    let h = handler();
    let handle = h.load_class(GREETER).unwrap();
    assert_eq!(handle.name(), "Greeter");
    assert_eq!(handle.qualified_name(), "demo.util.Greeter");

    let out = h.invoke_auto("Greeter", "answer", &[]).unwrap();
    assert_eq!(out, Value::Int(42));
    cleanup(&h);
}

#[test]
fn test_instance_member_with_constructor_args() {
    let h = handler();
    h.load_class(GREETER).unwrap();

    let out = h
        .invoke_with(
            "Greeter",
            "greet",
            &[Value::from("world")],
            &[Value::from("hi")],
        )
        .unwrap();
    assert_eq!(out, Value::from("hi world"));
    cleanup(&h);
}

#[test]
fn test_artifact_is_staged_under_namespace() {
    let h = handler();
    h.load_class(GREETER).unwrap();
    let staged = h.staging_root().join("demo/util/Greeter.rs");
    assert!(staged.exists());
    cleanup(&h);
}

#[test]
fn test_rename_on_load_for_fieldless_class() {
    let h = handler();
    let source = r#"
class Greeter {
    fn greet(&self, who: String) -> String { format!("hello {}", who) }
}
"#;
    let handle = h.load_class_named("Greeter2", source).unwrap();
    assert_eq!(handle.name(), "Greeter2");

    let out = h
        .invoke_auto("Greeter2", "greet", &[Value::from("world")])
        .unwrap();
    assert_eq!(out, Value::from("hello world"));
    // Only the rename target was cached.
    assert!(!h.class_exists("Greeter"));
    cleanup(&h);
}

#[test]
fn test_rename_breaks_constructor_bodies_naming_the_type() {
    // The rename rewrites the declaration token only; a constructor body
    // spelling out the old type name no longer compiles.
    let h = handler();
    let err = h.load_class_named("Renamed", GREETER).unwrap_err();
    assert!(matches!(err, DynError::CompilationFailed { .. }));
    cleanup(&h);
}

#[test]
fn test_redefinition_replaces_cached_class() {
    let h = handler();
    h.load_class("class Probe { static fn version() -> i64 { 1 } }")
        .unwrap();
    assert_eq!(
        h.invoke_auto("Probe", "version", &[]).unwrap(),
        Value::Int(1)
    );

    let old = h.get_class("Probe").unwrap();
    h.load_class("class Probe { static fn version() -> i64 { 2 } }")
        .unwrap();
    assert_eq!(
        h.invoke_auto("Probe", "version", &[]).unwrap(),
        Value::Int(2)
    );
    // The earlier handle still answers against its own library.
    assert_eq!(
        h.invoke_handle_auto(&old, "version", &[]).unwrap(),
        Value::Int(1)
    );
    cleanup(&h);
}

#[test]
fn test_cache_readers_never_regress_across_redefinition() {
    let h = handler();
    h.load_class("class Flip { static fn v() -> i64 { 1 } }")
        .unwrap();

    // A reader hammers the cache while the main thread redefines the class.
    // During the swap the entry may briefly be absent (remove-before-compile),
    // but once the new definition is observed the old one must never be.
    std::thread::scope(|s| {
        let reader = s.spawn(|| {
            let deadline = std::time::Instant::now() + std::time::Duration::from_secs(120);
            let mut seen_new = false;
            let mut confirming = 0;
            while std::time::Instant::now() < deadline {
                match h.invoke_auto("Flip", "v", &[]) {
                    Ok(Value::Int(1)) => {
                        assert!(!seen_new, "stale definition read after the new one");
                    }
                    Ok(Value::Int(2)) => {
                        seen_new = true;
                        confirming += 1;
                        if confirming > 50 {
                            break;
                        }
                    }
                    Ok(other) => panic!("unexpected result: {other:?}"),
                    Err(DynError::TypeNotFound { .. }) => {
                        assert!(!seen_new, "class vanished after redefinition");
                    }
                    Err(other) => panic!("unexpected error: {other}"),
                }
            }
            assert!(seen_new, "redefinition never became visible to the reader");
        });

        std::thread::sleep(std::time::Duration::from_millis(20));
        h.load_class("class Flip { static fn v() -> i64 { 2 } }")
            .unwrap();
        reader.join().unwrap();
    });

    assert_eq!(h.invoke_auto("Flip", "v", &[]).unwrap(), Value::Int(2));
    cleanup(&h);
}

#[test]
fn test_member_panic_surfaces_as_target_raised() {
    let h = handler();
    h.load_class(r#"class Boomer { static fn boom() { panic!("it broke") } }"#)
        .unwrap();
    let err = h.invoke_auto("Boomer", "boom", &[]).unwrap_err();
    match err {
        DynError::TargetRaised { message, .. } => assert_eq!(message, "it broke"),
        other => panic!("unexpected error: {other}"),
    }
    cleanup(&h);
}

#[test]
fn test_no_arg_convenience_tolerates_missing_member() {
    let h = handler();
    h.load_class("class Quiet { static fn ping() -> bool { true } }")
        .unwrap();
    assert_eq!(
        h.invoke("Quiet", "ping").unwrap(),
        Some(Value::Bool(true))
    );
    assert_eq!(h.invoke("Quiet", "nothing_here").unwrap(), None);
    cleanup(&h);
}

#[test]
fn test_no_arg_probe_without_construction_path_is_none() {
    let h = handler();
    h.load_class(
        r#"
class Counter {
    n: i64,
    new(n: i64) { Counter { n } }
    fn current(&self) -> i64 { self.n }
}
"#,
    )
    .unwrap();
    // The member exists, but an instance cannot be built without arguments;
    // the probe reports absent rather than failing.
    assert_eq!(h.invoke("Counter", "current").unwrap(), None);
    // With constructor arguments supplied the same member is reachable.
    assert_eq!(
        h.invoke_with("Counter", "current", &[], &[Value::Int(3)])
            .unwrap(),
        Value::Int(3)
    );
    cleanup(&h);
}

#[test]
fn test_typed_resolution_checks_argument_types() {
    let h = handler();
    h.load_class(
        r#"
class Doubler {
    static fn twice(n: i64) -> i64 { n * 2 }
}
"#,
    )
    .unwrap();
    assert_eq!(
        h.invoke_with("Doubler", "twice", &[Value::Int(21)], &[])
            .unwrap(),
        Value::Int(42)
    );
    // Typed resolution demands exact types; auto resolution matches by arity
    // and lets the boundary reject the mismatched record.
    let err = h
        .invoke_with("Doubler", "twice", &[Value::Float(1.5)], &[])
        .unwrap_err();
    assert!(matches!(err, DynError::MemberNotFound { .. }));
    cleanup(&h);
}

#[test]
fn test_private_member_is_access_denied() {
    let h = handler();
    h.load_class(
        r#"
class Vault {
    static fn open() -> bool { Vault::combo() == 7 }
    priv static fn combo() -> i64 { 7 }
}
"#,
    )
    .unwrap();
    assert_eq!(
        h.invoke_auto("Vault", "open", &[]).unwrap(),
        Value::Bool(true)
    );
    let err = h.invoke_auto("Vault", "combo", &[]).unwrap_err();
    assert!(matches!(err, DynError::AccessDenied { .. }));
    cleanup(&h);
}

#[test]
fn test_disabled_cache_still_returns_usable_handles() {
    let h = handler_with(HandlerConfig {
        cache_disabled: true,
        ..HandlerConfig::default()
    });
    let handle = h
        .load_class("class Loose { static fn id() -> i64 { 9 } }")
        .unwrap();
    assert!(!h.class_exists("Loose"));
    let err = h.invoke_auto("Loose", "id", &[]).unwrap_err();
    assert!(matches!(err, DynError::TypeNotFound { .. }));
    // The handle from the load itself still works.
    assert_eq!(
        h.invoke_handle_auto(&handle, "id", &[]).unwrap(),
        Value::Int(9)
    );
    cleanup(&h);
}

#[test]
fn test_remove_class_evicts_handle() {
    let h = handler();
    h.load_class("class Temp { static fn ok() -> bool { true } }")
        .unwrap();
    assert!(h.class_exists("Temp"));
    assert!(h.remove_class("Temp"));
    assert!(!h.class_exists("Temp"));
    assert!(!h.remove_class("Temp"));
    assert!(matches!(
        h.invoke_auto("Temp", "ok", &[]).unwrap_err(),
        DynError::TypeNotFound { .. }
    ));
    cleanup(&h);
}

#[test]
fn test_process_backend_judges_success_by_artifact() {
    let h = handler_with(HandlerConfig {
        backend: CompilerBackend::process_with_compiler(None, LibraryConfig::None),
        ..HandlerConfig::default()
    });
    h.load_class("class Shelly { static fn n() -> i64 { 5 } }")
        .unwrap();
    assert_eq!(h.invoke_auto("Shelly", "n", &[]).unwrap(), Value::Int(5));

    // A command that produces nothing fails, whatever its exit code.
    let h2 = handler_with(HandlerConfig {
        backend: CompilerBackend::Process {
            command: "true".to_string(),
            libraries: LibraryConfig::None,
        },
        ..HandlerConfig::default()
    });
    let err = h2
        .load_class("class Nope { static fn n() -> i64 { 0 } }")
        .unwrap_err();
    assert!(matches!(err, DynError::CompilationFailed { .. }));
    cleanup(&h);
    cleanup(&h2);
}

#[test]
fn test_one_shot_backend_compiles_self_contained_source() {
    let h = handler_with(HandlerConfig {
        backend: CompilerBackend::OneShot {
            rustc: dynclass::default_rustc(),
        },
        ..HandlerConfig::default()
    });
    h.load_class(
        r#"
namespace scratch;

class Adder {
    base: i64,
    new(base: i64) { Adder { base } }
    fn add(&self, n: i64) -> i64 { self.base + n }
}
"#,
    )
    .unwrap();
    let out = h
        .invoke_with("Adder", "add", &[Value::Int(2)], &[Value::Int(40)])
        .unwrap();
    assert_eq!(out, Value::Int(42));

    let libs = LibraryConfig::Dir(h.staging_root().to_path_buf());
    let err = h
        .load_class_with_libraries("class X { static fn z() -> i64 { 0 } }", &libs)
        .unwrap_err();
    assert!(matches!(err, DynError::LibraryOverride { .. }));
    cleanup(&h);
}

#[test]
fn test_compilation_failure_names_working_directory() {
    let h = handler();
    let err = h
        .load_class("class Bad { static fn b() -> i64 { not rust at all } }")
        .unwrap_err();
    match err {
        DynError::CompilationFailed { name, work_dir } => {
            assert_eq!(name, "Bad");
            assert!(work_dir.starts_with(h.staging_root()));
        }
        other => panic!("unexpected error: {other}"),
    }
    cleanup(&h);
}

#[test]
fn test_string_arguments_survive_separator_characters() {
    let h = handler();
    h.load_class(
        r#"class Echo { static fn echo(s: String) -> String { s } }"#,
    )
    .unwrap();
    let tricky = "a\u{1f}b\\c\nd";
    let out = h
        .invoke_auto("Echo", "echo", &[Value::from(tricky)])
        .unwrap();
    assert_eq!(out, Value::from(tricky));
    cleanup(&h);
}
