// Prevent accidental debug output in library code; diagnostics go through
// the logger so embedders control verbosity.
#![deny(clippy::print_stderr)]
#![deny(clippy::print_stdout)]

//! Runtime compilation, loading and invocation of class-shaped Rust sources.
//!
//! A [`DynamicClassHandler`] accepts a source string declaring a single
//! class, compiles it into a dynamic library through a pluggable backend,
//! loads the artifact in its own isolated library mapping, caches the
//! resulting [`TypeHandle`] under the class's logical name and lets callers
//! invoke public members reflectively, static or instance, with typed or
//! arity-matched resolution.
//!
//! ```no_run
//! use dynclass::{DynamicClassHandler, Value};
//!
//! let handler = DynamicClassHandler::new()?;
//! handler.load_class(
//!     r#"
//!     class Greeter {
//!         static fn greet(who: String) -> String { format!("hi {}", who) }
//!     }
//!     "#,
//! )?;
//! let out = handler.invoke_auto("Greeter", "greet", &[Value::from("world")])?;
//! assert_eq!(out, Value::from("hi world"));
//! # Ok::<(), dynclass::DynError>(())
//! ```

pub mod analyzer;
pub mod backend;
pub mod cache;
pub mod codegen;
pub mod command;
pub mod decl;
pub mod error;
pub mod handle;
pub mod handler;
pub mod invoker;
pub mod loader;
pub mod staging;
pub mod value;

pub use backend::{default_rustc, CompilerBackend, LibraryConfig};
pub use error::{DynError, DynResult};
pub use handle::{CtorSpec, Instance, MethodSpec, TypeHandle, TypeManifest};
pub use handler::{DynamicClassHandler, HandlerConfig};
pub use staging::extract_libraries;
pub use value::{ParamType, RetType, Value};
