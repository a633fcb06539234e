//! Pluggable compilation backends.
//!
//! Three strategies turn a staged source file into a dynamic library:
//!
//! * [`CompilerBackend::Toolchain`] invokes the compiler binary directly with
//!   an argument vector and judges success by exit code. It is the only
//!   backend that honors a per-call library override.
//! * [`CompilerBackend::Process`] runs a caller-supplied shell line. The exit
//!   code of a shell pipeline is unreliable, so success is judged by the
//!   artifact existing afterwards; any stale artifact is removed first.
//! * [`CompilerBackend::OneShot`] shells out to the bare compiler with no
//!   library configuration at all, for self-contained sources.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info, warn};

use crate::command::{run_shell, run_streaming};
use crate::error::{DynError, DynResult};

/// Library search configuration applied at compile time.
#[derive(Debug, Clone, Default)]
pub enum LibraryConfig {
    /// No extra search paths.
    #[default]
    None,
    /// Explicit library files; their parent directories become search paths.
    Entries(Vec<PathBuf>),
    /// A single directory of libraries.
    Dir(PathBuf),
}

impl LibraryConfig {
    /// De-duplicated `-L` search directories for this configuration.
    pub fn search_dirs(&self) -> Vec<PathBuf> {
        match self {
            LibraryConfig::None => Vec::new(),
            LibraryConfig::Dir(dir) => vec![dir.clone()],
            LibraryConfig::Entries(entries) => {
                let mut dirs: Vec<PathBuf> = Vec::new();
                for entry in entries {
                    let dir = entry
                        .parent()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| PathBuf::from("."));
                    if !dirs.contains(&dir) {
                        dirs.push(dir);
                    }
                }
                dirs
            }
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, LibraryConfig::None)
    }

    /// Search directories joined with the platform path separator, for log
    /// lines.
    pub fn search_path_string(&self) -> String {
        let sep = if cfg!(windows) { ";" } else { ":" };
        self.search_dirs()
            .iter()
            .map(|d| d.display().to_string())
            .collect::<Vec<_>>()
            .join(sep)
    }
}

#[derive(Debug)]
pub enum CompilerBackend {
    /// Direct `rustc` invocation with an argument vector.
    Toolchain {
        rustc: PathBuf,
        libraries: LibraryConfig,
    },
    /// A caller-supplied shell line, run through the platform shell.
    Process {
        command: String,
        libraries: LibraryConfig,
    },
    /// Bare `rustc`, no library configuration.
    OneShot { rustc: PathBuf },
}

/// Compiler binary to use when none is configured: `$RUSTC` or `rustc`.
pub fn default_rustc() -> PathBuf {
    std::env::var_os("RUSTC")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("rustc"))
}

impl Default for CompilerBackend {
    fn default() -> Self {
        CompilerBackend::Toolchain {
            rustc: default_rustc(),
            libraries: LibraryConfig::None,
        }
    }
}

impl CompilerBackend {
    /// Shell-line backend running `rustc` (or `<dir>/rustc`) the way a user
    /// would type the compile by hand.
    pub fn process_with_compiler(dir: Option<&Path>, libraries: LibraryConfig) -> Self {
        let compiler = match dir {
            Some(dir) => dir.join("rustc").display().to_string(),
            None => "rustc".to_string(),
        };
        CompilerBackend::Process {
            command: format!(
                "{compiler} --edition=2021 --crate-type cdylib {{libs}} -o {{artifact}} {{source}}"
            ),
            libraries,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CompilerBackend::Toolchain { .. } => "toolchain",
            CompilerBackend::Process { .. } => "process",
            CompilerBackend::OneShot { .. } => "one-shot",
        }
    }

    /// Compile `source` into `artifact`. `override_libs`, when present,
    /// replaces the configured libraries for this call; only the toolchain
    /// backend accepts it.
    pub fn compile(
        &self,
        name: &str,
        source: &Path,
        artifact: &Path,
        override_libs: Option<&LibraryConfig>,
    ) -> DynResult<()> {
        if override_libs.is_some() && !matches!(self, CompilerBackend::Toolchain { .. }) {
            return Err(DynError::LibraryOverride {
                backend: self.name(),
            });
        }

        match self {
            CompilerBackend::Toolchain { rustc, libraries } => {
                let libs = override_libs.unwrap_or(libraries);
                if !libs.is_none() {
                    debug!("library path for '{name}': {}", libs.search_path_string());
                }
                let mut cmd = Command::new(rustc);
                cmd.arg("--edition=2021")
                    .arg("--crate-type")
                    .arg("cdylib")
                    .arg("-o")
                    .arg(artifact);
                for dir in libs.search_dirs() {
                    cmd.arg("-L").arg(dir);
                }
                cmd.arg(source);
                let outcome = run_streaming(cmd, name)?;
                if !outcome.success() {
                    warn!(
                        "toolchain compile of '{name}' failed:\n{}",
                        outcome.stderr.trim_end()
                    );
                    return Err(compile_failed(name, artifact));
                }
            }
            CompilerBackend::Process { command, libraries } => {
                // A previous artifact would make a failed run look successful.
                if artifact.exists() {
                    fs::remove_file(artifact).map_err(|e| DynError::io(artifact, e))?;
                }
                let line = expand_command(command, source, artifact, libraries);
                let outcome = run_shell(&line, name)?;
                if !artifact.exists() {
                    warn!(
                        "process compile of '{name}' left no artifact (exit {:?}):\n{}",
                        outcome.status_code,
                        outcome.stderr.trim_end()
                    );
                    return Err(compile_failed(name, artifact));
                }
            }
            CompilerBackend::OneShot { rustc } => {
                let mut cmd = Command::new(rustc);
                cmd.arg("--edition=2021")
                    .arg("--crate-type")
                    .arg("cdylib")
                    .arg("-o")
                    .arg(artifact)
                    .arg(source);
                let outcome = run_streaming(cmd, name)?;
                if !outcome.success() {
                    warn!(
                        "one-shot compile of '{name}' failed:\n{}",
                        outcome.stderr.trim_end()
                    );
                    return Err(compile_failed(name, artifact));
                }
            }
        }

        info!("compiled '{}' -> {}", name, artifact.display());
        Ok(())
    }
}

fn compile_failed(name: &str, artifact: &Path) -> DynError {
    DynError::CompilationFailed {
        name: name.to_string(),
        work_dir: artifact
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    }
}

/// Substitute `{source}`, `{artifact}` and `{libs}` in a shell template. A
/// template without `{source}` gets the source path appended, matching how a
/// hand-typed compile line usually ends.
fn expand_command(
    template: &str,
    source: &Path,
    artifact: &Path,
    libraries: &LibraryConfig,
) -> String {
    let libs = libraries
        .search_dirs()
        .iter()
        .map(|d| format!("-L {}", d.display()))
        .collect::<Vec<_>>()
        .join(" ");
    let mut line = template
        .replace("{artifact}", &artifact.display().to_string())
        .replace("{libs}", &libs);
    if template.contains("{source}") {
        line = line.replace("{source}", &source.display().to_string());
    } else {
        line.push(' ');
        line.push_str(&source.display().to_string());
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_rejected_outside_toolchain() {
        let backend = CompilerBackend::OneShot {
            rustc: default_rustc(),
        };
        let libs = LibraryConfig::Dir(PathBuf::from("/tmp"));
        let err = backend
            .compile(
                "Probe",
                Path::new("/tmp/Probe.rs"),
                Path::new("/tmp/libProbe.so"),
                Some(&libs),
            )
            .unwrap_err();
        assert!(matches!(err, DynError::LibraryOverride { backend: "one-shot" }));
    }

    #[test]
    fn test_search_dirs_deduplicates_entry_parents() {
        let libs = LibraryConfig::Entries(vec![
            PathBuf::from("/opt/libs/liba.so"),
            PathBuf::from("/opt/libs/libb.so"),
            PathBuf::from("/usr/lib/libc.so"),
        ]);
        assert_eq!(
            libs.search_dirs(),
            vec![PathBuf::from("/opt/libs"), PathBuf::from("/usr/lib")]
        );
    }

    #[test]
    fn test_expand_command_appends_source_without_placeholder() {
        let line = expand_command(
            "rustc --crate-type cdylib -o {artifact}",
            Path::new("/w/G.rs"),
            Path::new("/w/libG.so"),
            &LibraryConfig::None,
        );
        assert_eq!(line, "rustc --crate-type cdylib -o /w/libG.so /w/G.rs");
    }

    #[test]
    fn test_expand_command_substitutes_all_placeholders() {
        let line = expand_command(
            "cc {libs} -o {artifact} {source}",
            Path::new("/w/G.rs"),
            Path::new("/w/libG.so"),
            &LibraryConfig::Dir(PathBuf::from("/opt/libs")),
        );
        assert_eq!(line, "cc -L /opt/libs -o /w/libG.so /w/G.rs");
    }
}
