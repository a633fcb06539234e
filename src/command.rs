//! Child-process execution with live output draining.
//!
//! Both stdout and stderr are drained on their own threads while the child
//! runs, so a chatty compiler can never fill a pipe and deadlock. Lines are
//! forwarded to the logger as they arrive and kept for diagnostics.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

use log::{debug, warn};

use crate::error::{DynError, DynResult};

/// Captured outcome of a completed child process.
#[derive(Debug)]
pub struct CommandOutcome {
    pub status_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.status_code == Some(0)
    }
}

/// Run a prepared command to completion, draining both streams concurrently.
pub fn run_streaming(mut cmd: Command, label: &str) -> DynResult<CommandOutcome> {
    debug!("spawning {label}: {cmd:?}");
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let program = Path::new(cmd.get_program()).to_path_buf();
    let mut child = cmd.spawn().map_err(|e| DynError::io(&program, e))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let out_handle = spawn_drain(stdout, false);
    let err_handle = spawn_drain(stderr, true);

    let status = child.wait().map_err(|e| DynError::io(&program, e))?;
    let stdout = out_handle.join().unwrap_or_default();
    let stderr = err_handle.join().unwrap_or_default();

    let outcome = CommandOutcome {
        status_code: status.code(),
        stdout,
        stderr,
    };
    debug!("{label} exited with {:?}", outcome.status_code);
    Ok(outcome)
}

/// Run `line` through the platform shell, as an interactive user would.
pub fn run_shell(line: &str, label: &str) -> DynResult<CommandOutcome> {
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(line);
        c
    } else {
        let mut c = Command::new("/bin/bash");
        c.arg("-c").arg(line);
        c
    };
    cmd.env("TERM", "dumb");
    run_streaming(cmd, label)
}

fn spawn_drain<R: Read + Send + 'static>(
    stream: Option<R>,
    is_err: bool,
) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut captured = String::new();
        let Some(stream) = stream else {
            return captured;
        };
        let reader = BufReader::new(stream);
        for line in reader.lines() {
            match line {
                Ok(line) => {
                    if is_err {
                        warn!("compiler: {line}");
                    } else {
                        debug!("compiler: {line}");
                    }
                    captured.push_str(&line);
                    captured.push('\n');
                }
                Err(_) => break,
            }
        }
        captured
    })
}
