//! Command execution engine.
//!
//! Commands run under a launcher: an interpreter spawned with a piped stdio
//! triple that reads the command text from stdin. A feeder thread writes
//! the commands, two reader threads drain stdout and stderr, and the waiter
//! is bounded by the remaining deadline. On a timeout the whole launcher
//! process tree is killed and the result carries exit code `-1`.

use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use anyhow::anyhow;
use chrono::Utc;

use super::process::start_launcher;
use crate::models::{CmdResult, CmdRunInfo};

/// Sentinel error message attached to every timed-out command.
pub const TIMEOUT_ERROR: &str = "command timed out";

/// Results of running one phase's commands plus the first error hit, if
/// any. The runs list is always populated as far as execution got.
pub(crate) struct PhaseOutcome {
    pub runs: Vec<CmdRunInfo>,
    pub error: Option<anyhow::Error>,
}

/// Run a command string under the launcher.
///
/// In block mode the whole string goes to one launcher invocation. In line
/// mode each non-empty trimmed line gets a fresh invocation and execution
/// stops at the first failure. The deadline spans all invocations.
pub(crate) fn run_commands(
    launcher: &[String],
    commands: &str,
    deadline: Option<Instant>,
    split_by_newline: bool,
) -> PhaseOutcome {
    if commands.is_empty() {
        return PhaseOutcome {
            runs: Vec::new(),
            error: Some(anyhow!("no commands provided")),
        };
    }

    if split_by_newline {
        let mut runs = Vec::new();
        for line in commands.split('\n') {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (result, error) = run_command(launcher, line, deadline);
            runs.push(CmdRunInfo {
                command: line.to_string(),
                result,
            });
            if error.is_some() {
                return PhaseOutcome { runs, error };
            }
        }
        return PhaseOutcome { runs, error: None };
    }

    let (result, error) = run_command(launcher, commands, deadline);
    PhaseOutcome {
        runs: vec![CmdRunInfo {
            command: commands.to_string(),
            result,
        }],
        error,
    }
}

/// Spawn one launcher, feed it `command`, capture its output and wait for
/// it within the deadline. Returns the captured result (absent only when
/// the spawn itself failed) and the error of this invocation, if any. A
/// non-zero exit is an error, but the captured result is still returned.
fn run_command(
    launcher: &[String],
    command: &str,
    deadline: Option<Instant>,
) -> (Option<CmdResult>, Option<anyhow::Error>) {
    // The deadline is checked before every spawn so a test whose budget is
    // already spent records a timed-out result for each remaining phase
    // instead of launching interpreters it would kill immediately.
    if deadline.is_some_and(|d| Instant::now() >= d) {
        let now = Utc::now();
        let result = CmdResult {
            pid: 0,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: -1,
            start_time: now,
            end_time: now,
        };
        return (Some(result), Some(anyhow!(TIMEOUT_ERROR)));
    }

    let (mut process, pipes) = match start_launcher(launcher) {
        Ok(spawned) => spawned,
        Err(err) => return (None, Some(err)),
    };
    let start_time = Utc::now();
    let pid = process.pid;
    tracing::debug!(pid, command, "spawned launcher");

    // Feeder: the trailing newline makes the interpreter start executing;
    // closing stdin tells it there is nothing more to run. A write failure
    // means the launcher is already gone, which the waiter will report.
    let mut stdin = pipes.stdin;
    let script = command.to_string();
    thread::spawn(move || {
        let _ = stdin.write_all(script.as_bytes());
        let _ = stdin.write_all(b"\n");
    });

    let stdout = Capture::spawn(pipes.stdout);
    let stderr = Capture::spawn(pipes.stderr);

    let waited = match deadline {
        Some(deadline) => {
            let remaining = deadline.saturating_duration_since(Instant::now());
            process.wait_deadline(remaining)
        }
        None => process.wait().map(Some),
    };

    let (exit_code, error, stdout, stderr) = match waited {
        Ok(Some(status)) => {
            // Normal exit: both pipes reach EOF once the launcher and its
            // descendants are gone, so joining the readers cannot lose
            // trailing output.
            let code = status.code().unwrap_or(-1);
            let error = (code != 0).then(|| anyhow!("command exited with code {code}"));
            (code, error, stdout.join(), stderr.join())
        }
        Ok(None) => {
            // Deadline elapsed. Kill the whole tree and return right away;
            // the readers are abandoned, so the capture may be truncated.
            process.kill_tree();
            (-1, Some(anyhow!(TIMEOUT_ERROR)), stdout.take(), stderr.take())
        }
        Err(err) => {
            process.kill_tree();
            let error = anyhow::Error::new(err).context("failed to wait for launcher");
            (-1, Some(error), stdout.take(), stderr.take())
        }
    };

    let result = CmdResult {
        pid,
        stdout,
        stderr,
        exit_code,
        start_time,
        end_time: Utc::now(),
    };
    tracing::debug!(pid, exit_code, "launcher finished");
    (Some(result), error)
}

/// A reader thread draining one output pipe into a shared byte buffer.
/// The buffer is shared so the timeout path can grab whatever arrived
/// without waiting for EOF.
struct Capture {
    buf: Arc<Mutex<Vec<u8>>>,
    handle: thread::JoinHandle<()>,
}

impl Capture {
    fn spawn<R: Read + Send + 'static>(mut stream: R) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let shared = Arc::clone(&buf);
        let handle = thread::spawn(move || {
            let mut chunk = [0u8; 4096];
            loop {
                match stream.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let mut buf = shared.lock().unwrap_or_else(|e| e.into_inner());
                        buf.extend_from_slice(&chunk[..n]);
                    }
                }
            }
        });
        Self { buf, handle }
    }

    /// Wait for EOF, then return everything the pipe produced.
    fn join(self) -> String {
        let _ = self.handle.join();
        Self::drain(&self.buf)
    }

    /// Return what has arrived so far without waiting for the reader.
    fn take(self) -> String {
        Self::drain(&self.buf)
    }

    fn drain(buf: &Arc<Mutex<Vec<u8>>>) -> String {
        let buf = buf.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&buf).into_owned()
    }
}
