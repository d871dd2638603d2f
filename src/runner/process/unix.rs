use std::io;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use wait_timeout::ChildExt;

use super::LauncherPipes;

/// A launcher running as the leader of its own process group.
pub(crate) struct LauncherProcess {
    child: Child,
    pub pid: u32,
}

pub(crate) fn start_launcher(argv: &[String]) -> Result<(LauncherProcess, LauncherPipes)> {
    let (program, args) = argv.split_first().context("launcher argv is empty")?;

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // Fresh process group with the launcher as leader, so kill_tree can
        // reap the interpreter and every descendant with one signal.
        .process_group(0);

    let mut child = command
        .spawn()
        .with_context(|| format!("Failed to spawn launcher: {program}"))?;
    let pid = child.id();

    let pipes = LauncherPipes {
        stdin: child.stdin.take().context("launcher stdin pipe unavailable")?,
        stdout: child
            .stdout
            .take()
            .context("launcher stdout pipe unavailable")?,
        stderr: child
            .stderr
            .take()
            .context("launcher stderr pipe unavailable")?,
    };

    Ok((LauncherProcess { child, pid }, pipes))
}

impl LauncherProcess {
    pub fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait()
    }

    /// Wait for the launcher, giving up after `remaining`. A zero duration
    /// degrades to a single non-blocking poll.
    pub fn wait_deadline(&mut self, remaining: Duration) -> io::Result<Option<ExitStatus>> {
        self.child.wait_timeout(remaining)
    }

    /// SIGKILL the whole process group, then reap the launcher.
    pub fn kill_tree(&mut self) {
        tracing::debug!(pid = self.pid, "killing launcher process group");
        let _ = killpg(Pid::from_raw(self.pid as i32), Signal::SIGKILL);
        let _ = self.child.wait();
    }
}
