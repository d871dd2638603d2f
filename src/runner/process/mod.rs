//! Platform launcher processes.
//!
//! A launcher is spawned inside its own process group (POSIX) or Job Object
//! (Windows) so that a timeout can tear down the interpreter together with
//! every descendant it spawned. Both implementations expose the same narrow
//! surface: spawn an argv with a piped stdio triple, wait with an optional
//! bound, and `kill_tree`.

use std::process::{ChildStderr, ChildStdin, ChildStdout};

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub(crate) use unix::{start_launcher, LauncherProcess};
#[cfg(windows)]
pub(crate) use windows::{start_launcher, LauncherProcess};

/// The stdio triple of a spawned launcher. Handed out separately from the
/// process handle so the feeder and reader threads can own their ends.
pub(crate) struct LauncherPipes {
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}
