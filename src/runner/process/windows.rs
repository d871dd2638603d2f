use std::io;
use std::os::windows::io::AsRawHandle;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use wait_timeout::ChildExt;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::JobObjects::{
    AssignProcessToJobObject, CreateJobObjectW, JobObjectExtendedLimitInformation,
    SetInformationJobObject, JOBOBJECT_EXTENDED_LIMIT_INFORMATION,
    JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE,
};

use super::LauncherPipes;

/// A launcher assigned to a Job Object configured to kill every contained
/// process when the job handle closes.
pub(crate) struct LauncherProcess {
    child: Child,
    pub pid: u32,
    job: Option<JobHandle>,
}

struct JobHandle(HANDLE);

impl Drop for JobHandle {
    fn drop(&mut self) {
        // Closing the handle is the tree-kill: the kernel terminates every
        // process assigned to the job. After a normal exit there is nothing
        // left in the job and this only releases the handle.
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

fn create_job_object() -> Result<JobHandle> {
    unsafe {
        let job = CreateJobObjectW(None, PCWSTR::null()).context("Failed to create Job Object")?;

        let mut info = JOBOBJECT_EXTENDED_LIMIT_INFORMATION::default();
        info.BasicLimitInformation.LimitFlags = JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE;

        SetInformationJobObject(
            job,
            JobObjectExtendedLimitInformation,
            (&info as *const JOBOBJECT_EXTENDED_LIMIT_INFORMATION).cast(),
            std::mem::size_of::<JOBOBJECT_EXTENDED_LIMIT_INFORMATION>() as u32,
        )
        .map_err(|e| {
            let _ = CloseHandle(job);
            e
        })
        .context("Failed to configure Job Object")?;

        Ok(JobHandle(job))
    }
}

pub(crate) fn start_launcher(argv: &[String]) -> Result<(LauncherProcess, LauncherPipes)> {
    let (program, args) = argv.split_first().context("launcher argv is empty")?;

    let job = create_job_object()?;

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .with_context(|| format!("Failed to spawn launcher: {program}"))?;
    let pid = child.id();

    unsafe {
        AssignProcessToJobObject(job.0, HANDLE(child.as_raw_handle()))
            .context("Failed to assign launcher to Job Object")?;
    }

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

    Ok((
        LauncherProcess {
            child,
            pid,
            job: Some(job),
        },
        pipes,
    ))
}

impl LauncherProcess {
    pub fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait()
    }

    pub fn wait_deadline(&mut self, remaining: Duration) -> io::Result<Option<ExitStatus>> {
        self.child.wait_timeout(remaining)
    }

    /// Close the job handle, which terminates every process in the job,
    /// then reap the launcher.
    pub fn kill_tree(&mut self) {
        tracing::debug!(pid = self.pid, "closing launcher job object");
        self.job.take();
        let _ = self.child.wait();
    }
}
