//! Interpreter registry.
//!
//! Maps the symbolic executor names used by playbooks to a launcher argv:
//! an absolute interpreter path resolved through `PATH` followed by the
//! flags that put the interpreter into read-commands-from-stdin mode.

use anyhow::{bail, Context, Result};

/// Resolve a recognized executor name to its launcher argv.
///
/// `manual` is deliberately not registered; manual tests cannot be run.
/// A recognized interpreter that is missing from `PATH` is an error here,
/// which [`crate::runner::Runner::build_test`] downgrades to a raw-argv
/// fallback.
pub fn launcher_for(executor: &str) -> Result<Vec<String>> {
    match executor {
        "sh" => Ok(vec![resolve("sh")?, "-".to_string()]),
        "bash" => Ok(vec![resolve("bash")?, "-".to_string()]),
        "powershell" => Ok(vec![
            resolve("powershell")?,
            "-NoProfile".to_string(),
            "-NoLogo".to_string(),
            "-Command".to_string(),
            "-".to_string(),
        ]),
        // Playbooks written for the Windows shell still smoke-run on unix
        // hosts through sh.
        "command_prompt" if cfg!(windows) => Ok(vec![resolve("cmd")?, "/Q".to_string()]),
        "command_prompt" => Ok(vec![resolve("sh")?, "-".to_string()]),
        _ => bail!("executor {executor} is not supported"),
    }
}

fn resolve(interpreter: &str) -> Result<String> {
    let path = which::which(interpreter)
        .with_context(|| format!("interpreter {interpreter} not found on PATH"))?;
    Ok(path.to_string_lossy().into_owned())
}

/// The platform tag of the host, as used in `supported_platforms` lists.
pub fn current_platform() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "macos"
    } else {
        "linux"
    }
}
