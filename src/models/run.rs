use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// The details of a built test together with the results of running it.
/// Mirrors [`super::BuiltTest`] with each command template replaced by the
/// ordered list of commands that actually ran.
#[derive(Debug, Clone, Serialize)]
pub struct TestRunInfo {
    pub technique_id: String,
    pub test_name: String,
    pub test_guid: String,
    pub platform: String,
    pub executor: String,
    pub launcher: Vec<String>,
    pub arguments: BTreeMap<String, String>,
    pub dependency_info: Option<DependencyRunInfo>,
    pub atomic_test: Vec<CmdRunInfo>,
    pub cleanup: Vec<CmdRunInfo>,
}

/// One command that was fed to a launcher and what came back. `result` is
/// `None` only when the launcher itself failed to spawn.
#[derive(Debug, Clone, Serialize)]
pub struct CmdRunInfo {
    pub command: String,
    pub result: Option<CmdResult>,
}

/// Results of the dependency phase of one test run.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyRunInfo {
    pub launcher: Vec<String>,
    pub dependencies: Vec<DependencyRunResults>,
}

/// The commands and results of running a single dependency. `get_prereq`
/// stays empty when the prerequisite check exited zero.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DependencyRunResults {
    pub prereq: Vec<CmdRunInfo>,
    pub get_prereq: Vec<CmdRunInfo>,
}

/// Captured outcome of one launcher invocation. On a timeout the exit code
/// is `-1` and the captured output may be truncated.
#[derive(Debug, Clone, Serialize)]
pub struct CmdResult {
    pub pid: u32,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}
