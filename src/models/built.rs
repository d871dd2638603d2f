use std::collections::BTreeMap;

use serde::Serialize;

/// A test after every command template has been substituted with the merged
/// input arguments. A built test is what the runner executes.
#[derive(Debug, Clone, Serialize)]
pub struct BuiltTest {
    pub technique_id: String,
    pub test_name: String,
    pub test_guid: String,
    pub platform: String,
    pub executor: String,
    pub launcher: Vec<String>,
    pub arguments: BTreeMap<String, String>,
    pub dependency_info: Option<DependencyInfo>,
    pub attack_commands: String,
    pub cleanup_commands: String,
}

/// The built dependencies of a test together with the executor that will run
/// them.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyInfo {
    pub executor: String,
    pub launcher: Vec<String>,
    pub dependencies: Vec<BuiltDependency>,

    /// Whether the dependency executor resolved to a registered interpreter.
    /// Resolution failure is not a build error; the runner surfaces it when
    /// the commands actually run.
    #[serde(skip)]
    pub supported_executor: bool,
}

/// One built dependency: fully substituted check and install commands.
#[derive(Debug, Clone, Serialize)]
pub struct BuiltDependency {
    pub prereq_cmds: String,
    pub get_prereq_cmds: String,
}
