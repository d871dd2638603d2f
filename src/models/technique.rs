use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Executor name that marks a test as not runnable by the engine.
pub const MANUAL_EXECUTOR: &str = "manual";

/// A single attacker technique loaded from one playbook file.
///
/// The identifier comes from the YAML `attack_technique` key; `path` is
/// never read from the file and is filled in by the corpus loader with the
/// directory the playbook was found in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Technique {
    #[serde(rename = "attack_technique", default)]
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(skip_deserializing, default)]
    pub path: PathBuf,
    #[serde(default)]
    pub atomic_tests: Vec<Test>,
}

impl PartialEq for Technique {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Technique {}

/// One runnable (or manual) test belonging to a technique.
///
/// `technique_id` is a back-reference filled in by the corpus loader; the
/// playbook YAML does not carry it per test.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Test {
    #[serde(skip_deserializing, default)]
    pub technique_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub auto_generated_guid: String,
    #[serde(default)]
    pub supported_platforms: Vec<String>,
    #[serde(default)]
    pub input_arguments: BTreeMap<String, Argument>,
    #[serde(default)]
    pub dependency_executor_name: String,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub executor: Executor,
}

impl Test {
    /// A test without a real executor can only be listed, never run.
    pub fn is_manual(&self) -> bool {
        self.executor.name.is_empty() || self.executor.name == MANUAL_EXECUTOR
    }
}

/// A named input parameter of a test. The type tag is free-form and is not
/// interpreted by the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Argument {
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "type")]
    pub arg_type: String,
    #[serde(default)]
    pub default: String,
}

/// A prerequisite of a test: a check command whose exit status says whether
/// the prerequisite is met, and an install command that tries to meet it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dependency {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub prereq_command: String,
    #[serde(default)]
    pub get_prereq_command: String,
}

/// The interpreter block of a test. A missing executor block deserializes to
/// the default (empty name), which classifies the test as manual.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Executor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub elevation_required: bool,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub cleanup_command: String,
}
