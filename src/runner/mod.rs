//! Corpus selection, test building and test execution.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};

use crate::models::{
    BuiltDependency, BuiltTest, CmdRunInfo, DependencyInfo, DependencyRunInfo,
    DependencyRunResults, FilterConfig, Technique, Test, TestRunConfig, TestRunInfo,
    MANUAL_EXECUTOR,
};
use crate::{parser, template};

pub mod launcher;

mod exec;
mod process;

pub use exec::TIMEOUT_ERROR;
pub use launcher::{current_platform, launcher_for};

/// Holds the loaded corpus and drives selection, building and execution.
/// The corpus is immutable once loaded; every run owns its own launcher, so
/// a `Runner` can be shared freely across sequential calls.
#[derive(Debug, Default)]
pub struct Runner {
    atomics_folder: PathBuf,
    techniques: BTreeMap<String, Technique>,
}

impl Runner {
    pub fn new(atomics_folder: impl Into<PathBuf>) -> Self {
        Self {
            atomics_folder: atomics_folder.into(),
            techniques: BTreeMap::new(),
        }
    }

    /// Load every playbook under the corpus root. Replaces any previously
    /// loaded corpus.
    pub fn load_techniques(&mut self) -> Result<()> {
        self.techniques = parser::load_corpus(&self.atomics_folder)?;
        tracing::debug!(techniques = self.techniques.len(), "corpus loaded");
        Ok(())
    }

    pub fn all_techniques(&self) -> Vec<&Technique> {
        self.techniques.values().collect()
    }

    pub fn technique(&self, id: &str) -> Result<&Technique> {
        self.techniques
            .get(id)
            .ok_or_else(|| anyhow!("no technique found with id {id}"))
    }

    /// Narrow the corpus by technique id, platform and manual status.
    /// Techniques left with zero tests are dropped.
    pub fn filter(&self, config: &FilterConfig) -> Vec<Technique> {
        filter_techniques(self.techniques.values(), config)
    }

    /// Find a test by its stable GUID. The GUID must be unique across the
    /// whole corpus; both absence and ambiguity are errors.
    pub fn test_by_guid(&self, guid: &str) -> Result<&Test> {
        let mut found: Option<&Test> = None;
        for technique in self.techniques.values() {
            for test in &technique.atomic_tests {
                if test.auto_generated_guid != guid {
                    continue;
                }
                if found.is_some() {
                    bail!("guid {guid} matches more than one test");
                }
                found = Some(test);
            }
        }
        found.ok_or_else(|| anyhow!("no test found with guid {guid}"))
    }

    /// Find a test by technique id and 0-based position.
    pub fn test_by_id_and_index(&self, id: &str, index: usize) -> Result<&Test> {
        let technique = self.technique(id)?;
        technique.atomic_tests.get(index).ok_or_else(|| {
            anyhow!(
                "technique {id} has {} tests, index {index} is out of range",
                technique.atomic_tests.len()
            )
        })
    }

    /// Find a test by technique id and exact (case-sensitive) name.
    pub fn test_by_id_and_name(&self, id: &str, name: &str) -> Result<&Test> {
        let technique = self.technique(id)?;
        technique
            .atomic_tests
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| anyhow!("technique {id} has no test named {name}"))
    }

    /// Materialize a test: merge arguments, resolve launchers and expand
    /// every command template.
    ///
    /// Launcher resolution failure is deliberately not an error here. The
    /// raw executor name is kept as a single-element argv (an absolute
    /// interpreter path still runs that way) and the failure is recorded on
    /// the dependency info; actually unrunnable launchers surface when the
    /// commands are spawned.
    pub fn build_test(
        &self,
        test: &Test,
        caller_args: &BTreeMap<String, String>,
    ) -> Result<BuiltTest> {
        let atomics_folder = self.atomics_folder.to_string_lossy().into_owned();
        let arguments = template::build_arguments(&test.input_arguments, caller_args, &atomics_folder);

        let launcher = match launcher_for(&test.executor.name) {
            Ok(argv) => argv,
            Err(err) => {
                tracing::debug!(executor = %test.executor.name, %err, "launcher fallback to raw argv");
                vec![test.executor.name.clone()]
            }
        };

        let dependency_info = if test.dependencies.is_empty() {
            None
        } else {
            let executor = if test.dependency_executor_name.is_empty() {
                test.executor.name.clone()
            } else {
                test.dependency_executor_name.clone()
            };
            let (dep_launcher, supported_executor) = match launcher_for(&executor) {
                Ok(argv) => (argv, true),
                Err(_) => (vec![executor.clone()], false),
            };

            let mut dependencies = Vec::with_capacity(test.dependencies.len());
            for (i, dependency) in test.dependencies.iter().enumerate() {
                let prereq_cmds =
                    template::build_command(&dependency.prereq_command, &arguments, &atomics_folder)
                        .with_context(|| format!("dependency[{i}].prereq"))?;
                let get_prereq_cmds = template::build_command(
                    &dependency.get_prereq_command,
                    &arguments,
                    &atomics_folder,
                )
                .with_context(|| format!("dependency[{i}].get_prereq"))?;
                dependencies.push(BuiltDependency {
                    prereq_cmds,
                    get_prereq_cmds,
                });
            }

            Some(DependencyInfo {
                executor,
                launcher: dep_launcher,
                dependencies,
                supported_executor,
            })
        };

        let attack_commands =
            template::build_command(&test.executor.command, &arguments, &atomics_folder)
                .context("attack")?;
        let cleanup_commands =
            template::build_command(&test.executor.cleanup_command, &arguments, &atomics_folder)
                .context("cleanup")?;

        Ok(BuiltTest {
            technique_id: test.technique_id.clone(),
            test_name: test.name.clone(),
            test_guid: test.auto_generated_guid.clone(),
            platform: current_platform().to_string(),
            executor: test.executor.name.clone(),
            launcher,
            arguments,
            dependency_info,
            attack_commands,
            cleanup_commands,
        })
    }

    /// Build and execute a test.
    ///
    /// The optional timeout becomes a single deadline covering every phase.
    /// Phases run in dependency, attack, cleanup order; a failing phase is
    /// recorded and later phases still run. The partial run info is always
    /// returned together with the list of phase errors.
    ///
    /// Fails outright (no run info) only for manual tests and build-time
    /// errors, which happen before anything is spawned.
    pub fn run_test(
        &self,
        test: &Test,
        caller_args: &BTreeMap<String, String>,
        config: &TestRunConfig,
        timeout: Option<Duration>,
    ) -> Result<(TestRunInfo, Vec<anyhow::Error>)> {
        if test.is_manual() {
            bail!(
                "test {}:{} uses a manual executor and can only be listed",
                test.technique_id,
                test.name
            );
        }

        let built = self.build_test(test, caller_args)?;
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut errors = Vec::new();

        let dependency_info = match (&built.dependency_info, config.dependency_phase_enabled()) {
            (Some(info), true) => Some(Self::run_dependencies(info, config, deadline, &mut errors)),
            _ => None,
        };

        let atomic_test = if config.attack_enabled() {
            Self::run_phase(
                &built.launcher,
                &built.attack_commands,
                config,
                deadline,
                &mut errors,
            )
        } else {
            Vec::new()
        };

        let cleanup = if config.cleanup_enabled() {
            Self::run_phase(
                &built.launcher,
                &built.cleanup_commands,
                config,
                deadline,
                &mut errors,
            )
        } else {
            Vec::new()
        };

        let info = TestRunInfo {
            technique_id: built.technique_id,
            test_name: built.test_name,
            test_guid: built.test_guid,
            platform: built.platform,
            executor: built.executor,
            launcher: built.launcher,
            arguments: built.arguments,
            dependency_info,
            atomic_test,
            cleanup,
        };
        Ok((info, errors))
    }

    /// Run one phase's command string, honoring the empty-command contract:
    /// under `all` an empty phase is skipped silently, while an individually
    /// enabled empty phase surfaces the engine's "no commands provided".
    fn run_phase(
        launcher: &[String],
        commands: &str,
        config: &TestRunConfig,
        deadline: Option<Instant>,
        errors: &mut Vec<anyhow::Error>,
    ) -> Vec<CmdRunInfo> {
        if config.all && commands.is_empty() {
            return Vec::new();
        }
        let outcome = exec::run_commands(launcher, commands, deadline, config.split_by_newline);
        if let Some(error) = outcome.error {
            errors.push(error);
        }
        outcome.runs
    }

    /// Check every dependency in order, installing the ones whose check
    /// exited non-zero when the install phase is enabled.
    ///
    /// A check's non-zero exit is the "prerequisite unmet" signal, not an
    /// error; only spawn failures and timeouts from the check join the
    /// aggregate list. Install failures always do.
    fn run_dependencies(
        info: &DependencyInfo,
        config: &TestRunConfig,
        deadline: Option<Instant>,
        errors: &mut Vec<anyhow::Error>,
    ) -> DependencyRunInfo {
        let mut dependencies = Vec::with_capacity(info.dependencies.len());

        for dependency in &info.dependencies {
            let mut results = DependencyRunResults::default();

            let check = if config.all && dependency.prereq_cmds.is_empty() {
                exec::PhaseOutcome {
                    runs: Vec::new(),
                    error: None,
                }
            } else {
                exec::run_commands(
                    &info.launcher,
                    &dependency.prereq_cmds,
                    deadline,
                    config.split_by_newline,
                )
            };
            let satisfied = check.error.is_none();
            if let Some(error) = check.error {
                let exited = check
                    .runs
                    .last()
                    .and_then(|run| run.result.as_ref())
                    .is_some_and(|result| result.exit_code >= 0);
                if !exited {
                    errors.push(error);
                }
            }
            results.prereq = check.runs;

            if !satisfied && config.get_prereq_enabled() {
                results.get_prereq = Self::run_phase(
                    &info.launcher,
                    &dependency.get_prereq_cmds,
                    config,
                    deadline,
                    errors,
                );
            }

            dependencies.push(results);
        }

        DependencyRunInfo {
            launcher: info.launcher.clone(),
            dependencies,
        }
    }
}

/// Apply a [`FilterConfig`] to a set of techniques, narrowing each
/// technique's test list and dropping techniques that end up empty.
///
/// Tests with an empty executor name survive the manual filter: they are
/// listable, and refusing to run them is the runner's job. Only the literal
/// `manual` executor is filtered out.
pub fn filter_techniques<'a>(
    techniques: impl IntoIterator<Item = &'a Technique>,
    config: &FilterConfig,
) -> Vec<Technique> {
    let mut out = Vec::new();
    for technique in techniques {
        if !config.techniques.is_empty() && !config.techniques.iter().any(|id| *id == technique.id)
        {
            continue;
        }

        let tests: Vec<Test> = technique
            .atomic_tests
            .iter()
            .filter(|test| {
                if !config.platform.is_empty()
                    && !test
                        .supported_platforms
                        .iter()
                        .any(|p| *p == config.platform)
                {
                    return false;
                }
                if !config.include_manual && test.executor.name == MANUAL_EXECUTOR {
                    return false;
                }
                true
            })
            .cloned()
            .collect();

        if tests.is_empty() {
            continue;
        }
        out.push(Technique {
            atomic_tests: tests,
            ..technique.clone()
        });
    }
    out
}
