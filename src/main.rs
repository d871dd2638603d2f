use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use colored::Colorize;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use atomicrun::models::{BuiltTest, FilterConfig, Test, TestRunConfig, TestRunInfo};
use atomicrun::runner::Runner;

#[derive(Parser)]
#[command(name = "atomicrun")]
#[command(about = "Run atomic red team technique tests from a playbook corpus", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the atomics corpus root
    #[arg(long)]
    path: PathBuf,

    /// Comma-separated technique ids (e.g. T1002,T1003)
    #[arg(long)]
    tech: Option<String>,

    /// Test number within a single technique [1-N]
    #[arg(long, conflicts_with = "name")]
    num: Option<usize>,

    /// Name of the test to select (exact match)
    #[arg(long)]
    name: Option<String>,

    /// Comma-separated test guids
    #[arg(long, conflicts_with = "tech")]
    guid: Option<String>,

    /// Deadline covering all phases of one test (e.g. 30s, 2m)
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Build the test and show what would execute, without running it
    #[arg(long, conflicts_with_all = ["run", "test", "prereq", "dependency", "cleanup"])]
    dry_run: bool,

    /// Run dependencies, attack commands and cleanup for the selected tests
    #[arg(long, conflicts_with_all = ["test", "prereq", "dependency", "cleanup"])]
    run: bool,

    /// Run only the attack commands
    #[arg(long)]
    test: bool,

    /// Check whether the prerequisites of the test are met
    #[arg(long)]
    prereq: bool,

    /// Check prerequisites and install the ones that are missing
    #[arg(long)]
    dependency: bool,

    /// Run only the cleanup commands
    #[arg(long)]
    cleanup: bool,

    /// Pass an argument to the test (key=value, repeatable)
    #[arg(long = "arg", value_name = "KEY=VALUE")]
    args: Vec<String>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn is_run(&self) -> bool {
        self.run || self.test || self.prereq || self.dependency || self.cleanup
    }

    fn run_config(&self) -> TestRunConfig {
        TestRunConfig {
            all: self.run,
            check_prereq: self.prereq,
            get_prereq: self.dependency,
            attack: self.test,
            cleanup: self.cleanup,
            split_by_newline: false,
        }
    }

    /// Selection rules clap's derive cannot express.
    fn validate(&self, techniques: &[String]) -> Result<()> {
        if (self.num.is_some() || self.name.is_some()) && techniques.len() != 1 {
            bail!(
                "--num and --name require exactly one --tech, \
                 for example: --tech T1002 --num 1"
            );
        }
        if let Some(num) = self.num {
            if num == 0 {
                bail!("invalid test number, valid test numbers are 1-N");
            }
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let techniques = split_list(cli.tech.as_deref());
    let guids = split_list(cli.guid.as_deref());
    cli.validate(&techniques)?;

    let caller_args = parse_arguments(&cli.args)?;

    let mut runner = Runner::new(&cli.path);
    runner.load_techniques()?;

    if !guids.is_empty() {
        for guid in &guids {
            match runner.test_by_guid(guid) {
                Ok(test) => {
                    if let Err(err) = handle_test(&runner, test, &caller_args, &cli) {
                        eprintln!("{} {err:#}", "error:".red());
                    }
                }
                Err(err) => eprintln!("{} {err:#}", "error:".red()),
            }
        }
        return Ok(());
    }

    if techniques.len() == 1 {
        if let Some(num) = cli.num {
            let test = runner.test_by_id_and_index(&techniques[0], num - 1)?;
            return handle_test(&runner, test, &caller_args, &cli);
        }
        if let Some(name) = &cli.name {
            let test = runner.test_by_id_and_name(&techniques[0], name.trim())?;
            return handle_test(&runner, test, &caller_args, &cli);
        }
    }

    let filtered = runner.filter(&FilterConfig {
        platform: String::new(),
        techniques: techniques.clone(),
        include_manual: true,
    });
    if filtered.is_empty() {
        bail!(
            "no tests found matching criteria, techniques: {}",
            if techniques.is_empty() {
                "all".to_string()
            } else {
                techniques.join(",")
            }
        );
    }

    for technique in &filtered {
        for test in &technique.atomic_tests {
            // Per-test failures are reported but never stop the batch.
            if let Err(err) = handle_test(&runner, test, &caller_args, &cli) {
                eprintln!("{} {err:#}", "error:".red());
            }
        }
    }
    Ok(())
}

/// Dispatch one selected test to list, dry-run or execute mode.
fn handle_test(
    runner: &Runner,
    test: &Test,
    caller_args: &BTreeMap<String, String>,
    cli: &Cli,
) -> Result<()> {
    if cli.dry_run {
        match runner.build_test(test, caller_args) {
            Ok(built) => print_json(&BuiltDocument {
                built: Some(&built),
                error: String::new(),
            }),
            Err(err) => print_json(&BuiltDocument {
                built: None,
                error: format!("{err:#}"),
            }),
        }?;
        return Ok(());
    }

    if !cli.is_run() {
        return print_json(test);
    }

    if cli.cleanup && test.executor.cleanup_command.is_empty() {
        bail!(
            "no cleanup command for test {}:{}",
            test.technique_id,
            test.name
        );
    }
    if (cli.prereq || cli.dependency) && test.dependencies.is_empty() {
        bail!(
            "no dependencies for test {}:{}",
            test.technique_id,
            test.name
        );
    }

    // Execution failures land in the output document; the process itself
    // still exits zero so batch runs report every test.
    match runner.run_test(test, caller_args, &cli.run_config(), cli.timeout) {
        Ok((info, errors)) => print_json(&RunDocument {
            info: Some(&info),
            error: errors.iter().map(|e| e.to_string()).collect(),
        }),
        Err(err) => print_json(&RunDocument {
            info: None,
            error: vec![format!("{err:#}")],
        }),
    }
}

#[derive(Serialize)]
struct BuiltDocument<'a> {
    #[serde(flatten)]
    built: Option<&'a BuiltTest>,
    error: String,
}

#[derive(Serialize)]
struct RunDocument<'a> {
    #[serde(flatten)]
    info: Option<&'a TestRunInfo>,
    error: Vec<String>,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    // serde_json writes 2-space indented output and leaves HTML characters
    // unescaped, so command strings survive verbatim.
    let doc = serde_json::to_string_pretty(value)?;
    println!("{doc}");
    Ok(())
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Parse repeated `--arg key=value` flags into the caller argument map.
fn parse_arguments(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut arguments = BTreeMap::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("argument {pair} is not properly formatted, use key=value");
        };
        if key.is_empty() {
            bail!("argument {pair} is not properly formatted, use key=value");
        }
        arguments.insert(key.to_string(), value.to_string());
    }
    Ok(arguments)
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("atomicrun=debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list_trims_and_drops_empties() {
        assert_eq!(
            vec!["T1002".to_string(), "T1003".to_string()],
            split_list(Some("T1002, T1003,"))
        );
        assert!(split_list(None).is_empty());
    }

    #[test]
    fn test_parse_arguments() {
        let args = parse_arguments(&[
            "file=/tmp/a.txt".to_string(),
            "flags=a=b".to_string(),
        ])
        .unwrap();
        assert_eq!("/tmp/a.txt", args["file"]);
        assert_eq!("a=b", args["flags"]);

        assert!(parse_arguments(&["novalue".to_string()]).is_err());
        assert!(parse_arguments(&["=value".to_string()]).is_err());
    }

    #[test]
    fn test_num_requires_single_tech() {
        let cli = Cli::parse_from([
            "atomicrun", "--path", "/tmp", "--tech", "T1,T2", "--num", "1",
        ]);
        assert!(cli.validate(&split_list(cli.tech.as_deref())).is_err());

        let cli = Cli::parse_from(["atomicrun", "--path", "/tmp", "--num", "1"]);
        assert!(cli.validate(&[]).is_err());

        let cli = Cli::parse_from([
            "atomicrun", "--path", "/tmp", "--tech", "T1", "--num", "1",
        ]);
        assert!(cli.validate(&split_list(cli.tech.as_deref())).is_ok());
    }

    #[test]
    fn test_run_excludes_phase_flags() {
        let parsed = Cli::try_parse_from([
            "atomicrun", "--path", "/tmp", "--run", "--cleanup",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_dry_run_excludes_run_flags() {
        let parsed = Cli::try_parse_from([
            "atomicrun", "--path", "/tmp", "--dry-run", "--run",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_num_and_name_conflict() {
        let parsed = Cli::try_parse_from([
            "atomicrun", "--path", "/tmp", "--tech", "T1", "--num", "1", "--name", "x",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_guid_excludes_tech() {
        let parsed = Cli::try_parse_from([
            "atomicrun", "--path", "/tmp", "--guid", "abc", "--tech", "T1",
        ]);
        assert!(parsed.is_err());
    }
}
