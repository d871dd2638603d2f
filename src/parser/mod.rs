//! Playbook parsing and corpus loading.
//!
//! A corpus is a directory tree of the form `root/<id>/<id>.yaml`, one
//! playbook file per technique directory. Directories without a matching
//! playbook are skipped so a partial corpus checkout still loads.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::models::Technique;

/// Parse one playbook document. Factored out of the file path so YAML
/// unmarshalling stays testable without touching disk.
pub fn parse(content: &str) -> Result<Technique> {
    let technique: Technique =
        serde_yaml::from_str(content).context("Failed to parse playbook YAML")?;
    Ok(technique)
}

/// Read and parse a playbook file.
pub fn parse_yaml_file(path: &Path) -> Result<Technique> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read playbook file: {}", path.display()))?;
    parse(&content).with_context(|| format!("Failed to parse playbook file: {}", path.display()))
}

/// Walk the immediate subdirectories of `root` and load every playbook
/// found at `root/<dir>/<dir>.yaml`.
///
/// Missing playbook files are skipped silently. A playbook that fails to
/// parse aborts the whole load, naming the offending file. The returned map
/// is keyed by the technique identifier from the YAML `attack_technique`
/// key; each technique's `path` is set to its containing directory and the
/// technique identifier is back-filled onto every test.
pub fn load_corpus(root: &Path) -> Result<BTreeMap<String, Technique>> {
    let mut techniques = BTreeMap::new();

    let entries = std::fs::read_dir(root)
        .with_context(|| format!("Failed to read corpus root: {}", root.display()))?;

    for entry in entries {
        let entry = entry?;
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }

        let Some(dir_name) = dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let playbook = dir.join(format!("{dir_name}.yaml"));
        if !playbook.is_file() {
            continue;
        }

        let mut technique = parse_yaml_file(&playbook)?;
        if technique.id.is_empty() {
            bail!(
                "Playbook {} has an empty attack_technique identifier",
                playbook.display()
            );
        }

        technique.path = dir;
        for test in &mut technique.atomic_tests {
            test.technique_id = technique.id.clone();
        }

        tracing::debug!(
            technique = %technique.id,
            tests = technique.atomic_tests.len(),
            "loaded playbook"
        );
        techniques.insert(technique.id.clone(), technique);
    }

    Ok(techniques)
}
