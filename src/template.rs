//! Command template expansion.
//!
//! Playbook commands carry named placeholders in two syntaxes, `#{name}`
//! and `${name}`, plus the literal atomics-folder token. Placeholder names
//! are resolved first so a defined `${PathToAtomicsFolder}` argument is not
//! shadowed by the literal rewrite that follows.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use regex::Regex;

use crate::models::Argument;

const ATOMICS_FOLDER_SIGIL: &str = "$PathToAtomicsFolder";
const ATOMICS_FOLDER_TOKEN: &str = "PathToAtomicsFolder";

/// Substitute placeholders and the atomics-folder token into one command
/// template. An empty template builds to an empty string; the result is
/// trimmed of surrounding whitespace.
pub fn build_command(
    template: &str,
    arguments: &BTreeMap<String, String>,
    atomics_folder: &str,
) -> Result<String> {
    if template.is_empty() {
        return Ok(String::new());
    }

    let command = replace_placeholders(r"#\{([A-Za-z0-9_]+)\}", template, arguments)?;
    let command = replace_placeholders(r"\$\{([A-Za-z0-9_]+)\}", &command, arguments)?;

    let command = command
        .replace(ATOMICS_FOLDER_SIGIL, atomics_folder)
        .replace(ATOMICS_FOLDER_TOKEN, atomics_folder);

    Ok(command.trim().to_string())
}

/// Replace every `pattern` placeholder occurrence with its binding from
/// `arguments`. An absent or empty binding is a missing-argument error
/// naming the full placeholder token.
fn replace_placeholders(
    pattern: &str,
    template: &str,
    arguments: &BTreeMap<String, String>,
) -> Result<String> {
    let re = Regex::new(pattern).expect("Invalid placeholder pattern");

    let mut command = template.to_string();
    for caps in re.captures_iter(template) {
        let token = &caps[0];
        let name = &caps[1];
        match arguments.get(name) {
            Some(value) if !value.is_empty() => {
                command = command.replace(token, value);
            }
            _ => bail!("no replacement argument for placeholder {token}"),
        }
    }
    Ok(command)
}

/// Merge a test's default arguments with caller-supplied overrides.
///
/// Caller keys that the test does not declare are dropped. The atomics
/// folder literal is rewritten inside every resulting value, so arguments
/// whose defaults point into the corpus resolve the same way commands do.
pub fn build_arguments(
    defaults: &BTreeMap<String, Argument>,
    caller: &BTreeMap<String, String>,
    atomics_folder: &str,
) -> BTreeMap<String, String> {
    let mut combined: BTreeMap<String, String> = defaults
        .iter()
        .map(|(name, arg)| (name.clone(), arg.default.clone()))
        .collect();

    for (name, value) in caller {
        if !defaults.contains_key(name) {
            continue;
        }
        combined.insert(name.clone(), value.clone());
    }

    for value in combined.values_mut() {
        *value = value
            .replace(ATOMICS_FOLDER_SIGIL, atomics_folder)
            .replace(ATOMICS_FOLDER_TOKEN, atomics_folder);
    }

    combined
}
