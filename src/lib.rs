//! Executes security test cases drawn from a library of attacker-technique
//! playbooks.
//!
//! A playbook corpus is loaded once into an immutable [`runner::Runner`],
//! tests are selected by technique id, index, name or GUID, command
//! templates are expanded with caller arguments, and the resulting commands
//! run under a registered interpreter with captured output and a
//! whole-process-tree timeout.

pub mod models;
pub mod parser;
pub mod runner;
pub mod template;
