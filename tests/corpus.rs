//! Corpus loading, filtering and selection against an on-disk fixture tree.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use atomicrun::models::FilterConfig;
use atomicrun::runner::{filter_techniques, Runner};

const T1001_YAML: &str = r#"---
attack_technique: T1001
display_name: Archive Collected Data

atomic_tests:
  - name: Compress home directory
    description: |
      Compress files before exfiltration.
    auto_generated_guid: 7df3cd46-0bb4-4b9a-b1a1-aa21b5b0b4a2
    supported_platforms:
      - linux
      - macos
      - windows
    input_arguments:
      input_dir:
        description: directory to archive
        type: Path
        default: PathToAtomicsFolder/src
    executor:
      name: sh
      elevation_required: false
      command: |
        tar czf /tmp/archive.tgz ${input_dir}
      cleanup_command: |
        rm -f /tmp/archive.tgz
"#;

const T1002_YAML: &str = r#"---
attack_technique: T1002
display_name: Data Compressed

atomic_tests:
  - name: Data Compressed - zip
    auto_generated_guid: 52ebbcfe-3d76-4c30-8253-a3c0dc3fcbfb
    supported_platforms:
      - linux
    executor:
      name: sh
      command: |
        zip /tmp/out.zip /tmp/out

  - name: Data Compressed - gzip
    auto_generated_guid: cde4bcf1-a826-41d9-a9b8-0d9722d35d1c
    supported_platforms:
      - linux
      - macos
    executor:
      name: sh
      command: |
        gzip -k /tmp/out
"#;

const T9999_YAML: &str = r#"---
attack_technique: T9999
display_name: TestData

atomic_tests:
  - name: Test1
    description: |
      Test Linux & Mac
    supported_platforms:
      - macos
      - linux
    input_arguments:
      file_name:
        description: filename
        type: Path
        default: PathToAtomicsFolder/src/test.txt
    executor:
      name: command_prompt
      elevation_required: false
      command: |
        cat ${file_name}

  - name: Test2
    description: |
      Test Windows
    supported_platforms:
      - windows
    executor:
      name: powershell
      command: |
        cat ${file_name}

  - name: Test3
    description: |
      Test without executor
    supported_platforms:
      - macos

  - name: Test4
    description: |
      Manual test
    supported_platforms:
      - macos
    executor:
      name: manual
      steps: do nothing
"#;

const T9000_YAML: &str = r#"---
attack_technique: T9000
display_name: Manual Only

atomic_tests:
  - name: Follow the runbook
    supported_platforms:
      - linux
    executor:
      name: manual
      steps: read the runbook
"#;

fn write_playbook(root: &Path, id: &str, content: &str) {
    let dir = root.join(id);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(format!("{id}.yaml")), content).unwrap();
}

/// Four techniques, one of which only has a manual test, plus a directory
/// without a playbook and a stray file, both of which must be ignored.
fn fixture_corpus() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_playbook(root, "T1001", T1001_YAML);
    write_playbook(root, "T1002", T1002_YAML);
    write_playbook(root, "T9999", T9999_YAML);
    write_playbook(root, "T9000", T9000_YAML);
    fs::create_dir_all(root.join("docs")).unwrap();
    fs::write(root.join("README.md"), "not a technique").unwrap();
    dir
}

fn loaded_runner(dir: &TempDir) -> Runner {
    let mut runner = Runner::new(dir.path());
    runner.load_techniques().unwrap();
    runner
}

#[test]
fn test_load_corpus_counts_and_backfill() {
    let dir = fixture_corpus();
    let runner = loaded_runner(&dir);
    assert_eq!(4, runner.all_techniques().len());

    let technique = runner.technique("T9999").unwrap();
    assert_eq!("T9999", technique.id);
    assert_eq!("TestData", technique.display_name);
    assert_eq!(dir.path().join("T9999"), technique.path);
    assert_eq!(4, technique.atomic_tests.len());
    assert_eq!("Test1", technique.atomic_tests[0].name);
    // The technique id is back-filled onto each test.
    assert_eq!("T9999", technique.atomic_tests[0].technique_id);
}

#[test]
fn test_load_skips_directories_without_playbooks() {
    let dir = fixture_corpus();
    let runner = loaded_runner(&dir);
    assert!(runner.technique("docs").is_err());
}

#[test]
fn test_load_aborts_on_malformed_playbook() {
    let dir = fixture_corpus();
    write_playbook(dir.path(), "T6666", "attack_technique: [unclosed");

    let mut runner = Runner::new(dir.path());
    let err = runner.load_techniques().unwrap_err();
    assert!(format!("{err:#}").contains("T6666.yaml"));
}

#[test]
fn test_load_rejects_empty_identifier() {
    let dir = TempDir::new().unwrap();
    write_playbook(dir.path(), "T7777", "display_name: No Id\natomic_tests: []\n");

    let mut runner = Runner::new(dir.path());
    let err = runner.load_techniques().unwrap_err();
    assert!(err.to_string().contains("empty attack_technique"));
}

#[test]
fn test_load_missing_root_is_fatal() {
    let mut runner = Runner::new("/nonexistent/atomics/root");
    assert!(runner.load_techniques().is_err());
}

fn filter_of(platform: &str, techniques: &[&str], include_manual: bool) -> FilterConfig {
    FilterConfig {
        platform: platform.to_string(),
        techniques: techniques.iter().map(|t| t.to_string()).collect(),
        include_manual,
    }
}

#[test]
fn test_filter_narrows_tests() {
    let dir = fixture_corpus();
    let runner = loaded_runner(&dir);

    // (platform, include_manual) -> expected (techniques, tests in T9999)
    let cases = [
        (filter_of("", &["T9999"], true), (1, 4)),
        // Only the literal manual executor is filtered; a test without any
        // executor stays listable.
        (filter_of("", &["T9999"], false), (1, 3)),
        (filter_of("macos", &["T9999"], false), (1, 2)),
        (filter_of("macos", &["T9999"], true), (1, 3)),
    ];
    for (config, (techniques, tests)) in cases {
        let out = runner.filter(&config);
        assert_eq!(techniques, out.len(), "config: {config:?}");
        assert_eq!(tests, out[0].atomic_tests.len(), "config: {config:?}");
    }
}

#[test]
fn test_filter_narrows_techniques() {
    let dir = fixture_corpus();
    let runner = loaded_runner(&dir);

    let cases = [
        (filter_of("", &["TXXXX"], false), 0),
        (filter_of("linux", &["T9999"], false), 1),
        (filter_of("fake", &["T9999"], false), 0),
        // T9000 only has a manual test, so it drops out entirely.
        (filter_of("", &[], false), 3),
        (filter_of("", &[], true), 4),
    ];
    for (config, expected) in cases {
        let out = runner.filter(&config);
        assert_eq!(expected, out.len(), "config: {config:?}");
    }
}

#[test]
fn test_filter_without_criteria_keeps_everything() {
    let dir = fixture_corpus();
    let runner = loaded_runner(&dir);

    let filtered = runner.filter(&filter_of("", &[], true));
    assert_eq!(runner.all_techniques().len(), filtered.len());
    for technique in &filtered {
        let original = runner.technique(&technique.id).unwrap();
        assert_eq!(
            serde_json::to_value(original).unwrap(),
            serde_json::to_value(technique).unwrap()
        );
    }
}

#[test]
fn test_filter_is_idempotent() {
    let dir = fixture_corpus();
    let runner = loaded_runner(&dir);

    let configs = [
        filter_of("", &[], false),
        filter_of("macos", &["T9999"], true),
        filter_of("linux", &[], false),
    ];
    for config in configs {
        let once = runner.filter(&config);
        let twice = filter_techniques(once.iter(), &config);
        assert_eq!(
            serde_json::to_value(&once).unwrap(),
            serde_json::to_value(&twice).unwrap(),
            "config: {config:?}"
        );
    }
}

#[test]
fn test_select_by_index() {
    let dir = fixture_corpus();
    let runner = loaded_runner(&dir);

    let test = runner.test_by_id_and_index("T9999", 0).unwrap();
    assert_eq!("Test1", test.name);

    let err = runner.test_by_id_and_index("T9999", 4).unwrap_err();
    assert!(err.to_string().contains("out of range"));

    assert!(runner.test_by_id_and_index("TXXXX", 0).is_err());
}

#[test]
fn test_select_by_name_is_case_sensitive() {
    let dir = fixture_corpus();
    let runner = loaded_runner(&dir);

    let test = runner.test_by_id_and_name("T9999", "Test1").unwrap();
    assert_eq!("Test1", test.name);

    assert!(runner.test_by_id_and_name("T9999", "test1").is_err());
    assert!(runner.test_by_id_and_name("T9999", "Nope").is_err());
}

#[test]
fn test_select_by_guid() {
    let dir = fixture_corpus();
    let runner = loaded_runner(&dir);

    let test = runner
        .test_by_guid("cde4bcf1-a826-41d9-a9b8-0d9722d35d1c")
        .unwrap();
    assert_eq!("Data Compressed - gzip", test.name);
    assert_eq!("T1002", test.technique_id);

    let err = runner.test_by_guid("00000000-0000-0000-0000-000000000000").unwrap_err();
    assert!(err.to_string().contains("no test found"));
}

#[test]
fn test_select_by_ambiguous_guid_is_fatal() {
    let dir = TempDir::new().unwrap();
    let duplicated = T1002_YAML.replace(
        "52ebbcfe-3d76-4c30-8253-a3c0dc3fcbfb",
        "cde4bcf1-a826-41d9-a9b8-0d9722d35d1c",
    );
    write_playbook(dir.path(), "T1002", &duplicated);

    let runner = loaded_runner(&dir);
    let err = runner
        .test_by_guid("cde4bcf1-a826-41d9-a9b8-0d9722d35d1c")
        .unwrap_err();
    assert!(err.to_string().contains("more than one test"));
}
