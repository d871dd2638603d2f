/// Options for narrowing the loaded corpus.
#[derive(Debug, Clone, Default)]
pub struct FilterConfig {
    /// Platform tag to match against `supported_platforms`. Empty disables
    /// platform narrowing.
    pub platform: String,
    /// Technique identifiers to keep. Empty keeps all techniques.
    pub techniques: Vec<String>,
    /// Keep tests whose executor is `manual`. Such tests can be listed but
    /// never run.
    pub include_manual: bool,
}

/// Options controlling which phases of a test run and how commands are fed
/// to the launcher.
///
/// `all` enables every phase, but with one behavioral difference from the
/// individual flags: a phase whose command is empty is skipped silently,
/// while an individually enabled empty phase reports "no commands provided".
#[derive(Debug, Clone, Copy, Default)]
pub struct TestRunConfig {
    pub all: bool,

    pub check_prereq: bool,
    pub get_prereq: bool,
    pub attack: bool,
    pub cleanup: bool,

    /// Feed each non-empty line of a command to a fresh launcher invocation
    /// instead of piping the whole block into one.
    pub split_by_newline: bool,
}

impl TestRunConfig {
    pub(crate) fn dependency_phase_enabled(&self) -> bool {
        self.all || self.check_prereq || self.get_prereq
    }

    pub(crate) fn get_prereq_enabled(&self) -> bool {
        self.all || self.get_prereq
    }

    pub(crate) fn attack_enabled(&self) -> bool {
        self.all || self.attack
    }

    pub(crate) fn cleanup_enabled(&self) -> bool {
        self.all || self.cleanup
    }
}
