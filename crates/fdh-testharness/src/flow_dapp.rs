//! ---
//! fdh_section: "11-test-harness"
//! fdh_subsection: "05-suites"
//! fdh_type: "source"
//! fdh_scope: "code"
//! fdh_description: "Declared Flow dapp suite and its default harness wiring."
//! fdh_version: "v0.1.0"
//! fdh_owner: "tbd"
//! ---
use fdh_config::{DefaultConfigProvider, FileConfigProvider};

use crate::runner::HarnessBootstrap;
use crate::suite::{Suite, TestGroup};
use crate::terminator::SystemPortTerminator;

/// Name of the declared dapp suite.
pub const SUITE_NAME: &str = "Flow Dapp Tests";
/// Placeholder group declared without cases.
pub const BLANK_GROUP: &str = "Blank Tests";

/// The dapp suite: one empty "Blank Tests" group, which passes as declared.
pub fn flow_dapp_suite() -> Suite {
    Suite::new(SUITE_NAME).group(TestGroup::new(BLANK_GROUP))
}

/// Harness reading `fdh.toml` (or `FDH_CONFIG`) and releasing port 3570.
pub fn flow_dapp_harness() -> HarnessBootstrap<DefaultConfigProvider, SystemPortTerminator> {
    HarnessBootstrap::new(
        DefaultConfigProvider::new(FileConfigProvider::default()),
        SystemPortTerminator::new(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_suite_shape() {
        let suite = flow_dapp_suite();
        assert_eq!(suite.name(), SUITE_NAME);
        assert!(suite.root().cases().is_empty());
        let groups = suite.root().groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name(), BLANK_GROUP);
        assert_eq!(suite.case_count(), 0);
    }

    #[test]
    fn default_harness_targets_emulator_port() {
        assert_eq!(flow_dapp_harness().port(), fdh_config::DEFAULT_EMULATOR_PORT);
    }
}
