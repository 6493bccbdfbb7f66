//! Experiment, test case and outcome repository.

use crate::error::MetadataResult;
use crate::models::{ExperimentRow, OutcomeRow, TestCaseRow, TestCaseState};
use async_trait::async_trait;

/// Repository for experiments and their test cases.
#[async_trait]
pub trait ExperimentRepo: Send + Sync {
    /// Store a new experiment. The definition must parse as a
    /// [`granary_core::ExperimentDefinition`].
    async fn create_experiment(&self, definition: &str) -> MetadataResult<ExperimentRow>;

    /// Fetch one experiment.
    async fn get_experiment(&self, id: i64) -> MetadataResult<Option<ExperimentRow>>;

    /// Queue a test case pairing an experiment with a package version.
    async fn create_test_case(
        &self,
        experiment_id: i64,
        package_version_id: i64,
    ) -> MetadataResult<TestCaseRow>;

    /// Fetch one test case.
    async fn get_test_case(&self, id: i64) -> MetadataResult<Option<TestCaseRow>>;

    /// Move a queued test case to `running`.
    ///
    /// Any other starting state is an
    /// [`InvalidStateTransition`](crate::MetadataError::InvalidStateTransition).
    async fn start_test_case(&self, id: i64) -> MetadataResult<TestCaseRow>;

    /// Terminate a running test case, recording its outcome.
    ///
    /// `state` must be terminal, the case must currently be `running`, and
    /// exactly one outcome is created per case.
    async fn finish_test_case(
        &self,
        id: i64,
        state: TestCaseState,
        exit_code: i64,
        stdout: &str,
        stderr: &str,
    ) -> MetadataResult<OutcomeRow>;
}
