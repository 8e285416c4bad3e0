// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Outcomes of scenarios and their steps.

use std::{
    ops::AddAssign,
    time::{Duration, Instant},
};

use derive_more::with_trait::Display;

use crate::{
    error::{HookError, ScenarioError, StepError},
    examples::ScenarioInstance,
    model::Step,
};

/// Outcome of a scenario or a step.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum Status {
    /// Completed successfully.
    #[display("passed")]
    Passed,

    /// Failed.
    #[display("failed")]
    Failed,

    /// Never ran.
    #[display("skipped")]
    Skipped,
}

/// Identity of a scenario instance within a run.
///
/// Retries of the same instance share it.
#[derive(Clone, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("{feature}: {scenario}")]
pub struct ScenarioKey {
    /// Name of the feature.
    pub feature: String,

    /// Display name of the scenario instance, with its example suffix.
    pub scenario: String,
}

impl ScenarioKey {
    /// Creates a new [`ScenarioKey`].
    #[must_use]
    pub fn new(feature: impl Into<String>, scenario: impl Into<String>) -> Self {
        Self { feature: feature.into(), scenario: scenario.into() }
    }
}

/// Outcome of a single step dispatch.
#[derive(Clone, Debug, PartialEq)]
pub struct StepResult {
    /// Keyword of the step.
    pub keyword: String,

    /// Text of the step.
    pub text: String,

    /// Whether the step comes from a background.
    pub background: bool,

    /// Outcome of the step.
    pub status: Status,

    /// Time spent in the step, including its step hooks.
    pub duration: Duration,

    /// Failure of the step, if it failed.
    pub error: Option<StepError>,
}

impl StepResult {
    /// Creates a [`StepResult`] of a step that never ran.
    #[must_use]
    pub fn skipped(step: &Step, background: bool) -> Self {
        Self {
            keyword: step.keyword.clone(),
            text: step.text.clone(),
            background,
            status: Status::Skipped,
            duration: Duration::ZERO,
            error: None,
        }
    }
}

/// Final record of a single scenario attempt.
#[derive(Clone, Debug)]
pub struct ScenarioExecutionResult {
    /// Identity of the scenario instance.
    pub key: ScenarioKey,

    /// Name of the scenario template the instance was expanded from.
    pub template: String,

    /// 1-based example iteration, if expanded from examples.
    pub iteration: Option<usize>,

    /// Tags of the scenario instance.
    pub tags: Vec<String>,

    /// Outcome of the attempt.
    pub status: Status,

    /// Steps in execution order, remaining ones recorded as
    /// [`Status::Skipped`] after a failure.
    pub steps: Vec<StepResult>,

    /// Reason of the failure, if failed.
    pub error: Option<ScenarioError>,

    /// Failures of [`HookPhase::After`] hooks, which don't affect the
    /// `status`.
    ///
    /// [`HookPhase::After`]: crate::HookPhase::After
    pub after_hook_errors: Vec<HookError>,

    /// 1-based number of this attempt.
    pub attempt: usize,

    /// When the attempt started.
    pub started_at: Instant,

    /// When the attempt was finalized.
    pub finished_at: Instant,
}

impl ScenarioExecutionResult {
    /// Number of retries preceding this attempt.
    #[must_use]
    pub const fn retry_attempt(&self) -> usize {
        self.attempt.saturating_sub(1)
    }

    /// Time the attempt took.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.finished_at.saturating_duration_since(self.started_at)
    }

    /// Returns the [`StepResult`] of the failed step, if any.
    #[must_use]
    pub fn failed_step(&self) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.status == Status::Failed)
    }

    /// Creates a [`Status::Skipped`] record of an instance that was never
    /// run, every step of it skipped.
    #[must_use]
    pub fn skipped(instance: &ScenarioInstance) -> Self {
        let mut pending = PendingResult::start(instance, 1);
        pending.skip_remaining(instance, 0);
        pending.finalize(Status::Skipped, None)
    }

    /// Creates a [`Status::Failed`] record of an instance that failed before
    /// any of its steps could run.
    #[must_use]
    pub fn failed(instance: &ScenarioInstance, error: ScenarioError) -> Self {
        let mut pending = PendingResult::start(instance, 1);
        pending.skip_remaining(instance, 0);
        pending.finalize(Status::Failed, Some(error))
    }
}

/// [`ScenarioExecutionResult`] under construction.
///
/// Created when an attempt starts, accumulates [`StepResult`]s, and turns
/// into a [`ScenarioExecutionResult`] exactly once, by consuming
/// [`PendingResult::finalize()`].
#[derive(Debug)]
pub struct PendingResult {
    /// Identity of the scenario instance.
    key: ScenarioKey,

    /// Name of the scenario template.
    template: String,

    /// 1-based example iteration.
    iteration: Option<usize>,

    /// Tags of the scenario instance.
    tags: Vec<String>,

    /// Steps recorded so far.
    steps: Vec<StepResult>,

    /// 1-based number of the attempt.
    attempt: usize,

    /// When the attempt started.
    started_at: Instant,
}

impl PendingResult {
    /// Starts recording the given `attempt` of the `instance`.
    #[must_use]
    pub fn start(instance: &ScenarioInstance, attempt: usize) -> Self {
        Self {
            key: instance.key(),
            template: instance.template.clone(),
            iteration: instance.iteration,
            tags: instance.tags.clone(),
            steps: Vec::with_capacity(instance.len()),
            attempt,
            started_at: Instant::now(),
        }
    }

    /// Records a finished step.
    pub fn push(&mut self, step: StepResult) {
        self.steps.push(step);
    }

    /// Number of steps recorded so far.
    #[must_use]
    pub fn recorded(&self) -> usize {
        self.steps.len()
    }

    /// Records every step of the `instance` starting at position `from` as
    /// [`Status::Skipped`].
    pub fn skip_remaining(&mut self, instance: &ScenarioInstance, from: usize) {
        self.steps.extend(
            instance
                .all_steps()
                .skip(from)
                .map(|(step, bg)| StepResult::skipped(step, bg)),
        );
    }

    /// Finalizes the attempt.
    #[must_use]
    pub fn finalize(
        self,
        status: Status,
        error: Option<ScenarioError>,
    ) -> ScenarioExecutionResult {
        ScenarioExecutionResult {
            key: self.key,
            template: self.template,
            iteration: self.iteration,
            tags: self.tags,
            status,
            steps: self.steps,
            error,
            after_hook_errors: Vec::new(),
            attempt: self.attempt,
            started_at: self.started_at,
            finished_at: Instant::now(),
        }
    }
}

/// Counters of scenario outcomes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Stats {
    /// Number of passed scenarios.
    pub passed: usize,

    /// Number of failed scenarios.
    pub failed: usize,

    /// Number of skipped scenarios.
    pub skipped: usize,

    /// Number of final results reached after at least one retry.
    pub retried: usize,
}

impl Stats {
    /// Creates new zeroed [`Stats`].
    #[must_use]
    pub const fn new() -> Self {
        Self { passed: 0, failed: 0, skipped: 0, retried: 0 }
    }

    /// Total number of counted scenarios.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }

    /// Counts the given final result.
    pub fn record(&mut self, result: &ScenarioExecutionResult) {
        match result.status {
            Status::Passed => self.passed += 1,
            Status::Failed => self.failed += 1,
            Status::Skipped => self.skipped += 1,
        }
        if result.attempt > 1 {
            self.retried += 1;
        }
    }
}

impl AddAssign for Stats {
    fn add_assign(&mut self, rhs: Self) {
        self.passed += rhs.passed;
        self.failed += rhs.failed;
        self.skipped += rhs.skipped;
        self.retried += rhs.retried;
    }
}

impl<'a> FromIterator<&'a ScenarioExecutionResult> for Stats {
    fn from_iter<I: IntoIterator<Item = &'a ScenarioExecutionResult>>(
        iter: I,
    ) -> Self {
        let mut stats = Self::new();
        for r in iter {
            stats.record(r);
        }
        stats
    }
}
