// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Running features: the [`Runner`] entry point, its [`RunOptions`] and the
//! resulting [`RunSummary`].

pub mod aggregate;
pub mod dry_run;
pub mod feature;
pub mod pool;
pub mod scenario;

use std::{fmt, path::PathBuf, time::Duration};

use gherkin::tagexpr::TagOperation;
use smart_default::SmartDefault;

use crate::{
    error::{HookError, LoadError},
    examples::{Expander, ExamplesSource, ExpansionWarning},
    model::Feature,
    parser,
    registry::Registry,
    result::{ScenarioExecutionResult, ScenarioKey, Stats, Status},
    retry::{RetryStrategy, Unconditional},
    World,
};

#[doc(inline)]
pub use self::{
    aggregate::Aggregator,
    dry_run::{FeaturePlan, Plan, ScenarioPlan, StepPlan},
    feature::{FeatureOrchestrator, FeatureRun, UsedColumns},
    pool::{StopSignal, WorkerPool},
    scenario::{ScenarioOrchestrator, ScenarioOutcome, State},
};

/// Options of a run.
#[derive(Clone, Debug, SmartDefault)]
pub struct RunOptions {
    /// Feature files, directories or glob patterns to load features from.
    pub paths: Vec<PathBuf>,

    /// Only instances whose tags satisfy this expression run.
    pub include_tags: Option<TagOperation>,

    /// Instances whose tags satisfy this expression don't run.
    pub exclude_tags: Option<TagOperation>,

    /// Only instances whose display name contains this substring run.
    pub name_filter: Option<String>,

    /// Number of concurrent workers. A single one runs instances
    /// sequentially in document order.
    #[default(1)]
    pub workers: usize,

    /// Retries of a failed instance, unless overridden by a `@retry` tag or
    /// a step definition.
    pub retries: usize,

    /// Delay before each retry, unless overridden by a `@retry` tag.
    pub retry_after: Option<Duration>,

    /// Bound on each step, unless its definition sets its own.
    pub step_timeout: Option<Duration>,

    /// Whether a failed instance stops the scheduling of further ones.
    pub fail_fast: bool,

    /// Whether to only plan the run: every instance is recorded as skipped.
    pub dry_run: bool,
}

/// Outcome of a whole run.
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    /// Final record of every instance, in feature order. Within a feature,
    /// templates whose examples couldn't be expanded come first, then the
    /// instances in document order.
    pub results: Vec<ScenarioExecutionResult>,

    /// Counts of the final records.
    pub stats: Stats,

    /// Number of records superseded by a later attempt.
    pub discarded_attempts: usize,

    /// Expansion warnings.
    pub warnings: Vec<ExpansionWarning>,

    /// Headers referenced by templates.
    pub used_columns: Vec<UsedColumns>,

    /// Failures of [`HookPhase::AfterFeature`] hooks.
    ///
    /// [`HookPhase::AfterFeature`]: crate::HookPhase::AfterFeature
    pub feature_hook_errors: Vec<HookError>,
}

impl RunSummary {
    /// Indicates whether any final record is [`Status::Failed`].
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.stats.failed > 0
    }

    /// Indicates whether the run should be reported as failed: some
    /// scenario failed, or some after hook failed without affecting a
    /// scenario status.
    #[must_use]
    pub fn execution_failed(&self) -> bool {
        self.has_failures()
            || !self.feature_hook_errors.is_empty()
            || self.results.iter().any(|r| !r.after_hook_errors.is_empty())
    }

    /// Returns the final record of a scenario instance.
    #[must_use]
    pub fn get(&self, key: &ScenarioKey) -> Option<&ScenarioExecutionResult> {
        self.results.iter().find(|r| &r.key == key)
    }

    /// Iterates over final records with the given `status`.
    pub fn with_status(
        &self,
        status: Status,
    ) -> impl Iterator<Item = &ScenarioExecutionResult> {
        self.results.iter().filter(move |r| r.status == status)
    }

    fn absorb(&mut self, run: FeatureRun) {
        self.discarded_attempts += run.aggregator.discarded();
        self.stats += run.aggregator.stats();
        self.results.extend(run.aggregator.into_results());
        self.warnings.extend(run.warnings);
        self.used_columns.extend(run.used_columns);
        self.feature_hook_errors.extend(run.hook_errors);
    }
}

/// Entry point running features against a [`Registry`].
pub struct Runner<'r, W> {
    /// Step definitions and hooks.
    registry: &'r Registry<W>,

    /// Options of the run.
    options: RunOptions,

    /// Decision whether to retry.
    strategy: Box<dyn RetryStrategy + 'r>,

    /// Source of external examples.
    examples: Option<&'r dyn ExamplesSource>,
}

impl<W> fmt::Debug for Runner<'_, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("registry", self.registry)
            .field("options", &self.options)
            .field("examples", &self.examples)
            .finish_non_exhaustive()
    }
}

impl<'r, W: World> Runner<'r, W> {
    /// Creates a new [`Runner`] with default [`RunOptions`], retrying
    /// unconditionally while the budget lasts.
    #[must_use]
    pub fn new(registry: &'r Registry<W>) -> Self {
        Self {
            registry,
            options: RunOptions::default(),
            strategy: Box::new(Unconditional),
            examples: None,
        }
    }

    /// Replaces the [`RunOptions`].
    #[must_use]
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the [`RetryStrategy`].
    #[must_use]
    pub fn retry_strategy(mut self, strategy: impl RetryStrategy + 'r) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    /// Sets the [`ExamplesSource`] of external examples.
    #[must_use]
    pub fn examples_source(mut self, source: &'r dyn ExamplesSource) -> Self {
        self.examples = Some(source);
        self
    }

    /// Returns the [`RunOptions`].
    #[must_use]
    pub const fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Runs the `features`.
    ///
    /// A single worker runs them one after another. With more workers the
    /// instances of all the features are spread across the same workers.
    /// With [`RunOptions::fail_fast`], a failure stops scheduling in the
    /// following features too.
    pub async fn run(&self, features: &[Feature]) -> RunSummary {
        let stop = StopSignal::new();
        let orchestrator = FeatureOrchestrator::new(
            self.registry,
            &self.options,
            &*self.strategy,
            self.examples,
        );

        let mut summary = RunSummary::default();
        for run in orchestrator.run_all(features, &stop).await {
            summary.absorb(run);
        }
        tracing::info!(
            passed = summary.stats.passed,
            failed = summary.stats.failed,
            skipped = summary.stats.skipped,
            retried = summary.stats.retried,
            "run finished",
        );
        summary
    }

    /// Loads features from [`RunOptions::paths`] and runs them.
    ///
    /// # Errors
    ///
    /// If any of the paths cannot be loaded.
    pub async fn run_paths(&self) -> Result<RunSummary, LoadError> {
        let features = self.load()?;
        Ok(self.run(&features).await)
    }

    /// Plans the `features` without running anything.
    #[must_use]
    pub fn dry_run(&self, features: &[Feature]) -> Plan {
        let expander = self.examples.map_or_else(Expander::new, Expander::with_source);
        Plan::new(self.registry, features, &self.options, expander)
    }

    /// Loads features from [`RunOptions::paths`].
    ///
    /// # Errors
    ///
    /// If any of the paths cannot be loaded.
    pub fn load(&self) -> Result<Vec<Feature>, LoadError> {
        let mut features = Vec::new();
        for path in &self.options.paths {
            features.extend(parser::load(path)?);
        }
        Ok(features)
    }
}
