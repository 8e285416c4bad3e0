// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Feature orchestrator: selects a feature's instances and runs them between
//! feature hooks, sequentially or on a [`WorkerPool`].

use std::{
    cell::{Cell, RefCell},
    fmt, iter,
    panic::AssertUnwindSafe,
    slice,
};

use futures::{
    future::{LocalBoxFuture, Shared},
    FutureExt as _,
};
use tracing::Instrument as _;

use crate::{
    error::{ExamplesError, HookError, ScenarioError},
    examples::{Expander, ExamplesSource, ExpansionWarning, ScenarioInstance},
    future::panic_message,
    hook::{HookContext, HookPhase},
    model::Feature,
    registry::Registry,
    result::{ScenarioExecutionResult, Status},
    retry::RetryStrategy,
    tag::Ext as _,
    World,
};

use super::{
    aggregate::Aggregator,
    pool::{StopSignal, WorkerPool},
    scenario::{run_all_hooks, run_hooks, ScenarioOrchestrator},
    RunOptions,
};

/// Headers a scenario template actually references.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UsedColumns {
    /// Name of the feature.
    pub feature: String,

    /// Name of the scenario template.
    pub template: String,

    /// Referenced headers, in header order.
    pub columns: Vec<String>,
}

/// Instances of a feature selected to run.
#[derive(Debug, Default)]
pub(crate) struct Selection {
    /// Expanded instances passing the filters, in document order.
    pub(crate) instances: Vec<ScenarioInstance>,

    /// Templates whose examples couldn't be expanded, as unexpanded
    /// instances.
    pub(crate) failed: Vec<(ScenarioInstance, ExamplesError)>,

    /// Expansion warnings.
    pub(crate) warnings: Vec<ExpansionWarning>,

    /// Headers referenced by templates.
    pub(crate) used_columns: Vec<UsedColumns>,
}

impl Selection {
    /// Expands every scenario of the `feature` and applies the tag and name
    /// filters of the `options` to the instances.
    pub(crate) fn of(feature: &Feature, options: &RunOptions, expander: Expander<'_>) -> Self {
        let mut selection = Self::default();
        for scenario in &feature.scenarios {
            match expander.expand(feature, scenario) {
                Ok(exp) => {
                    selection.warnings.extend(exp.warnings);
                    if scenario.is_template() {
                        selection.used_columns.push(UsedColumns {
                            feature: feature.name.clone(),
                            template: scenario.name.clone(),
                            columns: exp.used_columns,
                        });
                    }
                    selection.instances.extend(
                        exp.instances.into_iter().filter(|i| options.selects(i)),
                    );
                }
                Err(e) => {
                    let plain = ScenarioInstance::plain(feature, scenario);
                    tracing::error!(scenario = %scenario.name, %e, "failed to expand examples");
                    if options.selects(&plain) {
                        selection.failed.push((plain, e));
                    }
                }
            }
        }
        selection
    }
}

impl RunOptions {
    /// Indicates whether the `instance` passes the tag and name filters.
    #[must_use]
    pub fn selects(&self, instance: &ScenarioInstance) -> bool {
        self.include_tags.as_ref().map_or(true, |op| op.eval(&instance.tags))
            && !self.exclude_tags.as_ref().is_some_and(|op| op.eval(&instance.tags))
            && self
                .name_filter
                .as_ref()
                .map_or(true, |f| instance.name.contains(f.as_str()))
    }
}

/// Outcome of a single feature.
#[derive(Debug, Default)]
pub struct FeatureRun {
    /// Records of the feature's instances.
    pub aggregator: Aggregator,

    /// Expansion warnings.
    pub warnings: Vec<ExpansionWarning>,

    /// Headers referenced by templates.
    pub used_columns: Vec<UsedColumns>,

    /// Failures of [`HookPhase::AfterFeature`] hooks.
    pub hook_errors: Vec<HookError>,
}

/// Runner of [`Feature`]s.
///
/// Selects instances first, then runs [`HookPhase::BeforeFeature`] hooks,
/// the instances, and [`HookPhase::AfterFeature`] hooks. A failed
/// [`HookPhase::BeforeFeature`] hook fails every instance without running
/// it. Feature hooks don't run for a feature none of whose instances
/// started.
pub struct FeatureOrchestrator<'r, W> {
    /// Step definitions and hooks.
    registry: &'r Registry<W>,

    /// Run-wide options.
    options: &'r RunOptions,

    /// Decision whether to retry.
    strategy: &'r dyn RetryStrategy,

    /// Source of external examples.
    examples: Option<&'r dyn ExamplesSource>,
}

impl<W> fmt::Debug for FeatureOrchestrator<'_, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureOrchestrator")
            .field("options", self.options)
            .field("examples", &self.examples)
            .finish_non_exhaustive()
    }
}

impl<'r, W: World> FeatureOrchestrator<'r, W> {
    /// Creates a new [`FeatureOrchestrator`].
    #[must_use]
    pub const fn new(
        registry: &'r Registry<W>,
        options: &'r RunOptions,
        strategy: &'r dyn RetryStrategy,
        examples: Option<&'r dyn ExamplesSource>,
    ) -> Self {
        Self { registry, options, strategy, examples }
    }

    /// Runs the `feature`.
    ///
    /// Once the `stop` signal is set, instances not started yet are recorded
    /// as skipped.
    pub async fn run(&self, feature: &Feature, stop: &StopSignal) -> FeatureRun {
        self.run_all(slice::from_ref(feature), stop).await.pop().unwrap_or_default()
    }

    /// Runs the `features`, returning a [`FeatureRun`] per feature, in the
    /// same order.
    ///
    /// A single worker runs the features one after another. More workers
    /// share one [`WorkerPool`] fed with the instances of all the features.
    /// There a feature's [`HookPhase::BeforeFeature`] hooks run before its
    /// first instance starts, and its [`HookPhase::AfterFeature`] hooks once
    /// its last instance reports.
    pub async fn run_all(&self, features: &[Feature], stop: &StopSignal) -> Vec<FeatureRun> {
        if self.options.workers > 1 {
            return self.run_pooled(features, stop).await;
        }

        let mut runs = Vec::with_capacity(features.len());
        for feature in features {
            let span = tracing::error_span!("feature", name = %feature.name);
            runs.push(self.run_sequentially(feature, stop).instrument(span).await);
        }
        runs
    }

    /// Expands and filters the instances of the `feature`.
    ///
    /// Returns the [`FeatureRun`] holding records of the templates that
    /// couldn't be expanded, along with the instances to run. In a dry run
    /// every instance is recorded as skipped instead.
    fn select(&self, feature: &Feature) -> (FeatureRun, Vec<ScenarioInstance>) {
        let expander = self.examples.map_or_else(Expander::new, Expander::with_source);
        let Selection { instances, failed, warnings, used_columns } =
            Selection::of(feature, self.options, expander);
        let mut run = FeatureRun { warnings, used_columns, ..FeatureRun::default() };

        run.aggregator.extend(failed.into_iter().map(|(inst, e)| {
            ScenarioExecutionResult::failed(&inst, ScenarioError::Examples(e.to_string()))
        }));

        if self.options.dry_run {
            run.aggregator.extend(instances.iter().map(ScenarioExecutionResult::skipped));
            return (run, Vec::new());
        }
        (run, instances)
    }

    async fn before_feature(&self, feature: &Feature) -> Result<(), HookError> {
        let res =
            run_hooks(self.registry, HookPhase::BeforeFeature, &hook_context(feature), None)
                .await;
        if let Err(e) = &res {
            tracing::error!(%e, "feature not run");
        }
        res
    }

    async fn after_feature(&self, feature: &Feature, failed: bool) -> Vec<HookError> {
        let status = if failed { Status::Failed } else { Status::Passed };
        let ctx = HookContext { status: Some(status), ..hook_context(feature) };
        let errors = run_all_hooks(self.registry, HookPhase::AfterFeature, &ctx, None).await;
        for e in &errors {
            tracing::error!(%e, "after feature hook failed");
        }
        errors
    }

    async fn run_sequentially(&self, feature: &Feature, stop: &StopSignal) -> FeatureRun {
        let (mut run, instances) = self.select(feature);
        if instances.is_empty() {
            return run;
        }
        if stop.is_stopped() {
            tracing::debug!("stopped, skipping feature");
            run.aggregator.extend(instances.iter().map(ScenarioExecutionResult::skipped));
            return run;
        }

        match self.before_feature(feature).await {
            Ok(()) => run.aggregator.merge(self.run_instances(&instances, stop).await),
            Err(e) => run.aggregator.extend(instances.iter().map(|inst| {
                ScenarioExecutionResult::failed(inst, ScenarioError::FeatureHook(e.clone()))
            })),
        }
        run.hook_errors = self.after_feature(feature, run.aggregator.has_failures()).await;
        run
    }

    async fn run_instances(
        &self,
        instances: &[ScenarioInstance],
        stop: &StopSignal,
    ) -> Aggregator {
        let scenario = ScenarioOrchestrator::new(self.registry, self.options, self.strategy);

        let mut aggregator = Aggregator::new();
        for inst in instances {
            if stop.is_stopped() {
                tracing::debug!(scenario = %inst.name, "stopped, skipping");
                aggregator.record(ScenarioExecutionResult::skipped(inst));
                continue;
            }
            let records = match AssertUnwindSafe(scenario.run(inst)).catch_unwind().await {
                Ok(outcome) => outcome.into_records(),
                Err(panic) => {
                    let message = panic_message(&*panic);
                    tracing::error!(scenario = %inst.name, %message, "scenario crashed");
                    vec![ScenarioExecutionResult::failed(
                        inst,
                        ScenarioError::WorkerCrashed(message),
                    )]
                }
            };
            let failed = records.last().is_some_and(|r| r.status == Status::Failed);
            aggregator.extend(records);
            if failed && self.options.fail_fast {
                tracing::info!(scenario = %inst.name, "fail fast");
                stop.stop();
            }
        }
        aggregator
    }

    async fn run_pooled(&self, features: &[Feature], stop: &StopSignal) -> Vec<FeatureRun> {
        let mut runs = Vec::with_capacity(features.len());
        let mut units = Vec::new();
        let mut owners = Vec::new();
        for (n, feature) in features.iter().enumerate() {
            let (run, instances) = self.select(feature);
            owners.extend(iter::repeat(n).take(instances.len()));
            units.extend(instances);
            runs.push(run);
        }
        let slots = features
            .iter()
            .zip(&runs)
            .enumerate()
            .map(|(n, (feature, run))| {
                let count = owners.iter().filter(|o| **o == n).count();
                FeatureSlot {
                    feature,
                    before: self.before_feature(feature).boxed_local().shared(),
                    units: count,
                    pending: Cell::new(count),
                    started: Cell::new(false),
                    failed: Cell::new(run.aggregator.has_failures()),
                    finished: Cell::new(false),
                    hook_errors: RefCell::default(),
                }
            })
            .collect::<Vec<_>>();

        let scenario = ScenarioOrchestrator::new(self.registry, self.options, self.strategy);
        let each = WorkerPool::new(self.options.workers)
            .fail_fast(self.options.fail_fast)
            .execute_each(&units, stop, |i, inst| {
                let slot = &slots[owners[i]];
                async move {
                    slot.started.set(true);
                    let records = match slot.before.clone().await {
                        Ok(()) => scenario.run(inst).await.into_records(),
                        Err(e) => vec![ScenarioExecutionResult::failed(
                            inst,
                            ScenarioError::FeatureHook(e),
                        )],
                    };
                    if records.last().is_some_and(|r| r.status == Status::Failed) {
                        slot.failed.set(true);
                    }
                    slot.pending.set(slot.pending.get().saturating_sub(1));
                    if slot.pending.get() == 0 {
                        slot.finished.set(true);
                        let errors = self.after_feature(slot.feature, slot.failed.get()).await;
                        slot.hook_errors.borrow_mut().extend(errors);
                    }
                    records
                }
                .instrument(tracing::error_span!("feature", name = %slot.feature.name))
                .boxed_local()
            })
            .await;

        let mut each = each.into_iter();
        for (run, slot) in runs.iter_mut().zip(&slots) {
            run.aggregator.extend(each.by_ref().take(slot.units).flatten());
            run.hook_errors = slot.hook_errors.take();
            // Units skipped by the pool or crashed never report.
            if slot.started.get() && !slot.finished.get() {
                let span = tracing::error_span!("feature", name = %slot.feature.name);
                let errors = self
                    .after_feature(slot.feature, run.aggregator.has_failures())
                    .instrument(span)
                    .await;
                run.hook_errors.extend(errors);
            }
        }
        runs
    }
}

/// Progress of a [`Feature`] whose instances run on a [`WorkerPool`].
struct FeatureSlot<'f> {
    /// The feature itself.
    feature: &'f Feature,

    /// Outcome of the [`HookPhase::BeforeFeature`] hooks, run by the first
    /// instance awaiting it.
    before: Shared<LocalBoxFuture<'f, Result<(), HookError>>>,

    /// Number of the feature's instances.
    units: usize,

    /// Number of the feature's instances that haven't reported yet.
    pending: Cell<usize>,

    /// Whether any instance started.
    started: Cell<bool>,

    /// Whether any instance failed.
    failed: Cell<bool>,

    /// Whether the [`HookPhase::AfterFeature`] hooks ran.
    finished: Cell<bool>,

    /// Failures of the [`HookPhase::AfterFeature`] hooks.
    hook_errors: RefCell<Vec<HookError>>,
}

/// Builds the [`HookContext`] of feature hooks.
fn hook_context(feature: &Feature) -> HookContext {
    HookContext {
        feature: feature.name.clone(),
        tags: feature.tags.clone(),
        ..HookContext::default()
    }
}
