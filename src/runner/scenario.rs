// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Scenario orchestrator: runs a single [`ScenarioInstance`] through its
//! lifecycle, retrying failed attempts.

use std::{
    fmt, mem,
    panic::AssertUnwindSafe,
    time::{Duration, Instant},
};

use derive_more::with_trait::Display;
use futures::{future::LocalBoxFuture, FutureExt as _};
use tracing::Instrument as _;

use crate::{
    error::{HookError, ScenarioError, StepError},
    examples::ScenarioInstance,
    future::{catch_failure, maybe_timeout, panic_message, sleep, Elapsed},
    hook::{HookContext, HookPhase},
    model::Step,
    registry::Registry,
    result::{PendingResult, ScenarioExecutionResult, Status, StepResult},
    retry::{Retries, RetryContext, RetryPlan, RetryStrategy},
    step::{collection::step_attachments, Context},
    World,
};

use super::RunOptions;

/// State of a scenario instance run.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum State {
    /// About to start an attempt: a fresh [`World`] is created.
    #[display("init")]
    Init,

    /// Running [`HookPhase::Before`] hooks.
    #[display("running before hooks")]
    RunningBefore,

    /// Running background steps.
    #[display("running background")]
    RunningBackground,

    /// Running scenario steps.
    #[display("running steps")]
    RunningSteps,

    /// Deciding between finalizing and retrying.
    #[display("deciding")]
    Deciding,

    /// Discarding the failed attempt before the next one.
    #[display("retrying")]
    Retrying,

    /// Running [`HookPhase::After`] hooks and producing the final record.
    #[display("finalized ({_0})")]
    Finalized(Status),
}

/// Records of every attempt of a scenario instance.
#[derive(Clone, Debug)]
pub struct ScenarioOutcome {
    /// Record of the last attempt, deciding the scenario status.
    pub result: ScenarioExecutionResult,

    /// Records of earlier failed attempts, in attempt order.
    pub discarded: Vec<ScenarioExecutionResult>,
}

impl ScenarioOutcome {
    /// Returns all the records in attempt order, the final one last.
    #[must_use]
    pub fn into_records(self) -> Vec<ScenarioExecutionResult> {
        let mut records = self.discarded;
        records.push(self.result);
        records
    }
}

/// Single attempt in progress.
struct Attempt<W> {
    /// 1-based attempt number.
    number: usize,

    /// Record being accumulated.
    pending: PendingResult,

    /// [`World`] of this attempt, once created.
    world: Option<W>,

    /// Failure of this attempt.
    error: Option<ScenarioError>,

    /// Retry budget of the failed step's definition.
    step_retries: Option<usize>,
}

impl<W> Attempt<W> {
    fn new(instance: &ScenarioInstance, number: usize) -> Self {
        Self {
            number,
            pending: PendingResult::start(instance, number),
            world: None,
            error: None,
            step_retries: None,
        }
    }
}

/// Runner of a single [`ScenarioInstance`].
///
/// Each attempt goes `Init → RunningBefore → RunningBackground →
/// RunningSteps → Deciding`, and then either `Retrying → Init` or
/// `Finalized`. A failed [`HookPhase::Before`] hook or [`World`] creation
/// finalizes the scenario as failed right away, without retrying.
pub struct ScenarioOrchestrator<'r, W> {
    /// Step definitions and hooks.
    registry: &'r Registry<W>,

    /// Run-wide options.
    options: &'r RunOptions,

    /// Decision whether to retry.
    strategy: &'r dyn RetryStrategy,
}

impl<W> Clone for ScenarioOrchestrator<'_, W> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<W> Copy for ScenarioOrchestrator<'_, W> {}

impl<W> fmt::Debug for ScenarioOrchestrator<'_, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScenarioOrchestrator")
            .field("registry", self.registry)
            .field("options", self.options)
            .finish_non_exhaustive()
    }
}

impl<'r, W: World> ScenarioOrchestrator<'r, W> {
    /// Creates a new [`ScenarioOrchestrator`].
    #[must_use]
    pub const fn new(
        registry: &'r Registry<W>,
        options: &'r RunOptions,
        strategy: &'r dyn RetryStrategy,
    ) -> Self {
        Self { registry, options, strategy }
    }

    /// Runs the `instance` to its final record.
    ///
    /// Never fails: every step, hook and [`World`] failure ends up in the
    /// returned records.
    pub async fn run(&self, instance: &ScenarioInstance) -> ScenarioOutcome {
        let span = tracing::error_span!(
            "scenario",
            feature = %instance.feature,
            name = %instance.name,
        );
        self.run_attempts(instance).instrument(span).await
    }

    async fn run_attempts(&self, instance: &ScenarioInstance) -> ScenarioOutcome {
        let plan = RetryPlan::resolve(
            &instance.tags,
            self.options.retries,
            self.options.retry_after,
        );

        let mut discarded = Vec::new();
        let mut current = Attempt::new(instance, 1);
        let mut state = State::Init;
        loop {
            tracing::trace!(attempt = current.number, %state);
            state = match state {
                State::Init => self.init(instance, &mut current).await,
                State::RunningBefore => self.before(instance, &mut current).await,
                State::RunningBackground => {
                    self.steps(instance, &mut current, true).await
                }
                State::RunningSteps => {
                    self.steps(instance, &mut current, false).await
                }
                State::Deciding => self.decide(instance, &mut current, plan),
                State::Retrying => {
                    let next = Attempt::new(instance, current.number + 1);
                    let failed = mem::replace(&mut current, next);
                    discarded.push(self.finish(instance, failed, Status::Failed).await);
                    if let Some(after) = plan.after {
                        sleep(after).await;
                    }
                    State::Init
                }
                State::Finalized(status) => {
                    let result = self.finish(instance, current, status).await;
                    break ScenarioOutcome { result, discarded };
                }
            };
        }
    }

    async fn init(&self, instance: &ScenarioInstance, a: &mut Attempt<W>) -> State {
        a.pending = PendingResult::start(instance, a.number);
        let error = match AssertUnwindSafe(W::new()).catch_unwind().await {
            Ok(Ok(world)) => {
                a.world = Some(world);
                return State::RunningBefore;
            }
            Ok(Err(e)) => e.to_string(),
            Err(panic) => panic_message(&*panic),
        };
        tracing::error!(%error, "failed to create World");
        a.error = Some(ScenarioError::World(error));
        State::Finalized(Status::Failed)
    }

    async fn before(&self, instance: &ScenarioInstance, a: &mut Attempt<W>) -> State {
        let ctx = hook_context(instance, None, None, a.number);
        match run_hooks(self.registry, HookPhase::Before, &ctx, a.world.as_mut())
            .await
        {
            Ok(()) => State::RunningBackground,
            Err(e) => {
                a.error = Some(ScenarioError::BeforeHook(e));
                State::Finalized(Status::Failed)
            }
        }
    }

    async fn steps(
        &self,
        instance: &ScenarioInstance,
        a: &mut Attempt<W>,
        background: bool,
    ) -> State {
        let steps = if background { &instance.background } else { &instance.steps };
        let Some(world) = a.world.as_mut() else {
            return State::Deciding;
        };

        for step in steps {
            let (result, step_retries) = self
                .run_step(instance, world, step, background, a.number)
                .instrument(tracing::error_span!("step", text = %step.text))
                .await;
            let error = result.error.clone();
            a.pending.push(result);
            if let Some(e) = error {
                a.error = Some(e.into());
                a.step_retries = step_retries;
                return State::Deciding;
            }
        }

        if background {
            State::RunningSteps
        } else {
            State::Deciding
        }
    }

    fn decide(
        &self,
        instance: &ScenarioInstance,
        a: &mut Attempt<W>,
        plan: RetryPlan,
    ) -> State {
        let Some(error) = &a.error else {
            return State::Finalized(Status::Passed);
        };
        let ScenarioError::Step(step_error) = error else {
            return State::Finalized(Status::Failed);
        };
        if !step_error.is_retryable() {
            return State::Finalized(Status::Failed);
        }

        let budget = a.step_retries.unwrap_or(plan.retries);
        let used = a.number - 1;
        let retries = Retries { current: used, left: budget.saturating_sub(used) };
        if retries.next_try().is_some() {
            let ctx = RetryContext {
                key: instance.key(),
                step: step_error.text().to_owned(),
                attempt: a.number,
                retries,
            };
            if self.strategy.should_retry(step_error, &ctx) {
                tracing::info!(attempt = a.number, left = retries.left, "retrying");
                return State::Retrying;
            }
            tracing::debug!(attempt = a.number, "retry declined by strategy");
            return State::Finalized(Status::Failed);
        }

        if budget > 0 {
            let source = Box::new(error.clone());
            a.error = Some(ScenarioError::RetryExhausted { attempts: a.number, source });
        }
        State::Finalized(Status::Failed)
    }

    /// Runs [`HookPhase::After`] hooks and finalizes the record.
    ///
    /// Hook failures are logged and recorded aside: the status is already
    /// decided.
    async fn finish(
        &self,
        instance: &ScenarioInstance,
        a: Attempt<W>,
        status: Status,
    ) -> ScenarioExecutionResult {
        let Attempt { number, mut pending, mut world, error, .. } = a;
        pending.skip_remaining(instance, pending.recorded());

        let ctx = hook_context(instance, None, Some(status), number);
        let hook_errors =
            run_all_hooks(self.registry, HookPhase::After, &ctx, world.as_mut()).await;
        for e in &hook_errors {
            tracing::error!(%e, %status, "after hook failed, keeping status");
        }
        drop(world);

        let mut result = pending.finalize(status, error);
        result.after_hook_errors = hook_errors;
        result
    }

    /// Runs a single step bracketed by its step hooks.
    ///
    /// Returns the retry budget of the matched definition alongside.
    async fn run_step(
        &self,
        instance: &ScenarioInstance,
        world: &mut W,
        step: &Step,
        background: bool,
        attempt: usize,
    ) -> (StepResult, Option<usize>) {
        let started = Instant::now();
        let mut step_retries = None;

        let ctx = hook_context(instance, Some(step), None, attempt);
        let mut error =
            match run_hooks(self.registry, HookPhase::BeforeStep, &ctx, Some(&mut *world))
                .await
            {
                Err(hook) => Some(StepError::Hook { text: step.text.clone(), hook }),
                Ok(()) => {
                    let (res, retries) = self.invoke(world, step, attempt).await;
                    step_retries = retries;
                    res.err()
                }
            };

        let status = if error.is_some() { Status::Failed } else { Status::Passed };
        let ctx = HookContext { status: Some(status), ..ctx };
        let hook_errors =
            run_all_hooks(self.registry, HookPhase::AfterStep, &ctx, Some(world)).await;
        for hook in hook_errors {
            if error.is_none() {
                error = Some(StepError::Hook { text: step.text.clone(), hook });
            } else {
                tracing::error!(%hook, "afterStep hook failed on a failed step");
            }
        }

        let status = if error.is_some() { Status::Failed } else { Status::Passed };
        let result = StepResult {
            keyword: step.keyword.clone(),
            text: step.text.clone(),
            background,
            status,
            duration: started.elapsed(),
            error,
        };
        (result, step_retries)
    }

    /// Resolves and invokes the handler of a step, or the fallback executor
    /// if nothing matches.
    async fn invoke(
        &self,
        world: &mut W,
        step: &Step,
        attempt: usize,
    ) -> (Result<(), StepError>, Option<usize>) {
        let keyword = step.keyword.trim().to_owned();
        match self.registry.resolve_step(step) {
            Ok(found) => {
                let def = found.definition;
                tracing::debug!(pattern = %def.pattern(), location = %def.location());
                let ctx = Context {
                    keyword,
                    text: step.text.clone(),
                    args: found.args,
                    attempt,
                };
                let timeout = def.options().timeout.or(self.options.step_timeout);
                let res = execute(&step.text, timeout, def.call(world, ctx)).await;
                (res, def.options().max_retries)
            }
            Err(not_found) => {
                let fallback = self.registry.fallback().and_then(|f| {
                    let ctx = Context {
                        keyword,
                        text: step.text.clone(),
                        args: step_attachments(step).collect(),
                        attempt,
                    };
                    f.run(world, ctx)
                });
                match fallback {
                    Some(fut) => {
                        tracing::debug!("running unmatched step with fallback");
                        let res = execute(&step.text, self.options.step_timeout, fut).await;
                        (res, None)
                    }
                    None => (Err(not_found), None),
                }
            }
        }
    }
}

/// Awaits a step handler `future` bounded by `timeout`.
async fn execute(
    text: &str,
    timeout: Option<Duration>,
    future: LocalBoxFuture<'_, anyhow::Result<()>>,
) -> Result<(), StepError> {
    match maybe_timeout(timeout, catch_failure(future)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(message)) => Err(StepError::Failed { text: text.to_owned(), message }),
        Err(Elapsed(after)) => Err(StepError::Timeout { text: text.to_owned(), after }),
    }
}

fn hook_context(
    instance: &ScenarioInstance,
    step: Option<&Step>,
    status: Option<Status>,
    attempt: usize,
) -> HookContext {
    HookContext {
        feature: instance.feature.clone(),
        scenario: Some(instance.name.clone()),
        step: step.map(|s| s.text.clone()),
        tags: instance.tags.clone(),
        status,
        attempt,
    }
}

/// Runs applicable hooks of the `phase` in order, stopping at the first
/// failure.
pub(super) async fn run_hooks<W>(
    registry: &Registry<W>,
    phase: HookPhase,
    ctx: &HookContext,
    mut world: Option<&mut W>,
) -> Result<(), HookError> {
    for hook in registry.hooks().list(phase, &ctx.tags) {
        catch_failure(hook.call(ctx, world.as_deref_mut()))
            .instrument(tracing::error_span!("hook", %phase, location = %hook.location()))
            .await
            .map_err(|message| HookError { phase, message })?;
    }
    Ok(())
}

/// Runs every applicable hook of the `phase` in order, collecting failures.
pub(super) async fn run_all_hooks<W>(
    registry: &Registry<W>,
    phase: HookPhase,
    ctx: &HookContext,
    mut world: Option<&mut W>,
) -> Vec<HookError> {
    let mut errors = Vec::new();
    for hook in registry.hooks().list(phase, &ctx.tags) {
        if let Err(message) = catch_failure(hook.call(ctx, world.as_deref_mut()))
            .instrument(tracing::error_span!("hook", %phase, location = %hook.location()))
            .await
        {
            errors.push(HookError { phase, message });
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use futures::executor::block_on;

    use super::*;
    use crate::{
        model::{Feature, Scenario},
        retry::Unconditional,
    };

    #[derive(Debug)]
    struct Empty;

    impl World for Empty {
        type Error = Infallible;

        async fn new() -> Result<Self, Self::Error> {
            Ok(Self)
        }
    }

    #[derive(Debug)]
    struct Unreachable;

    impl World for Unreachable {
        type Error = &'static str;

        async fn new() -> Result<Self, Self::Error> {
            Err("no connection")
        }
    }

    fn instance(scenario: Scenario) -> ScenarioInstance {
        ScenarioInstance::plain(&Feature::new("F"), &scenario)
    }

    fn run<W: World>(
        registry: &Registry<W>,
        options: &RunOptions,
        scenario: Scenario,
    ) -> ScenarioOutcome {
        let orchestrator = ScenarioOrchestrator::new(registry, options, &Unconditional);
        block_on(orchestrator.run(&instance(scenario)))
    }

    #[test]
    fn zero_steps_pass_trivially() {
        let registry = Registry::<Empty>::builder().build().unwrap();

        let outcome = run(&registry, &RunOptions::default(), Scenario::new("nothing"));

        assert_eq!(outcome.result.status, Status::Passed);
        assert!(outcome.result.steps.is_empty());
        assert!(outcome.discarded.is_empty());
    }

    #[test]
    fn world_creation_failure_is_not_retried() {
        let registry = Registry::<Unreachable>::builder().build().unwrap();
        let options = RunOptions { retries: 2, ..RunOptions::default() };

        let outcome = run(
            &registry,
            &options,
            Scenario::new("offline").step(Step::given("anything")),
        );

        assert_eq!(outcome.result.status, Status::Failed);
        assert_eq!(
            outcome.result.error,
            Some(ScenarioError::World("no connection".into())),
        );
        assert_eq!(outcome.result.steps[0].status, Status::Skipped);
        assert!(outcome.discarded.is_empty());
    }

    #[test]
    fn records_come_in_attempt_order() {
        let registry = Registry::<Empty>::builder()
            .step("it fails", |_, _| {
                async { Err(anyhow::anyhow!("nope")) }.boxed_local()
            })
            .build()
            .unwrap();
        let options = RunOptions { retries: 1, ..RunOptions::default() };

        let scenario = Scenario::new("s").step(Step::when("it fails"));

        let records = run(&registry, &options, scenario).into_records();

        let attempts = records.iter().map(|r| r.attempt).collect::<Vec<_>>();
        assert_eq!(attempts, [1, 2]);
        assert!(matches!(
            records[1].error,
            Some(ScenarioError::RetryExhausted { attempts: 2, .. }),
        ));
    }

    #[test]
    fn state_display() {
        assert_eq!(State::Finalized(Status::Passed).to_string(), "finalized (passed)");
        assert_eq!(State::RunningBackground.to_string(), "running background");
    }
}
