// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Pool of concurrent workers running scenario instances.

use std::{
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use futures::{
    channel::mpsc,
    future::{self, LocalBoxFuture},
    FutureExt as _, StreamExt as _,
};
use tracing::Instrument as _;

use crate::{
    error::ScenarioError,
    examples::ScenarioInstance,
    future::{panic_message, FutureExt as _},
    result::{ScenarioExecutionResult, Status},
};

use super::aggregate::Aggregator;

/// Shared flag stopping the scheduling of new scenarios.
///
/// Scenarios already running are never interrupted.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Creates a new unset [`StopSignal`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets this [`StopSignal`].
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Indicates whether this [`StopSignal`] is set.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Pool of workers distributing scenario instances round-robin.
///
/// Workers are [`Future`]s polled concurrently on the calling task, so the
/// pool works with any executor. Each worker runs its queue in order,
/// yielding between instances.
///
/// [`Future`]: std::future::Future
#[derive(Clone, Copy, Debug)]
pub struct WorkerPool {
    /// Number of workers.
    workers: usize,

    /// Whether a failed instance stops the scheduling of further ones.
    fail_fast: bool,
}

impl WorkerPool {
    /// Creates a new [`WorkerPool`] of the given number of `workers` (at least
    /// one).
    #[must_use]
    pub fn new(workers: usize) -> Self {
        Self { workers: workers.max(1), fail_fast: false }
    }

    /// Makes a failed instance stop the scheduling of further ones.
    #[must_use]
    pub const fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Returns the number of workers.
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Runs every unit with `run`, collecting all records it reports.
    ///
    /// Completes only once every unit has reported. A unit that isn't
    /// started because of the `stop` signal is reported as skipped. A
    /// panicking `run` crashes its worker: the unit is reported as failed
    /// with [`ScenarioError::WorkerCrashed`], the rest of that worker's queue
    /// as skipped, and the other workers carry on.
    pub async fn execute<'u, F>(
        &self,
        units: &'u [ScenarioInstance],
        stop: &StopSignal,
        run: F,
    ) -> Aggregator
    where
        F: Fn(usize, &'u ScenarioInstance) -> LocalBoxFuture<'u, Vec<ScenarioExecutionResult>>,
    {
        self.execute_each(units, stop, run).await.into_iter().flatten().collect()
    }

    /// Same as [`WorkerPool::execute()`], but returns the records of each
    /// unit separately, in the order of `units`.
    ///
    /// `run` receives the position of the unit in `units` along with it.
    pub async fn execute_each<'u, F>(
        &self,
        units: &'u [ScenarioInstance],
        stop: &StopSignal,
        run: F,
    ) -> Vec<Vec<ScenarioExecutionResult>>
    where
        F: Fn(usize, &'u ScenarioInstance) -> LocalBoxFuture<'u, Vec<ScenarioExecutionResult>>,
    {
        let (tx, rx) = mpsc::unbounded::<(usize, ScenarioExecutionResult)>();

        let mut queues = vec![Vec::new(); self.workers.min(units.len().max(1))];
        let width = queues.len();
        for (i, unit) in units.iter().enumerate() {
            queues[i % width].push((i, unit));
        }

        let run = &run;
        let workers = queues
            .into_iter()
            .enumerate()
            .map(|(id, queue)| {
                let tx = tx.clone();
                async move {
                    let mut queue = queue.into_iter();
                    while let Some((i, unit)) = queue.next() {
                        if stop.is_stopped() {
                            tracing::debug!(scenario = %unit.name, "stopped, skipping");
                            _ = tx.unbounded_send((i, ScenarioExecutionResult::skipped(unit)));
                            continue;
                        }

                        let attempt = AssertUnwindSafe(async { run(i, unit).await });
                        match attempt.catch_unwind().then_yield().await {
                            Ok(records) => {
                                let failed = records
                                    .last()
                                    .is_some_and(|r| r.status == Status::Failed);
                                for r in records {
                                    _ = tx.unbounded_send((i, r));
                                }
                                if failed && self.fail_fast {
                                    tracing::info!(scenario = %unit.name, "fail fast");
                                    stop.stop();
                                }
                            }
                            Err(panic) => {
                                let message = panic_message(&*panic);
                                tracing::error!(%message, "worker crashed");
                                let crashed = ScenarioExecutionResult::failed(
                                    unit,
                                    ScenarioError::WorkerCrashed(message),
                                );
                                _ = tx.unbounded_send((i, crashed));
                                for (i, rest) in queue.by_ref() {
                                    _ = tx.unbounded_send((
                                        i,
                                        ScenarioExecutionResult::skipped(rest),
                                    ));
                                }
                            }
                        }
                    }
                }
                .instrument(tracing::error_span!("worker", id))
            })
            .collect::<Vec<_>>();
        drop(tx);

        let ((), records) = future::join(
            future::join_all(workers).map(drop),
            rx.collect::<Vec<_>>(),
        )
        .await;

        let mut each = vec![Vec::new(); units.len()];
        for (i, r) in records {
            each[i].push(r);
        }
        each
    }
}
