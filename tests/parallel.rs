// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Concurrent runs across workers and fail-fast scheduling.

use std::{convert::Infallible, time::Duration};

use futures::{future::LocalBoxFuture, FutureExt as _};
use scenario_runner::{
    future::sleep, Context, Feature, Registry, RunOptions, Runner, Scenario,
    Stats, Status, Step, World,
};

#[derive(Debug, Default)]
struct Worker;

impl World for Worker {
    type Error = Infallible;

    async fn new() -> Result<Self, Self::Error> {
        Ok(Self)
    }
}

fn waits<'a>(_: &'a mut Worker, ctx: Context) -> LocalBoxFuture<'a, anyhow::Result<()>> {
    async move {
        let millis = u64::try_from(ctx.int(0)?)?;
        sleep(Duration::from_millis(millis)).await;
        anyhow::Ok(())
    }
    .boxed_local()
}

fn fails<'a>(_: &'a mut Worker, _: Context) -> LocalBoxFuture<'a, anyhow::Result<()>> {
    async { Err(anyhow::anyhow!("broken")) }.boxed_local()
}

fn registry() -> Registry<Worker> {
    Registry::builder()
        .step("it takes {int}ms", waits)
        .step("it breaks", fails)
        .build()
        .unwrap()
}

fn scenario(name: &str, step: &str) -> Scenario {
    Scenario::new(name).step(Step::when(step))
}

#[tokio::test]
async fn aggregates_results_of_all_workers() {
    let registry = registry();
    let feature = Feature::new("Pool")
        .scenario(scenario("a", "it takes 30ms"))
        .scenario(scenario("b", "it breaks"))
        .scenario(scenario("c", "it takes 5ms"))
        .scenario(scenario("d", "it takes 10ms"));
    let options = RunOptions { workers: 2, ..RunOptions::default() };

    let summary = Runner::new(&registry).with_options(options).run(&[feature]).await;

    assert_eq!(
        summary.stats,
        Stats { passed: 3, failed: 1, skipped: 0, retried: 0 },
    );
    assert!(summary.has_failures());
    let names = summary.results.iter().map(|r| r.key.scenario.as_str()).collect::<Vec<_>>();
    assert_eq!(names, ["a", "b", "c", "d"], "results keep document order");
    assert_eq!(summary.results[1].status, Status::Failed);
}

#[tokio::test]
async fn workers_run_concurrently() {
    let registry = registry();
    let feature = (0..4).fold(Feature::new("Pool"), |f, i| {
        f.scenario(scenario(&format!("s{i}"), "it takes 100ms"))
    });
    let options = RunOptions { workers: 4, ..RunOptions::default() };
    let started = std::time::Instant::now();

    let summary = Runner::new(&registry).with_options(options).run(&[feature]).await;

    assert_eq!(summary.stats.passed, 4);
    assert!(started.elapsed() < Duration::from_millis(350));
}

#[tokio::test]
async fn features_share_the_workers() {
    let registry = registry();
    let features = ["a", "b", "c", "d"]
        .map(|name| Feature::new(name).scenario(scenario("only", "it takes 200ms")));
    let options = RunOptions { workers: 4, ..RunOptions::default() };
    let started = std::time::Instant::now();

    let summary = Runner::new(&registry).with_options(options).run(&features).await;

    assert_eq!(summary.stats.passed, 4);
    assert!(started.elapsed() < Duration::from_millis(600), "{:?}", started.elapsed());
    let names = summary.results.iter().map(|r| r.key.feature.as_str()).collect::<Vec<_>>();
    assert_eq!(names, ["a", "b", "c", "d"]);
}

#[tokio::test]
async fn fail_fast_skips_remaining_scenarios() {
    let registry = registry();
    let features = [
        Feature::new("First")
            .scenario(scenario("ok", "it takes 1ms"))
            .scenario(scenario("broken", "it breaks"))
            .scenario(scenario("later", "it takes 1ms")),
        Feature::new("Second").scenario(scenario("never", "it takes 1ms")),
    ];
    let options = RunOptions { fail_fast: true, ..RunOptions::default() };

    let summary = Runner::new(&registry).with_options(options).run(&features).await;

    let statuses = summary.results.iter().map(|r| r.status).collect::<Vec<_>>();
    assert_eq!(
        statuses,
        [Status::Passed, Status::Failed, Status::Skipped, Status::Skipped],
    );
}

#[tokio::test]
async fn fail_fast_stops_scheduling_in_pool() {
    let registry = registry();
    let feature = Feature::new("Pool")
        .scenario(scenario("broken", "it breaks"))
        .scenario(scenario("slow", "it takes 50ms"))
        .scenario(scenario("queued", "it takes 1ms"))
        .scenario(scenario("queued too", "it takes 1ms"));
    let options = RunOptions { workers: 2, fail_fast: true, ..RunOptions::default() };

    let summary = Runner::new(&registry).with_options(options).run(&[feature]).await;

    assert_eq!(summary.results.len(), 4);
    assert_eq!(summary.results[0].status, Status::Failed);
    assert_eq!(summary.results[2].status, Status::Skipped);
    assert_eq!(summary.stats.total(), 4);
}
