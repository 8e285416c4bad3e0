// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Helper threads behind step timeouts.

#![cfg(target_os = "linux")]

use std::{
    convert::Infallible,
    fs, thread,
    time::{Duration, Instant},
};

use futures::{executor::block_on, future::LocalBoxFuture, FutureExt as _};
use scenario_runner::{Context, Feature, Registry, RunOptions, Runner, Scenario, Step, World};

#[derive(Debug, Default)]
struct Clock;

impl World for Clock {
    type Error = Infallible;

    async fn new() -> Result<Self, Self::Error> {
        Ok(Self)
    }
}

fn quick<'a>(_: &'a mut Clock, _: Context) -> LocalBoxFuture<'a, anyhow::Result<()>> {
    async { anyhow::Ok(()) }.boxed_local()
}

fn threads() -> usize {
    fs::read_to_string("/proc/self/status")
        .unwrap()
        .lines()
        .find_map(|l| l.strip_prefix("Threads:"))
        .unwrap()
        .trim()
        .parse()
        .unwrap()
}

#[test]
fn timed_steps_leave_no_threads_behind() {
    let registry = Registry::<Clock>::builder().step("it is quick", quick).build().unwrap();
    let scenario = (0..300)
        .fold(Scenario::new("many steps"), |s, _| s.step(Step::when("it is quick")));
    let feature = Feature::new("Timers").scenario(scenario);
    let options = RunOptions {
        step_timeout: Some(Duration::from_secs(30)),
        ..RunOptions::default()
    };
    let before = threads();

    let summary = block_on(Runner::new(&registry).with_options(options).run(&[feature]));
    assert_eq!(summary.stats.passed, 1);

    let deadline = Instant::now() + Duration::from_secs(5);
    while threads() > before && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert!(threads() <= before, "{} threads left of {before}", threads());
}
