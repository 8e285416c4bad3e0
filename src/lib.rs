// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Runner for structured, human-readable behavioural test scenarios.
//!
//! Free-text step lines are matched against a [`Registry`] of step
//! definitions, run in document order with lifecycle hooks, expanded from
//! example tables into concrete instances and, when asked to scale out,
//! distributed across concurrent workers whose results are deterministically
//! aggregated.
//!
//! ```rust
//! # use futures::FutureExt as _;
//! # use scenario_runner::{Feature, Registry, Runner, Scenario, Step, World};
//! #
//! #[derive(Debug, Default)]
//! struct Counter(i64);
//!
//! impl World for Counter {
//!     type Error = std::convert::Infallible;
//!
//!     async fn new() -> Result<Self, Self::Error> {
//!         Ok(Self::default())
//!     }
//! }
//!
//! # futures::executor::block_on(async {
//! let registry = Registry::<Counter>::builder()
//!     .step("I add {int}", |w, ctx| {
//!         async move {
//!             w.0 += ctx.int(0)?;
//!             anyhow::Ok(())
//!         }
//!         .boxed_local()
//!     })
//!     .build()
//!     .expect("valid patterns");
//!
//! let feature = Feature::new("Counting")
//!     .scenario(Scenario::new("adds").step(Step::when("I add 5")));
//!
//! let summary = Runner::new(&registry).run(&[feature]).await;
//! assert!(!summary.has_failures());
//! # });
//! ```

#![deny(nonstandard_style, rust_2018_idioms, trivial_casts, trivial_numeric_casts)]
#![forbid(non_ascii_idents, unsafe_code)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    unused_import_braces,
    unused_qualifications
)]

pub mod cli;
pub mod data_table;
pub mod error;
pub mod examples;
pub mod future;
pub mod hook;
pub mod logging;
pub mod model;
pub mod parser;
pub mod registry;
pub mod result;
pub mod retry;
pub mod runner;
pub mod step;
pub mod tag;

use std::{fmt::Display, future::Future};

#[doc(inline)]
pub use self::{
    data_table::DataTable,
    error::{HookError, ScenarioError, StepError},
    examples::{Expander, ScenarioInstance},
    hook::{HookContext, HookPhase},
    model::{Examples, Feature, Scenario, Step},
    registry::{Registry, RegistryBuilder},
    result::{
        ScenarioExecutionResult, ScenarioKey, Stats, Status, StepResult,
    },
    retry::{RetryContext, RetryStrategy},
    runner::{RunOptions, RunSummary, Runner},
    step::{Argument, Context},
};

/// Per-scenario user state.
///
/// A fresh [`World`] is created for every scenario attempt, so nothing leaks
/// between scenarios or between retries of the same scenario.
pub trait World: Sized + 'static {
    /// Error of creating a new [`World`] instance.
    type Error: Display;

    /// Creates a new [`World`] instance.
    fn new() -> impl Future<Output = Result<Self, Self::Error>>;
}
