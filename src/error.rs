// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Error taxonomy of step dispatch, hooks, scenarios and collaborators.
//!
//! Step and hook failures never escape a scenario: the orchestrator catches
//! them at its boundary and turns them into a failed
//! [`ScenarioExecutionResult`].
//!
//! [`ScenarioExecutionResult`]: crate::ScenarioExecutionResult

use std::{io, path::PathBuf, time::Duration};

use derive_more::with_trait::{Display, Error};

use crate::hook::HookPhase;

/// Failure of a single [`Step`] dispatch.
///
/// [`Step`]: crate::Step
#[derive(Clone, Debug, Display, Error, PartialEq)]
pub enum StepError {
    /// No step definition matches the step text.
    #[display("Step doesn't match any definition: {text}")]
    NotFound {
        /// Text of the unmatched step.
        #[error(not(source))]
        text: String,
    },

    /// Step handler didn't complete within its bound.
    #[display(
        "Step timed out after {}: {text}",
        humantime::format_duration(*after),
    )]
    Timeout {
        /// Text of the timed out step.
        #[error(not(source))]
        text: String,

        /// Bound the step handler exceeded.
        after: Duration,
    },

    /// Step handler returned an error or panicked.
    #[display("Step failed: {text}\n{message}")]
    Failed {
        /// Text of the failed step.
        #[error(not(source))]
        text: String,

        /// Rendered error or panic message of the handler.
        message: String,
    },

    /// `beforeStep` or `afterStep` hook failed around the step.
    #[display("{hook}")]
    Hook {
        /// Text of the step the hook was bracketing.
        #[error(not(source))]
        text: String,

        /// Failure of the hook itself.
        hook: HookError,
    },
}

impl StepError {
    /// Returns the text of the step this error relates to.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::NotFound { text }
            | Self::Timeout { text, .. }
            | Self::Failed { text, .. }
            | Self::Hook { text, .. } => text,
        }
    }

    /// Indicates whether a scenario failing with this error may be retried at
    /// all.
    ///
    /// An unmatched step fails deterministically, so retrying it is pointless.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::NotFound { .. })
    }
}

/// Failure of a lifecycle hook.
#[derive(Clone, Debug, Display, Error, PartialEq)]
#[display("{phase} hook failed: {message}")]
pub struct HookError {
    /// Phase of the failed hook.
    pub phase: HookPhase,

    /// Rendered error or panic message of the hook.
    #[error(not(source))]
    pub message: String,
}

/// Reason of a failed [`ScenarioExecutionResult`].
///
/// [`ScenarioExecutionResult`]: crate::ScenarioExecutionResult
#[derive(Clone, Debug, Display, Error, PartialEq)]
pub enum ScenarioError {
    /// A step (background or scenario one) failed.
    #[display("{_0}")]
    Step(StepError),

    /// A `before` hook failed. Never retried.
    #[display("{_0}")]
    BeforeHook(HookError),

    /// A `beforeFeature` hook failed, so the scenario never ran.
    #[display("Feature {_0}")]
    FeatureHook(HookError),

    /// [`World`] instance couldn't be created.
    ///
    /// [`World`]: crate::World
    #[display("Failed to create World: {_0}")]
    World(#[error(not(source))] String),

    /// Example data of the scenario template couldn't be loaded.
    #[display("Failed to expand examples: {_0}")]
    Examples(#[error(not(source))] String),

    /// Every retry attempt was consumed without success.
    #[display("Retries exhausted after {attempts} attempts: {source}")]
    RetryExhausted {
        /// Total number of attempts, including the first one.
        attempts: usize,

        /// Failure of the last attempt.
        source: Box<ScenarioError>,
    },

    /// Worker running the scenario crashed outside of any step or hook.
    #[display("Worker crashed: {_0}")]
    WorkerCrashed(#[error(not(source))] String),
}

impl From<StepError> for ScenarioError {
    fn from(err: StepError) -> Self {
        Self::Step(err)
    }
}

impl ScenarioError {
    /// Returns the innermost [`StepError`], if the failure was caused by a
    /// step.
    #[must_use]
    pub fn step_error(&self) -> Option<&StepError> {
        match self {
            Self::Step(err) => Some(err),
            Self::RetryExhausted { source, .. } => source.step_error(),
            Self::BeforeHook(_)
            | Self::FeatureHook(_)
            | Self::World(_)
            | Self::Examples(_)
            | Self::WorkerCrashed(_) => None,
        }
    }
}

/// Invalid step pattern given at registration.
#[derive(Clone, Debug, Display, Error)]
#[display("Invalid step pattern `{pattern}`: {source}")]
pub struct PatternError {
    /// Pattern as it was registered.
    pub pattern: String,

    /// Regular expression compilation error.
    pub source: regex::Error,
}

/// Error of accessing a typed step [`Argument`].
///
/// [`Argument`]: crate::Argument
#[derive(Clone, Debug, Display, Error, Eq, PartialEq)]
pub enum ArgumentError {
    /// There is no argument at the requested position.
    #[display("No step argument at index {index}")]
    Missing {
        /// Requested position.
        index: usize,
    },

    /// Argument has another type than requested.
    #[display("Step argument {index} is {found}, expected {expected}")]
    Mismatch {
        /// Requested position.
        index: usize,

        /// Requested kind.
        expected: &'static str,

        /// Actual kind.
        found: &'static str,
    },
}

/// Error of obtaining example data for a scenario template.
#[derive(Debug, Display, Error)]
pub enum ExamplesError {
    /// Template references an external source, but none is configured.
    #[display("No examples source configured to load `{name}`")]
    NoSource {
        /// Name of the referenced source.
        #[error(not(source))]
        name: String,
    },

    /// Configured source doesn't know the referenced name.
    #[display("Unknown examples source `{name}`")]
    Unknown {
        /// Name of the referenced source.
        #[error(not(source))]
        name: String,
    },

    /// Examples file couldn't be read.
    #[display("Failed to read examples from `{}`: {source}", path.display())]
    Io {
        /// Path of the examples file.
        path: PathBuf,

        /// Underlying I/O error.
        source: io::Error,
    },

    /// Examples file isn't valid JSON.
    #[display("Malformed examples in `{}`: {source}", path.display())]
    Json {
        /// Path of the examples file.
        path: PathBuf,

        /// Underlying deserialization error.
        source: serde_json::Error,
    },

    /// Loaded data cannot be shaped into headers and rows.
    #[display("Examples `{name}` have invalid shape: {reason}")]
    Shape {
        /// Name of the source.
        #[error(not(source))]
        name: String,

        /// What is wrong with the data.
        reason: String,
    },
}

/// Error of loading `.feature` files.
#[derive(Debug, Display, Error)]
pub enum LoadError {
    /// Path doesn't exist or cannot be canonicalized.
    #[display("Cannot access `{}`: {source}", path.display())]
    Path {
        /// Requested path.
        path: PathBuf,

        /// Underlying I/O error.
        source: io::Error,
    },

    /// Directory walking failed.
    #[display("Failed to walk feature files: {_0}")]
    Glob(globwalk::GlobError),

    /// A feature file has invalid syntax.
    #[display("Failed to parse feature file: {_0}")]
    Parse(gherkin::ParseFileError),

    /// Feature text has invalid syntax.
    #[display("Failed to parse feature: {_0}")]
    Syntax(#[error(not(source))] String),
}

/// Invalid tag expression.
#[derive(Clone, Debug, Display, Error, Eq, PartialEq)]
#[display("Invalid tag expression `{expression}`: {reason}")]
pub struct FilterError {
    /// Expression as given.
    pub expression: String,

    /// Parser message.
    pub reason: String,
}
