// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! [`Registry`] of step definitions and hooks, assembled once by a
//! [`RegistryBuilder`] and read-only afterwards.

use std::fmt;

use futures::future::LocalBoxFuture;

use crate::{
    error::{PatternError, StepError},
    hook::{HookContext, HookPhase, HookRegistry},
    model::Step,
    step::{
        ArgumentResolver, Collection, Context, Fallback, Location, Match,
        Pattern, StepFn, StepOptions,
    },
};

/// Step definitions, hooks and the collaborators of step resolution.
///
/// Immutable once built, so it's shared by reference across every scenario
/// and worker of a run.
pub struct Registry<W> {
    /// Step definitions.
    steps: Collection<W>,

    /// Lifecycle hooks.
    hooks: HookRegistry<W>,

    /// Substitution applied to raw arguments before coercion.
    resolver: Option<Box<dyn ArgumentResolver>>,

    /// Executor of steps matching no definition.
    fallback: Option<Box<dyn Fallback<W>>>,
}

impl<W> fmt::Debug for Registry<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("steps", &self.steps)
            .field("hooks", &self.hooks)
            .field("resolver", &self.resolver.is_some())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

impl<W> Registry<W> {
    /// Starts building a new [`Registry`].
    #[must_use]
    pub fn builder() -> RegistryBuilder<W> {
        RegistryBuilder::default()
    }

    /// Returns the step definitions.
    #[must_use]
    pub const fn steps(&self) -> &Collection<W> {
        &self.steps
    }

    /// Returns the hooks.
    #[must_use]
    pub const fn hooks(&self) -> &HookRegistry<W> {
        &self.hooks
    }

    /// Returns the [`ArgumentResolver`], if any.
    #[must_use]
    pub fn resolver(&self) -> Option<&dyn ArgumentResolver> {
        self.resolver.as_deref()
    }

    /// Returns the [`Fallback`] executor, if any.
    #[must_use]
    pub fn fallback(&self) -> Option<&dyn Fallback<W>> {
        self.fallback.as_deref()
    }

    /// Resolves a step `text` into its handler and coerced arguments.
    ///
    /// Pure with respect to this [`Registry`]: the same `text` always
    /// resolves the same way.
    ///
    /// # Errors
    ///
    /// [`StepError::NotFound`] if no definition matches.
    pub fn resolve(&self, text: &str) -> Result<Match<'_, W>, StepError> {
        self.steps.resolve(text, self.resolver())
    }

    /// Resolves a whole [`Step`], appending its data table and doc string to
    /// the arguments.
    ///
    /// # Errors
    ///
    /// [`StepError::NotFound`] if no definition matches.
    pub fn resolve_step(&self, step: &Step) -> Result<Match<'_, W>, StepError> {
        self.steps.resolve_step(step, self.resolver())
    }
}

/// Step definition waiting for [`RegistryBuilder::build()`].
struct PendingStep<W> {
    pattern: Pattern,
    options: StepOptions,
    handler: StepFn<W>,
    location: Location,
}

/// Builder of a [`Registry`].
///
/// Patterns are compiled on [`RegistryBuilder::build()`], so registration
/// itself never fails.
pub struct RegistryBuilder<W> {
    /// Steps in registration order.
    steps: Vec<PendingStep<W>>,

    /// Hooks registered so far.
    hooks: HookRegistry<W>,

    /// Substitution applied to raw arguments before coercion.
    resolver: Option<Box<dyn ArgumentResolver>>,

    /// Executor of steps matching no definition.
    fallback: Option<Box<dyn Fallback<W>>>,
}

impl<W> Default for RegistryBuilder<W> {
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            hooks: HookRegistry::new(),
            resolver: None,
            fallback: None,
        }
    }
}

impl<W> fmt::Debug for RegistryBuilder<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field(
                "steps",
                &self.steps.iter().map(|s| &s.pattern).collect::<Vec<_>>(),
            )
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl<W> RegistryBuilder<W> {
    /// Registers a step definition with default [`StepOptions`].
    #[must_use]
    #[track_caller]
    pub fn step<F>(self, pattern: impl Into<Pattern>, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut W, Context) -> LocalBoxFuture<'a, anyhow::Result<()>>
            + 'static,
    {
        self.step_with(pattern, StepOptions::default(), handler)
    }

    /// Registers a step definition with the given [`StepOptions`].
    #[must_use]
    #[track_caller]
    pub fn step_with<F>(
        mut self,
        pattern: impl Into<Pattern>,
        options: StepOptions,
        handler: F,
    ) -> Self
    where
        F: for<'a> Fn(&'a mut W, Context) -> LocalBoxFuture<'a, anyhow::Result<()>>
            + 'static,
    {
        self.steps.push(PendingStep {
            pattern: pattern.into(),
            options,
            handler: Box::new(handler),
            location: Location::caller(),
        });
        self
    }

    /// Registers a hook of the given `phase`, applying only where one of the
    /// `tags` is active (everywhere if there are none), ordered by `order`.
    #[must_use]
    #[track_caller]
    pub fn hook<F, T>(
        mut self,
        phase: HookPhase,
        tags: impl IntoIterator<Item = T>,
        order: i32,
        handler: F,
    ) -> Self
    where
        F: for<'a> Fn(
                &'a HookContext,
                Option<&'a mut W>,
            ) -> LocalBoxFuture<'a, anyhow::Result<()>>
            + 'static,
        T: AsRef<str>,
    {
        self.hooks.register(
            phase,
            tags,
            order,
            Box::new(handler),
            Location::caller(),
        );
        self
    }

    /// Registers an untagged [`HookPhase::Before`] hook.
    #[must_use]
    #[track_caller]
    pub fn before<F>(self, handler: F) -> Self
    where
        F: for<'a> Fn(
                &'a HookContext,
                Option<&'a mut W>,
            ) -> LocalBoxFuture<'a, anyhow::Result<()>>
            + 'static,
    {
        self.hook(HookPhase::Before, None::<&str>, 0, handler)
    }

    /// Registers an untagged [`HookPhase::After`] hook.
    #[must_use]
    #[track_caller]
    pub fn after<F>(self, handler: F) -> Self
    where
        F: for<'a> Fn(
                &'a HookContext,
                Option<&'a mut W>,
            ) -> LocalBoxFuture<'a, anyhow::Result<()>>
            + 'static,
    {
        self.hook(HookPhase::After, None::<&str>, 0, handler)
    }

    /// Registers an untagged [`HookPhase::BeforeStep`] hook.
    #[must_use]
    #[track_caller]
    pub fn before_step<F>(self, handler: F) -> Self
    where
        F: for<'a> Fn(
                &'a HookContext,
                Option<&'a mut W>,
            ) -> LocalBoxFuture<'a, anyhow::Result<()>>
            + 'static,
    {
        self.hook(HookPhase::BeforeStep, None::<&str>, 0, handler)
    }

    /// Registers an untagged [`HookPhase::AfterStep`] hook.
    #[must_use]
    #[track_caller]
    pub fn after_step<F>(self, handler: F) -> Self
    where
        F: for<'a> Fn(
                &'a HookContext,
                Option<&'a mut W>,
            ) -> LocalBoxFuture<'a, anyhow::Result<()>>
            + 'static,
    {
        self.hook(HookPhase::AfterStep, None::<&str>, 0, handler)
    }

    /// Registers an untagged [`HookPhase::BeforeFeature`] hook.
    #[must_use]
    #[track_caller]
    pub fn before_feature<F>(self, handler: F) -> Self
    where
        F: for<'a> Fn(
                &'a HookContext,
                Option<&'a mut W>,
            ) -> LocalBoxFuture<'a, anyhow::Result<()>>
            + 'static,
    {
        self.hook(HookPhase::BeforeFeature, None::<&str>, 0, handler)
    }

    /// Registers an untagged [`HookPhase::AfterFeature`] hook.
    #[must_use]
    #[track_caller]
    pub fn after_feature<F>(self, handler: F) -> Self
    where
        F: for<'a> Fn(
                &'a HookContext,
                Option<&'a mut W>,
            ) -> LocalBoxFuture<'a, anyhow::Result<()>>
            + 'static,
    {
        self.hook(HookPhase::AfterFeature, None::<&str>, 0, handler)
    }

    /// Sets the [`ArgumentResolver`] substituting raw arguments before
    /// coercion.
    #[must_use]
    pub fn resolver(mut self, resolver: impl ArgumentResolver + 'static) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    /// Sets the [`Fallback`] executor of steps matching no definition.
    #[must_use]
    pub fn fallback(mut self, fallback: impl Fallback<W> + 'static) -> Self {
        self.fallback = Some(Box::new(fallback));
        self
    }

    /// Compiles every registered pattern, producing the [`Registry`].
    ///
    /// # Errors
    ///
    /// On the first pattern that doesn't compile.
    pub fn build(self) -> Result<Registry<W>, PatternError> {
        let mut steps = Collection::new();
        for s in self.steps {
            _ = steps.register(s.pattern, s.options, s.handler, s.location)?;
        }
        Ok(Registry {
            steps,
            hooks: self.hooks,
            resolver: self.resolver,
            fallback: self.fallback,
        })
    }
}
