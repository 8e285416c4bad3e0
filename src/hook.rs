// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Lifecycle hooks and their registry.

use std::fmt;

use derive_more::with_trait::Display;
use futures::future::LocalBoxFuture;

use crate::{result::Status, tag, step::Location};

/// Point of the lifecycle a [`Hook`] runs at.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum HookPhase {
    /// Before any scenario of a feature.
    #[display("beforeFeature")]
    BeforeFeature,

    /// After every scenario of a feature.
    #[display("afterFeature")]
    AfterFeature,

    /// Before each scenario attempt.
    #[display("before")]
    Before,

    /// After each scenario, once its status is decided.
    #[display("after")]
    After,

    /// Before each step.
    #[display("beforeStep")]
    BeforeStep,

    /// After each step.
    #[display("afterStep")]
    AfterStep,
}

/// What a [`Hook`] is invoked for.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HookContext {
    /// Name of the feature.
    pub feature: String,

    /// Display name of the scenario, unless it's a feature-level hook.
    pub scenario: Option<String>,

    /// Text of the step, for step-level hooks only.
    pub step: Option<String>,

    /// Tags of the scenario, or of the feature for feature-level hooks.
    pub tags: Vec<String>,

    /// Outcome so far: the scenario status in [`HookPhase::After`], the step
    /// status in [`HookPhase::AfterStep`].
    pub status: Option<Status>,

    /// Number of the scenario attempt, starting from 1. Zero for
    /// feature-level hooks.
    pub attempt: usize,
}

/// Handler of a [`Hook`].
///
/// Receives the [`World`] of the scenario, if there is one: feature-level
/// hooks and [`HookPhase::After`] hooks of a scenario whose [`World`]
/// couldn't be created get [`None`].
///
/// [`World`]: crate::World
pub type HookFn<W> = Box<
    dyn for<'a> Fn(
        &'a HookContext,
        Option<&'a mut W>,
    ) -> LocalBoxFuture<'a, anyhow::Result<()>>,
>;

/// Registered lifecycle hook.
pub struct Hook<W> {
    /// Phase this hook runs at.
    phase: HookPhase,

    /// Normalized tags filtering where this hook applies. Empty means
    /// everywhere.
    tags: Vec<String>,

    /// Ordering priority: lower runs first.
    order: i32,

    /// Handler to invoke.
    handler: HookFn<W>,

    /// Where this hook was registered.
    location: Location,
}

impl<W> Hook<W> {
    /// Returns the [`HookPhase`] of this [`Hook`].
    #[must_use]
    pub const fn phase(&self) -> HookPhase {
        self.phase
    }

    /// Returns the tags filtering this [`Hook`].
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns the ordering priority of this [`Hook`].
    #[must_use]
    pub const fn order(&self) -> i32 {
        self.order
    }

    /// Returns the [`Location`] this [`Hook`] was registered at.
    #[must_use]
    pub const fn location(&self) -> Location {
        self.location
    }

    /// Indicates whether this [`Hook`] applies to something tagged with
    /// `active` tags.
    #[must_use]
    pub fn applies_to<T: AsRef<str>>(&self, active: &[T]) -> bool {
        self.tags.is_empty() || tag::intersects(&self.tags, active)
    }

    /// Invokes the handler of this [`Hook`].
    pub fn call<'a>(
        &self,
        ctx: &'a HookContext,
        world: Option<&'a mut W>,
    ) -> LocalBoxFuture<'a, anyhow::Result<()>> {
        (self.handler)(ctx, world)
    }
}

impl<W> fmt::Debug for Hook<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("phase", &self.phase)
            .field("tags", &self.tags)
            .field("order", &self.order)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

/// Registry of [`Hook`]s of all phases.
pub struct HookRegistry<W> {
    /// Hooks in registration order.
    hooks: Vec<Hook<W>>,
}

impl<W> Default for HookRegistry<W> {
    fn default() -> Self {
        Self { hooks: Vec::new() }
    }
}

impl<W> fmt::Debug for HookRegistry<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.hooks).finish()
    }
}

impl<W> HookRegistry<W> {
    /// Creates a new empty [`HookRegistry`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new [`Hook`].
    pub fn register<T: AsRef<str>>(
        &mut self,
        phase: HookPhase,
        tags: impl IntoIterator<Item = T>,
        order: i32,
        handler: HookFn<W>,
        location: Location,
    ) {
        self.hooks.push(Hook {
            phase,
            tags: tags
                .into_iter()
                .map(|t| tag::normalize(t.as_ref()).to_owned())
                .collect(),
            order,
            handler,
            location,
        });
    }

    /// Lists [`Hook`]s of the given `phase` applying to the `active` tags,
    /// ascending by their order, ties broken by registration order.
    #[must_use]
    pub fn list<T: AsRef<str>>(
        &self,
        phase: HookPhase,
        active: &[T],
    ) -> Vec<&Hook<W>> {
        let mut hooks = self
            .hooks
            .iter()
            .filter(|h| h.phase == phase && h.applies_to(active))
            .collect::<Vec<_>>();
        hooks.sort_by_key(|h| h.order);
        hooks
    }

    /// Returns the number of registered [`Hook`]s.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Indicates whether no [`Hook`] is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}
