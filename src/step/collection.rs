// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Storage of step definitions and resolution of step text against them.

use std::{fmt, time::Duration};

use futures::future::LocalBoxFuture;

use crate::{error::{PatternError, StepError}, model::Step};

use super::{
    Argument, ArgumentResolver, CompiledMatcher, Context, Location, Pattern,
};

/// Handler of a step definition.
///
/// Receives the [`World`] of the running scenario and the [`Context`] with
/// the coerced arguments. Both returning an error and panicking fail the step.
///
/// [`World`]: crate::World
pub type StepFn<W> = Box<
    dyn for<'a> Fn(&'a mut W, Context) -> LocalBoxFuture<'a, anyhow::Result<()>>,
>;

/// Options of a [`StepDefinition`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StepOptions {
    /// Bound on a single invocation of the handler. Falls back to the
    /// run-wide step timeout if [`None`].
    pub timeout: Option<Duration>,

    /// Retry budget of a scenario failing on this step, overriding both the
    /// `@retry` tag and the run-wide budget.
    pub max_retries: Option<usize>,

    /// Free-form tags, kept as metadata only.
    pub tags: Vec<String>,

    /// Resolution priority: lower is tried first.
    pub order: i32,
}

impl StepOptions {
    /// Sets the [`StepOptions::timeout`].
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the [`StepOptions::max_retries`].
    #[must_use]
    pub const fn max_retries(mut self, retries: usize) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Adds a tag to the [`StepOptions::tags`].
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Sets the [`StepOptions::order`].
    #[must_use]
    pub const fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

/// Registered step: its compiled pattern, handler and options.
pub struct StepDefinition<W> {
    /// Registration index, unique within a [`Collection`].
    index: usize,

    /// Pattern compiled at registration.
    matcher: CompiledMatcher,

    /// Handler to invoke on a match.
    handler: StepFn<W>,

    /// Options given at registration.
    options: StepOptions,

    /// Where this definition was registered.
    location: Location,
}

impl<W> StepDefinition<W> {
    /// Returns the registration index of this definition.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Returns the [`Pattern`] of this definition.
    #[must_use]
    pub const fn pattern(&self) -> &Pattern {
        self.matcher.pattern()
    }

    /// Returns the [`CompiledMatcher`] of this definition.
    #[must_use]
    pub const fn matcher(&self) -> &CompiledMatcher {
        &self.matcher
    }

    /// Returns the [`StepOptions`] of this definition.
    #[must_use]
    pub const fn options(&self) -> &StepOptions {
        &self.options
    }

    /// Returns the [`Location`] this definition was registered at.
    #[must_use]
    pub const fn location(&self) -> Location {
        self.location
    }

    /// Invokes the handler of this definition.
    pub fn call<'a>(
        &self,
        world: &'a mut W,
        ctx: Context,
    ) -> LocalBoxFuture<'a, anyhow::Result<()>> {
        (self.handler)(world, ctx)
    }
}

impl<W> fmt::Debug for StepDefinition<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("index", &self.index)
            .field("pattern", self.matcher.pattern())
            .field("options", &self.options)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

/// Successful resolution of a step text.
pub struct Match<'me, W> {
    /// Matched definition.
    pub definition: &'me StepDefinition<W>,

    /// Coerced arguments for the handler.
    pub args: Vec<Argument>,
}

impl<W> Clone for Match<'_, W> {
    fn clone(&self) -> Self {
        Self { definition: self.definition, args: self.args.clone() }
    }
}

impl<W> PartialEq for Match<'_, W> {
    fn eq(&self, other: &Self) -> bool {
        self.definition.index == other.definition.index && self.args == other.args
    }
}

impl<W> fmt::Debug for Match<'_, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Match")
            .field("definition", self.definition)
            .field("args", &self.args)
            .finish()
    }
}

/// Executor consulted for a step that matched no definition.
///
/// It's never consulted while any definition matches.
pub trait Fallback<W> {
    /// Runs the unmatched step, or declines it by returning [`None`], in
    /// which case the step fails as not found.
    fn run<'a>(
        &'a self,
        world: &'a mut W,
        ctx: Context,
    ) -> Option<LocalBoxFuture<'a, anyhow::Result<()>>>;
}

/// Ordered collection of [`StepDefinition`]s.
///
/// Resolution tries definitions ascending by [`StepOptions::order`], ties
/// broken by registration order, and the first match wins. Overlapping
/// patterns are not reported as ambiguous.
pub struct Collection<W> {
    /// Definitions in registration order.
    definitions: Vec<StepDefinition<W>>,

    /// Indices into `definitions` in resolution order.
    resolution: Vec<usize>,
}

impl<W> Default for Collection<W> {
    fn default() -> Self {
        Self { definitions: Vec::new(), resolution: Vec::new() }
    }
}

impl<W> fmt::Debug for Collection<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<W> Collection<W> {
    /// Creates a new empty [`Collection`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles the `pattern` and appends a new [`StepDefinition`].
    ///
    /// # Errors
    ///
    /// If the `pattern` doesn't compile.
    pub fn register(
        &mut self,
        pattern: Pattern,
        options: StepOptions,
        handler: StepFn<W>,
        location: Location,
    ) -> Result<&StepDefinition<W>, PatternError> {
        let matcher = CompiledMatcher::compile(pattern)?;
        let index = self.definitions.len();
        self.definitions.push(StepDefinition {
            index,
            matcher,
            handler,
            options,
            location,
        });

        self.resolution.push(index);
        let defs = &self.definitions;
        self.resolution.sort_by_key(|&i| defs[i].options.order);

        Ok(&self.definitions[index])
    }

    /// Iterates over [`StepDefinition`]s in resolution order.
    pub fn iter(&self) -> impl Iterator<Item = &StepDefinition<W>> {
        self.resolution.iter().map(|&i| &self.definitions[i])
    }

    /// Returns the number of registered [`StepDefinition`]s.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Indicates whether no [`StepDefinition`] is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Resolves a step `text` into its first matching [`StepDefinition`] and
    /// captured arguments.
    ///
    /// # Errors
    ///
    /// [`StepError::NotFound`] if no definition matches.
    pub fn resolve(
        &self,
        text: &str,
        resolver: Option<&dyn ArgumentResolver>,
    ) -> Result<Match<'_, W>, StepError> {
        self.iter()
            .find_map(|def| {
                let captures = def.matcher.captures(text)?;
                let args = captures
                    .iter()
                    .map(|raw| Argument::coerce(raw, resolver))
                    .collect();
                Some(Match { definition: def, args })
            })
            .ok_or_else(|| StepError::NotFound { text: text.to_owned() })
    }

    /// Resolves a whole [`Step`], appending its data table and doc string to
    /// the captured arguments.
    ///
    /// # Errors
    ///
    /// [`StepError::NotFound`] if no definition matches.
    pub fn resolve_step(
        &self,
        step: &Step,
        resolver: Option<&dyn ArgumentResolver>,
    ) -> Result<Match<'_, W>, StepError> {
        let mut found = self.resolve(&step.text, resolver)?;
        found.args.extend(step_attachments(step));
        Ok(found)
    }
}

/// Returns the data table and doc string of a [`Step`] as [`Argument`]s.
pub(crate) fn step_attachments(step: &Step) -> impl Iterator<Item = Argument> + '_ {
    step.table
        .iter()
        .cloned()
        .map(Argument::Table)
        .chain(step.docstring.iter().cloned().map(Argument::DocString))
}

#[cfg(test)]
mod tests {
    use futures::FutureExt as _;

    use super::*;

    fn noop_step<'a>(
        _: &'a mut (),
        _: Context,
    ) -> LocalBoxFuture<'a, anyhow::Result<()>> {
        async { Ok(()) }.boxed_local()
    }

    fn noop() -> StepFn<()> {
        Box::new(noop_step)
    }

    fn collection(patterns: &[(&str, i32)]) -> Collection<()> {
        let mut c = Collection::new();
        for (p, order) in patterns {
            _ = c
                .register(
                    Pattern::from(*p),
                    StepOptions::default().order(*order),
                    noop(),
                    Location::caller(),
                )
                .unwrap();
        }
        c
    }

    #[test]
    fn resolves_quoted_string() {
        let c = collection(&[("I click {string}", 0)]);

        let m = c.resolve(r#"I click "Login""#, None).unwrap();

        assert_eq!(m.args, [Argument::from("Login")]);
    }

    #[test]
    fn resolves_integer() {
        let c = collection(&[("I wait {int} seconds", 0)]);

        let m = c.resolve("I wait 5 seconds", None).unwrap();

        assert_eq!(m.args, [Argument::Int(5)]);
    }

    #[test]
    fn first_registered_match_wins() {
        let c = collection(&[("I {word} it", 0), ("I do it", 0)]);

        assert_eq!(c.resolve("I do it", None).unwrap().definition.index(), 0);
    }

    #[test]
    fn lower_order_is_tried_first() {
        let c = collection(&[("I {word} it", 5), ("I do it", -1), ("I {} it", -1)]);

        assert_eq!(c.resolve("I do it", None).unwrap().definition.index(), 1);
        assert_eq!(c.resolve("I see it", None).unwrap().definition.index(), 2);
        assert_eq!(
            c.iter().map(StepDefinition::index).collect::<Vec<_>>(),
            [1, 2, 0],
        );
    }

    #[test]
    fn unmatched_text_is_not_found() {
        let c = collection(&[("I click {string}", 0)]);

        let err = c.resolve("I click Login", None).unwrap_err();

        assert_eq!(err, StepError::NotFound { text: "I click Login".into() });
    }

    #[test]
    fn resolution_is_deterministic() {
        let c = collection(&[("I have {int} {word}", 0), ("I have {}", 0)]);

        for text in ["I have 3 apples", "I have nothing", "you have 3"] {
            assert_eq!(c.resolve(text, None), c.resolve(text, None));
        }
    }

    #[test]
    fn step_attachments_are_appended() {
        let c = collection(&[("the users:", 0)]);
        let step = Step::given("the users:")
            .with_table(vec![vec!["name"], vec!["ann"]])
            .with_docstring("notes");

        let m = c.resolve_step(&step, None).unwrap();

        assert_eq!(m.args.len(), 2);
        assert!(matches!(&m.args[0], Argument::Table(t) if t.len() == 2));
        assert_eq!(m.args[1], Argument::DocString("notes".into()));
    }

    #[test]
    fn invalid_regex_fails_registration() {
        let mut c = Collection::<()>::new();

        let res = c.register(
            Pattern::regex("(unclosed"),
            StepOptions::default(),
            noop(),
            Location::caller(),
        );

        assert!(res.is_err());
        assert!(c.is_empty());
    }
}
