// Copyright (c) 2018-2023  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Tag normalization, tag-set intersection and [`TagOperation`] evaluation.

use gherkin::tagexpr::TagOperation;
use sealed::sealed;

use crate::error::FilterError;

/// Strips surrounding whitespace and a leading `@` from the given `tag`, so
/// `@smoke` and `smoke` compare equal.
#[must_use]
pub fn normalize(tag: &str) -> &str {
    let tag = tag.trim();
    tag.strip_prefix('@').unwrap_or(tag)
}

/// Checks whether the `filter` tags share at least one tag with the `active`
/// ones.
#[must_use]
pub fn intersects<A, B>(filter: &[A], active: &[B]) -> bool
where
    A: AsRef<str>,
    B: AsRef<str>,
{
    filter.iter().any(|f| {
        let f = normalize(f.as_ref());
        active.iter().any(|a| normalize(a.as_ref()) == f)
    })
}

/// Parses a tag expression like `@smoke and not @slow`.
///
/// # Errors
///
/// If the `expression` is not a valid tag expression.
pub fn parse_expression(expression: &str) -> Result<TagOperation, FilterError> {
    expression.parse().map_err(|e| FilterError {
        expression: expression.to_owned(),
        reason: format!("{e}"),
    })
}

/// Extension of a [`TagOperation`] allowing to evaluate it.
#[sealed]
pub trait Ext {
    /// Evaluates this [`TagOperation`] for the given `tags`.
    #[must_use]
    fn eval<I, S>(&self, tags: I) -> bool
    where
        S: AsRef<str>,
        I: IntoIterator<Item = S> + Clone;
}

#[sealed]
impl Ext for TagOperation {
    fn eval<I, S>(&self, tags: I) -> bool
    where
        S: AsRef<str>,
        I: IntoIterator<Item = S> + Clone,
    {
        match self {
            Self::And(l, r) => l.eval(tags.clone()) & r.eval(tags),
            Self::Or(l, r) => l.eval(tags.clone()) | r.eval(tags),
            Self::Not(t) => !t.eval(tags),
            Self::Tag(t) => tags
                .into_iter()
                .any(|tag| normalize(tag.as_ref()) == normalize(t)),
        }
    }
}
