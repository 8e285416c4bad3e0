// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Step definitions: patterns, their compiled matchers, typed arguments and
//! the [`Collection`] resolving step text against them.

pub mod argument;
pub mod collection;
pub mod context;
pub mod expression;
pub mod location;

#[doc(inline)]
pub use self::{
    argument::{Argument, ArgumentResolver, Variables},
    collection::{
        Collection, Fallback, Match, StepDefinition, StepFn, StepOptions,
    },
    context::Context,
    expression::{CompiledMatcher, Pattern, Placeholder},
    location::Location,
};
