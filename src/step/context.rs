// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Invocation context handed to step handlers.

use crate::{error::ArgumentError, DataTable};

use super::Argument;

/// Context of a single step handler invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct Context {
    /// Keyword of the step (`Given`, `When`, ...), trimmed.
    pub keyword: String,

    /// Text of the step, as matched.
    pub text: String,

    /// Coerced arguments: captured values in pattern order, followed by the
    /// step's [`DataTable`] and doc string, if any.
    pub args: Vec<Argument>,

    /// Number of the current scenario attempt, starting from 1.
    pub attempt: usize,
}

impl Context {
    /// Returns the [`Argument`] at the given position.
    ///
    /// # Errors
    ///
    /// If there is no such [`Argument`].
    pub fn arg(&self, index: usize) -> Result<&Argument, ArgumentError> {
        self.args.get(index).ok_or(ArgumentError::Missing { index })
    }

    /// Returns the [`Argument::Int`] at the given position.
    ///
    /// # Errors
    ///
    /// If there is no such [`Argument`], or it's not an integer.
    pub fn int(&self, index: usize) -> Result<i64, ArgumentError> {
        let arg = self.arg(index)?;
        arg.as_int().ok_or_else(|| mismatch(index, "int", arg))
    }

    /// Returns the numeric [`Argument`] at the given position as `f64`.
    ///
    /// # Errors
    ///
    /// If there is no such [`Argument`], or it's not a number.
    pub fn float(&self, index: usize) -> Result<f64, ArgumentError> {
        let arg = self.arg(index)?;
        arg.as_float().ok_or_else(|| mismatch(index, "float", arg))
    }

    /// Returns the textual [`Argument`] at the given position.
    ///
    /// Numbers are not rendered back into text: a step expecting free text
    /// where a number may appear should use a `{string}` placeholder.
    ///
    /// # Errors
    ///
    /// If there is no such [`Argument`], or it's not textual.
    pub fn str(&self, index: usize) -> Result<&str, ArgumentError> {
        let arg = self.arg(index)?;
        arg.as_str().ok_or_else(|| mismatch(index, "string", arg))
    }

    /// Returns the [`DataTable`] attached to the step, if any.
    #[must_use]
    pub fn table(&self) -> Option<&DataTable> {
        self.args.iter().find_map(Argument::as_table)
    }

    /// Returns the doc string attached to the step, if any.
    #[must_use]
    pub fn docstring(&self) -> Option<&str> {
        self.args.iter().find_map(|a| match a {
            Argument::DocString(s) => Some(s.as_str()),
            _ => None,
        })
    }
}

fn mismatch(index: usize, expected: &'static str, arg: &Argument) -> ArgumentError {
    ArgumentError::Mismatch { index, expected, found: arg.kind() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(args: Vec<Argument>) -> Context {
        Context {
            keyword: "When".into(),
            text: "irrelevant".into(),
            args,
            attempt: 1,
        }
    }

    #[test]
    fn typed_accessors() {
        let ctx = context(vec![Argument::Int(5), "Login".into(), Argument::Float(0.5)]);

        assert_eq!(ctx.int(0), Ok(5));
        assert_eq!(ctx.float(0), Ok(5.0));
        assert_eq!(ctx.str(1), Ok("Login"));
        assert_eq!(ctx.float(2), Ok(0.5));
    }

    #[test]
    fn reports_missing_and_mismatched() {
        let ctx = context(vec!["Login".into()]);

        assert_eq!(ctx.int(3), Err(ArgumentError::Missing { index: 3 }));
        assert_eq!(
            ctx.int(0),
            Err(ArgumentError::Mismatch {
                index: 0,
                expected: "int",
                found: "string",
            }),
        );
    }

    #[test]
    fn finds_trailing_table_and_docstring() {
        let table = DataTable::from(vec![vec!["a"], vec!["1"]]);
        let ctx = context(vec![
            Argument::Int(1),
            Argument::Table(table.clone()),
            Argument::DocString("body".into()),
        ]);

        assert_eq!(ctx.table(), Some(&table));
        assert_eq!(ctx.docstring(), Some("body"));
        assert_eq!(context(vec![]).table(), None);
    }
}
