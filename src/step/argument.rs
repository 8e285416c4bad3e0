// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Typed step arguments.

use std::{collections::HashMap, fmt};

use derive_more::with_trait::Display;
use lazy_regex::regex;

use crate::DataTable;

/// Single argument passed to a step handler.
#[derive(Clone, Debug, Display, PartialEq)]
pub enum Argument {
    /// Whole number.
    #[display("{_0}")]
    Int(i64),

    /// Decimal number.
    #[display("{_0}")]
    Float(f64),

    /// Any other text.
    #[display("{_0}")]
    Str(String),

    /// Data table attached to the step.
    #[display("{_0}")]
    Table(DataTable),

    /// Doc string attached to the step.
    #[display("{_0}")]
    DocString(String),
}

impl Argument {
    /// Coerces a raw captured value.
    ///
    /// Surrounding quotes are stripped first, then the `resolver` (if any)
    /// substitutes variables, and only then the value is classified: an
    /// optionally signed run of digits becomes [`Argument::Int`], a decimal
    /// number becomes [`Argument::Float`], and everything else (including
    /// integers overflowing `i64`) stays [`Argument::Str`].
    #[must_use]
    pub fn coerce(raw: &str, resolver: Option<&dyn ArgumentResolver>) -> Self {
        let unquoted = strip_quotes(raw);
        let value = match resolver {
            Some(r) => r.resolve(unquoted),
            None => unquoted.to_owned(),
        };

        if regex!(r"^[+-]?\d+$").is_match(&value) {
            if let Ok(n) = value.parse() {
                return Self::Int(n);
            }
        } else if regex!(r"^[+-]?\d*\.\d+$").is_match(&value) {
            if let Ok(n) = value.parse() {
                return Self::Float(n);
            }
        }
        Self::Str(value)
    }

    /// Human-readable name of this [`Argument`]'s kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Table(_) => "table",
            Self::DocString(_) => "doc string",
        }
    }

    /// Returns this [`Argument`] as an `i64`, if it is an [`Argument::Int`].
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns this [`Argument`] as an `f64`.
    ///
    /// [`Argument::Int`]s are widened.
    #[must_use]
    #[expect(clippy::cast_precision_loss, reason = "widening is intended")]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(n) => Some(*n),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Returns the text of an [`Argument::Str`] or [`Argument::DocString`].
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) | Self::DocString(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the [`DataTable`] of an [`Argument::Table`].
    #[must_use]
    pub const fn as_table(&self) -> Option<&DataTable> {
        match self {
            Self::Table(t) => Some(t),
            _ => None,
        }
    }
}

impl From<&str> for Argument {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Argument {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Argument {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for Argument {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

/// Strips one pair of matching surrounding quotes.
fn strip_quotes(raw: &str) -> &str {
    for q in ['"', '\''] {
        if let Some(inner) =
            raw.strip_prefix(q).and_then(|s| s.strip_suffix(q))
        {
            return inner;
        }
    }
    raw
}

/// Substitution of variables in raw step arguments, applied before type
/// coercion.
pub trait ArgumentResolver {
    /// Resolves the given unquoted raw value.
    fn resolve(&self, raw: &str) -> String;
}

impl<F> ArgumentResolver for F
where
    F: Fn(&str) -> String,
{
    fn resolve(&self, raw: &str) -> String {
        self(raw)
    }
}

/// [`ArgumentResolver`] substituting `${name}` references with the values of
/// named variables.
///
/// Unknown variables are left as is.
#[derive(Clone, Debug, Default)]
pub struct Variables(HashMap<String, String>);

impl Variables {
    /// Creates a new empty set of [`Variables`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines a variable.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        _ = self.0.insert(name.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Variables {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl ArgumentResolver for Variables {
    fn resolve(&self, raw: &str) -> String {
        regex!(r"\$\{([^}\s]+)\}")
            .replace_all(raw, |caps: &regex::Captures<'_>| {
                self.0
                    .get(&caps[1])
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_owned())
            })
            .into_owned()
    }
}

impl fmt::Debug for dyn ArgumentResolver + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn ArgumentResolver")
    }
}
