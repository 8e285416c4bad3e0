// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Step pattern compilation.
//!
//! A pattern is either an explicit regular expression, or an expression of
//! literal text with typed `{placeholder}`s. Expressions are compiled once
//! into an anchored [`Regex`], remembering which capture groups belong to
//! which [`Placeholder`].

use std::fmt;

use derive_more::with_trait::Display;
use regex::Regex;

use crate::error::PatternError;

/// Step pattern as it was registered.
#[derive(Clone, Debug, Display, Eq, Hash, PartialEq)]
pub enum Pattern {
    /// Literal text with typed placeholders, like `I wait {int} seconds`.
    #[display("{_0}")]
    Expression(String),

    /// Raw regular expression, used as is.
    #[display("/{_0}/")]
    Regex(String),
}

impl Pattern {
    /// Creates a new [`Pattern::Expression`].
    #[must_use]
    pub fn expression(expr: impl Into<String>) -> Self {
        Self::Expression(expr.into())
    }

    /// Creates a new [`Pattern::Regex`].
    #[must_use]
    pub fn regex(re: impl Into<String>) -> Self {
        Self::Regex(re.into())
    }

    /// Returns the source text of this [`Pattern`].
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Expression(s) | Self::Regex(s) => s,
        }
    }
}

impl From<&str> for Pattern {
    fn from(expr: &str) -> Self {
        Self::expression(expr)
    }
}

impl From<String> for Pattern {
    fn from(expr: String) -> Self {
        Self::Expression(expr)
    }
}

impl From<Regex> for Pattern {
    fn from(re: Regex) -> Self {
        Self::Regex(re.as_str().to_owned())
    }
}

/// Typed placeholder of a [`Pattern::Expression`].
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum Placeholder {
    /// `{string}`: a double- or single-quoted string, quotes excluded.
    #[display("{{string}}")]
    String,

    /// `{int}`: a run of digits.
    #[display("{{int}}")]
    Int,

    /// `{float}`: a signed decimal number.
    #[display("{{float}}")]
    Float,

    /// `{word}`: a run of word characters.
    #[display("{{word}}")]
    Word,

    /// Any other `{...}`: anything, matched lazily.
    #[display("{{}}")]
    Any,
}

impl Placeholder {
    /// Recognizes a placeholder by the name between its braces.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "string" => Self::String,
            "int" => Self::Int,
            "float" => Self::Float,
            "word" => Self::Word,
            _ => Self::Any,
        }
    }

    /// Regular expression this [`Placeholder`] compiles into.
    #[must_use]
    pub const fn regex(self) -> &'static str {
        match self {
            Self::String => r#"(?:"([^"]*)"|'([^']*)')"#,
            Self::Int => r"(\d+)",
            Self::Float => r"([+-]?\d*\.?\d+)",
            Self::Word => r"(\w+)",
            Self::Any => r"(.*?)",
        }
    }

    /// Number of capture groups in the [`Placeholder::regex()`].
    #[must_use]
    pub const fn groups(self) -> usize {
        match self {
            Self::String => 2,
            Self::Int | Self::Float | Self::Word | Self::Any => 1,
        }
    }
}

/// Compiled form of a [`Pattern`], built once at registration.
///
/// Compiling the same [`Pattern`] twice yields matchers behaving identically.
#[derive(Clone, Debug)]
pub struct CompiledMatcher {
    /// [`Pattern`] this matcher was compiled from.
    pattern: Pattern,

    /// Compiled [`Regex`].
    regex: Regex,

    /// [`Placeholder`]s in capture order, or [`None`] for raw
    /// [`Pattern::Regex`]es.
    placeholders: Option<Vec<Placeholder>>,
}

impl CompiledMatcher {
    /// Compiles the given [`Pattern`].
    ///
    /// # Errors
    ///
    /// If the resulting regular expression is invalid, which for
    /// [`Pattern::Expression`]s can only happen on pathological input.
    pub fn compile(pattern: Pattern) -> Result<Self, PatternError> {
        let (source, placeholders) = match &pattern {
            Pattern::Expression(expr) => {
                let (re, ph) = expression_to_regex(expr);
                (re, Some(ph))
            }
            Pattern::Regex(re) => (re.clone(), None),
        };
        let regex = Regex::new(&source).map_err(|source| PatternError {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self { pattern, regex, placeholders })
    }

    /// Returns the [`Pattern`] this matcher was compiled from.
    #[must_use]
    pub const fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Returns the compiled [`Regex`].
    #[must_use]
    pub const fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Returns the [`Placeholder`]s in capture order, if compiled from a
    /// [`Pattern::Expression`].
    #[must_use]
    pub fn placeholders(&self) -> Option<&[Placeholder]> {
        self.placeholders.as_deref()
    }

    /// Matches the given `text`, returning raw captured values in order.
    ///
    /// Capture groups that didn't participate in the match (like the unused
    /// quote style of a [`Placeholder::String`]) are skipped.
    #[must_use]
    pub fn captures(&self, text: &str) -> Option<Vec<String>> {
        let caps = self.regex.captures(text)?;
        let Some(placeholders) = &self.placeholders else {
            return Some(
                caps.iter()
                    .skip(1)
                    .flatten()
                    .map(|m| m.as_str().to_owned())
                    .collect(),
            );
        };

        let mut group = 1;
        let values = placeholders
            .iter()
            .map(|ph| {
                let value = (group..group + ph.groups())
                    .find_map(|i| caps.get(i))
                    .map_or_else(String::new, |m| m.as_str().to_owned());
                group += ph.groups();
                value
            })
            .collect();
        Some(values)
    }
}

impl Display for CompiledMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pattern)
    }
}

/// Translates an expression into an anchored regular expression.
///
/// Literal text is escaped first, so regex metacharacters in it match
/// themselves. A `{` without a closing `}` is literal text as well.
fn expression_to_regex(expr: &str) -> (String, Vec<Placeholder>) {
    let mut out = String::with_capacity(expr.len() * 2 + 2);
    let mut placeholders = Vec::new();
    out.push('^');

    let mut rest = expr;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let Some(close) = after.find(['{', '}']).filter(|&i| after[i..].starts_with('}'))
        else {
            out.push_str(&regex::escape(&rest[..=open]));
            rest = after;
            continue;
        };

        out.push_str(&regex::escape(&rest[..open]));
        let ph = Placeholder::from_name(after[..close].trim());
        out.push_str(ph.regex());
        placeholders.push(ph);
        rest = &after[close + 1..];
    }
    out.push_str(&regex::escape(rest));
    out.push('$');

    (out, placeholders)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(expr: &str) -> CompiledMatcher {
        CompiledMatcher::compile(Pattern::expression(expr)).unwrap()
    }

    #[test]
    fn escapes_literals_and_anchors() {
        let m = compile("a (b) costs $5.00?");

        assert_eq!(m.regex().as_str(), r"^a \(b\) costs \$5\.00\?$");
        assert!(m.captures("a (b) costs $5.00?").is_some());
        assert!(m.captures("xa (b) costs $5.00?").is_none());
        assert!(m.captures("a (b) costs $5.00? now").is_none());
    }

    #[test]
    fn string_accepts_both_quote_styles() {
        let m = compile("I click {string}");

        assert_eq!(m.captures(r#"I click "Login""#), Some(vec!["Login".into()]));
        assert_eq!(m.captures("I click 'Log out'"), Some(vec!["Log out".into()]));
        assert_eq!(m.captures("I click Login"), None);
    }

    #[test]
    fn maps_placeholders_to_groups() {
        let m = compile("{string} has {int} items at {float} in {word} via {x}");

        assert_eq!(
            m.placeholders().unwrap(),
            [
                Placeholder::String,
                Placeholder::Int,
                Placeholder::Float,
                Placeholder::Word,
                Placeholder::Any,
            ],
        );
        assert_eq!(
            m.captures(r"'cart' has 3 items at -1.5 in EUR via the web").unwrap(),
            ["cart", "3", "-1.5", "EUR", "the web"],
        );
    }

    #[test]
    fn int_rejects_decimals() {
        let m = compile("I wait {int} seconds");

        assert_eq!(m.captures("I wait 5 seconds").unwrap(), ["5"]);
        assert!(m.captures("I wait 5.5 seconds").is_none());
    }

    #[test]
    fn unclosed_brace_is_literal() {
        let m = compile("a { b {int}");

        assert_eq!(m.captures("a { b 7").unwrap(), ["7"]);
    }

    #[test]
    fn raw_regex_skips_unmatched_groups() {
        let m = CompiledMatcher::compile(Pattern::regex(
            r"^I (?:press (\w+)|tap (\w+))$",
        ))
        .unwrap();

        assert_eq!(m.placeholders(), None);
        assert_eq!(m.captures("I tap ok").unwrap(), ["ok"]);
    }

    #[test]
    fn invalid_regex_is_reported() {
        let err = CompiledMatcher::compile(Pattern::regex("I (")).unwrap_err();
        assert_eq!(err.pattern, "/I (/");
    }

    #[test]
    fn compiles_deterministically() {
        let a = compile("I wait {int} seconds");
        let b = compile("I wait {int} seconds");

        assert_eq!(a.regex().as_str(), b.regex().as_str());
        assert_eq!(a.placeholders(), b.placeholders());
    }

    #[test]
    fn displays_registered_pattern() {
        assert_eq!(compile("I wait {int} seconds").to_string(), "I wait {int} seconds");

        let raw = CompiledMatcher::compile(Pattern::regex(r"^I see (\d+)$")).unwrap();
        assert_eq!(raw.to_string(), r"/^I see (\d+)$/");
    }
}
