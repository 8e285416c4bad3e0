// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Scenario model consumed by the runner.
//!
//! Produced by an external parser (see [`parser`] for the [`gherkin`]-based
//! one) or built by hand with the provided builder methods.
//!
//! [`parser`]: crate::parser

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::DataTable;

/// Collection of [`Scenario`]s sharing a name, tags and a [`Background`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Feature {
    /// Name of this [`Feature`].
    pub name: String,

    /// Tags of this [`Feature`], inherited by all its [`Scenario`]s.
    pub tags: Vec<String>,

    /// Steps prepended to every [`Scenario`] of this [`Feature`].
    pub background: Option<Background>,

    /// [`Scenario`]s in document order.
    pub scenarios: Vec<Scenario>,

    /// Path of the file this [`Feature`] was loaded from, if any.
    pub path: Option<PathBuf>,
}

impl Feature {
    /// Creates an empty [`Feature`] with the given `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Adds a tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Sets the [`Background`] steps.
    #[must_use]
    pub fn background(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.background = Some(Background {
            name: String::new(),
            steps: steps.into_iter().collect(),
        });
        self
    }

    /// Appends a [`Scenario`].
    #[must_use]
    pub fn scenario(mut self, scenario: Scenario) -> Self {
        self.scenarios.push(scenario);
        self
    }

    /// Counts [`Step`]s of all the [`Scenario`]s, without [`Background`] ones.
    #[must_use]
    pub fn count_steps(&self) -> usize {
        self.scenarios.iter().map(|s| s.steps.len()).sum()
    }
}

/// Shared [`Step`] sequence prepended to every [`Scenario`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Background {
    /// Optional name.
    pub name: String,

    /// [`Step`]s in document order.
    pub steps: Vec<Step>,
}

/// Scenario template: a plain scenario, or a data-driven one when it has
/// [`Examples`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Scenario {
    /// Name, possibly containing `<header>` placeholders.
    pub name: String,

    /// Own tags of this [`Scenario`].
    pub tags: Vec<String>,

    /// Steps, run after [`Feature`] and own [`Background`] ones.
    pub steps: Vec<Step>,

    /// Extra background steps scoped to this [`Scenario`] only (like a
    /// [Gherkin rule] background).
    ///
    /// [Gherkin rule]: https://cucumber.io/docs/gherkin/reference#rule
    pub background: Option<Background>,

    /// Example tables this [`Scenario`] is expanded with.
    pub examples: Vec<Examples>,
}

impl Scenario {
    /// Creates an empty [`Scenario`] with the given `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Adds a tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Appends a [`Step`].
    #[must_use]
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Appends an [`Examples`] block, turning this [`Scenario`] into a
    /// data-driven template.
    #[must_use]
    pub fn examples(mut self, examples: Examples) -> Self {
        self.examples.push(examples);
        self
    }

    /// Indicates whether this [`Scenario`] is a data-driven template.
    #[must_use]
    pub fn is_template(&self) -> bool {
        !self.examples.is_empty()
    }
}

/// Single step line.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Step {
    /// Keyword, like `Given` or `And`. Not used for matching.
    pub keyword: String,

    /// Text matched against step patterns.
    pub text: String,

    /// Attached [`DataTable`], if any.
    pub table: Option<DataTable>,

    /// Attached doc string, if any.
    pub docstring: Option<String>,
}

impl Step {
    /// Creates a new [`Step`].
    #[must_use]
    pub fn new(keyword: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    /// Creates a new `Given` [`Step`].
    #[must_use]
    pub fn given(text: impl Into<String>) -> Self {
        Self::new("Given", text)
    }

    /// Creates a new `When` [`Step`].
    #[must_use]
    pub fn when(text: impl Into<String>) -> Self {
        Self::new("When", text)
    }

    /// Creates a new `Then` [`Step`].
    #[must_use]
    pub fn then(text: impl Into<String>) -> Self {
        Self::new("Then", text)
    }

    /// Attaches a [`DataTable`].
    #[must_use]
    pub fn with_table(mut self, table: impl Into<DataTable>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Attaches a doc string.
    #[must_use]
    pub fn with_docstring(mut self, docstring: impl Into<String>) -> Self {
        self.docstring = Some(docstring.into());
        self
    }
}

/// Tabular example data of a data-driven [`Scenario`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Examples {
    /// Column names, referenced as `<name>` placeholders.
    pub headers: Vec<String>,

    /// Value rows, positionally matching the `headers`.
    pub rows: Vec<Vec<String>>,

    /// Tags added to every instance expanded from this block.
    pub tags: Vec<String>,

    /// Name of an external data source to load headers and rows from instead
    /// of the inline ones.
    pub external: Option<String>,
}

impl Examples {
    /// Creates inline [`Examples`].
    #[must_use]
    pub fn new<H, R, C>(headers: H, rows: R) -> Self
    where
        H: IntoIterator,
        H::Item: Into<String>,
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: rows
                .into_iter()
                .map(|r| r.into_iter().map(Into::into).collect())
                .collect(),
            ..Self::default()
        }
    }

    /// Creates [`Examples`] loaded from the named external source.
    #[must_use]
    pub fn external(name: impl Into<String>) -> Self {
        Self { external: Some(name.into()), ..Self::default() }
    }

    /// Adds a tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_feature() {
        let feature = Feature::new("Login")
            .tag("@auth")
            .background([Step::given("I am on the login page")])
            .scenario(
                Scenario::new("valid")
                    .step(Step::when("I log in"))
                    .step(Step::then("I see the dashboard")),
            );

        assert_eq!(feature.tags, ["@auth"]);
        assert_eq!(feature.background.as_ref().unwrap().steps.len(), 1);
        assert_eq!(feature.count_steps(), 2);
        assert!(!feature.scenarios[0].is_template());
    }

    #[test]
    fn deserializes_from_json() {
        let feature: Feature = serde_json::from_str(
            r#"{
                "name": "Search",
                "scenarios": [{
                    "name": "by <term>",
                    "steps": [{"keyword": "When", "text": "I search <term>"}],
                    "examples": [{"headers": ["term"], "rows": [["rust"]]}]
                }]
            }"#,
        )
        .unwrap();

        let scenario = &feature.scenarios[0];
        assert!(scenario.is_template());
        assert_eq!(scenario.examples[0], Examples::new(["term"], [["rust"]]));
    }
}
