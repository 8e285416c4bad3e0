// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Expansion of data-driven scenario templates into concrete instances.

use std::{
    collections::HashMap,
    fmt, fs,
    path::{Path, PathBuf},
};

use derive_more::with_trait::Display;
use lazy_regex::regex;
use serde::Deserialize;

use crate::{
    error::ExamplesError,
    model::{Examples, Feature, Scenario, Step},
    result::ScenarioKey,
};

/// Concrete, fully interpolated execution unit.
#[derive(Clone, Debug, PartialEq)]
pub struct ScenarioInstance {
    /// Name of the feature.
    pub feature: String,

    /// Name of the template this instance was expanded from.
    pub template: String,

    /// Display name: the interpolated template name, suffixed with the
    /// example iteration when there are several.
    pub name: String,

    /// 1-based example iteration, when expanded from several rows.
    pub iteration: Option<usize>,

    /// Feature, scenario and example tags, in this order.
    pub tags: Vec<String>,

    /// Background steps: the feature ones followed by the scenario ones.
    pub background: Vec<Step>,

    /// Interpolated scenario steps.
    pub steps: Vec<Step>,
}

impl ScenarioInstance {
    /// Creates the single instance of a [`Scenario`] without substituting
    /// anything.
    #[must_use]
    pub fn plain(feature: &Feature, scenario: &Scenario) -> Self {
        Self {
            feature: feature.name.clone(),
            template: scenario.name.clone(),
            name: scenario.name.clone(),
            iteration: None,
            tags: feature.tags.iter().chain(&scenario.tags).cloned().collect(),
            background: feature
                .background
                .iter()
                .chain(&scenario.background)
                .flat_map(|bg| bg.steps.iter().cloned())
                .collect(),
            steps: scenario.steps.clone(),
        }
    }

    /// Returns the [`ScenarioKey`] of this instance.
    #[must_use]
    pub fn key(&self) -> ScenarioKey {
        ScenarioKey::new(&*self.feature, &*self.name)
    }

    /// Iterates over background steps followed by scenario steps, flagging
    /// the background ones.
    pub fn all_steps(&self) -> impl Iterator<Item = (&Step, bool)> {
        self.background
            .iter()
            .map(|s| (s, true))
            .chain(self.steps.iter().map(|s| (s, false)))
    }

    /// Total number of steps, background ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.background.len() + self.steps.len()
    }

    /// Indicates whether this instance has no steps at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Non-fatal problem noticed during expansion.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum ExpansionWarning {
    /// Template has examples without any row, so it produces no instances.
    #[display("Scenario `{scenario}` has no example rows")]
    NoRows {
        /// Name of the template.
        scenario: String,
    },

    /// Cell holds its own column name, which is replaced with an empty
    /// string.
    #[display(
        "Scenario `{scenario}` example {iteration}: value of `{header}` equals \
         its header, using empty string"
    )]
    HeaderAsValue {
        /// Name of the template.
        scenario: String,

        /// 1-based iteration of the row.
        iteration: usize,

        /// Column name.
        header: String,
    },
}

/// Outcome of expanding a single template.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Expansion {
    /// Concrete instances in row order.
    pub instances: Vec<ScenarioInstance>,

    /// Headers actually referenced by the template, in header order. Used for
    /// reporting only.
    pub used_columns: Vec<String>,

    /// Non-fatal problems, already logged.
    pub warnings: Vec<ExpansionWarning>,
}

/// Provider of externally stored example data.
pub trait ExamplesSource {
    /// Loads headers and rows of the named example set.
    ///
    /// # Errors
    ///
    /// If the set is unknown or cannot be loaded.
    fn load(&self, name: &str) -> Result<Examples, ExamplesError>;
}

impl fmt::Debug for dyn ExamplesSource + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn ExamplesSource")
    }
}

/// [`ExamplesSource`] of named in-memory tables.
#[derive(Clone, Debug, Default)]
pub struct InMemorySource(HashMap<String, Examples>);

impl InMemorySource {
    /// Creates a new empty [`InMemorySource`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a named example set.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, examples: Examples) -> Self {
        _ = self.0.insert(name.into(), examples);
        self
    }
}

impl ExamplesSource for InMemorySource {
    fn load(&self, name: &str) -> Result<Examples, ExamplesError> {
        self.0
            .get(name)
            .cloned()
            .ok_or_else(|| ExamplesError::Unknown { name: name.to_owned() })
    }
}

/// [`ExamplesSource`] reading JSON files from a directory.
///
/// A name resolves to a path relative to the directory, `.json` appended if
/// it has no extension. A file holds either a `{"headers": [...], "rows":
/// [[...]]}` object, or an array of objects, whose keys of the first object
/// become headers in sorted order.
#[derive(Clone, Debug)]
pub struct JsonFileSource {
    /// Directory names are resolved against.
    root: PathBuf,
}

/// Accepted shapes of a JSON examples file.
#[derive(Deserialize)]
#[serde(untagged)]
enum JsonExamples {
    /// Explicit headers and positional rows.
    Table {
        headers: Vec<String>,
        rows: Vec<Vec<serde_json::Value>>,
    },

    /// One object per row.
    Records(Vec<serde_json::Map<String, serde_json::Value>>),
}

impl JsonFileSource {
    /// Creates a new [`JsonFileSource`] resolving names against `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the path the given `name` resolves to.
    #[must_use]
    pub fn path_of(&self, name: &str) -> PathBuf {
        let path = self.root.join(name);
        if path.extension().is_some() {
            path
        } else {
            path.with_extension("json")
        }
    }

    fn parse(name: &str, path: &Path) -> Result<Examples, ExamplesError> {
        let raw = fs::read_to_string(path).map_err(|source| ExamplesError::Io {
            path: path.to_owned(),
            source,
        })?;
        let parsed = serde_json::from_str(&raw).map_err(|source| {
            ExamplesError::Json { path: path.to_owned(), source }
        })?;

        let shape = |reason: String| ExamplesError::Shape {
            name: name.to_owned(),
            reason,
        };
        match parsed {
            JsonExamples::Table { headers, rows } => Ok(Examples::new(
                headers,
                rows.into_iter()
                    .map(|r| r.iter().map(json_cell).collect::<Vec<_>>()),
            )),
            JsonExamples::Records(records) => {
                let Some(first) = records.first() else {
                    return Ok(Examples::default());
                };
                let headers = first.keys().cloned().collect::<Vec<_>>();
                let rows = records
                    .iter()
                    .enumerate()
                    .map(|(i, rec)| {
                        headers
                            .iter()
                            .map(|h| {
                                rec.get(h).map(json_cell).ok_or_else(|| {
                                    shape(format!("record {} lacks `{h}`", i + 1))
                                })
                            })
                            .collect::<Result<Vec<_>, _>>()
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Examples::new(headers, rows))
            }
        }
    }
}

impl ExamplesSource for JsonFileSource {
    fn load(&self, name: &str) -> Result<Examples, ExamplesError> {
        Self::parse(name, &self.path_of(name))
    }
}

/// Renders a JSON value as a table cell.
fn json_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        v => v.to_string(),
    }
}

/// Expander of data-driven scenario templates.
#[derive(Clone, Copy, Debug, Default)]
pub struct Expander<'s> {
    /// Source of [`Examples::external`] data.
    source: Option<&'s dyn ExamplesSource>,
}

impl<'s> Expander<'s> {
    /// Creates a new [`Expander`] supporting inline examples only.
    #[must_use]
    pub const fn new() -> Self {
        Self { source: None }
    }

    /// Creates a new [`Expander`] loading external examples from the given
    /// `source`.
    #[must_use]
    pub const fn with_source(source: &'s dyn ExamplesSource) -> Self {
        Self { source: Some(source) }
    }

    /// Expands the `scenario` of the `feature` into concrete instances.
    ///
    /// A plain scenario yields a single instance as is. A template yields an
    /// instance per example row across all its [`Examples`] blocks, with
    /// `<header>` placeholders in its name, steps, step tables and doc strings
    /// substituted. Unknown placeholders are kept verbatim. Backgrounds are
    /// never interpolated.
    ///
    /// # Errors
    ///
    /// If external examples cannot be loaded, or a row doesn't match its
    /// headers.
    pub fn expand(
        &self,
        feature: &Feature,
        scenario: &Scenario,
    ) -> Result<Expansion, ExamplesError> {
        let base = ScenarioInstance::plain(feature, scenario);
        if !scenario.is_template() {
            return Ok(Expansion { instances: vec![base], ..Expansion::default() });
        }

        let blocks = scenario
            .examples
            .iter()
            .map(|ex| self.resolve(&scenario.name, ex))
            .collect::<Result<Vec<_>, _>>()?;

        let mut expansion = Expansion::default();
        let total = blocks.iter().map(|b| b.rows.len()).sum::<usize>();
        if total == 0 {
            let warning = ExpansionWarning::NoRows { scenario: scenario.name.clone() };
            tracing::warn!("{warning}");
            expansion.warnings.push(warning);
            return Ok(expansion);
        }

        let mut used = Vec::new();
        let mut iteration = 0;
        for (block, origin) in blocks.iter().zip(&scenario.examples) {
            for row in &block.rows {
                iteration += 1;
                let values = block
                    .headers
                    .iter()
                    .zip(row)
                    .map(|(header, cell)| {
                        if !equals_header(cell, header) {
                            return (header.as_str(), cell.as_str());
                        }
                        let warning = ExpansionWarning::HeaderAsValue {
                            scenario: scenario.name.clone(),
                            iteration,
                            header: header.clone(),
                        };
                        tracing::warn!("{warning}");
                        expansion.warnings.push(warning);
                        (header.as_str(), "")
                    })
                    .collect::<HashMap<_, _>>();

                let mut sub = |s: &str| interpolate(s, &values, &mut used);
                let name = sub(&scenario.name);
                let steps = scenario
                    .steps
                    .iter()
                    .map(|step| Step {
                        keyword: step.keyword.clone(),
                        text: sub(&step.text),
                        table: step.table.clone().map(|t| t.map_cells(&mut sub)),
                        docstring: step.docstring.as_deref().map(&mut sub),
                    })
                    .collect();

                let (name, iteration) = if total > 1 {
                    (format!("{name} (example {iteration})"), Some(iteration))
                } else {
                    (name, None)
                };
                expansion.instances.push(ScenarioInstance {
                    name,
                    iteration,
                    tags: base.tags.iter().chain(&origin.tags).cloned().collect(),
                    steps,
                    ..base.clone()
                });
            }
        }

        expansion.used_columns = blocks
            .iter()
            .flat_map(|b| &b.headers)
            .filter(|h| used.contains(h))
            .fold(Vec::new(), |mut acc, h| {
                if !acc.contains(h) {
                    acc.push(h.clone());
                }
                acc
            });
        Ok(expansion)
    }

    /// Obtains headers and rows of an [`Examples`] block, loading external
    /// ones.
    fn resolve(
        &self,
        scenario: &str,
        examples: &Examples,
    ) -> Result<Examples, ExamplesError> {
        let data = match &examples.external {
            None => examples.clone(),
            Some(name) => self
                .source
                .ok_or_else(|| ExamplesError::NoSource { name: name.clone() })?
                .load(name)?,
        };

        if let Some((i, row)) = data
            .rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != data.headers.len())
        {
            return Err(ExamplesError::Shape {
                name: examples.external.clone().unwrap_or_else(|| scenario.to_owned()),
                reason: format!(
                    "row {} has {} cells, but there are {} headers",
                    i + 1,
                    row.len(),
                    data.headers.len(),
                ),
            });
        }
        Ok(data)
    }
}

/// Checks whether a `cell` holds its own `header` name.
fn equals_header(cell: &str, header: &str) -> bool {
    let cell = cell.trim();
    !cell.is_empty() && cell.to_lowercase() == header.trim().to_lowercase()
}

/// Substitutes `<header>` placeholders in `s`, remembering the substituted
/// headers in `used`.
fn interpolate(
    s: &str,
    values: &HashMap<&str, &str>,
    used: &mut Vec<String>,
) -> String {
    regex!(r"<([^>\s]+)>")
        .replace_all(s, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            values.get(name).map_or_else(
                || caps[0].to_owned(),
                |v| {
                    if !used.iter().any(|u| u == name) {
                        used.push(name.to_owned());
                    }
                    (*v).to_owned()
                },
            )
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;
    use crate::DataTable;

    fn feature() -> Feature {
        Feature::new("Search")
            .tag("@web")
            .background([Step::given("I open <site>")])
    }

    fn template() -> Scenario {
        Scenario::new("search <term>")
            .tag("@smoke")
            .step(Step::when("I search for <term>"))
            .step(Step::then("I see <count> results in <unknown>"))
    }

    #[test]
    fn plain_scenario_is_single_instance() {
        let scenario = Scenario::new("plain").step(Step::when("I do <x>"));

        let exp = Expander::new().expand(&feature(), &scenario).unwrap();

        assert_eq!(exp.instances.len(), 1);
        let inst = &exp.instances[0];
        assert_eq!(inst.name, "plain");
        assert_eq!(inst.iteration, None);
        assert_eq!(inst.steps[0].text, "I do <x>");
        assert_eq!(inst.tags, ["@web"]);
        assert!(exp.warnings.is_empty());
    }

    #[test]
    fn three_rows_make_three_suffixed_instances() {
        let scenario = template().examples(Examples::new(
            ["term", "count"],
            [["rust", "3"], ["go", "2"], ["zig", "1"]],
        ));

        let exp = Expander::new().expand(&feature(), &scenario).unwrap();

        let names = exp.instances.iter().map(|i| i.name.as_str()).collect::<Vec<_>>();
        assert_eq!(
            names,
            [
                "search rust (example 1)",
                "search go (example 2)",
                "search zig (example 3)",
            ],
        );
        let second = &exp.instances[1];
        assert_eq!(second.iteration, Some(2));
        assert_eq!(second.template, "search <term>");
        assert_eq!(second.steps[0].text, "I search for go");
        assert_eq!(second.steps[1].text, "I see 2 results in <unknown>");
        assert_eq!(second.background[0].text, "I open <site>");
        assert_eq!(exp.used_columns, ["term", "count"]);
    }

    #[test]
    fn single_row_has_no_suffix() {
        let scenario = template().examples(Examples::new(["term"], [["rust"]]));

        let exp = Expander::new().expand(&feature(), &scenario).unwrap();

        assert_eq!(exp.instances[0].name, "search rust");
        assert_eq!(exp.instances[0].iteration, None);
        assert_eq!(exp.used_columns, ["term"]);
    }

    #[test]
    fn iterations_continue_across_blocks() {
        let scenario = template()
            .examples(Examples::new(["term"], [["a"]]).tag("@first"))
            .examples(Examples::new(["term"], [["b"]]).tag("@second"));

        let exp = Expander::new().expand(&feature(), &scenario).unwrap();

        assert_eq!(exp.instances[1].name, "search b (example 2)");
        assert_eq!(exp.instances[1].tags, ["@web", "@smoke", "@second"]);
    }

    #[test]
    fn header_valued_cell_becomes_empty() {
        let scenario = template()
            .examples(Examples::new(["term", "count"], [[" Term ", "1"]]));

        let exp = Expander::new().expand(&feature(), &scenario).unwrap();

        assert_eq!(exp.instances[0].steps[0].text, "I search for ");
        assert_eq!(
            exp.warnings,
            [ExpansionWarning::HeaderAsValue {
                scenario: "search <term>".into(),
                iteration: 1,
                header: "term".into(),
            }],
        );
    }

    #[test]
    fn zero_rows_yield_no_instances_and_warning() {
        let scenario = template().examples(Examples::new(["term"], Vec::<[&str; 1]>::new()));

        let exp = Expander::new().expand(&feature(), &scenario).unwrap();

        assert!(exp.instances.is_empty());
        assert_eq!(
            exp.warnings,
            [ExpansionWarning::NoRows { scenario: "search <term>".into() }],
        );
    }

    #[test]
    fn interpolates_tables_and_docstrings() {
        let scenario = Scenario::new("users")
            .step(
                Step::given("users:")
                    .with_table(vec![vec!["name"], vec!["<user>"]])
                    .with_docstring("hello <user>"),
            )
            .examples(Examples::new(["user"], [["ann"]]));

        let exp = Expander::new().expand(&Feature::new("F"), &scenario).unwrap();

        let step = &exp.instances[0].steps[0];
        assert_eq!(step.table, Some(DataTable::from(vec![vec!["name"], vec!["ann"]])));
        assert_eq!(step.docstring.as_deref(), Some("hello ann"));
    }

    #[test]
    fn mismatched_row_is_shape_error() {
        let scenario = template().examples(Examples::new(["term", "count"], [["a"]]));

        let err = Expander::new().expand(&feature(), &scenario).unwrap_err();

        assert!(matches!(err, ExamplesError::Shape { .. }), "{err}");
    }

    #[test]
    fn external_examples_need_source() {
        let scenario = template().examples(Examples::external("terms"));

        let err = Expander::new().expand(&feature(), &scenario).unwrap_err();
        assert!(matches!(err, ExamplesError::NoSource { name } if name == "terms"));

        let source = InMemorySource::new()
            .with("terms", Examples::new(["term"], [["x"], ["y"]]));
        let exp = Expander::with_source(&source).expand(&feature(), &scenario).unwrap();
        assert_eq!(exp.instances.len(), 2);

        let other = template().examples(Examples::external("nope"));
        let err = Expander::with_source(&source).expand(&feature(), &other).unwrap_err();
        assert!(matches!(err, ExamplesError::Unknown { .. }));
    }

    #[test]
    fn json_source_reads_both_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = fs::File::create(dir.path().join("table.json")).unwrap();
        write!(table, r#"{{"headers": ["term", "count"], "rows": [["rust", 3]]}}"#)
            .unwrap();
        fs::write(
            dir.path().join("records.json"),
            r#"[{"count": 1, "term": "go"}, {"count": null, "term": "zig"}]"#,
        )
        .unwrap();
        fs::write(dir.path().join("broken.json"), r#"[{"term": "a"}, {}]"#).unwrap();
        let source = JsonFileSource::new(dir.path());

        let table = source.load("table").unwrap();
        assert_eq!(table, Examples::new(["term", "count"], [["rust", "3"]]));

        let records = source.load("records.json").unwrap();
        assert_eq!(
            records,
            Examples::new(["count", "term"], [["1", "go"], ["", "zig"]]),
        );

        assert!(matches!(source.load("broken"), Err(ExamplesError::Shape { .. })));
        assert!(matches!(source.load("missing"), Err(ExamplesError::Io { .. })));
    }
}
