// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Loading of [Gherkin] `.feature` files into the scenario [`model`].
//!
//! As there is no async runtime-agnostic way to interact with io, loading is
//! blocking.
//!
//! [`model`]: crate::model
//! [Gherkin]: https://cucumber.io/docs/gherkin/reference

use std::{
    mem,
    path::{Path, PathBuf},
};

use itertools::Itertools as _;

use crate::{
    error::LoadError,
    model::{Background, Examples, Feature, Scenario, Step},
    DataTable,
};

/// Loads features from a `.feature` file, from every `.feature` file under a
/// directory (case-insensitively), or from files matching a glob pattern.
///
/// Features are returned ordered by path.
///
/// # Errors
///
/// If the path is neither an existing file or directory nor a valid glob,
/// or any of the files cannot be parsed.
pub fn load(path: impl AsRef<Path>) -> Result<Vec<Feature>, LoadError> {
    let path = path.as_ref();

    let files = if path.exists() {
        let path = path.canonicalize().map_err(|source| LoadError::Path {
            path: path.to_owned(),
            source,
        })?;
        if path.is_file() {
            vec![path]
        } else {
            globwalk::GlobWalkerBuilder::new(&path, "*.feature")
                .case_insensitive(true)
                .build()
                .map_err(LoadError::Glob)?
                .filter_map(Result::ok)
                .map(|entry| entry.into_path())
                .collect()
        }
    } else {
        let pattern = path.to_string_lossy();
        globwalk::glob(&*pattern)
            .map_err(LoadError::Glob)?
            .filter_map(Result::ok)
            .map(|entry| entry.into_path())
            .collect::<Vec<PathBuf>>()
    };

    files
        .into_iter()
        .sorted()
        .map(|file| {
            tracing::debug!(file = %file.display(), "loading feature");
            gherkin::Feature::parse_path(&file, gherkin::GherkinEnv::default())
                .map(Feature::from)
                .map_err(LoadError::Parse)
        })
        .collect()
}

/// Parses a single feature from its text.
///
/// # Errors
///
/// If the text is not a valid feature.
pub fn parse_str(input: &str) -> Result<Feature, LoadError> {
    gherkin::Feature::parse(input, gherkin::GherkinEnv::default())
        .map(Feature::from)
        .map_err(|e| LoadError::Syntax(e.to_string()))
}

impl From<gherkin::Feature> for Feature {
    /// Rules are flattened into the feature, their backgrounds scoped to
    /// their own scenarios.
    fn from(feature: gherkin::Feature) -> Self {
        let mut scenarios =
            feature.scenarios.into_iter().map(Scenario::from).collect::<Vec<_>>();
        for rule in feature.rules {
            let background = rule.background.map(Background::from);
            let tags = rule.tags;
            scenarios.extend(rule.scenarios.into_iter().map(|sc| {
                let mut sc = Scenario::from(sc);
                sc.background.clone_from(&background);
                sc.tags = tags.iter().cloned().chain(mem::take(&mut sc.tags)).collect();
                sc
            }));
        }

        Self {
            name: feature.name,
            tags: feature.tags,
            background: feature.background.map(Background::from),
            scenarios,
            path: feature.path,
        }
    }
}

impl From<gherkin::Background> for Background {
    fn from(bg: gherkin::Background) -> Self {
        Self {
            name: String::new(),
            steps: bg.steps.into_iter().map(Step::from).collect(),
        }
    }
}

impl From<gherkin::Scenario> for Scenario {
    fn from(sc: gherkin::Scenario) -> Self {
        Self {
            name: sc.name,
            tags: sc.tags,
            steps: sc.steps.into_iter().map(Step::from).collect(),
            background: None,
            examples: sc.examples.into_iter().map(Examples::from).collect(),
        }
    }
}

impl From<gherkin::Examples> for Examples {
    fn from(ex: gherkin::Examples) -> Self {
        let mut rows = ex.table.map(|t| t.rows).unwrap_or_default().into_iter();
        Self {
            headers: rows.next().unwrap_or_default(),
            rows: rows.collect(),
            tags: ex.tags,
            external: None,
        }
    }
}

impl From<gherkin::Step> for Step {
    fn from(step: gherkin::Step) -> Self {
        Self {
            keyword: step.keyword.trim().to_owned(),
            text: step.value,
            table: step.table.as_ref().map(DataTable::from),
            docstring: step.docstring,
        }
    }
}
