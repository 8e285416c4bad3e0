// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Tabular step argument.

use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

/// Data table attached to a [`Step`], its first row being the header.
///
/// ```rust
/// use scenario_runner::DataTable;
///
/// let table = DataTable::from(vec![
///     vec!["name", "age"],
///     vec!["Alice", "30"],
///     vec!["Bob", "25"],
/// ]);
///
/// let hashes = table.hashes();
/// assert_eq!(hashes[0]["name"], "Alice");
/// assert_eq!(hashes[1]["age"], "25");
/// ```
///
/// [`Step`]: crate::Step
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DataTable {
    /// All the rows, header included.
    rows: Vec<Vec<String>>,
}

impl DataTable {
    /// Creates a new [`DataTable`] out of raw rows, the first one being the
    /// header.
    #[must_use]
    pub const fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    /// Creates a new [`DataTable`] out of separate `headers` and value `rows`.
    #[must_use]
    pub fn from_parts(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let mut all = Vec::with_capacity(rows.len() + 1);
        all.push(headers);
        all.extend(rows);
        Self { rows: all }
    }

    /// Returns all the rows, header included.
    #[must_use]
    pub fn raw(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Returns the header row, if any.
    #[must_use]
    pub fn header(&self) -> Option<&[String]> {
        self.rows.first().map(Vec::as_slice)
    }

    /// Returns the rows without the header one.
    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        self.rows.get(1..).unwrap_or_default()
    }

    /// Zips the header with every other row.
    ///
    /// Cells beyond the header width are dropped, and missing cells are absent
    /// from the produced map.
    #[must_use]
    pub fn hashes(&self) -> Vec<HashMap<String, String>> {
        let Some((header, rows)) = self.rows.split_first() else {
            return Vec::new();
        };
        rows.iter()
            .map(|row| header.iter().cloned().zip(row.iter().cloned()).collect())
            .collect()
    }

    /// Treats a two-column table as key-value pairs.
    ///
    /// Returns [`None`] if any row has another number of cells.
    #[must_use]
    pub fn rows_hash(&self) -> Option<HashMap<String, String>> {
        self.rows
            .iter()
            .map(|row| match row.as_slice() {
                [k, v] => Some((k.clone(), v.clone())),
                _ => None,
            })
            .collect()
    }

    /// Returns a [`DataTable`] with rows and columns swapped.
    #[must_use]
    pub fn transpose(&self) -> Self {
        let width = self.width();
        let rows = (0..width)
            .map(|col| {
                self.rows
                    .iter()
                    .filter_map(|row| row.get(col).cloned())
                    .collect()
            })
            .collect();
        Self { rows }
    }

    /// Applies `f` to every cell, header included.
    #[must_use]
    pub fn map_cells(mut self, mut f: impl FnMut(&str) -> String) -> Self {
        for cell in self.rows.iter_mut().flatten() {
            *cell = f(cell);
        }
        self
    }

    /// Indicates whether this [`DataTable`] has no rows at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows, header included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Number of cells in the header row.
    #[must_use]
    pub fn width(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }
}

impl From<Vec<Vec<&str>>> for DataTable {
    fn from(rows: Vec<Vec<&str>>) -> Self {
        Self::new(
            rows.into_iter()
                .map(|row| row.into_iter().map(str::to_owned).collect())
                .collect(),
        )
    }
}

impl From<Vec<Vec<String>>> for DataTable {
    fn from(rows: Vec<Vec<String>>) -> Self {
        Self::new(rows)
    }
}

impl From<&gherkin::Table> for DataTable {
    fn from(table: &gherkin::Table) -> Self {
        Self::new(table.rows.clone())
    }
}

impl fmt::Display for DataTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            writeln!(f, "| {} |", row.join(" | "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> DataTable {
        DataTable::from(vec![
            vec!["name", "age"],
            vec!["Alice", "30"],
            vec!["Bob", "25"],
        ])
    }

    #[test]
    fn hashes_zip_header_with_each_row() {
        let headers = vec!["name".to_owned(), "age".to_owned()];
        let values = vec![
            vec!["Alice".to_owned(), "30".to_owned()],
            vec!["Bob".to_owned(), "25".to_owned()],
        ];
        let table = DataTable::from_parts(headers.clone(), values.clone());

        let expected = values
            .iter()
            .map(|row| {
                headers.iter().cloned().zip(row.iter().cloned()).collect()
            })
            .collect::<Vec<HashMap<_, _>>>();
        assert_eq!(table.hashes(), expected);
    }

    #[test]
    fn empty_table_has_no_hashes() {
        let table = DataTable::default();

        assert!(table.hashes().is_empty());
        assert!(table.rows().is_empty());
        assert_eq!(table.header(), None);
        assert_eq!(table.width(), 0);
    }

    #[test]
    fn rows_skip_header() {
        let table = people();

        assert_eq!(table.len(), 3);
        assert_eq!(table.rows().len(), 2);
        assert_eq!(table.rows()[0], vec!["Alice", "30"]);
        assert_eq!(table.header().unwrap(), ["name", "age"]);
    }

    #[test]
    fn rows_hash_requires_two_columns() {
        assert_eq!(people().rows_hash().unwrap()["Bob"], "25");

        let wide = DataTable::from(vec![vec!["a", "b", "c"]]);
        assert!(wide.rows_hash().is_none());
    }

    #[test]
    fn transposes() {
        let t = people().transpose();

        assert_eq!(t.raw()[0], vec!["name", "Alice", "Bob"]);
        assert_eq!(t.raw()[1], vec!["age", "30", "25"]);
    }

    #[test]
    fn renders_as_gherkin() {
        let table = DataTable::from(vec![vec!["a", "b"], vec!["1", "2"]]);
        assert_eq!(table.to_string(), "| a | b |\n| 1 | 2 |\n");
    }
}
