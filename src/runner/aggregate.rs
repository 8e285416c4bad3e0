// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Deduplication of scenario records into final results.

use linked_hash_map::LinkedHashMap;

use crate::result::{ScenarioExecutionResult, ScenarioKey, Stats, Status};

/// Collector of scenario records keyed by [`ScenarioKey`].
///
/// Every attempt of a scenario may report a record. Only the most recent one
/// by [`ScenarioExecutionResult::finished_at`] is kept, the rest are counted
/// as discarded. Results keep the order their keys were first reported in.
#[derive(Clone, Debug, Default)]
pub struct Aggregator {
    /// Latest record per scenario.
    results: LinkedHashMap<ScenarioKey, ScenarioExecutionResult>,

    /// Number of superseded records.
    discarded: usize,
}

impl Aggregator {
    /// Creates a new empty [`Aggregator`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a record into account.
    pub fn record(&mut self, record: ScenarioExecutionResult) {
        if let Some(existing) = self.results.get_mut(&record.key) {
            self.discarded += 1;
            if existing.finished_at <= record.finished_at {
                *existing = record;
            }
        } else {
            _ = self.results.insert(record.key.clone(), record);
        }
    }

    /// Takes all the records of the `other` [`Aggregator`] into account.
    pub fn merge(&mut self, other: Self) {
        self.discarded += other.discarded;
        for (_, record) in other.results {
            self.record(record);
        }
    }

    /// Returns the final record of a scenario, if any was reported.
    #[must_use]
    pub fn get(&self, key: &ScenarioKey) -> Option<&ScenarioExecutionResult> {
        self.results.get(key)
    }

    /// Iterates over final records.
    pub fn results(&self) -> impl Iterator<Item = &ScenarioExecutionResult> {
        self.results.values()
    }

    /// Number of distinct scenarios reported.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Indicates whether nothing was reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Number of superseded records.
    #[must_use]
    pub const fn discarded(&self) -> usize {
        self.discarded
    }

    /// Counts the final records.
    #[must_use]
    pub fn stats(&self) -> Stats {
        self.results().collect()
    }

    /// Indicates whether any final record is [`Status::Failed`].
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.results().any(|r| r.status == Status::Failed)
    }

    /// Returns the final records in report order.
    #[must_use]
    pub fn into_results(self) -> Vec<ScenarioExecutionResult> {
        self.results.into_iter().map(|(_, r)| r).collect()
    }
}

impl Extend<ScenarioExecutionResult> for Aggregator {
    fn extend<I: IntoIterator<Item = ScenarioExecutionResult>>(&mut self, iter: I) {
        for r in iter {
            self.record(r);
        }
    }
}

impl FromIterator<ScenarioExecutionResult> for Aggregator {
    fn from_iter<I: IntoIterator<Item = ScenarioExecutionResult>>(iter: I) -> Self {
        let mut agg = Self::new();
        agg.extend(iter);
        agg
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        examples::ScenarioInstance,
        model::{Feature, Scenario},
        result::PendingResult,
    };

    fn instance(name: &str) -> ScenarioInstance {
        ScenarioInstance::plain(&Feature::new("F"), &Scenario::new(name))
    }

    fn record(name: &str, attempt: usize, status: Status) -> ScenarioExecutionResult {
        PendingResult::start(&instance(name), attempt).finalize(status, None)
    }

    #[test]
    fn keeps_latest_attempt() {
        let first = record("a", 1, Status::Failed);
        let mut second = record("a", 2, Status::Passed);
        second.finished_at = first.finished_at + Duration::from_millis(1);

        let agg = [second, first].into_iter().collect::<Aggregator>();

        assert_eq!(agg.len(), 1);
        assert_eq!(agg.discarded(), 1);
        let kept = agg.get(&ScenarioKey::new("F", "a")).unwrap();
        assert_eq!(kept.attempt, 2);
        assert_eq!(kept.status, Status::Passed);
        assert!(!agg.has_failures());
    }

    #[test]
    fn counts_only_final_records() {
        let agg = [
            record("a", 1, Status::Failed),
            record("b", 1, Status::Passed),
            record("a", 2, Status::Failed),
            record("c", 1, Status::Skipped),
        ]
        .into_iter()
        .collect::<Aggregator>();

        assert_eq!(
            agg.stats(),
            Stats { passed: 1, failed: 1, skipped: 1, retried: 1 },
        );
        assert!(agg.has_failures());
        let names = agg
            .into_results()
            .into_iter()
            .map(|r| r.key.scenario)
            .collect::<Vec<_>>();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn merges_discarded_counts() {
        let mut left = [record("a", 1, Status::Failed), record("a", 2, Status::Passed)]
            .into_iter()
            .collect::<Aggregator>();
        let right = [record("b", 1, Status::Passed)].into_iter().collect();

        left.merge(right);

        assert_eq!(left.len(), 2);
        assert_eq!(left.discarded(), 1);
    }
}
