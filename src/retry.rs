// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Retry budgets and the retry decision.

use std::time::Duration;

use crate::{error::StepError, result::ScenarioKey, tag};

/// Retry counter of a scenario.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Retries {
    /// Current retry attempt: 0 for the first run.
    pub current: usize,

    /// Available retries left.
    pub left: usize,
}

impl Retries {
    /// Creates initial [`Retries`].
    #[must_use]
    pub const fn initial(left: usize) -> Self {
        Self { left, current: 0 }
    }

    /// Returns [`Some`], in case next retry attempt is available, or [`None`]
    /// otherwise.
    #[must_use]
    pub fn next_try(self) -> Option<Self> {
        self.left
            .checked_sub(1)
            .map(|left| Self { left, current: self.current + 1 })
    }
}

/// Retry options declared with a `@retry(n)` or `@retry(n).after(duration)`
/// tag.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RetryTag {
    /// Number of retries, if specified.
    pub retries: Option<usize>,

    /// Delay between attempts, if specified.
    pub after: Option<Duration>,
}

impl RetryTag {
    /// Parses a single tag, returning [`None`] if it's not a retry one.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        let rest = tag::normalize(tag).strip_prefix("retry")?;

        let (retries, rest) = rest
            .strip_prefix('(')
            .and_then(|s| {
                let (num, rest) = s.split_once(')')?;
                num.trim().parse::<usize>().ok().map(|n| (Some(n), rest))
            })
            .unwrap_or((None, rest));

        let after = match rest.strip_prefix(".after") {
            Some(after) => {
                let (dur, _) = after.strip_prefix('(')?.split_once(')')?;
                Some(humantime::parse_duration(dur.trim()).ok()?)
            }
            None if rest.is_empty() => None,
            None => return None,
        };

        Some(Self { retries, after })
    }

    /// Finds the most specific retry tag: the last one, as scenario tags
    /// follow feature ones.
    #[must_use]
    pub fn find<T: AsRef<str>>(tags: &[T]) -> Option<Self> {
        tags.iter().rev().find_map(|t| Self::parse(t.as_ref()))
    }
}

/// Effective retry settings of a single scenario instance.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RetryPlan {
    /// Number of retries after the first attempt.
    pub retries: usize,

    /// Delay before each retry.
    pub after: Option<Duration>,
}

impl RetryPlan {
    /// Resolves the plan of a scenario tagged with `tags`, falling back to
    /// the run-wide `retries` and `after`.
    ///
    /// A bare `@retry` tag means the run-wide count, or a single retry if
    /// that's zero.
    #[must_use]
    pub fn resolve<T: AsRef<str>>(
        tags: &[T],
        retries: usize,
        after: Option<Duration>,
    ) -> Self {
        match RetryTag::find(tags) {
            Some(tag) => Self {
                retries: tag.retries.unwrap_or(retries.max(1)),
                after: tag.after.or(after),
            },
            None => Self { retries, after },
        }
    }
}

/// Information about the failed attempt handed to a [`RetryStrategy`].
#[derive(Clone, Debug, PartialEq)]
pub struct RetryContext {
    /// Identity of the failed scenario instance.
    pub key: ScenarioKey,

    /// Text of the failed step.
    pub step: String,

    /// 1-based number of the failed attempt.
    pub attempt: usize,

    /// Retry counter as of the failed attempt.
    pub retries: Retries,
}

/// Decision whether a failed scenario attempt is retried, once the retry
/// budget allows it.
pub trait RetryStrategy {
    /// Indicates whether the attempt failed with `error` should be retried.
    fn should_retry(&self, error: &StepError, ctx: &RetryContext) -> bool;
}

impl<F> RetryStrategy for F
where
    F: Fn(&StepError, &RetryContext) -> bool,
{
    fn should_retry(&self, error: &StepError, ctx: &RetryContext) -> bool {
        self(error, ctx)
    }
}

/// [`RetryStrategy`] retrying every failure while the budget lasts.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unconditional;

impl RetryStrategy for Unconditional {
    fn should_retry(&self, _: &StepError, _: &RetryContext) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_count_down() {
        let r = Retries::initial(2);

        let r = r.next_try().unwrap();
        assert_eq!(r, Retries { current: 1, left: 1 });
        let r = r.next_try().unwrap();
        assert_eq!(r, Retries { current: 2, left: 0 });
        assert_eq!(r.next_try(), None);
    }

    #[test]
    fn parses_retry_tags() {
        assert_eq!(
            RetryTag::parse("@retry(3)"),
            Some(RetryTag { retries: Some(3), after: None }),
        );
        assert_eq!(
            RetryTag::parse("retry(2).after(1s 500ms)"),
            Some(RetryTag {
                retries: Some(2),
                after: Some(Duration::from_millis(1500)),
            }),
        );
        assert_eq!(
            RetryTag::parse("@retry.after(5s)"),
            Some(RetryTag { retries: None, after: Some(Duration::from_secs(5)) }),
        );
        assert_eq!(RetryTag::parse("@retry"), Some(RetryTag::default()));
        assert_eq!(RetryTag::parse("@retryable"), None);
        assert_eq!(RetryTag::parse("@retry(2).after(soon)"), None);
        assert_eq!(RetryTag::parse("@smoke"), None);
    }

    #[test]
    fn scenario_tag_beats_feature_tag() {
        let tags = ["@retry(5)", "@smoke", "@retry(1)"];

        assert_eq!(RetryTag::find(&tags).and_then(|t| t.retries), Some(1));
    }

    #[test]
    fn plan_falls_back_to_run_wide() {
        let after = Some(Duration::from_secs(1));

        assert_eq!(
            RetryPlan::resolve::<&str>(&[], 2, after),
            RetryPlan { retries: 2, after },
        );
        assert_eq!(
            RetryPlan::resolve(&["@retry(4)"], 2, after),
            RetryPlan { retries: 4, after },
        );
        assert_eq!(
            RetryPlan::resolve(&["@retry"], 0, None),
            RetryPlan { retries: 1, after: None },
        );
    }

    #[test]
    fn closures_are_strategies() {
        let only_timeouts =
            |e: &StepError, _: &RetryContext| matches!(e, StepError::Timeout { .. });
        let ctx = RetryContext {
            key: ScenarioKey::new("F", "S"),
            step: "I wait".into(),
            attempt: 1,
            retries: Retries::initial(1),
        };
        let failed = StepError::Failed { text: "I wait".into(), message: "x".into() };
        let timeout = StepError::Timeout {
            text: "I wait".into(),
            after: Duration::from_secs(1),
        };

        assert!(!only_timeouts.should_retry(&failed, &ctx));
        assert!(only_timeouts.should_retry(&timeout, &ctx));
        assert!(Unconditional.should_retry(&failed, &ctx));
    }
}
