// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! CLI options of a run.
//!
//! [`Cli`] may be used on its own via [`Cli::parsed()`], or flattened into a
//! custom [`clap::Parser`] with `#[command(flatten)]`.
//!
//! ```rust
//! use clap::Parser as _;
//! use scenario_runner::{cli, RunOptions};
//!
//! #[derive(clap::Parser)]
//! struct Args {
//!     #[command(flatten)]
//!     run: cli::Cli,
//! }
//!
//! let args = Args::parse_from(["tests", "features/", "-j", "4"]);
//! let opts = RunOptions::from(args.run);
//! assert_eq!(opts.workers, 4);
//! ```

use std::{path::PathBuf, time::Duration};

use gherkin::tagexpr::TagOperation;

use crate::RunOptions;

pub use clap::{Args, Parser};

/// Run options settable from a command line.
#[derive(Args, Clone, Debug, Default)]
pub struct Cli {
    /// Feature files, directories or glob patterns to run.
    #[arg(value_name = "path")]
    pub paths: Vec<PathBuf>,

    /// Tag expression scenarios must satisfy to run.
    ///
    /// Note: Tags of a feature, its scenario and examples block are merged
    /// together on filtering.
    #[arg(long = "tags", short = 't', value_name = "tagexpr", global = true)]
    pub include_tags: Option<TagOperation>,

    /// Tag expression excluding scenarios satisfying it.
    #[arg(long, value_name = "tagexpr", global = true)]
    pub exclude_tags: Option<TagOperation>,

    /// Substring of scenario names to run.
    #[arg(
        id = "name",
        long = "name",
        short = 'n',
        value_name = "substring",
        global = true
    )]
    pub name_filter: Option<String>,

    /// Number of scenarios to run concurrently.
    #[arg(long, short = 'j', value_name = "int", global = true)]
    pub workers: Option<usize>,

    /// Number of times a failed scenario is retried.
    #[arg(long, value_name = "int", global = true)]
    pub retry: Option<usize>,

    /// Delay between each retry attempt.
    #[arg(
        long,
        value_name = "duration",
        value_parser = humantime::parse_duration,
        global = true
    )]
    pub retry_after: Option<Duration>,

    /// Bound on each step's execution.
    #[arg(
        long,
        value_name = "duration",
        value_parser = humantime::parse_duration,
        global = true
    )]
    pub step_timeout: Option<Duration>,

    /// Stop scheduling scenarios after the first failure.
    #[arg(long, visible_alias = "ff", global = true)]
    pub fail_fast: bool,

    /// Match steps without executing them.
    #[arg(long, global = true)]
    pub dry_run: bool,
}

/// Standalone command line parser of a run.
#[derive(Clone, Debug, Default, Parser)]
#[command(name = "scenario-runner", about = "Run behavioural scenarios")]
pub struct Opts {
    /// Run options.
    #[command(flatten)]
    pub run: Cli,
}

impl Cli {
    /// Shortcut for [`clap::Parser::parse()`] of a standalone command line,
    /// which doesn't require the trait being imported.
    #[must_use]
    pub fn parsed() -> Self {
        <Opts as Parser>::parse().run
    }
}

impl From<Cli> for RunOptions {
    fn from(cli: Cli) -> Self {
        let defaults = Self::default();
        Self {
            paths: cli.paths,
            include_tags: cli.include_tags,
            exclude_tags: cli.exclude_tags,
            name_filter: cli.name_filter,
            workers: cli.workers.unwrap_or(defaults.workers).max(1),
            retries: cli.retry.unwrap_or(defaults.retries),
            retry_after: cli.retry_after,
            step_timeout: cli.step_timeout,
            fail_fast: cli.fail_fast,
            dry_run: cli.dry_run,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser as _;

    use super::*;
    use crate::tag::Ext as _;

    fn parse(args: &[&str]) -> RunOptions {
        Opts::try_parse_from(std::iter::once("runner").chain(args.iter().copied()))
            .unwrap()
            .run
            .into()
    }

    #[test]
    fn defaults_match_run_options() {
        let opts = parse(&[]);

        assert!(opts.paths.is_empty());
        assert_eq!(opts.workers, 1);
        assert_eq!(opts.retries, 0);
        assert_eq!(opts.step_timeout, None);
        assert!(!opts.fail_fast);
        assert!(!opts.dry_run);
    }

    #[test]
    fn parses_every_option() {
        let opts = parse(&[
            "a.feature",
            "dir/",
            "--tags",
            "@smoke and not @slow",
            "--exclude-tags",
            "@wip",
            "-n",
            "login",
            "-j",
            "8",
            "--retry",
            "2",
            "--retry-after",
            "150ms",
            "--step-timeout",
            "3s",
            "--ff",
            "--dry-run",
        ]);

        assert_eq!(opts.paths, [PathBuf::from("a.feature"), "dir/".into()]);
        let include = opts.include_tags.unwrap();
        assert!(include.eval(["smoke"]));
        assert!(!include.eval(["smoke", "slow"]));
        assert!(opts.exclude_tags.unwrap().eval(["wip"]));
        assert_eq!(opts.name_filter.as_deref(), Some("login"));
        assert_eq!(opts.workers, 8);
        assert_eq!(opts.retries, 2);
        assert_eq!(opts.retry_after, Some(Duration::from_millis(150)));
        assert_eq!(opts.step_timeout, Some(Duration::from_secs(3)));
        assert!(opts.fail_fast);
        assert!(opts.dry_run);
    }

    #[test]
    fn zero_workers_clamp_to_one() {
        assert_eq!(parse(&["-j", "0"]).workers, 1);
    }

    #[test]
    fn rejects_invalid_durations() {
        assert!(Opts::try_parse_from(["runner", "--retry-after", "soon"]).is_err());
    }
}
