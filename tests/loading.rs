// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Running features loaded from files, with external example data.

use std::{convert::Infallible, fs};

use futures::{future::LocalBoxFuture, FutureExt as _};
use scenario_runner::{
    error::LoadError, examples::JsonFileSource, Context, Examples, Feature,
    Registry, RunOptions, Runner, Scenario, ScenarioError, Status, Step,
    World,
};

#[derive(Debug, Default)]
struct Account {
    balance: i64,
}

impl World for Account {
    type Error = Infallible;

    async fn new() -> Result<Self, Self::Error> {
        Ok(Self::default())
    }
}

fn deposit<'a>(w: &'a mut Account, ctx: Context) -> LocalBoxFuture<'a, anyhow::Result<()>> {
    async move {
        w.balance += ctx.int(0)?;
        anyhow::Ok(())
    }
    .boxed_local()
}

fn balance<'a>(w: &'a mut Account, ctx: Context) -> LocalBoxFuture<'a, anyhow::Result<()>> {
    async move {
        anyhow::ensure!(w.balance == ctx.int(0)?, "balance is {}", w.balance);
        anyhow::Ok(())
    }
    .boxed_local()
}

fn deposits<'a>(w: &'a mut Account, ctx: Context) -> LocalBoxFuture<'a, anyhow::Result<()>> {
    async move {
        let table = ctx.table().ok_or_else(|| anyhow::anyhow!("no table"))?;
        for row in table.hashes() {
            w.balance += row["amount"].parse::<i64>()?;
        }
        anyhow::Ok(())
    }
    .boxed_local()
}

fn bank() -> Registry<Account> {
    Registry::builder()
        .step("I deposit {int}", deposit)
        .step("the balance is {int}", balance)
        .step("I make deposits:", deposits)
        .build()
        .unwrap()
}

const BANK: &str = "\
Feature: Bank

  Background:
    Given I deposit 10

  Scenario: single
    When I deposit 5
    Then the balance is 15

  Scenario: table
    When I make deposits:
      | amount |
      | 1      |
      | 2      |
    Then the balance is 13

  Scenario Outline: outline
    When I deposit <amount>
    Then the balance is <total>

    Examples:
      | amount | total |
      | 1      | 11    |
      | 2      | 13    |
";

#[tokio::test]
async fn runs_features_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("bank.feature"), BANK).unwrap();
    let registry = bank();
    let options = RunOptions { paths: vec![dir.path().into()], ..RunOptions::default() };

    let summary = Runner::new(&registry).with_options(options).run_paths().await.unwrap();

    let names = summary.results.iter().map(|r| r.key.scenario.as_str()).collect::<Vec<_>>();
    assert_eq!(names, ["single", "table", "outline (example 1)", "outline (example 2)"]);
    assert_eq!(summary.stats.passed, 3);
    assert_eq!(summary.stats.failed, 1);
    assert_eq!(summary.results[3].status, Status::Failed);
}

#[tokio::test]
async fn missing_path_is_a_load_error() {
    let registry = bank();
    let options = RunOptions {
        paths: vec!["no/such/dir/[".into()],
        ..RunOptions::default()
    };

    let res = Runner::new(&registry).with_options(options).run_paths().await;

    assert!(matches!(res, Err(LoadError::Glob(_))));
}

#[tokio::test]
async fn loads_external_examples_from_json() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("amounts.json"),
        r#"[{"amount": 5, "total": 15}, {"amount": 7, "total": 17}]"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("table.json"),
        r#"{"headers": ["amount", "total"], "rows": [[1, "11"]]}"#,
    )
    .unwrap();
    let source = JsonFileSource::new(dir.path());
    let registry = bank();
    let outline = |name: &str, examples: Examples| {
        Scenario::new(name)
            .step(Step::when("I deposit <amount>"))
            .step(Step::then("the balance is <total>"))
            .examples(examples)
    };
    let feature = Feature::new("Bank")
        .background([Step::given("I deposit 10")])
        .scenario(outline("records", Examples::external("amounts")))
        .scenario(outline("table", Examples::external("table.json")))
        .scenario(outline("missing", Examples::external("nowhere")));

    let summary = Runner::new(&registry)
        .examples_source(&source)
        .run(&[feature])
        .await;

    let names = summary.results.iter().map(|r| r.key.scenario.as_str()).collect::<Vec<_>>();
    assert_eq!(
        names,
        ["missing", "records (example 1)", "records (example 2)", "table"],
        "templates failing to expand are reported first",
    );
    assert_eq!(summary.stats.passed, 3);
    assert!(matches!(
        summary.results[0].error,
        Some(ScenarioError::Examples(_)),
    ));
}
