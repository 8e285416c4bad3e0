// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Dry run: the would-be execution order of features, without running
//! anything.

use std::fmt;

use crate::{
    examples::{Expander, ScenarioInstance},
    model::Feature,
    registry::Registry,
    result::ScenarioKey,
    step::{Location, Pattern},
};

use super::{feature::Selection, RunOptions};

/// Would-be execution order of a run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Plan {
    /// Planned features in order.
    pub features: Vec<FeaturePlan>,
}

/// Planned feature.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeaturePlan {
    /// Name of the feature.
    pub name: String,

    /// Planned scenario instances in document order.
    pub scenarios: Vec<ScenarioPlan>,
}

/// Planned scenario instance.
#[derive(Clone, Debug, PartialEq)]
pub struct ScenarioPlan {
    /// Identity of the instance.
    pub key: ScenarioKey,

    /// Steps in execution order, background ones first.
    pub steps: Vec<StepPlan>,

    /// Why the instance cannot run at all, if so.
    pub error: Option<String>,
}

/// Planned step.
#[derive(Clone, Debug, PartialEq)]
pub struct StepPlan {
    /// Keyword of the step.
    pub keyword: String,

    /// Text of the step.
    pub text: String,

    /// Whether the step comes from a background.
    pub background: bool,

    /// Pattern and location of the definition the step resolves to, if any.
    pub definition: Option<(Pattern, Location)>,
}

impl StepPlan {
    /// Indicates whether no step definition matches this step.
    #[must_use]
    pub const fn is_undefined(&self) -> bool {
        self.definition.is_none()
    }
}

impl Plan {
    /// Plans the `features` against the `registry`, applying the filters of
    /// the `options`.
    ///
    /// No [`World`] is created, and no step handler or hook is invoked.
    ///
    /// [`World`]: crate::World
    #[must_use]
    pub fn new<W>(
        registry: &Registry<W>,
        features: &[Feature],
        options: &RunOptions,
        expander: Expander<'_>,
    ) -> Self {
        let features = features
            .iter()
            .map(|feature| {
                let selection = Selection::of(feature, options, expander);
                let failed = selection.failed.into_iter().map(|(inst, e)| ScenarioPlan {
                    key: inst.key(),
                    steps: plan_steps(registry, &inst),
                    error: Some(e.to_string()),
                });
                let planned = selection.instances.iter().map(|inst| ScenarioPlan {
                    key: inst.key(),
                    steps: plan_steps(registry, inst),
                    error: None,
                });
                FeaturePlan {
                    name: feature.name.clone(),
                    scenarios: failed.chain(planned).collect(),
                }
            })
            .collect();
        Self { features }
    }

    /// Iterates over every planned step matching no definition.
    pub fn undefined_steps(&self) -> impl Iterator<Item = (&ScenarioKey, &StepPlan)> {
        self.features
            .iter()
            .flat_map(|f| &f.scenarios)
            .flat_map(|s| s.steps.iter().map(move |st| (&s.key, st)))
            .filter(|(_, st)| st.is_undefined())
    }

    /// Total number of planned scenario instances.
    #[must_use]
    pub fn scenarios(&self) -> usize {
        self.features.iter().map(|f| f.scenarios.len()).sum()
    }
}

fn plan_steps<W>(registry: &Registry<W>, instance: &ScenarioInstance) -> Vec<StepPlan> {
    instance
        .all_steps()
        .map(|(step, background)| StepPlan {
            keyword: step.keyword.clone(),
            text: step.text.clone(),
            background,
            definition: registry
                .resolve(&step.text)
                .ok()
                .map(|m| (m.definition.pattern().clone(), m.definition.location())),
        })
        .collect()
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for feature in &self.features {
            writeln!(f, "Feature: {}", feature.name)?;
            for scenario in &feature.scenarios {
                writeln!(f, "  Scenario: {}", scenario.key.scenario)?;
                if let Some(e) = &scenario.error {
                    writeln!(f, "    # {e}")?;
                }
                for step in &scenario.steps {
                    write!(f, "    {} {}", step.keyword.trim(), step.text)?;
                    match &step.definition {
                        Some((pattern, location)) => {
                            writeln!(f, "  # {pattern} ({location})")?;
                        }
                        None => writeln!(f, "  # undefined")?,
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures::{future::LocalBoxFuture, FutureExt as _};

    use super::*;
    use crate::{
        model::{Examples, Scenario, Step},
        step::Context,
    };

    fn ok<'a>(_: &'a mut (), _: Context) -> LocalBoxFuture<'a, anyhow::Result<()>> {
        async { anyhow::Ok(()) }.boxed_local()
    }

    fn plan() -> Plan {
        let registry = Registry::<()>::builder()
            .step("I open {word}", ok)
            .build()
            .unwrap();
        let feature = Feature::new("Pages")
            .background([Step::given("I open home")])
            .scenario(
                Scenario::new("<page> page")
                    .step(Step::when("I open <page>"))
                    .step(Step::then("I see <page>"))
                    .examples(Examples::new(["page"], [["about"], ["help"]])),
            )
            .scenario(Scenario::new("skipped").tag("@wip"));
        let options = RunOptions {
            exclude_tags: Some("@wip".parse().unwrap()),
            ..RunOptions::default()
        };

        Plan::new(&registry, &[feature], &options, Expander::new())
    }

    #[test]
    fn plans_expanded_and_filtered_instances() {
        let plan = plan();

        assert_eq!(plan.scenarios(), 2);
        let first = &plan.features[0].scenarios[0];
        assert_eq!(first.key.scenario, "about page (example 1)");
        assert!(first.steps[0].background);
        assert_eq!(
            first.steps[1].definition.as_ref().map(|(p, _)| p.as_str()),
            Some("I open {word}"),
        );
    }

    #[test]
    fn reports_undefined_steps() {
        let plan = plan();

        let undefined = plan
            .undefined_steps()
            .map(|(key, step)| format!("{}: {}", key.scenario, step.text))
            .collect::<Vec<_>>();

        assert_eq!(
            undefined,
            ["about page (example 1): I see about", "help page (example 2): I see help"],
        );
    }

    #[test]
    fn renders_plan() {
        let rendered = plan().to_string();

        assert!(rendered.starts_with("Feature: Pages\n  Scenario: about page (example 1)\n"));
        assert!(rendered.contains("    Given I open home  # I open {word} ("));
        assert!(rendered.contains("    Then I see about  # undefined\n"));
    }
}
