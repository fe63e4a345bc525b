//! Rule Set - ordered rule registry and per-pass evaluation
//!
//! Rules are evaluated in registration order. During a pass each rule is:
//! 1. Gated on its declared dependencies against the changed paths
//! 2. Evaluated against the current facts
//! 3. Fired when its result transitions into `true`

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::condition::{Condition, ConditionResult};
use crate::engine::RulesEngine;
use crate::error::{Result, RuleError};
use crate::events::EngineEvent;
use crate::facts::ChangeSet;

/// Rule identifier, assigned on registration
pub type RuleId = u64;

type ActionFn = dyn Fn(&mut RulesEngine) -> anyhow::Result<()> + Send + Sync;

/// Action run when a rule's condition becomes true
///
/// Actions receive the engine and may assert further facts; those writes are
/// queued and evaluated after the current pass.
#[derive(Clone)]
pub struct Action(Arc<ActionFn>);

impl Action {
    pub fn new<F>(action: F) -> Self
    where
        F: Fn(&mut RulesEngine) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self(Arc::new(action))
    }

    /// Action asserting `value` at `path`
    pub fn set_fact(path: impl Into<String>, value: impl Into<Value>) -> Self {
        let path = path.into();
        let value = value.into();
        Self::new(move |engine| {
            engine.set_fact(&path, value.clone())?;
            Ok(())
        })
    }

    /// Action that does nothing
    pub fn noop() -> Self {
        Self::new(|_| Ok(()))
    }

    pub(crate) fn run(&self, engine: &mut RulesEngine) -> anyhow::Result<()> {
        (self.0)(engine)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Action(..)")
    }
}

/// Rule definition: a named condition/action pair
#[derive(Debug, Clone)]
pub struct Rule {
    /// Rule name (diagnostic only)
    pub name: String,
    pub condition: Condition,
    pub action: Action,
}

impl Rule {
    pub fn new(name: impl Into<String>, condition: Condition, action: Action) -> Self {
        Self {
            name: name.into(),
            condition,
            action,
        }
    }
}

/// A rule after registration, immutable from then on
#[derive(Debug)]
pub struct RegisteredRule {
    id: RuleId,
    name: String,
    condition: Condition,
    action: Action,
}

impl RegisteredRule {
    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    /// Whether a change set requires this rule to be re-evaluated
    ///
    /// No change set means a full evaluation. Rules without declared
    /// dependencies are always evaluated. A dependency is hit by a write to
    /// the path itself or to anything below it.
    pub fn should_evaluate(&self, changes: Option<&ChangeSet>) -> bool {
        match (changes, self.condition.deps()) {
            (None, _) | (_, None) => true,
            (Some(changes), Some(deps)) => deps.iter().any(|dep| changes.affects(dep)),
        }
    }
}

/// Ordered collection of registered rules
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<Arc<RegisteredRule>>,
    next_id: RuleId,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules<I>(rules: I) -> Self
    where
        I: IntoIterator<Item = Rule>,
    {
        let mut set = Self::new();
        set.extend(rules);
        set
    }

    /// Register a rule, returning its id
    ///
    /// Ids start at 0 and are never reused.
    pub fn add(&mut self, rule: Rule) -> RuleId {
        let id = self.next_id;
        self.next_id += 1;
        self.rules.push(Arc::new(RegisteredRule {
            id,
            name: rule.name,
            condition: rule.condition,
            action: rule.action,
        }));
        id
    }

    pub fn get(&self, id: RuleId) -> Option<&RegisteredRule> {
        self.rules.iter().find(|r| r.id == id).map(Arc::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredRule> {
        self.rules.iter().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules as of now; rules added during a pass join the next one
    pub(crate) fn snapshot(&self) -> Vec<Arc<RegisteredRule>> {
        self.rules.clone()
    }
}

impl Extend<Rule> for RuleSet {
    fn extend<I: IntoIterator<Item = Rule>>(&mut self, rules: I) {
        for rule in rules {
            self.add(rule);
        }
    }
}

/// Run one evaluation pass over every rule of the engine
///
/// `changes` of `None` evaluates every rule regardless of dependencies.
pub(crate) fn evaluate(engine: &mut RulesEngine, changes: Option<&ChangeSet>) -> Result<()> {
    for rule in engine.rules().snapshot() {
        if !rule.should_evaluate(changes) {
            engine.stats_mut().rule_skips += 1;
            trace!(rule = %rule.name, "Rule skipped, no dependency changed");
            continue;
        }
        process_rule(engine, &rule)?;
    }
    Ok(())
}

fn process_rule(engine: &mut RulesEngine, rule: &Arc<RegisteredRule>) -> Result<()> {
    engine.stats_mut().rule_evaluations += 1;

    let outcome = rule
        .condition
        .evaluate(engine.facts())
        .map_err(|source| RuleError::Condition {
            rule: rule.name.clone(),
            source,
        })?;

    match outcome {
        ConditionResult::Immediate(result) => {
            trace!(rule = %rule.name, result, "Condition evaluated");
            maybe_fire(engine, rule, result)?;
        },
        ConditionResult::Deferred(future) => {
            trace!(rule = %rule.name, "Condition deferred");
            engine.defer(Arc::clone(rule), future);
        },
    }

    engine.notify(&EngineEvent::Process(rule))
}

/// Apply the fire decision for a freshly computed condition result
///
/// Fires only on a transition into `true`; the stored result is always
/// overwritten so a later false -> true transition fires again.
pub(crate) fn maybe_fire(
    engine: &mut RulesEngine,
    rule: &Arc<RegisteredRule>,
    result: bool,
) -> Result<()> {
    if result && engine.last_result(rule.id) != Some(true) {
        debug!(rule = %rule.name, id = rule.id, "Firing rule");
        rule.action.run(engine).map_err(|source| RuleError::Action {
            rule: rule.name.clone(),
            source,
        })?;
        engine.stats_mut().rule_fires += 1;
        engine.notify(&EngineEvent::Fire(rule))?;
    }
    engine.record_result(rule.id, result);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::condition::{fact_of, gt, truthy};
    use serde_json::json;

    fn rule(name: &str, condition: Condition) -> Rule {
        Rule::new(name, condition, Action::noop())
    }

    #[test]
    fn test_ids_are_sequential_in_registration_order() {
        let mut set = RuleSet::new();
        assert_eq!(set.add(rule("a", gt(fact_of("x"), 1))), 0);
        set.extend([rule("b", gt(fact_of("x"), 2)), rule("c", gt(fact_of("x"), 3))]);
        assert_eq!(set.add(rule("d", gt(fact_of("x"), 4))), 3);

        let names: Vec<_> = set.iter().map(|r| (r.id(), r.name().to_string())).collect();
        assert_eq!(
            names,
            vec![
                (0, "a".to_string()),
                (1, "b".to_string()),
                (2, "c".to_string()),
                (3, "d".to_string())
            ]
        );
        assert_eq!(set.get(2).unwrap().name(), "c");
        assert!(set.get(9).is_none());
    }

    #[test]
    fn test_should_evaluate_dependency_gate() {
        let set = RuleSet::with_rules([
            rule("watches x", gt(fact_of("x"), 2)),
            rule("watches nothing", Condition::new(|_| true)),
            rule("watches d.e", gt(fact_of("d.e"), 2)),
        ]);
        let watches_x = set.get(0).unwrap();
        let undeclared = set.get(1).unwrap();
        let nested = set.get(2).unwrap();

        let y_changed = ChangeSet::single("y", json!(3));
        assert!(!watches_x.should_evaluate(Some(&y_changed)));
        assert!(undeclared.should_evaluate(Some(&y_changed)));
        assert!(watches_x.should_evaluate(None));

        let x_changed = ChangeSet::single("x", json!(3));
        assert!(watches_x.should_evaluate(Some(&x_changed)));

        // Replacing the parent object affects the nested accessor
        let parent_changed = ChangeSet::single("d", json!(false));
        assert!(nested.should_evaluate(Some(&parent_changed)));
        assert!(!nested.should_evaluate(Some(&ChangeSet::single("e", json!(1)))));
    }

    #[test]
    fn test_descendant_write_reaches_parent_reader() {
        let set = RuleSet::with_rules([rule("reads d", truthy(fact_of("d")))]);
        let reads_parent = set.get(0).unwrap();

        assert!(reads_parent.should_evaluate(Some(&ChangeSet::single("d.e", json!(3)))));
        assert!(!reads_parent.should_evaluate(Some(&ChangeSet::single("de", json!(3)))));
    }
}
