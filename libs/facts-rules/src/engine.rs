//! Rules Engine - fact assertion, fire cycle and rollback
//!
//! Each top-level assertion moves the engine through
//! `Idle -> Firing -> (draining queued changes)* -> Idle`:
//! - Facts asserted by rule actions while a pass is running are queued and
//!   merged (last write wins per path), never evaluated recursively
//! - Once a pass completes, queued changes drive the next pass until a pass
//!   queues nothing
//! - Any error restores the fact store and rule results captured before the
//!   assertion
//!
//! Deferred condition results are collected during passes and resolved by
//! [`RulesEngine::settle`], each one in its own fire cycle.

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::condition::ConditionFuture;
use crate::error::{Result, RuleError};
use crate::events::{EngineEvent, EventKind, ListenerId, Listeners};
use crate::facts::{ChangeSet, Facts};
use crate::rule_set::{self, RegisteredRule, Rule, RuleId, RuleSet};
use crate::value;

/// Default bound on evaluation passes per assertion
pub const DEFAULT_MAX_PASSES: usize = 100;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum evaluation passes for one assertion before giving up
    pub max_passes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_passes: DEFAULT_MAX_PASSES,
        }
    }
}

/// Evaluation counters, kept across assertions (not rolled back)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    /// Rules skipped because none of their dependencies changed
    pub rule_skips: u64,
    /// Condition evaluations
    pub rule_evaluations: u64,
    /// Actions run
    pub rule_fires: u64,
    /// Evaluation passes
    pub passes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FireState {
    Idle,
    Firing,
}

/// Work requested while a pass was running
#[derive(Debug)]
enum Queued {
    Changes(ChangeSet),
    /// Full evaluation, subsumes any change set
    Everything,
}

type PendingCondition = BoxFuture<'static, (Arc<RegisteredRule>, anyhow::Result<bool>)>;

struct Snapshot {
    facts: Facts,
    results: HashMap<RuleId, bool>,
    pending: usize,
}

/// Forward-chaining rules engine owning its fact store
pub struct RulesEngine {
    facts: Facts,
    rules: RuleSet,
    /// Last condition result per rule; absent until first evaluated
    results: HashMap<RuleId, bool>,
    fire_state: FireState,
    queued: Option<Queued>,
    listeners: Listeners,
    pending: Vec<PendingCondition>,
    stats: Statistics,
    config: EngineConfig,
}

impl RulesEngine {
    /// Create an engine with an empty fact store
    pub fn new(rules: RuleSet) -> Self {
        Self::build(rules, EngineConfig::default())
    }

    /// Create an engine and assert `facts` one by one, in order
    ///
    /// Rules may fire while seeding; the first failing assertion is returned.
    pub fn with_facts<I, K, V>(rules: RuleSet, facts: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        Self::with_config(rules, facts, EngineConfig::default())
    }

    pub fn with_config<I, K, V>(rules: RuleSet, facts: I, config: EngineConfig) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut engine = Self::build(rules, config);
        for (path, value) in facts {
            engine.set_fact(path.as_ref(), value)?;
        }
        Ok(engine)
    }

    fn build(rules: RuleSet, config: EngineConfig) -> Self {
        Self {
            facts: Facts::new(),
            rules,
            results: HashMap::new(),
            fire_state: FireState::Idle,
            queued: None,
            listeners: Listeners::default(),
            pending: Vec::new(),
            stats: Statistics::default(),
            config,
        }
    }

    // ========================================================================
    // Facts
    // ========================================================================

    pub fn facts(&self) -> &Facts {
        &self.facts
    }

    /// Read a fact; no side effects
    pub fn fact(&self, path: &str) -> Option<&Value> {
        self.facts.get(path)
    }

    /// Assert a fact and run every affected rule to a fixpoint
    ///
    /// Returns `Ok(false)` without evaluating anything when the value equals
    /// the current one. On error the store is left exactly as before the call.
    /// When called from a rule action, the write is applied immediately and
    /// its evaluation is queued behind the running pass.
    pub fn set_fact(&mut self, path: &str, value: impl Into<Value>) -> Result<bool> {
        let value = value.into();
        if value::strict_eq(self.facts.get(path), Some(&value)) {
            return Ok(false);
        }

        let changes = ChangeSet::single(path, value.clone());

        if self.fire_state == FireState::Firing {
            debug!(path, %value, "Queueing fact asserted during pass");
            self.facts.set(path, value);
            self.enqueue(Queued::Changes(changes.clone()));
            self.notify(&EngineEvent::Change(&changes))?;
            return Ok(true);
        }

        debug!(path, %value, "Asserting fact");
        let snapshot = self.snapshot();
        self.facts.set(path, value);

        let outcome = self
            .run_cycle(Some(changes.clone()))
            .and_then(|()| self.notify(&EngineEvent::Change(&changes)));

        match outcome {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(path, "Rolling back fact assertion: {}", e);
                self.restore(snapshot);
                Err(e)
            },
        }
    }

    /// Evaluate every rule regardless of declared dependencies
    ///
    /// Same rollback discipline as [`set_fact`](Self::set_fact). From inside
    /// a rule action this schedules a full pass after the running one.
    pub fn refresh(&mut self) -> Result<()> {
        if self.fire_state == FireState::Firing {
            self.enqueue(Queued::Everything);
            return Ok(());
        }

        let snapshot = self.snapshot();
        if let Err(e) = self.run_cycle(None) {
            warn!("Rolling back full evaluation: {}", e);
            self.restore(snapshot);
            return Err(e);
        }
        Ok(())
    }

    // ========================================================================
    // Rules
    // ========================================================================

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Register a rule; it takes part from the next evaluation pass
    pub fn add_rule(&mut self, rule: Rule) -> RuleId {
        self.rules.add(rule)
    }

    /// Last observed condition result of a rule, `None` until evaluated
    pub fn last_result(&self, id: RuleId) -> Option<bool> {
        self.results.get(&id).copied()
    }

    pub fn statistics(&self) -> Statistics {
        self.stats
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_firing(&self) -> bool {
        self.fire_state == FireState::Firing
    }

    // ========================================================================
    // Events
    // ========================================================================

    pub fn add_event_listener<F>(&mut self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&RulesEngine, &EngineEvent<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.listeners.add(kind, Arc::new(listener))
    }

    /// Remove a listener; returns whether it was registered for `kind`
    pub fn remove_event_listener(&mut self, kind: EventKind, id: ListenerId) -> bool {
        self.listeners.remove(kind, id)
    }

    pub(crate) fn notify(&self, event: &EngineEvent<'_>) -> Result<()> {
        let kind = event.kind();
        for listener in self.listeners.for_kind(kind) {
            listener(self, event).map_err(|source| RuleError::Listener {
                kind: kind.as_str(),
                source,
            })?;
        }
        Ok(())
    }

    // ========================================================================
    // Deferred conditions
    // ========================================================================

    /// Number of deferred condition results not yet resolved
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Resolve every deferred condition, including ones deferred while
    /// settling, and apply their fire decisions
    ///
    /// Each resolution runs in a fresh fire cycle with its own rollback. A
    /// rejected condition counts as `false`. On error the unresolved
    /// conditions stay pending. Returns the number resolved.
    pub async fn settle(&mut self) -> Result<usize> {
        let mut in_flight: FuturesUnordered<PendingCondition> = self.pending.drain(..).collect();
        let mut settled = 0;

        while let Some((rule, outcome)) = in_flight.next().await {
            settled += 1;
            if let Err(e) = self.apply_deferred(&rule, outcome) {
                self.pending.extend(in_flight);
                return Err(e);
            }
            in_flight.extend(self.pending.drain(..));
        }

        Ok(settled)
    }

    pub(crate) fn defer(&mut self, rule: Arc<RegisteredRule>, future: ConditionFuture) {
        self.pending
            .push(future.map(move |outcome| (rule, outcome)).boxed());
    }

    fn apply_deferred(
        &mut self,
        rule: &Arc<RegisteredRule>,
        outcome: anyhow::Result<bool>,
    ) -> Result<()> {
        let result = outcome.unwrap_or_else(|e| {
            warn!(rule = rule.name(), "Deferred condition rejected, treating as false: {}", e);
            false
        });

        let snapshot = self.snapshot();
        self.fire_state = FireState::Firing;
        let decided = rule_set::maybe_fire(self, rule, result);
        self.fire_state = FireState::Idle;

        let outcome = decided.and_then(|()| match self.queued.take() {
            Some(Queued::Changes(changes)) => self.run_cycle(Some(changes)),
            Some(Queued::Everything) => self.run_cycle(None),
            None => Ok(()),
        });

        if let Err(e) = outcome {
            warn!(rule = rule.name(), "Rolling back deferred firing: {}", e);
            self.restore(snapshot);
            return Err(e);
        }
        Ok(())
    }

    // ========================================================================
    // Fire cycle
    // ========================================================================

    /// Evaluate passes until no further changes are queued
    ///
    /// `None` evaluates every rule. While a pass is running this only
    /// queues the request.
    fn run_cycle(&mut self, changes: Option<ChangeSet>) -> Result<()> {
        if self.fire_state == FireState::Firing {
            self.enqueue(changes.map_or(Queued::Everything, Queued::Changes));
            return Ok(());
        }

        let max_passes = self.config.max_passes.max(1);
        let mut changes = changes;
        let mut passes = 0;

        loop {
            if passes == max_passes {
                self.queued = None;
                return Err(RuleError::Divergence { passes });
            }
            passes += 1;
            self.stats.passes += 1;
            debug!(
                pass = passes,
                changed = changes.as_ref().map_or(0, ChangeSet::len),
                "Evaluating rules"
            );

            self.fire_state = FireState::Firing;
            let pass = rule_set::evaluate(self, changes.as_ref());
            self.fire_state = FireState::Idle;

            if let Err(e) = pass {
                self.queued = None;
                return Err(e);
            }

            changes = match self.queued.take() {
                Some(Queued::Changes(next)) => Some(next),
                Some(Queued::Everything) => None,
                None => return Ok(()),
            };
        }
    }

    fn enqueue(&mut self, request: Queued) {
        self.queued = Some(match (self.queued.take(), request) {
            (None, request) => request,
            (Some(Queued::Everything), _) | (_, Queued::Everything) => Queued::Everything,
            (Some(Queued::Changes(mut queued)), Queued::Changes(changes)) => {
                queued.merge(changes);
                Queued::Changes(queued)
            },
        });
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            facts: self.facts.clone(),
            results: self.results.clone(),
            pending: self.pending.len(),
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.facts = snapshot.facts;
        self.results = snapshot.results;
        self.pending.truncate(snapshot.pending);
        self.fire_state = FireState::Idle;
        self.queued = None;
    }

    // ========================================================================
    // Rule Set access
    // ========================================================================

    pub(crate) fn stats_mut(&mut self) -> &mut Statistics {
        &mut self.stats
    }

    pub(crate) fn record_result(&mut self, id: RuleId, result: bool) {
        self.results.insert(id, result);
    }
}

impl fmt::Debug for RulesEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RulesEngine")
            .field("facts", &self.facts)
            .field("rules", &self.rules.len())
            .field("results", &self.results)
            .field("fire_state", &self.fire_state)
            .field("listeners", &self.listeners.len())
            .field("pending", &self.pending.len())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::condition::{fact_of, gt, Condition};
    use crate::rule_set::Action;
    use serde_json::json;
    use std::sync::Mutex;
    use tracing_test::traced_test;

    fn engine_xy(rules: RuleSet) -> RulesEngine {
        RulesEngine::with_facts(rules, [("x", 1), ("y", 1)]).unwrap()
    }

    #[test]
    fn test_read_unset_fact() {
        let engine = RulesEngine::new(RuleSet::new());
        assert_eq!(engine.fact("nothing.here"), None);
    }

    #[test]
    fn test_unchanged_value_is_noop() {
        let mut engine = engine_xy(RuleSet::new());
        let events = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&events);
        engine.add_event_listener(EventKind::Change, move |_, _| {
            *counter.lock().unwrap() += 1;
            Ok(())
        });

        assert!(!engine.set_fact("x", 1).unwrap());
        assert!(!engine.set_fact("x", 1.0).unwrap());
        assert_eq!(*events.lock().unwrap(), 0);
        assert!(engine.set_fact("x", 2).unwrap());
        assert_eq!(*events.lock().unwrap(), 1);
    }

    #[test]
    fn test_null_is_a_change_from_undefined() {
        let mut engine = RulesEngine::new(RuleSet::new());
        assert!(engine.set_fact("n", Value::Null).unwrap());
        assert_eq!(engine.fact("n"), Some(&Value::Null));
    }

    #[test]
    fn test_edge_triggered_firing() {
        let fired = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&fired);
        let rules = RuleSet::with_rules([Rule::new(
            "x > 2",
            gt(fact_of("x"), 2),
            Action::new(move |_| {
                *counter.lock().unwrap() += 1;
                Ok(())
            }),
        )]);
        let mut engine = engine_xy(rules);

        engine.set_fact("x", 3).unwrap();
        engine.set_fact("x", 4).unwrap();
        assert_eq!(*fired.lock().unwrap(), 1);
        assert_eq!(engine.last_result(0), Some(true));

        // Leaving and re-entering the true state fires again
        engine.set_fact("x", 0).unwrap();
        assert_eq!(engine.last_result(0), Some(false));
        engine.set_fact("x", 5).unwrap();
        assert_eq!(*fired.lock().unwrap(), 2);
    }

    #[test]
    fn test_rollback_restores_rule_results() {
        let rules = RuleSet::with_rules([
            Rule::new("x > 2", gt(fact_of("x"), 2), Action::noop()),
            Rule::new(
                "x > 5 fails",
                gt(fact_of("x"), 5),
                Action::new(|_| Err(anyhow::anyhow!("refused"))),
            ),
        ]);
        let mut engine = engine_xy(rules);
        assert_eq!(engine.last_result(0), Some(false));

        let err = engine.set_fact("x", 6).unwrap_err();
        assert!(matches!(err, RuleError::Action { ref rule, .. } if rule == "x > 5 fails"));
        assert_eq!(engine.fact("x"), Some(&json!(1)));
        assert_eq!(engine.last_result(0), Some(false));
        assert!(!engine.is_firing());

        // The engine is usable again after a rollback
        assert!(engine.set_fact("x", 3).unwrap());
        assert_eq!(engine.last_result(0), Some(true));
    }

    #[test]
    #[traced_test]
    fn test_rollback_is_logged() {
        let rules = RuleSet::with_rules([Rule::new(
            "x > 2 fails",
            gt(fact_of("x"), 2),
            Action::new(|_| Err(anyhow::anyhow!("refused"))),
        )]);
        let mut engine = engine_xy(rules);

        assert!(engine.set_fact("x", 3).is_err());
        assert!(logs_contain("Rolling back fact assertion"));
    }

    /// Fires when `n % 3 == phase`, then bumps `n`
    fn phase_rule(phase: i64) -> Rule {
        Rule::new(
            format!("phase {}", phase),
            Condition::new(move |facts| {
                facts
                    .get("n")
                    .and_then(Value::as_i64)
                    .is_some_and(|n| n % 3 == phase)
            })
            .with_deps(["n"]),
            Action::new(|engine| {
                let n = engine.fact("n").and_then(Value::as_i64).unwrap_or(0);
                engine.set_fact("n", n + 1)?;
                Ok(())
            }),
        )
    }

    #[test]
    fn test_non_converging_rules_hit_pass_bound() {
        let rules = RuleSet::with_rules([phase_rule(2), phase_rule(1), phase_rule(0)]);
        let config = EngineConfig { max_passes: 10 };
        let mut engine =
            RulesEngine::with_config(rules, Vec::<(String, Value)>::new(), config).unwrap();

        let err = engine.set_fact("n", 0).unwrap_err();
        assert!(matches!(err, RuleError::Divergence { passes: 10 }));
        assert_eq!(engine.fact("n"), None);
        assert!(!engine.is_firing());
    }

    #[test]
    fn test_refresh_evaluates_every_rule() {
        let mut engine = engine_xy(RuleSet::new());
        engine.add_rule(Rule::new(
            "x == 1",
            crate::condition::eq(fact_of("x"), 1),
            Action::set_fact("seen", true),
        ));
        engine.add_rule(Rule::new("anything", Condition::new(|_| false), Action::noop()));

        engine.refresh().unwrap();
        assert_eq!(engine.fact("seen"), Some(&json!(true)));
        assert_eq!(engine.last_result(1), Some(false));
    }

    #[test]
    fn test_remove_event_listener() {
        let mut engine = engine_xy(RuleSet::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = engine.add_event_listener(EventKind::Change, move |_, event| {
            if let EngineEvent::Change(changes) = event {
                sink.lock()
                    .unwrap()
                    .extend(changes.paths().map(str::to_string));
            }
            Ok(())
        });

        engine.set_fact("x", 2).unwrap();
        assert!(!engine.remove_event_listener(EventKind::Fire, id));
        assert!(engine.remove_event_listener(EventKind::Change, id));
        assert!(!engine.remove_event_listener(EventKind::Change, id));
        engine.set_fact("x", 3).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["x".to_string()]);
    }
}
