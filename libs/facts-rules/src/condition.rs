//! Conditions and condition combinators
//!
//! A [`Condition`] is a predicate over the fact store that may declare the
//! fact paths it depends on. Rules whose conditions declare dependencies are
//! only re-evaluated when one of those paths changes; conditions without
//! declared dependencies are evaluated on every change.
//!
//! ```
//! use facts_rules::condition::{and, fact_of, gt, lt};
//!
//! let cond = and([gt(fact_of("u"), fact_of("v")), lt(fact_of("w"), 10)]);
//! assert_eq!(cond.deps().unwrap(), ["u", "v", "w"]);
//! ```

use futures::future::{join_all, BoxFuture};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

use crate::facts::Facts;
use crate::path;
use crate::value;

/// Future produced by a deferred condition
pub type ConditionFuture = BoxFuture<'static, anyhow::Result<bool>>;

/// Outcome of evaluating a condition
pub enum ConditionResult {
    /// Result known during the evaluation pass
    Immediate(bool),
    /// Result resolved later; the pass does not wait for it
    Deferred(ConditionFuture),
}

impl ConditionResult {
    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        Self::Deferred(Box::pin(future))
    }
}

impl From<bool> for ConditionResult {
    fn from(value: bool) -> Self {
        Self::Immediate(value)
    }
}

impl fmt::Debug for ConditionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate(value) => f.debug_tuple("Immediate").field(value).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

type EvalFn = dyn Fn(&Facts) -> anyhow::Result<ConditionResult> + Send + Sync;

/// Predicate over the fact store with optional declared dependencies
#[derive(Clone)]
pub struct Condition {
    eval: Arc<EvalFn>,
    deps: Option<Vec<String>>,
}

impl Condition {
    /// Synchronous, infallible condition without declared dependencies
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Facts) -> bool + Send + Sync + 'static,
    {
        Self::from_parts(move |facts| Ok(predicate(facts).into()), None)
    }

    /// Condition that may fail or defer its result
    pub fn try_new<F>(eval: F) -> Self
    where
        F: Fn(&Facts) -> anyhow::Result<ConditionResult> + Send + Sync + 'static,
    {
        Self::from_parts(eval, None)
    }

    /// Condition whose result is always resolved asynchronously
    ///
    /// The closure runs during the pass and must capture whatever it needs
    /// from the facts; the returned future is driven by `RulesEngine::settle`.
    pub fn deferred<F, Fut>(start: F) -> Self
    where
        F: Fn(&Facts) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        Self::from_parts(move |facts| Ok(ConditionResult::deferred(start(facts))), None)
    }

    /// Declare the fact paths this condition depends on
    ///
    /// Duplicates are dropped, first-seen order is kept.
    pub fn with_deps<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut declared = Vec::new();
        for dep in deps {
            push_unique(&mut declared, dep.into());
        }
        self.deps = Some(declared);
        self
    }

    /// Declared dependencies, `None` when the condition must run on every change
    pub fn deps(&self) -> Option<&[String]> {
        self.deps.as_deref()
    }

    pub fn evaluate(&self, facts: &Facts) -> anyhow::Result<ConditionResult> {
        (self.eval)(facts)
    }

    fn from_parts<F>(eval: F, deps: Option<Vec<String>>) -> Self
    where
        F: Fn(&Facts) -> anyhow::Result<ConditionResult> + Send + Sync + 'static,
    {
        Self {
            eval: Arc::new(eval),
            deps,
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}

/// Accessor for a fact addressed by dotted path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactRef {
    path: String,
    deps: Vec<String>,
}

impl FactRef {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        // Writing any ancestor can change what the leaf resolves to
        let deps = path::prefixes(&path);
        Self { path, deps }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Every prefix path of the accessed path
    pub fn deps(&self) -> &[String] {
        &self.deps
    }

    pub fn resolve<'a>(&self, facts: &'a Facts) -> Option<&'a Value> {
        facts.get(&self.path)
    }
}

/// Build an accessor for the fact at `path`
pub fn fact_of(path: impl Into<String>) -> FactRef {
    FactRef::new(path)
}

/// Comparison operand: a fact accessor or a literal value
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Fact(FactRef),
    Literal(Value),
}

impl Operand {
    pub fn resolve<'a>(&'a self, facts: &'a Facts) -> Option<&'a Value> {
        match self {
            Operand::Fact(fact) => fact.resolve(facts),
            Operand::Literal(value) => Some(value),
        }
    }

    pub fn deps(&self) -> &[String] {
        match self {
            Operand::Fact(fact) => fact.deps(),
            Operand::Literal(_) => &[],
        }
    }
}

impl From<FactRef> for Operand {
    fn from(fact: FactRef) -> Self {
        Operand::Fact(fact)
    }
}

macro_rules! literal_operand {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Operand {
                fn from(value: $ty) -> Self {
                    Operand::Literal(Value::from(value))
                }
            }
        )*
    };
}

literal_operand!(Value, bool, i32, i64, u32, u64, f64, String, &str);

/// True once every component is true
///
/// Dependencies are the ordered union of the components' dependencies; if
/// any component has none declared, neither does the result.
pub fn and<I>(conditions: I) -> Condition
where
    I: IntoIterator<Item = Condition>,
{
    let conditions: Vec<Condition> = conditions.into_iter().collect();
    let deps = union_condition_deps(&conditions);

    Condition::from_parts(
        move |facts| {
            let mut pending = Vec::new();
            for condition in &conditions {
                match condition.evaluate(facts)? {
                    ConditionResult::Immediate(false) => return Ok(false.into()),
                    ConditionResult::Immediate(true) => {},
                    ConditionResult::Deferred(future) => pending.push(future),
                }
            }
            if pending.is_empty() {
                return Ok(true.into());
            }
            Ok(ConditionResult::deferred(async move {
                let results = resolve_components(pending).await;
                anyhow::Ok(results.into_iter().all(|r| r))
            }))
        },
        deps,
    )
}

/// True once at least one component is true
pub fn or<I>(conditions: I) -> Condition
where
    I: IntoIterator<Item = Condition>,
{
    let conditions: Vec<Condition> = conditions.into_iter().collect();
    let deps = union_condition_deps(&conditions);

    Condition::from_parts(
        move |facts| {
            let mut pending = Vec::new();
            for condition in &conditions {
                match condition.evaluate(facts)? {
                    ConditionResult::Immediate(true) => return Ok(true.into()),
                    ConditionResult::Immediate(false) => {},
                    ConditionResult::Deferred(future) => pending.push(future),
                }
            }
            if pending.is_empty() {
                return Ok(false.into());
            }
            Ok(ConditionResult::deferred(async move {
                let results = resolve_components(pending).await;
                anyhow::Ok(results.into_iter().any(|r| r))
            }))
        },
        deps,
    )
}

pub fn eq(left: impl Into<Operand>, right: impl Into<Operand>) -> Condition {
    comparison(left.into(), right.into(), value::strict_eq)
}

pub fn neq(left: impl Into<Operand>, right: impl Into<Operand>) -> Condition {
    comparison(left.into(), right.into(), |a, b| !value::strict_eq(a, b))
}

pub fn gt(left: impl Into<Operand>, right: impl Into<Operand>) -> Condition {
    comparison(left.into(), right.into(), |a, b| {
        value::compare(a, b) == Some(Ordering::Greater)
    })
}

pub fn lt(left: impl Into<Operand>, right: impl Into<Operand>) -> Condition {
    comparison(left.into(), right.into(), |a, b| {
        value::compare(a, b) == Some(Ordering::Less)
    })
}

pub fn gte(left: impl Into<Operand>, right: impl Into<Operand>) -> Condition {
    comparison(left.into(), right.into(), |a, b| {
        matches!(value::compare(a, b), Some(Ordering::Greater | Ordering::Equal))
    })
}

pub fn lte(left: impl Into<Operand>, right: impl Into<Operand>) -> Condition {
    comparison(left.into(), right.into(), |a, b| {
        matches!(value::compare(a, b), Some(Ordering::Less | Ordering::Equal))
    })
}

/// True when the operand is truthy (see [`value::truthy`])
pub fn truthy(operand: impl Into<Operand>) -> Condition {
    let operand = operand.into();
    let deps = non_empty(operand.deps().to_vec());
    Condition::from_parts(
        move |facts| Ok(value::truthy(operand.resolve(facts)).into()),
        deps,
    )
}

fn comparison(
    left: Operand,
    right: Operand,
    test: fn(Option<&Value>, Option<&Value>) -> bool,
) -> Condition {
    let mut deps = Vec::new();
    for dep in left.deps().iter().chain(right.deps()) {
        push_unique(&mut deps, dep.clone());
    }

    Condition::from_parts(
        move |facts| Ok(test(left.resolve(facts), right.resolve(facts)).into()),
        non_empty(deps),
    )
}

/// Await deferred components; a rejected component counts as `false`
async fn resolve_components(pending: Vec<ConditionFuture>) -> Vec<bool> {
    join_all(pending)
        .await
        .into_iter()
        .map(|outcome| {
            outcome.unwrap_or_else(|e| {
                warn!("Deferred component rejected, treating as false: {}", e);
                false
            })
        })
        .collect()
}

fn union_condition_deps(conditions: &[Condition]) -> Option<Vec<String>> {
    let mut deps = Vec::new();
    for condition in conditions {
        for dep in condition.deps()? {
            push_unique(&mut deps, dep.clone());
        }
    }
    non_empty(deps)
}

fn push_unique(deps: &mut Vec<String>, dep: String) {
    if !deps.contains(&dep) {
        deps.push(dep);
    }
}

/// Literal-only conditions declare nothing and run on every change
fn non_empty(deps: Vec<String>) -> Option<Vec<String>> {
    if deps.is_empty() {
        None
    } else {
        Some(deps)
    }
}
