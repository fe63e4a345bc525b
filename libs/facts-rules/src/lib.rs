//! Facts Rules - Forward-Chaining Rules Engine
//!
//! A rules engine over a hierarchical fact store providing:
//! - Dotted-path facts with tolerant reads and pruning writes
//! - Condition combinators that declare the facts they depend on
//! - Edge-triggered firing: an action runs when its condition becomes true
//! - Re-entrant assertions from actions, queued and drained to a fixpoint
//! - Rollback of the whole store when an action or condition fails
//! - Deferred (async) conditions resolved out of band
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐  set_fact  ┌──────────────┐  evaluate  ┌─────────────┐
//! │   Caller    │───────────▶│ RulesEngine  │───────────▶│   RuleSet   │
//! │             │◀───────────│ (fire cycle) │◀───────────│ (dep gate)  │
//! └─────────────┘   events   └──────────────┘   actions  └─────────────┘
//!                                   │                           │
//!                                   ▼                           ▼
//!                            ┌─────────────┐            ┌──────────────┐
//!                            │    Facts    │◀───────────│  Conditions  │
//!                            │ (path tree) │   fact_of  │ (and/or/cmp) │
//!                            └─────────────┘            └──────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use facts_rules::{fact_of, gt, Action, Rule, RuleSet, RulesEngine};
//!
//! let rules = RuleSet::with_rules([
//!     Rule::new("x > 2", gt(fact_of("x"), 2), Action::set_fact("y", 10)),
//!     Rule::new("y > 9", gt(fact_of("y"), 9), Action::set_fact("z", 20)),
//! ]);
//! let mut engine = RulesEngine::with_facts(rules, [("x", 1), ("y", 1)]).unwrap();
//!
//! assert!(engine.set_fact("x", 3).unwrap());
//! assert_eq!(engine.fact("z"), Some(&serde_json::json!(20)));
//! ```

pub mod condition;
pub mod definition;
mod engine;
mod error;
mod events;
mod facts;
pub mod path;
mod rule_set;
pub mod value;

// Re-export public API
pub use condition::{
    and, eq, fact_of, gt, gte, lt, lte, neq, or, truthy, Condition, ConditionFuture,
    ConditionResult, FactRef, Operand,
};
pub use definition::{ActionDef, ConditionDef, OperandDef, RuleDef, RuleFileDef};
pub use engine::{EngineConfig, RulesEngine, Statistics, DEFAULT_MAX_PASSES};
pub use error::{Result, RuleError};
pub use events::{EngineEvent, EventKind, ListenerId};
pub use facts::{ChangeSet, Facts};
pub use rule_set::{Action, RegisteredRule, Rule, RuleId, RuleSet};
