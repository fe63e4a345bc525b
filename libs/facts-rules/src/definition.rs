//! Declarative rule definitions
//!
//! Rule sets and initial facts can be described as YAML or JSON and turned
//! into a [`RuleSet`] plus an ordered list of seed facts:
//!
//! ```yaml
//! facts:
//!   x: 1
//! rules:
//!   - name: x above two
//!     when: { gt: [ { fact: x }, 2 ] }
//!     then:
//!       - set: { path: y, value: 10 }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::condition::{self, fact_of, Condition, Operand};
use crate::error::{Result, RuleError};
use crate::rule_set::{Action, Rule, RuleSet};

/// Rule file: seed facts plus rule definitions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleFileDef {
    /// Seed facts, asserted in document order
    #[serde(default)]
    pub facts: Map<String, Value>,

    #[serde(default)]
    pub rules: Vec<RuleDef>,
}

/// Single rule definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDef {
    pub name: String,

    /// Condition
    pub when: ConditionDef,

    /// Actions, run in order when the condition becomes true
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub then: Vec<ActionDef>,
}

/// Condition expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionDef {
    And(Vec<ConditionDef>),
    Or(Vec<ConditionDef>),
    Eq(OperandDef, OperandDef),
    Neq(OperandDef, OperandDef),
    Gt(OperandDef, OperandDef),
    Lt(OperandDef, OperandDef),
    Gte(OperandDef, OperandDef),
    Lte(OperandDef, OperandDef),
    Truthy(OperandDef),
}

/// Comparison operand: `{ fact: path }` or any literal value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperandDef {
    Fact { fact: String },
    Literal(Value),
}

/// Rule action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionDef {
    /// Assert `value` at `path`
    Set { path: String, value: Value },
    /// Fail with `message`, rolling back the triggering assertion
    Fail(String),
}

impl RuleFileDef {
    /// Parse YAML, accepting `{ gt: [...] }` style single-key maps for
    /// operators and actions instead of `!gt` tags
    pub fn from_yaml_str(source: &str) -> Result<Self> {
        let deserializer = serde_yaml::Deserializer::from_str(source);
        Ok(serde_yaml::with::singleton_map_recursive::deserialize(deserializer)?)
    }

    pub fn from_json_str(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// Load a rule file, choosing the format by extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            RuleError::definition(format!("Failed to read {}: {}", path.display(), e))
        })?;

        match path.extension().and_then(|s| s.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml_str(&source),
            Some("json") => Self::from_json_str(&source),
            other => Err(RuleError::definition(format!(
                "Unsupported rule file format: {}",
                other.unwrap_or("<none>")
            ))),
        }
    }

    /// Compile into a rule set and the seed facts in document order
    pub fn into_parts(self) -> Result<(RuleSet, Vec<(String, Value)>)> {
        let rules = self
            .rules
            .into_iter()
            .map(RuleDef::into_rule)
            .collect::<Result<Vec<_>>>()?;
        Ok((RuleSet::with_rules(rules), self.facts.into_iter().collect()))
    }
}

impl RuleDef {
    pub fn into_rule(self) -> Result<Rule> {
        let condition = self
            .when
            .compile()
            .map_err(|e| RuleError::definition(format!("rule '{}': {}", self.name, e)))?;
        let action = compile_actions(self.then);
        Ok(Rule::new(self.name, condition, action))
    }
}

impl ConditionDef {
    pub fn compile(&self) -> std::result::Result<Condition, String> {
        Ok(match self {
            ConditionDef::And(parts) => condition::and(compile_all(parts, "and")?),
            ConditionDef::Or(parts) => condition::or(compile_all(parts, "or")?),
            ConditionDef::Eq(l, r) => condition::eq(l.to_operand(), r.to_operand()),
            ConditionDef::Neq(l, r) => condition::neq(l.to_operand(), r.to_operand()),
            ConditionDef::Gt(l, r) => condition::gt(l.to_operand(), r.to_operand()),
            ConditionDef::Lt(l, r) => condition::lt(l.to_operand(), r.to_operand()),
            ConditionDef::Gte(l, r) => condition::gte(l.to_operand(), r.to_operand()),
            ConditionDef::Lte(l, r) => condition::lte(l.to_operand(), r.to_operand()),
            ConditionDef::Truthy(operand) => condition::truthy(operand.to_operand()),
        })
    }
}

fn compile_all(parts: &[ConditionDef], op: &str) -> std::result::Result<Vec<Condition>, String> {
    if parts.is_empty() {
        return Err(format!("'{}' needs at least one condition", op));
    }
    parts.iter().map(ConditionDef::compile).collect()
}

impl OperandDef {
    pub fn to_operand(&self) -> Operand {
        match self {
            OperandDef::Fact { fact } => fact_of(fact.as_str()).into(),
            OperandDef::Literal(value) => Operand::Literal(value.clone()),
        }
    }
}

fn compile_actions(actions: Vec<ActionDef>) -> Action {
    Action::new(move |engine| {
        for action in &actions {
            match action {
                ActionDef::Set { path, value } => {
                    engine.set_fact(path, value.clone())?;
                },
                ActionDef::Fail(message) => anyhow::bail!("{}", message),
            }
        }
        Ok(())
    })
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::engine::RulesEngine;
    use serde_json::json;
    use std::io::Write;

    const CASCADE_YAML: &str = r#"
facts:
  x: 1
  y: 1
rules:
  - name: x above two
    when: { gt: [ { fact: x }, 2 ] }
    then:
      - set: { path: y, value: 10 }
  - name: y above nine
    when:
      and:
        - gt: [ { fact: y }, 9 ]
        - truthy: { fact: x }
    then:
      - set: { path: z, value: 20 }
"#;

    #[test]
    fn test_parse_yaml() {
        let def = RuleFileDef::from_yaml_str(CASCADE_YAML).unwrap();
        assert_eq!(def.rules.len(), 2);
        assert_eq!(
            def.rules[0].when,
            ConditionDef::Gt(
                OperandDef::Fact {
                    fact: "x".to_string()
                },
                OperandDef::Literal(json!(2))
            )
        );
        assert_eq!(
            def.rules[0].then,
            vec![ActionDef::Set {
                path: "y".to_string(),
                value: json!(10)
            }]
        );
        assert_eq!(def.facts.keys().collect::<Vec<_>>(), vec!["x", "y"]);
    }

    #[test]
    fn test_compiled_rules_cascade() {
        let (rules, facts) = RuleFileDef::from_yaml_str(CASCADE_YAML)
            .unwrap()
            .into_parts()
            .unwrap();
        let deps: Vec<_> = rules
            .iter()
            .map(|r| r.condition().deps().map(<[String]>::to_vec))
            .collect();
        assert_eq!(
            deps,
            vec![
                Some(vec!["x".to_string()]),
                Some(vec!["y".to_string(), "x".to_string()])
            ]
        );

        let mut engine = RulesEngine::with_facts(rules, facts).unwrap();
        engine.set_fact("x", 3).unwrap();
        assert_eq!(engine.fact("z"), Some(&json!(20)));
    }

    #[test]
    fn test_parse_yaml_block_style_actions() {
        let def = RuleFileDef::from_yaml_str(
            r#"
rules:
  - name: guard
    when:
      or:
        - lte: [ { fact: x }, 0 ]
        - eq: [ { fact: mode }, off ]
    then:
      - set:
          path: alarm
          value: true
      - fail: stop here
"#,
        )
        .unwrap();
        assert_eq!(
            def.rules[0].then,
            vec![
                ActionDef::Set {
                    path: "alarm".to_string(),
                    value: json!(true)
                },
                ActionDef::Fail("stop here".to_string())
            ]
        );
        assert!(matches!(def.rules[0].when, ConditionDef::Or(ref parts) if parts.len() == 2));
    }

    #[test]
    fn test_parse_json_with_fail_action() {
        let def = RuleFileDef::from_json_str(
            r#"{
                "facts": { "x": 1 },
                "rules": [
                    { "name": "guard", "when": { "gte": [ { "fact": "x" }, 5 ] }, "then": [ { "fail": "x too large" } ] }
                ]
            }"#,
        )
        .unwrap();
        let (rules, facts) = def.into_parts().unwrap();
        let mut engine = RulesEngine::with_facts(rules, facts).unwrap();

        let err = engine.set_fact("x", 5).unwrap_err();
        assert!(err.to_string().contains("x too large"));
        assert_eq!(engine.fact("x"), Some(&json!(1)));
    }

    #[test]
    fn test_empty_and_rejected() {
        let def = RuleFileDef::from_yaml_str(
            r#"
rules:
  - name: empty
    when: { and: [] }
"#,
        )
        .unwrap();
        let err = def.into_parts().unwrap_err();
        assert!(matches!(err, RuleError::Definition(ref msg) if msg.contains("empty")));
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let err = RuleFileDef::from_yaml_str(
            r#"
rules:
  - name: bad
    when: { approx: [ { fact: x }, 1 ] }
"#,
        )
        .unwrap_err();
        assert!(matches!(err, RuleError::Serialization(_)));
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let yaml_path = dir.path().join("rules.yaml");
        std::fs::File::create(&yaml_path)
            .unwrap()
            .write_all(CASCADE_YAML.as_bytes())
            .unwrap();
        assert_eq!(RuleFileDef::load(&yaml_path).unwrap().rules.len(), 2);

        let txt_path = dir.path().join("rules.txt");
        std::fs::write(&txt_path, CASCADE_YAML).unwrap();
        assert!(matches!(
            RuleFileDef::load(&txt_path),
            Err(RuleError::Definition(_))
        ));
    }
}
