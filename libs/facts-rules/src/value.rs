//! Comparison and truthiness semantics for fact values
//!
//! `None` stands for an undefined fact. Numbers compare by numeric value
//! regardless of their integer/float representation.

use serde_json::{Number, Value};
use std::cmp::Ordering;

/// Strict equality between two possibly-undefined values
pub fn strict_eq(left: Option<&Value>, right: Option<&Value>) -> bool {
    match (left, right) {
        (None, None) => true,
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            compare_numbers(a, b) == Some(Ordering::Equal)
        },
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Ordering between two values, if they are comparable
///
/// Numbers order numerically, strings lexicographically and booleans with
/// `false < true`. Any other pairing, including undefined, is unordered.
pub fn compare(left: Option<&Value>, right: Option<&Value>) -> Option<Ordering> {
    match (left?, right?) {
        (Value::Number(a), Value::Number(b)) => compare_numbers(a, b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Integers of the same signedness compare exactly; anything else goes
/// through `f64`
fn compare_numbers(a: &Number, b: &Number) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        return Some(a.cmp(&b));
    }
    if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
        return Some(a.cmp(&b));
    }
    a.as_f64()?.partial_cmp(&b.as_f64()?)
}

/// Boolean coercion: undefined, `null`, `false`, `0`, `NaN` and `""` are false
pub fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strict_eq_numbers_ignore_representation() {
        assert!(strict_eq(Some(&json!(1)), Some(&json!(1.0))));
        assert!(!strict_eq(Some(&json!(1)), Some(&json!(2))));
    }

    #[test]
    fn test_strict_eq_no_coercion() {
        assert!(!strict_eq(Some(&json!(1)), Some(&json!("1"))));
        assert!(!strict_eq(Some(&json!(0)), Some(&json!(false))));
        assert!(!strict_eq(None, Some(&Value::Null)));
        assert!(strict_eq(None, None));
    }

    #[test]
    fn test_large_integers_compare_exactly() {
        let below = json!(9_007_199_254_740_992_i64); // 2^53
        let above = json!(9_007_199_254_740_993_i64);
        assert!(!strict_eq(Some(&below), Some(&above)));
        assert_eq!(compare(Some(&above), Some(&below)), Some(Ordering::Greater));
        assert_eq!(compare(Some(&below), Some(&above)), Some(Ordering::Less));

        let huge = json!(u64::MAX);
        let almost = json!(u64::MAX - 1);
        assert!(!strict_eq(Some(&huge), Some(&almost)));
        assert_eq!(compare(Some(&huge), Some(&almost)), Some(Ordering::Greater));

        // Mixed signedness and floats still compare by value
        assert_eq!(compare(Some(&json!(-1)), Some(&huge)), Some(Ordering::Less));
        assert!(strict_eq(Some(&json!(3)), Some(&json!(3.0))));
    }

    #[test]
    fn test_compare() {
        assert_eq!(compare(Some(&json!(3)), Some(&json!(2.5))), Some(Ordering::Greater));
        assert_eq!(compare(Some(&json!("abc")), Some(&json!("abd"))), Some(Ordering::Less));
        assert_eq!(compare(Some(&json!(true)), Some(&json!(false))), Some(Ordering::Greater));
        assert_eq!(compare(Some(&json!(3)), Some(&json!("3"))), None);
        assert_eq!(compare(None, Some(&json!(3))), None);
    }

    #[test]
    fn test_truthy() {
        assert!(!truthy(None));
        assert!(!truthy(Some(&Value::Null)));
        assert!(!truthy(Some(&json!(0))));
        assert!(!truthy(Some(&json!(""))));
        assert!(truthy(Some(&json!(-1))));
        assert!(truthy(Some(&json!("no"))));
        assert!(truthy(Some(&json!({}))));
        assert!(truthy(Some(&json!([]))));
    }
}
