//! Boolean condition expressions for conditional branches.
//!
//! Grounded on the donor's `ConditionEvaluator` (single comparison,
//! left-side variable lookup, numeric-or-string compare) with `AND`/`OR`
//! chaining added per SPEC_FULL §9 open question 7: the donor only ever
//! evaluates one comparison, never a chain.

use crate::error::SequenceError;
use crate::sequence::context::ExecutionContext;

const TWO_CHAR_OPS: [&str; 4] = ["==", "!=", ">=", "<="];
const ONE_CHAR_OPS: [&str; 2] = [">", "<"];

/// Evaluate a condition expression against `context`. Supports `AND`/`OR`
/// chaining of single comparisons, `AND` binding tighter than `OR`
/// (i.e. `a OR b AND c` is `a OR (b AND c)`), left to right.
pub fn evaluate(expression: &str, context: &ExecutionContext) -> Result<bool, SequenceError> {
    let or_terms: Vec<&str> = split_top_level(expression, "OR");
    for term in or_terms {
        let and_terms: Vec<&str> = split_top_level(term, "AND");
        let mut all_true = true;
        for clause in &and_terms {
            if !evaluate_comparison(clause, context)? {
                all_true = false;
                break;
            }
        }
        if all_true {
            return Ok(true);
        }
    }
    Ok(false)
}

fn split_top_level<'a>(expr: &'a str, keyword: &str) -> Vec<&'a str> {
    let pattern = format!(" {keyword} ");
    if expr.contains(&pattern) {
        expr.split(&pattern).collect()
    } else {
        vec![expr]
    }
}

fn evaluate_comparison(expression: &str, context: &ExecutionContext) -> Result<bool, SequenceError> {
    let expr = expression.trim();

    let mut op = "";
    let mut op_pos = None;
    for candidate in TWO_CHAR_OPS {
        if let Some(pos) = expr.find(candidate) {
            op = candidate;
            op_pos = Some(pos);
            break;
        }
    }
    if op.is_empty() {
        for candidate in ONE_CHAR_OPS {
            if let Some(pos) = expr.find(candidate) {
                op = candidate;
                op_pos = Some(pos);
                break;
            }
        }
    }

    let Some(pos) = op_pos else {
        return Err(SequenceError::InvalidCondition(expression.to_string()));
    };

    let left = expr[..pos].trim();
    let right = expr[pos + op.len()..].trim();

    let left_value = match context.get_variable(left) {
        Some(v) => v.as_condition_string(),
        None => left.to_string(),
    };

    if is_number(&left_value) && is_number(right) {
        Ok(compare_numbers(&left_value, op, right))
    } else {
        Ok(compare_strings(&left_value, op, right))
    }
}

fn compare_strings(left: &str, op: &str, right: &str) -> bool {
    match op {
        "==" => left == right,
        "!=" => left != right,
        ">" => left > right,
        "<" => left < right,
        ">=" => left >= right,
        "<=" => left <= right,
        _ => false,
    }
}

fn compare_numbers(left: &str, op: &str, right: &str) -> bool {
    let Ok(l) = left.parse::<f64>() else { return false };
    let Ok(r) = right.parse::<f64>() else { return false };
    match op {
        "==" => (l - r).abs() < 1e-9,
        "!=" => (l - r).abs() >= 1e-9,
        ">" => l > r,
        "<" => l < r,
        ">=" => l >= r,
        "<=" => l <= r,
        _ => false,
    }
}

fn is_number(s: &str) -> bool {
    !s.is_empty() && s.trim().parse::<f64>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::context::Value;

    fn ctx_with(vars: &[(&str, Value)]) -> ExecutionContext {
        let ctx = ExecutionContext::new("exec-1");
        for (name, value) in vars {
            ctx.set_variable(*name, value.clone());
        }
        ctx
    }

    #[test]
    fn numeric_comparison() {
        let ctx = ctx_with(&[("battery", Value::Int(42))]);
        assert!(evaluate("battery > 10", &ctx).unwrap());
        assert!(!evaluate("battery < 10", &ctx).unwrap());
        assert!(evaluate("battery == 42", &ctx).unwrap());
    }

    #[test]
    fn string_comparison() {
        let ctx = ctx_with(&[("mode", Value::String("AUTO".to_string()))]);
        assert!(evaluate("mode == AUTO", &ctx).unwrap());
        assert!(!evaluate("mode == MANUAL", &ctx).unwrap());
    }

    #[test]
    fn and_or_chaining_left_to_right_and_binds_tighter() {
        let ctx = ctx_with(&[("a", Value::Int(1)), ("b", Value::Int(2)), ("c", Value::Int(3))]);
        // a==1 OR (b==0 AND c==0) -> true via the first disjunct
        assert!(evaluate("a == 1 OR b == 0 AND c == 0", &ctx).unwrap());
        // a==0 OR (b==2 AND c==3) -> true via the second disjunct
        assert!(evaluate("a == 0 OR b == 2 AND c == 3", &ctx).unwrap());
        // a==0 OR (b==2 AND c==0) -> false
        assert!(!evaluate("a == 0 OR b == 2 AND c == 0", &ctx).unwrap());
    }

    #[test]
    fn unresolved_variable_is_treated_as_literal() {
        let ctx = ExecutionContext::new("exec-1");
        assert!(evaluate("unknown == unknown", &ctx).unwrap());
    }

    #[test]
    fn missing_operator_is_an_error() {
        let ctx = ExecutionContext::new("exec-1");
        assert!(evaluate("no operator here", &ctx).is_err());
    }
}
