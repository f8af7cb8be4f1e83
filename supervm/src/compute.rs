/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Closed compute operation set and the kernels that execute it.
//!
//! Compute workloads carry one of exactly four operations: `sort`,
//! `filter`, `map`, or `reduce`.  Each is a statically dispatched kernel
//! over JSON numbers.  Dynamic user code (predicates, expressions,
//! callables) is not representable here: anything outside this enumeration
//! fails deserialisation or [`ComputeOp::from_request`] and is rejected at
//! the API boundary as a validation error.
//!
//! The kernels live in the scheduler crate so that the worker simulator and
//! the test fakes execute exactly the operations validation admits.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

// ── Operation enumeration ─────────────────────────────────────────────────────

/// Comparison operator for `filter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

/// Element transform for `map`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    Add,
    Sub,
    Mul,
    Div,
}

/// Fold operator for `reduce`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fold {
    Sum,
    Product,
    Min,
    Max,
}

/// One compute operation, fully parameterised.
///
/// Serialises tagged (`{"op": "filter", "cmp": "gt", "value": 5.0}`) so the
/// worker wire format is self-describing and unknown operations cannot be
/// deserialised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ComputeOp {
    /// Sort the chunk ascending by numeric value.
    Sort,
    /// Keep elements where `element <cmp> value` holds.
    Filter { cmp: Comparison, value: f64 },
    /// Replace each element with `element <transform> value`.
    Map { transform: Transform, value: f64 },
    /// Fold the chunk into a single value starting from `seed`.
    Reduce { fold: Fold, seed: f64 },
}

impl ComputeOp {
    /// Parse the API request form: an operation name plus a loose
    /// `parameters` object.
    ///
    /// This is the gate that closes the operation set.  Unknown names,
    /// missing parameters, and non-numeric parameter values are all
    /// rejected with a message suitable for a 400 response.
    pub fn from_request(
        operation: &str,
        parameters: &serde_json::Map<String, Value>,
    ) -> Result<Self, String> {
        match operation {
            "sort" => Ok(ComputeOp::Sort),
            "filter" => {
                let cmp = named_op::<Comparison>(parameters, "filter")?;
                let value = required_number(parameters, "value", "filter")?;
                Ok(ComputeOp::Filter { cmp, value })
            }
            "map" => {
                let transform = named_op::<Transform>(parameters, "map")?;
                let value = required_number(parameters, "value", "map")?;
                Ok(ComputeOp::Map { transform, value })
            }
            "reduce" => {
                let fold = named_op::<Fold>(parameters, "reduce")?;
                let seed = match parameters.get("seed") {
                    Some(v) => v
                        .as_f64()
                        .ok_or_else(|| String::from("reduce parameter 'seed' must be a number"))?,
                    None => default_seed(fold),
                };
                Ok(ComputeOp::Reduce { fold, seed })
            }
            other => Err(format!(
                "unknown compute operation: '{other}' (valid: sort, filter, map, reduce)"
            )),
        }
    }
}

/// Fold-specific identity used when the request omits `seed`.
fn default_seed(fold: Fold) -> f64 {
    match fold {
        Fold::Sum => 0.0,
        Fold::Product => 1.0,
        Fold::Min => f64::INFINITY,
        Fold::Max => f64::NEG_INFINITY,
    }
}

fn named_op<T: for<'de> Deserialize<'de>>(
    parameters: &serde_json::Map<String, Value>,
    operation: &str,
) -> Result<T, String> {
    let raw = parameters
        .get("op")
        .ok_or_else(|| format!("{operation} requires an 'op' parameter"))?;
    serde_json::from_value(raw.clone())
        .map_err(|_| format!("{operation} parameter 'op' has an unsupported value: {raw}"))
}

fn required_number(
    parameters: &serde_json::Map<String, Value>,
    key: &str,
    operation: &str,
) -> Result<f64, String> {
    parameters
        .get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| format!("{operation} requires a numeric '{key}' parameter"))
}

// ── Validation ────────────────────────────────────────────────────────────────

/// Checks that every element of a compute input is a JSON number.
///
/// The closed kernel set is total over numbers only; rejecting anything
/// else here keeps the kernels free of per-element error paths.
pub fn validate_numeric(input: &[Value]) -> Result<(), String> {
    for (i, v) in input.iter().enumerate() {
        if v.as_f64().is_none() {
            return Err(format!(
                "inputData[{i}] is not a number (compute operations accept numeric data only)"
            ));
        }
    }
    Ok(())
}

// ── Kernels ───────────────────────────────────────────────────────────────────

/// Execute `op` over one chunk of numeric values.
///
/// Callers guarantee numeric input via [`validate_numeric`]; any stray
/// non-numeric element is treated as zero rather than panicking.
pub fn apply(op: &ComputeOp, data: &[Value]) -> Vec<Value> {
    match op {
        ComputeOp::Sort => {
            let mut out = data.to_vec();
            out.sort_by(|a, b| {
                num(a)
                    .partial_cmp(&num(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            out
        }
        ComputeOp::Filter { cmp, value } => data
            .iter()
            .filter(|v| compare(num(v), *cmp, *value))
            .cloned()
            .collect(),
        ComputeOp::Map { transform, value } => data
            .iter()
            .map(|v| to_number(transform_value(num(v), *transform, *value)))
            .collect(),
        ComputeOp::Reduce { fold, seed } => {
            let folded = data
                .iter()
                .map(num)
                .fold(*seed, |acc, v| fold_value(acc, *fold, v));
            vec![to_number(folded)]
        }
    }
}

fn num(v: &Value) -> f64 {
    v.as_f64().unwrap_or(0.0)
}

fn compare(lhs: f64, cmp: Comparison, rhs: f64) -> bool {
    match cmp {
        Comparison::Gt => lhs > rhs,
        Comparison::Ge => lhs >= rhs,
        Comparison::Lt => lhs < rhs,
        Comparison::Le => lhs <= rhs,
        Comparison::Eq => lhs == rhs,
        Comparison::Ne => lhs != rhs,
    }
}

fn transform_value(lhs: f64, transform: Transform, rhs: f64) -> f64 {
    match transform {
        Transform::Add => lhs + rhs,
        Transform::Sub => lhs - rhs,
        Transform::Mul => lhs * rhs,
        Transform::Div => lhs / rhs,
    }
}

fn fold_value(acc: f64, fold: Fold, v: f64) -> f64 {
    match fold {
        Fold::Sum => acc + v,
        Fold::Product => acc * v,
        Fold::Min => acc.min(v),
        Fold::Max => acc.max(v),
    }
}

/// Render a kernel result as JSON, preferring integer representation when
/// the value is integral so `[5, 2] + 1` reads `[6, 3]` rather than
/// `[6.0, 3.0]`.
fn to_number(v: f64) -> Value {
    if v.is_finite() && v.fract() == 0.0 && v.abs() <= i64::MAX as f64 {
        Value::Number(Number::from(v as i64))
    } else {
        Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(raw: &[i64]) -> Vec<Value> {
        raw.iter().map(|&v| json!(v)).collect()
    }

    // ── from_request ──────────────────────────────────────────────────────────

    #[test]
    fn sort_parses_without_parameters() {
        let op = ComputeOp::from_request("sort", &serde_json::Map::new()).unwrap();
        assert_eq!(op, ComputeOp::Sort);
    }

    #[test]
    fn filter_parses_op_and_value() {
        let params = json!({"op": "gt", "value": 5}).as_object().unwrap().clone();
        let op = ComputeOp::from_request("filter", &params).unwrap();
        assert_eq!(
            op,
            ComputeOp::Filter {
                cmp: Comparison::Gt,
                value: 5.0
            }
        );
    }

    #[test]
    fn reduce_seed_defaults_per_fold() {
        let params = json!({"op": "product"}).as_object().unwrap().clone();
        let op = ComputeOp::from_request("reduce", &params).unwrap();
        assert_eq!(
            op,
            ComputeOp::Reduce {
                fold: Fold::Product,
                seed: 1.0
            }
        );
    }

    #[test]
    fn unknown_operation_is_rejected() {
        let err = ComputeOp::from_request("eval", &serde_json::Map::new()).unwrap_err();
        assert!(err.contains("unknown compute operation"), "got: {err}");
    }

    #[test]
    fn dynamic_predicate_is_rejected() {
        // The historical client sent JS arrow functions as the filter op.
        let params = json!({"op": "x => x > 5", "value": 5})
            .as_object()
            .unwrap()
            .clone();
        assert!(ComputeOp::from_request("filter", &params).is_err());
    }

    #[test]
    fn filter_without_value_is_rejected() {
        let params = json!({"op": "gt"}).as_object().unwrap().clone();
        assert!(ComputeOp::from_request("filter", &params).is_err());
    }

    // ── validate_numeric ──────────────────────────────────────────────────────

    #[test]
    fn numeric_input_passes_validation() {
        assert!(validate_numeric(&values(&[1, 2, 3])).is_ok());
    }

    #[test]
    fn string_element_fails_validation_with_index() {
        let input = vec![json!(1), json!("two"), json!(3)];
        let err = validate_numeric(&input).unwrap_err();
        assert!(err.contains("inputData[1]"), "got: {err}");
    }

    // ── Kernels ───────────────────────────────────────────────────────────────

    #[test]
    fn sort_orders_ascending_and_preserves_integer_repr() {
        let out = apply(&ComputeOp::Sort, &values(&[5, 2, 8, 1, 9, 3, 7, 4, 6]));
        assert_eq!(out, values(&[1, 2, 3, 4, 5, 6, 7, 8, 9]));
    }

    #[test]
    fn filter_keeps_matching_elements_in_order() {
        let op = ComputeOp::Filter {
            cmp: Comparison::Ge,
            value: 4.0,
        };
        assert_eq!(op_result(&op, &[5, 2, 8, 1, 4]), values(&[5, 8, 4]));
    }

    #[test]
    fn map_add_produces_integers_for_integral_results() {
        let op = ComputeOp::Map {
            transform: Transform::Add,
            value: 1.0,
        };
        assert_eq!(op_result(&op, &[1, 2, 3]), values(&[2, 3, 4]));
    }

    #[test]
    fn map_div_produces_floats_when_not_integral() {
        let op = ComputeOp::Map {
            transform: Transform::Div,
            value: 2.0,
        };
        let out = op_result(&op, &[3]);
        assert_eq!(out, vec![json!(1.5)]);
    }

    #[test]
    fn reduce_sum_folds_to_single_value() {
        let op = ComputeOp::Reduce {
            fold: Fold::Sum,
            seed: 0.0,
        };
        assert_eq!(op_result(&op, &[1, 2, 3, 4]), values(&[10]));
    }

    #[test]
    fn reduce_min_uses_seed_identity() {
        let op = ComputeOp::Reduce {
            fold: Fold::Min,
            seed: f64::INFINITY,
        };
        assert_eq!(op_result(&op, &[7, 3, 9]), values(&[3]));
    }

    #[test]
    fn reduce_on_empty_chunk_returns_seed() {
        let op = ComputeOp::Reduce {
            fold: Fold::Sum,
            seed: 0.0,
        };
        assert_eq!(apply(&op, &[]), values(&[0]));
    }

    fn op_result(op: &ComputeOp, raw: &[i64]) -> Vec<Value> {
        apply(op, &values(raw))
    }

    // ── Wire format ───────────────────────────────────────────────────────────

    #[test]
    fn compute_op_round_trips_through_json() {
        let op = ComputeOp::Filter {
            cmp: Comparison::Lt,
            value: 2.5,
        };
        let encoded = serde_json::to_string(&op).unwrap();
        assert!(encoded.contains("\"op\":\"filter\""), "got: {encoded}");
        let decoded: ComputeOp = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, op);
    }

    #[test]
    fn unknown_op_tag_fails_deserialisation() {
        let raw = r#"{"op": "exec", "code": "rm -rf /"}"#;
        assert!(serde_json::from_str::<ComputeOp>(raw).is_err());
    }
}
