//! The step template schema (spec.md §6 "Step template schema") and the
//! condition evaluator used by `evaluateCondition` in the step contract.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepType {
    Search,
    Download,
    Encode,
    Deliver,
    Approval,
    Notification,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "SEARCH",
            Self::Download => "DOWNLOAD",
            Self::Encode => "ENCODE",
            Self::Deliver => "DELIVER",
            Self::Approval => "APPROVAL",
            Self::Notification => "NOTIFICATION",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
    In,
    NotIn,
    Contains,
    Matches,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOp {
    And,
    Or,
}

/// `ConditionRule` from spec.md §6. `field` is a dotted path evaluated
/// against the execution's JSON context (e.g. `"search.releaseId"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionRule {
    pub field: String,
    pub operator: Operator,
    pub value: serde_json::Value,
    #[serde(default)]
    pub logical_op: Option<LogicalOp>,
    #[serde(default)]
    pub conditions: Option<Vec<ConditionRule>>,
}

/// Look up a dotted path (`"a.b.c"`) inside a JSON value.
fn lookup<'a>(context: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.')
        .try_fold(context, |value, segment| value.get(segment))
}

fn compare_numbers(lhs: &serde_json::Value, rhs: &serde_json::Value) -> Option<std::cmp::Ordering> {
    let lhs = lhs.as_f64()?;
    let rhs = rhs.as_f64()?;
    lhs.partial_cmp(&rhs)
}

fn eval_single(context: &serde_json::Value, rule: &ConditionRule) -> bool {
    let actual = lookup(context, &rule.field);
    match rule.operator {
        Operator::Eq => actual == Some(&rule.value),
        Operator::Ne => actual != Some(&rule.value),
        Operator::Gt => actual
            .and_then(|a| compare_numbers(a, &rule.value))
            .is_some_and(|o| o.is_gt()),
        Operator::Lt => actual
            .and_then(|a| compare_numbers(a, &rule.value))
            .is_some_and(|o| o.is_lt()),
        Operator::Gte => actual
            .and_then(|a| compare_numbers(a, &rule.value))
            .is_some_and(|o| o.is_ge()),
        Operator::Lte => actual
            .and_then(|a| compare_numbers(a, &rule.value))
            .is_some_and(|o| o.is_le()),
        Operator::In => rule
            .value
            .as_array()
            .map(|arr| actual.is_some_and(|a| arr.contains(a)))
            .unwrap_or(false),
        Operator::NotIn => rule
            .value
            .as_array()
            .map(|arr| !actual.is_some_and(|a| arr.contains(a)))
            .unwrap_or(true),
        Operator::Contains => match actual {
            Some(serde_json::Value::Array(arr)) => arr.contains(&rule.value),
            Some(serde_json::Value::String(s)) => rule
                .value
                .as_str()
                .is_some_and(|needle| s.contains(needle)),
            _ => false,
        },
        Operator::Matches => match (actual.and_then(|v| v.as_str()), rule.value.as_str()) {
            (Some(s), Some(pattern)) => regex::Regex::new(pattern)
                .map(|re| re.is_match(s))
                .unwrap_or(false),
            _ => false,
        },
    }
}

/// Evaluate a (possibly nested) `ConditionRule` against the execution
/// context. Missing condition is handled by the caller (`evaluateCondition`
/// returns true for `None`, per spec.md §4.1).
pub fn evaluate(context: &serde_json::Value, rule: &ConditionRule) -> bool {
    let own = eval_single(context, rule);
    match &rule.conditions {
        None => own,
        Some(children) if children.is_empty() => own,
        Some(children) => {
            let mut results = children.iter().map(|c| evaluate(context, c));
            match rule.logical_op.unwrap_or(LogicalOp::And) {
                LogicalOp::And => own && results.all(|r| r),
                LogicalOp::Or => own || results.any(|r| r),
            }
        }
    }
}

fn default_true() -> bool {
    true
}

/// A node in a template's step tree (spec.md §6 "Step"). `order` is
/// unpopulated on a freshly-authored template and assigned by
/// [`assign_order`] when the tree is snapshotted into an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub order: i32,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub name: String,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub condition: Option<ConditionRule>,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub retryable: bool,
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub children: Vec<Step>,
}

/// Assign DFS pre-order indices across a step forest, matching spec.md
/// §4.2's "Create StepExecution rows in PENDING for every step in the
/// snapshot (order = DFS pre-order)".
pub fn assign_order(steps: &mut [Step], next: &mut i32) {
    for step in steps {
        step.order = *next;
        *next += 1;
        assign_order(&mut step.children, next);
    }
}

/// Flatten a step forest into a DFS pre-order list (post `assign_order`),
/// used to materialize `StepExecution` rows without walking the tree twice.
pub fn flatten(steps: &[Step]) -> Vec<&Step> {
    let mut out = Vec::new();
    fn visit<'a>(steps: &'a [Step], out: &mut Vec<&'a Step>) {
        for step in steps {
            out.push(step);
            visit(&step.children, out);
        }
    }
    visit(steps, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn eq_operator_matches_dotted_path() {
        let ctx = json!({"search": {"indexer": "nzbgeek"}});
        let rule = ConditionRule {
            field: "search.indexer".into(),
            operator: Operator::Eq,
            value: json!("nzbgeek"),
            logical_op: None,
            conditions: None,
        };
        assert!(evaluate(&ctx, &rule));
    }

    #[test]
    fn missing_field_is_falsy_for_eq() {
        let ctx = json!({});
        let rule = ConditionRule {
            field: "search.indexer".into(),
            operator: Operator::Eq,
            value: json!("nzbgeek"),
            logical_op: None,
            conditions: None,
        };
        assert!(!evaluate(&ctx, &rule));
    }

    #[test]
    fn nested_and_requires_all() {
        let ctx = json!({"a": 5, "b": 2});
        let rule = ConditionRule {
            field: "a".into(),
            operator: Operator::Gt,
            value: json!(1),
            logical_op: Some(LogicalOp::And),
            conditions: Some(vec![ConditionRule {
                field: "b".into(),
                operator: Operator::Lt,
                value: json!(1),
                logical_op: None,
                conditions: None,
            }]),
        };
        assert!(!evaluate(&ctx, &rule));
    }

    #[test]
    fn nested_or_requires_any() {
        let ctx = json!({"a": 5, "b": 2});
        let rule = ConditionRule {
            field: "a".into(),
            operator: Operator::Gt,
            value: json!(1),
            logical_op: Some(LogicalOp::Or),
            conditions: Some(vec![ConditionRule {
                field: "b".into(),
                operator: Operator::Lt,
                value: json!(1),
                logical_op: None,
                conditions: None,
            }]),
        };
        assert!(evaluate(&ctx, &rule));
    }

    #[test]
    fn assign_order_is_dfs_preorder() {
        let mut steps = vec![Step {
            order: 0,
            step_type: StepType::Search,
            name: "search".into(),
            config: json!({}),
            condition: None,
            required: true,
            retryable: false,
            continue_on_error: false,
            timeout_ms: None,
            children: vec![Step {
                order: 0,
                step_type: StepType::Download,
                name: "download".into(),
                config: json!({}),
                condition: None,
                required: true,
                retryable: false,
                continue_on_error: false,
                timeout_ms: None,
                children: vec![],
            }],
        }];
        let mut next = 0;
        assign_order(&mut steps, &mut next);
        assert_eq!(steps[0].order, 0);
        assert_eq!(steps[0].children[0].order, 1);
        assert_eq!(next, 2);
    }

    #[test]
    fn matches_operator_uses_regex() {
        let ctx = json!({"download": {"torrent_name": "Show.S01E02.mkv"}});
        let rule = ConditionRule {
            field: "download.torrent_name".into(),
            operator: Operator::Matches,
            value: json!(r"S\d{1,2}E\d{1,2}"),
            logical_op: None,
            conditions: None,
        };
        assert!(evaluate(&ctx, &rule));
    }
}
