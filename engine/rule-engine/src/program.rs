//! Compiled rule programs and the per-rule cache

use crate::error::{Result, RuleError};
use crate::lexer::tokenize;
use crate::parser::{parse, BinaryOp, Expr};
use prodline_types::{AttrValue, Order};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A compiled rule expression, reusable across evaluations.
#[derive(Debug, Clone)]
pub struct Program {
    source: String,
    ast: Expr,
}

impl Program {
    /// Compile a rule expression.
    pub fn compile(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        let ast = parse(&tokens)?;
        Ok(Self { source: source.to_string(), ast })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against an order, producing a value.
    pub fn eval(&self, order: &Order) -> Result<AttrValue> {
        eval_expr(&self.ast, order)
    }

    /// Evaluate against an order, requiring a boolean result.
    pub fn eval_bool(&self, order: &Order) -> Result<bool> {
        match self.eval(order)? {
            AttrValue::Bool(b) => Ok(b),
            other => Err(RuleError::NotBoolean(other.type_name())),
        }
    }
}

/// Cache of compiled programs keyed by rule text.
///
/// Workflows reference rules by their literal text, so the same rule string
/// compiles once no matter how many steps or orders use it.
#[derive(Debug, Default)]
pub struct RuleSet {
    programs: RwLock<HashMap<String, Arc<Program>>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile (or fetch from cache) and evaluate a rule against an order.
    ///
    /// An empty rule means "always execute".
    pub fn evaluate(&self, rule: &str, order: &Order) -> Result<bool> {
        if rule.trim().is_empty() {
            return Ok(true);
        }
        self.program(rule)?.eval_bool(order)
    }

    fn program(&self, rule: &str) -> Result<Arc<Program>> {
        if let Some(program) = self.programs.read().unwrap().get(rule) {
            return Ok(program.clone());
        }

        let program = Arc::new(Program::compile(rule)?);
        self.programs.write().unwrap().insert(rule.to_string(), program.clone());
        Ok(program)
    }
}

fn eval_expr(expr: &Expr, order: &Order) -> Result<AttrValue> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Field(path) => resolve_field(path, order),
        Expr::Not(inner) => match eval_expr(inner, order)? {
            AttrValue::Bool(b) => Ok(AttrValue::Bool(!b)),
            other => Err(RuleError::eval(format!("'!' requires a bool, got {}", other.type_name()))),
        },
        Expr::Neg(inner) => match eval_expr(inner, order)? {
            AttrValue::Int(v) => Ok(AttrValue::Int(-v)),
            AttrValue::Float(v) => Ok(AttrValue::Float(-v)),
            other => {
                Err(RuleError::eval(format!("'-' requires a number, got {}", other.type_name())))
            }
        },
        Expr::Binary { op, lhs, rhs } => eval_binary(*op, lhs, rhs, order),
    }
}

fn resolve_field(path: &[String], order: &Order) -> Result<AttrValue> {
    if path.first().map(String::as_str) != Some("product") {
        return Err(RuleError::eval(format!(
            "unknown variable '{}' (only 'product' is bound)",
            path.first().map(String::as_str).unwrap_or("")
        )));
    }

    match path.get(1).map(String::as_str) {
        Some("id") if path.len() == 2 => Ok(AttrValue::Str(order.id.clone())),
        Some("type") if path.len() == 2 => Ok(AttrValue::Str(order.order_type.clone())),
        Some("priority") if path.len() == 2 => Ok(AttrValue::Int(order.priority as i64)),
        Some("step") if path.len() == 2 => Ok(AttrValue::Int(order.step as i64)),
        Some("attrs") if path.len() == 3 => {
            let key = &path[2];
            order
                .attrs
                .get(key)
                .cloned()
                .ok_or_else(|| RuleError::eval(format!("order has no attribute '{key}'")))
        }
        _ => Err(RuleError::eval(format!("unknown field 'product.{}'", path[1..].join(".")))),
    }
}

fn eval_binary(op: BinaryOp, lhs: &Expr, rhs: &Expr, order: &Order) -> Result<AttrValue> {
    // && and || short-circuit; everything else is strict.
    match op {
        BinaryOp::And | BinaryOp::Or => {
            let left = match eval_expr(lhs, order)? {
                AttrValue::Bool(b) => b,
                other => {
                    return Err(RuleError::eval(format!(
                        "logical operator requires bools, got {}",
                        other.type_name()
                    )))
                }
            };
            if op == BinaryOp::And && !left {
                return Ok(AttrValue::Bool(false));
            }
            if op == BinaryOp::Or && left {
                return Ok(AttrValue::Bool(true));
            }
            match eval_expr(rhs, order)? {
                AttrValue::Bool(b) => Ok(AttrValue::Bool(b)),
                other => Err(RuleError::eval(format!(
                    "logical operator requires bools, got {}",
                    other.type_name()
                ))),
            }
        }
        _ => {
            let left = eval_expr(lhs, order)?;
            let right = eval_expr(rhs, order)?;
            match op {
                BinaryOp::Eq => Ok(AttrValue::Bool(values_equal(&left, &right)?)),
                BinaryOp::Ne => Ok(AttrValue::Bool(!values_equal(&left, &right)?)),
                BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                    let ordering = compare_values(&left, &right)?;
                    Ok(AttrValue::Bool(match op {
                        BinaryOp::Lt => ordering.is_lt(),
                        BinaryOp::Le => ordering.is_le(),
                        BinaryOp::Gt => ordering.is_gt(),
                        _ => ordering.is_ge(),
                    }))
                }
                BinaryOp::Add => arith_add(&left, &right),
                BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                    arith_numeric(op, &left, &right)
                }
                BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
            }
        }
    }
}

fn as_f64(value: &AttrValue) -> Option<f64> {
    match value {
        AttrValue::Int(v) => Some(*v as f64),
        AttrValue::Float(v) => Some(*v),
        _ => None,
    }
}

fn values_equal(left: &AttrValue, right: &AttrValue) -> Result<bool> {
    match (left, right) {
        (AttrValue::Bool(a), AttrValue::Bool(b)) => Ok(a == b),
        (AttrValue::Str(a), AttrValue::Str(b)) => Ok(a == b),
        _ => match (as_f64(left), as_f64(right)) {
            (Some(a), Some(b)) => Ok(a == b),
            _ => Err(RuleError::eval(format!(
                "cannot compare {} with {}",
                left.type_name(),
                right.type_name()
            ))),
        },
    }
}

fn compare_values(left: &AttrValue, right: &AttrValue) -> Result<std::cmp::Ordering> {
    if let (AttrValue::Str(a), AttrValue::Str(b)) = (left, right) {
        return Ok(a.cmp(b));
    }
    match (as_f64(left), as_f64(right)) {
        (Some(a), Some(b)) => a.partial_cmp(&b).ok_or_else(|| {
            RuleError::eval("comparison with NaN has no defined ordering".to_string())
        }),
        _ => Err(RuleError::eval(format!(
            "cannot order {} against {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn arith_add(left: &AttrValue, right: &AttrValue) -> Result<AttrValue> {
    match (left, right) {
        (AttrValue::Str(a), AttrValue::Str(b)) => Ok(AttrValue::Str(format!("{a}{b}"))),
        (AttrValue::Int(a), AttrValue::Int(b)) => Ok(AttrValue::Int(a + b)),
        _ => match (as_f64(left), as_f64(right)) {
            (Some(a), Some(b)) => Ok(AttrValue::Float(a + b)),
            _ => Err(RuleError::eval(format!(
                "cannot add {} and {}",
                left.type_name(),
                right.type_name()
            ))),
        },
    }
}

fn arith_numeric(op: BinaryOp, left: &AttrValue, right: &AttrValue) -> Result<AttrValue> {
    if let (AttrValue::Int(a), AttrValue::Int(b)) = (left, right) {
        return match op {
            BinaryOp::Sub => Ok(AttrValue::Int(a - b)),
            BinaryOp::Mul => Ok(AttrValue::Int(a * b)),
            BinaryOp::Div => {
                if *b == 0 {
                    Err(RuleError::eval("division by zero".to_string()))
                } else {
                    Ok(AttrValue::Int(a / b))
                }
            }
            BinaryOp::Rem => {
                if *b == 0 {
                    Err(RuleError::eval("remainder by zero".to_string()))
                } else {
                    Ok(AttrValue::Int(a % b))
                }
            }
            _ => unreachable!(),
        };
    }

    match (as_f64(left), as_f64(right)) {
        (Some(a), Some(b)) => match op {
            BinaryOp::Sub => Ok(AttrValue::Float(a - b)),
            BinaryOp::Mul => Ok(AttrValue::Float(a * b)),
            BinaryOp::Div => {
                if b == 0.0 {
                    Err(RuleError::eval("division by zero".to_string()))
                } else {
                    Ok(AttrValue::Float(a / b))
                }
            }
            BinaryOp::Rem => Err(RuleError::eval("'%' requires integers".to_string())),
            _ => unreachable!(),
        },
        _ => Err(RuleError::eval(format!(
            "arithmetic requires numbers, got {} and {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> Order {
        Order::new("PCB-42", "PCB_MULTILAYER", 2)
            .with_attr("layers", 4i64)
            .with_attr("is_fragile", true)
            .with_attr("thickness", 1.6)
            .with_attr("customer", "acme")
    }

    #[test]
    fn lamination_gate_rule() {
        let rules = RuleSet::new();
        assert!(rules.evaluate("product.attrs.layers >= 4", &order()).unwrap());

        let two_layer = Order::new("PCB-2", "PCB_DOUBLE_LAYER", 0).with_attr("layers", 2i64);
        assert!(!rules.evaluate("product.attrs.layers >= 4", &two_layer).unwrap());
    }

    #[test]
    fn empty_rule_always_executes() {
        let rules = RuleSet::new();
        assert!(rules.evaluate("", &order()).unwrap());
        assert!(rules.evaluate("   ", &order()).unwrap());
    }

    #[test]
    fn field_access_and_logic() {
        let rules = RuleSet::new();
        assert!(rules
            .evaluate("product.type == 'PCB_MULTILAYER' && product.priority > 1", &order())
            .unwrap());
        assert!(rules
            .evaluate("product.attrs.is_fragile || product.attrs.layers > 10", &order())
            .unwrap());
        assert!(!rules.evaluate("!product.attrs.is_fragile", &order()).unwrap());
    }

    #[test]
    fn mixed_numeric_comparison() {
        let rules = RuleSet::new();
        assert!(rules.evaluate("product.attrs.thickness < 2", &order()).unwrap());
        assert!(rules.evaluate("product.attrs.layers * 2 == 8", &order()).unwrap());
        assert!(rules.evaluate("product.attrs.layers + 0.5 > 4", &order()).unwrap());
    }

    #[test]
    fn non_boolean_result_is_reported() {
        let rules = RuleSet::new();
        let err = rules.evaluate("product.attrs.layers + 1", &order()).unwrap_err();
        assert_eq!(err, RuleError::NotBoolean("int"));
    }

    #[test]
    fn unknown_attribute_is_an_eval_error() {
        let rules = RuleSet::new();
        assert!(matches!(
            rules.evaluate("product.attrs.missing == 1", &order()),
            Err(RuleError::Eval(_))
        ));
    }

    #[test]
    fn parse_error_surfaces_offset() {
        let rules = RuleSet::new();
        match rules.evaluate("product.priority >", &order()) {
            Err(RuleError::Parse { .. }) => {}
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn division_by_zero_is_an_eval_error() {
        let rules = RuleSet::new();
        assert!(matches!(
            rules.evaluate("product.attrs.layers / 0 == 1", &order()),
            Err(RuleError::Eval(_))
        ));
    }

    #[test]
    fn programs_are_cached_per_text() {
        let rules = RuleSet::new();
        let o = order();
        rules.evaluate("product.priority > 0", &o).unwrap();
        rules.evaluate("product.priority > 0", &o).unwrap();
        assert_eq!(rules.programs.read().unwrap().len(), 1);
    }

    #[test]
    fn short_circuit_skips_rhs_errors() {
        let rules = RuleSet::new();
        // rhs references a missing attribute but must never be evaluated
        assert!(!rules
            .evaluate("false && product.attrs.missing == 1", &order())
            .unwrap());
        assert!(rules
            .evaluate("true || product.attrs.missing == 1", &order())
            .unwrap());
    }
}
