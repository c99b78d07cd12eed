use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use crate::parse::{self, ParseError};
use crate::{ArithOp, ExecutionContext, Expr, Value};

/// A failure reported by an [`ExpressionEvaluator`]. Carries the raw message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EvaluationError {
    message: String,
}

impl EvaluationError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ParseError> for EvaluationError {
    fn from(e: ParseError) -> Self {
        Self::new(e.to_string())
    }
}

/// Evaluates a condition string against a context.
///
/// The engine never interprets conditions itself; every rule evaluation goes
/// through this trait. Closures with the matching signature implement it:
///
/// ```
/// use rulechain::{EvaluationError, ExecutionContext, ExpressionEvaluator, Value};
///
/// let always_true = |_: &str, _: &ExecutionContext| -> Result<Value, EvaluationError> {
///     Ok(Value::Bool(true))
/// };
/// assert_eq!(
///     always_true.evaluate("anything", &ExecutionContext::new()),
///     Ok(Value::Bool(true))
/// );
/// ```
pub trait ExpressionEvaluator: Send + Sync {
    /// # Errors
    ///
    /// Returns [`EvaluationError`] when the expression cannot be evaluated.
    fn evaluate(&self, expression: &str, ctx: &ExecutionContext) -> Result<Value, EvaluationError>;
}

impl<F> ExpressionEvaluator for F
where
    F: Fn(&str, &ExecutionContext) -> Result<Value, EvaluationError> + Send + Sync,
{
    fn evaluate(&self, expression: &str, ctx: &ExecutionContext) -> Result<Value, EvaluationError> {
        self(expression, ctx)
    }
}

/// Reference evaluator for the condition dialect used in chain configurations
/// (`#score > 700 && #income >= 50000 ? 25 : 5`).
///
/// Parsed expressions are cached by source text, so repeated runs of the same
/// chain parse each condition once. The cache holds at most
/// [`CACHE_CAPACITY`](Self::CACHE_CAPACITY) expressions and is emptied when
/// full, so an evaluator fed unbounded distinct inputs stays bounded in
/// memory. Safe to share across threads.
#[derive(Debug, Default)]
pub struct ExprEvaluator {
    cache: Mutex<HashMap<String, Arc<Expr>>>,
}

impl ExprEvaluator {
    /// Most parsed expressions kept at once.
    pub const CACHE_CAPACITY: usize = 1024;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn compiled(&self, source: &str) -> Result<Arc<Expr>, EvaluationError> {
        if let Some(expr) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source)
        {
            return Ok(Arc::clone(expr));
        }
        let expr = Arc::new(parse::parse(source)?);
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if cache.len() >= Self::CACHE_CAPACITY {
            tracing::debug!(entries = cache.len(), "expression cache full, clearing");
            cache.clear();
        }
        cache.insert(source.to_owned(), Arc::clone(&expr));
        Ok(expr)
    }
}

impl ExpressionEvaluator for ExprEvaluator {
    fn evaluate(&self, expression: &str, ctx: &ExecutionContext) -> Result<Value, EvaluationError> {
        let expr = self.compiled(expression)?;
        eval_expr(&expr, ctx)
    }
}

/// Interpret a parsed expression. Unset variables read as `Value::Null`.
///
/// # Errors
///
/// Returns [`EvaluationError`] on type mismatches, division by zero and
/// integer overflow.
pub fn eval_expr(expr: &Expr, ctx: &ExecutionContext) -> Result<Value, EvaluationError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Var(name) => Ok(ctx.value_of(name)),
        Expr::Compare { op, lhs, rhs } => {
            let l = eval_expr(lhs, ctx)?;
            let r = eval_expr(rhs, ctx)?;
            l.compare(*op, &r).map(Value::Bool).ok_or_else(|| {
                EvaluationError::new(format!(
                    "cannot compare {} {op} {}",
                    l.type_name(),
                    r.type_name()
                ))
            })
        }
        Expr::Arith { op, lhs, rhs } => {
            let l = eval_expr(lhs, ctx)?;
            let r = eval_expr(rhs, ctx)?;
            arith(*op, &l, &r)
        }
        Expr::Neg(inner) => match eval_expr(inner, ctx)? {
            Value::Int(i) => i
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| EvaluationError::new("integer overflow")),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(EvaluationError::new(format!(
                "cannot negate {}",
                other.type_name()
            ))),
        },
        Expr::Not(inner) => Ok(Value::Bool(!boolean(&eval_expr(inner, ctx)?, "!")?)),
        Expr::And(a, b) => {
            if !boolean(&eval_expr(a, ctx)?, "&&")? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(boolean(&eval_expr(b, ctx)?, "&&")?))
        }
        Expr::Or(a, b) => {
            if boolean(&eval_expr(a, ctx)?, "||")? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(boolean(&eval_expr(b, ctx)?, "||")?))
        }
        Expr::Ternary {
            cond,
            then,
            otherwise,
        } => {
            if boolean(&eval_expr(cond, ctx)?, "?:")? {
                eval_expr(then, ctx)
            } else {
                eval_expr(otherwise, ctx)
            }
        }
    }
}

fn boolean(v: &Value, op: &str) -> Result<bool, EvaluationError> {
    match v {
        Value::Bool(b) => Ok(*b),
        other => Err(EvaluationError::new(format!(
            "operator '{op}' expects a boolean, got {}",
            other.type_name()
        ))),
    }
}

#[allow(clippy::cast_precision_loss)]
fn arith(op: ArithOp, l: &Value, r: &Value) -> Result<Value, EvaluationError> {
    let overflow = || EvaluationError::new("integer overflow");
    match (l, r) {
        (Value::String(_), _) | (_, Value::String(_)) if op == ArithOp::Add => {
            Ok(Value::String(format!("{l}{r}")))
        }
        (Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            if b == 0 && matches!(op, ArithOp::Div | ArithOp::Rem) {
                return Err(EvaluationError::new("division by zero"));
            }
            let out = match op {
                ArithOp::Add => a.checked_add(b),
                ArithOp::Sub => a.checked_sub(b),
                ArithOp::Mul => a.checked_mul(b),
                ArithOp::Div => a.checked_div(b),
                ArithOp::Rem => a.checked_rem(b),
            };
            out.map(Value::Int).ok_or_else(overflow)
        }
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let a = l.as_f64().unwrap_or_default();
            let b = r.as_f64().unwrap_or_default();
            if b == 0.0 && matches!(op, ArithOp::Div | ArithOp::Rem) {
                return Err(EvaluationError::new("division by zero"));
            }
            Ok(Value::Float(match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div => a / b,
                ArithOp::Rem => a % b,
            }))
        }
        _ => Err(EvaluationError::new(format!(
            "cannot apply '{op}' to {} and {}",
            l.type_name(),
            r.type_name()
        ))),
    }
}
