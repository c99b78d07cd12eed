use winnow::ascii::digit1;
use winnow::combinator::{alt, cut_err, fail, opt, preceded, repeat};
use winnow::error::{ErrMode, ModalResult, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{any, take_while};

use crate::{ArithOp, CompareOp, Expr, Value};

// -- Whitespace & words -----------------------------------------------------

fn ws(input: &mut &str) -> ModalResult<()> {
    take_while(0.., |c: char| c.is_whitespace())
        .void()
        .parse_next(input)
}

pub(super) fn ident<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (
        take_while(1.., |c: char| c.is_ascii_alphabetic() || c == '_' || c == '$'),
        take_while(0.., |c: char| {
            c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.'
        }),
    )
        .take()
        .parse_next(input)
}

const OPERATOR_WORDS: [&str; 3] = ["and", "or", "not"];

pub(super) fn is_keyword(word: &str) -> bool {
    ["true", "false", "null"]
        .iter()
        .chain(OPERATOR_WORDS.iter())
        .any(|kw| word.eq_ignore_ascii_case(kw))
}

/// A whole word equal to `kw`, case-insensitively. `android` is not `and`.
fn keyword(input: &mut &str, kw: &str) -> ModalResult<()> {
    ident
        .verify(|w: &str| w.eq_ignore_ascii_case(kw))
        .void()
        .parse_next(input)
}

// -- Literals ---------------------------------------------------------------

/// A `quote`-delimited string with backslash escapes.
pub(super) fn string_literal(input: &mut &str, mut quote: char) -> ModalResult<String> {
    quote.parse_next(input)?;
    let mut s = String::new();
    loop {
        let ch = any.parse_next(input)?;
        match ch {
            c if c == quote => return Ok(s),
            '\\' => {
                let esc = any.parse_next(input)?;
                match esc {
                    'n' => s.push('\n'),
                    't' => s.push('\t'),
                    '\\' | '\'' | '"' => s.push(esc),
                    other => {
                        s.push('\\');
                        s.push(other);
                    }
                }
            }
            c => s.push(c),
        }
    }
}

fn number(input: &mut &str) -> ModalResult<Value> {
    let text = (digit1, opt(('.', digit1))).take().parse_next(input)?;
    if text.contains('.') {
        text.parse::<f64>()
            .map(Value::Float)
            .map_err(|_| ErrMode::from_input(input).cut())
    } else {
        text.parse::<i64>()
            .map(Value::Int)
            .map_err(|_| ErrMode::from_input(input).cut())
    }
}

fn word(input: &mut &str) -> ModalResult<Expr> {
    let hash = opt('#').parse_next(input)?;
    let name = ident.parse_next(input)?;
    if hash.is_some() {
        return Ok(Expr::Var(name.to_owned()));
    }
    if name.eq_ignore_ascii_case("true") {
        Ok(Expr::Literal(Value::Bool(true)))
    } else if name.eq_ignore_ascii_case("false") {
        Ok(Expr::Literal(Value::Bool(false)))
    } else if name.eq_ignore_ascii_case("null") {
        Ok(Expr::Literal(Value::Null))
    } else if OPERATOR_WORDS.iter().any(|kw| name.eq_ignore_ascii_case(kw)) {
        Err(ErrMode::from_input(input))
    } else {
        Ok(Expr::Var(name.to_owned()))
    }
}

// -- Operators --------------------------------------------------------------

fn compare_op(input: &mut &str) -> ModalResult<CompareOp> {
    ws.parse_next(input)?;
    alt((
        ">=".value(CompareOp::Gte),
        ">".value(CompareOp::Gt),
        "<=".value(CompareOp::Lte),
        "<".value(CompareOp::Lt),
        "==".value(CompareOp::Eq),
        "!=".value(CompareOp::Neq),
    ))
    .parse_next(input)
}

fn additive_op(input: &mut &str) -> ModalResult<ArithOp> {
    ws.parse_next(input)?;
    alt(('+'.value(ArithOp::Add), '-'.value(ArithOp::Sub))).parse_next(input)
}

fn multiplicative_op(input: &mut &str) -> ModalResult<ArithOp> {
    ws.parse_next(input)?;
    alt((
        '*'.value(ArithOp::Mul),
        '/'.value(ArithOp::Div),
        '%'.value(ArithOp::Rem),
    ))
    .parse_next(input)
}

// -- Nesting ----------------------------------------------------------------

/// Deepest expression tree the grammar accepts. Both parsing and evaluation
/// recurse once per level, so deeper input is rejected up front.
pub const MAX_DEPTH: usize = 64;

fn too_deep<O>(input: &mut &str) -> ModalResult<O> {
    cut_err(fail.context(StrContext::Expected(StrContextValue::Description(
        "at most 64 levels of nesting",
    ))))
    .parse_next(input)
}

/// Height of an expression tree, computed without recursion.
fn height(expr: &Expr) -> usize {
    let mut deepest = 0;
    let mut pending = vec![(expr, 1)];
    while let Some((node, level)) = pending.pop() {
        deepest = deepest.max(level);
        match node {
            Expr::Literal(_) | Expr::Var(_) => {}
            Expr::Neg(inner) | Expr::Not(inner) => pending.push((inner.as_ref(), level + 1)),
            Expr::Compare { lhs, rhs, .. }
            | Expr::Arith { lhs, rhs, .. }
            | Expr::And(lhs, rhs)
            | Expr::Or(lhs, rhs) => {
                pending.push((lhs.as_ref(), level + 1));
                pending.push((rhs.as_ref(), level + 1));
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                pending.push((cond.as_ref(), level + 1));
                pending.push((then.as_ref(), level + 1));
                pending.push((otherwise.as_ref(), level + 1));
            }
        }
    }
    deepest
}

/// Height of the left fold of `first` and `rest`, before it is built.
fn chain_height<'e>(first: &Expr, rest: impl ExactSizeIterator<Item = &'e Expr>) -> usize {
    let links = rest.len();
    rest.enumerate()
        .map(|(idx, rhs)| height(rhs) + links - idx)
        .fold(height(first) + links, usize::max)
}

// -- Expressions (precedence: ?: < OR < AND < compare < +- < */% < unary) ---
//
// `depth` counts the recursive descents (parentheses, prefix operators and
// ternary branches) above the current parser.

fn primary(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    ws.parse_next(input)?;
    if opt('(').parse_next(input)?.is_some() {
        let inner = cut_err(|i: &mut &str| ternary(i, depth + 1)).parse_next(input)?;
        (ws, cut_err(')')).parse_next(input)?;
        return Ok(inner);
    }
    alt((
        (|i: &mut &str| string_literal(i, '\'')).map(|s| Expr::Literal(Value::String(s))),
        (|i: &mut &str| string_literal(i, '"')).map(|s| Expr::Literal(Value::String(s))),
        number.map(Expr::Literal),
        word,
    ))
    .context(StrContext::Expected(StrContextValue::Description(
        "expression",
    )))
    .parse_next(input)
}

fn unary(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    if depth > MAX_DEPTH {
        return too_deep(input);
    }
    ws.parse_next(input)?;
    let not = opt(alt(('!'.void(), |i: &mut &str| keyword(i, "not")))).parse_next(input)?;
    if not.is_some() {
        let inner = cut_err(|i: &mut &str| unary(i, depth + 1)).parse_next(input)?;
        return Ok(Expr::Not(Box::new(inner)));
    }
    if opt('-').parse_next(input)?.is_some() {
        let inner = cut_err(|i: &mut &str| unary(i, depth + 1)).parse_next(input)?;
        return Ok(match inner {
            Expr::Literal(Value::Int(i)) => Expr::Literal(Value::Int(-i)),
            Expr::Literal(Value::Float(f)) => Expr::Literal(Value::Float(-f)),
            other => Expr::Neg(Box::new(other)),
        });
    }
    primary(input, depth)
}

fn fold_arith(
    input: &mut &str,
    first: Expr,
    rest: Vec<(ArithOp, Expr)>,
) -> ModalResult<Expr> {
    if chain_height(&first, rest.iter().map(|(_, rhs)| rhs)) > MAX_DEPTH {
        return too_deep(input);
    }
    Ok(rest.into_iter().fold(first, |lhs, (op, rhs)| Expr::Arith {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }))
}

fn fold_logic(
    input: &mut &str,
    first: Expr,
    rest: Vec<Expr>,
    join: fn(Box<Expr>, Box<Expr>) -> Expr,
) -> ModalResult<Expr> {
    if chain_height(&first, rest.iter()) > MAX_DEPTH {
        return too_deep(input);
    }
    Ok(rest
        .into_iter()
        .fold(first, |acc, r| join(Box::new(acc), Box::new(r))))
}

fn multiplicative(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    let first = unary(input, depth)?;
    let rest: Vec<(ArithOp, Expr)> = repeat(
        0..,
        (multiplicative_op, cut_err(|i: &mut &str| unary(i, depth))),
    )
    .parse_next(input)?;
    fold_arith(input, first, rest)
}

fn additive(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    let first = multiplicative(input, depth)?;
    let rest: Vec<(ArithOp, Expr)> = repeat(
        0..,
        (additive_op, cut_err(|i: &mut &str| multiplicative(i, depth))),
    )
    .parse_next(input)?;
    fold_arith(input, first, rest)
}

fn comparison(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    let lhs = additive(input, depth)?;
    match opt(compare_op).parse_next(input)? {
        Some(op) => {
            let rhs = cut_err(|i: &mut &str| additive(i, depth)).parse_next(input)?;
            Ok(Expr::Compare {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            })
        }
        None => Ok(lhs),
    }
}

fn and_expr(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    let first = comparison(input, depth)?;
    let rest: Vec<Expr> = repeat(
        0..,
        preceded(
            (ws, alt(("&&".void(), |i: &mut &str| keyword(i, "and")))),
            cut_err(|i: &mut &str| comparison(i, depth)),
        ),
    )
    .parse_next(input)?;
    fold_logic(input, first, rest, Expr::And)
}

fn or_expr(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    let first = and_expr(input, depth)?;
    let rest: Vec<Expr> = repeat(
        0..,
        preceded(
            (ws, alt(("||".void(), |i: &mut &str| keyword(i, "or")))),
            cut_err(|i: &mut &str| and_expr(i, depth)),
        ),
    )
    .parse_next(input)?;
    fold_logic(input, first, rest, Expr::Or)
}

fn ternary(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    if depth > MAX_DEPTH {
        return too_deep(input);
    }
    let cond = or_expr(input, depth)?;
    if opt(preceded(ws, '?')).parse_next(input)?.is_none() {
        return Ok(cond);
    }
    let then = cut_err(|i: &mut &str| ternary(i, depth + 1)).parse_next(input)?;
    cut_err(preceded(ws, ':')).parse_next(input)?;
    let otherwise = cut_err(|i: &mut &str| ternary(i, depth + 1)).parse_next(input)?;
    Ok(Expr::Ternary {
        cond: Box::new(cond),
        then: Box::new(then),
        otherwise: Box::new(otherwise),
    })
}

// -- Top-level parser -------------------------------------------------------

pub fn parse_expression(input: &mut &str) -> ModalResult<Expr> {
    let expr = ternary(input, 0)?;
    if height(&expr) > MAX_DEPTH {
        return too_deep(input);
    }
    ws.parse_next(input)?;
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use crate::parse::parse;

    use super::*;

    fn var(name: &str) -> Expr {
        Expr::Var(name.to_owned())
    }

    #[test]
    fn parse_simple_comparison() {
        let expr = parse("#age >= 18").unwrap();
        assert_eq!(
            expr,
            Expr::Compare {
                op: CompareOp::Gte,
                lhs: Box::new(var("age")),
                rhs: Box::new(Expr::Literal(Value::Int(18))),
            }
        );
    }

    #[test]
    fn hash_prefix_is_optional() {
        assert_eq!(parse("#income").unwrap(), parse("income").unwrap());
    }

    #[test]
    fn dotted_identifier() {
        assert_eq!(parse("user.age").unwrap(), var("user.age"));
    }

    #[test]
    fn parse_all_comparison_ops() {
        let ops = [
            ("==", CompareOp::Eq),
            ("!=", CompareOp::Neq),
            (">", CompareOp::Gt),
            (">=", CompareOp::Gte),
            ("<", CompareOp::Lt),
            ("<=", CompareOp::Lte),
        ];
        for (sym, expected_op) in ops {
            match parse(&format!("x {sym} 1")).unwrap() {
                Expr::Compare { op, .. } => assert_eq!(op, expected_op, "failed for {sym}"),
                other => panic!("expected Compare for {sym}, got {other:?}"),
            }
        }
    }

    #[test]
    fn parse_all_literal_types() {
        let cases = [
            ("42", Value::Int(42)),
            ("3.5", Value::Float(3.5)),
            ("-7", Value::Int(-7)),
            ("true", Value::Bool(true)),
            ("FALSE", Value::Bool(false)),
            ("null", Value::Null),
            ("'HIGH_RISK'", Value::String("HIGH_RISK".into())),
            (r#""quoted""#, Value::String("quoted".into())),
        ];
        for (literal, expected) in cases {
            assert_eq!(
                parse(literal).unwrap(),
                Expr::Literal(expected),
                "failed for {literal}"
            );
        }
    }

    #[test]
    fn string_with_escapes() {
        assert_eq!(
            parse(r"'it\'s'").unwrap(),
            Expr::Literal(Value::String("it's".into()))
        );
    }

    #[test]
    fn precedence_mul_before_add() {
        match parse("a + b * 2").unwrap() {
            Expr::Arith { op, rhs, .. } => {
                assert_eq!(op, ArithOp::Add);
                assert!(matches!(*rhs, Expr::Arith { op: ArithOp::Mul, .. }));
            }
            other => panic!("expected Add, got {other:?}"),
        }
    }

    #[test]
    fn subtraction_is_left_associative() {
        assert_eq!(parse("10 - 3 - 2").unwrap().to_string(), "((10 - 3) - 2)");
    }

    #[test]
    fn precedence_and_before_or() {
        match parse("a || b && c").unwrap() {
            Expr::Or(left, right) => {
                assert_eq!(*left, var("a"));
                assert!(matches!(*right, Expr::And(_, _)));
            }
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn word_operators() {
        assert_eq!(
            parse("a and not b or c").unwrap(),
            parse("a && !b || c").unwrap()
        );
    }

    #[test]
    fn keyword_prefix_is_an_identifier() {
        assert_eq!(
            parse("android && order").unwrap(),
            Expr::And(Box::new(var("android")), Box::new(var("order")))
        );
    }

    #[test]
    fn ternary_is_right_associative() {
        let expr = parse("#s >= 750 ? 25 : #s >= 700 ? 20 : 5").unwrap();
        assert_eq!(
            expr.to_string(),
            "((s >= 750) ? 25 : ((s >= 700) ? 20 : 5))"
        );
    }

    #[test]
    fn parenthesized_grouping() {
        match parse("(a || b) && c").unwrap() {
            Expr::And(left, _) => assert!(matches!(*left, Expr::Or(_, _))),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn negated_variable() {
        assert_eq!(parse("-x").unwrap(), Expr::Neg(Box::new(var("x"))));
        assert_eq!(parse("!x").unwrap(), Expr::Not(Box::new(var("x"))));
    }

    #[test]
    fn not_equal_is_not_negation() {
        assert!(matches!(
            parse("x != null").unwrap(),
            Expr::Compare { op: CompareOp::Neq, .. }
        ));
    }

    #[test]
    fn rejects_malformed_input() {
        for input in ["", "a >", "(a", "a ? b", "1 2", "'open", "and"] {
            assert!(parse(input).is_err(), "should reject {input:?}");
        }
    }

    #[test]
    fn nesting_up_to_limit_parses() {
        let nested = format!("{}1{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert_eq!(parse(&nested).unwrap(), Expr::Literal(Value::Int(1)));
        let chain = vec!["1"; MAX_DEPTH].join(" + ");
        assert_eq!(height(&parse(&chain).unwrap()), MAX_DEPTH);
    }

    #[test]
    fn rejects_deep_nesting() {
        let cases = [
            format!("{}1{}", "(".repeat(100_000), ")".repeat(100_000)),
            "!".repeat(100_000) + "x",
            "-".repeat(100_000) + "1",
            "a ? ".repeat(100_000) + "1",
            vec!["1"; 100_000].join(" + "),
            vec!["x"; 100_000].join(" && "),
        ];
        for input in &cases {
            let err = parse(input).unwrap_err();
            assert!(
                err.to_string().contains("at most 64 levels of nesting"),
                "unexpected error for {}...: {err}",
                &input[..8]
            );
        }
    }
}
