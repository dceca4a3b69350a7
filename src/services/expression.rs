//! Restricted expression language for guards, gates, and script steps.
//!
//! Supports literals (numbers, strings, booleans, null), identifier paths
//! with property access (`steps.prep.output.ok`), comparison and equality
//! operators, `&& || !`, arithmetic, unary minus, and parentheses. No
//! function calls, no assignment, no I/O. Evaluation never panics; every
//! failure is an [`ExpressionError`], so the evaluator is safe to run on
//! adversarial input.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ExpressionError {
    #[error("Unexpected character '{0}' at offset {1}")]
    UnexpectedChar(char, usize),
    #[error("Unterminated string literal")]
    UnterminatedString,
    #[error("Invalid number: {0}")]
    InvalidNumber(String),
    #[error("Unexpected token: {0}")]
    UnexpectedToken(String),
    #[error("Unexpected end of expression")]
    UnexpectedEnd,
    #[error("Type error: {0}")]
    TypeError(String),
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Expression too deep")]
    TooDeep,
}

/// Parse nesting cap. Keeps recursive descent bounded on adversarial input.
const MAX_DEPTH: usize = 64;

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    Dot,
    LParen,
    RParen,
    Plus,
    Minus,
    Star,
    Slash,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExpressionError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Eq);
                    i += 2;
                } else {
                    return Err(ExpressionError::UnexpectedChar('=', i));
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    tokens.push(Token::Not);
                    i += 1;
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(Token::And);
                    i += 2;
                } else {
                    return Err(ExpressionError::UnexpectedChar('&', i));
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token::Or);
                    i += 2;
                } else {
                    return Err(ExpressionError::UnexpectedChar('|', i));
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(ExpressionError::UnterminatedString),
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&'\\') => {
                            match chars.get(i + 1) {
                                Some(&'n') => s.push('\n'),
                                Some(&'t') => s.push('\t'),
                                Some(&ch) => s.push(ch),
                                None => return Err(ExpressionError::UnterminatedString),
                            }
                            i += 2;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            '0'..='9' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    // A dot followed by a non-digit is property access, not a decimal.
                    if chars[i] == '.' && !chars.get(i + 1).is_some_and(char::is_ascii_digit) {
                        break;
                    }
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| ExpressionError::InvalidNumber(text.clone()))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Ident(word),
                });
            }
            other => return Err(ExpressionError::UnexpectedChar(other, i)),
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    /// Identifier path, e.g. `steps.prep.output.ok`.
    Path(Vec<String>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, token: &Token) -> Result<(), ExpressionError> {
        match self.next() {
            Some(ref t) if t == token => Ok(()),
            Some(t) => Err(ExpressionError::UnexpectedToken(format!("{t:?}"))),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }

    fn parse_expr(&mut self, depth: usize) -> Result<Expr, ExpressionError> {
        self.parse_or(depth)
    }

    fn parse_or(&mut self, depth: usize) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_and(depth)?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let right = self.parse_and(depth)?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self, depth: usize) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_comparison(depth)?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let right = self.parse_comparison(depth)?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self, depth: usize) -> Result<Expr, ExpressionError> {
        let left = self.parse_additive(depth)?;
        let op = match self.peek() {
            Some(Token::Eq) => BinaryOp::Eq,
            Some(Token::Ne) => BinaryOp::Ne,
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Le) => BinaryOp::Le,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Ge) => BinaryOp::Ge,
            _ => return Ok(left),
        };
        self.next();
        let right = self.parse_additive(depth)?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn parse_additive(&mut self, depth: usize) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_multiplicative(depth)?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.next();
            let right = self.parse_multiplicative(depth)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self, depth: usize) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_unary(depth)?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => break,
            };
            self.next();
            let right = self.parse_unary(depth)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self, depth: usize) -> Result<Expr, ExpressionError> {
        if depth >= MAX_DEPTH {
            return Err(ExpressionError::TooDeep);
        }
        match self.peek() {
            Some(Token::Not) => {
                self.next();
                let inner = self.parse_unary(depth + 1)?;
                Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)))
            }
            Some(Token::Minus) => {
                self.next();
                let inner = self.parse_unary(depth + 1)?;
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)))
            }
            _ => self.parse_primary(depth),
        }
    }

    fn parse_primary(&mut self, depth: usize) -> Result<Expr, ExpressionError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Literal(
                serde_json::Number::from_f64(n)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            )),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::LParen) => {
                let inner = self.parse_expr(depth + 1)?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(first)) => {
                let mut path = vec![first];
                while self.peek() == Some(&Token::Dot) {
                    self.next();
                    match self.next() {
                        Some(Token::Ident(seg)) => path.push(seg),
                        Some(t) => {
                            return Err(ExpressionError::UnexpectedToken(format!("{t:?}")))
                        }
                        None => return Err(ExpressionError::UnexpectedEnd),
                    }
                }
                Ok(Expr::Path(path))
            }
            Some(t) => Err(ExpressionError::UnexpectedToken(format!("{t:?}"))),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }
}

fn parse(input: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr(0)?;
    if parser.pos != parser.tokens.len() {
        return Err(ExpressionError::UnexpectedToken(format!(
            "{:?}",
            parser.tokens[parser.pos]
        )));
    }
    Ok(expr)
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// Truthiness: `false`, `null`, `0`, and `""` are falsy; everything else
/// is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn lookup<'a>(context: &'a Value, path: &[String]) -> &'a Value {
    let mut current = context;
    for segment in path {
        match current.get(segment) {
            Some(v) => current = v,
            None => return &Value::Null,
        }
    }
    current
}

fn as_number(value: &Value, op: &str) -> Result<f64, ExpressionError> {
    value
        .as_f64()
        .ok_or_else(|| ExpressionError::TypeError(format!("{op} requires numbers, got {value}")))
}

fn number_value(n: f64) -> Value {
    serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<bool, ExpressionError> {
    // Ordering comparisons work on number pairs and string pairs.
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
            Ok(match op {
                BinaryOp::Lt => a < b,
                BinaryOp::Le => a <= b,
                BinaryOp::Gt => a > b,
                BinaryOp::Ge => a >= b,
                _ => unreachable!(),
            })
        }
        (Value::String(a), Value::String(b)) => Ok(match op {
            BinaryOp::Lt => a < b,
            BinaryOp::Le => a <= b,
            BinaryOp::Gt => a > b,
            BinaryOp::Ge => a >= b,
            _ => unreachable!(),
        }),
        _ => Err(ExpressionError::TypeError(format!(
            "cannot order {left} and {right}"
        ))),
    }
}

fn eval_expr(expr: &Expr, context: &Value) -> Result<Value, ExpressionError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Path(path) => Ok(lookup(context, path).clone()),
        Expr::Unary(op, inner) => {
            let value = eval_expr(inner, context)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!is_truthy(&value))),
                UnaryOp::Neg => Ok(number_value(-as_number(&value, "negation")?)),
            }
        }
        Expr::Binary(op, left, right) => match op {
            BinaryOp::And => {
                let l = eval_expr(left, context)?;
                if !is_truthy(&l) {
                    return Ok(l);
                }
                eval_expr(right, context)
            }
            BinaryOp::Or => {
                let l = eval_expr(left, context)?;
                if is_truthy(&l) {
                    return Ok(l);
                }
                eval_expr(right, context)
            }
            BinaryOp::Eq => {
                let (l, r) = (eval_expr(left, context)?, eval_expr(right, context)?);
                Ok(Value::Bool(l == r))
            }
            BinaryOp::Ne => {
                let (l, r) = (eval_expr(left, context)?, eval_expr(right, context)?);
                Ok(Value::Bool(l != r))
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let (l, r) = (eval_expr(left, context)?, eval_expr(right, context)?);
                Ok(Value::Bool(compare(*op, &l, &r)?))
            }
            BinaryOp::Add => {
                let (l, r) = (eval_expr(left, context)?, eval_expr(right, context)?);
                // `+` concatenates when either side is a string.
                match (&l, &r) {
                    (Value::String(a), b) => Ok(Value::String(format!("{a}{}", stringify(b)))),
                    (a, Value::String(b)) => Ok(Value::String(format!("{}{b}", stringify(a)))),
                    _ => Ok(number_value(as_number(&l, "+")? + as_number(&r, "+")?)),
                }
            }
            BinaryOp::Sub => {
                let (l, r) = (eval_expr(left, context)?, eval_expr(right, context)?);
                Ok(number_value(as_number(&l, "-")? - as_number(&r, "-")?))
            }
            BinaryOp::Mul => {
                let (l, r) = (eval_expr(left, context)?, eval_expr(right, context)?);
                Ok(number_value(as_number(&l, "*")? * as_number(&r, "*")?))
            }
            BinaryOp::Div => {
                let (l, r) = (eval_expr(left, context)?, eval_expr(right, context)?);
                let divisor = as_number(&r, "/")?;
                if divisor == 0.0 {
                    return Err(ExpressionError::DivisionByZero);
                }
                Ok(number_value(as_number(&l, "/")? / divisor))
            }
        },
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Evaluate an expression against a JSON context.
pub fn evaluate(input: &str, context: &Value) -> Result<Value, ExpressionError> {
    let expr = parse(input)?;
    eval_expr(&expr, context)
}

/// Evaluate an expression and coerce the result to a boolean.
pub fn evaluate_bool(input: &str, context: &Value) -> Result<bool, ExpressionError> {
    Ok(is_truthy(&evaluate(input, context)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn ctx() -> Value {
        json!({
            "inputs": {"env": "prod", "replicas": 3},
            "steps": {
                "prep": {"output": {"ok": true, "count": 7}},
                "scan": {"output": null}
            }
        })
    }

    #[test]
    fn literals() {
        assert_eq!(evaluate("42", &ctx()).unwrap(), json!(42.0));
        assert_eq!(evaluate("'hi'", &ctx()).unwrap(), json!("hi"));
        assert_eq!(evaluate("true", &ctx()).unwrap(), json!(true));
        assert_eq!(evaluate("null", &ctx()).unwrap(), Value::Null);
    }

    #[test]
    fn path_lookup() {
        assert_eq!(evaluate("steps.prep.output.ok", &ctx()).unwrap(), json!(true));
        assert_eq!(evaluate("inputs.env", &ctx()).unwrap(), json!("prod"));
        // Missing paths resolve to null rather than erroring.
        assert_eq!(evaluate("steps.nope.output", &ctx()).unwrap(), Value::Null);
    }

    #[test]
    fn comparisons_and_boolean_logic() {
        assert_eq!(
            evaluate_bool("steps.prep.output.count >= 5 && inputs.env == 'prod'", &ctx()).unwrap(),
            true
        );
        assert_eq!(evaluate_bool("inputs.replicas < 3", &ctx()).unwrap(), false);
        assert_eq!(evaluate_bool("!steps.scan.output", &ctx()).unwrap(), true);
        assert_eq!(evaluate_bool("1 != 2", &ctx()).unwrap(), true);
    }

    #[test]
    fn arithmetic() {
        assert_eq!(evaluate("1 + 2 * 3", &ctx()).unwrap(), json!(7.0));
        assert_eq!(evaluate("(1 + 2) * 3", &ctx()).unwrap(), json!(9.0));
        assert_eq!(evaluate("-inputs.replicas + 4", &ctx()).unwrap(), json!(1.0));
        assert_eq!(evaluate("10 / 4", &ctx()).unwrap(), json!(2.5));
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(evaluate("'env: ' + inputs.env", &ctx()).unwrap(), json!("env: prod"));
    }

    #[test]
    fn short_circuit_returns_operand() {
        assert_eq!(evaluate("null || 'fallback'", &ctx()).unwrap(), json!("fallback"));
        assert_eq!(evaluate("0 && 1", &ctx()).unwrap(), json!(0.0));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(evaluate("1 / 0", &ctx()), Err(ExpressionError::DivisionByZero));
    }

    #[test]
    fn type_errors_are_reported() {
        assert!(matches!(
            evaluate("'a' - 1", &ctx()),
            Err(ExpressionError::TypeError(_))
        ));
        assert!(matches!(
            evaluate("inputs < 3", &ctx()),
            Err(ExpressionError::TypeError(_))
        ));
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(evaluate("1 +", &ctx()).is_err());
        assert!(evaluate("(1", &ctx()).is_err());
        assert!(evaluate("a.b.", &ctx()).is_err());
        assert!(evaluate("'unterminated", &ctx()).is_err());
        assert!(evaluate("a = b", &ctx()).is_err());
        assert!(evaluate("f(x)", &ctx()).is_err());
    }

    #[test]
    fn deep_nesting_is_bounded() {
        let bomb = format!("{}1{}", "(".repeat(500), ")".repeat(500));
        assert_eq!(evaluate(&bomb, &ctx()), Err(ExpressionError::TooDeep));
        let not_bomb = format!("{}1{}", "!".repeat(500), "");
        assert_eq!(evaluate(&not_bomb, &ctx()), Err(ExpressionError::TooDeep));
    }

    proptest! {
        /// Arbitrary input must never panic — errors are fine, panics are not.
        #[test]
        fn evaluator_never_panics(input in ".{0,64}") {
            let _ = evaluate(&input, &ctx());
        }

        #[test]
        fn numeric_comparison_matches_rust(a in -1000i32..1000, b in -1000i32..1000) {
            let expr = format!("{a} < {b}");
            prop_assert_eq!(evaluate_bool(&expr, &Value::Null).unwrap(), a < b);
        }
    }
}
