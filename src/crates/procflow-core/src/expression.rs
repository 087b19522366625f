//! Default expression evaluator
//!
//! [`SimpleEvaluator`] understands a deliberately small language:
//!
//! - bare text: `true` / `false` become booleans, anything else is a string
//!   (so a decision expression can simply name a transition)
//! - `#{...}` or `${...}`: an expression over process variables
//!
//! Inside the braces:
//!
//! ```text
//! expr    := and ('||' and)*
//! and     := unary ('&&' unary)*
//! unary   := '!' unary | compare
//! compare := operand (('==' | '!=' | '<' | '<=' | '>' | '>=') operand)?
//! operand := 'string' | "string" | number | true | false | null | path | '(' expr ')'
//! path    := ident ('.' ident)*
//! ```
//!
//! A path resolves its first segment as a variable (walking the token
//! lineage) and the remaining segments as object fields.

use crate::context::ExecutionContext;
use crate::delegation::{EvalValue, Evaluator, ExpectedType};
use crate::error::{ProcessError, Result};
use serde_json::Value;
use std::cmp::Ordering;

/// Built-in [`Evaluator`] over process variables
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleEvaluator;

impl Evaluator for SimpleEvaluator {
    fn evaluate(
        &self,
        expression: &str,
        ctx: &ExecutionContext<'_>,
        expected: ExpectedType,
    ) -> Result<EvalValue> {
        let value = evaluate_with(expression, &|name| ctx.variable(name))?;
        value.coerce(expected)
    }
}

/// Evaluate `expression` resolving variables through `lookup`
pub(crate) fn evaluate_with(
    expression: &str,
    lookup: &dyn Fn(&str) -> Option<Value>,
) -> Result<EvalValue> {
    let trimmed = expression.trim();
    let body = trimmed
        .strip_prefix("#{")
        .or_else(|| trimmed.strip_prefix("${"))
        .and_then(|rest| rest.strip_suffix('}'));

    let Some(body) = body else {
        return Ok(match trimmed {
            "true" => EvalValue::Bool(true),
            "false" => EvalValue::Bool(false),
            other => EvalValue::String(other.to_string()),
        });
    };

    let tokens = tokenize(body)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        lookup,
    };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(ProcessError::evaluation(format!(
            "unexpected trailing input in '{}'",
            expression
        )));
    }
    Ok(EvalValue::from_json(&value))
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Path(String),
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
    Cmp(Ordering, bool),
    Eq,
    Ne,
    And,
    Or,
    Not,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Tok>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Tok::RParen);
                i += 1;
            }
            '\'' | '"' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == c)
                    .map(|offset| i + 1 + offset)
                    .ok_or_else(|| ProcessError::evaluation("unterminated string literal"))?;
                tokens.push(Tok::Str(chars[i + 1..end].iter().collect()));
                i = end + 1;
            }
            '&' | '|' | '=' => {
                if chars.get(i + 1) != Some(&c) {
                    return Err(ProcessError::evaluation(format!(
                        "unexpected '{}' in expression",
                        c
                    )));
                }
                tokens.push(match c {
                    '&' => Tok::And,
                    '|' => Tok::Or,
                    _ => Tok::Eq,
                });
                i += 2;
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Tok::Ne);
                    i += 2;
                } else {
                    tokens.push(Tok::Not);
                    i += 1;
                }
            }
            '<' | '>' => {
                let ordering = if c == '<' {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
                let inclusive = chars.get(i + 1) == Some(&'=');
                tokens.push(Tok::Cmp(ordering, inclusive));
                i += if inclusive { 2 } else { 1 };
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text.parse::<f64>().map_err(|e| {
                    ProcessError::evaluation(format!("invalid number '{}': {}", text, e))
                })?;
                tokens.push(Tok::Num(number));
            }
            c if c.is_alphanumeric() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '.' | '-'))
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Tok::Bool(true),
                    "false" => Tok::Bool(false),
                    "null" => Tok::Null,
                    _ => Tok::Path(word),
                });
            }
            other => {
                return Err(ProcessError::evaluation(format!(
                    "unexpected character '{}' in expression",
                    other
                )))
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Tok>,
    pos: usize,
    lookup: &'a dyn Fn(&str) -> Option<Value>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expr(&mut self) -> Result<Value> {
        let mut left = self.and()?;
        while self.peek() == Some(&Tok::Or) {
            self.pos += 1;
            let right = self.and()?;
            left = Value::Bool(truthy(&left) || truthy(&right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Value> {
        let mut left = self.unary()?;
        while self.peek() == Some(&Tok::And) {
            self.pos += 1;
            let right = self.unary()?;
            left = Value::Bool(truthy(&left) && truthy(&right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Value> {
        if self.peek() == Some(&Tok::Not) {
            self.pos += 1;
            let value = self.unary()?;
            return Ok(Value::Bool(!truthy(&value)));
        }
        self.compare()
    }

    fn compare(&mut self) -> Result<Value> {
        let left = self.operand()?;
        let op = match self.peek() {
            Some(tok @ (Tok::Eq | Tok::Ne | Tok::Cmp(..))) => tok.clone(),
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.operand()?;

        let result = match op {
            Tok::Eq => loosely_equal(&left, &right),
            Tok::Ne => !loosely_equal(&left, &right),
            Tok::Cmp(ordering, inclusive) => match order(&left, &right) {
                Some(actual) => actual == ordering || (inclusive && actual == Ordering::Equal),
                None => false,
            },
            _ => false,
        };
        Ok(Value::Bool(result))
    }

    fn operand(&mut self) -> Result<Value> {
        match self.next() {
            Some(Tok::Str(s)) => Ok(Value::String(s)),
            Some(Tok::Num(n)) => Ok(serde_json::Number::from_f64(n)
                .map(Value::Number)
                .unwrap_or(Value::Null)),
            Some(Tok::Bool(b)) => Ok(Value::Bool(b)),
            Some(Tok::Null) => Ok(Value::Null),
            Some(Tok::Path(path)) => Ok(self.resolve(&path)),
            Some(Tok::LParen) => {
                let value = self.expr()?;
                match self.next() {
                    Some(Tok::RParen) => Ok(value),
                    _ => Err(ProcessError::evaluation("missing closing parenthesis")),
                }
            }
            other => Err(ProcessError::evaluation(format!(
                "expected an operand, found {:?}",
                other
            ))),
        }
    }

    fn resolve(&self, path: &str) -> Value {
        let mut segments = path.split('.');
        let Some(root) = segments.next().and_then(|name| (self.lookup)(name)) else {
            return Value::Null;
        };
        segments.fold(root, |value, segment| match value {
            Value::Object(mut map) => map.remove(segment).unwrap_or(Value::Null),
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.into_iter().nth(index))
                .unwrap_or(Value::Null),
            _ => Value::Null,
        })
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "false",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), _) | (_, Value::Number(_)) => {
            match (as_number(left), as_number(right)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        _ => left == right,
    }
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (as_number(left), as_number(right)) {
        return a.partial_cmp(&b);
    }
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn eval(expression: &str, vars: &HashMap<&str, Value>) -> EvalValue {
        evaluate_with(expression, &|name| vars.get(name).cloned()).unwrap()
    }

    #[test]
    fn test_bare_literals() {
        let vars = HashMap::new();
        assert_eq!(eval("true", &vars), EvalValue::Bool(true));
        assert_eq!(eval(" to b ", &vars), EvalValue::String("to b".into()));
    }

    #[test]
    fn test_variable_lookup() {
        let mut vars = HashMap::new();
        vars.insert("approved", json!(true));
        vars.insert("order", json!({"total": 250, "region": "eu"}));

        assert_eq!(eval("#{approved}", &vars), EvalValue::Bool(true));
        assert_eq!(eval("#{order.region}", &vars), EvalValue::String("eu".into()));
        assert_eq!(eval("#{missing}", &vars), EvalValue::Null);
    }

    #[test]
    fn test_comparisons() {
        let mut vars = HashMap::new();
        vars.insert("amount", json!(150));
        vars.insert("status", json!("open"));

        assert_eq!(eval("#{amount > 100}", &vars), EvalValue::Bool(true));
        assert_eq!(eval("#{amount <= 100}", &vars), EvalValue::Bool(false));
        assert_eq!(eval("${amount == '150'}", &vars), EvalValue::Bool(true));
        assert_eq!(eval("#{status != 'closed'}", &vars), EvalValue::Bool(true));
        assert_eq!(
            eval("#{amount > 100 && (status == 'open' || false)}", &vars),
            EvalValue::Bool(true)
        );
        assert_eq!(eval("#{!(amount > 100)}", &vars), EvalValue::Bool(false));
        assert_eq!(eval("#{amount >= -5}", &vars), EvalValue::Bool(true));
    }

    #[test]
    fn test_syntax_errors() {
        let vars: HashMap<&str, Value> = HashMap::new();
        assert!(evaluate_with("#{a = 1}", &|n| vars.get(n).cloned()).is_err());
        assert!(evaluate_with("#{'open}", &|n| vars.get(n).cloned()).is_err());
        assert!(evaluate_with("#{(a > 1}", &|n| vars.get(n).cloned()).is_err());
        assert!(evaluate_with("#{a b}", &|n| vars.get(n).cloned()).is_err());
    }
}
