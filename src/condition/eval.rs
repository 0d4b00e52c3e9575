//! 条件表达式求值
//!
//! 求值环境是一个 JSON 对象，缺失字段一律视为 `nil`。

use super::parser::{BinaryOp, Builtin, Expr, Pattern, UnaryOp};
use regex::Regex;
use serde_json::{Number, Value};
use std::cmp::Ordering;

/// 返回值类型名称，用于错误信息
pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}

/// 对语法树求值
pub(crate) fn eval(expr: &Expr, env: &Value) -> Result<Value, String> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Array(items) => items
            .iter()
            .map(|item| eval(item, env))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Expr::Ident(name) => Ok(env.get(name).cloned().unwrap_or(Value::Null)),
        Expr::Member(target, field) => {
            let target = eval(target, env)?;
            Ok(target.get(field).cloned().unwrap_or(Value::Null))
        }
        Expr::Index(target, index) => {
            let target = eval(target, env)?;
            let index = eval(index, env)?;
            Ok(lookup_index(&target, &index))
        }
        Expr::Unary(op, operand) => {
            let value = eval(operand, env)?;
            match op {
                UnaryOp::Not => match value {
                    Value::Bool(b) => Ok(Value::Bool(!b)),
                    other => Err(format!("invalid operation: !{}", type_name(&other))),
                },
                UnaryOp::Neg => negate(&value),
            }
        }
        Expr::Binary(BinaryOp::And, lhs, rhs) => {
            if !expect_bool(eval(lhs, env)?, "&&")? {
                return Ok(Value::Bool(false));
            }
            expect_bool(eval(rhs, env)?, "&&").map(Value::Bool)
        }
        Expr::Binary(BinaryOp::Or, lhs, rhs) => {
            if expect_bool(eval(lhs, env)?, "||")? {
                return Ok(Value::Bool(true));
            }
            expect_bool(eval(rhs, env)?, "||").map(Value::Bool)
        }
        Expr::Binary(op, lhs, rhs) => {
            let lhs = eval(lhs, env)?;
            let rhs = eval(rhs, env)?;
            binary(*op, &lhs, &rhs)
        }
        Expr::Matches(lhs, pattern) => {
            let lhs = eval(lhs, env)?;
            let text = match lhs {
                Value::Null => return Ok(Value::Bool(false)),
                Value::String(s) => s,
                other => {
                    return Err(format!(
                        "invalid operation: {} matches string",
                        type_name(&other)
                    ))
                }
            };
            let matched = match pattern {
                Pattern::Static(regex) => regex.is_match(&text),
                Pattern::Dynamic(source) => match eval(source, env)? {
                    Value::String(source) => Regex::new(&source)
                        .map_err(|e| format!("invalid regex '{}': {}", source, e))?
                        .is_match(&text),
                    other => {
                        return Err(format!(
                            "invalid operation: string matches {}",
                            type_name(&other)
                        ))
                    }
                },
            };
            Ok(Value::Bool(matched))
        }
        Expr::Call(builtin, args) => {
            let arg = match args.first() {
                Some(arg) => eval(arg, env)?,
                None => Value::Null,
            };
            call(*builtin, arg)
        }
    }
}

fn expect_bool(value: Value, op: &str) -> Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(format!(
            "invalid operation: operator {} expects bool, got {}",
            op,
            type_name(&other)
        )),
    }
}

fn lookup_index(target: &Value, index: &Value) -> Value {
    match (target, index) {
        (Value::Object(map), Value::String(key)) => map.get(key).cloned().unwrap_or(Value::Null),
        (Value::Array(items), Value::Number(n)) => {
            let Some(i) = n.as_i64() else {
                return Value::Null;
            };
            let len = items.len() as i64;
            let i = if i < 0 { len + i } else { i };
            if i < 0 {
                return Value::Null;
            }
            items.get(i as usize).cloned().unwrap_or(Value::Null)
        }
        _ => Value::Null,
    }
}

fn negate(value: &Value) -> Result<Value, String> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.checked_neg()
                    .map(Value::from)
                    .ok_or_else(|| "integer overflow".to_string())
            } else {
                float_value(-n.as_f64().unwrap_or_default())
            }
        }
        other => Err(format!("invalid operation: -{}", type_name(other))),
    }
}

fn float_value(f: f64) -> Result<Value, String> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| "arithmetic produced a non-finite number".to_string())
}

/// 结构相等，数字按数值比较（`1 == 1.0`）
pub(crate) fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        _ => lhs == rhs,
    }
}

fn compare(lhs: &Value, rhs: &Value) -> Result<Ordering, String> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                return Ok(a.cmp(&b));
            }
            let a = a.as_f64().unwrap_or_default();
            let b = b.as_f64().unwrap_or_default();
            a.partial_cmp(&b)
                .ok_or_else(|| "cannot order NaN".to_string())
        }
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(format!(
            "invalid operation: cannot compare {} and {}",
            type_name(lhs),
            type_name(rhs)
        )),
    }
}

fn membership(needle: &Value, haystack: &Value) -> Result<bool, String> {
    match haystack {
        Value::Null => Ok(false),
        Value::Array(items) => Ok(items.iter().any(|item| values_equal(item, needle))),
        Value::Object(map) => match needle {
            Value::String(key) => Ok(map.contains_key(key)),
            Value::Null => Ok(false),
            other => Err(format!(
                "invalid operation: {} in map",
                type_name(other)
            )),
        },
        Value::String(text) => match needle {
            Value::String(part) => Ok(text.contains(part.as_str())),
            Value::Null => Ok(false),
            other => Err(format!(
                "invalid operation: {} in string",
                type_name(other)
            )),
        },
        other => Err(format!(
            "invalid operation: {} in {}",
            type_name(needle),
            type_name(other)
        )),
    }
}

fn string_test(
    lhs: &Value,
    rhs: &Value,
    name: &str,
    test: fn(&str, &str) -> bool,
) -> Result<Value, String> {
    match (lhs, rhs) {
        (Value::Null, _) => Ok(Value::Bool(false)),
        (Value::String(a), Value::String(b)) => Ok(Value::Bool(test(a, b))),
        _ => Err(format!(
            "invalid operation: {} {} {}",
            type_name(lhs),
            name,
            type_name(rhs)
        )),
    }
}

fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, String> {
    let result = match op {
        BinaryOp::Eq => Value::Bool(values_equal(lhs, rhs)),
        BinaryOp::Ne => Value::Bool(!values_equal(lhs, rhs)),
        BinaryOp::Lt => Value::Bool(compare(lhs, rhs)? == Ordering::Less),
        BinaryOp::Le => Value::Bool(compare(lhs, rhs)? != Ordering::Greater),
        BinaryOp::Gt => Value::Bool(compare(lhs, rhs)? == Ordering::Greater),
        BinaryOp::Ge => Value::Bool(compare(lhs, rhs)? != Ordering::Less),
        BinaryOp::In => Value::Bool(membership(lhs, rhs)?),
        BinaryOp::NotIn => Value::Bool(!membership(lhs, rhs)?),
        BinaryOp::Contains => match lhs {
            Value::Array(_) | Value::Object(_) => Value::Bool(membership(rhs, lhs)?),
            _ => string_test(lhs, rhs, "contains", |a, b| a.contains(b))?,
        },
        BinaryOp::StartsWith => string_test(lhs, rhs, "startsWith", |a, b| a.starts_with(b))?,
        BinaryOp::EndsWith => string_test(lhs, rhs, "endsWith", |a, b| a.ends_with(b))?,
        BinaryOp::Add => match (lhs, rhs) {
            (Value::String(a), Value::String(b)) => Value::String(format!("{}{}", a, b)),
            (Value::Array(a), Value::Array(b)) => {
                Value::Array(a.iter().chain(b.iter()).cloned().collect())
            }
            _ => arithmetic(op, lhs, rhs)?,
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            arithmetic(op, lhs, rhs)?
        }
        BinaryOp::And | BinaryOp::Or => {
            let l = expect_bool(lhs.clone(), "logical")?;
            let r = expect_bool(rhs.clone(), "logical")?;
            Value::Bool(if op == BinaryOp::And { l && r } else { l || r })
        }
    };
    Ok(result)
}

fn arithmetic(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, String> {
    let (Value::Number(a), Value::Number(b)) = (lhs, rhs) else {
        return Err(format!(
            "invalid operation: {} {:?} {}",
            type_name(lhs),
            op,
            type_name(rhs)
        ));
    };

    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        let value = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Div | BinaryOp::Rem if b == 0 => {
                return Err("integer divide by zero".to_string())
            }
            BinaryOp::Div => a.checked_div(b),
            BinaryOp::Rem => a.checked_rem(b),
            _ => None,
        };
        return value
            .map(Value::from)
            .ok_or_else(|| "integer overflow".to_string());
    }

    let a = a.as_f64().unwrap_or_default();
    let b = b.as_f64().unwrap_or_default();
    let value = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        _ => return Err(format!("unsupported arithmetic operator {:?}", op)),
    };
    float_value(value)
}

fn call(builtin: Builtin, arg: Value) -> Result<Value, String> {
    match (builtin, arg) {
        (Builtin::Len, Value::Null) => Ok(Value::from(0)),
        (Builtin::Len, Value::String(s)) => Ok(Value::from(s.chars().count())),
        (Builtin::Len, Value::Array(items)) => Ok(Value::from(items.len())),
        (Builtin::Len, Value::Object(map)) => Ok(Value::from(map.len())),
        (Builtin::Lower, Value::String(s)) => Ok(Value::String(s.to_lowercase())),
        (Builtin::Upper, Value::String(s)) => Ok(Value::String(s.to_uppercase())),
        (Builtin::Lower | Builtin::Upper, Value::Null) => Ok(Value::String(String::new())),
        (builtin, other) => Err(format!(
            "invalid argument for {:?}: {}",
            builtin,
            type_name(&other)
        )),
    }
}
