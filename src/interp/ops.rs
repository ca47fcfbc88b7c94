//! Operators on values.
//!
//! Integers are 64-bit; every integer operation is checked and overflow
//! raises `OverflowError`. Operations involving a `Series` apply element by
//! element.

use super::{format, Exception, ExceptionKind};
use crate::ast::{BinOp, CmpOp, UnaryOp};
use crate::frame::Series;
use crate::value::{RangeValue, Value};
use std::cmp::Ordering;

/// Approximate heap size of one value slot, for allocation estimates.
pub const VALUE_SIZE: usize = std::mem::size_of::<Value>();

pub fn check_allocation(bytes: usize, limit: usize) -> Result<(), Exception> {
    if bytes > limit {
        Err(Exception::memory(bytes))
    } else {
        Ok(())
    }
}

fn unsupported(op: &str, l: &Value, r: &Value) -> Exception {
    Exception::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op,
        l.type_name(),
        r.type_name()
    ))
}

fn zero_division(message: &str) -> Exception {
    Exception::new(ExceptionKind::ZeroDivisionError, message)
}

fn repeat<T: Clone>(items: &[T], n: i64, unit: usize, limit: usize) -> Result<Vec<T>, Exception> {
    if n <= 0 || items.is_empty() {
        return Ok(Vec::new());
    }
    let count = (n as u128) * (items.len() as u128);
    let bytes = count.saturating_mul(unit as u128).min(usize::MAX as u128) as usize;
    check_allocation(bytes, limit)?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..n {
        out.extend_from_slice(items);
    }
    Ok(out)
}

fn int_op(op: BinOp, a: i64, b: i64) -> Result<Value, Exception> {
    let overflow = Exception::overflow;
    Ok(match op {
        BinOp::Add => Value::Int(a.checked_add(b).ok_or_else(overflow)?),
        BinOp::Sub => Value::Int(a.checked_sub(b).ok_or_else(overflow)?),
        BinOp::Mult => Value::Int(a.checked_mul(b).ok_or_else(overflow)?),
        BinOp::Div => {
            if b == 0 {
                return Err(zero_division("division by zero"));
            }
            Value::Float(a as f64 / b as f64)
        }
        BinOp::FloorDiv => {
            if b == 0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            let q = a.checked_div(b).ok_or_else(overflow)?;
            let q = if (a % b != 0) && ((a < 0) != (b < 0)) { q - 1 } else { q };
            Value::Int(q)
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            let r = a.checked_rem(b).unwrap_or(0);
            Value::Int(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r })
        }
        BinOp::Pow => {
            if b < 0 {
                if a == 0 {
                    return Err(zero_division("0.0 cannot be raised to a negative power"));
                }
                Value::Float((a as f64).powf(b as f64))
            } else {
                let exp = u32::try_from(b).map_err(|_| Exception::overflow())?;
                Value::Int(a.checked_pow(exp).ok_or_else(overflow)?)
            }
        }
        BinOp::LShift | BinOp::RShift => {
            if b < 0 {
                return Err(Exception::value_error("negative shift count"));
            }
            if op == BinOp::RShift {
                Value::Int(if b >= 64 { if a < 0 { -1 } else { 0 } } else { a >> b })
            } else if a == 0 {
                Value::Int(0)
            } else if b >= 64 {
                return Err(Exception::overflow());
            } else {
                let shifted = a << b;
                if shifted >> b != a {
                    return Err(Exception::overflow());
                }
                Value::Int(shifted)
            }
        }
        BinOp::BitOr => Value::Int(a | b),
        BinOp::BitXor => Value::Int(a ^ b),
        BinOp::BitAnd => Value::Int(a & b),
        BinOp::MatMult => {
            return Err(unsupported("@", &Value::Int(a), &Value::Int(b)));
        }
    })
}

fn float_op(op: BinOp, a: f64, b: f64, l: &Value, r: &Value) -> Result<Value, Exception> {
    Ok(Value::Float(match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mult => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(zero_division("float division by zero"));
            }
            a / b
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(zero_division("float floor division by zero"));
            }
            (a / b).floor()
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(zero_division("float modulo"));
            }
            let m = a % b;
            if m != 0.0 && ((m < 0.0) != (b < 0.0)) {
                m + b
            } else {
                m
            }
        }
        BinOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(zero_division("0.0 cannot be raised to a negative power"));
            }
            if a < 0.0 && b.fract() != 0.0 {
                return Err(Exception::value_error("math domain error"));
            }
            let v = a.powf(b);
            if v.is_infinite() && a.is_finite() && b.is_finite() {
                return Err(Exception::new(
                    ExceptionKind::OverflowError,
                    "(34, 'Numerical result out of range')",
                ));
            }
            v
        }
        _ => return Err(unsupported(op.symbol(), l, r)),
    }))
}

fn set_op(op: BinOp, a: &[Value], b: &[Value]) -> Option<Value> {
    let contains = |items: &[Value], v: &Value| items.iter().any(|x| x.py_eq(v));
    let items: Vec<Value> = match op {
        BinOp::BitOr => {
            let mut out = a.to_vec();
            for v in b {
                if !contains(&out, v) {
                    out.push(v.clone());
                }
            }
            out
        }
        BinOp::BitAnd => a.iter().filter(|v| contains(b, v)).cloned().collect(),
        BinOp::Sub => a.iter().filter(|v| !contains(b, v)).cloned().collect(),
        BinOp::BitXor => a
            .iter()
            .filter(|v| !contains(b, v))
            .chain(b.iter().filter(|v| !contains(a, v)))
            .cloned()
            .collect(),
        _ => return None,
    };
    Some(Value::Set(items))
}

/// Series combined with a scalar or a same-length series.
fn series_op(op: BinOp, l: &Value, r: &Value, limit: usize) -> Result<Value, Exception> {
    let (template, len) = match (l, r) {
        (Value::Series(s), _) | (_, Value::Series(s)) => (s, s.len()),
        _ => return Err(unsupported(op.symbol(), l, r)),
    };
    let element = |v: &Value, i: usize| -> Result<Value, Exception> {
        match v {
            Value::Series(s) => {
                if s.len() != len {
                    return Err(Exception::value_error(format!(
                        "Lengths must match: {} vs {}",
                        s.len(),
                        len
                    )));
                }
                Ok(s.values[i].clone())
            }
            other => Ok(other.clone()),
        }
    };
    let mut values = Vec::with_capacity(len);
    for i in 0..len {
        let (a, b) = (element(l, i)?, element(r, i)?);
        let is_logical = matches!(op, BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor);
        let v = if is_logical {
            if a.is_missing() || b.is_missing() {
                Value::Bool(false)
            } else {
                binary(op, &a, &b, limit)?
            }
        } else if a.is_missing() || b.is_missing() {
            Value::Float(f64::NAN)
        } else {
            match binary(op, &a, &b, limit) {
                Err(e) if e.kind == ExceptionKind::ZeroDivisionError => {
                    let x = a.as_f64().unwrap_or(0.0);
                    Value::Float(if x == 0.0 || x.is_nan() {
                        f64::NAN
                    } else {
                        x.signum() * f64::INFINITY
                    })
                }
                other => other?,
            }
        };
        values.push(v);
    }
    let name = match (l, r) {
        (Value::Series(a), Value::Series(b)) if a.name != b.name => None,
        _ => template.name.clone(),
    };
    Ok(Value::Series(Series {
        name,
        values,
        index: template.index.clone(),
    }))
}

/// `l <op> r`. `limit` caps the size of results built by repetition and
/// concatenation.
pub fn binary(op: BinOp, l: &Value, r: &Value, limit: usize) -> Result<Value, Exception> {
    if matches!(l, Value::Series(_)) || matches!(r, Value::Series(_)) {
        return series_op(op, l, r, limit);
    }
    match (l, r) {
        (Value::Bool(a), Value::Bool(b)) if matches!(op, BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor) => {
            Ok(Value::Bool(match op {
                BinOp::BitAnd => *a && *b,
                BinOp::BitOr => *a || *b,
                _ => a ^ b,
            }))
        }
        (Value::Int(_) | Value::Bool(_), Value::Int(_) | Value::Bool(_)) => {
            int_op(op, l.as_index().unwrap_or(0), r.as_index().unwrap_or(0))
        }
        (Value::Int(_) | Value::Bool(_) | Value::Float(_), Value::Int(_) | Value::Bool(_) | Value::Float(_)) => float_op(
            op,
            l.as_f64().unwrap_or(f64::NAN),
            r.as_f64().unwrap_or(f64::NAN),
            l,
            r,
        ),
        (Value::Str(a), Value::Str(b)) if op == BinOp::Add => {
            check_allocation(a.len() + b.len(), limit)?;
            Ok(Value::Str(format!("{}{}", a, b)))
        }
        (Value::Bytes(a), Value::Bytes(b)) if op == BinOp::Add => {
            check_allocation(a.len() + b.len(), limit)?;
            Ok(Value::Bytes([a.as_slice(), b.as_slice()].concat()))
        }
        (Value::List(a), Value::List(b)) if op == BinOp::Add => {
            check_allocation((a.len() + b.len()) * VALUE_SIZE, limit)?;
            Ok(Value::List([a.as_slice(), b.as_slice()].concat()))
        }
        (Value::Tuple(a), Value::Tuple(b)) if op == BinOp::Add => {
            check_allocation((a.len() + b.len()) * VALUE_SIZE, limit)?;
            Ok(Value::Tuple([a.as_slice(), b.as_slice()].concat()))
        }
        (Value::Str(s), n @ (Value::Int(_) | Value::Bool(_))) | (n @ (Value::Int(_) | Value::Bool(_)), Value::Str(s))
            if op == BinOp::Mult =>
        {
            let bytes = repeat(s.as_bytes(), n.as_index().unwrap_or(0), 1, limit)?;
            Ok(Value::Str(String::from_utf8(bytes).unwrap_or_default()))
        }
        (Value::List(items), n @ (Value::Int(_) | Value::Bool(_))) | (n @ (Value::Int(_) | Value::Bool(_)), Value::List(items))
            if op == BinOp::Mult =>
        {
            Ok(Value::List(repeat(items, n.as_index().unwrap_or(0), VALUE_SIZE, limit)?))
        }
        (Value::Tuple(items), n @ (Value::Int(_) | Value::Bool(_))) | (n @ (Value::Int(_) | Value::Bool(_)), Value::Tuple(items))
            if op == BinOp::Mult =>
        {
            Ok(Value::Tuple(repeat(items, n.as_index().unwrap_or(0), VALUE_SIZE, limit)?))
        }
        (Value::Str(template), values) if op == BinOp::Mod => {
            Ok(Value::Str(format::percent_format(template, values, limit)?))
        }
        (Value::Set(a), Value::Set(b)) => set_op(op, a, b).ok_or_else(|| unsupported(op.symbol(), l, r)),
        (Value::Dict(a), Value::Dict(b)) if op == BinOp::BitOr => {
            let mut out = a.clone();
            for (k, v) in b {
                match out.iter_mut().find(|(ok, _)| ok.py_eq(k)) {
                    Some(slot) => slot.1 = v.clone(),
                    None => out.push((k.clone(), v.clone())),
                }
            }
            Ok(Value::Dict(out))
        }
        _ => Err(unsupported(op.symbol(), l, r)),
    }
}

pub fn unary(op: UnaryOp, v: &Value) -> Result<Value, Exception> {
    match (op, v) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.truthy()?)),
        (_, Value::Series(s)) => {
            let values = s
                .values
                .iter()
                .map(|x| {
                    if x.is_missing() {
                        Ok(x.clone())
                    } else if op == UnaryOp::Invert && matches!(x, Value::Bool(_)) {
                        Ok(Value::Bool(!x.truthy()?))
                    } else {
                        unary(op, x)
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Series(s.with_values(values)))
        }
        (UnaryOp::Neg, Value::Int(_) | Value::Bool(_)) => Ok(Value::Int(
            v.as_index()
                .unwrap_or(0)
                .checked_neg()
                .ok_or_else(Exception::overflow)?,
        )),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Value::Int(_) | Value::Bool(_)) => Ok(Value::Int(v.as_index().unwrap_or(0))),
        (UnaryOp::Pos, Value::Float(f)) => Ok(Value::Float(*f)),
        (UnaryOp::Invert, Value::Int(_) | Value::Bool(_)) => {
            Ok(Value::Int(!v.as_index().unwrap_or(0)))
        }
        (op, v) => {
            let symbol = match op {
                UnaryOp::Neg => "-",
                UnaryOp::Pos => "+",
                _ => "~",
            };
            Err(Exception::type_error(format!(
                "bad operand type for unary {}: '{}'",
                symbol,
                v.type_name()
            )))
        }
    }
}

/// Partial order used by `<`-style operators. NaN compares unordered.
fn ordering(l: &Value, r: &Value) -> Result<Option<Ordering>, Exception> {
    match (l, r) {
        (Value::Float(_), _) | (_, Value::Float(_)) if l.is_numeric() && r.is_numeric() => {
            let (a, b) = (l.as_f64().unwrap_or(f64::NAN), r.as_f64().unwrap_or(f64::NAN));
            Ok(a.partial_cmp(&b))
        }
        _ => l.py_cmp(r).map(Some),
    }
}

fn range_contains(r: &RangeValue, i: i64) -> bool {
    let offset = i as i128 - r.start as i128;
    let step = r.step as i128;
    if offset % step != 0 {
        return false;
    }
    let k = offset / step;
    k >= 0 && k < r.len() as i128
}

fn identical(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::None, Value::None) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Library(a), Value::Library(b)) => a == b,
        (Value::Builtin(a), Value::Builtin(b)) => a == b,
        _ => false,
    }
}

pub fn contains(container: &Value, item: &Value) -> Result<bool, Exception> {
    Ok(match container {
        Value::Str(s) => match item {
            Value::Str(sub) => s.contains(sub.as_str()),
            other => {
                return Err(Exception::type_error(format!(
                    "'in <string>' requires string as left operand, not {}",
                    other.type_name()
                )))
            }
        },
        Value::Bytes(b) => match item {
            Value::Bytes(sub) => sub.is_empty() || b.windows(sub.len()).any(|w| w == sub.as_slice()),
            Value::Int(i) => b.iter().any(|x| *x as i64 == *i),
            other => {
                return Err(Exception::type_error(format!(
                    "a bytes-like object is required, not '{}'",
                    other.type_name()
                )))
            }
        },
        Value::List(items) | Value::Tuple(items) => items.iter().any(|v| v.py_eq(item)),
        Value::Set(items) => {
            item.check_hashable()?;
            items.iter().any(|v| v.py_eq(item))
        }
        Value::Dict(pairs) => {
            item.check_hashable()?;
            pairs.iter().any(|(k, _)| k.py_eq(item))
        }
        Value::Range(r) => match item {
            Value::Float(f) if f.fract() != 0.0 || !f.is_finite() => false,
            Value::Float(f) => range_contains(r, *f as i64),
            other => match other.as_index() {
                Some(i) => range_contains(r, i),
                None => false,
            },
        },
        Value::Table(t) => match item {
            Value::Str(name) => t.position(name).is_some(),
            _ => false,
        },
        Value::Series(s) => s.index.position(item).is_some(),
        other => {
            return Err(Exception::type_error(format!(
                "argument of type '{}' is not iterable",
                other.type_name()
            )))
        }
    })
}

fn series_compare(op: CmpOp, template: &Series, l: &Value, r: &Value) -> Result<Value, Exception> {
    let len = template.len();
    let element = |v: &Value, i: usize| -> Result<Value, Exception> {
        match v {
            Value::Series(s) if s.len() != len => Err(Exception::value_error(
                "Can only compare identically-labeled Series objects",
            )),
            Value::Series(s) => Ok(s.values[i].clone()),
            other => Ok(other.clone()),
        }
    };
    let mut values = Vec::with_capacity(len);
    for i in 0..len {
        let (a, b) = (element(l, i)?, element(r, i)?);
        let v = if a.is_missing() || b.is_missing() {
            op == CmpOp::NotEq
        } else {
            compare(op, &a, &b)?.truthy()?
        };
        values.push(Value::Bool(v));
    }
    Ok(Value::Series(template.with_values(values)))
}

/// One comparison. Returns a bool, or a bool series when a series is
/// involved.
pub fn compare(op: CmpOp, l: &Value, r: &Value) -> Result<Value, Exception> {
    if let (Value::Series(s), _) | (_, Value::Series(s)) = (l, r) {
        if !matches!(op, CmpOp::Is | CmpOp::IsNot | CmpOp::In | CmpOp::NotIn) {
            return series_compare(op, s, l, r);
        }
    }
    let result = match op {
        CmpOp::Eq => l.py_eq(r),
        CmpOp::NotEq => !l.py_eq(r),
        CmpOp::Is => identical(l, r),
        CmpOp::IsNot => !identical(l, r),
        CmpOp::In => contains(r, l)?,
        CmpOp::NotIn => !contains(r, l)?,
        CmpOp::Lt | CmpOp::LtE | CmpOp::Gt | CmpOp::GtE => {
            let symbol = match op {
                CmpOp::Lt => "<",
                CmpOp::LtE => "<=",
                CmpOp::Gt => ">",
                _ => ">=",
            };
            let ord = ordering(l, r).map_err(|_| {
                Exception::type_error(format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    symbol,
                    l.type_name(),
                    r.type_name()
                ))
            })?;
            match ord {
                None => false,
                Some(ord) => match op {
                    CmpOp::Lt => ord == Ordering::Less,
                    CmpOp::LtE => ord != Ordering::Greater,
                    CmpOp::Gt => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                },
            }
        }
    };
    Ok(Value::Bool(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: usize = 1 << 20;

    fn bin(op: BinOp, l: Value, r: Value) -> Result<Value, Exception> {
        binary(op, &l, &r, LIMIT)
    }

    #[test]
    fn test_integer_semantics() {
        assert_eq!(bin(BinOp::FloorDiv, Value::Int(-7), Value::Int(2)).unwrap(), Value::Int(-4));
        assert_eq!(bin(BinOp::Mod, Value::Int(-7), Value::Int(2)).unwrap(), Value::Int(1));
        assert_eq!(bin(BinOp::Div, Value::Int(7), Value::Int(2)).unwrap(), Value::Float(3.5));
        assert_eq!(bin(BinOp::Pow, Value::Int(2), Value::Int(-1)).unwrap(), Value::Float(0.5));
        assert_eq!(bin(BinOp::Add, Value::Bool(true), Value::Int(1)).unwrap(), Value::Int(2));
        let err = bin(BinOp::Mult, Value::Int(i64::MAX), Value::Int(2)).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::OverflowError);
        let err = bin(BinOp::Mod, Value::Int(1), Value::Int(0)).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::ZeroDivisionError);
    }

    #[test]
    fn test_float_modulo_follows_divisor_sign() {
        assert_eq!(
            bin(BinOp::Mod, Value::Float(-1.0), Value::Float(3.0)).unwrap(),
            Value::Float(2.0)
        );
    }

    #[test]
    fn test_sequences() {
        assert_eq!(
            bin(BinOp::Mult, Value::from("ab"), Value::Int(3)).unwrap(),
            Value::from("ababab")
        );
        assert_eq!(
            bin(BinOp::Add, Value::List(vec![Value::Int(1)]), Value::List(vec![Value::Int(2)]))
                .unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
        let err = bin(BinOp::Add, Value::from("a"), Value::Int(1)).unwrap_err();
        assert_eq!(
            err.message,
            "unsupported operand type(s) for +: 'str' and 'int'"
        );
    }

    #[test]
    fn test_repeat_respects_limit() {
        let err = bin(BinOp::Mult, Value::List(vec![Value::Int(0)]), Value::Int(10_000_000_000))
            .unwrap_err();
        assert_eq!(err.kind, ExceptionKind::MemoryError);
    }

    #[test]
    fn test_series_arithmetic_and_masks() {
        let s = Value::Series(Series::new(
            Some("sales".into()),
            vec![Value::Int(10), Value::None, Value::Int(5)],
        ));
        let Value::Series(doubled) = bin(BinOp::Mult, s.clone(), Value::Int(2)).unwrap() else {
            panic!("expected series");
        };
        assert_eq!(doubled.values[0], Value::Int(20));
        assert!(doubled.values[1].is_missing());
        assert_eq!(doubled.name.as_deref(), Some("sales"));

        let Value::Series(mask) = compare(CmpOp::Gt, &s, &Value::Int(6)).unwrap() else {
            panic!("expected series");
        };
        assert_eq!(
            mask.values,
            vec![Value::Bool(true), Value::Bool(false), Value::Bool(false)]
        );
        let Value::Series(inverted) = unary(UnaryOp::Invert, &Value::Series(mask)).unwrap() else {
            panic!("expected series");
        };
        assert_eq!(inverted.values[1], Value::Bool(true));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(
            compare(CmpOp::Lt, &Value::Int(1), &Value::Float(1.5)).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            compare(CmpOp::Lt, &Value::Float(f64::NAN), &Value::Int(1)).unwrap(),
            Value::Bool(false)
        );
        let err = compare(CmpOp::Lt, &Value::Int(1), &Value::from("a")).unwrap_err();
        assert_eq!(
            err.message,
            "'<' not supported between instances of 'int' and 'str'"
        );
        assert_eq!(
            compare(CmpOp::In, &Value::from("ll"), &Value::from("hello")).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            compare(CmpOp::IsNot, &Value::Int(1), &Value::None).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_range_membership() {
        let r = Value::Range(crate::value::RangeValue {
            start: 0,
            stop: 10,
            step: 3,
        });
        assert!(contains(&r, &Value::Int(9)).unwrap());
        assert!(!contains(&r, &Value::Int(10)).unwrap());
        assert!(!contains(&r, &Value::Int(4)).unwrap());
    }
}
