use super::frames::float_to_int;
use super::ops::{self, check_allocation, VALUE_SIZE};
use super::{dict_insert, iterate, set_insert, Args, Exception, ExceptionKind, Flow, Interpreter};
use crate::ast::BinOp;
use crate::builtins::Builtin;
use crate::value::{RangeValue, Value};
use std::cmp::Ordering;

/// Round half to even at `ndigits` decimal places.
pub(super) fn round_to(x: f64, ndigits: i64) -> f64 {
    if !x.is_finite() || ndigits > 300 {
        return x;
    }
    if ndigits < -308 {
        return 0.0 * x;
    }
    let factor = 10f64.powi(ndigits as i32);
    let scaled = x * factor;
    if !scaled.is_finite() {
        return x;
    }
    scaled.round_ties_even() / factor
}

fn int_arg(value: &Value) -> Result<i64, Exception> {
    value.as_index().ok_or_else(|| {
        Exception::type_error(format!(
            "'{}' object cannot be interpreted as an integer",
            value.type_name()
        ))
    })
}

fn len_of(value: &Value) -> Result<usize, Exception> {
    Ok(match value {
        Value::Str(s) => s.chars().count(),
        Value::Bytes(b) => b.len(),
        Value::List(v) | Value::Tuple(v) | Value::Set(v) => v.len(),
        Value::Dict(d) => d.len(),
        Value::Range(r) => r.len(),
        Value::Table(t) => t.num_rows(),
        Value::Series(s) => s.len(),
        Value::GroupBy(g) => g.len(),
        other => {
            return Err(Exception::type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )))
        }
    })
}

fn parse_int(text: &str, base: u32) -> Result<i64, Exception> {
    let invalid = || {
        Exception::value_error(format!(
            "invalid literal for int() with base {}: {}",
            base,
            Value::from(text).repr()
        ))
    };
    let trimmed = text.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let digits = match base {
        16 => digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")).unwrap_or(digits),
        8 => digits.strip_prefix("0o").or_else(|| digits.strip_prefix("0O")).unwrap_or(digits),
        2 => digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")).unwrap_or(digits),
        _ => digits,
    };
    if digits.is_empty()
        || digits.starts_with('_')
        || digits.ends_with('_')
        || digits.contains("__")
    {
        return Err(invalid());
    }
    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
    let magnitude = i128::from_str_radix(&cleaned, base).map_err(|_| invalid())?;
    let value = if negative { -magnitude } else { magnitude };
    i64::try_from(value).map_err(|_| Exception::overflow())
}

fn parse_float(text: &str) -> Result<f64, Exception> {
    let original = Value::from(text);
    let trimmed = text.trim();
    let lowered = trimmed.to_ascii_lowercase();
    let (sign, body) = match lowered.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, lowered.strip_prefix('+').unwrap_or(&lowered)),
    };
    match body {
        "inf" | "infinity" => return Ok(sign * f64::INFINITY),
        "nan" => return Ok(f64::NAN),
        _ => {}
    }
    let valid = !body.is_empty()
        && body
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | '+' | '-' | '_'));
    if !valid {
        return Err(Exception::value_error(format!(
            "could not convert string to float: {}",
            original.repr()
        )));
    }
    body.replace('_', "")
        .parse::<f64>()
        .map(|f| sign * f)
        .map_err(|_| {
            Exception::value_error(format!(
                "could not convert string to float: {}",
                original.repr()
            ))
        })
}

impl Interpreter {
    /// Collect an iterable, polling the interrupt and the memory ceiling.
    fn collect(&mut self, value: Value) -> Flow<Vec<Value>> {
        if let Value::Range(r) = &value {
            check_allocation(r.len().saturating_mul(VALUE_SIZE), self.memory_limit())?;
        }
        let mut out = Vec::new();
        for item in iterate(value)? {
            self.tick()?;
            out.push(item);
            check_allocation(out.len() * VALUE_SIZE, self.memory_limit())?;
        }
        Ok(out)
    }

    fn call1(&mut self, func: &Value, arg: Value) -> Flow<Value> {
        self.call_value(func.clone(), Args::new(vec![arg]))
    }

    fn extreme(&mut self, builtin: Builtin, args: Args) -> Flow<Value> {
        let func = builtin.name();
        args.check(func, usize::MAX, &["key", "default"])?;
        let key = args.keyword("key").filter(|k| !k.is_none()).cloned();
        let candidates = match args.positional.len() {
            0 => {
                return Err(Exception::type_error(format!(
                    "{} expected at least 1 argument, got 0",
                    func
                ))
                .into())
            }
            1 => iterate(args.positional[0].clone())?,
            _ => {
                if args.keyword("default").is_some() {
                    return Err(Exception::type_error(format!(
                        "Cannot specify a default for {}() with multiple positional arguments",
                        func
                    ))
                    .into());
                }
                iterate(Value::List(args.positional.clone()))?
            }
        };
        let wanted = if builtin == Builtin::Min {
            Ordering::Less
        } else {
            Ordering::Greater
        };
        let mut best: Option<(Value, Value)> = None;
        for item in candidates {
            self.tick()?;
            let k = match &key {
                Some(f) => self.call1(f, item.clone())?,
                None => item.clone(),
            };
            let replace = match &best {
                None => true,
                Some((best_key, _)) => k.py_cmp(best_key)? == wanted,
            };
            if replace {
                best = Some((k, item));
            }
        }
        match best {
            Some((_, item)) => Ok(item),
            None => args.keyword("default").cloned().ok_or_else(|| {
                Exception::value_error(format!("{}() arg is an empty sequence", func)).into()
            }),
        }
    }

    fn round(&mut self, args: &Args) -> Flow<Value> {
        args.check("round", 2, &["number", "ndigits"])?;
        let number = args.require("round", 0, "number")?;
        let ndigits = match args.get(1, "ndigits") {
            None | Some(Value::None) => None,
            Some(v) => Some(int_arg(v)?),
        };
        Ok(match (number, ndigits) {
            (Value::Int(_) | Value::Bool(_), None) => Value::Int(int_arg(number)?),
            (Value::Int(_) | Value::Bool(_), Some(nd)) if nd >= 0 => Value::Int(int_arg(number)?),
            (Value::Int(_) | Value::Bool(_), Some(nd)) => {
                let rounded = round_to(int_arg(number)? as f64, nd);
                float_to_int(rounded)?
            }
            (Value::Float(f), None) => float_to_int(f.round_ties_even())?,
            (Value::Float(f), Some(nd)) => Value::Float(round_to(*f, nd)),
            (Value::Series(s), nd) => {
                let nd = nd.unwrap_or(0);
                Value::Series(s.with_values(
                    s.values
                        .iter()
                        .map(|v| match v {
                            Value::Float(f) => Value::Float(round_to(*f, nd)),
                            other => other.clone(),
                        })
                        .collect(),
                ))
            }
            (other, _) => {
                return Err(Exception::type_error(format!(
                    "type {} doesn't define __round__ method",
                    other.type_name()
                ))
                .into())
            }
        })
    }

    fn to_int(&mut self, args: &Args) -> Flow<Value> {
        args.check("int", 2, &["base"])?;
        let Some(value) = args.positional.first() else {
            return Ok(Value::Int(0));
        };
        let base = match args.get(1, "base") {
            None => None,
            Some(b) => {
                let b = int_arg(b)?;
                if !(2..=36).contains(&b) {
                    return Err(Exception::value_error("int() base must be >= 2 and <= 36, or 0").into());
                }
                Some(b as u32)
            }
        };
        Ok(match (value, base) {
            (Value::Str(s), base) => Value::Int(parse_int(s, base.unwrap_or(10))?),
            (_, Some(_)) => {
                return Err(Exception::type_error("int() can't convert non-string with explicit base").into())
            }
            (Value::Int(_) | Value::Bool(_), None) => Value::Int(int_arg(value)?),
            (Value::Float(f), None) => float_to_int(f.trunc())?,
            (other, None) => {
                return Err(Exception::type_error(format!(
                    "int() argument must be a string, a bytes-like object or a real number, not '{}'",
                    other.type_name()
                ))
                .into())
            }
        })
    }

    fn to_float(&mut self, args: &Args) -> Flow<Value> {
        args.check("float", 1, &[])?;
        Ok(match args.positional.first() {
            None => Value::Float(0.0),
            Some(Value::Str(s)) => Value::Float(parse_float(s)?),
            Some(v) => match v.as_f64() {
                Some(f) => Value::Float(f),
                None => {
                    return Err(Exception::type_error(format!(
                        "float() argument must be a string or a real number, not '{}'",
                        v.type_name()
                    ))
                    .into())
                }
            },
        })
    }

    fn sum(&mut self, args: &Args) -> Flow<Value> {
        args.check("sum", 2, &["start"])?;
        let mut total = args.get(1, "start").cloned().unwrap_or(Value::Int(0));
        if matches!(total, Value::Str(_)) {
            return Err(Exception::type_error("sum() can't sum strings [use ''.join(seq) instead]").into());
        }
        let limit = self.memory_limit();
        for item in iterate(args.require("sum", 0, "iterable")?.clone())? {
            self.tick()?;
            total = ops::binary(BinOp::Add, &total, &item, limit)?;
        }
        Ok(total)
    }

    fn print(&mut self, args: &Args) -> Flow<Value> {
        args.check("print", usize::MAX, &["sep", "end"])?;
        let text_option = |name: &str, default: &str| -> Result<String, Exception> {
            match args.keyword(name) {
                None | Some(Value::None) => Ok(default.to_string()),
                Some(Value::Str(s)) => Ok(s.clone()),
                Some(other) => Err(Exception::type_error(format!(
                    "{} must be None or a string, not {}",
                    name,
                    other.type_name()
                ))),
            }
        };
        let sep = text_option("sep", " ")?;
        let end = text_option("end", "\n")?;
        let mut line = args
            .positional
            .iter()
            .map(Value::to_str)
            .collect::<Vec<_>>()
            .join(&sep);
        line.push_str(&end);
        self.write_stdout(&line)?;
        Ok(Value::None)
    }

    pub(super) fn call_builtin(&mut self, builtin: Builtin, args: Args) -> Flow<Value> {
        let name = builtin.name();
        let limit = self.memory_limit();
        let first = || args.positional.first().cloned();
        match builtin {
            Builtin::Len => {
                args.check(name, 1, &[])?;
                let len = len_of(args.require(name, 0, "obj")?)?;
                let len = i64::try_from(len).map_err(|_| {
                    Exception::new(
                        ExceptionKind::OverflowError,
                        "Python int too large to convert to C ssize_t",
                    )
                })?;
                Ok(Value::Int(len))
            }
            Builtin::Range => {
                args.check(name, 3, &[])?;
                let ints = args
                    .positional
                    .iter()
                    .map(int_arg)
                    .collect::<Result<Vec<_>, _>>()?;
                let (start, stop, step) = match ints.as_slice() {
                    [stop] => (0, *stop, 1),
                    [start, stop] => (*start, *stop, 1),
                    [start, stop, step] => (*start, *stop, *step),
                    _ => return Err(Exception::type_error("range expected at least 1 argument, got 0").into()),
                };
                if step == 0 {
                    return Err(Exception::value_error("range() arg 3 must not be zero").into());
                }
                Ok(Value::Range(RangeValue { start, stop, step }))
            }
            Builtin::Min | Builtin::Max => self.extreme(builtin, args),
            Builtin::Sum => self.sum(&args),
            Builtin::Sorted => {
                args.check(name, 1, &["key", "reverse"])?;
                let mut items = self.collect(args.require(name, 0, "iterable")?.clone())?;
                let reverse = args.flag(usize::MAX, "reverse", false)?;
                self.sort_values(&mut items, args.keyword("key").cloned(), reverse)?;
                Ok(Value::List(items))
            }
            Builtin::Abs => {
                args.check(name, 1, &[])?;
                match args.require(name, 0, "x")? {
                    Value::Int(i) => Ok(i.checked_abs().map(Value::Int).ok_or_else(Exception::overflow)?),
                    Value::Bool(b) => Ok(Value::Int(*b as i64)),
                    Value::Float(f) => Ok(Value::Float(f.abs())),
                    Value::Series(s) => {
                        let mut s = s.clone();
                        Ok(super::frames::series_method(&mut s, "abs", &Args::default())?)
                    }
                    other => Err(Exception::type_error(format!(
                        "bad operand type for abs(): '{}'",
                        other.type_name()
                    ))
                    .into()),
                }
            }
            Builtin::Round => self.round(&args),
            Builtin::Enumerate => {
                args.check(name, 2, &["start"])?;
                let mut n = args.int(1, "start", 0)?;
                let items = self.collect(args.require(name, 0, "iterable")?.clone())?;
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(Value::Tuple(vec![Value::Int(n), item]));
                    n = n.checked_add(1).ok_or_else(Exception::overflow)?;
                }
                Ok(Value::List(out))
            }
            Builtin::Zip => {
                args.check(name, usize::MAX, &[])?;
                let mut columns = Vec::with_capacity(args.len());
                for value in &args.positional {
                    columns.push(iterate(value.clone())?);
                }
                let mut out = Vec::new();
                if columns.is_empty() {
                    return Ok(Value::List(out));
                }
                'rows: loop {
                    self.tick()?;
                    let mut row = Vec::with_capacity(columns.len());
                    for column in columns.iter_mut() {
                        match column.next() {
                            Some(v) => row.push(v),
                            None => break 'rows,
                        }
                    }
                    out.push(Value::Tuple(row));
                    check_allocation(out.len() * columns.len() * VALUE_SIZE, limit)?;
                }
                Ok(Value::List(out))
            }
            Builtin::Any | Builtin::All => {
                args.check(name, 1, &[])?;
                let want = builtin == Builtin::Any;
                for item in iterate(args.require(name, 0, "iterable")?.clone())? {
                    self.tick()?;
                    if item.truthy()? == want {
                        return Ok(Value::Bool(want));
                    }
                }
                Ok(Value::Bool(!want))
            }
            Builtin::Map => {
                args.check(name, usize::MAX, &[])?;
                let func = args.require(name, 0, "func")?.clone();
                let mut iters = Vec::new();
                for value in args.positional.iter().skip(1) {
                    iters.push(iterate(value.clone())?);
                }
                if iters.is_empty() {
                    return Err(Exception::type_error("map() must have at least two arguments.").into());
                }
                let mut out = Vec::new();
                'items: loop {
                    self.tick()?;
                    let mut call_args = Vec::with_capacity(iters.len());
                    for it in iters.iter_mut() {
                        match it.next() {
                            Some(v) => call_args.push(v),
                            None => break 'items,
                        }
                    }
                    out.push(self.call_value(func.clone(), Args::new(call_args))?);
                    check_allocation(out.len() * VALUE_SIZE, limit)?;
                }
                Ok(Value::List(out))
            }
            Builtin::Filter => {
                args.check(name, 2, &[])?;
                let func = args.require(name, 0, "function")?.clone();
                let mut out = Vec::new();
                for item in iterate(args.require(name, 1, "iterable")?.clone())? {
                    self.tick()?;
                    let keep = match &func {
                        Value::None => item.truthy()?,
                        f => self.call1(f, item.clone())?.truthy()?,
                    };
                    if keep {
                        out.push(item);
                    }
                }
                Ok(Value::List(out))
            }
            Builtin::List | Builtin::Tuple => {
                args.check(name, 1, &[])?;
                let items = match first() {
                    Some(v) => self.collect(v)?,
                    None => Vec::new(),
                };
                Ok(if builtin == Builtin::List {
                    Value::List(items)
                } else {
                    Value::Tuple(items)
                })
            }
            Builtin::Set => {
                args.check(name, 1, &[])?;
                let mut out = Vec::new();
                if let Some(v) = first() {
                    for item in self.collect(v)? {
                        set_insert(&mut out, item)?;
                    }
                }
                Ok(Value::Set(out))
            }
            Builtin::Dict => {
                args.check(name, 1, &[])?;
                let mut pairs: Vec<(Value, Value)> = Vec::new();
                match first() {
                    None => {}
                    Some(Value::Dict(existing)) => pairs = existing,
                    Some(v) => {
                        for (i, item) in self.collect(v)?.into_iter().enumerate() {
                            let pair: Vec<Value> = iterate(item)?.collect();
                            let [k, v]: [Value; 2] = pair.try_into().map_err(|p: Vec<Value>| {
                                Exception::value_error(format!(
                                    "dictionary update sequence element #{} has length {}; 2 is required",
                                    i,
                                    p.len()
                                ))
                            })?;
                            dict_insert(&mut pairs, k, v)?;
                        }
                    }
                }
                for (k, v) in &args.keywords {
                    dict_insert(&mut pairs, Value::Str(k.clone()), v.clone())?;
                }
                Ok(Value::Dict(pairs))
            }
            Builtin::Reversed => {
                args.check(name, 1, &[])?;
                let seq = args.require(name, 0, "sequence")?.clone();
                if let Value::Set(_) | Value::GroupBy(_) = seq {
                    return Err(Exception::type_error(format!(
                        "'{}' object is not reversible",
                        seq.type_name()
                    ))
                    .into());
                }
                let mut items = self.collect(seq)?;
                items.reverse();
                Ok(Value::List(items))
            }
            Builtin::Str => {
                args.check(name, 1, &[])?;
                Ok(Value::Str(first().map(|v| v.to_str()).unwrap_or_default()))
            }
            Builtin::Int => self.to_int(&args),
            Builtin::Float => self.to_float(&args),
            Builtin::Bool => {
                args.check(name, 1, &[])?;
                Ok(Value::Bool(match first() {
                    Some(v) => v.truthy()?,
                    None => false,
                }))
            }
            Builtin::Print => self.print(&args),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::Interrupt;
    use crate::interp::{ExceptionKind, RunLimits};
    use std::collections::BTreeMap;

    fn interp() -> Interpreter {
        Interpreter::new(BTreeMap::new(), Interrupt::new(), RunLimits::default())
    }

    fn call(builtin: Builtin, positional: Vec<Value>) -> Flow<Value> {
        interp().call_builtin(builtin, Args::new(positional))
    }

    fn raised(result: Flow<Value>) -> Exception {
        match result {
            Err(super::super::Signal::Raise(e)) => e,
            other => panic!("expected exception, got {:?}", other),
        }
    }

    #[test]
    fn test_round_half_even() {
        assert_eq!(call(Builtin::Round, vec![Value::Float(2.5)]).unwrap(), Value::Int(2));
        assert_eq!(call(Builtin::Round, vec![Value::Float(3.5)]).unwrap(), Value::Int(4));
        assert_eq!(
            call(Builtin::Round, vec![Value::Float(0.125), Value::Int(2)]).unwrap(),
            Value::Float(0.12)
        );
        let err = raised(call(Builtin::Round, vec![Value::Float(f64::NAN)]));
        assert_eq!(err.message, "cannot convert float NaN to integer");
    }

    #[test]
    fn test_int_and_float_parsing() {
        assert_eq!(call(Builtin::Int, vec![" 42 ".into()]).unwrap(), Value::Int(42));
        assert_eq!(call(Builtin::Int, vec!["ff".into(), Value::Int(16)]).unwrap(), Value::Int(255));
        assert_eq!(call(Builtin::Int, vec![Value::Float(-2.9)]).unwrap(), Value::Int(-2));
        let err = raised(call(Builtin::Int, vec!["x".into()]));
        assert_eq!(err.message, "invalid literal for int() with base 10: 'x'");
        assert_eq!(call(Builtin::Float, vec!["1e3".into()]).unwrap(), Value::Float(1000.0));
        let err = raised(call(Builtin::Float, vec!["abc".into()]));
        assert_eq!(err.message, "could not convert string to float: 'abc'");
    }

    #[test]
    fn test_range_and_len() {
        let err = raised(call(Builtin::Range, vec![Value::Int(0), Value::Int(5), Value::Int(0)]));
        assert_eq!(err.message, "range() arg 3 must not be zero");
        let r = call(Builtin::Range, vec![Value::Int(10)]).unwrap();
        assert_eq!(call(Builtin::Len, vec![r]).unwrap(), Value::Int(10));
        let err = raised(call(Builtin::Len, vec![Value::Int(3)]));
        assert_eq!(err.message, "object of type 'int' has no len()");
    }

    #[test]
    fn test_len_overflow() {
        let r = call(Builtin::Range, vec![Value::Int(i64::MIN), Value::Int(i64::MAX)]).unwrap();
        let err = raised(call(Builtin::Len, vec![r]));
        assert_eq!(err.kind, ExceptionKind::OverflowError);
        let r = call(Builtin::Range, vec![Value::Int(i64::MIN + 1), Value::Int(0)]).unwrap();
        assert_eq!(call(Builtin::Len, vec![r]).unwrap(), Value::Int(i64::MAX));
    }

    #[test]
    fn test_min_max_with_default_and_key() {
        let err = raised(call(Builtin::Max, vec![Value::List(vec![])]));
        assert_eq!(err.message, "max() arg is an empty sequence");
        let mut args = Args::new(vec![Value::List(vec![])]);
        args.keywords.push(("default".into(), Value::Int(7)));
        assert_eq!(interp().call_builtin(Builtin::Min, args).unwrap(), Value::Int(7));
        let mut args = Args::new(vec![Value::List(vec!["bbb".into(), "a".into(), "cc".into()])]);
        args.keywords.push(("key".into(), Value::Builtin(Builtin::Len)));
        assert_eq!(interp().call_builtin(Builtin::Max, args).unwrap(), Value::from("bbb"));
    }

    #[test]
    fn test_sorted_reverse_and_zip() {
        let mut args = Args::new(vec![Value::List(vec![Value::Int(2), Value::Int(3), Value::Int(1)])]);
        args.keywords.push(("reverse".into(), Value::Bool(true)));
        assert_eq!(
            interp().call_builtin(Builtin::Sorted, args).unwrap(),
            Value::List(vec![Value::Int(3), Value::Int(2), Value::Int(1)])
        );
        let zipped = call(
            Builtin::Zip,
            vec![Value::List(vec![Value::Int(1), Value::Int(2)]), "ab".into(), Value::List(vec![Value::Int(0)])],
        )
        .unwrap();
        assert_eq!(zipped.repr(), "[(1, 'a', 0)]");
    }

    #[test]
    fn test_print_separators() {
        let mut it = interp();
        let mut args = Args::new(vec![Value::Int(1), "a".into()]);
        args.keywords.push(("sep".into(), "-".into()));
        args.keywords.push(("end".into(), "!".into()));
        it.call_builtin(Builtin::Print, args).unwrap();
        assert_eq!(it.stdout, "1-a!");
    }

    #[test]
    fn test_print_output_limit() {
        let mut it = Interpreter::new(
            BTreeMap::new(),
            Interrupt::new(),
            RunLimits {
                memory_bytes: usize::MAX,
                output_bytes: 4,
            },
        );
        let err = raised(it.call_builtin(Builtin::Print, Args::new(vec!["hello".into()])));
        assert_eq!(err.kind, ExceptionKind::MemoryError);
    }

    #[test]
    fn test_list_of_huge_range_is_refused() {
        let r = call(Builtin::Range, vec![Value::Int(1 << 40)]).unwrap();
        let err = raised(call(Builtin::List, vec![r]));
        assert_eq!(err.kind, ExceptionKind::MemoryError);
    }
}
