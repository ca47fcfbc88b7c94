//! Methods of the builtin container and scalar types.

use super::ops::{check_allocation, VALUE_SIZE};
use super::{dict_insert, format, iterate, set_insert, Args, Exception, ExceptionKind, Flow, Interpreter};
use crate::value::Value;

fn unknown(receiver: &Value, name: &str) -> Exception {
    Exception::no_attribute(receiver, name)
}

fn str_arg(args: &Args, func: &str, i: usize, name: &str) -> Result<String, Exception> {
    match args.require(func, i, name)? {
        Value::Str(s) => Ok(s.clone()),
        other => Err(Exception::type_error(format!(
            "{}() argument must be str, not {}",
            func,
            other.type_name()
        ))),
    }
}

/// Prefix/suffix argument: a string or a tuple of strings.
fn affixes(args: &Args, func: &str) -> Result<Vec<String>, Exception> {
    match args.require(func, 0, "prefix")? {
        Value::Str(s) => Ok(vec![s.clone()]),
        Value::Tuple(items) => items
            .iter()
            .map(|v| match v {
                Value::Str(s) => Ok(s.clone()),
                other => Err(Exception::type_error(format!(
                    "tuple for {} must only contain str, not {}",
                    func,
                    other.type_name()
                ))),
            })
            .collect(),
        other => Err(Exception::type_error(format!(
            "{} first arg must be str or a tuple of str, not {}",
            func,
            other.type_name()
        ))),
    }
}

fn strip_chars(args: &Args, func: &str) -> Result<Option<Vec<char>>, Exception> {
    Ok(args.string(0, "chars").map_err(|_| {
        Exception::type_error(format!("{} arg must be None or str", func))
    })?
    .map(|s| s.chars().collect()))
}

fn split(s: &str, args: &Args) -> Result<Value, Exception> {
    args.check("split", 2, &["sep", "maxsplit"])?;
    let maxsplit = args.int(1, "maxsplit", -1)?;
    let limit = if maxsplit < 0 { usize::MAX } else { maxsplit as usize + 1 };
    let parts: Vec<Value> = match args.string(0, "sep")? {
        None => {
            let mut parts = Vec::new();
            let mut rest = s.trim_start();
            while !rest.is_empty() {
                if parts.len() + 1 == limit {
                    parts.push(Value::from(rest.trim_end()));
                    break;
                }
                match rest.find(char::is_whitespace) {
                    Some(end) => {
                        parts.push(Value::from(&rest[..end]));
                        rest = rest[end..].trim_start();
                    }
                    None => {
                        parts.push(Value::from(rest));
                        break;
                    }
                }
            }
            parts
        }
        Some(sep) if sep.is_empty() => return Err(Exception::value_error("empty separator")),
        Some(sep) => s.splitn(limit, sep.as_str()).map(Value::from).collect(),
    };
    Ok(Value::List(parts))
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut previous_cased = false;
    for c in s.chars() {
        if previous_cased {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        previous_cased = c.is_alphabetic();
    }
    out
}

pub fn str_method(s: &str, name: &str, args: &Args, limit: usize) -> Result<Value, Exception> {
    let text = Value::Str;
    Ok(match name {
        "upper" => text(s.to_uppercase()),
        "lower" => text(s.to_lowercase()),
        "strip" | "lstrip" | "rstrip" => {
            let chars = strip_chars(args, name)?;
            let matches = |c: char| match &chars {
                Some(set) => set.contains(&c),
                None => c.is_whitespace(),
            };
            text(match name {
                "strip" => s.trim_matches(matches).to_string(),
                "lstrip" => s.trim_start_matches(matches).to_string(),
                _ => s.trim_end_matches(matches).to_string(),
            })
        }
        "split" => split(s, args)?,
        "join" => {
            let mut parts = Vec::new();
            for (i, item) in iterate(args.require("join", 0, "iterable")?.clone())?.enumerate() {
                match item {
                    Value::Str(part) => parts.push(part),
                    other => {
                        return Err(Exception::type_error(format!(
                            "sequence item {}: expected str instance, {} found",
                            i,
                            other.type_name()
                        )))
                    }
                }
            }
            let joined = parts.join(s);
            check_allocation(joined.len(), limit)?;
            text(joined)
        }
        "replace" => {
            let old = str_arg(args, "replace", 0, "old")?;
            let new = str_arg(args, "replace", 1, "new")?;
            let count = args.int(2, "count", -1)?;
            let occurrences = if old.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(old.as_str()).count()
            };
            let estimate = s.len() + occurrences.saturating_mul(new.len());
            check_allocation(estimate, limit)?;
            if count < 0 {
                text(s.replace(old.as_str(), &new))
            } else {
                text(s.replacen(old.as_str(), &new, count as usize))
            }
        }
        "startswith" => Value::Bool(affixes(args, name)?.iter().any(|p| s.starts_with(p.as_str()))),
        "endswith" => Value::Bool(affixes(args, name)?.iter().any(|p| s.ends_with(p.as_str()))),
        "format" => text(format::str_format(s, args, limit)?),
        "find" => {
            let needle = str_arg(args, "find", 0, "sub")?;
            match s.find(needle.as_str()) {
                Some(byte) => Value::Int(s[..byte].chars().count() as i64),
                None => Value::Int(-1),
            }
        }
        "count" => {
            let needle = str_arg(args, "count", 0, "sub")?;
            let n = if needle.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(needle.as_str()).count()
            };
            Value::Int(n as i64)
        }
        "title" => text(title_case(s)),
        "capitalize" => {
            let mut chars = s.chars();
            text(match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            })
        }
        "isdigit" => Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit())),
        "isalpha" => Value::Bool(!s.is_empty() && s.chars().all(char::is_alphabetic)),
        "zfill" => {
            let width = args.int(0, "width", 0)?.max(0) as usize;
            check_allocation(width, limit)?;
            let len = s.chars().count();
            if len >= width {
                text(s.to_string())
            } else {
                let (sign, digits) = match s.strip_prefix(['-', '+']) {
                    Some(rest) => (&s[..1], rest),
                    None => ("", s),
                };
                text(format!("{}{}{}", sign, "0".repeat(width - len), digits))
            }
        }
        _ => return Err(unknown(&Value::Str(String::new()), name)),
    })
}

fn index_of(items: &[Value], target: &Value, type_name: &str) -> Result<Value, Exception> {
    items
        .iter()
        .position(|v| v.py_eq(target))
        .map(|i| Value::Int(i as i64))
        .ok_or_else(|| {
            Exception::value_error(match type_name {
                "list" => format!("{} is not in list", target.repr()),
                _ => format!("{}.index(x): x not in {}", type_name, type_name),
            })
        })
}

fn count_of(items: &[Value], target: &Value) -> Value {
    Value::Int(items.iter().filter(|v| v.py_eq(target)).count() as i64)
}

pub fn tuple_method(items: &[Value], name: &str, args: &Args) -> Result<Value, Exception> {
    match name {
        "index" => index_of(items, args.require("index", 0, "value")?, "tuple"),
        "count" => Ok(count_of(items, args.require("count", 0, "value")?)),
        _ => Err(unknown(&Value::Tuple(Vec::new()), name)),
    }
}

impl Interpreter {
    pub(super) fn list_method(&mut self, items: &mut Vec<Value>, name: &str, args: Args) -> Flow<Value> {
        let limit = self.memory_limit();
        match name {
            "append" => {
                items.push(args.require("append", 0, "object")?.clone());
                check_allocation(items.len() * VALUE_SIZE, limit)?;
            }
            "extend" => {
                for item in iterate(args.require("extend", 0, "iterable")?.clone())? {
                    self.tick()?;
                    items.push(item);
                    check_allocation(items.len() * VALUE_SIZE, limit)?;
                }
            }
            "insert" => {
                let len = items.len() as i64;
                let at = args.int(0, "index", 0)?;
                let at = if at < 0 { (at + len).max(0) } else { at.min(len) };
                items.insert(at as usize, args.require("insert", 1, "object")?.clone());
                check_allocation(items.len() * VALUE_SIZE, limit)?;
            }
            "pop" => {
                if items.is_empty() {
                    return Err(Exception::index_error("pop from empty list").into());
                }
                let len = items.len() as i64;
                let at = args.int(0, "index", -1)?;
                let at = if at < 0 { at + len } else { at };
                if at < 0 || at >= len {
                    return Err(Exception::index_error("pop index out of range").into());
                }
                return Ok(items.remove(at as usize));
            }
            "remove" => {
                let target = args.require("remove", 0, "value")?;
                match items.iter().position(|v| v.py_eq(target)) {
                    Some(i) => {
                        items.remove(i);
                    }
                    None => {
                        return Err(Exception::value_error("list.remove(x): x not in list").into())
                    }
                }
            }
            "clear" => items.clear(),
            "sort" => {
                args.check("sort", 0, &["key", "reverse"])?;
                let reverse = args.flag(usize::MAX, "reverse", false)?;
                self.sort_values(items, args.keyword("key").cloned(), reverse)?;
            }
            "reverse" => items.reverse(),
            "index" => return Ok(index_of(items, args.require("index", 0, "value")?, "list")?),
            "count" => return Ok(count_of(items, args.require("count", 0, "value")?)),
            "copy" => return Ok(Value::List(items.clone())),
            _ => return Err(unknown(&Value::List(Vec::new()), name).into()),
        }
        Ok(Value::None)
    }
}

pub fn dict_method(pairs: &mut Vec<(Value, Value)>, name: &str, args: &Args) -> Result<Value, Exception> {
    let find = |pairs: &[(Value, Value)], key: &Value| pairs.iter().position(|(k, _)| k.py_eq(key));
    Ok(match name {
        "keys" => Value::List(pairs.iter().map(|(k, _)| k.clone()).collect()),
        "values" => Value::List(pairs.iter().map(|(_, v)| v.clone()).collect()),
        "items" => Value::List(
            pairs
                .iter()
                .map(|(k, v)| Value::Tuple(vec![k.clone(), v.clone()]))
                .collect(),
        ),
        "get" => {
            let key = args.require("get", 0, "key")?;
            key.check_hashable()?;
            match find(pairs.as_slice(), key) {
                Some(i) => pairs[i].1.clone(),
                None => args.get(1, "default").cloned().unwrap_or(Value::None),
            }
        }
        "pop" => {
            let key = args.require("pop", 0, "key")?;
            key.check_hashable()?;
            match find(pairs.as_slice(), key) {
                Some(i) => pairs.remove(i).1,
                None => match args.get(1, "default") {
                    Some(default) => default.clone(),
                    None => return Err(Exception::key_error(key)),
                },
            }
        }
        "setdefault" => {
            let key = args.require("setdefault", 0, "key")?;
            key.check_hashable()?;
            match find(pairs.as_slice(), key) {
                Some(i) => pairs[i].1.clone(),
                None => {
                    let default = args.get(1, "default").cloned().unwrap_or(Value::None);
                    pairs.push((key.clone(), default.clone()));
                    default
                }
            }
        }
        "update" => {
            match args.positional.first() {
                None => {}
                Some(Value::Dict(other)) => {
                    for (k, v) in other {
                        dict_insert(pairs, k.clone(), v.clone())?;
                    }
                }
                Some(other) => {
                    for item in iterate(other.clone())? {
                        let pair: Vec<Value> = iterate(item)?.collect();
                        let [k, v]: [Value; 2] = pair.try_into().map_err(|p: Vec<Value>| {
                            Exception::value_error(format!(
                                "dictionary update sequence element has length {}; 2 is required",
                                p.len()
                            ))
                        })?;
                        dict_insert(pairs, k, v)?;
                    }
                }
            }
            for (k, v) in &args.keywords {
                dict_insert(pairs, Value::Str(k.clone()), v.clone())?;
            }
            Value::None
        }
        "clear" => {
            pairs.clear();
            Value::None
        }
        "popitem" => match pairs.pop() {
            Some((k, v)) => Value::Tuple(vec![k, v]),
            None => {
                return Err(Exception::new(
                    ExceptionKind::KeyError,
                    "'popitem(): dictionary is empty'",
                ))
            }
        },
        "copy" => Value::Dict(pairs.clone()),
        _ => return Err(unknown(&Value::Dict(Vec::new()), name)),
    })
}

fn collect_set(value: &Value) -> Result<Vec<Value>, Exception> {
    let mut out = Vec::new();
    for item in iterate(value.clone())? {
        set_insert(&mut out, item)?;
    }
    Ok(out)
}

pub fn set_method(items: &mut Vec<Value>, name: &str, args: &Args, limit: usize) -> Result<Value, Exception> {
    let contains = |items: &[Value], v: &Value| items.iter().any(|x| x.py_eq(v));
    Ok(match name {
        "add" => {
            set_insert(items, args.require("add", 0, "elem")?.clone())?;
            check_allocation(items.len() * VALUE_SIZE, limit)?;
            Value::None
        }
        "discard" | "remove" => {
            let target = args.require(name, 0, "elem")?;
            target.check_hashable()?;
            match items.iter().position(|v| v.py_eq(target)) {
                Some(i) => {
                    items.remove(i);
                }
                None if name == "remove" => return Err(Exception::key_error(target)),
                None => {}
            }
            Value::None
        }
        "update" => {
            for other in &args.positional {
                for item in iterate(other.clone())? {
                    set_insert(items, item)?;
                }
                check_allocation(items.len() * VALUE_SIZE, limit)?;
            }
            Value::None
        }
        "clear" => {
            items.clear();
            Value::None
        }
        "pop" => {
            if items.is_empty() {
                return Err(Exception::new(ExceptionKind::KeyError, "'pop from an empty set'"));
            }
            items.remove(0)
        }
        "union" => {
            let mut out = items.clone();
            for other in &args.positional {
                for item in iterate(other.clone())? {
                    set_insert(&mut out, item)?;
                }
            }
            Value::Set(out)
        }
        "intersection" => {
            let mut out = items.clone();
            for other in &args.positional {
                let other = collect_set(other)?;
                out.retain(|v| contains(other.as_slice(), v));
            }
            Value::Set(out)
        }
        "difference" => {
            let mut out = items.clone();
            for other in &args.positional {
                let other = collect_set(other)?;
                out.retain(|v| !contains(other.as_slice(), v));
            }
            Value::Set(out)
        }
        "issubset" => {
            let other = collect_set(args.require("issubset", 0, "other")?)?;
            Value::Bool(items.iter().all(|v| contains(other.as_slice(), v)))
        }
        "issuperset" => {
            let other = collect_set(args.require("issuperset", 0, "other")?)?;
            Value::Bool(other.iter().all(|v| contains(items.as_slice(), v)))
        }
        "copy" => Value::Set(items.clone()),
        _ => return Err(unknown(&Value::Set(Vec::new()), name)),
    })
}

pub fn float_method(f: f64, name: &str, _args: &Args) -> Result<Value, Exception> {
    match name {
        "is_integer" => Ok(Value::Bool(f.is_finite() && f.fract() == 0.0)),
        _ => Err(unknown(&Value::Float(f), name)),
    }
}

pub fn int_method(receiver: &Value, name: &str, _args: &Args) -> Result<Value, Exception> {
    match (name, receiver.as_index()) {
        ("bit_length", Some(i)) => Ok(Value::Int(64 - i.unsigned_abs().leading_zeros() as i64)),
        _ => Err(unknown(receiver, name)),
    }
}

pub fn bytes_method(bytes: &[u8], name: &str, args: &Args) -> Result<Value, Exception> {
    match name {
        "decode" => {
            let encoding = args.string(0, "encoding")?.unwrap_or_else(|| "utf-8".to_string());
            match encoding.to_lowercase().replace('_', "-").as_str() {
                "utf-8" | "utf8" => String::from_utf8(bytes.to_vec())
                    .map(Value::Str)
                    .map_err(|e| {
                        Exception::value_error(format!(
                            "'utf-8' codec can't decode byte at position {}",
                            e.utf8_error().valid_up_to()
                        ))
                    }),
                "ascii" if bytes.is_ascii() => Ok(Value::Str(String::from_utf8_lossy(bytes).into_owned())),
                "ascii" => Err(Exception::value_error("'ascii' codec can't decode byte")),
                other => Err(Exception::new(
                    ExceptionKind::ValueError,
                    format!("unknown encoding: {}", other),
                )),
            }
        }
        _ => Err(unknown(&Value::Bytes(Vec::new()), name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: Vec<Value>) -> Args {
        Args::new(values)
    }

    fn strs(items: &[&str]) -> Value {
        Value::List(items.iter().map(|s| Value::from(*s)).collect())
    }

    #[test]
    fn test_split_variants() {
        let limit = usize::MAX;
        assert_eq!(str_method("  a b  c ", "split", &args(vec![]), limit).unwrap(), strs(&["a", "b", "c"]));
        assert_eq!(
            str_method("a,b,,c", "split", &args(vec![",".into()]), limit).unwrap(),
            strs(&["a", "b", "", "c"])
        );
        assert_eq!(
            str_method("a b c", "split", &args(vec![Value::None, Value::Int(1)]), limit).unwrap(),
            strs(&["a", "b c"])
        );
        let err = str_method("a", "split", &args(vec!["".into()]), limit).unwrap_err();
        assert_eq!(err.message, "empty separator");
    }

    #[test]
    fn test_join_requires_strings() {
        let limit = usize::MAX;
        assert_eq!(
            str_method("-", "join", &args(vec![strs(&["a", "b"])]), limit).unwrap(),
            Value::from("a-b")
        );
        let err = str_method("-", "join", &args(vec![Value::List(vec![Value::Int(1)])]), limit).unwrap_err();
        assert_eq!(err.message, "sequence item 0: expected str instance, int found");
    }

    #[test]
    fn test_string_helpers() {
        let limit = usize::MAX;
        assert_eq!(str_method("hello world", "title", &args(vec![]), limit).unwrap(), Value::from("Hello World"));
        assert_eq!(str_method("xxhixx", "strip", &args(vec!["x".into()]), limit).unwrap(), Value::from("hi"));
        assert_eq!(str_method("-42", "zfill", &args(vec![Value::Int(5)]), limit).unwrap(), Value::from("-0042"));
        assert_eq!(str_method("héllo", "find", &args(vec!["l".into()]), limit).unwrap(), Value::Int(2));
        assert_eq!(
            str_method("a.csv", "endswith", &args(vec![Value::Tuple(vec![".txt".into(), ".csv".into()])]), limit)
                .unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_replace_respects_memory_limit() {
        let err = str_method("aaaa", "replace", &args(vec!["a".into(), "b".repeat(100).into()]), 64).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::MemoryError);
    }

    #[test]
    fn test_dict_methods() {
        let mut d = vec![(Value::from("a"), Value::Int(1))];
        assert_eq!(dict_method(&mut d, "get", &args(vec!["z".into(), Value::Int(0)])).unwrap(), Value::Int(0));
        let mut update = args(vec![Value::List(vec![Value::Tuple(vec!["b".into(), Value::Int(2)])])]);
        update.keywords.push(("c".into(), Value::Int(3)));
        dict_method(&mut d, "update", &update).unwrap();
        assert_eq!(Value::Dict(d.clone()).repr(), "{'a': 1, 'b': 2, 'c': 3}");
        let err = dict_method(&mut d, "pop", &args(vec!["zz".into()])).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::KeyError);
    }

    #[test]
    fn test_set_algebra() {
        let mut s = vec![Value::Int(1), Value::Int(2)];
        let other = Value::List(vec![Value::Int(2), Value::Int(3)]);
        assert_eq!(
            set_method(&mut s, "intersection", &args(vec![other.clone()]), usize::MAX).unwrap(),
            Value::Set(vec![Value::Int(2)])
        );
        assert_eq!(
            set_method(&mut s, "union", &args(vec![other]), usize::MAX).unwrap(),
            Value::Set(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
        let err = set_method(&mut s, "remove", &args(vec![Value::Int(9)]), usize::MAX).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::KeyError);
    }

    #[test]
    fn test_tuple_index_missing() {
        let err = tuple_method(&[Value::Int(1)], "index", &args(vec![Value::Int(2)])).unwrap_err();
        assert_eq!(err.message, "tuple.index(x): x not in tuple");
    }
}
