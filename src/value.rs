//! Runtime values of the submission language.
//!
//! Values have value semantics: cloning a list or a table copies it. Every
//! value crosses the process boundary as JSON, so everything here derives
//! serde; bytes travel as base64 and non-finite floats as strings.

use crate::builtins::Builtin;
use crate::figure::{Figure, Image};
use crate::frame::{GroupBy, Series, Table};
use crate::interp::{Exception, ExceptionKind};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::Write as _;

/// Library handle a caller may place in the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Library {
    /// `pd`: table constructors
    Frames,
    /// `plt`: chart constructors
    Charts,
    /// `math`
    Math,
}

impl Library {
    pub fn module_name(&self) -> &'static str {
        match self {
            Library::Frames => "pandas",
            Library::Charts => "matplotlib.pyplot",
            Library::Math => "math",
        }
    }

    /// The conventional context entries: `pd`, `plt` and `math`.
    pub fn standard_context() -> Vec<(String, Value)> {
        vec![
            ("pd".to_string(), Value::Library(Library::Frames)),
            ("plt".to_string(), Value::Library(Library::Charts)),
            ("math".to_string(), Value::Library(Library::Math)),
        ]
    }
}

/// Lazy `range`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeValue {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl RangeValue {
    pub fn len(&self) -> usize {
        let (start, stop, step) = (self.start as i128, self.stop as i128, self.step as i128);
        let n = if step > 0 && start < stop {
            (stop - start + step - 1) / step
        } else if step < 0 && start > stop {
            (start - stop - step - 1) / -step
        } else {
            0
        };
        n.min(usize::MAX as i128) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> Option<i64> {
        if i >= self.len() {
            return None;
        }
        Some((self.start as i128 + i as i128 * self.step as i128) as i64)
    }

    pub fn iter(&self) -> RangeIter {
        RangeIter {
            range: *self,
            pos: 0,
            len: self.len(),
        }
    }
}

pub struct RangeIter {
    range: RangeValue,
    pos: usize,
    len: usize,
}

impl Iterator for RangeIter {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        if self.pos >= self.len {
            return None;
        }
        let v = self.range.get(self.pos);
        self.pos += 1;
        v
    }
}

/// Method bound to a receiver, e.g. `xs.append` or `pd.DataFrame`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundMethod {
    pub receiver: Value,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(#[serde(with = "float_repr")] f64),
    Str(String),
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    /// Insertion ordered, no duplicates
    Set(Vec<Value>),
    /// Insertion ordered key/value pairs
    Dict(Vec<(Value, Value)>),
    Range(RangeValue),
    Table(Table),
    Series(Series),
    GroupBy(GroupBy),
    Figure(Figure),
    Image(Image),
    Library(Library),
    Builtin(Builtin),
    Method(Box<BoundMethod>),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<Table> for Value {
    fn from(v: Table) -> Self {
        Value::Table(v)
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Set(_) => "set",
            Value::Dict(_) => "dict",
            Value::Range(_) => "range",
            Value::Table(_) => "DataFrame",
            Value::Series(_) => "Series",
            Value::GroupBy(_) => "DataFrameGroupBy",
            Value::Figure(_) => "Figure",
            Value::Image(_) => "Image",
            Value::Library(_) => "module",
            Value::Builtin(_) => "builtin_function_or_method",
            Value::Method(_) => "method",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Missing value in table data: `None` or NaN.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::None => true,
            Value::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Bool(_) | Value::Int(_) | Value::Float(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Integer view used for indices and counts.
    pub fn as_index(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn truthy(&self) -> Result<bool, Exception> {
        Ok(match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::List(v) | Value::Tuple(v) | Value::Set(v) => !v.is_empty(),
            Value::Dict(d) => !d.is_empty(),
            Value::Range(r) => !r.is_empty(),
            Value::Table(_) | Value::Series(_) => {
                return Err(Exception::new(
                    ExceptionKind::ValueError,
                    format!(
                        "The truth value of a {} is ambiguous. Use a.empty, a.any() or a.all().",
                        self.type_name()
                    ),
                ))
            }
            _ => true,
        })
    }

    pub fn check_hashable(&self) -> Result<(), Exception> {
        match self {
            Value::None
            | Value::Bool(_)
            | Value::Int(_)
            | Value::Float(_)
            | Value::Str(_)
            | Value::Bytes(_)
            | Value::Range(_)
            | Value::Library(_)
            | Value::Builtin(_) => Ok(()),
            Value::Tuple(items) => items.iter().try_for_each(Value::check_hashable),
            other => Err(Exception::new(
                ExceptionKind::TypeError,
                format!("unhashable type: '{}'", other.type_name()),
            )),
        }
    }

    /// `==` for scalars and containers.
    pub fn py_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (a, b) if a.is_numeric() && b.is_numeric() => match (a, b) {
                (Value::Float(_), _) | (_, Value::Float(_)) => a.as_f64() == b.as_f64(),
                _ => a.as_index() == b.as_index(),
            },
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.py_eq(y))
            }
            (Value::Set(a), Value::Set(b)) => {
                a.len() == b.len() && a.iter().all(|x| b.iter().any(|y| x.py_eq(y)))
            }
            (Value::Dict(a), Value::Dict(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        b.iter().any(|(k2, v2)| k.py_eq(k2) && v.py_eq(v2))
                    })
            }
            (Value::Range(a), Value::Range(b)) => {
                a.len() == b.len() && (a.is_empty() || (a.start == b.start && a.get(1) == b.get(1)))
            }
            (a, b) => a == b,
        }
    }

    /// Ordering for `<`, `sorted`, `min` and `max`.
    pub fn py_cmp(&self, other: &Value) -> Result<Ordering, Exception> {
        match (self, other) {
            (a, b) if a.is_numeric() && b.is_numeric() => {
                if let (Some(x), Some(y)) = (a.as_index(), b.as_index()) {
                    return Ok(x.cmp(&y));
                }
                let (x, y) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
                Ok(x.partial_cmp(&y).unwrap_or(Ordering::Equal))
            }
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (Value::Bytes(a), Value::Bytes(b)) => Ok(a.cmp(b)),
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
                for (x, y) in a.iter().zip(b) {
                    if !x.py_eq(y) {
                        return x.py_cmp(y);
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            (a, b) => Err(Exception::new(
                ExceptionKind::TypeError,
                format!(
                    "'<' not supported between instances of '{}' and '{}'",
                    a.type_name(),
                    b.type_name()
                ),
            )),
        }
    }

    /// Ordering used when sorting table data: missing values last, mixed
    /// types fall back to type name.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self.is_missing(), other.is_missing()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            _ => {}
        }
        self.py_cmp(other)
            .unwrap_or_else(|_| self.type_name().cmp(other.type_name()))
    }

    pub fn repr(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(b) => if *b { "True" } else { "False" }.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) => repr_str(s),
            Value::Bytes(b) => repr_bytes(b),
            Value::List(items) => format!("[{}]", join_repr(items)),
            Value::Tuple(items) if items.len() == 1 => format!("({},)", items[0].repr()),
            Value::Tuple(items) => format!("({})", join_repr(items)),
            Value::Set(items) if items.is_empty() => "set()".to_string(),
            Value::Set(items) => format!("{{{}}}", join_repr(items)),
            Value::Dict(pairs) => {
                let body: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect();
                format!("{{{}}}", body.join(", "))
            }
            Value::Range(r) if r.step == 1 => format!("range({}, {})", r.start, r.stop),
            Value::Range(r) => format!("range({}, {}, {})", r.start, r.stop, r.step),
            Value::Table(t) => t.render(),
            Value::Series(s) => s.render(),
            Value::GroupBy(g) => format!("<DataFrameGroupBy by {:?}>", g.keys),
            Value::Figure(f) => format!("<Figure with {} plots>", f.plots.len()),
            Value::Image(img) => format!("<Image {} {} bytes>", img.format, img.data.len()),
            Value::Library(lib) => format!("<module '{}'>", lib.module_name()),
            Value::Builtin(b) => format!("<built-in function {}>", b.name()),
            Value::Method(m) => format!(
                "<bound method {}.{}>",
                m.receiver.type_name(),
                m.name
            ),
        }
    }

    /// `str(value)`.
    pub fn to_str(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            other => other.repr(),
        }
    }
}

fn join_repr(items: &[Value]) -> String {
    items.iter().map(Value::repr).collect::<Vec<_>>().join(", ")
}

/// Shortest round-trip float text in Python's spelling.
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let abs = f.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        let text = format!("{:e}", f);
        let (mantissa, exp) = text.split_once('e').unwrap_or((&text, "0"));
        let (sign, digits) = match exp.strip_prefix('-') {
            Some(d) => ('-', d),
            None => ('+', exp),
        };
        return format!("{}e{}{:0>2}", mantissa, sign, digits);
    }
    let text = format!("{}", f);
    if text.contains('.') {
        text
    } else {
        format!("{}.0", text)
    }
}

fn repr_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

fn repr_bytes(bytes: &[u8]) -> String {
    let mut out = String::from("b'");
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            _ => {
                let _ = write!(out, "\\x{:02x}", b);
            }
        }
    }
    out.push('\'');
    out
}

/// Floats as JSON numbers, with `nan`, `inf` and `-inf` as strings.
pub(crate) mod float_repr {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_str(&super::format_float(*value))
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(f) => Ok(f),
            Repr::Text(s) => match s.as_str() {
                "nan" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(serde::de::Error::custom(format!("invalid float {:?}", other))),
            },
        }
    }
}

/// Byte buffers as base64 strings.
pub(crate) mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repr_matches_python() {
        assert_eq!(Value::Float(1.0).repr(), "1.0");
        assert_eq!(Value::Float(0.1).repr(), "0.1");
        assert_eq!(Value::Float(1e20).repr(), "1e+20");
        assert_eq!(Value::Float(1.5e-5).repr(), "1.5e-05");
        assert_eq!(Value::Str("it's".into()).repr(), "\"it's\"");
        assert_eq!(Value::Tuple(vec![Value::Int(1)]).repr(), "(1,)");
        assert_eq!(Value::Set(vec![]).repr(), "set()");
        assert_eq!(
            Value::Dict(vec![(Value::from("a"), Value::Int(1))]).repr(),
            "{'a': 1}"
        );
        assert_eq!(Value::Bytes(b"a\x00".to_vec()).repr(), "b'a\\x00'");
    }

    #[test]
    fn test_numeric_equality_crosses_types() {
        assert!(Value::Int(1).py_eq(&Value::Float(1.0)));
        assert!(Value::Bool(true).py_eq(&Value::Int(1)));
        assert!(!Value::Float(f64::NAN).py_eq(&Value::Float(f64::NAN)));
        assert!(!Value::Str("1".into()).py_eq(&Value::Int(1)));
    }

    #[test]
    fn test_ordering_rejects_mixed_types() {
        assert!(Value::Int(1).py_cmp(&Value::Str("a".into())).is_err());
        assert_eq!(
            Value::Tuple(vec![Value::Int(1), Value::Int(2)])
                .py_cmp(&Value::Tuple(vec![Value::Int(1), Value::Int(3)]))
                .unwrap(),
            Ordering::Less
        );
        assert_eq!(Value::None.sort_cmp(&Value::Int(1)), Ordering::Greater);
    }

    #[test]
    fn test_range_len_and_get() {
        let r = RangeValue {
            start: 10,
            stop: 0,
            step: -3,
        };
        assert_eq!(r.len(), 4);
        assert_eq!(r.iter().collect::<Vec<_>>(), vec![10, 7, 4, 1]);
        let huge = RangeValue {
            start: 0,
            stop: i64::MAX,
            step: 1,
        };
        assert_eq!(huge.get(5), Some(5));
    }

    #[test]
    fn test_hashability() {
        assert!(Value::Tuple(vec![Value::Int(1), Value::from("a")])
            .check_hashable()
            .is_ok());
        let err = Value::List(vec![]).check_hashable().unwrap_err();
        assert_eq!(err.kind, ExceptionKind::TypeError);
    }

    #[test]
    fn test_json_encoding_of_special_values() {
        let json = serde_json::to_string(&Value::Float(f64::INFINITY)).unwrap();
        assert_eq!(json, r#"{"type":"float","value":"inf"}"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::Float(f64::INFINITY));

        let json = serde_json::to_string(&Value::Bytes(b"hi".to_vec())).unwrap();
        assert_eq!(json, r#"{"type":"bytes","value":"aGk="}"#);
        let none: Value = serde_json::from_str(r#"{"type":"none"}"#).unwrap();
        assert_eq!(none, Value::None);
    }
}
