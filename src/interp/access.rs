//! Subscripts and attributes.
//!
//! Attribute access is a fixed table per value type. Names starting with an
//! underscore never resolve, so there is no path from a value to its type,
//! its module or anything reflective.

use super::{dict_insert, iterate, Exception, ExceptionKind};
use crate::frame::{column_name, GroupBy, Index, Selection, Series, Table};
use crate::value::{BoundMethod, Library, RangeValue, Value};

/// Evaluated subscript.
#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    Value(Value),
    Slice(Option<Value>, Option<Value>, Option<Value>),
}

/// Positions selected by a slice over a sequence of known length.
#[derive(Debug, Clone, Copy)]
struct SliceRange {
    start: i64,
    step: i64,
    len: usize,
}

impl SliceRange {
    fn positions(self) -> impl Iterator<Item = usize> {
        (0..self.len).map(move |i| (self.start + i as i64 * self.step) as usize)
    }
}

fn slice_bound(value: &Option<Value>) -> Result<Option<i64>, Exception> {
    match value {
        None | Some(Value::None) => Ok(None),
        Some(v) => v.as_index().map(Some).ok_or_else(|| {
            Exception::type_error(
                "slice indices must be integers or None or have an __index__ method",
            )
        }),
    }
}

fn resolve_slice(
    len: usize,
    lower: &Option<Value>,
    upper: &Option<Value>,
    step: &Option<Value>,
) -> Result<SliceRange, Exception> {
    let step = slice_bound(step)?.unwrap_or(1);
    if step == 0 {
        return Err(Exception::value_error("slice step cannot be zero"));
    }
    let n = len as i64;
    let clamp = |i: i64| -> i64 {
        if i < 0 {
            let i = i + n;
            if i < 0 {
                if step < 0 {
                    -1
                } else {
                    0
                }
            } else {
                i
            }
        } else if i >= n {
            if step < 0 {
                n - 1
            } else {
                n
            }
        } else {
            i
        }
    };
    let (default_start, default_stop) = if step > 0 { (0, n) } else { (n - 1, -1) };
    let start = slice_bound(lower)?.map(clamp).unwrap_or(default_start);
    let stop = slice_bound(upper)?.map(clamp).unwrap_or(default_stop);
    let count = if step > 0 && start < stop {
        (stop - start + step - 1) / step
    } else if step < 0 && start > stop {
        (start - stop - step - 1) / -step
    } else {
        0
    };
    Ok(SliceRange {
        start,
        step,
        len: count as usize,
    })
}

/// Normalize a possibly negative index against `len`.
fn position(len: usize, index: i64, what: &str) -> Result<usize, Exception> {
    let i = if index < 0 { index + len as i64 } else { index };
    if i < 0 || i >= len as i64 {
        return Err(Exception::index_error(format!("{} index out of range", what)));
    }
    Ok(i as usize)
}

fn integer_key(key: &Value, type_name: &str) -> Result<i64, Exception> {
    key.as_index().ok_or_else(|| {
        Exception::type_error(format!(
            "{} indices must be integers or slices, not {}",
            type_name,
            key.type_name()
        ))
    })
}

fn not_subscriptable(value: &Value) -> Exception {
    Exception::type_error(format!("'{}' object is not subscriptable", value.type_name()))
}

/// Boolean mask from a Series or a list of bools.
fn as_mask(key: &Value) -> Option<Result<Vec<bool>, Exception>> {
    match key {
        Value::Series(s) => Some(s.as_mask()),
        Value::List(items) if !items.is_empty() && items.iter().all(|v| matches!(v, Value::Bool(_))) => {
            Some(Ok(items.iter().map(|v| matches!(v, Value::Bool(true))).collect()))
        }
        _ => None,
    }
}

pub fn get_item(value: &Value, key: &Key) -> Result<Value, Exception> {
    match (value, key) {
        (Value::List(items), Key::Value(k)) => {
            let i = position(items.len(), integer_key(k, "list")?, "list")?;
            Ok(items[i].clone())
        }
        (Value::Tuple(items), Key::Value(k)) => {
            let i = position(items.len(), integer_key(k, "tuple")?, "tuple")?;
            Ok(items[i].clone())
        }
        (Value::List(items), Key::Slice(lo, hi, st)) => {
            let s = resolve_slice(items.len(), lo, hi, st)?;
            Ok(Value::List(s.positions().map(|i| items[i].clone()).collect()))
        }
        (Value::Tuple(items), Key::Slice(lo, hi, st)) => {
            let s = resolve_slice(items.len(), lo, hi, st)?;
            Ok(Value::Tuple(s.positions().map(|i| items[i].clone()).collect()))
        }
        (Value::Str(text), key) => {
            let chars: Vec<char> = text.chars().collect();
            match key {
                Key::Value(k) => {
                    let i = position(chars.len(), integer_key(k, "string")?, "string")?;
                    Ok(Value::Str(chars[i].to_string()))
                }
                Key::Slice(lo, hi, st) => {
                    let s = resolve_slice(chars.len(), lo, hi, st)?;
                    Ok(Value::Str(s.positions().map(|i| chars[i]).collect()))
                }
            }
        }
        (Value::Bytes(bytes), Key::Value(k)) => {
            let i = position(bytes.len(), integer_key(k, "byte")?, "index")?;
            Ok(Value::Int(bytes[i] as i64))
        }
        (Value::Bytes(bytes), Key::Slice(lo, hi, st)) => {
            let s = resolve_slice(bytes.len(), lo, hi, st)?;
            Ok(Value::Bytes(s.positions().map(|i| bytes[i]).collect()))
        }
        (Value::Range(r), Key::Value(k)) => {
            let i = position(r.len(), integer_key(k, "range")?, "range object")?;
            Ok(Value::Int(r.get(i).unwrap_or_default()))
        }
        (Value::Range(r), Key::Slice(lo, hi, st)) => {
            let s = resolve_slice(r.len(), lo, hi, st)?;
            let start = r
                .start
                .checked_add(s.start.checked_mul(r.step).ok_or_else(Exception::overflow)?)
                .ok_or_else(Exception::overflow)?;
            let step = r.step.checked_mul(s.step).ok_or_else(Exception::overflow)?;
            let stop = (s.len as i64)
                .checked_mul(step)
                .and_then(|span| start.checked_add(span))
                .ok_or_else(Exception::overflow)?;
            Ok(Value::Range(RangeValue { start, stop, step }))
        }
        (Value::Dict(pairs), Key::Value(k)) => {
            k.check_hashable()?;
            pairs
                .iter()
                .find(|(existing, _)| existing.py_eq(k))
                .map(|(_, v)| v.clone())
                .ok_or_else(|| Exception::key_error(k))
        }
        (Value::Table(table), key) => table_item(table, key),
        (Value::Series(series), key) => series_item(series, key),
        (Value::GroupBy(groups), Key::Value(k)) => groupby_item(groups, k),
        (other, _) => Err(not_subscriptable(other)),
    }
}

fn table_item(table: &Table, key: &Key) -> Result<Value, Exception> {
    match key {
        Key::Slice(lo, hi, st) => {
            let s = resolve_slice(table.num_rows(), lo, hi, st)?;
            let rows: Vec<usize> = s.positions().collect();
            Ok(Value::Table(table.take(&rows)))
        }
        Key::Value(k) => {
            if let Some(mask) = as_mask(k) {
                return Ok(Value::Table(table.filter(&mask?)?));
            }
            match k {
                Value::List(names) => {
                    let names = names
                        .iter()
                        .map(column_name)
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(Value::Table(table.select(&names)?))
                }
                other => Ok(Value::Series(table.column(&column_name(other)?)?)),
            }
        }
    }
}

fn series_item(series: &Series, key: &Key) -> Result<Value, Exception> {
    match key {
        Key::Slice(lo, hi, st) => {
            let s = resolve_slice(series.len(), lo, hi, st)?;
            let rows: Vec<usize> = s.positions().collect();
            Ok(Value::Series(series.take(&rows)))
        }
        Key::Value(k) => match as_mask(k) {
            Some(mask) => Ok(Value::Series(series.filter(&mask?)?)),
            None => series.get_label(k),
        },
    }
}

fn groupby_item(groups: &GroupBy, key: &Value) -> Result<Value, Exception> {
    let selection = match key {
        Value::List(names) => Selection::Columns(
            names
                .iter()
                .map(column_name)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        other => Selection::Column(column_name(other)?),
    };
    Ok(Value::GroupBy(groups.select(selection)?))
}

fn no_item_assignment(value: &Value) -> Exception {
    Exception::type_error(format!(
        "'{}' object does not support item assignment",
        value.type_name()
    ))
}

/// Values for a table column: a series or sequence as-is, a scalar
/// broadcast to every row.
fn column_values(value: Value, rows: usize) -> Result<Vec<Value>, Exception> {
    Ok(match value {
        Value::Series(s) => s.values,
        Value::List(items) | Value::Tuple(items) => items,
        Value::Range(r) => r.iter().map(Value::Int).collect(),
        Value::Table(_) | Value::Dict(_) | Value::Set(_) | Value::GroupBy(_) => {
            return Err(Exception::value_error(format!(
                "cannot set a column from a {}",
                value.type_name()
            )))
        }
        scalar => vec![scalar; rows],
    })
}

pub fn set_item(target: &mut Value, key: &Key, value: Value) -> Result<(), Exception> {
    match (target, key) {
        (Value::List(items), Key::Value(k)) => {
            let i = integer_key(k, "list")?;
            let i = position(items.len(), i, "list assignment")?;
            items[i] = value;
            Ok(())
        }
        (Value::List(items), Key::Slice(lo, hi, st)) => {
            let s = resolve_slice(items.len(), lo, hi, st)?;
            let replacement: Vec<Value> = iterate(value)?.collect();
            if s.step == 1 {
                let start = s.start.max(0) as usize;
                let end = start + s.len;
                items.splice(start..end, replacement);
                return Ok(());
            }
            if replacement.len() != s.len {
                return Err(Exception::value_error(format!(
                    "attempt to assign sequence of size {} to extended slice of size {}",
                    replacement.len(),
                    s.len
                )));
            }
            for (i, v) in s.positions().zip(replacement) {
                items[i] = v;
            }
            Ok(())
        }
        (Value::Dict(pairs), Key::Value(k)) => dict_insert(pairs, k.clone(), value),
        (Value::Table(table), Key::Value(k)) => {
            let name = column_name(k)?;
            let values = column_values(value, table.num_rows())?;
            table.set_column(name, values)
        }
        (Value::Series(series), Key::Value(k)) => {
            match series.index.position(k) {
                Some(i) => series.values[i] = value,
                None => {
                    series.index.labels.push(k.clone());
                    series.values.push(value);
                }
            }
            Ok(())
        }
        (target, _) => Err(no_item_assignment(target)),
    }
}

const STR_METHODS: &[&str] = &[
    "upper", "lower", "strip", "lstrip", "rstrip", "split", "join", "replace", "startswith",
    "endswith", "format", "find", "count", "title", "capitalize", "isdigit", "isalpha", "zfill",
];
const LIST_METHODS: &[&str] = &[
    "append", "extend", "insert", "pop", "remove", "clear", "sort", "reverse", "index", "count",
    "copy",
];
const TUPLE_METHODS: &[&str] = &["index", "count"];
const DICT_METHODS: &[&str] = &[
    "keys", "values", "items", "get", "pop", "update", "setdefault", "clear", "popitem", "copy",
];
const SET_METHODS: &[&str] = &[
    "add", "discard", "remove", "update", "clear", "pop", "union", "intersection", "difference",
    "issubset", "issuperset", "copy",
];
const SERIES_METHODS: &[&str] = &[
    "sum", "mean", "min", "max", "count", "median", "std", "nunique", "unique", "tolist",
    "to_list", "value_counts", "sort_values", "sort_index", "head", "tail", "round", "abs",
    "cumsum", "idxmax", "idxmin", "reset_index", "to_frame", "isin", "fillna", "dropna",
    "astype", "any", "all",
];
const TABLE_METHODS: &[&str] = &[
    "head", "tail", "groupby", "sort_values", "sort_index", "reset_index", "set_index", "sum",
    "mean", "min", "max", "count", "median", "std", "describe", "rename", "drop", "dropna",
    "fillna", "nlargest", "nsmallest", "merge", "to_dict", "copy",
];
const GROUPBY_METHODS: &[&str] = &[
    "sum", "mean", "min", "max", "count", "size", "median", "first", "last", "nunique", "std",
    "agg", "aggregate",
];
const FIGURE_METHODS: &[&str] = &["bar", "plot", "scatter", "set_title", "set_xlabel", "set_ylabel"];
const FRAMES_FUNCTIONS: &[&str] = &["DataFrame", "Series", "concat"];
const CHARTS_FUNCTIONS: &[&str] = &["figure", "bar", "plot", "scatter"];
const MATH_FUNCTIONS: &[&str] = &["sqrt", "log", "exp", "floor", "ceil", "fabs", "isnan"];

fn methods_of(value: &Value) -> &'static [&'static str] {
    match value {
        Value::Str(_) => STR_METHODS,
        Value::List(_) => LIST_METHODS,
        Value::Tuple(_) => TUPLE_METHODS,
        Value::Dict(_) => DICT_METHODS,
        Value::Set(_) => SET_METHODS,
        Value::Float(_) => &["is_integer"],
        Value::Int(_) | Value::Bool(_) => &["bit_length"],
        Value::Bytes(_) => &["decode"],
        Value::Series(_) => SERIES_METHODS,
        Value::Table(_) => TABLE_METHODS,
        Value::GroupBy(_) => GROUPBY_METHODS,
        Value::Figure(_) => FIGURE_METHODS,
        Value::Library(Library::Frames) => FRAMES_FUNCTIONS,
        Value::Library(Library::Charts) => CHARTS_FUNCTIONS,
        Value::Library(Library::Math) => MATH_FUNCTIONS,
        _ => &[],
    }
}

pub fn has_method(value: &Value, name: &str) -> bool {
    !name.starts_with('_') && methods_of(value).contains(&name)
}

/// Whether calling `name` changes the receiver, which must then be stored
/// back where it came from.
pub fn method_mutates(value: &Value, name: &str, args: &super::Args) -> bool {
    match value {
        Value::List(_) => matches!(
            name,
            "append" | "extend" | "insert" | "pop" | "remove" | "clear" | "sort" | "reverse"
        ),
        Value::Dict(_) => matches!(
            name,
            "pop" | "update" | "setdefault" | "clear" | "popitem"
        ),
        Value::Set(_) => matches!(
            name,
            "add" | "discard" | "remove" | "update" | "clear" | "pop"
        ),
        Value::Figure(_) => FIGURE_METHODS.contains(&name),
        Value::Table(_) | Value::Series(_) => {
            matches!(args.keyword("inplace"), Some(v) if v.truthy().unwrap_or(false))
        }
        _ => false,
    }
}

fn optional_str(value: &Option<String>) -> Value {
    value.clone().map(Value::Str).unwrap_or(Value::None)
}

fn labels(index: &Index) -> Value {
    Value::List(index.labels.clone())
}

pub fn get_attribute(value: &Value, name: &str) -> Result<Value, Exception> {
    if name.starts_with('_') {
        return Err(Exception::no_attribute(value, name));
    }
    let data = match value {
        Value::Table(t) => match name {
            "columns" => Some(Value::List(
                t.column_names().into_iter().map(Value::Str).collect(),
            )),
            "shape" => Some(Value::Tuple(vec![
                Value::Int(t.num_rows() as i64),
                Value::Int(t.columns.len() as i64),
            ])),
            "index" => Some(labels(&t.index)),
            "empty" => Some(Value::Bool(t.num_rows() == 0 || t.columns.is_empty())),
            "dtypes" => Some(Value::Series(t.dtypes())),
            "values" => Some(Value::List(
                (0..t.num_rows()).map(|r| Value::List(t.row(r))).collect(),
            )),
            _ => None,
        },
        Value::Series(s) => match name {
            "name" => Some(optional_str(&s.name)),
            "values" => Some(Value::List(s.values.clone())),
            "index" => Some(labels(&s.index)),
            "size" => Some(Value::Int(s.len() as i64)),
            "shape" => Some(Value::Tuple(vec![Value::Int(s.len() as i64)])),
            "empty" => Some(Value::Bool(s.is_empty())),
            "dtype" => Some(Value::from(crate::frame::dtype(&s.values))),
            _ => None,
        },
        Value::Figure(f) => match name {
            "title" => Some(optional_str(&f.title)),
            "xlabel" => Some(optional_str(&f.xlabel)),
            "ylabel" => Some(optional_str(&f.ylabel)),
            _ => None,
        },
        Value::Image(img) => match name {
            "format" => Some(Value::Str(img.format.to_string())),
            _ => None,
        },
        Value::Library(Library::Math) => match name {
            "pi" => Some(Value::Float(std::f64::consts::PI)),
            "e" => Some(Value::Float(std::f64::consts::E)),
            "inf" => Some(Value::Float(f64::INFINITY)),
            "nan" => Some(Value::Float(f64::NAN)),
            _ => None,
        },
        Value::Library(Library::Frames) if name == "NA" => Some(Value::None),
        _ => None,
    };
    if let Some(data) = data {
        return Ok(data);
    }
    if has_method(value, name) {
        return Ok(Value::Method(Box::new(BoundMethod {
            receiver: value.clone(),
            name: name.to_string(),
        })));
    }
    if let Value::Table(t) = value {
        if t.position(name).is_some() {
            return Ok(Value::Series(t.column(name)?));
        }
    }
    Err(Exception::no_attribute(value, name))
}

fn text_or_none(value: Value, name: &str) -> Result<Option<String>, Exception> {
    match value {
        Value::None => Ok(None),
        Value::Str(s) => Ok(Some(s)),
        other => Err(Exception::type_error(format!(
            "{} must be str or None, not {}",
            name,
            other.type_name()
        ))),
    }
}

pub fn set_attribute(target: &mut Value, name: &str, value: Value) -> Result<(), Exception> {
    if name.starts_with('_') {
        return Err(Exception::no_attribute(target, name));
    }
    match target {
        Value::Table(t) if name == "columns" => {
            let names = iterate(value)?
                .map(|v| column_name(&v))
                .collect::<Result<Vec<_>, _>>()?;
            if names.len() != t.columns.len() {
                return Err(Exception::value_error(format!(
                    "Length mismatch: Expected axis has {} elements, new values have {} elements",
                    t.columns.len(),
                    names.len()
                )));
            }
            for (col, name) in t.columns.iter_mut().zip(names) {
                col.name = name;
            }
            Ok(())
        }
        Value::Table(t) if t.position(name).is_some() => {
            let values = column_values(value, t.num_rows())?;
            t.set_column(name.to_string(), values)
        }
        Value::Series(s) if name == "name" => {
            s.name = text_or_none(value, "name")?;
            Ok(())
        }
        Value::Figure(f) if matches!(name, "title" | "xlabel" | "ylabel") => {
            let text = text_or_none(value, name)?;
            match name {
                "title" => f.title = text,
                "xlabel" => f.xlabel = text,
                _ => f.ylabel = text,
            }
            Ok(())
        }
        other => Err(Exception::new(
            ExceptionKind::AttributeError,
            format!(
                "'{}' object attribute '{}' cannot be assigned",
                other.type_name(),
                name
            ),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Value {
        Value::List(values.iter().copied().map(Value::Int).collect())
    }

    fn slice(lo: Option<i64>, hi: Option<i64>, step: Option<i64>) -> Key {
        Key::Slice(lo.map(Value::Int), hi.map(Value::Int), step.map(Value::Int))
    }

    #[test]
    fn test_negative_index_and_out_of_range() {
        let xs = ints(&[1, 2, 3]);
        assert_eq!(get_item(&xs, &Key::Value(Value::Int(-1))).unwrap(), Value::Int(3));
        let err = get_item(&xs, &Key::Value(Value::Int(3))).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::IndexError);
        assert_eq!(err.message, "list index out of range");
    }

    #[test]
    fn test_slices_follow_python() {
        let xs = ints(&[0, 1, 2, 3, 4]);
        assert_eq!(get_item(&xs, &slice(Some(1), Some(-1), None)).unwrap(), ints(&[1, 2, 3]));
        assert_eq!(get_item(&xs, &slice(None, None, Some(-2))).unwrap(), ints(&[4, 2, 0]));
        assert_eq!(get_item(&xs, &slice(Some(10), None, None)).unwrap(), ints(&[]));
        let text = Value::from("hello");
        assert_eq!(get_item(&text, &slice(None, None, Some(-1))).unwrap(), Value::from("olleh"));
        let err = get_item(&xs, &slice(None, None, Some(0))).unwrap_err();
        assert_eq!(err.message, "slice step cannot be zero");
    }

    #[test]
    fn test_range_slice_stays_lazy() {
        let r = Value::Range(RangeValue {
            start: 0,
            stop: i64::MAX,
            step: 2,
        });
        let Value::Range(sliced) = get_item(&r, &slice(Some(5), Some(8), None)).unwrap() else {
            panic!("expected range");
        };
        assert_eq!(sliced.iter().collect::<Vec<_>>(), vec![10, 12, 14]);
    }

    #[test]
    fn test_dict_missing_key() {
        let d = Value::Dict(vec![(Value::from("a"), Value::Int(1))]);
        let err = get_item(&d, &Key::Value(Value::from("b"))).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::KeyError);
        assert_eq!(err.message, "'b'");
    }

    #[test]
    fn test_slice_assignment() {
        let mut xs = ints(&[0, 1, 2, 3]);
        set_item(&mut xs, &slice(Some(1), Some(3), None), ints(&[9])).unwrap();
        assert_eq!(xs, ints(&[0, 9, 3]));
        let err = set_item(&mut xs, &slice(None, None, Some(2)), ints(&[1])).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::ValueError);
    }

    #[test]
    fn test_table_column_broadcast() {
        let mut t = Value::Table(Table::new(vec![("a".into(), vec![Value::Int(1), Value::Int(2)])]).unwrap());
        set_item(&mut t, &Key::Value(Value::from("b")), Value::Int(0)).unwrap();
        let Value::Table(table) = &t else { panic!() };
        assert_eq!(table.columns[1].values, vec![Value::Int(0), Value::Int(0)]);
        assert_eq!(
            get_attribute(&t, "shape").unwrap(),
            Value::Tuple(vec![Value::Int(2), Value::Int(2)])
        );
        assert!(matches!(get_attribute(&t, "b").unwrap(), Value::Series(_)));
    }

    #[test]
    fn test_private_names_never_resolve() {
        for value in [Value::Int(1), Value::from("s"), Value::Library(Library::Frames)] {
            let err = get_attribute(&value, "__class__").unwrap_err();
            assert_eq!(err.kind, ExceptionKind::AttributeError);
        }
        assert!(!has_method(&Value::List(vec![]), "__len__"));
    }

    #[test]
    fn test_methods_bind_receiver() {
        let Value::Method(m) = get_attribute(&Value::from("a"), "upper").unwrap() else {
            panic!("expected bound method");
        };
        assert_eq!(m.name, "upper");
        assert_eq!(m.receiver, Value::from("a"));
    }
}
