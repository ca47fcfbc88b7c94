//! Methods of tables, series, groupings and figures, plus the functions of
//! the `pd`, `plt` and `math` library handles.

use super::builtin_fns::round_to;
use super::ops::{check_allocation, VALUE_SIZE};
use super::{iterate, Args, Exception, ExceptionKind};
use crate::figure::{Figure, PlotKind};
use crate::frame::{column_name, Agg, GroupBy, Index, Join, Series, Table};
use crate::value::{Library, Value};

fn sequence(value: &Value) -> Result<Vec<Value>, Exception> {
    Ok(iterate(value.clone())?.collect())
}

fn inplace(args: &Args) -> Result<bool, Exception> {
    args.flag(usize::MAX, "inplace", false)
}

/// Finish a table operation: replace the receiver when `inplace=True`.
fn table_result(table: &mut Table, result: Table, args: &Args) -> Result<Value, Exception> {
    if inplace(args)? {
        *table = result;
        Ok(Value::None)
    } else {
        Ok(Value::Table(result))
    }
}

fn series_result(series: &mut Series, result: Series, args: &Args) -> Result<Value, Exception> {
    if inplace(args)? {
        *series = result;
        Ok(Value::None)
    } else {
        Ok(Value::Series(result))
    }
}

fn ascending_flags(args: &Args) -> Result<Vec<bool>, Exception> {
    match args.keyword("ascending") {
        None => Ok(vec![true]),
        Some(Value::List(items)) | Some(Value::Tuple(items)) => {
            items.iter().map(Value::truthy).collect()
        }
        Some(v) => Ok(vec![v.truthy()?]),
    }
}

fn rename_mapping(value: &Value) -> Result<Vec<(String, String)>, Exception> {
    match value {
        Value::Dict(pairs) => pairs
            .iter()
            .map(|(k, v)| Ok((column_name(k)?, column_name(v)?)))
            .collect(),
        other => Err(Exception::type_error(format!(
            "rename mapping must be a dict, not {}",
            other.type_name()
        ))),
    }
}

pub fn table_method(table: &mut Table, name: &str, args: &Args, limit: usize) -> Result<Value, Exception> {
    if let Some(agg) = Agg::from_name(name).filter(|a| !matches!(a, Agg::Size | Agg::First | Agg::Last | Agg::Nunique)) {
        return Ok(Value::Series(table.aggregate(agg)?));
    }
    match name {
        "head" => Ok(Value::Table(table.head(args.int(0, "n", 5)?))),
        "tail" => Ok(Value::Table(table.tail(args.int(0, "n", 5)?))),
        "copy" => Ok(Value::Table(table.clone())),
        "describe" => Ok(Value::Table(table.describe()?)),
        "groupby" => {
            let keys = args.names(0, "by")?.ok_or_else(|| {
                Exception::type_error("You have to supply one of 'by' and 'level'")
            })?;
            Ok(Value::GroupBy(table.groupby(keys)?))
        }
        "sort_values" => {
            args.check(name, 1, &["by", "ascending", "inplace"])?;
            let by = args.names(0, "by")?.ok_or_else(|| {
                Exception::type_error("sort_values() missing 1 required positional argument: 'by'")
            })?;
            let result = table.sort_values(&by, &ascending_flags(args)?)?;
            table_result(table, result, args)
        }
        "sort_index" => {
            let ascending = args.flag(usize::MAX, "ascending", true)?;
            let result = table.sort_index(ascending);
            table_result(table, result, args)
        }
        "reset_index" => {
            let result = table.reset_index(args.flag(usize::MAX, "drop", false)?);
            table_result(table, result, args)
        }
        "set_index" => {
            let keys = args.names(0, "keys")?.unwrap_or_default();
            let result = table.set_index(&keys)?;
            table_result(table, result, args)
        }
        "rename" => {
            let mapping = match args.keyword("columns") {
                Some(v) => rename_mapping(v)?,
                None => Vec::new(),
            };
            let result = table.rename(&mapping);
            table_result(table, result, args)
        }
        "drop" => {
            let names = match args.names(usize::MAX, "columns")? {
                Some(names) => names,
                None => {
                    if args.int(usize::MAX, "axis", 0)? != 1 {
                        return Err(Exception::new(
                            ExceptionKind::NotImplementedError,
                            "only dropping columns is supported; pass columns= or axis=1",
                        ));
                    }
                    args.names(0, "labels")?.unwrap_or_default()
                }
            };
            let result = table.drop_columns(&names)?;
            table_result(table, result, args)
        }
        "dropna" => {
            let subset = args.names(usize::MAX, "subset")?;
            let result = table.dropna(subset.as_deref())?;
            table_result(table, result, args)
        }
        "fillna" => {
            let value = args.require("fillna", 0, "value")?;
            let result = table.fillna(value);
            table_result(table, result, args)
        }
        "nlargest" | "nsmallest" => {
            let n = args.int(0, "n", 5)?;
            let column = args.names(1, "columns")?.and_then(|c| c.into_iter().next()).ok_or_else(|| {
                Exception::type_error(format!("{}() missing required argument: 'columns'", name))
            })?;
            Ok(Value::Table(if name == "nlargest" {
                table.nlargest(n, &column)?
            } else {
                table.nsmallest(n, &column)?
            }))
        }
        "merge" => {
            args.check("merge", 1, &["right", "on", "how"])?;
            let right = match args.require("merge", 0, "right")? {
                Value::Table(t) => t,
                other => {
                    return Err(Exception::type_error(format!(
                        "Can only merge Series or DataFrame objects, a {} was passed",
                        other.type_name()
                    )))
                }
            };
            let on = args.names(usize::MAX, "on")?.unwrap_or_default();
            let how_name = args.string(usize::MAX, "how")?.unwrap_or_else(|| "inner".to_string());
            let how = Join::from_name(&how_name).ok_or_else(|| {
                Exception::value_error(format!("do not recognize join method {}", how_name))
            })?;
            let worst_case = table.num_rows().saturating_mul(right.num_rows().max(1));
            check_allocation(
                worst_case.saturating_mul((table.columns.len() + right.columns.len()) * VALUE_SIZE),
                limit,
            )?;
            Ok(Value::Table(table.merge(right, &on, how)?))
        }
        "to_dict" => {
            let orient = args.string(0, "orient")?.unwrap_or_else(|| "dict".to_string());
            table.to_dict(&orient)
        }
        _ => Err(Exception::no_attribute(&Value::Table(Table::default()), name)),
    }
}

fn round_value(value: &Value, decimals: i64) -> Value {
    match value {
        Value::Float(f) => Value::Float(round_to(*f, decimals)),
        other => other.clone(),
    }
}

fn abs_value(value: &Value) -> Result<Value, Exception> {
    match value {
        Value::Int(i) => i.checked_abs().map(Value::Int).ok_or_else(Exception::overflow),
        Value::Bool(b) => Ok(Value::Int(*b as i64)),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        Value::None => Ok(Value::None),
        other => Err(Exception::type_error(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

fn cast(value: &Value, dtype: &str) -> Result<Value, Exception> {
    if value.is_missing() && dtype != "str" {
        return match dtype {
            "float" | "float64" => Ok(Value::Float(f64::NAN)),
            _ => Err(Exception::value_error(
                "Cannot convert non-finite values (NA or inf) to integer",
            )),
        };
    }
    match dtype {
        "int" | "int64" => match value {
            Value::Float(f) => Ok(Value::Int(f.trunc() as i64)),
            Value::Str(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
                Exception::value_error(format!(
                    "invalid literal for int() with base 10: {}",
                    value.repr()
                ))
            }),
            other => other
                .as_index()
                .map(Value::Int)
                .ok_or_else(|| Exception::type_error(format!("cannot cast {} to int", other.type_name()))),
        },
        "float" | "float64" => match value {
            Value::Str(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
                Exception::value_error(format!("could not convert string to float: {}", value.repr()))
            }),
            other => other
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| Exception::type_error(format!("cannot cast {} to float", other.type_name()))),
        },
        "str" | "object" => Ok(Value::Str(value.to_str())),
        "bool" => Ok(Value::Bool(value.truthy()?)),
        other => Err(Exception::type_error(format!("data type '{}' not understood", other))),
    }
}

fn dtype_name(value: &Value) -> Result<String, Exception> {
    match value {
        Value::Str(s) => Ok(s.clone()),
        Value::Builtin(b) => Ok(b.name().to_string()),
        other => Err(Exception::type_error(format!(
            "data type '{}' not understood",
            other.repr()
        ))),
    }
}

pub fn series_method(series: &mut Series, name: &str, args: &Args) -> Result<Value, Exception> {
    if let Some(agg) = Agg::from_name(name).filter(|a| *a != Agg::Size) {
        return series.aggregate(agg);
    }
    match name {
        "unique" | "tolist" | "to_list" => Ok(Value::List(if name == "unique" {
            series.unique()
        } else {
            series.values.clone()
        })),
        "value_counts" => Ok(Value::Series(series.value_counts())),
        "sort_values" => {
            let result = series.sort_values(args.flag(usize::MAX, "ascending", true)?);
            series_result(series, result, args)
        }
        "sort_index" => {
            let result = series.sort_index(args.flag(usize::MAX, "ascending", true)?);
            series_result(series, result, args)
        }
        "head" => Ok(Value::Series(series.head(args.int(0, "n", 5)?))),
        "tail" => Ok(Value::Series(series.tail(args.int(0, "n", 5)?))),
        "round" => {
            let decimals = args.int(0, "decimals", 0)?;
            Ok(Value::Series(series.with_values(
                series.values.iter().map(|v| round_value(v, decimals)).collect(),
            )))
        }
        "abs" => Ok(Value::Series(series.with_values(
            series.values.iter().map(abs_value).collect::<Result<_, _>>()?,
        ))),
        "cumsum" => Ok(Value::Series(series.cumsum()?)),
        "idxmax" => series.idx_extreme(true),
        "idxmin" => series.idx_extreme(false),
        "reset_index" => {
            if args.flag(usize::MAX, "drop", false)? {
                let mut result = series.clone();
                result.index = Index::range(series.len());
                return series_result(series, result, args);
            }
            let label = args.string(usize::MAX, "name")?;
            Ok(Value::Table(series.reset_index(label.as_deref())))
        }
        "to_frame" => {
            let label = args.string(0, "name")?;
            Ok(Value::Table(series.to_frame(label.as_deref())))
        }
        "isin" => {
            let candidates = sequence(args.require("isin", 0, "values")?)?;
            Ok(Value::Series(series.isin(&candidates)))
        }
        "fillna" => {
            let result = series.fillna(args.require("fillna", 0, "value")?);
            series_result(series, result, args)
        }
        "dropna" => {
            let result = series.dropna();
            series_result(series, result, args)
        }
        "astype" => {
            let dtype = dtype_name(args.require("astype", 0, "dtype")?)?;
            let values = series
                .values
                .iter()
                .map(|v| cast(v, &dtype))
                .collect::<Result<_, _>>()?;
            Ok(Value::Series(series.with_values(values)))
        }
        "any" | "all" => {
            let mut truths = series.values.iter().filter(|v| !v.is_missing()).map(Value::truthy);
            let result = if name == "any" {
                truths.try_fold(false, |acc, t| t.map(|t| acc || t))?
            } else {
                truths.try_fold(true, |acc, t| t.map(|t| acc && t))?
            };
            Ok(Value::Bool(result))
        }
        _ => Err(Exception::no_attribute(&Value::Series(Series::new(None, Vec::new())), name)),
    }
}

pub fn groupby_method(groups: &mut GroupBy, name: &str, args: &Args) -> Result<Value, Exception> {
    if let Some(agg) = Agg::from_name(name) {
        return groups.aggregate(agg);
    }
    match name {
        "agg" | "aggregate" => groups.agg(args.require(name, 0, "func")?),
        _ => Err(Exception::no_attribute(&Value::GroupBy(groups.clone()), name)),
    }
}

fn plot_kind(name: &str) -> Option<PlotKind> {
    match name {
        "bar" => Some(PlotKind::Bar),
        "plot" => Some(PlotKind::Line),
        "scatter" => Some(PlotKind::Scatter),
        _ => None,
    }
}

/// `bar(x, y)`, `plot(y)` or `plot(x, y)`, with an optional `label=`.
fn add_plot(figure: &mut Figure, kind: PlotKind, name: &str, args: &Args) -> Result<(), Exception> {
    let (x, y) = match (args.get(0, "x"), args.get(1, "y")) {
        (Some(x), Some(y)) => (sequence(x)?, sequence(y)?),
        (Some(y), None) if kind == PlotKind::Line => {
            let y = sequence(y)?;
            ((0..y.len() as i64).map(Value::Int).collect(), y)
        }
        _ => {
            return Err(Exception::type_error(format!(
                "{}() missing required arguments: 'x' and 'y'",
                name
            )))
        }
    };
    let label = args.string(usize::MAX, "label")?;
    figure
        .add_plot(kind, x, y, label)
        .map_err(Exception::value_error)
}

pub fn figure_method(figure: &mut Figure, name: &str, args: &Args) -> Result<Value, Exception> {
    if let Some(kind) = plot_kind(name) {
        add_plot(figure, kind, name, args)?;
        return Ok(Value::None);
    }
    let text = args.string(0, "label")?;
    match name {
        "set_title" => figure.title = text,
        "set_xlabel" => figure.xlabel = text,
        "set_ylabel" => figure.ylabel = text,
        _ => return Err(Exception::no_attribute(&Value::Figure(Figure::new()), name)),
    }
    Ok(Value::None)
}

/// `pd.DataFrame(data, columns=...)`.
fn build_table(args: &Args) -> Result<Table, Exception> {
    args.check("DataFrame", 1, &["data", "columns"])?;
    let columns = args.names(usize::MAX, "columns")?;
    let table = match args.get(0, "data") {
        None | Some(Value::None) => {
            let names = columns.clone().unwrap_or_default();
            Table::new(names.into_iter().map(|n| (n, Vec::new())).collect())?
        }
        Some(Value::Table(t)) => t.clone(),
        Some(Value::Dict(pairs)) => {
            let mut entries: Vec<(String, Option<Vec<Value>>, Value)> = Vec::with_capacity(pairs.len());
            for (k, v) in pairs {
                let values = match v {
                    Value::List(items) | Value::Tuple(items) => Some(items.clone()),
                    Value::Series(s) => Some(s.values.clone()),
                    Value::Range(r) => Some(r.iter().map(Value::Int).collect()),
                    _ => None,
                };
                entries.push((column_name(k)?, values, v.clone()));
            }
            let rows = entries.iter().filter_map(|(_, values, _)| values.as_ref().map(Vec::len)).max();
            let Some(rows) = rows.or(if entries.is_empty() { Some(0) } else { None }) else {
                return Err(Exception::value_error(
                    "If using all scalar values, you must pass an index",
                ));
            };
            let built = entries
                .into_iter()
                .map(|(name, values, scalar)| (name, values.unwrap_or_else(|| vec![scalar; rows])))
                .collect();
            let table = Table::new(built)?;
            match &columns {
                Some(names) => table.select(names)?,
                None => table,
            }
        }
        Some(Value::List(rows)) | Some(Value::Tuple(rows)) => {
            if rows.iter().all(|r| matches!(r, Value::Dict(_))) && !rows.is_empty() {
                Table::from_records(rows)?
            } else {
                let rows = rows
                    .iter()
                    .map(|r| match r {
                        Value::List(cells) | Value::Tuple(cells) => Ok(cells.clone()),
                        scalar => Ok(vec![scalar.clone()]),
                    })
                    .collect::<Result<Vec<_>, Exception>>()?;
                let width = rows.first().map(Vec::len).unwrap_or(0);
                let names = columns
                    .clone()
                    .unwrap_or_else(|| (0..width).map(|i| i.to_string()).collect());
                Table::from_rows(&rows, names)?
            }
        }
        Some(other) => {
            return Err(Exception::value_error(format!(
                "DataFrame constructor not properly called with a {}",
                other.type_name()
            )))
        }
    };
    Ok(table)
}

/// `pd.Series(data, name=...)`; a dict supplies the index labels.
fn build_series(args: &Args) -> Result<Series, Exception> {
    args.check("Series", 1, &["data", "name", "index"])?;
    let name = args.string(usize::MAX, "name")?;
    let mut series = match args.get(0, "data") {
        None | Some(Value::None) => Series::new(name.clone(), Vec::new()),
        Some(Value::Dict(pairs)) => Series {
            name: name.clone(),
            values: pairs.iter().map(|(_, v)| v.clone()).collect(),
            index: Index::named(Vec::new(), pairs.iter().map(|(k, _)| k.clone()).collect()),
        },
        Some(Value::Series(s)) => {
            let mut s = s.clone();
            if name.is_some() {
                s.name = name.clone();
            }
            s
        }
        Some(data) => Series::new(name.clone(), sequence(data)?),
    };
    if let Some(index) = args.keyword("index") {
        let labels = sequence(index)?;
        if labels.len() != series.len() {
            return Err(Exception::value_error(format!(
                "Length of values ({}) does not match length of index ({})",
                series.len(),
                labels.len()
            )));
        }
        series.index = Index::named(Vec::new(), labels);
    }
    Ok(series)
}

/// `pd.concat([...], ignore_index=False)` over tables or over series.
fn concat(args: &Args, limit: usize) -> Result<Value, Exception> {
    let objs = sequence(args.require("concat", 0, "objs")?)?;
    let ignore_index = args.flag(usize::MAX, "ignore_index", false)?;
    if objs.is_empty() {
        return Err(Exception::value_error("No objects to concatenate"));
    }
    if objs.iter().all(|o| matches!(o, Value::Series(_))) {
        let mut values = Vec::new();
        let mut labels = Vec::new();
        let mut name = None;
        for (i, obj) in objs.iter().enumerate() {
            if let Value::Series(s) = obj {
                if i == 0 {
                    name = s.name.clone();
                } else if name != s.name {
                    name = None;
                }
                values.extend(s.values.iter().cloned());
                labels.extend(s.index.labels.iter().cloned());
            }
        }
        check_allocation(values.len() * VALUE_SIZE, limit)?;
        let index = if ignore_index {
            Index::range(values.len())
        } else {
            Index::named(Vec::new(), labels)
        };
        return Ok(Value::Series(Series { name, values, index }));
    }
    let mut tables = Vec::with_capacity(objs.len());
    for obj in &objs {
        match obj {
            Value::Table(t) => tables.push(t),
            other => {
                return Err(Exception::type_error(format!(
                    "cannot concatenate object of type '{}'; only Series and DataFrame objs are valid",
                    other.type_name()
                )))
            }
        }
    }
    let mut names: Vec<String> = Vec::new();
    for t in &tables {
        for n in t.column_names() {
            if !names.contains(&n) {
                names.push(n);
            }
        }
    }
    let total_rows: usize = tables.iter().map(|t| t.num_rows()).sum();
    check_allocation(total_rows.saturating_mul(names.len().max(1) * VALUE_SIZE), limit)?;
    let mut columns: Vec<(String, Vec<Value>)> =
        names.iter().map(|n| (n.clone(), Vec::with_capacity(total_rows))).collect();
    let mut labels = Vec::with_capacity(total_rows);
    for t in &tables {
        for (name, values) in columns.iter_mut() {
            match t.position(name) {
                Some(p) => values.extend(t.columns[p].values.iter().cloned()),
                None => values.extend(std::iter::repeat(Value::None).take(t.num_rows())),
            }
        }
        labels.extend(t.index.labels.iter().cloned());
    }
    let index = if ignore_index {
        Index::range(total_rows)
    } else {
        Index::named(Vec::new(), labels)
    };
    Ok(Value::Table(Table::with_index(columns, index)?))
}

fn float_arg(args: &Args, func: &str) -> Result<f64, Exception> {
    let v = args.require(func, 0, "x")?;
    v.as_f64().ok_or_else(|| {
        Exception::type_error(format!("must be real number, not {}", v.type_name()))
    })
}

fn domain_error() -> Exception {
    Exception::value_error("math domain error")
}

/// Float to int for `floor` and `ceil`.
pub(super) fn float_to_int(f: f64) -> Result<Value, Exception> {
    if f.is_nan() {
        return Err(Exception::value_error("cannot convert float NaN to integer"));
    }
    if f.is_infinite() {
        return Err(Exception::new(
            ExceptionKind::OverflowError,
            "cannot convert float infinity to integer",
        ));
    }
    if f < i64::MIN as f64 || f >= i64::MAX as f64 {
        return Err(Exception::overflow());
    }
    Ok(Value::Int(f as i64))
}

fn math_call(name: &str, args: &Args) -> Result<Value, Exception> {
    if let (Some(Value::Int(i)), "floor" | "ceil") = (args.positional.first(), name) {
        return Ok(Value::Int(*i));
    }
    let x = float_arg(args, name)?;
    match name {
        "sqrt" if x < 0.0 => Err(domain_error()),
        "sqrt" => Ok(Value::Float(x.sqrt())),
        "log" => {
            if x <= 0.0 {
                return Err(domain_error());
            }
            match args.get(1, "base") {
                None => Ok(Value::Float(x.ln())),
                Some(base) => {
                    let base = base.as_f64().ok_or_else(|| {
                        Exception::type_error(format!("must be real number, not {}", base.type_name()))
                    })?;
                    if base <= 0.0 || base == 1.0 {
                        return Err(domain_error());
                    }
                    Ok(Value::Float(x.ln() / base.ln()))
                }
            }
        }
        "exp" => {
            let y = x.exp();
            if y.is_infinite() && x.is_finite() {
                return Err(Exception::new(ExceptionKind::OverflowError, "math range error"));
            }
            Ok(Value::Float(y))
        }
        "floor" => float_to_int(x.floor()),
        "ceil" => float_to_int(x.ceil()),
        "fabs" => Ok(Value::Float(x.abs())),
        "isnan" => Ok(Value::Bool(x.is_nan())),
        _ => Err(Exception::no_attribute(&Value::Library(Library::Math), name)),
    }
}

/// A new figure from `plt.figure(title=..., xlabel=..., ylabel=...)`.
fn new_figure(args: &Args) -> Result<Figure, Exception> {
    let mut figure = Figure::new();
    figure.title = args.string(usize::MAX, "title")?;
    figure.xlabel = args.string(usize::MAX, "xlabel")?;
    figure.ylabel = args.string(usize::MAX, "ylabel")?;
    Ok(figure)
}

pub fn library_call(lib: Library, name: &str, args: &Args, limit: usize) -> Result<Value, Exception> {
    match (lib, name) {
        (Library::Frames, "DataFrame") => {
            let table = build_table(args)?;
            check_allocation(
                table.num_rows().saturating_mul(table.columns.len() * VALUE_SIZE),
                limit,
            )?;
            Ok(Value::Table(table))
        }
        (Library::Frames, "Series") => Ok(Value::Series(build_series(args)?)),
        (Library::Frames, "concat") => concat(args, limit),
        (Library::Charts, "figure") => {
            args.check("figure", 0, &["title", "xlabel", "ylabel", "figsize"])?;
            Ok(Value::Figure(new_figure(args)?))
        }
        (Library::Charts, _) if plot_kind(name).is_some() => {
            let mut figure = new_figure(args)?;
            if let Some(kind) = plot_kind(name) {
                add_plot(&mut figure, kind, name, args)?;
            }
            Ok(Value::Figure(figure))
        }
        (Library::Math, _) => math_call(name, args),
        _ => Err(Exception::no_attribute(&Value::Library(lib), name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::new(vec![
            ("k".into(), vec!["a".into(), "b".into(), "a".into()]),
            ("v".into(), vec![Value::Int(3), Value::Int(1), Value::None]),
        ])
        .unwrap()
    }

    fn kw(mut args: Args, name: &str, value: Value) -> Args {
        args.keywords.push((name.to_string(), value));
        args
    }

    #[test]
    fn test_inplace_replaces_receiver() {
        let mut t = sample();
        let args = kw(Args::new(vec![Value::Int(0)]), "inplace", Value::Bool(true));
        assert_eq!(table_method(&mut t, "fillna", &args, usize::MAX).unwrap(), Value::None);
        assert_eq!(t.columns[1].values[2], Value::Int(0));
    }

    #[test]
    fn test_sort_and_rename() {
        let mut t = sample();
        let args = kw(Args::new(vec!["v".into()]), "ascending", Value::Bool(false));
        let Value::Table(sorted) = table_method(&mut t, "sort_values", &args, usize::MAX).unwrap() else {
            panic!("expected table");
        };
        assert_eq!(sorted.columns[1].values, vec![Value::Int(3), Value::Int(1), Value::None]);
        let mapping = Value::Dict(vec![("v".into(), "value".into())]);
        let args = kw(Args::default(), "columns", mapping);
        let Value::Table(renamed) = table_method(&mut t, "rename", &args, usize::MAX).unwrap() else {
            panic!("expected table");
        };
        assert_eq!(renamed.column_names(), vec!["k", "value"]);
    }

    #[test]
    fn test_series_reductions_and_round() {
        let mut s = Series::new(Some("x".into()), vec![Value::Float(1.25), Value::Float(2.5)]);
        assert_eq!(series_method(&mut s, "sum", &Args::default()).unwrap(), Value::Float(3.75));
        let Value::Series(r) = series_method(&mut s, "round", &Args::new(vec![Value::Int(1)])).unwrap() else {
            panic!("expected series");
        };
        assert_eq!(r.values, vec![Value::Float(1.2), Value::Float(2.5)]);
    }

    #[test]
    fn test_dataframe_constructors() {
        let data = Value::Dict(vec![
            ("a".into(), Value::List(vec![Value::Int(1), Value::Int(2)])),
            ("b".into(), Value::Int(0)),
        ]);
        let Value::Table(t) = library_call(Library::Frames, "DataFrame", &Args::new(vec![data]), usize::MAX).unwrap()
        else {
            panic!("expected table");
        };
        assert_eq!(t.columns[1].values, vec![Value::Int(0), Value::Int(0)]);

        let rows = Value::List(vec![Value::List(vec![Value::Int(1), "x".into()])]);
        let args = kw(
            Args::new(vec![rows]),
            "columns",
            Value::List(vec!["n".into(), "s".into()]),
        );
        let Value::Table(t) = library_call(Library::Frames, "DataFrame", &args, usize::MAX).unwrap() else {
            panic!("expected table");
        };
        assert_eq!(t.column_names(), vec!["n", "s"]);

        let scalars = Value::Dict(vec![("a".into(), Value::Int(1))]);
        let err = library_call(Library::Frames, "DataFrame", &Args::new(vec![scalars]), usize::MAX).unwrap_err();
        assert_eq!(err.message, "If using all scalar values, you must pass an index");
    }

    #[test]
    fn test_concat_tables_fills_missing() {
        let a = Value::Table(sample());
        let b = Value::Table(Table::new(vec![("z".into(), vec![Value::Int(9)])]).unwrap());
        let args = kw(Args::new(vec![Value::List(vec![a, b])]), "ignore_index", Value::Bool(true));
        let Value::Table(t) = library_call(Library::Frames, "concat", &args, usize::MAX).unwrap() else {
            panic!("expected table");
        };
        assert_eq!(t.num_rows(), 4);
        assert_eq!(t.columns[2].values[0], Value::None);
        assert_eq!(t.index.labels[3], Value::Int(3));
    }

    #[test]
    fn test_math_functions() {
        let call = |name: &str, x: Value| library_call(Library::Math, name, &Args::new(vec![x]), usize::MAX);
        assert_eq!(call("sqrt", Value::Int(9)).unwrap(), Value::Float(3.0));
        assert_eq!(call("floor", Value::Float(-1.5)).unwrap(), Value::Int(-2));
        assert_eq!(call("sqrt", Value::Int(-1)).unwrap_err().message, "math domain error");
        assert_eq!(call("ceil", Value::Float(f64::INFINITY)).unwrap_err().kind, ExceptionKind::OverflowError);
    }

    #[test]
    fn test_figure_plots() {
        let mut fig = Figure::new();
        let args = Args::new(vec![
            Value::List(vec!["a".into(), "b".into()]),
            Value::List(vec![Value::Int(1), Value::Int(2)]),
        ]);
        figure_method(&mut fig, "bar", &args).unwrap();
        figure_method(&mut fig, "set_title", &Args::new(vec!["Sales".into()])).unwrap();
        assert_eq!(fig.plots[0].kind, PlotKind::Bar);
        assert_eq!(fig.title.as_deref(), Some("Sales"));
        let bad = Args::new(vec![Value::List(vec![Value::Int(1)]), Value::List(vec![])]);
        assert_eq!(figure_method(&mut fig, "plot", &bad).unwrap_err().kind, ExceptionKind::ValueError);
    }
}
