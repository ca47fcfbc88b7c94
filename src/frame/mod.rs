//! In-memory tables: `DataFrame`, `Series` and `GroupBy` values.
//!
//! Data is stored column-major as plain [`Value`]s; `None` and NaN are the
//! missing markers. Operations return new values and never mutate their
//! receiver.

mod groupby;
mod series;
mod table;

pub use groupby::{GroupBy, Selection};
pub use series::Series;
pub use table::{Column, Join, Table};

use crate::interp::{Exception, ExceptionKind};
use crate::value::{format_float, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Row labels. An index without names is the default positional one (or
/// what is left of it after filtering); multi-level labels are tuples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub names: Vec<String>,
    pub labels: Vec<Value>,
}

impl Index {
    pub fn range(n: usize) -> Self {
        Self {
            names: Vec::new(),
            labels: (0..n as i64).map(Value::Int).collect(),
        }
    }

    pub fn named(names: Vec<String>, labels: Vec<Value>) -> Self {
        Self { names, labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn take(&self, rows: &[usize]) -> Index {
        Index {
            names: self.names.clone(),
            labels: rows.iter().map(|&r| self.labels[r].clone()).collect(),
        }
    }

    pub fn position(&self, label: &Value) -> Option<usize> {
        self.labels.iter().position(|l| l.py_eq(label))
    }

    /// Index levels as columns, as inserted by `reset_index`.
    pub fn level_columns(&self) -> Vec<(String, Vec<Value>)> {
        if self.names.is_empty() {
            return vec![("index".to_string(), self.labels.clone())];
        }
        if self.names.len() == 1 {
            return vec![(self.names[0].clone(), self.labels.clone())];
        }
        self.names
            .iter()
            .enumerate()
            .map(|(level, name)| {
                let values = self
                    .labels
                    .iter()
                    .map(|label| match label {
                        Value::Tuple(parts) => parts.get(level).cloned().unwrap_or(Value::None),
                        other => other.clone(),
                    })
                    .collect();
                (name.clone(), values)
            })
            .collect()
    }
}

/// Reductions shared by tables, series and groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Agg {
    Sum,
    Mean,
    Min,
    Max,
    Count,
    Size,
    Median,
    Std,
    First,
    Last,
    Nunique,
}

impl Agg {
    pub fn from_name(name: &str) -> Option<Agg> {
        Some(match name {
            "sum" => Agg::Sum,
            "mean" => Agg::Mean,
            "min" => Agg::Min,
            "max" => Agg::Max,
            "count" => Agg::Count,
            "size" => Agg::Size,
            "median" => Agg::Median,
            "std" => Agg::Std,
            "first" => Agg::First,
            "last" => Agg::Last,
            "nunique" => Agg::Nunique,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Agg::Sum => "sum",
            Agg::Mean => "mean",
            Agg::Min => "min",
            Agg::Max => "max",
            Agg::Count => "count",
            Agg::Size => "size",
            Agg::Median => "median",
            Agg::Std => "std",
            Agg::First => "first",
            Agg::Last => "last",
            Agg::Nunique => "nunique",
        }
    }

    /// Whether non-numeric columns are skipped when reducing a whole table.
    pub fn numeric_only(&self) -> bool {
        matches!(self, Agg::Sum | Agg::Mean | Agg::Median | Agg::Std)
    }

    pub fn apply(&self, values: &[Value]) -> Result<Value, Exception> {
        let present: Vec<&Value> = values.iter().filter(|v| !v.is_missing()).collect();
        match self {
            Agg::Size => Ok(Value::Int(values.len() as i64)),
            Agg::Count => Ok(Value::Int(present.len() as i64)),
            Agg::Sum => sum_values(&present),
            Agg::Mean => {
                let nums = numbers(&present, "mean")?;
                if nums.is_empty() {
                    return Ok(Value::Float(f64::NAN));
                }
                Ok(Value::Float(nums.iter().sum::<f64>() / nums.len() as f64))
            }
            Agg::Median => Ok(Value::Float(quantile(numbers(&present, "median")?, 0.5))),
            Agg::Std => {
                let nums = numbers(&present, "std")?;
                if nums.len() < 2 {
                    return Ok(Value::Float(f64::NAN));
                }
                let mean = nums.iter().sum::<f64>() / nums.len() as f64;
                let var = nums.iter().map(|x| (x - mean).powi(2)).sum::<f64>()
                    / (nums.len() - 1) as f64;
                Ok(Value::Float(var.sqrt()))
            }
            Agg::Min | Agg::Max => {
                let mut best: Option<&Value> = None;
                for v in present {
                    best = Some(match best {
                        None => v,
                        Some(b) => {
                            let ord = v.py_cmp(b)?;
                            let better = if *self == Agg::Min {
                                ord == Ordering::Less
                            } else {
                                ord == Ordering::Greater
                            };
                            if better {
                                v
                            } else {
                                b
                            }
                        }
                    });
                }
                Ok(best.cloned().unwrap_or(Value::Float(f64::NAN)))
            }
            Agg::First => Ok(present.first().map(|v| (*v).clone()).unwrap_or(Value::None)),
            Agg::Last => Ok(present.last().map(|v| (*v).clone()).unwrap_or(Value::None)),
            Agg::Nunique => {
                let mut seen: Vec<&Value> = Vec::new();
                for v in present {
                    if !seen.iter().any(|s| s.py_eq(v)) {
                        seen.push(v);
                    }
                }
                Ok(Value::Int(seen.len() as i64))
            }
        }
    }
}

fn numbers(values: &[&Value], op: &str) -> Result<Vec<f64>, Exception> {
    values
        .iter()
        .map(|v| {
            v.as_f64().ok_or_else(|| {
                Exception::type_error(format!(
                    "cannot compute {} of '{}' values",
                    op,
                    v.type_name()
                ))
            })
        })
        .collect()
}

fn sum_values(values: &[&Value]) -> Result<Value, Exception> {
    if !values.is_empty() && values.iter().all(|v| matches!(v, Value::Str(_))) {
        return Ok(Value::Str(values.iter().map(|v| v.to_str()).collect()));
    }
    let mut int_total: i64 = 0;
    let mut float_total: f64 = 0.0;
    let mut is_float = false;
    for v in values {
        match v {
            Value::Float(f) => {
                is_float = true;
                float_total += f;
            }
            Value::Int(_) | Value::Bool(_) => {
                let i = v.as_index().unwrap_or(0);
                int_total = int_total.checked_add(i).ok_or_else(Exception::overflow)?;
            }
            other => {
                return Err(Exception::type_error(format!(
                    "unsupported operand type(s) for +: 'int' and '{}'",
                    other.type_name()
                )))
            }
        }
    }
    Ok(if is_float {
        Value::Float(float_total + int_total as f64)
    } else {
        Value::Int(int_total)
    })
}

/// Linear-interpolated quantile, NaN when empty.
pub fn quantile(mut values: Vec<f64>, q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let pos = q * (values.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    values[lo] + (values[hi] - values[lo]) * (pos - lo as f64)
}

/// pandas-style dtype name for a column.
pub fn dtype(values: &[Value]) -> &'static str {
    let present: Vec<&Value> = values.iter().filter(|v| !v.is_none()).collect();
    if present.is_empty() {
        return "object";
    }
    if present.iter().all(|v| matches!(v, Value::Bool(_))) {
        "bool"
    } else if present.iter().all(|v| matches!(v, Value::Int(_))) && present.len() == values.len()
    {
        "int64"
    } else if present.iter().all(|v| v.is_numeric()) {
        "float64"
    } else {
        "object"
    }
}

/// Check that a value can be used as a column name.
pub fn column_name(key: &Value) -> Result<String, Exception> {
    match key {
        Value::Str(s) => Ok(s.clone()),
        Value::Int(i) => Ok(i.to_string()),
        other => Err(Exception::new(ExceptionKind::KeyError, other.repr())),
    }
}

pub(crate) fn format_cell(value: &Value) -> String {
    match value {
        Value::Float(f) if f.is_nan() => "NaN".to_string(),
        Value::Float(f) => format_float(*f),
        other => other.to_str(),
    }
}

fn label_text(value: &Value) -> String {
    match value {
        Value::Tuple(parts) => parts.iter().map(format_cell).collect::<Vec<_>>().join(" "),
        other => format_cell(other),
    }
}

/// Lay out a text grid: index cells left-aligned, data cells right-aligned.
pub(crate) fn render_grid(
    index_header: &str,
    headers: &[String],
    index_cells: &[String],
    rows: &[Vec<String>],
) -> String {
    let index_width = index_cells
        .iter()
        .map(|c| c.chars().count())
        .chain(std::iter::once(index_header.chars().count()))
        .max()
        .unwrap_or(0);
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            rows.iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(h.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut lines = Vec::with_capacity(rows.len() + 1);
    let mut header = format!("{:<w$}", index_header, w = index_width);
    for (h, w) in headers.iter().zip(&widths) {
        header.push_str(&format!("  {:>w$}", h, w = *w));
    }
    lines.push(header.trim_end().to_string());
    for (label, row) in index_cells.iter().zip(rows) {
        let mut line = format!("{:<w$}", label, w = index_width);
        for (cell, w) in row.iter().zip(&widths) {
            line.push_str(&format!("  {:>w$}", cell, w = *w));
        }
        lines.push(line);
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agg_skips_missing() {
        let values = vec![Value::Int(1), Value::None, Value::Int(3)];
        assert_eq!(Agg::Sum.apply(&values).unwrap(), Value::Int(4));
        assert_eq!(Agg::Mean.apply(&values).unwrap(), Value::Float(2.0));
        assert_eq!(Agg::Count.apply(&values).unwrap(), Value::Int(2));
        assert_eq!(Agg::Size.apply(&values).unwrap(), Value::Int(3));
        assert_eq!(Agg::Max.apply(&values).unwrap(), Value::Int(3));
    }

    #[test]
    fn test_sum_mixes_ints_and_floats() {
        let values = vec![Value::Int(1), Value::Float(0.5)];
        assert_eq!(Agg::Sum.apply(&values).unwrap(), Value::Float(1.5));
        let err = Agg::Sum
            .apply(&[Value::Int(i64::MAX), Value::Int(1)])
            .unwrap_err();
        assert_eq!(err.kind, ExceptionKind::OverflowError);
    }

    #[test]
    fn test_quantile_interpolates() {
        assert_eq!(quantile(vec![1.0, 2.0, 3.0, 4.0], 0.5), 2.5);
        assert!(quantile(vec![], 0.5).is_nan());
    }

    #[test]
    fn test_dtype_inference() {
        assert_eq!(dtype(&[Value::Int(1), Value::Int(2)]), "int64");
        assert_eq!(dtype(&[Value::Int(1), Value::Float(2.0)]), "float64");
        assert_eq!(dtype(&[Value::Int(1), Value::None]), "float64");
        assert_eq!(dtype(&[Value::from("a")]), "object");
    }

    #[test]
    fn test_multi_level_reset_columns() {
        let index = Index::named(
            vec!["a".into(), "b".into()],
            vec![Value::Tuple(vec![Value::Int(1), Value::from("x")])],
        );
        let cols = index.level_columns();
        assert_eq!(cols[0], ("a".to_string(), vec![Value::Int(1)]));
        assert_eq!(cols[1], ("b".to_string(), vec![Value::from("x")]));
    }
}
