use super::{
    column_name, dtype, format_cell, label_text, quantile, render_grid, Agg, GroupBy, Index, Series,
};
use crate::interp::{Exception, ExceptionKind};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

/// `DataFrame`: named columns of equal length plus a row index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<Column>,
    pub index: Index,
}

/// Join kind for [`Table::merge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Join {
    Inner,
    Left,
    Right,
    Outer,
}

impl Join {
    pub fn from_name(name: &str) -> Option<Join> {
        Some(match name {
            "inner" => Join::Inner,
            "left" => Join::Left,
            "right" => Join::Right,
            "outer" => Join::Outer,
            _ => return None,
        })
    }
}

impl Table {
    pub fn new(columns: Vec<(String, Vec<Value>)>) -> Result<Table, Exception> {
        let rows = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        Table::with_index(columns, Index::range(rows))
    }

    pub fn with_index(
        columns: Vec<(String, Vec<Value>)>,
        index: Index,
    ) -> Result<Table, Exception> {
        if columns.iter().any(|(_, v)| v.len() != index.len()) {
            return Err(Exception::value_error(
                "All arrays must be of the same length",
            ));
        }
        let mut table = Table {
            columns: Vec::with_capacity(columns.len()),
            index,
        };
        for (name, values) in columns {
            match table.position(&name) {
                Some(pos) => table.columns[pos].values = values,
                None => table.columns.push(Column { name, values }),
            }
        }
        Ok(table)
    }

    /// Build from a list of dicts; missing keys become `None`.
    pub fn from_records(records: &[Value]) -> Result<Table, Exception> {
        let mut names: Vec<String> = Vec::new();
        for record in records {
            let Value::Dict(pairs) = record else {
                return Err(Exception::type_error(format!(
                    "records must be dicts, not '{}'",
                    record.type_name()
                )));
            };
            for (k, _) in pairs {
                let name = column_name(k)?;
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        let columns = names
            .iter()
            .map(|name| {
                let values = records
                    .iter()
                    .map(|record| match record {
                        Value::Dict(pairs) => pairs
                            .iter()
                            .find(|(k, _)| column_name(k).ok().as_deref() == Some(name.as_str()))
                            .map(|(_, v)| v.clone())
                            .unwrap_or(Value::None),
                        _ => Value::None,
                    })
                    .collect();
                (name.clone(), values)
            })
            .collect();
        Table::with_index(columns, Index::range(records.len()))
    }

    /// Build from row sequences and explicit column names.
    pub fn from_rows(rows: &[Vec<Value>], names: Vec<String>) -> Result<Table, Exception> {
        let mut columns: Vec<(String, Vec<Value>)> =
            names.into_iter().map(|n| (n, Vec::with_capacity(rows.len()))).collect();
        for row in rows {
            if row.len() != columns.len() {
                return Err(Exception::value_error(format!(
                    "{} columns passed, passed data had {} columns",
                    columns.len(),
                    row.len()
                )));
            }
            for (col, v) in columns.iter_mut().zip(row) {
                col.1.push(v.clone());
            }
        }
        Table::with_index(columns, Index::range(rows.len()))
    }

    pub fn num_rows(&self) -> usize {
        self.index.len()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    fn require(&self, name: &str) -> Result<&Column, Exception> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| Exception::new(ExceptionKind::KeyError, format!("'{}'", name)))
    }

    pub fn column(&self, name: &str) -> Result<Series, Exception> {
        let col = self.require(name)?;
        Ok(Series {
            name: Some(col.name.clone()),
            values: col.values.clone(),
            index: self.index.clone(),
        })
    }

    pub fn row(&self, i: usize) -> Vec<Value> {
        self.columns.iter().map(|c| c.values[i].clone()).collect()
    }

    pub fn select(&self, names: &[String]) -> Result<Table, Exception> {
        let columns = names
            .iter()
            .map(|n| self.require(n).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Table {
            columns,
            index: self.index.clone(),
        })
    }

    pub fn take(&self, rows: &[usize]) -> Table {
        Table {
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    values: rows.iter().map(|&r| c.values[r].clone()).collect(),
                })
                .collect(),
            index: self.index.take(rows),
        }
    }

    pub fn filter(&self, mask: &[bool]) -> Result<Table, Exception> {
        if mask.len() != self.num_rows() {
            return Err(Exception::value_error(format!(
                "Item wrong length {} instead of {}.",
                mask.len(),
                self.num_rows()
            )));
        }
        let rows: Vec<usize> = (0..mask.len()).filter(|&i| mask[i]).collect();
        Ok(self.take(&rows))
    }

    pub fn head(&self, n: i64) -> Table {
        self.take(&head_rows(self.num_rows(), n))
    }

    pub fn tail(&self, n: i64) -> Table {
        self.take(&tail_rows(self.num_rows(), n))
    }

    /// Assign a column, replacing an existing one of the same name.
    pub fn set_column(&mut self, name: String, values: Vec<Value>) -> Result<(), Exception> {
        if values.len() != self.num_rows() && !(self.columns.is_empty() && self.index.is_empty())
        {
            return Err(Exception::value_error(format!(
                "Length of values ({}) does not match length of index ({})",
                values.len(),
                self.num_rows()
            )));
        }
        if self.columns.is_empty() && self.index.is_empty() {
            self.index = Index::range(values.len());
        }
        match self.position(&name) {
            Some(pos) => self.columns[pos].values = values,
            None => self.columns.push(Column { name, values }),
        }
        Ok(())
    }

    pub fn sort_values(&self, by: &[String], ascending: &[bool]) -> Result<Table, Exception> {
        let keys = by
            .iter()
            .map(|n| self.require(n))
            .collect::<Result<Vec<_>, _>>()?;
        let mut rows: Vec<usize> = (0..self.num_rows()).collect();
        rows.sort_by(|&a, &b| {
            for (i, col) in keys.iter().enumerate() {
                let (x, y) = (&col.values[a], &col.values[b]);
                let asc = ascending.get(i).or(ascending.last()).copied().unwrap_or(true);
                let ord = match (x.is_missing(), y.is_missing()) {
                    (false, false) if !asc => y.sort_cmp(x),
                    _ => x.sort_cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
        Ok(self.take(&rows))
    }

    pub fn sort_index(&self, ascending: bool) -> Table {
        let mut rows: Vec<usize> = (0..self.num_rows()).collect();
        rows.sort_by(|&a, &b| {
            let ord = self.index.labels[a].sort_cmp(&self.index.labels[b]);
            if ascending {
                ord
            } else {
                ord.reverse()
            }
        });
        self.take(&rows)
    }

    pub fn set_index(&self, keys: &[String]) -> Result<Table, Exception> {
        let key_cols = keys
            .iter()
            .map(|k| self.require(k).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        let labels = (0..self.num_rows())
            .map(|r| {
                if key_cols.len() == 1 {
                    key_cols[0].values[r].clone()
                } else {
                    Value::Tuple(key_cols.iter().map(|c| c.values[r].clone()).collect())
                }
            })
            .collect();
        Ok(Table {
            columns: self
                .columns
                .iter()
                .filter(|c| !keys.contains(&c.name))
                .cloned()
                .collect(),
            index: Index::named(keys.to_vec(), labels),
        })
    }

    pub fn reset_index(&self, drop: bool) -> Table {
        let rows = self.num_rows();
        let mut columns: Vec<Column> = Vec::new();
        if !drop {
            for (name, values) in self.index.level_columns() {
                if self.position(&name).is_none() {
                    columns.push(Column { name, values });
                }
            }
        }
        columns.extend(self.columns.iter().cloned());
        Table {
            columns,
            index: Index::range(rows),
        }
    }

    pub fn rename(&self, mapping: &[(String, String)]) -> Table {
        let mut table = self.clone();
        for col in &mut table.columns {
            if let Some((_, new)) = mapping.iter().find(|(old, _)| *old == col.name) {
                col.name = new.clone();
            }
        }
        table
    }

    pub fn drop_columns(&self, names: &[String]) -> Result<Table, Exception> {
        for n in names {
            self.require(n)?;
        }
        Ok(Table {
            columns: self
                .columns
                .iter()
                .filter(|c| !names.contains(&c.name))
                .cloned()
                .collect(),
            index: self.index.clone(),
        })
    }

    pub fn dropna(&self, subset: Option<&[String]>) -> Result<Table, Exception> {
        let checked: Vec<&Column> = match subset {
            Some(names) => names
                .iter()
                .map(|n| self.require(n))
                .collect::<Result<_, _>>()?,
            None => self.columns.iter().collect(),
        };
        let rows: Vec<usize> = (0..self.num_rows())
            .filter(|&r| checked.iter().all(|c| !c.values[r].is_missing()))
            .collect();
        Ok(self.take(&rows))
    }

    pub fn fillna(&self, value: &Value) -> Table {
        let mut table = self.clone();
        for col in &mut table.columns {
            for v in &mut col.values {
                if v.is_missing() {
                    *v = value.clone();
                }
            }
        }
        table
    }

    pub fn nlargest(&self, n: i64, column: &str) -> Result<Table, Exception> {
        Ok(self
            .sort_values(&[column.to_string()], &[false])?
            .head(n))
    }

    pub fn nsmallest(&self, n: i64, column: &str) -> Result<Table, Exception> {
        Ok(self.sort_values(&[column.to_string()], &[true])?.head(n))
    }

    /// Join on shared key columns. Overlapping non-key columns get `_x` and
    /// `_y` suffixes.
    pub fn merge(&self, other: &Table, on: &[String], how: Join) -> Result<Table, Exception> {
        let on: Vec<String> = if on.is_empty() {
            self.column_names()
                .into_iter()
                .filter(|n| other.position(n).is_some())
                .collect()
        } else {
            on.to_vec()
        };
        if on.is_empty() {
            return Err(Exception::new(
                ExceptionKind::ValueError,
                "No common columns to perform merge on",
            ));
        }
        let left_keys = on
            .iter()
            .map(|k| self.require(k))
            .collect::<Result<Vec<_>, _>>()?;
        let right_keys = on
            .iter()
            .map(|k| other.require(k))
            .collect::<Result<Vec<_>, _>>()?;
        let key_of = |cols: &[&Column], r: usize| -> Vec<Value> {
            cols.iter().map(|c| c.values[r].clone()).collect()
        };
        let same = |a: &[Value], b: &[Value]| a.iter().zip(b).all(|(x, y)| x.py_eq(y));

        let mut pairs: Vec<(Option<usize>, Option<usize>)> = Vec::new();
        let mut right_used = vec![false; other.num_rows()];
        for l in 0..self.num_rows() {
            let lk = key_of(&left_keys, l);
            let mut matched = false;
            for (r, used) in right_used.iter_mut().enumerate() {
                if same(&lk, &key_of(&right_keys, r)) {
                    pairs.push((Some(l), Some(r)));
                    *used = true;
                    matched = true;
                }
            }
            if !matched && matches!(how, Join::Left | Join::Outer) {
                pairs.push((Some(l), None));
            }
        }
        if matches!(how, Join::Right | Join::Outer) {
            for (r, used) in right_used.iter().enumerate() {
                if !used {
                    pairs.push((None, Some(r)));
                }
            }
        }
        if how == Join::Right {
            pairs.sort_by_key(|(_, r)| *r);
        }

        let mut columns: Vec<(String, Vec<Value>)> = Vec::new();
        for (i, key) in on.iter().enumerate() {
            let values = pairs
                .iter()
                .map(|(l, r)| match (l, r) {
                    (Some(l), _) => left_keys[i].values[*l].clone(),
                    (None, Some(r)) => right_keys[i].values[*r].clone(),
                    (None, None) => Value::None,
                })
                .collect();
            columns.push((key.clone(), values));
        }
        let side = |table: &Table, pick: &dyn Fn(&(Option<usize>, Option<usize>)) -> Option<usize>, suffix: &str, clash: &Table| {
            table
                .columns
                .iter()
                .filter(|c| !on.contains(&c.name))
                .map(|c| {
                    let name = if clash.position(&c.name).is_some() && !on.contains(&c.name) {
                        format!("{}{}", c.name, suffix)
                    } else {
                        c.name.clone()
                    };
                    let values = pairs
                        .iter()
                        .map(|p| pick(p).map(|r| c.values[r].clone()).unwrap_or(Value::None))
                        .collect();
                    (name, values)
                })
                .collect::<Vec<_>>()
        };
        columns.extend(side(self, &|p| p.0, "_x", other));
        columns.extend(side(other, &|p| p.1, "_y", self));
        Table::new(columns)
    }

    /// Reduce every column (numeric ones only for numeric reductions).
    pub fn aggregate(&self, agg: Agg) -> Result<Series, Exception> {
        let mut labels = Vec::new();
        let mut values = Vec::new();
        for col in &self.columns {
            if agg.numeric_only() && !is_numeric_column(&col.values) {
                continue;
            }
            labels.push(Value::Str(col.name.clone()));
            values.push(agg.apply(&col.values)?);
        }
        Ok(Series {
            name: None,
            values,
            index: Index::named(Vec::new(), labels),
        })
    }

    pub fn describe(&self) -> Result<Table, Exception> {
        let stats = ["count", "mean", "std", "min", "25%", "50%", "75%", "max"];
        let mut columns = Vec::new();
        for col in &self.columns {
            if !is_numeric_column(&col.values) {
                continue;
            }
            let nums: Vec<f64> = col
                .values
                .iter()
                .filter(|v| !v.is_missing())
                .filter_map(Value::as_f64)
                .collect();
            let count = Agg::Count.apply(&col.values)?;
            let mean = Agg::Mean.apply(&col.values)?;
            let std = Agg::Std.apply(&col.values)?;
            let min = nums.iter().cloned().fold(f64::NAN, f64::min);
            let max = nums.iter().cloned().fold(f64::NAN, f64::max);
            let values = vec![
                Value::Float(count.as_f64().unwrap_or(0.0)),
                mean,
                std,
                Value::Float(min),
                Value::Float(quantile(nums.clone(), 0.25)),
                Value::Float(quantile(nums.clone(), 0.5)),
                Value::Float(quantile(nums, 0.75)),
                Value::Float(max),
            ];
            columns.push((col.name.clone(), values));
        }
        if columns.is_empty() {
            return Err(Exception::value_error(
                "Cannot describe a DataFrame without numeric columns",
            ));
        }
        let index = Index::named(Vec::new(), stats.iter().map(|s| Value::from(*s)).collect());
        Table::with_index(columns, index)
    }

    /// `to_dict(orient)` for `dict`, `list` and `records`.
    pub fn to_dict(&self, orient: &str) -> Result<Value, Exception> {
        match orient {
            "dict" => Ok(Value::Dict(
                self.columns
                    .iter()
                    .map(|c| {
                        let inner = self
                            .index
                            .labels
                            .iter()
                            .cloned()
                            .zip(c.values.iter().cloned())
                            .collect();
                        (Value::Str(c.name.clone()), Value::Dict(inner))
                    })
                    .collect(),
            )),
            "list" => Ok(Value::Dict(
                self.columns
                    .iter()
                    .map(|c| (Value::Str(c.name.clone()), Value::List(c.values.clone())))
                    .collect(),
            )),
            "records" => Ok(Value::List(
                (0..self.num_rows())
                    .map(|r| {
                        Value::Dict(
                            self.columns
                                .iter()
                                .map(|c| (Value::Str(c.name.clone()), c.values[r].clone()))
                                .collect(),
                        )
                    })
                    .collect(),
            )),
            other => Err(Exception::value_error(format!(
                "orient '{}' not understood",
                other
            ))),
        }
    }

    pub fn groupby(&self, keys: Vec<String>) -> Result<GroupBy, Exception> {
        GroupBy::new(self.clone(), keys)
    }

    pub fn dtypes(&self) -> Series {
        Series {
            name: None,
            values: self
                .columns
                .iter()
                .map(|c| Value::from(dtype(&c.values)))
                .collect(),
            index: Index::named(
                Vec::new(),
                self.columns.iter().map(|c| Value::Str(c.name.clone())).collect(),
            ),
        }
    }

    pub fn render(&self) -> String {
        if self.num_rows() == 0 || self.columns.is_empty() {
            return format!(
                "Empty DataFrame\nColumns: [{}]\nIndex: []",
                self.column_names().join(", ")
            );
        }
        let headers = self.column_names();
        let index_cells: Vec<String> = self.index.labels.iter().map(label_text).collect();
        let rows: Vec<Vec<String>> = (0..self.num_rows())
            .map(|r| self.columns.iter().map(|c| format_cell(&c.values[r])).collect())
            .collect();
        let grid = render_grid("", &headers, &index_cells, &rows);
        if self.index.names.is_empty() {
            grid
        } else {
            let mut lines: Vec<&str> = grid.lines().collect();
            let names = self.index.names.join(" ");
            let first = lines.remove(0);
            format!("{}\n{}\n{}", first, names, lines.join("\n"))
        }
    }
}

pub(crate) fn is_numeric_column(values: &[Value]) -> bool {
    values.iter().any(|v| !v.is_missing())
        && values.iter().all(|v| v.is_missing() || v.is_numeric())
}

pub(crate) fn head_rows(len: usize, n: i64) -> Vec<usize> {
    let take = if n >= 0 {
        (n as usize).min(len)
    } else {
        len.saturating_sub(n.unsigned_abs() as usize)
    };
    (0..take).collect()
}

pub(crate) fn tail_rows(len: usize, n: i64) -> Vec<usize> {
    let take = if n >= 0 {
        (n as usize).min(len)
    } else {
        len.saturating_sub(n.unsigned_abs() as usize)
    };
    (len - take..len).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sales() -> Table {
        Table::new(vec![
            (
                "region".to_string(),
                vec!["east".into(), "west".into(), "east".into(), "north".into()],
            ),
            (
                "sales".to_string(),
                vec![Value::Int(10), Value::Int(5), Value::Int(7), Value::None],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_columns_must_match_length() {
        let err = Table::new(vec![
            ("a".to_string(), vec![Value::Int(1)]),
            ("b".to_string(), vec![]),
        ])
        .unwrap_err();
        assert_eq!(err.kind, ExceptionKind::ValueError);
    }

    #[test]
    fn test_from_records_fills_missing() {
        let records = vec![
            Value::Dict(vec![(Value::from("a"), Value::Int(1))]),
            Value::Dict(vec![(Value::from("b"), Value::Int(2))]),
        ];
        let table = Table::from_records(&records).unwrap();
        assert_eq!(table.column_names(), vec!["a", "b"]);
        assert_eq!(table.columns[0].values, vec![Value::Int(1), Value::None]);
    }

    #[test]
    fn test_filter_keeps_labels() {
        let table = sales();
        let filtered = table.filter(&[false, true, false, true]).unwrap();
        assert_eq!(filtered.index.labels, vec![Value::Int(1), Value::Int(3)]);
        assert!(table.filter(&[true]).is_err());
    }

    #[test]
    fn test_sort_values_descending_puts_missing_last() {
        let sorted = sales()
            .sort_values(&["sales".to_string()], &[false])
            .unwrap();
        assert_eq!(
            sorted.columns[1].values,
            vec![Value::Int(10), Value::Int(7), Value::Int(5), Value::None]
        );
    }

    #[test]
    fn test_set_and_reset_index() {
        let indexed = sales().set_index(&["region".to_string()]).unwrap();
        assert_eq!(indexed.column_names(), vec!["sales"]);
        let reset = indexed.reset_index(false);
        assert_eq!(reset.column_names(), vec!["region", "sales"]);
        assert_eq!(reset.index, Index::range(4));
        assert_eq!(sales().reset_index(false).column_names()[0], "index");
    }

    #[test]
    fn test_merge_inner_and_left() {
        let left = sales();
        let right = Table::new(vec![
            ("region".to_string(), vec!["east".into(), "west".into()]),
            ("manager".to_string(), vec!["ann".into(), "bo".into()]),
        ])
        .unwrap();
        let inner = left.merge(&right, &["region".to_string()], Join::Inner).unwrap();
        assert_eq!(inner.num_rows(), 3);
        assert_eq!(inner.column_names(), vec!["region", "sales", "manager"]);
        let outer = left.merge(&right, &[], Join::Left).unwrap();
        assert_eq!(outer.num_rows(), 4);
        assert_eq!(outer.columns[2].values[3], Value::None);
    }

    #[test]
    fn test_aggregate_skips_text_columns() {
        let sums = sales().aggregate(Agg::Sum).unwrap();
        assert_eq!(sums.values, vec![Value::Int(22)]);
        let counts = sales().aggregate(Agg::Count).unwrap();
        assert_eq!(counts.values, vec![Value::Int(4), Value::Int(3)]);
    }

    #[test]
    fn test_to_dict_orients() {
        let table = sales().head(1);
        assert_eq!(
            table.to_dict("records").unwrap(),
            Value::List(vec![Value::Dict(vec![
                (Value::from("region"), Value::from("east")),
                (Value::from("sales"), Value::Int(10)),
            ])])
        );
        assert!(table.to_dict("split").is_err());
    }

    #[test]
    fn test_render_aligns_cells() {
        let text = sales().head(2).render();
        assert_eq!(text, "   region  sales\n0    east     10\n1    west      5");
    }

    #[test]
    fn test_head_and_tail_negative() {
        assert_eq!(head_rows(5, -2), vec![0, 1, 2]);
        assert_eq!(tail_rows(5, 2), vec![3, 4]);
        assert_eq!(tail_rows(5, -4), vec![4]);
    }
}
