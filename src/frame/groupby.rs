use super::table::is_numeric_column;
use super::{Agg, Index, Series, Table};
use crate::interp::{Exception, ExceptionKind};
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Columns picked out of a grouping with `gb['col']` or `gb[['a', 'b']]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Selection {
    Column(String),
    Columns(Vec<String>),
}

/// Result of `DataFrame.groupby`; reduced with one of the aggregations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupBy {
    pub table: Table,
    pub keys: Vec<String>,
    pub selection: Option<Selection>,
}

impl GroupBy {
    pub fn new(table: Table, keys: Vec<String>) -> Result<GroupBy, Exception> {
        if keys.is_empty() {
            return Err(Exception::value_error("No group keys passed!"));
        }
        for key in &keys {
            if table.position(key).is_none() {
                return Err(Exception::new(ExceptionKind::KeyError, format!("'{}'", key)));
            }
        }
        Ok(GroupBy {
            table,
            keys,
            selection: None,
        })
    }

    pub fn select(&self, selection: Selection) -> Result<GroupBy, Exception> {
        let names: Vec<&String> = match &selection {
            Selection::Column(c) => vec![c],
            Selection::Columns(cs) => cs.iter().collect(),
        };
        for name in names {
            if self.table.position(name).is_none() {
                return Err(Exception::new(
                    ExceptionKind::KeyError,
                    format!("Column not found: {}", name),
                ));
            }
        }
        Ok(GroupBy {
            table: self.table.clone(),
            keys: self.keys.clone(),
            selection: Some(selection),
        })
    }

    /// Group keys in sorted order with their row positions. Rows with a
    /// missing key are dropped.
    pub fn groups(&self) -> Vec<(Value, Vec<usize>)> {
        let key_cols: Vec<&Vec<Value>> = self
            .keys
            .iter()
            .filter_map(|k| self.table.position(k))
            .map(|p| &self.table.columns[p].values)
            .collect();
        let mut groups: Vec<(Value, Vec<usize>)> = Vec::new();
        for row in 0..self.table.num_rows() {
            let parts: Vec<Value> = key_cols.iter().map(|c| c[row].clone()).collect();
            if parts.iter().any(Value::is_missing) {
                continue;
            }
            let key = if parts.len() == 1 {
                parts.into_iter().next().unwrap_or(Value::None)
            } else {
                Value::Tuple(parts)
            };
            match groups.iter_mut().find(|(k, _)| k.py_eq(&key)) {
                Some((_, rows)) => rows.push(row),
                None => groups.push((key, vec![row])),
            }
        }
        groups.sort_by(|a, b| a.0.sort_cmp(&b.0));
        groups
    }

    pub fn len(&self) -> usize {
        self.groups().len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups().is_empty()
    }

    fn target_columns(&self, agg: Agg) -> Vec<String> {
        match &self.selection {
            Some(Selection::Column(c)) => vec![c.clone()],
            Some(Selection::Columns(cs)) => cs.clone(),
            None => self
                .table
                .columns
                .iter()
                .filter(|c| !self.keys.contains(&c.name))
                .filter(|c| !agg.numeric_only() || is_numeric_column(&c.values))
                .map(|c| c.name.clone())
                .collect(),
        }
    }

    fn result_index(&self, groups: &[(Value, Vec<usize>)]) -> Index {
        Index::named(
            self.keys.clone(),
            groups.iter().map(|(k, _)| k.clone()).collect(),
        )
    }

    fn reduce_column(
        &self,
        name: &str,
        agg: Agg,
        groups: &[(Value, Vec<usize>)],
    ) -> Result<Vec<Value>, Exception> {
        let col = self.table.column(name)?;
        groups
            .iter()
            .map(|(_, rows)| {
                let values: Vec<Value> = rows.iter().map(|&r| col.values[r].clone()).collect();
                agg.apply(&values)
            })
            .collect()
    }

    /// Apply one aggregation. A single selected column (and `size`) yields
    /// a Series, anything else a DataFrame indexed by the group keys.
    pub fn aggregate(&self, agg: Agg) -> Result<Value, Exception> {
        let groups = self.groups();
        let index = self.result_index(&groups);
        if agg == Agg::Size {
            let name = match &self.selection {
                Some(Selection::Column(c)) => Some(c.clone()),
                _ => None,
            };
            return Ok(Value::Series(Series {
                name,
                values: groups
                    .iter()
                    .map(|(_, rows)| Value::Int(rows.len() as i64))
                    .collect(),
                index,
            }));
        }
        if let Some(Selection::Column(name)) = &self.selection {
            return Ok(Value::Series(Series {
                name: Some(name.clone()),
                values: self.reduce_column(name, agg, &groups)?,
                index,
            }));
        }
        let columns = self
            .target_columns(agg)
            .into_iter()
            .map(|name| {
                let values = self.reduce_column(&name, agg, &groups)?;
                Ok((name, values))
            })
            .collect::<Result<Vec<_>, Exception>>()?;
        Ok(Value::Table(Table::with_index(columns, index)?))
    }

    /// `agg('sum')`, `agg(['sum', 'mean'])` or `agg({'col': 'sum'})`.
    pub fn agg(&self, spec: &Value) -> Result<Value, Exception> {
        match spec {
            Value::Str(name) => self.aggregate(parse_agg(name)?),
            Value::List(names) => {
                let groups = self.groups();
                let index = self.result_index(&groups);
                let targets = self.target_columns(Agg::Count);
                let mut columns = Vec::new();
                for target in &targets {
                    for name in names {
                        let agg = parse_agg(&name.to_str())?;
                        let label = if targets.len() == 1 {
                            agg.name().to_string()
                        } else {
                            format!("{}_{}", target, agg.name())
                        };
                        columns.push((label, self.reduce_column(target, agg, &groups)?));
                    }
                }
                Ok(Value::Table(Table::with_index(columns, index)?))
            }
            Value::Dict(pairs) => {
                let groups = self.groups();
                let index = self.result_index(&groups);
                let mut columns = Vec::new();
                for (col, how) in pairs {
                    let col = col.to_str();
                    let agg = parse_agg(&how.to_str())?;
                    columns.push((col.clone(), self.reduce_column(&col, agg, &groups)?));
                }
                Ok(Value::Table(Table::with_index(columns, index)?))
            }
            other => Err(Exception::type_error(format!(
                "agg expects a function name, list or dict, not '{}'",
                other.type_name()
            ))),
        }
    }
}

fn parse_agg(name: &str) -> Result<Agg, Exception> {
    Agg::from_name(name).ok_or_else(|| {
        Exception::new(
            ExceptionKind::AttributeError,
            format!("'{}' is not a valid function for 'DataFrameGroupBy' object", name),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sales() -> Table {
        Table::new(vec![
            (
                "region".to_string(),
                vec!["west".into(), "east".into(), "west".into(), Value::None],
            ),
            (
                "product".to_string(),
                vec!["a".into(), "b".into(), "a".into(), "c".into()],
            ),
            (
                "sales".to_string(),
                vec![Value::Int(5), Value::Int(10), Value::Int(7), Value::Int(1)],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_selected_column_sum_is_series_sorted_by_key() {
        let gb = sales()
            .groupby(vec!["region".to_string()])
            .unwrap()
            .select(Selection::Column("sales".to_string()))
            .unwrap();
        let Value::Series(s) = gb.aggregate(Agg::Sum).unwrap() else {
            panic!("expected series");
        };
        assert_eq!(s.index.labels, vec![Value::from("east"), Value::from("west")]);
        assert_eq!(s.values, vec![Value::Int(10), Value::Int(12)]);
        let table = s.reset_index(None);
        assert_eq!(table.column_names(), vec!["region", "sales"]);
        assert_eq!(table.num_rows(), 2);
    }

    #[test]
    fn test_numeric_aggregate_skips_text_columns() {
        let gb = sales().groupby(vec!["region".to_string()]).unwrap();
        let Value::Table(t) = gb.aggregate(Agg::Mean).unwrap() else {
            panic!("expected table");
        };
        assert_eq!(t.column_names(), vec!["sales"]);
        let Value::Table(t) = gb.aggregate(Agg::First).unwrap() else {
            panic!("expected table");
        };
        assert_eq!(t.column_names(), vec!["product", "sales"]);
    }

    #[test]
    fn test_multi_key_groups_use_tuples() {
        let gb = sales()
            .groupby(vec!["region".to_string(), "product".to_string()])
            .unwrap();
        let groups = gb.groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(
            groups[0].0,
            Value::Tuple(vec![Value::from("east"), Value::from("b")])
        );
    }

    #[test]
    fn test_agg_dict_and_unknown_function() {
        let gb = sales().groupby(vec!["region".to_string()]).unwrap();
        let spec = Value::Dict(vec![(Value::from("sales"), Value::from("max"))]);
        let Value::Table(t) = gb.agg(&spec).unwrap() else {
            panic!("expected table");
        };
        assert_eq!(t.columns[0].values, vec![Value::Int(10), Value::Int(7)]);
        assert!(gb.agg(&Value::from("explode")).is_err());
    }

    #[test]
    fn test_unknown_key_is_key_error() {
        let err = sales().groupby(vec!["nope".to_string()]).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::KeyError);
    }
}
