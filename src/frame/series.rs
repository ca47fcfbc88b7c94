use super::table::{head_rows, tail_rows};
use super::{dtype, format_cell, label_text, render_grid, Agg, Index, Table};
use crate::interp::{Exception, ExceptionKind};
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// One labelled column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: Option<String>,
    pub values: Vec<Value>,
    pub index: Index,
}

impl Series {
    pub fn new(name: Option<String>, values: Vec<Value>) -> Self {
        let index = Index::range(values.len());
        Self {
            name,
            values,
            index,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Same labels, new values.
    pub fn with_values(&self, values: Vec<Value>) -> Series {
        Series {
            name: self.name.clone(),
            values,
            index: self.index.clone(),
        }
    }

    pub fn take(&self, rows: &[usize]) -> Series {
        Series {
            name: self.name.clone(),
            values: rows.iter().map(|&r| self.values[r].clone()).collect(),
            index: self.index.take(rows),
        }
    }

    pub fn filter(&self, mask: &[bool]) -> Result<Series, Exception> {
        if mask.len() != self.len() {
            return Err(Exception::value_error(format!(
                "Item wrong length {} instead of {}.",
                mask.len(),
                self.len()
            )));
        }
        let rows: Vec<usize> = (0..mask.len()).filter(|&i| mask[i]).collect();
        Ok(self.take(&rows))
    }

    pub fn head(&self, n: i64) -> Series {
        self.take(&head_rows(self.len(), n))
    }

    pub fn tail(&self, n: i64) -> Series {
        self.take(&tail_rows(self.len(), n))
    }

    /// Value by index label.
    pub fn get_label(&self, label: &Value) -> Result<Value, Exception> {
        self.index
            .position(label)
            .map(|i| self.values[i].clone())
            .ok_or_else(|| Exception::key_error(label))
    }

    pub fn aggregate(&self, agg: Agg) -> Result<Value, Exception> {
        agg.apply(&self.values)
    }

    /// Column name used when this series becomes a table column.
    pub fn column_label(&self) -> String {
        self.name.clone().unwrap_or_else(|| "0".to_string())
    }

    pub fn to_frame(&self, name: Option<&str>) -> Table {
        let name = name.map(str::to_string).unwrap_or_else(|| self.column_label());
        Table {
            columns: vec![super::Column {
                name,
                values: self.values.clone(),
            }],
            index: self.index.clone(),
        }
    }

    pub fn reset_index(&self, name: Option<&str>) -> Table {
        self.to_frame(name).reset_index(false)
    }

    pub fn sort_values(&self, ascending: bool) -> Series {
        let mut rows: Vec<usize> = (0..self.len()).collect();
        rows.sort_by(|&a, &b| {
            let (x, y) = (&self.values[a], &self.values[b]);
            if !ascending && !x.is_missing() && !y.is_missing() {
                y.sort_cmp(x)
            } else {
                x.sort_cmp(y)
            }
        });
        self.take(&rows)
    }

    pub fn sort_index(&self, ascending: bool) -> Series {
        let mut rows: Vec<usize> = (0..self.len()).collect();
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

    pub fn unique(&self) -> Vec<Value> {
        let mut seen: Vec<Value> = Vec::new();
        for v in &self.values {
            if !seen.iter().any(|s| s.py_eq(v) || (s.is_missing() && v.is_missing())) {
                seen.push(v.clone());
            }
        }
        seen
    }

    /// Counts of distinct non-missing values, most frequent first.
    pub fn value_counts(&self) -> Series {
        let mut counts: Vec<(Value, i64)> = Vec::new();
        for v in self.values.iter().filter(|v| !v.is_missing()) {
            match counts.iter_mut().find(|(k, _)| k.py_eq(v)) {
                Some((_, n)) => *n += 1,
                None => counts.push((v.clone(), 1)),
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        let names = self.name.iter().cloned().collect();
        Series {
            name: Some("count".to_string()),
            values: counts.iter().map(|(_, n)| Value::Int(*n)).collect(),
            index: Index::named(names, counts.into_iter().map(|(k, _)| k).collect()),
        }
    }

    pub fn cumsum(&self) -> Result<Series, Exception> {
        let mut acc = Value::Int(0);
        let mut out = Vec::with_capacity(self.len());
        for v in &self.values {
            if v.is_missing() {
                out.push(v.clone());
                continue;
            }
            acc = Agg::Sum.apply(&[acc, v.clone()])?;
            out.push(acc.clone());
        }
        Ok(self.with_values(out))
    }

    /// Label of the largest (or smallest) value.
    pub fn idx_extreme(&self, largest: bool) -> Result<Value, Exception> {
        let mut best: Option<usize> = None;
        for (i, v) in self.values.iter().enumerate() {
            if v.is_missing() {
                continue;
            }
            best = match best {
                None => Some(i),
                Some(b) => {
                    let ord = v.py_cmp(&self.values[b])?;
                    let better = if largest {
                        ord == std::cmp::Ordering::Greater
                    } else {
                        ord == std::cmp::Ordering::Less
                    };
                    Some(if better { i } else { b })
                }
            };
        }
        best.map(|i| self.index.labels[i].clone()).ok_or_else(|| {
            Exception::value_error("attempt to get argmax of an empty sequence")
        })
    }

    pub fn isin(&self, candidates: &[Value]) -> Series {
        self.with_values(
            self.values
                .iter()
                .map(|v| Value::Bool(candidates.iter().any(|c| c.py_eq(v))))
                .collect(),
        )
    }

    pub fn fillna(&self, value: &Value) -> Series {
        self.with_values(
            self.values
                .iter()
                .map(|v| if v.is_missing() { value.clone() } else { v.clone() })
                .collect(),
        )
    }

    pub fn dropna(&self) -> Series {
        let rows: Vec<usize> = (0..self.len())
            .filter(|&i| !self.values[i].is_missing())
            .collect();
        self.take(&rows)
    }

    /// Boolean mask from a series of bools.
    pub fn as_mask(&self) -> Result<Vec<bool>, Exception> {
        self.values
            .iter()
            .map(|v| match v {
                Value::Bool(b) => Ok(*b),
                Value::None => Ok(false),
                other => Err(Exception::new(
                    ExceptionKind::KeyError,
                    format!("boolean mask expected, found '{}'", other.type_name()),
                )),
            })
            .collect()
    }

    pub fn render(&self) -> String {
        let index_cells: Vec<String> = self.index.labels.iter().map(label_text).collect();
        let rows: Vec<Vec<String>> = self.values.iter().map(|v| vec![format_cell(v)]).collect();
        let mut out = String::new();
        if !self.index.names.is_empty() {
            out.push_str(&self.index.names.join(" "));
            out.push('\n');
        }
        let grid = render_grid("", &[String::new()], &index_cells, &rows);
        // The header line of a series grid is blank.
        for line in grid.lines().skip(1) {
            out.push_str(line);
            out.push('\n');
        }
        match &self.name {
            Some(name) => out.push_str(&format!("Name: {}, dtype: {}", name, dtype(&self.values))),
            None => out.push_str(&format!("dtype: {}", dtype(&self.values))),
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regions() -> Series {
        Series::new(
            Some("region".to_string()),
            vec!["east".into(), "west".into(), "east".into(), Value::None],
        )
    }

    #[test]
    fn test_value_counts_orders_by_frequency() {
        let counts = regions().value_counts();
        assert_eq!(counts.index.labels, vec![Value::from("east"), Value::from("west")]);
        assert_eq!(counts.values, vec![Value::Int(2), Value::Int(1)]);
        assert_eq!(counts.index.names, vec!["region".to_string()]);
    }

    #[test]
    fn test_unique_keeps_first_seen_order() {
        assert_eq!(
            regions().unique(),
            vec![Value::from("east"), Value::from("west"), Value::None]
        );
    }

    #[test]
    fn test_to_frame_names_column() {
        let frame = regions().to_frame(Some("r"));
        assert_eq!(frame.column_names(), vec!["r"]);
        let unnamed = Series::new(None, vec![Value::Int(1)]).reset_index(None);
        assert_eq!(unnamed.column_names(), vec!["index", "0"]);
    }

    #[test]
    fn test_cumsum_and_idxmax() {
        let s = Series::new(None, vec![Value::Int(3), Value::None, Value::Int(4)]);
        assert_eq!(
            s.cumsum().unwrap().values,
            vec![Value::Int(3), Value::None, Value::Int(7)]
        );
        assert_eq!(s.idx_extreme(true).unwrap(), Value::Int(2));
        assert_eq!(s.idx_extreme(false).unwrap(), Value::Int(0));
    }

    #[test]
    fn test_render_includes_name_and_dtype() {
        let s = Series::new(Some("sales".to_string()), vec![Value::Int(10), Value::Int(5)]);
        assert_eq!(s.render(), "0  10\n1   5\nName: sales, dtype: int64");
    }
}
