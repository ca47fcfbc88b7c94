use super::Exception;
use crate::value::Value;

/// Evaluated call arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    pub positional: Vec<Value>,
    pub keywords: Vec<(String, Value)>,
}

impl Args {
    pub fn new(positional: Vec<Value>) -> Self {
        Self {
            positional,
            keywords: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keywords.is_empty()
    }

    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.keywords.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Argument passed at position `i` or by keyword `name`.
    pub fn get(&self, i: usize, name: &str) -> Option<&Value> {
        self.positional.get(i).or_else(|| self.keyword(name))
    }

    pub fn require(&self, func: &str, i: usize, name: &str) -> Result<&Value, Exception> {
        self.get(i, name).ok_or_else(|| {
            Exception::type_error(format!(
                "{}() missing required argument: '{}'",
                func, name
            ))
        })
    }

    /// Reject keywords outside `allowed` and more than `max` positionals.
    pub fn check(&self, func: &str, max: usize, allowed: &[&str]) -> Result<(), Exception> {
        if self.positional.len() > max {
            return Err(Exception::type_error(format!(
                "{}() takes at most {} positional arguments ({} given)",
                func,
                max,
                self.positional.len()
            )));
        }
        if let Some((name, _)) = self.keywords.iter().find(|(k, _)| !allowed.contains(&k.as_str())) {
            return Err(Exception::type_error(format!(
                "{}() got an unexpected keyword argument '{}'",
                func, name
            )));
        }
        Ok(())
    }

    pub fn flag(&self, i: usize, name: &str, default: bool) -> Result<bool, Exception> {
        match self.get(i, name) {
            None => Ok(default),
            Some(v) => v.truthy(),
        }
    }

    pub fn int(&self, i: usize, name: &str, default: i64) -> Result<i64, Exception> {
        match self.get(i, name) {
            None | Some(Value::None) => Ok(default),
            Some(v) => v.as_index().ok_or_else(|| {
                Exception::type_error(format!(
                    "'{}' object cannot be interpreted as an integer",
                    v.type_name()
                ))
            }),
        }
    }

    pub fn string(&self, i: usize, name: &str) -> Result<Option<String>, Exception> {
        match self.get(i, name) {
            None | Some(Value::None) => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(other) => Err(Exception::type_error(format!(
                "argument '{}' must be str, not {}",
                name,
                other.type_name()
            ))),
        }
    }

    /// A column name or list of column names.
    pub fn names(&self, i: usize, name: &str) -> Result<Option<Vec<String>>, Exception> {
        match self.get(i, name) {
            None | Some(Value::None) => Ok(None),
            Some(Value::List(items)) | Some(Value::Tuple(items)) => items
                .iter()
                .map(crate::frame::column_name)
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(v) => Ok(Some(vec![crate::frame::column_name(v)?])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_or_keyword() {
        let mut args = Args::new(vec![Value::Int(1)]);
        args.keywords.push(("reverse".to_string(), Value::Bool(true)));
        assert_eq!(args.get(0, "iterable"), Some(&Value::Int(1)));
        assert!(args.flag(1, "reverse", false).unwrap());
        assert!(args.check("sorted", 1, &["key", "reverse"]).is_ok());
        let err = args.check("sorted", 1, &["key"]).unwrap_err();
        assert_eq!(
            err.message,
            "sorted() got an unexpected keyword argument 'reverse'"
        );
    }

    #[test]
    fn test_names_accepts_one_or_many() {
        let args = Args::new(vec![Value::List(vec!["a".into(), "b".into()])]);
        assert_eq!(
            args.names(0, "by").unwrap(),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        let args = Args::new(vec!["a".into()]);
        assert_eq!(args.names(0, "by").unwrap(), Some(vec!["a".to_string()]));
        assert_eq!(Args::default().names(0, "by").unwrap(), None);
    }
}
