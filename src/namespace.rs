//! Name resolution for one run.
//!
//! Lookups go comprehension scopes, then locals, then the caller's context,
//! then the builtin table. Stores only ever reach locals (or the innermost
//! comprehension scope), so the context and the builtins stay as the caller
//! left them.

use crate::builtins;
use crate::interp::{Exception, ExceptionKind};
use crate::value::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct Namespace {
    context: BTreeMap<String, Value>,
    locals: BTreeMap<String, Value>,
    scopes: Vec<BTreeMap<String, Value>>,
}

impl Namespace {
    pub fn new(context: BTreeMap<String, Value>) -> Self {
        Self {
            context,
            locals: BTreeMap::new(),
            scopes: Vec::new(),
        }
    }

    pub fn lookup(&self, name: &str) -> Result<Value, Exception> {
        for scope in self.scopes.iter().rev() {
            if let Some(v) = scope.get(name) {
                return Ok(v.clone());
            }
        }
        if let Some(v) = self.locals.get(name).or_else(|| self.context.get(name)) {
            return Ok(v.clone());
        }
        builtins::lookup(name).ok_or_else(|| {
            Exception::new(
                ExceptionKind::NameError,
                format!("name '{}' is not defined", name),
            )
        })
    }

    pub fn store(&mut self, name: &str, value: Value) {
        match self.scopes.last_mut() {
            Some(scope) => {
                scope.insert(name.to_string(), value);
            }
            None => {
                self.locals.insert(name.to_string(), value);
            }
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(BTreeMap::new());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub fn locals(&self) -> &BTreeMap<String, Value> {
        &self.locals
    }

    pub fn context(&self) -> &BTreeMap<String, Value> {
        &self.context
    }

    /// Every name the run assigned at top level.
    pub fn into_bindings(self) -> BTreeMap<String, Value> {
        self.locals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> BTreeMap<String, Value> {
        let mut ctx = BTreeMap::new();
        ctx.insert("limit".to_string(), Value::Int(3));
        ctx
    }

    #[test]
    fn test_lookup_order() {
        let mut ns = Namespace::new(context());
        assert_eq!(ns.lookup("limit").unwrap(), Value::Int(3));
        assert!(matches!(ns.lookup("len").unwrap(), Value::Builtin(_)));

        ns.store("len", Value::Int(1));
        assert_eq!(ns.lookup("len").unwrap(), Value::Int(1));

        ns.push_scope();
        ns.store("len", Value::Int(2));
        assert_eq!(ns.lookup("len").unwrap(), Value::Int(2));
        ns.pop_scope();
        assert_eq!(ns.lookup("len").unwrap(), Value::Int(1));
    }

    #[test]
    fn test_shadowing_never_touches_context() {
        let mut ns = Namespace::new(context());
        ns.store("limit", Value::Int(10));
        assert_eq!(ns.lookup("limit").unwrap(), Value::Int(10));
        assert_eq!(ns.context()["limit"], Value::Int(3));
    }

    #[test]
    fn test_unknown_name() {
        let ns = Namespace::new(BTreeMap::new());
        let err = ns.lookup("exec").unwrap_err();
        assert_eq!(err.kind, ExceptionKind::NameError);
        assert_eq!(err.message, "name 'exec' is not defined");
    }
}
