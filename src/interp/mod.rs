//! Tree-walking evaluator for compiled programs.
//!
//! The evaluator only ever sees trees that passed the allowlist; anything
//! else it meets is reported as an exception, never a panic. It polls the
//! [`Interrupt`] before every statement and on every loop iteration, and
//! checks estimated allocations against the run's memory ceiling.

mod access;
mod args;
mod builtin_fns;
mod exception;
pub mod format;
mod frames;
mod methods;
pub mod ops;

pub use access::Key;
pub use args::Args;
pub use exception::{Exception, ExceptionKind, Flow, Signal};

use crate::ast::{BoolOp, CmpOp, Comprehension, Constant, Expr, ExprKind, Keyword, Stmt, StmtKind};
use crate::compile::Program;
use crate::interrupt::Interrupt;
use crate::namespace::Namespace;
use crate::parser::MAX_DEPTH;
use crate::protocol::ExecutionResult;
use crate::value::{BoundMethod, RangeIter, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Ceilings enforced inside the evaluator.
#[derive(Debug, Clone, Copy)]
pub struct RunLimits {
    /// Largest single estimated allocation
    pub memory_bytes: usize,
    /// Largest captured stdout
    pub output_bytes: usize,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            memory_bytes: 100 * 1024 * 1024,
            output_bytes: 8 * 1024 * 1024,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed(ExecutionResult),
    Raised { exception: Exception, stdout: String },
    Interrupted,
}

/// Lazy iteration over a value.
pub(crate) enum ValueIter {
    Range(RangeIter),
    Items(std::vec::IntoIter<Value>),
}

impl Iterator for ValueIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            ValueIter::Range(r) => r.next().map(Value::Int),
            ValueIter::Items(items) => items.next(),
        }
    }
}

/// Iterate a value the way a `for` clause does.
pub(crate) fn iterate(value: Value) -> Result<ValueIter, Exception> {
    let items = match value {
        Value::Range(r) => return Ok(ValueIter::Range(r.iter())),
        Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
        Value::Bytes(b) => b.into_iter().map(|x| Value::Int(x as i64)).collect(),
        Value::List(items) | Value::Tuple(items) | Value::Set(items) => items,
        Value::Dict(pairs) => pairs.into_iter().map(|(k, _)| k).collect(),
        Value::Table(t) => t.columns.into_iter().map(|c| Value::Str(c.name)).collect(),
        Value::Series(s) => s.values,
        Value::GroupBy(g) => g
            .groups()
            .into_iter()
            .map(|(key, rows)| Value::Tuple(vec![key, Value::Table(g.table.take(&rows))]))
            .collect(),
        other => {
            return Err(Exception::type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            )))
        }
    };
    Ok(ValueIter::Items(Vec::into_iter(items)))
}

#[derive(Debug, Clone)]
enum Accessor {
    Index(Key),
    Attr(String),
}

/// An assignable location: a name followed by item and attribute steps.
#[derive(Debug, Clone)]
struct Place {
    root: String,
    path: Vec<Accessor>,
}

fn child(value: &Value, accessor: &Accessor) -> Result<Value, Exception> {
    match accessor {
        Accessor::Index(key) => access::get_item(value, key),
        Accessor::Attr(name) => access::get_attribute(value, name),
    }
}

fn set_child(target: &mut Value, accessor: &Accessor, value: Value) -> Result<(), Exception> {
    match accessor {
        Accessor::Index(key) => access::set_item(target, key, value),
        Accessor::Attr(name) => access::set_attribute(target, name, value),
    }
}

/// Store `value` at `path` below `target`, writing every intermediate
/// container back into its parent.
fn assign_path(target: &mut Value, path: &[Accessor], value: Value) -> Result<(), Exception> {
    match path.split_first() {
        None => {
            *target = value;
            Ok(())
        }
        Some((accessor, [])) => set_child(target, accessor, value),
        Some((accessor, rest)) => {
            let mut inner = child(target, accessor)?;
            assign_path(&mut inner, rest, value)?;
            set_child(target, accessor, inner)
        }
    }
}

pub struct Interpreter {
    ns: Namespace,
    stdout: String,
    interrupt: Interrupt,
    limits: RunLimits,
    line: usize,
    /// Nesting of `eval` calls
    depth: usize,
}

impl Interpreter {
    pub fn new(context: BTreeMap<String, Value>, interrupt: Interrupt, limits: RunLimits) -> Self {
        Self {
            ns: Namespace::new(context),
            stdout: String::new(),
            interrupt,
            limits,
            line: 0,
            depth: 0,
        }
    }

    /// Execute `program` to completion, an exception or an interruption.
    pub fn run(mut self, program: &Program) -> Outcome {
        let result = self.exec_block(&program.body);
        debug!(line = self.line, "evaluation finished");
        let returned = match result {
            Ok(()) => None,
            Err(Signal::Return(value)) => Some(value),
            Err(Signal::Raise(exception)) => {
                return Outcome::Raised {
                    exception,
                    stdout: self.stdout,
                }
            }
            Err(Signal::Interrupted) => return Outcome::Interrupted,
        };
        Outcome::Completed(ExecutionResult {
            bindings: self.ns.into_bindings(),
            stdout: self.stdout,
            returned,
        })
    }

    fn tick(&self) -> Flow<()> {
        if self.interrupt.is_triggered() {
            Err(Signal::Interrupted)
        } else {
            Ok(())
        }
    }

    fn memory_limit(&self) -> usize {
        self.limits.memory_bytes
    }

    /// Append to the captured output.
    fn write_stdout(&mut self, text: &str) -> Result<(), Exception> {
        let total = self.stdout.len() + text.len();
        if total > self.limits.output_bytes {
            return Err(Exception::memory(total));
        }
        self.stdout.push_str(text);
        Ok(())
    }

    fn exec_block(&mut self, body: &[Stmt]) -> Flow<()> {
        body.iter().try_for_each(|stmt| self.exec_stmt(stmt))
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Flow<()> {
        let line = stmt.span.line;
        self.line = line;
        self.tick()?;
        self.exec_stmt_kind(stmt).map_err(|signal| match signal {
            Signal::Raise(e) => Signal::Raise(e.at_line(line)),
            other => other,
        })
    }

    fn exec_stmt_kind(&mut self, stmt: &Stmt) -> Flow<()> {
        match &stmt.kind {
            StmtKind::Expr(e) => {
                self.eval(e)?;
                Ok(())
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value)?;
                for target in targets {
                    self.bind_target(target, value.clone())?;
                }
                Ok(())
            }
            StmtKind::AugAssign { target, op, value } => {
                let place = self.resolve_place(target)?.ok_or_else(|| {
                    Exception::new(
                        ExceptionKind::SyntaxError,
                        "illegal expression for augmented assignment",
                    )
                })?;
                let current = self.load_place(&place)?;
                let rhs = self.eval(value)?;
                let updated = match (current, *op) {
                    // `xs += iterable` extends in place.
                    (Value::List(mut items), crate::ast::BinOp::Add)
                        if !matches!(rhs, Value::List(_)) =>
                    {
                        for item in iterate(rhs)? {
                            self.tick()?;
                            items.push(item);
                            ops::check_allocation(items.len() * ops::VALUE_SIZE, self.memory_limit())?;
                        }
                        Value::List(items)
                    }
                    (current, op) => ops::binary(op, &current, &rhs, self.memory_limit())?,
                };
                self.store_place(&place, updated)
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(e) => self.eval(e)?,
                    None => Value::None,
                };
                Err(Signal::Return(value))
            }
            StmtKind::With { items, body, .. } => {
                for item in items {
                    let manager = self.eval(&item.context_expr)?;
                    if !matches!(manager, Value::Figure(_)) {
                        return Err(Exception::type_error(format!(
                            "'{}' object does not support the context manager protocol",
                            manager.type_name()
                        ))
                        .into());
                    }
                    if let Some(vars) = &item.optional_vars {
                        self.bind_target(vars, manager)?;
                    }
                }
                self.exec_block(body)
            }
        }
    }

    fn bind_target(&mut self, target: &Expr, value: Value) -> Flow<()> {
        match &target.kind {
            ExprKind::Name(name) => {
                self.ns.store(name, value);
                Ok(())
            }
            ExprKind::Tuple(targets) | ExprKind::List(targets) => {
                let expected = targets.len();
                let mut items = Vec::with_capacity(expected);
                for item in iterate(value)? {
                    if items.len() == expected {
                        return Err(Exception::value_error(format!(
                            "too many values to unpack (expected {})",
                            expected
                        ))
                        .into());
                    }
                    items.push(item);
                }
                if items.len() < expected {
                    return Err(Exception::value_error(format!(
                        "not enough values to unpack (expected {}, got {})",
                        expected,
                        items.len()
                    ))
                    .into());
                }
                for (target, item) in targets.iter().zip(items) {
                    self.bind_target(target, item)?;
                }
                Ok(())
            }
            ExprKind::Attribute { .. } | ExprKind::Subscript { .. } => {
                match self.resolve_place(target)? {
                    Some(place) => self.store_place(&place, value),
                    None => {
                        // Assignment into a temporary, e.g. `f()[0] = 1`.
                        let (base, accessor) = match &target.kind {
                            ExprKind::Attribute { value: base, attr } => {
                                (base, Accessor::Attr(attr.clone()))
                            }
                            ExprKind::Subscript { value: base, index } => {
                                let base_value = base;
                                let key = self.eval_key(index)?;
                                (base_value, Accessor::Index(key))
                            }
                            _ => return Ok(()),
                        };
                        let mut temporary = self.eval(base)?;
                        set_child(&mut temporary, &accessor, value)?;
                        Ok(())
                    }
                }
            }
            _ => Err(Exception::new(
                ExceptionKind::SyntaxError,
                format!("cannot assign to {}", target.node_kind()),
            )
            .into()),
        }
    }

    fn resolve_place(&mut self, expr: &Expr) -> Flow<Option<Place>> {
        match &expr.kind {
            ExprKind::Name(name) => Ok(Some(Place {
                root: name.clone(),
                path: Vec::new(),
            })),
            ExprKind::Subscript { value, index } => {
                let Some(mut place) = self.resolve_place(value)? else {
                    return Ok(None);
                };
                let key = self.eval_key(index)?;
                place.path.push(Accessor::Index(key));
                Ok(Some(place))
            }
            ExprKind::Attribute { value, attr } => {
                let Some(mut place) = self.resolve_place(value)? else {
                    return Ok(None);
                };
                place.path.push(Accessor::Attr(attr.clone()));
                Ok(Some(place))
            }
            _ => Ok(None),
        }
    }

    fn load_place(&self, place: &Place) -> Flow<Value> {
        let mut value = self.ns.lookup(&place.root)?;
        for accessor in &place.path {
            value = child(&value, accessor)?;
        }
        Ok(value)
    }

    /// Stores always land in locals; a context value is copied there first.
    fn store_place(&mut self, place: &Place, value: Value) -> Flow<()> {
        if place.path.is_empty() {
            self.ns.store(&place.root, value);
            return Ok(());
        }
        let mut root = self.ns.lookup(&place.root)?;
        assign_path(&mut root, &place.path, value)?;
        self.ns.store(&place.root, root);
        Ok(())
    }

    fn eval_key(&mut self, index: &Expr) -> Flow<Key> {
        if let ExprKind::Slice { lower, upper, step } = &index.kind {
            let mut part = |e: &Option<Box<Expr>>| -> Flow<Option<Value>> {
                match e {
                    Some(e) => self.eval(e).map(Some),
                    None => Ok(None),
                }
            };
            let (lower, upper, step) = (part(lower)?, part(upper)?, part(step)?);
            return Ok(Key::Slice(lower, upper, step));
        }
        Ok(Key::Value(self.eval(index)?))
    }

    pub(crate) fn eval(&mut self, expr: &Expr) -> Flow<Value> {
        if self.depth >= MAX_DEPTH {
            return Err(Exception::new(
                ExceptionKind::RecursionError,
                "maximum recursion depth exceeded",
            )
            .into());
        }
        self.depth += 1;
        let result = self.eval_kind(expr);
        self.depth -= 1;
        result
    }

    fn eval_kind(&mut self, expr: &Expr) -> Flow<Value> {
        match &expr.kind {
            ExprKind::Name(name) => Ok(self.ns.lookup(name)?),
            ExprKind::Constant(c) => Ok(match c {
                Constant::None => Value::None,
                Constant::Bool(b) => Value::Bool(*b),
                Constant::Int(i) => Value::Int(*i),
                Constant::Float(f) => Value::Float(*f),
                Constant::Str(s) => Value::Str(s.clone()),
                Constant::Bytes(b) => Value::Bytes(b.clone()),
                Constant::Ellipsis => {
                    return Err(Exception::new(
                        ExceptionKind::NotImplementedError,
                        "Ellipsis is not supported",
                    )
                    .into())
                }
            }),
            ExprKind::Attribute { value, attr } => {
                let value = self.eval(value)?;
                Ok(access::get_attribute(&value, attr)?)
            }
            ExprKind::Subscript { value, index } => {
                let value = self.eval(value)?;
                let key = self.eval_key(index)?;
                Ok(access::get_item(&value, &key)?)
            }
            ExprKind::BinOp { left, op, right } => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                Ok(ops::binary(*op, &l, &r, self.memory_limit())?)
            }
            ExprKind::UnaryOp { op, operand } => {
                let v = self.eval(operand)?;
                Ok(ops::unary(*op, &v)?)
            }
            ExprKind::BoolOp { op, values } => {
                let mut last = Value::None;
                for e in values {
                    last = self.eval(e)?;
                    let truth = last.truthy()?;
                    match op {
                        BoolOp::And if !truth => return Ok(last),
                        BoolOp::Or if truth => return Ok(last),
                        _ => {}
                    }
                }
                Ok(last)
            }
            ExprKind::Compare {
                left,
                ops,
                comparators,
            } => self.eval_compare(left, ops, comparators),
            ExprKind::Call {
                func,
                args,
                keywords,
            } => self.eval_call(func, args, keywords),
            ExprKind::List(items) => Ok(Value::List(self.eval_all(items)?)),
            ExprKind::Tuple(items) => Ok(Value::Tuple(self.eval_all(items)?)),
            ExprKind::Set(items) => {
                let mut out: Vec<Value> = Vec::with_capacity(items.len());
                for v in self.eval_all(items)? {
                    set_insert(&mut out, v)?;
                }
                Ok(Value::Set(out))
            }
            ExprKind::Dict { keys, values } => {
                let mut pairs: Vec<(Value, Value)> = Vec::with_capacity(keys.len());
                for (key, value) in keys.iter().zip(values) {
                    match key {
                        Some(key) => {
                            let k = self.eval(key)?;
                            let v = self.eval(value)?;
                            dict_insert(&mut pairs, k, v)?;
                        }
                        None => match self.eval(value)? {
                            Value::Dict(extra) => {
                                for (k, v) in extra {
                                    dict_insert(&mut pairs, k, v)?;
                                }
                            }
                            other => {
                                return Err(Exception::type_error(format!(
                                    "'{}' object is not a mapping",
                                    other.type_name()
                                ))
                                .into())
                            }
                        },
                    }
                }
                Ok(Value::Dict(pairs))
            }
            ExprKind::ListComp { elt, generators } | ExprKind::GeneratorExp { elt, generators } => {
                let mut out = Vec::new();
                let limit = self.memory_limit();
                self.comprehension(generators, &mut |interp: &mut Interpreter| {
                    out.push(interp.eval(elt)?);
                    ops::check_allocation(out.len() * ops::VALUE_SIZE, limit)?;
                    Ok(())
                })?;
                Ok(Value::List(out))
            }
            ExprKind::SetComp { elt, generators } => {
                let mut out = Vec::new();
                let limit = self.memory_limit();
                self.comprehension(generators, &mut |interp: &mut Interpreter| {
                    let v = interp.eval(elt)?;
                    set_insert(&mut out, v)?;
                    ops::check_allocation(out.len() * ops::VALUE_SIZE, limit)?;
                    Ok(())
                })?;
                Ok(Value::Set(out))
            }
            ExprKind::DictComp {
                key,
                value,
                generators,
            } => {
                let mut out = Vec::new();
                let limit = self.memory_limit();
                self.comprehension(generators, &mut |interp: &mut Interpreter| {
                    let k = interp.eval(key)?;
                    let v = interp.eval(value)?;
                    dict_insert(&mut out, k, v)?;
                    ops::check_allocation(out.len() * 2 * ops::VALUE_SIZE, limit)?;
                    Ok(())
                })?;
                Ok(Value::Dict(out))
            }
            ExprKind::IfExp { test, body, orelse } => {
                if self.eval(test)?.truthy()? {
                    self.eval(body)
                } else {
                    self.eval(orelse)
                }
            }
            ExprKind::Slice { .. } => {
                Err(Exception::type_error("slices are only valid inside a subscript").into())
            }
        }
    }

    fn eval_all(&mut self, items: &[Expr]) -> Flow<Vec<Value>> {
        items.iter().map(|e| self.eval(e)).collect()
    }

    fn eval_compare(&mut self, left: &Expr, ops: &[CmpOp], comparators: &[Expr]) -> Flow<Value> {
        let mut l = self.eval(left)?;
        let mut result = Value::Bool(true);
        for (i, (op, right)) in ops.iter().zip(comparators).enumerate() {
            let r = self.eval(right)?;
            result = ops::compare(*op, &l, &r)?;
            if i + 1 < ops.len() && !result.truthy()? {
                return Ok(result);
            }
            l = r;
        }
        Ok(result)
    }

    /// Run `body` once per binding produced by `generators`, inside a fresh
    /// scope that is dropped again whatever the result.
    fn comprehension(
        &mut self,
        generators: &[Comprehension],
        body: &mut dyn FnMut(&mut Interpreter) -> Flow<()>,
    ) -> Flow<()> {
        self.ns.push_scope();
        let result = self.comprehension_loop(generators, body);
        self.ns.pop_scope();
        result
    }

    fn comprehension_loop(
        &mut self,
        generators: &[Comprehension],
        body: &mut dyn FnMut(&mut Interpreter) -> Flow<()>,
    ) -> Flow<()> {
        let Some((first, rest)) = generators.split_first() else {
            return body(self);
        };
        let iterable = self.eval(&first.iter)?;
        'items: for item in iterate(iterable)? {
            self.tick()?;
            self.bind_target(&first.target, item)?;
            for condition in &first.ifs {
                if !self.eval(condition)?.truthy()? {
                    continue 'items;
                }
            }
            self.comprehension_loop(rest, body)?;
        }
        Ok(())
    }

    fn eval_args(&mut self, args: &[Expr], keywords: &[Keyword]) -> Flow<Args> {
        let mut out = Args::new(self.eval_all(args)?);
        for kw in keywords {
            let value = self.eval(&kw.value)?;
            match &kw.arg {
                Some(name) => push_keyword(&mut out, name.clone(), value)?,
                None => match value {
                    Value::Dict(pairs) => {
                        for (k, v) in pairs {
                            let Value::Str(k) = k else {
                                return Err(Exception::type_error("keywords must be strings").into());
                            };
                            push_keyword(&mut out, k, v)?;
                        }
                    }
                    other => {
                        return Err(Exception::type_error(format!(
                            "argument after ** must be a mapping, not {}",
                            other.type_name()
                        ))
                        .into())
                    }
                },
            }
        }
        Ok(out)
    }

    fn eval_call(&mut self, func: &Expr, args: &[Expr], keywords: &[Keyword]) -> Flow<Value> {
        if let ExprKind::Attribute { value, attr } = &func.kind {
            let place = self.resolve_place(value)?;
            let mut receiver = match &place {
                Some(place) => self.load_place(place)?,
                None => self.eval(value)?,
            };
            if !access::has_method(&receiver, attr) {
                let callee = access::get_attribute(&receiver, attr)?;
                let args = self.eval_args(args, keywords)?;
                return self.call_value(callee, args);
            }
            let args = self.eval_args(args, keywords)?;
            let mutates = access::method_mutates(&receiver, attr, &args);
            let result = self.call_method(&mut receiver, attr, args)?;
            if mutates {
                if let Some(place) = place {
                    self.store_place(&place, receiver)?;
                }
            }
            return Ok(result);
        }
        let callee = self.eval(func)?;
        let args = self.eval_args(args, keywords)?;
        self.call_value(callee, args)
    }

    /// Call a builtin or a bound method value.
    pub(crate) fn call_value(&mut self, callee: Value, args: Args) -> Flow<Value> {
        match callee {
            Value::Builtin(builtin) => self.call_builtin(builtin, args),
            Value::Method(method) => {
                let BoundMethod { mut receiver, name } = *method;
                self.call_method(&mut receiver, &name, args)
            }
            other => Err(Exception::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))
            .into()),
        }
    }

    fn call_method(&mut self, receiver: &mut Value, name: &str, args: Args) -> Flow<Value> {
        let limit = self.memory_limit();
        match receiver {
            Value::Str(s) => Ok(methods::str_method(s, name, &args, limit)?),
            Value::List(items) => self.list_method(items, name, args),
            Value::Tuple(items) => Ok(methods::tuple_method(items, name, &args)?),
            Value::Dict(pairs) => Ok(methods::dict_method(pairs, name, &args)?),
            Value::Set(items) => Ok(methods::set_method(items, name, &args, limit)?),
            Value::Float(f) => Ok(methods::float_method(*f, name, &args)?),
            Value::Int(_) | Value::Bool(_) => Ok(methods::int_method(receiver, name, &args)?),
            Value::Bytes(b) => Ok(methods::bytes_method(b, name, &args)?),
            Value::Range(_) => Err(Exception::no_attribute(receiver, name).into()),
            Value::Table(table) => Ok(frames::table_method(table, name, &args, limit)?),
            Value::Series(series) => Ok(frames::series_method(series, name, &args)?),
            Value::GroupBy(groups) => Ok(frames::groupby_method(groups, name, &args)?),
            Value::Figure(figure) => Ok(frames::figure_method(figure, name, &args)?),
            Value::Library(lib) => Ok(frames::library_call(*lib, name, &args, limit)?),
            other => Err(Exception::no_attribute(other, name).into()),
        }
    }

    /// Sort `items` in place, optionally by `key(item)`.
    fn sort_values(&mut self, items: &mut Vec<Value>, key: Option<Value>, reverse: bool) -> Flow<()> {
        let keys = match key {
            None | Some(Value::None) => items.clone(),
            Some(key) => {
                let mut keys = Vec::with_capacity(items.len());
                for item in items.iter() {
                    self.tick()?;
                    keys.push(self.call_value(key.clone(), Args::new(vec![item.clone()]))?);
                }
                keys
            }
        };
        let mut order: Vec<usize> = (0..items.len()).collect();
        let mut failure: Option<Exception> = None;
        order.sort_by(|&a, &b| {
            let ord = match keys[a].py_cmp(&keys[b]) {
                Ok(ord) => ord,
                Err(e) => {
                    failure.get_or_insert(e);
                    std::cmp::Ordering::Equal
                }
            };
            if reverse {
                ord.reverse()
            } else {
                ord
            }
        });
        if let Some(e) = failure {
            return Err(e.into());
        }
        let sorted: Vec<Value> = order.into_iter().map(|i| items[i].clone()).collect();
        *items = sorted;
        Ok(())
    }
}

pub(crate) fn set_insert(items: &mut Vec<Value>, value: Value) -> Result<(), Exception> {
    value.check_hashable()?;
    if !items.iter().any(|v| v.py_eq(&value)) {
        items.push(value);
    }
    Ok(())
}

pub(crate) fn dict_insert(
    pairs: &mut Vec<(Value, Value)>,
    key: Value,
    value: Value,
) -> Result<(), Exception> {
    key.check_hashable()?;
    match pairs.iter_mut().find(|(k, _)| k.py_eq(&key)) {
        Some(slot) => slot.1 = value,
        None => pairs.push((key, value)),
    }
    Ok(())
}

fn push_keyword(args: &mut Args, name: String, value: Value) -> Result<(), Exception> {
    if args.keyword(&name).is_some() {
        return Err(Exception::type_error(format!(
            "got multiple values for keyword argument '{}'",
            name
        )));
    }
    args.keywords.push((name, value));
    Ok(())
}
