//! Compile-time checks on a validated tree.
//!
//! These are the errors Python reports before running anything: invalid
//! assignment targets and malformed argument lists. A [`Program`] is the
//! only thing the evaluator runs.

use crate::analyzer::ValidatedTree;
use crate::ast::{Comprehension, Expr, ExprKind, Keyword, Stmt, StmtKind};
use crate::errors::{Result, SandboxError};
use crate::parser::MAX_DEPTH;

/// An executable submission.
#[derive(Debug, Clone)]
pub struct Program {
    pub body: Vec<Stmt>,
    pub source: String,
}

pub fn compile(tree: ValidatedTree) -> Result<Program> {
    let source = tree.source().to_string();
    let module = tree.into_module();
    for stmt in &module.body {
        check_stmt(stmt)?;
    }
    Ok(Program {
        body: module.body,
        source,
    })
}

fn syntax_error(message: impl Into<String>, line: usize) -> SandboxError {
    SandboxError::SyntaxError {
        message: message.into(),
        line,
    }
}

fn describe(expr: &Expr) -> &'static str {
    match &expr.kind {
        ExprKind::Call { .. } => "function call",
        ExprKind::Constant(_) => "literal",
        ExprKind::BinOp { .. } | ExprKind::UnaryOp { .. } => "expression",
        ExprKind::BoolOp { .. } => "expression",
        ExprKind::Compare { .. } => "comparison",
        ExprKind::Dict { .. } => "dict literal",
        ExprKind::Set(_) => "set display",
        ExprKind::ListComp { .. } => "list comprehension",
        ExprKind::SetComp { .. } => "set comprehension",
        ExprKind::DictComp { .. } => "dict comprehension",
        ExprKind::GeneratorExp { .. } => "generator expression",
        ExprKind::IfExp { .. } => "conditional expression",
        ExprKind::Tuple(_) => "tuple",
        ExprKind::List(_) => "list",
        _ => "expression",
    }
}

fn check_target(target: &Expr, depth: usize) -> Result<()> {
    match &target.kind {
        ExprKind::Name(_) => Ok(()),
        ExprKind::Attribute { value, .. } => check_expr(value, depth + 1),
        ExprKind::Subscript { value, index } => {
            check_expr(value, depth + 1)?;
            check_expr(index, depth + 1)
        }
        ExprKind::Tuple(items) | ExprKind::List(items) => items
            .iter()
            .try_for_each(|item| check_target(item, depth + 1)),
        _ => Err(syntax_error(
            format!("cannot assign to {}", describe(target)),
            target.span.line,
        )),
    }
}

fn check_stmt(stmt: &Stmt) -> Result<()> {
    match &stmt.kind {
        StmtKind::Expr(e) => check_expr(e, 0),
        StmtKind::Assign { targets, value } => {
            targets.iter().try_for_each(|t| check_target(t, 0))?;
            check_expr(value, 0)
        }
        StmtKind::AugAssign { target, value, .. } => {
            match &target.kind {
                ExprKind::Name(_) | ExprKind::Attribute { .. } | ExprKind::Subscript { .. } => {
                    check_target(target, 0)?
                }
                _ => {
                    return Err(syntax_error(
                        format!(
                            "'{}' is an illegal expression for augmented assignment",
                            describe(target)
                        ),
                        target.span.line,
                    ))
                }
            }
            check_expr(value, 0)
        }
        StmtKind::Return(value) => value.iter().try_for_each(|v| check_expr(v, 0)),
        StmtKind::With { items, body } => {
            for item in items {
                check_expr(&item.context_expr, 0)?;
                if let Some(vars) = &item.optional_vars {
                    check_target(vars, 0)?;
                }
            }
            body.iter().try_for_each(check_stmt)
        }
    }
}

fn check_arguments(args: &[Expr], keywords: &[Keyword], line: usize) -> Result<()> {
    let mut seen: Vec<&str> = Vec::new();
    for kw in keywords {
        if let Some(name) = &kw.arg {
            if seen.contains(&name.as_str()) {
                return Err(syntax_error(format!("keyword argument repeated: {}", name), line));
            }
            seen.push(name);
        }
    }
    let first_keyword = keywords.iter().map(|kw| (kw.value.span.start, kw.arg.is_none())).min();
    if let Some((start, unpacking)) = first_keyword {
        if args.iter().any(|a| a.span.start > start) {
            let message = if unpacking {
                "positional argument follows keyword argument unpacking"
            } else {
                "positional argument follows keyword argument"
            };
            return Err(syntax_error(message, line));
        }
    }
    Ok(())
}

fn check_generators(generators: &[Comprehension], depth: usize) -> Result<()> {
    for gen in generators {
        check_target(&gen.target, depth)?;
        check_expr(&gen.iter, depth)?;
        gen.ifs.iter().try_for_each(|e| check_expr(e, depth))?;
    }
    Ok(())
}

fn check_expr(expr: &Expr, depth: usize) -> Result<()> {
    if depth >= MAX_DEPTH {
        return Err(syntax_error("expression too deeply nested", expr.span.line));
    }
    let depth = depth + 1;
    let each = |items: &[Expr]| items.iter().try_for_each(|e| check_expr(e, depth));
    match &expr.kind {
        ExprKind::Name(_) | ExprKind::Constant(_) => Ok(()),
        ExprKind::Attribute { value, .. } => check_expr(value, depth),
        ExprKind::Subscript { value, index } => {
            check_expr(value, depth)?;
            check_expr(index, depth)
        }
        ExprKind::Slice { lower, upper, step } => {
            for part in [lower, upper, step].into_iter().flatten() {
                check_expr(part, depth)?;
            }
            Ok(())
        }
        ExprKind::BinOp { left, right, .. } => {
            check_expr(left, depth)?;
            check_expr(right, depth)
        }
        ExprKind::UnaryOp { operand, .. } => check_expr(operand, depth),
        ExprKind::BoolOp { values, .. } => each(values),
        ExprKind::Compare {
            left, comparators, ..
        } => {
            check_expr(left, depth)?;
            each(comparators)
        }
        ExprKind::Call {
            func,
            args,
            keywords,
        } => {
            check_expr(func, depth)?;
            check_arguments(args, keywords, expr.span.line)?;
            each(args)?;
            keywords.iter().try_for_each(|kw| check_expr(&kw.value, depth))
        }
        ExprKind::List(items) | ExprKind::Tuple(items) | ExprKind::Set(items) => each(items),
        ExprKind::Dict { keys, values } => {
            keys.iter().flatten().try_for_each(|k| check_expr(k, depth))?;
            each(values)
        }
        ExprKind::ListComp { elt, generators }
        | ExprKind::SetComp { elt, generators }
        | ExprKind::GeneratorExp { elt, generators } => {
            check_generators(generators, depth)?;
            check_expr(elt, depth)
        }
        ExprKind::DictComp {
            key,
            value,
            generators,
        } => {
            check_generators(generators, depth)?;
            check_expr(key, depth)?;
            check_expr(value, depth)
        }
        ExprKind::IfExp { test, body, orelse } => {
            check_expr(test, depth)?;
            check_expr(body, depth)?;
            check_expr(orelse, depth)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;

    fn compile_source(source: &str) -> Result<Program> {
        compile(analyze(source)?)
    }

    fn message(source: &str) -> String {
        match compile_source(source) {
            Err(SandboxError::SyntaxError { message, .. }) => message,
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_program() {
        let program = compile_source("a, b = 1, 2\ndf['x'] = a\nxs[0] += b").unwrap();
        assert_eq!(program.body.len(), 3);
        assert!(program.source.starts_with("a, b"));
    }

    #[test]
    fn test_invalid_targets() {
        // The parser may refuse some of these first; either way it is a
        // syntax error on the offending line.
        for source in ["f() = 1", "x = 1\n1 = x", "y = 2\na, b += 1"] {
            match compile_source(source) {
                Err(SandboxError::SyntaxError { line, .. }) => {
                    assert_eq!(line, source.lines().count(), "{}", source)
                }
                other => panic!("{}: expected syntax error, got {:?}", source, other),
            }
        }
    }

    #[test]
    fn test_target_messages() {
        let call = analyze("f()").unwrap().into_module();
        let StmtKind::Expr(call) = &call.body[0].kind else {
            panic!("expected an expression statement");
        };
        match check_target(call, 0) {
            Err(SandboxError::SyntaxError { message, .. }) => {
                assert_eq!(message, "cannot assign to function call")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_argument_checks() {
        assert!(message("f(a=1, a=2)").contains("keyword argument repeated"));
        assert_eq!(
            message("f(a=1, 2)"),
            "positional argument follows keyword argument"
        );
        assert!(compile_source("f(1, a=2, **opts)").is_ok());
    }

    #[test]
    fn test_depth_bound() {
        let mut expr = Expr::new(ExprKind::Name("x".to_string()), Default::default());
        for _ in 0..MAX_DEPTH + 10 {
            expr = Expr::new(
                ExprKind::UnaryOp {
                    op: crate::ast::UnaryOp::Neg,
                    operand: Box::new(expr),
                },
                Default::default(),
            );
        }
        match check_expr(&expr, 0) {
            Err(SandboxError::SyntaxError { message, .. }) => {
                assert_eq!(message, "expression too deeply nested")
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
