//! Static allowlist analysis.
//!
//! Walks the parsed module in pre-order and fails at the first node whose
//! kind is not on the allowlist. Accepted nodes are copied into the
//! evaluator's own tree on the way. The analyzer does not look at names or
//! values: `exec('...')` is an ordinary call here and fails later, at name
//! resolution.

use crate::ast::{
    BinOp, BoolOp, CmpOp, Comprehension, Constant, Expr, ExprKind, Keyword, Module, NodeKind,
    Span, Stmt, StmtKind, UnaryOp, WithItem,
};
use crate::errors::{Result, SandboxError};
use crate::parser::{parse_module, LineIndex, MAX_DEPTH};
use rustpython_parser::ast::{self as py, Ranged};
use rustpython_parser::text_size::TextRange;
use tracing::debug;

/// Node kinds accepted code may contain.
pub const ALLOWED_NODES: &[NodeKind] = &[
    NodeKind::Module,
    NodeKind::Expr,
    NodeKind::Assign,
    NodeKind::AugAssign,
    NodeKind::Return,
    NodeKind::With,
    NodeKind::WithItem,
    NodeKind::Name,
    NodeKind::Attribute,
    NodeKind::Subscript,
    NodeKind::Slice,
    NodeKind::Constant,
    NodeKind::BinOp,
    NodeKind::UnaryOp,
    NodeKind::BoolOp,
    NodeKind::Compare,
    NodeKind::Call,
    NodeKind::Keyword,
    NodeKind::List,
    NodeKind::Tuple,
    NodeKind::Dict,
    NodeKind::Set,
    NodeKind::ListComp,
    NodeKind::SetComp,
    NodeKind::DictComp,
    NodeKind::GeneratorExp,
    NodeKind::Comprehension,
    NodeKind::IfExp,
];

pub fn is_allowed(kind: NodeKind) -> bool {
    ALLOWED_NODES.contains(&kind)
}

/// A syntax tree in which every node kind is allowed.
///
/// Only [`analyze`] constructs one.
#[derive(Debug, Clone)]
pub struct ValidatedTree {
    module: Module,
    source: String,
}

impl ValidatedTree {
    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn into_module(self) -> Module {
        self.module
    }
}

/// Parse `source` and check it against the allowlist.
pub fn analyze(source: &str) -> Result<ValidatedTree> {
    let parsed = parse_module(source).map_err(|e| SandboxError::SyntaxError {
        message: e.message,
        line: e.line,
    })?;
    allow(NodeKind::Module, 1)?;
    let mut walker = Walker {
        lines: &parsed.lines,
        depth: 0,
    };
    let mut body = Vec::with_capacity(parsed.body.len());
    for stmt in &parsed.body {
        body.push(walker.stmt(stmt)?);
    }
    debug!("accepted {} top-level statements", body.len());
    Ok(ValidatedTree {
        module: Module { body },
        source: source.to_string(),
    })
}

fn disallowed(kind: NodeKind, line: usize) -> SandboxError {
    SandboxError::DisallowedSyntax { kind, line }
}

fn allow(kind: NodeKind, line: usize) -> Result<()> {
    if is_allowed(kind) {
        Ok(())
    } else {
        Err(disallowed(kind, line))
    }
}

fn syntax_error(message: &str, line: usize) -> SandboxError {
    SandboxError::SyntaxError {
        message: message.to_string(),
        line,
    }
}

struct Walker<'a> {
    lines: &'a LineIndex,
    depth: usize,
}

impl Walker<'_> {
    fn span(&self, range: TextRange) -> Span {
        Span::new(
            self.lines.line_at(range.start()),
            usize::from(range.start()),
            usize::from(range.end()),
        )
    }

    fn stmt(&mut self, stmt: &py::Stmt) -> Result<Stmt> {
        let span = self.span(stmt.range());
        let kind = stmt_node(stmt);
        allow(kind, span.line)?;
        let lowered = match stmt {
            py::Stmt::Expr(node) => StmtKind::Expr(self.expr(&node.value)?),
            py::Stmt::Assign(node) => StmtKind::Assign {
                targets: self.exprs(&node.targets)?,
                value: self.expr(&node.value)?,
            },
            py::Stmt::AugAssign(node) => StmtKind::AugAssign {
                target: self.expr(&node.target)?,
                op: operator(&node.op),
                value: self.expr(&node.value)?,
            },
            py::Stmt::Return(node) => StmtKind::Return(match &node.value {
                Some(value) => Some(self.expr(value)?),
                None => None,
            }),
            py::Stmt::With(node) => {
                let mut items = Vec::with_capacity(node.items.len());
                for item in &node.items {
                    allow(NodeKind::WithItem, span.line)?;
                    let context_expr = self.expr(&item.context_expr)?;
                    let optional_vars = match &item.optional_vars {
                        Some(vars) => Some(self.expr(vars)?),
                        None => None,
                    };
                    items.push(WithItem {
                        context_expr,
                        optional_vars,
                    });
                }
                let mut body = Vec::with_capacity(node.body.len());
                for inner in &node.body {
                    body.push(self.stmt(inner)?);
                }
                StmtKind::With { items, body }
            }
            _ => return Err(disallowed(kind, span.line)),
        };
        Ok(Stmt {
            kind: lowered,
            span,
        })
    }

    fn expr(&mut self, expr: &py::Expr) -> Result<Expr> {
        let span = self.span(expr.range());
        if self.depth >= MAX_DEPTH {
            return Err(syntax_error("expression too deeply nested", span.line));
        }
        self.depth += 1;
        let lowered = self.expr_kind(expr, span.line);
        self.depth -= 1;
        Ok(Expr::new(lowered?, span))
    }

    fn boxed(&mut self, expr: &py::Expr) -> Result<Box<Expr>> {
        self.expr(expr).map(Box::new)
    }

    fn optional(&mut self, expr: Option<&py::Expr>) -> Result<Option<Box<Expr>>> {
        match expr {
            Some(expr) => self.boxed(expr).map(Some),
            None => Ok(None),
        }
    }

    fn exprs(&mut self, exprs: &[py::Expr]) -> Result<Vec<Expr>> {
        let mut out = Vec::with_capacity(exprs.len());
        for expr in exprs {
            out.push(self.expr(expr)?);
        }
        Ok(out)
    }

    fn expr_kind(&mut self, expr: &py::Expr, line: usize) -> Result<ExprKind> {
        let kind = expr_node(expr);
        allow(kind, line)?;
        Ok(match expr {
            py::Expr::Name(node) => ExprKind::Name(node.id.as_str().to_owned()),
            py::Expr::Constant(node) => ExprKind::Constant(constant(&node.value, line)?),
            py::Expr::Attribute(node) => ExprKind::Attribute {
                value: self.boxed(&node.value)?,
                attr: node.attr.as_str().to_owned(),
            },
            py::Expr::Subscript(node) => ExprKind::Subscript {
                value: self.boxed(&node.value)?,
                index: self.boxed(&node.slice)?,
            },
            py::Expr::Slice(node) => ExprKind::Slice {
                lower: self.optional(node.lower.as_deref())?,
                upper: self.optional(node.upper.as_deref())?,
                step: self.optional(node.step.as_deref())?,
            },
            py::Expr::BinOp(node) => ExprKind::BinOp {
                left: self.boxed(&node.left)?,
                op: operator(&node.op),
                right: self.boxed(&node.right)?,
            },
            py::Expr::UnaryOp(node) => ExprKind::UnaryOp {
                op: unary_op(&node.op),
                operand: self.boxed(&node.operand)?,
            },
            py::Expr::BoolOp(node) => ExprKind::BoolOp {
                op: match node.op {
                    py::BoolOp::And => BoolOp::And,
                    py::BoolOp::Or => BoolOp::Or,
                },
                values: self.exprs(&node.values)?,
            },
            py::Expr::Compare(node) => ExprKind::Compare {
                left: self.boxed(&node.left)?,
                ops: node.ops.iter().map(cmp_op).collect(),
                comparators: self.exprs(&node.comparators)?,
            },
            py::Expr::Call(node) => self.call(node)?,
            py::Expr::List(node) => ExprKind::List(self.exprs(&node.elts)?),
            py::Expr::Tuple(node) => ExprKind::Tuple(self.exprs(&node.elts)?),
            py::Expr::Set(node) => ExprKind::Set(self.exprs(&node.elts)?),
            py::Expr::Dict(node) => {
                let mut keys = Vec::with_capacity(node.keys.len());
                for key in &node.keys {
                    keys.push(match key {
                        Some(key) => Some(self.expr(key)?),
                        None => None,
                    });
                }
                ExprKind::Dict {
                    keys,
                    values: self.exprs(&node.values)?,
                }
            }
            py::Expr::ListComp(node) => ExprKind::ListComp {
                elt: self.boxed(&node.elt)?,
                generators: self.generators(&node.generators)?,
            },
            py::Expr::SetComp(node) => ExprKind::SetComp {
                elt: self.boxed(&node.elt)?,
                generators: self.generators(&node.generators)?,
            },
            py::Expr::GeneratorExp(node) => ExprKind::GeneratorExp {
                elt: self.boxed(&node.elt)?,
                generators: self.generators(&node.generators)?,
            },
            py::Expr::DictComp(node) => ExprKind::DictComp {
                key: self.boxed(&node.key)?,
                value: self.boxed(&node.value)?,
                generators: self.generators(&node.generators)?,
            },
            py::Expr::IfExp(node) => ExprKind::IfExp {
                test: self.boxed(&node.test)?,
                body: self.boxed(&node.body)?,
                orelse: self.boxed(&node.orelse)?,
            },
            _ => return Err(disallowed(kind, line)),
        })
    }

    fn call(&mut self, node: &py::ExprCall) -> Result<ExprKind> {
        let func = self.boxed(&node.func)?;
        let args = self.exprs(&node.args)?;
        let mut keywords = Vec::with_capacity(node.keywords.len());
        for keyword in &node.keywords {
            allow(
                NodeKind::Keyword,
                self.lines.line_at(keyword.value.range().start()),
            )?;
            keywords.push(Keyword {
                arg: keyword.arg.as_ref().map(|arg| arg.as_str().to_owned()),
                value: self.expr(&keyword.value)?,
            });
        }
        Ok(ExprKind::Call {
            func,
            args,
            keywords,
        })
    }

    fn generators(&mut self, generators: &[py::Comprehension]) -> Result<Vec<Comprehension>> {
        let mut out = Vec::with_capacity(generators.len());
        for gen in generators {
            let line = self.lines.line_at(gen.target.range().start());
            if gen.is_async {
                return Err(disallowed(NodeKind::Comprehension, line));
            }
            allow(NodeKind::Comprehension, line)?;
            out.push(Comprehension {
                target: self.expr(&gen.target)?,
                iter: self.expr(&gen.iter)?,
                ifs: self.exprs(&gen.ifs)?,
            });
        }
        Ok(out)
    }
}

fn constant(value: &py::Constant, line: usize) -> Result<Constant> {
    Ok(match value {
        py::Constant::None => Constant::None,
        py::Constant::Bool(b) => Constant::Bool(*b),
        py::Constant::Str(s) => Constant::Str(s.clone()),
        py::Constant::Bytes(b) => Constant::Bytes(b.clone()),
        py::Constant::Int(i) => Constant::Int(
            i.to_string()
                .parse()
                .map_err(|_| syntax_error("integer literal too large", line))?,
        ),
        py::Constant::Float(f) => Constant::Float(*f),
        py::Constant::Ellipsis => Constant::Ellipsis,
        py::Constant::Complex { .. } => {
            return Err(syntax_error("complex literals are not supported", line))
        }
        py::Constant::Tuple(_) => return Err(syntax_error("constant tuples are not supported", line)),
    })
}

fn operator(op: &py::Operator) -> BinOp {
    match op {
        py::Operator::Add => BinOp::Add,
        py::Operator::Sub => BinOp::Sub,
        py::Operator::Mult => BinOp::Mult,
        py::Operator::MatMult => BinOp::MatMult,
        py::Operator::Div => BinOp::Div,
        py::Operator::Mod => BinOp::Mod,
        py::Operator::Pow => BinOp::Pow,
        py::Operator::LShift => BinOp::LShift,
        py::Operator::RShift => BinOp::RShift,
        py::Operator::BitOr => BinOp::BitOr,
        py::Operator::BitXor => BinOp::BitXor,
        py::Operator::BitAnd => BinOp::BitAnd,
        py::Operator::FloorDiv => BinOp::FloorDiv,
    }
}

fn unary_op(op: &py::UnaryOp) -> UnaryOp {
    match op {
        py::UnaryOp::Invert => UnaryOp::Invert,
        py::UnaryOp::Not => UnaryOp::Not,
        py::UnaryOp::UAdd => UnaryOp::Pos,
        py::UnaryOp::USub => UnaryOp::Neg,
    }
}

fn cmp_op(op: &py::CmpOp) -> CmpOp {
    match op {
        py::CmpOp::Eq => CmpOp::Eq,
        py::CmpOp::NotEq => CmpOp::NotEq,
        py::CmpOp::Lt => CmpOp::Lt,
        py::CmpOp::LtE => CmpOp::LtE,
        py::CmpOp::Gt => CmpOp::Gt,
        py::CmpOp::GtE => CmpOp::GtE,
        py::CmpOp::Is => CmpOp::Is,
        py::CmpOp::IsNot => CmpOp::IsNot,
        py::CmpOp::In => CmpOp::In,
        py::CmpOp::NotIn => CmpOp::NotIn,
    }
}

fn stmt_node(stmt: &py::Stmt) -> NodeKind {
    match stmt {
        py::Stmt::FunctionDef(_) => NodeKind::FunctionDef,
        py::Stmt::AsyncFunctionDef(_) => NodeKind::AsyncFunctionDef,
        py::Stmt::ClassDef(_) => NodeKind::ClassDef,
        py::Stmt::Return(_) => NodeKind::Return,
        py::Stmt::Delete(_) => NodeKind::Delete,
        py::Stmt::Assign(_) => NodeKind::Assign,
        py::Stmt::TypeAlias(_) => NodeKind::TypeAlias,
        py::Stmt::AugAssign(_) => NodeKind::AugAssign,
        py::Stmt::AnnAssign(_) => NodeKind::AnnAssign,
        py::Stmt::For(_) => NodeKind::For,
        py::Stmt::AsyncFor(_) => NodeKind::AsyncFor,
        py::Stmt::While(_) => NodeKind::While,
        py::Stmt::If(_) => NodeKind::If,
        py::Stmt::With(_) => NodeKind::With,
        py::Stmt::AsyncWith(_) => NodeKind::AsyncWith,
        py::Stmt::Match(_) => NodeKind::Match,
        py::Stmt::Raise(_) => NodeKind::Raise,
        py::Stmt::Try(_) => NodeKind::Try,
        py::Stmt::TryStar(_) => NodeKind::TryStar,
        py::Stmt::Assert(_) => NodeKind::Assert,
        py::Stmt::Import(_) => NodeKind::Import,
        py::Stmt::ImportFrom(_) => NodeKind::ImportFrom,
        py::Stmt::Global(_) => NodeKind::Global,
        py::Stmt::Nonlocal(_) => NodeKind::Nonlocal,
        py::Stmt::Expr(_) => NodeKind::Expr,
        py::Stmt::Pass(_) => NodeKind::Pass,
        py::Stmt::Break(_) => NodeKind::Break,
        py::Stmt::Continue(_) => NodeKind::Continue,
    }
}

fn expr_node(expr: &py::Expr) -> NodeKind {
    match expr {
        py::Expr::BoolOp(_) => NodeKind::BoolOp,
        py::Expr::NamedExpr(_) => NodeKind::NamedExpr,
        py::Expr::BinOp(_) => NodeKind::BinOp,
        py::Expr::UnaryOp(_) => NodeKind::UnaryOp,
        py::Expr::Lambda(_) => NodeKind::Lambda,
        py::Expr::IfExp(_) => NodeKind::IfExp,
        py::Expr::Dict(_) => NodeKind::Dict,
        py::Expr::Set(_) => NodeKind::Set,
        py::Expr::ListComp(_) => NodeKind::ListComp,
        py::Expr::SetComp(_) => NodeKind::SetComp,
        py::Expr::DictComp(_) => NodeKind::DictComp,
        py::Expr::GeneratorExp(_) => NodeKind::GeneratorExp,
        py::Expr::Await(_) => NodeKind::Await,
        py::Expr::Yield(_) => NodeKind::Yield,
        py::Expr::YieldFrom(_) => NodeKind::YieldFrom,
        py::Expr::Compare(_) => NodeKind::Compare,
        py::Expr::Call(_) => NodeKind::Call,
        py::Expr::FormattedValue(_) => NodeKind::FormattedValue,
        py::Expr::JoinedStr(_) => NodeKind::JoinedStr,
        py::Expr::Constant(_) => NodeKind::Constant,
        py::Expr::Attribute(_) => NodeKind::Attribute,
        py::Expr::Subscript(_) => NodeKind::Subscript,
        py::Expr::Starred(_) => NodeKind::Starred,
        py::Expr::Name(_) => NodeKind::Name,
        py::Expr::List(_) => NodeKind::List,
        py::Expr::Tuple(_) => NodeKind::Tuple,
        py::Expr::Slice(_) => NodeKind::Slice,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(source: &str) -> (NodeKind, usize) {
        match analyze(source) {
            Err(SandboxError::DisallowedSyntax { kind, line }) => (kind, line),
            other => panic!("expected rejection for {:?}, got {:?}", source, other),
        }
    }

    fn syntax_error_of(source: &str) -> (String, usize) {
        match analyze(source) {
            Err(SandboxError::SyntaxError { message, line }) => (message, line),
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_import() {
        assert_eq!(rejected("import os"), (NodeKind::Import, 1));
        assert_eq!(rejected("x = 1\nfrom os import path"), (NodeKind::ImportFrom, 2));
    }

    #[test]
    fn test_rejects_definitions_and_loops() {
        assert_eq!(rejected("def f():\n    return 1").0, NodeKind::FunctionDef);
        assert_eq!(rejected("class A:\n    pass").0, NodeKind::ClassDef);
        assert_eq!(rejected("for i in x:\n    y = i").0, NodeKind::For);
        assert_eq!(rejected("while True:\n    pass").0, NodeKind::While);
        assert_eq!(rejected("f = lambda: 1").0, NodeKind::Lambda);
        assert_eq!(rejected("try:\n    x = 1\nexcept:\n    pass").0, NodeKind::Try);
    }

    #[test]
    fn test_rejects_nested_constructs() {
        assert_eq!(
            rejected("with plt.figure() as fig:\n    import os"),
            (NodeKind::Import, 2)
        );
        assert_eq!(rejected("y = [(z := 1) for i in x]").0, NodeKind::NamedExpr);
        assert_eq!(rejected("s = f'{x}'").0, NodeKind::JoinedStr);
        assert_eq!(rejected("y = print(*x)").0, NodeKind::Starred);
        assert_eq!(rejected("if x:\n    y = 1").0, NodeKind::If);
    }

    #[test]
    fn test_rejects_async_comprehension() {
        assert_eq!(
            rejected("y = [i async for i in x]").0,
            NodeKind::Comprehension
        );
    }

    #[test]
    fn test_accepts_data_code() {
        let source = "result_df = df.groupby('region')['sales'].sum().reset_index()\n\
                      top = sorted([r for r in rows if r > 2], reverse=True)[:3]\n\
                      label = 'big' if total > 10 else 'small'";
        assert!(analyze(source).is_ok());
    }

    #[test]
    fn test_tree_shape() {
        let tree = analyze("xs[1:2] += f(a, k=-1, **opts)\nwith plt.figure() as fig:\n    n = 0x10").unwrap();
        let body = &tree.module().body;
        assert_eq!(body.len(), 2);
        match &body[0].kind {
            StmtKind::AugAssign { target, op, value } => {
                assert_eq!(*op, BinOp::Add);
                assert!(matches!(&target.kind, ExprKind::Subscript { index, .. }
                    if matches!(index.kind, ExprKind::Slice { .. })));
                let ExprKind::Call { keywords, .. } = &value.kind else {
                    panic!("expected a call, got {:?}", value.kind);
                };
                assert_eq!(keywords[0].arg.as_deref(), Some("k"));
                assert_eq!(keywords[1].arg, None);
            }
            other => panic!("unexpected {:?}", other),
        }
        match &body[1].kind {
            StmtKind::With { items, body } => {
                assert_eq!(items.len(), 1);
                assert_eq!(body[0].span.line, 3);
                assert!(matches!(
                    &body[0].kind,
                    StmtKind::Assign { value, .. } if value.kind == ExprKind::Constant(Constant::Int(16))
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_adjacent_strings_concatenate() {
        let tree = analyze("s = 'a' 'b'").unwrap();
        assert!(matches!(
            &tree.module().body[0].kind,
            StmtKind::Assign { value, .. } if value.kind == ExprKind::Constant(Constant::Str("ab".to_string()))
        ));
    }

    #[test]
    fn test_exec_is_only_a_call() {
        assert!(analyze("exec('print(1)')").is_ok());
    }

    #[test]
    fn test_syntax_error_reports_line() {
        assert_eq!(syntax_error_of("x = 1\ny = (").1, 2);
        assert_eq!(syntax_error_of("x = 1\ny = = 2").1, 2);
    }

    #[test]
    fn test_unsupported_literals_are_syntax_errors() {
        assert_eq!(
            syntax_error_of("x = 99999999999999999999").0,
            "integer literal too large"
        );
        assert_eq!(syntax_error_of("z = 1j").0, "complex literals are not supported");
    }

    #[test]
    fn test_deep_nesting_is_a_syntax_error() {
        let brackets = format!("x = {}1{}", "[".repeat(10_000), "]".repeat(10_000));
        assert_eq!(
            syntax_error_of(&brackets),
            ("too many nested parentheses".to_string(), 1)
        );
        let parens = format!("x = {}1{}", "(".repeat(50_000), ")".repeat(50_000));
        assert_eq!(syntax_error_of(&parens).0, "too many nested parentheses");
        let chain = format!("x = 1\ny = 1{}", " + 1".repeat(10_000));
        assert_eq!(
            syntax_error_of(&chain),
            ("expression too deeply nested".to_string(), 2)
        );
    }

    #[test]
    fn test_moderate_nesting_is_accepted() {
        let nested = format!("x = {}1{}", "[".repeat(100), "]".repeat(100));
        assert!(analyze(&nested).is_ok());
        let chain = format!("y = 1{}", " + 1".repeat(100));
        assert!(analyze(&chain).is_ok());
    }

    #[test]
    fn test_analysis_is_idempotent() {
        let source = "x = [i * 2 for i in range(3)]\nprint(x)";
        let first = analyze(source).unwrap();
        let second = analyze(first.source()).unwrap();
        assert_eq!(first.module(), second.module());
        assert!(matches!(analyze("import os"), Err(SandboxError::DisallowedSyntax { .. })));
        assert!(matches!(analyze("import os"), Err(SandboxError::DisallowedSyntax { .. })));
    }
}
