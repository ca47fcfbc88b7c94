//! Evaluator tree for accepted submissions.
//!
//! [`NodeKind`] names every construct of the language so a rejection can say
//! which one it was. The statement and expression trees only have room for
//! the allowed constructs; the analyzer builds them from the parser's output.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Source location of a node (1-based line).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: usize,
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(line: usize, start: usize, end: usize) -> Self {
        Self { line, start, end }
    }
}

/// Kind tag carried by every node of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Module,
    // statements
    Expr,
    Assign,
    AugAssign,
    AnnAssign,
    Return,
    With,
    AsyncWith,
    WithItem,
    Pass,
    Break,
    Continue,
    Delete,
    Global,
    Nonlocal,
    Import,
    ImportFrom,
    FunctionDef,
    AsyncFunctionDef,
    ClassDef,
    If,
    For,
    AsyncFor,
    While,
    Try,
    TryStar,
    Match,
    TypeAlias,
    Raise,
    Assert,
    // expressions
    Name,
    Attribute,
    Subscript,
    Slice,
    Constant,
    BinOp,
    UnaryOp,
    BoolOp,
    Compare,
    Call,
    Keyword,
    List,
    Tuple,
    Dict,
    Set,
    ListComp,
    SetComp,
    DictComp,
    GeneratorExp,
    Comprehension,
    IfExp,
    Lambda,
    NamedExpr,
    Starred,
    Yield,
    YieldFrom,
    Await,
    JoinedStr,
    FormattedValue,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Module => "Module",
            NodeKind::Expr => "Expr",
            NodeKind::Assign => "Assign",
            NodeKind::AugAssign => "AugAssign",
            NodeKind::AnnAssign => "AnnAssign",
            NodeKind::Return => "Return",
            NodeKind::With => "With",
            NodeKind::AsyncWith => "AsyncWith",
            NodeKind::WithItem => "withitem",
            NodeKind::Pass => "Pass",
            NodeKind::Break => "Break",
            NodeKind::Continue => "Continue",
            NodeKind::Delete => "Delete",
            NodeKind::Global => "Global",
            NodeKind::Nonlocal => "Nonlocal",
            NodeKind::Import => "Import",
            NodeKind::ImportFrom => "ImportFrom",
            NodeKind::FunctionDef => "FunctionDef",
            NodeKind::AsyncFunctionDef => "AsyncFunctionDef",
            NodeKind::ClassDef => "ClassDef",
            NodeKind::If => "If",
            NodeKind::For => "For",
            NodeKind::AsyncFor => "AsyncFor",
            NodeKind::While => "While",
            NodeKind::Try => "Try",
            NodeKind::TryStar => "TryStar",
            NodeKind::Match => "Match",
            NodeKind::TypeAlias => "TypeAlias",
            NodeKind::Raise => "Raise",
            NodeKind::Assert => "Assert",
            NodeKind::Name => "Name",
            NodeKind::Attribute => "Attribute",
            NodeKind::Subscript => "Subscript",
            NodeKind::Slice => "Slice",
            NodeKind::Constant => "Constant",
            NodeKind::BinOp => "BinOp",
            NodeKind::UnaryOp => "UnaryOp",
            NodeKind::BoolOp => "BoolOp",
            NodeKind::Compare => "Compare",
            NodeKind::Call => "Call",
            NodeKind::Keyword => "keyword",
            NodeKind::List => "List",
            NodeKind::Tuple => "Tuple",
            NodeKind::Dict => "Dict",
            NodeKind::Set => "Set",
            NodeKind::ListComp => "ListComp",
            NodeKind::SetComp => "SetComp",
            NodeKind::DictComp => "DictComp",
            NodeKind::GeneratorExp => "GeneratorExp",
            NodeKind::Comprehension => "comprehension",
            NodeKind::IfExp => "IfExp",
            NodeKind::Lambda => "Lambda",
            NodeKind::NamedExpr => "NamedExpr",
            NodeKind::Starred => "Starred",
            NodeKind::Yield => "Yield",
            NodeKind::YieldFrom => "YieldFrom",
            NodeKind::Await => "Await",
            NodeKind::JoinedStr => "JoinedStr",
            NodeKind::FormattedValue => "FormattedValue",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithItem {
    pub context_expr: Expr,
    pub optional_vars: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    Assign {
        targets: Vec<Expr>,
        value: Expr,
    },
    AugAssign {
        target: Expr,
        op: BinOp,
        value: Expr,
    },
    Return(Option<Expr>),
    With {
        items: Vec<WithItem>,
        body: Vec<Stmt>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mult,
    MatMult,
    Div,
    FloorDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    BitOr,
    BitXor,
    BitAnd,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mult => "*",
            BinOp::MatMult => "@",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::LShift => "<<",
            BinOp::RShift => ">>",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::BitAnd => "&",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
    In,
    NotIn,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Ellipsis,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    /// `None` for `**mapping` arguments
    pub arg: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    pub target: Expr,
    pub iter: Expr,
    pub ifs: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Name(String),
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    Constant(Constant),
    BinOp {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    BoolOp {
        op: BoolOp,
        values: Vec<Expr>,
    },
    Compare {
        left: Box<Expr>,
        ops: Vec<CmpOp>,
        comparators: Vec<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<Keyword>,
    },
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    /// `None` keys are `**mapping` entries
    Dict {
        keys: Vec<Option<Expr>>,
        values: Vec<Expr>,
    },
    Set(Vec<Expr>),
    ListComp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    SetComp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    DictComp {
        key: Box<Expr>,
        value: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    GeneratorExp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn node_kind(&self) -> NodeKind {
        match &self.kind {
            ExprKind::Name(_) => NodeKind::Name,
            ExprKind::Attribute { .. } => NodeKind::Attribute,
            ExprKind::Subscript { .. } => NodeKind::Subscript,
            ExprKind::Slice { .. } => NodeKind::Slice,
            ExprKind::Constant(_) => NodeKind::Constant,
            ExprKind::BinOp { .. } => NodeKind::BinOp,
            ExprKind::UnaryOp { .. } => NodeKind::UnaryOp,
            ExprKind::BoolOp { .. } => NodeKind::BoolOp,
            ExprKind::Compare { .. } => NodeKind::Compare,
            ExprKind::Call { .. } => NodeKind::Call,
            ExprKind::List(_) => NodeKind::List,
            ExprKind::Tuple(_) => NodeKind::Tuple,
            ExprKind::Dict { .. } => NodeKind::Dict,
            ExprKind::Set(_) => NodeKind::Set,
            ExprKind::ListComp { .. } => NodeKind::ListComp,
            ExprKind::SetComp { .. } => NodeKind::SetComp,
            ExprKind::DictComp { .. } => NodeKind::DictComp,
            ExprKind::GeneratorExp { .. } => NodeKind::GeneratorExp,
            ExprKind::IfExp { .. } => NodeKind::IfExp,
        }
    }
}
