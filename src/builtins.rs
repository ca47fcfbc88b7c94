//! The frozen builtin table.
//!
//! This is the complete set of free functions accepted code can name. There
//! is nothing for reflection, code evaluation or I/O: `print` only appends to
//! the run's captured output.

use crate::value::Value;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Builtin {
    Len,
    Range,
    Min,
    Max,
    Sum,
    Sorted,
    Abs,
    Round,
    Enumerate,
    Zip,
    Any,
    All,
    Map,
    Filter,
    List,
    Dict,
    Set,
    Tuple,
    Reversed,
    Str,
    Int,
    Float,
    Bool,
    Print,
}

/// Every builtin, in lookup order.
pub static BUILTINS: [Builtin; 24] = [
    Builtin::Len,
    Builtin::Range,
    Builtin::Min,
    Builtin::Max,
    Builtin::Sum,
    Builtin::Sorted,
    Builtin::Abs,
    Builtin::Round,
    Builtin::Enumerate,
    Builtin::Zip,
    Builtin::Any,
    Builtin::All,
    Builtin::Map,
    Builtin::Filter,
    Builtin::List,
    Builtin::Dict,
    Builtin::Set,
    Builtin::Tuple,
    Builtin::Reversed,
    Builtin::Str,
    Builtin::Int,
    Builtin::Float,
    Builtin::Bool,
    Builtin::Print,
];

impl Builtin {
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Len => "len",
            Builtin::Range => "range",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Sum => "sum",
            Builtin::Sorted => "sorted",
            Builtin::Abs => "abs",
            Builtin::Round => "round",
            Builtin::Enumerate => "enumerate",
            Builtin::Zip => "zip",
            Builtin::Any => "any",
            Builtin::All => "all",
            Builtin::Map => "map",
            Builtin::Filter => "filter",
            Builtin::List => "list",
            Builtin::Dict => "dict",
            Builtin::Set => "set",
            Builtin::Tuple => "tuple",
            Builtin::Reversed => "reversed",
            Builtin::Str => "str",
            Builtin::Int => "int",
            Builtin::Float => "float",
            Builtin::Bool => "bool",
            Builtin::Print => "print",
        }
    }

    pub fn from_name(name: &str) -> Option<Builtin> {
        BUILTINS.iter().copied().find(|b| b.name() == name)
    }
}

/// Resolve a name against the builtin table.
pub fn lookup(name: &str) -> Option<Value> {
    Builtin::from_name(name).map(Value::Builtin)
}
