//! Owned intermediate representation of a parsed PHP unit
//!
//! The mago AST borrows from its arena and source text. Units stay in the
//! file table for the whole run, so they are lowered into these owned
//! trees right after parsing. Every node keeps its source line, and every
//! expression keeps its source text for symbolic descriptions.

use std::path::PathBuf;
use std::rc::Rc;

/// A parsed source unit
#[derive(Debug, Clone)]
pub struct Program {
    pub path: PathBuf,
    pub statements: Vec<Stmt>,
    /// Unconditional function declarations, declared before the unit runs
    pub functions: Vec<Rc<FunctionDecl>>,
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub line: u32,
    pub kind: StmtKind,
}

impl Stmt {
    pub fn new(line: u32, kind: StmtKind) -> Self {
        Self { line, kind }
    }
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    /// Text outside of `<?php ... ?>`
    Inline(String),
    Echo(Vec<Expr>),
    Expr(Expr),
    Block(Vec<Stmt>),
    If {
        /// `if` and `elseif` tests with their bodies, in source order
        branches: Vec<(Expr, Vec<Stmt>)>,
        otherwise: Option<Vec<Stmt>>,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
    },
    DoWhile {
        body: Vec<Stmt>,
        condition: Expr,
    },
    For {
        init: Vec<Expr>,
        conditions: Vec<Expr>,
        step: Vec<Expr>,
        body: Vec<Stmt>,
    },
    Foreach {
        subject: Expr,
        key: Option<Expr>,
        value: Expr,
        body: Vec<Stmt>,
    },
    Switch {
        subject: Expr,
        cases: Vec<SwitchCase>,
    },
    Break(u32),
    Continue(u32),
    Return(Option<Expr>),
    Function(Rc<FunctionDecl>),
    Global(Vec<String>),
    Static(Vec<(String, Option<Expr>)>),
    Unset(Vec<Expr>),
    Const(Vec<(String, Expr)>),
    Try {
        body: Vec<Stmt>,
        finally: Option<Vec<Stmt>>,
    },
    Nop,
    /// A construct the interpreter does not model, with its source text
    Unsupported(String),
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    /// `None` for `default:`
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub line: u32,
}

#[derive(Debug, Clone)]
pub struct Param {
    /// Variable name without `$`
    pub name: String,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub line: u32,
    /// Source text, used to describe symbolic values
    pub text: String,
    pub kind: ExprKind,
}

impl Expr {
    pub fn new(line: u32, text: impl Into<String>, kind: ExprKind) -> Self {
        Self {
            line,
            text: text.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Double-quoted or heredoc string with embedded expressions
    Interpolated(Vec<InterpolatedPart>),
    Array(Vec<ArrayItem>),
    /// Variable name without `$`
    Variable(String),
    ArrayAccess {
        array: Box<Expr>,
        /// `None` for the append form `$a[]`
        index: Option<Box<Expr>>,
    },
    Constant(String),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Cast {
        kind: CastKind,
        operand: Box<Expr>,
    },
    IncDec {
        increment: bool,
        prefix: bool,
        target: Box<Expr>,
    },
    Assign {
        target: Box<Expr>,
        /// Operator of a compound assignment such as `.=`
        op: Option<BinaryOp>,
        value: Box<Expr>,
    },
    Ternary {
        condition: Box<Expr>,
        /// `None` for the short form `a ?: b`
        then: Option<Box<Expr>>,
        otherwise: Box<Expr>,
    },
    Isset(Vec<Expr>),
    Empty(Box<Expr>),
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Include {
        kind: IncludeKind,
        target: Box<Expr>,
    },
    Exit(Option<Box<Expr>>),
    Print(Box<Expr>),
    Unsupported,
}

#[derive(Debug, Clone)]
pub enum InterpolatedPart {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone)]
pub struct ArrayItem {
    pub key: Option<Expr>,
    pub value: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Concat,
    Equal,
    NotEqual,
    Identical,
    NotIdentical,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Spaceship,
    And,
    Or,
    Xor,
    Coalesce,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
}

impl BinaryOp {
    /// Parse an operator token; the keyword forms `and`/`or`/`xor` included
    pub fn from_token(token: &str) -> Option<BinaryOp> {
        let op = match token.to_ascii_lowercase().as_str() {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Mod,
            "**" => BinaryOp::Pow,
            "." => BinaryOp::Concat,
            "==" => BinaryOp::Equal,
            "!=" | "<>" => BinaryOp::NotEqual,
            "===" => BinaryOp::Identical,
            "!==" => BinaryOp::NotIdentical,
            "<" => BinaryOp::Less,
            "<=" => BinaryOp::LessEqual,
            ">" => BinaryOp::Greater,
            ">=" => BinaryOp::GreaterEqual,
            "<=>" => BinaryOp::Spaceship,
            "&&" | "and" => BinaryOp::And,
            "||" | "or" => BinaryOp::Or,
            "xor" => BinaryOp::Xor,
            "??" => BinaryOp::Coalesce,
            "&" => BinaryOp::BitAnd,
            "|" => BinaryOp::BitOr,
            "^" => BinaryOp::BitXor,
            "<<" => BinaryOp::ShiftLeft,
            ">>" => BinaryOp::ShiftRight,
            _ => return None,
        };
        Some(op)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Concat => ".",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Identical => "===",
            BinaryOp::NotIdentical => "!==",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::Spaceship => "<=>",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Xor => "xor",
            BinaryOp::Coalesce => "??",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::ShiftLeft => "<<",
            BinaryOp::ShiftRight => ">>",
        }
    }

    /// Comparison operators, whose result is a condition
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::Identical
                | BinaryOp::NotIdentical
                | BinaryOp::Less
                | BinaryOp::LessEqual
                | BinaryOp::Greater
                | BinaryOp::GreaterEqual
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
    Plus,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    Int,
    Float,
    String,
    Bool,
    Array,
}

impl CastKind {
    /// Parse a cast token such as `(int)` or `( string )`
    pub fn from_token(token: &str) -> Option<CastKind> {
        let inner: String = token
            .trim()
            .trim_start_matches('(')
            .trim_end_matches(')')
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let kind = match inner.to_ascii_lowercase().as_str() {
            "int" | "integer" => CastKind::Int,
            "float" | "double" | "real" => CastKind::Float,
            "string" | "binary" => CastKind::String,
            "bool" | "boolean" => CastKind::Bool,
            "array" => CastKind::Array,
            _ => return None,
        };
        Some(kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeKind {
    Include,
    IncludeOnce,
    Require,
    RequireOnce,
}

impl IncludeKind {
    pub fn is_once(&self) -> bool {
        matches!(self, IncludeKind::IncludeOnce | IncludeKind::RequireOnce)
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            IncludeKind::Include => "include",
            IncludeKind::IncludeOnce => "include_once",
            IncludeKind::Require => "require",
            IncludeKind::RequireOnce => "require_once",
        }
    }
}
