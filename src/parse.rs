//! External parse-tree data model.
//!
//! This is the input boundary of the crate: a concrete parse tree produced
//! by one of the two parser front ends (see [`crate::frontend`]). The shape
//! deliberately preserves the *union* of both front-end dialects rather
//! than a normalized form, so that every context-sensitive ambiguity is
//! resolved by the rebuilder, not hidden by deserialization:
//!
//! - the legacy dialect ships n-ary same-operator bitwise groups
//!   ([`ParseKind::BitGroup`]), multi-branch conditionals, binding forms
//!   carrying a `delete` flag, raw subscript entry lists and nested tuple
//!   argument patterns;
//! - the modern dialect ships strictly binary operators, explicit
//!   `Delete` statements and single-branch conditionals whose `orelse`
//!   holds the chained `elif`.

// ============================================================================
// Operators and Literals
// ============================================================================

/// Binary arithmetic and bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    BitAnd,
    BitOr,
    BitXor,
}

impl BinOpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BinOpKind::Add => "+",
            BinOpKind::Sub => "-",
            BinOpKind::Mul => "*",
            BinOpKind::Div => "/",
            BinOpKind::FloorDiv => "//",
            BinOpKind::Mod => "%",
            BinOpKind::Pow => "**",
            BinOpKind::LShift => "<<",
            BinOpKind::RShift => ">>",
            BinOpKind::BitAnd => "&",
            BinOpKind::BitOr => "|",
            BinOpKind::BitXor => "^",
        }
    }

    /// True for the operators the legacy front end groups n-ary.
    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinOpKind::BitAnd | BinOpKind::BitOr | BinOpKind::BitXor
        )
    }
}

/// Boolean operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOpKind {
    And,
    Or,
}

impl BoolOpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BoolOpKind::And => "and",
            BoolOpKind::Or => "or",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOpKind {
    Plus,
    Minus,
    Not,
    Invert,
}

impl UnaryOpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOpKind::Plus => "+",
            UnaryOpKind::Minus => "-",
            UnaryOpKind::Not => "not",
            UnaryOpKind::Invert => "~",
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOpKind {
    Lt,
    Gt,
    LtE,
    GtE,
    Eq,
    NotEq,
    Is,
    IsNot,
    In,
    NotIn,
}

impl CmpOpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CmpOpKind::Lt => "<",
            CmpOpKind::Gt => ">",
            CmpOpKind::LtE => "<=",
            CmpOpKind::GtE => ">=",
            CmpOpKind::Eq => "==",
            CmpOpKind::NotEq => "!=",
            CmpOpKind::Is => "is",
            CmpOpKind::IsNot => "is not",
            CmpOpKind::In => "in",
            CmpOpKind::NotIn => "not in",
        }
    }
}

/// Literal constant values.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

// ============================================================================
// Argument Patterns
// ============================================================================

/// A formal parameter pattern: a plain name or a (possibly nested)
/// destructuring tuple of names.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgPat {
    Name(String),
    Tuple(Vec<ArgPat>),
}

/// The declared argument list of a function or lambda.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArgDecl {
    pub args: Vec<ArgPat>,
    pub defaults: Vec<ParseNode>,
    pub vararg: Option<String>,
    pub kwarg: Option<String>,
}

// ============================================================================
// Parse Nodes
// ============================================================================

/// One node of an external parse tree, with its source-line span.
///
/// `end_lineno` is a best effort: the legacy dialect only records the
/// starting line, in which case `end_lineno == lineno` and the rebuilder
/// widens spans from the last child.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseNode {
    pub lineno: u32,
    pub end_lineno: u32,
    pub kind: ParseKind,
}

impl ParseNode {
    pub fn new(kind: ParseKind, lineno: u32, end_lineno: u32) -> Self {
        ParseNode {
            lineno,
            end_lineno,
            kind,
        }
    }

    /// A node spanning a single line.
    pub fn at(kind: ParseKind, lineno: u32) -> Self {
        ParseNode::new(kind, lineno, lineno)
    }
}

/// The concrete syntax categories either front end can produce.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseKind {
    // Scope-defining forms
    Module {
        doc: Option<String>,
        body: Vec<ParseNode>,
    },
    Class {
        name: String,
        bases: Vec<ParseNode>,
        doc: Option<String>,
        body: Vec<ParseNode>,
    },
    Function {
        name: String,
        args: ArgDecl,
        decorators: Vec<ParseNode>,
        doc: Option<String>,
        body: Vec<ParseNode>,
    },
    Lambda {
        args: ArgDecl,
        body: Box<ParseNode>,
    },

    // Binding and deletion forms
    Assign {
        targets: Vec<ParseNode>,
        value: Box<ParseNode>,
    },
    AugAssign {
        target: Box<ParseNode>,
        op: BinOpKind,
        value: Box<ParseNode>,
    },
    /// A name in binding position; `delete` marks the legacy
    /// `OP_DELETE` flag.
    AssName {
        name: String,
        delete: bool,
    },
    /// An attribute in binding position.
    AssAttr {
        expr: Box<ParseNode>,
        attrname: String,
        delete: bool,
    },
    /// A destructuring tuple or list in binding position.
    AssSeq {
        elts: Vec<ParseNode>,
        tuple: bool,
        delete: bool,
    },
    /// Explicit delete statement (modern dialect only; the legacy
    /// dialect flags its binding forms instead).
    Delete {
        targets: Vec<ParseNode>,
    },

    // Plain expressions
    Name {
        name: String,
    },
    Getattr {
        expr: Box<ParseNode>,
        attrname: String,
    },
    Const {
        value: Literal,
    },
    BinOp {
        op: BinOpKind,
        left: Box<ParseNode>,
        right: Box<ParseNode>,
    },
    /// Legacy n-ary chain of one bitwise operator (`a & b & c`).
    BitGroup {
        op: BinOpKind,
        operands: Vec<ParseNode>,
    },
    BoolOp {
        op: BoolOpKind,
        values: Vec<ParseNode>,
    },
    UnaryOp {
        op: UnaryOpKind,
        operand: Box<ParseNode>,
    },
    Compare {
        left: Box<ParseNode>,
        ops: Vec<(CmpOpKind, ParseNode)>,
    },
    Call {
        func: Box<ParseNode>,
        args: Vec<ParseNode>,
        keywords: Vec<(String, ParseNode)>,
        starargs: Option<Box<ParseNode>>,
        kwargs: Option<Box<ParseNode>>,
    },
    IfExp {
        test: Box<ParseNode>,
        body: Box<ParseNode>,
        orelse: Box<ParseNode>,
    },

    // Compound statements
    /// Conditional with one branch per `if`/`elif` (legacy) or a single
    /// branch whose `orelse` carries the chain (modern).
    If {
        branches: Vec<(ParseNode, Vec<ParseNode>)>,
        orelse: Vec<ParseNode>,
    },
    For {
        target: Box<ParseNode>,
        iter: Box<ParseNode>,
        body: Vec<ParseNode>,
        orelse: Vec<ParseNode>,
    },
    While {
        test: Box<ParseNode>,
        body: Vec<ParseNode>,
        orelse: Vec<ParseNode>,
    },
    TryExcept {
        body: Vec<ParseNode>,
        handlers: Vec<ParseNode>,
        orelse: Vec<ParseNode>,
    },
    TryFinally {
        body: Vec<ParseNode>,
        finalbody: Vec<ParseNode>,
    },
    ExceptHandler {
        typ: Option<Box<ParseNode>>,
        name: Option<Box<ParseNode>>,
        body: Vec<ParseNode>,
    },
    With {
        expr: Box<ParseNode>,
        vars: Option<Box<ParseNode>>,
        body: Vec<ParseNode>,
    },
    Raise {
        exc: Option<Box<ParseNode>>,
        inst: Option<Box<ParseNode>>,
        tback: Option<Box<ParseNode>>,
    },
    Return {
        value: Option<Box<ParseNode>>,
    },
    Yield {
        value: Option<Box<ParseNode>>,
    },
    Global {
        names: Vec<String>,
    },
    Import {
        names: Vec<(String, Option<String>)>,
    },
    From {
        module: String,
        names: Vec<(String, Option<String>)>,
        level: u32,
    },
    Discard {
        value: Box<ParseNode>,
    },
    Assert {
        test: Box<ParseNode>,
        fail: Option<Box<ParseNode>>,
    },
    Pass,
    Break,
    Continue,
    Ellipsis,

    // Containers and comprehensions
    Dict {
        items: Vec<(ParseNode, ParseNode)>,
    },
    ListLit {
        elts: Vec<ParseNode>,
    },
    TupleLit {
        elts: Vec<ParseNode>,
    },
    SetLit {
        elts: Vec<ParseNode>,
    },
    ListComp {
        elt: Box<ParseNode>,
        quals: Vec<ParseNode>,
    },
    SetComp {
        elt: Box<ParseNode>,
        quals: Vec<ParseNode>,
    },
    DictComp {
        key: Box<ParseNode>,
        value: Box<ParseNode>,
        quals: Vec<ParseNode>,
    },
    GenExpr {
        elt: Box<ParseNode>,
        quals: Vec<ParseNode>,
    },
    /// One `for target in iter [if cond]*` clause of a comprehension.
    CompFor {
        target: Box<ParseNode>,
        iter: Box<ParseNode>,
        ifs: Vec<ParseNode>,
    },

    // Subscription
    /// Raw subscript: `subs` holds one entry per dimension, each either
    /// an index expression or a [`ParseKind::SliceObj`].
    Subscript {
        value: Box<ParseNode>,
        subs: Vec<ParseNode>,
        delete: bool,
    },
    /// A slice with 2 (no step) or 3 parts, parts possibly absent.
    SliceObj {
        parts: Vec<Option<ParseNode>>,
    },

    /// A construct this crate has no information about; rebuilt into an
    /// explicit placeholder node, never an error.
    Unsupported {
        construct: String,
    },
}
