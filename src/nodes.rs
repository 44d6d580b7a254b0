//! The canonical node graph.
//!
//! One module graph is a strict ownership tree of [`Node`]s held through
//! `Rc`, with a non-owning `Weak` parent back-reference on every non-root
//! node. Node identity is pointer identity (`Rc::ptr_eq`); cross-links
//! such as symbol-table entries and inference results are plain `Rc`
//! clones into the same tree.
//!
//! Scope-defining kinds (module, class, function, lambda, generator
//! expression) carry insertion-ordered symbol tables: `locals` maps each
//! identifier to the ordered sequence of nodes that bind it, preserving
//! redefinition history, and classes additionally carry `instance_attrs`
//! for attribute assignments discovered through a receiver expression.
//! Both tables are append-only during rebuilding.
//!
//! Lazily computed class facts (kind, new-style flag) live in `OnceCell`
//! fields: pure functions of already-built ancestor data, safe to compute
//! redundantly.

use std::cell::{Cell, RefCell};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use once_cell::unsync::OnceCell;

use crate::parse::{BinOpKind, BoolOpKind, CmpOpKind, Literal, UnaryOpKind};

/// Shared handle to a graph node.
pub type NRef = Rc<Node>;

/// Ordered symbol table: identifier -> ordered binding nodes.
pub type Locals = IndexMap<String, Vec<NRef>>;

// ============================================================================
// Roles and Class Kinds
// ============================================================================

/// The role a function node plays, decided during rebuilding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FnRole {
    Function,
    Method,
    ClassMethod,
    StaticMethod,
}

impl FnRole {
    pub fn as_str(self) -> &'static str {
        match self {
            FnRole::Function => "function",
            FnRole::Method => "method",
            FnRole::ClassMethod => "classmethod",
            FnRole::StaticMethod => "staticmethod",
        }
    }
}

/// The kind of a class, computed lazily from its name and ancestors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Plain,
    Metaclass,
    Interface,
    Exception,
}

impl ClassKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ClassKind::Plain => "class",
            ClassKind::Metaclass => "metaclass",
            ClassKind::Interface => "interface",
            ClassKind::Exception => "exception",
        }
    }
}

// ============================================================================
// Scope Payloads
// ============================================================================

/// Payload of a module node.
#[derive(Debug)]
pub struct ModuleData {
    pub name: String,
    pub doc: Option<String>,
    /// Path the tree was loaded from, if any.
    pub file: RefCell<Option<PathBuf>>,
    /// True when the path denotes a package initializer.
    pub package: Cell<bool>,
    /// True when built from a full source tree (as opposed to a partial
    /// graph produced by the reflection collaborator).
    pub pure_source: Cell<bool>,
    pub body: RefCell<Vec<NRef>>,
    pub locals: RefCell<Locals>,
}

/// Payload of a class node.
#[derive(Debug)]
pub struct ClassData {
    pub name: String,
    pub doc: Option<String>,
    pub bases: Vec<NRef>,
    pub body: RefCell<Vec<NRef>>,
    pub locals: RefCell<Locals>,
    pub instance_attrs: RefCell<Locals>,
    pub kind: OnceCell<ClassKind>,
    pub newstyle: OnceCell<bool>,
}

/// Payload of a function node.
#[derive(Debug)]
pub struct FunctionData {
    pub name: String,
    pub doc: Option<String>,
    pub role: Cell<FnRole>,
    pub decorators: RefCell<Option<NRef>>,
    pub args: RefCell<Option<NRef>>,
    pub body: RefCell<Vec<NRef>>,
    pub locals: RefCell<Locals>,
    /// Call expressions of the `name = classmethod(name)` pattern,
    /// recorded next to the real decorators for later inference.
    pub extra_decorators: RefCell<Vec<NRef>>,
    pub decorator_names: OnceCell<Vec<String>>,
}

/// Payload of a lambda node.
#[derive(Debug)]
pub struct LambdaData {
    pub args: RefCell<Option<NRef>>,
    pub body: RefCell<Option<NRef>>,
    pub locals: RefCell<Locals>,
}

/// Payload of a generator expression, which opens its own scope.
#[derive(Debug)]
pub struct GenExprData {
    pub elt: RefCell<Option<NRef>>,
    pub generators: RefCell<Vec<NRef>>,
    pub locals: RefCell<Locals>,
}

// ============================================================================
// Node
// ============================================================================

/// A node of the canonical graph.
#[derive(Debug)]
pub struct Node {
    pub kind: NodeKind,
    parent: RefCell<Weak<Node>>,
    lineno_from: Cell<u32>,
    lineno_to: Cell<u32>,
}

/// Closed variant set over all canonical syntax categories.
#[derive(Debug)]
pub enum NodeKind {
    // Scope-defining forms
    Module(ModuleData),
    Class(ClassData),
    Function(FunctionData),
    Lambda(LambdaData),
    GenExpr(GenExprData),

    // Binding / deletion forms
    AssName { name: String },
    AssAttr { expr: NRef, attrname: String },
    DelName { name: String },
    DelAttr { expr: NRef, attrname: String },
    Assign { targets: Vec<NRef>, value: NRef },
    AugAssign { target: NRef, op: BinOpKind, value: NRef },
    Delete { targets: Vec<NRef> },

    // Plain expressions
    Name { name: String },
    Getattr { expr: NRef, attrname: String },
    Const { value: Literal },
    BinOp { op: BinOpKind, left: NRef, right: NRef },
    BoolOp { op: BoolOpKind, values: Vec<NRef> },
    UnaryOp { op: UnaryOpKind, operand: NRef },
    Compare { left: NRef, ops: Vec<(CmpOpKind, NRef)> },
    Call {
        func: NRef,
        args: Vec<NRef>,
        keywords: IndexMap<String, NRef>,
        starargs: Option<NRef>,
        kwargs: Option<NRef>,
    },
    IfExp { test: NRef, body: NRef, orelse: NRef },

    // Statements
    If {
        test: NRef,
        body: Vec<NRef>,
        /// Settable once after creation: chain synthesis links the next
        /// conditional in here.
        orelse: RefCell<Vec<NRef>>,
    },
    For { target: NRef, iter: NRef, body: Vec<NRef>, orelse: Vec<NRef> },
    While { test: NRef, body: Vec<NRef>, orelse: Vec<NRef> },
    TryExcept { body: Vec<NRef>, handlers: Vec<NRef>, orelse: Vec<NRef> },
    TryFinally { body: Vec<NRef>, finalbody: Vec<NRef> },
    ExceptHandler { typ: Option<NRef>, name: Option<NRef>, body: Vec<NRef> },
    With { expr: NRef, vars: Option<NRef>, body: Vec<NRef> },
    Raise { exc: Option<NRef>, inst: Option<NRef>, tback: Option<NRef> },
    Return { value: Option<NRef> },
    Yield { value: Option<NRef> },
    Global { names: Vec<String> },
    Import { names: Vec<(String, Option<String>)> },
    From {
        module: String,
        names: Vec<(String, Option<String>)>,
        level: u32,
    },
    Discard { value: NRef },
    Assert { test: NRef, fail: Option<NRef> },
    Pass,
    Break,
    Continue,
    Ellipsis,

    // Containers and comprehensions
    Dict { items: Vec<(NRef, NRef)> },
    List { elts: Vec<NRef> },
    Tuple { elts: Vec<NRef> },
    Set { elts: Vec<NRef> },
    ListComp { elt: NRef, generators: Vec<NRef> },
    SetComp { elt: NRef, generators: Vec<NRef> },
    DictComp { key: NRef, value: NRef, generators: Vec<NRef> },
    Comprehension { target: NRef, iter: NRef, ifs: Vec<NRef> },

    // Subscription
    Subscript { value: NRef, slice: NRef },
    Index { value: NRef },
    Slice { lower: Option<NRef>, upper: Option<NRef>, step: Option<NRef> },
    ExtSlice { dims: Vec<NRef> },

    // Support
    Decorators { nodes: Vec<NRef> },
    Arguments {
        args: Vec<NRef>,
        defaults: Vec<NRef>,
        vararg: Option<String>,
        kwarg: Option<String>,
    },

    /// Explicit "no information" placeholder.
    Empty { construct: Option<String> },
}

impl Node {
    /// Create a fresh, unattached node.
    pub fn new(kind: NodeKind, lineno_from: u32, lineno_to: u32) -> NRef {
        Rc::new(Node {
            kind,
            parent: RefCell::new(Weak::new()),
            lineno_from: Cell::new(lineno_from),
            lineno_to: Cell::new(lineno_to.max(lineno_from)),
        })
    }

    // ------------------------------------------------------------------
    // Span
    // ------------------------------------------------------------------

    pub fn lineno_from(&self) -> u32 {
        self.lineno_from.get()
    }

    pub fn lineno_to(&self) -> u32 {
        self.lineno_to.get()
    }

    pub fn set_span(&self, from: u32, to: u32) {
        self.lineno_from.set(from);
        self.lineno_to.set(to.max(from));
    }

    /// Widen this node's end line to cover `child`.
    pub fn widen_to(&self, child: &Node) {
        if child.lineno_to() > self.lineno_to() {
            self.lineno_to.set(child.lineno_to());
        }
    }

    // ------------------------------------------------------------------
    // Parent link
    // ------------------------------------------------------------------

    pub fn parent(&self) -> Option<NRef> {
        self.parent.borrow().upgrade()
    }

    /// Set the parent back-reference. Apart from the structural replace
    /// used during synthesis, a node's parent is set exactly once.
    pub fn set_parent(&self, parent: &NRef) {
        debug_assert!(
            self.parent.borrow().upgrade().is_none(),
            "parent reassigned outside structural replace"
        );
        *self.parent.borrow_mut() = Rc::downgrade(parent);
    }

    pub(crate) fn force_parent(&self, parent: &NRef) {
        *self.parent.borrow_mut() = Rc::downgrade(parent);
    }

    pub(crate) fn clear_parent(&self) {
        *self.parent.borrow_mut() = Weak::new();
    }

    // ------------------------------------------------------------------
    // Kind queries
    // ------------------------------------------------------------------

    /// True for kinds that own a `locals` table.
    pub fn is_scope(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Module(_)
                | NodeKind::Class(_)
                | NodeKind::Function(_)
                | NodeKind::Lambda(_)
                | NodeKind::GenExpr(_)
        )
    }

    /// True for kinds that act as a frame (generator expressions defer
    /// to their enclosing frame).
    pub fn is_frame(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Module(_) | NodeKind::Class(_) | NodeKind::Function(_) | NodeKind::Lambda(_)
        )
    }

    pub fn as_module(&self) -> Option<&ModuleData> {
        match &self.kind {
            NodeKind::Module(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassData> {
        match &self.kind {
            NodeKind::Class(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionData> {
        match &self.kind {
            NodeKind::Function(data) => Some(data),
            _ => None,
        }
    }

    /// The identifier this node introduces or references, if any.
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Module(data) => Some(&data.name),
            NodeKind::Class(data) => Some(&data.name),
            NodeKind::Function(data) => Some(&data.name),
            NodeKind::Name { name }
            | NodeKind::AssName { name }
            | NodeKind::DelName { name } => Some(name),
            _ => None,
        }
    }

    /// A short kind tag, used by the tree printer and diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Module(_) => "Module",
            NodeKind::Class(_) => "Class",
            NodeKind::Function(_) => "Function",
            NodeKind::Lambda(_) => "Lambda",
            NodeKind::GenExpr(_) => "GenExpr",
            NodeKind::AssName { .. } => "AssName",
            NodeKind::AssAttr { .. } => "AssAttr",
            NodeKind::DelName { .. } => "DelName",
            NodeKind::DelAttr { .. } => "DelAttr",
            NodeKind::Assign { .. } => "Assign",
            NodeKind::AugAssign { .. } => "AugAssign",
            NodeKind::Delete { .. } => "Delete",
            NodeKind::Name { .. } => "Name",
            NodeKind::Getattr { .. } => "Getattr",
            NodeKind::Const { .. } => "Const",
            NodeKind::BinOp { .. } => "BinOp",
            NodeKind::BoolOp { .. } => "BoolOp",
            NodeKind::UnaryOp { .. } => "UnaryOp",
            NodeKind::Compare { .. } => "Compare",
            NodeKind::Call { .. } => "Call",
            NodeKind::IfExp { .. } => "IfExp",
            NodeKind::If { .. } => "If",
            NodeKind::For { .. } => "For",
            NodeKind::While { .. } => "While",
            NodeKind::TryExcept { .. } => "TryExcept",
            NodeKind::TryFinally { .. } => "TryFinally",
            NodeKind::ExceptHandler { .. } => "ExceptHandler",
            NodeKind::With { .. } => "With",
            NodeKind::Raise { .. } => "Raise",
            NodeKind::Return { .. } => "Return",
            NodeKind::Yield { .. } => "Yield",
            NodeKind::Global { .. } => "Global",
            NodeKind::Import { .. } => "Import",
            NodeKind::From { .. } => "From",
            NodeKind::Discard { .. } => "Discard",
            NodeKind::Assert { .. } => "Assert",
            NodeKind::Pass => "Pass",
            NodeKind::Break => "Break",
            NodeKind::Continue => "Continue",
            NodeKind::Ellipsis => "Ellipsis",
            NodeKind::Dict { .. } => "Dict",
            NodeKind::List { .. } => "List",
            NodeKind::Tuple { .. } => "Tuple",
            NodeKind::Set { .. } => "Set",
            NodeKind::ListComp { .. } => "ListComp",
            NodeKind::SetComp { .. } => "SetComp",
            NodeKind::DictComp { .. } => "DictComp",
            NodeKind::Comprehension { .. } => "Comprehension",
            NodeKind::Subscript { .. } => "Subscript",
            NodeKind::Index { .. } => "Index",
            NodeKind::Slice { .. } => "Slice",
            NodeKind::ExtSlice { .. } => "ExtSlice",
            NodeKind::Decorators { .. } => "Decorators",
            NodeKind::Arguments { .. } => "Arguments",
            NodeKind::Empty { .. } => "Empty",
        }
    }

    // ------------------------------------------------------------------
    // Symbol tables
    // ------------------------------------------------------------------

    fn locals_cell(&self) -> Option<&RefCell<Locals>> {
        match &self.kind {
            NodeKind::Module(data) => Some(&data.locals),
            NodeKind::Class(data) => Some(&data.locals),
            NodeKind::Function(data) => Some(&data.locals),
            NodeKind::Lambda(data) => Some(&data.locals),
            NodeKind::GenExpr(data) => Some(&data.locals),
            _ => None,
        }
    }

    /// Append a binding for `name` in this scope's locals.
    ///
    /// Bindings are append-only: later bindings of the same name never
    /// remove earlier ones.
    pub fn set_local(&self, name: &str, node: &NRef) {
        let cell = self
            .locals_cell()
            .expect("set_local on a non-scope node");
        cell.borrow_mut()
            .entry(name.to_string())
            .or_default()
            .push(Rc::clone(node));
    }

    /// The ordered bindings of `name` in this scope only.
    pub fn local_bindings(&self, name: &str) -> Option<Vec<NRef>> {
        self.locals_cell()
            .and_then(|cell| cell.borrow().get(name).cloned())
    }

    /// The ordered identifier set of this scope's locals.
    pub fn local_names(&self) -> Vec<String> {
        self.locals_cell()
            .map(|cell| cell.borrow().keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Mutable access to the locals table, for the deferred
    /// attribute-assignment pass which orders entries.
    pub(crate) fn locals_mut(&self) -> Option<std::cell::RefMut<'_, Locals>> {
        self.locals_cell().map(|cell| cell.borrow_mut())
    }

    /// A shallow copy of the locals table (values are `Rc` clones).
    pub fn locals_clone(&self) -> Locals {
        self.locals_cell()
            .map(|cell| cell.borrow().clone())
            .unwrap_or_default()
    }
}

// ============================================================================
// Navigation
// ============================================================================

/// Navigation helpers on node handles.
pub trait NodeExt {
    /// Nearest enclosing frame (module, class, function or lambda),
    /// the node itself when it is one.
    fn frame(&self) -> NRef;
    /// Nearest enclosing scope; like [`NodeExt::frame`] but generator
    /// expressions count as scopes of their own.
    fn scope(&self) -> NRef;
    /// The root module node.
    fn root(&self) -> NRef;
}

impl NodeExt for NRef {
    fn frame(&self) -> NRef {
        if self.is_frame() {
            return Rc::clone(self);
        }
        match self.parent() {
            Some(parent) => parent.frame(),
            None => Rc::clone(self),
        }
    }

    fn scope(&self) -> NRef {
        if self.is_scope() {
            return Rc::clone(self);
        }
        match self.parent() {
            Some(parent) => parent.scope(),
            None => Rc::clone(self),
        }
    }

    fn root(&self) -> NRef {
        match self.parent() {
            Some(parent) => parent.root(),
            None => Rc::clone(self),
        }
    }
}

/// Link `child` under `parent`.
pub fn attach(parent: &NRef, child: &NRef) {
    child.set_parent(parent);
}

/// Structural replace: swap `old` for `new` in a scope node's body.
///
/// The only sanctioned parent reassignment outside initial linking.
pub fn replace_child(parent: &NRef, old: &NRef, new: &NRef) -> bool {
    let body = match &parent.kind {
        NodeKind::Module(data) => &data.body,
        NodeKind::Class(data) => &data.body,
        NodeKind::Function(data) => &data.body,
        _ => return false,
    };
    let mut body = body.borrow_mut();
    for slot in body.iter_mut() {
        if Rc::ptr_eq(slot, old) {
            new.force_parent(parent);
            old.clear_parent();
            *slot = Rc::clone(new);
            return true;
        }
    }
    false
}

/// Visit every direct child of `node` in source order.
pub fn for_each_child(node: &Node, f: &mut dyn FnMut(&NRef)) {
    let each = |items: &[NRef], f: &mut dyn FnMut(&NRef)| {
        for item in items {
            f(item);
        }
    };
    let opt = |item: &Option<NRef>, f: &mut dyn FnMut(&NRef)| {
        if let Some(item) = item {
            f(item);
        }
    };
    match &node.kind {
        NodeKind::Module(data) => each(&data.body.borrow(), f),
        NodeKind::Class(data) => {
            each(&data.bases, f);
            each(&data.body.borrow(), f);
        }
        NodeKind::Function(data) => {
            opt(&data.decorators.borrow(), f);
            opt(&data.args.borrow(), f);
            each(&data.body.borrow(), f);
        }
        NodeKind::Lambda(data) => {
            opt(&data.args.borrow(), f);
            opt(&data.body.borrow(), f);
        }
        NodeKind::GenExpr(data) => {
            opt(&data.elt.borrow(), f);
            each(&data.generators.borrow(), f);
        }
        NodeKind::AssName { .. }
        | NodeKind::DelName { .. }
        | NodeKind::Name { .. }
        | NodeKind::Const { .. }
        | NodeKind::Global { .. }
        | NodeKind::Import { .. }
        | NodeKind::From { .. }
        | NodeKind::Pass
        | NodeKind::Break
        | NodeKind::Continue
        | NodeKind::Ellipsis
        | NodeKind::Empty { .. } => {}
        NodeKind::AssAttr { expr, .. } | NodeKind::DelAttr { expr, .. } => f(expr),
        NodeKind::Assign { targets, value } => {
            each(targets, f);
            f(value);
        }
        NodeKind::AugAssign { target, value, .. } => {
            f(target);
            f(value);
        }
        NodeKind::Delete { targets } => each(targets, f),
        NodeKind::Getattr { expr, .. } => f(expr),
        NodeKind::BinOp { left, right, .. } => {
            f(left);
            f(right);
        }
        NodeKind::BoolOp { values, .. } => each(values, f),
        NodeKind::UnaryOp { operand, .. } => f(operand),
        NodeKind::Compare { left, ops } => {
            f(left);
            for (_, operand) in ops {
                f(operand);
            }
        }
        NodeKind::Call {
            func,
            args,
            keywords,
            starargs,
            kwargs,
        } => {
            f(func);
            each(args, f);
            for value in keywords.values() {
                f(value);
            }
            opt(starargs, f);
            opt(kwargs, f);
        }
        NodeKind::IfExp { test, body, orelse } => {
            f(test);
            f(body);
            f(orelse);
        }
        NodeKind::If { test, body, orelse } => {
            f(test);
            each(body, f);
            each(&orelse.borrow(), f);
        }
        NodeKind::For {
            target,
            iter,
            body,
            orelse,
        } => {
            f(target);
            f(iter);
            each(body, f);
            each(orelse, f);
        }
        NodeKind::While { test, body, orelse } => {
            f(test);
            each(body, f);
            each(orelse, f);
        }
        NodeKind::TryExcept {
            body,
            handlers,
            orelse,
        } => {
            each(body, f);
            each(handlers, f);
            each(orelse, f);
        }
        NodeKind::TryFinally { body, finalbody } => {
            each(body, f);
            each(finalbody, f);
        }
        NodeKind::ExceptHandler { typ, name, body } => {
            opt(typ, f);
            opt(name, f);
            each(body, f);
        }
        NodeKind::With { expr, vars, body } => {
            f(expr);
            opt(vars, f);
            each(body, f);
        }
        NodeKind::Raise { exc, inst, tback } => {
            opt(exc, f);
            opt(inst, f);
            opt(tback, f);
        }
        NodeKind::Return { value } | NodeKind::Yield { value } => opt(value, f),
        NodeKind::Discard { value } => f(value),
        NodeKind::Assert { test, fail } => {
            f(test);
            opt(fail, f);
        }
        NodeKind::Dict { items } => {
            for (key, value) in items {
                f(key);
                f(value);
            }
        }
        NodeKind::List { elts } | NodeKind::Tuple { elts } | NodeKind::Set { elts } => {
            each(elts, f)
        }
        NodeKind::ListComp { elt, generators } | NodeKind::SetComp { elt, generators } => {
            f(elt);
            each(generators, f);
        }
        NodeKind::DictComp {
            key,
            value,
            generators,
        } => {
            f(key);
            f(value);
            each(generators, f);
        }
        NodeKind::Comprehension { target, iter, ifs } => {
            f(target);
            f(iter);
            each(ifs, f);
        }
        NodeKind::Subscript { value, slice } => {
            f(value);
            f(slice);
        }
        NodeKind::Index { value } => f(value),
        NodeKind::Slice { lower, upper, step } => {
            opt(lower, f);
            opt(upper, f);
            opt(step, f);
        }
        NodeKind::ExtSlice { dims } => each(dims, f),
        NodeKind::Decorators { nodes } => each(nodes, f),
        NodeKind::Arguments { args, defaults, .. } => {
            each(args, f);
            each(defaults, f);
        }
    }
}

// ============================================================================
// Tree Printer
// ============================================================================

/// Render the subtree rooted at `node` as an indented text dump.
///
/// Scope nodes print their locals key set (classes also print
/// `instance_attrs` keys), so two structurally equivalent graphs dump
/// identically: same kinds, same child order, same symbol-table keys.
pub fn dump(node: &NRef) -> String {
    let mut out = String::new();
    dump_into(node, 0, &mut out);
    out
}

fn dump_into(node: &NRef, depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push_str("  ");
    }
    out.push_str(node.kind_name());
    if let Some(name) = node.name() {
        let _ = write!(out, "({name})");
    }
    match &node.kind {
        NodeKind::Const { value } => {
            let _ = write!(out, " {value:?}");
        }
        NodeKind::BinOp { op, .. } | NodeKind::AugAssign { op, .. } => {
            let _ = write!(out, " {}", op.as_str());
        }
        NodeKind::BoolOp { op, .. } => {
            let _ = write!(out, " {}", op.as_str());
        }
        NodeKind::UnaryOp { op, .. } => {
            let _ = write!(out, " {}", op.as_str());
        }
        NodeKind::Compare { ops, .. } => {
            for (op, _) in ops {
                let _ = write!(out, " {}", op.as_str());
            }
        }
        NodeKind::Getattr { attrname, .. }
        | NodeKind::AssAttr { attrname, .. }
        | NodeKind::DelAttr { attrname, .. } => {
            let _ = write!(out, ".{attrname}");
        }
        NodeKind::Import { names } | NodeKind::From { names, .. } => {
            for (name, alias) in names {
                match alias {
                    Some(alias) => {
                        let _ = write!(out, " {name} as {alias}");
                    }
                    None => {
                        let _ = write!(out, " {name}");
                    }
                }
            }
        }
        NodeKind::Function(data) => {
            let _ = write!(out, " [{}]", data.role.get().as_str());
        }
        _ => {}
    }
    if node.is_scope() {
        let names = node.local_names();
        let _ = write!(out, " locals={names:?}");
        if let Some(class) = node.as_class() {
            let attrs: Vec<String> = class.instance_attrs.borrow().keys().cloned().collect();
            let _ = write!(out, " instance_attrs={attrs:?}");
        }
    }
    out.push('\n');
    for_each_child(node, &mut |child| dump_into(child, depth + 1, out));
}

// ============================================================================
// Tests
// ============================================================================
