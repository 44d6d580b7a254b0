//! The tree rebuilder: external parse trees in, canonical graphs out.
//!
//! [`TreeRebuilder`] is a one-shot session over a single module. All
//! threaded state is explicit on the struct: the assignment context
//! deciding whether a name or attribute is a binding, a deletion or a
//! read; the metaclass declaration in force per class-nesting level;
//! the `global`-declaration sets per function frame; and the queue of
//! attribute assignments whose receiver can only be resolved once the
//! whole module is built.
//!
//! Construction order follows ownership: ordinary nodes are built
//! bottom-up (children first, then the node, then the parent links),
//! while scope nodes are created before their body is visited so that
//! bindings can register in the enclosing symbol table mid-walk.
//!
//! Structural rebuilding never fails once a parse tree is in hand.
//! Constructs the data model has no information about become explicit
//! placeholder nodes; only a top-level node that is not a module is
//! rejected.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::path::PathBuf;
use std::rc::Rc;

use indexmap::IndexMap;
use once_cell::unsync::OnceCell;
use tracing::debug;

use crate::error::{BuildError, BuildResult};
use crate::infer::{infer, InferCtx, Resolve, Value};
use crate::nodes::{
    attach, for_each_child, ClassData, FnRole, FunctionData, GenExprData, LambdaData, Locals,
    ModuleData, NRef, Node, NodeExt, NodeKind,
};
use crate::parse::{ArgDecl, ArgPat, BinOpKind, Literal, ParseKind, ParseNode};
use crate::scoped;

// ============================================================================
// Assignment Context
// ============================================================================

/// What role a name or attribute met during the walk plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssContext {
    None,
    Assign,
    Aug,
    Del,
    Discard,
}

// ============================================================================
// Rebuilder
// ============================================================================

/// One rebuild session. Create, call [`TreeRebuilder::build`], done.
pub struct TreeRebuilder<'r> {
    asscontext: AssContext,
    /// Innermost-last stack of open scope nodes.
    scopes: Vec<NRef>,
    /// Per class-nesting level: does the metaclass declaration in force
    /// make base-less classes new-style.
    metaclass: Vec<bool>,
    /// Per function frame: names declared `global`.
    global_names: Vec<HashSet<String>>,
    /// Attribute assignments awaiting receiver inference.
    delayed: Vec<NRef>,
    resolver: Option<&'r mut dyn Resolve>,
}

impl<'r> TreeRebuilder<'r> {
    pub fn new() -> Self {
        TreeRebuilder {
            asscontext: AssContext::None,
            scopes: Vec::new(),
            metaclass: Vec::new(),
            global_names: Vec::new(),
            delayed: Vec::new(),
            resolver: None,
        }
    }

    /// A session that can reach other modules: wildcard imports expand
    /// and deferred receivers resolve across module boundaries.
    pub fn with_resolver(resolver: &'r mut dyn Resolve) -> Self {
        TreeRebuilder {
            resolver: Some(resolver),
            ..TreeRebuilder::new()
        }
    }

    /// Rebuild one module tree into a canonical graph.
    pub fn build(
        &mut self,
        tree: &ParseNode,
        modname: &str,
        path: Option<PathBuf>,
        package: bool,
    ) -> BuildResult<NRef> {
        let ParseKind::Module { doc, body } = &tree.kind else {
            return Err(BuildError::parse("top-level node is not a module"));
        };
        let module = Node::new(
            NodeKind::Module(ModuleData {
                name: modname.to_string(),
                doc: doc.clone(),
                file: RefCell::new(path),
                package: Cell::new(package),
                pure_source: Cell::new(true),
                body: RefCell::new(Vec::new()),
                locals: RefCell::new(Locals::default()),
            }),
            tree.lineno,
            tree.end_lineno,
        );
        // partial registration first: cyclic imports met while visiting
        // the body resolve to this still-filling module
        if let Some(resolver) = self.resolver.as_deref_mut() {
            resolver.register_partial(modname, &module);
        }
        self.scopes.push(Rc::clone(&module));
        self.metaclass.push(false);
        for stmt in body {
            let child = self.visit(stmt);
            attach(&module, &child);
            module.widen_to(&child);
            if let Some(data) = module.as_module() {
                data.body.borrow_mut().push(child);
            }
        }
        self.metaclass.pop();
        self.scopes.pop();
        self.resolve_delayed();
        Ok(module)
    }

    // ------------------------------------------------------------------
    // Session plumbing
    // ------------------------------------------------------------------

    fn with_ctx<R>(&mut self, ctx: AssContext, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = self.asscontext;
        self.asscontext = ctx;
        let out = f(self);
        self.asscontext = saved;
        out
    }

    fn scope(&self) -> &NRef {
        self.scopes.last().expect("rebuild visit outside a module")
    }

    /// Register a binding, honoring `global` declarations in force.
    fn register(&mut self, name: &str, node: &NRef) {
        let route_global = self
            .global_names
            .last()
            .map(|set| set.contains(name))
            .unwrap_or(false);
        let scope = if route_global {
            self.scopes.first()
        } else {
            self.scopes.last()
        };
        if let Some(scope) = scope {
            scope.set_local(name, node);
        }
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    fn visit(&mut self, pn: &ParseNode) -> NRef {
        // A binding form flagged for deletion met outside a delete
        // context is a bare delete statement: synthesize the wrapper.
        if self.asscontext == AssContext::None && flags_delete(&pn.kind) {
            let target = self.with_ctx(AssContext::Del, |s| s.visit_inner(pn));
            return link(&Node::new(
                NodeKind::Delete {
                    targets: vec![target],
                },
                pn.lineno,
                pn.end_lineno,
            ));
        }
        self.visit_inner(pn)
    }

    fn visit_inner(&mut self, pn: &ParseNode) -> NRef {
        let span = (pn.lineno, pn.end_lineno);
        match &pn.kind {
            ParseKind::Module { .. } => {
                // nested module nodes do not occur; keep the walk total
                Node::new(
                    NodeKind::Empty {
                        construct: Some("Module".to_string()),
                    },
                    span.0,
                    span.1,
                )
            }
            ParseKind::Class {
                name,
                bases,
                doc,
                body,
            } => self.visit_class(name, bases, doc.as_deref(), body, span),
            ParseKind::Function {
                name,
                args,
                decorators,
                doc,
                body,
            } => self.visit_function(name, args, decorators, doc.as_deref(), body, span),
            ParseKind::Lambda { args, body } => self.visit_lambda(args, body, span),

            ParseKind::Assign { targets, value } => self.visit_assign(targets, value, span),
            ParseKind::AugAssign { target, op, value } => {
                let value = self.with_ctx(AssContext::None, |s| s.visit(value));
                let target = self.with_ctx(AssContext::Aug, |s| s.visit(target));
                link(&Node::new(
                    NodeKind::AugAssign {
                        target,
                        op: *op,
                        value,
                    },
                    span.0,
                    span.1,
                ))
            }
            ParseKind::AssName { name, .. } => self.visit_assname(name, span),
            ParseKind::AssAttr { expr, attrname, .. } => self.visit_assattr(expr, attrname, span),
            ParseKind::AssSeq { elts, tuple, .. } => {
                let elts: Vec<NRef> = elts.iter().map(|elt| self.visit(elt)).collect();
                let kind = if *tuple {
                    NodeKind::Tuple { elts }
                } else {
                    NodeKind::List { elts }
                };
                link(&Node::new(kind, span.0, span.1))
            }
            ParseKind::Delete { targets } => {
                let targets = self.with_ctx(AssContext::Del, |s| {
                    targets.iter().map(|t| s.visit(t)).collect()
                });
                link(&Node::new(NodeKind::Delete { targets }, span.0, span.1))
            }

            ParseKind::Name { name } => match name.as_str() {
                // constant-name reads fold to constants
                "None" => Node::new(
                    NodeKind::Const {
                        value: Literal::None,
                    },
                    span.0,
                    span.1,
                ),
                "True" => Node::new(
                    NodeKind::Const {
                        value: Literal::Bool(true),
                    },
                    span.0,
                    span.1,
                ),
                "False" => Node::new(
                    NodeKind::Const {
                        value: Literal::Bool(false),
                    },
                    span.0,
                    span.1,
                ),
                _ => Node::new(
                    NodeKind::Name { name: name.clone() },
                    span.0,
                    span.1,
                ),
            },
            ParseKind::Getattr { expr, attrname } => {
                let expr = self.with_ctx(AssContext::None, |s| s.visit(expr));
                link(&Node::new(
                    NodeKind::Getattr {
                        expr,
                        attrname: attrname.clone(),
                    },
                    span.0,
                    span.1,
                ))
            }
            ParseKind::Const { value } => Node::new(
                NodeKind::Const {
                    value: value.clone(),
                },
                span.0,
                span.1,
            ),
            ParseKind::BinOp { op, left, right } => {
                let left = self.visit(left);
                let right = self.visit(right);
                link(&Node::new(
                    NodeKind::BinOp {
                        op: *op,
                        left,
                        right,
                    },
                    span.0,
                    span.1,
                ))
            }
            ParseKind::BitGroup { op, operands } => self.visit_bitgroup(*op, operands, span),
            ParseKind::BoolOp { op, values } => {
                let values = values.iter().map(|v| self.visit(v)).collect();
                link(&Node::new(
                    NodeKind::BoolOp { op: *op, values },
                    span.0,
                    span.1,
                ))
            }
            ParseKind::UnaryOp { op, operand } => {
                let operand = self.visit(operand);
                link(&Node::new(
                    NodeKind::UnaryOp { op: *op, operand },
                    span.0,
                    span.1,
                ))
            }
            ParseKind::Compare { left, ops } => {
                let left = self.visit(left);
                let ops = ops
                    .iter()
                    .map(|(op, operand)| (*op, self.visit(operand)))
                    .collect();
                link(&Node::new(
                    NodeKind::Compare { left, ops },
                    span.0,
                    span.1,
                ))
            }
            ParseKind::Call {
                func,
                args,
                keywords,
                starargs,
                kwargs,
            } => {
                let func = self.with_ctx(AssContext::None, |s| s.visit(func));
                let args = args.iter().map(|a| self.visit(a)).collect();
                let keywords: IndexMap<String, NRef> = keywords
                    .iter()
                    .map(|(name, value)| (name.clone(), self.visit(value)))
                    .collect();
                let starargs = starargs.as_deref().map(|n| self.visit(n));
                let kwargs = kwargs.as_deref().map(|n| self.visit(n));
                link(&Node::new(
                    NodeKind::Call {
                        func,
                        args,
                        keywords,
                        starargs,
                        kwargs,
                    },
                    span.0,
                    span.1,
                ))
            }
            ParseKind::IfExp { test, body, orelse } => {
                let test = self.visit(test);
                let body = self.visit(body);
                let orelse = self.visit(orelse);
                link(&Node::new(
                    NodeKind::IfExp { test, body, orelse },
                    span.0,
                    span.1,
                ))
            }

            ParseKind::If { branches, orelse } => self.visit_if(branches, orelse, span),
            ParseKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                let target = self.with_ctx(AssContext::Assign, |s| s.visit(target));
                let iter = self.with_ctx(AssContext::None, |s| s.visit(iter));
                let body = self.visit_stmts(body);
                let orelse = self.visit_stmts(orelse);
                link(&Node::new(
                    NodeKind::For {
                        target,
                        iter,
                        body,
                        orelse,
                    },
                    span.0,
                    span.1,
                ))
            }
            ParseKind::While { test, body, orelse } => {
                let test = self.visit(test);
                let body = self.visit_stmts(body);
                let orelse = self.visit_stmts(orelse);
                link(&Node::new(
                    NodeKind::While { test, body, orelse },
                    span.0,
                    span.1,
                ))
            }
            ParseKind::TryExcept {
                body,
                handlers,
                orelse,
            } => {
                let body = self.visit_stmts(body);
                let handlers = handlers.iter().map(|h| self.visit(h)).collect();
                let orelse = self.visit_stmts(orelse);
                link(&Node::new(
                    NodeKind::TryExcept {
                        body,
                        handlers,
                        orelse,
                    },
                    span.0,
                    span.1,
                ))
            }
            ParseKind::TryFinally { body, finalbody } => {
                let body = self.visit_stmts(body);
                let finalbody = self.visit_stmts(finalbody);
                link(&Node::new(
                    NodeKind::TryFinally { body, finalbody },
                    span.0,
                    span.1,
                ))
            }
            ParseKind::ExceptHandler { typ, name, body } => {
                let typ = typ.as_deref().map(|t| self.with_ctx(AssContext::None, |s| s.visit(t)));
                let name = name
                    .as_deref()
                    .map(|n| self.with_ctx(AssContext::Assign, |s| s.visit(n)));
                let body = self.visit_stmts(body);
                link(&Node::new(
                    NodeKind::ExceptHandler { typ, name, body },
                    span.0,
                    span.1,
                ))
            }
            ParseKind::With { expr, vars, body } => {
                let expr = self.with_ctx(AssContext::None, |s| s.visit(expr));
                let vars = vars
                    .as_deref()
                    .map(|v| self.with_ctx(AssContext::Assign, |s| s.visit(v)));
                let body = self.visit_stmts(body);
                link(&Node::new(
                    NodeKind::With { expr, vars, body },
                    span.0,
                    span.1,
                ))
            }
            ParseKind::Raise { exc, inst, tback } => {
                let exc = exc.as_deref().map(|n| self.visit(n));
                let inst = inst.as_deref().map(|n| self.visit(n));
                let tback = tback.as_deref().map(|n| self.visit(n));
                link(&Node::new(
                    NodeKind::Raise { exc, inst, tback },
                    span.0,
                    span.1,
                ))
            }
            ParseKind::Return { value } => {
                let value = value.as_deref().map(|n| self.visit(n));
                link(&Node::new(NodeKind::Return { value }, span.0, span.1))
            }
            ParseKind::Yield { value } => {
                let value = value.as_deref().map(|n| self.visit(n));
                link(&Node::new(NodeKind::Yield { value }, span.0, span.1))
            }
            ParseKind::Global { names } => {
                if let Some(set) = self.global_names.last_mut() {
                    for name in names {
                        set.insert(name.clone());
                    }
                }
                Node::new(
                    NodeKind::Global {
                        names: names.clone(),
                    },
                    span.0,
                    span.1,
                )
            }
            ParseKind::Import { names } => self.visit_import(names, span),
            ParseKind::From {
                module,
                names,
                level,
            } => self.visit_from(module, names, *level, span),
            ParseKind::Discard { value } => {
                let value = self.with_ctx(AssContext::Discard, |s| s.visit(value));
                link(&Node::new(NodeKind::Discard { value }, span.0, span.1))
            }
            ParseKind::Assert { test, fail } => {
                let test = self.visit(test);
                let fail = fail.as_deref().map(|n| self.visit(n));
                link(&Node::new(NodeKind::Assert { test, fail }, span.0, span.1))
            }
            ParseKind::Pass => Node::new(NodeKind::Pass, span.0, span.1),
            ParseKind::Break => Node::new(NodeKind::Break, span.0, span.1),
            ParseKind::Continue => Node::new(NodeKind::Continue, span.0, span.1),
            ParseKind::Ellipsis => Node::new(NodeKind::Ellipsis, span.0, span.1),

            ParseKind::Dict { items } => {
                let items = items
                    .iter()
                    .map(|(k, v)| (self.visit(k), self.visit(v)))
                    .collect();
                link(&Node::new(NodeKind::Dict { items }, span.0, span.1))
            }
            ParseKind::ListLit { elts } => {
                let elts = elts.iter().map(|e| self.visit(e)).collect();
                link(&Node::new(NodeKind::List { elts }, span.0, span.1))
            }
            ParseKind::TupleLit { elts } => {
                let elts = elts.iter().map(|e| self.visit(e)).collect();
                link(&Node::new(NodeKind::Tuple { elts }, span.0, span.1))
            }
            ParseKind::SetLit { elts } => {
                let elts = elts.iter().map(|e| self.visit(e)).collect();
                link(&Node::new(NodeKind::Set { elts }, span.0, span.1))
            }
            ParseKind::ListComp { elt, quals } => {
                let generators = quals.iter().map(|q| self.visit(q)).collect();
                let elt = self.visit(elt);
                link(&Node::new(
                    NodeKind::ListComp { elt, generators },
                    span.0,
                    span.1,
                ))
            }
            ParseKind::SetComp { elt, quals } => {
                let generators = quals.iter().map(|q| self.visit(q)).collect();
                let elt = self.visit(elt);
                link(&Node::new(
                    NodeKind::SetComp { elt, generators },
                    span.0,
                    span.1,
                ))
            }
            ParseKind::DictComp { key, value, quals } => {
                let generators = quals.iter().map(|q| self.visit(q)).collect();
                let key = self.visit(key);
                let value = self.visit(value);
                link(&Node::new(
                    NodeKind::DictComp {
                        key,
                        value,
                        generators,
                    },
                    span.0,
                    span.1,
                ))
            }
            ParseKind::GenExpr { elt, quals } => self.visit_genexpr(elt, quals, span),
            ParseKind::CompFor { target, iter, ifs } => {
                let target = self.with_ctx(AssContext::Assign, |s| s.visit(target));
                let iter = self.with_ctx(AssContext::None, |s| s.visit(iter));
                let ifs = self.with_ctx(AssContext::None, |s| {
                    ifs.iter().map(|cond| s.visit(cond)).collect()
                });
                link(&Node::new(
                    NodeKind::Comprehension { target, iter, ifs },
                    span.0,
                    span.1,
                ))
            }

            ParseKind::Subscript { value, subs, .. } => self.visit_subscript(value, subs, span),
            ParseKind::SliceObj { parts } => self.visit_sliceobj(parts, span),

            ParseKind::Unsupported { construct } => Node::new(
                NodeKind::Empty {
                    construct: Some(construct.clone()),
                },
                span.0,
                span.1,
            ),
        }
    }

    fn visit_stmts(&mut self, stmts: &[ParseNode]) -> Vec<NRef> {
        stmts.iter().map(|stmt| self.visit(stmt)).collect()
    }

    // ------------------------------------------------------------------
    // Bindings
    // ------------------------------------------------------------------

    fn visit_assname(&mut self, name: &str, span: (u32, u32)) -> NRef {
        if self.asscontext == AssContext::Del {
            let node = Node::new(
                NodeKind::DelName {
                    name: name.to_string(),
                },
                span.0,
                span.1,
            );
            // deletions join the binding history so lookups can see them
            self.register(name, &node);
            return node;
        }
        let node = Node::new(
            NodeKind::AssName {
                name: name.to_string(),
            },
            span.0,
            span.1,
        );
        self.register(name, &node);
        node
    }

    fn visit_assattr(&mut self, expr: &ParseNode, attrname: &str, span: (u32, u32)) -> NRef {
        let ctx = self.asscontext;
        let expr = self.with_ctx(AssContext::None, |s| s.visit(expr));
        if ctx == AssContext::Del {
            return link(&Node::new(
                NodeKind::DelAttr {
                    expr,
                    attrname: attrname.to_string(),
                },
                span.0,
                span.1,
            ));
        }
        let node = link(&Node::new(
            NodeKind::AssAttr {
                expr,
                attrname: attrname.to_string(),
            },
            span.0,
            span.1,
        ));
        if matches!(ctx, AssContext::Assign | AssContext::Aug) {
            self.delayed.push(Rc::clone(&node));
        }
        node
    }

    fn visit_assign(&mut self, targets: &[ParseNode], value: &ParseNode, span: (u32, u32)) -> NRef {
        let value = self.with_ctx(AssContext::None, |s| s.visit(value));
        let targets: Vec<NRef> =
            self.with_ctx(AssContext::Assign, |s| targets.iter().map(|t| s.visit(t)).collect());
        self.note_metaclass(&targets, &value);
        let node = link(&Node::new(
            NodeKind::Assign { targets, value },
            span.0,
            span.1,
        ));
        self.note_retro_decorator(&node);
        node
    }

    /// `__metaclass__ = type` in a class or module body switches the
    /// new-style flag for base-less classes defined below it.
    fn note_metaclass(&mut self, targets: &[NRef], value: &NRef) {
        let is_metaclass_target = targets
            .iter()
            .any(|t| matches!(&t.kind, NodeKind::AssName { name } if name == "__metaclass__"));
        if !is_metaclass_target {
            return;
        }
        let newstyle = matches!(
            &value.kind,
            NodeKind::Name { name } if name == "type" || name == "ABCMeta"
        ) || matches!(
            &value.kind,
            NodeKind::Getattr { attrname, .. } if attrname == "type" || attrname == "ABCMeta"
        );
        if let Some(flag) = self.metaclass.last_mut() {
            *flag = newstyle;
        }
    }

    /// The `name = classmethod(name)` / `name = staticmethod(name)`
    /// rewrapping pattern at class level: retro-fit the role and record
    /// the call next to the real decorators.
    fn note_retro_decorator(&mut self, assign: &NRef) {
        if self.scope().as_class().is_none() {
            return;
        }
        let NodeKind::Assign { value, .. } = &assign.kind else {
            return;
        };
        let NodeKind::Call { func, args, .. } = &value.kind else {
            return;
        };
        let NodeKind::Name { name: deco } = &func.kind else {
            return;
        };
        let role = match deco.as_str() {
            "classmethod" => FnRole::ClassMethod,
            "staticmethod" => FnRole::StaticMethod,
            _ => return,
        };
        let [arg] = args.as_slice() else {
            return;
        };
        let NodeKind::Name { name: wrapped } = &arg.kind else {
            return;
        };
        let Some(bindings) = self.scope().local_bindings(wrapped) else {
            return;
        };
        for binding in bindings {
            if let Some(fdata) = binding.as_function() {
                fdata.role.set(role);
                fdata.extra_decorators.borrow_mut().push(Rc::clone(value));
            }
        }
    }

    // ------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------

    fn visit_class(
        &mut self,
        name: &str,
        bases: &[ParseNode],
        doc: Option<&str>,
        body: &[ParseNode],
        span: (u32, u32),
    ) -> NRef {
        let bases: Vec<NRef> =
            self.with_ctx(AssContext::None, |s| bases.iter().map(|b| s.visit(b)).collect());
        let has_bases = !bases.is_empty();
        let class = Node::new(
            NodeKind::Class(ClassData {
                name: name.to_string(),
                doc: doc.map(str::to_string),
                bases,
                body: RefCell::new(Vec::new()),
                locals: RefCell::new(Locals::default()),
                instance_attrs: RefCell::new(Locals::default()),
                kind: OnceCell::new(),
                newstyle: OnceCell::new(),
            }),
            span.0,
            span.1,
        );
        link(&class);
        self.register(name, &class);

        self.scopes.push(Rc::clone(&class));
        let inherited = self.metaclass.last().copied().unwrap_or(false);
        self.metaclass.push(inherited);
        for stmt in body {
            let child = self.visit(stmt);
            attach(&class, &child);
            class.widen_to(&child);
            if let Some(data) = class.as_class() {
                data.body.borrow_mut().push(child);
            }
        }
        let in_force = self.metaclass.pop().unwrap_or(false);
        self.scopes.pop();

        // a base-less class takes its style from the metaclass in force
        if !has_bases {
            if let Some(data) = class.as_class() {
                let _ = data.newstyle.set(in_force);
            }
        }
        class
    }

    fn visit_function(
        &mut self,
        name: &str,
        args: &ArgDecl,
        decorators: &[ParseNode],
        doc: Option<&str>,
        body: &[ParseNode],
        span: (u32, u32),
    ) -> NRef {
        let deco_node = if decorators.is_empty() {
            None
        } else {
            let nodes: Vec<NRef> = self
                .with_ctx(AssContext::None, |s| decorators.iter().map(|d| s.visit(d)).collect());
            Some(link(&Node::new(
                NodeKind::Decorators { nodes },
                span.0,
                span.1,
            )))
        };

        let in_class = self.scope().as_class().is_some();
        let mut role = if in_class {
            FnRole::Method
        } else {
            FnRole::Function
        };
        if let Some(decos) = &deco_node {
            if let NodeKind::Decorators { nodes } = &decos.kind {
                for deco in nodes {
                    match deco_trailing_name(deco) {
                        Some("classmethod") => role = FnRole::ClassMethod,
                        Some("staticmethod") => role = FnRole::StaticMethod,
                        _ => {}
                    }
                }
            }
        }
        if in_class && name == "__new__" {
            role = FnRole::ClassMethod;
        }

        let func = Node::new(
            NodeKind::Function(FunctionData {
                name: name.to_string(),
                doc: doc.map(str::to_string),
                role: Cell::new(role),
                decorators: RefCell::new(None),
                args: RefCell::new(None),
                body: RefCell::new(Vec::new()),
                locals: RefCell::new(Locals::default()),
                extra_decorators: RefCell::new(Vec::new()),
                decorator_names: OnceCell::new(),
            }),
            span.0,
            span.1,
        );
        self.register(name, &func);
        if let Some(decos) = deco_node {
            attach(&func, &decos);
            if let Some(data) = func.as_function() {
                *data.decorators.borrow_mut() = Some(decos);
            }
        }

        self.scopes.push(Rc::clone(&func));
        self.global_names.push(HashSet::new());
        let args_node = self.visit_arguments(args, &func, span);
        if let Some(data) = func.as_function() {
            *data.args.borrow_mut() = Some(args_node);
        }
        for stmt in body {
            let child = self.visit(stmt);
            attach(&func, &child);
            func.widen_to(&child);
            if let Some(data) = func.as_function() {
                data.body.borrow_mut().push(child);
            }
        }
        self.global_names.pop();
        self.scopes.pop();
        func
    }

    fn visit_lambda(&mut self, args: &ArgDecl, body: &ParseNode, span: (u32, u32)) -> NRef {
        let lambda = Node::new(
            NodeKind::Lambda(LambdaData {
                args: RefCell::new(None),
                body: RefCell::new(None),
                locals: RefCell::new(Locals::default()),
            }),
            span.0,
            span.1,
        );
        self.scopes.push(Rc::clone(&lambda));
        self.global_names.push(HashSet::new());
        let args_node = self.visit_arguments(args, &lambda, span);
        let body = self.with_ctx(AssContext::None, |s| s.visit(body));
        attach(&lambda, &body);
        lambda.widen_to(&body);
        if let NodeKind::Lambda(data) = &lambda.kind {
            *data.args.borrow_mut() = Some(args_node);
            *data.body.borrow_mut() = Some(body);
        }
        self.global_names.pop();
        self.scopes.pop();
        lambda
    }

    fn visit_genexpr(&mut self, elt: &ParseNode, quals: &[ParseNode], span: (u32, u32)) -> NRef {
        let genexpr = Node::new(
            NodeKind::GenExpr(GenExprData {
                elt: RefCell::new(None),
                generators: RefCell::new(Vec::new()),
                locals: RefCell::new(Locals::default()),
            }),
            span.0,
            span.1,
        );
        self.scopes.push(Rc::clone(&genexpr));
        for qual in quals {
            let generator = self.visit(qual);
            attach(&genexpr, &generator);
            genexpr.widen_to(&generator);
            if let NodeKind::GenExpr(data) = &genexpr.kind {
                data.generators.borrow_mut().push(generator);
            }
        }
        let elt = self.with_ctx(AssContext::None, |s| s.visit(elt));
        attach(&genexpr, &elt);
        genexpr.widen_to(&elt);
        if let NodeKind::GenExpr(data) = &genexpr.kind {
            *data.elt.borrow_mut() = Some(elt);
        }
        self.scopes.pop();
        genexpr
    }

    /// Build the argument list of a function or lambda, registering
    /// every declared name (including nested destructuring tuples) in
    /// the just-opened scope.
    fn visit_arguments(&mut self, decl: &ArgDecl, func: &NRef, span: (u32, u32)) -> NRef {
        let defaults: Vec<NRef> = self
            .with_ctx(AssContext::None, |s| decl.defaults.iter().map(|d| s.visit(d)).collect());
        let args: Vec<NRef> = decl.args.iter().map(|pat| self.arg_node(pat, span)).collect();
        let node = link(&Node::new(
            NodeKind::Arguments {
                args,
                defaults,
                vararg: decl.vararg.clone(),
                kwarg: decl.kwarg.clone(),
            },
            span.0,
            span.1,
        ));
        if let Some(vararg) = &decl.vararg {
            func.set_local(vararg, &node);
        }
        if let Some(kwarg) = &decl.kwarg {
            func.set_local(kwarg, &node);
        }
        attach(func, &node);
        node
    }

    fn arg_node(&mut self, pat: &ArgPat, span: (u32, u32)) -> NRef {
        match pat {
            ArgPat::Name(name) => {
                let node = Node::new(
                    NodeKind::AssName { name: name.clone() },
                    span.0,
                    span.1,
                );
                self.register(name, &node);
                node
            }
            ArgPat::Tuple(parts) => {
                let elts = parts.iter().map(|part| self.arg_node(part, span)).collect();
                link(&Node::new(NodeKind::Tuple { elts }, span.0, span.1))
            }
        }
    }

    // ------------------------------------------------------------------
    // Normalizations
    // ------------------------------------------------------------------

    /// Same-operator n-ary bitwise groups become a left-leaning binary
    /// tree: the init sublist is packed into a synthesized group and
    /// visited as if it were original input.
    fn visit_bitgroup(&mut self, op: BinOpKind, operands: &[ParseNode], span: (u32, u32)) -> NRef {
        match operands {
            [] => Node::new(
                NodeKind::Empty {
                    construct: Some("BitGroup".to_string()),
                },
                span.0,
                span.1,
            ),
            [only] => self.visit(only),
            [init @ .., last] => {
                let left = if init.len() == 1 {
                    self.visit(&init[0])
                } else {
                    let group = ParseNode::new(
                        ParseKind::BitGroup {
                            op,
                            operands: init.to_vec(),
                        },
                        span.0,
                        span.1,
                    );
                    self.visit(&group)
                };
                let right = self.visit(last);
                link(&Node::new(
                    NodeKind::BinOp { op, left, right },
                    span.0,
                    span.1,
                ))
            }
        }
    }

    /// Multi-branch conditionals become a singly-linked chain: each
    /// `elif` is its own node in the previous link's else sequence,
    /// spanned by its own test.
    fn visit_if(
        &mut self,
        branches: &[(ParseNode, Vec<ParseNode>)],
        orelse: &[ParseNode],
        span: (u32, u32),
    ) -> NRef {
        if branches.is_empty() {
            return Node::new(
                NodeKind::Empty {
                    construct: Some("If".to_string()),
                },
                span.0,
                span.1,
            );
        }
        let mut tail = self.visit_stmts(orelse);
        for (index, (test, body)) in branches.iter().enumerate().rev() {
            let lineno = if index == 0 { span.0 } else { test.lineno };
            let test = self.visit(test);
            let body = self.visit_stmts(body);
            let node = link(&Node::new(
                NodeKind::If {
                    test,
                    body,
                    orelse: RefCell::new(tail),
                },
                lineno,
                lineno,
            ));
            tail = vec![node];
        }
        tail.pop().expect("conditional chain cannot be empty")
    }

    /// Unify raw subscript entries into Index / Slice / ExtSlice.
    fn visit_subscript(&mut self, value: &ParseNode, subs: &[ParseNode], span: (u32, u32)) -> NRef {
        let value = self.with_ctx(AssContext::None, |s| s.visit(value));
        let slice = self.with_ctx(AssContext::None, |s| match subs {
            [] => Node::new(
                NodeKind::Empty {
                    construct: Some("Subscript".to_string()),
                },
                span.0,
                span.1,
            ),
            [ParseNode {
                kind: ParseKind::SliceObj { parts },
                ..
            }] => s.visit_sliceobj(parts, span),
            [single] => {
                let index = s.visit(single);
                link(&Node::new(NodeKind::Index { value: index }, span.0, span.1))
            }
            many => {
                let dims = many
                    .iter()
                    .map(|dim| match &dim.kind {
                        ParseKind::SliceObj { parts } => s.visit_sliceobj(parts, span),
                        _ => {
                            let index = s.visit(dim);
                            link(&Node::new(
                                NodeKind::Index { value: index },
                                span.0,
                                span.1,
                            ))
                        }
                    })
                    .collect();
                link(&Node::new(NodeKind::ExtSlice { dims }, span.0, span.1))
            }
        });
        link(&Node::new(
            NodeKind::Subscript { value, slice },
            span.0,
            span.1,
        ))
    }

    /// A two-part slice form has no step slot at all; three parts keep
    /// their positions, absent ones stay empty.
    fn visit_sliceobj(&mut self, parts: &[Option<ParseNode>], span: (u32, u32)) -> NRef {
        let lower = parts.first().and_then(Option::as_ref).map(|p| self.visit(p));
        let upper = parts.get(1).and_then(Option::as_ref).map(|p| self.visit(p));
        let step = parts.get(2).and_then(Option::as_ref).map(|p| self.visit(p));
        link(&Node::new(
            NodeKind::Slice { lower, upper, step },
            span.0,
            span.1,
        ))
    }

    // ------------------------------------------------------------------
    // Imports
    // ------------------------------------------------------------------

    fn visit_import(&mut self, names: &[(String, Option<String>)], span: (u32, u32)) -> NRef {
        let node = Node::new(
            NodeKind::Import {
                names: names.to_vec(),
            },
            span.0,
            span.1,
        );
        for (name, asname) in names {
            let bound = asname
                .as_deref()
                .unwrap_or_else(|| name.split('.').next().unwrap_or(name));
            self.register(bound, &node);
        }
        node
    }

    fn visit_from(
        &mut self,
        module: &str,
        names: &[(String, Option<String>)],
        level: u32,
        span: (u32, u32),
    ) -> NRef {
        let node = Node::new(
            NodeKind::From {
                module: module.to_string(),
                names: names.to_vec(),
                level,
            },
            span.0,
            span.1,
        );
        for (name, asname) in names {
            if name == "*" {
                for expanded in self.expand_wildcard(module, level) {
                    self.register(&expanded, &node);
                }
                continue;
            }
            self.register(asname.as_deref().unwrap_or(name), &node);
        }
        node
    }

    /// Names a wildcard import introduces. Needs the resolver; any
    /// failure is logged and skipped, never fatal.
    fn expand_wildcard(&mut self, module: &str, level: u32) -> Vec<String> {
        let Some(root) = self.scopes.first().cloned() else {
            return Vec::new();
        };
        let Some(resolver) = self.resolver.as_deref_mut() else {
            debug!(%module, "wildcard import met without a resolver, names skipped");
            return Vec::new();
        };
        match scoped::import_module(&root, module, false, level, resolver) {
            Ok(imported) => scoped::wildcard_import_names(&imported),
            Err(err) => {
                debug!(%module, error = %err, "wildcard import expansion failed, names skipped");
                Vec::new()
            }
        }
    }

    // ------------------------------------------------------------------
    // Deferred Attribute Assignments
    // ------------------------------------------------------------------

    /// Drain the deferred queue: infer each receiver and record the
    /// assignment on every candidate owner. Constructor assignments go
    /// to the front of the binding sequence unless one already leads
    /// it; a node already recorded is not re-added; assignments whose
    /// receiver cannot be inferred are skipped.
    fn resolve_delayed(&mut self) {
        let delayed = std::mem::take(&mut self.delayed);
        for node in delayed {
            let NodeKind::AssAttr { expr, attrname } = &node.kind else {
                continue;
            };
            let values = {
                let mut ctx = InferCtx::new();
                ctx.resolver = self.resolver.as_deref_mut().map(|r| r as &mut dyn Resolve);
                match infer(expr, &mut ctx) {
                    Ok(values) => values,
                    Err(err) => {
                        debug!(%attrname, error = %err, "deferred receiver not inferable, skipped");
                        continue;
                    }
                }
            };
            for value in values {
                match value {
                    Value::Instance(class) => {
                        if let Some(data) = class.as_class() {
                            record_binding(
                                &mut data.instance_attrs.borrow_mut(),
                                attrname,
                                &node,
                            );
                        }
                    }
                    Value::Node(owner) if owner.is_scope() => {
                        if let Some(mut locals) = owner.locals_mut() {
                            record_binding(&mut locals, attrname, &node);
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

impl Default for TreeRebuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Free Helpers
// ============================================================================

/// Set the parent link on every stored child and widen the span over
/// them. Called once per non-scope node, right after construction.
fn link(node: &NRef) -> NRef {
    for_each_child(node, &mut |child| {
        child.set_parent(node);
        node.widen_to(child);
    });
    Rc::clone(node)
}

fn flags_delete(kind: &ParseKind) -> bool {
    matches!(
        kind,
        ParseKind::AssName { delete: true, .. }
            | ParseKind::AssAttr { delete: true, .. }
            | ParseKind::AssSeq { delete: true, .. }
            | ParseKind::Subscript { delete: true, .. }
    )
}

/// The rightmost identifier of a decorator expression.
fn deco_trailing_name(deco: &NRef) -> Option<&str> {
    match &deco.kind {
        NodeKind::Name { name } => Some(name),
        NodeKind::Getattr { attrname, .. } => Some(attrname),
        NodeKind::Call { func, .. } => deco_trailing_name(func),
        _ => None,
    }
}

fn binds_in_constructor(node: &NRef) -> bool {
    node.frame()
        .as_function()
        .map(|data| data.name == "__init__")
        .unwrap_or(false)
}

fn record_binding(table: &mut Locals, attrname: &str, node: &NRef) {
    let entry = table.entry(attrname.to_string()).or_default();
    if entry.iter().any(|existing| Rc::ptr_eq(existing, node)) {
        return;
    }
    let ctor_leads = entry.first().map(binds_in_constructor).unwrap_or(false);
    if binds_in_constructor(node) && !entry.is_empty() && !ctor_leads {
        entry.insert(0, Rc::clone(node));
    } else {
        entry.push(Rc::clone(node));
    }
}

// ============================================================================
// Tests
// ============================================================================
