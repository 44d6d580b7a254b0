//! Lazy multi-valued type inference.
//!
//! Inference answers "what can this expression evaluate to" with a
//! small set of [`Value`] candidates, computed on demand from the built
//! graph and never by executing anything. Three rules shape the engine:
//!
//! - inference is multi-valued: a name bound twice yields both
//!   candidates, callers narrow as they see fit;
//! - `Unknown` is a value, not an error: whenever the graph runs out of
//!   information the sentinel flows through and short-circuits further
//!   narrowing. [`crate::error::InferenceError`] is reserved for "no
//!   candidate at all";
//! - re-entrant queries are cut off: [`InferCtx`] tracks in-progress
//!   (node, name) pairs, and a query that reaches itself again
//!   contributes nothing instead of looping.

use std::collections::HashSet;
use std::rc::Rc;

use tracing::trace;

use crate::error::{BuildResult, InferResult, InferenceError, LookupResult, NotFoundError};
use crate::nodes::{FnRole, NRef, NodeExt, NodeKind};
use crate::scoped;

// ============================================================================
// Values
// ============================================================================

/// One inference candidate.
#[derive(Debug, Clone)]
pub enum Value {
    /// The expression evaluates to this graph node itself (a constant,
    /// a class object, a function object, a module, a container).
    Node(NRef),
    /// An instance of the given class node.
    Instance(NRef),
    /// A method bound to an instance or class.
    BoundMethod { func: NRef, bound: Box<Value> },
    /// A method accessed through its class, not yet bound.
    UnboundMethod(NRef),
    /// The generator produced by calling the given function.
    Generator(NRef),
    /// A call path that returns without a value.
    NoValue,
    /// The "no information" sentinel. Propagates, never fails.
    Unknown,
}

impl Value {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown)
    }

    /// The underlying graph node, for candidates that carry one.
    pub fn node(&self) -> Option<&NRef> {
        match self {
            Value::Node(node) | Value::Instance(node) => Some(node),
            Value::BoundMethod { func, .. }
            | Value::UnboundMethod(func)
            | Value::Generator(func) => Some(func),
            Value::NoValue | Value::Unknown => None,
        }
    }
}

// ============================================================================
// Resolution Hook
// ============================================================================

/// Cross-module resolution collaborator.
///
/// Inference and wildcard-import expansion reach other modules through
/// this seam; the driver in [`crate::builder`] implements it on top of
/// its module cache. Queries made without a resolver see imports as
/// [`Value::Unknown`].
pub trait Resolve {
    /// Return the graph of `modname`, building it if needed.
    fn resolve_module(&mut self, modname: &str) -> BuildResult<NRef>;

    /// Note a module whose body is about to be visited, so that cyclic
    /// resolution requests can be answered with the partial graph.
    fn register_partial(&mut self, _modname: &str, _module: &NRef) {}
}

// ============================================================================
// Inference Context
// ============================================================================

/// Per-query state threaded through one inference walk.
pub struct InferCtx<'r> {
    /// The name whose binding is being chased, when there is one.
    pub lookupname: Option<String>,
    /// Cross-module resolution hook.
    pub resolver: Option<&'r mut dyn Resolve>,
    path: HashSet<(usize, String)>,
}

impl<'r> InferCtx<'r> {
    pub fn new() -> Self {
        InferCtx {
            lookupname: None,
            resolver: None,
            path: HashSet::new(),
        }
    }

    pub fn with_resolver(resolver: &'r mut dyn Resolve) -> Self {
        InferCtx {
            lookupname: None,
            resolver: Some(resolver),
            path: HashSet::new(),
        }
    }

    /// Mark a (node, name) query as in progress. Returns false when the
    /// query is already on the path, i.e. inference reached itself.
    pub(crate) fn enter(&mut self, node: &NRef, name: &str) -> bool {
        self.path.insert((Rc::as_ptr(node) as usize, name.to_string()))
    }

    pub(crate) fn leave(&mut self, node: &NRef, name: &str) {
        self.path.remove(&(Rc::as_ptr(node) as usize, name.to_string()));
    }
}

impl Default for InferCtx<'_> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Scope Lookup
// ============================================================================

/// Resolve `name` from the scope enclosing `node` outwards.
///
/// Returns the defining scope and the ordered binding nodes. Class
/// bodies are opaque to the scopes they enclose: a class-level name is
/// visible inside the class body itself but not from methods defined
/// in it.
pub fn scope_lookup(node: &NRef, name: &str) -> LookupResult<(NRef, Vec<NRef>)> {
    let mut scope = Some(node.scope());
    let mut first = true;
    while let Some(current) = scope {
        let skip = !first && current.as_class().is_some();
        if !skip {
            if let Ok(defs) = scoped::local_defs(&current, name) {
                return Ok((current, defs));
            }
        }
        scope = current.parent().map(|parent| parent.scope());
        first = false;
    }
    Err(NotFoundError::new(name))
}

// ============================================================================
// Expression Inference
// ============================================================================

/// Infer the possible values of one expression node.
pub fn infer(node: &NRef, ctx: &mut InferCtx) -> InferResult<Vec<Value>> {
    match &node.kind {
        // Self-evaluating forms
        NodeKind::Const { .. }
        | NodeKind::Module(_)
        | NodeKind::Class(_)
        | NodeKind::Function(_)
        | NodeKind::Lambda(_)
        | NodeKind::GenExpr(_)
        | NodeKind::Dict { .. }
        | NodeKind::List { .. }
        | NodeKind::Tuple { .. }
        | NodeKind::Set { .. }
        | NodeKind::ListComp { .. }
        | NodeKind::SetComp { .. }
        | NodeKind::DictComp { .. }
        | NodeKind::Ellipsis => Ok(vec![Value::Node(Rc::clone(node))]),

        NodeKind::Name { name } => infer_name(node, name, ctx),
        NodeKind::AssName { name } => infer_assname(node, name, ctx),
        // attribute-binding nodes surface through instance_attrs
        NodeKind::AssAttr { attrname, .. } => {
            let attrname = attrname.clone();
            if !ctx.enter(node, &attrname) {
                return Err(InferenceError::named(attrname));
            }
            let result = assigned_value(node, ctx);
            ctx.leave(node, &attrname);
            result
        }
        NodeKind::Getattr { expr, attrname } => infer_getattr(node, expr, attrname, ctx),
        NodeKind::Call { func, .. } => infer_call(func, ctx),
        NodeKind::Import { .. } | NodeKind::From { .. } => infer_import(node, ctx),

        _ => Ok(vec![Value::Unknown]),
    }
}

/// Infer each binding statement of a multi-binding lookup result.
///
/// Individual failures are tolerated as long as something is inferred;
/// an all-failure (or empty) sequence is an inference failure.
pub fn infer_seq(
    stmts: &[NRef],
    ctx: &mut InferCtx,
    lookupname: Option<&str>,
) -> InferResult<Vec<Value>> {
    let saved = ctx.lookupname.take();
    let mut out = Vec::new();
    for stmt in stmts {
        if matches!(stmt.kind, NodeKind::Empty { .. }) {
            out.push(Value::Unknown);
            continue;
        }
        ctx.lookupname = lookupname.map(str::to_string);
        match infer(stmt, ctx) {
            Ok(values) => out.extend(values),
            Err(err) => trace!(error = %err, "binding statement not inferable"),
        }
    }
    ctx.lookupname = saved;
    if out.is_empty() {
        Err(match lookupname {
            Some(name) => InferenceError::named(name),
            None => InferenceError::new(),
        })
    } else {
        Ok(out)
    }
}

fn infer_name(node: &NRef, name: &str, ctx: &mut InferCtx) -> InferResult<Vec<Value>> {
    if !ctx.enter(node, name) {
        return Err(InferenceError::named(name));
    }
    let result = scope_lookup(node, name)
        .map_err(InferenceError::from)
        .and_then(|(_, stmts)| infer_seq(&stmts, ctx, Some(name)));
    ctx.leave(node, name);
    result
}

fn infer_assname(node: &NRef, name: &str, ctx: &mut InferCtx) -> InferResult<Vec<Value>> {
    if !ctx.enter(node, name) {
        return Err(InferenceError::named(name));
    }
    let result = assigned_value(node, ctx);
    ctx.leave(node, name);
    result
}

/// What a binding-position name was bound from.
fn assigned_value(node: &NRef, ctx: &mut InferCtx) -> InferResult<Vec<Value>> {
    let Some(parent) = node.parent() else {
        return Ok(vec![Value::Unknown]);
    };
    match &parent.kind {
        NodeKind::Assign { value, .. } => infer(value, ctx),
        NodeKind::Arguments { .. } => infer_argument(node, &parent, ctx),
        // Loop targets, destructuring, handler names, context managers:
        // multi-valued per iteration or runtime-shaped, so no claim.
        _ => Ok(vec![Value::Unknown]),
    }
}

/// The formal-parameter rule: the first parameter of a method is an
/// instance of the defining class, of a classmethod the class itself.
/// Other parameters fall back to their default expression when one is
/// declared.
fn infer_argument(assname: &NRef, args_node: &NRef, ctx: &mut InferCtx) -> InferResult<Vec<Value>> {
    let NodeKind::Arguments { args, defaults, .. } = &args_node.kind else {
        return Ok(vec![Value::Unknown]);
    };
    let Some(func) = args_node.parent() else {
        return Ok(vec![Value::Unknown]);
    };
    let pos = args.iter().position(|arg| Rc::ptr_eq(arg, assname));
    if let Some(fdata) = func.as_function() {
        if pos == Some(0) {
            if let Some(class) = class_frame(&func) {
                match fdata.role.get() {
                    FnRole::Method => return Ok(vec![Value::Instance(class)]),
                    FnRole::ClassMethod => return Ok(vec![Value::Node(class)]),
                    FnRole::StaticMethod | FnRole::Function => {}
                }
            }
        }
    }
    if let Some(pos) = pos {
        // defaults right-align with the declared parameters
        if let Some(skip) = args.len().checked_sub(defaults.len()) {
            if pos >= skip {
                return infer(&defaults[pos - skip], ctx);
            }
        }
    }
    Ok(vec![Value::Unknown])
}

fn class_frame(func: &NRef) -> Option<NRef> {
    let frame = func.parent()?.frame();
    frame.as_class().is_some().then(|| frame)
}

fn infer_getattr(
    node: &NRef,
    expr: &NRef,
    attrname: &str,
    ctx: &mut InferCtx,
) -> InferResult<Vec<Value>> {
    if !ctx.enter(node, attrname) {
        return Err(InferenceError::named(attrname));
    }
    let result = (|| {
        let owners = infer(expr, ctx)?;
        let mut out = Vec::new();
        for owner in owners {
            match owner {
                Value::Unknown => out.push(Value::Unknown),
                Value::Instance(class) => {
                    match scoped::instance_igetattr(&class, attrname, ctx) {
                        Ok(values) => out.extend(values),
                        Err(err) => trace!(%attrname, error = %err, "instance attribute not inferable"),
                    }
                }
                Value::Node(owner_node) if owner_node.is_scope() => {
                    match scoped::igetattr(&owner_node, attrname, ctx) {
                        Ok(values) => out.extend(values),
                        Err(err) => trace!(%attrname, error = %err, "attribute not inferable"),
                    }
                }
                _ => {}
            }
        }
        if out.is_empty() {
            Err(InferenceError::named(attrname))
        } else {
            Ok(out)
        }
    })();
    ctx.leave(node, attrname);
    result
}

fn infer_call(func: &NRef, ctx: &mut InferCtx) -> InferResult<Vec<Value>> {
    let callees = infer(func, ctx)?;
    let mut out = Vec::new();
    for callee in callees {
        match callee {
            Value::Unknown => out.push(Value::Unknown),
            Value::Node(node) => match &node.kind {
                NodeKind::Class(_) => out.push(Value::Instance(Rc::clone(&node))),
                NodeKind::Function(_) | NodeKind::Lambda(_) => {
                    match scoped::infer_call_result(&node, ctx) {
                        Ok(values) => out.extend(values),
                        Err(_) => out.push(Value::Unknown),
                    }
                }
                _ => {}
            },
            Value::BoundMethod { func, .. } | Value::UnboundMethod(func) => {
                match scoped::infer_call_result(&func, ctx) {
                    Ok(values) => out.extend(values),
                    Err(_) => out.push(Value::Unknown),
                }
            }
            _ => {}
        }
    }
    if out.is_empty() {
        Err(InferenceError::new())
    } else {
        Ok(out)
    }
}

/// Infer an import binding: resolve the module through the context's
/// resolver, then (for from-imports) the requested attribute on it.
/// Without a resolver the binding is [`Value::Unknown`].
fn infer_import(node: &NRef, ctx: &mut InferCtx) -> InferResult<Vec<Value>> {
    let Some(lookup) = ctx.lookupname.clone() else {
        return Err(InferenceError::new());
    };
    if ctx.resolver.is_none() {
        return Ok(vec![Value::Unknown]);
    }
    let root = node.root();
    match &node.kind {
        NodeKind::Import { names } => {
            for (name, asname) in names {
                let first = name.split('.').next().unwrap_or(name);
                let bound = asname.as_deref().unwrap_or(first);
                if bound != lookup {
                    continue;
                }
                // an aliased import binds the full dotted target,
                // a plain one only its first component
                let target = if asname.is_some() { name.as_str() } else { first };
                let resolver = ctx
                    .resolver
                    .as_deref_mut()
                    .ok_or_else(|| InferenceError::named(&lookup))?;
                let module = scoped::import_module(&root, target, false, 0, resolver)
                    .map_err(|_| InferenceError::named(&lookup))?;
                return Ok(vec![Value::Node(module)]);
            }
            Err(InferenceError::named(lookup))
        }
        NodeKind::From {
            module,
            names,
            level,
        } => {
            for (name, asname) in names {
                let bound = asname.as_deref().unwrap_or(name);
                if bound != lookup && name != "*" {
                    continue;
                }
                let attr = if name == "*" { lookup.as_str() } else { name.as_str() };
                let imported = {
                    let resolver = ctx
                        .resolver
                        .as_deref_mut()
                        .ok_or_else(|| InferenceError::named(&lookup))?;
                    scoped::import_module(&root, module, false, *level, resolver)
                        .map_err(|_| InferenceError::named(&lookup))?
                };
                return scoped::igetattr(&imported, attr, ctx);
            }
            Err(InferenceError::named(lookup))
        }
        _ => Err(InferenceError::new()),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{ArgDecl, ArgPat, Literal, ParseKind, ParseNode};
    use crate::rebuild::TreeRebuilder;

    fn module_of(body: Vec<ParseNode>) -> NRef {
        let tree = ParseNode::at(ParseKind::Module { doc: None, body }, 0);
        TreeRebuilder::new()
            .build(&tree, "m", None, false)
            .unwrap()
    }

    fn assign(name: &str, value: ParseNode, lineno: u32) -> ParseNode {
        ParseNode::at(
            ParseKind::Assign {
                targets: vec![ParseNode::at(
                    ParseKind::AssName {
                        name: name.to_string(),
                        delete: false,
                    },
                    lineno,
                )],
                value: Box::new(value),
            },
            lineno,
        )
    }

    fn int_const(n: i64, lineno: u32) -> ParseNode {
        ParseNode::at(
            ParseKind::Const {
                value: Literal::Int(n),
            },
            lineno,
        )
    }

    fn name(n: &str, lineno: u32) -> ParseNode {
        ParseNode::at(
            ParseKind::Name {
                name: n.to_string(),
            },
            lineno,
        )
    }

    fn first_local(module: &NRef, name: &str) -> NRef {
        module.local_bindings(name).unwrap().remove(0)
    }

    #[test]
    fn test_const_infers_to_itself() {
        let module = module_of(vec![assign("a", int_const(42, 1), 1)]);
        let binding = first_local(&module, "a");
        let values = infer(&binding, &mut InferCtx::new()).unwrap();
        assert_eq!(values.len(), 1);
        let Value::Node(node) = &values[0] else {
            panic!("expected a node candidate");
        };
        assert!(matches!(
            node.kind,
            NodeKind::Const {
                value: Literal::Int(42)
            }
        ));
    }

    #[test]
    fn test_rebinding_yields_both_candidates() {
        let module = module_of(vec![
            assign("a", int_const(1, 1), 1),
            assign("a", int_const(2, 2), 2),
        ]);
        let bindings = module.local_bindings("a").unwrap();
        let values = infer_seq(&bindings, &mut InferCtx::new(), Some("a")).unwrap();
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_name_chases_its_binding() {
        // a = 1; b = a
        let module = module_of(vec![
            assign("a", int_const(1, 1), 1),
            assign("b", name("a", 2), 2),
        ]);
        let binding = first_local(&module, "b");
        let values = infer(&binding, &mut InferCtx::new()).unwrap();
        assert!(matches!(
            values[0],
            Value::Node(ref node) if matches!(node.kind, NodeKind::Const { value: Literal::Int(1) })
        ));
    }

    #[test]
    fn test_self_reference_cycle_is_cut() {
        // a = a
        let module = module_of(vec![assign("a", name("a", 1), 1)]);
        let binding = first_local(&module, "a");
        // must terminate; with the only binding re-entrant, nothing is
        // inferred
        assert!(infer(&binding, &mut InferCtx::new()).is_err());
    }

    #[test]
    fn test_undefined_name_is_an_error_not_unknown() {
        let module = module_of(vec![assign("a", name("missing", 1), 1)]);
        let binding = first_local(&module, "a");
        assert!(infer(&binding, &mut InferCtx::new()).is_err());
    }

    #[test]
    fn test_unsupported_expression_is_unknown() {
        let module = module_of(vec![assign(
            "a",
            ParseNode::at(
                ParseKind::Unsupported {
                    construct: "Exec".to_string(),
                },
                1,
            ),
            1,
        )]);
        let binding = first_local(&module, "a");
        let values = infer(&binding, &mut InferCtx::new()).unwrap();
        assert!(values[0].is_unknown());
    }

    #[test]
    fn test_import_without_resolver_is_unknown() {
        let module = module_of(vec![ParseNode::at(
            ParseKind::Import {
                names: vec![("os".to_string(), None)],
            },
            1,
        )]);
        let bindings = module.local_bindings("os").unwrap();
        let values = infer_seq(&bindings, &mut InferCtx::new(), Some("os")).unwrap();
        assert!(values[0].is_unknown());
    }

    #[test]
    fn test_method_first_parameter_is_an_instance() {
        // class C:
        //     def m(self): return self
        let method = ParseNode::at(
            ParseKind::Function {
                name: "m".to_string(),
                args: ArgDecl {
                    args: vec![ArgPat::Name("self".to_string())],
                    ..ArgDecl::default()
                },
                decorators: vec![],
                doc: None,
                body: vec![ParseNode::at(
                    ParseKind::Return {
                        value: Some(Box::new(name("self", 2))),
                    },
                    2,
                )],
            },
            2,
        );
        let module = module_of(vec![ParseNode::at(
            ParseKind::Class {
                name: "C".to_string(),
                bases: vec![],
                doc: None,
                body: vec![method],
            },
            1,
        )]);
        let class = first_local(&module, "C");
        let func = class.local_bindings("m").unwrap().remove(0);
        let param = func.local_bindings("self").unwrap().remove(0);
        let values = infer(&param, &mut InferCtx::new()).unwrap();
        let Value::Instance(owner) = &values[0] else {
            panic!("expected an instance candidate");
        };
        assert!(Rc::ptr_eq(owner, &class));
    }

    #[test]
    fn test_default_value_reached_for_trailing_parameter() {
        // def f(a, b=3): ...
        let func = ParseNode::at(
            ParseKind::Function {
                name: "f".to_string(),
                args: ArgDecl {
                    args: vec![
                        ArgPat::Name("a".to_string()),
                        ArgPat::Name("b".to_string()),
                    ],
                    defaults: vec![int_const(3, 1)],
                    ..ArgDecl::default()
                },
                decorators: vec![],
                doc: None,
                body: vec![ParseNode::at(ParseKind::Pass, 2)],
            },
            1,
        );
        let module = module_of(vec![func]);
        let func = first_local(&module, "f");
        let param = func.local_bindings("b").unwrap().remove(0);
        let values = infer(&param, &mut InferCtx::new()).unwrap();
        assert!(matches!(
            values[0],
            Value::Node(ref node)
                if matches!(node.kind, NodeKind::Const { value: Literal::Int(3) })
        ));
    }

    #[test]
    fn test_calling_a_class_yields_one_instance() {
        let module = module_of(vec![
            ParseNode::at(
                ParseKind::Class {
                    name: "C".to_string(),
                    bases: vec![],
                    doc: None,
                    body: vec![ParseNode::at(ParseKind::Pass, 2)],
                },
                1,
            ),
            assign(
                "c",
                ParseNode::at(
                    ParseKind::Call {
                        func: Box::new(name("C", 3)),
                        args: vec![],
                        keywords: vec![],
                        starargs: None,
                        kwargs: None,
                    },
                    3,
                ),
                3,
            ),
        ]);
        let binding = first_local(&module, "c");
        let values = infer(&binding, &mut InferCtx::new()).unwrap();
        assert_eq!(values.len(), 1);
        let Value::Instance(class) = &values[0] else {
            panic!("expected an instance candidate");
        };
        assert!(Rc::ptr_eq(class, &first_local(&module, "C")));
    }

    #[test]
    fn test_class_level_names_invisible_to_methods() {
        // class C:
        //     x = 1
        //     def m(self): return x   # module lookup, not class
        let method = ParseNode::at(
            ParseKind::Function {
                name: "m".to_string(),
                args: ArgDecl {
                    args: vec![ArgPat::Name("self".to_string())],
                    ..ArgDecl::default()
                },
                decorators: vec![],
                doc: None,
                body: vec![ParseNode::at(
                    ParseKind::Return {
                        value: Some(Box::new(name("x", 3))),
                    },
                    3,
                )],
            },
            3,
        );
        let module = module_of(vec![ParseNode::at(
            ParseKind::Class {
                name: "C".to_string(),
                bases: vec![],
                doc: None,
                body: vec![assign("x", int_const(1, 2), 2), method],
            },
            1,
        )]);
        let class = first_local(&module, "C");
        let func = class.local_bindings("m").unwrap().remove(0);
        let NodeKind::Function(fdata) = &func.kind else {
            panic!("expected a function");
        };
        let body = fdata.body.borrow();
        let NodeKind::Return { value: Some(read) } = &body[0].kind else {
            panic!("expected a return");
        };
        assert!(scope_lookup(read, "x").is_err());
    }
}
