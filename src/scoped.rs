//! Operations on scope nodes: lookup, attribute access, hierarchy
//! traversal, call-result inference and class facts.
//!
//! Everything here is a free function dispatching on node kind. The
//! hierarchy walk ([`ancestors`]) is a genuinely lazy iterator: base
//! expressions are only inferred when the caller pulls, so an early
//! `find` over a deep hierarchy stops resolving as soon as it matches.
//! Cycles in the class hierarchy are truncated with a visited set keyed
//! on node pointers, never an error.

use std::collections::HashSet;
use std::rc::Rc;

use tracing::debug;

use crate::error::{BuildResult, InferResult, InferenceError, LookupResult, NotFoundError};
use crate::infer::{infer, infer_seq, InferCtx, Resolve, Value};
use crate::nodes::{
    for_each_child, ClassData, ClassKind, FnRole, ModuleData, NRef, Node, NodeExt, NodeKind,
};
use crate::parse::Literal;

// ============================================================================
// Binding Filters
// ============================================================================

/// Drop deletion nodes from a binding sequence. A name whose every
/// binding is a deletion is absent.
fn filtered(nodes: Vec<NRef>, name: &str) -> LookupResult<Vec<NRef>> {
    let kept: Vec<NRef> = nodes
        .into_iter()
        .filter(|node| {
            !matches!(
                node.kind,
                NodeKind::DelName { .. } | NodeKind::DelAttr { .. }
            )
        })
        .collect();
    if kept.is_empty() {
        Err(NotFoundError::new(name))
    } else {
        Ok(kept)
    }
}

// ============================================================================
// Local Definitions
// ============================================================================

/// The bindings `name` has in `scope` itself, per the scope's own
/// rules: modules add their implicit special names, classes fold in
/// ancestor bindings (nearest defining ancestor wins), functions and
/// the other scopes answer from their locals only.
pub fn local_defs(scope: &NRef, name: &str) -> LookupResult<Vec<NRef>> {
    match &scope.kind {
        NodeKind::Module(data) => {
            if let Some(nodes) = scope.local_bindings(name) {
                return filtered(nodes, name);
            }
            match module_special(data, name) {
                Some(special) => Ok(vec![special]),
                None => Err(NotFoundError::new(name)),
            }
        }
        NodeKind::Class(_) => {
            if let Some(nodes) = scope.local_bindings(name) {
                if let Ok(kept) = filtered(nodes, name) {
                    return Ok(kept);
                }
            }
            let mut ctx = InferCtx::new();
            let line: Vec<NRef> = ancestors(scope, true, &mut ctx).collect();
            for ancestor in line {
                if let Some(nodes) = ancestor.local_bindings(name) {
                    if let Ok(kept) = filtered(nodes, name) {
                        return Ok(kept);
                    }
                }
            }
            Err(NotFoundError::new(name))
        }
        NodeKind::Function(_) | NodeKind::Lambda(_) | NodeKind::GenExpr(_) => scope
            .local_bindings(name)
            .ok_or_else(|| NotFoundError::new(name))
            .and_then(|nodes| filtered(nodes, name)),
        _ => Err(NotFoundError::new(name)),
    }
}

/// Implicit module attributes, synthesized on demand.
fn module_special(data: &ModuleData, name: &str) -> Option<NRef> {
    let const_node = |value: Literal| Node::new(NodeKind::Const { value }, 0, 0);
    match name {
        "__name__" => Some(const_node(Literal::Str(data.name.clone()))),
        "__doc__" => Some(const_node(match &data.doc {
            Some(doc) => Literal::Str(doc.clone()),
            None => Literal::None,
        })),
        "__file__" => Some(const_node(match &*data.file.borrow() {
            Some(path) => Literal::Str(path.display().to_string()),
            None => Literal::None,
        })),
        "__dict__" => Some(Node::new(NodeKind::Dict { items: Vec::new() }, 0, 0)),
        "__path__" if data.package.get() => {
            Some(Node::new(NodeKind::List { elts: Vec::new() }, 0, 0))
        }
        _ => None,
    }
}

// ============================================================================
// Attribute Access
// ============================================================================

/// Look up attribute `name` on a scope node, without inference of the
/// results themselves (the hierarchy walk still infers base
/// expressions).
pub fn getattr(node: &NRef, name: &str, ctx: &mut InferCtx) -> LookupResult<Vec<NRef>> {
    match &node.kind {
        NodeKind::Module(data) => module_getattr(node, data, name, ctx),
        NodeKind::Class(_) => class_getattr(node, name, ctx),
        NodeKind::Function(fdata) => {
            if let Some(nodes) = node.local_bindings(name) {
                return filtered(nodes, name);
            }
            let const_node = |value: Literal| Node::new(NodeKind::Const { value }, 0, 0);
            match name {
                "__name__" => Ok(vec![const_node(Literal::Str(fdata.name.clone()))]),
                "__doc__" => Ok(vec![const_node(match &fdata.doc {
                    Some(doc) => Literal::Str(doc.clone()),
                    None => Literal::None,
                })]),
                "__dict__" => Ok(vec![Node::new(NodeKind::Dict { items: Vec::new() }, 0, 0)]),
                _ => Err(NotFoundError::new(name)),
            }
        }
        NodeKind::Lambda(_) | NodeKind::GenExpr(_) => node
            .local_bindings(name)
            .ok_or_else(|| NotFoundError::new(name))
            .and_then(|nodes| filtered(nodes, name)),
        _ => Err(NotFoundError::new(name)),
    }
}

fn module_getattr(
    module: &NRef,
    data: &ModuleData,
    name: &str,
    ctx: &mut InferCtx,
) -> LookupResult<Vec<NRef>> {
    if let Some(nodes) = module.local_bindings(name) {
        return filtered(nodes, name);
    }
    if let Some(special) = module_special(data, name) {
        return Ok(vec![special]);
    }
    // packages expose their submodules as attributes
    if data.package.get() {
        if let Some(resolver) = ctx.resolver.as_deref_mut() {
            let submodname = format!("{}.{name}", data.name);
            if let Ok(submodule) = resolver.resolve_module(&submodname) {
                return Ok(vec![submodule]);
            }
        }
    }
    Err(NotFoundError::new(name))
}

fn class_getattr(class: &NRef, name: &str, ctx: &mut InferCtx) -> LookupResult<Vec<NRef>> {
    if let Some(special) = class_special(class, name, ctx) {
        return Ok(vec![special]);
    }
    let mut values = class.local_bindings(name).unwrap_or_default();
    let line: Vec<NRef> = ancestors(class, true, ctx).collect();
    for ancestor in line {
        values.extend(ancestor.local_bindings(name).unwrap_or_default());
    }
    filtered(values, name)
}

/// Implicit class attributes, synthesized on demand.
fn class_special(class: &NRef, name: &str, ctx: &mut InferCtx) -> Option<NRef> {
    let data = class.as_class()?;
    let const_node = |value: Literal| Node::new(NodeKind::Const { value }, 0, 0);
    match name {
        "__name__" => Some(const_node(Literal::Str(data.name.clone()))),
        "__module__" => {
            let root = class.root();
            let modname = root.as_module().map(|m| m.name.clone()).unwrap_or_default();
            Some(const_node(Literal::Str(modname)))
        }
        "__doc__" => Some(const_node(match &data.doc {
            Some(doc) => Literal::Str(doc.clone()),
            None => Literal::None,
        })),
        "__dict__" => Some(Node::new(NodeKind::Dict { items: Vec::new() }, 0, 0)),
        "__bases__" => {
            let elts: Vec<NRef> = ancestors(class, false, ctx).collect();
            Some(Node::new(NodeKind::Tuple { elts }, 0, 0))
        }
        "__mro__" => {
            let mut elts = vec![Rc::clone(class)];
            elts.extend(ancestors(class, true, ctx));
            Some(Node::new(NodeKind::Tuple { elts }, 0, 0))
        }
        _ => None,
    }
}

/// Attribute lookup followed by one inference step per result.
///
/// On classes the step is descriptor- and method-aware: functions come
/// back as unbound or class-bound methods, and values that turn out to
/// be instances of a descriptor class (one defining `__get__`) give
/// [`Value::Unknown`] instead of a wrong static answer.
pub fn igetattr(node: &NRef, name: &str, ctx: &mut InferCtx) -> InferResult<Vec<Value>> {
    match &node.kind {
        NodeKind::Class(_) => class_igetattr(node, name, ctx),
        NodeKind::Module(_) | NodeKind::Function(_) | NodeKind::Lambda(_)
        | NodeKind::GenExpr(_) => {
            let nodes = getattr(node, name, ctx)?;
            infer_seq(&nodes, ctx, Some(name))
        }
        _ => Err(InferenceError::named(name)),
    }
}

fn class_igetattr(class: &NRef, name: &str, ctx: &mut InferCtx) -> InferResult<Vec<Value>> {
    let nodes = getattr(class, name, ctx)?;
    let receiver = Value::Node(Rc::clone(class));
    let mut out = Vec::new();
    for node in nodes {
        if node.as_function().is_some() {
            out.push(function_to_method(&node, &receiver));
            continue;
        }
        let Ok(values) = infer_seq(&[node], ctx, Some(name)) else {
            continue;
        };
        for value in values {
            if let Value::Instance(owner) = &value {
                if getattr(owner, "__get__", ctx).is_ok() {
                    out.push(Value::Unknown);
                    continue;
                }
            }
            out.push(value);
        }
    }
    if out.is_empty() {
        Err(InferenceError::named(name))
    } else {
        Ok(out)
    }
}

/// Attribute access through an instance of `class`: instance attributes
/// first, then class attributes with methods bound to the instance. A
/// miss on a class with a dynamic attribute hook (`__getattr__` or a
/// custom `__getattribute__`) answers [`Value::Unknown`] instead of
/// failing.
pub fn instance_igetattr(class: &NRef, name: &str, ctx: &mut InferCtx) -> InferResult<Vec<Value>> {
    let mut out = Vec::new();
    if let Ok(nodes) = instance_attr(class, name, ctx) {
        if let Ok(values) = infer_seq(&nodes, ctx, Some(name)) {
            out.extend(values);
        }
    }
    if out.is_empty() {
        if let Ok(nodes) = getattr(class, name, ctx) {
            let receiver = Value::Instance(Rc::clone(class));
            for node in nodes {
                if node.as_function().is_some() {
                    out.push(function_to_method(&node, &receiver));
                } else if let Ok(values) = infer_seq(&[node], ctx, Some(name)) {
                    out.extend(values);
                }
            }
        }
    }
    if out.is_empty() {
        if has_dynamic_getattr(class, ctx) {
            return Ok(vec![Value::Unknown]);
        }
        return Err(InferenceError::named(name));
    }
    Ok(out)
}

fn has_dynamic_getattr(class: &NRef, ctx: &mut InferCtx) -> bool {
    getattr(class, "__getattr__", ctx).is_ok() || getattr(class, "__getattribute__", ctx).is_ok()
}

/// Convert a function reached through a class or instance into the
/// value the access yields: classmethods bind to the class,
/// staticmethods stay plain functions, methods bind to an instance
/// receiver and stay unbound on class access.
pub fn function_to_method(func: &NRef, receiver: &Value) -> Value {
    let Some(data) = func.as_function() else {
        return Value::Node(Rc::clone(func));
    };
    match (data.role.get(), receiver) {
        (FnRole::StaticMethod, _) => Value::Node(Rc::clone(func)),
        (FnRole::ClassMethod, Value::Node(class)) | (FnRole::ClassMethod, Value::Instance(class)) => {
            Value::BoundMethod {
                func: Rc::clone(func),
                bound: Box::new(Value::Node(Rc::clone(class))),
            }
        }
        (_, Value::Instance(_)) => Value::BoundMethod {
            func: Rc::clone(func),
            bound: Box::new(receiver.clone()),
        },
        _ => Value::UnboundMethod(Rc::clone(func)),
    }
}

// ============================================================================
// Ancestor Traversal
// ============================================================================

enum Pending {
    /// A base expression still to be inferred.
    Expr(NRef),
    /// A resolved ancestor class awaiting the visited check.
    Class(NRef),
}

/// Lazy prefix depth-first walk over a class's ancestors.
///
/// Bases are inferred one at a time as the iterator is pulled;
/// candidates that are not classes are skipped, the class itself and
/// already-visited classes are skipped (which truncates hierarchy
/// cycles). With `recurs` false only direct bases are yielded.
pub struct Ancestors<'a, 'r> {
    start: NRef,
    recurs: bool,
    pending: Vec<Pending>,
    visited: HashSet<usize>,
    ctx: &'a mut InferCtx<'r>,
}

pub fn ancestors<'a, 'r>(class: &NRef, recurs: bool, ctx: &'a mut InferCtx<'r>) -> Ancestors<'a, 'r> {
    let mut pending = Vec::new();
    if let Some(data) = class.as_class() {
        for base in data.bases.iter().rev() {
            pending.push(Pending::Expr(Rc::clone(base)));
        }
    }
    Ancestors {
        start: Rc::clone(class),
        recurs,
        pending,
        visited: HashSet::new(),
        ctx,
    }
}

impl Iterator for Ancestors<'_, '_> {
    type Item = NRef;

    fn next(&mut self) -> Option<NRef> {
        loop {
            match self.pending.pop()? {
                Pending::Expr(expr) => {
                    let values = infer(&expr, self.ctx).unwrap_or_default();
                    // reversed push keeps candidate order on the stack
                    for value in values.into_iter().rev() {
                        if let Value::Node(node) = value {
                            if node.as_class().is_some() {
                                self.pending.push(Pending::Class(node));
                            }
                        }
                    }
                }
                Pending::Class(class) => {
                    if Rc::ptr_eq(&class, &self.start) {
                        continue;
                    }
                    if !self.visited.insert(Rc::as_ptr(&class) as usize) {
                        continue;
                    }
                    if self.recurs {
                        if let Some(data) = class.as_class() {
                            for base in data.bases.iter().rev() {
                                self.pending.push(Pending::Expr(Rc::clone(base)));
                            }
                        }
                    }
                    return Some(class);
                }
            }
        }
    }
}

/// Ancestors that define `name` in their locals, nearest first.
pub fn local_attr_ancestors(class: &NRef, name: &str, ctx: &mut InferCtx) -> Vec<NRef> {
    ancestors(class, true, ctx)
        .filter(|ancestor| ancestor.local_bindings(name).is_some())
        .collect()
}

/// Ancestors that record `name` as an instance attribute, nearest first.
pub fn instance_attr_ancestors(class: &NRef, name: &str, ctx: &mut InferCtx) -> Vec<NRef> {
    ancestors(class, true, ctx)
        .filter(|ancestor| {
            ancestor
                .as_class()
                .map(|data| data.instance_attrs.borrow().contains_key(name))
                .unwrap_or(false)
        })
        .collect()
}

/// Class-level bindings of `name`, from this class or the nearest
/// defining ancestor.
pub fn local_attr(class: &NRef, name: &str, ctx: &mut InferCtx) -> LookupResult<Vec<NRef>> {
    if let Some(nodes) = class.local_bindings(name) {
        if let Ok(kept) = filtered(nodes, name) {
            return Ok(kept);
        }
    }
    for ancestor in local_attr_ancestors(class, name, ctx) {
        let nodes = ancestor.local_bindings(name).unwrap_or_default();
        if let Ok(kept) = filtered(nodes, name) {
            return Ok(kept);
        }
    }
    Err(NotFoundError::new(name))
}

/// Instance-attribute bindings of `name`, own assignments first, then
/// every recording ancestor's in traversal order.
pub fn instance_attr(class: &NRef, name: &str, ctx: &mut InferCtx) -> LookupResult<Vec<NRef>> {
    let Some(data) = class.as_class() else {
        return Err(NotFoundError::new(name));
    };
    let mut values = data
        .instance_attrs
        .borrow()
        .get(name)
        .cloned()
        .unwrap_or_default();
    for ancestor in instance_attr_ancestors(class, name, ctx) {
        if let Some(anc_data) = ancestor.as_class() {
            values.extend(
                anc_data
                    .instance_attrs
                    .borrow()
                    .get(name)
                    .cloned()
                    .unwrap_or_default(),
            );
        }
    }
    filtered(values, name)
}

// ============================================================================
// Call Results
// ============================================================================

/// Infer what calling `callee` can produce.
///
/// A generator function yields a single [`Value::Generator`] marker.
/// Otherwise each return path contributes: [`Value::NoValue`] for bare
/// or absent returns, the inferred candidates (or [`Value::Unknown`])
/// for valued ones. Calling a class produces exactly one instance.
pub fn infer_call_result(callee: &NRef, ctx: &mut InferCtx) -> InferResult<Vec<Value>> {
    match &callee.kind {
        NodeKind::Class(_) => Ok(vec![Value::Instance(Rc::clone(callee))]),
        NodeKind::Lambda(data) => {
            let body = data.body.borrow().clone();
            match body {
                Some(expr) => infer(&expr, ctx),
                None => Ok(vec![Value::Unknown]),
            }
        }
        NodeKind::Function(_) => {
            if is_generator(callee) {
                return Ok(vec![Value::Generator(Rc::clone(callee))]);
            }
            let returns = collect_in_frame(callee, |node| {
                matches!(node.kind, NodeKind::Return { .. })
            });
            if returns.is_empty() {
                return Ok(vec![Value::NoValue]);
            }
            let mut out = Vec::new();
            for ret in returns {
                let NodeKind::Return { value } = &ret.kind else {
                    continue;
                };
                match value {
                    None => out.push(Value::NoValue),
                    Some(expr) => match infer(expr, ctx) {
                        Ok(values) => out.extend(values),
                        Err(_) => out.push(Value::Unknown),
                    },
                }
            }
            Ok(out)
        }
        _ => Err(InferenceError::new()),
    }
}

/// True when the function body holds a yield that belongs to its own
/// frame.
pub fn is_generator(func: &NRef) -> bool {
    !collect_in_frame(func, |node| matches!(node.kind, NodeKind::Yield { .. })).is_empty()
}

/// Collect matching descendants without crossing into nested frames or
/// generator-expression scopes.
fn collect_in_frame(frame: &NRef, pred: fn(&Node) -> bool) -> Vec<NRef> {
    fn walk(node: &Node, pred: fn(&Node) -> bool, out: &mut Vec<NRef>) {
        for_each_child(node, &mut |child| {
            if child.is_frame() || matches!(child.kind, NodeKind::GenExpr(_)) {
                return;
            }
            if pred(child) {
                out.push(Rc::clone(child));
            }
            walk(child, pred, out);
        });
    }
    let mut out = Vec::new();
    walk(frame, pred, &mut out);
    out
}

/// Whether a function body is abstract: empty, a lone `pass` (when
/// `pass_is_abstract`), or an immediate raise of `NotImplementedError`.
pub fn is_abstract(func: &NRef, pass_is_abstract: bool) -> bool {
    let Some(data) = func.as_function() else {
        return false;
    };
    let body = data.body.borrow();
    let Some(first) = body.first() else {
        return true;
    };
    match &first.kind {
        NodeKind::Raise { exc: Some(exc), .. } => {
            trailing_name(exc) == Some("NotImplementedError")
        }
        NodeKind::Pass => pass_is_abstract,
        _ => false,
    }
}

/// The rightmost identifier of a name, attribute or call chain.
fn trailing_name(node: &NRef) -> Option<&str> {
    match &node.kind {
        NodeKind::Name { name } => Some(name),
        NodeKind::Getattr { attrname, .. } => Some(attrname),
        NodeKind::Call { func, .. } => trailing_name(func),
        _ => None,
    }
}

// ============================================================================
// Class Facts
// ============================================================================

/// The class kind, memoized: name heuristics first, else the first
/// non-plain direct ancestor's kind.
pub fn kind(class: &NRef) -> ClassKind {
    let Some(data) = class.as_class() else {
        return ClassKind::Plain;
    };
    *data
        .kind
        .get_or_init(|| compute_kind(class, data, &mut HashSet::new()))
}

fn compute_kind(class: &NRef, data: &ClassData, visited: &mut HashSet<usize>) -> ClassKind {
    if !visited.insert(Rc::as_ptr(class) as usize) {
        return ClassKind::Plain;
    }
    if data.name == "type" {
        return ClassKind::Metaclass;
    }
    if data.name.ends_with("Interface") {
        return ClassKind::Interface;
    }
    if data.name.ends_with("Exception") {
        return ClassKind::Exception;
    }
    let mut ctx = InferCtx::new();
    let bases: Vec<NRef> = ancestors(class, false, &mut ctx).collect();
    for base in bases {
        let Some(base_data) = base.as_class() else {
            continue;
        };
        let base_kind = match base_data.kind.get() {
            Some(cached) => *cached,
            None => compute_kind(&base, base_data, visited),
        };
        if base_kind != ClassKind::Plain {
            return base_kind;
        }
    }
    ClassKind::Plain
}

/// Whether the class is new-style, memoized: set at rebuild time for
/// base-less classes from the metaclass declaration in force, inherited
/// from ancestors otherwise.
pub fn newstyle(class: &NRef) -> bool {
    let Some(data) = class.as_class() else {
        return false;
    };
    *data
        .newstyle
        .get_or_init(|| compute_newstyle(class, &mut HashSet::new()))
}

fn compute_newstyle(class: &NRef, visited: &mut HashSet<usize>) -> bool {
    if !visited.insert(Rc::as_ptr(class) as usize) {
        return false;
    }
    let Some(data) = class.as_class() else {
        return false;
    };
    if let Some(flag) = data.newstyle.get() {
        return *flag;
    }
    let mut ctx = InferCtx::new();
    let bases: Vec<NRef> = ancestors(class, false, &mut ctx).collect();
    bases.iter().any(|base| compute_newstyle(base, visited))
}

/// The qualified-ish names of a function's decorators, memoized. Covers
/// both real decorators and recorded `name = classmethod(name)`
/// rewrappings; inference sees through aliases where it can.
pub fn decorator_names(func: &NRef) -> Vec<String> {
    let Some(data) = func.as_function() else {
        return Vec::new();
    };
    data.decorator_names
        .get_or_init(|| {
            let mut names: Vec<String> = Vec::new();
            let mut note = |name: String, names: &mut Vec<String>| {
                if !names.contains(&name) {
                    names.push(name);
                }
            };
            let mut decos: Vec<NRef> = Vec::new();
            if let Some(decorators) = &*data.decorators.borrow() {
                if let NodeKind::Decorators { nodes } = &decorators.kind {
                    decos.extend(nodes.iter().cloned());
                }
            }
            for extra in data.extra_decorators.borrow().iter() {
                if let NodeKind::Call { func, .. } = &extra.kind {
                    decos.push(Rc::clone(func));
                }
            }
            for deco in decos {
                if let Some(name) = trailing_name(&deco) {
                    note(name.to_string(), &mut names);
                }
                let mut ctx = InferCtx::new();
                if let Ok(values) = infer(&deco, &mut ctx) {
                    for value in values {
                        if let Some(node) = value.node() {
                            if let Some(name) = node.name() {
                                note(name.to_string(), &mut names);
                            }
                        }
                    }
                }
            }
            names
        })
        .clone()
}

// ============================================================================
// Module Imports
// ============================================================================

/// The names a wildcard import of `module` introduces: the string
/// constants of its `__all__` when one is assigned, else every local
/// not starting with an underscore.
pub fn wildcard_import_names(module: &NRef) -> Vec<String> {
    if let Some(bindings) = module.local_bindings("__all__") {
        for binding in bindings.iter().rev() {
            let Some(parent) = binding.parent() else {
                continue;
            };
            let NodeKind::Assign { value, .. } = &parent.kind else {
                continue;
            };
            if let NodeKind::List { elts } | NodeKind::Tuple { elts } = &value.kind {
                return elts
                    .iter()
                    .filter_map(|elt| match &elt.kind {
                        NodeKind::Const {
                            value: Literal::Str(name),
                        } => Some(name.clone()),
                        _ => None,
                    })
                    .collect();
            }
        }
    }
    module
        .local_names()
        .into_iter()
        .filter(|name| !name.starts_with('_'))
        .collect()
}

/// Turn a possibly-relative module name into an absolute one, from the
/// perspective of `module`. Level 0 is treated as implicit-relative
/// (current package first); each additional level climbs one package.
pub fn absolute_modname(module: &NRef, modname: &str, level: u32) -> String {
    let Some(data) = module.as_module() else {
        return modname.to_string();
    };
    let mut parts: Vec<&str> = data.name.split('.').collect();
    if !data.package.get() {
        parts.pop();
    }
    for _ in 1..level.max(1) {
        parts.pop();
    }
    let prefix = parts.join(".");
    if modname.is_empty() {
        prefix
    } else if prefix.is_empty() {
        modname.to_string()
    } else {
        format!("{prefix}.{modname}")
    }
}

/// Resolve an import made from `module`: relative interpretation first,
/// absolute fallback unless `relative_only`.
pub fn import_module(
    module: &NRef,
    modname: &str,
    relative_only: bool,
    level: u32,
    resolver: &mut dyn Resolve,
) -> BuildResult<NRef> {
    let absolute = absolute_modname(module, modname, level);
    match resolver.resolve_module(&absolute) {
        Ok(imported) => Ok(imported),
        Err(err) if relative_only || level > 0 => Err(err),
        Err(err) => {
            debug!(%absolute, %modname, "relative resolution missed, trying absolute");
            let _ = err;
            resolver.resolve_module(modname)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{ArgDecl, ArgPat, ParseKind, ParseNode};
    use crate::rebuild::TreeRebuilder;

    fn module_of(body: Vec<ParseNode>) -> NRef {
        let tree = ParseNode::at(ParseKind::Module { doc: None, body }, 0);
        TreeRebuilder::new()
            .build(&tree, "m", None, false)
            .unwrap()
    }

    fn name(n: &str, lineno: u32) -> ParseNode {
        ParseNode::at(
            ParseKind::Name {
                name: n.to_string(),
            },
            lineno,
        )
    }

    fn class(n: &str, bases: Vec<ParseNode>, body: Vec<ParseNode>, lineno: u32) -> ParseNode {
        let body = if body.is_empty() {
            vec![ParseNode::at(ParseKind::Pass, lineno)]
        } else {
            body
        };
        ParseNode::at(
            ParseKind::Class {
                name: n.to_string(),
                bases,
                doc: None,
                body,
            },
            lineno,
        )
    }

    fn method(n: &str, body: Vec<ParseNode>, lineno: u32) -> ParseNode {
        ParseNode::at(
            ParseKind::Function {
                name: n.to_string(),
                args: ArgDecl {
                    args: vec![ArgPat::Name("self".to_string())],
                    ..ArgDecl::default()
                },
                decorators: vec![],
                doc: None,
                body,
            },
            lineno,
        )
    }

    fn assign(target: &str, value: ParseNode, lineno: u32) -> ParseNode {
        ParseNode::at(
            ParseKind::Assign {
                targets: vec![ParseNode::at(
                    ParseKind::AssName {
                        name: target.to_string(),
                        delete: false,
                    },
                    lineno,
                )],
                value: Box::new(value),
            },
            lineno,
        )
    }

    fn local(scope: &NRef, name: &str) -> NRef {
        scope.local_bindings(name).unwrap().remove(0)
    }

    fn hierarchy() -> NRef {
        // class Base: x = 1
        // class Mid(Base): pass
        // class Leaf(Mid, Base): pass
        module_of(vec![
            class(
                "Base",
                vec![],
                vec![assign(
                    "x",
                    ParseNode::at(
                        ParseKind::Const {
                            value: Literal::Int(1),
                        },
                        2,
                    ),
                    2,
                )],
                1,
            ),
            class("Mid", vec![name("Base", 3)], vec![], 3),
            class("Leaf", vec![name("Mid", 4), name("Base", 4)], vec![], 4),
        ])
    }

    #[test]
    fn test_ancestors_prefix_depth_first_with_dedup() {
        let module = hierarchy();
        let leaf = local(&module, "Leaf");
        let mut ctx = InferCtx::new();
        let line: Vec<String> = ancestors(&leaf, true, &mut ctx)
            .map(|a| a.name().unwrap().to_string())
            .collect();
        // Mid first, Base through Mid, the direct Base duplicate skipped
        assert_eq!(line, vec!["Mid", "Base"]);
    }

    #[test]
    fn test_ancestors_cycle_is_truncated() {
        // class A(B): pass / class B(A): pass
        let module = module_of(vec![
            class("A", vec![name("B", 1)], vec![], 1),
            class("B", vec![name("A", 2)], vec![], 2),
        ]);
        let a = local(&module, "A");
        let mut ctx = InferCtx::new();
        let line: Vec<String> = ancestors(&a, true, &mut ctx)
            .map(|node| node.name().unwrap().to_string())
            .collect();
        assert_eq!(line, vec!["B"]);
    }

    #[test]
    fn test_ancestors_nonrecursive_stops_at_direct_bases() {
        let module = hierarchy();
        let leaf = local(&module, "Leaf");
        let mut ctx = InferCtx::new();
        let line: Vec<String> = ancestors(&leaf, false, &mut ctx)
            .map(|node| node.name().unwrap().to_string())
            .collect();
        assert_eq!(line, vec!["Mid", "Base"]);
    }

    #[test]
    fn test_getattr_walks_ancestors() {
        let module = hierarchy();
        let leaf = local(&module, "Leaf");
        let mut ctx = InferCtx::new();
        let values = getattr(&leaf, "x", &mut ctx).unwrap();
        assert_eq!(values.len(), 1);
        assert!(matches!(values[0].kind, NodeKind::AssName { .. }));
    }

    #[test]
    fn test_getattr_miss_is_not_found() {
        let module = hierarchy();
        let leaf = local(&module, "Leaf");
        let mut ctx = InferCtx::new();
        assert!(getattr(&leaf, "nope", &mut ctx).is_err());
    }

    #[test]
    fn test_module_special_attributes() {
        let module = module_of(vec![]);
        let mut ctx = InferCtx::new();
        let values = getattr(&module, "__name__", &mut ctx).unwrap();
        assert!(matches!(
            &values[0].kind,
            NodeKind::Const { value: Literal::Str(s) } if s == "m"
        ));
        // not a package: no __path__
        assert!(getattr(&module, "__path__", &mut ctx).is_err());
    }

    #[test]
    fn test_deleted_binding_filtered_from_lookup() {
        // x = 1; del x
        let module = module_of(vec![
            assign(
                "x",
                ParseNode::at(
                    ParseKind::Const {
                        value: Literal::Int(1),
                    },
                    1,
                ),
                1,
            ),
            ParseNode::at(
                ParseKind::Delete {
                    targets: vec![ParseNode::at(
                        ParseKind::AssName {
                            name: "x".to_string(),
                            delete: true,
                        },
                        2,
                    )],
                },
                2,
            ),
        ]);
        // the deletion is recorded but filtered from definitions
        assert_eq!(module.local_bindings("x").unwrap().len(), 2);
        let defs = local_defs(&module, "x").unwrap();
        assert_eq!(defs.len(), 1);
        assert!(matches!(defs[0].kind, NodeKind::AssName { .. }));
    }

    #[test]
    fn test_class_igetattr_makes_unbound_methods() {
        let module = module_of(vec![class(
            "C",
            vec![],
            vec![method("m", vec![ParseNode::at(ParseKind::Pass, 3)], 2)],
            1,
        )]);
        let class_node = local(&module, "C");
        let mut ctx = InferCtx::new();
        let values = igetattr(&class_node, "m", &mut ctx).unwrap();
        assert!(matches!(values[0], Value::UnboundMethod(_)));
    }

    #[test]
    fn test_instance_igetattr_binds_methods() {
        let module = module_of(vec![class(
            "C",
            vec![],
            vec![method("m", vec![ParseNode::at(ParseKind::Pass, 3)], 2)],
            1,
        )]);
        let class_node = local(&module, "C");
        let mut ctx = InferCtx::new();
        let values = instance_igetattr(&class_node, "m", &mut ctx).unwrap();
        let Value::BoundMethod { bound, .. } = &values[0] else {
            panic!("expected a bound method");
        };
        assert!(matches!(**bound, Value::Instance(_)));
    }

    #[test]
    fn test_dynamic_getattr_hook_answers_unknown() {
        let module = module_of(vec![class(
            "C",
            vec![],
            vec![method(
                "__getattr__",
                vec![ParseNode::at(ParseKind::Pass, 3)],
                2,
            )],
            1,
        )]);
        let class_node = local(&module, "C");
        let mut ctx = InferCtx::new();
        let values = instance_igetattr(&class_node, "whatever", &mut ctx).unwrap();
        assert!(values[0].is_unknown());
    }

    #[test]
    fn test_generator_function_call_result() {
        let module = module_of(vec![ParseNode::at(
            ParseKind::Function {
                name: "gen".to_string(),
                args: ArgDecl::default(),
                decorators: vec![],
                doc: None,
                body: vec![ParseNode::at(
                    ParseKind::Discard {
                        value: Box::new(ParseNode::at(
                            ParseKind::Yield {
                                value: Some(Box::new(ParseNode::at(
                                    ParseKind::Const {
                                        value: Literal::Int(1),
                                    },
                                    2,
                                ))),
                            },
                            2,
                        )),
                    },
                    2,
                )],
            },
            1,
        )]);
        let func = local(&module, "gen");
        let mut ctx = InferCtx::new();
        let values = infer_call_result(&func, &mut ctx).unwrap();
        assert_eq!(values.len(), 1);
        assert!(matches!(values[0], Value::Generator(_)));
    }

    #[test]
    fn test_yield_in_nested_function_is_not_a_generator() {
        // def outer():
        //     def inner(): yield 1
        //     return 2
        let inner = ParseNode::at(
            ParseKind::Function {
                name: "inner".to_string(),
                args: ArgDecl::default(),
                decorators: vec![],
                doc: None,
                body: vec![ParseNode::at(
                    ParseKind::Discard {
                        value: Box::new(ParseNode::at(ParseKind::Yield { value: None }, 2)),
                    },
                    2,
                )],
            },
            2,
        );
        let module = module_of(vec![ParseNode::at(
            ParseKind::Function {
                name: "outer".to_string(),
                args: ArgDecl::default(),
                decorators: vec![],
                doc: None,
                body: vec![
                    inner,
                    ParseNode::at(
                        ParseKind::Return {
                            value: Some(Box::new(ParseNode::at(
                                ParseKind::Const {
                                    value: Literal::Int(2),
                                },
                                3,
                            ))),
                        },
                        3,
                    ),
                ],
            },
            1,
        )]);
        let outer = local(&module, "outer");
        assert!(!is_generator(&outer));
        let mut ctx = InferCtx::new();
        let values = infer_call_result(&outer, &mut ctx).unwrap();
        assert!(matches!(
            values[0],
            Value::Node(ref node) if matches!(node.kind, NodeKind::Const { .. })
        ));
    }

    #[test]
    fn test_function_without_returns_yields_no_value() {
        let module = module_of(vec![ParseNode::at(
            ParseKind::Function {
                name: "f".to_string(),
                args: ArgDecl::default(),
                decorators: vec![],
                doc: None,
                body: vec![ParseNode::at(ParseKind::Pass, 2)],
            },
            1,
        )]);
        let func = local(&module, "f");
        let mut ctx = InferCtx::new();
        let values = infer_call_result(&func, &mut ctx).unwrap();
        assert!(matches!(values[0], Value::NoValue));
    }

    #[test]
    fn test_is_abstract() {
        let raise = ParseNode::at(
            ParseKind::Raise {
                exc: Some(Box::new(name("NotImplementedError", 2))),
                inst: None,
                tback: None,
            },
            2,
        );
        let module = module_of(vec![
            ParseNode::at(
                ParseKind::Function {
                    name: "abstract".to_string(),
                    args: ArgDecl::default(),
                    decorators: vec![],
                    doc: None,
                    body: vec![raise],
                },
                1,
            ),
            ParseNode::at(
                ParseKind::Function {
                    name: "stub".to_string(),
                    args: ArgDecl::default(),
                    decorators: vec![],
                    doc: None,
                    body: vec![ParseNode::at(ParseKind::Pass, 4)],
                },
                3,
            ),
        ]);
        assert!(is_abstract(&local(&module, "abstract"), true));
        assert!(is_abstract(&local(&module, "stub"), true));
        assert!(!is_abstract(&local(&module, "stub"), false));
    }

    #[test]
    fn test_class_kind_heuristics_and_inheritance() {
        let module = module_of(vec![
            class("MyException", vec![], vec![], 1),
            class("Derived", vec![name("MyException", 2)], vec![], 2),
            class("Plain", vec![], vec![], 3),
        ]);
        assert_eq!(kind(&local(&module, "MyException")), ClassKind::Exception);
        assert_eq!(kind(&local(&module, "Derived")), ClassKind::Exception);
        assert_eq!(kind(&local(&module, "Plain")), ClassKind::Plain);
    }

    #[test]
    fn test_newstyle_is_inherited() {
        // __metaclass__ = type makes later base-less classes new-style
        let module = module_of(vec![
            assign("__metaclass__", name("type", 1), 1),
            class("A", vec![], vec![], 2),
            class("B", vec![name("A", 3)], vec![], 3),
        ]);
        assert!(newstyle(&local(&module, "A")));
        assert!(newstyle(&local(&module, "B")));
    }

    #[test]
    fn test_wildcard_names_respect_all() {
        let all_list = ParseNode::at(
            ParseKind::ListLit {
                elts: vec![ParseNode::at(
                    ParseKind::Const {
                        value: Literal::Str("visible".to_string()),
                    },
                    1,
                )],
            },
            1,
        );
        let module = module_of(vec![
            assign("__all__", all_list, 1),
            assign(
                "visible",
                ParseNode::at(
                    ParseKind::Const {
                        value: Literal::Int(1),
                    },
                    2,
                ),
                2,
            ),
            assign(
                "hidden",
                ParseNode::at(
                    ParseKind::Const {
                        value: Literal::Int(2),
                    },
                    3,
                ),
                3,
            ),
        ]);
        assert_eq!(wildcard_import_names(&module), vec!["visible"]);
    }

    #[test]
    fn test_wildcard_names_default_to_public_locals() {
        let module = module_of(vec![
            assign(
                "visible",
                ParseNode::at(
                    ParseKind::Const {
                        value: Literal::Int(1),
                    },
                    1,
                ),
                1,
            ),
            assign(
                "_private",
                ParseNode::at(
                    ParseKind::Const {
                        value: Literal::Int(2),
                    },
                    2,
                ),
                2,
            ),
        ]);
        assert_eq!(wildcard_import_names(&module), vec!["visible"]);
    }

    #[test]
    fn test_absolute_modname() {
        let tree = ParseNode::at(
            ParseKind::Module {
                doc: None,
                body: vec![],
            },
            0,
        );
        let module = TreeRebuilder::new()
            .build(&tree, "pkg.sub.mod", None, false)
            .unwrap();
        assert_eq!(absolute_modname(&module, "sibling", 0), "pkg.sub.sibling");
        assert_eq!(absolute_modname(&module, "sibling", 1), "pkg.sub.sibling");
        assert_eq!(absolute_modname(&module, "other", 2), "pkg.other");
        assert_eq!(absolute_modname(&module, "", 1), "pkg.sub");

        let pkg_tree = ParseNode::at(
            ParseKind::Module {
                doc: None,
                body: vec![],
            },
            0,
        );
        let package = TreeRebuilder::new()
            .build(&pkg_tree, "pkg.sub", None, true)
            .unwrap();
        assert_eq!(absolute_modname(&package, "child", 1), "pkg.sub.child");
    }
}
