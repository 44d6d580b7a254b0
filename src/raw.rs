//! Partial-graph construction.
//!
//! Factories for graph nodes that do not come from a parse tree: the
//! reflection collaborator describes compiled or built-in modules as
//! flat member listings, and this module turns those into the same node
//! shapes the rebuilder produces, so lookup and inference work on them
//! unchanged. Such graphs are partial by construction: bodies are
//! empty, spans are zero and modules carry `pure_source = false`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use once_cell::unsync::OnceCell;

use crate::nodes::{
    ClassData, FnRole, FunctionData, Locals, ModuleData, NRef, Node, NodeKind,
};
use crate::parse::Literal;

// ============================================================================
// Scope Factories
// ============================================================================

/// A module node with no body, marked as not built from source.
pub fn build_module(name: &str, doc: Option<&str>) -> NRef {
    Node::new(
        NodeKind::Module(ModuleData {
            name: name.to_string(),
            doc: doc.map(str::to_string),
            file: RefCell::new(None),
            package: Cell::new(false),
            pure_source: Cell::new(false),
            body: RefCell::new(Vec::new()),
            locals: RefCell::new(Locals::default()),
        }),
        0,
        0,
    )
}

/// A class node whose bases are plain name references.
pub fn build_class(name: &str, basenames: &[&str], doc: Option<&str>) -> NRef {
    let bases: Vec<NRef> = basenames
        .iter()
        .map(|base| {
            Node::new(
                NodeKind::Name {
                    name: base.to_string(),
                },
                0,
                0,
            )
        })
        .collect();
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
        0,
        0,
    );
    if let Some(data) = class.as_class() {
        for base in &data.bases {
            base.set_parent(&class);
        }
    }
    class
}

/// A function node with the given positional argument names and an
/// empty body. Argument names are registered right away.
pub fn build_function(name: &str, argnames: &[&str], doc: Option<&str>) -> NRef {
    let func = Node::new(
        NodeKind::Function(FunctionData {
            name: name.to_string(),
            doc: doc.map(str::to_string),
            role: Cell::new(FnRole::Function),
            decorators: RefCell::new(None),
            args: RefCell::new(None),
            body: RefCell::new(Vec::new()),
            locals: RefCell::new(Locals::default()),
            extra_decorators: RefCell::new(Vec::new()),
            decorator_names: OnceCell::new(),
        }),
        0,
        0,
    );
    let args: Vec<NRef> = argnames
        .iter()
        .map(|arg| {
            Node::new(
                NodeKind::AssName {
                    name: arg.to_string(),
                },
                0,
                0,
            )
        })
        .collect();
    let args_node = Node::new(
        NodeKind::Arguments {
            args,
            defaults: Vec::new(),
            vararg: None,
            kwarg: None,
        },
        0,
        0,
    );
    if let NodeKind::Arguments { args, .. } = &args_node.kind {
        for arg in args {
            arg.set_parent(&args_node);
        }
    }
    args_node.set_parent(&func);
    if let Some(data) = func.as_function() {
        *data.args.borrow_mut() = Some(Rc::clone(&args_node));
    }
    register_arguments(&func);
    func
}

/// Register every declared argument name of `func` in its locals:
/// plain and destructured names bind to their own nodes, star names to
/// the argument list node.
pub fn register_arguments(func: &NRef) {
    let args_node = match &func.kind {
        NodeKind::Function(data) => data.args.borrow().clone(),
        NodeKind::Lambda(data) => data.args.borrow().clone(),
        _ => None,
    };
    let Some(args_node) = args_node else {
        return;
    };
    let NodeKind::Arguments {
        args,
        vararg,
        kwarg,
        ..
    } = &args_node.kind
    else {
        return;
    };
    for arg in args {
        register_pattern(func, arg);
    }
    if let Some(vararg) = vararg {
        func.set_local(vararg, &args_node);
    }
    if let Some(kwarg) = kwarg {
        func.set_local(kwarg, &args_node);
    }
}

fn register_pattern(func: &NRef, pattern: &NRef) {
    match &pattern.kind {
        NodeKind::AssName { name } => func.set_local(name, pattern),
        NodeKind::Tuple { elts } => {
            for elt in elts {
                register_pattern(func, elt);
            }
        }
        _ => {}
    }
}

// ============================================================================
// Member Attachment
// ============================================================================

/// Attach a named scope node (a class or function built above) as a
/// member of `owner`.
pub fn attach_node(owner: &NRef, node: &NRef) {
    node.set_parent(owner);
    match &owner.kind {
        NodeKind::Module(data) => data.body.borrow_mut().push(Rc::clone(node)),
        NodeKind::Class(data) => data.body.borrow_mut().push(Rc::clone(node)),
        _ => {}
    }
    if let Some(name) = node.name() {
        owner.set_local(name, node);
    }
}

/// Attach a constant member. The constant node itself is the binding,
/// so inference of the member yields the constant directly.
pub fn attach_const_node(owner: &NRef, name: &str, value: Literal) {
    let node = Node::new(NodeKind::Const { value }, 0, 0);
    node.set_parent(owner);
    owner.set_local(name, &node);
}

/// Attach a member nothing is known about.
pub fn attach_dummy_node(owner: &NRef, name: &str) {
    let node = Node::new(NodeKind::Empty { construct: None }, 0, 0);
    node.set_parent(owner);
    owner.set_local(name, &node);
}

/// Attach a `from modname import names` member binding each name.
pub fn attach_import_node(owner: &NRef, modname: &str, names: &[&str]) {
    let node = Node::new(
        NodeKind::From {
            module: modname.to_string(),
            names: names.iter().map(|n| (n.to_string(), None)).collect(),
            level: 0,
        },
        0,
        0,
    );
    node.set_parent(owner);
    for name in names {
        owner.set_local(name, &node);
    }
}

// ============================================================================
// Tests
// ============================================================================
