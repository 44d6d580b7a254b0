//! End-to-end properties of built module graphs, exercised through the
//! public API: JSON dumps in, graphs and inference answers out.

use std::collections::HashMap;
use std::rc::Rc;

use astgraph::builder::{GraphBuilder, ModuleSource, TreeSource};
use astgraph::error::{BuildError, BuildResult};
use astgraph::infer::{infer, InferCtx, Value};
use astgraph::nodes::{dump, NRef, NodeKind};
use astgraph::{frontend, scoped, text_build};

// ============================================================================
// Fixtures
// ============================================================================

/// In-memory tree source over JSON dump texts.
struct MapSource {
    trees: HashMap<String, String>,
}

impl MapSource {
    fn new(entries: &[(&str, &str)]) -> Self {
        MapSource {
            trees: entries
                .iter()
                .map(|(name, text)| (name.to_string(), text.to_string()))
                .collect(),
        }
    }
}

impl TreeSource for MapSource {
    fn load(&mut self, modname: &str) -> BuildResult<ModuleSource> {
        let text = self
            .trees
            .get(modname)
            .ok_or_else(|| BuildError::UnknownModule {
                name: modname.to_string(),
            })?;
        Ok(ModuleSource::new(frontend::parse_str(text)?))
    }
}

fn local(scope: &NRef, name: &str) -> NRef {
    scope
        .local_bindings(name)
        .unwrap_or_else(|| panic!("no binding for '{name}'"))
        .remove(0)
}

/// The demo program, as the legacy front end dumps it:
///
/// ```python
/// """demo"""
/// class Counter:
///     def __init__(self, start):
///         self.value = start
///     def bump(self, amount):
///         self.value = self.value + amount
///
/// def describe(c):
///     if c:
///         return c
///     elif c:
///         return c
///     else:
///         return None
/// ```
const DEMO_LEGACY: &str = r#"
{"class": "Module", "doc": "demo", "node": {"class": "Stmt", "nodes": [
  {"class": "Class", "name": "Counter", "lineno": 2, "bases": [], "doc": null,
   "code": {"class": "Stmt", "nodes": [
     {"class": "Function", "name": "__init__", "lineno": 3, "doc": null,
      "decorators": null, "argnames": ["self", "start"], "defaults": [],
      "varargs": 0, "kwargs": 0,
      "code": {"class": "Stmt", "nodes": [
        {"class": "Assign", "lineno": 4,
         "nodes": [{"class": "AssAttr", "lineno": 4, "flags": "OP_ASSIGN",
                    "attrname": "value",
                    "expr": {"class": "Name", "name": "self", "lineno": 4}}],
         "expr": {"class": "Name", "name": "start", "lineno": 4}}]}},
     {"class": "Function", "name": "bump", "lineno": 5, "doc": null,
      "decorators": null, "argnames": ["self", "amount"], "defaults": [],
      "varargs": 0, "kwargs": 0,
      "code": {"class": "Stmt", "nodes": [
        {"class": "Assign", "lineno": 6,
         "nodes": [{"class": "AssAttr", "lineno": 6, "flags": "OP_ASSIGN",
                    "attrname": "value",
                    "expr": {"class": "Name", "name": "self", "lineno": 6}}],
         "expr": {"class": "Add", "lineno": 6,
                  "left": {"class": "Getattr", "lineno": 6, "attrname": "value",
                           "expr": {"class": "Name", "name": "self", "lineno": 6}},
                  "right": {"class": "Name", "name": "amount", "lineno": 6}}}]}}]}},
  {"class": "Function", "name": "describe", "lineno": 8, "doc": null,
   "decorators": null, "argnames": ["c"], "defaults": [],
   "varargs": 0, "kwargs": 0,
   "code": {"class": "Stmt", "nodes": [
     {"class": "If", "lineno": 9, "tests": [
       [{"class": "Name", "name": "c", "lineno": 9},
        {"class": "Stmt", "nodes": [
          {"class": "Return", "lineno": 10,
           "value": {"class": "Name", "name": "c", "lineno": 10}}]}],
       [{"class": "Name", "name": "c", "lineno": 11},
        {"class": "Stmt", "nodes": [
          {"class": "Return", "lineno": 12,
           "value": {"class": "Name", "name": "c", "lineno": 12}}]}]],
      "else_": {"class": "Stmt", "nodes": [
        {"class": "Return", "lineno": 14,
         "value": {"class": "Name", "name": "None", "lineno": 14}}]}}]}}]}}
"#;

/// The same program as the modern front end dumps it: docstring as a
/// leading expression, binary addition, `elif` nested in `orelse`,
/// `None` as a typed constant.
const DEMO_MODERN: &str = r#"
{"_type": "Module", "body": [
  {"_type": "Expr", "lineno": 1,
   "value": {"_type": "Str", "s": "demo", "lineno": 1}},
  {"_type": "ClassDef", "name": "Counter", "lineno": 2, "bases": [], "body": [
    {"_type": "FunctionDef", "name": "__init__", "lineno": 3,
     "args": {"args": [{"_type": "arg", "arg": "self"},
                       {"_type": "arg", "arg": "start"}], "defaults": []},
     "body": [
       {"_type": "Assign", "lineno": 4,
        "targets": [{"_type": "Attribute", "lineno": 4, "attr": "value",
                     "ctx": {"_type": "Store"},
                     "value": {"_type": "Name", "id": "self", "lineno": 4,
                               "ctx": {"_type": "Load"}}}],
        "value": {"_type": "Name", "id": "start", "lineno": 4,
                  "ctx": {"_type": "Load"}}}]},
    {"_type": "FunctionDef", "name": "bump", "lineno": 5,
     "args": {"args": [{"_type": "arg", "arg": "self"},
                       {"_type": "arg", "arg": "amount"}], "defaults": []},
     "body": [
       {"_type": "Assign", "lineno": 6,
        "targets": [{"_type": "Attribute", "lineno": 6, "attr": "value",
                     "ctx": {"_type": "Store"},
                     "value": {"_type": "Name", "id": "self", "lineno": 6,
                               "ctx": {"_type": "Load"}}}],
        "value": {"_type": "BinOp", "lineno": 6, "op": {"_type": "Add"},
                  "left": {"_type": "Attribute", "lineno": 6, "attr": "value",
                           "ctx": {"_type": "Load"},
                           "value": {"_type": "Name", "id": "self", "lineno": 6,
                                     "ctx": {"_type": "Load"}}},
                  "right": {"_type": "Name", "id": "amount", "lineno": 6,
                            "ctx": {"_type": "Load"}}}}]}]},
  {"_type": "FunctionDef", "name": "describe", "lineno": 8,
   "args": {"args": [{"_type": "arg", "arg": "c"}], "defaults": []},
   "body": [
     {"_type": "If", "lineno": 9,
      "test": {"_type": "Name", "id": "c", "lineno": 9},
      "body": [{"_type": "Return", "lineno": 10,
                "value": {"_type": "Name", "id": "c", "lineno": 10}}],
      "orelse": [
        {"_type": "If", "lineno": 11,
         "test": {"_type": "Name", "id": "c", "lineno": 11},
         "body": [{"_type": "Return", "lineno": 12,
                   "value": {"_type": "Name", "id": "c", "lineno": 12}}],
         "orelse": [{"_type": "Return", "lineno": 14,
                     "value": {"_type": "NameConstant", "value": null,
                               "lineno": 14}}]}]}]}]}
"#;

// ============================================================================
// Dialect Equivalence
// ============================================================================

#[test]
fn test_both_dialects_build_the_same_graph() {
    let legacy = text_build(DEMO_LEGACY, "demo", None).unwrap();
    let modern = text_build(DEMO_MODERN, "demo", None).unwrap();
    assert_eq!(dump(&legacy), dump(&modern));
}

#[test]
fn test_demo_graph_shape() {
    let module = text_build(DEMO_MODERN, "demo", None).unwrap();
    assert_eq!(module.as_module().unwrap().doc.as_deref(), Some("demo"));
    assert_eq!(module.local_names(), vec!["Counter", "describe"]);

    let counter = local(&module, "Counter");
    assert_eq!(counter.local_names(), vec!["__init__", "bump"]);
    // both assignments through `self` landed in instance_attrs, the
    // constructor's first
    let attrs = counter.as_class().unwrap().instance_attrs.borrow();
    let entries = attrs.get("value").unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].lineno_from(), 4);
    assert_eq!(entries[1].lineno_from(), 6);

    // constant-name reads fold: the final return value is a constant
    let rendered = dump(&module);
    assert!(rendered.contains("Const None"));
    assert!(!rendered.contains("Name(None)"));
}

#[test]
fn test_instance_attribute_is_inferable() {
    let source = MapSource::new(&[("demo", DEMO_MODERN)]);
    let mut builder = GraphBuilder::new(source);
    let module = builder.module("demo").unwrap();
    let counter = local(&module, "Counter");

    let mut ctx = InferCtx::new();
    let values = scoped::instance_igetattr(&counter, "value", &mut ctx).unwrap();
    // one candidate per recorded assignment; the constructor's value is
    // a plain name bound to an argument, inferred as unknown
    assert_eq!(values.len(), 2);
}

// ============================================================================
// Cross-Module Properties
// ============================================================================

#[test]
fn test_import_cycle_terminates_and_stays_navigable() {
    let source = MapSource::new(&[
        (
            "alpha",
            r#"{"_type": "Module", "body": [
                {"_type": "Import", "lineno": 1,
                 "names": [{"name": "beta", "asname": null}]},
                {"_type": "Assign", "lineno": 2,
                 "targets": [{"_type": "Name", "id": "X",
                              "ctx": {"_type": "Store"}, "lineno": 2}],
                 "value": {"_type": "Num", "n": 1, "lineno": 2}}]}"#,
        ),
        (
            "beta",
            r#"{"_type": "Module", "body": [
                {"_type": "Import", "lineno": 1,
                 "names": [{"name": "alpha", "asname": null}]}]}"#,
        ),
    ]);
    let mut builder = GraphBuilder::new(source);
    let alpha = builder.module("alpha").unwrap();
    let beta = builder.cached("beta").unwrap();

    // beta's view of alpha is the very module node the builder returned
    let binding = local(&beta, "alpha");
    let mut ctx = InferCtx::new();
    ctx.lookupname = Some("alpha".to_string());
    ctx.resolver = Some(&mut builder);
    let values = infer(&binding, &mut ctx).unwrap();
    let Value::Node(resolved) = &values[0] else {
        panic!("expected a module candidate");
    };
    assert!(Rc::ptr_eq(resolved, &alpha));
}

#[test]
fn test_wildcard_import_respects_declared_exports() {
    let source = MapSource::new(&[
        (
            "exports",
            r#"{"class": "Module", "doc": null, "node": {"class": "Stmt", "nodes": [
                {"class": "Assign", "lineno": 1,
                 "nodes": [{"class": "AssName", "name": "__all__",
                            "flags": "OP_ASSIGN", "lineno": 1}],
                 "expr": {"class": "List", "lineno": 1,
                          "nodes": [{"class": "Const", "value": "visible", "lineno": 1}]}},
                {"class": "Assign", "lineno": 2,
                 "nodes": [{"class": "AssName", "name": "visible",
                            "flags": "OP_ASSIGN", "lineno": 2}],
                 "expr": {"class": "Const", "value": 1, "lineno": 2}},
                {"class": "Assign", "lineno": 3,
                 "nodes": [{"class": "AssName", "name": "hidden",
                            "flags": "OP_ASSIGN", "lineno": 3}],
                 "expr": {"class": "Const", "value": 2, "lineno": 3}}]}}"#,
        ),
        (
            "consumer",
            r#"{"class": "Module", "doc": null, "node": {"class": "Stmt", "nodes": [
                {"class": "From", "lineno": 1, "modname": "exports",
                 "names": [["*", null]], "level": 0}]}}"#,
        ),
    ]);
    let mut builder = GraphBuilder::new(source);
    let consumer = builder.module("consumer").unwrap();
    assert!(consumer.local_bindings("visible").is_some());
    assert!(consumer.local_bindings("hidden").is_none());
    assert!(consumer.local_bindings("__all__").is_none());
}

#[test]
fn test_inherited_method_found_across_modules() {
    let source = MapSource::new(&[
        (
            "base_mod",
            r#"{"_type": "Module", "body": [
                {"_type": "ClassDef", "name": "Base", "lineno": 1, "bases": [],
                 "body": [
                   {"_type": "FunctionDef", "name": "ping", "lineno": 2,
                    "args": {"args": [{"_type": "arg", "arg": "self"}],
                             "defaults": []},
                    "body": [{"_type": "Pass", "lineno": 3}]}]}]}"#,
        ),
        (
            "app",
            r#"{"_type": "Module", "body": [
                {"_type": "ImportFrom", "lineno": 1, "module": "base_mod",
                 "level": 0, "names": [{"name": "Base", "asname": null}]},
                {"_type": "ClassDef", "name": "Child", "lineno": 2,
                 "bases": [{"_type": "Name", "id": "Base", "lineno": 2}],
                 "body": [{"_type": "Pass", "lineno": 3}]}]}"#,
        ),
    ]);
    let mut builder = GraphBuilder::new(source);
    let app = builder.module("app").unwrap();
    let child = local(&app, "Child");

    let mut ctx = InferCtx::new();
    ctx.resolver = Some(&mut builder);
    let values = scoped::igetattr(&child, "ping", &mut ctx).unwrap();
    assert!(matches!(values[0], Value::UnboundMethod(_)));
}

// ============================================================================
// Inference Properties
// ============================================================================

#[test]
fn test_unknown_receiver_short_circuits_attribute_inference() {
    // def f(param): return param.attr
    let module = text_build(
        r#"{"_type": "Module", "body": [
            {"_type": "FunctionDef", "name": "f", "lineno": 1,
             "args": {"args": [{"_type": "arg", "arg": "param"}], "defaults": []},
             "body": [
               {"_type": "Return", "lineno": 2,
                "value": {"_type": "Attribute", "lineno": 2, "attr": "attr",
                          "ctx": {"_type": "Load"},
                          "value": {"_type": "Name", "id": "param", "lineno": 2,
                                    "ctx": {"_type": "Load"}}}}]}]}"#,
        "m",
        None,
    )
    .unwrap();
    let f = local(&module, "f");
    let body = f.as_function().unwrap().body.borrow().clone();
    let NodeKind::Return { value: Some(attr) } = &body[0].kind else {
        panic!("expected a return of an attribute access");
    };
    let values = infer(attr, &mut InferCtx::new()).unwrap();
    assert_eq!(values.len(), 1);
    assert!(values[0].is_unknown());
}

#[test]
fn test_calling_a_class_yields_an_instance_of_it() {
    // c = Counter(0)
    let source = format!(
        r#"{{"_type": "Module", "body": [
            {},
            {{"_type": "Assign", "lineno": 20,
              "targets": [{{"_type": "Name", "id": "c",
                            "ctx": {{"_type": "Store"}}, "lineno": 20}}],
              "value": {{"_type": "Call", "lineno": 20,
                         "func": {{"_type": "Name", "id": "Counter", "lineno": 20}},
                         "args": [{{"_type": "Num", "n": 0, "lineno": 20}}],
                         "keywords": []}}}}]}}"#,
        r#"{"_type": "ClassDef", "name": "Counter", "lineno": 1, "bases": [],
            "body": [{"_type": "Pass", "lineno": 2}]}"#,
    );
    let module = text_build(&source, "m", None).unwrap();
    let binding = local(&module, "c");

    let mut ctx = InferCtx::new();
    ctx.lookupname = Some("c".to_string());
    let values = infer(&binding, &mut ctx).unwrap();
    assert_eq!(values.len(), 1);
    let Value::Instance(class) = &values[0] else {
        panic!("expected an instance candidate");
    };
    assert!(Rc::ptr_eq(class, &local(&module, "Counter")));
}

#[test]
fn test_rebinding_keeps_both_candidates_in_order() {
    // flag = 1 ... flag = "two"
    let module = text_build(
        r#"{"_type": "Module", "body": [
            {"_type": "Assign", "lineno": 1,
             "targets": [{"_type": "Name", "id": "flag",
                          "ctx": {"_type": "Store"}, "lineno": 1}],
             "value": {"_type": "Num", "n": 1, "lineno": 1}},
            {"_type": "Assign", "lineno": 2,
             "targets": [{"_type": "Name", "id": "flag",
                          "ctx": {"_type": "Store"}, "lineno": 2}],
             "value": {"_type": "Str", "s": "two", "lineno": 2}}]}"#,
        "m",
        None,
    )
    .unwrap();
    let bindings = module.local_bindings("flag").unwrap();
    assert_eq!(bindings.len(), 2);

    // inferring a read of the name sees both, in binding order
    let read = astgraph::nodes::Node::new(
        NodeKind::Name {
            name: "flag".to_string(),
        },
        3,
        3,
    );
    astgraph::nodes::attach(&module, &read);
    let values = infer(&read, &mut InferCtx::new()).unwrap();
    assert_eq!(values.len(), 2);
    let linenos: Vec<u32> = values
        .iter()
        .map(|value| value.node().unwrap().lineno_from())
        .collect();
    assert_eq!(linenos, vec![1, 2]);
}
