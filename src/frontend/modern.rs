//! Modern front end: the `ast`-module tree dump.
//!
//! Every node is a JSON object discriminated by a `"_type"` key.
//! Binding position is carried by `ctx` objects (`Load`/`Store`/`Del`),
//! deletes are explicit `Delete` statements, operators are wrapped in
//! their own typed objects, conditionals are single-branch with the
//! chained `elif` in `orelse`, and `end_lineno` is recorded when the
//! producing parser knows it. Docstrings are not a field: they are the
//! leading string-expression statement of a scope body and get pulled
//! out here.

use serde_json::{Map, Value};

use crate::error::{BuildError, BuildResult};
use crate::parse::{
    ArgDecl, ArgPat, BinOpKind, BoolOpKind, CmpOpKind, Literal, ParseKind, ParseNode, UnaryOpKind,
};

use super::{field, lineno_field, list_field, obj, opt_field, str_field};

/// Convert a modern-dialect JSON value into a parse tree.
pub fn from_value(value: &Value) -> BuildResult<ParseNode> {
    node(value)
}

/// Expression context of names, attributes, sequences and subscripts.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Ctx {
    Load,
    Store,
    Del,
}

// ============================================================================
// Node Dispatch
// ============================================================================

fn node(value: &Value) -> BuildResult<ParseNode> {
    let map = obj(value, "ast node")?;
    let typ = str_field(map, "_type", "ast node")?;
    let lineno = lineno_field(map, "lineno");
    let end_lineno = match opt_field(map, "end_lineno").and_then(Value::as_u64) {
        Some(end) => end as u32,
        None => lineno,
    };
    let mk = |kind: ParseKind| ParseNode::new(kind, lineno, end_lineno);

    let built = match typ {
        "Module" => {
            let mut body = node_list(list_field(map, "body", "Module")?)?;
            let doc = extract_doc(&mut body);
            mk(ParseKind::Module { doc, body })
        }
        "ClassDef" => {
            let mut body = node_list(list_field(map, "body", "ClassDef")?)?;
            let doc = extract_doc(&mut body);
            mk(ParseKind::Class {
                name: str_field(map, "name", "ClassDef")?.to_string(),
                bases: node_list(list_field(map, "bases", "ClassDef")?)?,
                doc,
                body,
            })
        }
        "FunctionDef" => {
            let mut body = node_list(list_field(map, "body", "FunctionDef")?)?;
            let doc = extract_doc(&mut body);
            let decorators = match opt_field(map, "decorator_list") {
                Some(decos) => node_list(as_list(decos, "decorator_list")?)?,
                None => Vec::new(),
            };
            mk(ParseKind::Function {
                name: str_field(map, "name", "FunctionDef")?.to_string(),
                args: arg_decl(field(map, "args", "FunctionDef")?)?,
                decorators,
                doc,
                body,
            })
        }
        "Lambda" => mk(ParseKind::Lambda {
            args: arg_decl(field(map, "args", "Lambda")?)?,
            body: Box::new(node(field(map, "body", "Lambda")?)?),
        }),

        // Binding and deletion forms
        "Assign" => mk(ParseKind::Assign {
            targets: node_list(list_field(map, "targets", "Assign")?)?,
            value: Box::new(node(field(map, "value", "Assign")?)?),
        }),
        "AugAssign" => mk(ParseKind::AugAssign {
            target: Box::new(node(field(map, "target", "AugAssign")?)?),
            op: bin_op(field(map, "op", "AugAssign")?)?,
            value: Box::new(node(field(map, "value", "AugAssign")?)?),
        }),
        "Delete" => mk(ParseKind::Delete {
            targets: node_list(list_field(map, "targets", "Delete")?)?,
        }),
        "Name" => {
            let name = str_field(map, "id", "Name")?.to_string();
            match ctx(map)? {
                Ctx::Load => mk(ParseKind::Name { name }),
                Ctx::Store => mk(ParseKind::AssName {
                    name,
                    delete: false,
                }),
                Ctx::Del => mk(ParseKind::AssName { name, delete: true }),
            }
        }
        "Attribute" => {
            let expr = Box::new(node(field(map, "value", "Attribute")?)?);
            let attrname = str_field(map, "attr", "Attribute")?.to_string();
            match ctx(map)? {
                Ctx::Load => mk(ParseKind::Getattr { expr, attrname }),
                Ctx::Store => mk(ParseKind::AssAttr {
                    expr,
                    attrname,
                    delete: false,
                }),
                Ctx::Del => mk(ParseKind::AssAttr {
                    expr,
                    attrname,
                    delete: true,
                }),
            }
        }
        "Tuple" | "List" => {
            let elts = node_list(list_field(map, "elts", typ)?)?;
            match ctx(map)? {
                Ctx::Load if typ == "Tuple" => mk(ParseKind::TupleLit { elts }),
                Ctx::Load => mk(ParseKind::ListLit { elts }),
                context => mk(ParseKind::AssSeq {
                    elts,
                    tuple: typ == "Tuple",
                    delete: context == Ctx::Del,
                }),
            }
        }
        "Set" => mk(ParseKind::SetLit {
            elts: node_list(list_field(map, "elts", "Set")?)?,
        }),
        "Subscript" => mk(ParseKind::Subscript {
            value: Box::new(node(field(map, "value", "Subscript")?)?),
            subs: subscript_subs(field(map, "slice", "Subscript")?)?,
            delete: ctx(map)? == Ctx::Del,
        }),

        // Constants
        "Num" => mk(ParseKind::Const {
            value: literal(field(map, "n", "Num")?),
        }),
        "Str" => mk(ParseKind::Const {
            value: literal(field(map, "s", "Str")?),
        }),
        "Constant" | "NameConstant" => mk(ParseKind::Const {
            value: literal(field(map, "value", typ)?),
        }),
        "Ellipsis" => mk(ParseKind::Ellipsis),

        // Operators
        "BinOp" => mk(ParseKind::BinOp {
            op: bin_op(field(map, "op", "BinOp")?)?,
            left: Box::new(node(field(map, "left", "BinOp")?)?),
            right: Box::new(node(field(map, "right", "BinOp")?)?),
        }),
        "BoolOp" => {
            let op = match type_of(field(map, "op", "BoolOp")?)? {
                "And" => BoolOpKind::And,
                "Or" => BoolOpKind::Or,
                other => {
                    return Err(BuildError::parse(format!(
                        "BoolOp: unrecognized operator '{other}'"
                    )))
                }
            };
            mk(ParseKind::BoolOp {
                op,
                values: node_list(list_field(map, "values", "BoolOp")?)?,
            })
        }
        "UnaryOp" => {
            let op = match type_of(field(map, "op", "UnaryOp")?)? {
                "UAdd" => UnaryOpKind::Plus,
                "USub" => UnaryOpKind::Minus,
                "Not" => UnaryOpKind::Not,
                "Invert" => UnaryOpKind::Invert,
                other => {
                    return Err(BuildError::parse(format!(
                        "UnaryOp: unrecognized operator '{other}'"
                    )))
                }
            };
            mk(ParseKind::UnaryOp {
                op,
                operand: Box::new(node(field(map, "operand", "UnaryOp")?)?),
            })
        }
        "Compare" => {
            let ops = list_field(map, "ops", "Compare")?;
            let comparators = list_field(map, "comparators", "Compare")?;
            if ops.len() != comparators.len() {
                return Err(BuildError::parse(
                    "Compare: ops and comparators differ in length",
                ));
            }
            let mut pairs = Vec::with_capacity(ops.len());
            for (op, comparator) in ops.iter().zip(comparators) {
                pairs.push((cmp_op(op)?, node(comparator)?));
            }
            mk(ParseKind::Compare {
                left: Box::new(node(field(map, "left", "Compare")?)?),
                ops: pairs,
            })
        }
        "Call" => {
            let mut keywords = Vec::new();
            let mut kwargs = node_opt(opt_field(map, "kwargs"))?;
            for keyword in opt_list(map, "keywords")? {
                let kw_map = obj(keyword, "keyword")?;
                match opt_field(kw_map, "arg").and_then(Value::as_str) {
                    Some(name) => keywords.push((
                        name.to_string(),
                        node(field(kw_map, "value", "keyword")?)?,
                    )),
                    // `**expr` in the argument list
                    None => kwargs = node_opt(opt_field(kw_map, "value"))?,
                }
            }
            let mut args = Vec::new();
            let mut starargs = node_opt(opt_field(map, "starargs"))?;
            for arg in list_field(map, "args", "Call")? {
                let arg_map = obj(arg, "Call argument")?;
                if type_of(arg)? == "Starred" {
                    starargs = node_opt(Some(field(arg_map, "value", "Starred")?))?;
                } else {
                    args.push(node(arg)?);
                }
            }
            mk(ParseKind::Call {
                func: Box::new(node(field(map, "func", "Call")?)?),
                args,
                keywords,
                starargs,
                kwargs,
            })
        }
        "IfExp" => mk(ParseKind::IfExp {
            test: Box::new(node(field(map, "test", "IfExp")?)?),
            body: Box::new(node(field(map, "body", "IfExp")?)?),
            orelse: Box::new(node(field(map, "orelse", "IfExp")?)?),
        }),

        // Compound statements
        "If" => mk(ParseKind::If {
            branches: vec![(
                node(field(map, "test", "If")?)?,
                node_list(list_field(map, "body", "If")?)?,
            )],
            orelse: node_list(opt_list(map, "orelse")?)?,
        }),
        "For" => mk(ParseKind::For {
            target: Box::new(node(field(map, "target", "For")?)?),
            iter: Box::new(node(field(map, "iter", "For")?)?),
            body: node_list(list_field(map, "body", "For")?)?,
            orelse: node_list(opt_list(map, "orelse")?)?,
        }),
        "While" => mk(ParseKind::While {
            test: Box::new(node(field(map, "test", "While")?)?),
            body: node_list(list_field(map, "body", "While")?)?,
            orelse: node_list(opt_list(map, "orelse")?)?,
        }),
        "TryExcept" => mk(ParseKind::TryExcept {
            body: node_list(list_field(map, "body", "TryExcept")?)?,
            handlers: node_list(list_field(map, "handlers", "TryExcept")?)?,
            orelse: node_list(opt_list(map, "orelse")?)?,
        }),
        "TryFinally" => mk(ParseKind::TryFinally {
            body: node_list(list_field(map, "body", "TryFinally")?)?,
            finalbody: node_list(list_field(map, "finalbody", "TryFinally")?)?,
        }),
        // The merged try form: split back into the two-statement shape.
        "Try" => {
            let body = node_list(list_field(map, "body", "Try")?)?;
            let handlers = node_list(opt_list(map, "handlers")?)?;
            let orelse = node_list(opt_list(map, "orelse")?)?;
            let finalbody = node_list(opt_list(map, "finalbody")?)?;
            let guarded = if handlers.is_empty() {
                body
            } else {
                vec![ParseNode::new(
                    ParseKind::TryExcept {
                        body,
                        handlers,
                        orelse,
                    },
                    lineno,
                    end_lineno,
                )]
            };
            if finalbody.is_empty() {
                match guarded.into_iter().next() {
                    Some(only) => only,
                    None => mk(ParseKind::TryExcept {
                        body: Vec::new(),
                        handlers: Vec::new(),
                        orelse: Vec::new(),
                    }),
                }
            } else {
                mk(ParseKind::TryFinally {
                    body: guarded,
                    finalbody,
                })
            }
        }
        "ExceptHandler" | "excepthandler" => {
            let name = match opt_field(map, "name") {
                Some(Value::String(name)) => Some(Box::new(ParseNode::new(
                    ParseKind::AssName {
                        name: name.clone(),
                        delete: false,
                    },
                    lineno,
                    lineno,
                ))),
                Some(value) => Some(Box::new(node(value)?)),
                None => None,
            };
            mk(ParseKind::ExceptHandler {
                typ: node_opt(opt_field(map, "type"))?,
                name,
                body: node_list(list_field(map, "body", "ExceptHandler")?)?,
            })
        }
        "With" => {
            let body = node_list(list_field(map, "body", "With")?)?;
            match opt_field(map, "items") {
                // Multi-item form: nest one statement per item.
                Some(items) => {
                    let items = as_list(items, "With items")?;
                    nest_with_items(items, body, lineno, end_lineno)?
                }
                None => mk(ParseKind::With {
                    expr: Box::new(node(field(map, "context_expr", "With")?)?),
                    vars: node_opt(opt_field(map, "optional_vars"))?,
                    body,
                }),
            }
        }
        "Raise" => {
            // Old three-expression form, or exc/cause.
            if map.contains_key("exc") {
                mk(ParseKind::Raise {
                    exc: node_opt(opt_field(map, "exc"))?,
                    inst: node_opt(opt_field(map, "cause"))?,
                    tback: None,
                })
            } else {
                mk(ParseKind::Raise {
                    exc: node_opt(opt_field(map, "type"))?,
                    inst: node_opt(opt_field(map, "inst"))?,
                    tback: node_opt(opt_field(map, "tback"))?,
                })
            }
        }
        "Return" => mk(ParseKind::Return {
            value: node_opt(opt_field(map, "value"))?,
        }),
        "Yield" => mk(ParseKind::Yield {
            value: node_opt(opt_field(map, "value"))?,
        }),
        "Global" => mk(ParseKind::Global {
            names: string_list(list_field(map, "names", "Global")?)?,
        }),
        "Import" => mk(ParseKind::Import {
            names: alias_list(list_field(map, "names", "Import")?)?,
        }),
        "ImportFrom" => mk(ParseKind::From {
            module: opt_field(map, "module")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            names: alias_list(list_field(map, "names", "ImportFrom")?)?,
            level: lineno_field(map, "level"),
        }),
        "Expr" => mk(ParseKind::Discard {
            value: Box::new(node(field(map, "value", "Expr")?)?),
        }),
        "Assert" => mk(ParseKind::Assert {
            test: Box::new(node(field(map, "test", "Assert")?)?),
            fail: node_opt(opt_field(map, "msg"))?,
        }),
        "Pass" => mk(ParseKind::Pass),
        "Break" => mk(ParseKind::Break),
        "Continue" => mk(ParseKind::Continue),

        // Containers and comprehensions
        "Dict" => {
            let keys = list_field(map, "keys", "Dict")?;
            let values = list_field(map, "values", "Dict")?;
            if keys.len() != values.len() {
                return Err(BuildError::parse("Dict: keys and values differ in length"));
            }
            let mut items = Vec::with_capacity(keys.len());
            for (key, value) in keys.iter().zip(values) {
                items.push((node(key)?, node(value)?));
            }
            mk(ParseKind::Dict { items })
        }
        "ListComp" => mk(ParseKind::ListComp {
            elt: Box::new(node(field(map, "elt", "ListComp")?)?),
            quals: node_list(list_field(map, "generators", "ListComp")?)?,
        }),
        "SetComp" => mk(ParseKind::SetComp {
            elt: Box::new(node(field(map, "elt", "SetComp")?)?),
            quals: node_list(list_field(map, "generators", "SetComp")?)?,
        }),
        "DictComp" => mk(ParseKind::DictComp {
            key: Box::new(node(field(map, "key", "DictComp")?)?),
            value: Box::new(node(field(map, "value", "DictComp")?)?),
            quals: node_list(list_field(map, "generators", "DictComp")?)?,
        }),
        "GeneratorExp" => mk(ParseKind::GenExpr {
            elt: Box::new(node(field(map, "elt", "GeneratorExp")?)?),
            quals: node_list(list_field(map, "generators", "GeneratorExp")?)?,
        }),
        "comprehension" => mk(ParseKind::CompFor {
            target: Box::new(node(field(map, "target", "comprehension")?)?),
            iter: Box::new(node(field(map, "iter", "comprehension")?)?),
            ifs: node_list(opt_list(map, "ifs")?)?,
        }),

        // Statements of the old grammar with no canonical counterpart.
        "Print" | "Exec" | "Repr" => mk(ParseKind::Unsupported {
            construct: typ.to_string(),
        }),

        other => {
            return Err(BuildError::parse(format!(
                "ast node: unrecognized type '{other}'"
            )))
        }
    };
    Ok(built)
}

// ============================================================================
// Field Helpers
// ============================================================================

fn type_of(value: &Value) -> BuildResult<&str> {
    str_field(obj(value, "typed object")?, "_type", "typed object")
}

fn ctx(map: &Map<String, Value>) -> BuildResult<Ctx> {
    match opt_field(map, "ctx") {
        None => Ok(Ctx::Load),
        Some(ctx) => match type_of(ctx)? {
            "Load" | "Param" => Ok(Ctx::Load),
            "Store" => Ok(Ctx::Store),
            "Del" => Ok(Ctx::Del),
            other => Err(BuildError::parse(format!(
                "unrecognized expression context '{other}'"
            ))),
        },
    }
}

fn node_opt(value: Option<&Value>) -> BuildResult<Option<Box<ParseNode>>> {
    match value {
        Some(value) => Ok(Some(Box::new(node(value)?))),
        None => Ok(None),
    }
}

fn node_list(values: &[Value]) -> BuildResult<Vec<ParseNode>> {
    values.iter().map(node).collect()
}

fn as_list<'a>(value: &'a Value, what: &str) -> BuildResult<&'a Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| BuildError::parse(format!("{what}: expected a list")))
}

/// A list field that may be absent or `null`.
fn opt_list<'a>(map: &'a Map<String, Value>, key: &str) -> BuildResult<&'a [Value]> {
    match opt_field(map, key) {
        Some(value) => Ok(as_list(value, key)?.as_slice()),
        None => Ok(&[]),
    }
}

fn string_list(values: &[Value]) -> BuildResult<Vec<String>> {
    values
        .iter()
        .map(|value| {
            value
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| BuildError::parse("expected a string list"))
        })
        .collect()
}

/// `alias` objects of Import/ImportFrom.
fn alias_list(values: &[Value]) -> BuildResult<Vec<(String, Option<String>)>> {
    values
        .iter()
        .map(|value| {
            let map = obj(value, "alias")?;
            Ok((
                str_field(map, "name", "alias")?.to_string(),
                opt_field(map, "asname")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            ))
        })
        .collect()
}

fn literal(value: &Value) -> Literal {
    match value {
        Value::Null => Literal::None,
        Value::Bool(b) => Literal::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Literal::Int(i)
            } else {
                Literal::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => Literal::Str(s.clone()),
        _ => Literal::None,
    }
}

/// Pull the docstring out of a just-parsed scope body.
fn extract_doc(body: &mut Vec<ParseNode>) -> Option<String> {
    let is_doc = matches!(
        body.first(),
        Some(ParseNode {
            kind: ParseKind::Discard { value },
            ..
        }) if matches!(value.kind, ParseKind::Const { value: Literal::Str(_) })
    );
    if !is_doc {
        return None;
    }
    let ParseKind::Discard { value } = body.remove(0).kind else {
        unreachable!();
    };
    let ParseKind::Const {
        value: Literal::Str(doc),
    } = value.kind
    else {
        unreachable!();
    };
    Some(doc)
}

fn nest_with_items(
    items: &[Value],
    body: Vec<ParseNode>,
    lineno: u32,
    end_lineno: u32,
) -> BuildResult<ParseNode> {
    let (first, rest) = items
        .split_first()
        .ok_or_else(|| BuildError::parse("With: empty items list"))?;
    let inner = if rest.is_empty() {
        body
    } else {
        vec![nest_with_items(rest, body, lineno, end_lineno)?]
    };
    let item = obj(first, "withitem")?;
    Ok(ParseNode::new(
        ParseKind::With {
            expr: Box::new(node(field(item, "context_expr", "withitem")?)?),
            vars: node_opt(opt_field(item, "optional_vars"))?,
            body: inner,
        },
        lineno,
        end_lineno,
    ))
}

// ============================================================================
// Arguments
// ============================================================================

fn arg_decl(value: &Value) -> BuildResult<ArgDecl> {
    let map = obj(value, "arguments")?;
    let args = opt_list(map, "args")?
        .iter()
        .map(arg_pat)
        .collect::<BuildResult<_>>()?;
    Ok(ArgDecl {
        args,
        defaults: node_list(opt_list(map, "defaults")?)?,
        vararg: star_name(opt_field(map, "vararg"))?,
        kwarg: star_name(opt_field(map, "kwarg"))?,
    })
}

/// Star arguments appear as a bare string or a typed `arg` object.
fn star_name(value: Option<&Value>) -> BuildResult<Option<String>> {
    match value {
        None => Ok(None),
        Some(Value::String(name)) => Ok(Some(name.clone())),
        Some(value) => {
            let map = obj(value, "star argument")?;
            Ok(Some(str_field(map, "arg", "star argument")?.to_string()))
        }
    }
}

/// Formal parameters appear as typed `arg` objects, `Name` nodes in
/// parameter context, or destructuring `Tuple` nodes.
fn arg_pat(value: &Value) -> BuildResult<ArgPat> {
    let map = obj(value, "parameter")?;
    match str_field(map, "_type", "parameter")? {
        "arg" => Ok(ArgPat::Name(
            str_field(map, "arg", "parameter")?.to_string(),
        )),
        "Name" => Ok(ArgPat::Name(str_field(map, "id", "parameter")?.to_string())),
        "Tuple" => Ok(ArgPat::Tuple(
            list_field(map, "elts", "parameter")?
                .iter()
                .map(arg_pat)
                .collect::<BuildResult<_>>()?,
        )),
        other => Err(BuildError::parse(format!(
            "parameter: unrecognized type '{other}'"
        ))),
    }
}

// ============================================================================
// Operators
// ============================================================================

fn bin_op(value: &Value) -> BuildResult<BinOpKind> {
    match type_of(value)? {
        "Add" => Ok(BinOpKind::Add),
        "Sub" => Ok(BinOpKind::Sub),
        "Mult" => Ok(BinOpKind::Mul),
        "Div" => Ok(BinOpKind::Div),
        "FloorDiv" => Ok(BinOpKind::FloorDiv),
        "Mod" => Ok(BinOpKind::Mod),
        "Pow" => Ok(BinOpKind::Pow),
        "LShift" => Ok(BinOpKind::LShift),
        "RShift" => Ok(BinOpKind::RShift),
        "BitAnd" => Ok(BinOpKind::BitAnd),
        "BitOr" => Ok(BinOpKind::BitOr),
        "BitXor" => Ok(BinOpKind::BitXor),
        other => Err(BuildError::parse(format!(
            "unrecognized binary operator '{other}'"
        ))),
    }
}

fn cmp_op(value: &Value) -> BuildResult<CmpOpKind> {
    match type_of(value)? {
        "Lt" => Ok(CmpOpKind::Lt),
        "Gt" => Ok(CmpOpKind::Gt),
        "LtE" => Ok(CmpOpKind::LtE),
        "GtE" => Ok(CmpOpKind::GtE),
        "Eq" => Ok(CmpOpKind::Eq),
        "NotEq" => Ok(CmpOpKind::NotEq),
        "Is" => Ok(CmpOpKind::Is),
        "IsNot" => Ok(CmpOpKind::IsNot),
        "In" => Ok(CmpOpKind::In),
        "NotIn" => Ok(CmpOpKind::NotIn),
        other => Err(BuildError::parse(format!(
            "unrecognized comparison operator '{other}'"
        ))),
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Flatten the slice payload into per-dimension entries: index
/// expressions stay as-is, slice forms become three-part
/// [`ParseKind::SliceObj`] entries.
fn subscript_subs(value: &Value) -> BuildResult<Vec<ParseNode>> {
    match type_of(value)? {
        "Index" => {
            let map = obj(value, "Index")?;
            Ok(vec![node(field(map, "value", "Index")?)?])
        }
        "Slice" => Ok(vec![slice_obj(value)?]),
        "ExtSlice" => {
            let map = obj(value, "ExtSlice")?;
            let mut subs = Vec::new();
            for dim in list_field(map, "dims", "ExtSlice")? {
                match type_of(dim)? {
                    "Index" => {
                        let dim_map = obj(dim, "Index")?;
                        subs.push(node(field(dim_map, "value", "Index")?)?);
                    }
                    "Slice" => subs.push(slice_obj(dim)?),
                    _ => subs.push(node(dim)?),
                }
            }
            Ok(subs)
        }
        // Wrapper-free form: the expression sits in the slice slot.
        _ => Ok(vec![node(value)?]),
    }
}

fn slice_obj(value: &Value) -> BuildResult<ParseNode> {
    let map = obj(value, "Slice")?;
    let part = |key: &str| -> BuildResult<Option<ParseNode>> {
        match opt_field(map, key) {
            Some(value) => Ok(Some(node(value)?)),
            None => Ok(None),
        }
    };
    Ok(ParseNode::at(
        ParseKind::SliceObj {
            parts: vec![part("lower")?, part("upper")?, part("step")?],
        },
        lineno_field(map, "lineno"),
    ))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ParseNode {
        from_value(&serde_json::from_str(text).unwrap()).unwrap()
    }

    #[test]
    fn test_docstring_pulled_from_body() {
        let tree = parse(
            r#"{"_type": "Module", "body": [
                {"_type": "Expr", "lineno": 1,
                 "value": {"_type": "Str", "s": "mod doc", "lineno": 1}},
                {"_type": "Pass", "lineno": 2}]}"#,
        );
        let ParseKind::Module { doc, body } = tree.kind else {
            panic!("expected a module");
        };
        assert_eq!(doc.as_deref(), Some("mod doc"));
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn test_store_context_becomes_binding_form() {
        let tree = parse(
            r#"{"_type": "Name", "id": "x", "lineno": 1,
                "ctx": {"_type": "Store"}}"#,
        );
        assert!(matches!(
            tree.kind,
            ParseKind::AssName { name, delete: false } if name == "x"
        ));
    }

    #[test]
    fn test_del_context_marks_deletion() {
        let tree = parse(
            r#"{"_type": "Delete", "lineno": 1, "targets": [
                {"_type": "Name", "id": "x", "lineno": 1, "ctx": {"_type": "Del"}}]}"#,
        );
        let ParseKind::Delete { targets } = tree.kind else {
            panic!("expected a delete statement");
        };
        assert!(matches!(
            &targets[0].kind,
            ParseKind::AssName { delete: true, .. }
        ));
    }

    #[test]
    fn test_compare_zips_ops_and_comparators() {
        let tree = parse(
            r#"{"_type": "Compare", "lineno": 1,
                "left": {"_type": "Name", "id": "a", "lineno": 1},
                "ops": [{"_type": "Lt"}, {"_type": "LtE"}],
                "comparators": [
                    {"_type": "Name", "id": "b", "lineno": 1},
                    {"_type": "Name", "id": "c", "lineno": 1}]}"#,
        );
        let ParseKind::Compare { ops, .. } = tree.kind else {
            panic!("expected a comparison");
        };
        assert_eq!(ops[0].0, CmpOpKind::Lt);
        assert_eq!(ops[1].0, CmpOpKind::LtE);
    }

    #[test]
    fn test_end_lineno_is_kept() {
        let tree = parse(
            r#"{"_type": "Pass", "lineno": 4, "end_lineno": 4}"#,
        );
        assert_eq!(tree.lineno, 4);
        assert_eq!(tree.end_lineno, 4);
    }

    #[test]
    fn test_merged_try_splits_into_two_forms() {
        let tree = parse(
            r#"{"_type": "Try", "lineno": 1,
                "body": [{"_type": "Pass", "lineno": 2}],
                "handlers": [{"_type": "ExceptHandler", "lineno": 3, "type": null,
                              "name": null, "body": [{"_type": "Pass", "lineno": 4}]}],
                "orelse": [],
                "finalbody": [{"_type": "Pass", "lineno": 6}]}"#,
        );
        let ParseKind::TryFinally { body, finalbody } = tree.kind else {
            panic!("expected a finally wrapper");
        };
        assert_eq!(finalbody.len(), 1);
        assert!(matches!(&body[0].kind, ParseKind::TryExcept { .. }));
    }

    #[test]
    fn test_slice_flattens_to_three_part_entry() {
        let tree = parse(
            r#"{"_type": "Subscript", "lineno": 1,
                "value": {"_type": "Name", "id": "xs", "lineno": 1},
                "slice": {"_type": "Slice",
                          "lower": {"_type": "Num", "n": 1, "lineno": 1},
                          "upper": null, "step": null},
                "ctx": {"_type": "Load"}}"#,
        );
        let ParseKind::Subscript { subs, delete, .. } = tree.kind else {
            panic!("expected a subscript");
        };
        assert!(!delete);
        let ParseKind::SliceObj { parts } = &subs[0].kind else {
            panic!("expected a slice entry");
        };
        assert_eq!(parts.len(), 3);
        assert!(parts[0].is_some());
        assert!(parts[1].is_none());
    }
}
