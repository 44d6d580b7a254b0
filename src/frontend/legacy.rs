//! Legacy front end: the `compiler`-package tree dump.
//!
//! Every node is a JSON object discriminated by a `"class"` key, with
//! the package's attribute names kept verbatim: statement sequences are
//! wrapped in `Stmt` nodes, calls are `CallFunc`, conditionals carry a
//! `tests` pair list, binding forms carry an `OP_ASSIGN`/`OP_DELETE`
//! flag string, and argument names arrive as a flat list with nested
//! sublists for destructuring tuples. Only the starting line is
//! recorded, so every produced span is a single line.

use serde_json::{Map, Value};

use crate::error::{BuildError, BuildResult};
use crate::parse::{
    ArgDecl, ArgPat, BinOpKind, BoolOpKind, CmpOpKind, Literal, ParseKind, ParseNode, UnaryOpKind,
};

use super::{field, lineno_field, list_field, obj, opt_field, str_field};

/// Convert a legacy-dialect JSON value into a parse tree.
pub fn from_value(value: &Value) -> BuildResult<ParseNode> {
    node(value)
}

// ============================================================================
// Node Dispatch
// ============================================================================

fn node(value: &Value) -> BuildResult<ParseNode> {
    let map = obj(value, "legacy node")?;
    let class = str_field(map, "class", "legacy node")?;
    let lineno = lineno_field(map, "lineno");
    let at = |kind: ParseKind| ParseNode::at(kind, lineno);

    let built = match class {
        "Module" => {
            let doc = doc_field(map);
            let body = stmt_list(field(map, "node", "Module")?)?;
            at(ParseKind::Module { doc, body })
        }
        "Class" => at(ParseKind::Class {
            name: str_field(map, "name", "Class")?.to_string(),
            bases: node_list(list_field(map, "bases", "Class")?)?,
            doc: doc_field(map),
            body: stmt_list(field(map, "code", "Class")?)?,
        }),
        "Function" => {
            let decorators = match opt_field(map, "decorators") {
                Some(decos) => decorator_list(decos)?,
                None => Vec::new(),
            };
            at(ParseKind::Function {
                name: str_field(map, "name", "Function")?.to_string(),
                args: arg_decl(map, "Function")?,
                decorators,
                doc: doc_field(map),
                body: stmt_list(field(map, "code", "Function")?)?,
            })
        }
        "Lambda" => at(ParseKind::Lambda {
            args: arg_decl(map, "Lambda")?,
            body: Box::new(node(field(map, "code", "Lambda")?)?),
        }),

        // Binding and deletion forms. The package has no delete
        // statement: binding nodes carry an OP_DELETE flag instead.
        "Assign" => at(ParseKind::Assign {
            targets: node_list(list_field(map, "nodes", "Assign")?)?,
            value: Box::new(node(field(map, "expr", "Assign")?)?),
        }),
        "AugAssign" => at(ParseKind::AugAssign {
            target: Box::new(node(field(map, "node", "AugAssign")?)?),
            op: aug_op(str_field(map, "op", "AugAssign")?)?,
            value: Box::new(node(field(map, "expr", "AugAssign")?)?),
        }),
        "AssName" => at(ParseKind::AssName {
            name: str_field(map, "name", "AssName")?.to_string(),
            delete: delete_flag(map, "AssName")?,
        }),
        "AssAttr" => at(ParseKind::AssAttr {
            expr: Box::new(node(field(map, "expr", "AssAttr")?)?),
            attrname: str_field(map, "attrname", "AssAttr")?.to_string(),
            delete: delete_flag(map, "AssAttr")?,
        }),
        "AssTuple" | "AssList" => {
            let elts = node_list(list_field(map, "nodes", class)?)?;
            let delete = elts.iter().any(seq_elt_deletes);
            at(ParseKind::AssSeq {
                elts,
                tuple: class == "AssTuple",
                delete,
            })
        }

        // Plain expressions
        "Name" => at(ParseKind::Name {
            name: str_field(map, "name", "Name")?.to_string(),
        }),
        "Getattr" => at(ParseKind::Getattr {
            expr: Box::new(node(field(map, "expr", "Getattr")?)?),
            attrname: str_field(map, "attrname", "Getattr")?.to_string(),
        }),
        "Const" => at(ParseKind::Const {
            value: literal(field(map, "value", "Const")?),
        }),
        "Add" | "Sub" | "Mul" | "Div" | "FloorDiv" | "Mod" | "Power" | "LeftShift"
        | "RightShift" => at(ParseKind::BinOp {
            op: binary_class_op(class),
            left: Box::new(node(field(map, "left", class)?)?),
            right: Box::new(node(field(map, "right", class)?)?),
        }),
        // Same-operator bitwise chains arrive n-ary.
        "Bitand" | "Bitor" | "Bitxor" => at(ParseKind::BitGroup {
            op: match class {
                "Bitand" => BinOpKind::BitAnd,
                "Bitor" => BinOpKind::BitOr,
                _ => BinOpKind::BitXor,
            },
            operands: node_list(list_field(map, "nodes", class)?)?,
        }),
        "And" | "Or" => at(ParseKind::BoolOp {
            op: if class == "And" {
                BoolOpKind::And
            } else {
                BoolOpKind::Or
            },
            values: node_list(list_field(map, "nodes", class)?)?,
        }),
        "Not" | "UnaryAdd" | "UnarySub" | "Invert" => at(ParseKind::UnaryOp {
            op: match class {
                "Not" => UnaryOpKind::Not,
                "UnaryAdd" => UnaryOpKind::Plus,
                "UnarySub" => UnaryOpKind::Minus,
                _ => UnaryOpKind::Invert,
            },
            operand: Box::new(node(field(map, "expr", class)?)?),
        }),
        "Compare" => {
            let mut ops = Vec::new();
            for pair in list_field(map, "ops", "Compare")? {
                let pair = pair
                    .as_array()
                    .filter(|p| p.len() == 2)
                    .ok_or_else(|| BuildError::parse("Compare: ops entries must be pairs"))?;
                let op = pair[0]
                    .as_str()
                    .ok_or_else(|| BuildError::parse("Compare: operator must be a string"))?;
                ops.push((cmp_op(op)?, node(&pair[1])?));
            }
            at(ParseKind::Compare {
                left: Box::new(node(field(map, "expr", "Compare")?)?),
                ops,
            })
        }
        "CallFunc" => {
            let mut args = Vec::new();
            let mut keywords = Vec::new();
            for arg in list_field(map, "args", "CallFunc")? {
                let arg_map = obj(arg, "CallFunc argument")?;
                if str_field(arg_map, "class", "CallFunc argument")? == "Keyword" {
                    keywords.push((
                        str_field(arg_map, "name", "Keyword")?.to_string(),
                        node(field(arg_map, "expr", "Keyword")?)?,
                    ));
                } else {
                    args.push(node(arg)?);
                }
            }
            at(ParseKind::Call {
                func: Box::new(node(field(map, "node", "CallFunc")?)?),
                args,
                keywords,
                starargs: node_opt(opt_field(map, "star_args"))?,
                kwargs: node_opt(opt_field(map, "dstar_args"))?,
            })
        }

        // Compound statements
        "If" => {
            let mut branches = Vec::new();
            for pair in list_field(map, "tests", "If")? {
                let pair = pair
                    .as_array()
                    .filter(|p| p.len() == 2)
                    .ok_or_else(|| BuildError::parse("If: tests entries must be pairs"))?;
                branches.push((node(&pair[0])?, stmt_list(&pair[1])?));
            }
            at(ParseKind::If {
                branches,
                orelse: opt_stmt_list(map, "else_")?,
            })
        }
        "For" => at(ParseKind::For {
            target: Box::new(node(field(map, "assign", "For")?)?),
            iter: Box::new(node(field(map, "list", "For")?)?),
            body: stmt_list(field(map, "body", "For")?)?,
            orelse: opt_stmt_list(map, "else_")?,
        }),
        "While" => at(ParseKind::While {
            test: Box::new(node(field(map, "test", "While")?)?),
            body: stmt_list(field(map, "body", "While")?)?,
            orelse: opt_stmt_list(map, "else_")?,
        }),
        "TryExcept" => {
            let mut handlers = Vec::new();
            for triple in list_field(map, "handlers", "TryExcept")? {
                let triple = triple
                    .as_array()
                    .filter(|t| t.len() == 3)
                    .ok_or_else(|| BuildError::parse("TryExcept: handlers must be triples"))?;
                let lineno = handlers_lineno(&triple[2]);
                handlers.push(ParseNode::at(
                    ParseKind::ExceptHandler {
                        typ: node_opt(non_null(&triple[0]))?,
                        name: node_opt(non_null(&triple[1]))?,
                        body: stmt_list(&triple[2])?,
                    },
                    lineno,
                ));
            }
            at(ParseKind::TryExcept {
                body: stmt_list(field(map, "body", "TryExcept")?)?,
                handlers,
                orelse: opt_stmt_list(map, "else_")?,
            })
        }
        "TryFinally" => at(ParseKind::TryFinally {
            body: stmt_list(field(map, "body", "TryFinally")?)?,
            finalbody: stmt_list(field(map, "final", "TryFinally")?)?,
        }),
        "With" => at(ParseKind::With {
            expr: Box::new(node(field(map, "expr", "With")?)?),
            vars: node_opt(opt_field(map, "vars"))?,
            body: stmt_list(field(map, "body", "With")?)?,
        }),
        "Raise" => at(ParseKind::Raise {
            exc: node_opt(opt_field(map, "expr1"))?,
            inst: node_opt(opt_field(map, "expr2"))?,
            tback: node_opt(opt_field(map, "expr3"))?,
        }),
        "Return" => at(ParseKind::Return {
            value: node_opt(opt_field(map, "value"))?,
        }),
        "Yield" => at(ParseKind::Yield {
            value: node_opt(opt_field(map, "value"))?,
        }),
        "Global" => at(ParseKind::Global {
            names: string_list(list_field(map, "names", "Global")?)?,
        }),
        "Import" => at(ParseKind::Import {
            names: alias_pairs(list_field(map, "names", "Import")?)?,
        }),
        "From" => at(ParseKind::From {
            module: str_field(map, "modname", "From")?.to_string(),
            names: alias_pairs(list_field(map, "names", "From")?)?,
            level: lineno_field(map, "level"),
        }),
        "Discard" => at(ParseKind::Discard {
            value: Box::new(node(field(map, "expr", "Discard")?)?),
        }),
        "Assert" => at(ParseKind::Assert {
            test: Box::new(node(field(map, "test", "Assert")?)?),
            fail: node_opt(opt_field(map, "fail"))?,
        }),
        "Pass" => at(ParseKind::Pass),
        "Break" => at(ParseKind::Break),
        "Continue" => at(ParseKind::Continue),
        "Ellipsis" => at(ParseKind::Ellipsis),

        // Containers and comprehensions
        "Dict" => {
            let mut items = Vec::new();
            for pair in list_field(map, "items", "Dict")? {
                let pair = pair
                    .as_array()
                    .filter(|p| p.len() == 2)
                    .ok_or_else(|| BuildError::parse("Dict: items entries must be pairs"))?;
                items.push((node(&pair[0])?, node(&pair[1])?));
            }
            at(ParseKind::Dict { items })
        }
        "List" => at(ParseKind::ListLit {
            elts: node_list(list_field(map, "nodes", "List")?)?,
        }),
        "Tuple" => at(ParseKind::TupleLit {
            elts: node_list(list_field(map, "nodes", "Tuple")?)?,
        }),
        "ListComp" => at(ParseKind::ListComp {
            elt: Box::new(node(field(map, "expr", "ListComp")?)?),
            quals: qual_list(list_field(map, "quals", "ListComp")?)?,
        }),
        "GenExpr" => {
            let inner = obj(field(map, "code", "GenExpr")?, "GenExprInner")?;
            at(ParseKind::GenExpr {
                elt: Box::new(node(field(inner, "expr", "GenExprInner")?)?),
                quals: qual_list(list_field(inner, "quals", "GenExprInner")?)?,
            })
        }

        // Subscription. The two-part slice form is its own class.
        "Subscript" => at(ParseKind::Subscript {
            value: Box::new(node(field(map, "expr", "Subscript")?)?),
            subs: node_list(list_field(map, "subs", "Subscript")?)?,
            delete: delete_flag(map, "Subscript")?,
        }),
        "Slice" => {
            let parts = vec![
                opt_part(opt_field(map, "lower"))?,
                opt_part(opt_field(map, "upper"))?,
            ];
            at(ParseKind::Subscript {
                value: Box::new(node(field(map, "expr", "Slice")?)?),
                subs: vec![ParseNode::at(ParseKind::SliceObj { parts }, lineno)],
                delete: delete_flag(map, "Slice")?,
            })
        }
        "Sliceobj" => {
            let mut parts = Vec::new();
            for part in list_field(map, "nodes", "Sliceobj")? {
                parts.push(opt_part(non_null(part))?);
            }
            at(ParseKind::SliceObj { parts })
        }

        // Statements of the old grammar with no canonical counterpart.
        "Print" | "Printnl" | "Exec" | "Backquote" => at(ParseKind::Unsupported {
            construct: class.to_string(),
        }),

        other => {
            return Err(BuildError::parse(format!(
                "legacy node: unrecognized class '{other}'"
            )))
        }
    };
    Ok(built)
}

// ============================================================================
// Field Helpers
// ============================================================================

fn doc_field(map: &Map<String, Value>) -> Option<String> {
    opt_field(map, "doc")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn non_null(value: &Value) -> Option<&Value> {
    if value.is_null() {
        None
    } else {
        Some(value)
    }
}

fn node_opt(value: Option<&Value>) -> BuildResult<Option<Box<ParseNode>>> {
    match value {
        Some(value) => Ok(Some(Box::new(node(value)?))),
        None => Ok(None),
    }
}

fn opt_part(value: Option<&Value>) -> BuildResult<Option<ParseNode>> {
    match value {
        Some(value) => Ok(Some(node(value)?)),
        None => Ok(None),
    }
}

fn node_list(values: &[Value]) -> BuildResult<Vec<ParseNode>> {
    values.iter().map(node).collect()
}

/// Unwrap a `Stmt` wrapper into its statement list.
fn stmt_list(value: &Value) -> BuildResult<Vec<ParseNode>> {
    let map = obj(value, "statement block")?;
    if str_field(map, "class", "statement block")? != "Stmt" {
        return Err(BuildError::parse(
            "statement block: expected a 'Stmt' wrapper",
        ));
    }
    node_list(list_field(map, "nodes", "Stmt")?)
}

fn opt_stmt_list(map: &Map<String, Value>, key: &str) -> BuildResult<Vec<ParseNode>> {
    match opt_field(map, key) {
        Some(value) => stmt_list(value),
        None => Ok(Vec::new()),
    }
}

fn handlers_lineno(stmt: &Value) -> u32 {
    stmt.as_object()
        .map(|map| lineno_field(map, "lineno"))
        .unwrap_or(0)
}

fn decorator_list(value: &Value) -> BuildResult<Vec<ParseNode>> {
    let map = obj(value, "Decorators")?;
    node_list(list_field(map, "nodes", "Decorators")?)
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

/// `[name, alias-or-null]` pair lists of Import/From.
fn alias_pairs(values: &[Value]) -> BuildResult<Vec<(String, Option<String>)>> {
    values
        .iter()
        .map(|pair| {
            let pair = pair
                .as_array()
                .filter(|p| p.len() == 2)
                .ok_or_else(|| BuildError::parse("import names must be pairs"))?;
            let name = pair[0]
                .as_str()
                .ok_or_else(|| BuildError::parse("import name must be a string"))?;
            Ok((
                name.to_string(),
                pair[1].as_str().map(str::to_string),
            ))
        })
        .collect()
}

fn delete_flag(map: &Map<String, Value>, what: &str) -> BuildResult<bool> {
    match opt_field(map, "flags").and_then(Value::as_str) {
        Some("OP_DELETE") => Ok(true),
        Some("OP_ASSIGN") | Some("OP_APPLY") | None => Ok(false),
        Some(other) => Err(BuildError::parse(format!(
            "{what}: unrecognized flags value '{other}'"
        ))),
    }
}

fn seq_elt_deletes(elt: &ParseNode) -> bool {
    matches!(
        elt.kind,
        ParseKind::AssName { delete: true, .. }
            | ParseKind::AssAttr { delete: true, .. }
            | ParseKind::AssSeq { delete: true, .. }
            | ParseKind::Subscript { delete: true, .. }
    )
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
        // Aggregate constants are not produced by the dump.
        _ => Literal::None,
    }
}

// ============================================================================
// Arguments
// ============================================================================

/// Decode `argnames`/`defaults`/`varargs`/`kwargs`.
///
/// The dump keeps the package's convention: `varargs` and `kwargs` are
/// presence flags, and the star names sit at the tail of `argnames`
/// (kwarg last, vararg before it).
fn arg_decl(map: &Map<String, Value>, what: &str) -> BuildResult<ArgDecl> {
    let mut pats: Vec<ArgPat> = list_field(map, "argnames", what)?
        .iter()
        .map(arg_pat)
        .collect::<BuildResult<_>>()?;
    let has_kwarg = flag(map, "kwargs");
    let has_vararg = flag(map, "varargs");
    let kwarg = if has_kwarg { pop_name(&mut pats, what)? } else { None };
    let vararg = if has_vararg { pop_name(&mut pats, what)? } else { None };
    Ok(ArgDecl {
        args: pats,
        defaults: node_list(list_field(map, "defaults", what)?)?,
        vararg,
        kwarg,
    })
}

fn flag(map: &Map<String, Value>, key: &str) -> bool {
    opt_field(map, key)
        .map(|value| value.as_u64().unwrap_or(0) != 0 || value.as_bool().unwrap_or(false))
        .unwrap_or(false)
}

fn pop_name(pats: &mut Vec<ArgPat>, what: &str) -> BuildResult<Option<String>> {
    match pats.pop() {
        Some(ArgPat::Name(name)) => Ok(Some(name)),
        Some(ArgPat::Tuple(_)) | None => Err(BuildError::parse(format!(
            "{what}: star argument flag without a trailing name"
        ))),
    }
}

fn arg_pat(value: &Value) -> BuildResult<ArgPat> {
    match value {
        Value::String(name) => Ok(ArgPat::Name(name.clone())),
        Value::Array(parts) => Ok(ArgPat::Tuple(
            parts.iter().map(arg_pat).collect::<BuildResult<_>>()?,
        )),
        _ => Err(BuildError::parse(
            "argnames entries must be strings or nested lists",
        )),
    }
}

// ============================================================================
// Operators
// ============================================================================

fn binary_class_op(class: &str) -> BinOpKind {
    match class {
        "Add" => BinOpKind::Add,
        "Sub" => BinOpKind::Sub,
        "Mul" => BinOpKind::Mul,
        "Div" => BinOpKind::Div,
        "FloorDiv" => BinOpKind::FloorDiv,
        "Mod" => BinOpKind::Mod,
        "Power" => BinOpKind::Pow,
        "LeftShift" => BinOpKind::LShift,
        _ => BinOpKind::RShift,
    }
}

/// Augmented-assignment operator strings keep their trailing `=`.
fn aug_op(op: &str) -> BuildResult<BinOpKind> {
    let bare = op.strip_suffix('=').unwrap_or(op);
    match bare {
        "+" => Ok(BinOpKind::Add),
        "-" => Ok(BinOpKind::Sub),
        "*" => Ok(BinOpKind::Mul),
        "/" => Ok(BinOpKind::Div),
        "//" => Ok(BinOpKind::FloorDiv),
        "%" => Ok(BinOpKind::Mod),
        "**" => Ok(BinOpKind::Pow),
        "<<" => Ok(BinOpKind::LShift),
        ">>" => Ok(BinOpKind::RShift),
        "&" => Ok(BinOpKind::BitAnd),
        "|" => Ok(BinOpKind::BitOr),
        "^" => Ok(BinOpKind::BitXor),
        other => Err(BuildError::parse(format!(
            "unrecognized augmented operator '{other}'"
        ))),
    }
}

fn cmp_op(op: &str) -> BuildResult<CmpOpKind> {
    match op {
        "<" => Ok(CmpOpKind::Lt),
        ">" => Ok(CmpOpKind::Gt),
        "<=" => Ok(CmpOpKind::LtE),
        ">=" => Ok(CmpOpKind::GtE),
        "==" => Ok(CmpOpKind::Eq),
        "!=" | "<>" => Ok(CmpOpKind::NotEq),
        "is" => Ok(CmpOpKind::Is),
        "is not" => Ok(CmpOpKind::IsNot),
        "in" => Ok(CmpOpKind::In),
        "not in" => Ok(CmpOpKind::NotIn),
        other => Err(BuildError::parse(format!(
            "unrecognized comparison operator '{other}'"
        ))),
    }
}

/// Comprehension qualifier lists (`ListCompFor`/`GenExprFor`).
fn qual_list(values: &[Value]) -> BuildResult<Vec<ParseNode>> {
    values
        .iter()
        .map(|value| {
            let map = obj(value, "comprehension qualifier")?;
            let class = str_field(map, "class", "comprehension qualifier")?;
            let (iter_key, if_class) = match class {
                "ListCompFor" => ("list", "ListCompIf"),
                "GenExprFor" => ("iter", "GenExprIf"),
                other => {
                    return Err(BuildError::parse(format!(
                        "unrecognized comprehension qualifier '{other}'"
                    )))
                }
            };
            let mut ifs = Vec::new();
            for cond in list_field(map, "ifs", class)? {
                let cond_map = obj(cond, if_class)?;
                if str_field(cond_map, "class", if_class)? != if_class {
                    return Err(BuildError::parse(format!(
                        "{class}: expected {if_class} conditions"
                    )));
                }
                ifs.push(node(field(cond_map, "test", if_class)?)?);
            }
            Ok(ParseNode::at(
                ParseKind::CompFor {
                    target: Box::new(node(field(map, "assign", class)?)?),
                    iter: Box::new(node(field(map, iter_key, class)?)?),
                    ifs,
                },
                lineno_field(map, "lineno"),
            ))
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
