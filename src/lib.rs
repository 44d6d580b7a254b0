//! Canonical Python program graphs with lazy static inference.
//!
//! This crate turns serialized concrete parse trees (JSON dumps from
//! either of two parser front ends) into one canonical node graph per
//! module, then answers scope and attribute questions about it.
//! It includes:
//! - two JSON front ends with dialect sniffing ([`frontend`])
//! - the tree rebuilder producing parented, span-annotated graphs with
//!   insertion-ordered symbol tables ([`rebuild`], [`nodes`])
//! - scope operations on modules, classes and functions: attribute
//!   lookup, lazy ancestor iteration, class facts ([`scoped`])
//! - lazy multi-valued expression inference with an explicit "unknown"
//!   sentinel ([`infer`])
//! - a memoizing, cycle-tolerant multi-module driver ([`builder`]) and
//!   factories for reflection-described partial graphs ([`raw`])

pub mod builder;
pub mod error;
pub mod frontend;
pub mod infer;
pub mod nodes;
pub mod parse;
pub mod raw;
pub mod rebuild;
pub mod scoped;

pub use builder::{file_build, text_build, tree_build, GraphBuilder, ModuleSource, TreeSource};
pub use error::{BuildError, BuildResult, InferResult, InferenceError, LookupResult, NotFoundError};
pub use infer::{infer, scope_lookup, InferCtx, Resolve, Value};
pub use nodes::{dump, ClassKind, FnRole, NRef, Node, NodeExt, NodeKind};
pub use parse::{ParseKind, ParseNode};
pub use rebuild::TreeRebuilder;
