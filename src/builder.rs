//! Graph-building driver.
//!
//! [`GraphBuilder`] sits between the rebuilder and whoever supplies
//! parse trees. Tree acquisition is behind the [`TreeSource`] seam: the
//! driver asks it for a module by absolute dotted name and gets back a
//! tree plus the path it came from, never touching the filesystem
//! layout itself.
//!
//! Built graphs are memoized by module name. The cache doubles as the
//! cyclic-import guard: the rebuilder registers each module node in it
//! *before* visiting the module body (through [`Resolve`]), so an
//! import cycle resolves to the partially built module instead of
//! recursing.
//!
//! The free functions [`tree_build`], [`text_build`] and [`file_build`]
//! are the single-module entry points for callers that do not need
//! cross-module resolution.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::debug;

use crate::error::{BuildError, BuildResult};
use crate::frontend;
use crate::infer::Resolve;
use crate::nodes::NRef;
use crate::parse::ParseNode;
use crate::rebuild::TreeRebuilder;

// ============================================================================
// Tree Source
// ============================================================================

/// A parse tree together with where it came from.
pub struct ModuleSource {
    pub tree: ParseNode,
    pub path: Option<PathBuf>,
}

impl ModuleSource {
    pub fn new(tree: ParseNode) -> Self {
        ModuleSource { tree, path: None }
    }

    pub fn with_path(tree: ParseNode, path: PathBuf) -> Self {
        ModuleSource {
            tree,
            path: Some(path),
        }
    }
}

/// Module-resolution collaborator: maps absolute dotted module names to
/// parse trees. How trees are located and stored is the implementor's
/// business; tests use an in-memory map.
pub trait TreeSource {
    fn load(&mut self, modname: &str) -> BuildResult<ModuleSource>;
}

// ============================================================================
// Graph Builder
// ============================================================================

/// Memoizing graph builder over a [`TreeSource`].
pub struct GraphBuilder<S> {
    source: S,
    cache: HashMap<String, NRef>,
    /// Modules whose build has begun. A resolution request that finds
    /// its module here but not in the cache hit a window that the
    /// partial-registration protocol rules out; it is answered with an
    /// error rather than recursion.
    building: HashSet<String>,
}

impl<S: TreeSource> GraphBuilder<S> {
    pub fn new(source: S) -> Self {
        GraphBuilder {
            source,
            cache: HashMap::new(),
            building: HashSet::new(),
        }
    }

    /// The graph of `modname`, built on first request and cached.
    ///
    /// A module that is part of an import cycle comes back in whatever
    /// partial state its in-progress build has reached.
    pub fn module(&mut self, modname: &str) -> BuildResult<NRef> {
        self.resolve_module(modname)
    }

    /// The already-built graph of `modname`, if any.
    pub fn cached(&self, modname: &str) -> Option<NRef> {
        self.cache.get(modname).cloned()
    }
}

impl<S: TreeSource> Resolve for GraphBuilder<S> {
    fn resolve_module(&mut self, modname: &str) -> BuildResult<NRef> {
        if let Some(module) = self.cache.get(modname) {
            return Ok(Rc::clone(module));
        }
        if !self.building.insert(modname.to_string()) {
            return Err(BuildError::UnknownModule {
                name: modname.to_string(),
            });
        }
        let loaded = self.source.load(modname);
        let result = loaded.and_then(|source| {
            debug!(%modname, "building module graph");
            let package = source
                .path
                .as_deref()
                .map(is_package_init)
                .unwrap_or(false);
            TreeRebuilder::with_resolver(self).build(
                &source.tree,
                modname,
                source.path,
                package,
            )
        });
        self.building.remove(modname);
        let module = result?;
        self.cache.insert(modname.to_string(), Rc::clone(&module));
        Ok(module)
    }

    fn register_partial(&mut self, modname: &str, module: &NRef) {
        self.cache.insert(modname.to_string(), Rc::clone(module));
    }
}

// ============================================================================
// Single-Module Entry Points
// ============================================================================

/// Build a graph from an already-parsed tree, without cross-module
/// resolution.
pub fn tree_build(tree: &ParseNode, modname: &str) -> BuildResult<NRef> {
    TreeRebuilder::new().build(tree, modname, None, false)
}

/// Build a graph from JSON tree-dump text in either front-end dialect.
pub fn text_build(text: &str, modname: &str, path: Option<PathBuf>) -> BuildResult<NRef> {
    let tree = frontend::parse_str(text)?;
    let package = path.as_deref().map(is_package_init).unwrap_or(false);
    TreeRebuilder::new().build(&tree, modname, path, package)
}

/// Build a graph from a JSON tree-dump file.
///
/// When `modname` is not given it is derived from the path: the file
/// stem, or the directory name for a package initializer.
pub fn file_build(path: &Path, modname: Option<&str>) -> BuildResult<NRef> {
    let text = fs::read_to_string(path).map_err(|source| BuildError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let package = is_package_init(path);
    let derived;
    let modname = match modname {
        Some(name) => name,
        None => {
            derived = derive_modname(path, package);
            &derived
        }
    };
    debug!(%modname, path = %path.display(), "building module graph from file");
    let tree = frontend::parse_str(&text)?;
    TreeRebuilder::new().build(&tree, modname, Some(path.to_path_buf()), package)
}

/// True when `path` names a package initializer dump.
fn is_package_init(path: &Path) -> bool {
    path.file_stem()
        .map(|stem| stem == "__init__")
        .unwrap_or(false)
}

fn derive_modname(path: &Path, package: bool) -> String {
    let component = if package {
        path.parent().and_then(Path::file_name)
    } else {
        path.file_stem()
    };
    component
        .and_then(|name| name.to_str())
        .unwrap_or("<unnamed>")
        .to_string()
}

// ============================================================================
// Tests
// ============================================================================
