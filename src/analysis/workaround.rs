//! User-supplied overrides for files the parser cannot handle (S4).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Verbatim replacement for a file's analysis record, supplied by the user
/// when the Fortran or C parser rejects the file's syntax.
///
/// The analyser inserts these five fields as-is instead of attempting to
/// parse `fpath`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParserWorkaround {
    pub fpath: PathBuf,
    pub module_defs: BTreeSet<String>,
    pub symbol_defs: BTreeSet<String>,
    pub module_deps: BTreeSet<String>,
    pub symbol_deps: BTreeSet<String>,
}

impl ParserWorkaround {
    pub fn new(fpath: impl Into<PathBuf>) -> Self {
        Self {
            fpath: fpath.into(),
            module_defs: BTreeSet::new(),
            symbol_defs: BTreeSet::new(),
            module_deps: BTreeSet::new(),
            symbol_deps: BTreeSet::new(),
        }
    }

    pub fn with_module_defs(mut self, defs: impl IntoIterator<Item = String>) -> Self {
        self.module_defs.extend(defs);
        self
    }

    pub fn with_symbol_defs(mut self, defs: impl IntoIterator<Item = String>) -> Self {
        self.symbol_defs.extend(defs);
        self
    }

    pub fn with_module_deps(mut self, deps: impl IntoIterator<Item = String>) -> Self {
        self.module_deps.extend(deps);
        self
    }

    pub fn with_symbol_deps(mut self, deps: impl IntoIterator<Item = String>) -> Self {
        self.symbol_deps.extend(deps);
        self
    }
}
