//! C extraction rules (§4.6).
//!
//! Uses the `.prag`-annotated stream produced by
//! [`crate::preprocess::pragma`] to tell user code from system headers;
//! system-include regions are skipped entirely before the regex scan below
//! ever sees them.

use super::AnalysedFileData;
use crate::fingerprint::str_fingerprint;
use crate::preprocess::pragma::strip_system_includes;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::Path;

/// Matches a C identifier immediately followed by a parenthesised,
/// brace/semicolon-free argument list and either `{` (a definition) or `;`
/// (a declaration/prototype/call statement terminator).
static RE_CALL_OR_SIG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w+)\s*\(([^;(){}]*)\)\s*([{;])").unwrap());

/// Control-flow keywords that have the lexical shape of a function call
/// (`if (...) {`) but are not identifiers.
const C_KEYWORDS: &[&str] = &[
    "if", "while", "for", "switch", "else", "do", "return", "sizeof", "defined", "__attribute__",
];

fn is_keyword(name: &str) -> bool {
    C_KEYWORDS.contains(&name)
}

/// True if `static` appears as a storage-class specifier earlier in the
/// same statement (i.e. between the previous statement terminator and
/// `pos`), which marks the following definition as internal linkage.
fn is_static_before(content: &str, pos: usize) -> bool {
    let stmt_start = content[..pos].rfind([';', '}', '{']).map(|i| i + 1).unwrap_or(0);
    let prefix = &content[stmt_start..pos];
    prefix.split_whitespace().any(|tok| tok == "static")
}

/// Parses one preprocessed, pragma-annotated C source file.
pub fn parse(raw_content: &str, path: &Path) -> AnalysedFileData {
    let content_hash = str_fingerprint(raw_content);
    let visible = strip_system_includes(raw_content);

    let mut symbol_defs = BTreeSet::new();
    let mut called = BTreeSet::new();

    for cap in RE_CALL_OR_SIG.captures_iter(&visible) {
        let name = cap[1].to_string();
        if is_keyword(&name) {
            continue;
        }
        let whole = cap.get(0).unwrap();
        let terminator = &cap[3];
        if terminator == "{" {
            if !is_static_before(&visible, whole.start()) {
                symbol_defs.insert(name);
            }
        } else {
            // Could be a declaration (`int foo(void);`) or a call
            // statement (`foo(x);`); either way it's not a definition with
            // external linkage here, but if it turns out to be a call to
            // something not defined locally it belongs in symbol_deps.
            called.insert(name);
        }
    }

    // Calls embedded inside a definition's body also show up as bare
    // `name(args)` without a following `;` captured by the regex above when
    // they're followed by e.g. a newline then `;` — the capture group
    // already requires `;` or `{`, so nested calls like `foo(bar(x));` are
    // picked up via the inner `bar(` only if followed directly by `)` and
    // `;`/`{`, which holds for the common one-call-per-statement case.
    called.retain(|name| !is_keyword(name));

    let symbol_deps: BTreeSet<String> =
        called.into_iter().filter(|name| !symbol_defs.contains(name)).collect();

    // `main` is the sole root symbol C contributes (§3 "Root symbol... or
    // the string `main`"); every other external definition is a plain
    // callable, never a build-tree root.
    let program_defs: BTreeSet<String> =
        if symbol_defs.contains("main") { BTreeSet::from(["main".to_string()]) } else { BTreeSet::new() };

    AnalysedFileData {
        path: path.to_path_buf(),
        content_hash,
        module_defs: BTreeSet::new(),
        module_deps: BTreeSet::new(),
        symbol_defs,
        symbol_deps,
        file_deps: BTreeSet::new(),
        program_defs,
    }
}
