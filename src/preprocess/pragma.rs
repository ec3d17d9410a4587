//! The optional C-pragma injector (§4.5).
//!
//! Runs after C preprocessing, over `PreprocessedC` output: it reads the
//! GCC/Clang `cpp` line marker directives (`# <linenum> "<path>"
//! <flags...>`, flag `3` meaning "system header") that `CC -E` leaves in
//! its output, and rewrites them into a pair of sentinel comments
//! bracketing every system-include region. Those markers only exist in
//! already-preprocessed output, so this step cannot run before
//! preprocessing — see the decision recorded in SPEC_FULL.md §13. The
//! `.prag` file that results is what [`crate::analysis::c`] scans to tell
//! user code from system headers — a region between
//! [`SYSTEM_BEGIN`]/[`SYSTEM_END`] is skipped entirely by the analyser.

use once_cell::sync::Lazy;
use regex::Regex;

pub const SYSTEM_BEGIN: &str = "/*__FAB_SYSTEM_INCLUDE_BEGIN__*/";
pub const SYSTEM_END: &str = "/*__FAB_SYSTEM_INCLUDE_END__*/";

static RE_LINEMARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^#\s*\d+\s+"([^"]*)"((?:\s+\d+)*)\s*$"#).unwrap());

/// Rewrites `cpp` line markers into `SYSTEM_BEGIN`/`SYSTEM_END` sentinel
/// comments, dropping the markers themselves (they are not C and would
/// otherwise confuse the analyser's regex scan).
pub fn inject(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut in_system = false;

    for line in content.lines() {
        if let Some(cap) = RE_LINEMARKER.captures(line) {
            let flags: Vec<&str> = cap[2].split_whitespace().collect();
            let is_system = flags.contains(&"3");
            if is_system && !in_system {
                out.push_str(SYSTEM_BEGIN);
                out.push('\n');
                in_system = true;
            } else if !is_system && in_system {
                out.push_str(SYSTEM_END);
                out.push('\n');
                in_system = false;
            }
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    if in_system {
        out.push_str(SYSTEM_END);
        out.push('\n');
    }
    out
}

/// Removes every `SYSTEM_BEGIN..SYSTEM_END` region from a `.prag`-annotated
/// (or plain, unannotated) source string. Content with no sentinel pairs is
/// returned unchanged.
pub fn strip_system_includes(content: &str) -> String {
    if !content.contains(SYSTEM_BEGIN) {
        return content.to_string();
    }

    let mut out = String::with_capacity(content.len());
    let mut skipping = false;
    for line in content.lines() {
        if line == SYSTEM_BEGIN {
            skipping = true;
            continue;
        }
        if line == SYSTEM_END {
            skipping = false;
            continue;
        }
        if !skipping {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}
