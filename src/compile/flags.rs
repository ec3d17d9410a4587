//! Managed flag enforcement (§4.8 "Managed flags").
//!
//! The scheduler strips any user-supplied module-output-folder flag
//! (`-J` for gfortran, `-module` for ifort) and re-adds it pointing at the
//! single flat module folder, so every module for a project lands in one
//! place (§3 invariant: "Module-file output directory is a single flat
//! folder per project").

use crate::tool::ToolKind;
use std::path::Path;

/// Returns `user_flags` with any module-folder flag stripped and the
/// project's module directory re-added via the flag the given compiler
/// recognises. `-c` is asserted present for compilers this system
/// recognises (gfortran, ifort); unrecognised compilers are passed through
/// unmodified since we don't know their flag conventions.
pub fn managed_flags(kind: ToolKind, user_flags: &[String], module_dir: &Path) -> Vec<String> {
    let mut flags = Vec::with_capacity(user_flags.len() + 2);
    let mut skip_next = false;

    for flag in user_flags {
        if skip_next {
            skip_next = false;
            continue;
        }
        match kind {
            ToolKind::Gfortran if flag == "-J" => {
                skip_next = true;
                continue;
            }
            ToolKind::Gfortran if flag.starts_with("-J") => continue,
            ToolKind::Ifort if flag == "-module" => {
                skip_next = true;
                continue;
            }
            _ => {}
        }
        flags.push(flag.clone());
    }

    match kind {
        ToolKind::Gfortran => flags.push(format!("-J{}", module_dir.display())),
        ToolKind::Ifort => {
            flags.push("-module".into());
            flags.push(module_dir.display().to_string());
        }
        _ => {}
    }

    if matches!(kind, ToolKind::Gfortran | ToolKind::Ifort) && !flags.iter().any(|f| f == "-c") {
        flags.push("-c".into());
    }

    flags
}
