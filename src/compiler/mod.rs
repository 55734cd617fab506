//! The two-pass compiler (spec §4.2): pass 1 collects prototypes, pass 2
//! emits opcodes for a flattened (include-expanded) statement list.

mod expr;
mod prototypes;
mod stmt;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::cleaner::{clean_source, split_statements};
use crate::error::{AscensionError, Result};
use crate::opcode::Program;

/// A loop or switch's break/continue targets, tracked as a stack so nested
/// constructs resolve correctly. `continue` always skips `Switch` frames and
/// targets the nearest enclosing `Loop`; `break` targets whichever frame is
/// innermost, loop or switch (spec §4.2's switch `break` row, and the Open
/// Question this raises about `continue` crossing a switch boundary,
/// resolved here — see DESIGN.md).
enum ControlFrame {
    Loop { continue_label: String, break_label: String },
    Switch { break_label: String },
}

impl ControlFrame {
    fn break_label(&self) -> &str {
        match self {
            ControlFrame::Loop { break_label, .. } => break_label,
            ControlFrame::Switch { break_label } => break_label,
        }
    }
}

pub struct Compiler {
    program: Program,
    label_counter: u64,
    control_stack: Vec<ControlFrame>,
    prototypes: HashMap<String, Vec<String>>,
    defined: HashSet<String>,
}

impl Compiler {
    /// Compile `source` (the top-level file's already-read contents) rooted
    /// at `base_dir`, the directory `include` paths resolve against.
    pub fn compile(source: &str, base_dir: &Path) -> Result<Program> {
        let mut prototypes = HashMap::new();
        prototypes::collect_prototypes(source, base_dir, &mut prototypes)?;

        let mut compiler = Compiler {
            program: Program::new(),
            label_counter: 0,
            control_stack: Vec::new(),
            prototypes,
            defined: HashSet::new(),
        };

        let statements = expand_includes(source, base_dir)?;
        for stmt in &statements {
            compiler.emit_statement(stmt)?;
        }

        let undefined: Vec<&String> =
            compiler.prototypes.keys().filter(|n| !compiler.defined.contains(*n)).collect();
        if !undefined.is_empty() {
            let mut names: Vec<&str> = undefined.iter().map(|s| s.as_str()).collect();
            names.sort_unstable();
            return Err(AscensionError::linker(format!(
                "undefined function bodies for prototypes: {}",
                names.join(", ")
            )));
        }

        compiler.program.link();
        Ok(compiler.program)
    }

    fn new_label(&mut self, prefix: &str) -> String {
        self.label_counter += 1;
        format!("__{prefix}_{}", self.label_counter)
    }

    /// Recursively compile a braced block's contents by re-splitting its
    /// body into statements and emitting each in turn.
    fn compile_block(&mut self, block: &str) -> Result<()> {
        let body = block_body(block);
        for stmt in split_statements(body) {
            self.emit_statement(&stmt)?;
        }
        Ok(())
    }
}

/// Strip exactly one outer `{` `}` pair (the block braces themselves) from a
/// `"{ ... }"` string.
fn block_body(block: &str) -> &str {
    let trimmed = block.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    }
}

/// Recursively flatten `include` statements into one ordered statement
/// list, cleaning and splitting each file the same way (spec §4.2 pass 1
/// note: "Recursively walks the source and every `include`d file").
fn expand_includes(source: &str, base_dir: &Path) -> Result<Vec<String>> {
    let cleaned = clean_source(source);
    let mut out = Vec::new();
    for stmt in split_statements(&cleaned) {
        if let Some(path) = parse_include_path(&stmt) {
            let full: PathBuf = base_dir.join(&path);
            let included = std::fs::read_to_string(&full).map_err(|e| {
                AscensionError::linker(format!("cannot read include '{}': {e}", full.display()))
            })?;
            let included_base = full.parent().unwrap_or(base_dir).to_path_buf();
            out.extend(expand_includes(&included, &included_base)?);
        } else {
            out.push(stmt);
        }
    }
    Ok(out)
}

fn parse_include_path(stmt: &str) -> Option<String> {
    let rest = stmt.strip_prefix("include")?.trim();
    if rest.starts_with('"') && rest.ends_with('"') && rest.len() >= 2 {
        Some(rest[1..rest.len() - 1].to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Op;

    #[test]
    fn compiles_trivial_print() {
        let program = Compiler::compile(r#"print("hi");"#, Path::new(".")).unwrap();
        assert!(program.ops.iter().any(|op| matches!(op, Op::Print(1))));
    }

    #[test]
    fn undefined_prototype_is_linker_error() {
        let err = Compiler::compile("func f(a);", Path::new(".")).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::LinkerError);
    }

    #[test]
    fn block_body_strips_braces() {
        assert_eq!(block_body("{ a(); b(); }"), " a(); b(); ");
    }
}
