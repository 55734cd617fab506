//! Pass 1 — prototype collection (spec §4.2).

use std::collections::HashMap;
use std::path::Path;

use crate::cleaner::{clean_source, extract_balanced_arg, split_statements};
use crate::error::{AscensionError, Result};

/// Recursively walk `source` (and every `include`d file, resolved against
/// `base_dir`) and record every `func NAME(ARGS);` or `func NAME(ARGS) {
/// ... }` as `NAME -> [param names]`. A name that reappears with a
/// different arity raises `PrototypeError` immediately (spec §4.2).
pub fn collect_prototypes(
    source: &str,
    base_dir: &Path,
    out: &mut HashMap<String, Vec<String>>,
) -> Result<()> {
    let cleaned = clean_source(source);
    let statements = split_statements(&cleaned);

    for stmt in statements {
        if let Some(path) = parse_include(&stmt) {
            let full = base_dir.join(&path);
            let included = std::fs::read_to_string(&full).map_err(|e| {
                AscensionError::linker(format!("cannot read include '{}': {e}", full.display()))
            })?;
            let included_base = full.parent().unwrap_or(base_dir).to_path_buf();
            collect_prototypes(&included, &included_base, out)?;
            continue;
        }

        if let Some((name, params)) = parse_func_header(&stmt) {
            if let Some(existing) = out.get(&name) {
                if existing.len() != params.len() {
                    return Err(AscensionError::prototype(format!(
                        "'{name}' redeclared with {} params, previously {}",
                        params.len(),
                        existing.len()
                    )));
                }
            } else {
                out.insert(name, params);
            }
        }
    }

    Ok(())
}

fn parse_include(stmt: &str) -> Option<String> {
    let rest = stmt.strip_prefix("include")?.trim();
    if rest.starts_with('"') && rest.ends_with('"') && rest.len() >= 2 {
        Some(rest[1..rest.len() - 1].to_string())
    } else {
        None
    }
}

/// Parse the `func NAME(ARGS)` header shared by both a bare prototype and a
/// full definition, returning `(name, params)`.
pub fn parse_func_header(stmt: &str) -> Option<(String, Vec<String>)> {
    let rest = stmt.strip_prefix("func")?;
    let rest = rest.trim_start();
    let paren = rest.find('(')?;
    let name = rest[..paren].trim().to_string();
    if name.is_empty() {
        return None;
    }
    let args_src = format!("{name}{}", &rest[paren..]);
    let args_src = trim_to_matching_paren(&args_src)?;
    let args = extract_balanced_arg(&args_src, &name)?;
    let params = if args.trim().is_empty() {
        Vec::new()
    } else {
        crate::cleaner::split_balanced_commas(args)
            .into_iter()
            .map(|p| p.trim().to_string())
            .collect()
    };
    Some((name, params))
}

/// `func NAME(ARGS)` may be followed by `;` (prototype) or `{ body }`
/// (definition); this trims a header string down to `NAME(ARGS)` so
/// [`extract_balanced_arg`] sees exactly a call-shaped suffix.
fn trim_to_matching_paren(s: &str) -> Option<String> {
    let open = s.find('(')?;
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] as char {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(s[..=i].to_string());
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prototype_header() {
        let (name, params) = parse_func_header("func even(n)").unwrap();
        assert_eq!(name, "even");
        assert_eq!(params, vec!["n"]);
    }

    #[test]
    fn parses_zero_arg_header() {
        let (name, params) = parse_func_header("func main()").unwrap();
        assert_eq!(name, "main");
        assert!(params.is_empty());
    }

    #[test]
    fn collects_from_plain_source() {
        let mut out = HashMap::new();
        collect_prototypes(
            "func even(n); func odd(n) { return 1; }",
            Path::new("."),
            &mut out,
        )
        .unwrap();
        assert_eq!(out.get("even"), Some(&vec!["n".to_string()]));
        assert_eq!(out.get("odd"), Some(&vec!["n".to_string()]));
    }

    #[test]
    fn arity_mismatch_is_prototype_error() {
        let mut out = HashMap::new();
        let err = collect_prototypes(
            "func f(a); func f(a, b) { return 1; }",
            Path::new("."),
            &mut out,
        )
        .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::PrototypeError);
    }
}
