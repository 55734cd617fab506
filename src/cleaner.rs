//! Comment stripping and statement splitting (spec §4.1).
//!
//! The cleaner and splitter never build a token stream: they work directly
//! over `&str`, tracking just enough depth state (string/paren/brace) to
//! know where a structural character is "real" versus quoted or commented
//! out.

/// Strip `//` and `/* */` comments, string-aware, collapsing whitespace runs
/// to single spaces.
pub fn clean_source(src: &str) -> String {
    // Scanned as `char`s, not raw bytes: a byte-indexed `bytes[i] as char`
    // cast would reinterpret each byte of a multi-byte UTF-8 sequence as its
    // own Latin-1 codepoint, corrupting any non-ASCII text that passes
    // through the `in_string` branch below (e.g. `print("café");`).
    let chars: Vec<char> = src.chars().collect();
    let mut out = String::with_capacity(src.len());
    let mut i = 0;
    let mut in_string = false;
    let mut last_was_space = false;

    while i < chars.len() {
        let c = chars[i];

        if in_string {
            out.push(c);
            last_was_space = false;
            if c == '\\' && i + 1 < chars.len() {
                out.push(chars[i + 1]);
                i += 2;
                continue;
            }
            if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        if c == '"' {
            in_string = true;
            out.push(c);
            last_was_space = false;
            i += 1;
            continue;
        }

        if c == '/' && i + 1 < chars.len() && chars[i + 1] == '/' {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        if c == '/' && i + 1 < chars.len() && chars[i + 1] == '*' {
            i += 2;
            while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                i += 1;
            }
            i += 2;
            continue;
        }

        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
            i += 1;
            continue;
        }

        out.push(c);
        last_was_space = false;
        i += 1;
    }

    out.trim().to_string()
}

/// Split cleaned source into top-level statement strings.
///
/// A `;` at zero brace/paren depth terminates a statement. A `}` closing to
/// brace depth 0 also terminates, unless the next non-space text is `else`
/// or `catch`, in which case the chain stays attached to the same statement
/// (so `if {...} else {...}` and `try {...} catch {...}` are one unit).
pub fn split_statements(cleaned: &str) -> Vec<String> {
    let chars: Vec<char> = cleaned.chars().collect();
    let mut statements = Vec::new();
    let mut start = 0usize;
    let mut brace_depth = 0i32;
    let mut paren_depth = 0i32;
    let mut bracket_depth = 0i32;
    let mut in_string = false;
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];

        if in_string {
            if c == '\\' {
                i += 2;
                continue;
            }
            if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        match c {
            '"' => in_string = true,
            '(' => paren_depth += 1,
            ')' => paren_depth -= 1,
            '[' => bracket_depth += 1,
            ']' => bracket_depth -= 1,
            '{' => brace_depth += 1,
            '}' => {
                brace_depth -= 1;
                if brace_depth == 0 && paren_depth == 0 && bracket_depth == 0 {
                    let rest: String = chars[i + 1..].iter().collect();
                    let rest_trimmed = rest.trim_start();
                    if rest_trimmed.starts_with("else") || rest_trimmed.starts_with("catch") {
                        i += 1;
                        continue;
                    }
                    let stmt: String = chars[start..=i].iter().collect();
                    let trimmed = stmt.trim();
                    if !trimmed.is_empty() {
                        statements.push(trimmed.to_string());
                    }
                    i += 1;
                    start = i;
                    continue;
                }
            }
            ';' => {
                if brace_depth == 0 && paren_depth == 0 && bracket_depth == 0 {
                    let stmt: String = chars[start..i].iter().collect();
                    let trimmed = stmt.trim();
                    if !trimmed.is_empty() {
                        statements.push(trimmed.to_string());
                    }
                    i += 1;
                    start = i;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }

    let tail: String = chars[start..].iter().collect();
    let tail_trimmed = tail.trim();
    if !tail_trimmed.is_empty() {
        statements.push(tail_trimmed.to_string());
    }

    statements
}

/// Return the substring between the outermost parens of `name(...)`, when
/// `expr` is exactly a call to `name` ending at the final `)`.
pub fn extract_balanced_arg<'a>(expr: &'a str, name: &str) -> Option<&'a str> {
    let expr = expr.trim();
    if !expr.starts_with(name) || !expr.ends_with(')') {
        return None;
    }
    let after = expr[name.len()..].trim_start();
    if !after.starts_with('(') {
        return None;
    }
    let open_offset = expr.len() - after.len();
    // Matched and skipped byte-by-byte against ASCII delimiters, never
    // reinterpreted as a `char`: UTF-8 continuation bytes (0x80-0xBF) never
    // equal an ASCII byte, so this can't mistake the tail of a multi-byte
    // character for a delimiter, and the returned offsets stay valid byte
    // indices for slicing `expr` without decoding it at all.
    let bytes = expr.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut i = open_offset;
    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == b'"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    if i == bytes.len() - 1 {
                        return Some(expr[open_offset + 1..i].trim());
                    }
                    return None;
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Return the body between the balanced `{}` pair starting at `pos` (which
/// must point at the opening brace), and the index just past the closing
/// brace.
pub fn extract_braced_block(text: &str, pos: usize) -> Option<(&str, usize)> {
    let bytes = text.as_bytes();
    if bytes.get(pos).copied() != Some(b'{') {
        return None;
    }
    // Byte-wise, compared only against ASCII delimiters (see
    // `extract_balanced_arg`) so non-ASCII content inside the block passes
    // through untouched rather than being decoded and re-cast.
    let mut depth = 0i32;
    let mut in_string = false;
    let mut i = pos;
    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == b'"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((&text[pos + 1..i], i + 1));
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Return the matching delimiter's contents and the index just past it,
/// given `text.as_bytes()[pos]` is `open`. Shared by paren- and brace-aware
/// header parsing (`if (...)`, `for (...)`, `{ ... }` bodies).
pub fn extract_delimited(text: &str, pos: usize, open: char, close: char) -> Option<(&str, usize)> {
    debug_assert!(open.is_ascii() && close.is_ascii(), "delimiters are always ASCII braces/parens");
    let (open, close) = (open as u8, close as u8);
    let bytes = text.as_bytes();
    if bytes.get(pos).copied() != Some(open) {
        return None;
    }
    // Byte-wise, compared only against ASCII delimiters (see
    // `extract_balanced_arg`) so non-ASCII content inside the delimited span
    // passes through untouched rather than being decoded and re-cast.
    let mut depth = 0i32;
    let mut in_string = false;
    let mut i = pos;
    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == b'"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        if b == b'"' {
            in_string = true;
        } else if b == open {
            depth += 1;
        } else if b == close {
            depth -= 1;
            if depth == 0 {
                return Some((&text[pos + 1..i], i + 1));
            }
        }
        i += 1;
    }
    None
}

/// Split `text` on a top-level separator character (used for the
/// `init;cond;step` for-loop header and `case V:` value/block splits).
pub fn split_top_level(text: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut cur = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_string {
            cur.push(c);
            if c == '\\' {
                if let Some(n) = chars.next() {
                    cur.push(n);
                }
                continue;
            }
            if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                cur.push(c);
            }
            '(' | '[' | '{' => {
                depth += 1;
                cur.push(c);
            }
            ')' | ']' | '}' => {
                depth -= 1;
                cur.push(c);
            }
            _ if c == sep && depth == 0 => {
                parts.push(cur.clone());
                cur.clear();
            }
            _ => cur.push(c),
        }
    }
    parts.push(cur);
    parts
}

/// Split a comma-separated argument list respecting parens, brackets,
/// braces, and string literals.
pub fn split_balanced_commas(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut cur = String::new();
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if in_string {
            cur.push(c);
            if c == '\\' {
                if let Some(n) = chars.next() {
                    cur.push(n);
                }
                continue;
            }
            if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                cur.push(c);
            }
            '(' | '[' | '{' => {
                depth += 1;
                cur.push(c);
            }
            ')' | ']' | '}' => {
                depth -= 1;
                cur.push(c);
            }
            ',' if depth == 0 => {
                parts.push(cur.trim().to_string());
                cur = String::new();
            }
            _ => cur.push(c),
        }
    }
    let tail = cur.trim();
    if !tail.is_empty() {
        parts.push(tail.to_string());
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_line_and_block_comments() {
        let src = "x = 1; // set x\n/* block\ncomment */ y = 2;";
        assert_eq!(clean_source(src), "x = 1; y = 2;");
    }

    #[test]
    fn preserves_slashes_inside_strings() {
        let src = r#"print("a // b");"#;
        assert_eq!(clean_source(src), r#"print("a // b");"#);
    }

    #[test]
    fn non_ascii_string_contents_round_trip() {
        let src = r#"print("café");"#;
        assert_eq!(clean_source(src), r#"print("café");"#);
    }

    #[test]
    fn splits_on_top_level_semicolons() {
        let cleaned = "x = 1; y = 2;";
        let stmts = split_statements(cleaned);
        assert_eq!(stmts, vec!["x = 1", "y = 2"]);
    }

    #[test]
    fn keeps_else_chain_attached() {
        let cleaned = "if (x) { a(); } else { b(); }";
        let stmts = split_statements(cleaned);
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0], cleaned);
    }

    #[test]
    fn keeps_catch_chain_attached() {
        let cleaned = "try { a(); } catch (e) { b(); }";
        let stmts = split_statements(cleaned);
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn extracts_balanced_call_arg() {
        assert_eq!(extract_balanced_arg("len(arr)", "len"), Some("arr"));
        assert_eq!(extract_balanced_arg("foo(bar(1,2))", "foo"), Some("bar(1,2)"));
        assert_eq!(extract_balanced_arg("foo(bar) + 1", "foo"), None);
    }

    #[test]
    fn extracts_braced_block_with_nesting() {
        let text = "{ if (x) { y(); } }";
        let (body, end) = extract_braced_block(text, 0).unwrap();
        assert_eq!(body, " if (x) { y(); } ");
        assert_eq!(end, text.len());
    }

    #[test]
    fn splits_top_level_on_semicolons() {
        let parts = split_top_level("i = 0; i < 10; i += 1", ';');
        assert_eq!(parts, vec![" i = 0", " i < 10", " i += 1"]);
    }

    #[test]
    fn extract_delimited_matches_parens() {
        let (inner, end) = extract_delimited("(a, b) rest", 0, '(', ')').unwrap();
        assert_eq!(inner, "a, b");
        assert_eq!(&"(a, b) rest"[end..], " rest");
    }

    #[test]
    fn splits_commas_respecting_nesting_and_strings() {
        let parts = split_balanced_commas(r#"a, f(b,c), "x,y""#);
        assert_eq!(parts, vec!["a", "f(b,c)", "\"x,y\""]);
    }
}
