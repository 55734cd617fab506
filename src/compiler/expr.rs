//! Right-to-left precedence expression emission (spec §4.2 "Expression
//! emission").
//!
//! Rather than a conventional Pratt/shunting-yard parser, the scanner walks
//! each precedence group from lowest to highest, and within a group picks
//! the *rightmost* depth-0 occurrence of an operator as the split point.
//! Spec §9 explicitly permits swapping in a textbook parser as long as
//! observable precedence/associativity match; this keeps the source's
//! approach because it is simple to get byte-for-byte compatible with the
//! test scenarios.

use crate::compiler::Compiler;
use crate::error::{AscensionError, Result};
use crate::opcode::{HostOp, Op};
use crate::value::Value;

/// Precedence groups, lowest first. Multi-character operators are listed
/// before any single-character operator that is their prefix, so `==` is
/// matched before a lone `=` would be (there is no bare `=` at expression
/// level — assignment is a statement form).
const PRECEDENCE: &[&[&str]] = &[
    &["||"],
    &["&&"],
    &["==", "!=", ">=", "<=", ">", "<"],
    &["+", "-"],
    &["*", "/", "%"],
];

impl Compiler {
    pub(crate) fn emit_expr(&mut self, expr: &str) -> Result<()> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(AscensionError::runtime("empty expression"));
        }

        if let Some(inner) = strip_outer_parens(expr) {
            return self.emit_expr(inner);
        }

        for group in PRECEDENCE {
            if let Some((left, op, right)) = rightmost_split(expr, group) {
                self.emit_expr(left)?;
                self.emit_expr(right)?;
                self.emit_binary_op(op);
                return Ok(());
            }
        }

        if let Some(rest) = expr.strip_prefix('!') {
            self.emit_expr(rest)?;
            self.program.push(Op::Not);
            return Ok(());
        }

        // Leading unary minus at position 0 is not a split point (spec
        // §4.2); treat it as negation of the remainder, unless the whole
        // thing is a numeric literal.
        if expr.starts_with('-') && parse_number(expr).is_none() {
            self.emit_expr(&expr[1..])?;
            self.program.push(Op::Neg);
            return Ok(());
        }

        self.emit_primary(expr)
    }

    pub(crate) fn emit_binary_op(&mut self, op: &str) {
        let opcode = match op {
            "||" => Op::Or,
            "&&" => Op::And,
            "==" => Op::Eq,
            "!=" => Op::Neq,
            ">=" => Op::Gte,
            "<=" => Op::Lte,
            ">" => Op::Gt,
            "<" => Op::Lt,
            "+" => Op::Add,
            "-" => Op::Sub,
            "*" => Op::Mul,
            "/" => Op::Div,
            "%" => Op::Mod,
            _ => unreachable!("unknown operator {op}"),
        };
        self.program.push(opcode);
    }

    fn emit_primary(&mut self, expr: &str) -> Result<()> {
        if let Some(v) = parse_number(expr) {
            self.program.push(Op::Push(v));
            return Ok(());
        }

        if expr.starts_with('"') && expr.ends_with('"') && expr.len() >= 2 {
            self.program.push(Op::Push(Value::Str(unescape(&expr[1..expr.len() - 1]))));
            return Ok(());
        }

        match expr {
            "true" => {
                self.program.push(Op::Push(Value::Int(1)));
                return Ok(());
            }
            "false" => {
                self.program.push(Op::Push(Value::Int(0)));
                return Ok(());
            }
            "NULL" => {
                self.program.push(Op::PushNull);
                return Ok(());
            }
            "PI" => {
                self.program.push(Op::Push(Value::Float(std::f64::consts::PI)));
                return Ok(());
            }
            "E" => {
                self.program.push(Op::Push(Value::Float(std::f64::consts::E)));
                return Ok(());
            }
            _ => {}
        }

        if let Some(rest) = expr.strip_prefix("new ") {
            return self.emit_new_struct(rest.trim());
        }

        if expr.starts_with('{') && expr.ends_with('}') {
            return self.emit_dict_literal(&expr[1..expr.len() - 1]);
        }

        if let Some((base, field)) = split_trailing_field(expr) {
            self.emit_expr(base)?;
            self.program.push(Op::GetAttr(field.to_string()));
            return Ok(());
        }

        if let Some((name, indices)) = split_indexing(expr) {
            return self.emit_index_load(name, indices);
        }

        if let Some((name, args)) = split_call(expr) {
            return self.emit_call(name, args);
        }

        if is_identifier(expr) {
            self.program.push(Op::Load(expr.to_string()));
            return Ok(());
        }

        Err(AscensionError::runtime(format!("cannot parse expression '{expr}'")))
    }

    fn emit_new_struct(&mut self, rest: &str) -> Result<()> {
        let paren = rest.find('(').ok_or_else(|| AscensionError::runtime("expected '(' after new T"))?;
        let type_name = rest[..paren].trim().to_string();
        self.program.push(Op::NewStruct(type_name));
        Ok(())
    }

    fn emit_dict_literal(&mut self, inner: &str) -> Result<()> {
        self.program.push(Op::PushDict);
        let inner = inner.trim();
        if inner.is_empty() {
            return Ok(());
        }
        for pair in crate::cleaner::split_balanced_commas(inner) {
            let colon = top_level_colon(&pair)
                .ok_or_else(|| AscensionError::runtime(format!("malformed dict entry '{pair}'")))?;
            let key = pair[..colon].trim();
            let val = pair[colon + 1..].trim();
            self.emit_expr(val)?;
            // Bareword keys get re-quoted as strings; this preserves the
            // documented quirk (spec §9a) where numeric-looking bareword
            // keys become strings rather than integer keys.
            let key_str = if key.starts_with('"') && key.ends_with('"') && key.len() >= 2 {
                unescape(&key[1..key.len() - 1])
            } else {
                key.to_string()
            };
            self.program.push(Op::Push(Value::Str(key_str)));
            self.program.push(Op::DictSet);
        }
        Ok(())
    }

    fn emit_index_load(&mut self, name: &str, indices: Vec<String>) -> Result<()> {
        match indices.len() {
            1 => {
                self.emit_expr(&indices[0])?;
                self.program.push(Op::LoadIdx(name.to_string()));
            }
            2 => {
                self.emit_expr(&indices[0])?;
                self.emit_expr(&indices[1])?;
                self.program.push(Op::LoadIdx2D(name.to_string()));
            }
            n => return Err(AscensionError::runtime(format!("unsupported {n}-dimensional index"))),
        }
        Ok(())
    }

    fn emit_call(&mut self, name: &str, args: Vec<String>) -> Result<()> {
        if self.try_emit_random(name, &args)? {
            return Ok(());
        }
        if self.emit_core_builtin(name, &args)?.is_some() {
            return Ok(());
        }
        if let Some(host) = host_op_for(name) {
            for a in &args {
                self.emit_expr(a)?;
            }
            self.program.push(Op::Host(host, args.len()));
            return Ok(());
        }
        for a in &args {
            self.emit_expr(a)?;
        }
        self.program.push(Op::Call(name.to_string()));
        Ok(())
    }

    /// Core (non-host) built-ins with their own dedicated opcodes. Returns
    /// `Some(())` when `name` was recognized and emitted.
    fn emit_core_builtin(&mut self, name: &str, args: &[String]) -> Result<Option<()>> {
        let op = match name {
            "to_int" => Op::ToInt,
            "to_float" => Op::ToFloat,
            "len" => Op::Len,
            "keys" => Op::Keys,
            "chr" => Op::Chr,
            "substr" => Op::Substr,
            "matrix" => Op::CreateMatrix,
            "rows" => Op::MatrixRows,
            "cols" => Op::MatrixCols,
            "dim" => Op::MatrixDim,
            _ => return Ok(None),
        };
        for a in args {
            self.emit_expr(a)?;
        }
        self.program.push(op);
        Ok(Some(()))
    }
}

fn host_op_for(name: &str) -> Option<HostOp> {
    use HostOp::*;
    Some(match name {
        "sqrt" => Sqrt,
        "pow" => Pow,
        "exp" => Exp,
        "log" => Log,
        "abs" => Abs,
        "floor" => Floor,
        "ceil" => Ceil,
        "sin" => Sin,
        "cos" => Cos,
        "tan" => Tan,
        "asin" => Asin,
        "acos" => Acos,
        "atan" => Atan,
        "atan2" => Atan2,
        "random" => return None, // arity-dependent, handled specially below
        "system" => System,
        "exec" => Exec,
        "open" => Open,
        "close" => Close,
        "write" => Write,
        "read_line" => ReadLine,
        "read_all" => ReadAll,
        "read" => Read,
        "http_get" => HttpGet,
        "http_post" => HttpPost,
        "response_status" => ResponseStatus,
        "response_body" => ResponseBody,
        "socket_open" => SocketOpen,
        "socket_close" => SocketClose,
        "socket_bind" => SocketBind,
        "socket_listen" => SocketListen,
        "socket_accept" => SocketAccept,
        "socket_connect" => SocketConnect,
        "socket_send" => SocketSend,
        "socket_recv" => SocketRecv,
        "get_ip" => GetIp,
        "curses_init" => CursesInit,
        "curses_end" => CursesEnd,
        "curses_clear" => CursesClear,
        "curses_move" => CursesMove,
        "curses_write" => CursesWrite,
        "curses_refresh" => CursesRefresh,
        "curses_read_key" => CursesReadKey,
        "tk_init" => Tk(crate::opcode::TkOp::Init),
        "tk_window" => Tk(crate::opcode::TkOp::Window),
        "tk_label" => Tk(crate::opcode::TkOp::Label),
        "tk_button" => Tk(crate::opcode::TkOp::Button),
        "tk_entry" => Tk(crate::opcode::TkOp::Entry),
        "tk_pack" => Tk(crate::opcode::TkOp::Pack),
        "tk_grid" => Tk(crate::opcode::TkOp::Grid),
        "tk_mainloop" => Tk(crate::opcode::TkOp::Mainloop),
        "tk_get_text" => Tk(crate::opcode::TkOp::GetText),
        "tk_set_text" => Tk(crate::opcode::TkOp::SetText),
        "tk_bind" => Tk(crate::opcode::TkOp::Bind),
        "tk_destroy" => Tk(crate::opcode::TkOp::Destroy),
        _ => return None,
    })
}

impl Compiler {
    /// `random()` / `random(max)` / `random(min,max)` — three call arities
    /// sharing one name (spec §8 supplemented built-ins).
    pub(crate) fn try_emit_random(&mut self, name: &str, args: &[String]) -> Result<bool> {
        if name != "random" {
            return Ok(false);
        }
        match args.len() {
            0 => {
                self.program.push(Op::Host(HostOp::RandomUnit, 0));
            }
            1 => {
                self.emit_expr(&args[0])?;
                self.program.push(Op::Host(HostOp::RandomMax, 1));
            }
            2 => {
                self.emit_expr(&args[0])?;
                self.emit_expr(&args[1])?;
                self.program.push(Op::Host(HostOp::RandomRange, 2));
            }
            n => return Err(AscensionError::runtime(format!("random() takes 0-2 args, got {n}"))),
        }
        Ok(true)
    }
}

fn parse_number(expr: &str) -> Option<Value> {
    if expr.is_empty() {
        return None;
    }
    if !expr.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    if expr.contains('.') {
        expr.parse::<f64>().ok().map(Value::Float)
    } else {
        expr.parse::<i64>().ok().map(Value::Int)
    }
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Strip one layer of parens if, and only if, they wrap the entire
/// expression (not just a leading call's argument list).
fn strip_outer_parens(expr: &str) -> Option<&str> {
    if !expr.starts_with('(') || !expr.ends_with(')') {
        return None;
    }
    let bytes = expr.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
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
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 && i != bytes.len() - 1 {
                    return None;
                }
            }
            _ => {}
        }
        i += 1;
    }
    Some(&expr[1..expr.len() - 1])
}

/// For each operator in `ops`, scan `expr` right to left at paren/bracket
/// depth 0 and return the rightmost match's split, preferring the first
/// operator in `ops` that occurs (the group's members are mutually
/// exclusive positions, so order only matters for multi-char vs
/// single-char prefixes within a group).
fn rightmost_split<'a>(expr: &'a str, ops: &[&str]) -> Option<(&'a str, &'a str, &'a str)> {
    let bytes = expr.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut positions: Vec<(usize, &str)> = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        let c = bytes[i] as char;
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
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            _ => {}
        }
        if depth == 0 && !in_string {
            for op in ops {
                if i == 0 && (*op == "-" || *op == "+") {
                    continue; // leading sign is unary, not a split point
                }
                if expr[i..].starts_with(op) {
                    // avoid matching '=' inside '==' etc. handled by group ordering
                    positions.push((i, op));
                    break;
                }
            }
        }
        i += 1;
    }
    let (pos, op) = positions.into_iter().last()?;
    let left = expr[..pos].trim();
    let right = expr[pos + op.len()..].trim();
    if left.is_empty() || right.is_empty() {
        return None;
    }
    Some((left, op, right))
}

/// Split `name.field`-shaped trailing field access at the rightmost
/// top-level `.`. Returns `None` when the whole expression is numeric
/// (so `3.14` is never mistaken for field access).
pub(crate) fn split_trailing_field(expr: &str) -> Option<(&str, &str)> {
    if parse_number(expr).is_some() {
        return None;
    }
    let bytes = expr.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut last_dot = None;
    let mut i = 0usize;
    while i < bytes.len() {
        let c = bytes[i] as char;
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
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            '.' if depth == 0 => last_dot = Some(i),
            _ => {}
        }
        i += 1;
    }
    let dot = last_dot?;
    let base = &expr[..dot];
    let field = &expr[dot + 1..];
    if base.is_empty() || !is_identifier(field) {
        return None;
    }
    Some((base, field))
}

/// Split `name[i]`, `name[i,j]`, or `name[i][j]` into `(name, [indices])`.
pub(crate) fn split_indexing(expr: &str) -> Option<(&str, Vec<String>)> {
    if !expr.ends_with(']') {
        return None;
    }
    let open = expr.find('[')?;
    let name = &expr[..open];
    if !is_identifier(name) {
        return None;
    }
    let rest = &expr[open..];
    // name[i][j] form: two bracket groups.
    if let Some(mid) = find_bracket_end(rest) {
        if mid < rest.len() - 1 && rest.as_bytes()[mid] == b'[' {
            let first = rest[1..mid - 1].trim().to_string();
            let second_open = mid;
            let second = rest[second_open + 1..rest.len() - 1].trim().to_string();
            return Some((name, vec![first, second]));
        }
    }
    let inner = &rest[1..rest.len() - 1];
    let parts = crate::cleaner::split_balanced_commas(inner);
    Some((name, parts))
}

/// Index just past the `]` that closes the `[` at position 0 of `s`.
fn find_bracket_end(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    if bytes.first().copied() != Some(b'[') {
        return None;
    }
    let mut depth = 0i32;
    for (i, b) in bytes.iter().enumerate() {
        match *b as char {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn split_call(expr: &str) -> Option<(&str, Vec<String>)> {
    if !expr.ends_with(')') {
        return None;
    }
    let open = expr.find('(')?;
    let name = &expr[..open];
    if !is_identifier(name) {
        return None;
    }
    let inner = crate::cleaner::extract_balanced_arg(expr, name)?;
    if inner.is_empty() {
        return Some((name, Vec::new()));
    }
    let parts = crate::cleaner::split_balanced_commas(inner);
    Some((name, parts))
}

pub(crate) fn top_level_colon(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut i = 0usize;
    while i < bytes.len() {
        let c = bytes[i] as char;
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
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ':' if depth == 0 => return Some(i),
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
    fn number_parsing() {
        assert!(matches!(parse_number("42"), Some(Value::Int(42))));
        assert!(matches!(parse_number("3.5"), Some(Value::Float(_))));
        assert_eq!(parse_number("abc"), None);
    }

    #[test]
    fn rightmost_split_picks_last_operator_at_depth_zero() {
        let (l, op, r) = rightmost_split("a + b + c", &["+", "-"]).unwrap();
        assert_eq!((l, op, r), ("a + b", "+", "c"));
    }

    #[test]
    fn rightmost_split_ignores_parenthesised_operators() {
        let (l, op, r) = rightmost_split("(a + b) * c", &["*", "/", "%"]).unwrap();
        assert_eq!((l, op, r), ("(a + b)", "*", "c"));
    }

    #[test]
    fn leading_minus_is_not_a_split() {
        assert_eq!(rightmost_split("-x", &["+", "-"]), None);
    }

    #[test]
    fn trailing_field_access_split() {
        assert_eq!(split_trailing_field("d.name"), Some(("d", "name")));
        assert_eq!(split_trailing_field("3.14"), None);
    }

    #[test]
    fn indexing_split_single_and_2d() {
        assert_eq!(split_indexing("arr[1]"), Some(("arr", vec!["1".to_string()])));
        assert_eq!(split_indexing("m[1,2]"), Some(("m", vec!["1".to_string(), "2".to_string()])));
        assert_eq!(split_indexing("m[1][2]"), Some(("m", vec!["1".to_string(), "2".to_string()])));
    }
}
