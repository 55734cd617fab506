//! Pass 2 statement emission (spec §4.2 "Statement forms and their
//! emission contracts").

use crate::cleaner::{extract_delimited, split_balanced_commas, split_top_level};
use crate::compiler::expr::{is_identifier, split_indexing, split_trailing_field, top_level_colon};
use crate::compiler::{block_body, Compiler, ControlFrame};
use crate::error::{AscensionError, Result};
use crate::opcode::Op;

/// The addressing mode an assignment's left-hand side resolves to (spec
/// §4.2's `LHS = E` / `LHS OP= E` rows).
enum Lvalue {
    Var(String),
    Field(String, String),
    Index(String, String),
    Index2D(String, String, String),
}

fn parse_lvalue(text: &str) -> Option<Lvalue> {
    let text = text.trim();
    if let Some((name, indices)) = split_indexing(text) {
        return match indices.len() {
            1 => Some(Lvalue::Index(name.to_string(), indices[0].clone())),
            2 => Some(Lvalue::Index2D(name.to_string(), indices[0].clone(), indices[1].clone())),
            _ => None,
        };
    }
    if let Some((base, field)) = split_trailing_field(text) {
        return Some(Lvalue::Field(base.to_string(), field.to_string()));
    }
    if is_identifier(text) {
        return Some(Lvalue::Var(text.to_string()));
    }
    None
}

fn starts_with_keyword(s: &str, kw: &str) -> bool {
    s.strip_prefix(kw)
        .map(|rest| rest.chars().next().map(|c| !(c.is_alphanumeric() || c == '_')).unwrap_or(true))
        .unwrap_or(false)
}

fn strip_keyword<'a>(s: &'a str, kw: &str) -> Result<&'a str> {
    if starts_with_keyword(s, kw) {
        Ok(s[kw.len()..].trim_start())
    } else {
        Err(AscensionError::runtime(format!("expected '{kw}' in '{s}'")))
    }
}

fn extract_paren_and_rest(s: &str) -> Result<(&str, &str)> {
    if !s.starts_with('(') {
        return Err(AscensionError::runtime(format!("expected '(' in '{s}'")));
    }
    let (inner, end) = extract_delimited(s, 0, '(', ')')
        .ok_or_else(|| AscensionError::runtime(format!("unbalanced parens in '{s}'")))?;
    Ok((inner, s[end..].trim_start()))
}

fn extract_brace_and_rest(s: &str) -> Result<(&str, &str)> {
    if !s.starts_with('{') {
        return Err(AscensionError::runtime(format!("expected '{{' in '{s}'")));
    }
    let (_inner, end) = extract_delimited(s, 0, '{', '}')
        .ok_or_else(|| AscensionError::runtime(format!("unbalanced braces in '{s}'")))?;
    Ok((&s[..end], s[end..].trim_start()))
}

impl Compiler {
    pub(crate) fn emit_statement(&mut self, stmt: &str) -> Result<()> {
        let stmt = stmt.trim();
        if stmt.is_empty() {
            return Ok(());
        }

        if starts_with_keyword(stmt, "struct") {
            return self.emit_struct(stmt);
        }
        if starts_with_keyword(stmt, "func") {
            return self.emit_func(stmt);
        }
        if starts_with_keyword(stmt, "return") {
            return self.emit_return(stmt);
        }
        if starts_with_keyword(stmt, "throw") {
            let rest = strip_keyword(stmt, "throw")?;
            self.emit_expr(rest)?;
            self.program.push(Op::Throw);
            return Ok(());
        }
        if starts_with_keyword(stmt, "try") {
            return self.emit_try(stmt);
        }
        if starts_with_keyword(stmt, "global") {
            return self.emit_global(stmt);
        }
        if starts_with_keyword(stmt, "switch") {
            return self.emit_switch(stmt);
        }
        if starts_with_keyword(stmt, "for") {
            return self.emit_for(stmt);
        }
        if starts_with_keyword(stmt, "while") {
            return self.emit_while(stmt);
        }
        if starts_with_keyword(stmt, "if") {
            return self.emit_if(stmt);
        }
        if stmt == "break" {
            let label = self
                .control_stack
                .last()
                .map(|f| f.break_label().to_string())
                .ok_or_else(|| AscensionError::runtime("'break' outside loop/switch"))?;
            self.program.push(Op::Jmp(label));
            return Ok(());
        }
        if stmt == "continue" {
            let label = self
                .control_stack
                .iter()
                .rev()
                .find_map(|f| match f {
                    ControlFrame::Loop { continue_label, .. } => Some(continue_label.clone()),
                    ControlFrame::Switch { .. } => None,
                })
                .ok_or_else(|| AscensionError::runtime("'continue' outside loop"))?;
            self.program.push(Op::Jmp(label));
            return Ok(());
        }
        if starts_with_keyword(stmt, "print") {
            return self.emit_print(stmt);
        }

        self.emit_assignment_or_expr(stmt)
    }

    fn emit_struct(&mut self, stmt: &str) -> Result<()> {
        let rest = strip_keyword(stmt, "struct")?;
        let brace = rest.find('{').ok_or_else(|| AscensionError::runtime("expected '{' in struct decl"))?;
        let name = rest[..brace].trim().to_string();
        let (inner, _end) = extract_delimited(rest, brace, '{', '}')
            .ok_or_else(|| AscensionError::runtime("unbalanced struct braces"))?;
        let fields = split_balanced_commas(inner).into_iter().filter(|f| !f.is_empty()).collect();
        self.program.structs.insert(name, fields);
        Ok(())
    }

    fn emit_func(&mut self, stmt: &str) -> Result<()> {
        let (name, params) = crate::compiler::prototypes::parse_func_header(stmt)
            .ok_or_else(|| AscensionError::runtime(format!("malformed function header '{stmt}'")))?;

        if !stmt.trim_end().ends_with('}') {
            // Bare prototype: `func NAME(ARGS);` — already recorded in pass 1.
            return Ok(());
        }

        let brace = stmt.find('{').ok_or_else(|| AscensionError::runtime("expected function body"))?;
        let (body_block, _rest) = extract_brace_and_rest(&stmt[brace..])?;

        let skip_label = self.new_label("func_skip");
        self.program.push(Op::Jmp(skip_label.clone()));
        self.program.push(Op::Label(name.clone()));
        for param in params.iter().rev() {
            self.program.push(Op::Store(param.clone()));
        }
        self.compile_block(body_block)?;
        self.program.push(Op::Ret);
        self.program.push(Op::Label(skip_label));

        self.defined.insert(name);
        Ok(())
    }

    fn emit_return(&mut self, stmt: &str) -> Result<()> {
        let rest = strip_keyword(stmt, "return")?;
        if rest.trim().is_empty() {
            self.program.push(Op::Ret);
        } else {
            self.emit_expr(rest)?;
            self.program.push(Op::RetVal);
        }
        Ok(())
    }

    fn emit_try(&mut self, stmt: &str) -> Result<()> {
        let rest = strip_keyword(stmt, "try")?;
        let (try_block, rest) = extract_brace_and_rest(rest)?;
        let rest = strip_keyword(rest, "catch")?;

        let (var_name, catch_block) = if rest.starts_with('(') {
            let (var_expr, rest) = extract_paren_and_rest(rest)?;
            let (block, _rest) = extract_brace_and_rest(rest)?;
            (Some(var_expr.trim().to_string()), block)
        } else {
            let (block, _rest) = extract_brace_and_rest(rest)?;
            (None, block)
        };

        let catch_label = self.new_label("catch");
        let end_label = self.new_label("try_end");

        self.program.push(Op::TryStart(catch_label.clone()));
        self.compile_block(try_block)?;
        self.program.push(Op::TryEnd(end_label.clone()));
        self.program.push(Op::Label(catch_label));
        match var_name {
            Some(v) => self.program.push(Op::Store(v)),
            None => self.program.push(Op::Pop),
        };
        self.compile_block(catch_block)?;
        self.program.push(Op::Label(end_label));
        Ok(())
    }

    fn emit_global(&mut self, stmt: &str) -> Result<()> {
        let rest = strip_keyword(stmt, "global")?;
        let (idx, op) =
            find_assign_op(rest).ok_or_else(|| AscensionError::runtime(format!("malformed global decl '{stmt}'")))?;
        let name = rest[..idx].trim();
        if !is_identifier(name) {
            return Err(AscensionError::runtime(format!("invalid global target '{name}'")));
        }
        let rhs = rest[idx + op.len()..].trim();
        if op == "=" {
            self.emit_expr(rhs)?;
        } else {
            self.program.push(Op::LoadGlobal(name.to_string()));
            self.emit_expr(rhs)?;
            self.emit_binary_op(&op[..op.len() - 1]);
        }
        self.program.push(Op::StoreGlobal(name.to_string()));
        Ok(())
    }

    fn emit_switch(&mut self, stmt: &str) -> Result<()> {
        let rest = strip_keyword(stmt, "switch")?;
        let (cond, rest) = extract_paren_and_rest(rest)?;
        let (block, _rest) = extract_brace_and_rest(rest)?;

        self.emit_expr(cond)?;
        let end_label = self.new_label("switch_end");
        self.control_stack.push(ControlFrame::Switch { break_label: end_label.clone() });

        let mut default_stmt = None;
        for inner in crate::cleaner::split_statements(block_body(block)) {
            if starts_with_keyword(&inner, "default") {
                default_stmt = Some(inner);
                continue;
            }
            let rest2 = strip_keyword(&inner, "case")?;
            let colon = top_level_colon(rest2)
                .ok_or_else(|| AscensionError::runtime(format!("malformed case '{inner}'")))?;
            let value_expr = rest2[..colon].trim().to_string();
            let case_block = rest2[colon + 1..].trim().to_string();

            let next_label = self.new_label("case_next");
            self.program.push(Op::Dup);
            self.emit_expr(&value_expr)?;
            self.program.push(Op::Eq);
            self.program.push(Op::Jz(next_label.clone()));
            self.compile_block(&case_block)?;
            self.program.push(Op::Jmp(end_label.clone()));
            self.program.push(Op::Label(next_label));
        }

        if let Some(default_stmt) = default_stmt {
            let rest2 = strip_keyword(&default_stmt, "default")?;
            let colon = top_level_colon(rest2)
                .ok_or_else(|| AscensionError::runtime("malformed default case"))?;
            let default_block = rest2[colon + 1..].trim().to_string();
            self.compile_block(&default_block)?;
        }

        self.program.push(Op::Label(end_label));
        self.program.push(Op::Pop);
        self.control_stack.pop();
        Ok(())
    }

    fn emit_for(&mut self, stmt: &str) -> Result<()> {
        let rest = strip_keyword(stmt, "for")?;
        let (header, rest) = extract_paren_and_rest(rest)?;
        let (block, _rest) = extract_brace_and_rest(rest)?;

        let parts = split_top_level(header, ';');
        if parts.len() != 3 {
            return Err(AscensionError::runtime(format!("malformed for-header '{header}'")));
        }
        let init = parts[0].trim().to_string();
        let cond = parts[1].trim().to_string();
        let step = parts[2].trim().to_string();

        if !init.is_empty() {
            self.emit_statement(&init)?;
        }

        let start_label = self.new_label("for_start");
        let step_label = self.new_label("for_step");
        let end_label = self.new_label("for_end");

        self.program.push(Op::Label(start_label.clone()));
        if !cond.is_empty() {
            self.emit_expr(&cond)?;
            self.program.push(Op::Jz(end_label.clone()));
        }

        self.control_stack.push(ControlFrame::Loop {
            continue_label: step_label.clone(),
            break_label: end_label.clone(),
        });
        self.compile_block(block)?;
        self.control_stack.pop();

        self.program.push(Op::Label(step_label));
        if !step.is_empty() {
            self.emit_statement(&step)?;
        }
        self.program.push(Op::Jmp(start_label));
        self.program.push(Op::Label(end_label));
        Ok(())
    }

    fn emit_while(&mut self, stmt: &str) -> Result<()> {
        let rest = strip_keyword(stmt, "while")?;
        let (cond, rest) = extract_paren_and_rest(rest)?;
        let (block, _rest) = extract_brace_and_rest(rest)?;

        let start_label = self.new_label("while_start");
        let end_label = self.new_label("while_end");

        self.program.push(Op::Label(start_label.clone()));
        self.emit_expr(cond)?;
        self.program.push(Op::Jz(end_label.clone()));

        self.control_stack.push(ControlFrame::Loop {
            continue_label: start_label.clone(),
            break_label: end_label.clone(),
        });
        self.compile_block(block)?;
        self.control_stack.pop();

        self.program.push(Op::Jmp(start_label));
        self.program.push(Op::Label(end_label));
        Ok(())
    }

    fn emit_if(&mut self, stmt: &str) -> Result<()> {
        let end_label = self.new_label("if_end");
        let mut rest = stmt.trim().to_string();

        loop {
            let after_if = strip_keyword(&rest, "if")?;
            let (cond, after_cond) = extract_paren_and_rest(after_if)?;
            let (block, after_block) = extract_brace_and_rest(after_cond)?;
            let (cond, block) = (cond.to_string(), block.to_string());

            let next_label = self.new_label("if_next");
            self.emit_expr(&cond)?;
            self.program.push(Op::Jz(next_label.clone()));
            self.compile_block(&block)?;
            self.program.push(Op::Jmp(end_label.clone()));
            self.program.push(Op::Label(next_label));

            let after_block = after_block.trim().to_string();
            if starts_with_keyword(&after_block, "else") {
                let after_else = strip_keyword(&after_block, "else")?;
                if starts_with_keyword(after_else, "if") {
                    rest = after_else.to_string();
                    continue;
                }
                let (else_block, _rest) = extract_brace_and_rest(after_else)?;
                self.compile_block(else_block)?;
                break;
            } else {
                break;
            }
        }

        self.program.push(Op::Label(end_label));
        Ok(())
    }

    fn emit_print(&mut self, stmt: &str) -> Result<()> {
        let inner = crate::cleaner::extract_balanced_arg(stmt, "print")
            .ok_or_else(|| AscensionError::runtime(format!("malformed print '{stmt}'")))?;
        let args = if inner.trim().is_empty() { Vec::new() } else { split_balanced_commas(inner) };
        for a in &args {
            self.emit_expr(a)?;
        }
        self.program.push(Op::Print(args.len()));
        Ok(())
    }

    fn emit_assignment_or_expr(&mut self, stmt: &str) -> Result<()> {
        if let Some((idx, op)) = find_assign_op(stmt) {
            let lhs_text = stmt[..idx].trim();
            let rhs_text = stmt[idx + op.len()..].trim();
            let lvalue = parse_lvalue(lhs_text)
                .ok_or_else(|| AscensionError::runtime(format!("invalid assignment target '{lhs_text}'")))?;

            if op == "=" {
                self.emit_expr(rhs_text)?;
                self.emit_store(lvalue)?;
            } else {
                self.emit_load(&lvalue)?;
                self.emit_expr(rhs_text)?;
                self.emit_binary_op(&op[..op.len() - 1]);
                self.emit_store(lvalue)?;
            }
            return Ok(());
        }

        self.emit_expr(stmt)?;
        self.program.push(Op::Pop);
        Ok(())
    }

    fn emit_load(&mut self, lvalue: &Lvalue) -> Result<()> {
        match lvalue {
            Lvalue::Var(name) => self.program.push(Op::Load(name.clone())),
            Lvalue::Field(base, field) => {
                self.emit_expr(base)?;
                self.program.push(Op::GetAttr(field.clone()));
            }
            Lvalue::Index(name, idx) => {
                self.emit_expr(idx)?;
                self.program.push(Op::LoadIdx(name.clone()));
            }
            Lvalue::Index2D(name, row, col) => {
                self.emit_expr(row)?;
                self.emit_expr(col)?;
                self.program.push(Op::LoadIdx2D(name.clone()));
            }
        }
        Ok(())
    }

    fn emit_store(&mut self, lvalue: Lvalue) -> Result<()> {
        match lvalue {
            Lvalue::Var(name) => {
                self.program.push(Op::Store(name));
            }
            Lvalue::Field(base, field) => {
                self.emit_expr(&base)?;
                self.program.push(Op::SetAttr(field));
            }
            Lvalue::Index(name, idx) => {
                self.emit_expr(&idx)?;
                self.program.push(Op::StoreIdx(name));
            }
            Lvalue::Index2D(name, row, col) => {
                self.emit_expr(&row)?;
                self.emit_expr(&col)?;
                self.program.push(Op::StoreIdx2D(name));
            }
        }
        Ok(())
    }
}

/// Find the first top-level assignment operator (`=`, `+=`, `-=`, `*=`,
/// `/=`, `%=`), skipping anything inside parens/brackets/braces/strings and
/// refusing to match the `=` inside `==`, `!=`, `>=`, `<=`.
fn find_assign_op(stmt: &str) -> Option<(usize, &'static str)> {
    let bytes = stmt.as_bytes();
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
            _ => {}
        }
        if depth == 0 && !in_string {
            for (op, len) in [("+=", 2), ("-=", 2), ("*=", 2), ("/=", 2), ("%=", 2)] {
                if stmt[i..].starts_with(op) {
                    return Some((i, &op[..len]));
                }
            }
            if c == '=' {
                let prev = if i == 0 { None } else { Some(bytes[i - 1] as char) };
                let next = bytes.get(i + 1).map(|b| *b as char);
                if next != Some('=') && !matches!(prev, Some('=') | Some('!') | Some('<') | Some('>')) {
                    return Some((i, "="));
                }
            }
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_plain_assignment() {
        assert_eq!(find_assign_op("x = 1 + 2"), Some((2, "=")));
    }

    #[test]
    fn finds_compound_assignment() {
        assert_eq!(find_assign_op("i += 1"), Some((2, "+=")));
    }

    #[test]
    fn ignores_equality_operator() {
        assert_eq!(find_assign_op("x == 1"), None);
        assert_eq!(find_assign_op("x >= 1"), None);
    }

    #[test]
    fn ignores_assignment_inside_call_args() {
        assert_eq!(find_assign_op("f(a == b)"), None);
    }
}
