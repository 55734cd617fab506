//! The stack-based virtual machine (spec §4.3, §5).

pub(crate) mod ops;

use std::collections::HashMap;
use std::io::Write as _;

use crate::error::{AscensionError, ErrorKind, Result};
use crate::host::HostServices;
use crate::opcode::{Op, Program};
use crate::value::{Key, Value};

/// Global map plus a stack of per-call frame maps (spec §3 "Environment").
/// `frames[0]` is the implicit top-level frame, pushed once and never
/// popped; stores issued while it is the active frame always land in
/// `global` (spec §4.3 "Variable resolution").
struct Environment {
    global: HashMap<String, Value>,
    frames: Vec<HashMap<String, Value>>,
}

impl Environment {
    fn new() -> Self {
        Self { global: HashMap::new(), frames: vec![HashMap::new()] }
    }

    fn load(&self, name: &str) -> Value {
        let top = self.frames.len() - 1;
        if let Some(v) = self.frames[top].get(name) {
            return v.clone();
        }
        if let Some(v) = self.global.get(name) {
            return v.clone();
        }
        Value::Int(0)
    }

    fn store(&mut self, name: &str, value: Value) {
        let top = self.frames.len() - 1;
        if self.frames[top].contains_key(name) {
            self.frames[top].insert(name.to_string(), value);
        } else if self.global.contains_key(name) {
            self.global.insert(name.to_string(), value);
        } else if top == 0 {
            self.global.insert(name.to_string(), value);
        } else {
            self.frames[top].insert(name.to_string(), value);
        }
    }

    fn load_global(&self, name: &str) -> Value {
        self.global.get(name).cloned().unwrap_or(Value::Int(0))
    }

    fn store_global(&mut self, name: &str, value: Value) {
        self.global.insert(name.to_string(), value);
    }
}

/// The `(catch_label_ip, frame_depth, call_depth)` handler triple captured
/// at `TRY_START` (spec §3 Glossary "Handler triple").
struct Handler {
    catch_ip: usize,
    frame_depth: usize,
    call_depth: usize,
}

pub struct Vm {
    stack: Vec<Value>,
    env: Environment,
    call_stack: Vec<(usize, usize)>,
    try_stack: Vec<Handler>,
    host: Box<dyn HostServices>,
    output: Box<dyn std::io::Write>,
    ip: usize,
}

/// Sentinel `return_ip` marking a call-stack entry pushed for callback
/// re-entry rather than a real `CALL` (spec §5).
const CALLBACK_SENTINEL: usize = usize::MAX;

impl Vm {
    pub fn new(host: Box<dyn HostServices>) -> Self {
        Self::with_output(host, Box::new(std::io::stdout()))
    }

    /// Same as [`Vm::new`] but `PRINT` (spec §4.3) writes to `output`
    /// instead of stdout — the seam integration tests use to capture script
    /// output without spawning a subprocess.
    pub fn with_output(host: Box<dyn HostServices>, output: Box<dyn std::io::Write>) -> Self {
        Self {
            stack: Vec::new(),
            env: Environment::new(),
            call_stack: Vec::new(),
            try_stack: Vec::new(),
            host,
            output,
            ip: 0,
        }
    }

    /// Run `program` to completion from the top.
    pub fn run(&mut self, program: &Program) -> Result<()> {
        self.ip = 0;
        self.execute(program, None)
    }

    /// Re-enter the dispatch loop to run `name` on the current thread, used
    /// by host GUI event loops to fire script callbacks (spec §5). Pushes a
    /// sentinel call-stack entry so the shared dispatcher knows when to
    /// return control to the host instead of falling off the program end.
    pub fn call_function(&mut self, program: &Program, name: &str, args: Vec<Value>) -> Result<Value> {
        let target = program
            .label_index(name)
            .ok_or_else(|| AscensionError::linker(format!("undefined function '{name}'")))?;

        for a in args {
            self.stack.push(a);
        }
        let stop_depth = self.call_stack.len();
        self.call_stack.push((CALLBACK_SENTINEL, self.env.frames.len()));
        self.env.frames.push(HashMap::new());

        let saved_ip = self.ip;
        self.ip = target;
        self.execute(program, Some(stop_depth))?;
        self.ip = saved_ip;

        Ok(self.stack.pop().unwrap_or(Value::Null))
    }

    fn execute(&mut self, program: &Program, stop_at_call_depth: Option<usize>) -> Result<()> {
        loop {
            if self.ip >= program.len() {
                break;
            }
            if let Some(stop) = stop_at_call_depth {
                if self.call_stack.len() <= stop {
                    break;
                }
            }

            let op = program.ops[self.ip].clone();
            let mut advance = true;
            match self.step(program, &op, &mut advance) {
                Ok(()) => {}
                Err(err) => {
                    if let Some(catch_ip) = self.unwind_to_handler() {
                        self.stack.push(Value::Str(err.message.clone()));
                        self.ip = catch_ip;
                        advance = false;
                    } else {
                        return Err(err.with_ip(self.ip));
                    }
                }
            }

            if advance {
                self.ip += 1;
            }
        }
        Ok(())
    }

    /// Pop the innermost handler and restore `frames`/`call_stack` to the
    /// depths captured at `TRY_START` (spec §4.3 "Try/catch"). The handler
    /// triple carries no operand-stack depth, so the value stack is left
    /// as-is; this matches the triple's literal shape rather than adding a
    /// fourth field (see DESIGN.md).
    fn unwind_to_handler(&mut self) -> Option<usize> {
        let handler = self.try_stack.pop()?;
        self.env.frames.truncate(handler.frame_depth);
        self.call_stack.truncate(handler.call_depth);
        Some(handler.catch_ip)
    }

    fn pop(&mut self) -> Result<Value> {
        self.stack.pop().ok_or_else(|| AscensionError::runtime("operand stack underflow"))
    }

    fn step(&mut self, program: &Program, op: &Op, advance: &mut bool) -> Result<()> {
        match op {
            Op::Push(v) => self.stack.push(v.clone()),
            Op::PushNull => self.stack.push(Value::Null),
            Op::Pop => {
                self.pop()?;
            }
            Op::Dup => {
                let v = self.stack.last().cloned().unwrap_or(Value::Null);
                self.stack.push(v);
            }
            Op::PushDict => self.stack.push(Value::new_dict()),
            Op::DictSet => {
                let key = self.pop()?;
                let value = self.pop()?;
                let dict = self.stack.last().and_then(|v| v.as_dict());
                if let Some(d) = dict {
                    d.borrow_mut().set(Key::Str(key.display_string()), value);
                }
            }

            Op::Load(name) => self.stack.push(self.env.load(name)),
            Op::Store(name) => {
                let v = self.pop()?;
                self.env.store(name, v);
            }
            Op::LoadGlobal(name) => self.stack.push(self.env.load_global(name)),
            Op::StoreGlobal(name) => {
                let v = self.pop()?;
                self.env.store_global(name, v);
            }

            Op::NewStruct(name) => {
                let fields = program.structs.get(name).cloned().unwrap_or_default();
                self.stack.push(Value::new_struct(name, &fields));
            }
            Op::GetAttr(field) => {
                let obj = self.pop()?;
                let v = match obj.as_dict() {
                    Some(d) => d.borrow().get(&Key::Str(field.clone())),
                    None => Value::Int(0),
                };
                self.stack.push(v);
            }
            Op::SetAttr(field) => {
                let obj = self.pop()?;
                let value = self.pop()?;
                if let Some(d) = obj.as_dict() {
                    d.borrow_mut().set(Key::Str(field.clone()), value);
                }
            }
            Op::LoadIdx(name) => {
                let idx = self.pop()?;
                let base = self.env.load(name);
                self.stack.push(load_index(&base, &idx));
            }
            Op::StoreIdx(name) => {
                let idx = self.pop()?;
                let value = self.pop()?;
                let base = self.env.load(name);
                let dict = match base.as_dict() {
                    Some(d) => d,
                    None => {
                        let fresh = Value::new_dict();
                        self.env.store(name, fresh.clone());
                        fresh.as_dict().unwrap()
                    }
                };
                dict.borrow_mut().set(index_key(&idx), value);
            }
            Op::LoadIdx2D(name) => {
                let col = self.pop()?;
                let row = self.pop()?;
                let base = self.env.load(name);
                let v = match base.as_dict() {
                    Some(d) => d.borrow().get(&Key::Str(format!("{},{}", row.as_i64(), col.as_i64()))),
                    None => Value::Int(0),
                };
                self.stack.push(v);
            }
            Op::StoreIdx2D(name) => {
                let col = self.pop()?;
                let row = self.pop()?;
                let value = self.pop()?;
                let base = self.env.load(name);
                let dict = match base.as_dict() {
                    Some(d) => d,
                    None => {
                        let fresh = Value::new_matrix(0, 0, Value::Int(0));
                        self.env.store(name, fresh.clone());
                        fresh.as_dict().unwrap()
                    }
                };
                let (r, c) = (row.as_i64(), col.as_i64());
                {
                    let mut d = dict.borrow_mut();
                    let new_rows = (r + 1).max(d.rows());
                    let new_cols = (c + 1).max(d.cols());
                    d.set_rows(new_rows);
                    d.set_cols(new_cols);
                    d.set(Key::Str(format!("{r},{c}")), value);
                }
            }
            Op::CreateMatrix => {
                let fill = self.pop()?;
                let cols = self.pop()?;
                let rows = self.pop()?;
                self.stack.push(Value::new_matrix(rows.as_i64(), cols.as_i64(), fill));
            }
            Op::MatrixRows => {
                let v = self.pop()?;
                let rows = v.as_dict().map(|d| d.borrow().rows()).unwrap_or(0);
                self.stack.push(Value::Int(rows));
            }
            Op::MatrixCols => {
                let v = self.pop()?;
                let cols = v.as_dict().map(|d| d.borrow().cols()).unwrap_or(0);
                self.stack.push(Value::Int(cols));
            }
            Op::MatrixDim => {
                let v = self.pop()?;
                let (rows, cols) = v.as_dict().map(|d| (d.borrow().rows(), d.borrow().cols())).unwrap_or((0, 0));
                let dim = Value::new_dict();
                if let Some(d) = dim.as_dict() {
                    d.borrow_mut().set(Key::Int(0), Value::Int(rows));
                    d.borrow_mut().set(Key::Int(1), Value::Int(cols));
                }
                self.stack.push(dim);
            }

            Op::Label(_) => {}
            Op::Jmp(label) => {
                self.ip = resolve_label(program, label)?;
                *advance = false;
            }
            Op::Jz(label) => {
                let v = self.pop()?;
                if !v.truthy() {
                    self.ip = resolve_label(program, label)?;
                    *advance = false;
                }
            }
            Op::Jnz(label) => {
                let v = self.pop()?;
                if v.truthy() {
                    self.ip = resolve_label(program, label)?;
                    *advance = false;
                }
            }
            Op::Call(name) => {
                let target = program
                    .label_index(name)
                    .ok_or_else(|| AscensionError::linker(format!("call to undefined function '{name}'")))?;
                self.call_stack.push((self.ip + 1, self.env.frames.len()));
                self.env.frames.push(HashMap::new());
                self.ip = target;
                *advance = false;
            }
            Op::Ret => {
                self.do_return(advance);
            }
            Op::RetVal => {
                let v = self.pop()?;
                self.do_return(advance);
                self.stack.push(v);
            }

            Op::TryStart(label) => {
                let catch_ip = resolve_label(program, label)?;
                self.try_stack.push(Handler {
                    catch_ip,
                    frame_depth: self.env.frames.len(),
                    call_depth: self.call_stack.len(),
                });
            }
            Op::TryEnd(label) => {
                self.try_stack.pop();
                self.ip = resolve_label(program, label)?;
                *advance = false;
            }
            Op::Throw => {
                let v = self.pop()?;
                return Err(AscensionError::new(ErrorKind::RuntimeError, v.display_string()));
            }

            Op::Print(n) => {
                let mut values = Vec::with_capacity(*n);
                for _ in 0..*n {
                    values.push(self.pop()?);
                }
                values.reverse();
                let rendered: Vec<String> = values.iter().map(Value::display_string).collect();
                let _ = writeln!(self.output, "{}", rendered.join(" "));
            }

            Op::ToInt => {
                let v = self.pop()?;
                self.stack.push(v.to_int()?);
            }
            Op::ToFloat => {
                let v = self.pop()?;
                self.stack.push(v.to_float()?);
            }
            Op::Len => {
                let v = self.pop()?;
                let n = match &v {
                    Value::Str(s) => s.chars().count() as i64,
                    Value::Dict(d) => d.borrow().entries.len() as i64,
                    _ => 0,
                };
                self.stack.push(Value::Int(n));
            }
            Op::Keys => {
                let v = self.pop()?;
                let arr = Value::new_dict();
                if let (Some(src), Some(dst)) = (v.as_dict(), arr.as_dict()) {
                    for (i, k) in src.borrow().sorted_keys().into_iter().enumerate() {
                        let value = match k {
                            Key::Int(n) => Value::Int(n),
                            Key::Str(s) => Value::Str(s),
                        };
                        dst.borrow_mut().set(Key::Int(i as i64), value);
                    }
                }
                self.stack.push(arr);
            }
            Op::Chr => {
                let v = self.pop()?;
                let s = char::from_u32(v.as_i64() as u32).map(|c| c.to_string()).unwrap_or_default();
                self.stack.push(Value::Str(s));
            }
            Op::Substr => {
                let len_v = self.pop()?;
                let start_v = self.pop()?;
                let s_v = self.pop()?;
                self.stack.push(substr(&s_v.display_string(), start_v.as_i64(), len_v.as_i64()));
            }

            Op::Add => self.binary_arith('+')?,
            Op::Sub => self.binary_arith('-')?,
            Op::Mul => self.binary_arith('*')?,
            Op::Div => self.binary_arith('/')?,
            Op::Mod => self.binary_arith('%')?,
            Op::Eq => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.stack.push(Value::Int(a.raw_eq(&b) as i64));
            }
            Op::Neq => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.stack.push(Value::Int(!a.raw_eq(&b) as i64));
            }
            Op::Gt => self.compare(|o| o == std::cmp::Ordering::Greater)?,
            Op::Lt => self.compare(|o| o == std::cmp::Ordering::Less)?,
            Op::Gte => self.compare(|o| o != std::cmp::Ordering::Less)?,
            Op::Lte => self.compare(|o| o != std::cmp::Ordering::Greater)?,
            Op::And => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.stack.push(Value::Int((a.truthy() && b.truthy()) as i64));
            }
            Op::Or => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.stack.push(Value::Int((a.truthy() || b.truthy()) as i64));
            }
            Op::Not => {
                let a = self.pop()?;
                self.stack.push(Value::Int(!a.truthy() as i64));
            }
            Op::Neg => {
                let a = self.pop()?;
                let v = match a {
                    Value::Int(i) => Value::Int(-i),
                    Value::Float(f) => Value::Float(-f),
                    other => ops::collapse(-other.as_f64()),
                };
                self.stack.push(v);
            }

            Op::Host(host_op, argc) => {
                let mut args = Vec::with_capacity(*argc);
                for _ in 0..*argc {
                    args.push(self.pop()?);
                }
                args.reverse();
                let result = self.host.call(*host_op, args)?;
                self.stack.push(result);
            }
        }
        Ok(())
    }

    fn do_return(&mut self, advance: &mut bool) {
        // A bare top-level `return`/`return EXPR` has no matching `CALL`, so
        // `call_stack` is empty here; `frames[0]` must stay pushed (module
        // doc comment, spec §3) or the next `run()`/`call_function()` on this
        // `Vm` underflows in `Environment::load`/`store`.
        match self.call_stack.pop() {
            Some((return_ip, _)) if return_ip != CALLBACK_SENTINEL => {
                self.env.frames.pop();
                self.ip = return_ip;
                *advance = false;
            }
            Some(_) => {
                // Callback sentinel: `execute`'s stop-depth check ends the loop.
                self.env.frames.pop();
                *advance = false;
            }
            None => {
                self.ip = usize::MAX - 1; // one below the wraparound; `execute` adds 1 then breaks.
            }
        }
    }

    fn binary_arith(&mut self, op: char) -> Result<()> {
        let b = self.pop()?;
        let a = self.pop()?;
        self.stack.push(ops::arith(op, &a, &b)?);
        Ok(())
    }

    fn compare(&mut self, pred: impl Fn(std::cmp::Ordering) -> bool) -> Result<()> {
        let b = self.pop()?;
        let a = self.pop()?;
        self.stack.push(Value::Int(pred(crate::value::compare(&a, &b)) as i64));
        Ok(())
    }
}

fn resolve_label(program: &Program, label: &str) -> Result<usize> {
    program.label_index(label).ok_or_else(|| AscensionError::linker(format!("unresolved label '{label}'")))
}

fn index_key(idx: &Value) -> Key {
    match idx {
        Value::Str(s) => Key::Str(s.clone()),
        other => Key::Int(other.as_i64()),
    }
}

fn load_index(base: &Value, idx: &Value) -> Value {
    match base {
        Value::Str(s) => {
            let i = idx.as_i64();
            if i < 0 {
                return Value::Str(String::new());
            }
            s.chars().nth(i as usize).map(|c| Value::Str(c.to_string())).unwrap_or(Value::Str(String::new()))
        }
        Value::Dict(d) => d.borrow().get(&index_key(idx)),
        _ => Value::Int(0),
    }
}

fn substr(s: &str, start: i64, len: i64) -> Value {
    let chars: Vec<char> = s.chars().collect();
    let n = chars.len() as i64;
    let start = start.clamp(0, n);
    let len = len.max(0).min(n - start);
    Value::Str(chars[start as usize..(start + len) as usize].iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullHost;

    fn run_ok(program: &Program) -> Vm {
        let mut vm = Vm::new(Box::new(NullHost));
        vm.run(program).expect("program should run");
        vm
    }

    #[test]
    fn store_in_top_level_frame_writes_global() {
        let mut program = Program::new();
        program.push(Op::Push(Value::Int(5)));
        program.push(Op::Store("x".into()));
        program.link();
        let vm = run_ok(&program);
        assert_eq!(vm.env.load_global("x").as_i64(), 5);
    }

    #[test]
    fn top_level_return_preserves_implicit_frame() {
        // A bare `RET` with an empty call stack (top-level `return;`) must
        // not pop `frames[0]`, or a second `run()` on the same `Vm`
        // underflows in `Environment::load`/`store`.
        let mut program = Program::new();
        program.push(Op::Ret);
        program.link();
        let mut vm = run_ok(&program);
        assert_eq!(vm.env.frames.len(), 1);

        program.link();
        vm.run(&program).expect("second run should not panic");
        assert_eq!(vm.env.frames.len(), 1);
    }

    #[test]
    fn substr_clamps_length() {
        assert_eq!(substr("hello", 3, 10).display_string(), "lo");
        assert_eq!(substr("hello", 0, 2).display_string(), "he");
    }

    #[test]
    fn load_index_on_string_returns_char() {
        let v = load_index(&Value::Str("abc".into()), &Value::Int(1));
        assert_eq!(v.display_string(), "b");
    }

    #[test]
    fn division_by_zero_propagates_as_error() {
        let mut program = Program::new();
        program.push(Op::Push(Value::Int(1)));
        program.push(Op::Push(Value::Int(0)));
        program.push(Op::Div);
        program.link();
        let mut vm = Vm::new(Box::new(NullHost));
        let err = vm.run(&program).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::DivisionByZero);
    }

    #[test]
    fn try_catch_unwinds_frames() {
        // LABEL bad: THROW; (called) -> try { CALL bad } catch(e) { STORE e }
        let mut program = Program::new();
        program.push(Op::Jmp("skip".into()));
        program.push(Op::Label("bad".into()));
        program.push(Op::Push(Value::Str("oops".into())));
        program.push(Op::Throw);
        program.push(Op::Label("skip".into()));
        program.push(Op::TryStart("catch".into()));
        program.push(Op::Call("bad".into()));
        program.push(Op::TryEnd("end".into()));
        program.push(Op::Label("catch".into()));
        program.push(Op::Store("e".into()));
        program.push(Op::Label("end".into()));
        program.link();

        let vm = run_ok(&program);
        assert_eq!(vm.env.load_global("e").display_string(), "oops");
        assert_eq!(vm.call_stack.len(), 0);
        assert_eq!(vm.env.frames.len(), 1);
    }
}
