//! Subprocess builtins (spec §8 "system, exec").

use std::process::Command;

use crate::error::Result;
use crate::opcode::HostOp;
use crate::value::Value;

use super::arg_str;

pub struct StdProcess;

impl StdProcess {
    pub fn new() -> Self {
        Self
    }

    /// `system` returns the exit code, or NULL on spawn failure; `exec`
    /// returns captured stdout, or NULL on failure (spec §8) — neither ever
    /// raises `AscensionError` (spec §4.3, §7).
    pub fn call(&mut self, op: HostOp, args: Vec<Value>) -> Result<Value> {
        Ok(match op {
            HostOp::System => self.system(arg_str(&args, 0)),
            HostOp::Exec => self.exec(args),
            other => unreachable!("{other:?} is not a process op"),
        })
    }

    /// Runs `command` through the platform shell, returning its exit code.
    fn system(&self, command: String) -> Value {
        let status = if cfg!(windows) {
            Command::new("cmd").arg("/C").arg(&command).status()
        } else {
            Command::new("sh").arg("-c").arg(&command).status()
        };
        match status {
            Ok(s) => Value::Int(s.code().unwrap_or(-1) as i64),
            Err(_) => Value::Null,
        }
    }

    /// Runs `program arg1 arg2 ...` directly (no shell) and returns captured
    /// stdout.
    fn exec(&self, args: Vec<Value>) -> Value {
        let Some((program, rest)) = args.split_first() else {
            return Value::Null;
        };
        let program = program.display_string();
        let rest: Vec<String> = rest.iter().map(Value::display_string).collect();
        match Command::new(&program).args(&rest).output() {
            Ok(out) => Value::Str(String::from_utf8_lossy(&out.stdout).into_owned()),
            Err(_) => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_runs_true_with_zero_exit() {
        if cfg!(windows) {
            return;
        }
        let mut p = StdProcess::new();
        let v = p.call(HostOp::System, vec![Value::Str("true".into())]).unwrap();
        assert_eq!(v.as_i64(), 0);
    }

    #[test]
    fn exec_captures_stdout() {
        if cfg!(windows) {
            return;
        }
        let mut p = StdProcess::new();
        let v = p.call(HostOp::Exec, vec![Value::Str("echo".into()), Value::Str("hi".into())]).unwrap();
        assert_eq!(v.display_string().trim(), "hi");
    }
}
