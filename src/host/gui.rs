//! GUI builtins (spec §8 "tk_*"). A real Tk backend has no place in a
//! headless crate build, so every `tk_*` call is stubbed out — scripts that
//! call them keep compiling and running, they just never draw anything
//! (GUI Non-goal, spec §10).

use crate::error::Result;
use crate::opcode::TkOp;
use crate::value::Value;

pub struct NullGui;

impl NullGui {
    /// Every `tk_*` call is a failure by construction here: handle-returning
    /// ops push NULL, `get_text` (a query) pushes the empty-string sentinel
    /// (spec §4.3, §8).
    pub fn call(&mut self, op: TkOp, _args: Vec<Value>) -> Result<Value> {
        let v = match op {
            TkOp::GetText => Value::Str(String::new()),
            _ => Value::Null,
        };
        Ok(v)
    }
}
