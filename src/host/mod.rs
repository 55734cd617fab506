//! Pluggable host services (spec §4.3 "Host services", §6, §8).
//!
//! The VM never touches the filesystem, network, or a terminal directly; it
//! pops a fixed argument count and calls through a `Box<dyn HostServices>`
//! for everything outside the core language. [`StdHost`] wires that trait to
//! real backends; [`NullHost`] is the no-op stand-in used in VM unit tests.

mod fs;
mod gui;
mod http;
mod math;
mod net;
mod proc;
mod tui;

use crate::error::Result;
use crate::opcode::HostOp;
use crate::value::Value;

pub trait HostServices {
    fn call(&mut self, op: HostOp, args: Vec<Value>) -> Result<Value>;
}

/// Backs every `HostOp` with a real system call, split across one struct per
/// family so each backend can be grounded on (and tested against) the crate
/// it wraps.
pub struct StdHost {
    math: math::StdMath,
    fs: fs::StdFs,
    proc: proc::StdProcess,
    net: net::StdNet,
    http: http::StdHttp,
    tui: tui::StdTui,
    gui: gui::NullGui,
}

impl StdHost {
    pub fn new() -> Self {
        Self {
            math: math::StdMath::new(),
            fs: fs::StdFs::new(),
            proc: proc::StdProcess::new(),
            net: net::StdNet::new(),
            http: http::StdHttp::new(),
            tui: tui::StdTui::new(),
            gui: gui::NullGui,
        }
    }
}

impl Default for StdHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostServices for StdHost {
    fn call(&mut self, op: HostOp, args: Vec<Value>) -> Result<Value> {
        use HostOp::*;
        match op {
            Sqrt | Pow | Exp | Log | Abs | Floor | Ceil | Sin | Cos | Tan | Asin | Acos | Atan | Atan2
            | RandomUnit | RandomMax | RandomRange => self.math.call(op, args),

            System | Exec => self.proc.call(op, args),

            Open | Close | Write | ReadLine | ReadAll | Read => self.fs.call(op, args),

            HttpGet | HttpPost | ResponseStatus | ResponseBody => self.http.call(op, args),

            SocketOpen | SocketClose | SocketBind | SocketListen | SocketAccept | SocketConnect
            | SocketSend | SocketRecv | GetIp => self.net.call(op, args),

            CursesInit | CursesEnd | CursesClear | CursesMove | CursesWrite | CursesRefresh | CursesReadKey => {
                self.tui.call(op, args)
            }

            Tk(tk) => self.gui.call(tk, args),
        }
    }
}

/// Returns `Value::Null` for every call; used by VM unit tests that don't
/// exercise host services.
pub struct NullHost;

impl HostServices for NullHost {
    fn call(&mut self, _op: HostOp, _args: Vec<Value>) -> Result<Value> {
        Ok(Value::Null)
    }
}

/// Read argument `i` coerced to `f64`, defaulting to `0.0` when absent —
/// host builtins are called with whatever arity the script used, not a
/// compile-time-checked signature.
fn arg_f64(args: &[Value], i: usize) -> f64 {
    args.get(i).map(Value::as_f64).unwrap_or(0.0)
}

fn arg_i64(args: &[Value], i: usize) -> i64 {
    args.get(i).map(Value::as_i64).unwrap_or(0)
}

fn arg_str(args: &[Value], i: usize) -> String {
    args.get(i).map(Value::display_string).unwrap_or_default()
}
