//! Ascension: a small imperative, C-like scripting language compiled ahead
//! of time to flat linear bytecode and executed by a stack-based VM.

pub mod cleaner;
pub mod cli;
pub mod compiler;
pub mod error;
pub mod host;
pub mod opcode;
pub mod value;
pub mod vm;

pub use compiler::Compiler;
pub use error::{AscensionError, ErrorKind, Result};
pub use opcode::{HostOp, Op, Program, TkOp};
pub use value::{Dict, Key, Value};
pub use vm::Vm;
