//! Terminal UI builtins (spec §8 "curses_*"), backed by `crossterm`.

use std::io::{stdout, Write as _};

use crossterm::cursor::MoveTo;
use crossterm::event::{read, Event, KeyCode};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType};
use crossterm::{execute, queue};

use crate::error::Result;
use crate::opcode::HostOp;
use crate::value::Value;

use super::{arg_i64, arg_str};

pub struct StdTui {
    active: bool,
}

impl StdTui {
    pub fn new() -> Self {
        Self { active: false }
    }

    /// Command ops (`init`/`end`/`clear`/`move`/`write`/`refresh`) push 1 on
    /// success, NULL on failure; `read_key` pushes an empty string when the
    /// terminal can't be read (spec §4.3, §7) — never an `AscensionError`.
    pub fn call(&mut self, op: HostOp, args: Vec<Value>) -> Result<Value> {
        use HostOp::*;
        Ok(match op {
            CursesInit => self.init(),
            CursesEnd => self.end(),
            CursesClear => self.clear(),
            CursesMove => self.move_to(arg_i64(&args, 0), arg_i64(&args, 1)),
            CursesWrite => self.write(arg_str(&args, 0)),
            CursesRefresh => self.refresh(),
            CursesReadKey => self.read_key(),
            other => unreachable!("{other:?} is not a tui op"),
        })
    }

    fn init(&mut self) -> Value {
        if enable_raw_mode().is_err() {
            return Value::Null;
        }
        self.active = true;
        Value::Int(1)
    }

    fn end(&mut self) -> Value {
        if disable_raw_mode().is_err() {
            return Value::Null;
        }
        self.active = false;
        Value::Int(1)
    }

    fn clear(&mut self) -> Value {
        ok_or_null(execute!(stdout(), Clear(ClearType::All)))
    }

    fn move_to(&mut self, row: i64, col: i64) -> Value {
        ok_or_null(queue!(stdout(), MoveTo(col.max(0) as u16, row.max(0) as u16)))
    }

    fn write(&mut self, text: String) -> Value {
        ok_or_null(write!(stdout(), "{text}"))
    }

    fn refresh(&mut self) -> Value {
        ok_or_null(stdout().flush())
    }

    fn read_key(&mut self) -> Value {
        loop {
            match read() {
                Ok(Event::Key(key)) => {
                    let s = match key.code {
                        KeyCode::Char(c) => c.to_string(),
                        KeyCode::Enter => "\n".to_string(),
                        KeyCode::Esc => "\u{1b}".to_string(),
                        _ => continue,
                    };
                    return Value::Str(s);
                }
                Ok(_) => continue,
                Err(_) => return Value::Str(String::new()),
            }
        }
    }
}

fn ok_or_null<E>(result: std::result::Result<(), E>) -> Value {
    if result.is_ok() {
        Value::Int(1)
    } else {
        Value::Null
    }
}

impl Drop for StdTui {
    fn drop(&mut self) {
        if self.active {
            let _ = disable_raw_mode();
        }
    }
}
