//! File I/O builtins (spec §8 "open, close, write, read_line, read_all, read").

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read as _, Write as _};

use crate::error::Result;
use crate::opcode::HostOp;
use crate::value::Value;

use super::{arg_i64, arg_str};

pub struct StdFs {
    handles: HashMap<i64, File>,
    next_id: i64,
}

impl StdFs {
    pub fn new() -> Self {
        Self { handles: HashMap::new(), next_id: 1 }
    }

    /// Host-operation failures never raise `AscensionError` here (spec §4.3,
    /// §7 "Host-operation failures are not raised as errors by default"):
    /// handle-returning ops push NULL, command ops push 1-or-NULL, query ops
    /// push an empty-shaped sentinel.
    pub fn call(&mut self, op: HostOp, args: Vec<Value>) -> Result<Value> {
        use HostOp::*;
        match op {
            Open => Ok(self.open(arg_str(&args, 0), arg_str(&args, 1))),
            Close => {
                let removed = self.handles.remove(&arg_i64(&args, 0)).is_some();
                Ok(if removed { Value::Int(1) } else { Value::Null })
            }
            Write => Ok(self.write(arg_i64(&args, 0), arg_str(&args, 1))),
            ReadLine => Ok(self.read_line(arg_i64(&args, 0))),
            ReadAll => Ok(self.read_all(arg_i64(&args, 0))),
            Read => Ok(read_stdin_line()),
            other => unreachable!("{other:?} is not a file op"),
        }
    }

    fn open(&mut self, path: String, mode: String) -> Value {
        let file = match mode.as_str() {
            "w" => OpenOptions::new().write(true).create(true).truncate(true).open(&path),
            "a" => OpenOptions::new().append(true).create(true).open(&path),
            "r" | "" => OpenOptions::new().read(true).open(&path),
            _ => OpenOptions::new().read(true).write(true).create(true).open(&path),
        };
        match file {
            Ok(f) => {
                let id = self.next_id;
                self.next_id += 1;
                self.handles.insert(id, f);
                Value::Int(id)
            }
            Err(_) => Value::Null,
        }
    }

    fn write(&mut self, handle: i64, text: String) -> Value {
        let Some(file) = self.handles.get_mut(&handle) else {
            return Value::Null;
        };
        if file.write_all(text.as_bytes()).is_ok() {
            Value::Int(1)
        } else {
            Value::Null
        }
    }

    /// Reads up to and including the next `\n`, or to EOF. Unlike a typical
    /// `read_line`, the trailing newline is not stripped (spec §8 quirk).
    fn read_line(&mut self, handle: i64) -> Value {
        let Some(file) = self.handles.get_mut(&handle) else {
            return Value::Str(String::new());
        };
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match file.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    line.push(byte[0]);
                    if byte[0] == b'\n' {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        Value::Str(String::from_utf8_lossy(&line).into_owned())
    }

    fn read_all(&mut self, handle: i64) -> Value {
        let Some(file) = self.handles.get_mut(&handle) else {
            return Value::Str(String::new());
        };
        let mut s = String::new();
        let _ = file.read_to_string(&mut s);
        Value::Str(s)
    }
}

fn read_stdin_line() -> Value {
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return Value::Str(String::new());
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Value::Str(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn write_then_read_all_round_trips() {
        let mut fs = StdFs::new();
        let path = std::env::temp_dir().join(format!("ascension-test-{}.txt", std::process::id()));
        let path_str = path.to_string_lossy().into_owned();

        let h = fs.open(path_str.clone(), "w".into()).as_i64();
        fs.write(h, "hello\nworld".into());
        fs.handles.remove(&h);

        let h2 = fs.open(path_str.clone(), "r".into()).as_i64();
        let all = fs.read_all(h2);
        assert_eq!(all.display_string(), "hello\nworld");

        let _ = std::fs::remove_file(&path_str);
    }

    #[test]
    fn read_line_keeps_trailing_newline() {
        let mut fs = StdFs::new();
        let path = std::env::temp_dir().join(format!("ascension-test-line-{}.txt", std::process::id()));
        let path_str = path.to_string_lossy().into_owned();
        {
            let mut f = File::create(&path_str).unwrap();
            writeln!(f, "first").unwrap();
            write!(f, "second").unwrap();
        }

        let h = fs.open(path_str.clone(), "r".into()).as_i64();
        assert_eq!(fs.read_line(h).display_string(), "first\n");
        assert_eq!(fs.read_line(h).display_string(), "second");

        let _ = std::fs::remove_file(&path_str);
    }
}
