//! Raw socket and DNS builtins (spec §8 "socket_*, get_ip").

use std::collections::HashMap;
use std::io::{Read as _, Write as _};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};

use crate::error::Result;
use crate::opcode::HostOp;
use crate::value::Value;

use super::{arg_i64, arg_str};

enum Socket {
    Stream(TcpStream),
    Listener(TcpListener),
}

pub struct StdNet {
    handles: HashMap<i64, Socket>,
    next_id: i64,
}

impl StdNet {
    pub fn new() -> Self {
        Self { handles: HashMap::new(), next_id: 1 }
    }

    /// Host-operation failures push NULL/sentinel values rather than raising
    /// `AscensionError` (spec §4.3, §7).
    pub fn call(&mut self, op: HostOp, args: Vec<Value>) -> Result<Value> {
        use HostOp::*;
        Ok(match op {
            SocketOpen => Value::Int(0), // no-op placeholder handle; real work happens at connect/bind
            SocketClose => {
                let removed = self.handles.remove(&arg_i64(&args, 0)).is_some();
                if removed { Value::Int(1) } else { Value::Null }
            }
            SocketBind => self.bind(arg_str(&args, 0), arg_i64(&args, 1)),
            SocketListen => Value::Int(1), // TcpListener::bind already listens
            SocketAccept => self.accept(arg_i64(&args, 0)),
            SocketConnect => self.connect(arg_str(&args, 0), arg_i64(&args, 1)),
            SocketSend => self.send(arg_i64(&args, 0), arg_str(&args, 1)),
            SocketRecv => self.recv(arg_i64(&args, 0), arg_i64(&args, 1)),
            GetIp => self.get_ip(arg_str(&args, 0)),
            other => unreachable!("{other:?} is not a net op"),
        })
    }

    fn insert(&mut self, socket: Socket) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        self.handles.insert(id, socket);
        id
    }

    fn bind(&mut self, host: String, port: i64) -> Value {
        TcpListener::bind((host.as_str(), port as u16))
            .map(|l| Value::Int(self.insert(Socket::Listener(l))))
            .unwrap_or(Value::Null)
    }

    fn accept(&mut self, handle: i64) -> Value {
        let Some(Socket::Listener(listener)) = self.handles.get(&handle) else {
            return Value::Null;
        };
        match listener.accept() {
            Ok((stream, _)) => Value::Int(self.insert(Socket::Stream(stream))),
            Err(_) => Value::Null,
        }
    }

    fn connect(&mut self, host: String, port: i64) -> Value {
        TcpStream::connect((host.as_str(), port as u16))
            .map(|s| Value::Int(self.insert(Socket::Stream(s))))
            .unwrap_or(Value::Null)
    }

    fn send(&mut self, handle: i64, data: String) -> Value {
        let Some(Socket::Stream(stream)) = self.handles.get_mut(&handle) else {
            return Value::Null;
        };
        if stream.write_all(data.as_bytes()).is_ok() {
            Value::Int(1)
        } else {
            Value::Null
        }
    }

    fn recv(&mut self, handle: i64, max_len: i64) -> Value {
        let Some(Socket::Stream(stream)) = self.handles.get_mut(&handle) else {
            return Value::Str(String::new());
        };
        let mut buf = vec![0u8; max_len.max(1) as usize];
        match stream.read(&mut buf) {
            Ok(n) => Value::Str(String::from_utf8_lossy(&buf[..n]).into_owned()),
            Err(_) => Value::Str(String::new()),
        }
    }

    fn get_ip(&self, host: String) -> Value {
        (host.as_str(), 0u16)
            .to_socket_addrs()
            .ok()
            .and_then(|mut it| it.next())
            .map(|addr| Value::Str(addr.ip().to_string()))
            .unwrap_or(Value::Str(String::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_ip_resolves_localhost() {
        let net = StdNet::new();
        let v = net.get_ip("localhost".into());
        assert!(!v.display_string().is_empty());
    }

    #[test]
    fn recv_on_unknown_handle_returns_empty_sentinel() {
        let mut net = StdNet::new();
        assert_eq!(net.recv(999, 16).display_string(), "");
    }
}
