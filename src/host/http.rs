//! HTTP client builtins (spec §8 "http_get, http_post, response_status,
//! response_body"), backed by `ureq`.
//!
//! `http_get`/`http_post` stash the most recent response; `response_status`
//! and `response_body` read it back. This mirrors how the scripts actually
//! call these builtins (fetch, then immediately inspect), rather than
//! threading a response handle through the stack.

use std::time::Duration;

use crate::error::Result;
use crate::opcode::HostOp;
use crate::value::Value;

use super::arg_str;

pub struct StdHttp {
    agent: ureq::Agent,
    last_status: i64,
    last_body: String,
}

impl StdHttp {
    pub fn new() -> Self {
        // 10s request timeout, 5s connect timeout (spec §5).
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(10))
            .timeout_connect(Duration::from_secs(5))
            .build();
        Self { agent, last_status: 0, last_body: String::new() }
    }

    /// Host-operation failures push NULL rather than raising
    /// `AscensionError` (spec §4.3, §7); an HTTP error *status* (4xx/5xx) is
    /// not a failure here — it is recorded like any other response so
    /// `response_status`/`response_body` can inspect it.
    pub fn call(&mut self, op: HostOp, args: Vec<Value>) -> Result<Value> {
        Ok(match op {
            HostOp::HttpGet => self.get(arg_str(&args, 0)),
            HostOp::HttpPost => self.post(arg_str(&args, 0), arg_str(&args, 1)),
            HostOp::ResponseStatus => Value::Int(self.last_status),
            HostOp::ResponseBody => Value::Str(self.last_body.clone()),
            other => unreachable!("{other:?} is not an http op"),
        })
    }

    fn get(&mut self, url: String) -> Value {
        match self.agent.get(&url).call() {
            Ok(resp) => self.record(resp),
            Err(ureq::Error::Status(code, resp)) => self.record_status(code, resp),
            Err(_) => Value::Null,
        }
    }

    fn post(&mut self, url: String, body: String) -> Value {
        match self.agent.post(&url).send_string(&body) {
            Ok(resp) => self.record(resp),
            Err(ureq::Error::Status(code, resp)) => self.record_status(code, resp),
            Err(_) => Value::Null,
        }
    }

    fn record(&mut self, resp: ureq::Response) -> Value {
        self.last_status = resp.status() as i64;
        self.last_body = resp.into_string().unwrap_or_default();
        Value::Int(self.last_status)
    }

    fn record_status(&mut self, code: u16, resp: ureq::Response) -> Value {
        self.last_status = code as i64;
        self.last_body = resp.into_string().unwrap_or_default();
        Value::Int(self.last_status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_client_has_no_response_yet() {
        let http = StdHttp::new();
        assert_eq!(http.last_status, 0);
        assert!(http.last_body.is_empty());
    }
}
