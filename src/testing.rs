//! Test doubles shared across module tests

use crate::rpc::ChainRpc;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Reply {
    Ok(Value),
    Rpc(i64, String),
    Network(String),
}

impl Reply {
    fn into_result(self) -> Result<Value> {
        match self {
            Reply::Ok(value) => Ok(value),
            Reply::Rpc(code, message) => Err(Error::Rpc { code, message }),
            Reply::Network(message) => Err(Error::Network(message)),
        }
    }
}

/// In-memory [`ChainRpc`] answering from per-method scripts.
///
/// Replies for a method are consumed in order; the last one repeats.
/// Every call is recorded so tests can assert what hit the network.
#[derive(Default)]
pub struct ScriptedRpc {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<(String, Value)>>,
    delay: Option<Duration>,
}

impl ScriptedRpc {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, method: &str, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn ok(self, method: &str, value: Value) -> Self {
        self.push(method, Reply::Ok(value))
    }

    pub fn rpc_error(self, method: &str, code: i64, message: &str) -> Self {
        self.push(method, Reply::Rpc(code, message.to_string()))
    }

    pub fn network_error(self, method: &str) -> Self {
        self.push(method, Reply::Network("connection refused".to_string()))
    }

    /// Delay every reply, to hold calls in flight
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .count()
    }
}

#[async_trait]
impl ChainRpc for ScriptedRpc {
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = {
            let mut replies = self.replies.lock().unwrap();
            match replies.get_mut(method) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        reply
            .map(Reply::into_result)
            .unwrap_or_else(|| Err(Error::Network(format!("unscripted method {}", method))))
    }
}
