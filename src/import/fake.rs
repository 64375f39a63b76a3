use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::client::RemoteClient;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Get(String),
    Post(String, Value),
    Put(String, Value),
    Delete(String),
}

impl Call {
    pub fn url(&self) -> &str {
        match self {
            Call::Get(url) | Call::Delete(url) | Call::Post(url, _) | Call::Put(url, _) => url,
        }
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            Call::Post(_, payload) | Call::Put(_, payload) => Some(payload),
            _ => None,
        }
    }
}

/// In-memory remote that records every call and hands out sequential ids.
pub struct FakeRemote {
    calls: Mutex<Vec<Call>>,
    queries: Mutex<Vec<Vec<(String, String)>>>,
    next_id: Mutex<u64>,
    failing_titles: Vec<String>,
    listings: HashMap<String, Value>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::starting_at(100)
    }

    pub fn starting_at(first_id: u64) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
            next_id: Mutex::new(first_id),
            failing_titles: Vec::new(),
            listings: HashMap::new(),
        }
    }

    /// Writes whose payload title equals `title` fail with HTTP 500.
    pub fn failing_on(mut self, title: &str) -> Self {
        self.failing_titles.push(title.to_string());
        self
    }

    pub fn with_listing(mut self, url: &str, body: Value) -> Self {
        self.listings.insert(url.to_string(), body);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Query parameters of every GET, in order.
    pub fn queries(&self) -> Vec<Vec<(String, String)>> {
        self.queries.lock().unwrap().clone()
    }

    fn push(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, payload: &Value) -> Result<()> {
        let title = payload.get("title").and_then(Value::as_str).unwrap_or_default();
        if self.failing_titles.iter().any(|t| t == title) {
            return Err(Error::Api {
                status: 500,
                message: "Internal Server Error".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteClient for FakeRemote {
    async fn get(&self, url: &str, params: &[(String, String)]) -> Result<Value> {
        self.push(Call::Get(url.to_string()));
        self.queries.lock().unwrap().push(params.to_vec());
        Ok(self.listings.get(url).cloned().unwrap_or_else(|| json!([])))
    }

    async fn post(&self, url: &str, payload: &Value) -> Result<Value> {
        self.push(Call::Post(url.to_string(), payload.clone()));
        self.check(payload)?;
        let id = {
            let mut next = self.next_id.lock().unwrap();
            let id = *next;
            *next += 1;
            id
        };
        let mut data = payload.clone();
        data["id"] = json!(id);
        Ok(json!({ "data": data }))
    }

    async fn put(&self, url: &str, payload: &Value) -> Result<Value> {
        self.push(Call::Put(url.to_string(), payload.clone()));
        self.check(payload)?;
        let id = url.rsplit('/').next().unwrap_or_default();
        let mut data = payload.clone();
        data["id"] = id.parse::<u64>().map(|n| json!(n)).unwrap_or_else(|_| json!(id));
        Ok(json!({ "data": data }))
    }

    async fn delete(&self, url: &str) -> Result<Value> {
        self.push(Call::Delete(url.to_string()));
        Ok(json!({ "deleted": true }))
    }
}
