pub mod http;
pub mod pace;
pub mod pagination;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::record::id_string;

pub use self::http::{Credentials, RestClient};
pub use pace::Pacer;
pub use pagination::{fetch_all_pages, PageItems};

/// The four calls the console makes against a JSON REST API.
///
/// Each call fails independently with an [`Error`](crate::Error); callers
/// decide whether a failure is fatal. Credentials and timeouts belong to
/// the implementation.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn get(&self, url: &str, params: &[(String, String)]) -> Result<Value>;
    async fn post(&self, url: &str, payload: &Value) -> Result<Value>;
    async fn put(&self, url: &str, payload: &Value) -> Result<Value>;
    async fn delete(&self, url: &str) -> Result<Value>;
}

/// Project Manager wraps single resources as `{"data": {...}}`; core
/// WordPress routes do not. Returns the inner object either way.
pub fn unwrap_data(value: Value) -> Value {
    match value {
        Value::Object(mut map) if matches!(map.get("data"), Some(Value::Object(_))) => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Identifier of a created or updated resource, from `id` or `data.id`.
pub fn extract_id(response: &Value) -> Option<String> {
    response
        .get("id")
        .and_then(id_string)
        .or_else(|| response.get("data").and_then(|d| d.get("id")).and_then(id_string))
}
