//! Session metadata.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identity of one client session.
///
/// Captured at connection open, mutated by `identity` events, finalized at
/// close. Clients send arbitrary keys, so the meta is an open object with
/// typed accessors for the fields the pipeline itself reads. The dump's
/// first line is this object serialized as JSON.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionMeta {
    fields: Map<String, Value>,
}

impl SessionMeta {
    /// Create metadata for a newly opened connection.
    #[must_use]
    pub fn at_open(
        path: impl Into<String>,
        origin: Option<&str>,
        user_agent: Option<&str>,
        client_protocol: Option<&str>,
        remote_address: Option<&str>,
        start_ms: i64,
    ) -> Self {
        let mut fields = Map::new();
        let path = path.into();
        let url = origin.map(|o| format!("{o}{path}"));
        let _ = fields.insert("path".into(), Value::from(path));
        if let Some(origin) = origin {
            let _ = fields.insert("origin".into(), Value::from(origin));
        }
        if let Some(url) = url {
            let _ = fields.insert("url".into(), Value::from(url));
        }
        if let Some(ua) = user_agent {
            let _ = fields.insert("userAgent".into(), Value::from(ua));
        }
        if let Some(protocol) = client_protocol {
            let _ = fields.insert("clientProtocol".into(), Value::from(protocol));
        }
        if let Some(address) = remote_address {
            let _ = fields.insert("remoteAddress".into(), Value::from(address));
        }
        let _ = fields.insert("startDate".into(), Value::from(start_ms));
        Self { fields }
    }

    /// Build from an already-parsed JSON object (a dump's first line).
    #[must_use]
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Shallow-merge an `identity` payload; later keys override.
    ///
    /// Non-object payloads are ignored; clients occasionally send nulls.
    pub fn merge(&mut self, payload: &Value) {
        if let Value::Object(map) = payload {
            for (key, value) in map {
                let _ = self.fields.insert(key.clone(), value.clone());
            }
        }
    }

    /// A string field by name.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// The client's user agent string.
    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.get_str("userAgent")
    }

    /// The instrumentation protocol token (e.g. `3_STANDARD`).
    #[must_use]
    pub fn client_protocol(&self) -> Option<&str> {
        self.get_str("clientProtocol")
    }

    /// The page URL the client connected from.
    #[must_use]
    pub fn page_url(&self) -> Option<&str> {
        self.get_str("url")
    }

    /// The page origin.
    #[must_use]
    pub fn origin(&self) -> Option<&str> {
        self.get_str("origin")
    }

    /// Raw field access for downstream stores.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}
