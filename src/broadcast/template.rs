use axum::http::Method;
use serde::Serialize;

/// Request replayed against every target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastTemplate {
    pub method: Method,
    pub port: u16,
    pub path: String,
    pub query: Option<String>,
}

impl BroadcastTemplate {
    pub fn new(method: Method, port: u16, path: impl Into<String>, query: Option<String>) -> Self {
        Self {
            method,
            port,
            path: path.into(),
            query: query.filter(|q| !q.is_empty()),
        }
    }

    /// `http://<address>:<port><path>[?query]`, with an empty path meaning `/`
    pub fn target_url(&self, address: &str) -> String {
        let path = if self.path.is_empty() { "/" } else { &self.path };

        match &self.query {
            Some(query) => format!("http://{}:{}{}?{}", address, self.port, path, query),
            None => format!("http://{}:{}{}", address, self.port, path),
        }
    }
}

/// Outcome of dispatching the template to one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BroadcastResult {
    pub ip: String,
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BroadcastResult {
    pub fn response(ip: &str, status: u16) -> Self {
        Self {
            ip: ip.to_string(),
            status: Some(status),
            error: None,
        }
    }

    pub fn failure(ip: &str, error: impl Into<String>) -> Self {
        Self {
            ip: ip.to_string(),
            status: None,
            error: Some(error.into()),
        }
    }

    /// True when the target answered with a 2xx status
    pub fn is_success(&self) -> bool {
        matches!(self.status, Some(status) if (200..300).contains(&status))
    }
}
