//! Fan-out of one request template to many targets
//!
//! Every target gets its own task. The engine waits for all of them and never
//! short-circuits: a failing target only ever affects its own result.

use super::template::{BroadcastResult, BroadcastTemplate};
use crate::{BroadcastError, Result};
use futures::future::join_all;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

#[derive(Clone)]
pub struct BroadcastEngine {
    client: Client,
}

impl BroadcastEngine {
    /// Create an engine whose downstream requests use the given timeout, if any
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder.build().map_err(|e| {
            BroadcastError::ConfigError(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Send `template` to every target concurrently.
    ///
    /// Returns one result per target, in input order.
    pub async fn broadcast(
        &self,
        targets: &[String],
        template: &BroadcastTemplate,
    ) -> Vec<BroadcastResult> {
        debug!(
            "Starting broadcast request targets={:?} template={:?}",
            targets, template
        );

        let template = Arc::new(template.clone());

        let handles: Vec<_> = targets
            .iter()
            .map(|ip| {
                let client = self.client.clone();
                let template = Arc::clone(&template);
                let ip = ip.clone();
                tokio::spawn(async move { dispatch(&client, &ip, &template).await })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .zip(targets)
            .map(|(joined, ip)| match joined {
                Ok(result) => result,
                Err(e) => {
                    error!("Dispatch task for {} did not complete: {}", ip, e);
                    BroadcastResult::failure(ip, format!("dispatch task failed: {}", e))
                }
            })
            .collect()
    }
}

async fn dispatch(client: &Client, ip: &str, template: &BroadcastTemplate) -> BroadcastResult {
    let url = template.target_url(ip);

    debug!(
        "Broadcasting to IP {} url={} method={}",
        ip, url, template.method
    );

    match client.request(template.method.clone(), &url).send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            info!("Broadcast to {}: {}", url, status);
            debug!("Response headers {:?}", response.headers());
            BroadcastResult::response(ip, status)
        }
        Err(e) => {
            debug!(
                "Broadcast failure details ip={} port={} path={} method={} timeout={} connect={}",
                ip,
                template.port,
                template.path,
                template.method,
                e.is_timeout(),
                e.is_connect()
            );
            let cause = format!("{:#}", anyhow::Error::new(e));
            error!("Failed to send to {}: {}", ip, cause);
            BroadcastResult::failure(ip, cause)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn engine() -> BroadcastEngine {
        BroadcastEngine::new(Some(Duration::from_secs(5))).unwrap()
    }

    fn targets(ips: &[&str]) -> Vec<String> {
        ips.iter().map(|ip| ip.to_string()).collect()
    }

    /// A local port with nothing listening on it
    async fn closed_port() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[tokio::test]
    async fn test_broadcast_sends_to_every_target() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(Method::POST).path("/test");
                then.status(200).body("OK");
            })
            .await;

        let template = BroadcastTemplate::new(reqwest::Method::POST, server.port(), "/test", None);
        let results = engine()
            .broadcast(&targets(&["127.0.0.1", "127.0.0.1"]), &template)
            .await;

        mock.assert_calls_async(2).await;
        assert_eq!(
            results,
            vec![
                BroadcastResult::response("127.0.0.1", 200),
                BroadcastResult::response("127.0.0.1", 200),
            ]
        );
    }

    #[tokio::test]
    async fn test_broadcast_reports_non_2xx_as_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(Method::GET).path("/test");
                then.status(500).body("Fetch error");
            })
            .await;

        let template = BroadcastTemplate::new(reqwest::Method::GET, server.port(), "/test", None);
        let results = engine().broadcast(&targets(&["127.0.0.1"]), &template).await;

        assert_eq!(results, vec![BroadcastResult::response("127.0.0.1", 500)]);
    }

    #[tokio::test]
    async fn test_broadcast_forwards_query() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(Method::DELETE).path("/test").query_param("example", "1");
                then.status(204);
            })
            .await;

        let template = BroadcastTemplate::new(
            reqwest::Method::DELETE,
            server.port(),
            "/test",
            Some("example=1".to_string()),
        );
        let results = engine().broadcast(&targets(&["127.0.0.1"]), &template).await;

        mock.assert_async().await;
        assert_eq!(results[0].status, Some(204));
    }

    #[tokio::test]
    async fn test_broadcast_unreachable_target_is_captured() {
        let template = BroadcastTemplate::new(reqwest::Method::GET, closed_port().await, "/test", None);
        let results = engine().broadcast(&targets(&["127.0.0.1"]), &template).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].ip, "127.0.0.1");
        assert_eq!(results[0].status, None);
        assert!(!results[0].error.as_deref().unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_invalid_address_is_captured() {
        let template = BroadcastTemplate::new(reqwest::Method::GET, 8080, "/test", None);
        let results = engine()
            .broadcast(&targets(&["256.256.256.256"]), &template)
            .await;

        assert_eq!(results[0].ip, "256.256.256.256");
        assert_eq!(results[0].status, None);
        assert!(results[0].error.is_some());
    }

    #[tokio::test]
    async fn test_broadcast_preserves_order_and_isolates_failures() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(Method::PUT).path("/page");
                then.status(200).delay(Duration::from_millis(100));
            })
            .await;

        let template = BroadcastTemplate::new(reqwest::Method::PUT, server.port(), "/page", None);
        let results = engine()
            .broadcast(
                &targets(&["127.0.0.1", "256.256.256.256", "127.0.0.1"]),
                &template,
            )
            .await;

        let ips: Vec<_> = results.iter().map(|r| r.ip.as_str()).collect();
        assert_eq!(ips, vec!["127.0.0.1", "256.256.256.256", "127.0.0.1"]);
        assert_eq!(results[0].status, Some(200));
        assert_eq!(results[1].status, None);
        assert_eq!(results[2].status, Some(200));
    }

    #[tokio::test]
    async fn test_broadcast_dispatches_concurrently() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(Method::GET).path("/slow");
                then.status(200).delay(Duration::from_millis(200));
            })
            .await;

        let template = BroadcastTemplate::new(reqwest::Method::GET, server.port(), "/slow", None);
        let started = std::time::Instant::now();
        let results = engine()
            .broadcast(&targets(&["127.0.0.1", "127.0.0.1"]), &template)
            .await;
        let elapsed = started.elapsed();

        mock.assert_calls_async(2).await;
        assert!(results.iter().all(|r| r.status == Some(200)));
        assert!(
            elapsed < Duration::from_millis(350),
            "two 200ms targets took {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn test_broadcast_with_no_targets() {
        let template = BroadcastTemplate::new(reqwest::Method::GET, 8080, "/", None);
        assert!(engine().broadcast(&[], &template).await.is_empty());
    }
}
