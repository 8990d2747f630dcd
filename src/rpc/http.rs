//! HTTP transport for [`ChainRpc`]

use super::{decode_response, ChainRpc};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Default bound on a single RPC round trip
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// JSON-RPC 2.0 client over HTTP POST
pub struct HttpRpcClient {
    client: Client,
    url: url::Url,
    timeout: Duration,
    next_id: AtomicU64,
}

impl HttpRpcClient {
    pub fn new(url: &str) -> Result<Self> {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(url: &str, timeout: Duration) -> Result<Self> {
        let url: url::Url = url
            .parse()
            .map_err(|e| Error::Config(format!("invalid RPC URL: {}", e)))?;
        Ok(Self {
            client: Client::new(),
            url,
            timeout,
            next_id: AtomicU64::new(1),
        })
    }

    /// Endpoint host, for logging without credentials or API keys
    fn host(&self) -> &str {
        self.url.host_str().unwrap_or("<unknown>")
    }

    async fn post(&self, body: &Value) -> Result<(u16, String)> {
        let response = self.client.post(self.url.clone()).json(body).send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        Ok((status, text))
    }
}

#[async_trait]
impl ChainRpc for HttpRpcClient {
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        tracing::debug!(host = self.host(), method, id, "RPC request");

        let (status, text) = tokio::time::timeout(self.timeout, self.post(&body))
            .await
            .map_err(|_| {
                tracing::warn!(host = self.host(), method, "RPC request timed out");
                Error::Network(format!(
                    "request timed out after {}ms",
                    self.timeout.as_millis()
                ))
            })??;

        let result = decode_response(status, &text);
        if let Err(e) = &result {
            tracing::debug!(host = self.host(), method, id, status, error = %e, "RPC call failed");
        }
        result
    }
}

impl std::fmt::Debug for HttpRpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // URLs frequently embed provider API keys
        f.debug_struct("HttpRpcClient")
            .field("host", &self.host())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_url() {
        assert!(matches!(HttpRpcClient::new("not a url"), Err(Error::Config(_))));
    }

    #[test]
    fn debug_hides_api_key() {
        let client = HttpRpcClient::new("https://eth-mainnet.g.alchemy.com/v2/SECRETKEY").unwrap();
        let debug = format!("{:?}", client);
        assert!(debug.contains("eth-mainnet.g.alchemy.com"));
        assert!(!debug.contains("SECRETKEY"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_network_error() {
        // Port 9 (discard) on localhost is closed in test environments
        let client =
            HttpRpcClient::with_timeout("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let err = client.call("eth_blockNumber", json!([])).await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }

    #[tokio::test]
    async fn silent_endpoint_times_out_as_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // accept and hold the connection without answering
        let server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let client =
            HttpRpcClient::with_timeout(&format!("http://{}", addr), Duration::from_millis(100))
                .unwrap();
        let err = client.call("eth_blockNumber", json!([])).await.unwrap_err();
        assert!(matches!(&err, Error::Network(m) if m.contains("timed out")));
        server.abort();
    }
}
