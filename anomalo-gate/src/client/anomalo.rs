//! reqwest-backed client for the Anomalo test API.

use super::{ApiResponse, TestRunApi};
use crate::config::GateConfig;
use crate::errors::GateError;
use async_trait::async_trait;
use std::fmt;
use tracing::debug;

/// HTTP client for the Anomalo test endpoints.
#[derive(Clone)]
pub struct AnomaloClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl fmt::Debug for AnomaloClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnomaloClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl AnomaloClient {
    /// Creates a client from the gate configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the underlying
    /// HTTP client cannot be built.
    pub fn new(config: &GateConfig) -> Result<Self, GateError> {
        config.validate()?;
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("anomalo-gate/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn endpoint(&self, test_id: u64, action: &str) -> String {
        format!("{}/api/tests/{}/{}", self.base_url, test_id, action)
    }

    async fn read(response: reqwest::Response) -> Result<ApiResponse, GateError> {
        let status_code = response.status().as_u16();
        let body = response.text().await?;
        Ok(ApiResponse { status_code, body })
    }
}

#[async_trait]
impl TestRunApi for AnomaloClient {
    async fn run_test(&self, test_id: u64) -> Result<ApiResponse, GateError> {
        let url = self.endpoint(test_id, "run");
        debug!(url = %url, "Starting test run");

        let response = self.http.post(&url).bearer_auth(&self.api_key).send().await?;
        Self::read(response).await
    }

    async fn fetch_results(&self, test_id: u64) -> Result<ApiResponse, GateError> {
        let url = self.endpoint(test_id, "results");
        debug!(url = %url, "Fetching test results");

        let response = self.http.get(&url).bearer_auth(&self.api_key).send().await?;
        Self::read(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serves one canned HTTP response and hands back the raw request head.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0_u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "HTTP/1.1 {status_line}\r\n\
                 Content-Type: application/json\r\n\
                 Content-Length: {}\r\n\
                 Connection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();

            String::from_utf8_lossy(&request).to_string()
        });

        (format!("http://{addr}"), handle)
    }

    #[tokio::test]
    async fn test_run_test_posts_with_bearer_token() {
        let (base_url, server) = serve_once("200 OK", r#"{"run_id": 9}"#).await;
        let config = GateConfig::new("secret", 42).with_base_url(base_url);
        let client = AnomaloClient::new(&config).unwrap();

        let response = client.run_test(42).await.unwrap();
        let request = server.await.unwrap().to_lowercase();

        assert_eq!(response, ApiResponse::new(200, r#"{"run_id": 9}"#));
        assert!(request.starts_with("post /api/tests/42/run http/1.1"), "{request}");
        assert!(request.contains("authorization: bearer secret"), "{request}");
    }

    #[tokio::test]
    async fn test_fetch_results_passes_error_status_through() {
        let (base_url, server) = serve_once("403 Forbidden", r#"{"detail": "bad token"}"#).await;
        let config = GateConfig::new("secret", 7).with_base_url(format!("{base_url}/"));
        let client = AnomaloClient::new(&config).unwrap();

        let response = client.fetch_results(7).await.unwrap();
        let request = server.await.unwrap().to_lowercase();

        assert_eq!(response.status_code, 403);
        assert_eq!(response.body, r#"{"detail": "bad token"}"#);
        assert!(request.starts_with("get /api/tests/7/results http/1.1"), "{request}");
    }

    #[test]
    fn test_rejects_unrepresentable_timeout() {
        let err = AnomaloClient::new(&GateConfig::new("secret", 1).with_timeout(1e20)).unwrap_err();
        assert!(matches!(err, GateError::Config(_)));
    }

    #[test]
    fn test_debug_hides_api_key() {
        let client = AnomaloClient::new(&GateConfig::new("secret-token", 1)).unwrap();
        assert!(!format!("{client:?}").contains("secret-token"));
    }
}
