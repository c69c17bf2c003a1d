use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::header::HeaderMap;

use super::{Probe, ProbeSetupError};
use crate::context::RunContext;
use crate::types::Measurement;

/// Verifies HTTP reachability of a URL.
///
/// Idle connections are never kept, so every check dials and resolves anew.
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>) -> Result<Self, ProbeSetupError> {
        let url = url.into();
        if url.is_empty() {
            return Err(ProbeSetupError::MissingUrl);
        }
        let client = reqwest::Client::builder().pool_max_idle_per_host(0).build()?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn check(&self, ctx: &RunContext) -> Result<Vec<Measurement>> {
        let response = ctx
            .run(self.client.get(&self.url).send())
            .await?
            .map_err(|e| anyhow!("HTTP request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = failure_detail(response.headers());
            return Err(anyhow!("unexpected status code: {}{}", status.as_u16(), detail));
        }
        Ok(Vec::new())
    }
}

/// Failure context the platform's edge attaches to error responses.
fn failure_detail(headers: &HeaderMap) -> String {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).filter(|v| !v.is_empty());
    let mut detail = String::new();
    if let Some(code) = header("x-do-orig-status") {
        detail.push_str(" origin-code=");
        detail.push_str(code);
    }
    for name in ["x-do-failure-msg", "x-do-failure-code"] {
        if let Some(value) = header(name) {
            detail.push(' ');
            detail.push_str(value);
        }
    }
    detail
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Serve `response` verbatim to the first connection and return its URL.
    async fn respond_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await.unwrap();
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{addr}/health")
    }

    #[test]
    fn test_http_probe_requires_url() {
        assert!(matches!(HttpProbe::new(""), Err(ProbeSetupError::MissingUrl)));
        assert!(HttpProbe::new("http://localhost:8080/health").is_ok());
    }

    #[tokio::test]
    async fn test_http_probe_respects_cancelled_context() {
        let probe = HttpProbe::new("http://192.0.2.1/").unwrap();
        let ctx = RunContext::background();
        ctx.cancel();

        let err = probe.check(&ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "context cancelled");
    }

    #[tokio::test]
    async fn test_failure_headers_appended_to_status_error() {
        let url = respond_once(
            "HTTP/1.1 503 Service Unavailable\r\n\
             x-do-orig-status: 502\r\n\
             x-do-failure-msg: upstream connect error\r\n\
             x-do-failure-code: UF\r\n\
             content-length: 0\r\n\
             connection: close\r\n\r\n",
        )
        .await;

        let err = HttpProbe::new(url).unwrap().check(&RunContext::background()).await.unwrap_err();
        assert_eq!(err.to_string(), "unexpected status code: 503 origin-code=502 upstream connect error UF");
    }

    #[tokio::test]
    async fn test_status_error_without_failure_headers() {
        let url = respond_once("HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n").await;

        let err = HttpProbe::new(url).unwrap().check(&RunContext::background()).await.unwrap_err();
        assert_eq!(err.to_string(), "unexpected status code: 404");
    }

    #[tokio::test]
    async fn test_success_status_passes() {
        let url = respond_once("HTTP/1.1 204 No Content\r\nconnection: close\r\n\r\n").await;

        let measurements = HttpProbe::new(url).unwrap().check(&RunContext::background()).await.unwrap();
        assert!(measurements.is_empty());
    }
}
