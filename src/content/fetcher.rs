use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{LocalBoxStream, StreamExt};
use serde::Deserialize;
use std::time::Duration;

use super::version::VersionString;
use crate::error::{Result, UpdateError};

const USER_AGENT: &str = concat!("trimps-shell/", env!("CARGO_PKG_VERSION"));

/// `version.json` contents, remote or installed
#[derive(Debug, Clone, Deserialize)]
pub struct VersionDescriptor {
    pub version: VersionString,
}

/// Parse a descriptor body; anything without a `version` string is malformed
pub fn parse_descriptor(body: &[u8]) -> Result<VersionDescriptor> {
    Ok(serde_json::from_slice(body)?)
}

/// Chunks of a response body. The stream ends on completion and yields `Err` once on failure.
pub type ByteStream = LocalBoxStream<'static, Result<Bytes>>;

/// One GET per call, no retries
#[async_trait(?Send)]
pub trait ContentSource {
    async fn fetch_descriptor(&self, url: &str) -> Result<VersionDescriptor>;

    async fn open(&self, url: &str) -> Result<ByteStream>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    /// `timeout` bounds the descriptor request as a whole, and connecting and each read
    /// of any request
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()?;
        Ok(Self { client, timeout })
    }

    async fn get(&self, url: &str, timeout: Option<Duration>) -> Result<reqwest::Response> {
        let mut request = self.client.get(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(UpdateError::Status(response.status()));
        }
        Ok(response)
    }
}

#[async_trait(?Send)]
impl ContentSource for HttpFetcher {
    async fn fetch_descriptor(&self, url: &str) -> Result<VersionDescriptor> {
        let response = self.get(url, Some(self.timeout)).await?;
        let body = response.bytes().await?;
        parse_descriptor(&body)
    }

    async fn open(&self, url: &str) -> Result<ByteStream> {
        // Only the per-read timeout applies, archives can take a while on slow links
        let response = self.get(url, None).await?;
        log::debug!(
            "Streaming {} ({} bytes announced)",
            url,
            response
                .content_length()
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unknown".into())
        );

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| UpdateError::Interrupted(e.to_string())))
            .boxed_local())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    /// Serve one response that announces more body than it ever sends
    async fn stalling_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4096\r\n\r\nPK\x03\x04")
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });
        format!("http://{}/master.zip", addr)
    }

    #[tokio::test]
    async fn test_stalled_download_is_interrupted() {
        let url = stalling_server().await;
        let fetcher = HttpFetcher::new(Duration::from_millis(300)).unwrap();

        let mut stream = fetcher.open(&url).await.unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(10), async {
            while let Some(chunk) = stream.next().await {
                if let Err(e) = chunk {
                    return Err(e);
                }
            }
            Ok(())
        })
        .await
        .expect("stalled read was never cut off");

        let err = outcome.unwrap_err();
        assert!(matches!(err, UpdateError::Interrupted(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_parse_descriptor() {
        let d = parse_descriptor(br#"{"version": "5.9.2", "released": "2024-01-01"}"#).unwrap();
        assert_eq!(d.version.as_str(), "5.9.2");
    }

    #[test]
    fn test_parse_descriptor_malformed() {
        assert!(matches!(
            parse_descriptor(b"<html>404</html>"),
            Err(UpdateError::MalformedDescriptor(_))
        ));
        assert!(matches!(
            parse_descriptor(br#"{"name": "Trimps"}"#),
            Err(UpdateError::MalformedDescriptor(_))
        ));
        assert!(matches!(
            parse_descriptor(br#"{"version": 5}"#),
            Err(UpdateError::MalformedDescriptor(_))
        ));
    }

    #[test]
    fn test_parse_descriptor_empty_version_is_default() {
        let d = parse_descriptor(br#"{"version": ""}"#).unwrap();
        assert!(d.version.is_default());
    }
}
