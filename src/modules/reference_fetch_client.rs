use std::time::Duration;

use anyhow::Error;
use reqwest::redirect::Policy;
use reqwest::StatusCode;

use crate::config::config::FetchConfig;

/// HTTP client for the reference photo, with a bounded timeout, a redirect
/// cap and a response-size ceiling.
#[derive(Debug, Clone)]
pub struct ReferenceFetchClient {
    client: reqwest::Client,
    max_response_bytes: usize,
}

impl ReferenceFetchClient {
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .redirect(Policy::limited(config.max_redirects))
            .build()?;

        Ok(ReferenceFetchClient {
            client,
            max_response_bytes: config.max_response_bytes,
        })
    }

    /// fetch downloads the reference image body.
    ///
    /// Network errors and any non-200 status are errors; decoding the body is
    /// left to the caller so undecodable payloads keep their own failure mode.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, Error> {
        let mut response = self.client.get(url).send().await?;
        if response.status() != StatusCode::OK {
            return Err(Error::msg(format!(
                "reference_fetch_client - unexpected status {}",
                response.status()
            )));
        }

        if let Some(length) = response.content_length() {
            if length as usize > self.max_response_bytes {
                return Err(Error::msg(format!(
                    "reference_fetch_client - declared length {length} exceeds limit"
                )));
            }
        }

        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > self.max_response_bytes {
                return Err(Error::msg(
                    "reference_fetch_client - response exceeds size limit",
                ));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    fn serve_once(status_line: &'static str, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 2048];
                let _ = stream.read(&mut buf);
                let header = format!(
                    "HTTP/1.1 {status_line}\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = stream.write_all(header.as_bytes());
                let _ = stream.write_all(&body);
            }
        });
        format!("http://{addr}/reference.png")
    }

    fn client_with_limit(max_response_bytes: usize) -> ReferenceFetchClient {
        let mut config = FetchConfig::default();
        config.max_response_bytes = max_response_bytes;
        ReferenceFetchClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_returns_body_on_200() {
        let url = serve_once("200 OK", b"reference-bytes".to_vec());
        let body = client_with_limit(1024).fetch(&url).await.unwrap();
        assert_eq!(body, b"reference-bytes");
    }

    #[tokio::test]
    async fn test_fetch_fails_on_404() {
        let url = serve_once("404 Not Found", b"missing".to_vec());
        assert!(client_with_limit(1024).fetch(&url).await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_fails_on_connection_error() {
        // Bind then drop to find a port nothing is listening on.
        let addr = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let url = format!("http://{addr}/reference.png");
        assert!(client_with_limit(1024).fetch(&url).await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_enforces_response_size_limit() {
        let url = serve_once("200 OK", vec![0u8; 64]);
        assert!(client_with_limit(16).fetch(&url).await.is_err());
    }
}
