//! HTTP transport implementation using reqwest.
//!
//! Redirect handling and certificate verification are client-level settings
//! in reqwest, so one client is built per combination and picked per request.

use std::collections::BTreeMap;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::{Client, Method, redirect::Policy};
use tether_application::ports::{HttpTransport, TransportError, TransportRequest, TransportResponse};
use tether_domain::HttpMethod;

/// Maximum redirects followed when a request asks for redirects.
pub const MAX_REDIRECTS: usize = 10;

/// HTTP transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    verified_follow: Client,
    verified_manual: Client,
    insecure_follow: Client,
    insecure_manual: Client,
}

impl ReqwestTransport {
    /// Creates a transport sending `user_agent` when a request sets none.
    ///
    /// # Errors
    ///
    /// Returns an error if a client cannot be created.
    pub fn new(user_agent: &str) -> Result<Self, TransportError> {
        let build = |follow: bool, insecure: bool| {
            let redirect = if follow {
                Policy::limited(MAX_REDIRECTS)
            } else {
                Policy::none()
            };
            Client::builder()
                .user_agent(user_agent)
                .redirect(redirect)
                .danger_accept_invalid_certs(insecure)
                .build()
                .map_err(|e| TransportError::Other(e.to_string()))
        };

        Ok(Self {
            verified_follow: build(true, false)?,
            verified_manual: build(false, false)?,
            insecure_follow: build(true, true)?,
            insecure_manual: build(false, true)?,
        })
    }

    const fn client(&self, follow_redirects: bool, insecure: bool) -> &Client {
        match (follow_redirects, insecure) {
            (true, false) => &self.verified_follow,
            (false, false) => &self.verified_manual,
            (true, true) => &self.insecure_follow,
            (false, true) => &self.insecure_manual,
        }
    }

    const fn to_reqwest_method(method: HttpMethod) -> Method {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
            HttpMethod::Head => Method::HEAD,
            HttpMethod::Options => Method::OPTIONS,
        }
    }

    /// Classifies a reqwest failure.
    ///
    /// The URL is dropped from the message; it may carry credentials.
    fn map_error(error: reqwest::Error, timeout_ms: u64) -> TransportError {
        let host = error
            .url()
            .and_then(|u| u.host_str())
            .unwrap_or("unknown")
            .to_string();
        let error = error.without_url();
        if error.is_timeout() {
            return TransportError::Timeout { timeout_ms };
        }
        if error.is_redirect() {
            return TransportError::TooManyRedirects { max: MAX_REDIRECTS };
        }
        if error.is_builder() {
            return TransportError::InvalidUrl(error.to_string());
        }

        let message = full_message(&error);
        let lower = message.to_lowercase();
        if lower.contains("certificate") || lower.contains("tls") || lower.contains("handshake") {
            return TransportError::Tls(message);
        }
        if error.is_connect() {
            if lower.contains("dns") || lower.contains("resolve") || lower.contains("lookup") {
                return TransportError::Dns { host, message };
            }
            return TransportError::Connection(message);
        }
        if error.is_request() || error.is_body() {
            return TransportError::Connection(message);
        }
        TransportError::Other(message)
    }

    async fn perform(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let timeout_ms = u64::try_from(request.timeout.as_millis()).unwrap_or(u64::MAX);
        let url = reqwest::Url::parse(&request.url)
            .map_err(|e| TransportError::InvalidUrl(e.to_string()))?;

        let start = Instant::now();
        let mut builder = self
            .client(request.follow_redirects, request.insecure)
            .request(Self::to_reqwest_method(request.method), url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Self::map_error(e, timeout_ms))?;
        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_ascii_lowercase(),
                    String::from_utf8_lossy(v.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| Self::map_error(e, timeout_ms))?;

        Ok(TransportResponse {
            status,
            headers,
            body,
            duration: start.elapsed(),
        })
    }
}

/// Joins an error with its sources; reqwest keeps the useful part underneath.
fn full_message(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let abort = request.abort.clone();
        tracing::debug!(method = %request.method, "sending request");
        tokio::select! {
            biased;
            () = abort.cancelled() => Err(TransportError::Cancelled),
            result = self.perform(request) => result,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tether_domain::RequestOptions;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn transport() -> ReqwestTransport {
        ReqwestTransport::new("tether-test").unwrap()
    }

    fn request(url: &str) -> TransportRequest {
        TransportRequest::from_options(&RequestOptions::get(url), Duration::from_secs(5))
    }

    /// Serves one canned response and hands back the raw request it read.
    async fn serve_once(response: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buffer = vec![0u8; 4096];
            let read = socket.read(&mut buffer).await.unwrap();
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&buffer[..read]).into_owned()
        });
        (format!("http://{address}"), handle)
    }

    #[test]
    fn test_to_reqwest_method() {
        assert_eq!(ReqwestTransport::to_reqwest_method(HttpMethod::Get), Method::GET);
        assert_eq!(ReqwestTransport::to_reqwest_method(HttpMethod::Patch), Method::PATCH);
        assert_eq!(ReqwestTransport::to_reqwest_method(HttpMethod::Options), Method::OPTIONS);
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let result = transport().send(request("not a url")).await;
        assert!(matches!(result, Err(TransportError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_aborted_request_is_cancelled() {
        let request = request("http://127.0.0.1:9/");
        request.abort.cancel();
        assert_eq!(transport().send(request).await, Err(TransportError::Cancelled));
    }

    #[tokio::test]
    async fn test_refused_connection_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let result = transport().send(request(&format!("http://{address}/"))).await;
        assert!(matches!(result, Err(TransportError::Connection(_))), "{result:?}");
    }

    #[tokio::test]
    async fn test_error_message_omits_url() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("http://{address}/v1?access_key=hunter2");
        let error = transport().send(request(&url)).await.unwrap_err();
        assert!(!error.to_string().contains("hunter2"), "{error}");
    }

    #[tokio::test]
    async fn test_response_is_collected() {
        let (url, server) = serve_once(
            "HTTP/1.1 201 Created\r\nContent-Length: 11\r\nX-Trace: abc\r\nConnection: close\r\n\r\n{\"id\":\"42\"}",
        )
        .await;

        let mut request = request(&format!("{url}/items"));
        request.method = HttpMethod::Post;
        request.headers.push(("X-Api-Key".to_string(), "k".to_string()));
        request.body = Some("payload".to_string());
        let response = transport().send(request).await.unwrap();

        assert_eq!(response.status, 201);
        assert_eq!(response.body, r#"{"id":"42"}"#);
        assert_eq!(response.headers.get("x-trace").map(String::as_str), Some("abc"));

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /items HTTP/1.1"));
        assert!(raw.to_lowercase().contains("x-api-key: k"));
        assert!(raw.to_lowercase().contains("user-agent: tether-test"));
    }

    #[tokio::test]
    async fn test_redirect_not_followed_when_disabled() {
        let (url, _server) = serve_once(
            "HTTP/1.1 302 Found\r\nLocation: /elsewhere\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;

        let mut request = request(&url);
        request.follow_redirects = false;
        let response = transport().send(request).await.unwrap();
        assert_eq!(response.status, 302);
        assert_eq!(response.headers.get("location").map(String::as_str), Some("/elsewhere"));
    }
}
