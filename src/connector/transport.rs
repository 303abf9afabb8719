use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub body: String,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Outbound POST used by the connector. Implementations report non-2xx
/// statuses as [`TransportError::Status`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// `reqwest`-backed transport sharing one connection pool across calls.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(connect_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .post(&request.url)
            .body(request.body)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status();
        let body = response.text().await.map_err(classify)?;

        if status.is_success() {
            Ok(HttpResponse {
                status: status.as_u16(),
                body,
            })
        } else {
            Err(TransportError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_connect() {
        TransportError::Connection(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str, headers: Vec<(String, String)>) -> HttpRequest {
        HttpRequest {
            url: url.to_string(),
            body: "{}".to_string(),
            headers,
            timeout: Duration::from_millis(500),
        }
    }

    #[tokio::test]
    async fn malformed_url_fails_before_sending() {
        let transport = ReqwestTransport::new(Duration::from_millis(200)).unwrap();
        let result = transport.post(request("not a url", vec![])).await;

        assert!(matches!(result, Err(TransportError::Other(_))), "{result:?}");
    }

    #[tokio::test]
    async fn invalid_header_fails_before_sending() {
        let transport = ReqwestTransport::new(Duration::from_millis(200)).unwrap();
        let headers = vec![("bad header".to_string(), "x".to_string())];
        let result = transport.post(request("http://localhost/enrich", headers)).await;

        assert!(matches!(result, Err(TransportError::Other(_))), "{result:?}");
    }

    #[test]
    fn status_error_carries_code_and_body() {
        let err = TransportError::Status {
            status: 503,
            body: "busy".to_string(),
        };
        assert_eq!(err.to_string(), "endpoint returned status 503: busy");
    }
}
