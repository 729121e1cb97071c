use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{self, Read};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::TraktError;

pub const TRAKT_API_URL: &str = "https://api.trakt.tv";

/// One hop of the request pipeline. Layers wrap an inner `Transport` and may
/// send the same request several times, so they take it by mutable reference.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &mut ApiRequest) -> Result<ApiResponse, TraktError>;
}

/// Buffered request body with a read cursor.
///
/// Reading advances the cursor; `rewind` moves it back to the first byte so a
/// replayed request carries exactly the bytes of the original.
#[derive(Debug, Clone, Default)]
pub struct RewindableBody {
    data: Bytes,
    position: usize,
}

impl RewindableBody {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            position: 0,
        }
    }

    pub fn rewind(&mut self) {
        self.position = 0;
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }
}

impl Read for RewindableBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.data[self.position..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.position += n;
        Ok(n)
    }
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base, starting with `/`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<RewindableBody>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, TraktError> {
        let bytes = serde_json::to_vec(body)?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(RewindableBody::new(bytes));
        Ok(self)
    }

    pub fn set_header(&mut self, name: HeaderName, value: &str) -> Result<(), TraktError> {
        let value = HeaderValue::from_str(value)
            .map_err(|e| TraktError::Auth(format!("invalid header value for {}: {}", name, e)))?;
        self.headers.insert(name, value);
        Ok(())
    }
}

/// Fully buffered response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TraktError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Fail with `UnexpectedStatusCode` unless the status is one of `want`
    pub fn expect(self, want: &[StatusCode]) -> Result<Self, TraktError> {
        if want.contains(&self.status) {
            Ok(self)
        } else {
            Err(TraktError::UnexpectedStatusCode {
                got: self.status,
                want: want.to_vec(),
            })
        }
    }
}

/// Innermost layer: sends requests with reqwest against a base URL.
pub struct HttpTransport {
    client: Client,
    base_url: String,
    cancel: CancellationToken,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, cancel: CancellationToken) -> Self {
        Self::with_client(Client::new(), base_url, cancel)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cancel,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &mut ApiRequest) -> Result<ApiResponse, TraktError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(request.headers.clone());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = request.body.as_mut() {
            let mut buf = Vec::with_capacity(body.remaining());
            body.read_to_end(&mut buf)?;
            builder = builder.body(buf);
        }

        debug!(method = %request.method, path = %request.path, "Sending Trakt request");

        let call = async {
            let response = builder.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?;
            Ok::<_, TraktError>(ApiResponse { status, headers, body })
        };

        tokio::select! {
            _ = self.cancel.cancelled() => Err(TraktError::Cancelled),
            result = call => result,
        }
    }
}
