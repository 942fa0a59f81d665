//! Replayable request descriptions.
//!
//! An [`HttpRequest`] owns its body as bytes so the transport can rebuild a
//! fresh `reqwest` request for every attempt. Whether a request may be
//! repeated is fixed when it is constructed.

use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use tracing::warn;
use url::form_urlencoded;

/// Whether repeating a request is safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idempotency {
    /// Safe to repeat; eligible for automatic retry.
    Idempotent,
    /// Repeating may duplicate a side effect (credential submission); sent once.
    NonIdempotent,
}

/// A fully buffered HTTP request.
#[derive(Clone)]
pub struct HttpRequest {
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
    idempotency: Idempotency,
}

impl std::fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Bodies and header values may carry credentials.
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("body_len", &self.body.as_ref().map(Vec::len))
            .field("idempotency", &self.idempotency)
            .finish()
    }
}

impl HttpRequest {
    /// An idempotent GET.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
            idempotency: Idempotency::Idempotent,
        }
    }

    /// A POST; non-idempotent unless [`Self::idempotent`] is applied.
    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
            idempotency: Idempotency::NonIdempotent,
        }
    }

    /// Marks the request as safe to retry.
    #[must_use]
    pub fn idempotent(mut self) -> Self {
        self.idempotency = Idempotency::Idempotent;
        self
    }

    /// Marks the request as unsafe to retry.
    #[must_use]
    pub fn non_idempotent(mut self) -> Self {
        self.idempotency = Idempotency::NonIdempotent;
        self
    }

    /// Adds a header. Invalid names or values are logged and skipped.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(mut value)) => {
                if name == reqwest::header::AUTHORIZATION || name == reqwest::header::COOKIE {
                    value.set_sensitive(true);
                }
                self.headers.insert(name, value);
            }
            _ => warn!(header = name, "skipping header with invalid name or value"),
        }
        self
    }

    /// Sets the `Authorization: Bearer` header. A token that is not a valid
    /// header value is skipped like any other invalid header; sessions reject
    /// such tokens before they reach a request.
    #[must_use]
    pub fn bearer(self, token: &str) -> Self {
        self.header(reqwest::header::AUTHORIZATION.as_str(), &format!("Bearer {token}"))
    }

    /// Sets a raw body with its content type.
    #[must_use]
    pub fn body(mut self, content_type: &str, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self.header(CONTENT_TYPE.as_str(), content_type)
    }

    /// Sets a JSON body.
    #[must_use]
    pub fn json(self, value: &serde_json::Value) -> Self {
        let bytes = value.to_string().into_bytes();
        self.body("application/json", bytes)
    }

    /// Sets an `application/x-www-form-urlencoded` body.
    #[must_use]
    pub fn form<'a>(self, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in pairs {
            serializer.append_pair(key, value);
        }
        let encoded = serializer.finish();
        self.body("application/x-www-form-urlencoded", encoded.into_bytes())
    }

    /// HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Buffered body, if any.
    #[must_use]
    pub fn body_bytes(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Retry classification.
    #[must_use]
    pub fn idempotency(&self) -> Idempotency {
        self.idempotency
    }
}
