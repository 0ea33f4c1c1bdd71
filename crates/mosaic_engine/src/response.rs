use bytes::Bytes;
use reqwest::header::{HeaderMap, CONTENT_TYPE, LOCATION, SET_COOKIE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::decode::{decode_body, DecodeError};

/// A fully buffered HTTP response, or the synthetic failure a health check reports.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    url: String,
    headers: HeaderMap,
    body: Bytes,
    synthetic: bool,
}

impl Response {
    pub fn new(status: StatusCode, url: impl Into<String>, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            url: url.into(),
            headers,
            body,
            synthetic: false,
        }
    }

    /// The "request failed" sentinel returned to health checks instead of an error.
    pub fn failed(url: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Bytes::from_static(b"Request failed."),
            synthetic: true,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE.as_str())
    }

    pub fn is_success(&self) -> bool {
        !self.synthetic && self.status.is_success()
    }

    pub fn is_redirect(&self) -> bool {
        self.status.is_redirection() && self.headers.contains_key(LOCATION)
    }

    pub fn is_failed_sentinel(&self) -> bool {
        self.synthetic
    }

    pub fn location(&self) -> Option<&str> {
        self.header(LOCATION.as_str())
    }

    /// All `Set-Cookie` values joined into a single `Cookie` header value.
    pub fn cookies(&self) -> Option<String> {
        let pairs: Vec<&str> = self
            .headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| value.split(';').next())
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .collect();
        (!pairs.is_empty()).then(|| pairs.join("; "))
    }

    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    pub fn text(&self) -> Result<String, DecodeError> {
        decode_body(&self.body, self.content_type())
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn sentinel_is_never_a_success() {
        let response = Response::failed("http://example.test");
        assert!(response.is_failed_sentinel());
        assert!(!response.is_success());
        assert_eq!(response.text().unwrap(), "Request failed.");
    }

    #[test]
    fn set_cookie_values_collapse_into_one_header() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("session=abc; Path=/; HttpOnly"));
        headers.append(SET_COOKIE, HeaderValue::from_static("cf_clearance=xyz; Secure"));
        headers.insert(LOCATION, HeaderValue::from_static("/next"));
        let response = Response::new(StatusCode::FOUND, "http://example.test", headers, Bytes::new());

        assert!(response.is_redirect());
        assert_eq!(response.location(), Some("/next"));
        assert_eq!(response.cookies().as_deref(), Some("session=abc; cf_clearance=xyz"));
    }
}
