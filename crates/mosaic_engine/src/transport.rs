use std::collections::HashMap;
use std::error::Error as _;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Method, Url};

use crate::config::DispatchSettings;
use crate::response::Response;

/// One physical HTTP attempt as the dispatcher hands it to a transport.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    /// `http://ip:port` of the proxy to tunnel through, if any.
    pub proxy: Option<String>,
}

impl OutboundRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: None,
            proxy: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    ConnectionClosed,
    Tls,
    Aborted,
    InvalidRequest,
    Other,
}

impl TransportErrorKind {
    /// Failures a different proxy or a second attempt may cure.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            TransportErrorKind::Timeout
                | TransportErrorKind::Connect
                | TransportErrorKind::ConnectionClosed
                | TransportErrorKind::Tls
        )
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Connect => "connect error",
            TransportErrorKind::ConnectionClosed => "connection closed",
            TransportErrorKind::Tls => "tls error",
            TransportErrorKind::Aborted => "aborted",
            TransportErrorKind::InvalidRequest => "invalid request",
            TransportErrorKind::Other => "transport error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// Sends one attempt. Redirects are never followed here; the dispatcher decides.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<Response, TransportError>;
}

/// Upper bound on cached per-proxy clients; the cache starts over once it is exceeded.
const MAX_PROXIED_CLIENTS: usize = 256;

type ProxiedClients = HashMap<(String, bool), reqwest::Client>;

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    direct: reqwest::Client,
    proxied: Arc<Mutex<ProxiedClients>>,
    connect_timeout: Duration,
    user_agent: Option<HeaderValue>,
}

impl ReqwestTransport {
    pub fn new(settings: &DispatchSettings) -> Result<Self, TransportError> {
        let direct = Self::builder(settings.connect_timeout)
            .no_proxy()
            .build()
            .map_err(map_reqwest_error)?;
        let user_agent = settings
            .user_agent
            .as_deref()
            .and_then(|agent| HeaderValue::from_str(agent).ok());
        Ok(Self {
            direct,
            proxied: Arc::default(),
            connect_timeout: settings.connect_timeout,
            user_agent,
        })
    }

    fn builder(connect_timeout: Duration) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .redirect(reqwest::redirect::Policy::none())
    }

    /// Proxied attempts get their own client so each proxy has its own connection pool.
    /// Clients are cached per proxy and scheme.
    fn client_for(&self, request: &OutboundRequest) -> Result<reqwest::Client, TransportError> {
        let Some(proxy_url) = request.proxy.as_deref() else {
            return Ok(self.direct.clone());
        };
        let https = request.url.scheme() == "https";
        let key = (proxy_url.to_string(), https);
        if let Some(client) = self.proxied().get(&key) {
            return Ok(client.clone());
        }

        let client = self.build_proxied(proxy_url, https)?;
        let mut proxied = self.proxied();
        if proxied.len() >= MAX_PROXIED_CLIENTS {
            proxied.clear();
        }
        Ok(proxied.entry(key).or_insert(client).clone())
    }

    fn build_proxied(&self, proxy_url: &str, https: bool) -> Result<reqwest::Client, TransportError> {
        let invalid = |err: reqwest::Error| {
            TransportError::new(TransportErrorKind::InvalidRequest, format!("proxy {proxy_url}: {err}"))
        };
        let builder = Self::builder(self.connect_timeout);
        let builder = if https {
            // Free proxies frequently re-sign TLS traffic.
            builder
                .proxy(reqwest::Proxy::https(proxy_url).map_err(invalid)?)
                .danger_accept_invalid_certs(true)
        } else {
            builder.proxy(reqwest::Proxy::http(proxy_url).map_err(invalid)?)
        };
        builder.build().map_err(map_reqwest_error)
    }

    fn proxied(&self) -> MutexGuard<'_, ProxiedClients> {
        self.proxied.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn cached_clients(&self) -> usize {
        self.proxied().len()
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: OutboundRequest) -> Result<Response, TransportError> {
        let client = self.client_for(&request)?;
        let mut builder = client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if !request.headers.contains_key(USER_AGENT) {
            if let Some(agent) = &self.user_agent {
                builder = builder.header(USER_AGENT, agent.clone());
            }
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let url = response.url().to_string();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(map_reqwest_error)?;
        Ok(Response::new(status, url, headers, body))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    let message = error_chain(&err);
    let lowered = message.to_ascii_lowercase();
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if lowered.contains("certificate") || lowered.contains("tls") || lowered.contains("handshake") {
        TransportErrorKind::Tls
    } else if err.is_connect() {
        TransportErrorKind::Connect
    } else if err.is_builder() {
        TransportErrorKind::InvalidRequest
    } else if err.is_request() || err.is_body() || lowered.contains("connection reset") || lowered.contains("closed") {
        TransportErrorKind::ConnectionClosed
    } else {
        TransportErrorKind::Other
    };
    TransportError::new(kind, message)
}

fn error_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
