use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use mosaic_core::ProviderType;
use mosaic_logging::{mosaic_debug, mosaic_warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE};
use reqwest::{Method, Url};
use tokio_util::sync::CancellationToken;

use crate::config::DispatchSettings;
use crate::proxy::ProxyPool;
use crate::response::Response;
use crate::transport::{
    OutboundRequest, ReqwestTransport, Transport, TransportError, TransportErrorKind,
};

/// Per-call options. Built with the chained helpers; unset limits fall back to settings.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub proxy: Option<String>,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    pub provider: Option<(ProviderType, String)>,
    pub is_checking: bool,
    pub use_translate_proxy: bool,
    pub cancel: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: impl Into<Bytes>) -> Self {
        Self {
            method: Method::POST,
            body: Some(body.into()),
            ..Self::default()
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => mosaic_warn!("Dropping malformed header {:?}", name),
        }
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Identifies the pool the proxy was drawn from, enabling eviction and rotation.
    pub fn for_provider(mut self, provider_type: ProviderType, provider_id: impl Into<String>) -> Self {
        self.provider = Some((provider_type, provider_id.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Health-check mode: failures produce the sentinel response instead of an error.
    pub fn health_check(mut self) -> Self {
        self.is_checking = true;
        self
    }

    pub fn translated(mut self) -> Self {
        self.use_translate_proxy = true;
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("invalid url {url}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },
    #[error("request to {url} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last: TransportError,
    },
    #[error("no unused proxy left for {url}: {last}")]
    ProxiesExhausted { url: String, last: TransportError },
}

/// Proxy-aware HTTP dispatch with bounded retries and proxy rotation.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    pool: Arc<ProxyPool>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, pool: Arc<ProxyPool>, settings: DispatchSettings) -> Self {
        Self {
            transport,
            pool,
            settings,
        }
    }

    pub fn with_reqwest(pool: Arc<ProxyPool>, settings: DispatchSettings) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::new(&settings)?;
        Ok(Self::new(Arc::new(transport), pool, settings))
    }

    pub fn pool(&self) -> &Arc<ProxyPool> {
        &self.pool
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Send `url`, following at most one redirect manually and carrying its cookies.
    ///
    /// In health-check mode every failure, including an unparsable url, resolves to
    /// [`Response::failed`] and evicts the proxy under test.
    pub async fn dispatch(&self, url: &str, mut options: RequestOptions) -> Result<Response, DispatchError> {
        let mut target = match self.target_url(url, options.use_translate_proxy) {
            Ok(target) => target,
            Err(err) if options.is_checking => {
                mosaic_debug!("Health check of {} failed: {}", url, err);
                self.evict(&options);
                return Ok(Response::failed(url));
            }
            Err(err) => return Err(err),
        };
        let mut redirects_left = 1;
        loop {
            let response = self.send_with_retries(&target, &mut options).await?;
            if redirects_left == 0 || !response.is_redirect() {
                return Ok(response);
            }
            let Some(next) = response.location().and_then(|location| target.join(location).ok()) else {
                return Ok(response);
            };
            if let Some(cookie) = response.cookies().and_then(|c| HeaderValue::from_str(&c).ok()) {
                options.headers.insert(COOKIE, cookie);
            }
            mosaic_debug!("Following redirect {} -> {}", target, next);
            redirects_left -= 1;
            target = next;
        }
    }

    fn target_url(&self, url: &str, translate: bool) -> Result<Url, DispatchError> {
        let raw = if translate {
            let encoded: String = url::form_urlencoded::byte_serialize(url.as_bytes()).collect();
            format!("{}{}", self.settings.translate_endpoint, encoded)
        } else {
            url.to_string()
        };
        Url::parse(&raw).map_err(|err| DispatchError::InvalidUrl {
            url: url.to_string(),
            message: err.to_string(),
        })
    }

    async fn send_with_retries(
        &self,
        target: &Url,
        options: &mut RequestOptions,
    ) -> Result<Response, DispatchError> {
        let max_retries = options.max_retries.unwrap_or(self.settings.max_retries);
        let timeout = options.timeout.unwrap_or(if options.is_checking {
            self.settings.health_check_timeout
        } else {
            self.settings.timeout
        });
        let mut used: HashSet<String> = options.proxy.iter().cloned().collect();
        let mut retries = 0;

        loop {
            let request = OutboundRequest {
                method: options.method.clone(),
                url: target.clone(),
                headers: options.headers.clone(),
                body: options.body.clone(),
                proxy: options.proxy.clone(),
            };
            let err = match self.attempt(request, timeout, options.cancel.as_ref()).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            if options.is_checking {
                mosaic_debug!("Health check of {} failed: {}", target, err);
                self.evict(options);
                return Ok(Response::failed(target.as_str()));
            }
            if !err.is_transient() {
                return Err(DispatchError::Transport {
                    url: target.to_string(),
                    source: err,
                });
            }
            if retries >= max_retries {
                return Err(DispatchError::RetriesExhausted {
                    url: target.to_string(),
                    attempts: retries + 1,
                    last: err,
                });
            }

            mosaic_warn!(
                "Attempt {} for {} via {:?} failed: {}",
                retries + 1,
                target,
                options.proxy,
                err
            );
            if options.proxy.is_some() && options.provider.is_some() {
                self.evict(options);
                options.proxy = self.draw_unused(options, &mut used);
                if options.proxy.is_none() {
                    return Err(DispatchError::ProxiesExhausted {
                        url: target.to_string(),
                        last: err,
                    });
                }
            }
            retries += 1;
        }
    }

    async fn attempt(
        &self,
        request: OutboundRequest,
        timeout: Duration,
        parent: Option<&CancellationToken>,
    ) -> Result<Response, TransportError> {
        let token = parent.map(CancellationToken::child_token).unwrap_or_default();
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(TransportError::new(TransportErrorKind::Aborted, "request cancelled")),
            outcome = tokio::time::timeout(timeout, self.transport.send(request)) => {
                outcome.unwrap_or_else(|_| {
                    token.cancel();
                    Err(TransportError::new(
                        TransportErrorKind::Timeout,
                        format!("no response within {timeout:?}"),
                    ))
                })
            }
        }
    }

    fn evict(&self, options: &RequestOptions) {
        let (Some(proxy), Some((provider_type, provider_id))) = (&options.proxy, &options.provider) else {
            return;
        };
        self.pool.evict(*provider_type, provider_id, proxy);
    }

    fn draw_unused(&self, options: &RequestOptions, used: &mut HashSet<String>) -> Option<String> {
        let (provider_type, provider_id) = options.provider.as_ref()?;
        for _ in 0..self.settings.max_proxy_draws {
            let candidate = self.pool.random(*provider_type, provider_id)?;
            if used.insert(candidate.clone()) {
                return Some(candidate);
            }
        }
        None
    }
}
