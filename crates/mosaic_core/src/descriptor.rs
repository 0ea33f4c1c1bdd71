use std::time::Duration;

use crate::{MediaField, MediaFormat, ProviderType};

/// Static metadata every provider declares at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    pub id: String,
    pub base_url: String,
    pub provider_type: ProviderType,
    pub formats: Vec<MediaFormat>,
    /// Minimum spacing between two outbound calls. Zero means unlimited.
    pub rate_limit: Duration,
    /// `None` means unlimited.
    pub max_concurrent_requests: Option<usize>,
    pub needs_proxy: bool,
    pub use_translate_proxy: bool,
    /// Fields whose non-null value from this provider wins outright.
    pub priority_fields: Vec<MediaField>,
    /// Fields unioned with other providers' values instead of overwritten.
    pub shared_fields: Vec<MediaField>,
}

impl ProviderDescriptor {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>, provider_type: ProviderType) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into(),
            provider_type,
            formats: Vec::new(),
            rate_limit: Duration::ZERO,
            max_concurrent_requests: None,
            needs_proxy: false,
            use_translate_proxy: false,
            priority_fields: Vec::new(),
            shared_fields: Vec::new(),
        }
    }

    pub fn with_formats(mut self, formats: impl IntoIterator<Item = MediaFormat>) -> Self {
        self.formats = formats.into_iter().collect();
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: Duration) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_requests = Some(max.max(1));
        self
    }

    pub fn with_proxy(mut self, needs_proxy: bool) -> Self {
        self.needs_proxy = needs_proxy;
        self
    }

    pub fn with_translate_proxy(mut self, enabled: bool) -> Self {
        self.use_translate_proxy = enabled;
        self
    }

    pub fn with_priority_fields(mut self, fields: impl IntoIterator<Item = MediaField>) -> Self {
        self.priority_fields = fields.into_iter().collect();
        self
    }

    pub fn with_shared_fields(mut self, fields: impl IntoIterator<Item = MediaField>) -> Self {
        self.shared_fields = fields.into_iter().collect();
        self
    }

    pub fn supports_any(&self, formats: &[MediaFormat]) -> bool {
        formats.iter().any(|format| self.formats.contains(format))
    }

    pub fn is_rate_limited(&self) -> bool {
        !self.rate_limit.is_zero()
    }
}
