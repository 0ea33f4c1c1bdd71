use std::future::Future;
use std::time::Duration;

use mosaic_logging::mosaic_warn;

use crate::html::page_title;
use crate::provider::ProviderError;
use crate::response::Response;

const CHALLENGE_TITLES: &[&str] = &["Just a moment...", "Attention Required! | Cloudflare"];

/// Whether a response is an anti-bot interstitial rather than the requested page.
pub fn is_challenge(response: &Response) -> bool {
    if response
        .header("cf-mitigated")
        .is_some_and(|value| value.eq_ignore_ascii_case("challenge"))
    {
        return true;
    }
    response.text().is_ok_and(|html| is_challenge_html(&html))
}

pub fn is_challenge_html(html: &str) -> bool {
    if !html.contains("<title") {
        return false;
    }
    page_title(html).is_some_and(|title| CHALLENGE_TITLES.iter().any(|c| title.eq_ignore_ascii_case(c)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    None,
    /// Sleep `delay * attempt` before the next attempt.
    Linear(Duration),
}

impl Backoff {
    fn delay(self, attempt: u32) -> Duration {
        match self {
            Backoff::None => Duration::ZERO,
            Backoff::Linear(step) => step * attempt,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChallengePolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl ChallengePolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Re-run `op` while it reports a challenge page, up to `max_attempts` in total.
    /// Other outcomes are returned as-is.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Err(ProviderError::Challenge { url }) if attempt < self.max_attempts => {
                    mosaic_warn!(
                        "{}: challenge page at {} (attempt {}/{})",
                        label,
                        url,
                        attempt,
                        self.max_attempts
                    );
                    let delay = self.backoff.delay(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_interstitial_titles() {
        assert!(is_challenge_html("<html><head><title>Just a moment...</title></head></html>"));
        assert!(is_challenge_html(
            "<html><head><title>Attention Required! | Cloudflare</title></head></html>"
        ));
        assert!(!is_challenge_html("<html><head><title>Berserk - Chapters</title></head></html>"));
        assert!(!is_challenge_html("{\"title\":\"Just a moment...\"}"));
    }
}
