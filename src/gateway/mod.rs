//! Guarded evidence acquisition: allowlist, cache, robots, rate limiting
//! and fetch-with-retry composed into a single short-circuiting pipeline

pub mod cache;
pub mod golden;
pub mod rate_limit;
pub mod robots;

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use url::Url;

use crate::model::{AllowlistConfig, EvidenceDocument, EvidenceSource};
use cache::ContentCache;
use rate_limit::DomainRateLimiter;
use robots::RobotsChecker;

/// Policy reason a fetch was refused. Blocked fetches are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Domain is not in the configured allowlist.
    Allowlist,
    /// robots.txt explicitly disallows the URL.
    Robots,
}

/// Outcome of a gateway fetch. Ordinary network failures surface as
/// variants, never as errors.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Document retrieved from the network (and written to the cache).
    Fetched(EvidenceDocument),
    /// Fresh cache entry returned without touching the network.
    CacheHit(EvidenceDocument),
    Blocked(BlockReason),
    /// No rate-limit token became available within the wait bound.
    RateLimited,
    /// All fetch attempts failed; carries the last error.
    Failed(String),
}

impl FetchOutcome {
    /// The retrieved document, from either the network or the cache.
    pub fn into_document(self) -> Option<EvidenceDocument> {
        match self {
            FetchOutcome::Fetched(doc) | FetchOutcome::CacheHit(doc) => Some(doc),
            _ => None,
        }
    }
}

/// Fetches evidence documents for the fixed per-supplier URL sets, with
/// every guard applied in order: allowlist, cache, robots, rate limit,
/// retrying HTTP fetch.
pub struct EvidenceGateway {
    client: Client,
    allowlist: AllowlistConfig,
    cache: ContentCache,
    robots: RobotsChecker,
    limiter: DomainRateLimiter,
}

impl EvidenceGateway {
    pub fn new(allowlist: AllowlistConfig, cache: ContentCache) -> Self {
        let client = Client::builder()
            .user_agent(allowlist.user_agent.clone())
            .timeout(Duration::from_secs(allowlist.settings.request_timeout_seconds))
            .build()
            .unwrap_or_else(|_| Client::new());

        let domain_rates: HashMap<String, u32> = allowlist
            .domains
            .iter()
            .map(|d| (d.domain.to_lowercase(), allowlist.rate_limit_for(&d.domain)))
            .collect();
        let limiter = DomainRateLimiter::new(domain_rates, allowlist.default_rate_limit_rpm);
        let robots = RobotsChecker::new(client.clone(), allowlist.user_agent.clone());

        Self {
            client,
            allowlist,
            cache,
            robots,
            limiter,
        }
    }

    /// Remove all cached content.
    pub fn clear_cache(&self) -> std::io::Result<usize> {
        self.cache.clear()
    }

    /// Fetch one evidence URL through the guard pipeline.
    pub async fn fetch(&self, url: &Url) -> FetchOutcome {
        let domain = match url.host_str() {
            Some(h) => h.to_lowercase(),
            None => return FetchOutcome::Blocked(BlockReason::Allowlist),
        };

        if !self.allowlist.is_domain_allowed(&domain) {
            tracing::warn!(url = %url, domain = %domain, "Domain not in allowlist");
            return FetchOutcome::Blocked(BlockReason::Allowlist);
        }

        // A fresh cache entry short-circuits robots and rate limiting: the
        // network is not touched.
        if let Some(entry) = self.cache.get(url.as_str()) {
            return FetchOutcome::CacheHit(EvidenceDocument {
                url: url.clone(),
                domain,
                content: entry.content,
                content_hash: entry.content_hash,
                http_status: entry.http_status,
                retrieved_at: cached_at_time(entry.cached_at),
                from_cache: true,
                source: EvidenceSource::OfficialWeb,
            });
        }

        if self.allowlist.settings.respect_robots_txt && !self.robots.is_allowed(url).await {
            tracing::warn!(url = %url, "Blocked by robots.txt");
            return FetchOutcome::Blocked(BlockReason::Robots);
        }

        let wait = Duration::from_secs(self.allowlist.settings.rate_limit_wait_seconds);
        if !self.limiter.acquire(&domain, wait).await {
            tracing::warn!(url = %url, domain = %domain, "Rate limit wait exhausted");
            return FetchOutcome::RateLimited;
        }

        self.fetch_with_retry(url, &domain).await
    }

    async fn fetch_with_retry(&self, url: &Url, domain: &str) -> FetchOutcome {
        let settings = &self.allowlist.settings;
        let mut last_error = String::new();

        for attempt in 0..settings.max_retries {
            match self.try_fetch(url).await {
                Ok((content, status)) => {
                    let content_hash = match self.cache.put(url.as_str(), &content, status) {
                        Ok(hash) => hash,
                        Err(e) => {
                            // A cache write failure does not fail the fetch.
                            tracing::warn!(url = %url, error = %e, "Failed to write cache entry");
                            cache::content_hash(&content)
                        }
                    };
                    tracing::info!(
                        url = %url,
                        status = status,
                        content_length = content.len(),
                        attempt = attempt + 1,
                        "Fetched evidence document"
                    );
                    return FetchOutcome::Fetched(EvidenceDocument {
                        url: url.clone(),
                        domain: domain.to_string(),
                        content,
                        content_hash,
                        http_status: status,
                        retrieved_at: Utc::now(),
                        from_cache: false,
                        source: EvidenceSource::OfficialWeb,
                    });
                }
                Err(e) => {
                    last_error = e;
                    let backoff = settings.backoff_factor.powi(attempt as i32);
                    tracing::warn!(
                        url = %url,
                        attempt = attempt + 1,
                        error = %last_error,
                        backoff_seconds = backoff,
                        "Fetch attempt failed"
                    );
                    if attempt + 1 < settings.max_retries {
                        tokio::time::sleep(Duration::from_secs_f64(backoff)).await;
                    }
                }
            }
        }

        tracing::error!(url = %url, error = %last_error, "All fetch attempts failed");
        FetchOutcome::Failed(last_error)
    }

    async fn try_fetch(&self, url: &Url) -> Result<(String, u16), String> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let content = response.text().await.map_err(|e| e.to_string())?;
        Ok((content, status))
    }
}

fn cached_at_time(unix_seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(unix_seconds, 0).single().unwrap_or_else(Utc::now)
}
