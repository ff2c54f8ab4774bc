//! robots.txt compliance checking with a bounded per-host cache

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use reqwest::Client;
use texting_robots::Robot;
use url::Url;

/// Bound on cached robots parses; one entry per scheme+host.
const ROBOTS_CACHE_SIZE: usize = 128;

/// Fetches and caches robots.txt directives per scheme+host.
///
/// The default is permissive: a URL is only refused on an explicit
/// disallow. Unreachable or unparseable robots.txt never blocks a fetch.
pub struct RobotsChecker {
    client: Client,
    user_agent: String,
    /// None means robots.txt could not be retrieved or parsed for that
    /// host; cached so the lookup is not repeated.
    cache: Mutex<LruCache<String, Option<Robot>>>,
}

impl RobotsChecker {
    pub fn new(client: Client, user_agent: String) -> Self {
        let capacity = NonZeroUsize::new(ROBOTS_CACHE_SIZE).expect("non-zero cache size");
        Self {
            client,
            user_agent,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Check whether `url` may be fetched under the host's robots rules.
    pub async fn is_allowed(&self, url: &Url) -> bool {
        let host = match url.host_str() {
            Some(h) => format!("{}://{}", url.scheme(), h),
            None => return true,
        };

        {
            let mut cache = self.cache.lock().expect("robots cache lock poisoned");
            if let Some(entry) = cache.get(&host) {
                return evaluate(entry.as_ref(), url);
            }
        }

        let robot = self.fetch_robot(&host).await;
        let allowed = evaluate(robot.as_ref(), url);
        let mut cache = self.cache.lock().expect("robots cache lock poisoned");
        cache.put(host, robot);
        allowed
    }

    async fn fetch_robot(&self, scheme_host: &str) -> Option<Robot> {
        let robots_url = format!("{}/robots.txt", scheme_host);
        let body = match self.client.get(&robots_url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.bytes().await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(robots_url = %robots_url, error = %e, "Failed to read robots.txt body");
                    return None;
                }
            },
            Ok(resp) => {
                tracing::debug!(robots_url = %robots_url, status = resp.status().as_u16(), "No robots.txt available");
                return None;
            }
            Err(e) => {
                tracing::warn!(robots_url = %robots_url, error = %e, "Failed to fetch robots.txt");
                return None;
            }
        };

        match Robot::new(&self.user_agent, &body) {
            Ok(robot) => Some(robot),
            Err(e) => {
                tracing::warn!(robots_url = %robots_url, error = %e, "Failed to parse robots.txt");
                None
            }
        }
    }
}

/// Permissive evaluation: only an explicit disallow from parsed directives
/// refuses the URL.
fn evaluate(robot: Option<&Robot>, url: &Url) -> bool {
    match robot {
        Some(robot) => robot.allowed(url.as_str()),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn robot_from(txt: &str) -> Robot {
        Robot::new("supplier-risk-agent/0.1", txt.as_bytes()).unwrap()
    }

    #[test]
    fn explicit_disallow_blocks() {
        let robot = robot_from("User-agent: *\nDisallow: /private/\n");
        let blocked = Url::parse("https://example.com/private/report").unwrap();
        let open = Url::parse("https://example.com/public").unwrap();
        assert!(!evaluate(Some(&robot), &blocked));
        assert!(evaluate(Some(&robot), &open));
    }

    #[test]
    fn missing_robots_is_permissive() {
        let url = Url::parse("https://example.com/anything").unwrap();
        assert!(evaluate(None, &url));
    }

    #[test]
    fn empty_robots_allows_all() {
        let robot = robot_from("");
        let url = Url::parse("https://example.com/path").unwrap();
        assert!(evaluate(Some(&robot), &url));
    }
}
