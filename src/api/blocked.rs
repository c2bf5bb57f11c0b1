use log::{debug, info, warn};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::api::client::LogBackend;

/// How long a fetched pattern list is served before refetching
pub const BLOCKED_CACHE_DURATION: Duration = Duration::from_secs(60);

/// Flatten whatever shape the blocked-pattern collaborator returned into a
/// de-duplicated list of pattern strings, in first-seen order.
///
/// Accepted shapes: `["a", "b"]`, `{"blockedRules": [{"url": "a"}, ..]}` and
/// `{"blockedUrls": [..]}`, where list entries may be plain strings or
/// objects with a `url` field. Anything else is an empty list.
pub fn normalize_blocked_patterns(payload: &Value) -> Vec<String> {
    let entries: &[Value] = match payload {
        Value::Array(entries) => entries.as_slice(),
        Value::Object(map) => match ["blockedRules", "blockedUrls"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
        {
            Some(entries) => entries.as_slice(),
            None => {
                debug!("Blocked-pattern payload has no known list field");
                &[]
            }
        },
        _ => &[],
    };

    let mut seen = HashSet::new();
    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(pattern) => Some(pattern.as_str()),
            Value::Object(rule) => rule.get("url").and_then(Value::as_str),
            _ => None,
        })
        .map(str::trim)
        .filter(|pattern| !pattern.is_empty())
        .filter(|pattern| seen.insert(pattern.to_string()))
        .map(str::to_string)
        .collect()
}

/// Last known blocked-pattern list, refreshed when older than its cache
/// duration
pub struct BlockedPatternCache {
    cached: RwLock<Option<(Vec<String>, Instant)>>,
    cache_duration: Duration,
}

impl Default for BlockedPatternCache {
    fn default() -> Self {
        Self::new(BLOCKED_CACHE_DURATION)
    }
}

impl BlockedPatternCache {
    pub fn new(cache_duration: Duration) -> Self {
        Self {
            cached: RwLock::new(None),
            cache_duration,
        }
    }

    /// Cached patterns if still fresh, otherwise a fresh fetch. A failed
    /// fetch keeps serving the previous list.
    pub async fn patterns(&self, backend: &dyn LogBackend) -> Vec<String> {
        {
            let cached = self.cached.read();
            if let Some((patterns, fetched_at)) = &*cached {
                if fetched_at.elapsed() < self.cache_duration {
                    debug!("Using cached blocked patterns ({} entries)", patterns.len());
                    return patterns.clone();
                }
            }
        }

        match backend.fetch_blocked().await {
            Ok(payload) => {
                let patterns = normalize_blocked_patterns(&payload);
                info!("Fetched {} blocked patterns", patterns.len());
                *self.cached.write() = Some((patterns.clone(), Instant::now()));
                patterns
            }
            Err(e) => {
                warn!("Failed to fetch blocked patterns: {}", e);
                self.cached
                    .read()
                    .as_ref()
                    .map(|(patterns, _)| patterns.clone())
                    .unwrap_or_default()
            }
        }
    }

    /// Whether `pattern` is already blocked, by exact match on the cached list
    pub fn contains(&self, pattern: &str) -> bool {
        self.cached
            .read()
            .as_ref()
            .map(|(patterns, _)| patterns.iter().any(|p| p == pattern.trim()))
            .unwrap_or(false)
    }

    /// Drop the cached list so the next lookup refetches
    pub fn invalidate(&self) {
        *self.cached.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::query::{LogPage, LogQuery};
    use crate::models::log_record::LogRecord;
    use crate::utils::error::{AppError, AppResult};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_bare_list() {
        assert_eq!(
            normalize_blocked_patterns(&json!(["ads.example.com", " ads.example.com ", "", "*.tracker.io"])),
            vec!["ads.example.com", "*.tracker.io"]
        );
    }

    #[test]
    fn test_wrapped_rule_objects() {
        let payload = json!({
            "blockedRules": [
                { "url": "a.com", "id": 1 },
                { "url": "b.com", "enabled": false },
                { "id": 3 },
                "c.com"
            ]
        });
        assert_eq!(normalize_blocked_patterns(&payload), vec!["a.com", "b.com", "c.com"]);

        let payload = json!({ "blockedUrls": [{ "url": "x.io" }, { "url": "x.io" }] });
        assert_eq!(normalize_blocked_patterns(&payload), vec!["x.io"]);
    }

    #[test]
    fn test_unexpected_shapes_are_empty() {
        assert!(normalize_blocked_patterns(&json!(null)).is_empty());
        assert!(normalize_blocked_patterns(&json!("a.com")).is_empty());
        assert!(normalize_blocked_patterns(&json!({ "blockedRules": "a.com" })).is_empty());
        assert!(normalize_blocked_patterns(&json!({ "rules": ["a.com"] })).is_empty());
    }

    #[test]
    fn test_falls_back_to_blocked_urls_when_rules_is_not_a_list() {
        let payload = json!({ "blockedRules": { "count": 2 }, "blockedUrls": ["a.com", { "url": "b.com" }] });
        assert_eq!(normalize_blocked_patterns(&payload), vec!["a.com", "b.com"]);
    }

    struct CountingBackend {
        calls: AtomicUsize,
        fail_after: usize,
    }

    #[async_trait]
    impl LogBackend for CountingBackend {
        async fn fetch_logs(&self, _query: &LogQuery) -> AppResult<LogPage> {
            Ok(LogPage::default())
        }

        async fn export_logs(&self, _query: &LogQuery) -> AppResult<Vec<LogRecord>> {
            Ok(Vec::new())
        }

        async fn fetch_blocked(&self) -> AppResult<Value> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call >= self.fail_after {
                return Err(AppError::BackendStatusError { status: 503, endpoint: "/api/blocked".to_string() });
            }
            Ok(json!({ "blockedUrls": ["ads.example.com"] }))
        }
    }

    #[tokio::test]
    async fn test_cache_serves_fresh_list_without_refetching() {
        let backend = CountingBackend { calls: AtomicUsize::new(0), fail_after: usize::MAX };
        let cache = BlockedPatternCache::default();

        assert_eq!(cache.patterns(&backend).await, vec!["ads.example.com"]);
        assert_eq!(cache.patterns(&backend).await, vec!["ads.example.com"]);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert!(cache.contains("ads.example.com"));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_list() {
        let backend = CountingBackend { calls: AtomicUsize::new(0), fail_after: 1 };
        let cache = BlockedPatternCache::new(Duration::ZERO);

        assert_eq!(cache.patterns(&backend).await, vec!["ads.example.com"]);
        assert_eq!(cache.patterns(&backend).await, vec!["ads.example.com"]);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);

        cache.invalidate();
        assert!(cache.patterns(&backend).await.is_empty());
    }
}
