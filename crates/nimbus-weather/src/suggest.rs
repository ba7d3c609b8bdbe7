//! Debounced city autocomplete.
//!
//! Every call takes a ticket from a monotonically increasing sequence. A call
//! waits out the quiet window, checks it is still the newest, searches, and
//! publishes only if no newer call was issued meanwhile.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::types::{CitySuggestion, LocationError};

/// Ranked city search backend
#[async_trait]
pub trait CitySearch: Send + Sync {
    async fn search_cities(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<CitySuggestion>, LocationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuggesterOptions {
    pub debounce: Duration,
    /// Trimmed queries shorter than this never reach the backend
    pub min_query_chars: usize,
    pub limit: usize,
}

impl Default for SuggesterOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(400),
            min_query_chars: 2,
            limit: 5,
        }
    }
}

pub struct CitySuggester {
    search: Arc<dyn CitySearch>,
    options: SuggesterOptions,
    latest: AtomicU64,
    visible: Mutex<Vec<CitySuggestion>>,
}

impl CitySuggester {
    pub fn new(search: Arc<dyn CitySearch>, options: SuggesterOptions) -> Self {
        Self {
            search,
            options,
            latest: AtomicU64::new(0),
            visible: Mutex::new(Vec::new()),
        }
    }

    /// Suggestions for `query`.
    ///
    /// Returns `None` when a newer call superseded this one; its result was
    /// discarded. Backend errors publish an empty list.
    pub async fn suggest(&self, query: &str) -> Option<Vec<CitySuggestion>> {
        let ticket = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let query = query.trim();

        if query.chars().count() < self.options.min_query_chars {
            return self.publish(ticket, Vec::new());
        }

        tokio::time::sleep(self.options.debounce).await;
        if !self.is_latest(ticket) {
            tracing::debug!("Suggestion query '{}' superseded during debounce", query);
            return None;
        }

        let mut results = match self.search.search_cities(query, self.options.limit).await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!("City search for '{}' failed: {}", query, e);
                Vec::new()
            }
        };
        results.truncate(self.options.limit);

        let published = self.publish(ticket, results);
        if published.is_none() {
            tracing::debug!("Discarding stale suggestions for '{}'", query);
        }
        published
    }

    /// The last published list
    pub fn current(&self) -> Vec<CitySuggestion> {
        self.visible.lock().clone()
    }

    fn is_latest(&self, ticket: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket
    }

    fn publish(&self, ticket: u64, results: Vec<CitySuggestion>) -> Option<Vec<CitySuggestion>> {
        let mut visible = self.visible.lock();
        if !self.is_latest(ticket) {
            return None;
        }
        visible.clone_from(&results);
        Some(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::time::Instant;

    /// Backend that records calls and answers after a per-query delay
    #[derive(Default)]
    struct FakeSearch {
        calls: Mutex<Vec<(String, Instant)>>,
        delays: HashMap<String, Duration>,
        fail: bool,
    }

    impl FakeSearch {
        fn with_delays(delays: &[(&str, u64)]) -> Self {
            Self {
                delays: delays
                    .iter()
                    .map(|(q, ms)| (q.to_string(), Duration::from_millis(*ms)))
                    .collect(),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<(String, Instant)> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl CitySearch for FakeSearch {
        async fn search_cities(
            &self,
            query: &str,
            limit: usize,
        ) -> Result<Vec<CitySuggestion>, LocationError> {
            self.calls.lock().push((query.to_string(), Instant::now()));
            if let Some(delay) = self.delays.get(query) {
                tokio::time::sleep(*delay).await;
            }
            if self.fail {
                return Err(LocationError::GeocodingFailed("HTTP 503".into()));
            }
            Ok((0..limit + 2)
                .map(|i| CitySuggestion {
                    id: format!("{query}-{i}"),
                    name: format!("{query} {i}"),
                    display_name: format!("{query} {i}, Somewhere"),
                    latitude: i as f64,
                    longitude: i as f64,
                    region: None,
                    country: "Somewhere".into(),
                })
                .collect())
        }
    }

    fn suggester(search: Arc<FakeSearch>) -> CitySuggester {
        CitySuggester::new(search, SuggesterOptions::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_queries_skip_network_and_debounce() {
        let search = Arc::new(FakeSearch::default());
        let s = suggester(search.clone());
        let start = Instant::now();

        assert_eq!(s.suggest("").await, Some(Vec::new()));
        assert_eq!(s.suggest(" a ").await, Some(Vec::new()));

        assert!(search.calls().is_empty());
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(s.current().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_reaches_network_once() {
        let search = Arc::new(FakeSearch::default());
        let s = suggester(search.clone());
        let start = Instant::now();

        let (first, second, third) = tokio::join!(
            s.suggest("par"),
            async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                s.suggest("pari").await
            },
            async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                s.suggest("paris").await
            },
        );

        assert_eq!(first, None);
        assert_eq!(second, None);
        let third = third.unwrap();
        assert_eq!(third.len(), 5);
        assert_eq!(third[0].id, "paris-0");

        let calls = search.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "paris");
        assert!(calls[0].1.duration_since(start) >= Duration::from_millis(600));
        assert_eq!(s.current(), third);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_older_result_never_overwrites_newer() {
        let search = Arc::new(FakeSearch::with_delays(&[("par", 1_000), ("pari", 10)]));
        let s = suggester(search.clone());

        let (older, newer) = tokio::join!(s.suggest("par"), async {
            // After "par" has left its debounce window
            tokio::time::sleep(Duration::from_millis(500)).await;
            s.suggest("pari").await
        });

        assert_eq!(older, None);
        let newer = newer.unwrap();
        assert_eq!(search.calls().len(), 2);
        assert_eq!(s.current(), newer);
        assert!(s.current().iter().all(|c| c.id.starts_with("pari-")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_error_publishes_empty_list() {
        let search = Arc::new(FakeSearch {
            fail: true,
            ..FakeSearch::default()
        });
        let s = suggester(search.clone());

        assert_eq!(s.suggest("lon").await, Some(Vec::new()));
        assert_eq!(search.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_query_clears_previous_list() {
        let search = Arc::new(FakeSearch::default());
        let s = suggester(search);

        assert_eq!(s.suggest("rome").await.map(|r| r.len()), Some(5));
        assert_eq!(s.current().len(), 5);

        s.suggest("r").await;
        assert!(s.current().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_is_configurable() {
        let search = Arc::new(FakeSearch::default());
        let options = SuggesterOptions {
            limit: 2,
            ..SuggesterOptions::default()
        };
        let s = CitySuggester::new(search, options);

        assert_eq!(s.suggest("berlin").await.map(|r| r.len()), Some(2));
    }
}
