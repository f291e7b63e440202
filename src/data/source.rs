//! Generic "fetch tabular rows -> normalize -> cache" capability.
//!
//! Each upstream is described by a [`SeriesSource`] (URL, pagination shape,
//! page parser, post-processing). [`SourceClient`] owns the policy shared by
//! all of them:
//!
//! - pages are requested until the reported total is reached or a page is empty
//! - the whole (paginated) fetch is retried a bounded number of times
//! - a cache hit skips the network; only complete, non-empty results are cached
//! - failures never escape: they become a warning plus an empty (or partial) series

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use reqwest::blocking::Client;

use crate::data::cache::SeriesCache;
use crate::data::normalize::normalize_with_stats;
use crate::domain::{RawObservation, Series};
use crate::error::{AppError, SourceError};

/// Upper bound on pages per fetch; guards against an upstream that never reports a total.
const MAX_PAGES: usize = 500;

/// Blocking byte transport. The HTTP implementation is [`HttpTransport`];
/// tests substitute an in-memory fake.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str, query: &[(String, String)]) -> Result<Vec<u8>, SourceError>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: StdDuration, accept_invalid_certs: bool) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .user_agent(concat!("fx-bands/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::new(2, format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str, query: &[(String, String)]) -> Result<Vec<u8>, SourceError> {
        let resp = self.client.get(url).query(query).send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }
        Ok(resp.bytes()?.to_vec())
    }
}

/// How a source splits its collection into requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// One request returns everything.
    Single,
    /// `limit`/`offset` query parameters; pages report a total count.
    OffsetLimit {
        limit_param: &'static str,
        offset_param: &'static str,
        page_size: usize,
    },
}

/// One decoded response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub rows: Vec<RawObservation>,
    /// Total rows in the collection, when the upstream reports it.
    pub total: Option<usize>,
}

/// Description of one upstream series.
pub trait SeriesSource: Send + Sync {
    /// Short stable identifier (used in logs, warnings and cache keys).
    fn name(&self) -> &'static str;

    fn url(&self) -> &str;

    /// How long a successful result stays fresh.
    fn ttl(&self) -> Duration;

    fn pagination(&self) -> Pagination {
        Pagination::Single
    }

    fn parse_page(&self, body: &[u8]) -> Result<Page, SourceError>;

    /// Post-processing applied after normalization.
    fn finish(&self, series: Series) -> Series {
        series
    }

    fn cache_key(&self) -> String {
        format!("{}|{}", self.name(), self.url())
    }
}

/// How a [`SeriesFetch`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// Fetched from the network just now.
    Fresh,
    /// Served from the cache without a network call.
    Cached,
    /// Retries exhausted after some pages arrived; the series is incomplete.
    Partial,
    /// Retries exhausted (or a non-retryable error) with nothing usable.
    Failed,
    /// Not attempted (offline mode).
    Skipped,
}

impl FetchStatus {
    pub fn label(self) -> &'static str {
        match self {
            FetchStatus::Fresh => "fresh",
            FetchStatus::Cached => "cached",
            FetchStatus::Partial => "partial",
            FetchStatus::Failed => "failed",
            FetchStatus::Skipped => "skipped",
        }
    }
}

/// Result of fetching one source. Always renderable, even when empty.
#[derive(Debug, Clone)]
pub struct SeriesFetch {
    pub source: &'static str,
    pub series: Series,
    pub status: FetchStatus,
    pub warning: Option<String>,
}

impl SeriesFetch {
    pub fn skipped(source: &'static str) -> Self {
        Self {
            source,
            series: Series::empty(),
            status: FetchStatus::Skipped,
            warning: None,
        }
    }
}

struct FetchFailure {
    error: SourceError,
    partial: Vec<RawObservation>,
}

pub struct SourceClient {
    transport: Box<dyn Transport>,
    retries: usize,
    cache: Option<SeriesCache>,
}

impl SourceClient {
    pub fn new(transport: Box<dyn Transport>, retries: usize, cache: Option<SeriesCache>) -> Self {
        Self {
            transport,
            retries: retries.max(1),
            cache,
        }
    }

    pub fn cache(&self) -> Option<&SeriesCache> {
        self.cache.as_ref()
    }

    /// Fetch a source, consulting the cache unless `force` is set.
    pub fn fetch(&self, source: &dyn SeriesSource, force: bool) -> SeriesFetch {
        self.fetch_at(source, force, Utc::now())
    }

    pub fn fetch_at(&self, source: &dyn SeriesSource, force: bool, now: DateTime<Utc>) -> SeriesFetch {
        let key = source.cache_key();
        if !force {
            if let Some(series) = self.cache.as_ref().and_then(|c| c.get(&key, now)) {
                tracing::debug!(source = source.name(), rows = series.len(), "cache hit");
                return SeriesFetch {
                    source: source.name(),
                    series,
                    status: FetchStatus::Cached,
                    warning: None,
                };
            }
        }

        let mut best_partial: Vec<RawObservation> = Vec::new();
        let mut last_error = None;

        for attempt in 1..=self.retries {
            match self.fetch_rows(source) {
                Ok(rows) => {
                    let series = self.finish(source, rows);
                    tracing::info!(source = source.name(), rows = series.len(), attempt, "fetched series");

                    let warning = if series.is_empty() {
                        Some(format!("{}: upstream returned no usable rows.", source.name()))
                    } else {
                        if let Some(cache) = &self.cache {
                            cache.put(&key, &series, source.ttl(), now);
                        }
                        None
                    };
                    return SeriesFetch {
                        source: source.name(),
                        series,
                        status: FetchStatus::Fresh,
                        warning,
                    };
                }
                Err(failure) => {
                    tracing::warn!(
                        source = source.name(),
                        attempt,
                        max_attempts = self.retries,
                        error = %failure.error,
                        "fetch attempt failed"
                    );
                    if failure.partial.len() > best_partial.len() {
                        best_partial = failure.partial;
                    }
                    let retryable = failure.error.is_retryable();
                    last_error = Some(failure.error);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
        if best_partial.is_empty() {
            SeriesFetch {
                source: source.name(),
                series: Series::empty(),
                status: FetchStatus::Failed,
                warning: Some(format!("{}: unavailable ({reason}).", source.name())),
            }
        } else {
            let series = self.finish(source, best_partial);
            SeriesFetch {
                source: source.name(),
                warning: Some(format!(
                    "{}: incomplete data, {} rows ({reason}).",
                    source.name(),
                    series.len()
                )),
                series,
                status: FetchStatus::Partial,
            }
        }
    }

    fn finish(&self, source: &dyn SeriesSource, rows: Vec<RawObservation>) -> Series {
        let (series, stats) = normalize_with_stats(rows);
        if stats.dropped_dates > 0 {
            tracing::debug!(source = source.name(), dropped = stats.dropped_dates, "rows without a valid date");
        }
        source.finish(series)
    }

    fn fetch_rows(&self, source: &dyn SeriesSource) -> Result<Vec<RawObservation>, FetchFailure> {
        match source.pagination() {
            Pagination::Single => {
                let body = self.transport.get(source.url(), &[]).map_err(|error| FetchFailure {
                    error,
                    partial: Vec::new(),
                })?;
                let page = source.parse_page(&body).map_err(|error| FetchFailure {
                    error,
                    partial: Vec::new(),
                })?;
                Ok(page.rows)
            }
            Pagination::OffsetLimit {
                limit_param,
                offset_param,
                page_size,
            } => {
                let mut rows = Vec::new();
                let mut offset = 0usize;

                for _ in 0..MAX_PAGES {
                    let query = vec![
                        (limit_param.to_string(), page_size.to_string()),
                        (offset_param.to_string(), offset.to_string()),
                    ];
                    let page = match self
                        .transport
                        .get(source.url(), &query)
                        .and_then(|body| source.parse_page(&body))
                    {
                        Ok(page) => page,
                        Err(error) => return Err(FetchFailure { error, partial: rows }),
                    };

                    let received = page.rows.len();
                    tracing::debug!(source = source.name(), offset, received, total = ?page.total, "page");
                    if received == 0 {
                        break;
                    }
                    rows.extend(page.rows);
                    offset += page_size;

                    let done = match page.total {
                        Some(total) => offset >= total,
                        None => received < page_size,
                    };
                    if done {
                        break;
                    }
                }

                Ok(rows)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use chrono::NaiveDate;

    use super::*;

    /// Replays canned responses in order and records the queries it saw.
    pub(crate) struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<Vec<u8>, SourceError>>>,
        pub(crate) calls: Mutex<Vec<Vec<(String, String)>>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(responses: Vec<Result<Vec<u8>, SourceError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn get(&self, _url: &str, query: &[(String, String)]) -> Result<Vec<u8>, SourceError> {
            self.calls.lock().unwrap().push(query.to_vec());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(SourceError::Transport("no scripted response".into())))
        }
    }

    impl Transport for std::sync::Arc<ScriptedTransport> {
        fn get(&self, url: &str, query: &[(String, String)]) -> Result<Vec<u8>, SourceError> {
            self.as_ref().get(url, query)
        }
    }

    /// Body format: `total;date=value,date=value`.
    struct LineSource {
        pagination: Pagination,
    }

    impl SeriesSource for LineSource {
        fn name(&self) -> &'static str {
            "line"
        }
        fn url(&self) -> &str {
            "mem://line"
        }
        fn ttl(&self) -> Duration {
            Duration::hours(1)
        }
        fn pagination(&self) -> Pagination {
            self.pagination
        }
        fn parse_page(&self, body: &[u8]) -> Result<Page, SourceError> {
            let text = std::str::from_utf8(body).map_err(|e| SourceError::Decode(e.to_string()))?;
            let (total, rows) = text.split_once(';').ok_or_else(|| SourceError::Schema("no ';'".into()))?;
            let rows = rows
                .split(',')
                .filter(|r| !r.is_empty())
                .filter_map(|r| r.split_once('='))
                .map(|(d, v)| RawObservation::text(d, v))
                .collect();
            Ok(Page {
                rows,
                total: total.parse().ok(),
            })
        }
    }

    fn paged() -> LineSource {
        LineSource {
            pagination: Pagination::OffsetLimit {
                limit_param: "Limit",
                offset_param: "Offset",
                page_size: 2,
            },
        }
    }

    fn ok(body: &str) -> Result<Vec<u8>, SourceError> {
        Ok(body.as_bytes().to_vec())
    }

    #[test]
    fn pages_until_total_is_reached() {
        let transport = std::sync::Arc::new(ScriptedTransport::new(vec![
            ok("3;2025-01-02=1,2025-01-03=2"),
            ok("3;2025-01-06=3"),
        ]));
        let client = SourceClient::new(Box::new(transport.clone()), 3, None);

        let fetch = client.fetch(&paged(), false);
        assert_eq!(fetch.status, FetchStatus::Fresh);
        assert_eq!(fetch.series.len(), 3);
        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1][1], ("Offset".to_string(), "2".to_string()));
    }

    #[test]
    fn stops_on_empty_page() {
        let transport = ScriptedTransport::new(vec![ok("99;2025-01-02=1,2025-01-03=2"), ok("99;")]);
        let client = SourceClient::new(Box::new(transport), 3, None);
        let fetch = client.fetch(&paged(), false);
        assert_eq!(fetch.series.len(), 2);
        assert!(fetch.warning.is_none());
    }

    #[test]
    fn retries_transport_failures_then_succeeds() {
        let transport = ScriptedTransport::new(vec![
            Err(SourceError::Transport("timeout".into())),
            ok("1;2025-01-02=1"),
        ]);
        let client = SourceClient::new(Box::new(transport), 3, None);
        let fetch = client.fetch(&paged(), false);
        assert_eq!(fetch.status, FetchStatus::Fresh);
        assert_eq!(fetch.series.len(), 1);
    }

    #[test]
    fn exhausted_retries_degrade_to_empty_series() {
        let transport = ScriptedTransport::new(vec![
            Err(SourceError::Status(502)),
            Err(SourceError::Status(502)),
            Err(SourceError::Status(502)),
        ]);
        let client = SourceClient::new(Box::new(transport), 3, None);
        let fetch = client.fetch(&paged(), false);
        assert_eq!(fetch.status, FetchStatus::Failed);
        assert!(fetch.series.is_empty());
        assert!(fetch.warning.unwrap().contains("unavailable"));
    }

    #[test]
    fn partial_pages_are_returned_when_retries_run_out() {
        let transport = ScriptedTransport::new(vec![
            ok("4;2025-01-02=1,2025-01-03=2"),
            Err(SourceError::Transport("reset".into())),
            Err(SourceError::Transport("reset".into())),
        ]);
        let client = SourceClient::new(Box::new(transport), 2, Some(SeriesCache::in_memory()));
        let fetch = client.fetch(&paged(), false);
        assert_eq!(fetch.status, FetchStatus::Partial);
        assert_eq!(fetch.series.len(), 2);
        // Incomplete results are never cached.
        assert!(client.cache().unwrap().get(&paged().cache_key(), Utc::now()).is_none());
    }

    #[test]
    fn schema_errors_are_not_retried() {
        let transport = std::sync::Arc::new(ScriptedTransport::new(vec![ok("garbage"), ok("1;2025-01-02=1")]));
        let client = SourceClient::new(Box::new(transport.clone()), 3, None);
        let fetch = client.fetch(&paged(), false);
        assert_eq!(fetch.status, FetchStatus::Failed);
        assert_eq!(transport.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn cache_hit_skips_network_until_forced() {
        let transport = std::sync::Arc::new(ScriptedTransport::new(vec![
            ok("1;2025-01-02=1"),
            ok("1;2025-01-02=5"),
        ]));
        let client = SourceClient::new(Box::new(transport.clone()), 1, Some(SeriesCache::in_memory()));
        let now = Utc::now();

        let first = client.fetch_at(&paged(), false, now);
        let second = client.fetch_at(&paged(), false, now + Duration::minutes(10));
        assert_eq!(first.status, FetchStatus::Fresh);
        assert_eq!(second.status, FetchStatus::Cached);
        assert_eq!(transport.calls.lock().unwrap().len(), 1);

        let forced = client.fetch_at(&paged(), true, now + Duration::minutes(10));
        assert_eq!(forced.status, FetchStatus::Fresh);
        let d = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        assert_eq!(forced.series.get(d), Some(5.0));
    }

    #[test]
    fn expired_cache_entry_triggers_refetch() {
        let transport = std::sync::Arc::new(ScriptedTransport::new(vec![ok("1;2025-01-02=1"), ok("1;2025-01-02=2")]));
        let client = SourceClient::new(Box::new(transport.clone()), 1, Some(SeriesCache::in_memory()));
        let now = Utc::now();
        client.fetch_at(&paged(), false, now);
        let later = client.fetch_at(&paged(), false, now + Duration::hours(2));
        assert_eq!(later.status, FetchStatus::Fresh);
        assert_eq!(transport.calls.lock().unwrap().len(), 2);
    }
}
