//! Upstream data: sources, normalization, caching.
//!
//! - `normalize`: raw rows -> canonical `Series`
//! - `source`: generic fetch/retry/cache policy (`SourceClient`, `SeriesSource`)
//! - `reference`, `survey`, `price_index`: the three concrete upstreams
//! - `cache`: TTL cache keyed by source identity

use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

pub mod cache;
pub mod columns;
pub mod normalize;
pub mod price_index;
pub mod reference;
pub mod source;
pub mod survey;

pub use cache::SeriesCache;
pub use price_index::PriceIndexSource;
pub use reference::ReferenceRateSource;
pub use source::{FetchStatus, HttpTransport, SeriesFetch, SeriesSource, SourceClient, Transport};
pub use survey::SurveySource;

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RETRIES: usize = 3;

/// Where and how to reach the upstreams.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    pub reference_url: String,
    pub survey_url: String,
    pub price_index_url: String,
    /// Per-attempt HTTP timeout.
    pub timeout: Duration,
    /// Attempts per fetch (not per page).
    pub retries: usize,
    /// The reference-rate host has served incomplete certificate chains; this
    /// opt-in mirrors what the published dashboard did.
    pub accept_invalid_certs: bool,
    /// Persist cached series here; `None` keeps them in memory only.
    pub cache_dir: Option<PathBuf>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            reference_url: reference::DEFAULT_URL.to_string(),
            survey_url: survey::DEFAULT_URL.to_string(),
            price_index_url: price_index::DEFAULT_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retries: DEFAULT_RETRIES,
            accept_invalid_certs: false,
            cache_dir: None,
        }
    }
}

impl SourceConfig {
    /// Defaults overridden by `BANDS_*` variables (a `.env` file is honoured).
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let mut cfg = Self::default();

        if let Some(url) = lookup("BANDS_REFERENCE_URL") {
            cfg.reference_url = url;
        }
        if let Some(url) = lookup("BANDS_SURVEY_URL") {
            cfg.survey_url = url;
        }
        if let Some(url) = lookup("BANDS_PRICE_INDEX_URL") {
            cfg.price_index_url = url;
        }
        if let Some(raw) = lookup("BANDS_HTTP_TIMEOUT_SECS") {
            let secs: u64 = raw
                .trim()
                .parse()
                .map_err(|_| AppError::new(2, format!("Invalid BANDS_HTTP_TIMEOUT_SECS '{raw}'.")))?;
            cfg.timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(raw) = lookup("BANDS_HTTP_RETRIES") {
            cfg.retries = raw
                .trim()
                .parse()
                .map_err(|_| AppError::new(2, format!("Invalid BANDS_HTTP_RETRIES '{raw}'.")))?;
        }
        if let Some(raw) = lookup("BANDS_INSECURE_TLS") {
            cfg.accept_invalid_certs = matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(dir) = lookup("BANDS_CACHE_DIR") {
            cfg.cache_dir = Some(PathBuf::from(dir));
        }

        Ok(cfg)
    }
}

/// The three upstream descriptions.
#[derive(Debug, Clone)]
pub struct Sources {
    pub reference: ReferenceRateSource,
    pub survey: SurveySource,
    pub price_index: PriceIndexSource,
}

impl Sources {
    pub fn new(config: &SourceConfig, forecast_horizon: usize) -> Self {
        Self {
            reference: ReferenceRateSource::new(&config.reference_url),
            survey: SurveySource::new(&config.survey_url, forecast_horizon),
            price_index: PriceIndexSource::new(&config.price_index_url),
        }
    }

    /// Fetch all sources in parallel. Never fails; see each `SeriesFetch`.
    pub fn fetch_all(&self, client: &SourceClient, force: bool) -> MarketInputs {
        let (reference, (survey, price_index)) = rayon::join(
            || client.fetch(&self.reference, force),
            || {
                rayon::join(
                    || client.fetch(&self.survey, force),
                    || client.fetch(&self.price_index, force),
                )
            },
        );
        MarketInputs {
            reference,
            survey,
            price_index,
        }
    }
}

/// Everything the projection consumes, one entry per upstream.
#[derive(Debug, Clone)]
pub struct MarketInputs {
    /// Daily reference exchange rate.
    pub reference: SeriesFetch,
    /// Forecast monthly inflation, percent.
    pub survey: SeriesFetch,
    /// Realized monthly inflation, decimal.
    pub price_index: SeriesFetch,
}

impl MarketInputs {
    /// Inputs for a run without network access.
    pub fn offline(sources: &Sources) -> Self {
        Self {
            reference: SeriesFetch::skipped(sources.reference.name()),
            survey: SeriesFetch::skipped(sources.survey.name()),
            price_index: SeriesFetch::skipped(sources.price_index.name()),
        }
    }

    pub fn all(&self) -> [&SeriesFetch; 3] {
        [&self.reference, &self.survey, &self.price_index]
    }

    pub fn warnings(&self) -> Vec<String> {
        self.all().iter().filter_map(|f| f.warning.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn env_overrides_defaults() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("BANDS_REFERENCE_URL", "http://localhost:9000/84"),
            ("BANDS_HTTP_TIMEOUT_SECS", "3"),
            ("BANDS_HTTP_RETRIES", "5"),
            ("BANDS_INSECURE_TLS", "true"),
        ]);
        let cfg = SourceConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.reference_url, "http://localhost:9000/84");
        assert_eq!(cfg.survey_url, survey::DEFAULT_URL);
        assert_eq!(cfg.timeout, Duration::from_secs(3));
        assert_eq!(cfg.retries, 5);
        assert!(cfg.accept_invalid_certs);
    }

    #[test]
    fn invalid_retry_count_is_a_config_error() {
        let err = SourceConfig::from_lookup(|k| (k == "BANDS_HTTP_RETRIES").then(|| "many".to_string())).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn offline_inputs_are_empty_and_silent() {
        let sources = Sources::new(&SourceConfig::default(), 24);
        let inputs = MarketInputs::offline(&sources);
        assert!(inputs.all().iter().all(|f| f.series.is_empty() && f.status == FetchStatus::Skipped));
        assert!(inputs.warnings().is_empty());
    }
}
