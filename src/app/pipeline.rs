//! Shared "bands pipeline" logic used by both CLI and TUI front-ends.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! fetch (parallel, cached) -> project corridor -> merge observations -> summary
//!
//! The CLI and the TUI can then focus on presentation (printing vs widgets).

use crate::bands::{Projection, merge_observations, project};
use crate::data::{HttpTransport, MarketInputs, SeriesCache, SourceClient, SourceConfig, Sources};
use crate::domain::{BandsConfig, MergedView};
use crate::error::AppError;
use crate::report::{RunSummary, summarize};

/// All computed outputs of a single run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub inputs: MarketInputs,
    pub projection: Projection,
    pub merged: MergedView,
    pub summary: RunSummary,
    pub warnings: Vec<String>,
}

/// Upstream access: the three sources and, unless offline, a client to reach them.
pub struct Fetcher {
    sources: Sources,
    client: Option<SourceClient>,
}

impl Fetcher {
    pub fn new(config: &SourceConfig, bands: &BandsConfig, offline: bool, use_cache: bool) -> Result<Self, AppError> {
        let sources = Sources::new(config, bands.forecast_horizon);
        if offline {
            return Ok(Self { sources, client: None });
        }

        let transport = HttpTransport::new(config.timeout, config.accept_invalid_certs)?;
        let cache = use_cache.then(|| match &config.cache_dir {
            Some(dir) => SeriesCache::with_dir(dir),
            None => SeriesCache::in_memory(),
        });
        Ok(Self::with_client(
            sources,
            SourceClient::new(Box::new(transport), config.retries, cache),
        ))
    }

    pub fn with_client(sources: Sources, client: SourceClient) -> Self {
        Self {
            sources,
            client: Some(client),
        }
    }

    pub fn sources(&self) -> &Sources {
        &self.sources
    }

    pub fn is_offline(&self) -> bool {
        self.client.is_none()
    }

    /// Fetch all inputs; `force` bypasses the cache.
    pub fn fetch(&self, force: bool) -> MarketInputs {
        match &self.client {
            Some(client) => self.sources.fetch_all(client, force),
            None => MarketInputs::offline(&self.sources),
        }
    }
}

/// Execute the full pipeline and return the computed outputs.
pub fn run(config: &BandsConfig, fetcher: &Fetcher, force: bool) -> Result<RunOutput, AppError> {
    config.validate()?;
    let inputs = fetcher.fetch(force);
    for f in inputs.all() {
        match &f.warning {
            Some(w) => tracing::warn!(source = f.source, status = f.status.label(), "{w}"),
            None => tracing::info!(source = f.source, status = f.status.label(), rows = f.series.len(), "source ready"),
        }
    }
    Ok(run_with_inputs(config, inputs))
}

/// Execute the projection with pre-fetched inputs. Never fails: degraded
/// sources only shorten the corridor and add warnings.
pub fn run_with_inputs(config: &BandsConfig, inputs: MarketInputs) -> RunOutput {
    let projection = project(config, &inputs.price_index.series, &inputs.survey.series);
    let merged = merge_observations(&projection.corridor, &inputs.reference.series);
    let summary = summarize(&projection.corridor, &merged, config.summary_date);

    let mut warnings = inputs.warnings();
    if !inputs.survey.series.is_empty() && projection.schedule.drivers.is_empty() {
        warnings.push("Forecast present but no indexed months could be projected.".to_string());
    }
    let held = projection.schedule.held_months();
    if held > 0 {
        warnings.push(format!("{held} indexed month(s) held flat: no inflation data at or before their reference month."));
    }

    RunOutput {
        inputs,
        projection,
        merged,
        summary,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::NaiveDate;

    use super::*;
    use crate::data::Transport;
    use crate::domain::BandPhase;
    use crate::error::SourceError;

    /// Serves bodies by URL; unknown URLs fail as transport errors.
    struct RoutedTransport {
        bodies: HashMap<String, Vec<u8>>,
    }

    impl Transport for RoutedTransport {
        fn get(&self, url: &str, _query: &[(String, String)]) -> Result<Vec<u8>, SourceError> {
            self.bodies
                .get(url)
                .cloned()
                .ok_or_else(|| SourceError::Transport(format!("unreachable: {url}")))
        }
    }

    fn config() -> SourceConfig {
        SourceConfig {
            reference_url: "mem://reference".into(),
            survey_url: "mem://survey".into(),
            price_index_url: "mem://ipc".into(),
            retries: 1,
            ..SourceConfig::default()
        }
    }

    fn fetcher(bodies: Vec<(&str, &str)>) -> Fetcher {
        let bands = BandsConfig::default();
        let transport = RoutedTransport {
            bodies: bodies.into_iter().map(|(u, b)| (u.to_string(), b.as_bytes().to_vec())).collect(),
        };
        Fetcher::with_client(
            Sources::new(&config(), bands.forecast_horizon),
            SourceClient::new(Box::new(transport), 1, None),
        )
    }

    #[test]
    fn offline_run_renders_fixed_phase_only() {
        let bands = BandsConfig::default();
        let fetcher = Fetcher::new(&config(), &bands, true, false).unwrap();
        let out = run(&bands, &fetcher, false).unwrap();

        assert!(fetcher.is_offline());
        assert_eq!(out.projection.corridor.phase_len(BandPhase::Indexed), 0);
        assert_eq!(out.merged.len(), 262);
        assert!(out.warnings.is_empty());
        assert!(out.summary.last_fx.is_none());
    }

    #[test]
    fn failing_sources_degrade_to_warnings() {
        let reference = r#"{"metadata":{"resultset":{"count":2}},"results":[{"idVariable":84,"detalle":[
            {"fecha":"2025-10-01","valor":1380.5},{"fecha":"2025-10-02","valor":1391.0}]}]}"#;
        let fetcher = fetcher(vec![("mem://reference", reference)]);
        let out = run(&BandsConfig::default(), &fetcher, false).unwrap();

        assert_eq!(out.inputs.reference.series.len(), 2);
        assert_eq!(out.warnings.len(), 2);
        let fx = out.summary.last_fx.unwrap();
        assert_eq!(fx.date, NaiveDate::from_ymd_opt(2025, 10, 2).unwrap());
        assert_eq!(fx.fx, 1391.0);
    }

    #[test]
    fn realized_inflation_extends_projection_only_with_forecast() {
        let ipc = "indice_tiempo,ipc_ng_nacional_tasa_variacion_mensual\n2025-10-01,0.023\n2025-11-01,0.025\n";
        let fetcher = fetcher(vec![("mem://ipc", ipc)]);
        let out = run(&BandsConfig::default(), &fetcher, false).unwrap();

        assert_eq!(out.inputs.price_index.series.len(), 2);
        assert_eq!(out.projection.schedule.inflation.len(), 2);
        assert!(out.projection.schedule.drivers.is_empty());
        assert_eq!(out.projection.corridor.phase_len(BandPhase::Indexed), 0);
    }

    #[test]
    fn invalid_config_is_rejected_before_fetching() {
        let bands = BandsConfig {
            lower0: 1500.0,
            ..BandsConfig::default()
        };
        let fetcher = Fetcher::new(&config(), &bands, true, false).unwrap();
        assert_eq!(run(&bands, &fetcher, false).unwrap_err().exit_code(), 2);
    }
}
