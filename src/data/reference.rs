//! Official daily reference exchange rate (BCRA "Monetarias" API, variable 84 / A3500).
//!
//! The endpoint is paginated with `Limit`/`Offset` and reports the total
//! row count under `metadata.resultset.count`. Rows live under
//! `results[*].detalle[*]` as `{ "fecha": "YYYY-MM-DD", "valor": 1234.5 }`.

use chrono::Duration;
use serde::Deserialize;
use serde_json::Value;

use crate::data::source::{Page, Pagination, SeriesSource};
use crate::domain::{RawObservation, RawValue};
use crate::error::SourceError;

pub const DEFAULT_URL: &str = "https://api.bcra.gob.ar/estadisticas/v4.0/Monetarias/84";
const PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
pub struct ReferenceRateSource {
    url: String,
}

impl ReferenceRateSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl SeriesSource for ReferenceRateSource {
    fn name(&self) -> &'static str {
        "reference-rate"
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn ttl(&self) -> Duration {
        Duration::hours(1)
    }

    fn pagination(&self) -> Pagination {
        Pagination::OffsetLimit {
            limit_param: "Limit",
            offset_param: "Offset",
            page_size: PAGE_SIZE,
        }
    }

    fn parse_page(&self, body: &[u8]) -> Result<Page, SourceError> {
        let resp: MonetariasResponse =
            serde_json::from_slice(body).map_err(|e| SourceError::Decode(format!("reference-rate JSON: {e}")))?;

        let total = resp
            .metadata
            .and_then(|m| m.resultset)
            .and_then(|r| r.count);

        let rows = resp
            .results
            .into_iter()
            .flat_map(|r| r.detalle)
            .map(|d| RawObservation {
                date: d.fecha.as_ref().and_then(value_as_text),
                value: raw_value(d.valor),
            })
            .collect();

        Ok(Page { rows, total })
    }
}

#[derive(Debug, Deserialize)]
struct MonetariasResponse {
    #[serde(default)]
    metadata: Option<Metadata>,
    #[serde(default)]
    results: Vec<MonetariasResult>,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    #[serde(default)]
    resultset: Option<ResultSet>,
}

#[derive(Debug, Deserialize)]
struct ResultSet {
    #[serde(default)]
    count: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct MonetariasResult {
    #[serde(default)]
    detalle: Vec<Detalle>,
}

#[derive(Debug, Deserialize)]
struct Detalle {
    #[serde(default)]
    fecha: Option<Value>,
    #[serde(default)]
    valor: Option<Value>,
}

fn value_as_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn raw_value(v: Option<Value>) -> RawValue {
    match v {
        Some(Value::Number(n)) => n.as_f64().map(RawValue::Number).unwrap_or(RawValue::Missing),
        Some(Value::String(s)) => RawValue::Text(s),
        _ => RawValue::Missing,
    }
}
