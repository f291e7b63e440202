//! Realized monthly consumer-price inflation.
//!
//! Two published layouts are understood:
//!
//! - INDEC divisions file: `;`-separated, comma decimals, often Latin-1,
//!   one row per (category, region, month); `v_m_IPC` is a percentage.
//!   We keep the national headline rows (`Codigo == 0`, `Region == Nacional`).
//! - datos.gob.ar series file: `,`-separated, `indice_tiempo` plus
//!   `ipc_ng_nacional_tasa_variacion_mensual`, already a decimal fraction.
//!
//! Either way the output is a monthly series of decimal rates (0.027 = 2.7%).

use chrono::Duration;
use csv::StringRecord;

use crate::data::columns::HeaderMap;
use crate::data::normalize::coerce_value;
use crate::data::source::{Page, SeriesSource};
use crate::domain::{RawObservation, RawValue};
use crate::error::SourceError;

pub const DEFAULT_URL: &str = "https://www.indec.gob.ar/ftp/cuadros/economia/serie_ipc_divisiones.csv";

const HEADLINE_CODE: &str = "0";
const NATIONAL_REGION: &str = "Nacional";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// Percent values, filtered by category code and region.
    Divisions {
        code: usize,
        region: Option<usize>,
        period: usize,
        value: usize,
    },
    /// Decimal values, one national headline column.
    Series { period: usize, value: usize },
}

#[derive(Debug, Clone)]
pub struct PriceIndexSource {
    url: String,
}

impl PriceIndexSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl SeriesSource for PriceIndexSource {
    fn name(&self) -> &'static str {
        "price-index"
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn ttl(&self) -> Duration {
        Duration::hours(24)
    }

    fn parse_page(&self, body: &[u8]) -> Result<Page, SourceError> {
        let text = decode_text(body);
        let delimiter = detect_delimiter(&text);

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| SourceError::Decode(format!("price-index CSV headers: {e}")))?
            .clone();
        let layout = resolve_layout(&HeaderMap::new(headers.iter()))?;

        let mut rows = Vec::new();
        for record in reader.records() {
            // A malformed line is skipped like any other bad row.
            let Ok(record) = record else { continue };
            if let Some(obs) = extract_row(&record, layout) {
                rows.push(obs);
            }
        }

        Ok(Page { rows, total: None })
    }
}

/// UTF-8 first; on failure fall back to Latin-1, where every byte is a code point.
fn decode_text(body: &[u8]) -> String {
    let text = match std::str::from_utf8(body) {
        Ok(s) => s.to_string(),
        Err(_) => {
            tracing::debug!("price-index payload is not UTF-8; decoding as Latin-1");
            body.iter().map(|&b| char::from(b)).collect()
        }
    };
    text.trim_start_matches('\u{feff}').to_string()
}

fn detect_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or_default();
    if header.matches(';').count() > header.matches(',').count() {
        b';'
    } else {
        b','
    }
}

fn resolve_layout(headers: &HeaderMap) -> Result<Layout, SourceError> {
    if let (Some(period), Some(value)) = (
        headers.find(&["indice_tiempo"]),
        headers.find(&["ipc_ng_nacional_tasa_variacion_mensual"]),
    ) {
        return Ok(Layout::Series { period, value });
    }

    match (
        headers.find(&["Codigo"]),
        headers.find(&["Periodo"]),
        headers.find(&["v_m_IPC"]),
    ) {
        (Some(code), Some(period), Some(value)) => Ok(Layout::Divisions {
            code,
            region: headers.find(&["Region"]),
            period,
            value,
        }),
        _ => Err(SourceError::Schema(
            "price-index CSV: expected `Codigo`/`Periodo`/`v_m_IPC` or `indice_tiempo`/`ipc_ng_nacional_tasa_variacion_mensual`".into(),
        )),
    }
}

fn extract_row(record: &StringRecord, layout: Layout) -> Option<RawObservation> {
    match layout {
        Layout::Divisions {
            code,
            region,
            period,
            value,
        } => {
            if record.get(code)? != HEADLINE_CODE {
                return None;
            }
            if let Some(region) = region {
                if !record.get(region)?.eq_ignore_ascii_case(NATIONAL_REGION) {
                    return None;
                }
            }
            let pct = coerce_value(&RawValue::Text(record.get(value).unwrap_or_default().to_string()));
            Some(RawObservation {
                date: record.get(period).map(str::to_string),
                value: RawValue::Number(pct / 100.0),
            })
        }
        Layout::Series { period, value } => Some(RawObservation {
            date: record.get(period).map(str::to_string),
            value: RawValue::Text(record.get(value).unwrap_or_default().to_string()),
        }),
    }
}
