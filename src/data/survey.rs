//! Market-expectations survey (BCRA REM), latest forecast round.
//!
//! The survey is published as one workbook with every historical round in a
//! single sheet. We keep the monthly retail-inflation rows of the most recent
//! round (vintage) and expose them as `(target period, median % m/m)`.

use std::io::Cursor;

use calamine::{Data, Reader, Xlsx, open_workbook_from_rs};
use chrono::{Duration, NaiveDate};

use crate::data::columns::HeaderMap;
use crate::data::normalize::parse_date;
use crate::data::source::{Page, SeriesSource};
use crate::domain::{RawObservation, RawValue, Series};
use crate::error::SourceError;

pub const DEFAULT_URL: &str = "https://www.bcra.gob.ar/archivos/Pdfs/PublicacionesEstadisticas/historico-relevamiento-expectativas-mercado.xlsx";

const SHEET: &str = "Base de Datos Completa";
const INDICATOR: &str = "Precios minoristas (IPC nivel general; INDEC)";
const UNIT: &str = "var. % mensual";
/// Rows scanned while looking for the header row.
const HEADER_SCAN_ROWS: usize = 10;

const COL_VINTAGE: &[&str] = &["Fecha de pronóstico"];
const COL_INDICATOR: &[&str] = &["Variable"];
const COL_UNIT: &[&str] = &["Referencia"];
const COL_PERIOD: &[&str] = &["Período"];
const COL_MEDIAN: &[&str] = &["Mediana"];

#[derive(Debug, Clone)]
pub struct SurveySource {
    url: String,
    horizon: usize,
}

impl SurveySource {
    /// `horizon`: number of most recent target periods kept.
    pub fn new(url: impl Into<String>, horizon: usize) -> Self {
        Self {
            url: url.into(),
            horizon: horizon.max(1),
        }
    }
}

impl SeriesSource for SurveySource {
    fn name(&self) -> &'static str {
        "inflation-survey"
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn ttl(&self) -> Duration {
        Duration::hours(1)
    }

    fn parse_page(&self, body: &[u8]) -> Result<Page, SourceError> {
        let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(body.to_vec()))
            .map_err(|e| SourceError::Decode(format!("survey workbook: {e}")))?;

        let sheet = if workbook.sheet_names().iter().any(|s| s == SHEET) {
            SHEET.to_string()
        } else {
            workbook
                .sheet_names()
                .first()
                .cloned()
                .ok_or_else(|| SourceError::Schema("survey workbook has no sheets".into()))?
        };

        let range = workbook
            .worksheet_range(&sheet)
            .map_err(|e| SourceError::Decode(format!("survey sheet '{sheet}': {e}")))?;
        let rows: Vec<&[Data]> = range.rows().collect();

        Ok(Page {
            rows: latest_round(&rows)?,
            total: None,
        })
    }

    fn finish(&self, series: Series) -> Series {
        series.tail(self.horizon)
    }

    /// The cached series is already cut to `horizon`.
    fn cache_key(&self) -> String {
        format!("{}|{}|h{}", self.name(), self.url, self.horizon)
    }
}

/// Filter to the target indicator/unit and keep only the most recent vintage.
fn latest_round(rows: &[&[Data]]) -> Result<Vec<RawObservation>, SourceError> {
    let header_pos = rows
        .iter()
        .take(HEADER_SCAN_ROWS)
        .position(|row| row.iter().any(|c| cell_text(c).is_some_and(|t| t.eq_ignore_ascii_case("Variable"))))
        .ok_or_else(|| SourceError::Schema("survey header row (with `Variable`) not found".into()))?;

    let header_names: Vec<String> = rows[header_pos]
        .iter()
        .map(|c| cell_text(c).unwrap_or_default().to_string())
        .collect();
    let headers = HeaderMap::new(header_names.iter().map(String::as_str));

    let col = |aliases: &[&str]| {
        headers
            .find(aliases)
            .ok_or_else(|| SourceError::Schema(format!("survey column `{}` missing", aliases[0])))
    };
    let vintage_col = col(COL_VINTAGE)?;
    let indicator_col = col(COL_INDICATOR)?;
    let unit_col = col(COL_UNIT)?;
    let period_col = col(COL_PERIOD)?;
    let median_col = col(COL_MEDIAN)?;

    let matching: Vec<(NaiveDate, &[Data])> = rows[header_pos + 1..]
        .iter()
        .filter(|row| {
            text_at(row, indicator_col) == Some(INDICATOR) && text_at(row, unit_col) == Some(UNIT)
        })
        .filter_map(|row| Some((row.get(vintage_col).and_then(cell_date)?, *row)))
        .collect();

    let Some(latest) = matching.iter().map(|(v, _)| *v).max() else {
        return Ok(Vec::new());
    };
    tracing::debug!(vintage = %latest, "latest survey round");

    Ok(matching
        .into_iter()
        .filter(|(v, _)| *v == latest)
        .map(|(_, row)| RawObservation {
            date: row.get(period_col).and_then(cell_date).map(|d| d.to_string()),
            value: row.get(median_col).map(cell_value).unwrap_or(RawValue::Missing),
        })
        .collect())
}

fn cell_text(cell: &Data) -> Option<&str> {
    match cell {
        Data::String(s) => Some(s.trim()),
        _ => None,
    }
}

fn text_at<'a>(row: &'a [Data], idx: usize) -> Option<&'a str> {
    row.get(idx).and_then(cell_text)
}

fn cell_date(cell: &Data) -> Option<NaiveDate> {
    match cell {
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64()),
        Data::Float(f) => excel_serial_to_date(*f),
        Data::Int(i) => excel_serial_to_date(*i as f64),
        Data::String(s) | Data::DateTimeIso(s) => parse_date(s),
        _ => None,
    }
}

fn cell_value(cell: &Data) -> RawValue {
    match cell {
        Data::Float(f) => RawValue::Number(*f),
        Data::Int(i) => RawValue::Number(*i as f64),
        Data::String(s) => RawValue::Text(s.clone()),
        _ => RawValue::Missing,
    }
}

/// Excel 1900 date system: serial 1 is 1900-01-01, with the fictitious
/// 1900-02-29 making 1899-12-30 the effective epoch for modern dates.
fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !(serial.is_finite() && serial >= 1.0) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.floor() as i64))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::data::cache::SeriesCache;
    use crate::data::normalize::normalize;
    use crate::data::source::tests::ScriptedTransport;
    use crate::data::source::{FetchStatus, SourceClient};

    fn s(v: &str) -> Data {
        Data::String(v.to_string())
    }

    fn header() -> Vec<Data> {
        vec![s("Fecha de pronóstico"), s("Variable"), s("Referencia"), s("Período"), s("Mediana")]
    }

    fn row(vintage: &str, indicator: &str, unit: &str, period: &str, median: f64) -> Vec<Data> {
        vec![s(vintage), s(indicator), s(unit), s(period), Data::Float(median)]
    }

    #[test]
    fn keeps_only_latest_round_of_target_indicator() {
        let table = vec![
            vec![s("Relevamiento de Expectativas de Mercado")],
            header(),
            row("2025-08-29", INDICATOR, UNIT, "2025-09-30", 2.1),
            row("2025-09-30", INDICATOR, UNIT, "2025-10-31", 2.0),
            row("2025-09-30", INDICATOR, UNIT, "2025-11-30", 1.9),
            row("2025-09-30", INDICATOR, "var. % i.a.", "2025-11-30", 25.0),
            row("2025-09-30", "Tipo de cambio nominal", UNIT, "2025-11-30", 3.0),
        ];
        let refs: Vec<&[Data]> = table.iter().map(Vec::as_slice).collect();

        let rows = latest_round(&refs).unwrap();
        assert_eq!(rows.len(), 2);

        let series = normalize(rows);
        assert_eq!(series.first().unwrap().value, 2.0);
        assert_eq!(series.last().unwrap().value, 1.9);
    }

    #[test]
    fn excel_serial_dates_are_decoded() {
        let table = vec![header(), vec![Data::Float(45930.0), s(INDICATOR), s(UNIT), Data::Float(45961.0), Data::Float(2.0)]];
        let refs: Vec<&[Data]> = table.iter().map(Vec::as_slice).collect();
        let rows = latest_round(&refs).unwrap();
        assert_eq!(rows[0].date.as_deref(), Some("2025-10-31"));
    }

    #[test]
    fn missing_header_is_a_schema_error() {
        let table = vec![vec![s("nothing here")]];
        let refs: Vec<&[Data]> = table.iter().map(Vec::as_slice).collect();
        assert!(matches!(latest_round(&refs), Err(SourceError::Schema(_))));
    }

    #[test]
    fn finish_keeps_last_horizon_periods() {
        let rows = (1..=30)
            .map(|m| RawObservation::number(format!("{}-{:02}-01", 2024 + (m - 1) / 12, (m - 1) % 12 + 1), m as f64))
            .collect();
        let series = SurveySource::new(DEFAULT_URL, 24).finish(normalize(rows));
        assert_eq!(series.len(), 24);
        assert_eq!(series.last().unwrap().value, 30.0);
    }

    #[test]
    fn cached_series_is_not_shared_across_horizons() {
        let rows = (1..=24)
            .map(|m| RawObservation::number(format!("{}-{:02}-01", 2025 + (m - 1) / 12, (m - 1) % 12 + 1), 2.0))
            .collect();
        let cache = SeriesCache::in_memory();
        let now = Utc::now();
        let long = SurveySource::new(DEFAULT_URL, 24);
        cache.put(&long.cache_key(), &normalize(rows), long.ttl(), now);

        let transport = Arc::new(ScriptedTransport::new(vec![Ok(b"not a zip".to_vec())]));
        let client = SourceClient::new(Box::new(transport.clone()), 1, Some(cache));

        let cached = client.fetch_at(&long, false, now);
        assert_eq!(cached.status, FetchStatus::Cached);
        assert_eq!(cached.series.len(), 24);

        let short = client.fetch_at(&SurveySource::new(DEFAULT_URL, 3), false, now);
        assert_ne!(short.status, FetchStatus::Cached);
        assert_ne!(short.series.len(), 24);
        assert_eq!(transport.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn garbage_bytes_fail_to_open() {
        let err = SurveySource::new(DEFAULT_URL, 24).parse_page(b"not a zip").unwrap_err();
        assert!(matches!(err, SourceError::Decode(_)));
    }
}
